//! Server Module
//!
//! TCP server exposing the store over the framed protocol.

mod config;
mod handler;

pub use config::Config;
pub use handler::Handler;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{error, info};

use crate::error::ServerError;
use crate::protocol::FrameCodec;
use crate::storage::SharedStore;

/// Key-value server bound to its listening socket
pub struct Server {
    config: Config,
    store: Arc<SharedStore>,
    listener: TcpListener,
}

impl Server {
    /// Create the store (restoring a snapshot file if configured) and bind
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let store = Arc::new(SharedStore::with_config(config.store_config()));

        if let Some(path) = &config.restore_from {
            let restore = async {
                let blob = tokio::fs::read(path).await?;
                store.load_bytes(&blob)?;
                Ok::<_, ServerError>(())
            };
            if let Err(e) = restore.await {
                store.shutdown();
                return Err(ServerError::Restore {
                    path: path.clone(),
                    source: Box::new(e),
                });
            }
            info!("Store restored from {}", path.display());
        }

        let listener = TcpListener::bind(config.addr()).await?;
        info!("ttlkv server listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            store,
            listener,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Live store handle (shared with connection handlers)
    pub fn store(&self) -> &Arc<SharedStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serve until the process is killed
    pub async fn run(self) -> io::Result<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, then stop the store's evictor
    pub async fn serve_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        info!("New connection from {}", peer_addr);
                        let store = self.store.clone();
                        let max_payload = self.config.max_payload;

                        tokio::spawn(async move {
                            let framed = Framed::new(socket, FrameCodec::with_max_payload(max_payload));
                            if let Err(e) = Handler::new(store).run(framed).await {
                                error!("Connection error from {}: {}", peer_addr, e);
                            }
                            info!("Connection closed: {}", peer_addr);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
            }
        }

        self.store.shutdown();
        Ok(())
    }
}
