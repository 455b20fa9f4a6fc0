//! Driver
//!
//! Async client for the key-value server.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::protocol::{Command, ErrorKind, FrameCodec, Response};
use crate::storage::PutOutcome;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error ({kind}): {message}")]
    Server { kind: ErrorKind, message: String },

    #[error("Server connection test failed: {0}")]
    ConnectionTest(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Record as returned by GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordView {
    pub value: String,
    /// Remaining TTL when the server answered
    pub ttl_ms: i64,
}

/// Connection to a server
pub struct Driver {
    framed: Framed<TcpStream, FrameCodec>,
    next_request_id: u64,
}

impl Driver {
    /// Connect and run the connection test (PING must be answered by PONG)
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let mut driver = Self::connect_unchecked(host, port).await?;
        match driver.call(Command::Ping).await {
            Ok(Response::Pong) => Ok(driver),
            Ok(other) => Err(ClientError::ConnectionTest(format!(
                "unexpected reply to PING: {}",
                other
            ))),
            Err(ClientError::Protocol(e)) => Err(ClientError::ConnectionTest(e)),
            Err(e) => Err(e),
        }
    }

    /// Connect without the connection test
    pub async fn connect_unchecked(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new()),
            next_request_id: 1,
        })
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.call(Command::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }

    /// Get a valid record
    pub async fn get(&mut self, key: &str) -> Result<Option<RecordView>> {
        let cmd = Command::Get {
            key: key.to_string(),
        };
        match self.call(cmd).await? {
            Response::Record { value, ttl_ms } => Ok(Some(RecordView { value, ttl_ms })),
            Response::Nil => Ok(None),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// Put with a TTL in seconds (None = server default)
    pub async fn put(&mut self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<PutOutcome> {
        self.put_ms(key, value, ttl_secs.map(|secs| secs.saturating_mul(1000)))
            .await
    }

    /// Put with a TTL in milliseconds (None = server default)
    pub async fn put_ms(&mut self, key: &str, value: &str, ttl_ms: Option<i64>) -> Result<PutOutcome> {
        let cmd = Command::Set {
            key: key.to_string(),
            value: Some(value.to_string()),
            ttl_ms,
        };
        match self.call(cmd).await? {
            Response::Created => Ok(PutOutcome::Created),
            Response::Updated => Ok(PutOutcome::Updated),
            other => Err(unexpected("SET", &other)),
        }
    }

    /// Remove a key, returning its value if it held a valid record
    pub async fn remove(&mut self, key: &str) -> Result<Option<String>> {
        let cmd = Command::Del {
            key: key.to_string(),
        };
        match self.call(cmd).await? {
            Response::Removed { value } => Ok(Some(value)),
            Response::Nil => Ok(None),
            other => Err(unexpected("DEL", &other)),
        }
    }

    pub async fn is_valid(&mut self, key: &str) -> Result<bool> {
        let cmd = Command::Valid {
            key: key.to_string(),
        };
        match self.call(cmd).await? {
            Response::Bool(valid) => Ok(valid),
            other => Err(unexpected("VALID", &other)),
        }
    }

    /// Fetch a snapshot of the whole store
    pub async fn dump(&mut self) -> Result<Bytes> {
        match self.call(Command::Dump).await? {
            Response::Snapshot(blob) => Ok(blob),
            other => Err(unexpected("DUMP", &other)),
        }
    }

    /// Replace the server's store with a snapshot
    pub async fn load(&mut self, blob: Bytes) -> Result<()> {
        match self.call(Command::Load { blob }).await? {
            Response::Loaded => Ok(()),
            other => Err(unexpected("LOAD", &other)),
        }
    }

    /// Dump into `dir/file_name`, returns the written path
    pub async fn dump_to_file(&mut self, dir: impl AsRef<Path>, file_name: &str) -> Result<PathBuf> {
        let blob = self.dump().await?;
        let path = dir.as_ref().join(file_name);
        tokio::fs::write(&path, &blob).await?;
        debug!(bytes = blob.len(), path = %path.display(), "Snapshot written");
        Ok(path)
    }

    /// Load a snapshot previously written by [`Driver::dump_to_file`]
    pub async fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let blob = tokio::fs::read(path.as_ref()).await?;
        self.load(Bytes::from(blob)).await
    }

    /// Send one command and wait for its response
    pub async fn call(&mut self, cmd: Command) -> Result<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        self.framed.send(cmd.to_frame(request_id)).await?;

        let frame = match self.framed.next().await {
            Some(frame) => frame?,
            None => return Err(ClientError::ConnectionClosed),
        };
        if frame.request_id() != request_id {
            return Err(ClientError::Protocol(format!(
                "response for request {} while waiting for {}",
                frame.request_id(),
                request_id
            )));
        }

        let response =
            Response::from_frame(&frame).map_err(|e| ClientError::Protocol(e.to_string()))?;
        match response {
            Response::Error { kind, message } => Err(ClientError::Server { kind, message }),
            other => Ok(other),
        }
    }
}

fn unexpected(cmd: &str, response: &Response) -> ClientError {
    ClientError::Protocol(format!("unexpected reply to {}: {}", cmd, response))
}
