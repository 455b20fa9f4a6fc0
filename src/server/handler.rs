//! Connection Handler
//!
//! Decodes request frames and runs them against the live store.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::error::StoreError;
use crate::protocol::{Command, ErrorKind, FrameCodec, Response};
use crate::storage::{now_millis, PutOutcome, SharedStore};

/// Connection handler
pub struct Handler {
    store: Arc<SharedStore>,
}

impl Handler {
    pub fn new(store: Arc<SharedStore>) -> Self {
        Self { store }
    }

    /// Serve one connection until the peer closes it
    pub async fn run<T>(self, mut framed: Framed<T, FrameCodec>) -> std::io::Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(result) = framed.next().await {
            let frame = result?;
            let start = Instant::now();
            let request_id = frame.request_id();

            let (name, response) = match Command::from_frame(&frame) {
                Ok(cmd) => (cmd.name(), self.execute(cmd)),
                Err(e) => ("INVALID", Response::error(ErrorKind::Protocol, e.to_string())),
            };

            framed.send(response.to_frame(request_id)).await?;
            debug!(cmd = name, request_id, latency = ?start.elapsed(), "Command executed");
        }

        Ok(())
    }

    /// Execute a command and return response
    pub fn execute(&self, cmd: Command) -> Response {
        match cmd {
            Command::Ping => Response::Pong,

            Command::Get { key } => match self.store.get(&key) {
                Some(record) => Response::Record {
                    ttl_ms: record.ttl_ms(now_millis()),
                    value: record.into_value(),
                },
                None => Response::Nil,
            },

            Command::Set { key, value, ttl_ms } => {
                let Some(value) = value else {
                    return Response::error(ErrorKind::InvalidArgument, "value is missing");
                };
                match self.store.put(&key, &value, ttl_ms) {
                    Ok(PutOutcome::Created) => Response::Created,
                    Ok(PutOutcome::Updated) => Response::Updated,
                    Err(e) => store_error(e),
                }
            }

            // Expired leftovers are dropped too, but reported as absent
            Command::Del { key } => match self.store.remove(&key) {
                Some(record) if record.is_valid_at(now_millis()) => Response::Removed {
                    value: record.into_value(),
                },
                _ => Response::Nil,
            },

            Command::Valid { key } => Response::Bool(self.store.is_valid(&key)),

            Command::Dump => match self.store.dump_bytes() {
                Ok(blob) => Response::Snapshot(blob),
                Err(e) => Response::error(ErrorKind::DumpFailed, e.to_string()),
            },

            Command::Load { blob } => match self.store.load_bytes(&blob) {
                Ok(()) => Response::Loaded,
                Err(e) => store_error(e),
            },
        }
    }
}

fn store_error(err: StoreError) -> Response {
    let kind = match &err {
        StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        StoreError::Snapshot(_) | StoreError::Closed => ErrorKind::LoadFailed,
    };
    Response::error(kind, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Store, StoreConfig};
    use bytes::Bytes;

    fn handler() -> Handler {
        Handler::new(Arc::new(SharedStore::with_config(StoreConfig::default())))
    }

    fn set(key: &str, value: Option<&str>, ttl_ms: Option<i64>) -> Command {
        Command::Set {
            key: key.to_string(),
            value: value.map(str::to_string),
            ttl_ms,
        }
    }

    #[tokio::test]
    async fn test_set_reports_created_then_updated() {
        let h = handler();
        assert_eq!(h.execute(set("k", Some("v1"), None)), Response::Created);
        assert_eq!(h.execute(set("k", Some("v2"), Some(700))), Response::Updated);

        match h.execute(Command::Get { key: "k".to_string() }) {
            Response::Record { value, ttl_ms } => {
                assert_eq!(value, "v2");
                assert!((ttl_ms - 700).abs() <= 10);
            }
            other => panic!("Expected record, got {:?}", other),
        }
        h.store.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let h = handler();
        assert!(matches!(
            h.execute(set("", Some("v"), None)),
            Response::Error { kind: ErrorKind::InvalidArgument, .. }
        ));
        assert!(matches!(
            h.execute(set("k", None, None)),
            Response::Error { kind: ErrorKind::InvalidArgument, .. }
        ));
        assert_eq!(h.execute(Command::Valid { key: "k".to_string() }), Response::Bool(false));
        h.store.shutdown();
    }

    #[tokio::test]
    async fn test_del() {
        let h = handler();
        h.execute(set("k", Some("v"), None));
        h.execute(set("expired", Some("v"), Some(-1)));

        assert_eq!(
            h.execute(Command::Del { key: "k".to_string() }),
            Response::Removed { value: "v".to_string() }
        );
        assert_eq!(h.execute(Command::Del { key: "k".to_string() }), Response::Nil);
        assert_eq!(h.execute(Command::Del { key: "expired".to_string() }), Response::Nil);
        assert!(!h.store.current().exists("expired"));
        h.store.shutdown();
    }

    #[tokio::test]
    async fn test_dump_and_load() {
        let h = handler();
        h.execute(set("k", Some("v"), Some(30_000)));

        let Response::Snapshot(blob) = h.execute(Command::Dump) else {
            panic!("Expected snapshot");
        };
        h.execute(Command::Del { key: "k".to_string() });

        assert_eq!(h.execute(Command::Load { blob }), Response::Loaded);
        assert!(h.store.is_valid("k"));

        let failed = h.execute(Command::Load {
            blob: Bytes::from_static(b"garbage"),
        });
        assert!(matches!(failed, Response::Error { kind: ErrorKind::LoadFailed, .. }));
        assert!(h.store.is_valid("k"));
        assert!(h.store.current().is_evicting());

        h.store.shutdown();
        let Response::Snapshot(blob) = h.execute(Command::Dump) else {
            panic!("Expected snapshot");
        };
        assert_eq!(
            h.execute(Command::Load { blob }),
            Response::error(ErrorKind::LoadFailed, "store is shut down")
        );
        assert!(!h.store.current().is_evicting());
    }

    #[tokio::test]
    async fn test_loaded_store_matches_source() {
        let source = Store::new();
        source.put_ttl("a", "1", Some(5_000)).unwrap();
        source.put_ttl("b", "2", Some(9_000)).unwrap();

        let h = handler();
        let response = h.execute(Command::Load { blob: source.dump().unwrap() });
        assert_eq!(response, Response::Loaded);
        assert!(source.is_equivalent(&h.store.current()));

        source.stop_eviction();
        h.store.shutdown();
    }
}
