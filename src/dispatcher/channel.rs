// Live push channel boundary: the transport the dispatcher reads raw messages from.

use std::future::Future;

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,
    #[error("channel disconnected: {0}")]
    Disconnected(String),
}

/// Connection state reported to the consumer. Transitions:
/// connected -> disconnected -> reconnecting -> connected (or back to disconnected on failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting,
}

/// A best-effort, ordered source of opaque text messages.
pub trait LiveChannel: Send {
    /// (Re)establishes the connection.
    fn connect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next message. An error means the connection is gone and `connect` must be called again.
    fn recv(&mut self) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// In-process channel fed by the record watcher over `tokio::sync::broadcast`.
/// Holds only a weak sender, so the channel reports `Closed` once the watcher is gone.
pub struct BroadcastChannel {
    tx: broadcast::WeakSender<String>,
    rx: Option<broadcast::Receiver<String>>,
}

impl BroadcastChannel {
    /// Not yet subscribed; the dispatcher connects on first read.
    pub fn new(tx: &broadcast::Sender<String>) -> Self {
        Self::from_weak(tx.downgrade())
    }

    pub fn from_weak(tx: broadcast::WeakSender<String>) -> Self {
        Self { tx, rx: None }
    }
}

impl LiveChannel for BroadcastChannel {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let Some(tx) = self.tx.upgrade() else {
            return Err(TransportError::Closed);
        };
        self.rx = Some(tx.subscribe());
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(TransportError::Disconnected("not subscribed".into()));
        };
        loop {
            match rx.recv().await {
                Ok(msg) => return Ok(msg),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "live channel lagged, records dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return Err(TransportError::Closed);
                }
            }
        }
    }
}
