//! Push channel abstraction for live officer and dashboard connections.

use async_trait::async_trait;
use crate::error::EnvError;
use tokio::sync::mpsc;

/// A live, send-only channel owned by the I/O context.
///
/// # Implementations
///
/// - **Production**: a WebSocket writer task fed by the transport layer
/// - **Bundled**: `MpscChannel`, an unbounded queue drained by the owner
///
/// # Delivery Flow
///
/// ```text
/// Worker                Dispatch loop              Channel owner
///   |                        |                           |
///   |-- try_send(delivery) ->|                           |
///   |                        |-- send(payload) --------->|
///   |                        |<- Err(ChannelClosed) -----|  (evicted)
/// ```
#[async_trait]
pub trait PushChannel: Send + Sync + 'static {
    /// Sends one serialized event payload.
    ///
    /// # Returns
    /// * `Ok(())` - Payload handed to the transport
    /// * `Err(EnvError)` - The channel is broken and should be evicted
    ///
    /// # Note
    /// Success does not guarantee the client rendered the event.
    async fn send(&self, payload: &str) -> Result<(), EnvError>;
}

/// Channel backed by an unbounded tokio queue.
///
/// The receiving half is handed to whatever drives the real socket; dropping
/// it closes the channel, and the next send fails.
#[derive(Debug, Clone)]
pub struct MpscChannel {
    label: String,
    tx: mpsc::UnboundedSender<String>,
}

impl MpscChannel {
    /// Creates a channel and its receiving half.
    pub fn pair(label: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { label: label.into(), tx }, rx)
    }

    /// Returns the label used in log lines.
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl PushChannel for MpscChannel {
    async fn send(&self, payload: &str) -> Result<(), EnvError> {
        self.tx
            .send(payload.to_string())
            .map_err(|_| EnvError::closed(&self.label))
    }
}
