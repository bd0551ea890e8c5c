//! Seams between the connection and the subscription registry.

use super::error::WsError;
use super::messages::ClientFrame;

/// Outbound side of the shared connection.
///
/// Both operations return immediately; neither waits for the socket.
pub trait Transport: Send + Sync {
    /// Starts connecting if no socket is open or opening.
    fn ensure_connected(&self);

    /// Queues a frame on the open socket and returns the epoch of that
    /// socket.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::NotConnected`] if no socket is open. Frames are
    /// never buffered across reconnects.
    fn send(&self, frame: &ClientFrame) -> Result<u64, WsError>;
}

/// Inbound side of the shared connection.
///
/// The connection calls these sequentially from its supervisor task and
/// never while holding its own locks.
pub trait FrameSink: Send + Sync {
    /// A socket opened. `epoch` increases by one per successful open.
    fn on_open(&self, epoch: u64, reconnect: bool);

    /// A text frame arrived.
    fn on_frame(&self, text: &str);
}
