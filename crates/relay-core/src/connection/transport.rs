//! Transport handles
//!
//! The core never touches sockets. It sends encoded frames through a [`Transport`]
//! and leaves framing, handshakes and I/O to whoever drains it.

use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport error type
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Outbound buffer is full")]
    Full,

    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

/// Sending half of a duplex connection
pub trait Transport: Send + Sync {
    /// Transport-level identifier (for example a socket or session id)
    fn key(&self) -> &str;

    /// Queue an encoded frame for delivery
    fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Ask the peer side to close; further sends fail
    fn close(&self);

    /// Check if the transport was closed
    fn is_closed(&self) -> bool;
}

/// Frame queued for the writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Transport backed by a bounded mpsc channel
///
/// The receiving half is drained by whatever owns the socket.
#[derive(Debug)]
pub struct ChannelTransport {
    key: String,
    sender: mpsc::Sender<OutboundFrame>,
    closed: AtomicBool,
}

impl ChannelTransport {
    /// Create a transport and the receiver its frames arrive on
    #[must_use]
    pub fn new(key: impl Into<String>, buffer: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (
            Self {
                key: key.into(),
                sender,
                closed: AtomicBool::new(false),
            },
            receiver,
        )
    }
}

impl Transport for ChannelTransport {
    fn key(&self) -> &str {
        &self.key
    }

    fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.sender
            .try_send(OutboundFrame::Text(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::Full,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // The writer may be gone already
            let _ = self.sender.try_send(OutboundFrame::Close);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_close() {
        let (transport, mut rx) = ChannelTransport::new("sock-1", 4);
        assert_eq!(transport.key(), "sock-1");

        transport.send("hello".to_string()).unwrap();
        transport.close();
        transport.close();

        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Text("hello".to_string()));
        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Close);
        assert!(rx.try_recv().is_err());
        assert_eq!(transport.send("late".to_string()), Err(TransportError::Closed));
    }

    #[test]
    fn test_full_buffer() {
        let (transport, _rx) = ChannelTransport::new("sock", 1);
        transport.send("a".to_string()).unwrap();
        assert_eq!(transport.send("b".to_string()), Err(TransportError::Full));
    }

    #[test]
    fn test_dropped_receiver_closes() {
        let (transport, rx) = ChannelTransport::new("sock", 1);
        drop(rx);
        assert!(transport.is_closed());
        assert_eq!(transport.send("a".to_string()), Err(TransportError::Closed));
    }
}
