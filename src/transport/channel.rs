//! Tokio mpsc channel transports.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::transport::Transport;
use crate::{OutboundMessage, TransportError};

/// A transport that forwards every message to a tokio mpsc channel.
///
/// # Example
///
/// ```
/// use voice_bridge::{ChannelTransport, OutboundMessage};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<OutboundMessage>(100);
/// let transport = ChannelTransport::new(tx);
/// ```
pub struct ChannelTransport {
    name: String,
    sender: mpsc::Sender<OutboundMessage>,
}

impl ChannelTransport {
    /// Creates a new channel transport with the given sender.
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a new channel transport with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.sender
            .send(message.clone())
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// A transport that sends encoded uplink frames to a byte channel.
///
/// PCM messages become [`UplinkFrame::Audio`](crate::UplinkFrame::Audio)
/// frames. Telemetry is local-only: the transport declines it, so the router
/// never queues it here.
///
/// Encoding prepends the type byte, which copies the payload once. That copy
/// happens on the router task; the bridge's own buffer is never touched
/// again after it is posted.
pub struct UplinkTransport {
    name: String,
    sender: mpsc::Sender<Bytes>,
}

impl UplinkTransport {
    /// Creates a new uplink transport with the given sender.
    pub fn new(sender: mpsc::Sender<Bytes>) -> Self {
        Self {
            name: "uplink".to_string(),
            sender,
        }
    }
}

#[async_trait]
impl Transport for UplinkTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, message: &OutboundMessage) -> bool {
        message.is_pcm()
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let Some(frame) = message.to_uplink() else {
            return Ok(());
        };
        self.sender
            .send(frame.encode())
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}
