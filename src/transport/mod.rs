//! Transport trait and implementations for outbound messages.
//!
//! A [`Transport`] is any destination that can carry messages posted by the
//! bridges off the render thread. The crate provides two built-in transports:
//!
//! - [`ChannelTransport`]: Forwards every message to a tokio mpsc channel
//! - [`UplinkTransport`]: Encodes PCM as [`UplinkFrame`]s and drops telemetry
//!
//! Implement the [`Transport`] trait for custom destinations like a
//! websocket or a metrics pipeline.
//!
//! [`UplinkFrame`]: crate::UplinkFrame

mod channel;

pub use channel::{ChannelTransport, UplinkTransport};

use crate::{OutboundMessage, TransportError};
use async_trait::async_trait;

/// A destination for outbound messages.
///
/// Transports receive messages from the router, never from the render
/// thread, so they are free to await.
///
/// # Implementation Notes
///
/// - Methods take `&self` - use interior mutability (`Mutex`, `RwLock`) if needed
/// - All methods are async and run on the tokio runtime
/// - `on_start` is called before any message flows; open connections here
/// - `on_stop` is called during graceful shutdown; close connections here
/// - `send` may be retried; a message can arrive more than once if a
///   failed attempt partially succeeded
///
/// # Example
///
/// ```
/// use voice_bridge::{OutboundMessage, Transport, TransportError};
/// use async_trait::async_trait;
///
/// struct PrintTransport;
///
/// #[async_trait]
/// impl Transport for PrintTransport {
///     fn name(&self) -> &str {
///         "print"
///     }
///
///     async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
///         println!("{message:?}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Called once before delivery begins.
    ///
    /// Errors here are fatal and prevent delivery from starting.
    ///
    /// Default implementation does nothing.
    async fn on_start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Returns `true` if this transport wants `message` at all.
    ///
    /// The router never queues or sends messages a transport rejects here.
    ///
    /// Default implementation accepts everything.
    fn accepts(&self, _message: &OutboundMessage) -> bool {
        true
    }

    /// Delivers one message.
    ///
    /// Errors are recoverable - the router will emit a
    /// [`BridgeEvent::TransportError`] and may retry PCM based on
    /// [`DeliveryConfig`] settings, as long as it is not yet stale.
    ///
    /// [`BridgeEvent::TransportError`]: crate::BridgeEvent::TransportError
    /// [`DeliveryConfig`]: crate::DeliveryConfig
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Called during graceful shutdown.
    ///
    /// Default implementation does nothing.
    async fn on_stop(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTransport {
        count: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, _message: &OutboundMessage) -> Result<(), TransportError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transport_lifecycle() {
        let transport = CountingTransport {
            count: AtomicUsize::new(0),
        };

        transport.on_start().await.unwrap();
        let msg = OutboundMessage::Telemetry { emitted_ms: 2.0 };
        transport.send(&msg).await.unwrap();
        transport.send(&msg).await.unwrap();
        assert_eq!(transport.count.load(Ordering::SeqCst), 2);
        transport.on_stop().await.unwrap();
    }

    #[test]
    fn test_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn Transport>>();
    }
}
