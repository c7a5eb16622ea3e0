//! Builder pattern for `VoiceBridge`.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::host::{MessagePort, RenderHost, TickReport, DEFAULT_MAILBOX_CAPACITY};
use crate::pipeline::{DeliveryHandle, InboundBridge, OutboundBridge, Router};
use crate::stats::StatsHandle;
use crate::transport::Transport;
use crate::{
    event_callback, BridgeError, BridgeEvent, DeliveryConfig, EventCallback, InboundConfig,
    OutboundConfig, OutboundMessage,
};

/// Name the inbound bridge is registered under.
pub const INBOUND_PROCESSOR: &str = "inbound-bridge";

/// Name the outbound bridge is registered under.
pub const OUTBOUND_PROCESSOR: &str = "outbound-bridge";

/// Channel capacity for outbound messages.
/// One PCM payload and one telemetry value per tick; about 0.7 s at 128/48k.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Builder for a duplex voice bridge.
///
/// Use [`VoiceBridge::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use voice_bridge::{InboundConfig, OutboundConfig, VoiceBridge};
///
/// let mut bridge = VoiceBridge::builder()
///     .inbound(InboundConfig::default())
///     .outbound(OutboundConfig::default())
///     .on_event(|e| tracing::warn!(?e, "bridge event"))
///     .build()
///     .unwrap();
///
/// let port = bridge.port();
/// port.post_pcm(vec![0; 2400]).unwrap();
///
/// let captured = [0.0f32; 128];
/// let mut left = [0.0f32; 128];
/// let mut right = [0.0f32; 128];
/// bridge.tick(&captured, &mut [&mut left[..], &mut right[..]]);
/// ```
///
/// [`VoiceBridge::builder()`]: crate::VoiceBridge::builder
#[must_use]
pub struct VoiceBridgeBuilder {
    /// Network-to-renderer configuration.
    inbound: InboundConfig,
    /// Capture-to-network configuration.
    outbound: OutboundConfig,
    /// Transports that receive outbound messages.
    transports: Vec<Arc<dyn Transport>>,
    /// Retry settings for transports.
    delivery: DeliveryConfig,
    /// Event callback.
    event_callback: Option<EventCallback>,
    /// Capacity of the outbound message channel.
    outbound_capacity: usize,
    /// Capacity of each processor mailbox.
    mailbox_capacity: usize,
}

impl Default for VoiceBridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceBridgeBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            inbound: InboundConfig::default(),
            outbound: OutboundConfig::default(),
            transports: Vec::new(),
            delivery: DeliveryConfig::default(),
            event_callback: None,
            outbound_capacity: OUTBOUND_CHANNEL_CAPACITY,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }

    /// Set the network-to-renderer configuration.
    pub fn inbound(mut self, config: InboundConfig) -> Self {
        self.inbound = config;
        self
    }

    /// Set the capture-to-network configuration.
    pub fn outbound(mut self, config: OutboundConfig) -> Self {
        self.outbound = config;
        self
    }

    /// Add a transport for outbound messages.
    ///
    /// Transports only receive messages once
    /// [`VoiceBridge::start_delivery()`] is called.
    pub fn add_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transports.push(Arc::new(transport));
        self
    }

    /// Set retry settings for transports.
    pub fn delivery(mut self, config: DeliveryConfig) -> Self {
        self.delivery = config;
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include buffer overflows, underruns, converter readiness and
    /// transport errors. Tick events are emitted on the render thread.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Set the capacity of the outbound message channel.
    ///
    /// Default: 256
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Set the capacity of each processor mailbox.
    ///
    /// Default: 256
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), BridgeError> {
        self.inbound.validate()?;
        self.outbound.validate()?;
        self.delivery.validate()?;
        if self.outbound_capacity == 0 {
            return Err(BridgeError::invalid_config(
                "outbound_capacity",
                "must be non-zero",
            ));
        }
        Ok(())
    }

    /// Builds both bridges and registers them in a fresh [`RenderHost`].
    ///
    /// Converter initialization starts here and finishes in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if either configuration is invalid.
    pub fn build(self) -> Result<VoiceBridge, BridgeError> {
        self.validate()?;

        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_capacity);

        let mut inbound = InboundBridge::new(self.inbound)?.with_telemetry(outbound_tx.clone());
        let mut outbound = OutboundBridge::new(self.outbound, outbound_tx)?;
        if let Some(ref callback) = self.event_callback {
            inbound = inbound.with_event_callback(callback.clone());
            outbound = outbound.with_event_callback(callback.clone());
        }

        let inbound_stats = inbound.stats();
        let outbound_stats = outbound.stats();

        let mut host = RenderHost::with_mailbox_capacity(self.mailbox_capacity);
        let port = host.register(INBOUND_PROCESSOR, inbound)?;
        host.register(OUTBOUND_PROCESSOR, outbound)?;

        Ok(VoiceBridge {
            host,
            port,
            outbound_rx: Some(outbound_rx),
            transports: self.transports,
            delivery: self.delivery,
            event_callback: self.event_callback,
            inbound_stats,
            outbound_stats,
        })
    }
}

/// A duplex voice bridge: both directions registered in one render host.
///
/// Use [`VoiceBridge::builder()`] to configure one.
pub struct VoiceBridge {
    host: RenderHost,
    port: MessagePort,
    outbound_rx: Option<mpsc::Receiver<OutboundMessage>>,
    transports: Vec<Arc<dyn Transport>>,
    delivery: DeliveryConfig,
    event_callback: Option<EventCallback>,
    inbound_stats: StatsHandle,
    outbound_stats: StatsHandle,
}

impl VoiceBridge {
    /// Creates a new builder for configuring a bridge.
    pub fn builder() -> VoiceBridgeBuilder {
        VoiceBridgeBuilder::new()
    }

    /// Runs one render quantum: mono `captured` in, rendered `outputs` out.
    pub fn tick(&mut self, captured: &[f32], outputs: &mut [&mut [f32]]) -> TickReport {
        self.host.tick(&[captured], outputs)
    }

    /// Port feeding the inbound bridge.
    pub fn port(&self) -> MessagePort {
        self.port.clone()
    }

    /// The render host both bridges are registered in.
    pub fn host(&self) -> &RenderHost {
        &self.host
    }

    /// Mutable access to the render host, e.g. to register more processors.
    pub fn host_mut(&mut self) -> &mut RenderHost {
        &mut self.host
    }

    /// Counters of the inbound bridge.
    pub fn inbound_stats(&self) -> &StatsHandle {
        &self.inbound_stats
    }

    /// Counters of the outbound bridge.
    pub fn outbound_stats(&self) -> &StatsHandle {
        &self.outbound_stats
    }

    /// Takes the outbound message receiver to consume messages directly.
    ///
    /// Returns `None` if it was already taken or delivery was started.
    pub fn take_outbound(&mut self) -> Option<mpsc::Receiver<OutboundMessage>> {
        self.outbound_rx.take()
    }

    /// Starts the configured transports and forwards outbound messages to
    /// them on a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No transports are configured
    /// - The outbound receiver was already taken
    /// - Any transport fails to start
    pub async fn start_delivery(&mut self) -> Result<DeliveryHandle, BridgeError> {
        if self.transports.is_empty() {
            return Err(BridgeError::NoTransportsConfigured);
        }
        let rx = self.outbound_rx.take().ok_or(BridgeError::OutboundTaken)?;

        let router = Router::new(self.transports.clone(), self.delivery.clone())
            .with_event_callback(self.event_callback.clone());
        DeliveryHandle::spawn(router, rx).await
    }
}

impl std::fmt::Debug for VoiceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceBridge")
            .field("host", &self.host)
            .field("transports", &self.transports.len())
            .finish_non_exhaustive()
    }
}
