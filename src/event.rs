//! Runtime events for monitoring bridge health.
//!
//! Events are non-fatal notifications about bridge behavior. The bridge
//! keeps running after events are emitted - they're for logging/metrics,
//! not error handling.

use std::sync::Arc;

use crate::pipeline::BufferingState;

/// Which half of the duplex link produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Network audio to the local renderer.
    Inbound,
    /// Captured audio to the network.
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

/// Runtime events emitted by the bridges and the delivery tasks.
///
/// These are informational events, not errors. Use the [`EventCallback`]
/// to log these or update metrics.
///
/// # Example
///
/// ```
/// use voice_bridge::BridgeEvent;
///
/// fn handle_event(event: BridgeEvent) {
///     match event {
///         BridgeEvent::BufferOverflow { dropped_samples, .. } => {
///             eprintln!("dropped {} samples", dropped_samples);
///         }
///         BridgeEvent::Underrun { required, available } => {
///             eprintln!("underrun: needed {}, had {}", required, available);
///         }
///         other => eprintln!("{:?}", other),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A chunk did not fit in the sample buffer and its tail was dropped.
    BufferOverflow {
        /// Samples dropped from the end of the chunk.
        dropped_samples: usize,
        /// Approximate duration of audio that was dropped.
        dropped_ms: u64,
    },

    /// A tick needed more buffered samples than were available.
    Underrun {
        /// Source frames the tick required.
        required: usize,
        /// Source frames that were buffered.
        available: usize,
    },

    /// The gate switched between buffering and playback.
    GateChanged {
        /// State before the transition.
        from: BufferingState,
        /// State after the transition.
        to: BufferingState,
    },

    /// A chunk arrived while the gate was muted and was discarded.
    WriteRejected {
        /// Samples in the rejected chunk.
        samples: usize,
    },

    /// A control signal was applied.
    ControlApplied {
        /// The applied signal.
        signal: crate::ControlSignal,
    },

    /// A tick ran before the conversion session finished initializing.
    ConverterNotReady {
        /// Which bridge was affected.
        direction: Direction,
    },

    /// The conversion session finished initializing.
    ConverterReady {
        /// Which bridge received the session.
        direction: Direction,
    },

    /// The conversion session could not be used.
    ///
    /// Construction failures leave the bridge permanently on its fallback
    /// policy; processing failures affect only the current tick.
    ConverterFailed {
        /// Which bridge was affected.
        direction: Direction,
        /// Description of the failure.
        reason: String,
    },

    /// A message on the inbound channel could not be decoded.
    MalformedMessage {
        /// Description of the problem.
        reason: String,
    },

    /// An outbound message was dropped because the channel was full.
    MessageDropped {
        /// Which bridge tried to send.
        direction: Direction,
    },

    /// A transport failed to deliver an outbound message.
    TransportError {
        /// Name of the transport that errored.
        transport_name: String,
        /// Description of the error.
        error: String,
    },

    /// An outbound message was given up on for one transport.
    DeliveryDropped {
        /// Name of the transport that missed the message.
        transport_name: String,
        /// Why the message was not delivered.
        reason: DropReason,
    },
}

/// Why the router gave up on a message for one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The transport's queue was full.
    Lagging,
    /// PCM waited longer than `stale_after` and would play late.
    Stale,
    /// Every retry attempt failed.
    RetriesExhausted,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lagging => write!(f, "lagging"),
            Self::Stale => write!(f, "stale"),
            Self::RetriesExhausted => write!(f, "retries exhausted"),
        }
    }
}

/// Callback type for receiving runtime events.
///
/// Register an event callback via [`VoiceBridgeBuilder::on_event()`] or
/// directly on a bridge with `with_event_callback()`.
///
/// The callback runs on the render thread for tick events, so it must not
/// block.
///
/// [`VoiceBridgeBuilder::on_event()`]: crate::VoiceBridgeBuilder::on_event
pub type EventCallback = Arc<dyn Fn(BridgeEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use voice_bridge::{event_callback, BridgeEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(BridgeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
