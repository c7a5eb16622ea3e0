//! Capabilities a component needs to be driven by a [`RenderHost`](crate::RenderHost).
//!
//! A processor is a plain component. The host calls [`RenderProcessor::process`]
//! once per render quantum and hands queued frames to its [`MessageSink`]
//! strictly between ticks.

use std::sync::Arc;

use crate::{BridgeError, InboundFrame};

/// What a processor did on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still filling up; silence was emitted.
    Buffering,
    /// Too few samples were buffered; the gate closed.
    Underrun,
    /// The converter is still initializing; the fallback policy applied.
    ConverterNotReady,
    /// The converter rejected this tick's block; silence was emitted.
    ConverterFailed,
    /// No input was available; nothing was emitted.
    Idle,
    /// Audio was emitted.
    Emitted {
        /// Frames of audio produced.
        frames: usize,
    },
}

/// A component invoked once per render quantum.
///
/// `process` runs on the render thread with a hard deadline. It must not
/// block, must not await, and must not allocate after warm-up.
pub trait RenderProcessor: Send {
    /// Handles one quantum.
    ///
    /// `inputs` holds one slice per captured channel, `outputs` one slice per
    /// output channel. A processor that doesn't consume input ignores
    /// `inputs`; one that doesn't render leaves `outputs` untouched.
    ///
    /// An error halts the processor. The host keeps calling it every tick
    /// but ignores the result, so a halted processor must write silence to
    /// any outputs it renders and return an error.
    fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
    ) -> Result<TickOutcome, BridgeError>;

    /// Returns the processor's message sink, if it accepts messages.
    fn message_sink(&mut self) -> Option<&mut dyn MessageSink> {
        None
    }
}

/// A component that accepts frames from the delivery channel.
pub trait MessageSink {
    /// Applies one frame.
    ///
    /// Called between ticks, never concurrently with
    /// [`RenderProcessor::process`]. Malformed frames are reported and
    /// otherwise ignored.
    fn on_message(&mut self, frame: InboundFrame);
}

/// Name a processor is registered under.
///
/// Uses `Arc<str>` internally, so cloning is a pointer copy.
///
/// # Example
///
/// ```
/// use voice_bridge::ProcessorId;
///
/// let inbound = ProcessorId::new("inbound-bridge");
/// assert_eq!(inbound, ProcessorId::from("inbound-bridge"));
/// assert_eq!(inbound.to_string(), "inbound-bridge");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(Arc<str>);

impl ProcessorId {
    /// Creates a new processor ID from a string.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProcessorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProcessorId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for ProcessorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processor_id_equality() {
        let a = ProcessorId::new("inbound");
        let b = ProcessorId::new("inbound");
        let c = ProcessorId::new("outbound");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_processor_id_from_string() {
        let id: ProcessorId = String::from("x").into();
        assert_eq!(id.as_str(), "x");
    }

    #[test]
    fn test_processor_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(ProcessorId::new("inbound"));
        set.insert(ProcessorId::new("outbound"));
        set.insert(ProcessorId::new("inbound")); // duplicate

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_render_processor_is_object_safe() {
        fn assert_send<T: Send + ?Sized>() {}
        assert_send::<Box<dyn RenderProcessor>>();
    }
}
