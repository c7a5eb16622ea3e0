//! Processor registry and render loop.
//!
//! [`RenderHost`] owns every registered processor. Frames posted through a
//! [`MessagePort`] wait in that processor's mailbox until the next
//! [`tick`](RenderHost::tick), which delivers them all before any processor
//! renders. A tick observes exactly the messages that were fully posted
//! before it began.

use tokio::sync::mpsc;

use crate::processor::{ProcessorId, RenderProcessor, TickOutcome};
use crate::{BridgeError, ControlSignal, InboundFrame, TransportError};

/// Default number of frames a mailbox holds before posts fail.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Sending side of a processor's mailbox.
///
/// Cheap to clone. Posting never blocks the render thread; the host drains
/// the mailbox between ticks.
#[derive(Debug, Clone)]
pub struct MessagePort {
    id: ProcessorId,
    tx: mpsc::Sender<InboundFrame>,
}

impl MessagePort {
    /// Name of the processor this port delivers to.
    pub fn id(&self) -> &ProcessorId {
        &self.id
    }

    /// Queues a frame without waiting.
    pub fn post(&self, frame: InboundFrame) -> Result<(), TransportError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::send_failed(format!("mailbox of '{}' is full", self.id))
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::ChannelClosed,
        })
    }

    /// Queues a frame, waiting for mailbox space.
    pub async fn send(&self, frame: InboundFrame) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Queues a control signal without waiting.
    pub fn post_control(&self, signal: ControlSignal) -> Result<(), TransportError> {
        self.post(InboundFrame::control(signal))
    }

    /// Queues PCM samples without waiting.
    pub fn post_pcm(&self, samples: Vec<i16>) -> Result<(), TransportError> {
        self.post(InboundFrame::pcm(samples))
    }

    /// Returns `true` once the processor was unregistered or the host dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Summary of one [`RenderHost::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frames delivered to message sinks before rendering.
    pub delivered: usize,
    /// Processors that rendered successfully.
    pub rendered: usize,
    /// Processors halted during this tick.
    pub halted: usize,
}

struct Entry {
    id: ProcessorId,
    processor: Box<dyn RenderProcessor>,
    port: MessagePort,
    mailbox: mpsc::Receiver<InboundFrame>,
    halted: bool,
}

/// Registry of processors driven by a render clock.
///
/// Processors render in registration order and share the tick's inputs and
/// outputs. A processor that produces output overwrites the output buffers;
/// mixing several renderers is left to the caller.
///
/// # Example
///
/// ```
/// use voice_bridge::{InboundBridge, InboundConfig, RenderHost};
///
/// let mut host = RenderHost::new();
/// let bridge = InboundBridge::new(InboundConfig {
///     render_rate: 24_000,
///     ..Default::default()
/// })
/// .unwrap();
/// let port = host.register("inbound-bridge", bridge).unwrap();
///
/// port.post_pcm(vec![0; 4096]).unwrap();
///
/// let mut left = [0.0f32; 128];
/// let mut right = [0.0f32; 128];
/// let report = host.tick(&[], &mut [&mut left[..], &mut right[..]]);
/// assert_eq!(report.delivered, 1);
/// assert_eq!(report.rendered, 1);
/// ```
pub struct RenderHost {
    entries: Vec<Entry>,
    mailbox_capacity: usize,
}

impl Default for RenderHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderHost {
    /// Creates an empty host.
    pub fn new() -> Self {
        Self::with_mailbox_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    /// Creates an empty host whose mailboxes hold `capacity` frames.
    pub fn with_mailbox_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            mailbox_capacity: capacity.max(1),
        }
    }

    /// Registers a processor and returns the port that feeds it.
    pub fn register<P>(
        &mut self,
        id: impl Into<ProcessorId>,
        processor: P,
    ) -> Result<MessagePort, BridgeError>
    where
        P: RenderProcessor + 'static,
    {
        let id = id.into();
        if self.contains(id.as_str()) {
            return Err(BridgeError::DuplicateProcessor {
                name: id.to_string(),
            });
        }

        let (tx, mailbox) = mpsc::channel(self.mailbox_capacity);
        let port = MessagePort { id: id.clone(), tx };
        tracing::info!(processor = %id, "Processor registered");

        self.entries.push(Entry {
            id,
            processor: Box::new(processor),
            port: port.clone(),
            mailbox,
            halted: false,
        });
        Ok(port)
    }

    /// Removes a processor. Its ports report closed afterwards.
    pub fn unregister(&mut self, id: &str) -> Result<(), BridgeError> {
        let index = self.index_of(id)?;
        self.entries.remove(index);
        tracing::info!(processor = id, "Processor unregistered");
        Ok(())
    }

    /// Returns a new port for a registered processor.
    pub fn port(&self, id: &str) -> Result<MessagePort, BridgeError> {
        let index = self.index_of(id)?;
        Ok(self.entries[index].port.clone())
    }

    /// Returns `true` if a processor is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id.as_str() == id)
    }

    /// Returns `true` if the processor halted after a fatal error.
    pub fn is_halted(&self, id: &str) -> Result<bool, BridgeError> {
        let index = self.index_of(id)?;
        Ok(self.entries[index].halted)
    }

    /// Registered processor names, in render order.
    pub fn processor_ids(&self) -> impl Iterator<Item = &ProcessorId> {
        self.entries.iter().map(|e| &e.id)
    }

    /// Number of registered processors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no processors are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_of(&self, id: &str) -> Result<usize, BridgeError> {
        self.entries
            .iter()
            .position(|e| e.id.as_str() == id)
            .ok_or_else(|| BridgeError::UnknownProcessor {
                name: id.to_string(),
            })
    }

    /// Hands every queued frame to its processor. Returns the number delivered.
    pub fn deliver_pending(&mut self) -> usize {
        let mut delivered = 0;
        for entry in &mut self.entries {
            while let Ok(frame) = entry.mailbox.try_recv() {
                match entry.processor.message_sink() {
                    Some(sink) => {
                        sink.on_message(frame);
                        delivered += 1;
                    }
                    None => {
                        tracing::warn!(
                            processor = %entry.id,
                            "Dropping message for processor without a message sink"
                        );
                    }
                }
            }
        }
        delivered
    }

    /// Runs one render quantum.
    ///
    /// Queued messages are delivered first, then every processor renders.
    /// A processor returning an error is halted: it is still called each tick
    /// so it can silence its outputs, but no longer counts as rendered.
    pub fn tick(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) -> TickReport {
        let delivered = self.deliver_pending();
        let mut report = TickReport {
            delivered,
            ..TickReport::default()
        };

        for entry in &mut self.entries {
            if entry.halted {
                // Still called so a halted renderer overwrites its outputs
                let _ = entry.processor.process(inputs, outputs);
                continue;
            }
            match entry.processor.process(inputs, outputs) {
                Ok(_) => report.rendered += 1,
                Err(e) => {
                    tracing::error!(processor = %entry.id, error = %e, "Processor halted");
                    entry.halted = true;
                    report.halted += 1;
                }
            }
        }
        report
    }

    /// Renders a single processor without delivering messages.
    pub fn render(
        &mut self,
        id: &str,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
    ) -> Result<TickOutcome, BridgeError> {
        let index = self.index_of(id)?;
        let entry = &mut self.entries[index];
        if entry.halted {
            let _ = entry.processor.process(inputs, outputs);
            return Err(BridgeError::Halted);
        }
        let result = entry.processor.process(inputs, outputs);
        if result.is_err() {
            entry.halted = true;
        }
        result
    }
}

impl std::fmt::Debug for RenderHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHost")
            .field(
                "processors",
                &self.entries.iter().map(|e| &e.id).collect::<Vec<_>>(),
            )
            .field("mailbox_capacity", &self.mailbox_capacity)
            .finish()
    }
}
