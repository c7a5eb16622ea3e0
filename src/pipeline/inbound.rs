//! Network-to-renderer bridge.
//!
//! Frames from the delivery channel land in a [`SampleBuffer`]; each render
//! tick pulls a fixed number of source frames out, converts them to the
//! render rate and fans the mono result out to every output channel:
//!
//! ```text
//! MessagePort → SampleBuffer → BufferingGate → RateConverter → outputs
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::format::{fan_out, silence, ConverterSpec, ConverterStatus, RateConverter};
use crate::pipeline::{BufferingGate, BufferingState, SampleBuffer, Transition};
use crate::processor::{MessageSink, RenderProcessor, TickOutcome};
use crate::stats::{BridgeState, StatsHandle};
use crate::{
    BridgeError, BridgeEvent, ControlSignal, Direction, EventCallback, FallbackPolicy,
    InboundConfig, InboundFrame, InboundMessage, OutboundMessage, UnderrunPolicy,
};

/// Serves render ticks from push-delivered network audio.
///
/// The bridge has two entry points that never run concurrently:
/// [`handle_message`](Self::handle_message) between ticks, and
/// [`render`](Self::render) once per quantum.
///
/// # Example
///
/// ```
/// use voice_bridge::{InboundBridge, InboundConfig, InboundFrame, TickOutcome};
///
/// let config = InboundConfig {
///     source_rate: 24_000,
///     render_rate: 24_000,
///     quantum: 4,
///     output_channels: 1,
///     capacity: 64,
///     high_water_mark: 8,
///     ..Default::default()
/// };
/// let mut bridge = InboundBridge::new(config).unwrap();
///
/// bridge.handle_message(InboundFrame::pcm(vec![1000; 8]));
///
/// let mut out = [0.0f32; 4];
/// let outcome = bridge.render(&mut [&mut out[..]]).unwrap();
/// assert_eq!(outcome, TickOutcome::Emitted { frames: 4 });
/// ```
pub struct InboundBridge {
    config: InboundConfig,
    /// Source frames consumed per tick.
    required: usize,
    buffer: SampleBuffer,
    gate: BufferingGate,
    /// `None` when source and render rates match.
    converter: Option<RateConverter>,
    /// Holds one tick of source frames, sized for the larger of the
    /// required frames and the quantum.
    scratch: Vec<f32>,
    telemetry_tx: Option<mpsc::Sender<OutboundMessage>>,
    event_callback: Option<EventCallback>,
    state: Arc<BridgeState>,
    halted: bool,
}

impl InboundBridge {
    /// Creates a bridge, starting converter initialization if the rates differ.
    pub fn new(config: InboundConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        let converter = config.needs_conversion().then(|| {
            RateConverter::spawn(ConverterSpec::mono(
                config.source_rate,
                config.render_rate,
                config.quality,
                config.required_source_frames(),
            ))
        });
        Ok(Self::build(config, converter))
    }

    /// Creates a bridge around an existing converter.
    ///
    /// The converter's block size must equal
    /// [`InboundConfig::required_source_frames`].
    pub fn with_converter(
        config: InboundConfig,
        converter: RateConverter,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let required = config.required_source_frames();
        if converter.spec().block_frames != required {
            return Err(BridgeError::invalid_config(
                "converter",
                format!(
                    "block of {} frames does not match the {required} required per tick",
                    converter.spec().block_frames
                ),
            ));
        }
        Ok(Self::build(config, Some(converter)))
    }

    fn build(config: InboundConfig, converter: Option<RateConverter>) -> Self {
        let required = config.required_source_frames();

        tracing::info!(
            "InboundBridge created: {}Hz -> {}Hz, quantum={}, required={}, capacity={}, high_water_mark={}, conversion={}",
            config.source_rate,
            config.render_rate,
            config.quantum,
            required,
            config.capacity,
            config.high_water_mark,
            converter.is_some()
        );

        Self {
            required,
            buffer: SampleBuffer::new(config.capacity),
            gate: BufferingGate::new(config.high_water_mark),
            converter,
            scratch: vec![0.0; required.max(config.quantum)],
            telemetry_tx: None,
            event_callback: None,
            state: BridgeState::new(),
            halted: false,
            config,
        }
    }

    /// Posts the duration of every emitted tick to `tx`.
    pub fn with_telemetry(mut self, tx: mpsc::Sender<OutboundMessage>) -> Self {
        self.telemetry_tx = Some(tx);
        self
    }

    /// Sets the event callback.
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Returns the configuration the bridge was built with.
    pub fn config(&self) -> &InboundConfig {
        &self.config
    }

    /// Source frames each tick consumes.
    pub fn required_source_frames(&self) -> usize {
        self.required
    }

    /// Current gate state.
    pub fn buffering_state(&self) -> BufferingState {
        self.gate.state()
    }

    /// Samples currently buffered.
    pub fn occupancy(&self) -> usize {
        self.buffer.occupancy()
    }

    /// Read access to the sample buffer.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Returns `true` while writes are rejected.
    pub fn is_muted(&self) -> bool {
        self.gate.is_muted()
    }

    /// Returns `true` once a fatal error halted the bridge.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Returns a handle to the bridge's counters.
    pub fn stats(&self) -> StatsHandle {
        StatsHandle::new(self.state.clone())
    }

    fn emit_event(&self, event: BridgeEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }

    /// Decodes a frame from the delivery channel and applies it.
    ///
    /// Once the bridge has halted, frames are discarded unread.
    pub fn handle_message(&mut self, frame: InboundFrame) {
        if self.halted {
            BridgeState::incr(&self.state.dropped_messages);
            tracing::trace!("Inbound bridge halted, discarding frame");
            return;
        }
        match frame.decode(self.config.source_rate) {
            Ok(InboundMessage::Control(signal)) => self.apply_control(signal),
            Ok(InboundMessage::Pcm(chunk)) => {
                self.write(&chunk.samples);
            }
            Err(e) => {
                BridgeState::incr(&self.state.malformed_messages);
                tracing::warn!(error = %e, "Ignoring malformed inbound message");
                self.emit_event(BridgeEvent::MalformedMessage {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Appends PCM to the buffer and returns the number of samples stored.
    ///
    /// While muted or halted the whole chunk is rejected. If it doesn't fit,
    /// the tail is dropped.
    pub fn write(&mut self, samples: &[i16]) -> usize {
        if self.halted {
            BridgeState::add(&self.state.rejected_samples, samples.len() as u64);
            return 0;
        }
        if self.gate.is_muted() {
            if !samples.is_empty() {
                BridgeState::add(&self.state.rejected_samples, samples.len() as u64);
                self.emit_event(BridgeEvent::WriteRejected {
                    samples: samples.len(),
                });
            }
            return 0;
        }

        let outcome = self.buffer.write(samples);
        if outcome.overflowed() {
            let dropped_ms = outcome.dropped as u64 * 1000 / u64::from(self.config.source_rate);
            BridgeState::incr(&self.state.buffer_overflows);
            BridgeState::add(&self.state.dropped_samples, outcome.dropped as u64);
            tracing::warn!(
                dropped_samples = outcome.dropped,
                dropped_ms,
                capacity = self.buffer.capacity(),
                "Inbound buffer overflow, dropping tail of chunk"
            );
            self.emit_event(BridgeEvent::BufferOverflow {
                dropped_samples: outcome.dropped,
                dropped_ms,
            });
        }

        if let Some(transition) = self.gate.observe(self.buffer.occupancy()) {
            self.report_transition(transition);
        }
        outcome.written
    }

    /// Applies a control signal.
    ///
    /// MUTE discards buffered audio and rejects writes until UNMUTE. UNMUTE
    /// only reopens writes; playback restarts once the buffer refills. RESET
    /// discards buffered audio and leaves the mute state alone.
    pub fn apply_control(&mut self, signal: ControlSignal) {
        let transition = match signal {
            ControlSignal::Mute => {
                self.buffer.reset();
                self.gate.mute()
            }
            ControlSignal::Unmute => {
                self.gate.unmute();
                None
            }
            ControlSignal::Reset => {
                self.buffer.reset();
                self.gate.rearm()
            }
        };

        tracing::debug!(%signal, "Inbound control applied");
        self.emit_event(BridgeEvent::ControlApplied { signal });
        if let Some(transition) = transition {
            self.report_transition(transition);
        }
    }

    /// Renders one quantum into `outputs`.
    ///
    /// Every channel receives the same mono signal. Frames the tick has no
    /// audio for are zeroed. Returns an error only when the converter
    /// produced more frames than a quantum holds; the bridge is then halted
    /// and every later call writes silence and returns
    /// [`BridgeError::Halted`].
    pub fn render(&mut self, outputs: &mut [&mut [f32]]) -> Result<TickOutcome, BridgeError> {
        BridgeState::incr(&self.state.ticks);
        if self.halted {
            silence(outputs);
            return Err(BridgeError::Halted);
        }

        let occupancy = self.buffer.occupancy();
        if let Some(transition) = self.gate.observe(occupancy) {
            self.report_transition(transition);
        }
        if self.gate.state() == BufferingState::Buffering {
            silence(outputs);
            return Ok(TickOutcome::Buffering);
        }

        if occupancy < self.required {
            return self.underrun(occupancy, outputs);
        }

        // Checked before reading so a pending converter never eats audio
        if !self.converter_ready() {
            self.fallback(outputs);
            return Ok(TickOutcome::ConverterNotReady);
        }

        let n = self.required;
        self.buffer.read(&mut self.scratch[..n]);
        self.emit_converted(n, outputs)
    }

    fn underrun(
        &mut self,
        available: usize,
        outputs: &mut [&mut [f32]],
    ) -> Result<TickOutcome, BridgeError> {
        BridgeState::incr(&self.state.underruns);
        tracing::debug!(
            required = self.required,
            available,
            "Inbound underrun, returning to buffering"
        );
        self.emit_event(BridgeEvent::Underrun {
            required: self.required,
            available,
        });

        if let Some(transition) = self.gate.underrun() {
            self.report_transition(transition);
        }

        let drain = self.config.underrun_policy == UnderrunPolicy::DrainPartial
            && available > 0
            && self.converter_ready();
        if drain {
            self.buffer.read(&mut self.scratch[..available]);
            self.emit_converted(available, outputs)?;
        } else {
            silence(outputs);
        }
        Ok(TickOutcome::Underrun)
    }

    /// Polls the converter. A bridge without one is always ready.
    fn converter_ready(&mut self) -> bool {
        let status = match self.converter.as_mut() {
            None => return true,
            Some(converter) => converter.poll_ready(),
        };

        match status {
            ConverterStatus::Ready => true,
            ConverterStatus::BecameReady => {
                tracing::info!("Inbound rate converter ready");
                self.emit_event(BridgeEvent::ConverterReady {
                    direction: Direction::Inbound,
                });
                true
            }
            ConverterStatus::BecameFailed(reason) => {
                tracing::warn!(%reason, "Inbound rate converter failed to initialize");
                self.emit_event(BridgeEvent::ConverterFailed {
                    direction: Direction::Inbound,
                    reason,
                });
                false
            }
            ConverterStatus::Pending | ConverterStatus::Failed => false,
        }
    }

    fn fallback(&mut self, outputs: &mut [&mut [f32]]) {
        BridgeState::incr(&self.state.not_ready_ticks);
        tracing::debug!(policy = ?self.config.fallback, "Inbound converter not ready");
        self.emit_event(BridgeEvent::ConverterNotReady {
            direction: Direction::Inbound,
        });

        silence(outputs);
        if self.config.fallback == FallbackPolicy::PassThrough {
            let n = self.config.quantum.min(self.buffer.occupancy());
            self.buffer.read(&mut self.scratch[..n]);
            fan_out(&self.scratch[..n], outputs);
        }
    }

    /// Converts the first `n` scratch samples into `outputs`.
    fn emit_converted(
        &mut self,
        n: usize,
        outputs: &mut [&mut [f32]],
    ) -> Result<TickOutcome, BridgeError> {
        let capacity = self.config.quantum;
        let frames = match convert_into(
            self.converter.as_mut(),
            &self.scratch[..n],
            outputs,
            capacity,
        ) {
            Ok(frames) => frames,
            Err(BridgeError::ConverterFailure { reason }) => {
                silence(outputs);
                tracing::warn!(%reason, "Inbound conversion failed, emitting silence");
                self.emit_event(BridgeEvent::ConverterFailed {
                    direction: Direction::Inbound,
                    reason,
                });
                return Ok(TickOutcome::ConverterFailed);
            }
            Err(e) => return Err(self.halt(e, outputs)),
        };

        // A short block was padded to a full one; only count what it covers
        let frames = if n < self.required {
            frames.min(self.output_frames_for(n))
        } else {
            frames
        };

        BridgeState::add(&self.state.frames_emitted, frames as u64);
        self.post_telemetry(frames);
        Ok(TickOutcome::Emitted { frames })
    }

    /// Render-rate frames covering `source_frames` source samples, rounded up.
    fn output_frames_for(&self, source_frames: usize) -> usize {
        let source = u64::from(self.config.source_rate);
        let render = u64::from(self.config.render_rate);
        ((source_frames as u64 * render).div_ceil(source)) as usize
    }

    fn post_telemetry(&self, frames: usize) {
        let Some(ref tx) = self.telemetry_tx else {
            return;
        };
        let emitted_ms = frames as f64 * 1000.0 / f64::from(self.config.render_rate);
        if let Err(e) = tx.try_send(OutboundMessage::Telemetry { emitted_ms }) {
            BridgeState::incr(&self.state.dropped_messages);
            tracing::debug!(error = %e, "Dropping inbound telemetry");
            self.emit_event(BridgeEvent::MessageDropped {
                direction: Direction::Inbound,
            });
        }
    }

    fn halt(&mut self, error: BridgeError, outputs: &mut [&mut [f32]]) -> BridgeError {
        silence(outputs);
        self.halted = true;
        self.state
            .halted
            .store(true, std::sync::atomic::Ordering::SeqCst);
        tracing::error!(%error, "Inbound bridge halted");
        error
    }

    fn report_transition(&self, transition: Transition) {
        tracing::debug!(from = %transition.from, to = %transition.to, "Inbound gate changed");
        self.emit_event(BridgeEvent::GateChanged {
            from: transition.from,
            to: transition.to,
        });
    }
}

/// Runs `input` through the converter (or straight through without one) and
/// fans the result out, zeroing any frames past its end.
///
/// Returns the number of frames written. Output longer than `capacity` is
/// never written.
fn convert_into(
    converter: Option<&mut RateConverter>,
    input: &[f32],
    outputs: &mut [&mut [f32]],
    capacity: usize,
) -> Result<usize, BridgeError> {
    let converted: &[f32] = match converter {
        None => input,
        Some(converter) => match converter.session() {
            Some(session) => session.process(input)?,
            None => {
                return Err(BridgeError::ConverterFailure {
                    reason: "no conversion session".to_string(),
                })
            }
        },
    };

    if converted.len() > capacity {
        return Err(BridgeError::ConverterOverflow {
            produced: converted.len(),
            capacity,
        });
    }

    fan_out(converted, outputs);
    for channel in outputs.iter_mut() {
        if let Some(rest) = channel.get_mut(converted.len()..) {
            rest.fill(0.0);
        }
    }
    Ok(converted.len())
}

impl RenderProcessor for InboundBridge {
    fn process(
        &mut self,
        _inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
    ) -> Result<TickOutcome, BridgeError> {
        self.render(outputs)
    }

    fn message_sink(&mut self) -> Option<&mut dyn MessageSink> {
        Some(self)
    }
}

impl MessageSink for InboundBridge {
    fn on_message(&mut self, frame: InboundFrame) {
        self.handle_message(frame);
    }
}

impl std::fmt::Debug for InboundBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundBridge")
            .field("required", &self.required)
            .field("buffer", &self.buffer)
            .field("gate", &self.gate)
            .field("converter", &self.converter)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ConversionSession;
    use crate::QualityProfile;
    use std::sync::Mutex;

    fn scenario_config() -> InboundConfig {
        InboundConfig {
            source_rate: 24_000,
            render_rate: 24_000,
            quantum: 3,
            output_channels: 1,
            capacity: 8,
            high_water_mark: 4,
            ..Default::default()
        }
    }

    fn recording_callback() -> (EventCallback, Arc<Mutex<Vec<BridgeEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let callback = crate::event_callback(move |e| events_clone.lock().unwrap().push(e));
        (callback, events)
    }

    fn render_mono(bridge: &mut InboundBridge, frames: usize) -> (Result<TickOutcome, BridgeError>, Vec<f32>) {
        let mut out = vec![9.0f32; frames];
        let result = bridge.render(&mut [&mut out[..]]);
        (result, out)
    }

    fn n(s: i16) -> f32 {
        f32::from(s) / 32768.0
    }

    /// Session that returns a fixed block regardless of input.
    struct FixedSession {
        out: Vec<f32>,
    }

    impl ConversionSession for FixedSession {
        fn process(&mut self, _input: &[f32]) -> Result<&[f32], BridgeError> {
            Ok(&self.out)
        }

        fn max_output_frames(&self) -> usize {
            self.out.len()
        }
    }

    struct FailingSession;

    impl ConversionSession for FailingSession {
        fn process(&mut self, _input: &[f32]) -> Result<&[f32], BridgeError> {
            Err(BridgeError::ConverterFailure {
                reason: "filter exploded".to_string(),
            })
        }

        fn max_output_frames(&self) -> usize {
            0
        }
    }

    /// 24k -> 48k with quantum 4, so 2 source frames per tick.
    fn upsampling_config() -> InboundConfig {
        InboundConfig {
            source_rate: 24_000,
            render_rate: 48_000,
            quantum: 4,
            output_channels: 2,
            capacity: 16,
            high_water_mark: 2,
            quality: QualityProfile::Linear,
            ..Default::default()
        }
    }

    fn with_session(config: InboundConfig, session: impl ConversionSession + 'static) -> InboundBridge {
        let spec = ConverterSpec::mono(
            config.source_rate,
            config.render_rate,
            config.quality,
            config.required_source_frames(),
        );
        InboundBridge::with_converter(config, RateConverter::ready(spec, Box::new(session))).unwrap()
    }

    fn pending(config: InboundConfig) -> (InboundBridge, std::sync::mpsc::Sender<()>) {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let spec = ConverterSpec::mono(
            config.source_rate,
            config.render_rate,
            config.quality,
            config.required_source_frames(),
        );
        let converter = RateConverter::spawn_with(spec, move |_| {
            let _ = release_rx.recv();
            Err(BridgeError::ConverterConstruction {
                reason: "released".to_string(),
            })
        });
        (InboundBridge::with_converter(config, converter).unwrap(), release_tx)
    }

    #[test]
    fn test_scenario_fill_play_underrun() {
        let (callback, events) = recording_callback();
        let mut bridge = InboundBridge::new(scenario_config())
            .unwrap()
            .with_event_callback(callback);
        assert_eq!(bridge.required_source_frames(), 3);

        bridge.handle_message(InboundFrame::pcm(vec![10, 20, 30, 40, 50]));
        assert_eq!(bridge.occupancy(), 5);
        assert_eq!(bridge.buffering_state(), BufferingState::Ready);

        let (result, out) = render_mono(&mut bridge, 3);
        assert_eq!(result, Ok(TickOutcome::Emitted { frames: 3 }));
        assert_eq!(out, vec![n(10), n(20), n(30)]);
        assert_eq!(bridge.occupancy(), 2);

        let (result, out) = render_mono(&mut bridge, 3);
        assert_eq!(result, Ok(TickOutcome::Underrun));
        assert_eq!(out, vec![0.0; 3]);
        assert_eq!(bridge.buffering_state(), BufferingState::Buffering);
        assert_eq!(bridge.occupancy(), 2);

        let events = events.lock().unwrap();
        assert!(events.contains(&BridgeEvent::GateChanged {
            from: BufferingState::Buffering,
            to: BufferingState::Ready,
        }));
        assert!(events.contains(&BridgeEvent::Underrun {
            required: 3,
            available: 2,
        }));
        assert!(events.contains(&BridgeEvent::GateChanged {
            from: BufferingState::Ready,
            to: BufferingState::Buffering,
        }));
    }

    #[test]
    fn test_buffering_emits_silence_without_reading() {
        let mut bridge = InboundBridge::new(scenario_config()).unwrap();
        bridge.write(&[1, 2, 3]);

        let (result, out) = render_mono(&mut bridge, 3);
        assert_eq!(result, Ok(TickOutcome::Buffering));
        assert_eq!(out, vec![0.0; 3]);
        assert_eq!(bridge.occupancy(), 3);
    }

    #[test]
    fn test_fans_out_to_every_channel() {
        let mut bridge = InboundBridge::new(InboundConfig {
            output_channels: 2,
            ..scenario_config()
        })
        .unwrap();
        bridge.write(&[100, 200, 300, 400]);

        let mut left = [9.0f32; 3];
        let mut right = [9.0f32; 3];
        bridge.render(&mut [&mut left[..], &mut right[..]]).unwrap();
        assert_eq!(left, [n(100), n(200), n(300)]);
        assert_eq!(left, right);
    }

    #[test]
    fn test_overflow_reports_and_keeps_head() {
        let (callback, events) = recording_callback();
        let mut bridge = InboundBridge::new(scenario_config())
            .unwrap()
            .with_event_callback(callback);

        let stored = bridge.write(&[1; 11]);
        assert_eq!(stored, 8);
        assert_eq!(bridge.occupancy(), 8);

        let stats = bridge.stats().stats();
        assert_eq!(stats.buffer_overflows, 1);
        assert_eq!(stats.dropped_samples, 3);
        assert!(events.lock().unwrap().contains(&BridgeEvent::BufferOverflow {
            dropped_samples: 3,
            dropped_ms: 0,
        }));
    }

    #[test]
    fn test_mute_discards_and_rejects() {
        let (callback, events) = recording_callback();
        let mut bridge = InboundBridge::new(scenario_config())
            .unwrap()
            .with_event_callback(callback);
        bridge.write(&[1, 2, 3, 4, 5]);
        assert_eq!(bridge.buffering_state(), BufferingState::Ready);

        bridge.handle_message(InboundFrame::control(ControlSignal::Mute));
        assert!(bridge.is_muted());
        assert_eq!(bridge.occupancy(), 0);
        assert_eq!(bridge.buffer().read_cursor(), 0);
        assert_eq!(bridge.buffer().write_cursor(), 0);
        assert_eq!(bridge.buffering_state(), BufferingState::Buffering);

        assert_eq!(bridge.write(&[7, 7, 7, 7, 7]), 0);
        assert_eq!(bridge.occupancy(), 0);
        assert_eq!(bridge.stats().stats().rejected_samples, 5);
        assert!(events
            .lock()
            .unwrap()
            .contains(&BridgeEvent::WriteRejected { samples: 5 }));

        let (result, _) = render_mono(&mut bridge, 3);
        assert_eq!(result, Ok(TickOutcome::Buffering));
    }

    #[test]
    fn test_unmute_waits_for_refill() {
        let mut bridge = InboundBridge::new(scenario_config()).unwrap();
        bridge.apply_control(ControlSignal::Mute);
        bridge.apply_control(ControlSignal::Unmute);
        assert!(!bridge.is_muted());
        assert_eq!(bridge.buffering_state(), BufferingState::Buffering);

        bridge.write(&[1, 2]);
        assert_eq!(bridge.buffering_state(), BufferingState::Buffering);
        bridge.write(&[3, 4]);
        assert_eq!(bridge.buffering_state(), BufferingState::Ready);
    }

    #[test]
    fn test_reset_keeps_mute_state() {
        let mut bridge = InboundBridge::new(scenario_config()).unwrap();
        bridge.write(&[1, 2, 3, 4, 5, 6]);
        render_mono(&mut bridge, 3).0.unwrap();

        bridge.handle_message(InboundFrame::control(ControlSignal::Reset));
        assert_eq!(bridge.occupancy(), 0);
        assert_eq!(bridge.buffer().read_cursor(), 0);
        assert_eq!(bridge.buffering_state(), BufferingState::Buffering);
        assert!(!bridge.is_muted());

        bridge.apply_control(ControlSignal::Mute);
        bridge.apply_control(ControlSignal::Reset);
        assert!(bridge.is_muted());
    }

    #[test]
    fn test_malformed_control_is_ignored() {
        let (callback, events) = recording_callback();
        let mut bridge = InboundBridge::new(scenario_config())
            .unwrap()
            .with_event_callback(callback);
        bridge.write(&[1, 2, 3]);

        bridge.handle_message(InboundFrame(vec![42]));
        assert_eq!(bridge.occupancy(), 3);
        assert_eq!(bridge.stats().stats().malformed_messages, 1);
        assert!(matches!(
            events.lock().unwrap().last(),
            Some(BridgeEvent::MalformedMessage { .. })
        ));
    }

    #[test]
    fn test_telemetry_only_when_audio_emitted() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut bridge = InboundBridge::new(scenario_config())
            .unwrap()
            .with_telemetry(tx);

        // Buffering tick
        render_mono(&mut bridge, 3).0.unwrap();
        assert!(rx.try_recv().is_err());

        bridge.write(&[1; 6]);
        render_mono(&mut bridge, 3).0.unwrap();
        match rx.try_recv().unwrap() {
            OutboundMessage::Telemetry { emitted_ms } => {
                assert!((emitted_ms - 0.125).abs() < 1e-9);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_full_telemetry_channel_drops_message() {
        let (tx, _rx) = mpsc::channel(1);
        let mut bridge = InboundBridge::new(scenario_config())
            .unwrap()
            .with_telemetry(tx);
        bridge.write(&[1; 8]);

        render_mono(&mut bridge, 3).0.unwrap();
        render_mono(&mut bridge, 3).0.unwrap();
        assert_eq!(bridge.stats().stats().dropped_messages, 1);
    }

    #[test]
    fn test_drain_partial_on_underrun() {
        let mut bridge = InboundBridge::new(InboundConfig {
            underrun_policy: UnderrunPolicy::DrainPartial,
            ..scenario_config()
        })
        .unwrap();
        bridge.write(&[1, 2, 3, 4, 5]);
        render_mono(&mut bridge, 3).0.unwrap();

        let (result, out) = render_mono(&mut bridge, 3);
        assert_eq!(result, Ok(TickOutcome::Underrun));
        assert_eq!(out, vec![n(4), n(5), 0.0]);
        assert_eq!(bridge.occupancy(), 0);
        assert_eq!(bridge.buffering_state(), BufferingState::Buffering);
    }

    #[test]
    fn test_partial_drain_reports_only_real_audio() {
        let (tx, mut rx) = mpsc::channel(8);
        let config = InboundConfig {
            underrun_policy: UnderrunPolicy::DrainPartial,
            output_channels: 1,
            ..upsampling_config()
        };
        let mut bridge = with_session(config, FixedSession { out: vec![0.5; 4] }).with_telemetry(tx);
        bridge.write(&[1, 2, 3]);

        let (result, _) = render_mono(&mut bridge, 4);
        assert_eq!(result, Ok(TickOutcome::Emitted { frames: 4 }));

        // One source sample left; the session still returns a padded block
        let (result, _) = render_mono(&mut bridge, 4);
        assert_eq!(result, Ok(TickOutcome::Underrun));
        assert_eq!(bridge.stats().stats().frames_emitted, 6);

        let mut emitted = Vec::new();
        while let Ok(OutboundMessage::Telemetry { emitted_ms }) = rx.try_recv() {
            emitted.push(emitted_ms);
        }
        assert_eq!(emitted.len(), 2);
        assert!((emitted[0] - 4.0 * 1000.0 / 48_000.0).abs() < 1e-9);
        assert!((emitted[1] - 2.0 * 1000.0 / 48_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_pending_converter_keeps_buffer() {
        let (callback, events) = recording_callback();
        let (bridge, _release) = pending(upsampling_config());
        let mut bridge = bridge.with_event_callback(callback);
        bridge.write(&[5; 6]);

        let mut left = [9.0f32; 4];
        let mut right = [9.0f32; 4];
        let result = bridge.render(&mut [&mut left[..], &mut right[..]]);
        assert_eq!(result, Ok(TickOutcome::ConverterNotReady));
        assert_eq!(left, [0.0; 4]);
        assert_eq!(bridge.occupancy(), 6);
        assert_eq!(bridge.stats().stats().not_ready_ticks, 1);
        assert!(events.lock().unwrap().contains(&BridgeEvent::ConverterNotReady {
            direction: Direction::Inbound,
        }));
    }

    #[test]
    fn test_pass_through_fallback() {
        let (bridge, _release) = pending(InboundConfig {
            fallback: FallbackPolicy::PassThrough,
            ..upsampling_config()
        });
        let mut bridge = bridge;
        bridge.write(&[100, 200, 300, 400, 500, 600]);

        let mut left = [9.0f32; 4];
        let mut right = [9.0f32; 4];
        let result = bridge.render(&mut [&mut left[..], &mut right[..]]);
        assert_eq!(result, Ok(TickOutcome::ConverterNotReady));
        assert_eq!(left, [n(100), n(200), n(300), n(400)]);
        assert_eq!(right, left);
        assert_eq!(bridge.occupancy(), 2);
    }

    #[test]
    fn test_converter_overflow_halts() {
        let mut bridge = with_session(upsampling_config(), FixedSession { out: vec![0.5; 5] });
        bridge.write(&[1; 4]);

        let mut left = [9.0f32; 4];
        let mut right = [9.0f32; 4];
        let result = bridge.render(&mut [&mut left[..], &mut right[..]]);
        assert_eq!(
            result,
            Err(BridgeError::ConverterOverflow {
                produced: 5,
                capacity: 4,
            })
        );
        assert_eq!(left, [0.0; 4]);
        assert!(bridge.is_halted());
        assert!(bridge.stats().is_halted());

        let result = bridge.render(&mut [&mut left[..], &mut right[..]]);
        assert_eq!(result, Err(BridgeError::Halted));
    }

    #[test]
    fn test_halted_bridge_ignores_messages() {
        let mut bridge = with_session(upsampling_config(), FixedSession { out: vec![0.5; 5] });
        bridge.write(&[1; 4]);

        let mut left = [9.0f32; 4];
        let mut right = [9.0f32; 4];
        assert!(bridge.render(&mut [&mut left[..], &mut right[..]]).is_err());
        let occupancy = bridge.occupancy();

        bridge.handle_message(InboundFrame::pcm(vec![7; 4]));
        bridge.handle_message(InboundFrame::control(ControlSignal::Reset));
        assert_eq!(bridge.write(&[7; 4]), 0);

        assert_eq!(bridge.occupancy(), occupancy);
        let stats = bridge.stats().stats();
        assert_eq!(stats.dropped_messages, 2);
        assert_eq!(stats.rejected_samples, 4);
    }

    #[test]
    fn test_converted_output_is_zero_padded() {
        let mut bridge = with_session(upsampling_config(), FixedSession { out: vec![0.5; 3] });
        bridge.write(&[1; 4]);

        let mut left = [9.0f32; 4];
        let mut right = [9.0f32; 4];
        let result = bridge.render(&mut [&mut left[..], &mut right[..]]);
        assert_eq!(result, Ok(TickOutcome::Emitted { frames: 3 }));
        assert_eq!(left, [0.5, 0.5, 0.5, 0.0]);
        assert_eq!(bridge.stats().stats().frames_emitted, 3);
    }

    #[test]
    fn test_conversion_failure_is_not_fatal() {
        let (callback, events) = recording_callback();
        let mut bridge =
            with_session(upsampling_config(), FailingSession).with_event_callback(callback);
        bridge.write(&[1; 4]);

        let mut left = [9.0f32; 4];
        let mut right = [9.0f32; 4];
        let result = bridge.render(&mut [&mut left[..], &mut right[..]]);
        assert_eq!(result, Ok(TickOutcome::ConverterFailed));
        assert_eq!(left, [0.0; 4]);
        assert!(!bridge.is_halted());
        assert!(events.lock().unwrap().iter().any(|e| matches!(
            e,
            BridgeEvent::ConverterFailed {
                direction: Direction::Inbound,
                ..
            }
        )));
    }

    #[test]
    fn test_mismatched_converter_block_is_rejected() {
        let config = upsampling_config();
        let spec = ConverterSpec::mono(24_000, 48_000, QualityProfile::Linear, 64);
        let converter = RateConverter::ready(spec, Box::new(FixedSession { out: vec![] }));
        assert!(matches!(
            InboundBridge::with_converter(config, converter),
            Err(BridgeError::InvalidConfig { field: "converter", .. })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = InboundConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(InboundBridge::new(config).is_err());
    }
}
