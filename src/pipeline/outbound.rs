//! Capture-to-network bridge.
//!
//! Each tick takes one quantum of captured mono audio, converts it to the
//! network rate if needed, quantizes it to little-endian PCM16 and posts the
//! payload as a single [`OutboundMessage::Pcm`].

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::format::{encode_pcm16_le, ConverterSpec, ConverterStatus, RateConverter};
use crate::processor::{RenderProcessor, TickOutcome};
use crate::stats::{BridgeState, StatsHandle};
use crate::{
    BridgeError, BridgeEvent, Direction, EventCallback, FallbackPolicy, OutboundConfig,
    OutboundMessage,
};

/// Turns pull-based captured audio into push-delivered PCM messages.
///
/// Payloads are freshly allocated per tick and moved into the channel, so
/// nothing on this side touches them afterwards.
///
/// # Example
///
/// ```
/// use tokio::sync::mpsc;
/// use voice_bridge::{OutboundBridge, OutboundConfig, OutboundMessage};
///
/// let (tx, mut rx) = mpsc::channel(8);
/// let config = OutboundConfig {
///     capture_rate: 24_000,
///     target_rate: 24_000,
///     quantum: 2,
///     ..Default::default()
/// };
/// let mut bridge = OutboundBridge::new(config, tx).unwrap();
///
/// bridge.render(&[1.0, -1.0]).unwrap();
/// match rx.try_recv().unwrap() {
///     OutboundMessage::Pcm(bytes) => assert_eq!(&bytes[..], &[0xff, 0x7f, 0x00, 0x80]),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub struct OutboundBridge {
    config: OutboundConfig,
    /// `None` when capture and target rates match.
    converter: Option<RateConverter>,
    tx: mpsc::Sender<OutboundMessage>,
    event_callback: Option<EventCallback>,
    state: Arc<BridgeState>,
}

impl OutboundBridge {
    /// Creates a bridge, starting converter initialization if the rates differ.
    pub fn new(
        config: OutboundConfig,
        tx: mpsc::Sender<OutboundMessage>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let converter = config.needs_conversion().then(|| {
            RateConverter::spawn(ConverterSpec::mono(
                config.capture_rate,
                config.target_rate,
                config.quality,
                config.quantum,
            ))
        });
        Ok(Self::build(config, converter, tx))
    }

    /// Creates a bridge around an existing converter.
    ///
    /// The converter's block size must equal the quantum.
    pub fn with_converter(
        config: OutboundConfig,
        converter: RateConverter,
        tx: mpsc::Sender<OutboundMessage>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        if converter.spec().block_frames != config.quantum {
            return Err(BridgeError::invalid_config(
                "converter",
                format!(
                    "block of {} frames does not match the {}-frame quantum",
                    converter.spec().block_frames,
                    config.quantum
                ),
            ));
        }
        Ok(Self::build(config, Some(converter), tx))
    }

    fn build(
        config: OutboundConfig,
        converter: Option<RateConverter>,
        tx: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        tracing::info!(
            "OutboundBridge created: {}Hz -> {}Hz, quantum={}, conversion={}",
            config.capture_rate,
            config.target_rate,
            config.quantum,
            converter.is_some()
        );
        Self {
            config,
            converter,
            tx,
            event_callback: None,
            state: BridgeState::new(),
        }
    }

    /// Sets the event callback.
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Returns the configuration the bridge was built with.
    pub fn config(&self) -> &OutboundConfig {
        &self.config
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

    /// Encodes and posts one quantum of captured audio.
    ///
    /// Input beyond the configured quantum is ignored. Empty input posts
    /// nothing.
    pub fn render(&mut self, input: &[f32]) -> Result<TickOutcome, BridgeError> {
        BridgeState::incr(&self.state.ticks);
        let input = &input[..input.len().min(self.config.quantum)];
        if input.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        if !self.converter_ready() {
            return Ok(self.fallback(input));
        }

        let converted = match self.converter.as_mut().and_then(RateConverter::session) {
            None => input,
            Some(session) => match session.process(input) {
                Ok(converted) => converted,
                Err(e) => {
                    let reason = e.to_string();
                    tracing::warn!(%reason, "Outbound conversion failed, dropping quantum");
                    self.emit_event(BridgeEvent::ConverterFailed {
                        direction: Direction::Outbound,
                        reason,
                    });
                    return Ok(TickOutcome::ConverterFailed);
                }
            },
        };

        let frames = converted.len();
        let payload = encode_pcm16_le(converted);
        self.post(payload);
        BridgeState::add(&self.state.frames_emitted, frames as u64);
        Ok(TickOutcome::Emitted { frames })
    }

    fn converter_ready(&mut self) -> bool {
        let status = match self.converter.as_mut() {
            None => return true,
            Some(converter) => converter.poll_ready(),
        };

        match status {
            ConverterStatus::Ready => true,
            ConverterStatus::BecameReady => {
                tracing::info!("Outbound rate converter ready");
                self.emit_event(BridgeEvent::ConverterReady {
                    direction: Direction::Outbound,
                });
                true
            }
            ConverterStatus::BecameFailed(reason) => {
                tracing::warn!(%reason, "Outbound rate converter failed to initialize");
                self.emit_event(BridgeEvent::ConverterFailed {
                    direction: Direction::Outbound,
                    reason,
                });
                false
            }
            ConverterStatus::Pending | ConverterStatus::Failed => false,
        }
    }

    fn fallback(&mut self, input: &[f32]) -> TickOutcome {
        BridgeState::incr(&self.state.not_ready_ticks);
        tracing::debug!(policy = ?self.config.fallback, "Outbound converter not ready");
        self.emit_event(BridgeEvent::ConverterNotReady {
            direction: Direction::Outbound,
        });

        match self.config.fallback {
            FallbackPolicy::Skip => {}
            FallbackPolicy::Silence => {
                let frames = self.config.expected_output_frames();
                self.post(vec![0u8; frames * 2].into());
            }
            FallbackPolicy::PassThrough => self.post(encode_pcm16_le(input)),
        }
        TickOutcome::ConverterNotReady
    }

    fn post(&self, payload: bytes::Bytes) {
        if let Err(e) = self.tx.try_send(OutboundMessage::Pcm(payload)) {
            BridgeState::incr(&self.state.dropped_messages);
            tracing::debug!(error = %e, "Dropping outbound PCM");
            self.emit_event(BridgeEvent::MessageDropped {
                direction: Direction::Outbound,
            });
        }
    }
}

impl RenderProcessor for OutboundBridge {
    fn process(
        &mut self,
        inputs: &[&[f32]],
        _outputs: &mut [&mut [f32]],
    ) -> Result<TickOutcome, BridgeError> {
        match inputs.first() {
            Some(input) => self.render(input),
            None => Ok(TickOutcome::Idle),
        }
    }
}

impl std::fmt::Debug for OutboundBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundBridge")
            .field("config", &self.config)
            .field("converter", &self.converter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ConversionSession;
    use crate::QualityProfile;
    use bytes::Bytes;

    fn bypass_config() -> OutboundConfig {
        OutboundConfig {
            capture_rate: 24_000,
            target_rate: 24_000,
            quantum: 4,
            ..Default::default()
        }
    }

    fn downsampling_config(fallback: FallbackPolicy) -> OutboundConfig {
        OutboundConfig {
            capture_rate: 48_000,
            target_rate: 24_000,
            quantum: 4,
            quality: QualityProfile::Linear,
            fallback,
        }
    }

    fn pending(
        config: OutboundConfig,
        tx: mpsc::Sender<OutboundMessage>,
    ) -> (OutboundBridge, std::sync::mpsc::Sender<()>) {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let spec = ConverterSpec::mono(
            config.capture_rate,
            config.target_rate,
            config.quality,
            config.quantum,
        );
        let converter = RateConverter::spawn_with(spec, move |_| {
            let _ = release_rx.recv();
            Err(BridgeError::ConverterConstruction {
                reason: "released".to_string(),
            })
        });
        (
            OutboundBridge::with_converter(config, converter, tx).unwrap(),
            release_tx,
        )
    }

    /// Keeps every other sample.
    struct Decimate {
        out: Vec<f32>,
    }

    impl ConversionSession for Decimate {
        fn process(&mut self, input: &[f32]) -> Result<&[f32], BridgeError> {
            self.out.clear();
            self.out.extend(input.iter().step_by(2));
            Ok(&self.out)
        }

        fn max_output_frames(&self) -> usize {
            2
        }
    }

    fn pcm(msg: OutboundMessage) -> Bytes {
        match msg {
            OutboundMessage::Pcm(bytes) => bytes,
            other => panic!("expected PCM, got {other:?}"),
        }
    }

    #[test]
    fn test_quantizes_little_endian() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut bridge = OutboundBridge::new(bypass_config(), tx).unwrap();

        let outcome = bridge.render(&[1.0, -1.0, 0.5, 2.0]).unwrap();
        assert_eq!(outcome, TickOutcome::Emitted { frames: 4 });

        let bytes = pcm(rx.try_recv().unwrap());
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![i16::MAX, i16::MIN, 16383, i16::MAX]);
    }

    #[test]
    fn test_one_message_per_tick() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut bridge = OutboundBridge::new(bypass_config(), tx).unwrap();
        bridge.render(&[0.0; 4]).unwrap();
        bridge.render(&[0.0; 4]).unwrap();

        assert_eq!(pcm(rx.try_recv().unwrap()).len(), 8);
        assert_eq!(pcm(rx.try_recv().unwrap()).len(), 8);
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.stats().stats().frames_emitted, 8);
    }

    #[test]
    fn test_input_clipped_to_quantum() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut bridge = OutboundBridge::new(bypass_config(), tx).unwrap();
        bridge.render(&[0.1; 10]).unwrap();
        assert_eq!(pcm(rx.try_recv().unwrap()).len(), 8);
    }

    #[test]
    fn test_empty_input_is_idle() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut bridge = OutboundBridge::new(bypass_config(), tx).unwrap();
        assert_eq!(bridge.render(&[]).unwrap(), TickOutcome::Idle);
        assert_eq!(bridge.process(&[], &mut []).unwrap(), TickOutcome::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_converts_before_quantizing() {
        let (tx, mut rx) = mpsc::channel(4);
        let config = downsampling_config(FallbackPolicy::Skip);
        let spec = ConverterSpec::mono(48_000, 24_000, QualityProfile::Linear, 4);
        let converter = RateConverter::ready(spec, Box::new(Decimate { out: Vec::new() }));
        let mut bridge = OutboundBridge::with_converter(config, converter, tx).unwrap();

        let outcome = bridge.render(&[1.0, 0.0, -1.0, 0.0]).unwrap();
        assert_eq!(outcome, TickOutcome::Emitted { frames: 2 });
        assert_eq!(&pcm(rx.try_recv().unwrap())[..], &[0xff, 0x7f, 0x00, 0x80]);
    }

    #[test]
    fn test_skip_fallback_posts_nothing() {
        let (tx, mut rx) = mpsc::channel(4);
        let (mut bridge, _release) = pending(downsampling_config(FallbackPolicy::Skip), tx);

        let outcome = bridge.render(&[0.5; 4]).unwrap();
        assert_eq!(outcome, TickOutcome::ConverterNotReady);
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.stats().stats().not_ready_ticks, 1);
    }

    #[test]
    fn test_silence_fallback_posts_expected_length() {
        let (tx, mut rx) = mpsc::channel(4);
        let (mut bridge, _release) = pending(downsampling_config(FallbackPolicy::Silence), tx);

        bridge.render(&[0.5; 4]).unwrap();
        let bytes = pcm(rx.try_recv().unwrap());
        assert_eq!(bytes.len(), 4);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pass_through_fallback_posts_raw_quantum() {
        let (tx, mut rx) = mpsc::channel(4);
        let (mut bridge, _release) =
            pending(downsampling_config(FallbackPolicy::PassThrough), tx);

        bridge.render(&[1.0; 4]).unwrap();
        let bytes = pcm(rx.try_recv().unwrap());
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..2], &[0xff, 0x7f]);
    }

    #[test]
    fn test_full_channel_drops_message() {
        let (tx, _rx) = mpsc::channel(1);
        let mut bridge = OutboundBridge::new(bypass_config(), tx).unwrap();
        bridge.render(&[0.0; 4]).unwrap();
        bridge.render(&[0.0; 4]).unwrap();
        assert_eq!(bridge.stats().stats().dropped_messages, 1);
    }

    #[test]
    fn test_closed_channel_is_not_fatal() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut bridge = OutboundBridge::new(bypass_config(), tx).unwrap();
        assert!(bridge.render(&[0.0; 4]).is_ok());
    }
}
