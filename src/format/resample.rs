//! Sample rate conversion.
//!
//! The conversion itself is delegated to a [`ConversionSession`], an opaque,
//! stateful handle that keeps filter history between calls. The default
//! session wraps a `rubato` resampler. [`RateConverter`] is the adapter the
//! bridges hold: it owns the session once it exists and reports "not ready"
//! until then.
//!
//! Sessions are built on a dedicated thread because sinc filter tables take a
//! while to compute. The render tick polls for completion without blocking.

use rubato::{
    FastFixedIn, PolynomialDegree, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tokio::sync::oneshot;

use crate::{BridgeError, QualityProfile};

/// Parameters a conversion session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConverterSpec {
    /// Interleaved channel count.
    pub channels: usize,
    /// Input rate in Hz.
    pub input_rate: u32,
    /// Output rate in Hz.
    pub output_rate: u32,
    /// Conversion quality.
    pub quality: QualityProfile,
    /// Frames per channel in each full input block.
    pub block_frames: usize,
}

impl ConverterSpec {
    /// Creates a mono spec.
    pub fn mono(
        input_rate: u32,
        output_rate: u32,
        quality: QualityProfile,
        block_frames: usize,
    ) -> Self {
        Self {
            channels: 1,
            input_rate,
            output_rate,
            quality,
            block_frames,
        }
    }

    /// Output rate divided by input rate.
    pub fn ratio(&self) -> f64 {
        f64::from(self.output_rate) / f64::from(self.input_rate)
    }
}

/// A stateful sample rate conversion capability.
///
/// Filter history persists across calls, so converting a stream block by
/// block yields the same signal as converting it in one piece. The number
/// of frames returned per call follows the rate ratio but may vary by a
/// frame or so between calls.
pub trait ConversionSession: Send {
    /// Converts one block of interleaved input and returns the interleaved
    /// output.
    ///
    /// `input` holds at most one block; a shorter block is zero-padded to a
    /// full block.
    fn process(&mut self, input: &[f32]) -> Result<&[f32], BridgeError>;

    /// Upper bound on the frames one call can return.
    fn max_output_frames(&self) -> usize;
}

enum Engine {
    Sinc(SincFixedIn<f32>),
    Polynomial(FastFixedIn<f32>),
}

/// [`ConversionSession`] backed by `rubato`'s fixed-input resamplers.
///
/// All buffers are allocated at construction, so `process` never allocates.
pub struct RubatoSession {
    engine: Engine,
    channels: usize,
    block_frames: usize,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
    interleaved: Vec<f32>,
}

impl RubatoSession {
    /// Builds the resampler and its buffers.
    pub fn new(spec: &ConverterSpec) -> Result<Self, BridgeError> {
        if spec.channels == 0 || spec.block_frames == 0 {
            return Err(BridgeError::ConverterConstruction {
                reason: "channels and block_frames must be non-zero".to_string(),
            });
        }
        if spec.input_rate == 0 || spec.output_rate == 0 {
            return Err(BridgeError::ConverterConstruction {
                reason: "sample rates must be non-zero".to_string(),
            });
        }

        let ratio = spec.ratio();
        let engine = match sinc_parameters(spec.quality) {
            Some(params) => Engine::Sinc(
                SincFixedIn::new(ratio, 1.1, params, spec.block_frames, spec.channels)
                    .map_err(construction_error)?,
            ),
            None => Engine::Polynomial(
                FastFixedIn::new(
                    ratio,
                    1.1,
                    polynomial_degree(spec.quality),
                    spec.block_frames,
                    spec.channels,
                )
                .map_err(construction_error)?,
            ),
        };

        let max_out = match &engine {
            Engine::Sinc(r) => r.output_frames_max(),
            Engine::Polynomial(r) => r.output_frames_max(),
        };

        tracing::info!(
            "RubatoSession created: {}Hz -> {}Hz, {}ch, quality={:?}, block={}, max_out={}",
            spec.input_rate,
            spec.output_rate,
            spec.channels,
            spec.quality,
            spec.block_frames,
            max_out
        );

        Ok(Self {
            engine,
            channels: spec.channels,
            block_frames: spec.block_frames,
            input: vec![vec![0.0; spec.block_frames]; spec.channels],
            output: vec![vec![0.0; max_out]; spec.channels],
            interleaved: Vec::with_capacity(max_out * spec.channels),
        })
    }
}

impl ConversionSession for RubatoSession {
    fn process(&mut self, input: &[f32]) -> Result<&[f32], BridgeError> {
        let frames = input.len() / self.channels;
        if frames > self.block_frames {
            return Err(BridgeError::ConverterFailure {
                reason: format!(
                    "block of {frames} frames exceeds the configured {}",
                    self.block_frames
                ),
            });
        }

        // Deinterleave into the planar input buffers
        for (i, frame) in input.chunks_exact(self.channels).enumerate() {
            for (ch, &sample) in frame.iter().enumerate() {
                self.input[ch][i] = sample;
            }
        }

        // A short block is the tail of a burst; pad it with silence
        if frames < self.block_frames {
            for channel in &mut self.input {
                channel[frames..].fill(0.0);
            }
        }

        let result = match &mut self.engine {
            Engine::Sinc(r) => {
                r.process_into_buffer(self.input.as_slice(), self.output.as_mut_slice(), None)
            }
            Engine::Polynomial(r) => {
                r.process_into_buffer(self.input.as_slice(), self.output.as_mut_slice(), None)
            }
        };

        let (_, written) = result.map_err(|e| BridgeError::ConverterFailure {
            reason: e.to_string(),
        })?;

        self.interleaved.clear();
        for i in 0..written {
            for channel in &self.output {
                self.interleaved.push(channel[i]);
            }
        }
        Ok(&self.interleaved)
    }

    fn max_output_frames(&self) -> usize {
        self.output.first().map_or(0, Vec::len)
    }
}

fn construction_error(e: impl std::fmt::Display) -> BridgeError {
    BridgeError::ConverterConstruction {
        reason: e.to_string(),
    }
}

fn sinc_parameters(quality: QualityProfile) -> Option<SincInterpolationParameters> {
    let (sinc_len, oversampling_factor, interpolation, window) = match quality {
        QualityProfile::SincBest => (
            256,
            256,
            SincInterpolationType::Cubic,
            WindowFunction::BlackmanHarris2,
        ),
        QualityProfile::SincMedium => (
            128,
            128,
            SincInterpolationType::Linear,
            WindowFunction::BlackmanHarris2,
        ),
        QualityProfile::SincFastest => (
            64,
            64,
            SincInterpolationType::Linear,
            WindowFunction::Hann2,
        ),
        QualityProfile::Linear | QualityProfile::ZeroOrderHold => return None,
    };
    Some(SincInterpolationParameters {
        sinc_len,
        f_cutoff: 0.95,
        oversampling_factor,
        interpolation,
        window,
    })
}

fn polynomial_degree(quality: QualityProfile) -> PolynomialDegree {
    match quality {
        QualityProfile::ZeroOrderHold => PolynomialDegree::Nearest,
        _ => PolynomialDegree::Linear,
    }
}

type SessionResult = Result<Box<dyn ConversionSession>, BridgeError>;

enum Readiness {
    Pending(oneshot::Receiver<SessionResult>),
    Ready(Box<dyn ConversionSession>),
    Failed,
}

/// Result of polling a [`RateConverter`] for its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConverterStatus {
    /// The session is usable.
    Ready,
    /// The session became usable during this poll.
    BecameReady,
    /// Initialization is still running.
    Pending,
    /// Initialization failed during this poll.
    BecameFailed(String),
    /// Initialization failed earlier; the converter will never be ready.
    Failed,
}

impl ConverterStatus {
    /// Returns `true` if the session can be used now.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready | Self::BecameReady)
    }
}

/// Adapter around an asynchronously created [`ConversionSession`].
///
/// The session slot starts empty and is filled exactly once, either by the
/// init thread started in [`RateConverter::spawn`] or by
/// [`RateConverter::ready`]. Every tick must handle the empty case.
pub struct RateConverter {
    spec: ConverterSpec,
    readiness: Readiness,
}

impl RateConverter {
    /// Starts building a [`RubatoSession`] on a dedicated thread.
    ///
    /// Returns immediately; poll with [`RateConverter::poll_ready`].
    pub fn spawn(spec: ConverterSpec) -> Self {
        Self::spawn_with(spec, |spec| {
            RubatoSession::new(&spec).map(|s| Box::new(s) as Box<dyn ConversionSession>)
        })
    }

    /// Starts building a session with a custom factory on a dedicated thread.
    pub fn spawn_with<F>(spec: ConverterSpec, factory: F) -> Self
    where
        F: FnOnce(ConverterSpec) -> SessionResult + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let spawned = std::thread::Builder::new()
            .name("rate-converter-init".into())
            .spawn(move || {
                // Receiver gone means the bridge was dropped first
                let _ = tx.send(factory(spec));
            });

        let readiness = match spawned {
            Ok(_) => Readiness::Pending(rx),
            Err(e) => {
                tracing::warn!("Failed to spawn rate converter init thread: {}", e);
                Readiness::Failed
            }
        };

        Self { spec, readiness }
    }

    /// Creates a converter whose session is already available.
    pub fn ready(spec: ConverterSpec, session: Box<dyn ConversionSession>) -> Self {
        Self {
            spec,
            readiness: Readiness::Ready(session),
        }
    }

    /// Returns the spec the session is bound to.
    pub fn spec(&self) -> &ConverterSpec {
        &self.spec
    }

    /// Checks for a completed session without blocking.
    pub fn poll_ready(&mut self) -> ConverterStatus {
        let outcome = match &mut self.readiness {
            Readiness::Ready(_) => return ConverterStatus::Ready,
            Readiness::Failed => return ConverterStatus::Failed,
            Readiness::Pending(rx) => match rx.try_recv() {
                Ok(result) => result,
                Err(oneshot::error::TryRecvError::Empty) => return ConverterStatus::Pending,
                Err(oneshot::error::TryRecvError::Closed) => Err(BridgeError::ConverterConstruction {
                    reason: "init thread exited without a session".to_string(),
                }),
            },
        };

        match outcome {
            Ok(session) => {
                self.readiness = Readiness::Ready(session);
                ConverterStatus::BecameReady
            }
            Err(e) => {
                self.readiness = Readiness::Failed;
                ConverterStatus::BecameFailed(e.to_string())
            }
        }
    }

    /// Returns the session if it is ready.
    pub fn session(&mut self) -> Option<&mut (dyn ConversionSession + 'static)> {
        match &mut self.readiness {
            Readiness::Ready(session) => Some(session.as_mut()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for RateConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.readiness {
            Readiness::Pending(_) => "pending",
            Readiness::Ready(_) => "ready",
            Readiness::Failed => "failed",
        };
        f.debug_struct("RateConverter")
            .field("spec", &self.spec)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_ready(converter: &mut RateConverter) -> ConverterStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = converter.poll_ready();
            if status != ConverterStatus::Pending || Instant::now() > deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_spec_ratio() {
        let spec = ConverterSpec::mono(24_000, 48_000, QualityProfile::SincBest, 64);
        assert_eq!(spec.ratio(), 2.0);
        assert_eq!(spec.channels, 1);
    }

    #[test]
    fn test_rubato_session_rejects_zero_block() {
        let spec = ConverterSpec::mono(24_000, 48_000, QualityProfile::Linear, 0);
        assert!(matches!(
            RubatoSession::new(&spec),
            Err(BridgeError::ConverterConstruction { .. })
        ));
    }

    #[test]
    fn test_upsample_output_length_tracks_ratio() {
        let spec = ConverterSpec::mono(24_000, 48_000, QualityProfile::SincFastest, 64);
        let mut session = RubatoSession::new(&spec).unwrap();
        let block = vec![0.25f32; 64];

        let mut total = 0;
        for _ in 0..20 {
            let max_output_frames = session.max_output_frames();
            let out = session.process(&block).unwrap();
            assert!(out.len() <= max_output_frames);
            total += out.len();
        }
        // 20 blocks * 64 frames * 2
        assert!((2500..=2580).contains(&total), "total = {total}");
    }

    #[test]
    fn test_downsample_polynomial() {
        let spec = ConverterSpec::mono(48_000, 24_000, QualityProfile::Linear, 128);
        let mut session = RubatoSession::new(&spec).unwrap();
        let block = vec![0.0f32; 128];
        let out = session.process(&block).unwrap();
        assert!(out.len() <= 66, "len = {}", out.len());
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_oversized_block_is_rejected() {
        let spec = ConverterSpec::mono(24_000, 48_000, QualityProfile::Linear, 4);
        let mut session = RubatoSession::new(&spec).unwrap();
        let err = session.process(&[0.0; 8]).unwrap_err();
        assert!(matches!(err, BridgeError::ConverterFailure { .. }));
    }

    #[test]
    fn test_partial_block() {
        let spec = ConverterSpec::mono(24_000, 48_000, QualityProfile::Linear, 64);
        let mut session = RubatoSession::new(&spec).unwrap();
        let out = session.process(&[0.5; 10]).unwrap();
        assert!(out.len() <= session.max_output_frames());
    }

    #[test]
    fn test_spawned_converter_becomes_ready() {
        let spec = ConverterSpec::mono(24_000, 44_100, QualityProfile::SincFastest, 69);
        let mut converter = RateConverter::spawn(spec);
        assert_eq!(wait_ready(&mut converter), ConverterStatus::BecameReady);
        assert_eq!(converter.poll_ready(), ConverterStatus::Ready);
        assert!(converter.session().is_some());
    }

    #[test]
    fn test_failed_factory_reports_once() {
        let spec = ConverterSpec::mono(24_000, 48_000, QualityProfile::SincBest, 64);
        let mut converter = RateConverter::spawn_with(spec, |_| {
            Err(BridgeError::ConverterConstruction {
                reason: "no backend".to_string(),
            })
        });
        let status = wait_ready(&mut converter);
        assert!(matches!(status, ConverterStatus::BecameFailed(ref r) if r.contains("no backend")));
        assert_eq!(converter.poll_ready(), ConverterStatus::Failed);
        assert!(converter.session().is_none());
    }

    #[test]
    fn test_pending_until_factory_returns() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let spec = ConverterSpec::mono(24_000, 48_000, QualityProfile::Linear, 64);
        let mut converter = RateConverter::spawn_with(spec, move |spec| {
            let _ = release_rx.recv();
            RubatoSession::new(&spec).map(|s| Box::new(s) as Box<dyn ConversionSession>)
        });

        assert_eq!(converter.poll_ready(), ConverterStatus::Pending);
        assert!(converter.session().is_none());

        release_tx.send(()).unwrap();
        assert!(wait_ready(&mut converter).is_ready());
    }
}
