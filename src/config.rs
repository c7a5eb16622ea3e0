//! Configuration types for the inbound and outbound bridges.

use std::time::Duration;

use crate::BridgeError;

/// Conversion quality requested from the rate converter.
///
/// The sinc profiles trade CPU for stop-band attenuation; the polynomial
/// profiles are cheap but alias audibly on large ratio changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityProfile {
    /// Long sinc filter with cubic interpolation of the filter table.
    #[default]
    SincBest,
    /// Medium sinc filter with linear interpolation.
    SincMedium,
    /// Short sinc filter, lowest latency of the sinc profiles.
    SincFastest,
    /// Linear interpolation between neighbouring samples.
    Linear,
    /// Nearest-sample selection.
    ZeroOrderHold,
}

/// What an inbound tick emits when the buffer cannot satisfy it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderrunPolicy {
    /// Emit a full quantum of silence and keep the buffered samples.
    #[default]
    Silence,
    /// Drain and convert whatever is buffered, padding the rest with silence.
    DrainPartial,
}

/// What a bridge does on a tick where its converter is not ready yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Emit silence.
    Silence,
    /// Forward unconverted samples.
    PassThrough,
    /// Emit nothing for this tick.
    Skip,
}

/// Configuration for the network-to-renderer direction.
///
/// The defaults match a 24 kHz mono speech stream rendered at 48 kHz in
/// 128-frame quanta.
///
/// # Example
///
/// ```
/// use voice_bridge::InboundConfig;
///
/// let config = InboundConfig {
///     render_rate: 44_100,
///     ..Default::default()
/// };
/// assert_eq!(config.required_source_frames(), 69);
/// ```
#[derive(Debug, Clone)]
pub struct InboundConfig {
    /// Rate of the incoming PCM stream in Hz.
    /// Default: 24000
    pub source_rate: u32,

    /// Rate of the renderer in Hz.
    /// Default: 48000
    pub render_rate: u32,

    /// Frames the renderer pulls per tick.
    /// Default: 128
    pub quantum: usize,

    /// Number of output channels the mono stream is fanned out to.
    /// Default: 2
    pub output_channels: usize,

    /// Sample buffer capacity in samples.
    ///
    /// Must exceed the largest expected chunk. If a chunk doesn't fit, its
    /// tail is dropped and a [`BridgeEvent::BufferOverflow`] is emitted.
    /// Default: 32768 (about 1.4 s at 24 kHz)
    ///
    /// [`BridgeEvent::BufferOverflow`]: crate::BridgeEvent::BufferOverflow
    pub capacity: usize,

    /// Occupancy at which buffering switches to playback.
    /// Default: 4096
    pub high_water_mark: usize,

    /// Conversion quality for the source-to-render converter.
    pub quality: QualityProfile,

    /// What to emit when the buffer runs short.
    pub underrun_policy: UnderrunPolicy,

    /// What to emit while the converter is initializing.
    /// Default: [`FallbackPolicy::Silence`]
    pub fallback: FallbackPolicy,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            source_rate: 24_000,
            render_rate: 48_000,
            quantum: 128,
            output_channels: 2,
            capacity: 1 << 15,
            high_water_mark: 1 << 12,
            quality: QualityProfile::default(),
            underrun_policy: UnderrunPolicy::default(),
            fallback: FallbackPolicy::Silence,
        }
    }
}

impl InboundConfig {
    /// Source frames consumed per tick: `floor(quantum * source_rate / render_rate)`.
    #[must_use]
    pub fn required_source_frames(&self) -> usize {
        if self.render_rate == 0 {
            return 0;
        }
        (self.quantum as u64 * u64::from(self.source_rate) / u64::from(self.render_rate)) as usize
    }

    /// Returns `true` if the stream needs rate conversion.
    #[must_use]
    pub fn needs_conversion(&self) -> bool {
        self.source_rate != self.render_rate
    }

    /// Duration of audio the buffer can hold.
    #[must_use]
    pub fn capacity_duration(&self) -> Duration {
        if self.source_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.capacity as f64 / f64::from(self.source_rate))
    }

    /// Checks that every field is in range.
    pub fn validate(&self) -> Result<(), BridgeError> {
        validate_rate("source_rate", self.source_rate)?;
        validate_rate("render_rate", self.render_rate)?;
        if self.quantum == 0 {
            return Err(BridgeError::invalid_config("quantum", "must be non-zero"));
        }
        if self.output_channels == 0 {
            return Err(BridgeError::invalid_config(
                "output_channels",
                "must be non-zero",
            ));
        }
        if self.capacity == 0 {
            return Err(BridgeError::invalid_config("capacity", "must be non-zero"));
        }
        if self.high_water_mark == 0 || self.high_water_mark > self.capacity {
            return Err(BridgeError::invalid_config(
                "high_water_mark",
                format!("must be in 1..={}", self.capacity),
            ));
        }
        let required = self.required_source_frames();
        if required == 0 {
            return Err(BridgeError::invalid_config(
                "quantum",
                "too small to consume any source frames per tick",
            ));
        }
        if required > self.capacity {
            return Err(BridgeError::invalid_config(
                "capacity",
                format!("must hold at least one tick ({required} samples)"),
            ));
        }
        Ok(())
    }
}

/// Configuration for the capture-to-network direction.
#[derive(Debug, Clone)]
pub struct OutboundConfig {
    /// Rate of the captured audio in Hz.
    /// Default: 48000
    pub capture_rate: u32,

    /// Rate of the PCM stream sent to the network in Hz.
    /// Default: 24000
    pub target_rate: u32,

    /// Frames captured per tick.
    /// Default: 128
    pub quantum: usize,

    /// Conversion quality for the capture-to-target converter.
    pub quality: QualityProfile,

    /// What to emit while the converter is initializing.
    /// Default: [`FallbackPolicy::Skip`]
    pub fallback: FallbackPolicy,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            capture_rate: 48_000,
            target_rate: 24_000,
            quantum: 128,
            quality: QualityProfile::default(),
            fallback: FallbackPolicy::Skip,
        }
    }
}

impl OutboundConfig {
    /// Returns `true` if captured audio needs rate conversion.
    #[must_use]
    pub fn needs_conversion(&self) -> bool {
        self.capture_rate != self.target_rate
    }

    /// Nominal frames produced per tick: `floor(quantum * target_rate / capture_rate)`.
    #[must_use]
    pub fn expected_output_frames(&self) -> usize {
        if self.capture_rate == 0 {
            return 0;
        }
        (self.quantum as u64 * u64::from(self.target_rate) / u64::from(self.capture_rate)) as usize
    }

    /// Checks that every field is in range.
    pub fn validate(&self) -> Result<(), BridgeError> {
        validate_rate("capture_rate", self.capture_rate)?;
        validate_rate("target_rate", self.target_rate)?;
        if self.quantum == 0 {
            return Err(BridgeError::invalid_config("quantum", "must be non-zero"));
        }
        Ok(())
    }
}

/// Configuration for the outbound transport router.
///
/// Every transport gets its own queue, so a slow transport drops its own
/// messages instead of holding up the others.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Number of attempts for a failed PCM send. Telemetry is sent once.
    ///
    /// Default: 3
    pub retry_attempts: u32,

    /// Delay between attempts.
    ///
    /// Default: 5ms
    pub retry_delay: Duration,

    /// Age after which PCM is no longer worth sending, measured from the
    /// moment the router picked it up.
    ///
    /// Default: 60ms
    pub stale_after: Duration,

    /// Messages each transport's queue holds before new ones are dropped.
    ///
    /// Default: 32
    pub lane_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay: Duration::from_millis(5),
            stale_after: Duration::from_millis(60),
            lane_capacity: 32,
        }
    }
}

impl DeliveryConfig {
    /// Checks that attempts and queue sizes are usable.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.retry_attempts == 0 {
            return Err(BridgeError::invalid_config(
                "retry_attempts",
                "must be at least 1",
            ));
        }
        if self.lane_capacity == 0 {
            return Err(BridgeError::invalid_config(
                "lane_capacity",
                "must be non-zero",
            ));
        }
        Ok(())
    }
}

fn validate_rate(field: &'static str, rate: u32) -> Result<(), BridgeError> {
    if rate == 0 {
        return Err(BridgeError::invalid_config(field, "sample rate must be non-zero"));
    }
    Ok(())
}
