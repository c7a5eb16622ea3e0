//! Audio format conversion utilities.
//!
//! This module provides utilities for converting between audio formats:
//! - Sample normalization and quantization (i16 ↔ f32)
//! - Little-endian PCM16 framing and mono fan-out
//! - Sample rate conversion through an asynchronously built session

mod convert;
mod resample;

pub use convert::{
    decode_pcm16_le, encode_pcm16_le, fan_out, normalize, quantize, silence, write_pcm16_le,
};
pub use resample::{ConversionSession, ConverterSpec, ConverterStatus, RateConverter, RubatoSession};
