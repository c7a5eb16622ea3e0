//! Sample normalization, quantization and PCM16 framing.

use bytes::Bytes;

use crate::FrameError;

/// Magnitude of the most negative 16-bit sample.
const NEGATIVE_FULL_SCALE: f32 = 32768.0;

/// Magnitude of the most positive 16-bit sample.
const POSITIVE_FULL_SCALE: f32 = 32767.0;

/// Converts an i16 sample to a normalized f32 in [-1.0, 1.0).
#[inline]
pub fn normalize(sample: i16) -> f32 {
    f32::from(sample) / NEGATIVE_FULL_SCALE
}

/// Converts a normalized f32 sample to i16.
///
/// Values outside [-1.0, 1.0] are clamped first. Negative values scale by
/// 32768 and non-negative values by 32767, so both extremes of the i16 range
/// are reachable. The fractional part is truncated toward zero.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * NEGATIVE_FULL_SCALE) as i16
    } else {
        (s * POSITIVE_FULL_SCALE) as i16
    }
}

/// Quantizes samples and appends them to `out` as little-endian PCM16.
pub fn write_pcm16_le(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&quantize(s).to_le_bytes());
    }
}

/// Quantizes samples into a freshly allocated little-endian PCM16 payload.
///
/// The returned [`Bytes`] owns its storage, so it can be handed to a
/// channel without further copies.
pub fn encode_pcm16_le(samples: &[f32]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * 2);
    write_pcm16_le(samples, &mut out);
    Bytes::from(out)
}

/// Decodes a little-endian PCM16 payload.
pub fn decode_pcm16_le(bytes: &[u8]) -> Result<Vec<i16>, FrameError> {
    if bytes.len() % 2 != 0 {
        return Err(FrameError::OddLength { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Copies mono samples into every output channel.
///
/// Frames past the end of `mono` are left untouched.
pub fn fan_out(mono: &[f32], outputs: &mut [&mut [f32]]) {
    for channel in outputs.iter_mut() {
        let n = mono.len().min(channel.len());
        channel[..n].copy_from_slice(&mono[..n]);
    }
}

/// Zeroes every output channel.
pub fn silence(outputs: &mut [&mut [f32]]) {
    for channel in outputs.iter_mut() {
        channel.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_extremes() {
        assert_eq!(quantize(1.0), i16::MAX);
        assert_eq!(quantize(-1.0), i16::MIN);
        assert_eq!(quantize(0.0), 0);
    }

    #[test]
    fn test_quantize_half_scale_truncates() {
        // 0.5 * 32767 = 16383.5
        assert_eq!(quantize(0.5), 16383);
        assert_eq!(quantize(-0.5), -16384);
    }

    #[test]
    fn test_quantize_clamps() {
        assert_eq!(quantize(2.0), i16::MAX);
        assert_eq!(quantize(-7.5), i16::MIN);
        assert_eq!(quantize(f32::INFINITY), i16::MAX);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(0), 0.0);
        assert_eq!(normalize(i16::MIN), -1.0);
        assert_eq!(normalize(16384), 0.5);
        assert!((normalize(i16::MAX) - 0.999_97).abs() < 1e-4);
    }

    #[test]
    fn test_encode_pcm16_le_layout() {
        let bytes = encode_pcm16_le(&[1.0, -1.0, 0.0]);
        assert_eq!(&bytes[..], &[0xff, 0x7f, 0x00, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_decode_pcm16_le() {
        let samples = decode_pcm16_le(&[0xff, 0x7f, 0x00, 0x80]).unwrap();
        assert_eq!(samples, vec![i16::MAX, i16::MIN]);
        assert!(decode_pcm16_le(&[]).unwrap().is_empty());
        assert_eq!(
            decode_pcm16_le(&[1]),
            Err(FrameError::OddLength { len: 1 })
        );
    }

    #[test]
    fn test_fan_out() {
        let mut left = [9.0f32; 4];
        let mut right = [9.0f32; 4];
        {
            let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];
            fan_out(&[0.1, 0.2], &mut outputs);
        }
        assert_eq!(left, [0.1, 0.2, 9.0, 9.0]);
        assert_eq!(right, [0.1, 0.2, 9.0, 9.0]);
    }

    #[test]
    fn test_silence() {
        let mut left = [0.5f32; 3];
        {
            let mut outputs: [&mut [f32]; 1] = [&mut left];
            silence(&mut outputs);
        }
        assert_eq!(left, [0.0; 3]);
    }
}
