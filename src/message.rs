//! Messages exchanged with the bridges.
//!
//! Inbound, the delivery channel carries [`InboundFrame`]s: a single-element
//! frame is a control signal, anything else is PCM. Outbound, the bridges
//! post [`OutboundMessage`]s, and PCM leaving the process is wrapped in an
//! [`UplinkFrame`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::{AudioChunk, FrameError};

/// Out-of-band control signal for the inbound bridge.
///
/// MUTE and UNMUTE bracket an external speech interval: MUTE discards queued
/// audio and rejects writes until UNMUTE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Accept writes again (speech stopped).
    Unmute,
    /// Reject writes and discard buffered audio (speech started).
    Mute,
    /// Discard buffered audio without changing the mute state.
    Reset,
}

impl ControlSignal {
    /// Wire code of this signal.
    pub fn code(self) -> i16 {
        match self {
            Self::Unmute => 0,
            Self::Mute => 1,
            Self::Reset => 2,
        }
    }

    /// Looks up a signal by wire code.
    pub fn from_code(code: i16) -> Result<Self, FrameError> {
        match code {
            0 => Ok(Self::Unmute),
            1 => Ok(Self::Mute),
            2 => Ok(Self::Reset),
            code => Err(FrameError::UnknownControl { code }),
        }
    }
}

impl std::fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmute => f.write_str("unmute"),
            Self::Mute => f.write_str("mute"),
            Self::Reset => f.write_str("reset"),
        }
    }
}

/// A raw frame from the inbound delivery channel.
///
/// The channel is untyped: a frame of exactly one element is a control
/// code, every other length is PCM. A genuine one-sample PCM chunk cannot be
/// expressed on this channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame(pub Vec<i16>);

impl InboundFrame {
    /// Builds a control frame.
    pub fn control(signal: ControlSignal) -> Self {
        Self(vec![signal.code()])
    }

    /// Builds a PCM frame.
    pub fn pcm(samples: Vec<i16>) -> Self {
        Self(samples)
    }

    /// Decodes a little-endian PCM16 payload.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        crate::format::decode_pcm16_le(bytes).map(Self)
    }

    /// Classifies the frame.
    ///
    /// PCM is tagged with `source_rate`, the only rate the channel carries.
    pub fn decode(self, source_rate: u32) -> Result<InboundMessage, FrameError> {
        match self.0.as_slice() {
            [code] => ControlSignal::from_code(*code).map(InboundMessage::Control),
            _ => Ok(InboundMessage::Pcm(AudioChunk::new(self.0, source_rate))),
        }
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Control signal.
    Control(ControlSignal),
    /// Audio to buffer.
    Pcm(AudioChunk),
}

/// A message posted by a bridge during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Milliseconds of converted audio an inbound tick emitted.
    Telemetry {
        /// Duration of emitted audio in milliseconds.
        emitted_ms: f64,
    },
    /// One tick of captured audio as little-endian PCM16.
    Pcm(Bytes),
}

impl OutboundMessage {
    /// Returns `true` for captured audio.
    pub fn is_pcm(&self) -> bool {
        matches!(self, Self::Pcm(_))
    }

    /// Wraps PCM for the uplink. Telemetry stays local and yields `None`.
    pub fn to_uplink(&self) -> Option<UplinkFrame> {
        match self {
            Self::Pcm(payload) => Some(UplinkFrame::Audio(payload.clone())),
            Self::Telemetry { .. } => None,
        }
    }
}

const SPEECH_STARTED: u8 = 0;
const SPEECH_ENDED: u8 = 1;
const AUDIO: u8 = 2;

/// A client-to-server frame on the uplink.
///
/// Layout is a type byte followed by the payload:
///
/// | type | payload |
/// |------|---------|
/// | 0    | u32 LE, end of audio sent so far in ms |
/// | 1    | none |
/// | 2    | PCM16 LE samples |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkFrame {
    /// Local speech began.
    SpeechStarted {
        /// Milliseconds of audio played back when speech began.
        audio_end_ms: u32,
    },
    /// Local speech ended.
    SpeechEnded,
    /// Captured audio.
    Audio(Bytes),
}

impl UplinkFrame {
    /// Serializes the frame.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::SpeechStarted { audio_end_ms } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u8(SPEECH_STARTED);
                buf.put_u32_le(*audio_end_ms);
                buf.freeze()
            }
            Self::SpeechEnded => Bytes::from_static(&[SPEECH_ENDED]),
            Self::Audio(payload) => {
                let mut buf = BytesMut::with_capacity(1 + payload.len());
                buf.put_u8(AUDIO);
                buf.put_slice(payload);
                buf.freeze()
            }
        }
    }

    /// Parses a frame.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let (&kind, payload) = frame.split_first().ok_or(FrameError::Empty)?;
        match kind {
            SPEECH_STARTED => {
                let raw: [u8; 4] = payload
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(FrameError::Truncated {
                        expected: 5,
                        actual: frame.len(),
                    })?;
                Ok(Self::SpeechStarted {
                    audio_end_ms: u32::from_le_bytes(raw),
                })
            }
            SPEECH_ENDED => Ok(Self::SpeechEnded),
            AUDIO => {
                if payload.len() % 2 != 0 {
                    return Err(FrameError::OddLength { len: payload.len() });
                }
                Ok(Self::Audio(Bytes::copy_from_slice(payload)))
            }
            kind => Err(FrameError::UnknownKind { kind }),
        }
    }
}
