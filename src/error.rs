//! Error types for voice-bridge.
//!
//! Errors are split into three categories:
//! - **Fatal errors** ([`BridgeError`]): Invalid construction or an invariant
//!   violation that halts a bridge instance
//! - **Transport errors** ([`TransportError`]): Recoverable failures delivering
//!   outbound messages, retried by the router
//! - **Frame errors** ([`FrameError`]): Malformed wire data, reported as
//!   events and otherwise ignored
//!
//! Everything else (overflow, underrun, converter not ready) is a runtime
//! event surfaced via [`EventCallback`](crate::EventCallback).

/// Fatal errors from constructing or running a bridge.
///
/// Only [`BridgeError::ConverterOverflow`] can occur on the render path. Once
/// returned, the instance is halted and every later tick yields
/// [`BridgeError::Halted`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The conversion session could not be created.
    #[error("rate converter construction failed: {reason}")]
    ConverterConstruction {
        /// Error reported by the conversion backend.
        reason: String,
    },

    /// The conversion session failed while processing a block.
    #[error("rate converter failed: {reason}")]
    ConverterFailure {
        /// Error reported by the conversion backend.
        reason: String,
    },

    /// The converter produced more frames than the destination can hold.
    #[error("converter produced {produced} frames for a {capacity}-frame destination")]
    ConverterOverflow {
        /// Frames produced by the converter.
        produced: usize,
        /// Frames available in the destination.
        capacity: usize,
    },

    /// The instance was halted by an earlier fatal error.
    #[error("bridge halted after a fatal error")]
    Halted,

    /// A processor with this name is already registered.
    #[error("duplicate processor name: {name}")]
    DuplicateProcessor {
        /// The duplicated name.
        name: String,
    },

    /// No processor is registered under this name.
    #[error("unknown processor: {name}")]
    UnknownProcessor {
        /// The name that wasn't found.
        name: String,
    },

    /// Delivery was started without any transports.
    #[error("no transports configured")]
    NoTransportsConfigured,

    /// The outbound receiver was already taken or handed to a router.
    #[error("outbound receiver already taken")]
    OutboundTaken,

    /// A transport failed to start.
    #[error("transport '{transport_name}' failed to start: {reason}")]
    TransportStartFailed {
        /// Name of the transport that failed.
        transport_name: String,
        /// Reason for the failure.
        reason: String,
    },
}

impl BridgeError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that halt a running instance.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConverterOverflow { .. } | Self::Halted)
    }
}

/// Errors that can occur within a [`Transport`](crate::Transport) implementation.
///
/// Transport errors are recoverable - the router will emit a
/// [`BridgeEvent::TransportError`] and may retry the operation.
///
/// [`BridgeEvent::TransportError`]: crate::BridgeEvent::TransportError
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A send operation failed.
    #[error("send failed: {reason}")]
    SendFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// The receiving channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Custom error for user-implemented transports.
    #[error("{0}")]
    Custom(String),
}

impl TransportError {
    /// Creates a custom transport error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a send failed error with the given reason.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed {
            reason: reason.into(),
        }
    }
}

/// Malformed data on one of the message channels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A single-element frame carried an unknown control code.
    #[error("unknown control code: {code}")]
    UnknownControl {
        /// The code that was received.
        code: i16,
    },

    /// A PCM16 payload had an odd number of bytes.
    #[error("PCM16 payload has odd length: {len} bytes")]
    OddLength {
        /// Length of the payload in bytes.
        len: usize,
    },

    /// The frame was empty.
    #[error("empty frame")]
    Empty,

    /// An uplink frame started with an unknown type byte.
    #[error("unknown uplink frame type: {kind}")]
    UnknownKind {
        /// The type byte that was received.
        kind: u8,
    },

    /// An uplink frame was shorter than its header requires.
    #[error("truncated uplink frame: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum length for this frame type.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::ConverterOverflow {
            produced: 130,
            capacity: 128,
        };
        assert_eq!(
            err.to_string(),
            "converter produced 130 frames for a 128-frame destination"
        );
    }

    #[test]
    fn test_invalid_config_helper() {
        let err = BridgeError::invalid_config("capacity", "must be non-zero");
        assert_eq!(
            err.to_string(),
            "invalid configuration: capacity - must be non-zero"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::Halted.is_fatal());
        assert!(BridgeError::ConverterOverflow {
            produced: 2,
            capacity: 1
        }
        .is_fatal());
        assert!(!BridgeError::ConverterFailure {
            reason: "x".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_transport_error_custom() {
        let err = TransportError::custom("socket reset");
        assert_eq!(err.to_string(), "socket reset");
    }

    #[test]
    fn test_transport_error_send_failed() {
        let err = TransportError::send_failed("buffer full");
        assert_eq!(err.to_string(), "send failed: buffer full");
    }

    #[test]
    fn test_frame_error_display() {
        assert_eq!(
            FrameError::OddLength { len: 3 }.to_string(),
            "PCM16 payload has odd length: 3 bytes"
        );
        assert_eq!(
            FrameError::UnknownControl { code: 7 }.to_string(),
            "unknown control code: 7"
        );
    }
}
