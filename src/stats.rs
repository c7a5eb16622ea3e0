//! Per-bridge counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of a bridge's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Render ticks served.
    pub ticks: u64,
    /// Frames of converted audio emitted (per channel).
    pub frames_emitted: u64,
    /// Ticks that found too few buffered samples.
    pub underruns: u64,
    /// Chunks that did not fit in the sample buffer.
    pub buffer_overflows: u64,
    /// Samples dropped by buffer overflows.
    pub dropped_samples: u64,
    /// Samples discarded because the gate was muted.
    pub rejected_samples: u64,
    /// Ticks served while the converter was still initializing.
    pub not_ready_ticks: u64,
    /// Inbound messages that could not be decoded.
    pub malformed_messages: u64,
    /// Outbound messages dropped because the channel was full.
    pub dropped_messages: u64,
    /// Whether the bridge halted after a fatal error.
    pub halted: bool,
}

/// Counters shared between a bridge and its observers.
#[derive(Debug, Default)]
pub(crate) struct BridgeState {
    pub ticks: AtomicU64,
    pub frames_emitted: AtomicU64,
    pub underruns: AtomicU64,
    pub buffer_overflows: AtomicU64,
    pub dropped_samples: AtomicU64,
    pub rejected_samples: AtomicU64,
    pub not_ready_ticks: AtomicU64,
    pub malformed_messages: AtomicU64,
    pub dropped_messages: AtomicU64,
    pub halted: AtomicBool,
}

impl BridgeState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
            rejected_samples: self.rejected_samples.load(Ordering::Relaxed),
            not_ready_ticks: self.not_ready_ticks.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            halted: self.halted.load(Ordering::SeqCst),
        }
    }
}

/// Read-only handle to a bridge's counters.
///
/// Cheap to clone; stays valid after the bridge is moved into a
/// [`RenderHost`](crate::RenderHost).
#[derive(Debug, Clone)]
pub struct StatsHandle {
    state: Arc<BridgeState>,
}

impl StatsHandle {
    pub(crate) fn new(state: Arc<BridgeState>) -> Self {
        Self { state }
    }

    /// Returns current counters.
    pub fn stats(&self) -> BridgeStats {
        self.state.snapshot()
    }

    /// Returns `true` if the bridge halted after a fatal error.
    pub fn is_halted(&self) -> bool {
        self.state.halted.load(Ordering::SeqCst)
    }
}
