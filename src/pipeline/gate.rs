//! Buffering/playback hysteresis.

/// Whether the inbound bridge is filling up or playing back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferingState {
    /// Waiting for occupancy to reach the high-water mark. Ticks emit silence.
    #[default]
    Buffering,
    /// Playing back buffered audio.
    Ready,
}

impl std::fmt::Display for BufferingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffering => f.write_str("buffering"),
            Self::Ready => f.write_str("ready"),
        }
    }
}

/// A state change reported by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change.
    pub from: BufferingState,
    /// State after the change.
    pub to: BufferingState,
}

/// Hysteresis gate over sample buffer occupancy.
///
/// The gate opens once occupancy reaches the high-water mark and closes only
/// on an actual underrun. There is no low-water mark: once playing, the
/// buffer may drain arbitrarily low.
///
/// A separate mute flag decides whether inbound writes are accepted at all.
/// The owning bridge resets the sample buffer when it mutes.
#[derive(Debug, Clone)]
pub struct BufferingGate {
    state: BufferingState,
    high_water_mark: usize,
    muted: bool,
}

impl BufferingGate {
    /// Creates a gate in the [`BufferingState::Buffering`] state, unmuted.
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            state: BufferingState::Buffering,
            high_water_mark,
            muted: false,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> BufferingState {
        self.state
    }

    /// Returns the occupancy that opens the gate.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Returns `true` if playback is open.
    pub fn is_ready(&self) -> bool {
        self.state == BufferingState::Ready
    }

    /// Returns `true` while inbound writes are rejected.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Opens the gate if buffering and `occupancy` reached the high-water mark.
    pub fn observe(&mut self, occupancy: usize) -> Option<Transition> {
        if self.state == BufferingState::Buffering && occupancy >= self.high_water_mark {
            return self.set(BufferingState::Ready);
        }
        None
    }

    /// Records an underrun, closing the gate.
    pub fn underrun(&mut self) -> Option<Transition> {
        self.set(BufferingState::Buffering)
    }

    /// Returns to buffering without reporting an underrun.
    pub fn rearm(&mut self) -> Option<Transition> {
        self.set(BufferingState::Buffering)
    }

    /// Starts rejecting writes and returns to buffering.
    pub fn mute(&mut self) -> Option<Transition> {
        self.muted = true;
        self.set(BufferingState::Buffering)
    }

    /// Accepts writes again.
    ///
    /// The state is left alone: playback resumes only after the buffer
    /// refills to the high-water mark.
    pub fn unmute(&mut self) {
        self.muted = false;
    }

    fn set(&mut self, to: BufferingState) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        self.state = to;
        Some(Transition { from, to })
    }
}
