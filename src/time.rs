//! Frames vs. milliseconds.
//!
//! Every duration-taking call in the crate comes in three forms: one that
//! follows the engine's [`TimeUnit`], one in PCM frames and one in
//! milliseconds. The unit-following form reads the engine's unit once and
//! forwards to exactly one of the explicit forms.

use std::sync::atomic::{AtomicU8, Ordering};

/// Unit used by the unit-following duration calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TimeUnit {
    /// Durations are PCM frames at the engine sample rate.
    Frames,
    /// Durations are milliseconds.
    #[default]
    Milliseconds,
}

impl TimeUnit {
    /// Convert `value`, expressed in this unit, to frames.
    pub fn to_frames(self, value: u64, sample_rate: u32) -> u64 {
        match self {
            TimeUnit::Frames => value,
            TimeUnit::Milliseconds => millis_to_frames(value, sample_rate),
        }
    }

    /// Express `frames` in this unit.
    pub fn from_frames(self, frames: u64, sample_rate: u32) -> u64 {
        match self {
            TimeUnit::Frames => frames,
            TimeUnit::Milliseconds => frames_to_millis(frames, sample_rate),
        }
    }
}

/// `frames * 1000 / sample_rate`, truncated. Zero when the rate is unknown.
pub fn frames_to_millis(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    saturate(u128::from(frames) * 1000 / u128::from(sample_rate))
}

/// `millis * sample_rate / 1000`, truncated and saturating at `u64::MAX`.
pub fn millis_to_frames(millis: u64, sample_rate: u32) -> u64 {
    saturate(u128::from(millis) * u128::from(sample_rate) / 1000)
}

fn saturate(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Atomic holder for the engine-wide unit so it can be read from any thread.
#[derive(Debug)]
pub(crate) struct AtomicTimeUnit(AtomicU8);

impl AtomicTimeUnit {
    pub(crate) fn new(unit: TimeUnit) -> Self {
        Self(AtomicU8::new(Self::encode(unit)))
    }

    pub(crate) fn load(&self) -> TimeUnit {
        match self.0.load(Ordering::Relaxed) {
            0 => TimeUnit::Frames,
            _ => TimeUnit::Milliseconds,
        }
    }

    pub(crate) fn store(&self, unit: TimeUnit) {
        self.0.store(Self::encode(unit), Ordering::Relaxed);
    }

    fn encode(unit: TimeUnit) -> u8 {
        match unit {
            TimeUnit::Frames => 0,
            TimeUnit::Milliseconds => 1,
        }
    }
}
