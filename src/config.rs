//! Engine configuration.

use crate::listener::MAX_LISTENERS;
use crate::node::BLOCK_FRAMES;
use crate::time::TimeUnit;

/// How an [`Engine`](crate::Engine) is set up.
///
/// ```
/// use klangraum::{EngineConfig, TimeUnit};
///
/// let config = EngineConfig::default()
///     .with_channels(2)
///     .with_sample_rate(44_100)
///     .with_time_unit(TimeUnit::Frames)
///     .without_device();
/// assert_eq!(config.sample_rate, Some(44_100));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Output channel count of the endpoint and of every mixer.
    pub channels: u32,
    /// `None` uses the device's preferred rate, or 48 kHz without a device.
    pub sample_rate: Option<u32>,
    /// Number of listeners, clamped to `1..=MAX_LISTENERS`.
    pub listener_count: usize,
    /// Unit used by the unit-following duration calls.
    pub time_unit: TimeUnit,
    /// Do not open an output device; drive the graph with `read`.
    pub no_device: bool,
    /// Open the device but leave it stopped.
    pub no_auto_start: bool,
    /// Preferred device callback size in frames.
    pub period_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: None,
            listener_count: 1,
            time_unit: TimeUnit::Milliseconds,
            no_device: false,
            no_auto_start: false,
            period_frames: BLOCK_FRAMES,
        }
    }
}

impl EngineConfig {
    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_listener_count(mut self, count: usize) -> Self {
        self.listener_count = count;
        self
    }

    pub fn with_time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = unit;
        self
    }

    pub fn without_device(mut self) -> Self {
        self.no_device = true;
        self
    }

    pub fn without_auto_start(mut self) -> Self {
        self.no_auto_start = true;
        self
    }

    pub fn with_period_frames(mut self, frames: usize) -> Self {
        self.period_frames = frames;
        self
    }

    pub(crate) fn listeners(&self) -> usize {
        self.listener_count.clamp(1, MAX_LISTENERS)
    }
}
