//! HRIR set used by the binaural node.
//!
//! There is no measured dataset here; the set is synthesized from a
//! spherical-head model (interaural time and level difference, plus a
//! little head shadow on the far ear) on a 15 degree grid.

use std::f32::consts::FRAC_PI_4;

use glam::Vec3;
use hashbrown::HashMap;

use crate::error::{SoundError, SoundResult};

const AZIMUTH_STEP: i32 = 15;
const ELEVATION_STEP: i32 = 15;
const ELEVATION_MIN: i32 = -45;
const ELEVATION_MAX: i32 = 90;

const HEAD_RADIUS: f32 = 0.0875;
const SPEED_OF_SOUND: f32 = 343.0;
/// Width of the impulse in samples.
const SIGMA: f32 = 1.0;
/// Where the near-ear impulse peaks.
const ONSET: f32 = 4.0;

/// Index into the measurement grid: (azimuth step, elevation step).
pub(crate) type GridKey = (i32, i32);

/// Impulse responses for the left and right ear.
#[derive(Clone, Debug)]
pub(crate) struct HrirPair {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// Process-wide HRTF context, shared by every binaural node.
#[derive(Debug)]
pub struct HrtfContext {
    sample_rate: u32,
    filter_len: usize,
    grid: HashMap<GridKey, HrirPair>,
}

impl HrtfContext {
    /// Build the synthetic HRIR set for `sample_rate`.
    pub fn synthetic(sample_rate: u32) -> SoundResult<Self> {
        if sample_rate == 0 {
            return Err(SoundError::SpatializerUnavailable(
                "HRTF needs a non-zero sample rate".into(),
            ));
        }
        // Room for the largest interaural delay plus the impulse itself.
        let filter_len = ((0.0008 * sample_rate as f32) as usize + 16).next_power_of_two();

        let mut grid = HashMap::new();
        for az in (-180..180).step_by(AZIMUTH_STEP as usize) {
            for el in (ELEVATION_MIN..=ELEVATION_MAX).step_by(ELEVATION_STEP as usize) {
                let hrir = synthesize(az as f32, el as f32, sample_rate, filter_len);
                grid.insert((az / AZIMUTH_STEP, el / ELEVATION_STEP), hrir);
            }
        }

        tracing::info!(sample_rate, filter_len, points = grid.len(), "HRTF context created");
        Ok(Self {
            sample_rate,
            filter_len,
            grid,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of every impulse response, in samples.
    pub fn filter_len(&self) -> usize {
        self.filter_len
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// Nearest grid point for a direction in listener space.
    pub(crate) fn key_for(&self, direction: Vec3) -> GridKey {
        let (azimuth, elevation) = angles(direction);
        let half = 180 / AZIMUTH_STEP;
        let mut az = (azimuth / AZIMUTH_STEP as f32).round() as i32;
        if az >= half {
            az -= 2 * half;
        }
        let el = elevation.clamp(ELEVATION_MIN as f32, ELEVATION_MAX as f32);
        (az, (el / ELEVATION_STEP as f32).round() as i32)
    }

    pub(crate) fn hrir(&self, key: GridKey) -> Option<&HrirPair> {
        self.grid.get(&key)
    }
}

/// Azimuth (positive to the right) and elevation in degrees. Straight
/// ahead is -Z.
fn angles(direction: Vec3) -> (f32, f32) {
    let len = direction.length();
    if len == 0.0 {
        return (0.0, 0.0);
    }
    // Straight up or down has no meaningful azimuth.
    let horizontal = direction.x.hypot(direction.z);
    let azimuth = if horizontal <= len * 1e-6 {
        0.0
    } else {
        direction.x.atan2(-direction.z).to_degrees()
    };
    let elevation = (direction.y / len).clamp(-1.0, 1.0).asin().to_degrees();
    (azimuth, elevation)
}

fn synthesize(azimuth: f32, elevation: f32, sample_rate: u32, len: usize) -> HrirPair {
    let az = azimuth.to_radians();
    let el = elevation.to_radians();

    // Lateral angle folds sources behind the head onto the front.
    let lateral = (az.sin() * el.cos()).clamp(-1.0, 1.0).asin();
    let itd = HEAD_RADIUS / SPEED_OF_SOUND * (lateral.sin() + lateral).abs() * sample_rate as f32;

    let pan = lateral.sin();
    let left_gain = ((1.0 + pan) * FRAC_PI_4).cos();
    let right_gain = ((1.0 + pan) * FRAC_PI_4).sin();

    let (left_delay, right_delay) = if pan > 0.0 {
        (ONSET + itd, ONSET)
    } else {
        (ONSET, ONSET + itd)
    };

    let mut left = impulse(len, left_delay, left_gain);
    let mut right = impulse(len, right_delay, right_gain);

    // Head shadow on the far ear.
    let coeff = 1.0 - 0.5 * pan.abs();
    if pan > 0.0 {
        lowpass(&mut left, coeff);
    } else if pan < 0.0 {
        lowpass(&mut right, coeff);
    }

    HrirPair { left, right }
}

/// Gaussian impulse centred on `delay` whose taps sum to `gain`.
fn impulse(len: usize, delay: f32, gain: f32) -> Vec<f32> {
    let mut taps: Vec<f32> = (0..len)
        .map(|i| {
            let d = i as f32 - delay;
            (-d * d / (2.0 * SIGMA * SIGMA)).exp()
        })
        .collect();
    let sum: f32 = taps.iter().sum();
    if sum > 0.0 {
        taps.iter_mut().for_each(|t| *t *= gain / sum);
    }
    taps
}

fn lowpass(taps: &mut [f32], coeff: f32) {
    let mut state = 0.0;
    for t in taps.iter_mut() {
        state += (*t - state) * coeff;
        *t = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grid_covers_the_sphere() {
        let hrtf = HrtfContext::synthetic(48_000).unwrap();
        assert_eq!(hrtf.filter_len(), 64);
        // 24 azimuths x 10 elevations
        assert_eq!(hrtf.len(), 240);
        assert!(HrtfContext::synthetic(0).is_err());
    }

    #[test]
    fn directions_map_to_keys() {
        let hrtf = HrtfContext::synthetic(48_000).unwrap();
        assert_eq!(hrtf.key_for(Vec3::NEG_Z), (0, 0));
        assert_eq!(hrtf.key_for(Vec3::X), (6, 0));
        assert_eq!(hrtf.key_for(Vec3::NEG_X), (-6, 0));
        // Directly behind wraps onto -180.
        assert_eq!(hrtf.key_for(Vec3::Z), (-12, 0));
        assert_eq!(hrtf.key_for(Vec3::NEG_Y), (0, -3));
        assert_eq!(hrtf.key_for(Vec3::Y), (0, 6));
        assert!(hrtf.hrir(hrtf.key_for(Vec3::new(0.3, -0.2, 0.9))).is_some());
    }

    #[test]
    fn right_source_is_louder_on_the_right() {
        let hrtf = HrtfContext::synthetic(48_000).unwrap();
        let right = hrtf.hrir(hrtf.key_for(Vec3::X)).unwrap();
        let energy = |taps: &[f32]| taps.iter().sum::<f32>();
        assert!(energy(&right.right) > energy(&right.left));

        let front = hrtf.hrir(hrtf.key_for(Vec3::NEG_Z)).unwrap();
        assert_relative_eq!(energy(&front.left), energy(&front.right), epsilon = 1e-5);
    }
}
