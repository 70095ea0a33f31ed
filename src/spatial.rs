//! Distance attenuation, cones, panning and doppler.
//!
//! These are deliberately simple reference curves; they exist so that the
//! 3D parameters on a [`Mixer`](crate::Mixer) have an audible effect.

use glam::Vec3;

use crate::listener::{find_closest, Cone, Listener};

/// Speed of sound in m/s used for doppler.
pub const SPEED_OF_SOUND: f32 = 343.3;

/// How gain falls off with distance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AttenuationModel {
    None,
    #[default]
    Inverse,
    Linear,
    Exponential,
}

/// Whether a position is in world space or relative to the listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Positioning {
    #[default]
    Absolute,
    Relative,
}

/// How the pan value is applied to stereo content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PanMode {
    /// Attenuate the opposite side only.
    #[default]
    Balance,
    /// Move the opposite side's signal over.
    Pan,
}

/// The 3D parameter block carried by every mixer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialParams {
    pub enabled: bool,
    pub pinned_listener: Option<usize>,
    pub position: Vec3,
    pub direction: Vec3,
    pub velocity: Vec3,
    pub attenuation_model: AttenuationModel,
    pub positioning: Positioning,
    pub rolloff: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub cone: Cone,
    pub doppler_factor: f32,
    pub directional_attenuation_factor: f32,
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            enabled: true,
            pinned_listener: None,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            velocity: Vec3::ZERO,
            attenuation_model: AttenuationModel::Inverse,
            positioning: Positioning::Absolute,
            rolloff: 1.0,
            min_gain: 0.0,
            max_gain: 1.0,
            min_distance: 1.0,
            max_distance: f32::MAX,
            cone: Cone::new(std::f32::consts::TAU, std::f32::consts::TAU, 0.0),
            doppler_factor: 1.0,
            directional_attenuation_factor: 1.0,
        }
    }
}

/// What the spatializer decided for one block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialResult {
    pub gain: f32,
    /// -1 is hard left, +1 hard right.
    pub pan: f32,
    /// Playback-rate multiplier from doppler shift.
    pub doppler_pitch: f32,
}

impl SpatialResult {
    pub const UNITY: SpatialResult = SpatialResult {
        gain: 1.0,
        pan: 0.0,
        doppler_pitch: 1.0,
    };
}

impl SpatialParams {
    /// The listener this mixer is rendered for: the pinned one when valid,
    /// otherwise the closest enabled one.
    pub fn listener_index(&self, listeners: &[Listener]) -> Option<usize> {
        match self.pinned_listener {
            Some(i) if i < listeners.len() => Some(i),
            _ => find_closest(listeners, self.position),
        }
    }

    /// Vector from the sound to its listener, in world space.
    pub fn direction_to_listener(&self, listeners: &[Listener]) -> Vec3 {
        let Some(listener) = self.listener_index(listeners).map(|i| &listeners[i]) else {
            return Vec3::ZERO;
        };
        match self.positioning {
            Positioning::Absolute => (listener.position - self.position).normalize_or_zero(),
            Positioning::Relative => (-self.position).normalize_or_zero(),
        }
    }

    pub fn evaluate(&self, listeners: &[Listener]) -> SpatialResult {
        if !self.enabled {
            return SpatialResult::UNITY;
        }
        let Some(listener) = self.listener_index(listeners).map(|i| &listeners[i]) else {
            return SpatialResult::UNITY;
        };

        // Everything below is in listener space: +X right, -Z ahead.
        let (local, facing, source_velocity, listener_velocity) = match self.positioning {
            Positioning::Absolute => {
                let to_local = |v: Vec3| listener.to_local(listener.position + v);
                (
                    listener.to_local(self.position),
                    to_local(self.direction),
                    to_local(self.velocity),
                    to_local(listener.velocity),
                )
            }
            Positioning::Relative => (self.position, self.direction, self.velocity, Vec3::ZERO),
        };

        let distance = local.length();
        let mut gain = attenuation(
            self.attenuation_model,
            distance,
            self.min_distance,
            self.max_distance,
            self.rolloff,
        );

        if distance > 0.0 {
            let towards_listener = -local / distance;
            let source_cone = self.cone.gain(facing.normalize_or_zero(), towards_listener);
            let listener_cone = listener.cone.gain(Vec3::NEG_Z, local / distance);
            let cone = source_cone * listener_cone;
            gain *= 1.0 + (cone - 1.0) * self.directional_attenuation_factor;
        }
        // max/min rather than clamp: either bound may be NaN.
        gain = gain.max(self.min_gain).min(self.max_gain.max(self.min_gain));

        let pan = if distance > 0.0 {
            (local.x / distance).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        let doppler_pitch = if self.doppler_factor > 0.0 {
            doppler_pitch(
                -local,
                source_velocity,
                listener_velocity,
                SPEED_OF_SOUND,
                self.doppler_factor,
            )
        } else {
            1.0
        };

        SpatialResult {
            gain,
            pan,
            doppler_pitch,
        }
    }
}

/// Gain for a sound `distance` away from the listener.
pub fn attenuation(
    model: AttenuationModel,
    distance: f32,
    min_distance: f32,
    max_distance: f32,
    rolloff: f32,
) -> f32 {
    if model == AttenuationModel::None
        || min_distance.is_nan()
        || max_distance.is_nan()
        || min_distance >= max_distance
    {
        return 1.0;
    }
    let d = distance.max(min_distance).min(max_distance);
    match model {
        AttenuationModel::None => 1.0,
        AttenuationModel::Inverse => {
            min_distance / (min_distance + rolloff * (d - min_distance))
        }
        AttenuationModel::Linear => {
            1.0 - rolloff * (d - min_distance) / (max_distance - min_distance)
        }
        AttenuationModel::Exponential => {
            if min_distance <= 0.0 {
                1.0
            } else {
                (d / min_distance).powf(-rolloff)
            }
        }
    }
}

/// Pitch multiplier given the vector from the source to the listener.
pub fn doppler_pitch(
    to_listener: Vec3,
    source_velocity: Vec3,
    listener_velocity: Vec3,
    speed_of_sound: f32,
    factor: f32,
) -> f32 {
    let len = to_listener.length();
    if len == 0.0 {
        return 1.0;
    }
    let limit = speed_of_sound / factor;
    let vls = (to_listener.dot(listener_velocity) / len).min(limit);
    let vss = (to_listener.dot(source_velocity) / len).min(limit);
    let denom = speed_of_sound - factor * vss;
    if denom <= 0.0 {
        return 1.0;
    }
    (speed_of_sound - factor * vls) / denom
}

/// Left/right gains for a stereo balance of `pan`.
pub fn balance_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    if pan < 0.0 {
        (1.0, 1.0 + pan)
    } else {
        (1.0 - pan, 1.0)
    }
}

/// Apply `pan` to one stereo frame.
pub fn pan_frame(mode: PanMode, pan: f32, left: f32, right: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    match mode {
        PanMode::Balance => {
            let (l, r) = balance_gains(pan);
            (left * l, right * r)
        }
        PanMode::Pan => {
            if pan > 0.0 {
                let keep = 1.0 - pan;
                (left * keep, right + left * pan)
            } else if pan < 0.0 {
                let keep = 1.0 + pan;
                (left + right * -pan, right * keep)
            } else {
                (left, right)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn attenuation_models() {
        assert_relative_eq!(attenuation(AttenuationModel::Inverse, 0.5, 1.0, 100.0, 1.0), 1.0);
        assert_relative_eq!(attenuation(AttenuationModel::Inverse, 2.0, 1.0, 100.0, 1.0), 0.5);
        assert_relative_eq!(attenuation(AttenuationModel::Linear, 50.5, 1.0, 100.0, 1.0), 0.5);
        assert_relative_eq!(attenuation(AttenuationModel::Exponential, 4.0, 1.0, 100.0, 1.0), 0.25);
        assert_relative_eq!(attenuation(AttenuationModel::None, 40.0, 1.0, 100.0, 1.0), 1.0);
        // Degenerate range disables attenuation.
        assert_relative_eq!(attenuation(AttenuationModel::Inverse, 40.0, 5.0, 5.0, 1.0), 1.0);
        assert_relative_eq!(attenuation(AttenuationModel::Inverse, 4.0, f32::NAN, 9.0, 1.0), 1.0);
        assert_relative_eq!(attenuation(AttenuationModel::Linear, 4.0, 1.0, f32::NAN, 1.0), 1.0);
    }

    #[test]
    fn nan_gain_bounds_do_not_panic() {
        let params = SpatialParams {
            position: Vec3::new(2.0, 0.0, 0.0),
            min_gain: f32::NAN,
            max_gain: f32::NAN,
            ..SpatialParams::default()
        };
        assert_relative_eq!(params.evaluate(&[Listener::default()]).gain, 0.5);
    }

    #[test]
    fn approaching_source_is_pitched_up() {
        // Source 10 m ahead, moving toward the listener.
        let to_listener = Vec3::new(0.0, 0.0, 10.0);
        let toward = Vec3::new(0.0, 0.0, 10.0);
        assert!(doppler_pitch(to_listener, toward, Vec3::ZERO, SPEED_OF_SOUND, 1.0) > 1.0);
        assert!(doppler_pitch(to_listener, -toward, Vec3::ZERO, SPEED_OF_SOUND, 1.0) < 1.0);
        assert_relative_eq!(doppler_pitch(Vec3::ZERO, toward, Vec3::ZERO, SPEED_OF_SOUND, 1.0), 1.0);
    }

    #[test]
    fn source_on_the_right_pans_right() {
        let params = SpatialParams {
            position: Vec3::new(2.0, 0.0, 0.0),
            ..SpatialParams::default()
        };
        let result = params.evaluate(&[Listener::default()]);
        assert_relative_eq!(result.pan, 1.0);
        assert_relative_eq!(result.gain, 0.5);
    }

    #[test]
    fn disabled_or_listenerless_is_unity() {
        let params = SpatialParams {
            enabled: false,
            position: Vec3::new(30.0, 0.0, 0.0),
            ..SpatialParams::default()
        };
        assert_eq!(params.evaluate(&[Listener::default()]), SpatialResult::UNITY);
        assert_eq!(SpatialParams::default().evaluate(&[]), SpatialResult::UNITY);
    }

    #[test]
    fn pinned_listener_wins_when_valid() {
        let mut listeners = vec![Listener::default(); 2];
        listeners[1].position = Vec3::new(100.0, 0.0, 0.0);
        let mut params = SpatialParams::default();
        assert_eq!(params.listener_index(&listeners), Some(0));

        params.pinned_listener = Some(1);
        assert_eq!(params.listener_index(&listeners), Some(1));
        assert_relative_eq!(params.direction_to_listener(&listeners).x, 1.0);

        params.pinned_listener = Some(7);
        assert_eq!(params.listener_index(&listeners), Some(0));
    }

    #[test]
    fn pan_modes() {
        assert_eq!(pan_frame(PanMode::Balance, -0.5, 1.0, 1.0), (1.0, 0.5));
        assert_eq!(pan_frame(PanMode::Pan, 1.0, 1.0, 0.0), (0.0, 1.0));
        assert_eq!(pan_frame(PanMode::Pan, 0.0, 0.3, 0.7), (0.3, 0.7));
    }
}
