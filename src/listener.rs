//! Listeners: the ears that spatialized sounds are rendered for.

use std::f32::consts::TAU;

use glam::Vec3;

/// Upper bound on listeners per engine.
pub const MAX_LISTENERS: usize = 4;

/// A sound cone, angles in radians.
///
/// Inside `inner_angle` gain is unity, outside `outer_angle` it is
/// `outer_gain`, and it is interpolated in between. The `Default` value is
/// all zeros, which is what invalid lookups return.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Cone {
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub outer_gain: f32,
}

impl Cone {
    /// A cone that does not attenuate in any direction.
    pub const OMNI: Cone = Cone {
        inner_angle: TAU,
        outer_angle: TAU,
        outer_gain: 1.0,
    };

    pub fn new(inner_angle: f32, outer_angle: f32, outer_gain: f32) -> Self {
        Self {
            inner_angle,
            outer_angle,
            outer_gain,
        }
    }

    pub(crate) fn is_omni(&self) -> bool {
        self.inner_angle >= TAU
    }

    /// Gain for a source whose facing is `facing` heard from `towards`.
    ///
    /// Both vectors are expected to be normalized.
    pub fn gain(&self, facing: Vec3, towards: Vec3) -> f32 {
        if self.is_omni() {
            return 1.0;
        }
        let cutoff_inner = (self.inner_angle * 0.5).cos();
        let cutoff_outer = (self.outer_angle * 0.5).cos();
        let d = facing.dot(towards);

        if d > cutoff_inner {
            1.0
        } else if d > cutoff_outer && cutoff_inner > cutoff_outer {
            let t = (d - cutoff_outer) / (cutoff_inner - cutoff_outer);
            self.outer_gain + (1.0 - self.outer_gain) * t
        } else {
            self.outer_gain
        }
    }
}

/// Position and orientation of one listener.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Listener {
    pub position: Vec3,
    pub direction: Vec3,
    pub velocity: Vec3,
    pub world_up: Vec3,
    pub cone: Cone,
    pub enabled: bool,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            velocity: Vec3::ZERO,
            world_up: Vec3::Y,
            cone: Cone::OMNI,
            enabled: true,
        }
    }
}

impl Listener {
    /// Normalized facing direction, falling back to -Z.
    pub fn forward(&self) -> Vec3 {
        let f = self.direction.normalize_or_zero();
        if f == Vec3::ZERO {
            Vec3::NEG_Z
        } else {
            f
        }
    }

    /// Unit vector pointing to the listener's right.
    pub fn right(&self) -> Vec3 {
        let r = self.forward().cross(self.world_up).normalize_or_zero();
        if r == Vec3::ZERO {
            Vec3::X
        } else {
            r
        }
    }

    /// Express a world-space point in listener space (+X right, +Y up, -Z ahead).
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        let rel = point - self.position;
        let forward = self.forward();
        let right = self.right();
        let up = right.cross(forward);
        Vec3::new(rel.dot(right), rel.dot(up), -rel.dot(forward))
    }
}

/// Index of the enabled listener closest to `position`.
pub fn find_closest(listeners: &[Listener], position: Vec3) -> Option<usize> {
    listeners
        .iter()
        .enumerate()
        .filter(|(_, l)| l.enabled)
        .min_by(|(_, a), (_, b)| {
            a.position
                .distance_squared(position)
                .total_cmp(&b.position.distance_squared(position))
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_listener_frame() {
        let l = Listener::default();
        assert_eq!(l.right(), Vec3::X);
        let local = l.to_local(Vec3::new(2.0, 0.0, -3.0));
        assert_relative_eq!(local.x, 2.0);
        assert_relative_eq!(local.z, -3.0);
    }

    #[test]
    fn turned_listener() {
        let l = Listener {
            direction: Vec3::X,
            ..Listener::default()
        };
        // Facing +X, a point at +X is straight ahead.
        let local = l.to_local(Vec3::new(5.0, 0.0, 0.0));
        assert_relative_eq!(local.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(local.z, -5.0, epsilon = 1e-6);
    }

    #[test]
    fn closest_skips_disabled() {
        let mut listeners = vec![Listener::default(); 3];
        listeners[1].position = Vec3::new(10.0, 0.0, 0.0);
        listeners[2].position = Vec3::new(9.0, 0.0, 0.0);
        assert_eq!(find_closest(&listeners, Vec3::new(10.0, 0.0, 0.0)), Some(1));

        listeners[1].enabled = false;
        assert_eq!(find_closest(&listeners, Vec3::new(10.0, 0.0, 0.0)), Some(2));

        for l in listeners.iter_mut() {
            l.enabled = false;
        }
        assert_eq!(find_closest(&listeners, Vec3::ZERO), None);
    }

    #[test]
    fn cone_interpolates() {
        let cone = Cone::new(std::f32::consts::FRAC_PI_2, std::f32::consts::PI, 0.25);
        assert_relative_eq!(cone.gain(Vec3::NEG_Z, Vec3::NEG_Z), 1.0);
        assert_relative_eq!(cone.gain(Vec3::NEG_Z, Vec3::Z), 0.25);
        let mid = cone.gain(Vec3::NEG_Z, Vec3::new(1.0, 0.0, -1.0).normalize());
        assert!(mid > 0.25 && mid <= 1.0);
        assert_relative_eq!(Cone::OMNI.gain(Vec3::X, Vec3::NEG_X), 1.0);
    }
}
