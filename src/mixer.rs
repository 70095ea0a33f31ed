//! Group mixer with volume, pan, pitch, 3D parameters, fades and scheduling.

use std::sync::Arc;

use glam::Vec3;

use crate::engine::EngineShared;
use crate::handle::{GraphNode, NodeHandle};
use crate::listener::Cone;
use crate::node::NodeState;
use crate::nodes::sound_node::SoundNode;
use crate::spatial::{AttenuationModel, PanMode, Positioning};
use crate::time::{frames_to_millis, millis_to_frames, TimeUnit};

/// A value a spatial setter will store. NaN is ignored.
trait SpatialValue: Copy {
    fn is_usable(&self) -> bool {
        true
    }
}

impl SpatialValue for f32 {
    fn is_usable(&self) -> bool {
        !self.is_nan()
    }
}

impl SpatialValue for Vec3 {
    fn is_usable(&self) -> bool {
        !self.is_nan()
    }
}

impl SpatialValue for Cone {
    fn is_usable(&self) -> bool {
        !(self.inner_angle.is_nan() || self.outer_angle.is_nan() || self.outer_gain.is_nan())
    }
}

impl SpatialValue for bool {}
impl SpatialValue for Option<usize> {}
impl SpatialValue for AttenuationModel {}
impl SpatialValue for Positioning {}

/// Generates a setter/getter pair for a field of the node's spatial block.
macro_rules! spatial_param {
    ($($(#[$meta:meta])* $set:ident, $get:ident, $field:ident: $ty:ty = $absent:expr;)*) => {
        $(
            $(#[$meta])*
            pub fn $set(&self, value: $ty) {
                if !value.is_usable() {
                    tracing::debug!(setter = stringify!($set), "ignoring NaN spatial parameter");
                    return;
                }
                self.with_node(|n| n.spatial.$field = value);
            }

            pub fn $get(&self) -> $ty {
                self.with_node(|n| n.spatial.$field).unwrap_or($absent)
            }
        )*
    };
}

/// A node that mixes everything attached to it and applies its
/// parameters to the result.
///
/// The default `Mixer` is uninitialized: setters do nothing, getters
/// return `NAN` / zero / defaults and actions return false.
#[derive(Clone, Debug, Default)]
pub struct Mixer {
    node: NodeHandle,
}

impl Mixer {
    pub(crate) fn new(engine: &Arc<EngineShared>) -> Self {
        let id = {
            let mut graph = engine.graph();
            let id = graph.add(SoundNode::group(engine.channels));
            if let Err(err) = graph.attach(id, 0, engine.endpoint_id, 0) {
                tracing::warn!("mixer could not be attached to the endpoint: {err}");
            }
            id
        };
        Self::from_node(NodeHandle::new(id, Arc::downgrade(engine)))
    }

    pub(crate) fn from_node(node: NodeHandle) -> Self {
        Self { node }
    }

    pub fn is_initialized(&self) -> bool {
        !self.node.is_empty()
    }

    pub(crate) fn with_node<R>(&self, f: impl FnOnce(&mut SoundNode) -> R) -> Option<R> {
        self.node
            .with_graph(|g, id| g.node_mut::<SoundNode>(id).map(f))
            .flatten()
    }

    fn engine(&self) -> Option<Arc<EngineShared>> {
        self.node.resolve().map(|(engine, _)| engine)
    }

    /// Engine time unit and sample rate.
    fn clock(&self) -> Option<(TimeUnit, u32)> {
        let engine = self.engine()?;
        Some((engine.time_unit.load(), engine.sample_rate))
    }

    // ---- basic parameters ----

    pub fn set_volume(&self, volume: f32) {
        self.with_node(|n| n.volume = volume);
    }

    pub fn get_volume(&self) -> f32 {
        self.with_node(|n| n.volume).unwrap_or(f32::NAN)
    }

    /// -1 is hard left, +1 hard right.
    pub fn set_pan(&self, pan: f32) {
        self.with_node(|n| n.pan = pan);
    }

    pub fn get_pan(&self) -> f32 {
        self.with_node(|n| n.pan).unwrap_or(f32::NAN)
    }

    pub fn set_pan_mode(&self, mode: PanMode) {
        self.with_node(|n| n.pan_mode = mode);
    }

    pub fn get_pan_mode(&self) -> PanMode {
        self.with_node(|n| n.pan_mode).unwrap_or_default()
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.with_node(|n| n.pitch = pitch);
    }

    pub fn get_pitch(&self) -> f32 {
        self.with_node(|n| n.pitch).unwrap_or(f32::NAN)
    }

    // ---- 3D ----

    spatial_param! {
        set_spatialization_enabled, get_spatialization_enabled, enabled: bool = false;
        /// Pin to a listener index, or `None` to follow the closest one.
        set_pinned_listener, get_pinned_listener, pinned_listener: Option<usize> = None;
        set_position, get_position, position: Vec3 = Vec3::ZERO;
        set_direction, get_direction, direction: Vec3 = Vec3::ZERO;
        set_velocity, get_velocity, velocity: Vec3 = Vec3::ZERO;
        set_attenuation_model, get_attenuation_model, attenuation_model: AttenuationModel = AttenuationModel::default();
        set_positioning, get_positioning, positioning: Positioning = Positioning::default();
        set_rolloff, get_rolloff, rolloff: f32 = f32::NAN;
        set_min_gain, get_min_gain, min_gain: f32 = f32::NAN;
        set_max_gain, get_max_gain, max_gain: f32 = f32::NAN;
        set_min_distance, get_min_distance, min_distance: f32 = f32::NAN;
        set_max_distance, get_max_distance, max_distance: f32 = f32::NAN;
        set_cone, get_cone, cone: Cone = Cone::default();
        set_doppler_factor, get_doppler_factor, doppler_factor: f32 = f32::NAN;
        set_directional_attenuation_factor, get_directional_attenuation_factor, directional_attenuation_factor: f32 = f32::NAN;
    }

    /// The listener this mixer is heard by: the pinned one if valid,
    /// otherwise the closest enabled one.
    pub fn get_listener(&self) -> Option<usize> {
        let engine = self.engine()?;
        let spatial = self.with_node(|n| n.spatial)?;
        let listeners = engine.state.listeners.read();
        spatial.listener_index(&listeners)
    }

    /// Unit vector from this mixer to its listener.
    pub fn get_direction_to_listener(&self) -> Vec3 {
        let Some(engine) = self.engine() else {
            return Vec3::ZERO;
        };
        let Some(spatial) = self.with_node(|n| n.spatial) else {
            return Vec3::ZERO;
        };
        let listeners = engine.state.listeners.read();
        spatial.direction_to_listener(&listeners)
    }

    // ---- fades ----

    /// Fade over `length` in the engine's time unit. A negative `start`
    /// fades from the current fade volume.
    pub fn set_fade(&self, start: f32, end: f32, length: u64) {
        if let Some((unit, rate)) = self.clock() {
            self.set_fade_in_frames(start, end, unit.to_frames(length, rate));
        }
    }

    pub fn set_fade_in_frames(&self, start: f32, end: f32, frames: u64) {
        self.with_node(|n| n.fader.set_fade(start, end, frames));
    }

    pub fn set_fade_in_milliseconds(&self, start: f32, end: f32, millis: u64) {
        if let Some((_, rate)) = self.clock() {
            self.set_fade_in_frames(start, end, millis_to_frames(millis, rate));
        }
    }

    pub fn get_current_fade_volume(&self) -> f32 {
        self.with_node(|n| n.fader.current()).unwrap_or(f32::NAN)
    }

    // ---- scheduling (absolute engine time) ----

    pub fn set_start_time(&self, time: u64) {
        if let Some((unit, rate)) = self.clock() {
            self.set_start_time_in_frames(unit.to_frames(time, rate));
        }
    }

    pub fn set_start_time_in_frames(&self, frames: u64) {
        self.node.set_state_time(NodeState::Started, frames);
    }

    pub fn set_start_time_in_milliseconds(&self, millis: u64) {
        if let Some((_, rate)) = self.clock() {
            self.set_start_time_in_frames(millis_to_frames(millis, rate));
        }
    }

    pub fn set_stop_time(&self, time: u64) {
        if let Some((unit, rate)) = self.clock() {
            self.set_stop_time_in_frames(unit.to_frames(time, rate));
        }
    }

    pub fn set_stop_time_in_frames(&self, frames: u64) {
        self.node.set_state_time(NodeState::Stopped, frames);
    }

    pub fn set_stop_time_in_milliseconds(&self, millis: u64) {
        if let Some((_, rate)) = self.clock() {
            self.set_stop_time_in_frames(millis_to_frames(millis, rate));
        }
    }

    /// How long this mixer has been processing, in the engine's time unit.
    pub fn get_time(&self) -> u64 {
        match self.clock() {
            Some((unit, rate)) => unit.from_frames(self.get_time_in_frames(), rate),
            None => 0,
        }
    }

    pub fn get_time_in_frames(&self) -> u64 {
        self.node.get_node_time()
    }

    pub fn get_time_in_milliseconds(&self) -> u64 {
        match self.clock() {
            Some((_, rate)) => frames_to_millis(self.get_time_in_frames(), rate),
            None => 0,
        }
    }

    // ---- transport ----

    /// Start the node, rewinding content that has reached its end.
    pub fn play(&self) -> bool {
        self.node
            .with_graph(|g, id| {
                if let Some(source) = g.node_mut::<SoundNode>(id).and_then(|n| n.source_mut()) {
                    if source.at_end() {
                        if let Err(err) = source.seek(0) {
                            tracing::warn!("could not rewind finished content: {err}");
                        }
                    }
                }
                g.set_state(id, NodeState::Started)
            })
            .unwrap_or(false)
    }

    /// Like [`play`](Self::play), looping the content.
    pub fn play_looped(&self) -> bool {
        self.with_node(|n| {
            if let Some(source) = n.source_mut() {
                source.set_looping(true);
            }
        });
        self.play()
    }

    pub fn stop(&self) -> bool {
        self.node.set_state(NodeState::Stopped)
    }

    pub fn get_playing(&self) -> bool {
        self.is_initialized() && self.node.get_state() == NodeState::Started
    }
}

impl GraphNode for Mixer {
    fn node_handle(&self) -> NodeHandle {
        self.node.clone()
    }
}
