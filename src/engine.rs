//! The audio engine: a graph, a clock, listeners and an output device.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::Vec3;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::decode::{decode_file, decode_memory, DataFormat, PcmData, SampleFormat};
use crate::device::{AudioBackend, OutputStream, RenderCallback, StreamConfig};
use crate::error::{ErrorCode, SoundError, SoundResult};
use crate::graph::AudioGraph;
use crate::handle::{GraphNode, NodeHandle};
use crate::listener::{find_closest, Cone, Listener, MAX_LISTENERS};
use crate::mixer::Mixer;
use crate::node::{AudioNode, NodeId};
use crate::nodes::endpoint::Endpoint;
use crate::nodes::sound_node::SoundNode;
use crate::nodes::HrtfContext;
use crate::sound::Sound;
use crate::system::SystemCore;
use crate::time::{frames_to_millis, millis_to_frames, AtomicTimeUnit, TimeUnit};

const FALLBACK_SAMPLE_RATE: u32 = 48_000;

/// What the render callback touches: the graph and the listeners.
///
/// The callback owns an `Arc` of this and nothing else, so the engine is
/// never torn down from the audio thread.
pub(crate) struct GraphState {
    pub(crate) graph: Mutex<AudioGraph>,
    pub(crate) listeners: RwLock<Vec<Listener>>,
}

impl GraphState {
    fn render(&self, out: &mut [f32]) -> usize {
        let mut snapshot = [Listener::default(); MAX_LISTENERS];
        let count = {
            let listeners = self.listeners.read();
            let count = listeners.len().min(MAX_LISTENERS);
            snapshot[..count].copy_from_slice(&listeners[..count]);
            count
        };
        self.graph.lock().render(out, &snapshot[..count])
    }
}

pub(crate) struct EngineShared {
    pub(crate) core: Arc<SystemCore>,
    backend: Arc<dyn AudioBackend>,
    pub(crate) state: Arc<GraphState>,
    render: RenderCallback,
    stream: Mutex<Option<Box<dyn OutputStream>>>,
    endpoint: NodeHandle,
    pub(crate) endpoint_id: NodeId,
    pub(crate) time_unit: AtomicTimeUnit,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u32,
    running: AtomicBool,
}

impl EngineShared {
    /// Lock the graph, reclaiming finished one-shot sounds first.
    pub(crate) fn graph(&self) -> MutexGuard<'_, AudioGraph> {
        let mut graph = self.state.graph.lock();
        graph.reap_finished();
        graph
    }

    pub(crate) fn time_in_frames(&self) -> u64 {
        self.graph().global_time()
    }

    /// Convert a duration in the engine's current unit to frames.
    pub(crate) fn to_frames(&self, value: u64) -> u64 {
        self.time_unit.load().to_frames(value, self.sample_rate)
    }
}

/// Where [`Engine::play`] takes its content from.
#[derive(Clone, Copy, Debug)]
pub enum SoundSource<'a> {
    File(&'a Path),
    Memory(&'a [u8]),
}

/// Where [`Engine::play`] routes the sound.
#[derive(Clone, Copy)]
pub enum Destination<'a> {
    Endpoint,
    Node(&'a dyn GraphNode, usize),
    Mixer(&'a Mixer),
}

/// Handle to an audio engine. Clones share the same engine.
///
/// The engine lives as long as any clone does; nodes created from it only
/// hold weak references.
#[derive(Clone)]
pub struct Engine {
    pub(crate) shared: Arc<EngineShared>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sample_rate", &self.shared.sample_rate)
            .field("channels", &self.shared.channels)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Engine {
    /// Create a standalone engine on `backend`, with its own registry and
    /// error slot.
    pub fn new(backend: Arc<dyn AudioBackend>, config: EngineConfig) -> SoundResult<Engine> {
        let core = Arc::new(SystemCore::new());
        core.refresh(&*backend)?;
        Self::create(core, backend, &config)
    }

    pub(crate) fn create(
        core: Arc<SystemCore>,
        backend: Arc<dyn AudioBackend>,
        config: &EngineConfig,
    ) -> SoundResult<Engine> {
        if config.channels == 0 {
            return Err(SoundError::invalid_argument("engine needs at least one channel"));
        }
        let stream_channels = u16::try_from(config.channels)
            .map_err(|_| SoundError::invalid_argument("too many channels"))?;

        let device = if config.no_device {
            None
        } else {
            let device = backend
                .default_output()
                .or_else(|| core.registry.read().output(0).cloned())
                .ok_or_else(|| SoundError::DeviceNotFound("no playback device".into()))?;
            Some(device)
        };

        let sample_rate = config
            .sample_rate
            .or_else(|| device.as_ref().and_then(|d| backend.preferred_sample_rate(d)))
            .unwrap_or(FALLBACK_SAMPLE_RATE);
        if sample_rate == 0 {
            return Err(SoundError::invalid_argument("sample rate must be non-zero"));
        }

        let mut graph = AudioGraph::new(sample_rate, config.channels as usize);
        let endpoint_id = graph.add(Endpoint::new(config.channels));
        graph.set_endpoint(endpoint_id);

        let state = Arc::new(GraphState {
            graph: Mutex::new(graph),
            listeners: RwLock::new(vec![Listener::default(); config.listeners()]),
        });
        let render: RenderCallback = {
            let state = Arc::clone(&state);
            Arc::new(move |out: &mut [f32]| {
                state.render(out);
            })
        };

        let shared = Arc::new_cyclic(|weak| EngineShared {
            core,
            backend: Arc::clone(&backend),
            state,
            render,
            stream: Mutex::new(None),
            endpoint: NodeHandle::new(endpoint_id, weak.clone()),
            endpoint_id,
            time_unit: AtomicTimeUnit::new(config.time_unit),
            sample_rate,
            channels: config.channels,
            running: AtomicBool::new(false),
        });
        let engine = Engine { shared };

        if let Some(device) = device {
            let stream_config = StreamConfig {
                sample_rate,
                channels: stream_channels,
                period_frames: config.period_frames,
            };
            let stream =
                backend.open_output(&device, stream_config, Arc::clone(&engine.shared.render))?;
            *engine.shared.stream.lock() = Some(stream);
            if !config.no_auto_start {
                engine.try_start()?;
            }
        }

        info!(
            backend = backend.name(),
            sample_rate,
            channels = config.channels,
            device = !config.no_device,
            "engine created"
        );
        Ok(engine)
    }

    /// Whether both handles refer to the same engine.
    pub fn ptr_eq(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Last error recorded by this engine or its system context.
    pub fn last_error(&self) -> ErrorCode {
        self.shared.core.last_error.get()
    }

    pub(crate) fn add_node<N: AudioNode>(&self, node: N) -> NodeHandle {
        let id = self.shared.graph().add(node);
        NodeHandle::new(id, Arc::downgrade(&self.shared))
    }

    pub(crate) fn hrtf(&self) -> SoundResult<Arc<HrtfContext>> {
        self.shared.core.hrtf(self.shared.sample_rate)
    }

    // ---- device ----

    /// Index of the current output device in the registry.
    pub fn get_device(&self) -> Option<usize> {
        let id = self.shared.stream.lock().as_ref()?.device_id().clone();
        self.shared.core.registry.read().find_output(&id)
    }

    /// Move output to another device, keeping channels, rate and the graph.
    ///
    /// Returns false without touching anything when the index is out of
    /// range, the engine has no device, or the device is already in use.
    /// If reopening fails the engine is left stopped without a device.
    /// Call from control threads only.
    pub fn set_device(&self, index: usize) -> bool {
        let Some(target) = self.shared.core.registry.read().output(index).cloned() else {
            return false;
        };

        let mut slot = self.shared.stream.lock();
        let Some(current) = slot.as_ref() else {
            return false;
        };
        if current.device_id() == &target {
            return false;
        }
        let config = current.config();

        let was_running = self.shared.running.swap(false, Ordering::AcqRel);
        if let Some(mut old) = slot.take() {
            if was_running {
                if let Err(err) = old.stop() {
                    warn!("failed to stop the previous device: {err}");
                }
            }
        }

        let opened = self
            .shared
            .backend
            .open_output(&target, config, Arc::clone(&self.shared.render));
        let result = opened.and_then(|mut stream| {
            let started = if was_running { stream.start() } else { Ok(()) };
            *slot = Some(stream);
            started
        });

        match result {
            Ok(()) => {
                self.shared.running.store(was_running, Ordering::Release);
                info!(device = index, "output device switched");
                self.shared.core.last_error.set(ErrorCode::Success);
                true
            }
            Err(err) => {
                warn!(device = index, "output device switch failed: {err}");
                self.shared.core.last_error.set(err.code());
                false
            }
        }
    }

    fn try_start(&self) -> SoundResult<()> {
        let mut slot = self.shared.stream.lock();
        let stream = slot
            .as_mut()
            .ok_or_else(|| SoundError::InvalidOperation("engine has no device".into()))?;
        stream.start()?;
        self.shared.running.store(true, Ordering::Release);
        Ok(())
    }

    fn try_stop(&self) -> SoundResult<()> {
        let mut slot = self.shared.stream.lock();
        let stream = slot
            .as_mut()
            .ok_or_else(|| SoundError::InvalidOperation("engine has no device".into()))?;
        stream.stop()?;
        self.shared.running.store(false, Ordering::Release);
        Ok(())
    }

    pub fn start(&self) -> bool {
        let result = self.try_start();
        self.shared.core.last_error.record(result)
    }

    pub fn stop(&self) -> bool {
        let result = self.try_stop();
        self.shared.core.last_error.record(result)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    // ---- offline rendering ----

    /// Render `frames` frames of interleaved output.
    pub fn read(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.shared.channels as usize];
        let read = self.read_into(&mut out) as usize;
        out.truncate(read * self.shared.channels as usize);
        out
    }

    /// Render into `out` (interleaved), returning the frames written.
    pub fn read_into(&self, out: &mut [f32]) -> u64 {
        self.shared.state.render(out) as u64
    }

    // ---- format ----

    pub fn channels(&self) -> u32 {
        self.shared.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.shared.time_unit.load()
    }

    pub fn set_time_unit(&self, unit: TimeUnit) {
        self.shared.time_unit.store(unit);
    }

    // ---- clock ----

    /// Engine time in the current [`TimeUnit`].
    pub fn get_time(&self) -> u64 {
        match self.time_unit() {
            TimeUnit::Frames => self.get_time_in_frames(),
            TimeUnit::Milliseconds => self.get_time_in_milliseconds(),
        }
    }

    pub fn get_time_in_frames(&self) -> u64 {
        self.shared.time_in_frames()
    }

    pub fn get_time_in_milliseconds(&self) -> u64 {
        frames_to_millis(self.get_time_in_frames(), self.shared.sample_rate)
    }

    pub fn set_time(&self, time: u64) -> bool {
        match self.time_unit() {
            TimeUnit::Frames => self.set_time_in_frames(time),
            TimeUnit::Milliseconds => self.set_time_in_milliseconds(time),
        }
    }

    pub fn set_time_in_frames(&self, frames: u64) -> bool {
        self.shared.graph().set_global_time(frames);
        true
    }

    pub fn set_time_in_milliseconds(&self, millis: u64) -> bool {
        self.set_time_in_frames(millis_to_frames(millis, self.shared.sample_rate))
    }

    // ---- master volume ----

    /// Linear master volume.
    pub fn set_volume(&self, volume: f32) -> bool {
        self.shared.endpoint.set_output_bus_volume(0, volume)
    }

    pub fn get_volume(&self) -> f32 {
        self.shared.endpoint.get_output_bus_volume(0)
    }

    /// Master volume in decibels.
    pub fn set_gain(&self, db: f32) -> bool {
        self.set_volume(10f32.powf(db / 20.0))
    }

    pub fn get_gain(&self) -> f32 {
        20.0 * self.get_volume().log10()
    }

    // ---- listeners ----

    pub fn listener_count(&self) -> usize {
        self.shared.state.listeners.read().len()
    }

    /// Closest enabled listener to `position`.
    pub fn find_closest_listener(&self, position: Vec3) -> Option<usize> {
        find_closest(&self.shared.state.listeners.read(), position)
    }

    fn update_listener(&self, index: usize, f: impl FnOnce(&mut Listener)) {
        if let Some(listener) = self.shared.state.listeners.write().get_mut(index) {
            f(listener);
        }
    }

    fn listener(&self, index: usize) -> Option<Listener> {
        self.shared.state.listeners.read().get(index).copied()
    }

    pub fn set_listener_position(&self, index: usize, position: Vec3) {
        self.update_listener(index, |l| l.position = position);
    }

    pub fn get_listener_position(&self, index: usize) -> Vec3 {
        self.listener(index).map_or(Vec3::ZERO, |l| l.position)
    }

    pub fn set_listener_direction(&self, index: usize, direction: Vec3) {
        self.update_listener(index, |l| l.direction = direction);
    }

    pub fn get_listener_direction(&self, index: usize) -> Vec3 {
        self.listener(index).map_or(Vec3::ZERO, |l| l.direction)
    }

    pub fn set_listener_velocity(&self, index: usize, velocity: Vec3) {
        self.update_listener(index, |l| l.velocity = velocity);
    }

    pub fn get_listener_velocity(&self, index: usize) -> Vec3 {
        self.listener(index).map_or(Vec3::ZERO, |l| l.velocity)
    }

    pub fn set_listener_world_up(&self, index: usize, up: Vec3) {
        self.update_listener(index, |l| l.world_up = up);
    }

    pub fn get_listener_world_up(&self, index: usize) -> Vec3 {
        self.listener(index).map_or(Vec3::ZERO, |l| l.world_up)
    }

    pub fn set_listener_cone(&self, index: usize, cone: Cone) {
        self.update_listener(index, |l| l.cone = cone);
    }

    pub fn get_listener_cone(&self, index: usize) -> Cone {
        self.listener(index).map_or(Cone::default(), |l| l.cone)
    }

    pub fn set_listener_enabled(&self, index: usize, enabled: bool) {
        self.update_listener(index, |l| l.enabled = enabled);
    }

    pub fn get_listener_enabled(&self, index: usize) -> bool {
        self.listener(index).is_some_and(|l| l.enabled)
    }

    // ---- nodes ----

    /// The node every mixer feeds by default. Same identity on every call.
    pub fn endpoint(&self) -> NodeHandle {
        self.shared.endpoint.clone()
    }

    /// A new group mixer attached to the endpoint.
    pub fn new_mixer(&self) -> Mixer {
        Mixer::new(&self.shared)
    }

    /// A new, empty sound.
    pub fn new_sound(&self) -> Sound {
        Sound::new(&self.shared)
    }

    /// Number of nodes currently in the graph, endpoint included.
    pub fn node_count(&self) -> usize {
        self.shared.graph().len()
    }

    /// Fire and forget: decode `source` and play it once into
    /// `destination`. The node is reclaimed after it reaches the end.
    pub fn play(&self, source: SoundSource<'_>, destination: Destination<'_>) -> bool {
        let result = self.try_play(source, destination);
        if let Err(err) = &result {
            warn!("one-shot playback failed: {err}");
        }
        self.shared.core.last_error.record(result)
    }

    fn try_play(&self, source: SoundSource<'_>, destination: Destination<'_>) -> SoundResult<()> {
        let (channels, sample_rate) = (self.shared.channels, self.shared.sample_rate);
        let data = match source {
            SoundSource::File(path) => decode_file(path, channels, sample_rate)?,
            SoundSource::Memory(bytes) => decode_memory(bytes, channels, sample_rate)?,
        };

        let (target, bus) = match destination {
            Destination::Endpoint => (self.endpoint(), 0),
            Destination::Node(node, bus) => (node.node_handle(), bus),
            Destination::Mixer(mixer) => (mixer.node_handle(), 0),
        };
        let (owner, to) = target
            .resolve()
            .ok_or_else(|| SoundError::invalid_argument("destination node is empty"))?;
        if !Arc::ptr_eq(&owner, &self.shared) {
            return Err(SoundError::invalid_argument(
                "destination belongs to another engine",
            ));
        }

        let format = conformed_format(&data);
        let mut graph = self.shared.graph();
        let id = graph.add_one_shot(SoundNode::with_source(data, format, channels));
        if let Err(err) = graph.attach(id, 0, to, bus) {
            graph.remove(id);
            return Err(err);
        }
        debug!(node = ?id, "one-shot sound started");
        Ok(())
    }
}

/// Decoded content is always `f32` at the engine format.
pub(crate) fn conformed_format(data: &PcmData) -> DataFormat {
    DataFormat {
        format: SampleFormat::F32,
        channels: data.channels,
        sample_rate: data.sample_rate,
    }
}
