//! Loadable, seekable sounds.
//!
//! A [`Sound`] starts out empty. Loading decodes the content into memory,
//! puts a playing node into the graph (stopped, attached to the endpoint)
//! and swaps it in as the sound's [`Mixer`]. Everything a mixer can do, a
//! sound can do too.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use delegate::delegate;
use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::decode::{
    conform, decode_file, decode_memory, pcm_to_f32, DataFormat, PcmData, SampleFormat,
};
use crate::engine::{conformed_format, EngineShared};
use crate::error::SoundResult;
use crate::handle::{engine_unavailable, GraphNode, NodeHandle};
use crate::listener::Cone;
use crate::mixer::Mixer;
use crate::node::NodeState;
use crate::nodes::sound_node::{PcmSource, SoundNode};
use crate::spatial::{AttenuationModel, PanMode, Positioning};
use crate::time::{millis_to_frames, TimeUnit};

struct SoundInner {
    engine: Weak<EngineShared>,
    mixer: RwLock<Mixer>,
    paused: AtomicBool,
    /// Volume to restore when a fade-out pause is resumed.
    resume_volume: Mutex<Option<f32>>,
}

/// A sound: content plus the mixer that plays it. Clones share state.
#[derive(Clone)]
pub struct Sound {
    inner: Arc<SoundInner>,
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sound")
            .field("node", &self.mixer().node_handle())
            .field("paused", &self.inner.paused.load(Ordering::Relaxed))
            .finish()
    }
}

impl Sound {
    pub(crate) fn new(engine: &Arc<EngineShared>) -> Self {
        Self {
            inner: Arc::new(SoundInner {
                engine: Arc::downgrade(engine),
                mixer: RwLock::new(Mixer::default()),
                paused: AtomicBool::new(false),
                resume_volume: Mutex::new(None),
            }),
        }
    }

    fn mixer(&self) -> Mixer {
        self.inner.mixer.read().clone()
    }

    fn engine(&self) -> SoundResult<Arc<EngineShared>> {
        match self.inner.engine.upgrade() {
            Some(engine) => Ok(engine),
            None => engine_unavailable(),
        }
    }

    fn with_source<R>(&self, f: impl FnOnce(&mut PcmSource) -> R) -> Option<R> {
        self.mixer()
            .with_node(|n| n.source_mut().map(f))
            .flatten()
    }

    fn record<T>(&self, result: SoundResult<T>) -> Option<T> {
        match self.inner.engine.upgrade() {
            Some(engine) => engine.core.last_error.record_value(result),
            None => result.ok(),
        }
    }

    delegate! {
        to self.mixer() {
            pub fn set_volume(&self, volume: f32);
            pub fn get_volume(&self) -> f32;
            pub fn set_pan(&self, pan: f32);
            pub fn get_pan(&self) -> f32;
            pub fn set_pan_mode(&self, mode: PanMode);
            pub fn get_pan_mode(&self) -> PanMode;
            pub fn set_pitch(&self, pitch: f32);
            pub fn get_pitch(&self) -> f32;
            pub fn set_spatialization_enabled(&self, enabled: bool);
            pub fn get_spatialization_enabled(&self) -> bool;
            pub fn set_pinned_listener(&self, listener: Option<usize>);
            pub fn get_pinned_listener(&self) -> Option<usize>;
            pub fn set_position(&self, position: Vec3);
            pub fn get_position(&self) -> Vec3;
            pub fn set_direction(&self, direction: Vec3);
            pub fn get_direction(&self) -> Vec3;
            pub fn set_velocity(&self, velocity: Vec3);
            pub fn get_velocity(&self) -> Vec3;
            pub fn set_attenuation_model(&self, model: AttenuationModel);
            pub fn get_attenuation_model(&self) -> AttenuationModel;
            pub fn set_positioning(&self, positioning: Positioning);
            pub fn get_positioning(&self) -> Positioning;
            pub fn set_rolloff(&self, rolloff: f32);
            pub fn get_rolloff(&self) -> f32;
            pub fn set_min_gain(&self, gain: f32);
            pub fn get_min_gain(&self) -> f32;
            pub fn set_max_gain(&self, gain: f32);
            pub fn get_max_gain(&self) -> f32;
            pub fn set_min_distance(&self, distance: f32);
            pub fn get_min_distance(&self) -> f32;
            pub fn set_max_distance(&self, distance: f32);
            pub fn get_max_distance(&self) -> f32;
            pub fn set_cone(&self, cone: Cone);
            pub fn get_cone(&self) -> Cone;
            pub fn set_doppler_factor(&self, factor: f32);
            pub fn get_doppler_factor(&self) -> f32;
            pub fn set_directional_attenuation_factor(&self, factor: f32);
            pub fn get_directional_attenuation_factor(&self) -> f32;
            pub fn get_listener(&self) -> Option<usize>;
            pub fn get_direction_to_listener(&self) -> Vec3;
            pub fn set_fade(&self, start: f32, end: f32, length: u64);
            pub fn set_fade_in_frames(&self, start: f32, end: f32, frames: u64);
            pub fn set_fade_in_milliseconds(&self, start: f32, end: f32, millis: u64);
            pub fn get_current_fade_volume(&self) -> f32;
            pub fn set_start_time(&self, time: u64);
            pub fn set_start_time_in_frames(&self, frames: u64);
            pub fn set_start_time_in_milliseconds(&self, millis: u64);
            pub fn set_stop_time(&self, time: u64);
            pub fn set_stop_time_in_frames(&self, frames: u64);
            pub fn set_stop_time_in_milliseconds(&self, millis: u64);
            pub fn get_time(&self) -> u64;
            pub fn get_time_in_frames(&self) -> u64;
            pub fn get_time_in_milliseconds(&self) -> u64;
        }
    }

    // ---- loading ----

    /// Decode a file into memory and make it this sound's content.
    pub fn load(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.release();
        let result = self.engine().and_then(|engine| {
            let data = decode_file(path, engine.channels, engine.sample_rate)?;
            let format = conformed_format(&data);
            self.install(&engine, data, format)
        });
        self.finish_load(result, &path.display().to_string())
    }

    /// Decode an encoded stream held in memory.
    pub fn load_memory(&self, bytes: &[u8]) -> bool {
        self.release();
        let result = self.engine().and_then(|engine| {
            let data = decode_memory(bytes, engine.channels, engine.sample_rate)?;
            let format = conformed_format(&data);
            self.install(&engine, data, format)
        });
        self.finish_load(result, "memory")
    }

    /// Wrap raw little-endian PCM. The content keeps its own sample rate and
    /// is resampled while playing.
    pub fn load_pcm(
        &self,
        bytes: &[u8],
        format: SampleFormat,
        sample_rate: u32,
        channels: u32,
    ) -> bool {
        self.release();
        let result = self.engine().and_then(|engine| {
            let pcm = pcm_to_f32(bytes, format, channels, sample_rate)?;
            let data = conform(pcm, engine.channels, sample_rate);
            let format = DataFormat {
                format,
                channels,
                sample_rate,
            };
            self.install(&engine, data, format)
        });
        self.finish_load(result, "pcm")
    }

    fn install(
        &self,
        engine: &Arc<EngineShared>,
        data: PcmData,
        format: DataFormat,
    ) -> SoundResult<()> {
        let frames = data.frames();
        let id = {
            let mut graph = engine.graph();
            let id = graph.add(SoundNode::with_source(data, format, engine.channels));
            graph.set_state(id, NodeState::Stopped);
            if let Err(err) = graph.attach(id, 0, engine.endpoint_id, 0) {
                graph.remove(id);
                return Err(err);
            }
            id
        };
        let mixer = Mixer::from_node(NodeHandle::new(id, Arc::downgrade(engine)));
        let previous = std::mem::replace(&mut *self.inner.mixer.write(), mixer);
        drop(previous);
        debug!(node = ?id, frames, "sound loaded");
        Ok(())
    }

    fn finish_load(&self, result: SoundResult<()>, what: &str) -> bool {
        if let Err(err) = &result {
            warn!("failed to load sound from {what}: {err}");
        }
        self.record(result).is_some()
    }

    /// Take the content out; the node goes away once nothing else holds it.
    fn release(&self) -> bool {
        let previous = std::mem::take(&mut *self.inner.mixer.write());
        self.inner.paused.store(false, Ordering::Relaxed);
        *self.inner.resume_volume.lock() = None;
        let was_loaded = previous.is_initialized();
        drop(previous);
        was_loaded
    }

    /// Unload. Returns false if there was nothing loaded.
    pub fn close(&self) -> bool {
        self.release()
    }

    pub fn get_active(&self) -> bool {
        self.mixer().is_initialized()
    }

    // ---- transport ----

    /// Start or resume playback.
    pub fn play(&self) -> bool {
        let mixer = self.mixer();
        if let Some(volume) = self.inner.resume_volume.lock().take() {
            mixer.set_stop_time_in_frames(u64::MAX);
            mixer.set_fade_in_frames(volume, volume, 0);
        }
        let playing = mixer.play();
        if playing {
            self.inner.paused.store(false, Ordering::Relaxed);
        }
        playing
    }

    pub fn play_looped(&self) -> bool {
        self.set_looping(true);
        self.play()
    }

    /// Stop where we are; [`play`](Self::play) continues from here.
    pub fn pause(&self) -> bool {
        let stopped = self.mixer().stop();
        if stopped {
            self.inner.paused.store(true, Ordering::Relaxed);
        }
        stopped
    }

    /// Stop and rewind.
    pub fn stop(&self) -> bool {
        let mixer = self.mixer();
        let stopped = mixer.stop();
        if stopped {
            let _ = self.with_source(|s| s.seek(0));
            self.inner.paused.store(false, Ordering::Relaxed);
            *self.inner.resume_volume.lock() = None;
        }
        stopped
    }

    /// Fade out over `length` (engine time unit), then pause.
    pub fn pause_fade(&self, length: u64) -> bool {
        match self.engine() {
            Ok(engine) => self.pause_fade_in_frames(engine.to_frames(length)),
            Err(_) => false,
        }
    }

    pub fn pause_fade_in_frames(&self, frames: u64) -> bool {
        let Ok(engine) = self.engine() else {
            return false;
        };
        let mixer = self.mixer();
        let current = mixer.get_current_fade_volume();
        if current.is_nan() {
            return false;
        }
        let now = engine.time_in_frames();
        mixer.set_fade_in_frames(current, 0.0, frames);
        mixer.set_stop_time_in_frames(now.saturating_add(frames));
        *self.inner.resume_volume.lock() = Some(current);
        self.inner.paused.store(true, Ordering::Relaxed);
        true
    }

    pub fn pause_fade_in_milliseconds(&self, millis: u64) -> bool {
        match self.engine() {
            Ok(engine) => self.pause_fade_in_frames(millis_to_frames(millis, engine.sample_rate)),
            Err(_) => false,
        }
    }

    /// Fade from `start` to `end` over `length`, beginning at the absolute
    /// engine time `at`. Times follow the engine's unit.
    pub fn set_timed_fade(&self, start: f32, end: f32, length: u64, at: u64) {
        if let Ok(engine) = self.engine() {
            self.set_timed_fade_in_frames(start, end, engine.to_frames(length), engine.to_frames(at));
        }
    }

    pub fn set_timed_fade_in_frames(&self, start: f32, end: f32, length: u64, at: u64) {
        self.mixer()
            .with_node(|n| n.fader.set_timed_fade(start, end, length, at));
    }

    pub fn set_timed_fade_in_milliseconds(&self, start: f32, end: f32, length: u64, at: u64) {
        if let Ok(engine) = self.engine() {
            let rate = engine.sample_rate;
            self.set_timed_fade_in_frames(
                start,
                end,
                millis_to_frames(length, rate),
                millis_to_frames(at, rate),
            );
        }
    }

    /// Stop at the absolute engine time `at`, fading out over the final
    /// `fade_length` before it.
    pub fn set_stop_time_with_fade(&self, at: u64, fade_length: u64) {
        if let Ok(engine) = self.engine() {
            self.set_stop_time_with_fade_in_frames(engine.to_frames(at), engine.to_frames(fade_length));
        }
    }

    pub fn set_stop_time_with_fade_in_frames(&self, at: u64, fade_length: u64) {
        let mixer = self.mixer();
        mixer.with_node(|n| {
            n.fader
                .set_timed_fade(-1.0, 0.0, fade_length, at.saturating_sub(fade_length))
        });
        mixer.set_stop_time_in_frames(at);
    }

    pub fn set_stop_time_with_fade_in_milliseconds(&self, at: u64, fade_length: u64) {
        if let Ok(engine) = self.engine() {
            let rate = engine.sample_rate;
            self.set_stop_time_with_fade_in_frames(
                millis_to_frames(at, rate),
                millis_to_frames(fade_length, rate),
            );
        }
    }

    // ---- state ----

    pub fn set_looping(&self, looping: bool) {
        self.with_source(|s| s.set_looping(looping));
    }

    pub fn get_looping(&self) -> bool {
        self.with_source(|s| s.looping()).unwrap_or(false)
    }

    pub fn get_at_end(&self) -> bool {
        self.with_source(|s| s.at_end()).unwrap_or(false)
    }

    pub fn get_playing(&self) -> bool {
        self.mixer().get_playing()
    }

    pub fn get_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Relaxed) && !self.get_playing()
    }

    pub fn get_data_format(&self) -> Option<DataFormat> {
        self.with_source(|s| s.data_format())
    }

    /// Lowest pitch accepted. Always zero; kept for older callers.
    pub fn pitch_lower_limit(&self) -> f32 {
        0.0
    }

    // ---- cursor ----

    /// Seek in the engine's time unit.
    pub fn seek(&self, position: u64) -> bool {
        match self.time_unit() {
            Some(TimeUnit::Frames) => self.seek_in_frames(position),
            Some(TimeUnit::Milliseconds) => self.seek_in_milliseconds(position),
            None => false,
        }
    }

    /// Seek to a frame of the content. Seeking past the end fails.
    pub fn seek_in_frames(&self, frame: u64) -> bool {
        let Some(result) = self.with_source(|s| s.seek(frame)) else {
            return false;
        };
        self.record(result).is_some()
    }

    pub fn seek_in_milliseconds(&self, millis: u64) -> bool {
        let Some(rate) = self.content_rate() else {
            return false;
        };
        self.seek_in_frames(millis_to_frames(millis, rate))
    }

    pub fn get_cursor(&self) -> u64 {
        match self.time_unit() {
            Some(TimeUnit::Frames) => self.get_cursor_in_frames(),
            Some(TimeUnit::Milliseconds) => self.get_cursor_in_milliseconds(),
            None => 0,
        }
    }

    pub fn get_cursor_in_frames(&self) -> u64 {
        self.with_source(|s| s.cursor()).unwrap_or(0)
    }

    pub fn get_cursor_in_milliseconds(&self) -> u64 {
        self.with_source(|s| content_millis(s.cursor(), s.sample_rate()))
            .unwrap_or(0)
    }

    pub fn get_length(&self) -> u64 {
        match self.time_unit() {
            Some(TimeUnit::Frames) => self.get_length_in_frames(),
            Some(TimeUnit::Milliseconds) => self.get_length_in_milliseconds(),
            None => 0,
        }
    }

    pub fn get_length_in_frames(&self) -> u64 {
        self.with_source(|s| s.length()).unwrap_or(0)
    }

    pub fn get_length_in_milliseconds(&self) -> u64 {
        self.with_source(|s| content_millis(s.length(), s.sample_rate()))
            .unwrap_or(0)
    }

    fn time_unit(&self) -> Option<TimeUnit> {
        self.engine().ok().map(|e| e.time_unit.load())
    }

    fn content_rate(&self) -> Option<u32> {
        self.with_source(|s| s.sample_rate())
    }
}

/// `frames * 1000 / rate`, computed in `f64`, truncated and saturating.
fn content_millis(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    let millis = frames as f64 * 1000.0 / sample_rate as f64;
    if millis >= u64::MAX as f64 {
        u64::MAX
    } else {
        millis as u64
    }
}

impl GraphNode for Sound {
    fn node_handle(&self) -> NodeHandle {
        self.mixer().node_handle()
    }
}
