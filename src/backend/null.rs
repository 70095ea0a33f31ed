//! A backend without hardware.
//!
//! Devices are made up from names; streams open and close instantly and
//! never call the render callback themselves. Drive the graph with
//! [`Engine::read`](crate::Engine::read) instead.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::device::{
    AudioBackend, DeviceDirection, DeviceId, DeviceInfo, Enumeration, OutputStream,
    RenderCallback, StreamConfig,
};
use crate::error::{SoundError, SoundResult};

const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// In-process backend with a configurable set of fake devices.
#[derive(Debug)]
pub struct NullBackend {
    inputs: Vec<String>,
    outputs: Vec<String>,
    broken: Vec<String>,
    sample_rate: u32,
    fail_enumeration: AtomicBool,
    streams_opened: AtomicUsize,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NullBackend {
    /// One input and one output device at 48 kHz.
    pub fn new() -> Self {
        Self {
            inputs: vec!["Null Input".to_string()],
            outputs: vec!["Null Output".to_string()],
            broken: Vec::new(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            fail_enumeration: AtomicBool::new(false),
            streams_opened: AtomicUsize::new(0),
        }
    }

    /// Replace the playback devices (builder pattern).
    pub fn with_outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the capture devices (builder pattern).
    pub fn with_inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add a playback device that enumerates fine but refuses to open.
    pub fn with_broken_output(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.outputs.push(name.clone());
        self.broken.push(name);
        self
    }

    /// Rate reported as every device's preference.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Make subsequent enumerations fail (or succeed again).
    pub fn set_enumeration_fails(&self, fails: bool) {
        self.fail_enumeration.store(fails, Ordering::Relaxed);
    }

    /// How many streams have been opened so far.
    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::Relaxed)
    }

    fn device_id(name: &str) -> DeviceId {
        DeviceId::new(name.as_bytes())
    }

    fn infos(names: &[String], direction: DeviceDirection) -> Vec<DeviceInfo> {
        names
            .iter()
            .map(|name| DeviceInfo {
                id: Self::device_id(name),
                name: name.clone(),
                direction,
            })
            .collect()
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn enumerate(&self) -> SoundResult<Enumeration> {
        if self.fail_enumeration.load(Ordering::Relaxed) {
            return Err(SoundError::Backend("device enumeration failed".into()));
        }
        Ok(Enumeration {
            inputs: Self::infos(&self.inputs, DeviceDirection::Capture),
            outputs: Self::infos(&self.outputs, DeviceDirection::Playback),
        })
    }

    fn default_output(&self) -> Option<DeviceId> {
        self.outputs.first().map(|name| Self::device_id(name))
    }

    fn preferred_sample_rate(&self, device: &DeviceId) -> Option<u32> {
        self.outputs
            .iter()
            .any(|name| name.as_bytes() == device.as_bytes())
            .then_some(self.sample_rate)
    }

    fn open_output(
        &self,
        device: &DeviceId,
        config: StreamConfig,
        render: RenderCallback,
    ) -> SoundResult<Box<dyn OutputStream>> {
        let Some(name) = self
            .outputs
            .iter()
            .find(|name| name.as_bytes() == device.as_bytes())
        else {
            return Err(SoundError::DeviceNotFound(format!("{device:?}")));
        };
        if self.broken.contains(name) {
            return Err(SoundError::Backend(format!("device '{name}' failed to open")));
        }

        self.streams_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullStream {
            device: device.clone(),
            config,
            running: false,
            _render: render,
        }))
    }
}

/// Stream handed out by [`NullBackend`].
pub struct NullStream {
    device: DeviceId,
    config: StreamConfig,
    running: bool,
    _render: RenderCallback,
}

impl NullStream {
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl OutputStream for NullStream {
    fn start(&mut self) -> SoundResult<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> SoundResult<()> {
        self.running = false;
        Ok(())
    }

    fn device_id(&self) -> &DeviceId {
        &self.device
    }

    fn config(&self) -> StreamConfig {
        self.config
    }
}
