//! Device discovery and the output stream contract.
//!
//! A backend enumerates devices and opens output streams. The
//! [`DeviceRegistry`] keeps the result of the last enumeration as
//! index-aligned (identity, name) lists; the index is the only handle the
//! rest of the crate hands out.
//!
//! # Example
//!
//! ```no_run
//! use klangraum::SoundSystem;
//!
//! let system = SoundSystem::global();
//! for (i, name) in system.list_outputs().iter().enumerate() {
//!     println!("[{i}] {name}");
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::SoundResult;

/// Opaque native identity of a device, compared byte for byte.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(Vec<u8>);

impl DeviceId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Which way audio flows through a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceDirection {
    Capture,
    Playback,
}

/// One enumerated device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub direction: DeviceDirection,
}

/// Result of one enumeration pass, both directions.
#[derive(Clone, Debug, Default)]
pub struct Enumeration {
    pub inputs: Vec<DeviceInfo>,
    pub outputs: Vec<DeviceInfo>,
}

/// Index-aligned device lists from the most recent enumeration.
///
/// For every `i`, `outputs()[i]` and `output_names()[i]` describe the same
/// device, and likewise for inputs. Capture and playback are independent
/// index spaces.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inputs: Vec<DeviceId>,
    input_names: Vec<String>,
    outputs: Vec<DeviceId>,
    output_names: Vec<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the previous contents and take on a fresh enumeration.
    pub fn replace(&mut self, enumeration: Enumeration) {
        self.inputs.clear();
        self.input_names.clear();
        self.outputs.clear();
        self.output_names.clear();

        for info in enumeration.inputs {
            self.inputs.push(info.id);
            self.input_names.push(info.name);
        }
        for info in enumeration.outputs {
            self.outputs.push(info.id);
            self.output_names.push(info.name);
        }
    }

    pub fn inputs(&self) -> &[DeviceId] {
        &self.inputs
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn outputs(&self) -> &[DeviceId] {
        &self.outputs
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn output(&self, index: usize) -> Option<&DeviceId> {
        self.outputs.get(index)
    }

    /// Index of the output device with exactly this identity.
    pub fn find_output(&self, id: &DeviceId) -> Option<usize> {
        self.outputs.iter().position(|o| o == id)
    }
}

/// Format an output stream is opened with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Preferred callback size in frames. Backends may ignore it.
    pub period_frames: usize,
}

/// Fills an interleaved `f32` buffer with the next frames of output.
///
/// Shared between the engine and whichever stream is currently open, so a
/// device switch can hand the very same callback to the new stream.
pub type RenderCallback = Arc<dyn Fn(&mut [f32]) + Send + Sync>;

/// An open output stream bound to one device.
///
/// Dropping the stream closes the device.
pub trait OutputStream: Send {
    fn start(&mut self) -> SoundResult<()>;
    fn stop(&mut self) -> SoundResult<()>;
    fn device_id(&self) -> &DeviceId;
    fn config(&self) -> StreamConfig;
}

/// A host audio API.
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Enumerate every capture and playback device.
    fn enumerate(&self) -> SoundResult<Enumeration>;

    /// The host's default playback device, if it has one.
    fn default_output(&self) -> Option<DeviceId>;

    /// The rate the device prefers when none is requested.
    fn preferred_sample_rate(&self, device: &DeviceId) -> Option<u32>;

    /// Open `device` for playback. The stream is created stopped.
    fn open_output(
        &self,
        device: &DeviceId,
        config: StreamConfig,
        render: RenderCallback,
    ) -> SoundResult<Box<dyn OutputStream>>;
}
