//! A reference-counted audio node graph.
//!
//! A [`SoundSystem`] enumerates devices and lazily creates an [`Engine`].
//! The engine owns a pull-based graph: [`Mixer`]s and [`Sound`]s feed the
//! endpoint, which the output device (or [`Engine::read`]) pulls from.
//! Handles are cheap to clone; a node leaves the graph when its last
//! handle is dropped.
//!
//! ```
//! use std::sync::Arc;
//! use klangraum::{AudioBackend, Engine, EngineConfig, NullBackend, GraphNode};
//!
//! let backend: Arc<dyn AudioBackend> = Arc::new(NullBackend::new());
//! let engine = Engine::new(backend, EngineConfig::default().without_device()).unwrap();
//!
//! let music = engine.new_mixer();
//! music.set_volume(0.5);
//! assert_eq!(music.get_output_channels(0), 2);
//!
//! let frames = engine.read(256);
//! assert_eq!(frames.len(), 512);
//! ```

pub mod backend;
mod config;
pub mod decode;
pub mod device;
mod engine;
mod error;
mod graph;
mod handle;
mod listener;
mod mixer;
mod node;
pub mod nodes;
mod sound;
pub mod spatial;
mod system;
mod time;

pub use backend::NullBackend;
#[cfg(feature = "cpal_device")]
pub use backend::CpalBackend;
pub use config::EngineConfig;
pub use decode::{DataFormat, SampleFormat};
pub use device::{AudioBackend, DeviceId, DeviceRegistry, OutputStream, StreamConfig};
pub use engine::{Destination, Engine, SoundSource};
pub use error::{ErrorCode, SoundError, SoundResult};
pub use handle::{GraphNode, NodeHandle};
pub use listener::{Cone, Listener, MAX_LISTENERS};
pub use mixer::Mixer;
pub use node::{NodeId, NodeState, BLOCK_FRAMES};
pub use nodes::{BinauralNode, SplitterNode};
pub use sound::Sound;
pub use spatial::{AttenuationModel, PanMode, Positioning};
pub use system::SoundSystem;
pub use time::{frames_to_millis, millis_to_frames, TimeUnit};

pub use glam::Vec3;
