//! Host audio backends.
//!
//! [`NullBackend`] is always available and is what offline rendering and
//! the test suite use. [`CpalBackend`] talks to real hardware and requires
//! the `cpal_device` feature.

mod null;
pub use null::{NullBackend, NullStream};

#[cfg(feature = "cpal_device")]
mod cpal;
#[cfg(feature = "cpal_device")]
pub use self::cpal::CpalBackend;

use std::sync::Arc;

use crate::device::AudioBackend;
use crate::error::SoundResult;

/// The backend [`SoundSystem::global`](crate::SoundSystem::global) uses.
#[cfg(feature = "cpal_device")]
pub fn default_backend() -> SoundResult<Arc<dyn AudioBackend>> {
    Ok(Arc::new(CpalBackend::new()))
}

/// The backend [`SoundSystem::global`](crate::SoundSystem::global) uses.
#[cfg(not(feature = "cpal_device"))]
pub fn default_backend() -> SoundResult<Arc<dyn AudioBackend>> {
    Ok(Arc::new(NullBackend::new()))
}
