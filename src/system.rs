//! The process-wide sound system context.
//!
//! A [`SoundSystem`] owns the device registry, the last-error code, the
//! shared HRTF context and (once initialized) the backend and the engine.
//! Initialization is lazy: the first entry point that needs the backend
//! brings it up under a mutex, concurrent callers wait for that attempt,
//! and a failed attempt is retried by the next call.

use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{info, warn};

use crate::backend;
use crate::config::EngineConfig;
use crate::device::{AudioBackend, DeviceRegistry};
use crate::engine::Engine;
use crate::error::{ErrorCode, LastError, SoundResult};
use crate::nodes::HrtfContext;

/// State shared by the system context and every engine created from it.
pub(crate) struct SystemCore {
    pub(crate) last_error: LastError,
    pub(crate) registry: RwLock<DeviceRegistry>,
    hrtf: Mutex<Option<Arc<HrtfContext>>>,
}

impl SystemCore {
    pub(crate) fn new() -> Self {
        Self {
            last_error: LastError::new(),
            registry: RwLock::new(DeviceRegistry::new()),
            hrtf: Mutex::new(None),
        }
    }

    /// Re-enumerate and swap the registry contents in one go.
    pub(crate) fn refresh(&self, backend: &dyn AudioBackend) -> SoundResult<()> {
        let enumeration = backend.enumerate()?;
        let (inputs, outputs) = (enumeration.inputs.len(), enumeration.outputs.len());
        self.registry.write().replace(enumeration);
        info!(inputs, outputs, backend = backend.name(), "devices enumerated");
        Ok(())
    }

    /// The HRTF context, created on first use at `sample_rate`.
    pub(crate) fn hrtf(&self, sample_rate: u32) -> SoundResult<Arc<HrtfContext>> {
        let mut slot = self.hrtf.lock();
        if let Some(hrtf) = slot.as_ref() {
            return Ok(Arc::clone(hrtf));
        }
        let hrtf = Arc::new(HrtfContext::synthetic(sample_rate)?);
        *slot = Some(Arc::clone(&hrtf));
        Ok(hrtf)
    }
}

type BackendFactory = Box<dyn Fn() -> SoundResult<Arc<dyn AudioBackend>> + Send + Sync>;

struct Native {
    backend: Arc<dyn AudioBackend>,
    engine: Engine,
}

/// Entry point: device registry plus the lazily created engine.
///
/// ```
/// use std::sync::Arc;
/// use klangraum::{AudioBackend, EngineConfig, NullBackend, SoundSystem};
///
/// let system = SoundSystem::with_backend(
///     || Ok(Arc::new(NullBackend::new()) as Arc<dyn AudioBackend>),
///     EngineConfig::default(),
/// );
/// assert_eq!(system.list_outputs(), vec!["Null Output".to_string()]);
/// let engine = system.engine().unwrap();
/// assert_eq!(engine.channels(), 2);
/// ```
pub struct SoundSystem {
    core: Arc<SystemCore>,
    factory: BackendFactory,
    config: EngineConfig,
    native: Mutex<Option<Native>>,
}

impl SoundSystem {
    /// The process-wide instance, using the default backend.
    pub fn global() -> &'static SoundSystem {
        static GLOBAL: OnceLock<SoundSystem> = OnceLock::new();
        GLOBAL.get_or_init(|| SoundSystem::with_backend(backend::default_backend, EngineConfig::default()))
    }

    /// A context whose backend comes from `factory`. Nothing is created
    /// until the first call that needs it.
    pub fn with_backend<F>(factory: F, config: EngineConfig) -> Self
    where
        F: Fn() -> SoundResult<Arc<dyn AudioBackend>> + Send + Sync + 'static,
    {
        Self {
            core: Arc::new(SystemCore::new()),
            factory: Box::new(factory),
            config,
            native: Mutex::new(None),
        }
    }

    fn ensure_init(&self) -> SoundResult<(Arc<dyn AudioBackend>, Engine)> {
        let mut native = self.native.lock();
        if let Some(n) = native.as_ref() {
            return Ok((Arc::clone(&n.backend), n.engine.clone()));
        }

        let backend = (self.factory)()?;
        self.core.refresh(&*backend)?;
        let engine = Engine::create(Arc::clone(&self.core), Arc::clone(&backend), &self.config)?;
        info!(backend = backend.name(), "sound system initialized");

        *native = Some(Native {
            backend: Arc::clone(&backend),
            engine: engine.clone(),
        });
        Ok((backend, engine))
    }

    fn init_or_record(&self) -> Option<(Arc<dyn AudioBackend>, Engine)> {
        match self.ensure_init() {
            Ok(native) => Some(native),
            Err(err) => {
                warn!("sound system initialization failed: {err}");
                self.core.last_error.set(err.code());
                None
            }
        }
    }

    /// Bring the backend and engine up if they are not already.
    pub fn init(&self) -> bool {
        self.init_or_record().is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.native.lock().is_some()
    }

    /// The engine, initializing on first use.
    pub fn engine(&self) -> Option<Engine> {
        self.init_or_record().map(|(_, engine)| engine)
    }

    /// Re-enumerate devices. On failure the previous lists are kept.
    pub fn refresh_devices(&self) -> bool {
        let Some((backend, _engine)) = self.init_or_record() else {
            return false;
        };
        let result = self.core.refresh(&*backend);
        if let Err(err) = &result {
            warn!("device enumeration failed: {err}");
        }
        self.core.last_error.record(result)
    }

    /// Names of the capture devices, empty if initialization fails.
    pub fn list_inputs(&self) -> Vec<String> {
        if !self.init() {
            return Vec::new();
        }
        self.core.registry.read().input_names().to_vec()
    }

    /// Names of the playback devices, empty if initialization fails.
    pub fn list_outputs(&self) -> Vec<String> {
        if !self.init() {
            return Vec::new();
        }
        self.core.registry.read().output_names().to_vec()
    }

    /// Read access to the device registry as of the last enumeration.
    pub fn registry(&self) -> RwLockReadGuard<'_, DeviceRegistry> {
        self.core.registry.read()
    }

    pub fn last_error(&self) -> ErrorCode {
        self.core.last_error.get()
    }

    /// Drop the engine and backend. The next entry point initializes again.
    pub fn shutdown(&self) -> bool {
        let native = self.native.lock().take();
        match native {
            Some(native) => {
                info!(backend = native.backend.name(), "sound system shut down");
                drop(native);
                true
            }
            None => false,
        }
    }
}
