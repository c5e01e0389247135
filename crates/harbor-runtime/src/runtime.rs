//! The lifecycle controller.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use harbor_config::Config;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::dirs;
use crate::error::{RuntimeError, RuntimeResult};
use crate::events::{DEFAULT_EVENT_CAPACITY, LifecycleEvent};
use crate::gateway::{GatewayFactory, LoaderGateway};
use crate::record::{ExtensionKind, ModuleKind, Record};
use crate::registry::Registry;
use crate::report::{LifecycleReport, Stage};
use crate::services::ServiceRegistry;

/// The instance `init` most recently succeeded on.
static CURRENT: RwLock<Option<Runtime>> = RwLock::new(None);

enum Phase {
    Built,
    Initializing,
    Ready(Arc<dyn LoaderGateway>),
    Failed,
}

struct RuntimeInner {
    config: Config,
    factory: Box<dyn GatewayFactory>,
    phase: Mutex<Phase>,
    /// Set once the configured initial modules have been added.
    seeded: AtomicBool,
    modules: Registry<ModuleKind>,
    extensions: Registry<ExtensionKind>,
    services: ServiceRegistry,
    events: broadcast::Sender<LifecycleEvent>,
}

/// Runtime container: owns the module and extension registries and drives
/// every lifecycle transition through the loader gateway.
///
/// `Runtime` is a cheap handle; clones share the same instance and compare
/// equal.
///
/// `init` stores a handle to the instance in its own service registry and in
/// the process-wide [`current`](Self::current) slot. Those references keep
/// the instance alive after every caller has dropped theirs; call
/// [`shutdown`](Self::shutdown) to release them.
///
/// ```rust,ignore
/// let runtime = Runtime::build(config, factory);
/// runtime.init().await?;
/// runtime.add_module("mvn:commons-lang/commons-lang/2.6").await?;
/// let report = runtime.start().await?;
/// assert!(report.is_success());
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Bind a new, uninitialized runtime to `config`.
    ///
    /// The gateway is not created until [`init`](Self::init).
    #[must_use]
    pub fn build(config: Config, factory: impl GatewayFactory + 'static) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                factory: Box::new(factory),
                phase: Mutex::new(Phase::Built),
                seeded: AtomicBool::new(false),
                modules: Registry::new(events.clone()),
                extensions: Registry::new(events.clone()),
                services: ServiceRegistry::new(),
                events,
            }),
        }
    }

    /// Prepare directories, create the loader gateway and make this instance
    /// the process-wide [`current`](Self::current) runtime.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::AlreadyInitialized`] if `init` was already called.
    /// - [`RuntimeError::Directory`] if a directory cannot be created or the
    ///   cache cannot be cleared.
    /// - [`RuntimeError::GatewayInit`] if the gateway factory fails.
    ///
    /// A directory or gateway failure leaves the instance unusable.
    pub async fn init(&self) -> RuntimeResult<()> {
        {
            let mut phase = self.lock_phase();
            match *phase {
                Phase::Built => *phase = Phase::Initializing,
                Phase::Failed => return Err(RuntimeError::InitFailed),
                Phase::Initializing | Phase::Ready(_) => {
                    return Err(RuntimeError::AlreadyInitialized);
                },
            }
        }

        let gateway = match self.establish().await {
            Ok(gateway) => gateway,
            Err(e) => {
                error!(error = %e, "Runtime initialization failed");
                *self.lock_phase() = Phase::Failed;
                return Err(e);
            },
        };
        *self.lock_phase() = Phase::Ready(gateway);

        self.inner.services.register(Arc::new(self.clone()));
        *CURRENT.write().unwrap_or_else(PoisonError::into_inner) = Some(self.clone());

        info!(
            base_dir = %self.inner.config.base_dir().display(),
            default_start_level = self.inner.config.default_start_level(),
            "Runtime initialized"
        );
        Ok(())
    }

    async fn establish(&self) -> RuntimeResult<Arc<dyn LoaderGateway>> {
        dirs::prepare(&self.inner.config).await?;
        self.inner
            .factory
            .create(&self.inner.config)
            .map_err(RuntimeError::GatewayInit)
    }

    /// Resolve and activate every record that is not yet active, extensions
    /// first, then modules, each in ascending start level order.
    ///
    /// The first call also adds the configured initial modules; a reference
    /// that fails to load is reported with [`Stage::Load`]. Per-record
    /// failures never abort the batch: inspect the returned report.
    ///
    /// # Errors
    ///
    /// Only fails if the runtime is not initialized.
    pub async fn start(&self) -> RuntimeResult<LifecycleReport> {
        let gateway = self.gateway()?;
        let mut report = LifecycleReport::default();

        if !self.inner.seeded.swap(true, Ordering::SeqCst) {
            for reference in self.inner.config.modules() {
                match self
                    .inner
                    .modules
                    .add(&*gateway, reference, self.default_start_level())
                    .await
                {
                    Ok(_) => {},
                    Err(RuntimeError::LoadFailure {
                        kind,
                        reference,
                        source,
                    }) => report.record_failure(kind, &reference, Stage::Load, source),
                    Err(e) => return Err(e),
                }
            }
        }

        self.inner.extensions.start_all(&*gateway, &mut report).await;
        self.inner.modules.start_all(&*gateway, &mut report).await;

        if report.is_success() {
            info!(%report, "Runtime started");
        } else {
            warn!(%report, failed = ?report.failed_references(), "Runtime started with failures");
        }
        Ok(report)
    }

    /// Deactivate every active record, modules first, then extensions, each
    /// in descending start level order. Records stay installed.
    ///
    /// # Errors
    ///
    /// Only fails if the runtime is not initialized.
    pub async fn stop(&self) -> RuntimeResult<LifecycleReport> {
        let gateway = self.gateway()?;
        let mut report = LifecycleReport::default();
        self.inner.modules.stop_all(&*gateway, &mut report).await;
        self.inner.extensions.stop_all(&*gateway, &mut report).await;
        info!(%report, "Runtime stopped");
        Ok(report)
    }

    /// Install a module, or return the existing record for `reference`.
    ///
    /// Between [`start`](Self::start) and [`stop`](Self::stop) the module is
    /// also activated. Whether to activate is decided under the module
    /// registry lock, so an add racing `stop` stays installed.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::LoadFailure`] if the gateway cannot load the
    /// reference, [`RuntimeError::ResolutionFailure`] if post-start
    /// activation fails. The registry is unchanged in both cases.
    pub async fn add_module(&self, reference: &str) -> RuntimeResult<Record> {
        let gateway = self.gateway()?;
        self.inner
            .modules
            .add(&*gateway, reference, self.default_start_level())
            .await
    }

    /// Install an extension, or return the existing record for `reference`.
    ///
    /// # Errors
    ///
    /// As for [`add_module`](Self::add_module).
    pub async fn add_extension(&self, reference: &str) -> RuntimeResult<Record> {
        let gateway = self.gateway()?;
        self.inner
            .extensions
            .add(&*gateway, reference, self.default_start_level())
            .await
    }

    /// Stop (if active) and uninstall a module.
    ///
    /// Returns the final snapshot, or `None` if `reference` was not installed.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StopFailure`] or [`RuntimeError::UninstallFailure`];
    /// the module stays registered.
    pub async fn remove_module(&self, reference: &str) -> RuntimeResult<Option<Record>> {
        let gateway = self.gateway()?;
        self.inner.modules.remove(&*gateway, reference, false).await
    }

    /// Stop (if active) and uninstall an extension.
    ///
    /// With `force`, stop and uninstall errors are logged and swallowed and
    /// the extension is always removed.
    ///
    /// # Errors
    ///
    /// Without `force`, as for [`remove_module`](Self::remove_module).
    pub async fn remove_extension(
        &self,
        reference: &str,
        force: bool,
    ) -> RuntimeResult<Option<Record>> {
        let gateway = self.gateway()?;
        self.inner.extensions.remove(&*gateway, reference, force).await
    }

    /// Snapshot of an installed module.
    pub async fn module(&self, reference: &str) -> Option<Record> {
        self.inner.modules.get(reference).await
    }

    /// Snapshots of every installed module, in insertion order.
    pub async fn modules(&self) -> Vec<Record> {
        self.inner.modules.all().await
    }

    /// Snapshot of an installed extension.
    pub async fn extension(&self, reference: &str) -> Option<Record> {
        self.inner.extensions.get(reference).await
    }

    /// Snapshots of every installed extension, in insertion order.
    pub async fn extensions(&self) -> Vec<Record> {
        self.inner.extensions.all().await
    }

    /// Register a capability provider under its type.
    pub fn register_service<T: Any + Send + Sync>(&self, service: Arc<T>) {
        self.inner.services.register(service);
    }

    /// Register a capability provider under `name`.
    pub fn register_named_service<T: Any + Send + Sync>(
        &self,
        name: impl Into<String>,
        service: Arc<T>,
    ) {
        self.inner.services.register_named(name, service);
    }

    /// Look up a capability provider by type. The runtime registers itself
    /// during `init`, so `get_service::<Runtime>()` always succeeds once
    /// initialized.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::ServiceNotFound`] if nothing is registered for `T`,
    /// or an init-phase error if the runtime is not usable.
    pub fn get_service<T: Any + Send + Sync>(&self) -> RuntimeResult<Arc<T>> {
        self.gateway()?;
        self.inner.services.get::<T>()
    }

    /// Look up a capability provider by name.
    ///
    /// # Errors
    ///
    /// As for [`get_service`](Self::get_service).
    pub fn get_named_service<T: Any + Send + Sync>(&self, name: &str) -> RuntimeResult<Arc<T>> {
        self.gateway()?;
        self.inner.services.get_named::<T>(name)
    }

    /// The runtime `init` most recently succeeded on.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotInitialized`] if no runtime is current.
    pub fn current() -> RuntimeResult<Self> {
        CURRENT
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RuntimeError::NotInitialized)
    }

    /// Forget the current runtime without tearing it down.
    #[cfg(any(test, feature = "test-support"))]
    pub fn clear_current() {
        CURRENT.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Receive every subsequent lifecycle transition.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// The configuration this runtime was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether `start` has run since the last `stop`.
    pub async fn is_started(&self) -> bool {
        self.inner.modules.is_started().await
    }

    /// Full teardown: force-remove every extension, remove every module,
    /// clear the service registry and release the process-wide handle if
    /// this instance holds it. The instance may be initialized again.
    ///
    /// Module removal continues past failures. If any module could not be
    /// removed the teardown stops there: the runtime stays initialized and
    /// current, so the module can be dealt with and `shutdown` retried.
    ///
    /// # Errors
    ///
    /// Returns the first module removal error.
    pub async fn shutdown(&self) -> RuntimeResult<()> {
        let gateway = self.gateway()?;

        for reference in self.inner.extensions.references().await.iter().rev() {
            self.inner.extensions.remove(&*gateway, reference, true).await?;
        }

        let mut first_error = None;
        for reference in self.inner.modules.references().await.iter().rev() {
            if let Err(e) = self.inner.modules.remove(&*gateway, reference, false).await {
                warn!(reference = %reference, error = %e, "Module removal failed during shutdown");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        self.inner.services.clear();
        {
            let mut current = CURRENT.write().unwrap_or_else(PoisonError::into_inner);
            if current.as_ref() == Some(self) {
                *current = None;
            }
        }
        self.inner.modules.reset_started().await;
        self.inner.extensions.reset_started().await;
        self.inner.seeded.store(false, Ordering::SeqCst);
        *self.lock_phase() = Phase::Built;
        debug!("Runtime shut down");
        Ok(())
    }

    fn gateway(&self) -> RuntimeResult<Arc<dyn LoaderGateway>> {
        match &*self.lock_phase() {
            Phase::Ready(gateway) => Ok(Arc::clone(gateway)),
            Phase::Built | Phase::Initializing => Err(RuntimeError::NotInitialized),
            Phase::Failed => Err(RuntimeError::InitFailed),
        }
    }

    fn lock_phase(&self) -> std::sync::MutexGuard<'_, Phase> {
        self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn default_start_level(&self) -> i32 {
        self.inner.config.default_start_level()
    }
}

impl PartialEq for Runtime {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Runtime {}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match &*self.lock_phase() {
            Phase::Built => "built",
            Phase::Initializing => "initializing",
            Phase::Ready(_) => "ready",
            Phase::Failed => "failed",
        };
        f.debug_struct("Runtime")
            .field("phase", &phase)
            .field("base_dir", &self.inner.config.base_dir())
            .field("services", &self.inner.services)
            .finish_non_exhaustive()
    }
}
