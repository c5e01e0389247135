//! Service registry.
//!
//! Capability providers are registered by type or by name and looked up by
//! hosted code. Entries live until [`ServiceRegistry::clear`]; there is no
//! eviction.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

type Service = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ServiceKey {
    Type(TypeId),
    Named(String),
}

/// Type- and name-keyed lookup of shared service instances.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<ServiceKey, Service>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under its own type, replacing any previous entry.
    pub fn register<T: Any + Send + Sync>(&self, service: Arc<T>) {
        debug!(service = type_name::<T>(), "Registered service");
        self.insert(ServiceKey::Type(TypeId::of::<T>()), service);
    }

    /// Register `service` under `name`, replacing any previous entry.
    pub fn register_named<T: Any + Send + Sync>(&self, name: impl Into<String>, service: Arc<T>) {
        let name = name.into();
        debug!(service = %name, "Registered named service");
        self.insert(ServiceKey::Named(name), service);
    }

    /// Look up the service registered under type `T`.
    #[must_use]
    pub fn lookup<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.find(&ServiceKey::Type(TypeId::of::<T>()))
    }

    /// Look up the service registered under `name`, if it is a `T`.
    #[must_use]
    pub fn lookup_named<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.find(&ServiceKey::Named(name.to_owned()))
    }

    /// Like [`lookup`](Self::lookup), failing when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ServiceNotFound`] naming `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> RuntimeResult<Arc<T>> {
        self.lookup::<T>()
            .ok_or_else(|| RuntimeError::ServiceNotFound(type_name::<T>().to_owned()))
    }

    /// Like [`lookup_named`](Self::lookup_named), failing when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ServiceNotFound`] naming `name`.
    pub fn get_named<T: Any + Send + Sync>(&self, name: &str) -> RuntimeResult<Arc<T>> {
        self.lookup_named::<T>(name)
            .ok_or_else(|| RuntimeError::ServiceNotFound(name.to_owned()))
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: ServiceKey, service: Service) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, service);
    }

    fn find<T: Any + Send + Sync>(&self, key: &ServiceKey) -> Option<Arc<T>> {
        let service = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        service.downcast::<T>().ok()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("service_count", &self.len())
            .finish()
    }
}
