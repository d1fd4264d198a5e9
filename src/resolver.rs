//! Service resolution for resolver-dependent pipeline components.
//!
//! The executor only ever talks to the [`Resolver`] contract; any dependency
//! injection container can sit behind it. [`ServiceRegistry`] is the reference
//! implementation used by composition roots and tests.

use crate::builder::PipelineBuilder;
use crate::errors::ResolutionError;
use crate::pipeline::Pipeline;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Identifies a service by concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// Creates the key for the type `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the service type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

/// External facility that locates or constructs a service for a key.
///
/// A resolver may hand back a shared instance or construct a transient one on
/// demand; the pipeline does not care which.
pub trait Resolver: Send + Sync {
    /// Resolves the service registered under `key`.
    fn resolve(&self, key: ServiceKey) -> Result<Arc<dyn Any + Send + Sync>, ResolutionError>;
}

/// Typed sugar over [`Resolver::resolve`].
pub trait ResolverExt {
    /// Resolves and downcasts the service of type `T`.
    fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolutionError>;
}

impl<R: Resolver + ?Sized> ResolverExt for R {
    fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolutionError> {
        let key = ServiceKey::of::<T>();
        let service = self.resolve(key)?;
        service
            .downcast::<T>()
            .map_err(|_| ResolutionError::new(key.type_name()))
    }
}

/// Factory for transient service construction.
type ServiceFactory = Box<dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync>;

/// A minimal service registry: shared singletons plus transient factories.
#[derive(Default)]
pub struct ServiceRegistry {
    singletons: RwLock<HashMap<ServiceKey, Arc<dyn Any + Send + Sync>>>,
    factories: RwLock<HashMap<ServiceKey, ServiceFactory>>,
}

impl ServiceRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shared instance, resolved as the same `Arc` every time.
    pub fn add_singleton<T: Send + Sync + 'static>(&self, service: Arc<T>) {
        self.singletons.write().insert(ServiceKey::of::<T>(), service);
    }

    /// Registers a factory, invoked fresh on every resolution.
    pub fn add_transient<T, F>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(ServiceKey::of::<T>(), Box::new(move || Arc::new(factory())));
    }

    /// Returns whether a service is registered for `key`.
    #[must_use]
    pub fn contains(&self, key: ServiceKey) -> bool {
        self.singletons.read().contains_key(&key) || self.factories.read().contains_key(&key)
    }
}

impl Resolver for ServiceRegistry {
    fn resolve(&self, key: ServiceKey) -> Result<Arc<dyn Any + Send + Sync>, ResolutionError> {
        if let Some(service) = self.singletons.read().get(&key) {
            trace!(service = key.type_name(), "resolved singleton");
            return Ok(Arc::clone(service));
        }
        if let Some(factory) = self.factories.read().get(&key) {
            trace!(service = key.type_name(), "constructed transient");
            return Ok(factory());
        }
        debug!(service = key.type_name(), "service not registered");
        Err(ResolutionError::new(key.type_name()))
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("singletons", &self.singletons.read().len())
            .field("factories", &self.factories.read().len())
            .finish()
    }
}

/// Builds the pipeline against `registry` and registers it as a resolvable
/// singleton, so hosting glue can later fetch it with
/// `registry.get::<Pipeline<C>>()`.
pub fn install_pipeline<C: Send + Sync + 'static>(
    registry: &Arc<ServiceRegistry>,
    builder: &PipelineBuilder<C>,
) -> Arc<Pipeline<C>> {
    let resolver: Arc<dyn Resolver> = Arc::clone(registry) as Arc<dyn Resolver>;
    let pipeline = Arc::new(builder.build(resolver));
    registry.add_singleton(Arc::clone(&pipeline));
    pipeline
}
