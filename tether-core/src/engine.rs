//! Engine - In-process resource graph that drives deferred resolution
//!
//! The Engine implements the registration protocol on top of a Provider.
//! Registration itself is synchronous; the provider read happens later on
//! the tokio runtime, once every input of the resource has resolved.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tokio::runtime::Handle;

use crate::deferred::{DeferredValue, Resolution, Resolver};
use crate::provider::Provider;
use crate::registrar::{
    RegisterResourceRequest, RegisteredResource, RegistrationError, ResourceRegistrar,
};
use crate::resource::{PropertyMap, ResourceId, Value};

/// Engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// If true, never call the provider; properties resolve to unknown
    pub dry_run: bool,
}

/// Registrar that resolves resources through a Provider
pub struct Engine<P: Provider> {
    provider: Arc<P>,
    runtime: Handle,
    config: EngineConfig,
    registered: Mutex<HashSet<ResourceId>>,
    next_suffix: AtomicU64,
}

impl<P: Provider + 'static> Engine<P> {
    /// Create an engine that spawns provider reads on `runtime`
    pub fn new(provider: P, runtime: Handle) -> Self {
        Self {
            provider: Arc::new(provider),
            runtime,
            config: EngineConfig::default(),
            registered: Mutex::new(HashSet::new()),
            next_suffix: AtomicU64::new(1),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Whether a resource with this id has been registered
    pub fn is_registered(&self, id: &ResourceId) -> bool {
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    fn validate(&self, request: &RegisterResourceRequest) -> Result<(), RegistrationError> {
        if request.name.is_empty() {
            return Err(RegistrationError::EmptyName(request.resource_type.clone()));
        }

        if !self.provider.supports(&request.resource_type) {
            return Err(RegistrationError::UnsupportedType {
                provider: self.provider.name().to_string(),
                resource_type: request.resource_type.clone(),
            });
        }

        let id = request.id();
        if request.options.id.as_deref() == Some("") {
            return Err(RegistrationError::invalid_options(
                id,
                "pinned id must not be empty",
            ));
        }
        if request.options.depends_on.contains(&id) {
            return Err(RegistrationError::invalid_options(
                id,
                "resource cannot depend on itself",
            ));
        }
        for dependency in &request.options.depends_on {
            if !self.is_registered(dependency) {
                return Err(RegistrationError::invalid_options(
                    id,
                    format!("dependency {} is not registered", dependency),
                ));
            }
        }
        Ok(())
    }

    /// Assign a physical identity unless the options pin one
    fn identifier_for(&self, request: &RegisterResourceRequest) -> String {
        match &request.options.id {
            Some(id) => id.clone(),
            None => {
                let suffix = self.next_suffix.fetch_add(1, Ordering::Relaxed);
                format!("{}-{:08x}", request.name, suffix)
            }
        }
    }

    /// Read the resource once its inputs are known, then settle `resolver`
    fn resolve_when_ready(
        &self,
        id: ResourceId,
        identifier: String,
        inputs: DeferredValue<Vec<(String, Value)>>,
        resolver: Resolver<PropertyMap>,
    ) {
        let provider = Arc::clone(&self.provider);
        let runtime = self.runtime.clone();
        let dry_run = self.config.dry_run;

        inputs.subscribe(move |resolution| match resolution {
            Resolution::Known(_) if dry_run => {
                log::debug!("{}: dry-run, properties left unknown", id);
                resolver.mark_unknown();
            }
            Resolution::Known(pairs) => {
                let inputs: PropertyMap = pairs.iter().cloned().collect();
                runtime.spawn(async move {
                    log::debug!("{}: reading from provider '{}'", id, provider.name());
                    let result = provider.read(&id, &identifier, &inputs).await;
                    match result {
                        Ok(properties) => resolver.resolve(properties),
                        Err(error) => {
                            log::warn!("{}: provider read failed: {}", id, error);
                            resolver.fail(error.into_resolution_error(id));
                        }
                    }
                });
            }
            Resolution::Unknown => {
                log::debug!("{}: inputs unknown, properties left unknown", id);
                resolver.mark_unknown();
            }
            Resolution::Failed(error) => {
                log::debug!("{}: input failed: {}", id, error);
                resolver.fail(error.clone());
            }
        });
    }
}

impl<P: Provider + 'static> ResourceRegistrar for Engine<P> {
    fn register_resource(
        &self,
        request: RegisterResourceRequest,
    ) -> Result<RegisteredResource, RegistrationError> {
        self.validate(&request)?;

        let id = request.id();
        {
            let mut registered = self
                .registered
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !registered.insert(id.clone()) {
                return Err(RegistrationError::Duplicate(id));
            }
        }

        let identifier = self.identifier_for(&request);
        log::debug!(
            "registered {} (version {}) as '{}'",
            id,
            request.type_version,
            identifier
        );

        let inputs = DeferredValue::all(
            request
                .inputs
                .into_iter()
                .map(|(key, value)| value.map(move |value| (key, value))),
        );

        let dependencies = inputs
            .dependencies()
            .iter()
            .cloned()
            .chain(request.options.depends_on.iter().cloned())
            .chain(std::iter::once(id.clone()));
        let (properties, resolver) = DeferredValue::pending(dependencies);

        self.resolve_when_ready(id.clone(), identifier.clone(), inputs, resolver);

        Ok(RegisteredResource {
            id,
            identifier,
            properties,
        })
    }
}
