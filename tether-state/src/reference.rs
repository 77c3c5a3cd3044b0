//! Remote state reference - read-only view of another Terraform state
//!
//! A [`RemoteStateReference`] registers itself with a fixed type tag and an
//! identity pinned to its name, forwards its backend configuration as-is,
//! and exposes the root outputs of the referenced state as a deferred map.

use std::collections::BTreeMap;
use std::sync::Arc;

use tether_core::{
    DeferredValue, PropertyMap, RegisterResourceRequest, RegistrationError, ResolutionError,
    ResourceId, ResourceOptions, ResourceRegistrar, ResourceType, Value,
};

use crate::backend::BackendConfig;

/// Type tag of remote state references
pub const REMOTE_STATE_REFERENCE_TYPE: &str = "terraform:state:RemoteStateReference";

/// Property under which the provider returns the root outputs
pub const OUTPUTS_PROPERTY: &str = "outputs";

/// Root outputs of a Terraform state, keyed by output name
pub type OutputMap = BTreeMap<String, Value>;

/// Resource type definition for providers that serve remote state references
pub struct RemoteStateReferenceType;

impl ResourceType for RemoteStateReferenceType {
    fn name(&self) -> &'static str {
        REMOTE_STATE_REFERENCE_TYPE
    }
}

/// A reference to a Terraform remote state
#[derive(Debug, Clone)]
pub struct RemoteStateReference {
    id: ResourceId,
    identifier: String,
    backend: Arc<dyn BackendConfig>,
    outputs: DeferredValue<OutputMap>,
}

impl RemoteStateReference {
    /// Register a reference named `name` that reads the state described by `backend`
    pub fn new<R, B>(
        registrar: &R,
        name: impl Into<String>,
        backend: B,
    ) -> Result<Self, RegistrationError>
    where
        R: ResourceRegistrar + ?Sized,
        B: BackendConfig + 'static,
    {
        Self::with_options(registrar, name, backend, ResourceOptions::default())
    }

    /// Like [`new`](Self::new), with extra resource options
    ///
    /// The identity is always pinned to `name`; an `id` in `options` is
    /// overridden.
    pub fn with_options<R, B>(
        registrar: &R,
        name: impl Into<String>,
        backend: B,
        options: ResourceOptions,
    ) -> Result<Self, RegistrationError>
    where
        R: ResourceRegistrar + ?Sized,
        B: BackendConfig + 'static,
    {
        let name = name.into();
        if let Some(id) = options.id.as_deref().filter(|id| *id != name) {
            log::warn!(
                "remote state reference '{}': ignoring id '{}', references are identified by name",
                name,
                id
            );
        }
        let options = options.merge(ResourceOptions::new().with_id(name.clone()));

        let backend: Arc<dyn BackendConfig> = Arc::new(backend);
        let request = RegisterResourceRequest::new(
            REMOTE_STATE_REFERENCE_TYPE,
            env!("CARGO_PKG_VERSION"),
            name,
        )
        .with_inputs(backend.inputs())
        .with_options(options);

        let registered = registrar.register_resource(request)?;
        log::debug!(
            "remote state reference {} registered with {} backend",
            registered.id,
            backend.backend_type()
        );

        let id = registered.id.clone();
        let outputs = registered
            .properties
            .try_map(move |properties| extract_outputs(&id, properties));

        Ok(Self {
            id: registered.id,
            identifier: registered.identifier,
            backend,
            outputs,
        })
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Physical identity, always equal to the name
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn backend(&self) -> &dyn BackendConfig {
        self.backend.as_ref()
    }

    /// All root outputs of the referenced state
    pub fn outputs(&self) -> &DeferredValue<OutputMap> {
        &self.outputs
    }

    /// Fetch one root output by name
    ///
    /// `name` is spelled exactly as in the Terraform `output` block. A name
    /// absent from the resolved outputs resolves to [`Value::Null`].
    pub fn get_output(&self, name: impl Into<DeferredValue<String>>) -> DeferredValue<Value> {
        name.into()
            .zip(&self.outputs)
            .map(|(name, outputs)| outputs.get(&name).cloned().unwrap_or(Value::Null))
    }

    /// Like [`get_output`](Self::get_output), but an absent name fails the
    /// returned value with [`ResolutionError::MissingOutput`]
    pub fn require_output(
        &self,
        name: impl Into<DeferredValue<String>>,
    ) -> DeferredValue<Value> {
        let resource = self.id.clone();
        name.into()
            .zip(&self.outputs)
            .try_map(move |(name, outputs)| match outputs.get(&name) {
                Some(value) => Ok(value.clone()),
                None => Err(ResolutionError::missing_output(resource, name)),
            })
    }
}

fn extract_outputs(
    id: &ResourceId,
    mut properties: PropertyMap,
) -> Result<OutputMap, ResolutionError> {
    match properties.remove(OUTPUTS_PROPERTY) {
        Some(Value::Map(outputs)) => Ok(outputs),
        Some(other) => Err(ResolutionError::invalid_property(
            id.clone(),
            OUTPUTS_PROPERTY,
            format!("expected Map, got {}", other.type_name()),
        )),
        None => Err(ResolutionError::invalid_property(
            id.clone(),
            OUTPUTS_PROPERTY,
            "missing from provider response",
        )),
    }
}
