//! Registrar - The resource registration protocol
//!
//! Resources do not resolve themselves. They hand their type tag, name,
//! inputs and options to a [`ResourceRegistrar`], which assigns identity
//! and returns the deferred properties it will populate later.

use thiserror::Error;

use crate::deferred::DeferredValue;
use crate::resource::{InputMap, PropertyMap, ResourceId, ResourceOptions};

/// Errors rejected synchronously at registration time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The resource name is empty
    #[error("Resource name for type '{0}' must not be empty")]
    EmptyName(String),

    /// A resource with the same type and name is already registered
    #[error("Duplicate resource: {0} is already registered")]
    Duplicate(ResourceId),

    /// The supplied options cannot be honored
    #[error("Invalid options for {resource}: {message}")]
    InvalidOptions {
        resource: ResourceId,
        message: String,
    },

    /// No provider handles this resource type
    #[error("Provider '{provider}' does not support resource type '{resource_type}'")]
    UnsupportedType {
        provider: String,
        resource_type: String,
    },
}

impl RegistrationError {
    pub fn invalid_options(resource: ResourceId, message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            resource,
            message: message.into(),
        }
    }
}

/// Everything a resource hands over when it registers
#[derive(Debug, Clone)]
pub struct RegisterResourceRequest {
    /// Fixed type tag identifying the resource kind to the provider
    pub resource_type: String,
    /// Version of the binding that declares the type
    pub type_version: String,
    /// Logical name, unique within the graph for this type
    pub name: String,
    /// Input properties, possibly still pending
    pub inputs: InputMap,
    pub options: ResourceOptions,
}

impl RegisterResourceRequest {
    pub fn new(
        resource_type: impl Into<String>,
        type_version: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            type_version: type_version.into(),
            name: name.into(),
            inputs: InputMap::new(),
            options: ResourceOptions::default(),
        }
    }

    pub fn with_inputs(mut self, inputs: InputMap) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_options(mut self, options: ResourceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }
}

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct RegisteredResource {
    pub id: ResourceId,
    /// Physical identity assigned by the registrar
    pub identifier: String,
    /// Output properties, populated once after registration
    pub properties: DeferredValue<PropertyMap>,
}

/// The registration protocol
pub trait ResourceRegistrar: Send + Sync {
    /// Register a resource
    ///
    /// Fails synchronously for invalid requests (empty or duplicate names,
    /// bad options). Provider-side failures surface later through the
    /// returned properties instead.
    fn register_resource(
        &self,
        request: RegisterResourceRequest,
    ) -> Result<RegisteredResource, RegistrationError>;
}

impl<R: ResourceRegistrar + ?Sized> ResourceRegistrar for &R {
    fn register_resource(
        &self,
        request: RegisterResourceRequest,
    ) -> Result<RegisteredResource, RegistrationError> {
        (**self).register_resource(request)
    }
}

impl<R: ResourceRegistrar + ?Sized> ResourceRegistrar for std::sync::Arc<R> {
    fn register_resource(
        &self,
        request: RegisterResourceRequest,
    ) -> Result<RegisteredResource, RegistrationError> {
        (**self).register_resource(request)
    }
}
