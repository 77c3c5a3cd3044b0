//! Provider - Trait abstracting the process that reads resource properties
//!
//! A Provider knows how to turn a resource's resolved inputs into its output
//! properties (for a remote state reference: locate the state blob in its
//! backend and return the root outputs). The engine calls it once per
//! registered resource.

use std::future::Future;
use std::pin::Pin;

use crate::deferred::ResolutionError;
use crate::resource::{PropertyMap, ResourceId};

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Convert into the failure carried by the resource's deferred properties
    ///
    /// The cause chain is flattened into the message since resolution errors
    /// are cloned to every dependent value.
    pub fn into_resolution_error(self, resource: ResourceId) -> ResolutionError {
        let message = match &self.cause {
            Some(cause) => format!("{}: {}", self.message, cause),
            None => self.message,
        };
        ResolutionError::provider(self.resource_id.unwrap_or(resource), message)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type tag (e.g., "terraform:state:RemoteStateReference")
    fn name(&self) -> &'static str;
}

/// Main Provider trait
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "terraform")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Read the output properties of a resource
    ///
    /// `identifier` is the physical identity assigned at registration and
    /// `inputs` is the flat, fully resolved input payload.
    fn read(
        &self,
        id: &ResourceId,
        identifier: &str,
        inputs: &PropertyMap,
    ) -> BoxFuture<'_, ProviderResult<PropertyMap>>;

    /// Whether this Provider handles `resource_type`
    fn supports(&self, resource_type: &str) -> bool {
        self.resource_types()
            .iter()
            .any(|t| t.name() == resource_type)
    }
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: &str,
        inputs: &PropertyMap,
    ) -> BoxFuture<'_, ProviderResult<PropertyMap>> {
        (**self).read(id, identifier, inputs)
    }

    fn supports(&self, resource_type: &str) -> bool {
        (**self).supports(resource_type)
    }
}
