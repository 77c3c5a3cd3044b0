//! Tether Core
//!
//! Deferred, dependency-tracked values and the resource registration
//! protocol that populates them.

pub mod deferred;
pub mod engine;
pub mod provider;
pub mod registrar;
pub mod resource;

pub use deferred::{DeferredValue, Resolution, ResolutionError, Resolver};
pub use engine::{Engine, EngineConfig};
pub use provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
pub use registrar::{
    RegisterResourceRequest, RegisteredResource, RegistrationError, ResourceRegistrar,
};
pub use resource::{InputMap, PropertyMap, ResourceId, ResourceOptions, Value};
