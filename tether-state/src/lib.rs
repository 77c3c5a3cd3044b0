//! Tether State - Terraform remote state references
//!
//! This crate lets a program read the root outputs of a Terraform state it
//! does not manage. It provides:
//!
//! - **BackendConfig**: A trait for backend configurations, one type per
//!   backend kind (S3, local), each tagged with a `backendType` discriminant
//! - **BackendRegistry**: Decodes resolved payloads back into typed
//!   configurations by discriminant
//! - **RemoteStateReference**: A read-only resource whose outputs resolve
//!   from the referenced state
//!
//! # Example
//!
//! ```ignore
//! use tether_state::{RemoteStateReference, S3Backend};
//!
//! let backend = S3Backend::builder()
//!     .bucket("my-state-bucket")
//!     .key("network/terraform.tfstate")
//!     .region("us-east-1")
//!     .build()?;
//!
//! let network = RemoteStateReference::new(&engine, "network", backend)?;
//! let vpc_id = network.get_output("vpc_id");
//! ```

pub mod backend;
pub mod backends;
pub mod reference;

pub use backend::{
    BACKEND_TYPE_KEY, BackendConfig, BackendConfigError, BackendPayload, BackendResult, FromValue,
};
pub use backends::{
    BackendDecoder, BackendRegistry, LocalBackend, LocalBackendBuilder, S3Backend,
    S3BackendBuilder,
};
pub use reference::{
    OUTPUTS_PROPERTY, OutputMap, REMOTE_STATE_REFERENCE_TYPE, RemoteStateReference,
    RemoteStateReferenceType,
};
