//! Backend configuration trait and error types
//!
//! Each backend kind is a separate type implementing [`BackendConfig`].
//! The resource that consumes a configuration never looks inside it: it
//! forwards [`BackendConfig::inputs`], a flat map of deferred values tagged
//! with the backend's discriminant, to the registration protocol.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tether_core::{DeferredValue, InputMap, PropertyMap, Value};

/// Payload key carrying the backend discriminant
pub const BACKEND_TYPE_KEY: &str = "backendType";

/// Errors that can occur when building or decoding a backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendConfigError {
    /// A required attribute was not supplied
    #[error("Missing required attribute for {backend} backend: {field}")]
    MissingRequired {
        backend: &'static str,
        field: &'static str,
    },

    /// The payload has no discriminant
    #[error("Missing backend type: payload has no 'backendType' attribute")]
    MissingBackendType,

    /// The backend type is not supported
    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// The payload was decoded by the wrong backend
    #[error("Backend type mismatch: expected {expected}, got {actual}")]
    BackendTypeMismatch {
        expected: &'static str,
        actual: String,
    },

    /// An attribute has the wrong shape
    #[error("Invalid attribute '{field}' for {backend} backend: expected {expected}, got {actual}")]
    InvalidAttribute {
        backend: String,
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// An attribute is not part of the backend's field set
    #[error("Unknown attribute '{field}' for {backend} backend")]
    UnknownAttribute { backend: String, field: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendConfigError {
    pub fn missing_required(backend: &'static str, field: &'static str) -> Self {
        Self::MissingRequired { backend, field }
    }

    pub fn unsupported_backend(backend_type: impl Into<String>) -> Self {
        Self::UnsupportedBackend(backend_type.into())
    }
}

/// Result type for backend configuration operations
pub type BackendResult<T> = Result<T, BackendConfigError>;

/// A member of the backend configuration family
///
/// Implementations carry a fixed discriminant and a set of fields, each
/// held as a deferred value. Optional fields left unset are omitted from
/// [`fields`](Self::fields); resolving them from the environment is the
/// provider's job.
pub trait BackendConfig: fmt::Debug + Send + Sync {
    /// Discriminant identifying this backend (e.g., "s3")
    fn backend_type(&self) -> &'static str;

    /// Backend-specific fields keyed by their wire names
    fn fields(&self) -> InputMap;

    /// Fields plus the discriminant, which always overrides a field of the same name
    fn inputs(&self) -> InputMap {
        let mut inputs = self.fields();
        inputs.insert(
            BACKEND_TYPE_KEY.to_string(),
            DeferredValue::of(Value::from(self.backend_type())),
        );
        inputs
    }
}

/// BackendConfig implementation for Box<dyn BackendConfig>
/// This enables configurations decoded at runtime to be used directly
impl BackendConfig for Box<dyn BackendConfig> {
    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }

    fn fields(&self) -> InputMap {
        (**self).fields()
    }

    fn inputs(&self) -> InputMap {
        (**self).inputs()
    }
}

impl BackendConfig for Arc<dyn BackendConfig> {
    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }

    fn fields(&self) -> InputMap {
        (**self).fields()
    }

    fn inputs(&self) -> InputMap {
        (**self).inputs()
    }
}

/// Attribute types a payload can be decoded into
pub trait FromValue: Sized {
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "Bool";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

/// A fully resolved backend configuration, as a provider receives it
///
/// Serializes to the flat wire shape: `{"backendType": "s3", "bucket": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendPayload {
    /// Backend type (e.g., "s3", "local")
    pub backend_type: String,
    /// Backend-specific attributes
    #[serde(flatten)]
    pub attributes: PropertyMap,
}

impl BackendPayload {
    /// Split the discriminant off a flat property map
    pub fn from_properties(mut properties: PropertyMap) -> BackendResult<Self> {
        let backend_type = match properties.remove(BACKEND_TYPE_KEY) {
            Some(Value::String(backend_type)) => backend_type,
            Some(Value::Null) | None => return Err(BackendConfigError::MissingBackendType),
            Some(other) => {
                return Err(BackendConfigError::InvalidAttribute {
                    backend: "unknown".to_string(),
                    field: BACKEND_TYPE_KEY.to_string(),
                    expected: String::TYPE_NAME,
                    actual: other.type_name(),
                });
            }
        };

        Ok(Self {
            backend_type,
            attributes: properties,
        })
    }

    /// Get a typed attribute; absent and null attributes are `None`
    pub fn get<T: FromValue>(&self, key: &str) -> BackendResult<Option<T>> {
        match self.attributes.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value).map(Some).ok_or_else(|| {
                BackendConfigError::InvalidAttribute {
                    backend: self.backend_type.clone(),
                    field: key.to_string(),
                    expected: T::TYPE_NAME,
                    actual: value.type_name(),
                }
            }),
        }
    }

    /// Get a string attribute value
    pub fn get_string(&self, key: &str) -> BackendResult<Option<String>> {
        self.get(key)
    }

    /// Get a boolean attribute value
    pub fn get_bool(&self, key: &str) -> BackendResult<Option<bool>> {
        self.get(key)
    }

    /// Fail unless the discriminant is `expected`
    pub fn expect_type(&self, expected: &'static str) -> BackendResult<()> {
        if self.backend_type == expected {
            Ok(())
        } else {
            Err(BackendConfigError::BackendTypeMismatch {
                expected,
                actual: self.backend_type.clone(),
            })
        }
    }

    /// Fail on any attribute not listed in `known`
    pub fn ensure_known(&self, known: &[&str]) -> BackendResult<()> {
        match self
            .attributes
            .keys()
            .find(|key| !known.contains(&key.as_str()))
        {
            Some(field) => Err(BackendConfigError::UnknownAttribute {
                backend: self.backend_type.clone(),
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Define a backend configuration type and its validating builder
///
/// Generates the config struct, a builder whose `build` fails on the first
/// missing required field (in declaration order), typed accessors,
/// `from_payload` decoding and the [`BackendConfig`] impl. Fields listed
/// under `secret` must be optional; they are marked secret when built.
macro_rules! define_backend {
    (
        $(#[$meta:meta])*
        $name:ident, $builder:ident, $backend_type:literal;
        required {
            $( $(#[$rdoc:meta])* $req:ident: $req_ty:ty => $req_wire:literal ),* $(,)?
        }
        optional {
            $( $(#[$odoc:meta])* $opt:ident: $opt_ty:ty => $opt_wire:literal ),* $(,)?
        }
        secret { $( $secret:ident ),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            $( $req: ::tether_core::DeferredValue<$req_ty>, )*
            $( $opt: Option<::tether_core::DeferredValue<$opt_ty>>, )*
        }

        #[doc = concat!("Builder for [`", stringify!($name), "`]")]
        #[derive(Debug, Clone, Default)]
        pub struct $builder {
            $( $req: Option<::tether_core::DeferredValue<$req_ty>>, )*
            $( $opt: Option<::tether_core::DeferredValue<$opt_ty>>, )*
        }

        impl $name {
            /// Discriminant of this backend
            pub const BACKEND_TYPE: &'static str = $backend_type;

            /// Wire names of every attribute this backend accepts
            pub const ATTRIBUTES: &'static [&'static str] = &[$($req_wire,)* $($opt_wire,)*];

            pub fn builder() -> $builder {
                $builder::default()
            }

            $(
                $(#[$rdoc])*
                pub fn $req(&self) -> &::tether_core::DeferredValue<$req_ty> {
                    &self.$req
                }
            )*

            $(
                $(#[$odoc])*
                pub fn $opt(&self) -> Option<&::tether_core::DeferredValue<$opt_ty>> {
                    self.$opt.as_ref()
                }
            )*

            /// Decode from a resolved payload, validating like the builder does
            pub fn from_payload(
                payload: &$crate::backend::BackendPayload,
            ) -> $crate::backend::BackendResult<Self> {
                payload.expect_type($backend_type)?;
                payload.ensure_known(Self::ATTRIBUTES)?;

                let mut builder = Self::builder();
                $(
                    if let Some(value) = payload.get::<$req_ty>($req_wire)? {
                        builder = builder.$req(value);
                    }
                )*
                $(
                    if let Some(value) = payload.get::<$opt_ty>($opt_wire)? {
                        builder = builder.$opt(value);
                    }
                )*
                builder.build()
            }
        }

        impl $builder {
            $(
                $(#[$rdoc])*
                pub fn $req(
                    mut self,
                    $req: impl Into<::tether_core::DeferredValue<$req_ty>>,
                ) -> Self {
                    self.$req = Some($req.into());
                    self
                }
            )*

            $(
                $(#[$odoc])*
                pub fn $opt(
                    mut self,
                    $opt: impl Into<::tether_core::DeferredValue<$opt_ty>>,
                ) -> Self {
                    self.$opt = Some($opt.into());
                    self
                }
            )*

            /// Build the configuration, failing on the first missing required field
            pub fn build(self) -> $crate::backend::BackendResult<$name> {
                #[allow(unused_mut)]
                let mut config = $name {
                    $(
                        $req: self.$req.ok_or(
                            $crate::backend::BackendConfigError::missing_required(
                                $backend_type,
                                $req_wire,
                            ),
                        )?,
                    )*
                    $( $opt: self.$opt, )*
                };
                $(
                    config.$secret = config.$secret.map(::tether_core::DeferredValue::into_secret);
                )*
                Ok(config)
            }
        }

        impl $crate::backend::BackendConfig for $name {
            fn backend_type(&self) -> &'static str {
                $backend_type
            }

            fn fields(&self) -> ::tether_core::InputMap {
                let mut fields = ::tether_core::InputMap::new();
                $(
                    fields.insert($req_wire.to_string(), self.$req.map(::tether_core::Value::from));
                )*
                $(
                    if let Some(value) = &self.$opt {
                        fields.insert($opt_wire.to_string(), value.map(::tether_core::Value::from));
                    }
                )*
                fields
            }
        }
    };
}

pub(crate) use define_backend;
