//! Backend configuration variants and the discriminant registry

mod local;
mod s3;

pub use local::{LocalBackend, LocalBackendBuilder};
pub use s3::{S3Backend, S3BackendBuilder};

use std::collections::BTreeMap;

use tether_core::{PropertyMap, Value};

use crate::backend::{BackendConfig, BackendConfigError, BackendPayload, BackendResult};

/// Decodes a resolved payload into a typed configuration
pub type BackendDecoder = fn(&BackendPayload) -> BackendResult<Box<dyn BackendConfig>>;

fn decode_s3(payload: &BackendPayload) -> BackendResult<Box<dyn BackendConfig>> {
    Ok(Box::new(S3Backend::from_payload(payload)?))
}

fn decode_local(payload: &BackendPayload) -> BackendResult<Box<dyn BackendConfig>> {
    Ok(Box::new(LocalBackend::from_payload(payload)?))
}

/// Maps backend discriminants to decoders
///
/// Adding a backend kind means registering one more decoder; nothing that
/// consumes [`BackendConfig`] needs to change.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    decoders: BTreeMap<&'static str, BackendDecoder>,
}

impl BackendRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// A registry with every backend shipped in this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(S3Backend::BACKEND_TYPE, decode_s3);
        registry.register(LocalBackend::BACKEND_TYPE, decode_local);
        registry
    }

    /// Register a decoder, returning the one it replaces
    pub fn register(
        &mut self,
        backend_type: &'static str,
        decoder: BackendDecoder,
    ) -> Option<BackendDecoder> {
        self.decoders.insert(backend_type, decoder)
    }

    /// Registered discriminants, sorted
    pub fn backend_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Decode a payload, dispatching on its discriminant
    pub fn decode(&self, payload: &BackendPayload) -> BackendResult<Box<dyn BackendConfig>> {
        match self.decoders.get(payload.backend_type.as_str()) {
            Some(decoder) => decoder(payload),
            None => Err(BackendConfigError::unsupported_backend(
                payload.backend_type.as_str(),
            )),
        }
    }

    /// Decode a flat property map carrying its own discriminant
    pub fn decode_properties(
        &self,
        properties: PropertyMap,
    ) -> BackendResult<Box<dyn BackendConfig>> {
        self.decode(&BackendPayload::from_properties(properties)?)
    }

    /// Decode a JSON object such as `{"backendType": "s3", "bucket": ...}`
    pub fn decode_json(&self, json: &str) -> BackendResult<Box<dyn BackendConfig>> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| BackendConfigError::Serialization(e.to_string()))?;

        match Value::from(value) {
            Value::Map(properties) => self.decode_properties(properties),
            other => Err(BackendConfigError::Serialization(format!(
                "expected a JSON object, got {}",
                other.type_name()
            ))),
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BACKEND_TYPE_KEY;
    use tether_core::{InputMap, Resolution};

    #[derive(Debug)]
    struct HttpBackend {
        address: String,
    }

    impl BackendConfig for HttpBackend {
        fn backend_type(&self) -> &'static str {
            "http"
        }

        fn fields(&self) -> InputMap {
            let mut fields = InputMap::new();
            fields.insert(
                "address".to_string(),
                tether_core::DeferredValue::of(Value::from(self.address.as_str())),
            );
            fields
        }
    }

    fn decode_http(payload: &BackendPayload) -> BackendResult<Box<dyn BackendConfig>> {
        let address = payload
            .get_string("address")?
            .ok_or(BackendConfigError::missing_required("http", "address"))?;
        Ok(Box::new(HttpBackend { address }))
    }

    #[test]
    fn test_builtin_backend_types() {
        let registry = BackendRegistry::with_builtin();
        assert_eq!(registry.backend_types().collect::<Vec<_>>(), vec!["local", "s3"]);
    }

    #[test]
    fn test_decode_json_s3() {
        let registry = BackendRegistry::default();
        let config = registry
            .decode_json(
                r#"{
                    "backendType": "s3",
                    "bucket": "my-bucket",
                    "key": "prod/terraform.tfstate",
                    "region": "us-east-1"
                }"#,
            )
            .unwrap();

        assert_eq!(config.backend_type(), "s3");
        let inputs = config.inputs();
        assert_eq!(
            inputs["region"].peek(),
            Some(Resolution::Known(Value::from("us-east-1")))
        );
        assert_eq!(inputs.len(), 4);
    }

    #[test]
    fn test_decode_json_local() {
        let registry = BackendRegistry::default();
        let config = registry
            .decode_json(r#"{"backendType": "local", "path": "terraform.tfstate"}"#)
            .unwrap();
        assert_eq!(config.backend_type(), "local");
    }

    #[test]
    fn test_unsupported_backend() {
        let registry = BackendRegistry::with_builtin();
        let result = registry.decode_json(r#"{"backendType": "azurerm"}"#);

        if let Err(BackendConfigError::UnsupportedBackend(name)) = result {
            assert_eq!(name, "azurerm");
        } else {
            panic!("Expected UnsupportedBackend error");
        }
    }

    #[test]
    fn test_decode_json_rejects_non_object() {
        let registry = BackendRegistry::with_builtin();
        assert!(matches!(
            registry.decode_json("[1, 2]"),
            Err(BackendConfigError::Serialization(_))
        ));
        assert!(matches!(
            registry.decode_json("{not json"),
            Err(BackendConfigError::Serialization(_))
        ));
    }

    #[test]
    fn test_decode_reports_missing_required_field() {
        let registry = BackendRegistry::with_builtin();
        assert_eq!(
            registry
                .decode_json(r#"{"backendType": "s3", "key": "k"}"#)
                .unwrap_err(),
            BackendConfigError::missing_required("s3", "bucket")
        );
    }

    #[test]
    fn test_register_custom_backend() {
        let mut registry = BackendRegistry::with_builtin();
        assert!(registry.register("http", decode_http).is_none());

        let config = registry
            .decode_json(r#"{"backendType": "http", "address": "https://state.example.com"}"#)
            .unwrap();
        assert_eq!(config.backend_type(), "http");
        assert_eq!(
            config.inputs()[BACKEND_TYPE_KEY].peek(),
            Some(Resolution::Known(Value::from("http")))
        );
    }

    #[test]
    fn test_encode_then_decode_through_registry() {
        let original = S3Backend::builder()
            .bucket("b")
            .key("k")
            .skip_metadata_api_check(true)
            .build()
            .unwrap();

        let properties: PropertyMap = original
            .inputs()
            .into_iter()
            .filter_map(|(k, v)| match v.peek() {
                Some(Resolution::Known(value)) => Some((k, value)),
                _ => None,
            })
            .collect();

        let decoded = BackendRegistry::with_builtin()
            .decode_properties(properties)
            .unwrap();
        assert_eq!(decoded.backend_type(), "s3");
        assert_eq!(decoded.inputs().len(), original.inputs().len());
    }
}
