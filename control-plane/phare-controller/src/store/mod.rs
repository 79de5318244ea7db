//! Object-store seam between the reconcile logic and the cluster.
//!
//! Everything is addressed by [`ApiResource`] and exchanged as
//! [`DynamicObject`], so typed core kinds and schema-less policy kinds go
//! through the same calls. Typed callers convert with [`to_dynamic`] and
//! [`from_dynamic`].

mod api;
pub mod memory;
pub mod merge_patch;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::discovery::ApiResource;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

pub use api::KubeStore;
pub use memory::MemoryStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },
    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors that a fresh read followed by a new attempt can resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::AlreadyExists { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` when the object (or its resource type) does not exist.
    async fn get(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError>;

    /// Lists objects in `ns` matching an equality-based label selector.
    async fn list(
        &self,
        ar: &ApiResource,
        ns: &str,
        selector: &str,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    async fn create(
        &self,
        ar: &ApiResource,
        ns: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Applies a JSON merge patch. A `metadata.resourceVersion` inside the
    /// patch acts as an optimistic-lock precondition.
    async fn patch(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, StoreError>;

    /// Merge patch against the status subresource.
    async fn patch_status(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, StoreError>;

    async fn delete(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
    ) -> Result<(), StoreError>;
}

pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub fn from_dynamic<K: DeserializeOwned>(
    obj: &DynamicObject,
) -> Result<K, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Typed `get` on top of [`ObjectStore::get`].
pub async fn get_typed<K: DeserializeOwned>(
    store: &dyn ObjectStore,
    ar: &ApiResource,
    ns: &str,
    name: &str,
) -> Result<Option<K>, StoreError> {
    match store.get(ar, ns, name).await? {
        Some(obj) => Ok(Some(from_dynamic(&obj)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    #[test]
    fn typed_round_trip_keeps_type_meta() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("demo-config".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            data: Some([("A".to_string(), "1".to_string())].into()),
            ..Default::default()
        };
        let dynamic = to_dynamic(&cm).unwrap();
        let types = dynamic.types.clone().unwrap();
        assert_eq!(types.api_version, "v1");
        assert_eq!(types.kind, "ConfigMap");
        assert_eq!(dynamic.data["data"]["A"], "1");

        let back: ConfigMap = from_dynamic(&dynamic).unwrap();
        assert_eq!(back, cm);
    }

    #[test]
    fn conflict_classification() {
        let e = StoreError::AlreadyExists {
            kind: "Service".into(),
            name: "demo".into(),
        };
        assert!(e.is_conflict());
        let e = StoreError::NotFound {
            kind: "Service".into(),
            name: "demo".into(),
        };
        assert!(!e.is_conflict());
        assert!(e.is_not_found());
    }
}
