//! In-process [`ObjectStore`] used by tests and dry runs.
//!
//! Mimics the parts of API-server behaviour the reconciler depends on:
//! resource versions bumped on every write, UIDs assigned on create,
//! optimistic-lock conflicts on a stale `metadata.resourceVersion`, and a
//! status subresource that plain patches cannot touch.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::discovery::ApiResource;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

use super::{ObjectStore, StoreError, merge_patch};

/// Per-verb call counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub patches: usize,
    pub status_patches: usize,
    pub deletes: usize,
}

impl CallCounts {
    /// Calls that changed stored state.
    pub fn writes(&self) -> usize {
        self.creates + self.patches + self.status_patches + self.deletes
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    api_version: String,
    kind: String,
    namespace: String,
    name: String,
}

impl Key {
    fn new(ar: &ApiResource, ns: &str, name: &str) -> Self {
        Self {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
            namespace: ns.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Key, Value>,
    version: u64,
    calls: CallCounts,
    pending_conflicts: u32,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Inserts an object as if some other actor had created it. Not counted.
    pub fn seed<K: Serialize>(
        &self,
        ar: &ApiResource,
        obj: &K,
    ) -> Result<(), StoreError> {
        let mut value = serde_json::to_value(obj)?;
        let ns = value["metadata"]["namespace"]
            .as_str()
            .unwrap_or("default")
            .to_string();
        let name = value["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let mut inner = self.lock();
        let rv = inner.next_version();
        stamp_new(&mut value, ar, &ns, &rv);
        inner.objects.insert(Key::new(ar, &ns, &name), value);
        Ok(())
    }

    /// Reads an object back as a typed value.
    pub fn fetch<K: DeserializeOwned>(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
    ) -> Option<K> {
        let inner = self.lock();
        inner
            .objects
            .get(&Key::new(ar, ns, name))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, ar: &ApiResource, ns: &str, name: &str) -> bool {
        self.lock().objects.contains_key(&Key::new(ar, ns, name))
    }

    /// Mutates a stored object out of band (a sidecar injector, a human, the
    /// platform allocating a node port). Bumps the resource version.
    pub fn mutate(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
        f: impl FnOnce(&mut Value),
    ) -> bool {
        let mut inner = self.lock();
        let rv = inner.next_version();
        match inner.objects.get_mut(&Key::new(ar, ns, name)) {
            Some(value) => {
                f(value);
                value["metadata"]["resourceVersion"] = json!(rv);
                true
            }
            None => false,
        }
    }

    /// Makes the next `n` patch calls fail with a conflict.
    pub fn inject_conflicts(&self, n: u32) {
        self.lock().pending_conflicts = n;
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = CallCounts::default();
    }
}

fn stamp_new(value: &mut Value, ar: &ApiResource, ns: &str, rv: &str) {
    value["apiVersion"] = json!(ar.api_version);
    value["kind"] = json!(ar.kind);
    let meta = &mut value["metadata"];
    meta["namespace"] = json!(ns);
    meta["resourceVersion"] = json!(rv);
    if meta.get("uid").and_then(Value::as_str).is_none() {
        let name = meta["name"].as_str().unwrap_or_default().to_string();
        meta["uid"] = json!(format!("uid-{}-{}", name, rv));
    }
    if meta.get("generation").is_none() {
        meta["generation"] = json!(1);
    }
}

fn matches_selector(value: &Value, selector: &str) -> bool {
    let labels = &value["metadata"]["labels"];
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels[k.trim()].as_str() == Some(v.trim()),
            None => labels.get(term).is_some(),
        })
}

fn into_dynamic(value: &Value) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(value.clone())?)
}

fn not_found(ar: &ApiResource, name: &str) -> StoreError {
    StoreError::NotFound {
        kind: ar.kind.clone(),
        name: name.to_string(),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        let mut inner = self.lock();
        inner.calls.gets += 1;
        inner
            .objects
            .get(&Key::new(ar, ns, name))
            .map(into_dynamic)
            .transpose()
    }

    async fn list(
        &self,
        ar: &ApiResource,
        ns: &str,
        selector: &str,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let mut inner = self.lock();
        inner.calls.lists += 1;
        inner
            .objects
            .iter()
            .filter(|(k, _)| {
                k.api_version == ar.api_version
                    && k.kind == ar.kind
                    && k.namespace == ns
            })
            .filter(|(_, v)| matches_selector(v, selector))
            .map(|(_, v)| into_dynamic(v))
            .collect()
    }

    async fn create(
        &self,
        ar: &ApiResource,
        ns: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let key = Key::new(ar, ns, &name);
        let mut inner = self.lock();
        inner.calls.creates += 1;
        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: ar.kind.clone(),
                name,
            });
        }
        let mut value = serde_json::to_value(obj)?;
        // Stored objects never hold explicit nulls.
        let mut clean = Value::Null;
        merge_patch::apply(&mut clean, &value);
        value = clean;
        let rv = inner.next_version();
        stamp_new(&mut value, ar, ns, &rv);
        let out = into_dynamic(&value)?;
        inner.objects.insert(key, value);
        Ok(out)
    }

    async fn patch(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, StoreError> {
        let key = Key::new(ar, ns, name);
        let mut inner = self.lock();
        inner.calls.patches += 1;
        if inner.pending_conflicts > 0 {
            inner.pending_conflicts -= 1;
            return Err(StoreError::Conflict {
                kind: ar.kind.clone(),
                name: name.to_string(),
                message: "injected conflict".into(),
            });
        }
        let rv = inner.next_version();
        let current = inner.objects.get_mut(&key).ok_or_else(|| not_found(ar, name))?;
        if let Some(expected) = patch["metadata"]["resourceVersion"].as_str() {
            if current["metadata"]["resourceVersion"].as_str() != Some(expected) {
                return Err(StoreError::Conflict {
                    kind: ar.kind.clone(),
                    name: name.to_string(),
                    message: format!(
                        "resourceVersion {expected} is stale"
                    ),
                });
            }
        }
        let status = current.get("status").cloned();
        merge_patch::apply(current, patch);
        if let Some(obj) = current.as_object_mut() {
            match status {
                Some(s) => {
                    obj.insert("status".into(), s);
                }
                None => {
                    obj.remove("status");
                }
            }
        }
        current["metadata"]["resourceVersion"] = json!(rv);
        into_dynamic(current)
    }

    async fn patch_status(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, StoreError> {
        let key = Key::new(ar, ns, name);
        let mut inner = self.lock();
        inner.calls.status_patches += 1;
        let rv = inner.next_version();
        let current = inner.objects.get_mut(&key).ok_or_else(|| not_found(ar, name))?;
        if let Some(status) = patch.get("status") {
            merge_patch::apply(&mut current["status"], status);
        }
        current["metadata"]["resourceVersion"] = json!(rv);
        into_dynamic(current)
    }

    async fn delete(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.deletes += 1;
        inner
            .objects
            .remove(&Key::new(ar, ns, name))
            .map(|_| ())
            .ok_or_else(|| not_found(ar, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    use crate::kinds::ManagedKind;
    use crate::store::{from_dynamic, to_dynamic};

    fn cm(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("default".into()),
                labels: Some([("app".to_string(), name.to_string())].into()),
                ..Default::default()
            },
            data: Some([("A".to_string(), "1".to_string())].into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_identity_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let ar = ManagedKind::ConfigMap.api_resource();
        let created = store
            .create(&ar, "default", &to_dynamic(&cm("a")).unwrap())
            .await
            .unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version.is_some());

        let err = store
            .create(&ar, "default", &to_dynamic(&cm("a")).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn stale_resource_version_conflicts() {
        let store = MemoryStore::new();
        let ar = ManagedKind::ConfigMap.api_resource();
        store.seed(&ar, &cm("a")).unwrap();
        let seen = store.get(&ar, "default", "a").await.unwrap().unwrap();
        let rv = seen.metadata.resource_version.clone().unwrap();

        store.mutate(&ar, "default", "a", |v| v["data"]["B"] = json!("2"));

        let patch = json!({"metadata": {"resourceVersion": rv}, "data": {"A": "9"}});
        let err = store.patch(&ar, "default", "a", &patch).await.unwrap_err();
        assert!(err.is_conflict());

        let fresh = store.get(&ar, "default", "a").await.unwrap().unwrap();
        let patch = json!({
            "metadata": {"resourceVersion": fresh.metadata.resource_version},
            "data": {"A": "9"}
        });
        let out: ConfigMap =
            from_dynamic(&store.patch(&ar, "default", "a", &patch).await.unwrap())
                .unwrap();
        let data = out.data.unwrap();
        assert_eq!(data["A"], "9");
        assert_eq!(data["B"], "2");
    }

    #[tokio::test]
    async fn list_filters_by_label() {
        let store = MemoryStore::new();
        let ar = ManagedKind::ConfigMap.api_resource();
        store.seed(&ar, &cm("a")).unwrap();
        store.seed(&ar, &cm("b")).unwrap();
        let found = store.list(&ar, "default", "app=b").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.name.as_deref(), Some("b"));
        assert_eq!(store.list(&ar, "default", "").await.unwrap().len(), 2);
        assert!(store.list(&ar, "other", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn plain_patch_cannot_touch_status() {
        let store = MemoryStore::new();
        let ar = crate::kinds::parent_resource();
        store
            .seed(
                &ar,
                &json!({"metadata": {"name": "p", "namespace": "default"}, "spec": {}}),
            )
            .unwrap();
        store
            .patch(&ar, "default", "p", &json!({"status": {"phase": "Active"}}))
            .await
            .unwrap();
        let v: Value = store.fetch(&ar, "default", "p").unwrap();
        assert!(v.get("status").is_none());

        store
            .patch_status(&ar, "default", "p", &json!({"status": {"phase": "Active"}}))
            .await
            .unwrap();
        let v: Value = store.fetch(&ar, "default", "p").unwrap();
        assert_eq!(v["status"]["phase"], "Active");
        assert_eq!(store.calls().status_patches, 1);
    }
}
