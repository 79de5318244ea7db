use tracing::{debug, info};

use super::events::{EventKind, EventSink, reasons};
use super::ownership::{Ownership, ownership};
use crate::crd::Phare;
use crate::kinds::ManagedKind;
use crate::store::{ObjectStore, StoreError};

/// Deletes the child `kind/name` if, and only if, `parent` controls it.
///
/// A missing object and an object controlled by anyone else (or by nobody)
/// are both left alone. Returns whether a delete happened.
pub async fn cleanup(
    store: &dyn ObjectStore,
    events: &dyn EventSink,
    kind: ManagedKind,
    ns: &str,
    name: &str,
    parent: &Phare,
) -> Result<bool, StoreError> {
    let ar = kind.api_resource();
    let Some(observed) = store.get(&ar, ns, name).await? else {
        return Ok(false);
    };
    let owner = ownership(&observed.metadata, parent);
    if owner != Ownership::Owned {
        debug!(%kind, %ns, %name, ?owner, "not controlled by parent; leaving in place");
        return Ok(false);
    }
    match store.delete(&ar, ns, name).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => return Ok(false),
        Err(e) => return Err(e),
    }
    info!(%kind, %ns, %name, "deleted child");
    events
        .record(
            parent,
            EventKind::Normal,
            reasons::DELETED,
            format!("Deleted {kind} {ns}/{name}"),
        )
        .await;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::tests_support::parent_with;
    use crate::controller::events::RecordingEventSink;
    use crate::store::MemoryStore;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn config_map(owner_uid: Option<&str>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("demo-config".into()),
                namespace: Some("default".into()),
                owner_references: owner_uid.map(|uid| {
                    vec![OwnerReference {
                        api_version: "phare.localcorp.internal/v1beta1".into(),
                        kind: "Phare".into(),
                        name: "demo".into(),
                        uid: uid.into(),
                        controller: Some(true),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn deletes_owned_child() {
        let store = MemoryStore::new();
        let events = RecordingEventSink::new();
        let ar = ManagedKind::ConfigMap.api_resource();
        store.seed(&ar, &config_map(Some("uid-demo"))).unwrap();
        let parent = parent_with(|_| {});

        let deleted = cleanup(&store, &events, ManagedKind::ConfigMap, "default", "demo-config", &parent)
            .await
            .unwrap();
        assert!(deleted);
        assert!(!store.contains(&ar, "default", "demo-config"));
        assert_eq!(events.reasons(), [reasons::DELETED]);
    }

    #[tokio::test]
    async fn leaves_foreign_and_orphan_objects() {
        let parent = parent_with(|_| {});
        for owner in [Some("uid-someone-else"), None] {
            let store = MemoryStore::new();
            let events = RecordingEventSink::new();
            let ar = ManagedKind::ConfigMap.api_resource();
            store.seed(&ar, &config_map(owner)).unwrap();

            let deleted = cleanup(&store, &events, ManagedKind::ConfigMap, "default", "demo-config", &parent)
                .await
                .unwrap();
            assert!(!deleted);
            assert!(store.contains(&ar, "default", "demo-config"));
            assert_eq!(store.calls().deletes, 0);
            assert!(events.events().is_empty());
        }
    }

    #[tokio::test]
    async fn missing_object_is_a_no_op() {
        let store = MemoryStore::new();
        let events = RecordingEventSink::new();
        let parent = parent_with(|_| {});
        let deleted = cleanup(&store, &events, ManagedKind::Service, "default", "demo", &parent)
            .await
            .unwrap();
        assert!(!deleted);
    }
}
