#![allow(dead_code)]

use std::sync::Arc;

use k8s_openapi::api::core::v1::ServicePort;
use kube::discovery::ApiResource;
use phare_controller::controller::ReconcileErr;
use phare_controller::controller::Reconciler;
use phare_controller::controller::events::RecordingEventSink;
use phare_controller::crd::phare::{ImageSpec, MicroServiceSpec, ServiceExposureSpec};
use phare_controller::crd::{Phare, PhareSpec};
use phare_controller::kinds::{ManagedKind, parent_resource};
use phare_controller::store::MemoryStore;
use serde::de::DeserializeOwned;

pub const NS: &str = "default";
pub const NAME: &str = "demo";
pub const CONTROLLER_ID: &str = "phare-controller";

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

/// `demo/default`: one nginx Deployment replica.
pub fn demo_spec() -> PhareSpec {
    PhareSpec {
        microservice: MicroServiceSpec {
            kind: "Deployment".into(),
            replica_count: Some(1),
            image: ImageSpec {
                repository: "nginx".into(),
                tag: Some("1.27".into()),
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn http_service(type_: &str, port: i32) -> ServiceExposureSpec {
    ServiceExposureSpec {
        type_: Some(type_.into()),
        ports: vec![ServicePort {
            name: Some("http".into()),
            port,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Reconciler wired to an in-memory store and a recording event sink.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub events: Arc<RecordingEventSink>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let reconciler =
            Reconciler::new(store.clone(), events.clone(), CONTROLLER_ID, 5);
        Self {
            store,
            events,
            reconciler,
        }
    }

    pub fn with_parent(spec: PhareSpec) -> Self {
        let h = Self::new();
        let mut parent = Phare::new(NAME, spec);
        parent.metadata.namespace = Some(NS.into());
        h.store
            .seed(&parent_resource(), &parent)
            .expect("seed parent");
        h
    }

    pub async fn reconcile(&self) -> Result<(), ReconcileErr> {
        self.reconciler.reconcile(NS, NAME).await
    }

    pub fn parent(&self) -> Phare {
        self.store
            .fetch(&parent_resource(), NS, NAME)
            .expect("parent present")
    }

    /// Edits the parent's spec the way a user would.
    pub fn update_spec(&self, f: impl FnOnce(&mut PhareSpec)) {
        let mut spec = self.parent().spec;
        f(&mut spec);
        let value = serde_json::to_value(&spec).expect("spec to json");
        assert!(self.store.mutate(&parent_resource(), NS, NAME, |obj| {
            obj["spec"] = value;
        }));
    }

    pub fn annotate_parent(&self, key: &str, value: &str) {
        assert!(self.store.mutate(&parent_resource(), NS, NAME, |obj| {
            obj["metadata"]["annotations"][key] = value.into();
        }));
    }

    pub fn child<K: DeserializeOwned>(&self, kind: ManagedKind, name: &str) -> Option<K> {
        self.store.fetch(&kind.api_resource(), NS, name)
    }

    pub fn has_child(&self, kind: ManagedKind, name: &str) -> bool {
        self.store.contains(&kind.api_resource(), NS, name)
    }

    pub fn mutate_child(
        &self,
        kind: ManagedKind,
        name: &str,
        f: impl FnOnce(&mut serde_json::Value),
    ) {
        assert!(self.store.mutate(&kind.api_resource(), NS, name, f));
    }

    pub fn seed_child<K: serde::Serialize>(&self, ar: &ApiResource, obj: &K) {
        self.store.seed(ar, obj).expect("seed child");
    }
}
