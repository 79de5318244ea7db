use std::sync::Mutex;

use async_trait::async_trait;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

use super::ownership::parent_ref;
use crate::crd::Phare;

pub mod reasons {
    pub const CREATED: &str = "CreatedResource";
    pub const UPDATED: &str = "UpdatedResource";
    pub const DELETED: &str = "DeletedResource";
    pub const ADOPTED: &str = "AdoptedResource";
    pub const IMMUTABLE_FIELD: &str = "ImmutableField";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Where reconcile outcomes are reported. Recording never fails the caller.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, parent: &Phare, kind: EventKind, reason: &str, message: String);
}

/// Publishes Kubernetes events against the parent.
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    pub fn new(client: Client, controller_id: &str) -> Self {
        let reporter = Reporter {
            controller: controller_id.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn record(&self, parent: &Phare, kind: EventKind, reason: &str, message: String) {
        let event = Event {
            type_: match kind {
                EventKind::Normal => EventType::Normal,
                EventKind::Warning => EventType::Warning,
            },
            reason: reason.into(),
            note: Some(message),
            action: "Reconcile".into(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &parent_ref(parent)).await {
            warn!(error = %e, %reason, "failed to publish event");
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    /// `namespace/name` of the parent.
    pub object: String,
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

/// Keeps events in memory.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn record(&self, parent: &Phare, kind: EventKind, reason: &str, message: String) {
        let object = format!(
            "{}/{}",
            parent.metadata.namespace.as_deref().unwrap_or("default"),
            parent.metadata.name.as_deref().unwrap_or_default()
        );
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                object,
                kind,
                reason: reason.to_string(),
                message,
            });
        }
    }
}
