pub mod cleanup;
pub mod drift;
pub mod events;
pub mod hash;
pub mod maps;
pub mod merge;
pub mod ownership;
pub mod plan;
pub mod quantity;
pub mod reconcile;
pub mod status;
pub mod template;

use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{
    Client, ResourceExt,
    api::Api,
    core::DynamicObject,
    runtime::{
        Controller,
        controller::{self, Action},
        watcher,
    },
};
use tokio::time::Duration;
use tracing::{error, info};

use crate::builders::BuildError;
use crate::config::ControllerConfig;
use crate::crd::Phare;
use crate::kinds::{ManagedKind, UnsupportedKind};
use crate::retry::Conflicting;
use crate::store::{KubeStore, StoreError};
use events::KubeEventSink;
use ownership::parent_namespace;
pub use reconcile::Reconciler;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    UnsupportedKind(#[from] UnsupportedKind),
    #[error("{kind} {name} already exists and is controlled by another owner")]
    ForeignOwner { kind: ManagedKind, name: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Conflicting for ReconcileErr {
    fn is_conflict(&self) -> bool {
        matches!(self, ReconcileErr::Store(e) if e.is_conflict())
    }
}

pub struct ControllerContext {
    pub reconciler: Reconciler,
    pub cfg: ControllerConfig,
}

fn scoped<K>(client: &Client, ns: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>,
{
    match ns {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn scoped_dynamic(client: &Client, ns: Option<&str>, kind: ManagedKind) -> Api<DynamicObject> {
    let ar = kind.api_resource();
    match ns {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
        None => Api::all_with(client.clone(), &ar),
    }
}

/// Runs the controller until a shutdown signal arrives.
///
/// Child watches are filtered on the `created-by` label, so only objects
/// stamped by this controller instance wake it up.
pub async fn run_controller(client: Client, cfg: ControllerConfig) -> anyhow::Result<()> {
    let ns = cfg.watch_namespace.as_deref();
    let store = Arc::new(KubeStore::new(client.clone(), cfg.controller_id.clone()));
    let events = Arc::new(KubeEventSink::new(client.clone(), &cfg.controller_id));
    let reconciler = Reconciler::new(
        store,
        events,
        cfg.controller_id.clone(),
        cfg.reconcile.patch_retry_attempts,
    );

    let selector = cfg.managed_selector();
    let children = watcher::Config::default().labels(&selector);
    let mut ctrl = Controller::new(scoped::<Phare>(&client, ns), watcher::Config::default())
        .owns(scoped::<ConfigMap>(&client, ns), children.clone())
        .owns(scoped::<Service>(&client, ns), children.clone())
        .owns(scoped::<Deployment>(&client, ns), children.clone())
        .owns(scoped::<StatefulSet>(&client, ns), children.clone());

    if cfg.features.gateway_api.unwrap_or(false) {
        ctrl = ctrl.owns_with(
            scoped_dynamic(&client, ns, ManagedKind::HttpRoute),
            ManagedKind::HttpRoute.api_resource(),
            children.clone(),
        );
    }
    if cfg.features.gke_policies.unwrap_or(false) {
        for kind in [ManagedKind::HealthCheckPolicy, ManagedKind::GcpBackendPolicy] {
            ctrl = ctrl.owns_with(
                scoped_dynamic(&client, ns, kind),
                kind.api_resource(),
                children.clone(),
            );
        }
    }

    info!(
        namespace = ns.unwrap_or("<all>"),
        %selector,
        concurrency = cfg.concurrency,
        gateway_api = ?cfg.features.gateway_api,
        gke_policies = ?cfg.features.gke_policies,
        "starting phare controller"
    );

    let concurrency = cfg.concurrency;
    let ctx = Arc::new(ControllerContext { reconciler, cfg });
    ctrl.with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => {
                    info!(name = %obj.name, ns = ?obj.namespace, ?action, "reconciled")
                }
                Err(e) => error!(error = %e, "reconcile error"),
            }
        })
        .await;

    info!("controller stopped");
    Ok(())
}

async fn reconcile(
    obj: Arc<Phare>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    ctx.reconciler
        .reconcile(&parent_namespace(&obj), &obj.name_any())
        .await?;
    Ok(Action::requeue(Duration::from_secs(
        ctx.cfg.reconcile.resync_secs,
    )))
}

fn error_policy(
    _obj: Arc<Phare>,
    _error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    Action::requeue(Duration::from_secs(ctx.cfg.reconcile.error_requeue_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_conflicts_are_retried() {
        let conflict: ReconcileErr = StoreError::Conflict {
            kind: "Deployment".into(),
            name: "demo".into(),
            message: "stale".into(),
        }
        .into();
        assert!(conflict.is_conflict());

        let foreign = ReconcileErr::ForeignOwner {
            kind: ManagedKind::Service,
            name: "demo".into(),
        };
        assert!(!foreign.is_conflict());
        assert_eq!(
            foreign.to_string(),
            "Service demo already exists and is controlled by another owner"
        );

        let unsupported: ReconcileErr = UnsupportedKind("DaemonSet".into()).into();
        assert!(!unsupported.is_conflict());
    }
}
