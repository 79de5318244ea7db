use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::ReconcileErr;
use super::cleanup::cleanup;
use super::events::{EventKind, EventSink, reasons};
use super::ownership::{Ownership, child_name, ownership};
use super::plan::{self, Plan};
use super::status;
use crate::builders::config_map::desired_config_map;
use crate::builders::http_route::desired_http_route;
use crate::builders::policy::{desired_gcp_backend_policy, desired_health_check_policy};
use crate::builders::service::{desired_service, reallocation_requested};
use crate::builders::workload::{desired_deployment, desired_stateful_set};
use crate::builders::BuildContext;
use crate::crd::{Phare, PhareStatus};
use crate::kinds::{ManagedKind, WorkloadKind, parent_resource};
use crate::retry;
use crate::store::{ObjectStore, from_dynamic, get_typed, to_dynamic};

/// What a converge step did to a child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Applied {
    Created,
    Updated,
    Adopted,
    Unchanged,
}

struct Converged {
    applied: Applied,
    warnings: Vec<String>,
}

impl From<Applied> for Converged {
    fn from(applied: Applied) -> Self {
        Self {
            applied,
            warnings: Vec::new(),
        }
    }
}

/// Drives every managed child of one parent towards its desired state.
///
/// Steps run in a fixed order and the first failure aborts the pass. The
/// parent's status is written at the end, and only when it changed.
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    events: Arc<dyn EventSink>,
    controller_id: String,
    patch_attempts: u32,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventSink>,
        controller_id: impl Into<String>,
        patch_attempts: u32,
    ) -> Self {
        Self {
            store,
            events,
            controller_id: controller_id.into(),
            patch_attempts,
        }
    }

    /// One reconcile pass for the parent `ns/name`.
    ///
    /// On failure the parent is marked Failed (best effort) and the original
    /// error is returned so the caller requeues.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, ns: &str, name: &str) -> Result<(), ReconcileErr> {
        let Some(parent) =
            get_typed::<Phare>(self.store.as_ref(), &parent_resource(), ns, name).await?
        else {
            debug!("parent not found; nothing to do");
            return Ok(());
        };
        if parent.metadata.deletion_timestamp.is_some() {
            debug!("parent is being deleted; children are garbage-collected");
            return Ok(());
        }

        let result = self.reconcile_children(&parent).await;
        let next = match &result {
            Ok(()) => status::active(),
            Err(e) => {
                warn!(error = %e, "reconcile failed");
                status::failed(e)
            }
        };
        if status::should_patch(parent.status.as_ref(), &next) {
            match (self.write_status(ns, name, &next).await, &result) {
                (Err(e), Ok(())) => return Err(e),
                (Err(e), Err(_)) => warn!(error = %e, "failed to record Failed status"),
                (Ok(()), _) => debug!(phase = ?next.phase, "status updated"),
            }
        }
        result
    }

    async fn write_status(
        &self,
        ns: &str,
        name: &str,
        next: &PhareStatus,
    ) -> Result<(), ReconcileErr> {
        let patch = status::status_patch(next)?;
        self.store
            .patch_status(&parent_resource(), ns, name, &patch)
            .await?;
        Ok(())
    }

    async fn reconcile_children(&self, parent: &Phare) -> Result<(), ReconcileErr> {
        let ctx = BuildContext::new(parent, &self.controller_id);

        match desired_config_map(&ctx)? {
            Some(cm) => self.converge(&ctx, ManagedKind::ConfigMap, &cm, plan::config_map).await?,
            None => self.remove(&ctx, ManagedKind::ConfigMap).await?,
        }

        match desired_service(&ctx)? {
            Some(svc) => {
                let reallocate = reallocation_requested(parent);
                self.converge(&ctx, ManagedKind::Service, &svc, |o, d| {
                    plan::service(o, d, reallocate)
                })
                .await?
            }
            None => self.remove(&ctx, ManagedKind::Service).await?,
        }

        for (kind, desired) in [
            (ManagedKind::HttpRoute, desired_http_route(&ctx)?),
            (ManagedKind::GcpBackendPolicy, desired_gcp_backend_policy(&ctx)?),
            (ManagedKind::HealthCheckPolicy, desired_health_check_policy(&ctx)?),
        ] {
            match desired {
                Some(obj) => self.converge(&ctx, kind, &obj, plan::unstructured).await?,
                None => self.remove(&ctx, kind).await?,
            }
        }

        self.reconcile_workload(&ctx).await
    }

    /// Removes the workload of the other kind first, so switching kinds
    /// never leaves two workloads running.
    async fn reconcile_workload(&self, ctx: &BuildContext<'_>) -> Result<(), ReconcileErr> {
        let requested: WorkloadKind = ctx.parent.spec.microservice.kind.parse()?;
        self.remove(ctx, requested.other().managed()).await?;
        match requested {
            WorkloadKind::Deployment => {
                let desired = desired_deployment(ctx)?;
                self.converge(ctx, ManagedKind::Deployment, &desired, plan::deployment)
                    .await
            }
            WorkloadKind::StatefulSet => {
                let desired = desired_stateful_set(ctx)?;
                self.converge(ctx, ManagedKind::StatefulSet, &desired, plan::stateful_set)
                    .await
            }
        }
    }

    async fn remove(&self, ctx: &BuildContext<'_>, kind: ManagedKind) -> Result<(), ReconcileErr> {
        cleanup(
            self.store.as_ref(),
            self.events.as_ref(),
            kind,
            &ctx.namespace(),
            &child_name(&ctx.name(), kind),
            ctx.parent,
        )
        .await?;
        Ok(())
    }

    /// Create-or-patch of one child, retried with a fresh read on conflict.
    #[instrument(skip_all, fields(kind = %kind))]
    async fn converge<K, P>(
        &self,
        ctx: &BuildContext<'_>,
        kind: ManagedKind,
        desired: &K,
        plan: P,
    ) -> Result<(), ReconcileErr>
    where
        K: Serialize + DeserializeOwned + Sync,
        P: Fn(&K, &K) -> Result<Plan, serde_json::Error> + Sync,
    {
        let ns = ctx.namespace();
        let name = child_name(&ctx.name(), kind);
        let plan = &plan;
        let outcome = retry::on_conflict(self.patch_attempts, |_| {
            self.converge_once(ctx.parent, kind, &ns, &name, desired, plan)
        })
        .await?;

        let parent = ctx.parent;
        let reported = match outcome.applied {
            Applied::Created => Some((reasons::CREATED, "Created")),
            Applied::Updated => Some((reasons::UPDATED, "Updated")),
            Applied::Adopted => Some((reasons::ADOPTED, "Adopted")),
            Applied::Unchanged => None,
        };
        match reported {
            Some((reason, verb)) => {
                info!(%ns, %name, action = verb, "child reconciled");
                self.events
                    .record(parent, EventKind::Normal, reason, format!("{verb} {kind} {ns}/{name}"))
                    .await;
            }
            None => debug!(%ns, %name, "in sync"),
        }
        for warning in outcome.warnings {
            warn!(%ns, %name, %warning, "immutable field drift");
            self.events
                .record(parent, EventKind::Warning, reasons::IMMUTABLE_FIELD, warning)
                .await;
        }
        Ok(())
    }

    async fn converge_once<K, P>(
        &self,
        parent: &Phare,
        kind: ManagedKind,
        ns: &str,
        name: &str,
        desired: &K,
        plan: &P,
    ) -> Result<Converged, ReconcileErr>
    where
        K: Serialize + DeserializeOwned + Sync,
        P: Fn(&K, &K) -> Result<Plan, serde_json::Error> + Sync,
    {
        let ar = kind.api_resource();
        let Some(observed) = self.store.get(&ar, ns, name).await? else {
            self.store.create(&ar, ns, &to_dynamic(desired)?).await?;
            return Ok(Applied::Created.into());
        };

        let owner = ownership(&observed.metadata, parent);
        if owner == Ownership::Foreign {
            return Err(ReconcileErr::ForeignOwner {
                kind,
                name: name.to_string(),
            });
        }

        let current: K = from_dynamic(&observed)?;
        let Plan { patch, warnings } = plan(&current, desired)?;
        let Some(mut patch) = patch else {
            return Ok(Converged {
                applied: Applied::Unchanged,
                warnings,
            });
        };
        if let Some(rv) = observed.metadata.resource_version.as_deref() {
            patch["metadata"]["resourceVersion"] = json!(rv);
        }
        self.store.patch(&ar, ns, name, &patch).await?;

        let applied = match owner {
            Ownership::Orphan => Applied::Adopted,
            _ => Applied::Updated,
        };
        Ok(Converged { applied, warnings })
    }
}
