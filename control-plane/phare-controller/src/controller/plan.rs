//! Per-kind update plans: drift check, merge, and the merge patch between
//! the observed object and the merged one.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::core::DynamicObject;
use serde::Serialize;
use serde_json::Value;

use super::drift::{
    config_map_differs, deployment_differs, service_differs, stateful_set_differs,
    unstructured_differs, vct_differs,
};
use super::merge::{
    merge_config_map, merge_deployment, merge_service, merge_stateful_set,
    merge_unstructured,
};
use crate::store::merge_patch;

#[derive(Debug, Default)]
pub struct Plan {
    /// Merge patch to send; `None` when already in sync.
    pub patch: Option<Value>,
    /// Immutable-field drift that will not be patched.
    pub warnings: Vec<String>,
}

impl Plan {
    fn between<T: Serialize>(observed: &T, merged: &T) -> Result<Self, serde_json::Error> {
        let patch = merge_patch::diff(&serde_json::to_value(observed)?, &serde_json::to_value(merged)?);
        Ok(Self {
            patch: (!merge_patch::is_noop(&patch)).then_some(patch),
            warnings: Vec::new(),
        })
    }

    fn in_sync() -> Self {
        Self::default()
    }
}

pub fn config_map(observed: &ConfigMap, desired: &ConfigMap) -> Result<Plan, serde_json::Error> {
    if !config_map_differs(observed, desired) {
        return Ok(Plan::in_sync());
    }
    Plan::between(observed, &merge_config_map(observed, desired))
}

pub fn service(
    observed: &Service,
    desired: &Service,
    reallocate: bool,
) -> Result<Plan, serde_json::Error> {
    if !service_differs(observed, desired, reallocate)? {
        return Ok(Plan::in_sync());
    }
    Plan::between(observed, &merge_service(observed, desired, reallocate)?)
}

pub fn deployment(observed: &Deployment, desired: &Deployment) -> Result<Plan, serde_json::Error> {
    if !deployment_differs(observed, desired) {
        return Ok(Plan::in_sync());
    }
    Plan::between(observed, &merge_deployment(observed, desired))
}

pub fn stateful_set(
    observed: &StatefulSet,
    desired: &StatefulSet,
) -> Result<Plan, serde_json::Error> {
    let mut plan = if stateful_set_differs(observed, desired) {
        Plan::between(observed, &merge_stateful_set(observed, desired))?
    } else {
        Plan::in_sync()
    };
    let claims = |s: &StatefulSet| {
        s.spec
            .as_ref()
            .and_then(|s| s.volume_claim_templates.clone())
    };
    if vct_differs(claims(observed).as_deref(), claims(desired).as_deref()) {
        plan.warnings.push(format!(
            "volumeClaimTemplates of StatefulSet {} cannot be changed after creation; \
             delete the StatefulSet to apply the new templates",
            observed.metadata.name.as_deref().unwrap_or_default()
        ));
    }
    Ok(plan)
}

pub fn unstructured(
    observed: &DynamicObject,
    desired: &DynamicObject,
) -> Result<Plan, serde_json::Error> {
    if !unstructured_differs(observed, desired) {
        return Ok(Plan::in_sync());
    }
    Plan::between(observed, &merge_unstructured(observed, desired))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::BuildContext;
    use crate::builders::tests_support::parent_with;
    use crate::builders::workload::desired_deployment;
    use serde_json::json;

    #[test]
    fn replica_patch_only_carries_replicas() {
        let observed = desired_deployment(&BuildContext::new(&parent_with(|_| {}), "phare-controller")).unwrap();
        let desired = desired_deployment(&BuildContext::new(
            &parent_with(|spec| spec.microservice.replica_count = Some(3)),
            "phare-controller",
        ))
        .unwrap();
        let plan = deployment(&observed, &desired).unwrap();
        assert_eq!(plan.patch, Some(json!({"spec": {"replicas": 3}})));
        assert!(plan.warnings.is_empty());

        let plan = deployment(&desired, &desired).unwrap();
        assert!(plan.patch.is_none());
    }

    #[test]
    fn stale_unstructured_field_is_nulled() {
        let obj = |spec: Value| -> DynamicObject {
            serde_json::from_value(json!({
                "apiVersion": "networking.gke.io/v1",
                "kind": "GCPBackendPolicy",
                "metadata": {"name": "demo"},
                "spec": spec
            }))
            .unwrap()
        };
        let plan = unstructured(
            &obj(json!({"default": {"timeoutSec": 30, "logging": {"enabled": true}}})),
            &obj(json!({"default": {"logging": {"enabled": true}}})),
        )
        .unwrap();
        assert_eq!(
            plan.patch,
            Some(json!({"spec": {"default": {"timeoutSec": null}}}))
        );
    }
}
