//! Drift detection.
//!
//! Typed kinds are compared as `observed` vs `merge(observed, desired)`, so
//! only fields the merge engine writes can ever register as drift. Both sides
//! are normalised first: values the API server fills in or rewrites on its
//! own (probe timings, the HTTP probe scheme, the TCP port protocol, the
//! `fieldRef` API version, quantity spelling) and empty-vs-absent collections
//! must not keep a workload permanently out of sync.
//!
//! Schema-less kinds are canonicalised and compared structurally.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, PersistentVolumeClaim, PodTemplateSpec, Probe,
    ResourceRequirements, Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde_json::{Map, Number, Value};

use super::maps::{lists_equivalent, maps_equivalent, none_if_empty, none_if_empty_map};
use super::merge::{
    merge_config_map, merge_deployment, merge_service, merge_stateful_set,
    merge_unstructured, port_key,
};
use super::quantity;

const PROBE_TIMEOUT_SECONDS: i32 = 1;
const PROBE_PERIOD_SECONDS: i32 = 10;
const PROBE_SUCCESS_THRESHOLD: i32 = 1;
const PROBE_FAILURE_THRESHOLD: i32 = 3;
const FIELD_REF_API_VERSION: &str = "v1";

/// Labels, annotations and owner references.
fn metadata_differs(observed: &ObjectMeta, merged: &ObjectMeta) -> bool {
    !maps_equivalent(observed.labels.as_ref(), merged.labels.as_ref())
        || !maps_equivalent(observed.annotations.as_ref(), merged.annotations.as_ref())
        || !lists_equivalent(
            observed.owner_references.as_deref(),
            merged.owner_references.as_deref(),
        )
}

pub fn config_map_differs(observed: &ConfigMap, desired: &ConfigMap) -> bool {
    let merged = merge_config_map(observed, desired);
    metadata_differs(&observed.metadata, &merged.metadata)
        || !maps_equivalent(observed.data.as_ref(), merged.data.as_ref())
}

/// Node ports that `merged` leaves unset are not compared: the platform
/// allocates them and they must not count as drift.
pub fn service_differs(
    observed: &Service,
    desired: &Service,
    reallocate: bool,
) -> Result<bool, serde_json::Error> {
    let merged = merge_service(observed, desired, reallocate)?;
    if metadata_differs(&observed.metadata, &merged.metadata) {
        return Ok(true);
    }
    let mut current = observed.spec.clone().unwrap_or_default();
    let wanted = merged.spec.clone().unwrap_or_default();
    for port in current.ports.iter_mut().flatten() {
        let unset = wanted
            .ports
            .iter()
            .flatten()
            .find(|p| port_key(p) == port_key(port))
            .is_some_and(|p| p.node_port.is_none());
        if unset {
            port.node_port = None;
        }
    }
    Ok(current != wanted)
}

pub fn deployment_differs(observed: &Deployment, desired: &Deployment) -> bool {
    let merged = merge_deployment(observed, desired);
    let normalized = |d: &Deployment| {
        d.spec.clone().map(|mut s| {
            s.template = normalized_template(&s.template);
            s
        })
    };
    metadata_differs(&observed.metadata, &merged.metadata)
        || normalized(observed) != normalized(&merged)
}

/// Volume claim templates are excluded; see [`vct_differs`].
pub fn stateful_set_differs(observed: &StatefulSet, desired: &StatefulSet) -> bool {
    let merged = merge_stateful_set(observed, desired);
    let normalized = |s: &StatefulSet| {
        s.spec.clone().map(|mut s| {
            s.template = normalized_template(&s.template);
            s
        })
    };
    metadata_differs(&observed.metadata, &merged.metadata)
        || normalized(observed) != normalized(&merged)
}

/// Whether the claim templates differ in name, access modes, storage
/// requests or limits, or (when desired sets one) storage class.
pub fn vct_differs(
    observed: Option<&[PersistentVolumeClaim]>,
    desired: Option<&[PersistentVolumeClaim]>,
) -> bool {
    let observed = observed.unwrap_or_default();
    let desired = desired.unwrap_or_default();
    observed.len() != desired.len()
        || observed
            .iter()
            .zip(desired)
            .any(|(o, d)| claim_differs(o, d))
}

fn claim_differs(observed: &PersistentVolumeClaim, desired: &PersistentVolumeClaim) -> bool {
    if observed.metadata.name != desired.metadata.name {
        return true;
    }
    let o = observed.spec.clone().unwrap_or_default();
    let d = desired.spec.clone().unwrap_or_default();
    if !lists_equivalent(o.access_modes.as_deref(), d.access_modes.as_deref()) {
        return true;
    }
    let storage = |spec: &k8s_openapi::api::core::v1::PersistentVolumeClaimSpec| {
        let r = spec.resources.clone().unwrap_or_default();
        (
            r.requests.and_then(|m| m.get("storage").cloned()),
            r.limits.and_then(|m| m.get("storage").cloned()),
        )
    };
    let (o_req, o_lim) = storage(&o);
    let (d_req, d_lim) = storage(&d);
    if !quantity::same(o_req.as_ref(), d_req.as_ref())
        || !quantity::same(o_lim.as_ref(), d_lim.as_ref())
    {
        return true;
    }
    d.storage_class_name.is_some() && o.storage_class_name != d.storage_class_name
}

/// Spec and labels of a schema-less object, after canonicalisation. Absent
/// labels equal empty ones.
pub fn unstructured_differs(observed: &DynamicObject, desired: &DynamicObject) -> bool {
    let merged = merge_unstructured(observed, desired);
    metadata_differs(&observed.metadata, &merged.metadata)
        || canonicalize(observed.data.get("spec").unwrap_or(&Value::Null))
            != canonicalize(merged.data.get("spec").unwrap_or(&Value::Null))
}

/// Generic form used for structural comparison: `null` members are dropped
/// (absent and null mean the same) and integral floats become integers, so
/// `3` and `3.0` compare equal.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => Value::Number(integral(n).unwrap_or_else(|| n.clone())),
        other => other.clone(),
    }
}

fn integral(n: &Number) -> Option<Number> {
    if n.is_i64() || n.is_u64() {
        return None;
    }
    let f = n.as_f64()?;
    (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then(|| Number::from(f as i64))
}

fn normalized_template(template: &PodTemplateSpec) -> PodTemplateSpec {
    let mut t = template.clone();
    if let Some(meta) = t.metadata.as_mut() {
        meta.labels = none_if_empty_map(meta.labels.take());
        meta.annotations = none_if_empty_map(meta.annotations.take());
    }
    if let Some(spec) = t.spec.as_mut() {
        spec.containers.iter_mut().for_each(normalize_container);
        if let Some(init) = spec.init_containers.as_mut() {
            init.iter_mut().for_each(normalize_container);
        }
        spec.init_containers = none_if_empty(spec.init_containers.take());
        spec.volumes = none_if_empty(spec.volumes.take());
        spec.tolerations = none_if_empty(spec.tolerations.take());
    }
    t
}

fn normalize_container(c: &mut Container) {
    for probe in [&mut c.liveness_probe, &mut c.readiness_probe, &mut c.startup_probe]
        .into_iter()
        .flatten()
    {
        normalize_probe(probe);
    }
    for port in c.ports.iter_mut().flatten() {
        port.protocol.get_or_insert_with(|| "TCP".to_string());
    }
    c.ports = none_if_empty(c.ports.take());
    for field_ref in c
        .env
        .iter_mut()
        .flatten()
        .filter_map(|e| e.value_from.as_mut())
        .filter_map(|v| v.field_ref.as_mut())
    {
        field_ref
            .api_version
            .get_or_insert_with(|| FIELD_REF_API_VERSION.to_string());
    }
    c.env = none_if_empty(c.env.take());
    c.env_from = none_if_empty(c.env_from.take());
    c.volume_mounts = none_if_empty(c.volume_mounts.take());
    c.command = none_if_empty(c.command.take());
    c.args = none_if_empty(c.args.take());
    if let Some(resources) = c.resources.as_mut() {
        quantity::normalize_requirements(resources);
        resources.requests = none_if_empty_map(resources.requests.take());
        resources.limits = none_if_empty_map(resources.limits.take());
    }
    if c.resources.as_ref() == Some(&ResourceRequirements::default()) {
        c.resources = None;
    }
}

fn normalize_probe(p: &mut Probe) {
    p.timeout_seconds.get_or_insert(PROBE_TIMEOUT_SECONDS);
    p.period_seconds.get_or_insert(PROBE_PERIOD_SECONDS);
    p.success_threshold.get_or_insert(PROBE_SUCCESS_THRESHOLD);
    p.failure_threshold.get_or_insert(PROBE_FAILURE_THRESHOLD);
    if let Some(http) = p.http_get.as_mut() {
        http.scheme.get_or_insert_with(|| "HTTP".to_string());
    }
}
