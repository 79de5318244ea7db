//! Folding desired state into observed objects.
//!
//! Every merge starts from the observed object and overwrites only the fields
//! this controller owns. Whatever the platform or other actors wrote
//! elsewhere survives, which keeps the resulting patches small.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, PodTemplateSpec, Service, ServicePort, ServiceSpec, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde_json::Value;

use super::maps::{merge_maps, none_if_empty, none_if_empty_map};
use super::ownership::controller_of;

/// Adds the desired controller reference when the object has no controller
/// yet. An existing controller is never replaced.
pub fn adopt(observed: &mut ObjectMeta, desired: &ObjectMeta) {
    if controller_of(observed).is_some() {
        return;
    }
    let Some(owner) = controller_of(desired).cloned() else {
        return;
    };
    observed.owner_references.get_or_insert_with(Vec::new).push(owner);
}

/// Labels merged (desired wins), controller reference added if missing.
fn merge_meta(observed: &mut ObjectMeta, desired: &ObjectMeta) {
    observed.labels = none_if_empty_map(Some(merge_maps(
        observed.labels.as_ref(),
        desired.labels.as_ref(),
    )));
    adopt(observed, desired);
}

pub fn merge_config_map(observed: &ConfigMap, desired: &ConfigMap) -> ConfigMap {
    let mut out = observed.clone();
    merge_meta(&mut out.metadata, &desired.metadata);
    out.data = desired.data.clone();
    out
}

/// Name-keyed container merge.
///
/// Observed containers named in `desired` get their owned fields replaced;
/// the others (injected sidecars) are left untouched. Desired containers not
/// yet present are appended.
pub fn merge_containers(observed: &[Container], desired: &[Container]) -> Vec<Container> {
    let wanted: BTreeMap<&str, &Container> =
        desired.iter().map(|c| (c.name.as_str(), c)).collect();
    let mut out: Vec<Container> = observed
        .iter()
        .map(|c| match wanted.get(c.name.as_str()) {
            Some(d) => overlay_container(c, d),
            None => c.clone(),
        })
        .collect();
    for d in desired {
        if !observed.iter().any(|c| c.name == d.name) {
            out.push(d.clone());
        }
    }
    out
}

fn overlay_container(observed: &Container, desired: &Container) -> Container {
    let mut c = observed.clone();
    c.image = desired.image.clone();
    c.command = desired.command.clone();
    c.args = desired.args.clone();
    c.resources = desired.resources.clone();
    c.liveness_probe = desired.liveness_probe.clone();
    c.readiness_probe = desired.readiness_probe.clone();
    c.startup_probe = desired.startup_probe.clone();
    c.env = desired.env.clone();
    c.env_from = desired.env_from.clone();
    c.volume_mounts = desired.volume_mounts.clone();
    c.ports = desired.ports.clone();
    if desired.image_pull_policy.is_some() {
        c.image_pull_policy = desired.image_pull_policy.clone();
    }
    c
}

/// Name-keyed volume merge.
///
/// Same replace/preserve/append rule as containers, but a preserved volume is
/// dropped once no mount or device in `containers` or `init_containers`
/// refers to it.
pub fn merge_volumes(
    observed: &[Volume],
    desired: &[Volume],
    containers: &[Container],
    init_containers: &[Container],
) -> Vec<Volume> {
    let wanted: BTreeMap<&str, &Volume> =
        desired.iter().map(|v| (v.name.as_str(), v)).collect();
    let in_use = referenced_volumes(containers.iter().chain(init_containers));
    let mut out: Vec<Volume> = observed
        .iter()
        .filter_map(|v| match wanted.get(v.name.as_str()) {
            Some(d) => Some((*d).clone()),
            None if in_use.contains(v.name.as_str()) => Some(v.clone()),
            None => None,
        })
        .collect();
    for d in desired {
        if !observed.iter().any(|v| v.name == d.name) {
            out.push(d.clone());
        }
    }
    out
}

fn referenced_volumes<'a>(
    containers: impl Iterator<Item = &'a Container>,
) -> BTreeSet<&'a str> {
    let mut names = BTreeSet::new();
    for c in containers {
        for m in c.volume_mounts.iter().flatten() {
            names.insert(m.name.as_str());
        }
        for d in c.volume_devices.iter().flatten() {
            names.insert(d.name.as_str());
        }
    }
    names
}

/// Template labels and annotations are authoritative. Containers, init
/// containers and volumes follow the name-keyed rules; tolerations and
/// affinity come from `desired`.
pub fn merge_pod_template(
    observed: &PodTemplateSpec,
    desired: &PodTemplateSpec,
) -> PodTemplateSpec {
    let mut out = observed.clone();
    let wanted_meta = desired.metadata.clone().unwrap_or_default();
    let meta = out.metadata.get_or_insert_with(Default::default);
    meta.labels = wanted_meta.labels;
    meta.annotations = wanted_meta.annotations;

    let wanted = desired.spec.clone().unwrap_or_default();
    let spec = out.spec.get_or_insert_with(Default::default);
    spec.containers = merge_containers(&spec.containers, &wanted.containers);
    spec.init_containers = none_if_empty(Some(merge_containers(
        spec.init_containers.as_deref().unwrap_or_default(),
        wanted.init_containers.as_deref().unwrap_or_default(),
    )));
    let volumes = merge_volumes(
        spec.volumes.as_deref().unwrap_or_default(),
        wanted.volumes.as_deref().unwrap_or_default(),
        &spec.containers,
        spec.init_containers.as_deref().unwrap_or_default(),
    );
    spec.volumes = none_if_empty(Some(volumes));
    spec.tolerations = wanted.tolerations;
    spec.affinity = wanted.affinity;
    out
}

/// Replicas and pod template converge; the selector and everything the
/// platform defaulted stay as observed.
pub fn merge_deployment(observed: &Deployment, desired: &Deployment) -> Deployment {
    let mut out = observed.clone();
    merge_meta(&mut out.metadata, &desired.metadata);
    if let Some(wanted) = desired.spec.as_ref() {
        let spec = out.spec.get_or_insert_with(Default::default);
        spec.replicas = wanted.replicas;
        spec.template = merge_pod_template(&spec.template, &wanted.template);
    }
    out
}

/// Like [`merge_deployment`]. Volume claim templates are immutable and are
/// always kept as observed.
pub fn merge_stateful_set(observed: &StatefulSet, desired: &StatefulSet) -> StatefulSet {
    let mut out = observed.clone();
    merge_meta(&mut out.metadata, &desired.metadata);
    if let Some(wanted) = desired.spec.as_ref() {
        let spec = out.spec.get_or_insert_with(Default::default);
        spec.replicas = wanted.replicas;
        spec.template = merge_pod_template(&spec.template, &wanted.template);
    }
    out
}

/// Identity of a service port across edits: its name, or `protocol/port`
/// when unnamed.
pub fn port_key(port: &ServicePort) -> String {
    match port.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => format!("{}/{}", port.protocol.as_deref().unwrap_or("TCP"), port.port),
    }
}

fn exposes_node_ports(type_: Option<&str>) -> bool {
    matches!(type_, Some("NodePort") | Some("LoadBalancer"))
}

/// Service merge.
///
/// Spec fields `desired` sets are authoritative, fields it leaves unset keep
/// the observed value. Addresses, IP families, the health-check node port and
/// the load-balancer class always come from `observed`. Allocated node ports
/// are carried over to matching ports unless `reallocate` is set.
pub fn merge_service(
    observed: &Service,
    desired: &Service,
    reallocate: bool,
) -> Result<Service, serde_json::Error> {
    let mut out = observed.clone();
    out.metadata.labels = desired.metadata.labels.clone();
    out.metadata.annotations = none_if_empty_map(Some(merge_maps(
        observed.metadata.annotations.as_ref(),
        desired.metadata.annotations.as_ref(),
    )));
    adopt(&mut out.metadata, &desired.metadata);

    let current = observed.spec.clone().unwrap_or_default();
    let mut value = serde_json::to_value(&current)?;
    if let (Some(fields), Value::Object(wanted)) = (
        value.as_object_mut(),
        serde_json::to_value(desired.spec.clone().unwrap_or_default())?,
    ) {
        fields.extend(wanted);
    }
    let mut spec: ServiceSpec = serde_json::from_value(value)?;

    spec.cluster_ip = current.cluster_ip.clone();
    spec.cluster_ips = current.cluster_ips.clone();
    spec.ip_families = current.ip_families.clone();
    spec.ip_family_policy = current.ip_family_policy.clone();
    spec.health_check_node_port = current.health_check_node_port;
    spec.load_balancer_class = current.load_balancer_class.clone();

    if !reallocate && exposes_node_ports(spec.type_.as_deref()) {
        let allocated: BTreeMap<String, i32> = current
            .ports
            .iter()
            .flatten()
            .filter_map(|p| p.node_port.map(|n| (port_key(p), n)))
            .collect();
        for port in spec.ports.iter_mut().flatten() {
            if port.node_port.is_none() {
                port.node_port = allocated.get(&port_key(port)).copied();
            }
        }
    }

    out.spec = Some(spec);
    Ok(out)
}

/// Schema-less kinds: `spec` and labels are authoritative, the rest of the
/// observed object is kept.
pub fn merge_unstructured(observed: &DynamicObject, desired: &DynamicObject) -> DynamicObject {
    let mut out = observed.clone();
    out.metadata.labels = desired.metadata.labels.clone();
    adopt(&mut out.metadata, &desired.metadata);
    let spec = desired.data.get("spec").cloned().unwrap_or(Value::Null);
    match out.data.as_object_mut() {
        Some(fields) => {
            fields.insert("spec".to_string(), spec);
        }
        None => out.data = serde_json::json!({ "spec": spec }),
    }
    out
}
