use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{BuildContext, BuildError};
use crate::controller::maps::{merge_maps, none_if_empty_map};
use crate::controller::ownership::APP_LABEL;
use crate::crd::Phare;
use crate::kinds::ManagedKind;

/// Parent annotation asking the platform to hand out fresh node ports.
pub const REALLOCATE_NODEPORT_ANNOTATION: &str =
    "phare.localcorp.internal/reallocate-nodeport";

const DEFAULT_SERVICE_TYPE: &str = "ClusterIP";

/// Whether the parent opted in to node-port reallocation. Only `1`, `true`,
/// `yes` and `on` count, case-insensitively.
pub fn reallocation_requested(parent: &Phare) -> bool {
    parent
        .annotations()
        .get(REALLOCATE_NODEPORT_ANNOTATION)
        .map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

pub fn desired_service(ctx: &BuildContext<'_>) -> Result<Option<Service>, BuildError> {
    let Some(exposure) = ctx.parent.spec.service.as_ref() else {
        return Ok(None);
    };

    let mut metadata = ctx.metadata(ManagedKind::Service)?;
    // Ownership labels cannot be overridden by user labels.
    metadata.labels = Some(merge_maps(exposure.labels.as_ref(), Some(&ctx.labels())));
    let mut annotations = exposure.annotations.clone().unwrap_or_default();
    annotations.remove(REALLOCATE_NODEPORT_ANNOTATION);
    metadata.annotations = none_if_empty_map(Some(annotations));

    let type_ = exposure
        .type_
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVICE_TYPE.to_string());

    let spec = ServiceSpec {
        type_: Some(type_),
        selector: Some(BTreeMap::from([(APP_LABEL.to_string(), ctx.name())])),
        ports: Some(exposure.ports.iter().cloned().map(with_port_defaults).collect()),
        session_affinity: exposure.session_affinity.clone(),
        external_traffic_policy: exposure.external_traffic_policy.clone(),
        internal_traffic_policy: exposure.internal_traffic_policy.clone(),
        external_ips: exposure.external_ips.clone(),
        load_balancer_source_ranges: exposure.load_balancer_source_ranges.clone(),
        ..Default::default()
    };

    Ok(Some(Service {
        metadata,
        spec: Some(spec),
        ..Default::default()
    }))
}

/// Fills the fields the API server would default on a port.
fn with_port_defaults(mut port: ServicePort) -> ServicePort {
    if port.protocol.is_none() {
        port.protocol = Some("TCP".to_string());
    }
    if port.target_port.is_none() {
        port.target_port = Some(IntOrString::Int(port.port));
    }
    port
}
