use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EnvFromSource, EnvVar,
    PersistentVolumeClaim, Probe, ResourceRequirements, ServicePort,
    Toleration, Volume, VolumeMount,
};
use kube::CustomResource;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::{
    ArrayValidation, InstanceType, Schema, SchemaObject,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "phare.localcorp.internal",
    version = "v1beta1",
    kind = "Phare",
    plural = "phares",
    shortname = "phare",
    namespaced,
    status = "PhareStatus",
    printcolumn = r#"{"name":"Kind","type":"string","jsonPath":".spec.microservice.kind"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PhareSpec {
    pub microservice: MicroServiceSpec,
    /// Network exposure. Removing it deletes the managed Service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceExposureSpec>,
    /// Optional add-ons, each created and cleaned up independently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MicroServiceSpec {
    /// Workload kind: `Deployment` or `StatefulSet`.
    pub kind: String,
    /// Defaults to 1 when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_count: Option<i32>,
    pub image: ImageSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_from: Option<Vec<EnvFromSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<ContainerPort>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Vec<VolumeMount>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_containers: Option<Vec<Container>>,
    /// Additional containers appended after the primary one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_containers: Option<Vec<Container>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_annotations: Option<BTreeMap<String, String>>,
    /// StatefulSet only. Immutable once the workload exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_templates: Option<Vec<PersistentVolumeClaim>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct ImageSpec {
    pub repository: String,
    /// Defaults to `latest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ImageSpec {
    pub fn reference(&self) -> String {
        match self.tag.as_deref() {
            Some(tag) if !tag.is_empty() => {
                format!("{}:{}", self.repository, tag)
            }
            _ => format!("{}:latest", self.repository),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServiceExposureSpec {
    /// ClusterIP, NodePort or LoadBalancer. Defaults to ClusterIP.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_affinity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_traffic_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_traffic_policy: Option<String>,
    #[serde(
        rename = "externalIPs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub external_ips: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_source_ranges: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainSpec {
    /// Rendered into the `<name>-config` ConfigMap. Values may reference
    /// `{{ name }}`, `{{ namespace }}`, `{{ labels }}` and `{{ annotations }}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_route: Option<HttpRouteSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_policy: Option<HealthCheckPolicySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_backend_policy: Option<GcpBackendPolicySpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostnames: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_refs: Option<Vec<ParentReference>>,
    /// Gateway API `HTTPRouteRule` objects, passed through as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "route_rules_schema")]
    pub rules: Option<Vec<Value>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

fn route_rules_schema(_: &mut SchemaGenerator) -> Schema {
    let mut rule = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    rule.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        Value::Bool(true),
    );
    SchemaObject {
        instance_type: Some(InstanceType::Array.into()),
        array: Some(Box::new(ArrayValidation {
            items: Some(Schema::Object(rule).into()),
            max_items: Some(16),
            ..Default::default()
        })),
        ..Default::default()
    }
    .into()
}

/// GKE `HealthCheckPolicy` body. Scalar fields are always written, so a
/// zero is sent as zero rather than left to the remote default.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckPolicySpec {
    #[serde(default)]
    pub default: HealthCheckDefaults,
    #[serde(default)]
    pub target_ref: PolicyTargetRef,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckDefaults {
    #[serde(default)]
    pub check_interval_sec: i32,
    #[serde(default)]
    pub timeout_sec: i32,
    #[serde(default)]
    pub healthy_threshold: i32,
    #[serde(default)]
    pub unhealthy_threshold: i32,
    #[serde(default)]
    pub log_config: HealthCheckLogConfig,
    #[serde(default)]
    pub config: HealthCheckConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct HealthCheckLogConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    /// HTTP, HTTPS, HTTP2 or GRPC.
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_health_check: Option<HttpHealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_health_check: Option<HttpHealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_health_check: Option<HttpHealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_health_check: Option<GrpcHealthCheck>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpHealthCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_specification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_header: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcHealthCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_specification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
}

/// GKE `GCPBackendPolicy` body.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpBackendPolicySpec {
    #[serde(default)]
    pub default: GcpBackendPolicyDefaults,
    #[serde(default)]
    pub target_ref: PolicyTargetRef,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpBackendPolicyDefaults {
    #[serde(default)]
    pub logging: GcpBackendPolicyLogging,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpBackendPolicyLogging {
    #[serde(default)]
    pub enabled: bool,
    /// Sampling rate in millionths (0..=1_000_000).
    #[serde(default)]
    pub sample_rate: i32,
}

/// Target of a policy; `name` defaults to the parent's name when empty.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct PolicyTargetRef {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum PharePhase {
    Reconciling,
    Active,
    Failed,
}

impl std::fmt::Display for PharePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PharePhase::Reconciling => "Reconciling",
            PharePhase::Active => "Active",
            PharePhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct PhareStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<PharePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::CustomResourceExt;

    #[test]
    fn image_reference_defaults_tag() {
        let img = ImageSpec {
            repository: "nginx".into(),
            tag: None,
        };
        assert_eq!(img.reference(), "nginx:latest");
        let img = ImageSpec {
            repository: "ghcr.io/acme/api".into(),
            tag: Some("1.2.3".into()),
        };
        assert_eq!(img.reference(), "ghcr.io/acme/api:1.2.3");
    }

    #[test]
    fn spec_parses_camel_case_fields() {
        let spec: PhareSpec = serde_json::from_value(serde_json::json!({
            "microservice": {
                "kind": "Deployment",
                "replicaCount": 2,
                "image": {"repository": "nginx", "tag": "1.27"},
                "podLabels": {"tier": "web"}
            },
            "service": {"type": "NodePort", "ports": [{"name": "http", "port": 80}]},
            "toolchain": {
                "config": {"A": "1"},
                "gcpBackendPolicy": {
                    "default": {"logging": {"enabled": true, "sampleRate": 500000}},
                    "targetRef": {"group": "", "kind": "Service", "name": "demo"}
                }
            }
        }))
        .unwrap();
        assert_eq!(spec.microservice.replica_count, Some(2));
        assert_eq!(spec.service.as_ref().unwrap().type_.as_deref(), Some("NodePort"));
        let tc = spec.toolchain.unwrap();
        assert_eq!(tc.config.unwrap().get("A").map(String::as_str), Some("1"));
        assert_eq!(tc.gcp_backend_policy.unwrap().default.logging.sample_rate, 500000);
    }

    #[test]
    fn crd_has_status_subresource() {
        let crd = Phare::crd();
        assert_eq!(crd.spec.group, "phare.localcorp.internal");
        let v = &crd.spec.versions[0];
        assert_eq!(v.name, "v1beta1");
        assert!(v.subresources.as_ref().and_then(|s| s.status.as_ref()).is_some());
    }
}
