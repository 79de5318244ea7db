use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;

use crate::crd::Phare;

/// Every kind of child object a parent may own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManagedKind {
    ConfigMap,
    Service,
    Deployment,
    StatefulSet,
    HttpRoute,
    HealthCheckPolicy,
    GcpBackendPolicy,
}

impl ManagedKind {
    pub fn kind(self) -> &'static str {
        match self {
            ManagedKind::ConfigMap => "ConfigMap",
            ManagedKind::Service => "Service",
            ManagedKind::Deployment => "Deployment",
            ManagedKind::StatefulSet => "StatefulSet",
            ManagedKind::HttpRoute => "HTTPRoute",
            ManagedKind::HealthCheckPolicy => "HealthCheckPolicy",
            ManagedKind::GcpBackendPolicy => "GCPBackendPolicy",
        }
    }

    pub fn api_resource(self) -> ApiResource {
        match self {
            ManagedKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
            ManagedKind::Service => ApiResource::erase::<Service>(&()),
            ManagedKind::Deployment => ApiResource::erase::<Deployment>(&()),
            ManagedKind::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
            ManagedKind::HttpRoute => dynamic(
                "gateway.networking.k8s.io",
                "v1beta1",
                "HTTPRoute",
                "httproutes",
            ),
            ManagedKind::HealthCheckPolicy => dynamic(
                "networking.gke.io",
                "v1",
                "HealthCheckPolicy",
                "healthcheckpolicies",
            ),
            ManagedKind::GcpBackendPolicy => dynamic(
                "networking.gke.io",
                "v1",
                "GCPBackendPolicy",
                "gcpbackendpolicies",
            ),
        }
    }
}

impl fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

fn dynamic(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(group, version, kind),
        plural,
    )
}

pub fn parent_resource() -> ApiResource {
    ApiResource::erase::<Phare>(&())
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported workload kind {0:?} (expected Deployment or StatefulSet)")]
pub struct UnsupportedKind(pub String);

/// Workload selected by `spec.microservice.kind`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// The kind that must not coexist with this one.
    pub fn other(self) -> Self {
        match self {
            WorkloadKind::Deployment => WorkloadKind::StatefulSet,
            WorkloadKind::StatefulSet => WorkloadKind::Deployment,
        }
    }

    pub fn managed(self) -> ManagedKind {
        match self {
            WorkloadKind::Deployment => ManagedKind::Deployment,
            WorkloadKind::StatefulSet => ManagedKind::StatefulSet,
        }
    }
}

impl FromStr for WorkloadKind {
    type Err = UnsupportedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Deployment" => Ok(WorkloadKind::Deployment),
            "StatefulSet" => Ok(WorkloadKind::StatefulSet),
            other => Err(UnsupportedKind(other.to_string())),
        }
    }
}
