use kube::core::DynamicObject;
use serde::Serialize;

use super::{BuildContext, BuildError, unstructured};
use crate::crd::phare::PolicyTargetRef;
use crate::kinds::ManagedKind;

pub fn desired_health_check_policy(
    ctx: &BuildContext<'_>,
) -> Result<Option<DynamicObject>, BuildError> {
    let Some(policy) = ctx
        .parent
        .spec
        .toolchain
        .as_ref()
        .and_then(|t| t.health_check_policy.as_ref())
    else {
        return Ok(None);
    };
    let mut policy = policy.clone();
    default_target(&mut policy.target_ref, ctx);
    build(ctx, ManagedKind::HealthCheckPolicy, &policy).map(Some)
}

pub fn desired_gcp_backend_policy(
    ctx: &BuildContext<'_>,
) -> Result<Option<DynamicObject>, BuildError> {
    let Some(policy) = ctx
        .parent
        .spec
        .toolchain
        .as_ref()
        .and_then(|t| t.gcp_backend_policy.as_ref())
    else {
        return Ok(None);
    };
    let mut policy = policy.clone();
    default_target(&mut policy.target_ref, ctx);
    build(ctx, ManagedKind::GcpBackendPolicy, &policy).map(Some)
}

fn default_target(target: &mut PolicyTargetRef, ctx: &BuildContext<'_>) {
    if target.name.is_empty() {
        target.name = ctx.name();
    }
}

fn build<S: Serialize>(
    ctx: &BuildContext<'_>,
    kind: ManagedKind,
    spec: &S,
) -> Result<DynamicObject, BuildError> {
    unstructured(ctx, kind, serde_json::to_value(spec)?)
}
