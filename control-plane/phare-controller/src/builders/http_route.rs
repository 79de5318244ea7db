use kube::core::DynamicObject;

use super::{BuildContext, BuildError, unstructured};
use crate::kinds::ManagedKind;

/// Gateway API `HTTPRoute` named after the parent.
pub fn desired_http_route(
    ctx: &BuildContext<'_>,
) -> Result<Option<DynamicObject>, BuildError> {
    let Some(route) = ctx
        .parent
        .spec
        .toolchain
        .as_ref()
        .and_then(|t| t.http_route.as_ref())
    else {
        return Ok(None);
    };
    let spec = serde_json::to_value(route)?;
    unstructured(ctx, ManagedKind::HttpRoute, spec).map(Some)
}
