use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;

use super::{BuildContext, BuildError};
use crate::controller::template::render_config;
use crate::kinds::ManagedKind;

/// Config values after template rendering; `None` when the parent requests
/// no config object.
pub fn rendered_config(ctx: &BuildContext<'_>) -> Option<BTreeMap<String, String>> {
    let config = ctx.parent.spec.toolchain.as_ref()?.config.as_ref()?;
    Some(render_config(config, &ctx.parent.metadata))
}

pub fn desired_config_map(
    ctx: &BuildContext<'_>,
) -> Result<Option<ConfigMap>, BuildError> {
    let Some(data) = rendered_config(ctx) else {
        return Ok(None);
    };
    Ok(Some(ConfigMap {
        metadata: ctx.metadata(ManagedKind::ConfigMap)?,
        data: Some(data),
        ..Default::default()
    }))
}
