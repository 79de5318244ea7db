use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, PodSpec, PodTemplateSpec, Probe, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde_json::json;

use super::config_map::rendered_config;
use super::{BuildContext, BuildError};
use crate::controller::hash::{CONFIG_HASH_ANNOTATION, hash_config};
use crate::controller::maps::{none_if_empty, none_if_empty_map};
use crate::controller::ownership::{APP_LABEL, child_name};
use crate::controller::template::render;
use crate::kinds::ManagedKind;

pub const CONFIG_VOLUME_NAME: &str = "config-volume";
pub const CONFIG_MOUNT_PATH: &str = "/etc/phare/config";
/// 0644, what the API server fills in for Secret/ConfigMap volumes.
pub const DEFAULT_FILE_MODE: i32 = 420;

pub fn desired_deployment(ctx: &BuildContext<'_>) -> Result<Deployment, BuildError> {
    Ok(Deployment {
        metadata: ctx.metadata(ManagedKind::Deployment)?,
        spec: Some(DeploymentSpec {
            replicas: Some(replicas(ctx)),
            selector: selector(ctx),
            template: pod_template(ctx)?,
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub fn desired_stateful_set(ctx: &BuildContext<'_>) -> Result<StatefulSet, BuildError> {
    Ok(StatefulSet {
        metadata: ctx.metadata(ManagedKind::StatefulSet)?,
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas(ctx)),
            selector: selector(ctx),
            template: pod_template(ctx)?,
            volume_claim_templates: ctx
                .parent
                .spec
                .microservice
                .volume_claim_templates
                .clone(),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn replicas(ctx: &BuildContext<'_>) -> i32 {
    ctx.parent.spec.microservice.replica_count.unwrap_or(1)
}

/// Selects on `app` only, so pod label edits never touch the immutable
/// selector.
fn selector(ctx: &BuildContext<'_>) -> LabelSelector {
    LabelSelector {
        match_labels: Some([(APP_LABEL.to_string(), ctx.name())].into()),
        ..Default::default()
    }
}

/// Pod template shared by both workload kinds.
pub fn pod_template(ctx: &BuildContext<'_>) -> Result<PodTemplateSpec, BuildError> {
    let ms = &ctx.parent.spec.microservice;
    let name = ctx.name();

    let mut labels = ms.pod_labels.clone().unwrap_or_default();
    labels.insert(APP_LABEL.to_string(), name.clone());
    let mut annotations = ms.pod_annotations.clone().unwrap_or_default();
    let mut volumes = ms.volumes.clone().unwrap_or_default();
    let mut mounts = ms.volume_mounts.clone().unwrap_or_default();

    if let Some(data) = rendered_config(ctx).filter(|d| !d.is_empty()) {
        annotations.insert(CONFIG_HASH_ANNOTATION.to_string(), hash_config(&data));
        volumes.insert(0, config_volume(&child_name(&name, ManagedKind::ConfigMap))?);
        mounts.insert(
            0,
            VolumeMount {
                name: CONFIG_VOLUME_NAME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        );
    }
    volumes.iter_mut().for_each(default_file_mode);

    let meta = &ctx.parent.metadata;
    let primary = Container {
        name: name.clone(),
        image: Some(ms.image.reference()),
        image_pull_policy: ms.image_pull_policy.clone(),
        command: ms.command.clone(),
        args: ms.args.clone(),
        env: ms.env.clone(),
        env_from: ms.env_from.clone(),
        ports: ms.ports.clone(),
        resources: ms.resources.clone(),
        volume_mounts: none_if_empty(Some(mounts)),
        liveness_probe: render_probe(ms.liveness_probe.clone(), "livenessProbe", meta)?,
        readiness_probe: render_probe(ms.readiness_probe.clone(), "readinessProbe", meta)?,
        startup_probe: render_probe(ms.startup_probe.clone(), "startupProbe", meta)?,
        ..Default::default()
    };
    let mut containers = vec![primary];
    containers.extend(ms.extra_containers.clone().unwrap_or_default());

    Ok(PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            annotations: none_if_empty_map(Some(annotations)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers,
            init_containers: ms.init_containers.clone(),
            volumes: none_if_empty(Some(volumes)),
            affinity: ms.affinity.clone(),
            tolerations: ms.tolerations.clone(),
            ..Default::default()
        }),
    })
}

fn config_volume(config_map_name: &str) -> Result<Volume, BuildError> {
    let source: ConfigMapVolumeSource = serde_json::from_value(json!({
        "name": config_map_name,
        "defaultMode": DEFAULT_FILE_MODE,
        "optional": false,
    }))?;
    Ok(Volume {
        name: CONFIG_VOLUME_NAME.to_string(),
        config_map: Some(source),
        ..Default::default()
    })
}

fn default_file_mode(volume: &mut Volume) {
    if let Some(secret) = volume.secret.as_mut() {
        secret.default_mode.get_or_insert(DEFAULT_FILE_MODE);
    } else if let Some(cm) = volume.config_map.as_mut() {
        cm.default_mode.get_or_insert(DEFAULT_FILE_MODE);
    }
}

fn render_probe(
    probe: Option<Probe>,
    field: &str,
    meta: &ObjectMeta,
) -> Result<Option<Probe>, BuildError> {
    let Some(mut probe) = probe else {
        return Ok(None);
    };
    if let Some(path) = probe.http_get.as_mut().and_then(|h| h.path.as_mut()) {
        *path = render(path, meta).map_err(|source| BuildError::Template {
            field: format!("{field}.httpGet.path"),
            source,
        })?;
    }
    Ok(Some(probe))
}
