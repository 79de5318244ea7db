use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::builders::BuildError;
use crate::crd::Phare;
use crate::kinds::ManagedKind;

pub const APP_LABEL: &str = "app";
pub const CREATED_BY_LABEL: &str = "app.kubernetes.io/created-by";
const CONFIG_SUFFIX: &str = "-config";

/// Name of the child of `kind` owned by the parent called `parent_name`.
pub fn child_name(parent_name: &str, kind: ManagedKind) -> String {
    match kind {
        ManagedKind::ConfigMap => format!("{parent_name}{CONFIG_SUFFIX}"),
        _ => parent_name.to_string(),
    }
}

pub fn parent_namespace(parent: &Phare) -> String {
    parent.namespace().unwrap_or_else(|| "default".to_string())
}

/// Labels every managed object carries.
pub fn base_labels(
    parent_name: &str,
    controller_id: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), parent_name.to_string()),
        (CREATED_BY_LABEL.to_string(), controller_id.to_string()),
    ])
}

/// Label-equality selector applied to child watches.
pub fn managed_selector(controller_id: &str) -> String {
    format!("{CREATED_BY_LABEL}={controller_id}")
}

/// Controller owner reference pointing at `parent`.
pub fn controller_owner_ref(
    parent: &Phare,
    child_kind: ManagedKind,
) -> Result<OwnerReference, BuildError> {
    let mut owner = parent.controller_owner_ref(&()).ok_or_else(|| {
        BuildError::MissingOwnerIdentity {
            kind: child_kind.kind(),
            parent: parent.name_any(),
        }
    })?;
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}

/// Reference used when recording events against the parent.
pub fn parent_ref(parent: &Phare) -> ObjectReference {
    parent.object_ref(&())
}

/// How an observed object relates to a parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Controlled by this parent.
    Owned,
    /// No controller at all.
    Orphan,
    /// Controlled by someone else.
    Foreign,
}

pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|o| o.controller == Some(true))
}

pub fn ownership(meta: &ObjectMeta, parent: &Phare) -> Ownership {
    match (controller_of(meta), parent.uid()) {
        (None, _) => Ownership::Orphan,
        (Some(owner), Some(uid)) if owner.uid == uid => Ownership::Owned,
        (Some(_), _) => Ownership::Foreign,
    }
}
