//! Desired-state builders, one per managed kind.
//!
//! Builders are pure: the same parent always yields the same object. Each
//! result carries the parent's namespace, the base ownership labels and a
//! controller owner reference; a parent without a UID cannot be owned and
//! fails with [`BuildError::MissingOwnerIdentity`].

pub mod config_map;
pub mod http_route;
pub mod policy;
pub mod service;
pub mod workload;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use kube::core::DynamicObject;
use serde_json::{Value, json};

use crate::controller::ownership::{
    base_labels, child_name, controller_owner_ref, parent_namespace,
};
use crate::crd::Phare;
use crate::kinds::ManagedKind;

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("cannot own {kind} for {parent}: parent has no uid")]
    MissingOwnerIdentity { kind: &'static str, parent: String },
    #[error("rendering {field}: {source}")]
    Template {
        field: String,
        #[source]
        source: minijinja::Error,
    },
    #[error("serializing desired object: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Inputs shared by every builder.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub parent: &'a Phare,
    pub controller_id: &'a str,
}

impl<'a> BuildContext<'a> {
    pub fn new(parent: &'a Phare, controller_id: &'a str) -> Self {
        Self {
            parent,
            controller_id,
        }
    }

    pub fn name(&self) -> String {
        self.parent.name_any()
    }

    pub fn namespace(&self) -> String {
        parent_namespace(self.parent)
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        base_labels(&self.name(), self.controller_id)
    }

    /// Metadata for the child of `kind`, labelled and owned.
    pub fn metadata(&self, kind: ManagedKind) -> Result<ObjectMeta, BuildError> {
        Ok(ObjectMeta {
            name: Some(child_name(&self.name(), kind)),
            namespace: Some(self.namespace()),
            labels: Some(self.labels()),
            owner_references: Some(vec![controller_owner_ref(self.parent, kind)?]),
            ..Default::default()
        })
    }
}

/// Schema-less child: owned metadata plus a `spec` body.
pub(crate) fn unstructured(
    ctx: &BuildContext<'_>,
    kind: ManagedKind,
    spec: Value,
) -> Result<DynamicObject, BuildError> {
    let ar = kind.api_resource();
    let mut obj = DynamicObject::new(&ctx.name(), &ar).data(json!({ "spec": spec }));
    obj.metadata = ctx.metadata(kind)?;
    Ok(obj)
}
