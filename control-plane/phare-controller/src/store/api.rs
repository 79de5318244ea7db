use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    core::DynamicObject,
    discovery::ApiResource,
};
use serde_json::Value;
use tracing::debug;

use super::{ObjectStore, StoreError};

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, ar: &ApiResource, ns: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), ns, ar)
    }

    fn patch_params(&self) -> PatchParams {
        PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..PatchParams::default()
        }
    }
}

fn classify(
    e: kube::Error,
    ar: &ApiResource,
    name: &str,
    creating: bool,
) -> StoreError {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound {
            kind: ar.kind.clone(),
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 409 && creating => {
            StoreError::AlreadyExists {
                kind: ar.kind.clone(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict {
            kind: ar.kind.clone(),
            name: name.to_string(),
            message: ae.message,
        },
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        match self.api(ar, ns).get_opt(name).await {
            Ok(obj) => Ok(obj),
            // Resource type not served (CRD absent) reads as "no object".
            Err(e) => match classify(e, ar, name, false) {
                StoreError::NotFound { .. } => {
                    debug!(kind = %ar.kind, %ns, %name, "resource type not served");
                    Ok(None)
                }
                other => Err(other),
            },
        }
    }

    async fn list(
        &self,
        ar: &ApiResource,
        ns: &str,
        selector: &str,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let lp = ListParams::default().labels(selector);
        match self.api(ar, ns).list(&lp).await {
            Ok(list) => Ok(list.items),
            Err(e) => match classify(e, ar, "", false) {
                StoreError::NotFound { .. } => Ok(Vec::new()),
                other => Err(other),
            },
        }
    }

    async fn create(
        &self,
        ar: &ApiResource,
        ns: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let pp = PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        };
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.api(ar, ns)
            .create(&pp, obj)
            .await
            .map_err(|e| classify(e, ar, &name, true))
    }

    async fn patch(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, StoreError> {
        self.api(ar, ns)
            .patch(name, &self.patch_params(), &Patch::Merge(patch))
            .await
            .map_err(|e| classify(e, ar, name, false))
    }

    async fn patch_status(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, StoreError> {
        self.api(ar, ns)
            .patch_status(name, &self.patch_params(), &Patch::Merge(patch))
            .await
            .map_err(|e| classify(e, ar, name, false))
    }

    async fn delete(
        &self,
        ar: &ApiResource,
        ns: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.api(ar, ns)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, ar, name, false))
    }
}
