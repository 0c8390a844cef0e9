//! [`ResourceStore`] backed by the Kubernetes API server

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use tracing::{debug, instrument};

use super::{ObjectKey, ResourceStore, StoreError};

/// Store that talks to the API server through dynamic `Api`s
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, kind),
            None => Api::all_with(self.client.clone(), kind),
        }
    }
}

/// Map API server errors onto the store taxonomy
fn map_kube_error(err: kube::Error, kind: &ApiResource, key: &ObjectKey) -> StoreError {
    match err {
        kube::Error::Api(ref resp) if resp.code == 404 => StoreError::NotFound {
            kind: kind.kind.clone(),
            key: key.clone(),
        },
        kube::Error::Api(ref resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind: kind.kind.clone(),
                key: key.clone(),
            }
        }
        kube::Error::Api(ref resp) if resp.code == 409 => StoreError::Conflict {
            kind: kind.kind.clone(),
            key: key.clone(),
        },
        other => StoreError::Kube(other),
    }
}

fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ResourceStore for KubeStore {
    #[instrument(skip(self, kind), fields(kind = %kind.kind, key = %key))]
    async fn get(
        &self,
        kind: &ApiResource,
        key: &ObjectKey,
    ) -> Result<DynamicObject, StoreError> {
        self.api(kind, key.namespace.as_deref())
            .get(&key.name)
            .await
            .map_err(|e| map_kube_error(e, kind, key))
    }

    async fn list(
        &self,
        kind: &ApiResource,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let mut params = ListParams::default();
        if !labels.is_empty() {
            params = params.labels(&label_selector(labels));
        }
        let list = self
            .api(kind, namespace)
            .list(&params)
            .await
            .map_err(StoreError::Kube)?;
        Ok(list.items)
    }

    #[instrument(skip(self, kind, obj), fields(kind = %kind.kind, name = %obj.name_any()))]
    async fn create(
        &self,
        kind: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::from_resource(obj);
        debug!("Creating {} {}", kind.kind, key);
        self.api(kind, key.namespace.as_deref())
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error(e, kind, &key))
    }

    #[instrument(skip(self, kind, obj), fields(kind = %kind.kind, name = %obj.name_any()))]
    async fn update(
        &self,
        kind: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::from_resource(obj);
        self.api(kind, key.namespace.as_deref())
            .replace(&key.name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error(e, kind, &key))
    }

    async fn delete(&self, kind: &ApiResource, key: &ObjectKey) -> Result<(), StoreError> {
        self.api(kind, key.namespace.as_deref())
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(e, kind, key))
    }

    #[instrument(skip(self, kind, obj), fields(kind = %kind.kind, name = %obj.name_any()))]
    async fn update_status(
        &self,
        kind: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::from_resource(obj);
        let body = serde_json::to_vec(obj)?;
        self.api(kind, key.namespace.as_deref())
            .replace_status(&key.name, &PostParams::default(), body)
            .await
            .map_err(|e| map_kube_error(e, kind, &key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_map_kube_error_kinds() {
        let kind = crate::store::api_resource::<Secret>();
        let key = ObjectKey::namespaced("default", "web-database");

        assert!(map_kube_error(api_error(404, "NotFound"), &kind, &key).is_not_found());
        assert!(map_kube_error(api_error(409, "Conflict"), &kind, &key).is_conflict());
        assert!(map_kube_error(api_error(409, "AlreadyExists"), &kind, &key).is_already_exists());
        assert!(matches!(
            map_kube_error(api_error(500, "InternalError"), &kind, &key),
            StoreError::Kube(_)
        ));
    }

    #[test]
    fn test_label_selector() {
        let labels = BTreeMap::from([
            ("app.kubernetes.io/instance".to_string(), "web".to_string()),
            ("app.kubernetes.io/managed-by".to_string(), "convoy-operator".to_string()),
        ]);
        assert_eq!(
            label_selector(&labels),
            "app.kubernetes.io/instance=web,app.kubernetes.io/managed-by=convoy-operator"
        );
    }
}
