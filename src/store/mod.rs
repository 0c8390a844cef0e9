//! Resource storage collaborator
//!
//! The engine and the components never talk to the API server directly; they
//! go through a [`ResourceStore`]. The trait works on `DynamicObject`s keyed
//! by an `ApiResource`, which keeps it object safe. Typed access goes through
//! the [`StoreExt`] helpers, which convert through serde.

mod kube_store;
mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use kube_store::KubeStore;
pub use memory::{MemoryStore, StoreFault, StoreStats};

/// Identity of a stored object: optional namespace plus name
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of an existing object
    pub fn from_resource<R: Resource>(obj: &R) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Errors surfaced by a [`ResourceStore`]
///
/// `NotFound` and `Conflict` must stay distinguishable: the orchestrator treats
/// a missing root as "already deleted" and the commit protocol retries on
/// conflicts.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },

    #[error("{kind} {key} was modified concurrently (resourceVersion conflict)")]
    Conflict { kind: String, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },

    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    #[error("Failed to convert object: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Storage contract consumed by the engine and by components
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, kind: &ApiResource, key: &ObjectKey)
        -> Result<DynamicObject, StoreError>;

    /// List objects of a kind, optionally restricted to a namespace and to
    /// objects carrying all of the given labels
    async fn list(
        &self,
        kind: &ApiResource,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    async fn create(
        &self,
        kind: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Replace an object; a stale `resourceVersion` yields `Conflict`
    async fn update(
        &self,
        kind: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    async fn delete(&self, kind: &ApiResource, key: &ObjectKey) -> Result<(), StoreError>;

    /// Replace the status subresource; `NotFound` when the object or the
    /// subresource does not exist
    async fn update_status(
        &self,
        kind: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;
}

/// `ApiResource` for a statically typed Kubernetes object
pub fn api_resource<T: Resource<DynamicType = ()>>() -> ApiResource {
    ApiResource::erase::<T>(&())
}

/// Convert a typed object into its dynamic form
pub fn to_dynamic<T: Serialize>(obj: &T) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Convert a dynamic object back into its typed form
pub fn from_dynamic<T: DeserializeOwned>(obj: DynamicObject) -> Result<T, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Typed convenience layer on top of any [`ResourceStore`]
#[async_trait]
pub trait StoreExt: ResourceStore {
    async fn get_as<T>(&self, key: &ObjectKey) -> Result<T, StoreError>
    where
        T: Resource<DynamicType = ()> + DeserializeOwned + Send + 'static,
    {
        let obj = self.get(&api_resource::<T>(), key).await?;
        from_dynamic(obj)
    }

    async fn list_as<T>(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<T>, StoreError>
    where
        T: Resource<DynamicType = ()> + DeserializeOwned + Send + 'static,
    {
        let objs = self.list(&api_resource::<T>(), namespace, labels).await?;
        objs.into_iter().map(from_dynamic).collect()
    }

    async fn create_as<T>(&self, obj: &T) -> Result<T, StoreError>
    where
        T: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let created = self.create(&api_resource::<T>(), &to_dynamic(obj)?).await?;
        from_dynamic(created)
    }

    async fn update_as<T>(&self, obj: &T) -> Result<T, StoreError>
    where
        T: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let updated = self.update(&api_resource::<T>(), &to_dynamic(obj)?).await?;
        from_dynamic(updated)
    }

    async fn update_status_as<T>(&self, obj: &T) -> Result<T, StoreError>
    where
        T: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let updated = self
            .update_status(&api_resource::<T>(), &to_dynamic(obj)?)
            .await?;
        from_dynamic(updated)
    }

    async fn delete_as<T>(&self, key: &ObjectKey) -> Result<(), StoreError>
    where
        T: Resource<DynamicType = ()> + Send + 'static,
    {
        self.delete(&api_resource::<T>(), key).await
    }
}

impl<S: ResourceStore + ?Sized> StoreExt for S {}
