//! Shared helpers for the objects an AppInstance owns
//!
//! Objects are applied with create-or-update semantics. An update is only sent
//! when the desired object is not already a subset of the live one, so fields
//! defaulted by the API server never cause churn.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::crd::AppInstance;
use crate::error::Result;
use crate::store::{ObjectKey, ResourceStore, StoreExt};

use super::INSTANCE_LABEL;

/// Standard Kubernetes labels for all resources owned by an instance
pub fn standard_labels(instance: &AppInstance) -> BTreeMap<String, String> {
    let mut labels = selector_labels(instance);
    labels.insert("app.kubernetes.io/name".to_string(), instance.spec.image_name());
    labels.insert("app.kubernetes.io/version".to_string(), instance.spec.version.clone());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "convoy-operator".to_string(),
    );
    labels
}

/// Labels that select the instance's pods; must never change for a live
/// Deployment
pub fn selector_labels(instance: &AppInstance) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/instance".to_string(), instance.name_any()),
        (INSTANCE_LABEL.to_string(), instance.name_any()),
    ])
}

/// Create an OwnerReference for garbage collection
pub fn owner_reference(instance: &AppInstance) -> OwnerReference {
    OwnerReference {
        api_version: AppInstance::api_version(&()).to_string(),
        kind: AppInstance::kind(&()).to_string(),
        name: instance.name_any(),
        uid: instance.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Build the resource name for a given suffix
pub fn resource_name(instance: &AppInstance, suffix: &str) -> String {
    format!("{}-{}", instance.name_any(), suffix)
}

/// Namespace of the instance, `default` when unset
pub fn namespace_of(instance: &AppInstance) -> String {
    instance.namespace().unwrap_or_else(|| "default".to_string())
}

/// Attach the controller owner reference to a rendered object
pub fn adopt<T: Resource>(obj: &mut T, instance: &AppInstance) {
    obj.meta_mut().owner_references = Some(vec![owner_reference(instance)]);
}

/// Create `desired` if it does not exist, otherwise update it when it drifted
pub async fn apply_object<T>(store: &dyn ResourceStore, desired: &T) -> Result<T>
where
    T: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let key = ObjectKey::from_resource(desired);
    let kind = T::kind(&());

    match store.get_as::<T>(&key).await {
        Ok(live) => {
            if !needs_update(desired, &live)? {
                debug!("{} {} is up to date", kind, key);
                return Ok(live);
            }
            let mut updated = desired.clone();
            updated.meta_mut().resource_version = live.meta().resource_version.clone();
            info!("Updating {} {}", kind, key);
            Ok(store.update_as(&updated).await?)
        }
        Err(e) if e.is_not_found() => {
            info!("Creating {} {}", kind, key);
            Ok(store.create_as(desired).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether the live object is missing anything the desired object sets
pub fn needs_update<T: Serialize>(desired: &T, live: &T) -> Result<bool> {
    let mut desired = serde_json::to_value(desired)?;
    let live = serde_json::to_value(live)?;
    prune_server_fields(&mut desired);
    Ok(!is_subset(&desired, &live))
}

fn prune_server_fields(obj: &mut Value) {
    let Some(map) = obj.as_object_mut() else {
        return;
    };
    map.remove("status");
    if let Some(Value::Object(meta)) = map.get_mut("metadata") {
        meta.retain(|k, _| matches!(k.as_str(), "labels" | "annotations" | "ownerReferences"));
    }
}

fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(k, v)| match have.get(k) {
            Some(h) => is_subset(v, h),
            None => v.is_null(),
        }),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| is_subset(w, h))
        }
        (want, have) => want == have,
    }
}
