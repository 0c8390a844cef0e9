//! Helpers for exercising a single component against the in-memory store

use std::sync::Arc;

use kube::api::ObjectMeta;

use crate::crd::{AppInstance, AppInstanceSpec, AppInstanceStatus};
use crate::engine::{Component, PassOutcome, ReconcileContext, ReconcilerResults};
use crate::error::Result;
use crate::store::{MemoryStore, ResourceStore};

pub fn app_instance(name: &str) -> AppInstance {
    AppInstance {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("uid-{}", name)),
            generation: Some(1),
            ..Default::default()
        },
        spec: AppInstanceSpec {
            image: "ghcr.io/acme/web".to_string(),
            version: "1.0.0".to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// Run one component and merge its result the way a pass would
pub async fn reconcile_once<C: Component<AppInstance>>(
    component: &C,
    store: &Arc<MemoryStore>,
    instance: AppInstance,
) -> Result<(PassOutcome, AppInstanceStatus)> {
    let store: Arc<dyn ResourceStore> = store.clone();
    let mut ctx = ReconcileContext::new(instance, store, tracing::Span::none());
    let result = component.reconcile(&mut ctx).await?;

    let mut results = ReconcilerResults::<AppInstance>::default();
    results.merge(ctx.root_mut(), result);
    let status = ctx.status().cloned().unwrap_or_default();
    Ok((results.outcome, status))
}
