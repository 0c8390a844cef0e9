//! ClusterIP Service in front of the Deployment

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use serde_json::json;
use tracing::instrument;

use super::resources::{adopt, apply_object, namespace_of, selector_labels, standard_labels};
use crate::crd::{AppInstance, AppInstanceStatus, DEFAULT_PORT};
use crate::engine::{Component, ComponentResult, ReconcileContext, StatusModifier, WatchKind};
use crate::error::Result;
use crate::render::{TemplateRenderer, SERVICE_TEMPLATE};

pub struct AppService {
    renderer: Arc<TemplateRenderer>,
}

impl AppService {
    pub fn new(renderer: Arc<TemplateRenderer>) -> Self {
        Self { renderer }
    }
}

/// In-cluster DNS address of the instance
pub fn endpoint(instance: &AppInstance) -> String {
    format!(
        "{}.{}.svc.cluster.local:{}",
        instance.metadata.name.as_deref().unwrap_or_default(),
        namespace_of(instance),
        instance.spec.port.unwrap_or(DEFAULT_PORT)
    )
}

pub fn build_service(renderer: &TemplateRenderer, instance: &AppInstance) -> Result<Service> {
    let values = json!({
        "name": instance.metadata.name,
        "namespace": namespace_of(instance),
        "labels": standard_labels(instance),
        "selector": selector_labels(instance),
        "port": instance.spec.port.unwrap_or(DEFAULT_PORT),
    });
    let mut service: Service = renderer.render(SERVICE_TEMPLATE, &values)?;
    adopt(&mut service, instance);
    Ok(service)
}

#[async_trait]
impl Component<AppInstance> for AppService {
    fn name(&self) -> &'static str {
        "service"
    }

    fn watch_types(&self) -> Vec<WatchKind> {
        vec![WatchKind::of::<Service>()]
    }

    fn is_reconcilable(&self, _ctx: &ReconcileContext<AppInstance>) -> bool {
        true
    }

    #[instrument(skip(self, ctx), fields(name = %ctx.name(), namespace = %ctx.namespace()))]
    async fn reconcile(
        &self,
        ctx: &mut ReconcileContext<AppInstance>,
    ) -> Result<ComponentResult<AppInstanceStatus>> {
        let service = build_service(&self.renderer, ctx.root())?;
        apply_object(ctx.store(), &service).await?;

        let address = endpoint(ctx.root());
        Ok(ComponentResult::with_status(StatusModifier::infallible(
            "endpoint",
            move |s: &mut AppInstanceStatus| s.endpoint = Some(address.clone()),
        )))
    }
}
