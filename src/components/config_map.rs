//! Rendered application configuration

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use super::resources::{adopt, apply_object, namespace_of, resource_name, standard_labels};
use crate::crd::{AppInstance, AppInstanceStatus};
use crate::engine::{Component, ComponentResult, ReconcileContext, StatusModifier, WatchKind};
use crate::error::Result;
use crate::render::{TemplateRenderer, CONFIG_MAP_TEMPLATE};

pub struct Config {
    renderer: Arc<TemplateRenderer>,
}

impl Config {
    pub fn new(renderer: Arc<TemplateRenderer>) -> Self {
        Self { renderer }
    }
}

/// SHA-256 over the ConfigMap data, hex encoded
pub fn config_hash(cm: &ConfigMap) -> Result<String> {
    let data = serde_json::to_vec(&cm.data)?;
    Ok(hex::encode(Sha256::digest(&data)))
}

pub fn build_config_map(renderer: &TemplateRenderer, instance: &AppInstance) -> Result<ConfigMap> {
    let values = json!({
        "name": resource_name(instance, "config"),
        "namespace": namespace_of(instance),
        "labels": standard_labels(instance),
        "config": instance.spec.config,
    });
    let mut cm: ConfigMap = renderer.render(CONFIG_MAP_TEMPLATE, &values)?;
    adopt(&mut cm, instance);
    Ok(cm)
}

#[async_trait]
impl Component<AppInstance> for Config {
    fn name(&self) -> &'static str {
        "config"
    }

    fn watch_types(&self) -> Vec<WatchKind> {
        vec![WatchKind::of::<ConfigMap>()]
    }

    fn is_reconcilable(&self, _ctx: &ReconcileContext<AppInstance>) -> bool {
        true
    }

    #[instrument(skip(self, ctx), fields(name = %ctx.name(), namespace = %ctx.namespace()))]
    async fn reconcile(
        &self,
        ctx: &mut ReconcileContext<AppInstance>,
    ) -> Result<ComponentResult<AppInstanceStatus>> {
        let cm = build_config_map(&self.renderer, ctx.root())?;
        let hash = config_hash(&cm)?;
        apply_object(ctx.store(), &cm).await?;

        let previous = ctx.status().and_then(|s| s.config_hash.clone());
        let changed = previous.as_deref() != Some(hash.as_str());
        if changed {
            info!("Configuration changed: {:?} -> {}", previous, hash);
        }

        let result = ComponentResult::with_status(StatusModifier::infallible(
            "config-hash",
            move |s: &mut AppInstanceStatus| s.config_hash = Some(hash.clone()),
        ));
        Ok(ComponentResult {
            requeue: changed,
            ..result
        })
    }
}
