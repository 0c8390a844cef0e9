//! Application Deployment

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::database::PASSWORD_KEY;
use super::resources::{
    adopt, apply_object, namespace_of, resource_name, selector_labels, standard_labels,
};
use crate::crd::{AppInstance, AppInstanceStatus, DEFAULT_PORT, DEFAULT_REPLICAS};
use crate::engine::{Component, ComponentResult, ReconcileContext, StatusModifier, WatchKind};
use crate::error::Result;
use crate::render::{TemplateRenderer, DEPLOYMENT_TEMPLATE};

/// Poll interval while replicas are still becoming ready
pub const ROLLOUT_REQUEUE: Duration = Duration::from_secs(15);

pub struct AppDeployment {
    renderer: Arc<TemplateRenderer>,
}

impl AppDeployment {
    pub fn new(renderer: Arc<TemplateRenderer>) -> Self {
        Self { renderer }
    }
}

/// Desired replica count after suspension is taken into account
pub fn desired_replicas(instance: &AppInstance) -> i32 {
    if instance.spec.suspended {
        0
    } else {
        instance.spec.replicas.unwrap_or(DEFAULT_REPLICAS)
    }
}

fn container_env(instance: &AppInstance) -> Vec<Value> {
    let mut env: Vec<Value> = instance
        .spec
        .env
        .iter()
        .map(|(name, value)| json!({"name": name, "value": value}))
        .collect();

    if let Some(db) = &instance.spec.database {
        let secret = resource_name(instance, "database");
        env.push(json!({"name": "DATABASE_HOST", "value": db.host}));
        env.push(json!({"name": "DATABASE_PORT", "value": db.port.to_string()}));
        if let Some(name) = &db.database_name {
            env.push(json!({"name": "DATABASE_NAME", "value": name}));
        }
        if let Some(user) = &db.username {
            env.push(json!({"name": "DATABASE_USER", "value": user}));
        }
        env.push(json!({
            "name": "DATABASE_PASSWORD",
            "valueFrom": {"secretKeyRef": {"name": secret, "key": PASSWORD_KEY}}
        }));
    }

    env
}

pub fn build_deployment(
    renderer: &TemplateRenderer,
    instance: &AppInstance,
    config_hash: &str,
) -> Result<Deployment> {
    let values = json!({
        "name": instance.metadata.name,
        "namespace": namespace_of(instance),
        "labels": standard_labels(instance),
        "selector": selector_labels(instance),
        "replicas": desired_replicas(instance),
        "image": instance.spec.image_ref(),
        "port": instance.spec.port.unwrap_or(DEFAULT_PORT),
        "configHash": config_hash,
        "configMapName": resource_name(instance, "config"),
        "env": container_env(instance),
    });
    let mut deployment: Deployment = renderer.render(DEPLOYMENT_TEMPLATE, &values)?;
    adopt(&mut deployment, instance);
    Ok(deployment)
}

#[async_trait]
impl Component<AppInstance> for AppDeployment {
    fn name(&self) -> &'static str {
        "deployment"
    }

    fn watch_types(&self) -> Vec<WatchKind> {
        vec![WatchKind::of::<Deployment>()]
    }

    /// Needs the rendered configuration and, when requested, the database
    /// credentials
    fn is_reconcilable(&self, ctx: &ReconcileContext<AppInstance>) -> bool {
        let Some(status) = ctx.status() else {
            return false;
        };
        status.config_hash.is_some()
            && (ctx.root().spec.database.is_none() || status.database_ready())
    }

    #[instrument(skip(self, ctx), fields(name = %ctx.name(), namespace = %ctx.namespace()))]
    async fn reconcile(
        &self,
        ctx: &mut ReconcileContext<AppInstance>,
    ) -> Result<ComponentResult<AppInstanceStatus>> {
        let instance = ctx.root();
        let config_hash = ctx
            .status()
            .and_then(|s| s.config_hash.clone())
            .unwrap_or_default();

        let desired = build_deployment(&self.renderer, instance, &config_hash)?;
        let live = apply_object(ctx.store(), &desired).await?;

        let replicas = desired_replicas(instance);
        let ready = live
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);
        info!("{}/{} replicas ready", ready, replicas);

        let result = ComponentResult::with_status(StatusModifier::infallible(
            "replicas",
            move |s: &mut AppInstanceStatus| {
                s.replicas = Some(replicas);
                s.ready_replicas = Some(ready);
            },
        ));
        Ok(if ready < replicas {
            result.and_requeue_after(ROLLOUT_REQUEUE)
        } else {
            result
        })
    }
}
