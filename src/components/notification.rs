//! Slack-compatible rollout and failure notifications
//!
//! The webhook URL lives in a user-managed Secret. Those Secrets are not owned
//! by the instance, so they are correlated back through the
//! `convoy.dev/instance` label instead of owner references.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::INSTANCE_LABEL;
use crate::crd::{AppInstance, AppInstanceStatus, NotificationSpec, NotificationStatus};
use crate::engine::{
    Capabilities, Component, ComponentResult, ErrorHandler, ReconcileContext, StatusModifier,
    WatchKind, WatchMapper,
};
use crate::error::{Error, Result};
use crate::store::{ObjectKey, StoreExt};

#[derive(Debug, Serialize, PartialEq)]
struct SlackMessage {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
}

pub struct Notification {
    http: reqwest::Client,
}

impl Notification {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn webhook_url(
        &self,
        ctx: &ReconcileContext<AppInstance>,
        spec: &NotificationSpec,
    ) -> Result<String> {
        let key = ObjectKey::namespaced(ctx.namespace(), &spec.webhook_secret_ref);
        let secret: Secret = ctx.store().get_as(&key).await?;
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(&spec.webhook_secret_key))
            .and_then(|value| String::from_utf8(value.0.clone()).ok())
            .map(|url| url.trim().to_string())
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "Secret {} has no key {}",
                    key, spec.webhook_secret_key
                ))
            })
    }

    async fn post(&self, url: &str, message: &SlackMessage) -> Result<()> {
        debug!("Posting notification: {}", message.text);
        self.http
            .post(url)
            .json(message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn all_replicas_ready(status: &AppInstanceStatus) -> bool {
    match (status.replicas, status.ready_replicas) {
        (Some(desired), Some(ready)) => desired > 0 && ready >= desired,
        _ => false,
    }
}

#[async_trait]
impl Component<AppInstance> for Notification {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn watch_types(&self) -> Vec<WatchKind> {
        vec![WatchKind::of::<Secret>()]
    }

    fn is_reconcilable(&self, ctx: &ReconcileContext<AppInstance>) -> bool {
        ctx.root().spec.notifications.is_some()
    }

    /// Announce a version once all of its replicas are ready
    #[instrument(skip(self, ctx), fields(name = %ctx.name(), namespace = %ctx.namespace()))]
    async fn reconcile(
        &self,
        ctx: &mut ReconcileContext<AppInstance>,
    ) -> Result<ComponentResult<AppInstanceStatus>> {
        let Some(spec) = ctx.root().spec.notifications.clone() else {
            return Ok(ComponentResult::done());
        };
        let status = ctx.status().cloned().unwrap_or_default();
        let version = ctx.root().spec.version.clone();

        if !all_replicas_ready(&status) {
            return Ok(ComponentResult::done());
        }
        let announced = status
            .notification
            .as_ref()
            .and_then(|n| n.last_notified_version.as_deref());
        if announced == Some(version.as_str()) {
            return Ok(ComponentResult::done());
        }

        let url = self.webhook_url(ctx, &spec).await?;
        let message = SlackMessage {
            text: format!(
                ":rocket: {}/{} is running {} ({} replicas ready)",
                ctx.namespace(),
                ctx.name(),
                ctx.root().spec.image_ref(),
                status.ready_replicas.unwrap_or_default()
            ),
            channel: spec.channel.clone(),
        };
        self.post(&url, &message).await?;
        info!("Announced version {}", version);

        Ok(ComponentResult::with_status(StatusModifier::infallible(
            "notified-version",
            move |s: &mut AppInstanceStatus| {
                let n = s.notification.get_or_insert_with(NotificationStatus::default);
                n.last_notified_version = Some(version.clone());
                n.last_error = None;
            },
        )))
    }

    fn capabilities(self: Arc<Self>) -> Capabilities<AppInstance> {
        Capabilities::none()
            .with_error_handler(self.clone())
            .with_watch_mapper(self)
    }
}

#[async_trait]
impl ErrorHandler<AppInstance> for Notification {
    /// Announce a failure, once per distinct message
    async fn reconcile_error(
        &self,
        ctx: &mut ReconcileContext<AppInstance>,
        error: &Error,
    ) -> Result<ComponentResult<AppInstanceStatus>> {
        let Some(spec) = ctx.root().spec.notifications.clone() else {
            return Ok(ComponentResult::done());
        };
        if !spec.notify_on_error {
            return Ok(ComponentResult::done());
        }

        let text = error.to_string();
        let already_sent = ctx
            .status()
            .and_then(|s| s.notification.as_ref())
            .and_then(|n| n.last_error.as_deref())
            == Some(text.as_str());
        if already_sent {
            debug!("Failure already announced");
            return Ok(ComponentResult::done());
        }

        let url = self.webhook_url(ctx, &spec).await?;
        let message = SlackMessage {
            text: format!(":x: {}/{} failed to reconcile: {}", ctx.namespace(), ctx.name(), text),
            channel: spec.channel.clone(),
        };
        if let Err(e) = self.post(&url, &message).await {
            warn!("Failed to announce reconcile error: {}", e);
            return Err(e);
        }

        Ok(ComponentResult::with_status(StatusModifier::infallible(
            "notified-error",
            move |s: &mut AppInstanceStatus| {
                s.notification
                    .get_or_insert_with(NotificationStatus::default)
                    .last_error = Some(text.clone());
            },
        )))
    }
}

impl WatchMapper<AppInstance> for Notification {
    /// Secrets labelled with an instance name re-trigger that instance
    fn watch_map(&self, obj: &DynamicObject) -> Vec<ObjectKey> {
        match obj.labels().get(INSTANCE_LABEL) {
            Some(instance) => vec![ObjectKey::new(obj.namespace(), instance)],
            None => Vec::new(),
        }
    }
}
