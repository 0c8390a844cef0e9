//! Phase, observed generation and the Ready condition
//!
//! Runs last so it sees everything earlier components recorded in this pass.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::conditions::{set_condition, CONDITION_TYPE_READY};
use crate::crd::{AppInstance, AppInstanceStatus};
use crate::engine::{
    Capabilities, Component, ComponentResult, ErrorHandler, ReconcileContext, StatusModifier,
};
use crate::error::{Error, Result};

pub const PHASE_PENDING: &str = "Pending";
pub const PHASE_DEPLOYING: &str = "Deploying";
pub const PHASE_READY: &str = "Ready";
pub const PHASE_SUSPENDED: &str = "Suspended";
pub const PHASE_ERROR: &str = "Error";

pub struct InstanceStatus;

/// Phase, Ready flag, reason and message for the current in-memory state
fn summarize(instance: &AppInstance) -> (&'static str, bool, &'static str, String) {
    let status = instance.status.clone().unwrap_or_default();

    if instance.spec.suspended {
        return (PHASE_SUSPENDED, false, "Suspended", "Scaled to zero".to_string());
    }
    match (status.replicas, status.ready_replicas) {
        (Some(desired), Some(ready)) if ready >= desired => (
            PHASE_READY,
            true,
            "AllReplicasReady",
            format!("{}/{} replicas ready", ready, desired),
        ),
        (Some(desired), ready) => (
            PHASE_DEPLOYING,
            false,
            "RollingOut",
            format!("{}/{} replicas ready", ready.unwrap_or(0), desired),
        ),
        (None, _) if status.config_hash.is_none() => (
            PHASE_PENDING,
            false,
            "RenderingConfig",
            "Waiting for configuration".to_string(),
        ),
        (None, _) => (
            PHASE_PENDING,
            false,
            "WaitingForDependencies",
            "Waiting for dependencies before deploying".to_string(),
        ),
    }
}

#[async_trait]
impl Component<AppInstance> for InstanceStatus {
    fn name(&self) -> &'static str {
        "status"
    }

    fn is_reconcilable(&self, _ctx: &ReconcileContext<AppInstance>) -> bool {
        true
    }

    async fn reconcile(
        &self,
        ctx: &mut ReconcileContext<AppInstance>,
    ) -> Result<ComponentResult<AppInstanceStatus>> {
        let (phase, ready, reason, message) = summarize(ctx.root());
        let generation = ctx.root().metadata.generation;
        let now = Utc::now().to_rfc3339();

        Ok(ComponentResult::with_status(StatusModifier::infallible(
            "phase",
            move |s: &mut AppInstanceStatus| {
                s.phase = Some(phase.to_string());
                s.message = Some(message.clone());
                s.observed_generation = generation;
                set_condition(
                    &mut s.conditions,
                    CONDITION_TYPE_READY,
                    ready,
                    reason,
                    &message,
                    &now,
                    generation,
                );
            },
        )))
    }

    fn capabilities(self: Arc<Self>) -> Capabilities<AppInstance> {
        Capabilities::none().with_error_handler(self)
    }
}

#[async_trait]
impl ErrorHandler<AppInstance> for InstanceStatus {
    /// Record the failure as the durable error state of the instance
    async fn reconcile_error(
        &self,
        ctx: &mut ReconcileContext<AppInstance>,
        error: &Error,
    ) -> Result<ComponentResult<AppInstanceStatus>> {
        let message = error.to_string();
        let reason = if error.is_retriable() {
            "ReconcileError"
        } else {
            "InvalidSpec"
        };
        let generation = ctx.root().metadata.generation;
        let now = Utc::now().to_rfc3339();

        Ok(ComponentResult::with_status(StatusModifier::infallible(
            "phase-error",
            move |s: &mut AppInstanceStatus| {
                s.phase = Some(PHASE_ERROR.to_string());
                s.message = Some(message.clone());
                set_condition(
                    &mut s.conditions,
                    CONDITION_TYPE_READY,
                    false,
                    reason,
                    &message,
                    &now,
                    generation,
                );
            },
        )))
    }
}
