//! Controller loop for AppInstance resources
//!
//! Wires the component engine into the kube-rs runtime: the engine plans the
//! auxiliary watches, kube-runtime schedules passes and this module maps each
//! pass report onto an [`Action`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::crd::AppInstance;
use crate::engine::{ComponentReconciler, KubeDispatcher};
use crate::error::{Error, Result};
use crate::store::ObjectKey;

/// Requeue delay after a retriable failure
pub const RETRY_DELAY: Duration = Duration::from_secs(15);

/// Requeue delay after a failure that needs a spec change
pub const PERMANENT_ERROR_DELAY: Duration = Duration::from_secs(60);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub engine: Arc<ComponentReconciler<AppInstance>>,
    pub config: OperatorConfig,
}

fn instance_api(client: Client, config: &OperatorConfig) -> Api<AppInstance> {
    match config.namespace() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let instances = instance_api(client.clone(), &state.config);

    info!("Starting {} controller", state.engine.name());

    // Verify CRD exists
    match instances.list(&Default::default()).await {
        Ok(_) => info!("AppInstance CRD is available"),
        Err(e) => {
            error!(
                "AppInstance CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "AppInstance CRD not installed".to_string(),
            ));
        }
    }

    let mut dispatcher = KubeDispatcher::new(client, Controller::new(instances, Config::default()))
        .within(state.config.namespace());
    state.engine.register_watches(&mut dispatcher);
    let controller = dispatcher
        .into_controller()
        .ok_or_else(|| Error::ConfigError("controller lost while registering watches".to_string()))?;

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => info!("Reconciled {}: {:?}", obj, action),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// Run one engine pass for the triggering instance
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<AppInstance>, ctx: Arc<ControllerState>) -> Result<Action> {
    let started = Instant::now();
    let report = ctx.engine.reconcile_pass(&ObjectKey::from_resource(obj.as_ref())).await;

    #[cfg(feature = "metrics")]
    crate::metrics::observe_reconcile_duration_seconds(
        ctx.engine.name(),
        started.elapsed().as_secs_f64(),
    );
    #[cfg(not(feature = "metrics"))]
    let _ = started;

    report.into_action(ctx.config.default_requeue())
}

/// How long to wait before retrying a failed pass
pub fn retry_delay(error: &Error) -> Duration {
    if error.is_retriable() {
        RETRY_DELAY
    } else {
        PERMANENT_ERROR_DELAY
    }
}

fn error_policy(obj: Arc<AppInstance>, error: &Error, ctx: Arc<ControllerState>) -> Action {
    warn!(
        "Reconciliation error for {}: {} ({})",
        obj.name_any(),
        error,
        error.kind_label()
    );

    #[cfg(feature = "metrics")]
    crate::metrics::inc_reconcile_error(ctx.engine.name(), error.kind_label());
    #[cfg(not(feature = "metrics"))]
    let _ = ctx;

    Action::requeue(retry_delay(error))
}
