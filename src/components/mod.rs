//! Components that converge an AppInstance
//!
//! Registration order is the dependency order: the Deployment waits for the
//! configuration hash and the database credentials, notifications wait for
//! the rollout, and the status summary runs last.

pub mod conditions;
mod config_map;
mod database;
mod defaults;
mod deployment;
mod notification;
pub mod resources;
mod service;
mod status;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use config_map::{build_config_map, config_hash, Config};
pub use database::{Database, PASSWORD_KEY};
pub use defaults::Defaults;
pub use deployment::{build_deployment, desired_replicas, AppDeployment, ROLLOUT_REQUEUE};
pub use notification::Notification;
pub use service::{build_service, endpoint, AppService};
pub use status::{
    InstanceStatus, PHASE_DEPLOYING, PHASE_ERROR, PHASE_PENDING, PHASE_READY, PHASE_SUSPENDED,
};

use crate::crd::AppInstance;
use crate::engine::ComponentReconciler;
use crate::render::TemplateRenderer;
use crate::store::ResourceStore;

/// Label that ties user-managed objects (such as webhook Secrets) to an instance
pub const INSTANCE_LABEL: &str = "convoy.dev/instance";

/// Pod template annotation carrying the configuration hash
pub const CONFIG_HASH_ANNOTATION: &str = "convoy.dev/config-hash";

/// Name the engine reports in logs and metrics
pub const CONTROLLER_NAME: &str = "appinstance";

/// The AppInstance reconciler with every component registered in order
pub fn app_instance_reconciler(
    store: Arc<dyn ResourceStore>,
    renderer: Arc<TemplateRenderer>,
    http: reqwest::Client,
) -> ComponentReconciler<AppInstance> {
    ComponentReconciler::builder(CONTROLLER_NAME, store)
        .component(Defaults)
        .component(Database)
        .component(Config::new(Arc::clone(&renderer)))
        .component(AppDeployment::new(Arc::clone(&renderer)))
        .component(AppService::new(renderer))
        .component(Notification::new(http))
        .component(InstanceStatus)
        .build()
}
