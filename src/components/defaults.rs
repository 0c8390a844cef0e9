//! Spec validation and in-memory defaulting
//!
//! Defaults are applied to the in-memory root only and never written back,
//! so this component must stay first and run on every pass.

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::debug;

use crate::crd::{AppInstance, AppInstanceStatus, DEFAULT_PORT, DEFAULT_REPLICAS};
use crate::engine::{Component, ComponentResult, ReconcileContext};
use crate::error::{Error, Result};

pub struct Defaults;

#[async_trait]
impl Component<AppInstance> for Defaults {
    fn name(&self) -> &'static str {
        "defaults"
    }

    fn is_reconcilable(&self, _ctx: &ReconcileContext<AppInstance>) -> bool {
        true
    }

    async fn reconcile(
        &self,
        ctx: &mut ReconcileContext<AppInstance>,
    ) -> Result<ComponentResult<AppInstanceStatus>> {
        let instance = ctx.root_mut();

        if let Err(errors) = instance.spec.validate() {
            let message = errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::ValidationError(message));
        }

        let name = instance.name_any();
        let spec = &mut instance.spec;
        spec.replicas.get_or_insert(DEFAULT_REPLICAS);
        spec.port.get_or_insert(DEFAULT_PORT);
        if let Some(db) = spec.database.as_mut() {
            db.database_name.get_or_insert_with(|| name.clone());
            db.username.get_or_insert_with(|| name.clone());
        }
        debug!("Applied defaults: replicas={:?} port={:?}", spec.replicas, spec.port);

        Ok(ComponentResult::done())
    }
}
