//! Component capability contract

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::DynamicObject;

use super::context::ReconcileContext;
use super::result::ComponentResult;
use super::watch::WatchKind;
use super::RootResource;
use crate::error::{Error, Result};
use crate::store::ObjectKey;

/// A sub-reconciler run on every pass against the shared root resource
#[async_trait]
pub trait Component<K: RootResource>: Send + Sync {
    /// Name used in logs and metrics; ordering is positional
    fn name(&self) -> &'static str;

    /// Auxiliary kinds whose changes should re-reconcile the owning root.
    /// Queried once at registration.
    fn watch_types(&self) -> Vec<WatchKind> {
        Vec::new()
    }

    /// Readiness gate evaluated against the in-memory root before the pass
    /// starts. Must not have side effects.
    fn is_reconcilable(&self, ctx: &ReconcileContext<K>) -> bool;

    async fn reconcile(&self, ctx: &mut ReconcileContext<K>) -> Result<ComponentResult<K::Status>>;

    /// Optional capabilities, queried once at registration
    fn capabilities(self: Arc<Self>) -> Capabilities<K> {
        Capabilities::none()
    }
}

/// Invoked on ready components when another component fails the pass
#[async_trait]
pub trait ErrorHandler<K: RootResource>: Send + Sync {
    async fn reconcile_error(
        &self,
        ctx: &mut ReconcileContext<K>,
        error: &Error,
    ) -> Result<ComponentResult<K::Status>>;
}

/// Maps an auxiliary object change to the roots that should be reconciled,
/// replacing owner-reference correlation
pub trait WatchMapper<K: RootResource>: Send + Sync {
    fn watch_map(&self, obj: &DynamicObject) -> Vec<ObjectKey>;
}

/// Optional capabilities a component exposes
pub struct Capabilities<K: RootResource> {
    pub error_handler: Option<Arc<dyn ErrorHandler<K>>>,
    pub watch_mapper: Option<Arc<dyn WatchMapper<K>>>,
}

impl<K: RootResource> Capabilities<K> {
    pub fn none() -> Self {
        Self {
            error_handler: None,
            watch_mapper: None,
        }
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler<K>>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_watch_mapper(mut self, mapper: Arc<dyn WatchMapper<K>>) -> Self {
        self.watch_mapper = Some(mapper);
        self
    }
}
