//! Per-pass reconcile context

use std::sync::Arc;

use tracing::Span;

use super::RootResource;
use crate::store::{ObjectKey, ResourceStore};

/// State shared by the components of a single pass
///
/// The context owns the in-memory root resource for the lifetime of the pass.
/// Components borrow it one at a time, so edits made by one component are
/// visible to the components that run after it. Only status changes made
/// through status modifiers are persisted; spec edits (for example defaults)
/// live in memory only and are re-applied on every pass.
pub struct ReconcileContext<K: RootResource> {
    root: K,
    key: ObjectKey,
    store: Arc<dyn ResourceStore>,
    span: Span,
}

impl<K: RootResource> ReconcileContext<K> {
    pub fn new(root: K, store: Arc<dyn ResourceStore>, span: Span) -> Self {
        let key = ObjectKey::from_resource(&root);
        Self {
            root,
            key,
            store,
            span,
        }
    }

    /// The in-memory root resource
    pub fn root(&self) -> &K {
        &self.root
    }

    /// Mutable access to the in-memory root resource
    pub fn root_mut(&mut self) -> &mut K {
        &mut self.root
    }

    /// Current in-memory status, if any
    pub fn status(&self) -> Option<&K::Status> {
        self.root.status()
    }

    /// Identity of the root resource being reconciled
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn namespace(&self) -> &str {
        self.key.namespace.as_deref().unwrap_or("default")
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    /// Span of the pass; component spans are children of it
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn into_root(self) -> K {
        self.root
    }
}
