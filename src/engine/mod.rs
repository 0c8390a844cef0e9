//! Reconciliation orchestration engine
//!
//! A [`ComponentReconciler`] drives one root resource type toward its desired
//! state by running an ordered list of [`Component`]s on every pass:
//!
//! 1. every component's readiness gate is evaluated against the fresh root
//! 2. ready components run strictly in registration order, their results are
//!    merged and their status modifiers applied in memory
//! 3. on the first hard error the remaining components are skipped and every
//!    ready error handler is notified
//! 4. if the status changed, it is committed with a fast path and a bounded
//!    re-fetch/replay retry loop
//!
//! Registration order is the dependency graph: a component that needs state
//! set by another must be registered after it and gate on that state.

mod commit;
mod component;
mod context;
mod modifier;
mod orchestrator;
mod result;
pub mod watch;

#[cfg(test)]
mod orchestrator_test;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt::Debug;

use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use commit::{commit_status, MAX_STATUS_COMMIT_ATTEMPTS};
pub use component::{Capabilities, Component, ErrorHandler, WatchMapper};
pub use context::ReconcileContext;
pub use modifier::StatusModifier;
pub use orchestrator::{ComponentReconciler, ComponentReconcilerBuilder, PassReport};
pub use result::{min_nonzero, ComponentResult, PassOutcome, ReconcilerResults};
pub use watch::{ChangeDispatcher, Correlation, KubeDispatcher, Subscription, WatchKind};

/// A resource the engine can converge
///
/// The status must be comparable so the orchestrator can tell whether a pass
/// changed it, and defaultable so modifiers can run against a root that has
/// never had a status written.
pub trait RootResource:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    type Status: Clone + Debug + Default + PartialEq + Serialize + Send + Sync + 'static;

    fn status(&self) -> Option<&Self::Status>;

    /// Mutable status, created with its default value when absent
    fn status_mut(&mut self) -> &mut Self::Status;
}
