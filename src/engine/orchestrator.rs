//! Dependency gate and pass orchestration

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use super::commit::commit_status;
use super::component::{Component, ErrorHandler, WatchMapper};
use super::context::ReconcileContext;
use super::result::{PassOutcome, ReconcilerResults};
use super::watch::{plan_subscriptions, ChangeDispatcher, Subscription, WatchKind};
use super::RootResource;
use crate::error::{Error, Result};
use crate::store::{ObjectKey, ResourceStore, StoreExt};

/// A component together with the capabilities it exposed at registration
struct Registration<K: RootResource> {
    component: Arc<dyn Component<K>>,
    error_handler: Option<Arc<dyn ErrorHandler<K>>>,
    watch_mapper: Option<Arc<dyn WatchMapper<K>>>,
    watch_types: Vec<WatchKind>,
}

/// Result of one pass: the merged requeue request and the pass error, if any
#[derive(Debug, Default)]
pub struct PassReport {
    pub outcome: PassOutcome,
    pub error: Option<Error>,
}

impl PassReport {
    /// Translate the report into a controller action
    ///
    /// Errors are returned as-is so the controller's error policy applies its
    /// own backoff.
    pub fn into_action(self, default_requeue: Option<Duration>) -> Result<Action> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let delay = match (self.outcome.requeue_after, self.outcome.requeue) {
            (Some(after), _) => Some(after),
            (None, true) => Some(Duration::ZERO),
            (None, false) => default_requeue,
        };
        Ok(match delay {
            Some(delay) => Action::requeue(delay),
            None => Action::await_change(),
        })
    }
}

/// Runs the registered components against one root resource per pass
///
/// The registration list is built once and never mutated, so one reconciler
/// can serve concurrent passes for different roots.
pub struct ComponentReconciler<K: RootResource> {
    name: String,
    store: Arc<dyn ResourceStore>,
    registrations: Vec<Registration<K>>,
}

/// Collects components in registration order
pub struct ComponentReconcilerBuilder<K: RootResource> {
    name: String,
    store: Arc<dyn ResourceStore>,
    registrations: Vec<Registration<K>>,
}

impl<K: RootResource> ComponentReconcilerBuilder<K> {
    /// Register a component; its position is its execution and dependency
    /// order
    pub fn component<C: Component<K> + 'static>(self, component: C) -> Self {
        self.shared_component(Arc::new(component))
    }

    pub fn shared_component(mut self, component: Arc<dyn Component<K>>) -> Self {
        let watch_types = component.watch_types();
        let capabilities = Arc::clone(&component).capabilities();
        debug!(
            "Registered component {} (error handler: {}, watch mapper: {})",
            component.name(),
            capabilities.error_handler.is_some(),
            capabilities.watch_mapper.is_some()
        );
        self.registrations.push(Registration {
            component,
            error_handler: capabilities.error_handler,
            watch_mapper: capabilities.watch_mapper,
            watch_types,
        });
        self
    }

    pub fn build(self) -> ComponentReconciler<K> {
        ComponentReconciler {
            name: self.name,
            store: self.store,
            registrations: self.registrations,
        }
    }
}

impl<K: RootResource> ComponentReconciler<K> {
    pub fn builder(name: impl Into<String>, store: Arc<dyn ResourceStore>) -> ComponentReconcilerBuilder<K> {
        ComponentReconcilerBuilder {
            name: name.into(),
            store,
            registrations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the registered components, in order
    pub fn component_names(&self) -> Vec<&'static str> {
        self.registrations.iter().map(|r| r.component.name()).collect()
    }

    /// Deduplicated watch subscriptions for all registered components
    pub fn subscriptions(&self) -> Vec<Subscription<K>> {
        let declared: Vec<_> = self
            .registrations
            .iter()
            .map(|r| {
                (
                    r.component.name(),
                    r.watch_types.clone(),
                    r.watch_mapper.clone(),
                )
            })
            .collect();
        plan_subscriptions(&declared)
    }

    /// Hand every planned subscription to the dispatcher
    pub fn register_watches(&self, dispatcher: &mut dyn ChangeDispatcher<K>) {
        for subscription in self.subscriptions() {
            dispatcher.subscribe(subscription);
        }
    }

    /// Run one full pass for the root identified by `key`
    #[instrument(skip(self), fields(controller = %self.name, key = %key))]
    pub async fn reconcile_pass(&self, key: &ObjectKey) -> PassReport {
        let root = match self.store.get_as::<K>(key).await {
            Ok(root) => root,
            Err(e) if e.is_not_found() => {
                debug!("{} {} not found, assuming it was deleted", K::kind(&()), key);
                return PassReport::default();
            }
            Err(e) => {
                return PassReport {
                    outcome: PassOutcome::default(),
                    error: Some(e.into()),
                }
            }
        };

        let span = tracing::Span::current();
        let mut ctx = ReconcileContext::new(root, Arc::clone(&self.store), span);

        // Gating: decided once against the freshly fetched root
        let ready: Vec<&Registration<K>> = self
            .registrations
            .iter()
            .filter(|r| r.component.is_reconcilable(&ctx))
            .collect();
        debug!(
            "{} of {} components ready: {:?}",
            ready.len(),
            self.registrations.len(),
            ready.iter().map(|r| r.component.name()).collect::<Vec<_>>()
        );

        let pristine = ctx.status().cloned();
        let mut results = ReconcilerResults::<K>::default();

        // Running
        let mut failure: Option<Error> = None;
        for registration in &ready {
            let name = registration.component.name();
            let outcome = registration
                .component
                .reconcile(&mut ctx)
                .instrument(info_span!("component", name))
                .await;
            match outcome {
                Ok(result) => results.merge(ctx.root_mut(), result),
                Err(e) => {
                    error!("Component {} failed: {}", name, e);
                    #[cfg(feature = "metrics")]
                    crate::metrics::inc_component_error(&self.name, name);
                    failure = Some(e);
                    break;
                }
            }
        }

        // Error broadcast
        if let Some(primary) = failure {
            self.broadcast_error(&ready, &mut ctx, &mut results, &primary)
                .await;
            if let Some(displaced) = results.set_primary_error(primary) {
                debug!("Primary error supersedes {}", displaced);
            }
        }

        // Committing
        if ctx.status() != pristine.as_ref() {
            let root = ctx.into_root();
            if let Err(e) = commit_status(self.store.as_ref(), &root, &results.modifiers).await {
                error!("Failed to commit status: {}", e);
                results.record_error(e);
            }
        } else {
            debug!("Status unchanged, nothing to commit");
        }

        if results.error.is_none() {
            info!("Pass complete: {:?}", results.outcome);
        }

        PassReport {
            outcome: results.outcome,
            error: results.error,
        }
    }

    /// Notify every ready component with an error handler
    async fn broadcast_error(
        &self,
        ready: &[&Registration<K>],
        ctx: &mut ReconcileContext<K>,
        results: &mut ReconcilerResults<K>,
        primary: &Error,
    ) {
        for registration in ready {
            let Some(handler) = &registration.error_handler else {
                continue;
            };
            let name = registration.component.name();
            let outcome = handler
                .reconcile_error(ctx, primary)
                .instrument(info_span!("error_handler", name))
                .await;
            match outcome {
                Ok(result) => results.merge(ctx.root_mut(), result),
                Err(e) => {
                    warn!("Error handler {} failed: {}", name, e);
                    results.record_error(Error::ErrorHandlerError {
                        component: name.to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}
