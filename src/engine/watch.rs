//! Watch registration and de-duplication
//!
//! Components declare which auxiliary kinds should re-trigger the owning root.
//! The plan is computed once at startup: owner-correlated watches of the same
//! kind collapse into a single subscription, while components with a custom
//! mapper get a subscription of their own for each kind they declare.

use std::fmt;
use std::sync::Arc;

use kube::api::{Api, DynamicObject};
use kube::discovery::ApiResource;
use kube::runtime::controller::Controller;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config;
use kube::Client;
use tracing::{debug, info};

use super::component::WatchMapper;
use super::RootResource;
use crate::store::api_resource;

/// An auxiliary resource kind
#[derive(Clone)]
pub struct WatchKind(ApiResource);

impl WatchKind {
    /// Kind of a statically typed Kubernetes object
    pub fn of<T: kube::Resource<DynamicType = ()>>() -> Self {
        Self(api_resource::<T>())
    }

    pub fn from_api_resource(resource: ApiResource) -> Self {
        Self(resource)
    }

    pub fn api_resource(&self) -> &ApiResource {
        &self.0
    }

    fn identity(&self) -> (&str, &str, &str) {
        (&self.0.group, &self.0.version, &self.0.kind)
    }
}

impl PartialEq for WatchKind {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for WatchKind {}

impl fmt::Debug for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.api_version, self.0.kind)
    }
}

/// How an auxiliary object is correlated back to a root
pub enum Correlation<K: RootResource> {
    /// Follow the controller owner reference
    Owner,
    /// Ask the component's mapper
    Mapped(Arc<dyn WatchMapper<K>>),
}

impl<K: RootResource> Clone for Correlation<K> {
    fn clone(&self) -> Self {
        match self {
            Correlation::Owner => Correlation::Owner,
            Correlation::Mapped(mapper) => Correlation::Mapped(Arc::clone(mapper)),
        }
    }
}

impl<K: RootResource> fmt::Debug for Correlation<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correlation::Owner => write!(f, "Owner"),
            Correlation::Mapped(_) => write!(f, "Mapped"),
        }
    }
}

/// One change-notification subscription
#[derive(Clone, Debug)]
pub struct Subscription<K: RootResource> {
    pub kind: WatchKind,
    pub correlation: Correlation<K>,
    /// Component that first declared the watch
    pub component: &'static str,
}

/// Consumer of the planned subscriptions
pub trait ChangeDispatcher<K: RootResource> {
    fn subscribe(&mut self, subscription: Subscription<K>);
}

/// Collapse the declared watches into the subscriptions to create
///
/// `declared` holds, in registration order, each component's name, its watch
/// kinds and its mapper (if any).
pub fn plan_subscriptions<K: RootResource>(
    declared: &[(&'static str, Vec<WatchKind>, Option<Arc<dyn WatchMapper<K>>>)],
) -> Vec<Subscription<K>> {
    let mut planned: Vec<Subscription<K>> = Vec::new();

    for (component, kinds, mapper) in declared {
        let component = *component;
        for kind in kinds {
            match mapper {
                Some(mapper) => planned.push(Subscription {
                    kind: kind.clone(),
                    correlation: Correlation::Mapped(Arc::clone(mapper)),
                    component,
                }),
                None => {
                    let duplicate = planned.iter().any(|s| {
                        matches!(s.correlation, Correlation::Owner) && s.kind == *kind
                    });
                    if duplicate {
                        debug!("{} already watches {:?} by owner", component, kind);
                        continue;
                    }
                    planned.push(Subscription {
                        kind: kind.clone(),
                        correlation: Correlation::Owner,
                        component,
                    });
                }
            }
        }
    }

    planned
}

/// Dispatcher that wires subscriptions into a kube-runtime `Controller`
pub struct KubeDispatcher<K: RootResource> {
    client: Client,
    controller: Option<Controller<K>>,
    watcher_config: Config,
    namespace: Option<String>,
}

impl<K: RootResource> KubeDispatcher<K> {
    pub fn new(client: Client, controller: Controller<K>) -> Self {
        Self {
            client,
            controller: Some(controller),
            watcher_config: Config::default(),
            namespace: None,
        }
    }

    /// Restrict auxiliary watches to one namespace
    pub fn within(mut self, namespace: Option<&str>) -> Self {
        self.namespace = namespace.map(str::to_string);
        self
    }

    /// The controller with every subscription attached
    pub fn into_controller(mut self) -> Option<Controller<K>> {
        self.controller.take()
    }
}

impl<K: RootResource> ChangeDispatcher<K> for KubeDispatcher<K> {
    fn subscribe(&mut self, subscription: Subscription<K>) {
        let Some(controller) = self.controller.take() else {
            return;
        };
        let resource = subscription.kind.api_resource().clone();
        let api: Api<DynamicObject> = match &self.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        };

        info!(
            "Watching {:?} for {} ({:?})",
            subscription.kind, subscription.component, subscription.correlation
        );

        let controller = match subscription.correlation {
            Correlation::Owner => {
                controller.owns_with(api, resource, self.watcher_config.clone())
            }
            Correlation::Mapped(mapper) => controller.watches_with(
                api,
                resource,
                self.watcher_config.clone(),
                move |obj: DynamicObject| {
                    mapper
                        .watch_map(&obj)
                        .into_iter()
                        .map(|key| {
                            let reference = ObjectRef::<K>::new(&key.name);
                            match key.namespace {
                                Some(ns) => reference.within(&ns),
                                None => reference,
                            }
                        })
                        .collect::<Vec<_>>()
                },
            ),
        };
        self.controller = Some(controller);
    }
}
