//! Test fixtures for the engine: a small root resource and a scriptable
//! component that journals every call

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::component::{Capabilities, Component, ErrorHandler};
use super::context::ReconcileContext;
use super::result::ComponentResult;
use super::watch::WatchKind;
use super::RootResource;
use crate::error::{Error, Result};

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "test.convoy.dev",
    version = "v1",
    kind = "Widget",
    namespaced,
    status = "WidgetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSpec {
    pub replicas: Option<i32>,
    pub database: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStatus {
    pub phase: Option<String>,
    pub db_ready: bool,
    pub notified: bool,
    pub counter: i32,
    pub history: Vec<String>,
}

impl RootResource for Widget {
    type Status = WidgetStatus;

    fn status(&self) -> Option<&WidgetStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut WidgetStatus {
        self.status.get_or_insert_with(WidgetStatus::default)
    }
}

pub fn widget(name: &str, status: Option<WidgetStatus>) -> Widget {
    Widget {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: WidgetSpec::default(),
        status,
    }
}

/// Ordered record of the calls made on scripted components
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

type Gate = Box<dyn Fn(&Widget) -> bool + Send + Sync>;
type Step = Box<dyn Fn(&mut Widget) -> Result<ComponentResult<WidgetStatus>> + Send + Sync>;
type OnError = Box<dyn Fn(&Error) -> Result<ComponentResult<WidgetStatus>> + Send + Sync>;

/// Component whose gate, reconcile and error handling are closures
pub struct Scripted {
    name: &'static str,
    journal: Journal,
    gate: Gate,
    step: Step,
    on_error: Option<OnError>,
    watches: Vec<WatchKind>,
}

impl Scripted {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            gate: Box::new(|_| true),
            step: Box::new(|_| Ok(ComponentResult::done())),
            on_error: None,
            watches: Vec::new(),
        }
    }

    pub fn gated(mut self, gate: impl Fn(&Widget) -> bool + Send + Sync + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    pub fn step(
        mut self,
        step: impl Fn(&mut Widget) -> Result<ComponentResult<WidgetStatus>> + Send + Sync + 'static,
    ) -> Self {
        self.step = Box::new(step);
        self
    }

    pub fn failing(self, message: &'static str) -> Self {
        self.step(move |_| Err(Error::ValidationError(message.to_string())))
    }

    pub fn handles_errors(
        mut self,
        on_error: impl Fn(&Error) -> Result<ComponentResult<WidgetStatus>> + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn watching(mut self, kinds: Vec<WatchKind>) -> Self {
        self.watches = kinds;
        self
    }
}

#[async_trait]
impl Component<Widget> for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    fn watch_types(&self) -> Vec<WatchKind> {
        self.watches.clone()
    }

    fn is_reconcilable(&self, ctx: &ReconcileContext<Widget>) -> bool {
        (self.gate)(ctx.root())
    }

    async fn reconcile(
        &self,
        ctx: &mut ReconcileContext<Widget>,
    ) -> Result<ComponentResult<WidgetStatus>> {
        self.journal.record(format!("reconcile:{}", self.name));
        (self.step)(ctx.root_mut())
    }

    fn capabilities(self: Arc<Self>) -> Capabilities<Widget> {
        if self.on_error.is_some() {
            Capabilities::none().with_error_handler(self)
        } else {
            Capabilities::none()
        }
    }
}

#[async_trait]
impl ErrorHandler<Widget> for Scripted {
    async fn reconcile_error(
        &self,
        _ctx: &mut ReconcileContext<Widget>,
        error: &Error,
    ) -> Result<ComponentResult<WidgetStatus>> {
        self.journal.record(format!("error:{}", self.name));
        match &self.on_error {
            Some(on_error) => on_error(error),
            None => Ok(ComponentResult::done()),
        }
    }
}
