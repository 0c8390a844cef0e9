//! Convoy: component-driven Kubernetes operator for application instances
//!
//! The [`engine`] module is a reusable reconciliation orchestrator: an
//! ordered list of components converges one root resource, their status
//! mutations are merged and committed with conflict-aware retries. The
//! [`components`] module plugs the AppInstance business logic into it.

pub mod components;
pub mod config;
pub mod controller;
pub mod crd;
pub mod engine;
pub mod error;
pub mod render;
pub mod store;
pub mod telemetry;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
