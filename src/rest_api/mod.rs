//! REST API module for external integrations
//!
//! Read-only HTTP API over the managed AppInstances, plus health and
//! Prometheus endpoints.

mod dto;
mod handlers;
mod server;

pub use dto::{ErrorResponse, HealthResponse, InstanceDetailResponse, InstanceListResponse, InstanceSummary};
pub use server::{router, run_server, ApiState};
