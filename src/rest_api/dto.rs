//! Response bodies

use serde::{Deserialize, Serialize};

use crate::crd::{AppInstanceSpec, AppInstanceStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub version: String,
    pub phase: String,
    pub replicas: Option<i32>,
    pub ready_replicas: i32,
    pub endpoint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceListResponse {
    pub items: Vec<InstanceSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceDetailResponse {
    pub name: String,
    pub namespace: String,
    pub spec: AppInstanceSpec,
    pub status: AppInstanceStatus,
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}
