//! HTTP handlers for the REST API

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use kube::ResourceExt;
use tracing::{error, instrument};

use crate::crd::AppInstance;
use crate::store::{ObjectKey, StoreExt};

use super::dto::{
    ErrorResponse, HealthResponse, InstanceDetailResponse, InstanceListResponse, InstanceSummary,
};
use super::server::ApiState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus scrape endpoint
#[cfg(feature = "metrics")]
pub async fn metrics() -> Result<String, StatusCode> {
    crate::metrics::encode_registry().map_err(|e| {
        error!("Failed to encode metrics: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn summarize(instance: &AppInstance) -> InstanceSummary {
    let status = instance.status.clone().unwrap_or_default();
    InstanceSummary {
        name: instance.name_any(),
        namespace: instance.namespace().unwrap_or_default(),
        image: instance.spec.image.clone(),
        version: instance.spec.version.clone(),
        phase: status.phase.unwrap_or_else(|| "Unknown".to_string()),
        replicas: instance.spec.replicas,
        ready_replicas: status.ready_replicas.unwrap_or(0),
        endpoint: status.endpoint,
    }
}

/// List the AppInstances in the watched scope
#[instrument(skip(state))]
pub async fn list_instances(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<InstanceListResponse>, ApiError> {
    match state
        .store
        .list_as::<AppInstance>(state.namespace.as_deref(), &BTreeMap::new())
        .await
    {
        Ok(instances) => {
            let items: Vec<InstanceSummary> = instances.iter().map(summarize).collect();
            let total = items.len();
            Ok(Json(InstanceListResponse { items, total }))
        }
        Err(e) => {
            error!("Failed to list instances: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("list_failed", &e.to_string())),
            ))
        }
    }
}

/// Get a specific AppInstance
#[instrument(skip(state), fields(name = %name, namespace = %namespace))]
pub async fn get_instance(
    State(state): State<Arc<ApiState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<InstanceDetailResponse>, ApiError> {
    let key = ObjectKey::namespaced(&namespace, &name);

    match state.store.get_as::<AppInstance>(&key).await {
        Ok(instance) => Ok(Json(InstanceDetailResponse {
            name: instance.name_any(),
            namespace: instance.namespace().unwrap_or_default(),
            created_at: instance
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0.to_rfc3339()),
            status: instance.status.clone().unwrap_or_default(),
            spec: instance.spec,
        })),
        Err(e) if e.is_not_found() => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "not_found",
                &format!("AppInstance {}/{} not found", namespace, name),
            )),
        )),
        Err(e) => {
            error!("Failed to get instance {}/{}: {:?}", namespace, name, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("get_failed", &e.to_string())),
            ))
        }
    }
}
