//! AppInstance Custom Resource Definition
//!
//! An AppInstance is one deployed copy of a containerised application: its
//! Deployment, Service and rendered configuration, plus optional database
//! credentials and rollout notifications.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, DatabaseSpec, DatabaseStatus, NotificationSpec, NotificationStatus};
use crate::engine::RootResource;

/// Structured validation error for `AppInstanceSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
    pub how_to_fix: String,
}

impl SpecValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            how_to_fix: how_to_fix.into(),
        }
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "convoy.dev",
    version = "v1alpha1",
    kind = "AppInstance",
    namespaced,
    status = "AppInstanceStatus",
    shortname = "ai",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppInstanceSpec {
    /// Container image without tag
    pub image: String,

    /// Image tag to deploy
    pub version: String,

    /// Desired replicas; defaults to 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Container port; defaults to 8080
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    /// Extra environment variables for the container
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Application configuration rendered into a ConfigMap
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationSpec>,

    /// Scale to zero without deleting anything
    #[serde(default)]
    pub suspended: bool,
}

pub const DEFAULT_REPLICAS: i32 = 1;
pub const DEFAULT_PORT: i32 = 8080;

impl AppInstanceSpec {
    /// Validate the spec, returning every problem found
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors: Vec<SpecValidationError> = Vec::new();

        if self.image.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.image",
                "image must not be empty",
                "Set spec.image to a container image reference such as ghcr.io/acme/web.",
            ));
        } else if self.image.contains(char::is_whitespace) {
            errors.push(SpecValidationError::new(
                "spec.image",
                "image must not contain whitespace",
                "Remove spaces from spec.image.",
            ));
        }

        if self.version.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.version",
                "version must not be empty",
                "Set spec.version to the image tag to deploy.",
            ));
        }

        if let Some(replicas) = self.replicas {
            if replicas < 0 {
                errors.push(SpecValidationError::new(
                    "spec.replicas",
                    "replicas must not be negative",
                    "Set spec.replicas to 0 or more, or use spec.suspended to scale down.",
                ));
            }
        }

        if let Some(port) = self.port {
            if !(1..=65535).contains(&port) {
                errors.push(SpecValidationError::new(
                    "spec.port",
                    format!("port {} is out of range", port),
                    "Set spec.port between 1 and 65535.",
                ));
            }
        }

        if let Some(db) = &self.database {
            if db.host.trim().is_empty() {
                errors.push(SpecValidationError::new(
                    "spec.database.host",
                    "database host must not be empty",
                    "Set spec.database.host or remove spec.database.",
                ));
            }
            if !(1..=65535).contains(&db.port) {
                errors.push(SpecValidationError::new(
                    "spec.database.port",
                    format!("database port {} is out of range", db.port),
                    "Set spec.database.port between 1 and 65535.",
                ));
            }
        }

        if let Some(n) = &self.notifications {
            if n.webhook_secret_ref.trim().is_empty() {
                errors.push(SpecValidationError::new(
                    "spec.notifications.webhookSecretRef",
                    "webhook secret reference must not be empty",
                    "Name the Secret that holds the webhook URL.",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Last path segment of the image, used as the application name
    pub fn image_name(&self) -> String {
        self.image
            .rsplit('/')
            .next()
            .unwrap_or(self.image.as_str())
            .to_string()
    }

    /// Full image reference including the tag
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.version)
    }
}

/// Observed state of an AppInstance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppInstanceStatus {
    /// Lifecycle phase (Pending, Deploying, Ready, Suspended, Error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message about the current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseStatus>,

    /// SHA-256 of the rendered configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,

    /// In-cluster address of the Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationStatus>,
}

impl AppInstanceStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn database_ready(&self) -> bool {
        self.database.as_ref().is_some_and(|db| db.ready)
    }
}

impl RootResource for AppInstance {
    type Status = AppInstanceStatus;

    fn status(&self) -> Option<&AppInstanceStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut AppInstanceStatus {
        self.status.get_or_insert_with(AppInstanceStatus::default)
    }
}
