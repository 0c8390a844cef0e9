//! Shared types for the AppInstance CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition for status reporting (Kubernetes convention)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Ready", "DatabaseReady")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    /// Generation the condition was computed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// External database the instance connects to
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Database host name
    pub host: String,

    #[serde(default = "default_database_port")]
    pub port: i32,

    /// Database name; defaults to the instance name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,

    /// Login user; defaults to the instance name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

fn default_database_port() -> i32 {
    5432
}

impl Default for DatabaseSpec {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_database_port(),
            database_name: None,
            username: None,
        }
    }
}

/// Slack-compatible webhook notifications
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSpec {
    /// Secret holding the webhook URL
    pub webhook_secret_ref: String,

    #[serde(default = "default_webhook_secret_key")]
    pub webhook_secret_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Also notify when a reconciliation fails
    #[serde(default = "default_true")]
    pub notify_on_error: bool,
}

fn default_webhook_secret_key() -> String {
    "webhook-url".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for NotificationSpec {
    fn default() -> Self {
        Self {
            webhook_secret_ref: String::new(),
            webhook_secret_key: default_webhook_secret_key(),
            channel: None,
            notify_on_error: default_true(),
        }
    }
}

/// Observed state of the database credentials
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    pub ready: bool,
    pub secret_name: String,
    pub database_name: String,
    pub username: String,
}

/// Bookkeeping for outbound notifications
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatus {
    /// Version whose successful rollout was last announced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_version: Option<String>,

    /// Last failure message that was announced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
