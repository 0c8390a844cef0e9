//! Error types for the Convoy operator

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while reconciling application instances
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Resource store error (get/list/create/update/delete/update_status)
    #[error(transparent)]
    StoreError(#[from] StoreError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML parse error while decoding a rendered manifest
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Template rendering failed
    #[error("Failed to render template {template}: {message}")]
    RenderError { template: String, message: String },

    /// Operator configuration is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The AppInstance spec failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Outbound HTTP call failed (webhook notifications)
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// A deferred status mutation could not be applied
    #[error("Status modifier {name} failed: {message}")]
    StatusModifierError { name: String, message: String },

    /// Status could not be persisted after exhausting the conflict retries
    #[error("Failed to commit status for {key} after {attempts} attempts: {source}")]
    StatusCommitError {
        key: String,
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    /// An error handler failed while no primary error was recorded
    #[error("Error handler {component} failed: {source}")]
    ErrorHandlerError {
        component: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Shorthand for building a [`Error::StatusModifierError`]
    pub fn status_modifier(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::StatusModifierError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether the failure is transient and worth a quick requeue
    ///
    /// Validation and configuration errors need a human to change something,
    /// so they are retried on the slow interval.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(_) | Error::HttpError(_) => true,
            Error::StoreError(e) => !e.is_not_found(),
            Error::StatusCommitError { .. } => true,
            Error::ErrorHandlerError { source, .. } => source.is_retriable(),
            Error::SerializationError(_)
            | Error::YamlError(_)
            | Error::RenderError { .. }
            | Error::ConfigError(_)
            | Error::ValidationError(_)
            | Error::StatusModifierError { .. } => false,
        }
    }

    /// Short label used for the error metrics
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::StoreError(e) if e.is_conflict() => "conflict",
            Error::StoreError(_) => "store",
            Error::SerializationError(_) | Error::YamlError(_) => "serialization",
            Error::RenderError { .. } => "render",
            Error::ConfigError(_) => "config",
            Error::ValidationError(_) => "validation",
            Error::HttpError(_) => "http",
            Error::StatusModifierError { .. } => "status_modifier",
            Error::StatusCommitError { .. } => "status_commit",
            Error::ErrorHandlerError { .. } => "error_handler",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectKey;

    #[test]
    fn test_validation_errors_are_not_retriable() {
        let err = Error::ValidationError("image must not be empty".to_string());
        assert!(!err.is_retriable());
        assert_eq!(err.kind_label(), "validation");
    }

    #[test]
    fn test_commit_errors_are_retriable() {
        let err = Error::StatusCommitError {
            key: "default/web".to_string(),
            attempts: 5,
            source: Box::new(Error::StoreError(StoreError::Conflict {
                kind: "AppInstance".to_string(),
                key: ObjectKey::namespaced("default", "web"),
            })),
        };
        assert!(err.is_retriable());
        assert_eq!(err.kind_label(), "status_commit");
        assert!(err.to_string().contains("default/web"));
    }

    #[test]
    fn test_conflict_label() {
        let err = Error::from(StoreError::Conflict {
            kind: "AppInstance".to_string(),
            key: ObjectKey::namespaced("default", "web"),
        });
        assert_eq!(err.kind_label(), "conflict");
    }
}
