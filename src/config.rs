//! Operator runtime configuration
//!
//! Every flag can also be supplied through the environment, which is how the
//! operator is configured when it runs as a Deployment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace to watch (empty watches every namespace)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    pub watch_namespace: String,

    /// Bind address for the REST API and metrics endpoint
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
    pub api_addr: SocketAddr,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Directory with `*.tpl` files that replace the built-in templates
    #[arg(long, env = "TEMPLATES_DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Requeue interval for passes that asked for nothing sooner (0 disables)
    #[arg(long, env = "DEFAULT_REQUEUE_SECS", default_value_t = 300)]
    pub default_requeue_secs: u64,

    /// Timeout for Slack webhook requests
    #[arg(long, env = "SLACK_TIMEOUT_SECS", default_value_t = 10)]
    pub slack_timeout_secs: u64,
}

impl OperatorConfig {
    /// The namespace to watch, `None` for cluster-wide
    pub fn namespace(&self) -> Option<&str> {
        let namespace = self.watch_namespace.trim();
        (!namespace.is_empty()).then_some(namespace)
    }

    pub fn default_requeue(&self) -> Option<Duration> {
        (self.default_requeue_secs > 0).then(|| Duration::from_secs(self.default_requeue_secs))
    }

    pub fn slack_timeout(&self) -> Duration {
        Duration::from_secs(self.slack_timeout_secs)
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: String::new(),
            api_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Text,
            templates_dir: None,
            default_requeue_secs: 300,
            slack_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: OperatorConfig,
    }

    #[test]
    fn test_defaults_match_flag_defaults() {
        let parsed = Cli::parse_from(["convoy-operator"]).config;
        let defaults = OperatorConfig::default();
        assert_eq!(parsed.api_addr, defaults.api_addr);
        assert_eq!(parsed.log_format, defaults.log_format);
        assert_eq!(parsed.default_requeue_secs, defaults.default_requeue_secs);
        assert_eq!(parsed.namespace(), None);
    }

    #[test]
    fn test_flags() {
        let config = Cli::parse_from([
            "convoy-operator",
            "--watch-namespace",
            "apps",
            "--log-format",
            "json",
            "--default-requeue-secs",
            "0",
            "--templates-dir",
            "/etc/convoy/templates",
        ])
        .config;
        assert_eq!(config.namespace(), Some("apps"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_requeue(), None);
        assert_eq!(
            config.templates_dir,
            Some(PathBuf::from("/etc/convoy/templates"))
        );
    }

    #[test]
    fn test_blank_namespace_is_cluster_wide() {
        let config = OperatorConfig {
            watch_namespace: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.namespace(), None);
        assert_eq!(config.slack_timeout(), Duration::from_secs(10));
    }
}
