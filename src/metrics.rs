//! Prometheus metrics for the convoy operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `convoy_reconcile_duration_seconds` (histogram): pass duration labeled by controller.
//! - `convoy_reconcile_errors_total` (counter): failed passes labeled by controller and kind.
//! - `convoy_component_errors_total` (counter): component failures labeled by controller and component.
//! - `convoy_status_commit_retries_total` (counter): status commits that needed the re-fetch loop, labeled by root kind.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "appinstance"
    pub controller: String,
}

/// Labels for reconcile error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind, see [`crate::Error::kind_label`]
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ComponentLabels {
    pub controller: String,
    pub component: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    /// Root resource kind, e.g. "AppInstance"
    pub kind: String,
}

/// Histogram tracking reconcile pass duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static COMPONENT_ERRORS_TOTAL: Lazy<Family<ComponentLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking status commits that fell off the fast path
pub static STATUS_COMMIT_RETRIES_TOTAL: Lazy<Family<KindLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "convoy_reconcile_duration_seconds",
        "Duration of reconcile passes in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "convoy_reconcile_errors",
        "Total number of failed reconcile passes",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "convoy_component_errors",
        "Total number of component reconcile failures",
        COMPONENT_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "convoy_status_commit_retries",
        "Status commits that conflicted and were replayed against a fresh copy",
        STATUS_COMMIT_RETRIES_TOTAL.clone(),
    );

    registry
});

/// Observe a reconcile pass duration.
pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(controller: &str, kind: &str) {
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_component_error(controller: &str, component: &str) {
    let labels = ComponentLabels {
        controller: controller.to_string(),
        component: component.to_string(),
    };
    COMPONENT_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_status_commit_retry(kind: &str) {
    let labels = KindLabels {
        kind: kind.to_string(),
    };
    STATUS_COMMIT_RETRIES_TOTAL.get_or_create(&labels).inc();
}

/// Render the registry in the OpenMetrics text format
pub fn encode_registry() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_error_counter() {
        inc_component_error("metrics-test", "database");
        inc_component_error("metrics-test", "database");

        let labels = ComponentLabels {
            controller: "metrics-test".to_string(),
            component: "database".to_string(),
        };
        assert_eq!(COMPONENT_ERRORS_TOTAL.get_or_create(&labels).get(), 2);
    }

    #[test]
    fn test_encoded_registry_lists_families() {
        observe_reconcile_duration_seconds("metrics-test", 0.25);
        inc_reconcile_error("metrics-test", "conflict");
        inc_status_commit_retry("Widget");

        let text = encode_registry().unwrap();
        assert!(text.contains("convoy_reconcile_duration_seconds"));
        assert!(text.contains("convoy_reconcile_errors_total"));
        assert!(text.contains("convoy_status_commit_retries_total"));
        assert!(text.contains("kind=\"conflict\""));
    }
}
