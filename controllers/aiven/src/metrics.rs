//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `aiven_operator_reconciliations_total{kind}` - Reconcile invocations
//! - `aiven_operator_reconciliation_errors_total{kind}` - Reconciles that returned a hard error
//! - `aiven_operator_reconciliation_duration_seconds{kind}` - Reconcile duration
//! - `aiven_operator_secret_source_triggers_total` - Objects re-triggered by a changed source secret
//! - `aiven_operator_auth_secret_finalizers_removed_total` - Protection finalizers removed by secret GC

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::time::Duration;

/// Controller metrics, registered on their own registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    reconciliation_errors: IntCounterVec,
    reconciliation_duration: HistogramVec,
    secret_source_triggers: IntCounter,
    finalizers_removed: IntCounter,
}

impl Metrics {
    /// Create and register every metric.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let reconciliations = IntCounterVec::new(
            Opts::new("aiven_operator_reconciliations_total", "Total number of reconciliations"),
            &["kind"],
        )?;
        let reconciliation_errors = IntCounterVec::new(
            Opts::new(
                "aiven_operator_reconciliation_errors_total",
                "Total number of reconciliations that returned an error",
            ),
            &["kind"],
        )?;
        let reconciliation_duration = HistogramVec::new(
            HistogramOpts::new(
                "aiven_operator_reconciliation_duration_seconds",
                "Duration of reconciliation in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
            &["kind"],
        )?;
        let secret_source_triggers = IntCounter::new(
            "aiven_operator_secret_source_triggers_total",
            "Total number of objects re-triggered by a changed connInfoSecretSource",
        )?;
        let finalizers_removed = IntCounter::new(
            "aiven_operator_auth_secret_finalizers_removed_total",
            "Total number of auth secret protection finalizers removed",
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(reconciliation_errors.clone()))?;
        registry.register(Box::new(reconciliation_duration.clone()))?;
        registry.register(Box::new(secret_source_triggers.clone()))?;
        registry.register(Box::new(finalizers_removed.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            reconciliation_errors,
            reconciliation_duration,
            secret_source_triggers,
            finalizers_removed,
        })
    }

    /// Registry to expose on `/metrics`.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one reconcile of `kind`.
    pub fn observe_reconcile(&self, kind: &str, duration: Duration, failed: bool) {
        self.reconciliations.with_label_values(&[kind]).inc();
        self.reconciliation_duration
            .with_label_values(&[kind])
            .observe(duration.as_secs_f64());
        if failed {
            self.reconciliation_errors.with_label_values(&[kind]).inc();
        }
    }

    /// Record objects re-triggered by the secret watch.
    pub fn inc_secret_source_triggers(&self, count: u64) {
        self.secret_source_triggers.inc_by(count);
    }

    /// Record a protection finalizer removal.
    pub fn inc_finalizers_removed(&self) {
        self.finalizers_removed.inc();
    }
}
