use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use front_core::{OperationError, OperationResult};
use front_shared::models::events::ScopeOutcome;

/// Store counters in a private registry, so several stores can coexist in one process
pub struct StoreMetrics {
    registry: Registry,
    /// Mutations by (operation, outcome)
    pub operations_total: IntCounterVec,
    /// Failed mutations by failure kind
    pub conflicts_total: IntCounterVec,
    /// Finished continuous operations by outcome
    pub scopes_total: IntCounterVec,
    pub open_scopes: IntGauge,
}

impl StoreMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("front".to_string()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Store mutations by operation and outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let conflicts_total = IntCounterVec::new(
            Opts::new("failures_total", "Failed mutations by failure kind"),
            &["kind"],
        )?;
        registry.register(Box::new(conflicts_total.clone()))?;

        let scopes_total = IntCounterVec::new(
            Opts::new("continuous_operations_total", "Finished continuous operations"),
            &["outcome"],
        )?;
        registry.register(Box::new(scopes_total.clone()))?;

        let open_scopes = IntGauge::new("continuous_operations_open", "Continuous operations in progress")?;
        registry.register(Box::new(open_scopes.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            conflicts_total,
            scopes_total,
            open_scopes,
        })
    }

    pub fn observe<T>(&self, operation: &str, result: &OperationResult<T>) {
        match result {
            Ok(_) => {
                self.operations_total.with_label_values(&[operation, "ok"]).inc();
            }
            Err(e) => {
                self.operations_total.with_label_values(&[operation, "failed"]).inc();
                self.record_failure(e);
            }
        }
    }

    pub fn record_failure(&self, error: &OperationError) {
        let kind = format!("{:?}", error.kind());
        self.conflicts_total.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn scope_opened(&self) {
        self.open_scopes.inc();
    }

    pub fn scope_finished(&self, outcome: ScopeOutcome) {
        self.open_scopes.dec();
        let outcome = match outcome {
            ScopeOutcome::Committed => "committed",
            ScopeOutcome::Aborted => "aborted",
        };
        self.scopes_total.with_label_values(&[outcome]).inc();
    }

    /// Prometheus text exposition of every store metric
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use front_core::ValidationError;
    use uuid::Uuid;

    #[test]
    fn test_observe_counts_outcomes_and_kinds() {
        let metrics = StoreMetrics::new().unwrap();

        metrics.observe("submit", &Ok::<_, OperationError>(()));
        metrics.observe::<()>("submit", &Err(OperationError::EntityAlreadyInUse { id: Uuid::new_v4() }));
        metrics.observe::<()>("pay_order", &Err(ValidationError::CafeSessionClosed.into()));

        assert_eq!(metrics.operations_total.with_label_values(&["submit", "ok"]).get(), 1);
        assert_eq!(metrics.operations_total.with_label_values(&["submit", "failed"]).get(), 1);
        assert_eq!(metrics.conflicts_total.with_label_values(&["InUse"]).get(), 1);
        assert_eq!(metrics.conflicts_total.with_label_values(&["Invalid"]).get(), 1);
    }

    #[test]
    fn test_gather_text() {
        let metrics = StoreMetrics::new().unwrap();
        metrics.scope_opened();
        metrics.scope_finished(ScopeOutcome::Committed);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("front_continuous_operations_total{outcome=\"committed\"} 1"));
        assert!(text.contains("front_continuous_operations_open 0"));
    }
}
