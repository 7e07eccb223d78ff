//! Local alert sink: structured logs plus `metrics` counters.

use std::sync::Arc;
use metrics::{counter, histogram, Label};
use tracing::{error, warn};

use vigil_models::{AlertEvent, AlertKind, AlertSink, MetricObservation, MetricUnit};

use crate::metrics::names;

/// Logs alerts, counts them, and records observations with the global
/// `metrics` recorder. Alerts are optionally forwarded to another sink.
#[derive(Default)]
pub struct MetricsAlertSink {
    forward: Option<Arc<dyn AlertSink>>,
}

impl MetricsAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also deliver alerts to `sink` (for example a Redis channel).
    pub fn with_forward(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.forward = Some(sink);
        self
    }
}

impl AlertSink for MetricsAlertSink {
    fn alert(&self, event: AlertEvent) {
        let media_id = event.media_id.as_ref().map(|m| m.as_str()).unwrap_or("");
        let job_id = event.job_id.as_ref().map(|j| j.as_str()).unwrap_or("");
        match event.kind {
            AlertKind::QueryBackendUnavailable | AlertKind::IndexWriteFailed => error!(
                kind = event.kind.as_str(),
                media_id,
                job_id,
                reason = %event.reason,
                "ALERT"
            ),
            _ => warn!(
                kind = event.kind.as_str(),
                media_id,
                job_id,
                reason = %event.reason,
                "ALERT"
            ),
        }
        counter!(names::ALERTS, "kind" => event.kind.as_str()).increment(1);

        if let Some(forward) = &self.forward {
            forward.alert(event);
        }
    }

    fn observe(&self, observation: MetricObservation) {
        let labels: Vec<Label> = observation
            .labels
            .iter()
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect();
        match observation.unit {
            MetricUnit::Count => {
                counter!(observation.name, labels).increment(observation.value.max(0.0) as u64)
            }
            MetricUnit::Seconds => histogram!(observation.name, labels).record(observation.value),
        }
    }
}
