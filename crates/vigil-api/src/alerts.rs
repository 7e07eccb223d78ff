//! Alert sink for the query path.

use metrics::{counter, histogram, Label};
use std::sync::Arc;
use tracing::error;

use vigil_models::{AlertEvent, AlertSink, MetricObservation, MetricUnit};

use crate::metrics::names;

/// Logs and counts query alerts, then hands them to the shared alert channel.
#[derive(Default)]
pub struct QueryAlertSink {
    forward: Option<Arc<dyn AlertSink>>,
}

impl QueryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forward(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.forward = Some(sink);
        self
    }
}

impl AlertSink for QueryAlertSink {
    fn alert(&self, event: AlertEvent) {
        error!(kind = event.kind.as_str(), reason = %event.reason, "ALERT");
        counter!(names::ALERTS_TOTAL, "kind" => event.kind.as_str()).increment(1);
        if let Some(forward) = &self.forward {
            forward.alert(event);
        }
    }

    fn observe(&self, observation: MetricObservation) {
        let labels: Vec<Label> = observation
            .labels
            .into_iter()
            .map(|(k, v)| Label::new(k, v))
            .collect();
        match observation.unit {
            MetricUnit::Count => {
                counter!(observation.name, labels).increment(observation.value as u64)
            }
            MetricUnit::Seconds => histogram!(observation.name, labels).record(observation.value),
        }
    }
}
