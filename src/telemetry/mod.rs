//! Mediation telemetry reporter
//!
//! Fire-and-forget side channel to the insight/analytics boundary. Events
//! are queued on an unbounded channel and drained by a background task;
//! nothing on this path may block or fail the ad-load path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::adnetwork::NormalizedStatus;
use crate::insight::{AdType, InsightService};

/// One mediation telemetry event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Load request issued; always emitted before the matching response
    Request {
        ad_type: AdType,
        correlation_id: Uuid,
        ad_unit_id: String,
        recommended_ad_unit_id: Option<String>,
        requested_floor: f64,
        calculated_floor: f64,
        opportunity_id: Option<i64>,
        at: DateTime<Utc>,
    },
    /// Load outcome for a previously issued request
    Response {
        correlation_id: Uuid,
        response_correlation_id: Option<Uuid>,
        revenue: f64,
        precision: Option<String>,
        /// Serialized as the numeric wire code
        #[serde(serialize_with = "status_code")]
        status: NormalizedStatus,
        provider_status: Option<String>,
        network_status: Option<String>,
        at: DateTime<Utc>,
    },
    /// Paid impression or click on a presented ad
    Impression {
        is_click: bool,
        ad_type: AdType,
        response_correlation_id: Uuid,
        ad_unit_id: String,
        currency: String,
        revenue: f64,
        precision: i32,
        placement: Option<String>,
        waterfall: Vec<String>,
        at: DateTime<Utc>,
    },
}

fn status_code<S: serde::Serializer>(status: &NormalizedStatus, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i32(status.code())
}

/// Cheap-to-clone handle for emitting telemetry events
#[derive(Clone)]
pub struct TelemetryReporter {
    tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl TelemetryReporter {
    /// Spawn the drain task forwarding events to the insight boundary
    pub fn spawn(service: Arc<dyn InsightService>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<TelemetryEvent>();

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = service.report_mediation(&event).await {
                    // Best effort only, never propagated to the ad path
                    warn!(error = %e, "Failed to report mediation event");
                }
            }
            debug!("Telemetry drain task finished");
        });

        (Self { tx }, worker)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn report_request(
        &self,
        ad_type: AdType,
        correlation_id: Uuid,
        ad_unit_id: &str,
        recommended_ad_unit_id: Option<&str>,
        requested_floor: f64,
        calculated_floor: f64,
        opportunity_id: Option<i64>,
    ) {
        self.send(TelemetryEvent::Request {
            ad_type,
            correlation_id,
            ad_unit_id: ad_unit_id.to_string(),
            recommended_ad_unit_id: recommended_ad_unit_id.map(str::to_string),
            requested_floor,
            calculated_floor,
            opportunity_id,
            at: Utc::now(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn report_response(
        &self,
        correlation_id: Uuid,
        response_correlation_id: Option<Uuid>,
        revenue: f64,
        precision: Option<String>,
        status: NormalizedStatus,
        provider_status: Option<String>,
        network_status: Option<String>,
    ) {
        self.send(TelemetryEvent::Response {
            correlation_id,
            response_correlation_id,
            revenue,
            precision,
            status,
            provider_status,
            network_status,
            at: Utc::now(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn report_impression(
        &self,
        is_click: bool,
        ad_type: AdType,
        response_correlation_id: Uuid,
        ad_unit_id: &str,
        currency: &str,
        revenue: f64,
        precision: i32,
        placement: Option<String>,
        waterfall: Vec<String>,
    ) {
        self.send(TelemetryEvent::Impression {
            is_click,
            ad_type,
            response_correlation_id,
            ad_unit_id: ad_unit_id.to_string(),
            currency: currency.to_string(),
            revenue,
            precision,
            placement,
            waterfall,
            at: Utc::now(),
        });
    }

    fn send(&self, event: TelemetryEvent) {
        // Receiver gone means shutdown; dropping the event is fine
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::SimulatedInsightService;

    #[tokio::test]
    async fn test_events_reach_boundary_in_send_order() {
        let service = Arc::new(SimulatedInsightService::new());
        let (reporter, worker) = TelemetryReporter::spawn(service.clone());

        let correlation_id = Uuid::new_v4();
        reporter.report_request(
            AdType::Rewarded,
            correlation_id,
            "unit-a",
            None,
            -1.0,
            0.0,
            None,
        );
        reporter.report_response(
            correlation_id,
            Some(Uuid::new_v4()),
            0.0,
            None,
            NormalizedStatus::Loaded,
            None,
            None,
        );
        drop(reporter);
        worker.await.unwrap();

        let events = service.mediation_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TelemetryEvent::Request { .. }));
        match &events[1] {
            TelemetryEvent::Response {
                correlation_id: id, ..
            } => assert_eq!(*id, correlation_id),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
