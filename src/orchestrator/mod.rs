//! Ad load orchestrator
//!
//! One actor per ad format. Each load cycle races an asynchronous insight
//! query against a cancellable fallback timer: whichever arrives first
//! commits the ad unit and floor price, the other outcome is discarded as
//! stale. All state transitions happen on the actor task; insight
//! resolutions, timer expiries, and network callbacks are marshalled onto
//! it through a single queue. UI-visible status is published on a watch
//! channel.

pub mod cycle;
pub mod fallback;
pub mod registry;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adnetwork::{
    normalize_load_error, AdEvent, AdEventKind, AdHandle, AdLoadRequest, AdNetwork, LoadError,
    NormalizedStatus, Platform,
};
use crate::config::AdFormatConfig;
use crate::insight::{AdInsight, AdType, InsightService};
use crate::telemetry::TelemetryReporter;

pub use cycle::{CycleStatus, LoadCycleState};
pub use fallback::FallbackTimer;
pub use registry::{PendingRequest, PendingRequestRegistry};

/// Floor sentinel for "no floor was requested"
const FLOOR_NOT_REQUESTED: f64 = -1.0;

/// Sub-cycle slot. In dual mode the insight-seeded and default cycles run
/// in parallel and `show` prefers the dynamic result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubCycle {
    Dynamic,
    Default,
}

/// Everything the actor reacts to: external commands plus marshalled
/// asynchronous completions
#[derive(Debug)]
enum Event {
    Start,
    Show,
    Hide,
    SetContinuous(bool),
    InsightResolved {
        generation: u64,
        insight: AdInsight,
    },
    FallbackElapsed {
        generation: u64,
    },
    LoadFinished {
        sub: SubCycle,
        generation: u64,
        outcome: Result<Option<AdHandle>, LoadError>,
    },
    RetryElapsed {
        sub: SubCycle,
        generation: u64,
    },
    Network(AdEvent),
}

/// UI-visible controller status
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub ad_type: AdType,
    pub state: CycleStatus,
    pub message: String,
    pub can_show: bool,
    pub continuous: bool,
    pub selected_ad_unit_id: Option<String>,
    pub recommended_ad_unit_id: Option<String>,
}

impl StatusSnapshot {
    fn initial(ad_type: AdType, continuous: bool) -> Self {
        Self {
            ad_type,
            state: CycleStatus::Idle,
            message: format!("{} status", ad_type.as_str()),
            can_show: false,
            continuous,
            selected_ad_unit_id: None,
            recommended_ad_unit_id: None,
        }
    }
}

/// Cheap-to-clone handle to one ad-format controller
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Event>,
    status_rx: watch::Receiver<StatusSnapshot>,
}

impl OrchestratorHandle {
    pub async fn start_load(&self) {
        let _ = self.tx.send(Event::Start).await;
    }

    pub async fn show(&self) {
        let _ = self.tx.send(Event::Show).await;
    }

    /// Destroy the current ad and reset to idle (banner hide)
    pub async fn hide(&self) {
        let _ = self.tx.send(Event::Hide).await;
    }

    pub async fn set_continuous(&self, enabled: bool) {
        let _ = self.tx.send(Event::SetContinuous(enabled)).await;
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status_rx.borrow().clone()
    }

    pub fn status_stream(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }
}

pub struct AdLoadOrchestrator {
    ad_type: AdType,
    config: AdFormatConfig,
    platform: Platform,
    insight: Arc<dyn InsightService>,
    network: Arc<dyn AdNetwork>,
    telemetry: TelemetryReporter,
    requests: Arc<PendingRequestRegistry>,

    inbox_tx: mpsc::Sender<Event>,
    status_tx: watch::Sender<StatusSnapshot>,

    dynamic: LoadCycleState,
    default_slot: LoadCycleState,
    fallback: Option<FallbackTimer>,
    continuous: bool,
    generation: u64,
    /// Last insight seen, chained into the next query
    last_insight: Option<AdInsight>,
    presenting: Option<(SubCycle, Uuid)>,
}

impl AdLoadOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        ad_type: AdType,
        config: AdFormatConfig,
        platform: Platform,
        insight: Arc<dyn InsightService>,
        network: Arc<dyn AdNetwork>,
        telemetry: TelemetryReporter,
        requests: Arc<PendingRequestRegistry>,
    ) -> OrchestratorHandle {
        let (inbox_tx, inbox_rx) = mpsc::channel::<Event>(64);
        let (status_tx, status_rx) =
            watch::channel(StatusSnapshot::initial(ad_type, config.continuous));

        // Marshal network callbacks onto the actor queue
        let mut events = network.subscribe();
        let forward_tx = inbox_tx.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if forward_tx.send(Event::Network(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Ad network callback stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let continuous = config.continuous;
        let orchestrator = Self {
            ad_type,
            config,
            platform,
            insight,
            network,
            telemetry,
            requests,
            inbox_tx: inbox_tx.clone(),
            status_tx,
            dynamic: LoadCycleState::idle(),
            default_slot: LoadCycleState::idle(),
            fallback: None,
            continuous,
            generation: 0,
            last_insight: None,
            presenting: None,
        };
        tokio::spawn(orchestrator.run(inbox_rx));

        OrchestratorHandle {
            tx: inbox_tx,
            status_rx,
        }
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<Event>) {
        while let Some(event) = inbox.recv().await {
            match event {
                Event::Start => self.handle_start(),
                Event::Show => self.handle_show(),
                Event::Hide => self.handle_hide(),
                Event::SetContinuous(enabled) => {
                    self.continuous = enabled;
                    self.publish(format!("continuous load {}", if enabled { "on" } else { "off" }));
                }
                Event::InsightResolved {
                    generation,
                    insight,
                } => self.handle_insight(generation, insight),
                Event::FallbackElapsed { generation } => self.handle_fallback(generation),
                Event::LoadFinished {
                    sub,
                    generation,
                    outcome,
                } => self.handle_load_finished(sub, generation, outcome),
                Event::RetryElapsed { sub, generation } => self.handle_retry(sub, generation),
                Event::Network(event) => self.handle_network_event(event),
            }
        }
        debug!(ad_type = self.ad_type.as_str(), "Orchestrator stopped");
    }

    fn slot(&self, sub: SubCycle) -> &LoadCycleState {
        match sub {
            SubCycle::Dynamic => &self.dynamic,
            SubCycle::Default => &self.default_slot,
        }
    }

    fn slot_mut(&mut self, sub: SubCycle) -> &mut LoadCycleState {
        match sub {
            SubCycle::Dynamic => &mut self.dynamic,
            SubCycle::Default => &mut self.default_slot,
        }
    }

    // ===== Start =====

    fn handle_start(&mut self) {
        if self.dynamic.status.can_start() {
            self.start_dynamic();
        } else {
            debug!(
                ad_type = self.ad_type.as_str(),
                state = ?self.dynamic.status,
                "Start ignored, cycle already active"
            );
        }

        if self.config.dual_mode && self.default_slot.status.can_start() {
            self.start_default();
        }
    }

    fn start_dynamic(&mut self) {
        // A pending fallback from a superseded cycle must not fire into
        // the new one
        if let Some(timer) = self.fallback.take() {
            timer.cancel();
        }
        self.drop_request(SubCycle::Dynamic);

        self.generation += 1;
        let generation = self.generation;
        self.dynamic.begin(generation, CycleStatus::AwaitingInsight);

        let insight = self.insight.clone();
        let tx = self.inbox_tx.clone();
        let kind = self.ad_type;
        let previous = self.last_insight.clone();
        let timeout_secs = self.config.insight_timeout_secs;
        tokio::spawn(async move {
            match insight.get_insights(kind, previous.as_ref(), timeout_secs).await {
                Ok(insight) => {
                    let _ = tx
                        .send(Event::InsightResolved {
                            generation,
                            insight,
                        })
                        .await;
                }
                Err(e) => {
                    // Never resolves; the fallback timer bounds the wait
                    warn!(ad_type = kind.as_str(), error = %e, "Insight query failed");
                }
            }
        });

        self.fallback = Some(FallbackTimer::start(
            self.config.fallback_delay(),
            self.inbox_tx.clone(),
            Event::FallbackElapsed { generation },
        ));

        self.publish(format!("requesting {} insight", self.ad_type.as_str()));
    }

    fn start_default(&mut self) {
        self.drop_request(SubCycle::Default);
        self.generation += 1;
        let generation = self.generation;
        self.default_slot.begin(generation, CycleStatus::Loading);
        let unit = self.config.default_ad_unit_id.clone();
        self.issue_load(SubCycle::Default, unit, None);
    }

    /// Remove a superseded registry entry for the slot, if any
    fn drop_request(&mut self, sub: SubCycle) {
        if let Some(correlation_id) = self.slot(sub).request_correlation_id {
            self.requests.remove(correlation_id);
        }
    }

    // ===== Insight race =====

    fn handle_insight(&mut self, generation: u64, insight: AdInsight) {
        if self.dynamic.status != CycleStatus::AwaitingInsight
            || !self.dynamic.is_current(generation)
        {
            debug!(
                ad_type = self.ad_type.as_str(),
                generation, "Stale insight response discarded"
            );
            return;
        }

        if let Some(timer) = self.fallback.take() {
            timer.cancel();
        }
        self.last_insight = Some(insight.clone());

        match insight.recommended_unit() {
            Some(unit) => {
                let unit = unit.to_string();
                info!(
                    ad_type = self.ad_type.as_str(),
                    ad_unit = %unit,
                    floor = insight.floor_price,
                    "Insight recommendation received"
                );
                self.issue_load(SubCycle::Dynamic, unit, Some(insight));
            }
            None => {
                debug!(
                    ad_type = self.ad_type.as_str(),
                    "Insight carried no recommendation, using default unit"
                );
                let unit = self.config.default_ad_unit_id.clone();
                self.issue_load(SubCycle::Dynamic, unit, None);
            }
        }
    }

    fn handle_fallback(&mut self, generation: u64) {
        if self.dynamic.status != CycleStatus::AwaitingInsight
            || !self.dynamic.is_current(generation)
        {
            return;
        }

        self.fallback = None;
        info!(
            ad_type = self.ad_type.as_str(),
            "Insight not ready within fallback delay, loading default unit"
        );
        let unit = self.config.default_ad_unit_id.clone();
        self.issue_load(SubCycle::Dynamic, unit, None);
    }

    // ===== Load =====

    fn issue_load(&mut self, sub: SubCycle, ad_unit_id: String, insight: Option<AdInsight>) {
        let correlation_id = Uuid::new_v4();
        let floor_price = insight.as_ref().map(|i| i.floor_price).unwrap_or(0.0);

        {
            let slot = self.slot_mut(sub);
            slot.status = CycleStatus::Loading;
            slot.selected_ad_unit_id = Some(ad_unit_id.clone());
            slot.used_insight = insight.clone();
            slot.request_correlation_id = Some(correlation_id);
        }
        let generation = self.slot(sub).generation;

        self.requests
            .insert(correlation_id, self.ad_type, &ad_unit_id, insight.clone());

        // Request telemetry goes out before the network call so the
        // request -> response ordering holds regardless of outcome
        self.telemetry.report_request(
            self.ad_type,
            correlation_id,
            &ad_unit_id,
            insight.as_ref().and_then(|i| i.recommended_unit()),
            FLOOR_NOT_REQUESTED,
            floor_price,
            insight.as_ref().and_then(|i| i.opportunity_id),
        );

        let network = self.network.clone();
        let tx = self.inbox_tx.clone();
        let ad_type = self.ad_type;
        let request = AdLoadRequest {
            ad_unit_id: ad_unit_id.clone(),
            floor_price,
        };
        tokio::spawn(async move {
            let outcome = network.load(ad_type, request).await;
            let _ = tx
                .send(Event::LoadFinished {
                    sub,
                    generation,
                    outcome,
                })
                .await;
        });

        self.publish(format!("loading {}", ad_unit_id));
    }

    fn handle_load_finished(
        &mut self,
        sub: SubCycle,
        generation: u64,
        outcome: Result<Option<AdHandle>, LoadError>,
    ) {
        if self.slot(sub).status != CycleStatus::Loading || !self.slot(sub).is_current(generation)
        {
            debug!(
                ad_type = self.ad_type.as_str(),
                ?sub,
                generation,
                "Stale load completion discarded"
            );
            return;
        }
        let correlation_id = match self.slot(sub).request_correlation_id {
            Some(id) => id,
            None => return,
        };

        match outcome {
            Ok(Some(handle)) => {
                let response_correlation_id = Uuid::new_v4();
                self.requests
                    .bind_handle(correlation_id, handle.id, response_correlation_id, handle.response_info.clone());
                {
                    let slot = self.slot_mut(sub);
                    slot.status = CycleStatus::Loaded;
                    slot.response_correlation_id = Some(response_correlation_id);
                    slot.handle = Some(handle.clone());
                }
                self.telemetry.report_response(
                    correlation_id,
                    Some(response_correlation_id),
                    0.0,
                    None,
                    NormalizedStatus::Loaded,
                    None,
                    None,
                );
                self.publish(format!("loaded {}", handle.ad_unit_id));

                if self.config.present_on_load && self.presenting.is_none() {
                    self.show_slot(sub);
                }
            }
            Ok(None) => {
                // Load callback fired with neither an ad nor an error;
                // fail the cycle without entering the retry path
                warn!(
                    ad_type = self.ad_type.as_str(),
                    "Load event fired with null ad and null error"
                );
                self.slot_mut(sub).status = CycleStatus::Failed;
                self.requests.remove(correlation_id);
                self.telemetry.report_response(
                    correlation_id,
                    None,
                    0.0,
                    None,
                    NormalizedStatus::Error,
                    None,
                    None,
                );
                self.publish("load failed: empty result");
            }
            Err(error) => {
                let status = normalize_load_error(self.platform, error.code);
                warn!(
                    ad_type = self.ad_type.as_str(),
                    code = error.code,
                    ?status,
                    "Ad load failed: {}",
                    error.message
                );
                self.slot_mut(sub).status = CycleStatus::Failed;
                self.requests.remove(correlation_id);
                self.telemetry.report_response(
                    correlation_id,
                    None,
                    0.0,
                    None,
                    status,
                    Some(error.code.to_string()),
                    error.network_code.map(|c| c.to_string()),
                );
                self.publish(format!("load failed ({:?})", status));

                if self.continuous {
                    let tx = self.inbox_tx.clone();
                    let delay = self.config.fallback_delay();
                    tokio::spawn(async move {
                        sleep(delay).await;
                        let _ = tx.send(Event::RetryElapsed { sub, generation }).await;
                    });
                }
            }
        }
    }

    fn handle_retry(&mut self, sub: SubCycle, generation: u64) {
        // The toggle may have flipped while the retry was pending
        if !self.continuous {
            return;
        }
        if self.slot(sub).status != CycleStatus::Failed || !self.slot(sub).is_current(generation) {
            return;
        }
        match sub {
            SubCycle::Dynamic => self.start_dynamic(),
            SubCycle::Default => self.start_default(),
        }
    }

    // ===== Show / hide =====

    fn handle_show(&mut self) {
        // Prefer the insight-seeded result when both sub-cycles are ready
        let sub = if self.dynamic.status == CycleStatus::Loaded {
            Some(SubCycle::Dynamic)
        } else if self.default_slot.status == CycleStatus::Loaded {
            Some(SubCycle::Default)
        } else {
            None
        };

        match sub {
            Some(sub) => self.show_slot(sub),
            None => self.publish("ad not ready yet"),
        }
    }

    fn show_slot(&mut self, sub: SubCycle) {
        let handle = match self.slot(sub).handle.clone() {
            Some(handle) => handle,
            None => return,
        };
        self.network.show(&handle);
        self.slot_mut(sub).status = CycleStatus::Presenting;
        self.presenting = Some((sub, handle.id));
        self.publish(format!("showing {}", handle.ad_unit_id));
    }

    fn handle_hide(&mut self) {
        if let Some(timer) = self.fallback.take() {
            timer.cancel();
        }
        for sub in [SubCycle::Dynamic, SubCycle::Default] {
            self.drop_request(sub);
            self.generation += 1;
            let generation = self.generation;
            self.slot_mut(sub).begin(generation, CycleStatus::Idle);
        }
        self.presenting = None;
        self.publish("hidden");
    }

    // ===== Network callbacks =====

    fn handle_network_event(&mut self, event: AdEvent) {
        let (correlation_id, entry) = match self.requests.by_handle(event.handle_id) {
            Some(found) => found,
            None => return,
        };
        // The registry is shared across formats; only react to our own ads
        if entry.ad_type != self.ad_type {
            return;
        }

        match event.kind {
            AdEventKind::Presented => {
                self.publish(format!("presented {}", entry.ad_unit_id));
            }
            AdEventKind::Paid {
                value_micros,
                currency,
                precision,
            } => {
                self.report_impression_event(
                    false,
                    correlation_id,
                    &entry,
                    value_micros as f64 / 1_000_000.0,
                    &currency,
                    precision,
                );
            }
            AdEventKind::Impression => {
                self.report_impression_event(false, correlation_id, &entry, 0.0, "USD", 0);
            }
            AdEventKind::Clicked => {
                if let Some(response_correlation_id) = entry.response_correlation_id {
                    let info = entry.response_info.clone().unwrap_or_default();
                    self.telemetry.report_impression(
                        true,
                        entry.ad_type,
                        response_correlation_id,
                        &entry.ad_unit_id,
                        "USD",
                        0.0,
                        0,
                        info.placement,
                        info.waterfall,
                    );
                }
                self.publish(format!("clicked {}", entry.ad_unit_id));
            }
            AdEventKind::Dismissed => {
                let presenting_here = matches!(
                    self.presenting,
                    Some((_, handle_id)) if handle_id == event.handle_id
                );
                if !presenting_here {
                    return;
                }
                let (sub, _) = self.presenting.take().unwrap_or((SubCycle::Dynamic, event.handle_id));
                self.requests.remove(correlation_id);
                self.generation += 1;
                let generation = self.generation;
                self.slot_mut(sub).begin(generation, CycleStatus::Idle);
                self.publish("dismissed");

                // Closed-loop refill
                if self.continuous {
                    self.handle_start();
                }
            }
        }
    }

    /// Report a paid impression exactly once per request entry
    fn report_impression_event(
        &mut self,
        is_click: bool,
        correlation_id: Uuid,
        entry: &PendingRequest,
        revenue: f64,
        currency: &str,
        precision: i32,
    ) {
        if !self.requests.mark_impression(correlation_id) {
            return;
        }
        let response_correlation_id = match entry.response_correlation_id {
            Some(id) => id,
            None => return,
        };
        let info = entry.response_info.clone().unwrap_or_default();
        self.telemetry.report_impression(
            is_click,
            entry.ad_type,
            response_correlation_id,
            &entry.ad_unit_id,
            currency,
            revenue,
            precision,
            info.placement,
            info.waterfall,
        );
        self.publish(format!("impression {}", entry.ad_unit_id));
    }

    // ===== Status =====

    fn publish(&self, message: impl Into<String>) {
        let can_show = self.dynamic.status == CycleStatus::Loaded
            || self.default_slot.status == CycleStatus::Loaded;
        // While an ad is on screen the snapshot mirrors the slot that owns
        // it, which in dual mode may be the default sub-cycle
        let face = match self.presenting {
            Some((sub, _)) => self.slot(sub),
            None => &self.dynamic,
        };
        let snapshot = StatusSnapshot {
            ad_type: self.ad_type,
            state: face.status,
            message: message.into(),
            can_show,
            continuous: self.continuous,
            selected_ad_unit_id: face.selected_ad_unit_id.clone(),
            recommended_ad_unit_id: face
                .used_insight
                .as_ref()
                .and_then(|i| i.recommended_unit().map(str::to_string)),
        };
        let _ = self.status_tx.send(snapshot);
    }
}
