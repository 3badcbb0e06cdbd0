//! Simulated insight service
//!
//! Scriptable stand-in for the remote insight/analytics boundary, used by
//! the demo binary and the orchestrator tests. Recorded events and
//! mediation telemetry are captured for inspection.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::{debug, info};

use super::pending::PendingInsightRegistry;
use super::service::InsightService;
use super::types::{decode_insight, AdInsight, AdType, ContentRating, InsightValue};
use crate::events::GameEvent;
use crate::telemetry::TelemetryEvent;

/// One scripted insight outcome for an ad format
#[derive(Debug, Clone)]
pub enum ScriptedInsight {
    /// Resolve with this insight after `delay`
    Resolve { delay: Duration, insight: AdInsight },
    /// Resolve with a raw JSON payload after `delay` (exercises decoding)
    Payload { delay: Duration, payload: String },
    /// Never resolve; the caller's fallback timer must cover this
    Stall,
}

#[derive(Default)]
struct Captured {
    recorded: Vec<GameEvent>,
    mediation: Vec<TelemetryEvent>,
    previous_opportunity_ids: Vec<Option<i64>>,
    extra_parameters: HashMap<String, String>,
    content_rating: ContentRating,
    override_root: Option<String>,
}

pub struct SimulatedInsightService {
    scripts: Mutex<HashMap<AdType, VecDeque<ScriptedInsight>>>,
    behaviour: Mutex<HashMap<String, InsightValue>>,
    pending: PendingInsightRegistry,
    captured: Mutex<Captured>,
    nuid: String,
}

impl SimulatedInsightService {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            behaviour: Mutex::new(HashMap::new()),
            pending: PendingInsightRegistry::new(),
            captured: Mutex::new(Captured::default()),
            nuid: "nuid-simulated".into(),
        }
    }

    /// Queue the next insight outcome for an ad format
    pub fn script(&self, kind: AdType, script: ScriptedInsight) {
        self.scripts.lock().entry(kind).or_default().push_back(script);
    }

    /// Seed a behaviour-insight value
    pub fn set_behaviour_value(&self, key: &str, value: InsightValue) {
        self.behaviour.lock().insert(key.to_string(), value);
    }

    pub fn recorded_events(&self) -> Vec<GameEvent> {
        self.captured.lock().recorded.clone()
    }

    pub fn mediation_events(&self) -> Vec<TelemetryEvent> {
        self.captured.lock().mediation.clone()
    }

    /// Previous opportunity ids observed on get_insights calls, in order
    pub fn previous_opportunity_ids(&self) -> Vec<Option<i64>> {
        self.captured.lock().previous_opportunity_ids.clone()
    }

    pub fn extra_parameter(&self, key: &str) -> Option<String> {
        self.captured.lock().extra_parameters.get(key).cloned()
    }

    pub fn content_rating(&self) -> ContentRating {
        self.captured.lock().content_rating
    }

    pub fn override_root(&self) -> Option<String> {
        self.captured.lock().override_root.clone()
    }

    /// In-flight insight queries currently held by the registry
    pub fn pending_queries(&self) -> usize {
        self.pending.len()
    }

    fn next_script(&self, kind: AdType) -> Option<ScriptedInsight> {
        self.scripts
            .lock()
            .get_mut(&kind)
            .and_then(|queue| queue.pop_front())
    }
}

impl Default for SimulatedInsightService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InsightService for SimulatedInsightService {
    async fn init(&self, app_id: &str) -> Result<()> {
        info!(app_id, "Simulated insight service initialized");
        Ok(())
    }

    async fn record(&self, event: GameEvent) -> Result<()> {
        debug!(name = event.name.as_deref().unwrap_or(""), "Recorded game event");
        self.captured.lock().recorded.push(event);
        Ok(())
    }

    async fn get_insights(
        &self,
        kind: AdType,
        previous: Option<&AdInsight>,
        _timeout_secs: u32,
    ) -> Result<AdInsight> {
        self.captured
            .lock()
            .previous_opportunity_ids
            .push(previous.and_then(|p| p.opportunity_id));

        let (id, rx) = self.pending.register();
        match self.next_script(kind) {
            Some(ScriptedInsight::Resolve { delay, insight }) => {
                sleep(delay).await;
                self.pending.resolve(id, Some(insight));
            }
            Some(ScriptedInsight::Payload { delay, payload }) => {
                sleep(delay).await;
                self.pending.resolve(id, Some(decode_insight(kind, &payload)));
            }
            Some(ScriptedInsight::Stall) => {
                // Hang without leaving a resolver behind in the registry
                self.pending.forget(id);
                std::future::pending::<()>().await;
            }
            None => {
                sleep(Duration::from_millis(50)).await;
                self.pending.resolve(id, Some(AdInsight::none(kind)));
            }
        }

        let insight = rx.await?.unwrap_or_else(|| AdInsight::none(kind));
        Ok(insight)
    }

    async fn get_behaviour_insight(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, InsightValue>> {
        let behaviour = self.behaviour.lock();
        Ok(keys
            .iter()
            .filter_map(|k| behaviour.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn report_mediation(&self, event: &TelemetryEvent) -> Result<()> {
        self.captured.lock().mediation.push(event.clone());
        Ok(())
    }

    async fn get_nuid(&self, _present: bool) -> Result<String> {
        Ok(self.nuid.clone())
    }

    fn set_content_rating(&self, rating: ContentRating) {
        self.captured.lock().content_rating = rating;
    }

    fn set_extra_parameter(&self, key: &str, value: &str) {
        self.captured
            .lock()
            .extra_parameters
            .insert(key.to_string(), value.to_string());
    }

    fn set_override(&self, root: &str) {
        self.captured.lock().override_root = Some(root.to_string());
    }
}
