//! Load cycle state
//!
//! One in-flight attempt to obtain and present an ad. Exclusively owned and
//! mutated by the orchestrator task; at most one active cycle per sub-cycle
//! slot at a time.

use serde::Serialize;
use uuid::Uuid;

use crate::adnetwork::AdHandle;
use crate::insight::AdInsight;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Idle,
    AwaitingInsight,
    Loading,
    Loaded,
    Presenting,
    Failed,
}

impl CycleStatus {
    /// A new cycle may only start once the previous one is terminal
    pub fn can_start(&self) -> bool {
        matches!(self, CycleStatus::Idle | CycleStatus::Failed)
    }
}

#[derive(Debug)]
pub struct LoadCycleState {
    pub status: CycleStatus,
    /// Generation stamp; events from older generations are stale
    pub generation: u64,
    /// Insight that seeded this cycle, `None` on the default path
    pub used_insight: Option<AdInsight>,
    /// Resolved at the moment the real load is issued
    pub selected_ad_unit_id: Option<String>,
    pub request_correlation_id: Option<Uuid>,
    pub response_correlation_id: Option<Uuid>,
    pub handle: Option<AdHandle>,
}

impl LoadCycleState {
    pub fn idle() -> Self {
        Self {
            status: CycleStatus::Idle,
            generation: 0,
            used_insight: None,
            selected_ad_unit_id: None,
            request_correlation_id: None,
            response_correlation_id: None,
            handle: None,
        }
    }

    /// Begin a fresh cycle under a new generation stamp
    pub fn begin(&mut self, generation: u64, status: CycleStatus) {
        self.status = status;
        self.generation = generation;
        self.used_insight = None;
        self.selected_ad_unit_id = None;
        self.request_correlation_id = None;
        self.response_correlation_id = None;
        self.handle = None;
    }

    /// Whether an event stamped with `generation` belongs to this cycle
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}
