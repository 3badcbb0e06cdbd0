//! Insight service capability trait
//!
//! One implementation per deployment target, selected at startup from
//! configuration rather than compile-time switches.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use super::types::{AdInsight, AdType, ContentRating, InsightValue};
use crate::events::GameEvent;
use crate::telemetry::TelemetryEvent;

/// External insight/analytics service surface.
///
/// `get_insights` may fail or never resolve; callers must never block on it
/// without an independent bound (the orchestrator's fallback timer). The
/// `timeout_secs` argument is advisory metadata for the remote side, not a
/// local enforcement mechanism.
#[async_trait]
pub trait InsightService: Send + Sync {
    async fn init(&self, app_id: &str) -> Result<()>;

    /// Record a game event (fire and forget from the caller's perspective)
    async fn record(&self, event: GameEvent) -> Result<()>;

    /// Request the recommended configuration for one ad format.
    /// `previous` carries the prior opportunity id so the service avoids
    /// repeating a stale recommendation.
    async fn get_insights(
        &self,
        kind: AdType,
        previous: Option<&AdInsight>,
        timeout_secs: u32,
    ) -> Result<AdInsight>;

    /// Query behaviour-insight values by key
    async fn get_behaviour_insight(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, InsightValue>>;

    /// Forward one mediation telemetry event
    async fn report_mediation(&self, event: &TelemetryEvent) -> Result<()>;

    async fn get_nuid(&self, present: bool) -> Result<String>;

    fn set_content_rating(&self, rating: ContentRating);

    fn set_extra_parameter(&self, key: &str, value: &str);

    /// Debug override root for the service endpoint
    fn set_override(&self, root: &str);
}
