//! Insight service boundary
//!
//! Types and clients for the external insight/behaviour service: the
//! capability trait consumed by the orchestrators, a remote HTTP client,
//! and a scriptable simulated service for the demo binary and tests.

pub mod http;
pub mod pending;
pub mod service;
pub mod simulated;
pub mod types;

pub use http::HttpInsightService;
pub use pending::PendingInsightRegistry;
pub use service::InsightService;
pub use simulated::{ScriptedInsight, SimulatedInsightService};
pub use types::{AdInsight, AdType, ContentRating, InsightValue};
