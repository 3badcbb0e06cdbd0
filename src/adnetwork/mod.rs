//! Ad network SDK boundary
//!
//! The mediated ad network is an external collaborator; this module defines
//! the capability trait the orchestrators consume plus the normalized
//! status mapping for its platform-specific error codes.

pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::insight::AdType;

pub use simulated::{LoadScript, SimulatedAdNetwork};

/// Deployment platform, selects the error-code mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

/// Request for one ad load
#[derive(Debug, Clone)]
pub struct AdLoadRequest {
    pub ad_unit_id: String,
    pub floor_price: f64,
}

/// Handle to a loaded ad instance
#[derive(Debug, Clone)]
pub struct AdHandle {
    pub id: Uuid,
    pub ad_unit_id: String,
    pub response_info: ResponseInfo,
}

/// Mediation metadata attached to a loaded ad, used for telemetry only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseInfo {
    /// Mediation group / placement name
    pub placement: Option<String>,
    /// Winning network instance name
    pub winning_network: Option<String>,
    /// Competing network instance names, in waterfall order
    pub waterfall: Vec<String>,
}

/// Load failure as reported by the network SDK
#[derive(Debug, Clone)]
pub struct LoadError {
    /// Provider error code (platform-specific numeric space)
    pub code: i32,
    pub message: String,
    /// Underlying network adapter error code, when the SDK exposes one
    pub network_code: Option<i32>,
}

/// Normalized request status reported to the telemetry boundary.
/// Platform-specific error codes collapse into this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedStatus {
    Loaded,
    NoFill,
    Error,
    Timeout,
}

impl NormalizedStatus {
    /// Wire code expected by the insight service
    pub fn code(&self) -> i32 {
        match self {
            NormalizedStatus::Error => 0,
            NormalizedStatus::Loaded => 1,
            NormalizedStatus::NoFill => 2,
            NormalizedStatus::Timeout => 3,
        }
    }
}

/// Map a provider error code onto the normalized set. The numeric spaces
/// differ per platform: no-fill is code 1 on iOS but 3 on Android, while
/// code 2 is the network-timeout family on both.
pub fn normalize_load_error(platform: Platform, code: i32) -> NormalizedStatus {
    match (platform, code) {
        (Platform::Ios, 1) | (Platform::Android, 3) => NormalizedStatus::NoFill,
        (Platform::Ios, 2) | (Platform::Android, 2) => NormalizedStatus::Timeout,
        _ => NormalizedStatus::Error,
    }
}

/// Ad lifecycle callback, delivered on arbitrary tasks and carrying only
/// the ad-instance identity; business context is resolved through the
/// pending-request registry.
#[derive(Debug, Clone)]
pub struct AdEvent {
    pub handle_id: Uuid,
    pub kind: AdEventKind,
}

#[derive(Debug, Clone)]
pub enum AdEventKind {
    Clicked,
    Impression,
    Paid {
        /// Revenue in micro-units of the currency
        value_micros: i64,
        currency: String,
        precision: i32,
    },
    Presented,
    Dismissed,
}

/// Ad network SDK capability surface.
///
/// `load` resolving to `Ok(None)` models the SDK firing its load callback
/// with neither an ad nor an error; callers must treat it as a failure
/// without entering the retry path.
#[async_trait]
pub trait AdNetwork: Send + Sync {
    async fn load(
        &self,
        ad_type: AdType,
        request: AdLoadRequest,
    ) -> Result<Option<AdHandle>, LoadError>;

    fn show(&self, handle: &AdHandle);

    /// Subscribe to lifecycle callbacks for all ad instances
    fn subscribe(&self) -> broadcast::Receiver<AdEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fill_mapping_is_platform_specific() {
        assert_eq!(
            normalize_load_error(Platform::Ios, 1),
            NormalizedStatus::NoFill
        );
        assert_eq!(
            normalize_load_error(Platform::Android, 3),
            NormalizedStatus::NoFill
        );
        // The same numeric codes mean something else on the other platform
        assert_eq!(
            normalize_load_error(Platform::Android, 1),
            NormalizedStatus::Error
        );
        assert_eq!(
            normalize_load_error(Platform::Ios, 3),
            NormalizedStatus::Error
        );
    }

    #[test]
    fn test_timeout_and_default_mapping() {
        assert_eq!(
            normalize_load_error(Platform::Ios, 2),
            NormalizedStatus::Timeout
        );
        assert_eq!(
            normalize_load_error(Platform::Android, 2),
            NormalizedStatus::Timeout
        );
        assert_eq!(
            normalize_load_error(Platform::Android, 0),
            NormalizedStatus::Error
        );
        assert_eq!(
            normalize_load_error(Platform::Ios, 99),
            NormalizedStatus::Error
        );
    }
}
