//! Insight data model
//!
//! The insight payload is plain JSON; any field-shape deviation decodes to
//! "no recommendation" rather than an error that could reach the ad path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ad format requesting an insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdType {
    Banner,
    Interstitial,
    Rewarded,
}

impl AdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::Banner => "banner",
            AdType::Interstitial => "interstitial",
            AdType::Rewarded => "rewarded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "banner" => Some(AdType::Banner),
            "interstitial" => Some(AdType::Interstitial),
            "rewarded" => Some(AdType::Rewarded),
            _ => None,
        }
    }
}

/// Content rating forwarded to the insight service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRating {
    #[default]
    Unspecified,
    General,
    ParentalGuidance,
    Teen,
    MatureAudience,
}

impl ContentRating {
    /// Wire code expected by the insight service
    pub fn code(&self) -> &'static str {
        match self {
            ContentRating::Unspecified => "",
            ContentRating::General => "G",
            ContentRating::ParentalGuidance => "PG",
            ContentRating::Teen => "T",
            ContentRating::MatureAudience => "MA",
        }
    }
}

/// Recommended configuration for one ad format, as returned by the
/// insight service. Immutable for the duration of one load cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdInsight {
    pub ad_type: AdType,

    /// Recommended ad unit; `None` or empty means "no recommendation"
    #[serde(default)]
    pub ad_unit_id: Option<String>,

    /// Predicted bid floor; 0 means "no floor"
    #[serde(default)]
    pub floor_price: f64,

    /// Correlation token chaining insight requests and tying a loaded ad
    /// back to the insight that informed it
    #[serde(default)]
    pub opportunity_id: Option<i64>,
}

impl AdInsight {
    /// Insight carrying no recommendation (defaults apply)
    pub fn none(ad_type: AdType) -> Self {
        Self {
            ad_type,
            ad_unit_id: None,
            floor_price: 0.0,
            opportunity_id: None,
        }
    }

    /// The recommended unit, if the service actually produced one
    pub fn recommended_unit(&self) -> Option<&str> {
        match self.ad_unit_id.as_deref() {
            Some("") | None => None,
            Some(unit) => Some(unit),
        }
    }
}

/// Raw wire shape of one insight response
#[derive(Debug, Deserialize)]
struct RawInsight {
    #[serde(default)]
    recommended_ad_unit_id: Option<String>,
    #[serde(default)]
    calculated_floor_price: f64,
    #[serde(default)]
    opportunity_id: Option<i64>,
}

/// Decode an insight payload. A payload that fails to parse is treated
/// identically to "no recommendation" and logged, never raised.
pub fn decode_insight(ad_type: AdType, raw: &str) -> AdInsight {
    match serde_json::from_str::<RawInsight>(raw) {
        Ok(parsed) => AdInsight {
            ad_type,
            ad_unit_id: parsed.recommended_ad_unit_id,
            floor_price: parsed.calculated_floor_price.max(0.0),
            opportunity_id: parsed.opportunity_id,
        },
        Err(e) => {
            warn!(ad_type = ad_type.as_str(), error = %e, "Malformed insight payload, using defaults");
            AdInsight::none(ad_type)
        }
    }
}

/// One behaviour-insight value, keyed by insight name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightValue {
    #[serde(default)]
    pub status: i64,
    #[serde(default, rename = "int")]
    pub int_value: i64,
    #[serde(default, rename = "float")]
    pub float_value: f64,
    #[serde(default, rename = "string")]
    pub string_value: Option<String>,
}

/// Decode a behaviour-insight response (`{"insights": {key: {...}}}`).
/// Malformed payloads decode to an empty map.
pub fn decode_behaviour_insights(raw: &str) -> HashMap<String, InsightValue> {
    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default)]
        insights: HashMap<String, InsightValue>,
    }

    match serde_json::from_str::<Wrapper>(raw) {
        Ok(wrapper) => wrapper.insights,
        Err(e) => {
            warn!(error = %e, "Malformed behaviour insight payload");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_insight() {
        let raw = r#"{"recommended_ad_unit_id":"unit-rec","calculated_floor_price":2.5,"opportunity_id":42}"#;
        let insight = decode_insight(AdType::Rewarded, raw);
        assert_eq!(insight.recommended_unit(), Some("unit-rec"));
        assert_eq!(insight.floor_price, 2.5);
        assert_eq!(insight.opportunity_id, Some(42));
    }

    #[test]
    fn test_decode_empty_recommendation() {
        let insight = decode_insight(AdType::Banner, r#"{"recommended_ad_unit_id":""}"#);
        assert_eq!(insight.recommended_unit(), None);
        assert_eq!(insight.floor_price, 0.0);
    }

    #[test]
    fn test_malformed_payload_is_no_recommendation() {
        let insight = decode_insight(AdType::Interstitial, "{not json");
        assert_eq!(insight, AdInsight::none(AdType::Interstitial));
    }

    #[test]
    fn test_negative_floor_clamped() {
        let insight = decode_insight(AdType::Banner, r#"{"calculated_floor_price":-1.0}"#);
        assert_eq!(insight.floor_price, 0.0);
    }

    #[test]
    fn test_decode_behaviour_insights() {
        let raw = r#"{"insights":{"calculated_user_floor_price_rewarded":{"status":1,"float":2.25},"test_group":{"string":"split-am"}}}"#;
        let map = decode_behaviour_insights(raw);
        assert_eq!(map.len(), 2);
        assert_eq!(
            map["calculated_user_floor_price_rewarded"].float_value,
            2.25
        );
        assert_eq!(map["test_group"].string_value.as_deref(), Some("split-am"));
        assert!(decode_behaviour_insights("oops").is_empty());
    }
}
