//! Game event model
//!
//! Events recorded through the insight service alongside the ad flows.
//! Payloads are plain serde JSON; names need no manual escaping.

use serde::{Deserialize, Serialize};

/// Category of a resource being spent or received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    SoftCurrency,
    PremiumCurrency,
    Resource,
    CoreItem,
    CosmeticItem,
    Consumable,
    Experience,
    Chest,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendMethod {
    Boost,
    Continuity,
    Craft,
    Unlock,
    Upgrade,
    Shop,
    Event,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionType {
    Achievement,
    GameplayUnit,
    ItemLevel,
    Unlock,
    PlayerLevel,
    Task,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionStatus {
    Start,
    Complete,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionSource {
    Undefined,
    CoreContent,
    OptionalContent,
    Event,
    SocialContent,
    Exploration,
    Other,
}

/// One recorded game event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    pub event_type: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub name: Option<String>,
    pub value: i64,
    #[serde(default)]
    pub custom_payload: Option<serde_json::Value>,
}

impl GameEvent {
    pub fn progression(
        kind: ProgressionType,
        status: ProgressionStatus,
        source: ProgressionSource,
        name: &str,
        value: i64,
    ) -> Self {
        Self {
            event_type: "progression".into(),
            category: to_wire(&kind),
            sub_category: Some(format!("{}_{}", to_wire(&status), to_wire(&source))),
            name: Some(name.to_string()),
            value,
            custom_payload: None,
        }
    }

    pub fn spend(category: ResourceCategory, method: SpendMethod, name: &str, value: i64) -> Self {
        Self {
            event_type: "spend".into(),
            category: to_wire(&category),
            sub_category: Some(to_wire(&method)),
            name: Some(name.to_string()),
            value,
            custom_payload: None,
        }
    }

    pub fn receive(category: ResourceCategory, name: &str, value: i64) -> Self {
        Self {
            event_type: "receive".into(),
            category: to_wire(&category),
            sub_category: None,
            name: Some(name.to_string()),
            value,
            custom_payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.custom_payload = Some(payload);
        self
    }
}

/// Wire name of a snake_case serde enum variant
fn to_wire<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_event_wire_names() {
        let event = GameEvent::spend(ResourceCategory::SoftCurrency, SpendMethod::Shop, "coins", 50);
        assert_eq!(event.event_type, "spend");
        assert_eq!(event.category, "soft_currency");
        assert_eq!(event.sub_category.as_deref(), Some("shop"));
        assert_eq!(event.value, 50);
    }

    #[test]
    fn test_names_need_no_escaping() {
        let event = GameEvent::receive(ResourceCategory::Chest, "weird \"name\"\n<tag>", 1);
        let json = serde_json::to_string(&event).unwrap();
        let back: GameEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name.as_deref(), Some("weird \"name\"\n<tag>"));
    }

    #[test]
    fn test_progression_sub_category() {
        let event = GameEvent::progression(
            ProgressionType::Task,
            ProgressionStatus::Complete,
            ProgressionSource::Event,
            "daily",
            3,
        );
        assert_eq!(event.category, "task");
        assert_eq!(event.sub_category.as_deref(), Some("complete_event"));
    }
}
