//! Pending request registry
//!
//! Shared across all ad-format orchestrators: maps load-request correlation
//! ids to in-flight request metadata so impression/click callbacks, which
//! carry only an ad-instance identity, can be resolved back to the ad unit
//! and insight that produced the ad. Insert/lookup/remove are atomic with
//! respect to each other (single lock per access).

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::adnetwork::ResponseInfo;
use crate::insight::{AdInsight, AdType};

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub ad_type: AdType,
    pub ad_unit_id: String,
    pub insight: Option<AdInsight>,
    pub response_correlation_id: Option<Uuid>,
    pub handle_id: Option<Uuid>,
    /// Mediation metadata captured when the ad loaded
    pub response_info: Option<ResponseInfo>,
    pub impression_recorded: bool,
}

#[derive(Default)]
pub struct PendingRequestRegistry {
    inner: Mutex<HashMap<Uuid, PendingRequest>>,
}

impl PendingRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly issued load request
    pub fn insert(
        &self,
        correlation_id: Uuid,
        ad_type: AdType,
        ad_unit_id: &str,
        insight: Option<AdInsight>,
    ) {
        self.inner.lock().insert(
            correlation_id,
            PendingRequest {
                ad_type,
                ad_unit_id: ad_unit_id.to_string(),
                insight,
                response_correlation_id: None,
                handle_id: None,
                response_info: None,
                impression_recorded: false,
            },
        );
    }

    /// Attach the loaded ad instance, its response correlation id, and the
    /// mediation metadata used later for impression telemetry
    pub fn bind_handle(
        &self,
        correlation_id: Uuid,
        handle_id: Uuid,
        response_correlation_id: Uuid,
        response_info: ResponseInfo,
    ) {
        if let Some(entry) = self.inner.lock().get_mut(&correlation_id) {
            entry.handle_id = Some(handle_id);
            entry.response_correlation_id = Some(response_correlation_id);
            entry.response_info = Some(response_info);
        }
    }

    /// Resolve an ad-instance identity back to its request metadata
    pub fn by_handle(&self, handle_id: Uuid) -> Option<(Uuid, PendingRequest)> {
        self.inner
            .lock()
            .iter()
            .find(|(_, entry)| entry.handle_id == Some(handle_id))
            .map(|(id, entry)| (*id, entry.clone()))
    }

    /// Mark the first impression for this request; returns false if one
    /// was already recorded for the same entry
    pub fn mark_impression(&self, correlation_id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        match inner.get_mut(&correlation_id) {
            Some(entry) if !entry.impression_recorded => {
                entry.impression_recorded = true;
                true
            }
            _ => false,
        }
    }

    /// Drop a request that was superseded, failed, or fully presented
    pub fn remove(&self, correlation_id: Uuid) -> Option<PendingRequest> {
        self.inner.lock().remove(&correlation_id)
    }

    /// Snapshot of all live entries
    pub fn entries(&self) -> Vec<(Uuid, PendingRequest)> {
        self.inner
            .lock()
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_resolution() {
        let registry = PendingRequestRegistry::new();
        let correlation_id = Uuid::new_v4();
        let handle_id = Uuid::new_v4();
        let response_id = Uuid::new_v4();

        registry.insert(correlation_id, AdType::Rewarded, "unit-a", None);
        registry.bind_handle(correlation_id, handle_id, response_id, ResponseInfo::default());

        let (found_id, entry) = registry.by_handle(handle_id).unwrap();
        assert_eq!(found_id, correlation_id);
        assert_eq!(entry.ad_unit_id, "unit-a");
        assert_eq!(entry.response_correlation_id, Some(response_id));

        assert!(registry.by_handle(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_impression_recorded_once() {
        let registry = PendingRequestRegistry::new();
        let correlation_id = Uuid::new_v4();
        registry.insert(correlation_id, AdType::Banner, "unit-b", None);

        assert!(registry.mark_impression(correlation_id));
        assert!(!registry.mark_impression(correlation_id));
        assert!(!registry.mark_impression(Uuid::new_v4()));
    }

    #[test]
    fn test_remove() {
        let registry = PendingRequestRegistry::new();
        let correlation_id = Uuid::new_v4();
        registry.insert(correlation_id, AdType::Interstitial, "unit-c", None);
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(correlation_id).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(correlation_id).is_none());
    }
}
