//! Simulated ad network
//!
//! Scriptable stand-in for the real SDK, used by the demo binary and the
//! orchestrator tests. Load outcomes are queued per ad unit; unmatched
//! units fill after a short jitter delay.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use super::{AdEvent, AdEventKind, AdHandle, AdLoadRequest, AdNetwork, LoadError, ResponseInfo};
use crate::insight::AdType;

/// One scripted load outcome
#[derive(Debug, Clone)]
pub enum LoadScript {
    /// Fill after `delay` with the given mediation metadata
    Fill {
        delay: Duration,
        response_info: ResponseInfo,
    },
    /// Fail after `delay` with a provider error code
    Fail {
        delay: Duration,
        code: i32,
        network_code: Option<i32>,
    },
    /// Fire the load callback with neither an ad nor an error
    Null { delay: Duration },
}

pub struct SimulatedAdNetwork {
    scripts: Mutex<HashMap<String, VecDeque<LoadScript>>>,
    events_tx: broadcast::Sender<AdEvent>,
    /// When set, a shown ad dismisses itself after this dwell time
    auto_dismiss: Option<Duration>,
}

impl SimulatedAdNetwork {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            scripts: Mutex::new(HashMap::new()),
            events_tx,
            auto_dismiss: None,
        }
    }

    pub fn with_auto_dismiss(mut self, dwell: Duration) -> Self {
        self.auto_dismiss = Some(dwell);
        self
    }

    /// Queue the next load outcome for an ad unit
    pub fn script(&self, ad_unit_id: &str, script: LoadScript) {
        self.scripts
            .lock()
            .entry(ad_unit_id.to_string())
            .or_default()
            .push_back(script);
    }

    /// Inject a lifecycle event, as the SDK would from a callback thread
    pub fn emit(&self, handle_id: Uuid, kind: AdEventKind) {
        let _ = self.events_tx.send(AdEvent { handle_id, kind });
    }

    fn next_script(&self, ad_unit_id: &str) -> Option<LoadScript> {
        self.scripts
            .lock()
            .get_mut(ad_unit_id)
            .and_then(|queue| queue.pop_front())
    }
}

impl Default for SimulatedAdNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdNetwork for SimulatedAdNetwork {
    async fn load(
        &self,
        ad_type: AdType,
        request: AdLoadRequest,
    ) -> Result<Option<AdHandle>, LoadError> {
        let script = self.next_script(&request.ad_unit_id);
        debug!(
            ad_type = ad_type.as_str(),
            ad_unit = %request.ad_unit_id,
            floor = request.floor_price,
            scripted = script.is_some(),
            "Simulated load"
        );

        match script {
            Some(LoadScript::Fill {
                delay,
                response_info,
            }) => {
                sleep(delay).await;
                Ok(Some(AdHandle {
                    id: Uuid::new_v4(),
                    ad_unit_id: request.ad_unit_id,
                    response_info,
                }))
            }
            Some(LoadScript::Fail {
                delay,
                code,
                network_code,
            }) => {
                sleep(delay).await;
                Err(LoadError {
                    code,
                    message: format!("simulated load failure (code {})", code),
                    network_code,
                })
            }
            Some(LoadScript::Null { delay }) => {
                sleep(delay).await;
                Ok(None)
            }
            None => {
                // Unscripted: fill after a small jitter delay
                let jitter_ms = rand::thread_rng().gen_range(50..400);
                sleep(Duration::from_millis(jitter_ms)).await;
                Ok(Some(AdHandle {
                    id: Uuid::new_v4(),
                    ad_unit_id: request.ad_unit_id,
                    response_info: ResponseInfo {
                        placement: Some("simulated-group".into()),
                        winning_network: Some("simulated-network".into()),
                        waterfall: vec!["simulated-network".into(), "backfill-network".into()],
                    },
                }))
            }
        }
    }

    fn show(&self, handle: &AdHandle) {
        info!(handle = %handle.id, ad_unit = %handle.ad_unit_id, "Simulated show");
        let _ = self.events_tx.send(AdEvent {
            handle_id: handle.id,
            kind: AdEventKind::Presented,
        });
        let _ = self.events_tx.send(AdEvent {
            handle_id: handle.id,
            kind: AdEventKind::Paid {
                value_micros: rand::thread_rng().gen_range(1_000..50_000),
                currency: "USD".into(),
                precision: 1,
            },
        });
        let _ = self.events_tx.send(AdEvent {
            handle_id: handle.id,
            kind: AdEventKind::Impression,
        });

        if let Some(dwell) = self.auto_dismiss {
            let tx = self.events_tx.clone();
            let handle_id = handle.id;
            tokio::spawn(async move {
                sleep(dwell).await;
                let _ = tx.send(AdEvent {
                    handle_id,
                    kind: AdEventKind::Dismissed,
                });
            });
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AdEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scripted_outcomes_in_order() {
        let network = SimulatedAdNetwork::new();
        network.script(
            "unit-a",
            LoadScript::Fail {
                delay: Duration::from_millis(10),
                code: 3,
                network_code: None,
            },
        );
        network.script(
            "unit-a",
            LoadScript::Fill {
                delay: Duration::from_millis(10),
                response_info: ResponseInfo::default(),
            },
        );

        let request = AdLoadRequest {
            ad_unit_id: "unit-a".into(),
            floor_price: 0.0,
        };
        let first = network.load(AdType::Banner, request.clone()).await;
        assert!(first.is_err());
        let second = network.load(AdType::Banner, request).await;
        assert!(matches!(second, Ok(Some(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_show_emits_lifecycle_events() {
        let network = SimulatedAdNetwork::new();
        let mut events = network.subscribe();
        let handle = AdHandle {
            id: Uuid::new_v4(),
            ad_unit_id: "unit-a".into(),
            response_info: ResponseInfo::default(),
        };
        network.show(&handle);

        let first = events.recv().await.unwrap();
        assert_eq!(first.handle_id, handle.id);
        assert!(matches!(first.kind, AdEventKind::Presented));
        assert!(matches!(
            events.recv().await.unwrap().kind,
            AdEventKind::Paid { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap().kind,
            AdEventKind::Impression
        ));
    }
}
