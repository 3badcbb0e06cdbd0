//! Remote insight service client
//!
//! JSON-over-HTTP implementation of the insight capability surface.
//! Transport errors surface as `Err` (the caller's fallback timer is the
//! local bound); malformed bodies decode to "no recommendation".

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::service::InsightService;
use super::types::{
    decode_behaviour_insights, decode_insight, AdInsight, AdType, ContentRating, InsightValue,
};
use crate::events::GameEvent;
use crate::telemetry::TelemetryEvent;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct InsightsRequest<'a> {
    ad_type: &'a str,
    previous_opportunity_id: Option<i64>,
    timeout_secs: u32,
    content_rating: &'a str,
    extra_parameters: &'a HashMap<String, String>,
}

pub struct HttpInsightService {
    client: Client,
    base_url: Mutex<String>,
    content_rating: Mutex<ContentRating>,
    extra_parameters: Mutex<HashMap<String, String>>,
}

impl HttpInsightService {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: Mutex::new(base_url.trim_end_matches('/').to_string()),
            content_rating: Mutex::new(ContentRating::default()),
            extra_parameters: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.lock(), path)
    }
}

#[async_trait]
impl InsightService for HttpInsightService {
    async fn init(&self, app_id: &str) -> Result<()> {
        self.client
            .post(self.url("init"))
            .json(&json!({ "app_id": app_id }))
            .send()
            .await
            .context("Insight service init request failed")?
            .error_for_status()
            .context("Insight service rejected init")?;
        info!(app_id, "Insight service initialized");
        Ok(())
    }

    async fn record(&self, event: GameEvent) -> Result<()> {
        self.client
            .post(self.url("events"))
            .json(&event)
            .send()
            .await
            .context("Event record request failed")?;
        Ok(())
    }

    async fn get_insights(
        &self,
        kind: AdType,
        previous: Option<&AdInsight>,
        timeout_secs: u32,
    ) -> Result<AdInsight> {
        let extra_parameters = self.extra_parameters.lock().clone();
        let body = InsightsRequest {
            ad_type: kind.as_str(),
            previous_opportunity_id: previous.and_then(|p| p.opportunity_id),
            timeout_secs,
            content_rating: self.content_rating.lock().code(),
            extra_parameters: &extra_parameters,
        };

        let response = self
            .client
            .post(self.url("insights"))
            .json(&body)
            .send()
            .await
            .context("Insight request failed")?
            .error_for_status()
            .context("Insight request rejected")?;

        let raw = response.text().await.context("Insight body unreadable")?;
        Ok(decode_insight(kind, &raw))
    }

    async fn get_behaviour_insight(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, InsightValue>> {
        let raw = self
            .client
            .post(self.url("behaviour-insights"))
            .json(&json!({ "keys": keys }))
            .send()
            .await
            .context("Behaviour insight request failed")?
            .text()
            .await
            .context("Behaviour insight body unreadable")?;
        Ok(decode_behaviour_insights(&raw))
    }

    async fn report_mediation(&self, event: &TelemetryEvent) -> Result<()> {
        self.client
            .post(self.url("mediation"))
            .json(event)
            .send()
            .await
            .context("Mediation report failed")?;
        Ok(())
    }

    async fn get_nuid(&self, present: bool) -> Result<String> {
        let nuid = self
            .client
            .get(self.url("nuid"))
            .query(&[("present", present)])
            .send()
            .await
            .context("Nuid request failed")?
            .error_for_status()
            .context("Nuid request rejected")?
            .text()
            .await
            .context("Nuid body unreadable")?;
        Ok(nuid)
    }

    fn set_content_rating(&self, rating: ContentRating) {
        *self.content_rating.lock() = rating;
    }

    fn set_extra_parameter(&self, key: &str, value: &str) {
        self.extra_parameters
            .lock()
            .insert(key.to_string(), value.to_string());
    }

    fn set_override(&self, root: &str) {
        debug!(root, "Insight endpoint override");
        *self.base_url.lock() = root.trim_end_matches('/').to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_nuid_http_error_is_not_a_nuid() {
        let router = Router::new().route(
            "/nuid",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "<html>error</html>") }),
        );
        let base = serve(router).await;

        let service = HttpInsightService::new(&base).unwrap();
        // An error page body must never be handed back as the identifier
        assert!(service.get_nuid(false).await.is_err());
    }

    #[tokio::test]
    async fn test_nuid_success_returns_body() {
        let router = Router::new().route("/nuid", get(|| async { "nuid-remote-1" }));
        let base = serve(router).await;

        let service = HttpInsightService::new(&base).unwrap();
        assert_eq!(service.get_nuid(true).await.unwrap(), "nuid-remote-1");
    }
}
