//! admediate - insight-driven ad load orchestrator demo service
//!
//! Wires the three ad-format controllers (banner, interstitial, rewarded)
//! against an insight service and a simulated ad network, and exposes the
//! demo controls over HTTP.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use admediate::adnetwork::{AdNetwork, SimulatedAdNetwork};
use admediate::api::{create_router, AppState};
use admediate::config::AppConfig;
use admediate::insight::{AdType, HttpInsightService, InsightService, SimulatedInsightService};
use admediate::orchestrator::{AdLoadOrchestrator, PendingRequestRegistry};
use admediate::telemetry::TelemetryReporter;

#[derive(Parser, Debug)]
#[command(name = "admediate", about = "Insight-driven ad load orchestrator")]
struct Args {
    /// Path to a TOML config file; defaults + env overrides when omitted
    #[arg(short, long, env = "ADMEDIATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env(),
    };
    if let Some(port) = args.port {
        config.listen_port = port;
    }

    info!(
        app_id = %config.app_id,
        platform = ?config.platform,
        port = config.listen_port,
        "Starting admediate"
    );

    // Insight service: remote when an endpoint is configured, otherwise
    // the simulated one
    let insight: Arc<dyn InsightService> = match &config.insight_endpoint {
        Some(endpoint) => Arc::new(HttpInsightService::new(endpoint)?),
        None => Arc::new(SimulatedInsightService::new()),
    };

    if let Some(root) = &config.override_root {
        insight.set_override(root);
    }
    insight.set_content_rating(config.content_rating);
    for (key, value) in &config.extra_parameters {
        insight.set_extra_parameter(key, value);
    }
    insight
        .init(&config.app_id)
        .await
        .context("Insight service init failed")?;

    let network: Arc<dyn AdNetwork> =
        Arc::new(SimulatedAdNetwork::new().with_auto_dismiss(Duration::from_secs(3)));
    let (telemetry, _telemetry_worker) = TelemetryReporter::spawn(insight.clone());
    let requests = Arc::new(PendingRequestRegistry::new());

    let mut controllers = HashMap::new();
    for (ad_type, format_config) in [
        (AdType::Banner, config.banner.clone()),
        (AdType::Interstitial, config.interstitial.clone()),
        (AdType::Rewarded, config.rewarded.clone()),
    ] {
        let handle = AdLoadOrchestrator::spawn(
            ad_type,
            format_config,
            config.platform,
            insight.clone(),
            network.clone(),
            telemetry.clone(),
            requests.clone(),
        );
        controllers.insert(ad_type, handle);
    }

    let state = AppState {
        controllers,
        insight,
    };
    let router = create_router(state);

    let addr = format!("0.0.0.0:{}", config.listen_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Control API listening");
    axum::serve(listener, router)
        .await
        .context("Server error")?;

    Ok(())
}
