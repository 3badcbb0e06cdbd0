//! Application configuration
//!
//! Loaded from a TOML file with environment-variable overrides for the
//! knobs that change between deployments (port, insight endpoint, app id).

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adnetwork::Platform;
use crate::insight::ContentRating;

/// Default fallback delay before giving up on the insight query (seconds)
pub const DEFAULT_FALLBACK_DELAY_SECS: u64 = 5;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Insight service application id
    pub app_id: String,

    /// Port for the control API
    pub listen_port: u16,

    /// Platform whose error-code mapping applies
    pub platform: Platform,

    /// Content rating forwarded to the insight service
    #[serde(default)]
    pub content_rating: ContentRating,

    /// Optional debug override root for the insight service
    #[serde(default)]
    pub override_root: Option<String>,

    /// Remote insight service base URL; when absent the simulated
    /// service is used instead
    #[serde(default)]
    pub insight_endpoint: Option<String>,

    /// Extra parameters forwarded verbatim at startup (e.g. test group)
    #[serde(default)]
    pub extra_parameters: HashMap<String, String>,

    /// Per-format controller configuration
    pub banner: AdFormatConfig,
    pub interstitial: AdFormatConfig,
    pub rewarded: AdFormatConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: "demo-app".into(),
            listen_port: 8090,
            platform: Platform::Android,
            content_rating: ContentRating::default(),
            override_root: None,
            insight_endpoint: None,
            extra_parameters: HashMap::new(),
            banner: AdFormatConfig::banner_default(),
            interstitial: AdFormatConfig::interstitial_default(),
            rewarded: AdFormatConfig::rewarded_default(),
        }
    }
}

/// Configuration for one ad-format controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdFormatConfig {
    /// Ad unit requested when no recommendation is available
    pub default_ad_unit_id: String,

    /// Delay before the fallback path wins the race against the insight
    /// query; also the automatic retry interval after a failed load
    #[serde(default = "default_fallback_delay")]
    pub fallback_delay_secs: u64,

    /// Advisory timeout forwarded to the insight service (not locally
    /// enforced; the fallback timer is the local bound)
    #[serde(default = "default_insight_timeout")]
    pub insight_timeout_secs: u32,

    /// Keep-loading toggle default: retry failures and refill on dismiss
    #[serde(default)]
    pub continuous: bool,

    /// Run the insight-seeded and default sub-cycles in parallel and show
    /// whichever is ready first
    #[serde(default)]
    pub dual_mode: bool,

    /// Present immediately once loaded (banner behaviour)
    #[serde(default)]
    pub present_on_load: bool,
}

fn default_fallback_delay() -> u64 {
    DEFAULT_FALLBACK_DELAY_SECS
}

fn default_insight_timeout() -> u32 {
    5
}

impl AdFormatConfig {
    pub fn banner_default() -> Self {
        Self {
            default_ad_unit_id: "demo-banner-unit".into(),
            fallback_delay_secs: DEFAULT_FALLBACK_DELAY_SECS,
            insight_timeout_secs: 5,
            continuous: false,
            dual_mode: false,
            present_on_load: true,
        }
    }

    pub fn interstitial_default() -> Self {
        Self {
            default_ad_unit_id: "demo-interstitial-unit".into(),
            fallback_delay_secs: DEFAULT_FALLBACK_DELAY_SECS,
            insight_timeout_secs: 5,
            continuous: false,
            dual_mode: false,
            present_on_load: false,
        }
    }

    pub fn rewarded_default() -> Self {
        Self {
            default_ad_unit_id: "demo-rewarded-unit".into(),
            fallback_delay_secs: DEFAULT_FALLBACK_DELAY_SECS,
            insight_timeout_secs: 5,
            continuous: false,
            dual_mode: false,
            present_on_load: false,
        }
    }

    pub fn fallback_delay(&self) -> Duration {
        Duration::from_secs(self.fallback_delay_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply env overrides
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus env overrides, used when no config file is given
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(app_id) = env::var("ADMEDIATE_APP_ID") {
            self.app_id = app_id;
        }
        if let Some(port) = env::var("ADMEDIATE_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
        {
            self.listen_port = port;
        }
        if let Ok(endpoint) = env::var("ADMEDIATE_INSIGHT_ENDPOINT") {
            if !endpoint.is_empty() {
                self.insight_endpoint = Some(endpoint);
            }
        }
        if let Ok(root) = env::var("ADMEDIATE_OVERRIDE_ROOT") {
            if !root.is_empty() {
                self.override_root = Some(root);
            }
        }
    }
}
