use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to parse JSON config: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("missing required secret: {0}")]
    MissingSecret(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level config document.
///
/// Section names follow the TOML layout (`[app]`, `[alerts]`, `[chains.<name>]`)
/// but the legacy `config.json` keys (`app_config`, `alerts_config`,
/// `chain_config`) are accepted too.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default, alias = "app_config")]
    pub app: AppConfig,
    #[serde(default, alias = "alerts_config")]
    pub alerts: AlertsConfig,
    #[serde(default, alias = "chain_config")]
    pub chains: BTreeMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path of the JSON vote store.
    #[serde(default = "default_votes_file")]
    pub votes_file: String,
    /// Sleep between cycles, in minutes.
    #[serde(default = "default_interval_minutes", alias = "timeout")]
    pub interval_minutes: u64,
    /// Page size used when a chain has no `pagination_limit` of its own.
    #[serde(default = "default_pagination_limit")]
    pub default_pagination_limit: u32,
    /// Timeout for each upstream governance API request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Timeout for each PagerDuty / Discord delivery.
    #[serde(default = "default_alert_timeout")]
    pub alert_timeout_secs: u64,
    /// Hard cap on pages fetched per chain per cycle.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// `json` or `text`.
    #[serde(default = "default_log_format", alias = "logformat")]
    pub log_format: String,
    #[serde(default = "default_log_level", alias = "loglevel")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_bind_addr")]
    pub metrics_bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub pagerduty_enabled: bool,
    /// PagerDuty routing key - may be loaded from env PAGERDUTY_INTEGRATION_KEY
    #[serde(default)]
    pub pagerduty_integration_key: String,
    #[serde(default = "default_pagerduty_endpoint")]
    pub pagerduty_endpoint: String,
    #[serde(default)]
    pub discord_enabled: bool,
    /// Discord webhook - may be loaded from env DISCORD_WEBHOOK_URL
    #[serde(default)]
    pub discord_webhook_url: String,
}

/// Static per-chain settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChainConfig {
    /// Network label used in alerts and metrics, e.g. "mainnet".
    pub network: String,
    /// Proposal listing endpoint (v1 or v1beta1 gov API).
    pub api_endpoint: String,
    /// Explorer base URL for governance proposals. A `{vote_id}`
    /// placeholder is substituted when present, otherwise the id is
    /// appended as a path segment. Required; checked in `validate`.
    #[serde(default)]
    pub explorer_governance: String,
    #[serde(default)]
    pub pagination_limit: Option<u32>,
}

impl ChainConfig {
    pub fn page_limit(&self, default_limit: u32) -> u32 {
        self.pagination_limit.unwrap_or(default_limit)
    }

    /// Deep link to a proposal on the chain explorer.
    pub fn explorer_link(&self, vote_id: &str) -> String {
        if self.explorer_governance.contains("{vote_id}") {
            self.explorer_governance.replace("{vote_id}", vote_id)
        } else {
            format!(
                "{}/{}",
                self.explorer_governance.trim_end_matches('/'),
                vote_id
            )
        }
    }
}

fn default_votes_file() -> String {
    "votes.json".to_string()
}
fn default_interval_minutes() -> u64 {
    5
}
fn default_pagination_limit() -> u32 {
    100
}
fn default_request_timeout() -> u64 {
    30
}
fn default_alert_timeout() -> u64 {
    10
}
fn default_max_pages() -> u32 {
    100
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_metrics_bind_addr() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_pagerduty_endpoint() -> String {
    "https://events.pagerduty.com/v2/enqueue".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            votes_file: default_votes_file(),
            interval_minutes: default_interval_minutes(),
            default_pagination_limit: default_pagination_limit(),
            request_timeout_secs: default_request_timeout(),
            alert_timeout_secs: default_alert_timeout(),
            max_pages: default_max_pages(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
            metrics_bind_addr: default_metrics_bind_addr(),
        }
    }
}

impl AppConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            pagerduty_enabled: false,
            pagerduty_integration_key: String::new(),
            pagerduty_endpoint: default_pagerduty_endpoint(),
            discord_enabled: false,
            discord_webhook_url: String::new(),
        }
    }
}

impl Config {
    /// Load config from a TOML (or legacy JSON) file, then overlay
    /// environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        let mut config = if is_json {
            Self::from_json_str(&contents)?
        } else {
            Self::from_toml_str(&contents)?
        };

        // Override secrets from environment variables (never store in config file)
        if let Ok(key) = std::env::var("PAGERDUTY_INTEGRATION_KEY") {
            config.alerts.pagerduty_integration_key = key;
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            config.alerts.discord_webhook_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "app.interval_minutes must be greater than zero".to_string(),
            ));
        }
        if self.app.default_pagination_limit == 0 {
            return Err(ConfigError::Invalid(
                "app.default_pagination_limit must be greater than zero".to_string(),
            ));
        }
        if self.alerts.pagerduty_enabled && self.alerts.pagerduty_integration_key.is_empty() {
            return Err(ConfigError::MissingSecret(
                "PAGERDUTY_INTEGRATION_KEY".to_string(),
            ));
        }
        if self.alerts.discord_enabled && self.alerts.discord_webhook_url.is_empty() {
            return Err(ConfigError::MissingSecret("DISCORD_WEBHOOK_URL".to_string()));
        }
        for (name, chain) in &self.chains {
            if chain.api_endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "chain {} has an empty api_endpoint",
                    name
                )));
            }
            if chain.explorer_governance.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "chain {} has an empty explorer_governance",
                    name
                )));
            }
            if chain.pagination_limit == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "chain {} has pagination_limit = 0",
                    name
                )));
            }
        }
        Ok(())
    }
}
