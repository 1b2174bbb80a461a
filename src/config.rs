//! Configuration loader and validator for the order desk.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub steadfast: Steadfast,
    pub fraud: Fraud,
    pub shop: Shop,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_balance_cache_seconds")]
    pub balance_cache_seconds: u64,
    #[serde(default = "default_invoice_dir")]
    pub invoice_dir: String,
}

fn default_page_size() -> u32 {
    10
}

fn default_balance_cache_seconds() -> u64 {
    300
}

fn default_invoice_dir() -> String {
    "./invoices".into()
}

/// Courier gateway credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Steadfast {
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
}

/// Phone-reputation lookup endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fraud {
    pub url: String,
    pub api_key: String,
}

/// Shop details printed on invoices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shop {
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    pub phone: String,
}

impl App {
    /// `data_dir` with a leading `~/` expanded.
    pub fn resolved_data_dir(&self) -> String {
        expand_home(&self.data_dir)
    }

    pub fn resolved_invoice_dir(&self) -> String {
        expand_home(&self.invoice_dir)
    }
}

fn expand_home(p: &str) -> String {
    match (p.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => p.to_string(),
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        let dir = self.app.resolved_data_dir();
        if dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(dir)
    }

    /// `sqlite://` URL of the order store, unless `DATABASE_URL` overrides it.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/orderdesk.db", self.app.resolved_data_dir()))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.page_size == 0 {
        return Err(ConfigError::Invalid("app.page_size must be > 0"));
    }
    if cfg.app.balance_cache_seconds == 0 {
        return Err(ConfigError::Invalid("app.balance_cache_seconds must be > 0"));
    }

    if cfg.steadfast.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("steadfast.base_url must be non-empty"));
    }
    if reqwest::Url::parse(cfg.steadfast.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("steadfast.base_url must be an absolute URL"));
    }
    if cfg.steadfast.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("steadfast.api_key must be non-empty"));
    }
    if cfg.steadfast.secret_key.trim().is_empty() {
        return Err(ConfigError::Invalid("steadfast.secret_key must be non-empty"));
    }

    if cfg.fraud.url.trim().is_empty() {
        return Err(ConfigError::Invalid("fraud.url must be non-empty"));
    }
    if cfg.fraud.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("fraud.api_key must be non-empty"));
    }

    if cfg.shop.name.trim().is_empty() {
        return Err(ConfigError::Invalid("shop.name must be non-empty"));
    }

    Ok(())
}

/// Example configuration, also used as the test fixture.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  page_size: 10
  balance_cache_seconds: 300
  invoice_dir: "./invoices"

steadfast:
  base_url: "https://portal.packzy.com/api/v1"
  api_key: "YOUR_STEADFAST_API_KEY"
  secret_key: "YOUR_STEADFAST_SECRET_KEY"

fraud:
  url: "https://bdcourier.com/api/courier-check"
  api_key: "YOUR_FRAUD_API_KEY"

shop:
  name: "Dreamer Shop"
  tagline: "Your Trusted Online Store"
  phone: "01810-308171"
"#
}
