use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::blob::validate_bucket;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_UPLOAD_BUCKET: &str = "inventory-uploads";
pub const DEFAULT_TEMPLATE_BUCKET: &str = "template-uploads";
pub const DEFAULT_WFM_BASE_URL: &str = "https://api.workflowmax.com/v2/";
const DEV_SIGNING_SECRET: &str = "stockyard-dev-signing-secret";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("upload and template pipelines are both wired to bucket '{0}'")]
    CrossWiredBuckets(String),
}

/// Process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub public_base_url: String,
    /// `None` selects the in-memory keyed store.
    pub database_url: Option<String>,
    /// `None` selects the in-memory blob store.
    pub blob_root: Option<PathBuf>,
    pub upload_bucket: String,
    pub template_bucket: String,
    pub upload_signing_secret: String,
    pub upload_url_ttl: Duration,
    pub app_config_path: Option<PathBuf>,
    pub wfm_base_url: String,
    pub wfm_account_id: String,
    pub wfm_token_path: Option<PathBuf>,
    pub wfm_token: Option<String>,
    pub ingest_budget: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            database_url: None,
            blob_root: None,
            upload_bucket: DEFAULT_UPLOAD_BUCKET.to_string(),
            template_bucket: DEFAULT_TEMPLATE_BUCKET.to_string(),
            upload_signing_secret: DEV_SIGNING_SECRET.to_string(),
            upload_url_ttl: Duration::from_secs(900),
            app_config_path: None,
            wfm_base_url: DEFAULT_WFM_BASE_URL.to_string(),
            wfm_account_id: String::new(),
            wfm_token_path: None,
            wfm_token: None,
            ingest_budget: Duration::from_secs(300),
        }
    }
}

impl Settings {
    /// Read settings from the process environment and validate them.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup` (variable name -> value) and validate them.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let bind_addr = match var("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                var: "BIND_ADDR",
                message: format!("{raw:?}: {e}"),
            })?,
            None => defaults.bind_addr,
        };

        let upload_signing_secret = match var("UPLOAD_SIGNING_SECRET") {
            Some(s) => s,
            None => {
                warn!("UPLOAD_SIGNING_SECRET not set; using the development default");
                defaults.upload_signing_secret
            }
        };

        let settings = Self {
            bind_addr,
            public_base_url: var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            database_url: var("DATABASE_URL"),
            blob_root: var("BLOB_ROOT").map(PathBuf::from),
            upload_bucket: var("UPLOAD_BUCKET").unwrap_or(defaults.upload_bucket),
            template_bucket: var("TEMPLATE_BUCKET").unwrap_or(defaults.template_bucket),
            upload_signing_secret,
            upload_url_ttl: secs(var("UPLOAD_URL_TTL_SECS"), "UPLOAD_URL_TTL_SECS", defaults.upload_url_ttl)?,
            app_config_path: var("APP_CONFIG_PATH").map(PathBuf::from),
            wfm_base_url: var("WFM_BASE_URL").unwrap_or(defaults.wfm_base_url),
            wfm_account_id: var("WFM_ACCOUNT_ID").unwrap_or_default(),
            wfm_token_path: var("WFM_TOKEN_PATH").map(PathBuf::from),
            wfm_token: var("WFM_TOKEN"),
            ingest_budget: secs(var("INGEST_BUDGET_SECS"), "INGEST_BUDGET_SECS", defaults.ingest_budget)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (var, bucket) in [
            ("UPLOAD_BUCKET", &self.upload_bucket),
            ("TEMPLATE_BUCKET", &self.template_bucket),
        ] {
            validate_bucket(bucket).map_err(|e| ConfigError::Invalid {
                var,
                message: e.to_string(),
            })?;
        }
        if self.upload_bucket == self.template_bucket {
            return Err(ConfigError::CrossWiredBuckets(self.upload_bucket.clone()));
        }
        if self.upload_url_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                var: "UPLOAD_URL_TTL_SECS",
                message: "must be positive".to_string(),
            });
        }
        if self.ingest_budget.is_zero() {
            return Err(ConfigError::Invalid {
                var: "INGEST_BUDGET_SECS",
                message: "must be positive".to_string(),
            });
        }
        if !(self.public_base_url.starts_with("http://") || self.public_base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "PUBLIC_BASE_URL",
                message: format!("{:?} is not an http(s) url", self.public_base_url),
            });
        }
        Ok(())
    }
}

fn secs(raw: Option<String>, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match raw {
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid {
                var,
                message: format!("{raw:?}: {e}"),
            }),
        None => Ok(default),
    }
}
