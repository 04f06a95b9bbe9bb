use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Externally managed business configuration (one JSON document).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// WFM client new jobs are filed under when the request names none.
    pub wfm_client_id: Option<String>,
    pub default_category: Option<String>,
    /// Prepended to job names sent to WFM.
    pub job_name_prefix: String,
    /// Reorder level assumed for items whose file row leaves it blank.
    pub low_stock_default: Option<i64>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential missing: {0}")]
    Missing(String),

    #[error("credential source unreadable: {0}")]
    Unreadable(String),

    #[error("credential malformed: {0}")]
    Malformed(String),
}

/// Read-only access to the business configuration.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn app_config(&self) -> Result<AppConfig, CredentialError>;
}

/// Read-only access to the current WFM access token.
///
/// The token is rotated out-of-band; implementations return whatever value
/// is current at call time and never refresh it themselves.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn current_token(&self) -> Result<String, CredentialError>;
}

#[derive(Debug, Default)]
pub struct StaticConfigProvider {
    config: AppConfig,
}

impl StaticConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn app_config(&self) -> Result<AppConfig, CredentialError> {
        Ok(self.config.clone())
    }
}

/// Re-reads the JSON document from disk on every call.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn app_config(&self) -> Result<AppConfig, CredentialError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CredentialError::Unreadable(format!("{}: {e}", self.path.display())))?;
        serde_json::from_slice(&raw)
            .map_err(|e| CredentialError::Malformed(format!("{}: {e}", self.path.display())))
    }
}

/// In-process token; `rotate` swaps it (tests, or a value injected from the environment).
#[derive(Debug)]
pub struct StaticTokenProvider {
    token: RwLock<Option<String>>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn empty() -> Self {
        Self {
            token: RwLock::new(None),
        }
    }

    pub fn rotate(&self, token: impl Into<String>) {
        if let Ok(mut t) = self.token.write() {
            *t = Some(token.into());
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn current_token(&self) -> Result<String, CredentialError> {
        let token = self
            .token
            .read()
            .map_err(|_| CredentialError::Unreadable("token lock poisoned".to_string()))?;
        token
            .clone()
            .ok_or_else(|| CredentialError::Missing("WFM access token".to_string()))
    }
}

/// Token stored in a file that an external rotator rewrites.
#[derive(Debug, Clone)]
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn current_token(&self) -> Result<String, CredentialError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CredentialError::Unreadable(format!("{}: {e}", self.path.display())))?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(CredentialError::Missing(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CredentialError::Malformed(
                "token contains whitespace".to_string(),
            ));
        }
        Ok(token.to_string())
    }
}
