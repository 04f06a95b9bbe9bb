//! Configuration loading and representation.
//!
//! - [`Settings`]: process settings from environment variables.
//! - [`ConfigProvider`] / [`TokenProvider`]: externally managed business
//!   config and the rotating WFM access token, re-read on every use.

pub mod provider;
pub mod settings;

pub use provider::{
    AppConfig, ConfigProvider, CredentialError, FileConfigProvider, FileTokenProvider,
    StaticConfigProvider, StaticTokenProvider, TokenProvider,
};
pub use settings::{ConfigError, Settings};
