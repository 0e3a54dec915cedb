//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the marketplace auth token) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub marketplace: MarketplaceConfig,
    pub release: ReleaseConfig,
    /// Products to start monitoring at boot. May be empty.
    #[serde(default)]
    pub products: Vec<ProductConfig>,
}

/// Polling and retry parameters shared by every monitor.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct MonitorConfig {
    /// Delay between poll iterations, in milliseconds.
    pub poll_interval_ms: u64,
    /// Bounded-retry budget after a failed poll iteration.
    pub max_retries: u32,
    /// Constant delay between bounded retries, in milliseconds.
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketplaceConfig {
    pub base_url: String,
    /// Env var holding the auth token (e.g. `DEALHAWK_TOKEN`).
    pub token_env: String,
    /// Storefront short name sent with order/payment calls.
    pub short_name: String,
    pub dev_type: u32,
    pub platform_id: u64,
    /// Internal HTTP retry budget (linearly increasing delay).
    #[serde(default = "default_http_attempts")]
    pub http_retry_attempts: u32,
    #[serde(default = "default_http_retry_delay_ms")]
    pub http_retry_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_http_attempts() -> u32 {
    3
}

fn default_http_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    10
}

/// Parameters for the phased pre-order release pipeline.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ReleaseConfig {
    /// Offset added to the archive's issue time when computing the
    /// auction end timestamp.
    pub delay_hours: i64,
}

/// A product registered at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct ProductConfig {
    pub name: String,
    pub target_price: Decimal,
    pub mode: ProductMode,
    /// Delivery address for buy modes; ignored by release modes.
    #[serde(default)]
    pub address_id: Option<u64>,
}

/// Which operation a configured product should run when its price
/// condition is met.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProductMode {
    BuySingle,
    BuyContinuous,
    ReleaseSingle,
    ReleaseTriple,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
