//! Service configuration
//!
//! Defaults, optionally overlaid by a TOML file (`GASWATCH_CONFIG`), then by
//! individual environment variables.

use crate::fanout::DEFAULT_SUBSCRIBER_QUEUE;
use crate::feeds::PriceWalkConfig;
use crate::storage::DEFAULT_RETENTION;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasSourceKind {
    #[default]
    Synthetic,
    Rpc,
}

impl std::str::FromStr for GasSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "synthetic" | "sim" => Ok(GasSourceKind::Synthetic),
            "rpc" | "live" => Ok(GasSourceKind::Rpc),
            other => Err(format!("unknown gas source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Gas generator cadence (seconds)
    #[serde(default = "default_gas_poll_secs")]
    pub gas_poll_secs: u64,

    /// Price generator cadence (seconds)
    #[serde(default = "default_price_poll_secs")]
    pub price_poll_secs: u64,

    /// Samples kept per series
    #[serde(default = "default_retention")]
    pub retention_cap: usize,

    /// Pending events a subscriber may buffer before it is dropped
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,

    /// Upper bound on one WebSocket send
    #[serde(default = "default_ws_send_timeout_ms")]
    pub ws_send_timeout_ms: u64,

    /// Quote used before the first price tick
    #[serde(default = "default_fallback_eth_price")]
    pub fallback_eth_price: f64,

    #[serde(default)]
    pub gas_source: GasSourceKind,

    #[serde(default)]
    pub gas_seed: Option<u64>,

    #[serde(default)]
    pub price_seed: Option<u64>,

    #[serde(default)]
    pub price_walk: PriceWalkConfig,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_gas_poll_secs() -> u64 {
    15
}

fn default_price_poll_secs() -> u64 {
    30
}

fn default_retention() -> usize {
    DEFAULT_RETENTION
}

fn default_subscriber_queue() -> usize {
    DEFAULT_SUBSCRIBER_QUEUE
}

fn default_ws_send_timeout_ms() -> u64 {
    2_000
}

fn default_fallback_eth_price() -> f64 {
    2500.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            gas_poll_secs: default_gas_poll_secs(),
            price_poll_secs: default_price_poll_secs(),
            retention_cap: default_retention(),
            subscriber_queue: default_subscriber_queue(),
            ws_send_timeout_ms: default_ws_send_timeout_ms(),
            fallback_eth_price: default_fallback_eth_price(),
            gas_source: GasSourceKind::default(),
            gas_seed: None,
            price_seed: None,
            price_walk: PriceWalkConfig::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<T>().ok())
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// File named by `GASWATCH_CONFIG` (if any), then env overrides, then validation.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("GASWATCH_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim())?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from `lookup`. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("GASWATCH_BIND").filter(|v| !v.trim().is_empty()) {
            self.bind = bind.trim().to_string();
        }
        if let Some(v) = parse_var::<u64>(&lookup, "GAS_POLL_SECS").filter(|&v| v > 0) {
            self.gas_poll_secs = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "PRICE_POLL_SECS").filter(|&v| v > 0) {
            self.price_poll_secs = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "RETENTION_CAP").filter(|&v| v > 0) {
            self.retention_cap = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "SUBSCRIBER_QUEUE").filter(|&v| v > 0) {
            self.subscriber_queue = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "WS_SEND_TIMEOUT_MS").filter(|&v| v > 0) {
            self.ws_send_timeout_ms = v;
        }
        if let Some(v) = parse_var::<f64>(&lookup, "FALLBACK_ETH_PRICE").filter(|v| *v > 0.0) {
            self.fallback_eth_price = v;
        }
        if let Some(v) = parse_var::<GasSourceKind>(&lookup, "GAS_SOURCE") {
            self.gas_source = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "GAS_SEED") {
            self.gas_seed = Some(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "PRICE_SEED") {
            self.price_seed = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gas_poll_secs == 0 || self.price_poll_secs == 0 {
            bail!("generator cadences must be at least one second");
        }
        if self.retention_cap == 0 {
            bail!("retention_cap must be positive");
        }
        if !(self.fallback_eth_price.is_finite() && self.fallback_eth_price > 0.0) {
            bail!("fallback_eth_price must be a positive number");
        }
        let walk = &self.price_walk;
        if !(walk.floor.is_finite() && walk.ceiling.is_finite()) || walk.floor > walk.ceiling {
            bail!(
                "price_walk floor {} must not exceed ceiling {}",
                walk.floor,
                walk.ceiling
            );
        }
        if !(walk.center.is_finite() && walk.max_step.is_finite() && walk.max_step >= 0.0) {
            bail!("price_walk center and max_step must be finite, max_step non-negative");
        }
        Ok(())
    }

    pub fn gas_period(&self) -> Duration {
        Duration::from_secs(self.gas_poll_secs)
    }

    pub fn price_period(&self) -> Duration {
        Duration::from_secs(self.price_poll_secs)
    }

    pub fn ws_send_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_send_timeout_ms)
    }
}
