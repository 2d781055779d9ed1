//! Live RPC gas source.
//!
//! Placeholder for a collector that reads base fees from chain RPC
//! endpoints. It is disabled: every call to `sample` fails, and the
//! generator logs and skips the tick like any other source failure.

use super::SampleSource;
use crate::models::{Chain, Sample, SeriesId};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::env;

pub struct RpcGasSource {
    endpoints: BTreeMap<Chain, String>,
}

impl RpcGasSource {
    pub fn new(endpoints: BTreeMap<Chain, String>) -> Self {
        Self { endpoints }
    }

    /// Reads `ETHEREUM_RPC_URL`, `POLYGON_RPC_URL` and `ARBITRUM_RPC_URL`.
    pub fn from_env() -> Self {
        let endpoints = Chain::ALL
            .iter()
            .filter_map(|chain| {
                let var = format!("{}_RPC_URL", chain.as_str().to_uppercase());
                env::var(var)
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .map(|url| (*chain, url))
            })
            .collect();
        Self::new(endpoints)
    }

    pub fn endpoints(&self) -> &BTreeMap<Chain, String> {
        &self.endpoints
    }

    pub fn is_enabled(&self) -> bool {
        false
    }
}

#[async_trait]
impl SampleSource for RpcGasSource {
    fn name(&self) -> &'static str {
        "rpc-gas"
    }

    fn series(&self) -> Vec<SeriesId> {
        Chain::ALL.iter().map(|c| SeriesId::Gas(*c)).collect()
    }

    async fn sample(&self) -> Result<Vec<Sample>> {
        bail!(
            "live RPC gas sampling is disabled ({} endpoint(s) configured)",
            self.endpoints.len()
        )
    }
}
