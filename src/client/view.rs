//! Client-side view of the dashboard state, fed by push messages and REST
//! backfill after a reconnect.

use crate::models::{Chain, GasSample, WsServerEvent};
use crate::simulator::{self, ChainCost, SimulationInput};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use tracing::warn;

/// What a push message changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Initial { chains: usize },
    Sample(Chain),
    Price(f64),
    Ignored(String),
}

pub struct DashboardView {
    latest: BTreeMap<Chain, GasSample>,
    history: BTreeMap<Chain, VecDeque<GasSample>>,
    quote_price: Option<f64>,
    history_cap: usize,
    last_update: Option<DateTime<Utc>>,
}

impl DashboardView {
    pub fn new(history_cap: usize) -> Self {
        Self {
            latest: BTreeMap::new(),
            history: BTreeMap::new(),
            quote_price: None,
            history_cap: history_cap.max(1),
            last_update: None,
        }
    }

    /// Decode and apply one text frame. Unknown message kinds are ignored
    /// with a warning.
    pub fn apply_text(&mut self, text: &str) -> Result<Applied> {
        let raw: Value = serde_json::from_str(text).context("push message is not JSON")?;
        let kind = raw
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();

        if !matches!(kind.as_str(), "initialData" | "sampleUpdate" | "priceUpdate") {
            warn!(kind = %kind, "Unknown message type");
            return Ok(Applied::Ignored(kind));
        }

        let event: WsServerEvent = serde_json::from_value(raw)
            .with_context(|| format!("malformed {kind} message"))?;
        Ok(self.apply(event))
    }

    pub fn apply(&mut self, event: WsServerEvent) -> Applied {
        self.last_update = Some(Utc::now());
        match event {
            WsServerEvent::InitialData(data) => {
                let chains = data.samples.len();
                for sample in data.samples {
                    self.record(sample);
                }
                self.quote_price = Some(data.quote_price);
                Applied::Initial { chains }
            }
            WsServerEvent::SampleUpdate(update) => {
                let chain = update.sample.chain;
                self.record(update.sample);
                Applied::Sample(chain)
            }
            WsServerEvent::PriceUpdate(update) => {
                self.quote_price = Some(update.price);
                Applied::Price(update.price)
            }
        }
    }

    fn record(&mut self, sample: GasSample) {
        let chain = sample.chain;
        let is_newer = self
            .latest
            .get(&chain)
            .map_or(true, |cur| sample.timestamp >= cur.timestamp);
        if is_newer {
            self.latest.insert(chain, sample.clone());
        }
        self.merge_history(chain, vec![sample]);
    }

    /// Merge samples into a chain's history, keeping it sorted, free of
    /// duplicate timestamps and within the cap.
    pub fn merge_history(&mut self, chain: Chain, samples: Vec<GasSample>) -> usize {
        let cap = self.history_cap;
        let history = self.history.entry(chain).or_default();
        let mut added = 0;

        for sample in samples.into_iter().filter(|s| s.chain == chain) {
            let pos = history.partition_point(|h| h.timestamp < sample.timestamp);
            if history.get(pos).is_some_and(|h| h.timestamp == sample.timestamp) {
                continue;
            }
            history.insert(pos, sample);
            added += 1;
        }
        while history.len() > cap {
            history.pop_front();
        }

        if let Some(newest) = history.back().cloned() {
            let stale = self
                .latest
                .get(&chain)
                .map_or(true, |cur| cur.timestamp < newest.timestamp);
            if stale {
                self.latest.insert(chain, newest);
            }
        }
        added
    }

    pub fn latest(&self, chain: Chain) -> Option<&GasSample> {
        self.latest.get(&chain)
    }

    pub fn history(&self, chain: Chain) -> Vec<GasSample> {
        self.history
            .get(&chain)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn quote_price(&self) -> Option<f64> {
        self.quote_price
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// USD cost of a plain transfer on `chain` at current fees.
    pub fn transfer_cost(&self, chain: Chain) -> Option<ChainCost> {
        let sample = self.latest.get(&chain)?;
        let price = self.quote_price?;
        let input = SimulationInput {
            value: 1.0,
            gas_limit: sample.gas_limit,
        };
        simulator::simulate(input, std::slice::from_ref(sample), price)
            .remove(&chain)
    }
}
