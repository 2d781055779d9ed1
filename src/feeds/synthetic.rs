//! Synthetic gas and ETH/USD sources.
//!
//! Stand-ins for live collectors. Each chain draws its fees from its own
//! magnitude band; the quote follows a mean-reverting walk clamped to a hard
//! floor and ceiling.

use super::SampleSource;
use crate::models::{Chain, GasSample, PriceSample, Sample, SeriesId, TRANSFER_GAS_LIMIT};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Uniform fee ranges in gwei, `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeBand {
    pub base_min: f64,
    pub base_max: f64,
    pub priority_min: f64,
    pub priority_max: f64,
}

impl FeeBand {
    pub fn for_chain(chain: Chain) -> Self {
        match chain {
            Chain::Ethereum => Self {
                base_min: 15.0,
                base_max: 65.0,
                priority_min: 1.0,
                priority_max: 6.0,
            },
            Chain::Polygon => Self {
                base_min: 20.0,
                base_max: 120.0,
                priority_min: 30.0,
                priority_max: 50.0,
            },
            Chain::Arbitrum => Self {
                base_min: 0.1,
                base_max: 0.6,
                priority_min: 0.01,
                priority_max: 0.11,
            },
        }
    }

    pub fn contains(&self, sample: &GasSample) -> bool {
        (self.base_min..self.base_max).contains(&sample.base_fee)
            && (self.priority_min..self.priority_max).contains(&sample.priority_fee)
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

pub struct SyntheticGasSource {
    chains: Vec<(Chain, FeeBand)>,
    rng: Mutex<ChaCha8Rng>,
}

impl SyntheticGasSource {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            chains: Chain::ALL
                .iter()
                .map(|c| (*c, FeeBand::for_chain(*c)))
                .collect(),
            rng: Mutex::new(seeded_rng(seed)),
        }
    }

    /// One synthetic sample per chain, all stamped with the same instant.
    pub fn generate(&self) -> Vec<GasSample> {
        let now = Utc::now();
        let mut rng = self.rng.lock();
        self.chains
            .iter()
            .map(|(chain, band)| GasSample {
                chain: *chain,
                base_fee: rng.gen_range(band.base_min..band.base_max),
                priority_fee: rng.gen_range(band.priority_min..band.priority_max),
                gas_limit: TRANSFER_GAS_LIMIT,
                timestamp: now,
            })
            .collect()
    }
}

#[async_trait]
impl SampleSource for SyntheticGasSource {
    fn name(&self) -> &'static str {
        "synthetic-gas"
    }

    fn series(&self) -> Vec<SeriesId> {
        self.chains.iter().map(|(c, _)| SeriesId::Gas(*c)).collect()
    }

    async fn sample(&self) -> Result<Vec<Sample>> {
        Ok(self.generate().into_iter().map(Sample::Gas).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceWalkConfig {
    pub center: f64,
    /// Largest random move per tick, in USD.
    pub max_step: f64,
    /// Fraction of the distance to `center` recovered per tick.
    pub reversion: f64,
    pub floor: f64,
    pub ceiling: f64,
}

impl Default for PriceWalkConfig {
    fn default() -> Self {
        Self {
            center: 3000.0,
            max_step: 50.0,
            reversion: 0.05,
            floor: 1000.0,
            ceiling: 6000.0,
        }
    }
}

struct WalkState {
    rng: ChaCha8Rng,
    last: Option<f64>,
}

pub struct SyntheticPriceSource {
    config: PriceWalkConfig,
    state: Mutex<WalkState>,
}

impl SyntheticPriceSource {
    pub fn new(config: PriceWalkConfig, seed: Option<u64>) -> Self {
        Self {
            config,
            state: Mutex::new(WalkState {
                rng: seeded_rng(seed),
                last: None,
            }),
        }
    }

    pub fn config(&self) -> &PriceWalkConfig {
        &self.config
    }

    /// Next point of the walk. The first call returns the clamped center.
    pub fn next_price(&self) -> f64 {
        let cfg = &self.config;
        let mut state = self.state.lock();
        let last = state.last;
        let next = match last {
            None => cfg.center,
            Some(prev) => {
                let step = if cfg.max_step > 0.0 {
                    state.rng.gen_range(-cfg.max_step..=cfg.max_step)
                } else {
                    0.0
                };
                prev + cfg.reversion * (cfg.center - prev) + step
            }
        };
        let next = next.clamp(cfg.floor, cfg.ceiling);
        state.last = Some(next);
        next
    }
}

#[async_trait]
impl SampleSource for SyntheticPriceSource {
    fn name(&self) -> &'static str {
        "synthetic-eth-usd"
    }

    fn series(&self) -> Vec<SeriesId> {
        vec![SeriesId::EthUsd]
    }

    async fn sample(&self) -> Result<Vec<Sample>> {
        Ok(vec![Sample::Price(PriceSample {
            price: self.next_price(),
            timestamp: Utc::now(),
        })])
    }
}
