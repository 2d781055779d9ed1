//! Transaction cost simulator.
//!
//! Pure function of the latest gas samples and quote price:
//! `fee = (base + priority) * gas_limit` gwei, `/ 1e9` for the native unit,
//! `* quote` for USD.

use crate::models::{Chain, GasSample, TransactionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const GWEI_PER_NATIVE: f64 = 1e9;

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("value is required")]
    MissingValue,
    #[error("value must be a positive number")]
    InvalidValue,
    #[error("gasLimit is required")]
    MissingGasLimit,
    #[error("gasLimit must be a positive integer")]
    InvalidGasLimit,
}

/// Request body for `/api/simulate-transaction`. Fields are optional at the
/// serde level so that missing inputs surface as validation errors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub value: Option<f64>,
    pub gas_limit: Option<f64>,
    pub tx_type: Option<TransactionType>,
}

/// Validated simulator inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationInput {
    pub value: f64,
    pub gas_limit: u64,
}

impl SimulationRequest {
    pub fn validate(&self) -> Result<SimulationInput, SimulationError> {
        let value = self.value.ok_or(SimulationError::MissingValue)?;
        if !value.is_finite() || value <= 0.0 {
            return Err(SimulationError::InvalidValue);
        }

        let gas_limit = match (self.gas_limit, self.tx_type) {
            (Some(limit), _) => limit,
            (None, Some(tx)) => tx.gas_limit() as f64,
            (None, None) => return Err(SimulationError::MissingGasLimit),
        };
        if !gas_limit.is_finite() || gas_limit <= 0.0 || gas_limit.fract() != 0.0 {
            return Err(SimulationError::InvalidGasLimit);
        }
        if gas_limit > u64::MAX as f64 {
            return Err(SimulationError::InvalidGasLimit);
        }

        Ok(SimulationInput {
            value,
            gas_limit: gas_limit as u64,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainCost {
    /// Total fee in gwei.
    pub fee_cost: f64,
    pub cost_in_native_unit: f64,
    pub cost_in_quote_currency: f64,
}

pub fn chain_cost(sample: &GasSample, gas_limit: u64, quote_price: f64) -> ChainCost {
    let fee_cost = sample.total_fee() * gas_limit as f64;
    let cost_in_native_unit = fee_cost / GWEI_PER_NATIVE;
    ChainCost {
        fee_cost,
        cost_in_native_unit,
        cost_in_quote_currency: cost_in_native_unit * quote_price,
    }
}

/// Cost of the transaction on every chain that has a latest sample.
pub fn simulate(
    input: SimulationInput,
    latest: &[GasSample],
    quote_price: f64,
) -> BTreeMap<Chain, ChainCost> {
    latest
        .iter()
        .map(|s| (s.chain, chain_cost(s, input.gas_limit, quote_price)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(chain: Chain, base_fee: f64, priority_fee: f64) -> GasSample {
        GasSample {
            chain,
            base_fee,
            priority_fee,
            gas_limit: 21_000,
            timestamp: Utc::now(),
        }
    }

    fn request(value: Option<f64>, gas_limit: Option<f64>) -> SimulationRequest {
        SimulationRequest {
            value,
            gas_limit,
            tx_type: None,
        }
    }

    #[test]
    fn test_reference_simulation() {
        let input = request(Some(1.0), Some(21_000.0)).validate().unwrap();
        let result = simulate(input, &[sample(Chain::Ethereum, 20.0, 2.0)], 3000.0);
        let cost = result[&Chain::Ethereum];

        assert_eq!(cost.fee_cost, 462_000.0);
        assert!((cost.cost_in_native_unit - 0.000462).abs() < 1e-12);
        assert!((cost.cost_in_quote_currency - 1.386).abs() < 1e-9);
    }

    #[test]
    fn test_simulation_covers_only_sampled_chains() {
        let input = SimulationInput {
            value: 1.0,
            gas_limit: 65_000,
        };
        let latest = [
            sample(Chain::Polygon, 50.0, 30.0),
            sample(Chain::Arbitrum, 0.1, 0.01),
        ];
        let result = simulate(input, &latest, 2500.0);
        assert_eq!(result.len(), 2);
        assert!(!result.contains_key(&Chain::Ethereum));
        assert!(result[&Chain::Arbitrum].fee_cost < result[&Chain::Polygon].fee_cost);
        assert!(simulate(input, &[], 2500.0).is_empty());
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(request(None, Some(21_000.0)).validate(), Err(SimulationError::MissingValue));
        assert_eq!(request(Some(0.0), Some(21_000.0)).validate(), Err(SimulationError::InvalidValue));
        assert_eq!(request(Some(-1.0), Some(21_000.0)).validate(), Err(SimulationError::InvalidValue));
        assert_eq!(request(Some(1.0), None).validate(), Err(SimulationError::MissingGasLimit));
        assert_eq!(request(Some(1.0), Some(0.0)).validate(), Err(SimulationError::InvalidGasLimit));
        assert_eq!(request(Some(1.0), Some(2.5)).validate(), Err(SimulationError::InvalidGasLimit));
        assert_eq!(
            request(Some(f64::NAN), Some(21_000.0)).validate(),
            Err(SimulationError::InvalidValue)
        );
    }

    #[test]
    fn test_tx_type_supplies_gas_limit() {
        let req = SimulationRequest {
            value: Some(0.5),
            gas_limit: None,
            tx_type: Some(TransactionType::Swap),
        };
        assert_eq!(req.validate().unwrap().gas_limit, 150_000);

        let explicit = SimulationRequest {
            gas_limit: Some(30_000.0),
            ..req
        };
        assert_eq!(explicit.validate().unwrap().gas_limit, 30_000);
    }
}
