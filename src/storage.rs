//! Bounded Time-Series Store
//!
//! In-memory rolling history per series. Each series keeps at most
//! `retention` samples; the oldest are evicted first. Nothing survives a restart.

use crate::models::{GasSample, PriceSample, Sample, SeriesId};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

pub const DEFAULT_RETENTION: usize = 1000;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("sample for series {actual} cannot be appended to series {expected}")]
    SeriesMismatch { expected: SeriesId, actual: SeriesId },
    #[error("sample at {timestamp} is older than latest {latest} in series {series}")]
    OutOfOrder {
        series: SeriesId,
        timestamp: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

pub struct SeriesStore {
    series: RwLock<HashMap<SeriesId, VecDeque<Sample>>>,
    retention: usize,
}

impl SeriesStore {
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        let series = SeriesId::ALL
            .iter()
            .map(|id| (*id, VecDeque::with_capacity(retention.min(4096))))
            .collect();
        Self {
            series: RwLock::new(series),
            retention,
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Append a sample, evicting the oldest entries once the cap is exceeded.
    pub fn append(&self, series: SeriesId, sample: Sample) -> Result<(), StoreError> {
        let actual = sample.series_id();
        if actual != series {
            return Err(StoreError::SeriesMismatch {
                expected: series,
                actual,
            });
        }

        let mut guard = self.series.write();
        let log = guard.entry(series).or_default();

        if let Some(last) = log.back() {
            if sample.timestamp() < last.timestamp() {
                return Err(StoreError::OutOfOrder {
                    series,
                    timestamp: sample.timestamp(),
                    latest: last.timestamp(),
                });
            }
        }

        log.push_back(sample);
        while log.len() > self.retention {
            log.pop_front();
        }
        Ok(())
    }

    pub fn latest(&self, series: SeriesId) -> Option<Sample> {
        self.series.read().get(&series).and_then(|s| s.back().cloned())
    }

    /// Latest sample of every series that has data, in `SeriesId::ALL` order.
    pub fn latest_all(&self) -> Vec<Sample> {
        let guard = self.series.read();
        SeriesId::ALL
            .iter()
            .filter_map(|id| guard.get(id).and_then(|s| s.back().cloned()))
            .collect()
    }

    pub fn latest_gas(&self) -> Vec<GasSample> {
        self.latest_all()
            .into_iter()
            .filter_map(|s| match s {
                Sample::Gas(g) => Some(g),
                Sample::Price(_) => None,
            })
            .collect()
    }

    pub fn latest_price(&self) -> Option<PriceSample> {
        match self.latest(SeriesId::EthUsd) {
            Some(Sample::Price(p)) => Some(p),
            _ => None,
        }
    }

    /// Samples no older than `since` before now, ascending by timestamp.
    pub fn range(&self, series: SeriesId, since: Duration) -> Vec<Sample> {
        self.range_since(series, Utc::now() - since)
    }

    /// Samples with `timestamp >= cutoff`, ascending by timestamp.
    pub fn range_since(&self, series: SeriesId, cutoff: DateTime<Utc>) -> Vec<Sample> {
        let guard = self.series.read();
        let Some(log) = guard.get(&series) else {
            return Vec::new();
        };
        // Timestamps are non-decreasing, so the window is a suffix.
        let start = log.partition_point(|s| s.timestamp() < cutoff);
        log.range(start..).cloned().collect()
    }

    pub fn len(&self, series: SeriesId) -> usize {
        self.series.read().get(&series).map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().values().all(|s| s.is_empty())
    }
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chain, TRANSFER_GAS_LIMIT};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn gas(chain: Chain, base_fee: f64, secs: i64) -> Sample {
        Sample::Gas(GasSample {
            chain,
            base_fee,
            priority_fee: 1.0,
            gas_limit: TRANSFER_GAS_LIMIT,
            timestamp: at(secs),
        })
    }

    fn price(value: f64, secs: i64) -> Sample {
        Sample::Price(PriceSample {
            price: value,
            timestamp: at(secs),
        })
    }

    #[test]
    fn test_latest_is_last_appended() {
        let store = SeriesStore::new(100);
        let eth = SeriesId::Gas(Chain::Ethereum);
        assert!(store.latest(eth).is_none());

        for i in 0..25 {
            store.append(eth, gas(Chain::Ethereum, i as f64, i)).unwrap();
        }
        assert_eq!(store.latest(eth), Some(gas(Chain::Ethereum, 24.0, 24)));
    }

    #[test]
    fn test_fifo_eviction_is_exact() {
        let cap = 10;
        let store = SeriesStore::new(cap);
        let poly = SeriesId::Gas(Chain::Polygon);
        let appended = 37;

        for i in 0..appended {
            store.append(poly, gas(Chain::Polygon, i as f64, i)).unwrap();
        }

        assert_eq!(store.len(poly), cap);
        let all = store.range_since(poly, at(-1));
        // Oldest retained is the (appended - cap + 1)-th insert, i.e. index appended - cap.
        let first = all.first().and_then(|s| s.as_gas()).unwrap();
        assert_eq!(first.base_fee, (appended - cap as i64) as f64);
        assert_eq!(all.len(), cap);
    }

    #[test]
    fn test_eviction_is_per_series() {
        let store = SeriesStore::new(3);
        for i in 0..10 {
            store
                .append(SeriesId::Gas(Chain::Ethereum), gas(Chain::Ethereum, 1.0, i))
                .unwrap();
        }
        store.append(SeriesId::EthUsd, price(3000.0, 0)).unwrap();
        assert_eq!(store.len(SeriesId::Gas(Chain::Ethereum)), 3);
        assert_eq!(store.len(SeriesId::EthUsd), 1);
        assert_eq!(store.len(SeriesId::Gas(Chain::Arbitrum)), 0);
    }

    #[test]
    fn test_range_is_ordered_suffix() {
        let store = SeriesStore::new(100);
        let arb = SeriesId::Gas(Chain::Arbitrum);
        for i in 0..20 {
            store.append(arb, gas(Chain::Arbitrum, 0.2, i * 60)).unwrap();
        }

        let window = store.range_since(arb, at(600));
        assert_eq!(window.len(), 10);
        assert!(window.iter().all(|s| s.timestamp() >= at(600)));
        assert!(window.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    #[test]
    fn test_range_relative_to_now_excludes_old_samples() {
        let store = SeriesStore::new(100);
        let now = Utc::now();
        let old = Sample::Price(PriceSample {
            price: 2900.0,
            timestamp: now - Duration::hours(3),
        });
        let fresh = Sample::Price(PriceSample {
            price: 3100.0,
            timestamp: now - Duration::minutes(5),
        });
        store.append(SeriesId::EthUsd, old).unwrap();
        store.append(SeriesId::EthUsd, fresh.clone()).unwrap();

        assert_eq!(store.range(SeriesId::EthUsd, Duration::hours(1)), vec![fresh]);
        assert_eq!(store.range(SeriesId::EthUsd, Duration::hours(24)).len(), 2);
    }

    #[test]
    fn test_latest_all_skips_empty_series() {
        let store = SeriesStore::default();
        assert!(store.latest_all().is_empty());
        assert!(store.is_empty());

        store
            .append(SeriesId::Gas(Chain::Polygon), gas(Chain::Polygon, 50.0, 0))
            .unwrap();
        store.append(SeriesId::EthUsd, price(3000.0, 0)).unwrap();

        let latest = store.latest_all();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].series_id(), SeriesId::Gas(Chain::Polygon));
        assert_eq!(latest[1].series_id(), SeriesId::EthUsd);
        assert_eq!(store.latest_gas().len(), 1);
        assert_eq!(store.latest_price().map(|p| p.price), Some(3000.0));
    }

    #[test]
    fn test_append_rejects_wrong_series() {
        let store = SeriesStore::default();
        let err = store
            .append(SeriesId::EthUsd, gas(Chain::Ethereum, 1.0, 0))
            .unwrap_err();
        assert!(matches!(err, StoreError::SeriesMismatch { .. }));
        assert_eq!(store.len(SeriesId::EthUsd), 0);
    }

    #[test]
    fn test_append_rejects_out_of_order() {
        let store = SeriesStore::default();
        store.append(SeriesId::EthUsd, price(3000.0, 10)).unwrap();
        store.append(SeriesId::EthUsd, price(3001.0, 10)).unwrap();
        let err = store.append(SeriesId::EthUsd, price(2999.0, 5)).unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
        assert_eq!(store.latest_price().map(|p| p.price), Some(3001.0));
    }
}
