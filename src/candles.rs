//! Candle aggregation of gas history into fixed-width buckets.

use crate::models::{Candle, GasSample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CandleInterval {
    #[default]
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl CandleInterval {
    pub fn minutes(&self) -> i64 {
        match self {
            CandleInterval::FifteenMinutes => 15,
            CandleInterval::OneHour => 60,
            CandleInterval::FourHours => 240,
            CandleInterval::OneDay => 1440,
        }
    }

    pub fn seconds(&self) -> i64 {
        self.minutes() * 60
    }
}

impl FromStr for CandleInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "15m" => Ok(CandleInterval::FifteenMinutes),
            "1h" => Ok(CandleInterval::OneHour),
            "4h" => Ok(CandleInterval::FourHours),
            "1d" => Ok(CandleInterval::OneDay),
            other => Err(format!("unsupported candle interval '{other}' (use 15m, 1h, 4h or 1d)")),
        }
    }
}

/// Bucket samples by `floor(ts / width)` and build OHLC of `base + priority`.
/// Input order does not matter; output is ascending by bucket start.
pub fn aggregate(samples: &[GasSample], interval: CandleInterval) -> Vec<Candle> {
    let width = interval.seconds();
    let mut buckets: BTreeMap<i64, Vec<&GasSample>> = BTreeMap::new();
    for s in samples {
        let start = s.timestamp.timestamp().div_euclid(width) * width;
        buckets.entry(start).or_default().push(s);
    }

    buckets
        .into_iter()
        .filter_map(|(time, mut points)| {
            points.sort_by_key(|p| p.timestamp);
            let values: Vec<f64> = points.iter().map(|p| p.total_fee()).collect();
            let open = *values.first()?;
            let close = *values.last()?;
            let high = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let low = values.iter().copied().fold(f64::INFINITY, f64::min);
            Some(Candle {
                time,
                open,
                high,
                low,
                close,
            })
        })
        .collect()
}
