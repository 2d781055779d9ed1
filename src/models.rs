//! Core data model: chains, series identifiers, samples and push-channel events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Blockchain networks tracked by the gas generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Polygon,
    Arbitrum,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Ethereum, Chain::Polygon, Chain::Arbitrum];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Arbitrum => "arbitrum",
        }
    }

    /// Ticker of the token gas is paid in.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Ethereum | Chain::Arbitrum => "ETH",
            Chain::Polygon => "MATIC",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = UnknownSeries;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "arbitrum" | "arb" => Ok(Chain::Arbitrum),
            _ => Err(UnknownSeries(s.to_string())),
        }
    }
}

/// One named stream of samples: a chain's gas prices or the ETH/USD quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeriesId {
    Gas(Chain),
    EthUsd,
}

impl SeriesId {
    /// Every series known at startup, in snapshot order.
    pub const ALL: [SeriesId; 4] = [
        SeriesId::Gas(Chain::Ethereum),
        SeriesId::Gas(Chain::Polygon),
        SeriesId::Gas(Chain::Arbitrum),
        SeriesId::EthUsd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesId::Gas(chain) => chain.as_str(),
            SeriesId::EthUsd => "eth-usd",
        }
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesId {
    type Err = UnknownSeries;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eth-usd" | "ethusd" | "price" => Ok(SeriesId::EthUsd),
            other => other.parse::<Chain>().map(SeriesId::Gas),
        }
    }
}

impl Serialize for SeriesId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SeriesId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSeries(pub String);

impl fmt::Display for UnknownSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown series '{}'", self.0)
    }
}

impl std::error::Error for UnknownSeries {}

/// Gas limit of a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Gas price observation for one chain. Fees are in gwei.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasSample {
    pub chain: Chain,
    pub base_fee: f64,
    pub priority_fee: f64,
    pub gas_limit: u64,
    pub timestamp: DateTime<Utc>,
}

impl GasSample {
    pub fn total_fee(&self) -> f64 {
        self.base_fee + self.priority_fee
    }
}

/// ETH/USD quote observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Immutable timestamped data point in a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    Gas(GasSample),
    Price(PriceSample),
}

impl Sample {
    pub fn series_id(&self) -> SeriesId {
        match self {
            Sample::Gas(g) => SeriesId::Gas(g.chain),
            Sample::Price(_) => SeriesId::EthUsd,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Sample::Gas(g) => g.timestamp,
            Sample::Price(p) => p.timestamp,
        }
    }

    pub fn as_gas(&self) -> Option<&GasSample> {
        match self {
            Sample::Gas(g) => Some(g),
            Sample::Price(_) => None,
        }
    }

    pub fn as_price(&self) -> Option<&PriceSample> {
        match self {
            Sample::Price(p) => Some(p),
            Sample::Gas(_) => None,
        }
    }
}

/// Payload of the one-time snapshot sent to a new subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
    pub samples: Vec<GasSample>,
    pub quote_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleUpdate {
    pub series_id: SeriesId,
    pub sample: GasSample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub price: f64,
}

/// Messages carried by the push channel, encoded as `{"type": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum WsServerEvent {
    InitialData(InitialData),
    SampleUpdate(SampleUpdate),
    PriceUpdate(PriceUpdate),
}

impl WsServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WsServerEvent::InitialData(_) => "initialData",
            WsServerEvent::SampleUpdate(_) => "sampleUpdate",
            WsServerEvent::PriceUpdate(_) => "priceUpdate",
        }
    }

    /// The event announcing a freshly appended sample.
    pub fn for_sample(sample: &Sample) -> Self {
        match sample {
            Sample::Gas(g) => WsServerEvent::SampleUpdate(SampleUpdate {
                series_id: SeriesId::Gas(g.chain),
                sample: g.clone(),
            }),
            Sample::Price(p) => WsServerEvent::PriceUpdate(PriceUpdate { price: p.price }),
        }
    }
}

/// OHLC of summed gas fees over one time bucket. `time` is the bucket start in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Named gas-limit presets offered to the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Transfer,
    Erc20,
    Swap,
    Nft,
}

impl TransactionType {
    pub const ALL: [TransactionType; 4] = [
        TransactionType::Transfer,
        TransactionType::Erc20,
        TransactionType::Swap,
        TransactionType::Nft,
    ];

    pub fn gas_limit(&self) -> u64 {
        match self {
            TransactionType::Transfer => TRANSFER_GAS_LIMIT,
            TransactionType::Erc20 => 65_000,
            TransactionType::Swap => 150_000,
            TransactionType::Nft => 100_000,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "Simple Transfer",
            TransactionType::Erc20 => "ERC-20 Transfer",
            TransactionType::Swap => "Uniswap Swap",
            TransactionType::Nft => "NFT Mint",
        }
    }
}
