//! Sample sources and the periodic generators that drive them.
//!
//! A `SampleSource` produces one sample per owned series per tick. The
//! store and fan-out never see which implementation is behind it.

pub mod generator;
pub mod rpc;
pub mod synthetic;

use crate::models::{Sample, SeriesId};
use anyhow::Result;
use async_trait::async_trait;

pub use generator::Generator;
pub use rpc::RpcGasSource;
pub use synthetic::{FeeBand, PriceWalkConfig, SyntheticGasSource, SyntheticPriceSource};

#[async_trait]
pub trait SampleSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Series this source writes. Fixed for the source's lifetime.
    fn series(&self) -> Vec<SeriesId>;

    /// Produce exactly one sample per owned series.
    async fn sample(&self) -> Result<Vec<Sample>>;
}
