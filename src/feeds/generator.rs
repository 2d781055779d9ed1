//! Periodic generator: a cancellable scheduled task around a `SampleSource`.
//!
//! Each tick pulls one batch from the source, appends it to the store and
//! publishes one event per appended sample. Failures are logged and the
//! tick is skipped; the schedule keeps running.

use super::SampleSource;
use crate::fanout::FanoutHub;
use crate::models::WsServerEvent;
use crate::storage::SeriesStore;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shortest schedule a generator will run; `tokio::time::interval` panics on zero.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub appended: usize,
    pub rejected: usize,
    /// Sum over events of subscribers reached.
    pub delivered: usize,
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Generator {
    source: Arc<dyn SampleSource>,
    store: Arc<SeriesStore>,
    hub: FanoutHub,
    period: Duration,
    task: Mutex<Option<RunningTask>>,
}

impl Generator {
    pub fn new(
        source: Arc<dyn SampleSource>,
        store: Arc<SeriesStore>,
        hub: FanoutHub,
        period: Duration,
    ) -> Arc<Self> {
        if period < MIN_PERIOD {
            warn!(source = source.name(), ?period, "Generator period too short, using {MIN_PERIOD:?}");
        }
        let period = period.max(MIN_PERIOD);
        Arc::new(Self {
            source,
            store,
            hub,
            period,
            task: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &'static str {
        self.source.name()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one tick now. Errors only when the source itself fails; rejected
    /// samples are counted and logged.
    pub async fn tick(&self) -> Result<TickReport> {
        let samples = self
            .source
            .sample()
            .await
            .with_context(|| format!("source {} failed to sample", self.source.name()))?;
        let owned = self.source.series();
        let mut report = TickReport::default();

        for sample in samples {
            let series = sample.series_id();
            if !owned.contains(&series) {
                warn!(source = self.name(), %series, "Source produced a sample for a series it does not own");
                report.rejected += 1;
                continue;
            }

            let event = WsServerEvent::for_sample(&sample);
            if let Err(e) = self.store.append(series, sample) {
                warn!(source = self.name(), %series, error = %e, "Store append failed, sample skipped");
                report.rejected += 1;
                continue;
            }

            report.appended += 1;
            report.delivered += self.hub.publish(event);
        }

        debug!(
            source = self.name(),
            appended = report.appended,
            rejected = report.rejected,
            delivered = report.delivered,
            "Tick complete"
        );
        Ok(report)
    }

    async fn run_tick(&self) {
        if let Err(e) = self.tick().await {
            warn!(source = self.name(), error = %e, "⚠️ Tick failed (non-critical), waiting for next");
        }
    }

    /// Start the schedule. The first tick fires immediately. Returns `false`
    /// if the generator was already running. A task that died is replaced.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let generator = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(generator.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => generator.run_tick().await,
                }
            }
            info!(source = generator.name(), "Generator stopped");
        });

        info!(
            source = self.name(),
            period_secs = self.period.as_secs_f64(),
            "🔥 Generator started"
        );
        *task = Some(RunningTask { shutdown, handle });
        true
    }

    /// Cancel the schedule. An in-flight tick completes. Returns `false` if
    /// the generator was not running.
    pub fn stop(&self) -> bool {
        let Some(task) = self.task.lock().take() else {
            return false;
        };
        let _ = task.shutdown.send(true);
        drop(task.handle);
        true
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::{PriceWalkConfig, SyntheticGasSource, SyntheticPriceSource};
    use crate::models::{Chain, PriceSample, Sample, SeriesId};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    fn fixture() -> (Arc<SeriesStore>, FanoutHub) {
        let store = Arc::new(SeriesStore::new(50));
        let hub = FanoutHub::new(store.clone(), 64, 2500.0);
        (store, hub)
    }

    struct FailingSource;

    #[async_trait]
    impl SampleSource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn series(&self) -> Vec<SeriesId> {
            vec![SeriesId::EthUsd]
        }

        async fn sample(&self) -> Result<Vec<Sample>> {
            anyhow::bail!("upstream unavailable")
        }
    }

    /// Always emits the same stale timestamp, so every tick after the first
    /// is rejected by the store.
    struct StaleSource;

    #[async_trait]
    impl SampleSource for StaleSource {
        fn name(&self) -> &'static str {
            "stale"
        }

        fn series(&self) -> Vec<SeriesId> {
            vec![SeriesId::EthUsd]
        }

        async fn sample(&self) -> Result<Vec<Sample>> {
            Ok(vec![
                Sample::Price(PriceSample {
                    price: 3000.0,
                    timestamp: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
                }),
                Sample::Price(PriceSample {
                    price: 2900.0,
                    timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                }),
            ])
        }
    }

    /// Takes a while to produce one price, so a stop can land mid-tick.
    struct SlowSource {
        delay: Duration,
    }

    #[async_trait]
    impl SampleSource for SlowSource {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn series(&self) -> Vec<SeriesId> {
            vec![SeriesId::EthUsd]
        }

        async fn sample(&self) -> Result<Vec<Sample>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![Sample::Price(PriceSample {
                price: 3000.0,
                timestamp: Utc::now(),
            })])
        }
    }

    /// Panics on its first call, then behaves.
    struct PanicOnceSource {
        panicked: AtomicBool,
    }

    #[async_trait]
    impl SampleSource for PanicOnceSource {
        fn name(&self) -> &'static str {
            "panic-once"
        }

        fn series(&self) -> Vec<SeriesId> {
            vec![SeriesId::EthUsd]
        }

        async fn sample(&self) -> Result<Vec<Sample>> {
            if !self.panicked.swap(true, AtomicOrdering::SeqCst) {
                panic!("source blew up");
            }
            Ok(vec![Sample::Price(PriceSample {
                price: 3100.0,
                timestamp: Utc::now(),
            })])
        }
    }

    #[tokio::test]
    async fn test_gas_tick_appends_and_publishes_each_chain() {
        let (store, hub) = fixture();
        let mut sub = hub.subscribe();
        let gen = Generator::new(
            Arc::new(SyntheticGasSource::new(Some(9))),
            store.clone(),
            hub.clone(),
            Duration::from_secs(15),
        );

        let report = gen.tick().await.unwrap();
        assert_eq!(report.appended, 3);
        assert_eq!(report.delivered, 3);
        for chain in Chain::ALL {
            assert_eq!(store.len(SeriesId::Gas(chain)), 1);
        }

        assert_eq!(sub.recv().await.unwrap().kind(), "initialData");
        for chain in Chain::ALL {
            match sub.recv().await.unwrap().as_ref() {
                WsServerEvent::SampleUpdate(update) => {
                    assert_eq!(update.series_id, SeriesId::Gas(chain))
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_price_tick_emits_price_update() {
        let (store, hub) = fixture();
        let mut sub = hub.subscribe();
        let gen = Generator::new(
            Arc::new(SyntheticPriceSource::new(PriceWalkConfig::default(), Some(2))),
            store.clone(),
            hub,
            Duration::from_secs(30),
        );

        gen.tick().await.unwrap();
        sub.recv().await.unwrap();
        match sub.recv().await.unwrap().as_ref() {
            WsServerEvent::PriceUpdate(update) => assert_eq!(update.price, 3000.0),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(store.latest_price().map(|p| p.price), Some(3000.0));
    }

    #[tokio::test]
    async fn test_failed_source_leaves_store_untouched() {
        let (store, hub) = fixture();
        let gen = Generator::new(Arc::new(FailingSource), store.clone(), hub, Duration::from_secs(1));

        assert!(gen.tick().await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_samples_are_skipped_not_published() {
        let (store, hub) = fixture();
        let gen = Generator::new(Arc::new(StaleSource), store.clone(), hub.clone(), Duration::from_secs(1));
        let _sub = hub.subscribe();

        let report = gen.tick().await.unwrap();
        assert_eq!(report.appended, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(store.len(SeriesId::EthUsd), 1);
    }

    #[tokio::test]
    async fn test_start_ticks_immediately_and_stop_is_idempotent() {
        let (store, hub) = fixture();
        let mut sub = hub.subscribe();
        let gen = Generator::new(
            Arc::new(SyntheticPriceSource::new(PriceWalkConfig::default(), None)),
            store.clone(),
            hub,
            Duration::from_secs(3600),
        );

        assert!(gen.start());
        assert!(!gen.start());
        assert!(gen.is_running());

        sub.recv().await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("first tick should fire immediately")
            .unwrap();
        assert_eq!(first.kind(), "priceUpdate");

        assert!(gen.stop());
        assert!(!gen.stop());
        assert!(!gen.is_running());
        assert_eq!(store.len(SeriesId::EthUsd), 1);
    }

    #[tokio::test]
    async fn test_failing_schedule_keeps_running() {
        let (store, hub) = fixture();
        let gen = Generator::new(Arc::new(FailingSource), store, hub, Duration::from_millis(10));
        gen.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gen.is_running());
        gen.stop();
    }

    #[tokio::test]
    async fn test_stop_mid_tick_lets_tick_finish() {
        let (store, hub) = fixture();
        let gen = Generator::new(
            Arc::new(SlowSource {
                delay: Duration::from_millis(200),
            }),
            store.clone(),
            hub,
            Duration::from_secs(3600),
        );

        assert!(gen.start());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gen.stop());
        assert!(store.is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.len(SeriesId::EthUsd), 1);
    }

    #[tokio::test]
    async fn test_zero_period_is_clamped_and_ticks() {
        let (store, hub) = fixture();
        let gen = Generator::new(
            Arc::new(SyntheticPriceSource::new(PriceWalkConfig::default(), Some(4))),
            store.clone(),
            hub,
            Duration::ZERO,
        );
        assert_eq!(gen.period(), MIN_PERIOD);

        assert!(gen.start());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gen.is_running());
        assert!(!store.is_empty());
        assert!(gen.stop());
    }

    #[tokio::test]
    async fn test_start_replaces_dead_task() {
        let (store, hub) = fixture();
        let gen = Generator::new(
            Arc::new(PanicOnceSource {
                panicked: AtomicBool::new(false),
            }),
            store.clone(),
            hub,
            Duration::from_secs(3600),
        );

        assert!(gen.start());
        for _ in 0..50 {
            if !gen.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!gen.is_running());
        assert!(store.is_empty());

        assert!(gen.start());
        for _ in 0..50 {
            if !store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.latest_price().map(|p| p.price), Some(3100.0));
        assert!(gen.is_running());
        gen.stop();
    }
}
