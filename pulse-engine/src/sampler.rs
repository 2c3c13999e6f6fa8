//! Batched, time-bounded collection of metric samples.
//!
//! Fetches for one cycle are issued in fixed-size batches of concurrent requests with a fixed
//! delay between batches. A failed or timed-out fetch skips that instrument for the cycle
//! only; its previous "current" entry is left in place.

use crate::{
    config::EngineConfig,
    error::FetchError,
    snapshot::SnapshotStore,
    types::{InstrumentId, MetricKind, MetricSample},
};
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, warn};

/// Exchange collaborator providing metric samples.
///
/// Implementations must be side-effect free from the engine's perspective: calling `fetch`
/// twice for the same instrument is harmless.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// List the tradable instrument universe.
    async fn instruments(&self) -> Result<Vec<InstrumentId>, FetchError>;

    /// Fetch the latest value of `metric` for one instrument.
    async fn fetch(
        &self,
        metric: MetricKind,
        instrument: &InstrumentId,
    ) -> Result<MetricSample, FetchError>;
}

/// Outcome counters of one sampling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleReport {
    pub requested: usize,
    pub updated: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Subset of `failed` where the exchange asked us to back off.
    pub rate_limited: usize,
}

impl SampleReport {
    /// Instruments were requested but not a single sample was obtained.
    pub fn is_total_failure(&self) -> bool {
        self.requested > 0 && self.updated == 0
    }

    pub fn skipped(&self) -> usize {
        self.failed + self.timed_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSampler {
    batch_size: usize,
    batch_delay: Duration,
    fetch_timeout: Duration,
}

impl MetricSampler {
    pub fn new(batch_size: usize, batch_delay: Duration, fetch_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batch_delay,
            fetch_timeout,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.batch_size, config.batch_delay, config.fetch_timeout)
    }

    /// Fetch `metric` for every instrument and write successful samples into `store`.
    pub async fn sample<S>(
        &self,
        source: &S,
        metric: MetricKind,
        instruments: &[InstrumentId],
        store: &mut SnapshotStore,
    ) -> SampleReport
    where
        S: MetricSource + ?Sized,
    {
        let mut report = SampleReport {
            requested: instruments.len(),
            ..SampleReport::default()
        };

        for (index, batch) in instruments.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let results = join_all(batch.iter().map(|instrument| async move {
                let result =
                    tokio::time::timeout(self.fetch_timeout, source.fetch(metric, instrument))
                        .await;
                (instrument, result)
            }))
            .await;

            for (instrument, result) in results {
                match result {
                    Ok(Ok(sample)) => {
                        store.update(sample);
                        report.updated += 1;
                    }
                    Ok(Err(error)) => {
                        if error.is_rate_limited() {
                            report.rate_limited += 1;
                            warn!(%metric, %instrument, %error, "rate limited while sampling");
                        } else {
                            debug!(%metric, %instrument, %error, "skipping instrument this cycle");
                        }
                        report.failed += 1;
                    }
                    Err(_elapsed) => {
                        let error = FetchError::Timeout {
                            instrument: instrument.clone(),
                            timeout_ms: u64::try_from(self.fetch_timeout.as_millis())
                                .unwrap_or(u64::MAX),
                        };
                        debug!(%metric, %error, "skipping instrument this cycle");
                        report.timed_out += 1;
                    }
                }
            }
        }

        report
    }
}
