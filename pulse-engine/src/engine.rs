//! Single-threaded scheduler driving sampling, rolling and reporting.
//!
//! The [`Engine`] owns every [`MetricMonitor`] and the [`Dispatcher`]; all state mutation
//! happens inside one task. Three independent timers (sample, roll, report) and a shutdown
//! future are multiplexed with `tokio::select!`, and each branch runs to completion before
//! the next tick is observed.

use crate::{
    config::EngineConfig,
    monitor::MetricMonitor,
    notify::dispatch::{DispatchOutcome, Dispatcher},
    sampler::{MetricSampler, MetricSource, SampleReport},
    types::{InstrumentId, MetricKind, Window},
};
use chrono::{DateTime, TimeDelta, Utc};
use std::{future::Future, time::Duration};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

/// Wall clock anchored to the tokio clock.
///
/// `now()` is the wall time at start plus the elapsed tokio [`Instant`] time, so paused or
/// advanced tokio time moves it too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    epoch: DateTime<Utc>,
    started: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            started: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::MAX);
        self.epoch
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug, Clone)]
struct Universe {
    instruments: Vec<InstrumentId>,
    fetched_at: Instant,
}

pub struct Engine<S> {
    config: EngineConfig,
    source: S,
    sampler: MetricSampler,
    monitors: Vec<MetricMonitor>,
    dispatcher: Dispatcher,
    clock: Clock,
    universe: Option<Universe>,
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("sampler", &self.sampler)
            .field("monitors", &self.monitors)
            .field("dispatcher", &self.dispatcher)
            .field("clock", &self.clock)
            .finish()
    }
}

impl<S> Engine<S>
where
    S: MetricSource,
{
    /// Construct an [`Engine`] with the default monitor set.
    pub fn new(config: EngineConfig, source: S, dispatcher: Dispatcher) -> Self {
        let clock = Clock::start();
        let monitors = MetricMonitor::defaults(&config, clock.now());
        Self {
            sampler: MetricSampler::from_config(&config),
            config,
            source,
            monitors,
            dispatcher,
            clock,
            universe: None,
        }
    }

    /// Replace the monitor set. Stores should be constructed with [`Self::now`] as epoch.
    pub fn with_monitors(mut self, monitors: Vec<MetricMonitor>) -> Self {
        self.monitors = monitors;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn monitors(&self) -> &[MetricMonitor] {
        &self.monitors
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve the instruments to sample this cycle.
    ///
    /// A configured allow-list wins. Otherwise the universe listing is cached for
    /// `universe_refresh`; a failed refresh reuses the cached listing if there is one.
    async fn instruments(&mut self) -> Option<Vec<InstrumentId>> {
        if let Some(instruments) = &self.config.instruments {
            return Some(instruments.clone());
        }

        let refresh = self.config.universe_refresh;
        if let Some(universe) = self
            .universe
            .as_ref()
            .filter(|universe| universe.fetched_at.elapsed() < refresh)
        {
            return Some(universe.instruments.clone());
        }

        match self.source.instruments().await {
            Ok(instruments) => {
                info!(instruments = instruments.len(), "refreshed instrument universe");
                self.universe = Some(Universe {
                    instruments: instruments.clone(),
                    fetched_at: Instant::now(),
                });
                Some(instruments)
            }
            Err(error) => match &self.universe {
                Some(universe) => {
                    warn!(%error, "failed to refresh instrument universe, reusing cached listing");
                    Some(universe.instruments.clone())
                }
                None => {
                    error!(%error, "sampling source unreachable, no instrument universe available");
                    None
                }
            },
        }
    }

    /// Sample every monitored metric and prune stale "current" entries.
    pub async fn sample_cycle(&mut self) -> Vec<(MetricKind, SampleReport)> {
        let Some(instruments) = self.instruments().await else {
            return Vec::new();
        };

        let mut reports = Vec::with_capacity(self.monitors.len());
        for monitor in self.monitors.iter_mut() {
            let metric = monitor.metric();
            let report = self
                .sampler
                .sample(&self.source, metric, &instruments, monitor.store_mut())
                .await;

            let pruned = monitor
                .store_mut()
                .prune_stale(self.clock.now(), self.config.stale_after);

            if report.is_total_failure() {
                error!(
                    %metric,
                    requested = report.requested,
                    failed = report.failed,
                    timed_out = report.timed_out,
                    "sampling cycle obtained no samples"
                );
            } else {
                debug!(
                    %metric,
                    requested = report.requested,
                    updated = report.updated,
                    failed = report.failed,
                    timed_out = report.timed_out,
                    pruned,
                    "sampling cycle complete"
                );
            }

            reports.push((metric, report));
        }

        reports
    }

    /// Roll every due window of every monitor.
    pub fn roll_cycle(&mut self) -> Vec<(MetricKind, Vec<Window>)> {
        let now = self.clock.now();
        self.monitors
            .iter_mut()
            .map(|monitor| (monitor.metric(), monitor.roll(now)))
            .filter(|(_, rolled)| !rolled.is_empty())
            .inspect(|(metric, rolled)| info!(%metric, ?rolled, "rolled window snapshots"))
            .collect()
    }

    /// Build every monitor's reports and dispatch them.
    pub async fn report_cycle(&mut self) -> Vec<DispatchOutcome> {
        let now = self.clock.now();
        let notifications: Vec<_> = self
            .monitors
            .iter()
            .flat_map(MetricMonitor::report)
            .collect();

        if notifications.is_empty() {
            debug!("report cycle produced no notifications");
            return Vec::new();
        }

        self.dispatcher.dispatch_all(&notifications, now).await
    }

    /// Drive the timers until `shutdown` resolves.
    ///
    /// When several timers are due at once they run in the order sample, report, roll: a
    /// report always compares against the window snapshots as they were before this instant's
    /// roll, never against a snapshot copied moments earlier.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        let mut sample_timer = interval_at(start, non_zero(self.config.sample_interval));
        let mut roll_timer = interval_at(start, non_zero(self.config.roll_interval));
        let report_period = non_zero(self.config.report_interval);
        let mut report_timer = interval_at(start + report_period, report_period);
        for timer in [&mut sample_timer, &mut roll_timer, &mut report_timer] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        info!(
            monitors = self.monitors.len(),
            sample_interval_secs = self.config.sample_interval.as_secs(),
            report_interval_secs = self.config.report_interval.as_secs(),
            "engine started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("shutdown requested, stopping engine");
                    break;
                }
                _ = sample_timer.tick() => {
                    self.sample_cycle().await;
                }
                _ = report_timer.tick() => {
                    self.report_cycle().await;
                }
                _ = roll_timer.tick() => {
                    self.roll_cycle();
                }
            }
        }
    }
}

fn non_zero(period: Duration) -> Duration {
    period.max(Duration::from_millis(1))
}
