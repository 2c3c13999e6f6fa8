use super::{Notification, channel::Channel};
use crate::{dedup::AlertDedupGate, error::DispatchError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fnv::{FnvHashMap, FnvHashSet};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Upper bound on a single [`Sink::send`] unless configured otherwise.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport delivering a [`Notification`] to an external destination.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Result of a single [`Dispatcher::dispatch`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// Same notification already passed the gate in the current cooldown bucket.
    Suppressed,
    /// No [`Sink`] registered for the channel.
    Unrouted,
    /// Passed the gate but the transport failed. Not retried within the bucket.
    Failed(DispatchError),
}

/// Routes notifications to the [`Sink`] registered for their [`Channel`], behind an
/// [`AlertDedupGate`].
///
/// Order of checks: routing, then de-duplication, then transport. An unrouted notification
/// is a no-op that never consumes a dedup slot.
pub struct Dispatcher {
    sinks: FnvHashMap<Channel, Arc<dyn Sink>>,
    gate: AlertDedupGate,
    warned: FnvHashSet<Channel>,
    send_timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channels", &self.sinks.keys().collect::<Vec<_>>())
            .field("gate", &self.gate)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(gate: AlertDedupGate) -> Self {
        Self {
            sinks: FnvHashMap::default(),
            gate,
            warned: FnvHashSet::default(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Bound every [`Sink::send`] call. A send that overruns is reported as
    /// [`DispatchError::Timeout`] and, like any transport failure, not retried.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Register `sink` for `channel`, replacing any previous registration.
    pub fn register(&mut self, channel: Channel, sink: Arc<dyn Sink>) {
        self.sinks.insert(channel, sink);
        self.warned.remove(&channel);
    }

    pub fn with_sink(mut self, channel: Channel, sink: Arc<dyn Sink>) -> Self {
        self.register(channel, sink);
        self
    }

    pub fn is_routed(&self, channel: Channel) -> bool {
        self.sinks.contains_key(&channel)
    }

    pub fn gate(&self) -> &AlertDedupGate {
        &self.gate
    }

    pub async fn dispatch(
        &mut self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let channel = notification.channel;

        let Some(sink) = self.sinks.get(&channel).cloned() else {
            if self.warned.insert(channel) {
                warn!(%channel, title = %notification.title, "no sink registered for channel, dropping notification");
            } else {
                debug!(%channel, title = %notification.title, "no sink registered for channel");
            }
            return DispatchOutcome::Unrouted;
        };

        if !self
            .gate
            .should_send(&notification.title, &notification.description, channel, now)
        {
            return DispatchOutcome::Suppressed;
        }

        let result = tokio::time::timeout(self.send_timeout, sink.send(notification))
            .await
            .unwrap_or_else(|_elapsed| {
                Err(DispatchError::Timeout {
                    timeout_ms: u64::try_from(self.send_timeout.as_millis()).unwrap_or(u64::MAX),
                })
            });

        match result {
            Ok(()) => {
                info!(%channel, title = %notification.title, "dispatched notification");
                DispatchOutcome::Sent
            }
            Err(error) => {
                warn!(%channel, title = %notification.title, ?error, "failed to dispatch notification");
                DispatchOutcome::Failed(error)
            }
        }
    }

    /// Dispatch every notification in order. A failure on one channel does not affect the
    /// others.
    pub async fn dispatch_all(
        &mut self,
        notifications: &[Notification],
        now: DateTime<Utc>,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(notifications.len());
        for notification in notifications {
            outcomes.push(self.dispatch(notification, now).await);
        }
        outcomes
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub sent: Mutex<Vec<Notification>>,
    }

    impl RecordingSink {
        pub(crate) fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FailingSink {
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl Sink for FailingSink {
        async fn send(&self, _: &Notification) -> Result<(), DispatchError> {
            *self.attempts.lock().unwrap() += 1;
            Err(DispatchError::Status { status: 502 })
        }
    }

    #[derive(Debug, Default)]
    struct StalledSink {
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl Sink for StalledSink {
        async fn send(&self, _: &Notification) -> Result<(), DispatchError> {
            *self.attempts.lock().unwrap() += 1;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_699_999_800, 0).unwrap()
    }

    fn gate() -> AlertDedupGate {
        AlertDedupGate::new(Duration::from_secs(300), 100)
    }

    #[tokio::test]
    async fn test_dispatch_dedups_within_bucket() {
        let sink = Arc::new(RecordingSink::default());
        let mut dispatcher = Dispatcher::new(gate()).with_sink(Channel::Position, sink.clone());
        let notification = Notification::new(Channel::Position, "Open Interest", "table");

        assert_eq!(dispatcher.dispatch(&notification, t0()).await, DispatchOutcome::Sent);
        assert_eq!(
            dispatcher
                .dispatch(&notification, t0() + TimeDelta::minutes(2))
                .await,
            DispatchOutcome::Suppressed
        );
        assert_eq!(
            dispatcher
                .dispatch(&notification, t0() + TimeDelta::minutes(6))
                .await,
            DispatchOutcome::Sent
        );
        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn test_unrouted_channel_is_noop_and_others_still_dispatch() {
        let sink = Arc::new(RecordingSink::default());
        let mut dispatcher = Dispatcher::new(gate()).with_sink(Channel::PriceAlert, sink.clone());

        let notifications = vec![
            Notification::new(Channel::SwingStrategy, "Swing", "signal"),
            Notification::new(Channel::PriceAlert, "Price", "table"),
        ];

        let outcomes = dispatcher.dispatch_all(&notifications, t0()).await;
        assert_eq!(outcomes, vec![DispatchOutcome::Unrouted, DispatchOutcome::Sent]);
        assert_eq!(sink.count(), 1);
        assert_eq!(dispatcher.gate().len(), 1);
    }

    #[tokio::test]
    async fn test_unrouted_does_not_consume_dedup_slot() {
        let sink = Arc::new(RecordingSink::default());
        let mut dispatcher = Dispatcher::new(gate());
        let notification = Notification::new(Channel::Default, "Title", "body");

        assert_eq!(
            dispatcher.dispatch(&notification, t0()).await,
            DispatchOutcome::Unrouted
        );

        dispatcher.register(Channel::Default, sink.clone());
        assert_eq!(dispatcher.dispatch(&notification, t0()).await, DispatchOutcome::Sent);
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_isolated_and_not_retried() {
        let failing = Arc::new(FailingSink::default());
        let recording = Arc::new(RecordingSink::default());
        let mut dispatcher = Dispatcher::new(gate())
            .with_sink(Channel::FundingRate, failing.clone())
            .with_sink(Channel::Position, recording.clone());

        let notifications = vec![
            Notification::new(Channel::FundingRate, "Funding", "table"),
            Notification::new(Channel::Position, "Open Interest", "table"),
        ];

        let outcomes = dispatcher.dispatch_all(&notifications, t0()).await;
        assert_eq!(
            outcomes,
            vec![
                DispatchOutcome::Failed(DispatchError::Status { status: 502 }),
                DispatchOutcome::Sent,
            ]
        );
        assert_eq!(recording.count(), 1);

        let outcomes = dispatcher
            .dispatch_all(&notifications, t0() + TimeDelta::minutes(1))
            .await;
        assert_eq!(
            outcomes,
            vec![DispatchOutcome::Suppressed, DispatchOutcome::Suppressed]
        );
        assert_eq!(*failing.attempts.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sink_times_out_without_blocking_other_channels() {
        let stalled = Arc::new(StalledSink::default());
        let recording = Arc::new(RecordingSink::default());
        let mut dispatcher = Dispatcher::new(gate())
            .with_send_timeout(Duration::from_secs(2))
            .with_sink(Channel::SwingStrategy, stalled.clone())
            .with_sink(Channel::PriceAlert, recording.clone());

        let notifications = vec![
            Notification::new(Channel::SwingStrategy, "Swing", "signal"),
            Notification::new(Channel::PriceAlert, "Price", "table"),
        ];

        let start = tokio::time::Instant::now();
        let outcomes = dispatcher.dispatch_all(&notifications, t0()).await;
        assert_eq!(
            outcomes,
            vec![
                DispatchOutcome::Failed(DispatchError::Timeout { timeout_ms: 2_000 }),
                DispatchOutcome::Sent,
            ]
        );
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(recording.count(), 1);

        let outcomes = dispatcher
            .dispatch_all(&notifications, t0() + TimeDelta::minutes(1))
            .await;
        assert_eq!(outcomes[0], DispatchOutcome::Suppressed);
        assert_eq!(*stalled.attempts.lock().unwrap(), 1);
    }
}
