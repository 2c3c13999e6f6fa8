//! Time-bucketed notification de-duplication.

use crate::notify::channel::Channel;
use chrono::{DateTime, Utc};
use derive_more::Display;
use fnv::FnvHashSet;
use sha2::{Digest, Sha256};
use std::{collections::VecDeque, time::Duration};
use tracing::debug;

/// Identity of a notification within one cooldown bucket.
///
/// Hex encoded SHA-256 of `title`, `description`, `channel` and `floor(now / cooldown)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(title: &str, description: &str, channel: Channel, bucket: i64) -> Self {
        let mut hasher = Sha256::new();
        for part in [title, description, channel.as_str()] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(bucket.to_be_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Suppresses repeats of the same notification within a cooldown bucket.
///
/// Buckets are fixed-width (`floor(now_ms / cooldown_ms)`), not sliding: an alert sent just
/// before a bucket boundary can be repeated just after it.
///
/// The fingerprint cache is bounded. Once `capacity` is reached the oldest half of the
/// entries (by insertion) is evicted in one batch; this is not strict LRU.
#[derive(Debug, Clone)]
pub struct AlertDedupGate {
    cooldown_ms: i64,
    capacity: usize,
    order: VecDeque<Fingerprint>,
    seen: FnvHashSet<Fingerprint>,
}

impl AlertDedupGate {
    pub fn new(cooldown: Duration, capacity: usize) -> Self {
        let cooldown_ms = i64::try_from(cooldown.as_millis())
            .unwrap_or(i64::MAX)
            .max(1);
        let capacity = capacity.max(1);

        Self {
            cooldown_ms,
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: FnvHashSet::default(),
        }
    }

    /// Bucket index of `now`.
    pub fn bucket(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis().div_euclid(self.cooldown_ms)
    }

    pub fn fingerprint(
        &self,
        title: &str,
        description: &str,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Fingerprint {
        Fingerprint::new(title, description, channel, self.bucket(now))
    }

    /// Returns `true` and records the fingerprint if this notification has not been seen in
    /// the current bucket, `false` otherwise.
    pub fn should_send(
        &mut self,
        title: &str,
        description: &str,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> bool {
        let fingerprint = self.fingerprint(title, description, channel, now);
        if self.seen.contains(&fingerprint) {
            debug!(%channel, %fingerprint, "suppressed duplicate notification");
            return false;
        }

        if self.order.len() >= self.capacity {
            self.evict_oldest_half();
        }

        self.order.push_back(fingerprint.clone());
        self.seen.insert(fingerprint);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn evict_oldest_half(&mut self) {
        let evict = (self.order.len() / 2).max(1);
        for fingerprint in self.order.drain(..evict) {
            self.seen.remove(&fingerprint);
        }
        debug!(evicted = evict, remaining = self.order.len(), "evicted dedup fingerprints");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        // Aligned to a 5 minute boundary
        DateTime::from_timestamp(1_699_999_800, 0).unwrap()
    }

    #[test]
    fn test_should_send_suppresses_within_bucket() {
        let mut gate = AlertDedupGate::new(Duration::from_secs(300), 100);

        assert!(gate.should_send("OI", "table", Channel::Position, t0()));
        assert!(!gate.should_send("OI", "table", Channel::Position, t0() + TimeDelta::minutes(2)));
        assert!(gate.should_send("OI", "table", Channel::Position, t0() + TimeDelta::minutes(6)));
        assert_eq!(gate.len(), 2);
    }

    #[test]
    fn test_fingerprint_components() {
        struct TestCase {
            title: &'static str,
            description: &'static str,
            channel: Channel,
            offset: TimeDelta,
            expected_send: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: different title
                title: "Price",
                description: "table",
                channel: Channel::Position,
                offset: TimeDelta::zero(),
                expected_send: true,
            },
            TestCase {
                // TC1: different description
                title: "OI",
                description: "other table",
                channel: Channel::Position,
                offset: TimeDelta::zero(),
                expected_send: true,
            },
            TestCase {
                // TC2: different channel
                title: "OI",
                description: "table",
                channel: Channel::Default,
                offset: TimeDelta::zero(),
                expected_send: true,
            },
            TestCase {
                // TC3: identical, same bucket
                title: "OI",
                description: "table",
                channel: Channel::Position,
                offset: TimeDelta::seconds(299),
                expected_send: false,
            },
            TestCase {
                // TC4: identical, next bucket
                title: "OI",
                description: "table",
                channel: Channel::Position,
                offset: TimeDelta::seconds(300),
                expected_send: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut gate = AlertDedupGate::new(Duration::from_secs(300), 100);
            assert!(gate.should_send("OI", "table", Channel::Position, t0()));
            let actual = gate.should_send(
                test.title,
                test.description,
                test.channel,
                t0() + test.offset,
            );
            assert_eq!(actual, test.expected_send, "TC{} failed", index);
        }
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let a = Fingerprint::new("ab", "c", Channel::Default, 0);
        let b = Fingerprint::new("a", "bc", Channel::Default, 0);
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_capacity_evicts_oldest_half() {
        let mut gate = AlertDedupGate::new(Duration::from_secs(300), 4);
        for title in ["a", "b", "c", "d"] {
            assert!(gate.should_send(title, "", Channel::Default, t0()));
        }
        assert_eq!(gate.len(), 4);

        // Fifth insert evicts "a" and "b"
        assert!(gate.should_send("e", "", Channel::Default, t0()));
        assert_eq!(gate.len(), 3);

        assert!(!gate.should_send("c", "", Channel::Default, t0()));
        assert!(!gate.should_send("e", "", Channel::Default, t0()));
        assert!(gate.should_send("a", "", Channel::Default, t0()));
    }

    #[test]
    fn test_zero_cooldown_does_not_panic() {
        let mut gate = AlertDedupGate::new(Duration::ZERO, 0);
        assert!(gate.should_send("a", "", Channel::Default, t0()));
        assert!(!gate.should_send("a", "", Channel::Default, t0()));
        assert!(gate.should_send("a", "", Channel::Default, t0() + TimeDelta::milliseconds(1)));
    }
}
