//! Time source for token issuance and expiry checks.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current time.
///
/// Implementations must be `Send + Sync`; one clock is shared by every flow.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as a Unix timestamp in seconds.
    fn timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to, at one-second resolution.
///
/// ```rust
/// use p256_challenge_auth::clock::{Clock, ManualClock};
/// use chrono::Duration;
///
/// let clock = ManualClock::at(1_700_000_000);
/// clock.advance(Duration::seconds(41));
/// assert_eq!(clock.timestamp(), 1_700_000_041);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    pub fn at(timestamp: i64) -> Self {
        Self {
            secs: AtomicI64::new(timestamp),
        }
    }

    /// Starts at the current wall-clock second.
    pub fn starting_now() -> Self {
        Self::at(Utc::now().timestamp())
    }

    pub fn advance(&self, by: Duration) {
        self.secs.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }

    pub fn set(&self, timestamp: i64) {
        self.secs.store(timestamp, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.secs.load(Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    fn timestamp(&self) -> i64 {
        self.secs.load(Ordering::SeqCst)
    }
}
