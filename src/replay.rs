//! Single-use enforcement for challenges.
//!
//! A challenge token stays verifiable until its expiry, so a captured
//! token and signature could be replayed inside that window. The ledger
//! records each challenge the first time it passes verification and
//! refuses it afterwards.

use crate::crypto::challenge::Challenge;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Inserts between two sweeps of expired entries.
const SWEEP_EVERY: u64 = 256;

/// Trait for consuming challenges exactly once.
///
/// # Atomicity
///
/// `consume` **must** check and record in one step, otherwise two
/// concurrent requests carrying the same challenge could both pass.
pub trait ChallengeLedger: Send + Sync {
    /// Record `challenge` as used until `retain_until` (Unix seconds).
    ///
    /// Returns `true` if the challenge had not been used, `false` on replay.
    fn consume(&self, challenge: &Challenge, retain_until: i64, now: i64) -> bool;

    /// Forget a consumed challenge so it can be used again.
    ///
    /// Only for a request that consumed the challenge and then failed on
    /// infrastructure before committing anything.
    fn release(&self, challenge: &Challenge);
}

/// In-memory ledger.
///
/// Entries only need to outlive the token they came from; after that the
/// token itself is rejected as expired. Expired entries are swept every
/// few hundred inserts and ignored on lookup in between.
#[derive(Debug, Default)]
pub struct MemoryChallengeLedger {
    /// challenge -> Unix second after which the entry can go
    used: DashMap<[u8; 32], i64>,
    insert_counter: AtomicU64,
}

impl MemoryChallengeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose retention has passed.
    pub fn sweep(&self, now: i64) {
        self.used.retain(|_, retain_until| *retain_until >= now);
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

impl ChallengeLedger for MemoryChallengeLedger {
    fn consume(&self, challenge: &Challenge, retain_until: i64, now: i64) -> bool {
        let fresh = match self.used.entry(*challenge.as_bytes()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() >= now {
                    false
                } else {
                    entry.insert(retain_until);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(retain_until);
                true
            }
        };

        // Sweep after the entry guard is released.
        if fresh && self.insert_counter.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == 0 {
            self.sweep(now);
        }
        fresh
    }

    fn release(&self, challenge: &Challenge) {
        self.used.remove(challenge.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_first_use_succeeds() {
        let ledger = MemoryChallengeLedger::new();
        assert!(ledger.consume(&Challenge::generate(), NOW + 40, NOW));
    }

    #[test]
    fn test_second_use_is_replay() {
        let ledger = MemoryChallengeLedger::new();
        let challenge = Challenge::generate();

        assert!(ledger.consume(&challenge, NOW + 40, NOW));
        assert!(!ledger.consume(&challenge, NOW + 40, NOW + 5));
    }

    #[test]
    fn test_expired_entry_is_reusable() {
        let ledger = MemoryChallengeLedger::new();
        let challenge = Challenge::generate();

        assert!(ledger.consume(&challenge, NOW + 40, NOW));
        assert!(ledger.consume(&challenge, NOW + 100, NOW + 41));
    }

    #[test]
    fn test_released_challenge_is_usable_again() {
        let ledger = MemoryChallengeLedger::new();
        let challenge = Challenge::generate();

        assert!(ledger.consume(&challenge, NOW + 40, NOW));
        ledger.release(&challenge);
        assert!(ledger.is_empty());
        assert!(ledger.consume(&challenge, NOW + 40, NOW + 1));
        assert!(!ledger.consume(&challenge, NOW + 40, NOW + 2));
    }

    #[test]
    fn test_sweep_removes_expired() {
        let ledger = MemoryChallengeLedger::new();
        ledger.consume(&Challenge::generate(), NOW + 10, NOW);
        ledger.consume(&Challenge::generate(), NOW + 60, NOW);

        ledger.sweep(NOW + 30);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_concurrent_consume_has_one_winner() {
        let ledger = Arc::new(MemoryChallengeLedger::new());
        let challenge = Challenge::generate();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || ledger.consume(&challenge, NOW + 40, NOW))
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|fresh| *fresh)
            .count();
        assert_eq!(successes, 1);
    }
}
