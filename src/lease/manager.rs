//! Lock-based partition ownership for the v1 partitioned deployment.
//!
//! Grounded on `cc/core/interface/lease_manager_interface.h`: a lease
//! acquirer holds (or doesn't hold) a lease per partition, transitioning
//! between `NotAcquired`, `Acquired`, `Renewed` and `Lost`. This crate does
//! not implement the distributed lock itself (that lives behind a
//! `LeasableLockInterface` the original composes with a remote lock store,
//! explicitly out of scope per spec §1's "on-disk storage engine" and
//! cloud-vendor-SDK exclusions) — only the gating contract spec §4.12/§3
//! supplement 3 names: "a lease-not-held phase call fails fast with a
//! retryable error rather than silently proceeding."
//!
//! v2's relaxed-consistency path never consults this; only the v1 command
//! framework does.

use crate::concurrency::ConcurrentMap;

/// Mirrors the original's `LeaseTransitionType`. Not consulted for gating
/// decisions directly — `is_owner` is the gate — but recorded so a lease
/// renewal/loss can be observed and logged the way the original's
/// `LeaseTransitionCallback` observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseTransition {
    NotAcquired,
    Acquired,
    Lost,
    Renewed,
}

/// Tracks which partitions this process currently holds the lease for.
/// Thread-safe: phase dispatch on one partition never blocks a lease
/// transition on another.
pub struct LeaseManager {
    owned: ConcurrentMap<String, bool>,
}

impl LeaseManager {
    pub fn new() -> Self {
        Self {
            owned: ConcurrentMap::new(),
        }
    }

    /// Gate consulted before a v1 transaction phase is allowed to proceed.
    /// Returns `false` for a partition this process has never been told it
    /// owns, as well as one it has explicitly lost.
    pub fn is_owner(&self, partition_id: &str) -> bool {
        self.owned
            .find(&partition_id.to_string())
            .unwrap_or(false)
    }

    /// Records a lease transition for `partition_id`, updating the gate that
    /// [`Self::is_owner`] consults. `Acquired`/`Renewed` set ownership;
    /// `NotAcquired`/`Lost` clear it.
    pub fn record_transition(&self, partition_id: &str, transition: LeaseTransition) {
        let is_owner = matches!(
            transition,
            LeaseTransition::Acquired | LeaseTransition::Renewed
        );
        let key = partition_id.to_string();
        // Upsert: ConcurrentMap::insert is strict no-overwrite, so clear the
        // stale entry first if present.
        let _ = self.owned.erase(&key);
        let _ = self.owned.insert(key, is_owner);
    }
}

impl Default for LeaseManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_never_seen_is_not_owned() {
        let mgr = LeaseManager::new();
        assert!(!mgr.is_owner("partition-0"));
    }

    #[test]
    fn acquired_transition_grants_ownership() {
        let mgr = LeaseManager::new();
        mgr.record_transition("partition-0", LeaseTransition::Acquired);
        assert!(mgr.is_owner("partition-0"));
    }

    #[test]
    fn lost_transition_after_acquired_revokes_ownership() {
        let mgr = LeaseManager::new();
        mgr.record_transition("partition-0", LeaseTransition::Acquired);
        mgr.record_transition("partition-0", LeaseTransition::Lost);
        assert!(!mgr.is_owner("partition-0"));
    }

    #[test]
    fn partitions_are_independent() {
        let mgr = LeaseManager::new();
        mgr.record_transition("partition-0", LeaseTransition::Acquired);
        assert!(mgr.is_owner("partition-0"));
        assert!(!mgr.is_owner("partition-1"));
    }
}
