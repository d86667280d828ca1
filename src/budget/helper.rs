//! `BudgetConsumptionHelper`: atomic, all-or-nothing group budget
//! consumption. See spec §4.7.
//!
//! The two-phase shape — a dry-run check pass, then (only if nothing is
//! exhausted) a real commit pass — mirrors the teacher's
//! `deduct_budget(dry_run: bool)` in `pds/core.rs`. The teacher calls that
//! twice for a single key; here a whole request can span several distinct
//! keys, so all of their locks are taken up front, in sorted canonical-name
//! order, and held across both passes so the group behaves as one atomic
//! unit with respect to any other concurrent `consume_budgets` call that
//! touches an overlapping key.

use std::collections::{BTreeSet, HashMap};
use std::sync::MutexGuard;

use async_trait::async_trait;

use super::filter::TokenFilter;
use super::metadata::{ConsumeBudgetsRequest, ConsumeBudgetsResponse};
use super::storage::KeyedFilterStorage;
use crate::error::PbsError;

#[async_trait]
pub trait BudgetConsumptionHelper: Send + Sync {
    async fn consume_budgets(
        &self,
        request: ConsumeBudgetsRequest,
    ) -> Result<ConsumeBudgetsResponse, PbsError>;
}

/// In-process implementation backed by [`KeyedFilterStorage`]. This is the
/// only implementation in this crate; a durable, cross-coordinator helper
/// sits behind the same trait in deployment but is out of scope here (spec
/// §1 Non-goals: "the on-disk storage engine backing budget keys").
pub struct InMemoryBudgetConsumptionHelper {
    storage: KeyedFilterStorage,
}

impl InMemoryBudgetConsumptionHelper {
    pub fn new(default_capacity_per_bucket: u32) -> Self {
        Self {
            storage: KeyedFilterStorage::new(default_capacity_per_bucket),
        }
    }

    fn consume_sync(&self, request: &ConsumeBudgetsRequest) -> ConsumeBudgetsResponse {
        let distinct_keys: BTreeSet<&str> = request
            .budgets
            .iter()
            .map(|b| b.budget_key_name.as_str())
            .collect();

        let mut guards: HashMap<&str, MutexGuard<'_, HashMap<u64, TokenFilter>>> =
            HashMap::new();
        // Keep the Arcs alive for the lifetime of this function; guards
        // above borrow from them.
        let arcs: Vec<_> = distinct_keys
            .iter()
            .map(|key| (*key, self.storage.bucket_filters_for(key)))
            .collect();
        for (key, arc) in &arcs {
            let guard = arc.lock().expect("bucket filter mutex poisoned");
            guards.insert(*key, guard);
        }

        let default_capacity = self.storage.default_capacity();

        // Simulate consumption against a running per-(key, time_bucket)
        // tally rather than checking each intent against the stored filter
        // in isolation, so intents that stack on the same bucket within one
        // request (spec §4.7's `deduct_budget`-style atomic group) are
        // checked cumulatively instead of letting each one individually
        // pass a check the group as a whole cannot satisfy.
        let mut tallied: HashMap<(&str, u64), u32> = HashMap::new();
        let mut exhausted = Vec::new();
        for (index, intent) in request.budgets.iter().enumerate() {
            let bucket_key = (intent.budget_key_name.as_str(), intent.time_bucket);
            let remaining = *tallied.entry(bucket_key).or_insert_with(|| {
                guards
                    .get(intent.budget_key_name.as_str())
                    .expect("every key in the request was locked above")
                    .get(&intent.time_bucket)
                    .map(TokenFilter::remaining_budget)
                    .unwrap_or(default_capacity)
            });
            let tokens = intent.token_count as u32;
            if tokens > remaining {
                exhausted.push(index);
            } else {
                tallied.insert(bucket_key, remaining - tokens);
            }
        }

        if !exhausted.is_empty() {
            return ConsumeBudgetsResponse {
                budget_exhausted_indices: exhausted,
            };
        }

        for intent in &request.budgets {
            let buckets = guards
                .get_mut(intent.budget_key_name.as_str())
                .expect("every key in the request was locked above");
            let filter = buckets
                .entry(intent.time_bucket)
                .or_insert_with(|| TokenFilter::new(default_capacity));
            filter
                .try_consume(intent.token_count as u32)
                .expect("dry-run pass already proved this debit fits");
        }

        ConsumeBudgetsResponse::success()
    }

}

#[async_trait]
impl BudgetConsumptionHelper for InMemoryBudgetConsumptionHelper {
    async fn consume_budgets(
        &self,
        request: ConsumeBudgetsRequest,
    ) -> Result<ConsumeBudgetsResponse, PbsError> {
        // The critical section is synchronous (mutexes, no I/O), so this
        // runs directly rather than through `spawn_blocking`; a durable
        // storage-backed helper would dispatch to blocking I/O here instead.
        Ok(self.consume_sync(&request))
    }
}
