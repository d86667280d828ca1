//! `ConsumeBudgetMetadata` and the request/response envelope around a group
//! of consume intents. See spec §3 and §4.7.

use serde::{Deserialize, Serialize};

/// One consume intent. `token_count` is validated to be non-zero at
/// construction; there is no other way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeBudgetMetadata {
    pub budget_key_name: String,
    pub time_bucket: u64,
    pub token_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("token_count must be in 1..=255, got 0")]
pub struct ZeroTokenCount;

impl ConsumeBudgetMetadata {
    pub fn new(
        budget_key_name: impl Into<String>,
        time_bucket: u64,
        token_count: u8,
    ) -> Result<Self, ZeroTokenCount> {
        if token_count == 0 {
            return Err(ZeroTokenCount);
        }
        Ok(Self {
            budget_key_name: budget_key_name.into(),
            time_bucket,
            token_count,
        })
    }
}

/// A group of consume intents submitted as a single atomic unit.
#[derive(Debug, Clone, Default)]
pub struct ConsumeBudgetsRequest {
    pub budgets: Vec<ConsumeBudgetMetadata>,
}

/// Zero-based positions into the request's intent list that failed due to
/// insufficient budget. Every index appears at most once and lies in
/// `[0, len(request.budgets))`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeBudgetsResponse {
    pub budget_exhausted_indices: Vec<usize>,
}

impl ConsumeBudgetsResponse {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.budget_exhausted_indices.is_empty()
    }
}
