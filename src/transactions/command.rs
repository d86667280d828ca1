//! `TransactionCommand` variants: `ConsumeBudget` and `BatchConsumeBudget`.
//! See spec §3, §4.6.
//!
//! Each variant supplies the five phase callbacks the framework drives in
//! fixed order. Both variants here delegate their actual budget work to a
//! [`BudgetConsumptionHelper`], which already performs the atomic
//! check-and-debit in one call (spec §4.7) — so `prepare` does the real
//! work and `commit` is a confirmation no-op, rather than the classic
//! two-phase split of "reserve" then "finalize". This collapses cleanly
//! because the v2 front end's `ConsumeBudgets` is already the authoritative
//! atomic operation; v1's framework exists to give legacy callers the
//! begin/prepare/commit/notify/abort/end shape they expect.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::budget::{BudgetConsumptionHelper, ConsumeBudgetMetadata, ConsumeBudgetsRequest};
use crate::dispatcher::ExecutionResult;

use super::error::CommandError;

/// One `{time_bucket, token_count, optional request_index}` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeBudgetTriple {
    pub time_bucket: u64,
    pub token_count: u8,
    pub request_index: Option<u32>,
}

#[async_trait]
pub trait CommandPhases: Send + Sync {
    async fn begin(&mut self) -> ExecutionResult<(), CommandError>;
    async fn prepare(&mut self) -> ExecutionResult<(), CommandError>;
    async fn commit(&mut self) -> ExecutionResult<(), CommandError>;
    async fn notify(&mut self) -> ExecutionResult<(), CommandError>;
    async fn abort(&mut self) -> ExecutionResult<(), CommandError>;
    async fn end(&mut self) -> ExecutionResult<(), CommandError>;

    fn transaction_id(&self) -> Uuid;
    fn command_id(&self) -> u8;
}

pub struct ConsumeBudgetCommand {
    pub transaction_id: Uuid,
    pub budget_key_name: String,
    pub triple: ConsumeBudgetTriple,
    helper: Arc<dyn BudgetConsumptionHelper>,
}

impl ConsumeBudgetCommand {
    pub fn new(
        transaction_id: Uuid,
        budget_key_name: impl Into<String>,
        triple: ConsumeBudgetTriple,
        helper: Arc<dyn BudgetConsumptionHelper>,
    ) -> Self {
        Self {
            transaction_id,
            budget_key_name: budget_key_name.into(),
            triple,
            helper,
        }
    }
}

#[async_trait]
impl CommandPhases for ConsumeBudgetCommand {
    async fn begin(&mut self) -> ExecutionResult<(), CommandError> {
        ExecutionResult::Success(())
    }

    async fn prepare(&mut self) -> ExecutionResult<(), CommandError> {
        let metadata = match ConsumeBudgetMetadata::new(
            self.budget_key_name.clone(),
            self.triple.time_bucket,
            self.triple.token_count,
        ) {
            Ok(m) => m,
            Err(e) => return ExecutionResult::Failure(CommandError::Other(e.to_string())),
        };
        match self
            .helper
            .consume_budgets(ConsumeBudgetsRequest {
                budgets: vec![metadata],
            })
            .await
        {
            Ok(response) if response.is_success() => ExecutionResult::Success(()),
            Ok(response) => ExecutionResult::Failure(CommandError::InsufficientBudget {
                failing_indices: response.budget_exhausted_indices,
            }),
            Err(e) => ExecutionResult::Failure(CommandError::Other(e.to_string())),
        }
    }

    async fn commit(&mut self) -> ExecutionResult<(), CommandError> {
        // The debit already happened atomically in `prepare`.
        ExecutionResult::Success(())
    }

    async fn notify(&mut self) -> ExecutionResult<(), CommandError> {
        ExecutionResult::Success(())
    }

    async fn abort(&mut self) -> ExecutionResult<(), CommandError> {
        ExecutionResult::Success(())
    }

    async fn end(&mut self) -> ExecutionResult<(), CommandError> {
        ExecutionResult::Success(())
    }

    fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    fn command_id(&self) -> u8 {
        1
    }
}

pub struct BatchConsumeBudgetCommand {
    pub transaction_id: Uuid,
    pub budget_key_name: String,
    pub triples: Vec<ConsumeBudgetTriple>,
    helper: Arc<dyn BudgetConsumptionHelper>,
}

impl BatchConsumeBudgetCommand {
    pub fn new(
        transaction_id: Uuid,
        budget_key_name: impl Into<String>,
        triples: Vec<ConsumeBudgetTriple>,
        helper: Arc<dyn BudgetConsumptionHelper>,
    ) -> Self {
        Self {
            transaction_id,
            budget_key_name: budget_key_name.into(),
            triples,
            helper,
        }
    }
}

#[async_trait]
impl CommandPhases for BatchConsumeBudgetCommand {
    async fn begin(&mut self) -> ExecutionResult<(), CommandError> {
        ExecutionResult::Success(())
    }

    async fn prepare(&mut self) -> ExecutionResult<(), CommandError> {
        let mut budgets = Vec::with_capacity(self.triples.len());
        for triple in &self.triples {
            match ConsumeBudgetMetadata::new(
                self.budget_key_name.clone(),
                triple.time_bucket,
                triple.token_count,
            ) {
                Ok(m) => budgets.push(m),
                Err(e) => return ExecutionResult::Failure(CommandError::Other(e.to_string())),
            }
        }
        match self
            .helper
            .consume_budgets(ConsumeBudgetsRequest { budgets })
            .await
        {
            Ok(response) if response.is_success() => ExecutionResult::Success(()),
            Ok(response) => ExecutionResult::Failure(CommandError::InsufficientBudget {
                failing_indices: response.budget_exhausted_indices,
            }),
            Err(e) => ExecutionResult::Failure(CommandError::Other(e.to_string())),
        }
    }

    async fn commit(&mut self) -> ExecutionResult<(), CommandError> {
        ExecutionResult::Success(())
    }

    async fn notify(&mut self) -> ExecutionResult<(), CommandError> {
        ExecutionResult::Success(())
    }

    async fn abort(&mut self) -> ExecutionResult<(), CommandError> {
        ExecutionResult::Success(())
    }

    async fn end(&mut self) -> ExecutionResult<(), CommandError> {
        ExecutionResult::Success(())
    }

    fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    fn command_id(&self) -> u8 {
        2
    }
}
