//! End-to-end test of the v1 two-phase-commit command framework (spec
//! §4.6) driven against the real in-memory budget helper: a
//! `ConsumeBudgetCommand` that fits its bucket commits successfully, one
//! that doesn't is aborted and reported as `InsufficientBudget` without
//! debiting anything.

use std::sync::Arc;

use pbs::budget::InMemoryBudgetConsumptionHelper;
use pbs::dispatcher::DispatcherConfig;
use pbs::transactions::{
    CommandError, ConsumeBudgetCommand, ConsumeBudgetTriple, TransactionFramework,
    TransactionOutcome,
};
use uuid::Uuid;

#[tokio::test]
async fn command_within_budget_runs_through_commit_and_notify() {
    let helper = Arc::new(InMemoryBudgetConsumptionHelper::new(10));
    let framework = TransactionFramework::new(DispatcherConfig::default());

    let mut command = ConsumeBudgetCommand::new(
        Uuid::new_v4(),
        "reporting.example/campaign-1",
        ConsumeBudgetTriple {
            time_bucket: 1,
            token_count: 4,
            request_index: None,
        },
        helper,
    );

    let outcome = framework.run(&mut command).await;
    assert!(matches!(outcome, TransactionOutcome::Success));
}

#[tokio::test]
async fn command_exceeding_budget_is_aborted_and_reports_insufficient_budget() {
    let helper = Arc::new(InMemoryBudgetConsumptionHelper::new(3));
    let framework = TransactionFramework::new(DispatcherConfig::default());

    let mut command = ConsumeBudgetCommand::new(
        Uuid::new_v4(),
        "reporting.example/campaign-2",
        ConsumeBudgetTriple {
            time_bucket: 1,
            token_count: 200,
            request_index: Some(0),
        },
        helper.clone(),
    );

    let outcome = framework.run(&mut command).await;
    match outcome {
        TransactionOutcome::Failure(CommandError::InsufficientBudget { failing_indices }) => {
            assert_eq!(failing_indices, vec![0]);
        }
        _ => panic!("expected an InsufficientBudget failure"),
    }

    // Nothing was debited: a fresh command for the same key/bucket that
    // fits within the bucket's capacity must still succeed.
    let mut retry = ConsumeBudgetCommand::new(
        Uuid::new_v4(),
        "reporting.example/campaign-2",
        ConsumeBudgetTriple {
            time_bucket: 1,
            token_count: 3,
            request_index: None,
        },
        helper,
    );
    let retry_outcome = framework.run(&mut retry).await;
    assert!(matches!(retry_outcome, TransactionOutcome::Success));
}
