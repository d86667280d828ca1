//! Drives a [`CommandPhases`] implementation through the fixed
//! `begin -> prepare -> commit -> (notify|abort) -> end` order, retrying
//! individual phases with the same exponential-backoff policy as
//! [`crate::dispatcher::OperationDispatcher`] (spec §4.6).

use log::{error, warn};

use crate::dispatcher::{backoff_duration, DispatcherConfig, ExecutionResult};

use super::command::CommandPhases;
use super::error::CommandError;

pub enum TransactionOutcome {
    Success,
    Failure(CommandError),
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Begin,
    Prepare,
    Commit,
    Notify,
    Abort,
    End,
}

async fn call_phase(
    command: &mut dyn CommandPhases,
    phase: Phase,
) -> ExecutionResult<(), CommandError> {
    match phase {
        Phase::Begin => command.begin().await,
        Phase::Prepare => command.prepare().await,
        Phase::Commit => command.commit().await,
        Phase::Notify => command.notify().await,
        Phase::Abort => command.abort().await,
        Phase::End => command.end().await,
    }
}

pub struct TransactionFramework {
    config: DispatcherConfig,
}

impl TransactionFramework {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    async fn drive_with_retry(
        &self,
        command: &mut dyn CommandPhases,
        phase: Phase,
    ) -> ExecutionResult<(), CommandError> {
        let mut attempt = 0u32;
        loop {
            match call_phase(command, phase).await {
                ExecutionResult::Success(()) => return ExecutionResult::Success(()),
                ExecutionResult::Failure(e) => return ExecutionResult::Failure(e),
                ExecutionResult::Retry(e) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        warn!("transaction {phase:?} phase exhausted retries: {e}");
                        return ExecutionResult::Failure(CommandError::DispatcherExhaustedRetries);
                    }
                    tokio::time::sleep(backoff_duration(&self.config, attempt)).await;
                }
            }
        }
    }

    /// Drives `command` through its full lifecycle, returning the terminal
    /// outcome. `notify`/`abort`/`end` failures are logged but never change
    /// the already-determined outcome (spec §4.6: "after retries exhaust
    /// they are logged and the transaction is considered terminal").
    pub async fn run(&self, command: &mut dyn CommandPhases) -> TransactionOutcome {
        if let ExecutionResult::Failure(e) = self.drive_with_retry(command, Phase::Begin).await {
            return self.abort_and_fail(command, e).await;
        }
        if let ExecutionResult::Failure(e) = self.drive_with_retry(command, Phase::Prepare).await {
            return self.abort_and_fail(command, e).await;
        }
        if let ExecutionResult::Failure(e) = self.drive_with_retry(command, Phase::Commit).await {
            return self.abort_and_fail(command, e).await;
        }

        if let ExecutionResult::Failure(e) = self.drive_with_retry(command, Phase::Notify).await {
            warn!(
                "transaction {} notify phase failed terminally: {e}",
                command.transaction_id()
            );
        }
        let _ = self.drive_with_retry(command, Phase::End).await;
        TransactionOutcome::Success
    }

    async fn abort_and_fail(
        &self,
        command: &mut dyn CommandPhases,
        original: CommandError,
    ) -> TransactionOutcome {
        if let ExecutionResult::Failure(e) = self.drive_with_retry(command, Phase::Abort).await {
            error!(
                "transaction {} abort phase failed terminally: {e}",
                command.transaction_id()
            );
        }
        let _ = self.drive_with_retry(command, Phase::End).await;
        TransactionOutcome::Failure(original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    struct ScriptedCommand {
        prepare_outcome: ExecutionResultScript,
        calls: Arc<AtomicU32>,
    }

    enum ExecutionResultScript {
        Success,
        InsufficientBudget,
    }

    #[async_trait]
    impl CommandPhases for ScriptedCommand {
        async fn begin(&mut self) -> ExecutionResult<(), CommandError> {
            ExecutionResult::Success(())
        }
        async fn prepare(&mut self) -> ExecutionResult<(), CommandError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.prepare_outcome {
                ExecutionResultScript::Success => ExecutionResult::Success(()),
                ExecutionResultScript::InsufficientBudget => {
                    ExecutionResult::Failure(CommandError::InsufficientBudget {
                        failing_indices: vec![0],
                    })
                }
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
            Uuid::nil()
        }
        fn command_id(&self) -> u8 {
            1
        }
    }

    #[tokio::test]
    async fn successful_prepare_drives_commit_and_notify() {
        let framework = TransactionFramework::new(DispatcherConfig::default());
        let mut command = ScriptedCommand {
            prepare_outcome: ExecutionResultScript::Success,
            calls: Arc::new(AtomicU32::new(0)),
        };
        let outcome = framework.run(&mut command).await;
        assert!(matches!(outcome, TransactionOutcome::Success));
    }

    #[tokio::test]
    async fn insufficient_budget_in_prepare_drives_abort_and_fails() {
        let framework = TransactionFramework::new(DispatcherConfig::default());
        let mut command = ScriptedCommand {
            prepare_outcome: ExecutionResultScript::InsufficientBudget,
            calls: Arc::new(AtomicU32::new(0)),
        };
        let outcome = framework.run(&mut command).await;
        match outcome {
            TransactionOutcome::Failure(CommandError::InsufficientBudget { failing_indices }) => {
                assert_eq!(failing_indices, vec![0]);
            }
            _ => panic!("expected InsufficientBudget failure"),
        }
    }
}
