//! The v1 two-phase-commit transaction command framework: versioned
//! commands, their phase callbacks, the driver, and wire serialization. See
//! spec §4.6.

pub mod command;
pub mod error;
pub mod framework;
pub mod serialization;
pub mod version;

pub use command::{BatchConsumeBudgetCommand, CommandPhases, ConsumeBudgetCommand, ConsumeBudgetTriple};
pub use error::CommandError;
pub use framework::{TransactionFramework, TransactionOutcome};
pub use serialization::{deserialize, serialize, CommandData};
pub use version::{CommandVersion, BATCH_CONSUME_BUDGET_V1_0, CONSUME_BUDGET_V1_0, CONSUME_BUDGET_V1_1};
