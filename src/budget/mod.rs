//! Budget keys, consume-intent metadata, the per-bucket token filter, its
//! keyed storage, and the atomic group-consumption helper. See spec §3,
//! §4.7.

pub mod filter;
pub mod helper;
pub mod key;
pub mod metadata;
pub mod storage;

pub use filter::{FilterError, TokenFilter};
pub use helper::{BudgetConsumptionHelper, InMemoryBudgetConsumptionHelper};
pub use key::BudgetKey;
pub use metadata::{ConsumeBudgetMetadata, ConsumeBudgetsRequest, ConsumeBudgetsResponse, ZeroTokenCount};
pub use storage::KeyedFilterStorage;
