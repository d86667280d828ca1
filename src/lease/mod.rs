//! v1-only partition lease gate. See spec §4.12 and `original_source/cc/core/
//! interface/lease_manager_interface.h`.

pub mod manager;

pub use manager::{LeaseManager, LeaseTransition};
