//! Versioning for serialized transaction commands. See spec §4.6.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandVersion {
    pub major: u8,
    pub minor: u8,
}

impl CommandVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

pub const CONSUME_BUDGET_V1_0: CommandVersion = CommandVersion::new(1, 0);
pub const CONSUME_BUDGET_V1_1: CommandVersion = CommandVersion::new(1, 1);
pub const BATCH_CONSUME_BUDGET_V1_0: CommandVersion = CommandVersion::new(1, 0);
