//! Versioned (de)serialization of transaction command data. See spec §4.6.
//!
//! `CommandData` is the pure-data shape of a command (no phase callbacks,
//! no helper handle) — the part that actually needs to cross the wire or
//! hit a write-ahead log. `TransactionCommandLog` is the versioned envelope
//! around it: `{major, minor, command_id, body}`. Deserialization rejects
//! unknown `(command_id, version)` combinations up front.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::command::ConsumeBudgetTriple;
use super::error::CommandError;
use super::version::{CommandVersion, BATCH_CONSUME_BUDGET_V1_0, CONSUME_BUDGET_V1_0, CONSUME_BUDGET_V1_1};

const CONSUME_BUDGET_COMMAND_ID: u8 = 1;
const BATCH_CONSUME_BUDGET_COMMAND_ID: u8 = 2;

/// Pure-data representation of a transaction command, independent of the
/// runtime phase-callback implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandData {
    ConsumeBudget {
        transaction_id: Uuid,
        budget_key_name: String,
        triple: ConsumeBudgetTriple,
    },
    BatchConsumeBudget {
        transaction_id: Uuid,
        budget_key_name: String,
        triples: Vec<ConsumeBudgetTriple>,
    },
}

#[derive(Serialize, Deserialize)]
struct TransactionCommandLog {
    major: u8,
    minor: u8,
    command_id: u8,
    body: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct ConsumeBudgetBodyV1_0 {
    transaction_id: Uuid,
    budget_key_name: String,
    time_bucket: u64,
    token_count: u8,
}

#[derive(Serialize, Deserialize)]
struct ConsumeBudgetBodyV1_1 {
    transaction_id: Uuid,
    budget_key_name: String,
    time_bucket: u64,
    token_count: u8,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    request_index: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct ConsumeBudgetTripleWire {
    time_bucket: u64,
    token_count: u8,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    request_index: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct BatchConsumeBudgetBodyV1_0 {
    transaction_id: Uuid,
    budget_key_name: String,
    triples: Vec<ConsumeBudgetTripleWire>,
}

fn json_error(e: serde_json::Error) -> CommandError {
    CommandError::Other(format!("serialization error: {e}"))
}

pub fn serialize(command: &CommandData, version: CommandVersion) -> Result<Vec<u8>, CommandError> {
    let (command_id, body) = match (command, version) {
        (
            CommandData::ConsumeBudget {
                transaction_id,
                budget_key_name,
                triple,
            },
            v,
        ) if v == CONSUME_BUDGET_V1_0 => {
            let body = serde_json::to_value(ConsumeBudgetBodyV1_0 {
                transaction_id: *transaction_id,
                budget_key_name: budget_key_name.clone(),
                time_bucket: triple.time_bucket,
                token_count: triple.token_count,
            })
            .map_err(json_error)?;
            (CONSUME_BUDGET_COMMAND_ID, body)
        }
        (
            CommandData::ConsumeBudget {
                transaction_id,
                budget_key_name,
                triple,
            },
            v,
        ) if v == CONSUME_BUDGET_V1_1 => {
            let body = serde_json::to_value(ConsumeBudgetBodyV1_1 {
                transaction_id: *transaction_id,
                budget_key_name: budget_key_name.clone(),
                time_bucket: triple.time_bucket,
                token_count: triple.token_count,
                request_index: triple.request_index,
            })
            .map_err(json_error)?;
            (CONSUME_BUDGET_COMMAND_ID, body)
        }
        (
            CommandData::BatchConsumeBudget {
                transaction_id,
                budget_key_name,
                triples,
            },
            v,
        ) if v == BATCH_CONSUME_BUDGET_V1_0 => {
            let body = serde_json::to_value(BatchConsumeBudgetBodyV1_0 {
                transaction_id: *transaction_id,
                budget_key_name: budget_key_name.clone(),
                triples: triples
                    .iter()
                    .map(|t| ConsumeBudgetTripleWire {
                        time_bucket: t.time_bucket,
                        token_count: t.token_count,
                        request_index: t.request_index,
                    })
                    .collect(),
            })
            .map_err(json_error)?;
            (BATCH_CONSUME_BUDGET_COMMAND_ID, body)
        }
        _ => return Err(CommandError::InvalidCommandVersion),
    };

    let log = TransactionCommandLog {
        major: version.major,
        minor: version.minor,
        command_id,
        body,
    };
    serde_json::to_vec(&log).map_err(json_error)
}

pub fn deserialize(bytes: &[u8]) -> Result<CommandData, CommandError> {
    let log: TransactionCommandLog = serde_json::from_slice(bytes).map_err(json_error)?;
    let version = CommandVersion::new(log.major, log.minor);

    match log.command_id {
        CONSUME_BUDGET_COMMAND_ID if version == CONSUME_BUDGET_V1_0 => {
            let body: ConsumeBudgetBodyV1_0 = serde_json::from_value(log.body).map_err(json_error)?;
            Ok(CommandData::ConsumeBudget {
                transaction_id: body.transaction_id,
                budget_key_name: body.budget_key_name,
                triple: ConsumeBudgetTriple {
                    time_bucket: body.time_bucket,
                    token_count: body.token_count,
                    request_index: None,
                },
            })
        }
        CONSUME_BUDGET_COMMAND_ID if version == CONSUME_BUDGET_V1_1 => {
            let body: ConsumeBudgetBodyV1_1 = serde_json::from_value(log.body).map_err(json_error)?;
            Ok(CommandData::ConsumeBudget {
                transaction_id: body.transaction_id,
                budget_key_name: body.budget_key_name,
                triple: ConsumeBudgetTriple {
                    time_bucket: body.time_bucket,
                    token_count: body.token_count,
                    request_index: body.request_index,
                },
            })
        }
        BATCH_CONSUME_BUDGET_COMMAND_ID if version == BATCH_CONSUME_BUDGET_V1_0 => {
            let body: BatchConsumeBudgetBodyV1_0 =
                serde_json::from_value(log.body).map_err(json_error)?;
            Ok(CommandData::BatchConsumeBudget {
                transaction_id: body.transaction_id,
                budget_key_name: body.budget_key_name,
                triples: body
                    .triples
                    .into_iter()
                    .map(|t| ConsumeBudgetTriple {
                        time_bucket: t.time_bucket,
                        token_count: t.token_count,
                        request_index: t.request_index,
                    })
                    .collect(),
            })
        }
        CONSUME_BUDGET_COMMAND_ID | BATCH_CONSUME_BUDGET_COMMAND_ID => {
            Err(CommandError::InvalidCommandVersion)
        }
        _ => Err(CommandError::InvalidCommandType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_budget_round_trips_at_1_1_including_request_index() {
        let command = CommandData::ConsumeBudget {
            transaction_id: Uuid::from_u128(0x11),
            budget_key_name: "k".to_string(),
            triple: ConsumeBudgetTriple {
                time_bucket: 100,
                token_count: 2,
                request_index: Some(3),
            },
        };
        let bytes = serialize(&command, CONSUME_BUDGET_V1_1).unwrap();
        let round_tripped = deserialize(&bytes).unwrap();
        assert_eq!(round_tripped, command);
    }

    #[test]
    fn consume_budget_serialized_at_1_0_drops_request_index() {
        let command = CommandData::ConsumeBudget {
            transaction_id: Uuid::from_u128(0x11),
            budget_key_name: "k".to_string(),
            triple: ConsumeBudgetTriple {
                time_bucket: 100,
                token_count: 2,
                request_index: Some(3),
            },
        };
        let bytes = serialize(&command, CONSUME_BUDGET_V1_0).unwrap();
        let round_tripped = deserialize(&bytes).unwrap();
        match round_tripped {
            CommandData::ConsumeBudget { triple, .. } => assert_eq!(triple.request_index, None),
            _ => panic!("expected ConsumeBudget"),
        }
    }

    #[test]
    fn unknown_version_is_rejected() {
        let bytes = br#"{"major":9,"minor":9,"command_id":1,"body":{}}"#;
        assert_eq!(deserialize(bytes), Err(CommandError::InvalidCommandVersion));
    }

    #[test]
    fn unknown_command_id_is_rejected() {
        let bytes = br#"{"major":1,"minor":0,"command_id":99,"body":{}}"#;
        assert_eq!(deserialize(bytes), Err(CommandError::InvalidCommandType));
    }

    #[test]
    fn batch_consume_budget_round_trips_at_1_0() {
        let command = CommandData::BatchConsumeBudget {
            transaction_id: Uuid::from_u128(0x22),
            budget_key_name: "k".to_string(),
            triples: vec![
                ConsumeBudgetTriple { time_bucket: 1, token_count: 1, request_index: None },
                ConsumeBudgetTriple { time_bucket: 2, token_count: 5, request_index: None },
            ],
        };
        let bytes = serialize(&command, BATCH_CONSUME_BUDGET_V1_0).unwrap();
        assert_eq!(deserialize(&bytes).unwrap(), command);
    }
}
