//! Crate-wide error type and the §7 error-kind -> HTTP status mapping.
//!
//! Individual subsystems define their own small `thiserror` error enums
//! (`concurrency::QueueError`, `executor::ExecutorError`,
//! `transactions::error::CommandError`, ...) and convert into [`PbsError`]
//! only at the boundary where a result needs to be turned into an HTTP
//! response or a top-level log line. This mirrors the teacher's pattern of
//! small per-module errors consumed through a generic `ERR: From<...>`
//! bound rather than one giant enum threaded through every function.

use thiserror::Error;

/// Coarse error classification used to pick an HTTP status code and an error
/// counter bucket. See spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequestHeader,
    InvalidRequestBody,
    InvalidReportingTime,
    NoKeysAvailable,
    DuplicateKey,
    BudgetExhausted,
    NotRunning,
    QueueFull,
    DispatcherExhaustedRetries,
    InvalidCommandType,
    InvalidCommandVersion,
    Internal,
}

impl ErrorKind {
    /// Maps an error kind to the HTTP status code the front end must return.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidRequestHeader
            | ErrorKind::InvalidRequestBody
            | ErrorKind::InvalidReportingTime
            | ErrorKind::NoKeysAvailable
            | ErrorKind::DuplicateKey => 400,
            ErrorKind::BudgetExhausted => 409,
            ErrorKind::NotRunning | ErrorKind::QueueFull => 503,
            ErrorKind::DispatcherExhaustedRetries
            | ErrorKind::InvalidCommandType
            | ErrorKind::InvalidCommandVersion
            | ErrorKind::Internal => 500,
        }
    }

    /// True for errors that should be counted under `client_errors`, false
    /// for `server_errors`. See spec §4.8 step 5 and §7.
    pub fn is_client_error(self) -> bool {
        self.http_status() < 500 && self.http_status() != 503
    }
}

/// Top-level error type for cross-module boundaries (front end, orchestrator,
/// HTTP server). Internal error codes are never surfaced in a response body
/// (spec §7) — only `kind()` is used to shape the response; the `Display`
/// impl is for structured logs only.
#[derive(Debug, Error)]
pub enum PbsError {
    #[error("invalid request header: {0}")]
    InvalidHeader(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("invalid reporting time: {0}")]
    InvalidReportingTime(String),

    #[error("no budget keys present in request")]
    NoKeysAvailable,

    #[error("duplicate (key, reporting_time) in request: {0}")]
    DuplicateKey(String),

    #[error("budget exhausted for indices {0:?}")]
    BudgetExhausted(Vec<usize>),

    #[error("component is not running")]
    NotRunning,

    #[error("queue is at capacity")]
    QueueFull,

    #[error("operation dispatcher exhausted its retry budget")]
    DispatcherExhaustedRetries,

    #[error("unknown transaction command type")]
    InvalidCommandType,

    #[error("unsupported transaction command version")]
    InvalidCommandVersion,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PbsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PbsError::InvalidHeader(_) => ErrorKind::InvalidRequestHeader,
            PbsError::InvalidBody(_) => ErrorKind::InvalidRequestBody,
            PbsError::InvalidReportingTime(_) => ErrorKind::InvalidReportingTime,
            PbsError::NoKeysAvailable => ErrorKind::NoKeysAvailable,
            PbsError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            PbsError::BudgetExhausted(_) => ErrorKind::BudgetExhausted,
            PbsError::NotRunning => ErrorKind::NotRunning,
            PbsError::QueueFull => ErrorKind::QueueFull,
            PbsError::DispatcherExhaustedRetries => {
                ErrorKind::DispatcherExhaustedRetries
            }
            PbsError::InvalidCommandType => ErrorKind::InvalidCommandType,
            PbsError::InvalidCommandVersion => ErrorKind::InvalidCommandVersion,
            PbsError::Internal(_) => ErrorKind::Internal,
        }
    }
}
