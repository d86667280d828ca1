//! Common header extraction for the v2 front end. See spec §4.8.
//!
//! Every endpoint except `GET /v1/transactions:status` extracts the same
//! five `x-gscp-*` headers; only the validation rules differ slightly
//! between `begin` (no last-execution-timestamp requirement) and every
//! other phase. Both shapes are extracted through [`TransactionHeaders::extract`]
//! with a `require_last_execution_timestamp` flag rather than two near-
//! duplicate functions.

use hyper::HeaderMap;
use uuid::Uuid;

pub const TRANSACTION_ID: &str = "x-gscp-transaction-id";
pub const TRANSACTION_SECRET: &str = "x-gscp-transaction-secret";
pub const LAST_EXECUTION_TIMESTAMP: &str = "x-gscp-transaction-last-execution-timestamp";
pub const TRANSACTION_ORIGIN: &str = "x-gscp-transaction-origin";
pub const CLAIMED_IDENTITY: &str = "x-gscp-claimed-identity";

/// Literal back-compat timestamp value every 2xx response carries (spec
/// §4.8 "InsertBackwardCompatibleHeaders", §6, §9 open question: clients
/// must not parse this value, only observe its presence).
pub const BACK_COMPAT_TIMESTAMP: &str = "1234";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHeaders {
    pub transaction_id: Uuid,
    pub transaction_secret: String,
    pub last_execution_timestamp: Option<String>,
    pub transaction_origin: Option<String>,
    pub claimed_identity: Option<String>,
}

/// Header validation failed. The front end maps this to 400
/// `InvalidRequestHeader` (spec §4.8, §7) regardless of which header or
/// rule tripped; the variant is kept only for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("missing or empty x-gscp-transaction-id")]
    MissingTransactionId,
    #[error("x-gscp-transaction-id is not a canonical UUID")]
    InvalidTransactionId,
    #[error("missing or empty x-gscp-transaction-secret")]
    MissingTransactionSecret,
    #[error("missing x-gscp-transaction-last-execution-timestamp")]
    MissingLastExecutionTimestamp,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reads a single header as a `&str` without any of [`TransactionHeaders::extract`]'s
/// validation. Used for metric-label derivation, which must work even on
/// requests whose headers otherwise fail validation (spec §4.8 step 1: the
/// client-error counter increments regardless of which header was bad).
pub fn raw_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    header_str(headers, name)
}

impl TransactionHeaders {
    /// Extracts and validates the common header set. `require_last_execution_timestamp`
    /// is `false` only for the begin-transaction handler (spec §4.8).
    pub fn extract(
        headers: &HeaderMap,
        require_last_execution_timestamp: bool,
    ) -> Result<Self, HeaderError> {
        let raw_id = header_str(headers, TRANSACTION_ID)
            .filter(|v| !v.is_empty())
            .ok_or(HeaderError::MissingTransactionId)?;
        let transaction_id =
            Uuid::parse_str(raw_id).map_err(|_| HeaderError::InvalidTransactionId)?;

        let transaction_secret = header_str(headers, TRANSACTION_SECRET)
            .filter(|v| !v.is_empty())
            .ok_or(HeaderError::MissingTransactionSecret)?
            .to_string();

        let last_execution_timestamp = header_str(headers, LAST_EXECUTION_TIMESTAMP)
            .map(|v| v.to_string());
        if require_last_execution_timestamp && last_execution_timestamp.is_none() {
            return Err(HeaderError::MissingLastExecutionTimestamp);
        }

        let transaction_origin = header_str(headers, TRANSACTION_ORIGIN)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());
        let claimed_identity = header_str(headers, CLAIMED_IDENTITY)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());

        Ok(Self {
            transaction_id,
            transaction_secret,
            last_execution_timestamp,
            transaction_origin,
            claimed_identity,
        })
    }
}
