//! JSON request/response schemas for the v2 front end. See spec §6.
//!
//! Two request body versions are defined: v1.0 is a flat intent list, v2.0
//! groups intents under a per-group `reporting_origin` override. Both are
//! normalized into [`RawIntent`] before any budget-key joining or timestamp
//! conversion happens, so [`super::v2`]'s prepare handler only ever deals
//! with one shape past parsing.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::PbsError;

#[derive(Debug, Clone, Deserialize)]
struct VersionProbe {
    v: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WireIntent {
    key: String,
    token: u8,
    reporting_time: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WireBodyV1 {
    t: Vec<WireIntent>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireKeysGroupV2 {
    reporting_origin: String,
    keys: Vec<WireIntent>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireBodyV2 {
    data: Vec<WireKeysGroupV2>,
}

/// One intent after schema normalization, before canonical-name joining or
/// RFC-3339-to-nanoseconds conversion (spec §4.8 step 2-3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIntent {
    /// `Some` only for a v2.0 body's per-group override; `None` means "use
    /// the request's `transaction_origin`" (spec §4.8).
    pub reporting_origin_override: Option<String>,
    pub key: String,
    pub token: u8,
    pub reporting_time: String,
}

/// Parses a prepare/begin request body into its normalized intent list.
/// Unknown schema version -> `InvalidRequestBody`; missing/empty `t`/`data`
/// -> `NoKeysAvailable` (spec §4.8 step 2).
pub fn parse_prepare_body(bytes: &[u8]) -> Result<Vec<RawIntent>, PbsError> {
    let probe: VersionProbe = serde_json::from_slice(bytes)
        .map_err(|e| PbsError::InvalidBody(format!("malformed JSON body: {e}")))?;

    let intents = match probe.v.as_str() {
        "1.0" => {
            let body: WireBodyV1 = serde_json::from_slice(bytes)
                .map_err(|e| PbsError::InvalidBody(format!("malformed v1.0 body: {e}")))?;
            body.t
                .into_iter()
                .map(|i| RawIntent {
                    reporting_origin_override: None,
                    key: i.key,
                    token: i.token,
                    reporting_time: i.reporting_time,
                })
                .collect::<Vec<_>>()
        }
        "2.0" => {
            let body: WireBodyV2 = serde_json::from_slice(bytes)
                .map_err(|e| PbsError::InvalidBody(format!("malformed v2.0 body: {e}")))?;
            body.data
                .into_iter()
                .flat_map(|group| {
                    let origin = group.reporting_origin;
                    group.keys.into_iter().map(move |i| RawIntent {
                        reporting_origin_override: Some(origin.clone()),
                        key: i.key,
                        token: i.token,
                        reporting_time: i.reporting_time,
                    })
                })
                .collect::<Vec<_>>()
        }
        other => {
            return Err(PbsError::InvalidBody(format!(
                "unsupported request body version {other:?}"
            )))
        }
    };

    if intents.is_empty() {
        return Err(PbsError::NoKeysAvailable);
    }
    Ok(intents)
}

/// Validates `key` is non-empty and `token` is in `1..=255` (the latter is
/// already guaranteed by `token`'s `u8` type plus a non-zero check; spec
/// §4.8 step 2).
pub fn validate_intent_shape(intent: &RawIntent) -> Result<(), PbsError> {
    if intent.key.is_empty() {
        return Err(PbsError::InvalidBody("budget key must be non-empty".to_string()));
    }
    if intent.token == 0 {
        return Err(PbsError::InvalidBody(
            "token must be in 1..=255, got 0".to_string(),
        ));
    }
    Ok(())
}

/// Converts an RFC-3339 timestamp with a literal trailing `Z` into
/// nanoseconds since the Unix epoch. Spec §4.8 requires the trailing `Z`
/// specifically (not just a zero UTC offset spelled another way), so the
/// check is textual before the semantic parse.
pub fn rfc3339_to_nanos(reporting_time: &str) -> Result<u64, PbsError> {
    if !reporting_time.ends_with('Z') {
        return Err(PbsError::InvalidReportingTime(format!(
            "reporting_time must end in a literal 'Z': {reporting_time:?}"
        )));
    }
    let parsed = DateTime::parse_from_rfc3339(reporting_time).map_err(|e| {
        PbsError::InvalidReportingTime(format!("{reporting_time:?} is not RFC-3339: {e}"))
    })?;
    let nanos = parsed.timestamp_nanos_opt().ok_or_else(|| {
        PbsError::InvalidReportingTime(format!("{reporting_time:?} is out of range"))
    })?;
    if nanos < 0 {
        return Err(PbsError::InvalidReportingTime(format!(
            "{reporting_time:?} predates the Unix epoch"
        )));
    }
    Ok(nanos as u64)
}

/// The 409 budget-exhaustion response body (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct ExhaustedBody {
    pub f: Vec<usize>,
    pub v: &'static str,
}

impl ExhaustedBody {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { f: indices, v: "1.0" }
    }
}
