//! The v2 "relaxed consistency" request path: seven fixed endpoints, of
//! which only `prepare` performs work. See spec §4.8.
//!
//! `begin`/`commit`/`notify`/`abort`/`end` share one [`NoOpPhaseHandler`]
//! parameterized by phase name and whether `x-gscp-transaction-last-
//! execution-timestamp` is required (only `begin` omits it). `status`
//! always 404s, matching the v1-compat surface being retired. `prepare`
//! is the only endpoint with real logic and its own [`PrepareHandler`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::Method;
use log::error;

use crate::authz::{AuthorizationMetadata, AuthorizationProxy};
use crate::budget::{BudgetConsumptionHelper, BudgetKey, ConsumeBudgetMetadata, ConsumeBudgetsRequest};
use crate::error::{ErrorKind, PbsError};
use crate::http::headers::{raw_header, BACK_COMPAT_TIMESTAMP, CLAIMED_IDENTITY, LAST_EXECUTION_TIMESTAMP};
use crate::http::{Handler, HandlerRequest, HandlerResponse, RouterBuilder, TransactionHeaders};
use crate::metrics::router::MetricName;
use crate::metrics::MetricRouter;

use super::wire::{self, ExhaustedBody};

/// Shared dependencies every v2 handler closes over. One instance is built
/// at orchestrator wiring time and cloned (as an `Arc`) into each handler.
pub struct FrontEndState {
    pub budget_helper: Arc<dyn BudgetConsumptionHelper>,
    pub authz_proxy: Arc<dyn AuthorizationProxy>,
    pub metrics: Arc<MetricRouter>,
    /// Identity string that marks coordinator traffic (spec §6
    /// `google_scp_pbs_remote_claimed_identity`). Compared against the
    /// request's `x-gscp-claimed-identity` header to pick the `Coordinator`
    /// vs `Operator` metric label (spec §4.8).
    pub remote_coordinator_claimed_identity: Option<String>,
}

/// `Coordinator` if the request's claimed identity matches the configured
/// remote-coordinator identity, `Operator` otherwise (spec §4.8).
fn reporting_origin_label(
    claimed_identity: Option<&str>,
    remote_coordinator_claimed_identity: &Option<String>,
) -> &'static str {
    match (claimed_identity, remote_coordinator_claimed_identity) {
        (Some(identity), Some(configured)) if identity == configured => "Coordinator",
        _ => "Operator",
    }
}

fn label_for(state: &FrontEndState, request: &HandlerRequest) -> &'static str {
    reporting_origin_label(
        raw_header(&request.headers, CLAIMED_IDENTITY),
        &state.remote_coordinator_claimed_identity,
    )
}

fn ok_with_backcompat_header() -> HandlerResponse {
    HandlerResponse::empty(200)
        .with_header(LAST_EXECUTION_TIMESTAMP, BACK_COMPAT_TIMESTAMP.to_string())
}

/// `begin`/`commit`/`notify`/`abort`/`end`: validate headers, otherwise do
/// nothing (spec §4.8, §7 "Deprecation").
struct NoOpPhaseHandler {
    state: Arc<FrontEndState>,
    phase: &'static str,
    require_last_execution_timestamp: bool,
}

#[async_trait]
impl Handler for NoOpPhaseHandler {
    async fn handle(&self, request: HandlerRequest) -> HandlerResponse {
        let label = label_for(&self.state, &request);
        self.state
            .metrics
            .increment(MetricName::TotalRequests, self.phase, label);
        match TransactionHeaders::extract(&request.headers, self.require_last_execution_timestamp) {
            Ok(_) => ok_with_backcompat_header(),
            Err(_) => {
                self.state
                    .metrics
                    .increment(MetricName::ClientErrors, self.phase, label);
                HandlerResponse::empty(400)
            }
        }
    }
}

/// `GET /v1/transactions:status`: unconditional 404, signaling the v2
/// relaxed-consistency regime never tracked server-side transaction state
/// (spec §4.8, §7 "Deprecation").
struct StatusHandler;

#[async_trait]
impl Handler for StatusHandler {
    async fn handle(&self, _request: HandlerRequest) -> HandlerResponse {
        HandlerResponse::empty(404)
    }
}

/// `POST /v1/transactions:prepare` (aliased as `/v1/budget:consume`): the
/// one endpoint that actually consumes budget (spec §4.8).
struct PrepareHandler {
    state: Arc<FrontEndState>,
}

impl PrepareHandler {
    async fn resolve_authorized_domain(
        &self,
        headers: &TransactionHeaders,
    ) -> Result<String, PbsError> {
        let metadata = AuthorizationMetadata {
            claimed_identity: headers.claimed_identity.clone().unwrap_or_default(),
            authorization_token: headers.transaction_secret.clone(),
        };
        self.state
            .authz_proxy
            .authorize(metadata)
            .await
            .map(|authorized| authorized.authorized_domain)
            .map_err(|e| PbsError::InvalidHeader(format!("authorization failed: {e}")))
    }

    /// The full parse -> authorize -> consume pipeline (spec §4.8 steps
    /// 2-5). Errors are mapped to their HTTP status by the caller.
    async fn process(&self, headers: &TransactionHeaders, body: &[u8]) -> Result<(), PbsError> {
        let raw_intents = wire::parse_prepare_body(body)?;
        for intent in &raw_intents {
            wire::validate_intent_shape(intent)?;
        }

        let mut seen: HashSet<(&str, &str)> = HashSet::with_capacity(raw_intents.len());
        for intent in &raw_intents {
            if !seen.insert((intent.key.as_str(), intent.reporting_time.as_str())) {
                return Err(PbsError::DuplicateKey(intent.key.clone()));
            }
        }

        let header_origin = headers
            .transaction_origin
            .clone()
            .filter(|origin| !origin.is_empty());
        let needs_authorized_domain = header_origin.is_none()
            && raw_intents
                .iter()
                .any(|i| i.reporting_origin_override.is_none());
        let authorized_domain = if needs_authorized_domain {
            Some(self.resolve_authorized_domain(headers).await?)
        } else {
            None
        };

        let mut budgets = Vec::with_capacity(raw_intents.len());
        for intent in &raw_intents {
            let origin = intent
                .reporting_origin_override
                .clone()
                .or_else(|| header_origin.clone())
                .or_else(|| authorized_domain.clone())
                .expect("needs_authorized_domain guarantees an origin is always resolvable");
            let time_bucket = wire::rfc3339_to_nanos(&intent.reporting_time)?;
            let key = BudgetKey::new(origin, intent.key.clone());
            let metadata = ConsumeBudgetMetadata::new(key.canonical_name(), time_bucket, intent.token)
                .map_err(|e| PbsError::InvalidBody(e.to_string()))?;
            budgets.push(metadata);
        }

        let response = self
            .state
            .budget_helper
            .consume_budgets(ConsumeBudgetsRequest { budgets })
            .await?;

        if response.is_success() {
            Ok(())
        } else {
            Err(PbsError::BudgetExhausted(response.budget_exhausted_indices))
        }
    }

    fn error_response(&self, err: PbsError, label: &'static str) -> HandlerResponse {
        match err.kind() {
            ErrorKind::BudgetExhausted => {
                self.state
                    .metrics
                    .increment(MetricName::ClientErrors, "prepare", label);
                let PbsError::BudgetExhausted(indices) = err else {
                    unreachable!("kind() == BudgetExhausted implies this variant");
                };
                let body = serde_json::to_vec(&ExhaustedBody::new(indices))
                    .expect("ExhaustedBody always serializes");
                HandlerResponse::json(409, body)
            }
            kind if kind.is_client_error() => {
                self.state
                    .metrics
                    .increment(MetricName::ClientErrors, "prepare", label);
                HandlerResponse::empty(kind.http_status())
            }
            kind => {
                error!("prepare handler failed: {err}");
                self.state
                    .metrics
                    .increment(MetricName::ServerErrors, "prepare", label);
                HandlerResponse::empty(kind.http_status())
            }
        }
    }
}

#[async_trait]
impl Handler for PrepareHandler {
    async fn handle(&self, request: HandlerRequest) -> HandlerResponse {
        let label = label_for(&self.state, &request);
        self.state
            .metrics
            .increment(MetricName::TotalRequests, "prepare", label);

        let headers = match TransactionHeaders::extract(&request.headers, true) {
            Ok(h) => h,
            Err(_) => {
                self.state
                    .metrics
                    .increment(MetricName::ClientErrors, "prepare", label);
                return HandlerResponse::empty(400);
            }
        };

        match self.process(&headers, &request.body).await {
            Ok(()) => ok_with_backcompat_header(),
            Err(err) => self.error_response(err, label),
        }
    }
}

/// Registers all seven v2 endpoints plus the `health/check` and
/// `budget:consume` aliases (spec §4.8 table) onto `builder`.
pub fn register_routes(builder: &mut RouterBuilder, state: Arc<FrontEndState>) {
    let begin: Arc<dyn Handler> = Arc::new(NoOpPhaseHandler {
        state: state.clone(),
        phase: "begin",
        require_last_execution_timestamp: false,
    });
    let prepare: Arc<dyn Handler> = Arc::new(PrepareHandler {
        state: state.clone(),
    });

    builder
        .register(Method::POST, "/v1/transactions:begin", begin.clone())
        .register(Method::POST, "/health/check", begin)
        .register(Method::POST, "/v1/transactions:prepare", prepare.clone())
        .register(Method::POST, "/v1/budget:consume", prepare)
        .register(
            Method::POST,
            "/v1/transactions:commit",
            Arc::new(NoOpPhaseHandler {
                state: state.clone(),
                phase: "commit",
                require_last_execution_timestamp: true,
            }),
        )
        .register(
            Method::POST,
            "/v1/transactions:notify",
            Arc::new(NoOpPhaseHandler {
                state: state.clone(),
                phase: "notify",
                require_last_execution_timestamp: true,
            }),
        )
        .register(
            Method::POST,
            "/v1/transactions:abort",
            Arc::new(NoOpPhaseHandler {
                state: state.clone(),
                phase: "abort",
                require_last_execution_timestamp: true,
            }),
        )
        .register(
            Method::POST,
            "/v1/transactions:end",
            Arc::new(NoOpPhaseHandler {
                state,
                phase: "end",
                require_last_execution_timestamp: true,
            }),
        )
        .register(Method::GET, "/v1/transactions:status", Arc::new(StatusHandler));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{AuthorizationError, AuthorizedMetadata};
    use crate::budget::ConsumeBudgetsResponse;
    use crate::http::Router;
    use hyper::header::{HeaderName, HeaderValue};
    use hyper::HeaderMap;
    use uuid::Uuid;

    struct ScriptedHelper {
        exhausted_indices: Vec<usize>,
    }

    #[async_trait]
    impl BudgetConsumptionHelper for ScriptedHelper {
        async fn consume_budgets(
            &self,
            request: ConsumeBudgetsRequest,
        ) -> Result<ConsumeBudgetsResponse, PbsError> {
            if self.exhausted_indices.is_empty() {
                return Ok(ConsumeBudgetsResponse::success());
            }
            let _ = request;
            Ok(ConsumeBudgetsResponse {
                budget_exhausted_indices: self.exhausted_indices.clone(),
            })
        }
    }

    struct EchoAuthzProxy;

    #[async_trait]
    impl AuthorizationProxy for EchoAuthzProxy {
        async fn authorize(
            &self,
            metadata: AuthorizationMetadata,
        ) -> Result<AuthorizedMetadata, AuthorizationError> {
            Ok(AuthorizedMetadata {
                authorized_domain: format!("authorized:{}", metadata.claimed_identity),
            })
        }
    }

    fn state_with(exhausted_indices: Vec<usize>) -> Arc<FrontEndState> {
        Arc::new(FrontEndState {
            budget_helper: Arc::new(ScriptedHelper { exhausted_indices }),
            authz_proxy: Arc::new(EchoAuthzProxy),
            metrics: Arc::new(MetricRouter::new(true)),
            remote_coordinator_claimed_identity: Some("coordinator-b".to_string()),
        })
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    fn prepare_request(body: &str, extra_headers: &[(&str, &str)]) -> HandlerRequest {
        let mut pairs = vec![
            ("x-gscp-transaction-id", Uuid::new_v4().to_string()),
            ("x-gscp-transaction-secret", "secret".to_string()),
            ("x-gscp-transaction-last-execution-timestamp", "0".to_string()),
        ];
        pairs.extend(extra_headers.iter().map(|(k, v)| (*k, v.to_string())));
        let owned: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        HandlerRequest {
            method: Method::POST,
            path: "/v1/transactions:prepare".to_string(),
            headers: headers(&owned),
            body: body.as_bytes().to_vec(),
        }
    }

    fn router_with(state: Arc<FrontEndState>) -> Arc<Router> {
        let mut builder = RouterBuilder::new();
        register_routes(&mut builder, state);
        builder.freeze()
    }

    #[tokio::test]
    async fn s1_simple_accept_returns_200_with_empty_body() {
        let state = state_with(vec![]);
        let router = router_with(state.clone());
        let body = r#"{"v":"1.0","t":[{"key":"foo","token":5,"reporting_time":"2021-01-01T00:00:00Z"}]}"#;
        let response = router.dispatch(prepare_request(body, &[])).await;
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
        assert_eq!(
            state.metrics.get(MetricName::TotalRequests, "prepare", "Operator"),
            1
        );
        assert_eq!(
            state.metrics.get(MetricName::ClientErrors, "prepare", "Operator"),
            0
        );
    }

    #[tokio::test]
    async fn s2_partial_exhaustion_returns_409_with_failing_indices() {
        let state = state_with(vec![1]);
        let router = router_with(state.clone());
        let body = r#"{"v":"1.0","t":[
            {"key":"a","token":1,"reporting_time":"2021-01-01T00:00:00Z"},
            {"key":"b","token":1,"reporting_time":"2021-01-01T00:00:01Z"},
            {"key":"c","token":1,"reporting_time":"2021-01-01T00:00:02Z"}
        ]}"#;
        let response = router.dispatch(prepare_request(body, &[])).await;
        assert_eq!(response.status, 409);
        assert_eq!(response.body, br#"{"f":[1],"v":"1.0"}"#);
        assert_eq!(
            state.metrics.get(MetricName::ClientErrors, "prepare", "Operator"),
            1
        );
    }

    #[tokio::test]
    async fn s3_missing_secret_header_returns_400_without_calling_the_helper() {
        let state = state_with(vec![]);
        let router = router_with(state.clone());
        let mut request = prepare_request(
            r#"{"v":"1.0","t":[{"key":"foo","token":1,"reporting_time":"2021-01-01T00:00:00Z"}]}"#,
            &[],
        );
        request.headers.remove("x-gscp-transaction-secret");
        let response = router.dispatch(request).await;
        assert_eq!(response.status, 400);
        assert_eq!(
            state.metrics.get(MetricName::TotalRequests, "prepare", "Operator"),
            1
        );
        assert_eq!(
            state.metrics.get(MetricName::ClientErrors, "prepare", "Operator"),
            1
        );
    }

    #[tokio::test]
    async fn s4_begin_commit_notify_abort_end_are_no_ops_with_backcompat_header() {
        let state = state_with(vec![]);
        let router = router_with(state);
        for path in [
            "/v1/transactions:begin",
            "/v1/transactions:commit",
            "/v1/transactions:notify",
            "/v1/transactions:abort",
            "/v1/transactions:end",
        ] {
            let require_last_execution_timestamp = path != "/v1/transactions:begin";
            let mut base_headers = vec![
                ("x-gscp-transaction-id", Uuid::new_v4().to_string()),
                ("x-gscp-transaction-secret", "secret".to_string()),
            ];
            if require_last_execution_timestamp {
                base_headers.push((
                    "x-gscp-transaction-last-execution-timestamp",
                    "0".to_string(),
                ));
            }
            let owned: Vec<(&str, &str)> =
                base_headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
            let request = HandlerRequest {
                method: Method::POST,
                path: path.to_string(),
                headers: headers(&owned),
                body: Vec::new(),
            };
            let response = router.dispatch(request).await;
            assert_eq!(response.status, 200, "path {path} should be a no-op 200");
            assert!(response
                .headers
                .iter()
                .any(|(name, value)| *name == LAST_EXECUTION_TIMESTAMP && value == BACK_COMPAT_TIMESTAMP));
        }
    }

    #[tokio::test]
    async fn status_endpoint_always_returns_404() {
        let state = state_with(vec![]);
        let router = router_with(state);
        let request = HandlerRequest {
            method: Method::GET,
            path: "/v1/transactions:status".to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        assert_eq!(router.dispatch(request).await.status, 404);
    }

    #[tokio::test]
    async fn duplicate_key_and_reporting_time_pair_is_rejected() {
        let state = state_with(vec![]);
        let router = router_with(state);
        let body = r#"{"v":"1.0","t":[
            {"key":"foo","token":1,"reporting_time":"2021-01-01T00:00:00Z"},
            {"key":"foo","token":1,"reporting_time":"2021-01-01T00:00:00Z"}
        ]}"#;
        let response = router.dispatch(prepare_request(body, &[])).await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn claimed_identity_matching_configured_coordinator_emits_coordinator_label() {
        let state = state_with(vec![]);
        let router = router_with(state.clone());
        let body = r#"{"v":"1.0","t":[{"key":"foo","token":1,"reporting_time":"2021-01-01T00:00:00Z"}]}"#;
        let response = router
            .dispatch(prepare_request(body, &[("x-gscp-claimed-identity", "coordinator-b")]))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(
            state
                .metrics
                .get(MetricName::TotalRequests, "prepare", "Coordinator"),
            1
        );
    }

    #[tokio::test]
    async fn v2_schema_per_group_origin_overrides_authorization() {
        let state = state_with(vec![]);
        let router = router_with(state);
        let body = r#"{"v":"2.0","data":[{"reporting_origin":"explicit.example","keys":[{"key":"foo","token":1,"reporting_time":"2021-01-01T00:00:00Z"}]}]}"#;
        let response = router.dispatch(prepare_request(body, &[])).await;
        assert_eq!(response.status, 200);
    }
}
