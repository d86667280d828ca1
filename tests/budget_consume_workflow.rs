//! End-to-end black-box test of the v2 front end wired to the in-memory
//! budget helper: a client that repeatedly calls `/v1/transactions:prepare`
//! against the same key eventually exhausts its bucket and gets back the
//! exact positional index, while an independent key is unaffected.

use std::sync::Arc;

use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method};
use uuid::Uuid;

use pbs::authz::PassThroughAuthorizationProxy;
use pbs::budget::InMemoryBudgetConsumptionHelper;
use pbs::frontend::{register_routes, FrontEndState};
use pbs::http::{HandlerRequest, RouterBuilder};
use pbs::metrics::MetricRouter;

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

fn prepare_request(body: &str) -> HandlerRequest {
    HandlerRequest {
        method: Method::POST,
        path: "/v1/transactions:prepare".to_string(),
        headers: headers(&[
            ("x-gscp-transaction-id", &Uuid::new_v4().to_string()),
            ("x-gscp-transaction-secret", "s"),
            ("x-gscp-transaction-last-execution-timestamp", "0"),
            ("x-gscp-transaction-origin", "reporting.example"),
        ]),
        body: body.as_bytes().to_vec(),
    }
}

#[tokio::test]
async fn repeated_consumption_against_a_small_bucket_eventually_exhausts_it() {
    // Capacity 10: the key can absorb two 5-token requests, the third
    // identical request must fail at index 0 and leave the other key alone.
    let state = Arc::new(FrontEndState {
        budget_helper: Arc::new(InMemoryBudgetConsumptionHelper::new(10)),
        authz_proxy: Arc::new(PassThroughAuthorizationProxy),
        metrics: Arc::new(MetricRouter::new(false)),
        remote_coordinator_claimed_identity: None,
    });
    let mut builder = RouterBuilder::new();
    register_routes(&mut builder, state.clone());
    let router = builder.freeze();

    let body = r#"{"v":"1.0","t":[{"key":"campaign-1","token":5,"reporting_time":"2024-06-01T00:00:00Z"}]}"#;

    let first = router.dispatch(prepare_request(body)).await;
    assert_eq!(first.status, 200);

    let second = router.dispatch(prepare_request(body)).await;
    assert_eq!(second.status, 200);

    let third = router.dispatch(prepare_request(body)).await;
    assert_eq!(third.status, 409);
    assert_eq!(third.body, br#"{"f":[0],"v":"1.0"}"#);

    // A different key at the same time bucket is unaffected by the other
    // key's exhaustion (spec §4.7 "concurrent requests for disjoint keys").
    let other_body = r#"{"v":"1.0","t":[{"key":"campaign-2","token":5,"reporting_time":"2024-06-01T00:00:00Z"}]}"#;
    let other = router.dispatch(prepare_request(other_body)).await;
    assert_eq!(other.status, 200);
}

#[tokio::test]
async fn mixed_request_with_one_exhausted_key_leaves_the_other_keys_undebited() {
    let state = Arc::new(FrontEndState {
        budget_helper: Arc::new(InMemoryBudgetConsumptionHelper::new(5)),
        authz_proxy: Arc::new(PassThroughAuthorizationProxy),
        metrics: Arc::new(MetricRouter::new(false)),
        remote_coordinator_claimed_identity: None,
    });
    let mut builder = RouterBuilder::new();
    register_routes(&mut builder, state.clone());
    let router = builder.freeze();

    // Index 1 ("too-big") requests more tokens than the bucket ever holds;
    // the group must be rejected and "ok-key" must not be debited at all.
    let body = r#"{"v":"1.0","t":[
        {"key":"ok-key","token":3,"reporting_time":"2024-06-01T00:00:00Z"},
        {"key":"too-big","token":200,"reporting_time":"2024-06-01T00:00:00Z"}
    ]}"#;
    let response = router.dispatch(prepare_request(body)).await;
    assert_eq!(response.status, 409);
    assert_eq!(response.body, br#"{"f":[1],"v":"1.0"}"#);

    // "ok-key" should still have its full capacity: a fresh request for
    // the full 5 tokens must succeed.
    let retry_body = r#"{"v":"1.0","t":[{"key":"ok-key","token":5,"reporting_time":"2024-06-01T00:00:00Z"}]}"#;
    let retry = router.dispatch(prepare_request(retry_body)).await;
    assert_eq!(retry.status, 200);
}
