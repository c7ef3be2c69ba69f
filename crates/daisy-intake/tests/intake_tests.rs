//! Tests for daisy-intake: the router driven with `oneshot` against the
//! in-memory ledger.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use daisy_core::{AssetId, MicroAlgos, QueryId, MAX_TEXT_BYTES};
use daisy_intake::server::{PostQueryResponse, QueryView};
use daisy_intake::{router, IntakeState, ResolvedAuth};
use daisy_ledger::{GatewayError, LedgerGateway, LedgerOp, MemoryLedger};
use std::sync::Arc;
use tower::ServiceExt;

const TOKEN: AssetId = AssetId(1001);
const FEE: u64 = 10;

fn app(ledger: &Arc<MemoryLedger>, auth: ResolvedAuth) -> Router {
    router(Arc::new(IntakeState {
        gateway: Arc::new(ledger.connect("RELAY")),
        auth,
    }))
}

fn deploy() -> Arc<MemoryLedger> {
    let ledger = MemoryLedger::new("GOVERNOR", TOKEN, FEE);
    ledger.fund("USER", TOKEN, 100);
    ledger
}

fn post_query(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/post-query")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ===========================================================================
// POST /post-query
// ===========================================================================

#[tokio::test]
async fn post_query_pays_fee_and_returns_ids() {
    let ledger = deploy();
    let response = app(&ledger, ResolvedAuth::open())
        .oneshot(post_query(serde_json::json!({
            "submitter": "USER",
            "prompt": "What is an inner transaction?"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: PostQueryResponse = body_json(response).await;
    assert_eq!(body.query_id, QueryId(1));
    assert!(body.tx_id.starts_with("SIMTX"));
    assert!(body.confirmed_round > 0);

    assert_eq!(ledger.balance("USER", TOKEN), 100 - FEE);
    assert_eq!(ledger.balance(ledger.app_address(), TOKEN), FEE);
    let stored = ledger.query(QueryId(1)).unwrap();
    assert_eq!(stored.query_text, "What is an inner transaction?");
}

#[tokio::test]
async fn response_uses_camel_case_keys() {
    let ledger = deploy();
    let response = app(&ledger, ResolvedAuth::open())
        .oneshot(post_query(serde_json::json!({"sender": "USER", "prompt": "hi"})))
        .await
        .unwrap();
    let body: serde_json::Value = body_json(response).await;
    assert!(body.get("txId").is_some());
    assert_eq!(body["queryId"], 1);
    assert!(body.get("confirmedRound").is_some());
}

#[tokio::test]
async fn malformed_and_empty_requests_are_400() {
    let ledger = deploy();
    let cases = [
        serde_json::json!({"prompt": "no submitter"}),
        serde_json::json!({"submitter": "", "prompt": "q"}),
        serde_json::json!({"submitter": "USER", "prompt": "   "}),
    ];
    for case in cases {
        let response = app(&ledger, ResolvedAuth::open())
            .oneshot(post_query(case.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", case);
    }
    assert_eq!(ledger.config().next_query_id, QueryId::FIRST);
}

#[tokio::test]
async fn oversized_prompt_is_413() {
    let ledger = deploy();
    let response = app(&ledger, ResolvedAuth::open())
        .oneshot(post_query(serde_json::json!({
            "submitter": "USER",
            "prompt": "x".repeat(MAX_TEXT_BYTES + 1)
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(ledger.balance("USER", TOKEN), 100);
}

#[tokio::test]
async fn token_auth_guards_post_query() {
    let ledger = deploy();
    let auth = ResolvedAuth::from_token(Some("s3cret".into()));

    let response = app(&ledger, auth.clone())
        .oneshot(post_query(serde_json::json!({"submitter": "USER", "prompt": "q"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_query(serde_json::json!({"submitter": "USER", "prompt": "q"}));
    request
        .headers_mut()
        .insert("authorization", "Bearer s3cret".parse().unwrap());
    let response = app(&ledger, auth).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn gateway_failures_map_to_5xx() {
    let ledger = deploy();

    ledger.fail_next(LedgerOp::ReadConfig, GatewayError::transient("node syncing"));
    let response = app(&ledger, ResolvedAuth::open())
        .oneshot(post_query(serde_json::json!({"submitter": "USER", "prompt": "q"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // BROKE holds none of the token
    let response = app(&ledger, ResolvedAuth::open())
        .oneshot(post_query(serde_json::json!({"submitter": "BROKE", "prompt": "q"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = body_json(response).await;
    assert_eq!(body["status"], 502);
}

#[tokio::test]
async fn unconfigured_token_is_503() {
    let ledger = MemoryLedger::new("GOVERNOR", AssetId(0), FEE);
    let response = app(&ledger, ResolvedAuth::open())
        .oneshot(post_query(serde_json::json!({"submitter": "USER", "prompt": "q"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ===========================================================================
// GET /queries/:id and /health
// ===========================================================================

#[tokio::test]
async fn query_view_shows_answer_once_written() {
    let ledger = deploy();
    let app = app(&ledger, ResolvedAuth::open());
    app.clone()
        .oneshot(post_query(serde_json::json!({"submitter": "USER", "prompt": "q?"})))
        .await
        .unwrap();

    let get = || Request::builder().uri("/queries/1").body(Body::empty()).unwrap();

    let pending: QueryView = body_json(app.clone().oneshot(get()).await.unwrap()).await;
    assert!(!pending.answered);
    assert_eq!(pending.response_text, None);

    let provider = ledger.connect("PROVIDER");
    provider.opt_in(TOKEN).await.unwrap();
    provider
        .submit_answer(QueryId(1), "an answer", MicroAlgos(5_000))
        .await
        .unwrap();

    let answered: QueryView = body_json(app.oneshot(get()).await.unwrap()).await;
    assert!(answered.answered);
    assert_eq!(answered.response_text.as_deref(), Some("an answer"));
    assert_eq!(answered.provider.map(|p| p.to_string()), Some("PROVIDER".to_string()));
}

#[tokio::test]
async fn unknown_query_is_404() {
    let ledger = deploy();
    let response = app(&ledger, ResolvedAuth::open())
        .oneshot(Request::builder().uri("/queries/9").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_gateway() {
    let ledger = deploy();
    let response = app(&ledger, ResolvedAuth::open())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["gateway"], "memory");
}
