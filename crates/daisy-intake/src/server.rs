//! Intake HTTP server

use crate::auth::ResolvedAuth;
use crate::error::IntakeError;
use axum::{
    extract::{rejection::JsonRejection, Path as AxumPath, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use daisy_core::{validate_query_text, Address, PostQuery, QueryId};
use daisy_ledger::LedgerGateway;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub bind: String,
    pub port: u16,
    pub auth: ResolvedAuth,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
            auth: ResolvedAuth::open(),
        }
    }
}

pub struct IntakeState {
    pub gateway: Arc<dyn LedgerGateway>,
    pub auth: ResolvedAuth,
}

#[derive(Debug, Deserialize)]
pub struct PostQueryRequest {
    #[serde(alias = "sender")]
    pub submitter: String,
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostQueryResponse {
    pub tx_id: String,
    pub query_id: QueryId,
    pub confirmed_round: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryView {
    pub id: QueryId,
    pub submitter: Address,
    pub query_text: String,
    pub answered: bool,
    pub provider: Option<Address>,
    pub response_text: Option<String>,
}

pub fn router(state: Arc<IntakeState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/post-query", post(post_query_handler))
        .route("/queries/:id", get(query_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

pub async fn start_intake(
    config: IntakeConfig,
    gateway: Arc<dyn LedgerGateway>,
) -> anyhow::Result<()> {
    let state = Arc::new(IntakeState {
        gateway,
        auth: config.auth.clone(),
    });
    let app = router(state);

    let bind_addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {}:{}: {}", config.bind, config.port, e))?;

    info!("DAISY intake v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  Auth mode: {:?}", config.auth.mode);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<IntakeState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "gateway": state.gateway.name(),
    }))
}

async fn post_query_handler(
    State(state): State<Arc<IntakeState>>,
    headers: HeaderMap,
    body: Result<Json<PostQueryRequest>, JsonRejection>,
) -> Result<Json<PostQueryResponse>, IntakeError> {
    let request_id = uuid::Uuid::new_v4();
    state
        .auth
        .verify_header(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))?;
    let Json(req) = body.map_err(|e| IntakeError::bad_request(e.body_text()))?;

    let submitter = req.submitter.trim();
    if submitter.is_empty() {
        return Err(IntakeError::bad_request("submitter is required"));
    }
    validate_query_text(&req.prompt)?;

    let config = state.gateway.read_config().await?;
    if !config.token.is_configured() {
        return Err(IntakeError::Unavailable("contract token not configured".into()));
    }

    let post = PostQuery::for_contract(&config, submitter, req.prompt)?;
    info!(
        %request_id,
        submitter,
        fee = post.payment.amount,
        token = %post.payment.asset_id,
        "posting query"
    );
    let receipt = state.gateway.post_query(post).await.map_err(|e| {
        warn!(%request_id, error = %e, "post_query failed");
        IntakeError::from(e)
    })?;
    info!(%request_id, query_id = %receipt.query_id, tx_id = %receipt.tx_id, "query posted");

    Ok(Json(PostQueryResponse {
        tx_id: receipt.tx_id,
        query_id: receipt.query_id,
        confirmed_round: receipt.confirmed_round,
    }))
}

async fn query_handler(
    AxumPath(id): AxumPath<u64>,
    State(state): State<Arc<IntakeState>>,
) -> Result<Json<QueryView>, IntakeError> {
    let id = QueryId(id);
    let query = state
        .gateway
        .read_query(id)
        .await?
        .ok_or(IntakeError::NotFound(id))?;

    let answered = query.is_answered;
    Ok(Json(QueryView {
        id,
        submitter: query.submitter,
        query_text: query.query_text,
        answered,
        provider: answered.then_some(query.provider),
        response_text: answered.then_some(query.response_text),
    }))
}
