//! HTTP client for the signing ledger bridge

use crate::gateway::{GatewayError, GatewayResult, LedgerGateway};
use daisy_core::{
    AssetId, ContractConfig, LedgerEndpoint, MicroAlgos, PostQuery, PostReceipt, Query, QueryId,
    Receipt,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const TOKEN_HEADER: &str = "X-Ledger-API-Token";
const SIGNER_HEADER: &str = "X-Ledger-Signer";

pub struct HttpLedgerGateway {
    client: Client,
    base_url: String,
    app_id: u64,
    api_token: Option<String>,
    signer: String,
}

impl HttpLedgerGateway {
    pub fn new(endpoint: &LedgerEndpoint, app_id: u64, signer: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| GatewayError::permanent(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            app_id,
            api_token: endpoint.token.clone(),
            signer: signer.into(),
        })
    }

    fn app_url(&self, path: &str) -> String {
        format!("{}/v1/apps/{}{}", self.base_url, self.app_id, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => req.header(TOKEN_HEADER, token),
            None => req,
        }
    }

    fn signed(&self, req: RequestBuilder) -> RequestBuilder {
        self.authed(req).header(SIGNER_HEADER, &self.signer)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> GatewayResult<T> {
        let response = self.authed(self.client.get(url)).send().await.map_err(transport)?;
        decode(check(response, None).await?).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        query: Option<QueryId>,
    ) -> GatewayResult<T> {
        let response = self
            .signed(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode(check(response, query).await?).await
    }
}

#[async_trait::async_trait]
impl LedgerGateway for HttpLedgerGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn read_config(&self) -> GatewayResult<ContractConfig> {
        self.get_json(&self.app_url("/state")).await
    }

    async fn read_query(&self, id: QueryId) -> GatewayResult<Option<Query>> {
        let url = self.app_url(&format!("/queries/{}", id));
        let response = self.authed(self.client.get(&url)).send().await.map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(query_id = %id, "bridge reports query not found");
            return Ok(None);
        }
        decode(check(response, Some(id)).await?).await.map(Some)
    }

    async fn submit_answer(
        &self,
        id: QueryId,
        response_text: &str,
        fee_ceiling: MicroAlgos,
    ) -> GatewayResult<Receipt> {
        let body = SubmitResponseBody {
            response_text,
            max_fee: fee_ceiling.get(),
            cover_inner_fees: true,
        };
        let url = self.app_url(&format!("/queries/{}/response", id));
        self.post_json(&url, &body, Some(id)).await
    }

    async fn opt_in(&self, token: AssetId) -> GatewayResult<()> {
        let url = format!("{}/v1/assets/{}/opt-in", self.base_url, token);
        let response = self
            .signed(self.client.post(&url))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || text.to_lowercase().contains("already opted in") {
            return Ok(());
        }
        Err(classify_failure(status, &text, None))
    }

    async fn post_query(&self, post: PostQuery) -> GatewayResult<PostReceipt> {
        self.post_json(&self.app_url("/queries"), &post, None).await
    }
}

#[derive(Serialize)]
struct SubmitResponseBody<'a> {
    response_text: &'a str,
    max_fee: u64,
    cover_inner_fees: bool,
}

async fn check(response: Response, query: Option<QueryId>) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let err = classify_failure(status, &text, query);
    if err.is_transient() {
        warn!("ledger bridge {}: {}", status, text);
    } else {
        debug!("ledger bridge {}: {}", status, text);
    }
    Err(err)
}

async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    let text = response.text().await.map_err(transport)?;
    serde_json::from_str(&text)
        .map_err(|e| GatewayError::permanent(format!("unexpected bridge response: {}", e)))
}

fn transport(e: reqwest::Error) -> GatewayError {
    if e.is_builder() {
        GatewayError::permanent(e.to_string())
    } else {
        // timeouts, refused connections and dropped bodies all clear up on their own
        GatewayError::transient(e.to_string())
    }
}

/// Map a non-success bridge response to a gateway error class.
pub fn classify_failure(status: StatusCode, body: &str, query: Option<QueryId>) -> GatewayError {
    let message = error_message(body);
    if let Some(id) = query {
        if status == StatusCode::CONFLICT || message.to_lowercase().contains("already answered") {
            return GatewayError::AlreadyAnswered(id);
        }
    }
    match status.as_u16() {
        408 | 425 | 429 => GatewayError::transient(format!("{}: {}", status, message)),
        s if s >= 500 => GatewayError::transient(format!("{}: {}", status, message)),
        _ => GatewayError::permanent(format!("{}: {}", status, message)),
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
