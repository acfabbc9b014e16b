use crate::{RpcTransport, rpc_error};
use async_trait::async_trait;
use av_chain_client::{EventSink, ProviderError, ProviderResult, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;
use tracing::debug;

/// JSON-RPC over HTTP against a plain node (anvil, hardhat, geth --dev).
///
/// Reads `VOTING_RPC_URL` from environment at construction time
/// (default: `http://127.0.0.1:8545`). A node has no wallet UI, so
/// `accountsChanged` / `chainChanged` never fire.
pub struct HttpTransport {
    endpoint: String,
    http: reqwest::Client,
    next_id: Cell<u64>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HttpTransport {
    pub fn new(endpoint: Option<String>) -> Self {
        let endpoint = endpoint
            .or_else(|| std::env::var("VOTING_RPC_URL").ok())
            .unwrap_or_else(|| "http://127.0.0.1:8545".to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            next_id: Cell::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[async_trait(?Send)]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        debug!(id, method, "rpc request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .map_err(|err| ProviderError::transport(format!("{method} transport: {err}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: RpcResponse = serde_json::from_str(&text).map_err(|_| {
            ProviderError::transport(format!("{method} HTTP {status}: {text}"))
        })?;

        if let Some(error) = body.error {
            return Err(rpc_error(&error));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    fn on_wallet_events(&self, _sink: EventSink) -> ProviderResult<Subscription> {
        Ok(Subscription::inert())
    }
}
