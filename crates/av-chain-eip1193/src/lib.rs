//! EIP-1193 wallet and ABI contract client over any JSON-RPC transport.
//!
//! The browser build plugs in `window.ethereum`; native tools plug in
//! [`http::HttpTransport`] against a dev node.

mod contract;
#[cfg(feature = "http")]
pub mod http;
mod wallet;

pub use contract::AbiVotingContract;
pub use wallet::Eip1193Wallet;

use async_trait::async_trait;
use av_chain_client::{
    EventSink, INTERNAL_ERROR, ProviderError, ProviderResult, Subscription, UNRECOGNIZED_CHAIN,
};
use futures_util::future::LocalBoxFuture;
use serde_json::Value;

/// Receipt and log polling cadence.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4_000;
pub const DEFAULT_MAX_RECEIPT_POLLS: u32 = 150;

/// `request({ method, params })` plus the provider's own event stream.
#[async_trait(?Send)]
pub trait RpcTransport {
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value>;

    /// Registers `accountsChanged` / `chainChanged` listeners.
    fn on_wallet_events(&self, sink: EventSink) -> ProviderResult<Subscription>;
}

#[async_trait(?Send)]
impl<T: RpcTransport + ?Sized> RpcTransport for std::rc::Rc<T> {
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value> {
        (**self).request(method, params).await
    }

    fn on_wallet_events(&self, sink: EventSink) -> ProviderResult<Subscription> {
        (**self).on_wallet_events(sink)
    }
}

/// Timers and background tasks of the hosting event loop.
pub trait Runtime {
    fn sleep(&self, ms: u64) -> LocalBoxFuture<'static, ()>;
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub max_receipt_polls: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_receipt_polls: DEFAULT_MAX_RECEIPT_POLLS,
        }
    }
}

/// Converts a JSON-RPC / EIP-1193 error object into a [`ProviderError`].
///
/// Some wallets report an unknown chain as `-32603` with the real `4902`
/// nested under `data.originalError`; that code wins.
pub fn rpc_error(error: &Value) -> ProviderError {
    let mut code = error.get("code").and_then(Value::as_i64);
    let nested = error
        .pointer("/data/originalError/code")
        .and_then(Value::as_i64);
    if code == Some(INTERNAL_ERROR) && nested == Some(UNRECOGNIZED_CHAIN) {
        code = nested;
    }

    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown provider error")
        .to_owned();

    ProviderError {
        code,
        message,
        data: error.get("data").and_then(revert_data),
    }
}

/// Digs the revert payload out of the shapes nodes and wallets use:
/// a bare hex string, `{ data: "0x.." }`, or `{ originalError: { data } }`.
fn revert_data(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(raw) if raw.starts_with("0x") => av_abi::from_hex(raw).ok(),
        Value::Object(map) => map
            .get("data")
            .and_then(revert_data)
            .or_else(|| map.get("originalError").and_then(revert_data)),
        _ => None,
    }
}

fn malformed(what: &str, value: &Value) -> ProviderError {
    ProviderError::transport(format!("malformed {what}: {value}"))
}

fn abi_error(err: av_abi::AbiError) -> ProviderError {
    ProviderError::transport(format!("abi decode failed: {err}"))
}
