//! `window.ethereum` as an [`RpcTransport`].
//!
//! Requests go through the injected provider's `request({ method, params })`.
//! Wallet events are forwarded from its `accountsChanged` / `chainChanged`
//! listeners; dropping the [`Subscription`] calls `removeListener` for both.

use async_trait::async_trait;
use av_api_types::{Address, ChainId, ClientEvent, WalletEvent};
use av_chain_client::{EventSink, ProviderError, ProviderResult, Subscription, deliver};
use av_chain_eip1193::{RpcTransport, rpc_error};
use js_sys::{Array, Function, Object, Promise, Reflect};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

pub struct InjectedProvider {
    ethereum: Object,
}

impl InjectedProvider {
    /// `None` when no wallet extension injected a provider.
    pub fn detect() -> Option<Self> {
        let window = web_sys::window()?;
        let ethereum = Reflect::get(&window, &JsValue::from_str("ethereum")).ok()?;
        if ethereum.is_undefined() || ethereum.is_null() {
            return None;
        }
        ethereum.dyn_into::<Object>().ok().map(|ethereum| Self { ethereum })
    }

    fn method(&self, name: &str) -> ProviderResult<Function> {
        Reflect::get(&self.ethereum, &JsValue::from_str(name))
            .ok()
            .and_then(|method| method.dyn_into::<Function>().ok())
            .ok_or_else(|| ProviderError::transport(format!("provider has no {name}()")))
    }

    fn listen(&self, event: &str, listener: &Function) -> ProviderResult<()> {
        self.method("on")?
            .call2(&self.ethereum, &JsValue::from_str(event), listener)
            .map(|_| ())
            .map_err(|err| js_error(&err))
    }
}

#[async_trait(?Send)]
impl RpcTransport for InjectedProvider {
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value> {
        let args = Object::new();
        let params = params
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|err| ProviderError::transport(format!("params: {err}")))?;
        set(&args, "method", &JsValue::from_str(method))?;
        set(&args, "params", &params)?;

        let promise = self
            .method("request")?
            .call1(&self.ethereum, &args)
            .map_err(|err| js_error(&err))?
            .dyn_into::<Promise>()
            .map_err(|_| ProviderError::transport("request() did not return a promise"))?;

        let result = JsFuture::from(promise).await.map_err(|err| js_error(&err))?;
        if result.is_undefined() || result.is_null() {
            return Ok(Value::Null);
        }
        serde_wasm_bindgen::from_value(result)
            .map_err(|err| ProviderError::transport(format!("{method} result: {err}")))
    }

    fn on_wallet_events(&self, sink: EventSink) -> ProviderResult<Subscription> {
        let accounts_sink = sink.clone();
        let accounts_changed = Closure::<dyn FnMut(JsValue)>::new(move |accounts: JsValue| {
            let accounts = accounts_from(&accounts);
            deliver(
                &accounts_sink,
                ClientEvent::from(WalletEvent::AccountsChanged { accounts }),
            );
        });
        let chain_changed = Closure::<dyn FnMut(JsValue)>::new(move |chain: JsValue| {
            match chain.as_string().as_deref().and_then(ChainId::parse) {
                Some(chain_id) => {
                    deliver(&sink, ClientEvent::from(WalletEvent::ChainChanged { chain_id }));
                }
                None => gloo_console::warn!("ignoring malformed chainChanged payload", chain),
            }
        });

        let on_accounts: Function = accounts_changed.as_ref().clone().unchecked_into();
        let on_chain: Function = chain_changed.as_ref().clone().unchecked_into();
        self.listen("accountsChanged", &on_accounts)?;
        self.listen("chainChanged", &on_chain)?;

        let ethereum = self.ethereum.clone();
        let remove = self.method("removeListener").ok();
        Ok(Subscription::new(move || {
            if let Some(remove) = remove {
                let _ = remove.call2(&ethereum, &JsValue::from_str("accountsChanged"), &on_accounts);
                let _ = remove.call2(&ethereum, &JsValue::from_str("chainChanged"), &on_chain);
            }
            drop(accounts_changed);
            drop(chain_changed);
        }))
    }
}

fn set(target: &Object, key: &str, value: &JsValue) -> ProviderResult<()> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(|err| js_error(&err))
}

/// Reads `code`, `message` and `data` off a rejected provider promise.
/// Provider errors are usually `Error` subclasses whose `message` is not
/// enumerable, so the fields are fetched one by one.
fn js_error(err: &JsValue) -> ProviderError {
    let field = |name: &str| Reflect::get(err, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED);

    let code = field("code").as_f64().map(|code| code as i64);
    let message = field("message")
        .as_string()
        .or_else(|| err.as_string())
        .unwrap_or_else(|| "wallet request failed".to_owned());
    let data = serde_wasm_bindgen::from_value::<Value>(field("data")).unwrap_or(Value::Null);

    rpc_error(&serde_json::json!({
        "code": code,
        "message": message,
        "data": data,
    }))
}

/// Non-string entries are skipped.
fn accounts_from(value: &JsValue) -> Vec<Address> {
    Array::from(value)
        .iter()
        .filter_map(|account| account.as_string())
        .map(Address::new)
        .collect()
}
