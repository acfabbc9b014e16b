//! Voting client WASM frontend.
//!
//! Wires `window.ethereum` into [`av_client_core::VotingClient`], runs its
//! update loop on the page's event loop, and re-renders after every change.

pub mod dom;
pub mod ethereum;
pub mod events;
pub mod platform;
pub mod render;
pub mod state;

use av_chain_client::WalletProvider;
use av_chain_eip1193::Eip1193Wallet;
use av_client_core::{ClientConfig, ClientState, Clock, VotingClient};
use platform::{BrowserRuntime, JsClock};
use std::rc::Rc;
use tokio::sync::mpsc;
use wasm_bindgen::prelude::*;

const COMMAND_QUEUE: usize = 16;

/// WASM entry point – called automatically when the module is instantiated.
#[wasm_bindgen(start)]
pub async fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    init().await
}

async fn init() -> Result<(), JsValue> {
    let els = dom::Elements::bind()?;
    let config = load_config()?;
    let chain_name = config.chain.chain_name.clone();

    let wallet = ethereum::InjectedProvider::detect().map(|provider| {
        Rc::new(Eip1193Wallet::new(provider, BrowserRuntime)) as Rc<dyn WalletProvider>
    });
    if wallet.is_none() {
        gloo_console::warn!("no injected wallet found");
    }

    render::render(&els, &ClientState::default(), &chain_name, JsClock.now_ms());

    let (commands, queue) = mpsc::channel(COMMAND_QUEUE);
    state::install(commands);
    events::bind_events(&els)?;

    let client = VotingClient::new(config, wallet, Rc::new(JsClock));
    wasm_bindgen_futures::spawn_local(async move {
        let on_change = |state: &ClientState| {
            render::render(&els, state, &chain_name, JsClock.now_ms());
        };
        client.run(queue, on_change).await;
    });

    Ok(())
}

/// Defaults, overridden by an inline JSON config block when the page has one.
fn load_config() -> Result<ClientConfig, JsValue> {
    match dom::inline_config() {
        Some(raw) => ClientConfig::from_json(&raw)
            .map_err(|err| JsValue::from_str(&format!("invalid voting config: {err:#}"))),
        None => Ok(ClientConfig::default()),
    }
}
