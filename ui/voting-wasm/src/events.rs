//! Event binding.
//!
//! Every handler just queues a [`Command`]; the client task does the work.

use crate::dom::Elements;
use crate::state;
use av_client_core::Command;
use gloo_timers::callback::Interval;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Element, EventTarget, MouseEvent};

/// Re-render cadence for notice expiry.
const TICK_MS: u32 = 1_000;

fn on_click(target: &EventTarget, mut handler: impl FnMut(MouseEvent) + 'static) -> Result<(), JsValue> {
    let cb = Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| handler(event));
    target.add_event_listener_with_callback("click", cb.as_ref().unchecked_ref())?;
    cb.forget();
    Ok(())
}

fn queue(command: Command) {
    if !state::send(command) {
        gloo_console::warn!("voting client is not accepting commands");
    }
}

/// Bind all UI event listeners. Call once after init.
pub fn bind_events(els: &Elements) -> Result<(), JsValue> {
    on_click(&els.connect_btn, |_| queue(Command::Connect))?;
    on_click(&els.refresh_btn, |_| queue(Command::Refresh))?;
    on_click(&els.retry_btn, |_| queue(Command::Refresh))?;
    on_click(&els.switch_network_btn, |_| queue(Command::EnsureNetwork))?;

    // One delegated listener for every row's vote button.
    on_click(&els.candidates, |event| {
        if let Some(index) = clicked_candidate(&event) {
            queue(Command::CastVote(index));
        }
    })?;

    Interval::new(TICK_MS, || queue(Command::Tick)).forget();
    Ok(())
}

fn clicked_candidate(event: &MouseEvent) -> Option<u64> {
    let target = event.target()?.dyn_into::<Element>().ok()?;
    let button = target.closest("button[data-index]").ok()??;
    if button.has_attribute("disabled") {
        return None;
    }
    button.get_attribute("data-index")?.parse().ok()
}
