//! Paints a [`ClientState`] snapshot into the page.
//!
//! Pure projection: nothing here writes client state, every change goes
//! back through a command.

use crate::dom::{self, Elements};
use av_client_core::{ClientState, NoticeKind, Phase, Remediation};
use wasm_bindgen::prelude::*;

pub fn render(els: &Elements, state: &ClientState, chain_name: &str, now_ms: u64) {
    render_account(els, state, chain_name);
    render_notice(els, state, now_ms);
    render_error(els, state);
    if let Err(err) = render_candidates(els, state) {
        gloo_console::error!("candidate list render failed", err);
    }
}

fn render_account(els: &Elements, state: &ClientState, chain_name: &str) {
    match state.short_account() {
        Some(short) => dom::set_text(&els.account, &short),
        None => dom::set_text(&els.account, "Not connected"),
    }
    dom::set_hidden(&els.connect_btn, state.account().is_some());
    els.connect_btn
        .set_disabled(state.phase() == Phase::Connecting);
    els.refresh_btn.set_disabled(state.contract_handle().is_none());

    let network = if state.chain_verified() {
        chain_name.to_owned()
    } else {
        format!("Not on {chain_name}")
    };
    dom::set_text(&els.network, &network);
    dom::toggle_class(&els.network, "ok", state.chain_verified());
}

fn render_notice(els: &Elements, state: &ClientState, now_ms: u64) {
    match state.notice(now_ms) {
        Some(notice) => {
            dom::set_text(&els.notice, &notice.text);
            dom::toggle_class(&els.notice, "pending", notice.kind == NoticeKind::Submitted);
            dom::toggle_class(&els.notice, "success", notice.kind == NoticeKind::Recorded);
            dom::set_hidden(&els.notice, false);
        }
        None => dom::set_hidden(&els.notice, true),
    }
}

fn render_error(els: &Elements, state: &ClientState) {
    let Some(error) = state.last_error() else {
        dom::set_hidden(&els.error_panel, true);
        return;
    };
    dom::set_text(&els.error_message, error.message());
    dom::set_hidden(&els.error_panel, false);

    let remediation = error.remediation();
    dom::set_hidden(
        &els.switch_network_btn,
        remediation != Remediation::RetryNetworkSwitch,
    );
    dom::set_hidden(&els.retry_btn, remediation != Remediation::Retry);
    dom::set_hidden(&els.install_hint, remediation != Remediation::InstallWallet);
}

/// Rebuilt from scratch each time; the roster is a handful of rows.
fn render_candidates(els: &Elements, state: &ClientState) -> Result<(), JsValue> {
    els.candidates.set_inner_html("");
    dom::toggle_class(&els.candidates, "busy", state.phase() == Phase::Voting);

    let votable = state.can_vote();
    for (index, candidate) in state.candidates().iter().enumerate() {
        let row = dom::create_element("li")?;

        let name = dom::create_element("span")?;
        name.set_class_name("candidate-name");
        dom::set_text(&name, &candidate.name);

        let count = dom::create_element("span")?;
        count.set_class_name("candidate-votes");
        dom::set_text(&count, &votes_label(candidate.vote_count));

        let button = dom::create_element("button")?;
        button.set_attribute("data-index", &index.to_string())?;
        if !votable {
            button.set_attribute("disabled", "")?;
        }
        dom::set_text(&button, "Vote");

        row.append_child(&name)?;
        row.append_child(&count)?;
        row.append_child(&button)?;
        els.candidates.append_child(&row)?;
    }
    Ok(())
}

fn votes_label(count: u64) -> String {
    match count {
        1 => "1 vote".to_owned(),
        n => format!("{n} votes"),
    }
}
