//! DOM element bindings.
//!
//! All fields are resolved once at startup; a missing element fails `bind()`.

use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, HtmlButtonElement, HtmlElement};

// ── Helpers ──

fn doc() -> Result<Document, JsValue> {
    web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document"))
}

fn require<T: JsCast>(id: &str) -> Result<T, JsValue> {
    doc()?
        .get_element_by_id(id)
        .and_then(|el| el.dyn_into::<T>().ok())
        .ok_or_else(|| JsValue::from_str(&format!("missing #{id}")))
}

pub fn create_element(tag: &str) -> Result<Element, JsValue> {
    doc()?.create_element(tag)
}

pub fn set_text(el: &Element, text: &str) {
    el.set_text_content(Some(text));
}

pub fn toggle_class(el: &Element, cls: &str, force: bool) {
    let _ = el.class_list().toggle_with_force(cls, force);
}

pub fn set_hidden(el: &HtmlElement, hidden: bool) {
    el.set_hidden(hidden);
}

/// Text of `<script id="voting-config" type="application/json">`, if present.
pub fn inline_config() -> Option<String> {
    doc()
        .ok()?
        .get_element_by_id("voting-config")?
        .text_content()
        .filter(|raw| !raw.trim().is_empty())
}

// ── Elements struct ──

/// Clone-friendly (all inner types are reference-counted via JS GC).
#[derive(Clone)]
pub struct Elements {
    pub connect_btn: HtmlButtonElement,
    pub refresh_btn: HtmlButtonElement,
    pub account: Element,
    pub network: Element,
    pub candidates: Element,
    pub notice: HtmlElement,
    pub error_panel: HtmlElement,
    pub error_message: Element,
    pub switch_network_btn: HtmlButtonElement,
    pub retry_btn: HtmlButtonElement,
    pub install_hint: HtmlElement,
}

impl Elements {
    pub fn bind() -> Result<Self, JsValue> {
        Ok(Self {
            connect_btn: require("connectBtn")?,
            refresh_btn: require("refreshBtn")?,
            account: require("account")?,
            network: require("network")?,
            candidates: require("candidateList")?,
            notice: require("notice")?,
            error_panel: require("errorPanel")?,
            error_message: require("errorMessage")?,
            switch_network_btn: require("switchNetworkBtn")?,
            retry_btn: require("retryBtn")?,
            install_hint: require("installHint")?,
        })
    }
}
