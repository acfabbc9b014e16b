//! Browser implementations of the runtime and clock seams.

use av_chain_eip1193::Runtime;
use av_client_core::Clock;
use futures_util::future::LocalBoxFuture;
use gloo_timers::future::TimeoutFuture;
use std::time::Duration;

/// `setTimeout` timers and `spawn_local` tasks.
pub struct BrowserRuntime;

impl Runtime for BrowserRuntime {
    fn sleep(&self, ms: u64) -> LocalBoxFuture<'static, ()> {
        Box::pin(TimeoutFuture::new(u32::try_from(ms).unwrap_or(u32::MAX)))
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

/// `Date.now()`; `SystemTime` is unavailable on wasm32-unknown-unknown.
pub struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> u64 {
        epoch_ms(js_sys::Date::now())
    }
}

/// NaN and negative timestamps read as 0.
fn epoch_ms(date_now: f64) -> u64 {
    Duration::try_from_secs_f64(date_now / 1_000.0)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
