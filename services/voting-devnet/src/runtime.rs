use av_chain_eip1193::Runtime;
use futures_util::future::LocalBoxFuture;
use std::time::Duration;

/// Timers and background pollers on the current `LocalSet`.
pub struct TokioRuntime;

impl Runtime for TokioRuntime {
    fn sleep(&self, ms: u64) -> LocalBoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(Duration::from_millis(ms)))
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(task);
    }
}
