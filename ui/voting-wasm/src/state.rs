//! Handle to the running client.
//!
//! The client itself lives inside its `spawn_local` task; DOM handlers only
//! hold the command queue, kept in a `thread_local!` (WASM is single-threaded).

use av_client_core::Command;
use std::cell::RefCell;
use tokio::sync::mpsc;

thread_local! {
    static COMMANDS: RefCell<Option<mpsc::Sender<Command>>> = const { RefCell::new(None) };
}

pub fn install(sender: mpsc::Sender<Command>) {
    COMMANDS.with(|slot| *slot.borrow_mut() = Some(sender));
}

/// Queues a command; `false` when the client is gone or the queue is full.
pub fn send(command: Command) -> bool {
    COMMANDS.with(|slot| match slot.borrow().as_ref() {
        Some(sender) => sender.try_send(command).is_ok(),
        None => false,
    })
}
