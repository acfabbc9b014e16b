//! Seam between the voting client and the outside world: the injected wallet
//! provider and the voting contract it signs for.
//!
//! Everything here is single-threaded (`?Send`): wallet handles in the browser
//! are JS objects and never leave the event loop that created them.

pub mod memory;

use async_trait::async_trait;
use av_api_types::{Address, Candidate, ChainDescriptor, ChainId, ClientEvent, TxHash};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tokio::sync::mpsc;

/// EIP-1193 `4001`: the user dismissed a wallet prompt.
pub const USER_REJECTED: i64 = 4001;
/// EIP-1193 `4100`: the origin is not authorized for the account.
pub const UNAUTHORIZED: i64 = 4100;
/// MetaMask `4902`: `wallet_switchEthereumChain` for a chain it has never seen.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC internal error; wallets use it for gas estimation and funding failures.
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
    /// Raw revert payload, when the node returned one.
    pub data: Option<Vec<u8>>,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
            data: None,
        }
    }

    /// A failure below the JSON-RPC layer (no code).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED, "User rejected the request.")
    }

    pub fn unrecognized_chain(chain_id: ChainId) -> Self {
        Self::new(
            UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID \"{chain_id}\". Try adding the chain using wallet_addEthereumChain first."),
        )
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_user_rejected(&self) -> bool {
        self.code == Some(USER_REJECTED)
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Some(UNRECOGNIZED_CHAIN)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Producer side of the client's bounded event queue.
pub type EventSink = mpsc::Sender<ClientEvent>;

/// Pushes an event without waiting; a full or closed queue drops the event.
pub fn deliver(sink: &EventSink, event: ClientEvent) -> bool {
    match sink.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            tracing::warn!(?event, "client event queue full, dropping event");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Live listener registration. Dropping it removes the listener.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// For sources that never emit (e.g. a plain HTTP node).
    pub fn inert() -> Self {
        Self { cancel: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// Client for the deployed voting contract, bound to one address and signer.
#[async_trait(?Send)]
pub trait VotingContract {
    fn address(&self) -> &Address;
    async fn has_voted(&self, voter: &Address) -> ProviderResult<bool>;
    async fn get_all_characters(&self) -> ProviderResult<Vec<Candidate>>;
    /// Submits `vote(candidate_index)`; resolves once the wallet accepted the transaction.
    async fn vote(&self, candidate_index: u64) -> ProviderResult<TxHash>;
    /// Resolves after the first confirmation.
    async fn wait_for_confirmation(&self, tx_hash: &TxHash) -> ProviderResult<VoteReceipt>;
    /// Streams `Voted` events into `sink` until the subscription is dropped.
    fn subscribe_voted(&self, sink: EventSink) -> ProviderResult<Subscription>;
}

/// The injected wallet (EIP-1193 provider).
#[async_trait(?Send)]
pub trait WalletProvider {
    async fn request_accounts(&self) -> ProviderResult<Vec<Address>>;
    async fn chain_id(&self) -> ProviderResult<ChainId>;
    async fn switch_chain(&self, chain_id: ChainId) -> ProviderResult<()>;
    async fn add_chain(&self, descriptor: &ChainDescriptor) -> ProviderResult<()>;
    fn bind_contract(&self, address: &Address, signer: &Address) -> ProviderResult<Rc<dyn VotingContract>>;
    /// Streams `accountsChanged` / `chainChanged` into `sink` until dropped.
    fn subscribe(&self, sink: EventSink) -> ProviderResult<Subscription>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use av_api_types::WalletEvent;
    use std::cell::Cell;

    #[test]
    fn dropping_a_subscription_runs_cancel_once() {
        let cancelled = Rc::new(Cell::new(0));
        let counter = cancelled.clone();
        let subscription = Subscription::new(move || counter.set(counter.get() + 1));
        assert_eq!(cancelled.get(), 0);
        drop(subscription);
        assert_eq!(cancelled.get(), 1);

        drop(Subscription::inert());
    }

    #[test]
    fn deliver_drops_when_queue_is_full() {
        let (sink, mut queue) = mpsc::channel(1);
        let event = ClientEvent::from(WalletEvent::ChainChanged { chain_id: ChainId(1) });
        assert!(deliver(&sink, event.clone()));
        assert!(!deliver(&sink, event.clone()));
        assert_eq!(queue.try_recv().ok(), Some(event.clone()));

        drop(queue);
        assert!(!deliver(&sink, event));
    }

    #[test]
    fn error_codes_are_recognized() {
        assert!(ProviderError::user_rejected().is_user_rejected());
        let unknown = ProviderError::unrecognized_chain(ChainId(11_155_111));
        assert!(unknown.is_unrecognized_chain());
        assert!(unknown.message.contains("0xaa36a7"));
        assert_eq!(ProviderError::transport("offline").code, None);
    }
}
