use crate::session::ContractHandle;
use av_api_types::{Address, ChainId, ClientEvent, ContractEvent, WalletEvent};
use av_chain_client::{EventSink, ProviderResult, Subscription, WalletProvider};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What an incoming event means for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Bind this account and re-check its vote status.
    SwitchAccount(Address),
    /// The wallet revoked every account.
    ClearAccount,
    /// Chain identity changed: rebuild everything.
    HardReset(ChainId),
    /// A vote landed on-chain. `own` when cast by the bound account.
    VoteObserved { own: bool, candidate_index: u64 },
}

/// Owns the bounded event queue and at most one live subscription per source.
pub struct EventBridge {
    sink: EventSink,
    queue: mpsc::Receiver<ClientEvent>,
    wallet: Option<Subscription>,
    contract: Option<Subscription>,
}

impl EventBridge {
    pub fn new(capacity: usize) -> Self {
        let (sink, queue) = mpsc::channel(capacity.max(1));
        Self {
            sink,
            queue,
            wallet: None,
            contract: None,
        }
    }

    /// Producer handle for sources outside the wallet/contract subscriptions.
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Returns `false` when already attached.
    pub fn attach_wallet(&mut self, wallet: &dyn WalletProvider) -> ProviderResult<bool> {
        if self.wallet.is_some() {
            return Ok(false);
        }
        self.wallet = Some(wallet.subscribe(self.sink.clone())?);
        debug!("wallet events attached");
        Ok(true)
    }

    /// Returns `false` when already attached.
    pub fn attach_contract(&mut self, contract: &ContractHandle) -> ProviderResult<bool> {
        if self.contract.is_some() {
            return Ok(false);
        }
        self.contract = Some(contract.contract().subscribe_voted(self.sink.clone())?);
        debug!(address = %contract.address(), "contract events attached");
        Ok(true)
    }

    pub fn is_attached(&self) -> bool {
        self.wallet.is_some() && self.contract.is_some()
    }

    /// Drops both subscriptions.
    pub fn detach(&mut self) {
        let wallet = self.wallet.take();
        let contract = self.contract.take();
        if wallet.is_some() || contract.is_some() {
            info!("event subscriptions released");
        }
    }

    /// Discards everything queued so far.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.queue.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "drained queued events");
        }
        dropped
    }

    /// Waits for the next event. The bridge keeps a sender alive, so this
    /// never returns `None` while the bridge exists.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        self.queue.recv().await
    }

    pub fn try_next(&mut self) -> Option<ClientEvent> {
        self.queue.try_recv().ok()
    }
}

/// Maps an event to its reaction given the currently bound account.
pub fn translate(event: &ClientEvent, account: Option<&Address>) -> Reaction {
    match event {
        ClientEvent::Wallet(WalletEvent::AccountsChanged { accounts }) => match accounts.first() {
            Some(first) => Reaction::SwitchAccount(first.clone()),
            None => Reaction::ClearAccount,
        },
        ClientEvent::Wallet(WalletEvent::ChainChanged { chain_id }) => {
            Reaction::HardReset(*chain_id)
        }
        ClientEvent::Contract(ContractEvent::Voted {
            voter,
            candidate_index,
        }) => Reaction::VoteObserved {
            own: account.is_some_and(|account| account.matches(voter)),
            candidate_index: *candidate_index,
        },
    }
}
