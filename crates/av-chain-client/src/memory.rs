//! Single-process devnet: one wallet, one chain view, one voting contract.
//!
//! Prompts and transactions are recorded so callers can assert on what the
//! wallet was asked to do. Mutations that a real wallet would announce
//! (account switch, chain switch, votes) are pushed to subscribers.

use crate::{
    EventSink, ProviderError, ProviderResult, Subscription, VoteReceipt, VotingContract,
    WalletProvider, deliver, INTERNAL_ERROR,
};
use async_trait::async_trait;
use av_api_types::{
    Address, Candidate, ChainDescriptor, ChainId, ContractEvent, TxHash, WalletEvent,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

/// Roster the contract was deployed with.
pub const DEFAULT_ROSTER: [&str; 5] = [
    "Naruto Uzumaki",
    "Monkey D. Luffy",
    "Goku",
    "Light Yagami",
    "Eren Yeager",
];

/// A wallet prompt the user was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    RequestAccounts,
    SwitchChain(ChainId),
    AddChain(ChainId),
    SignTransaction { candidate_index: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTx {
    pub hash: TxHash,
    pub from: Address,
    pub candidate_index: u64,
    pub block_number: u64,
    pub success: bool,
}

#[derive(Debug, Default)]
struct Behaviour {
    rejects_accounts: bool,
    rejects_switch: bool,
    rejects_add: bool,
    fails_add: bool,
    reads_fail: bool,
    rejects_signing: bool,
    next_tx_failure: Option<ProviderError>,
}

#[derive(Debug)]
struct Deployment {
    address: Address,
    chain_id: ChainId,
    candidates: Vec<Candidate>,
    voters: HashSet<String>,
}

struct Inner {
    accounts: Vec<Address>,
    chain_id: ChainId,
    known_chains: Vec<ChainId>,
    deployment: Option<Deployment>,
    block_number: u64,
    prompts: Vec<Prompt>,
    transactions: Vec<RecordedTx>,
    behaviour: Behaviour,
    next_subscription: u64,
    wallet_sinks: HashMap<u64, EventSink>,
    contract_sinks: HashMap<u64, EventSink>,
}

impl Inner {
    fn emit_wallet(&mut self, event: WalletEvent) {
        self.wallet_sinks.retain(|_, sink| !sink.is_closed());
        for sink in self.wallet_sinks.values() {
            deliver(sink, event.clone().into());
        }
    }

    fn emit_contract(&mut self, event: ContractEvent) {
        self.contract_sinks.retain(|_, sink| !sink.is_closed());
        for sink in self.contract_sinks.values() {
            deliver(sink, event.clone().into());
        }
    }

    /// Resolves the deployment the wallet can currently reach at `address`.
    fn reachable(&mut self, address: &Address) -> ProviderResult<&mut Deployment> {
        let chain_id = self.chain_id;
        match self.deployment.as_mut() {
            Some(deployment) if deployment.address.matches(address) && deployment.chain_id == chain_id => {
                Ok(deployment)
            }
            _ => Err(ProviderError::new(
                INTERNAL_ERROR,
                format!("call to non-contract address {address} on chain {chain_id}"),
            )),
        }
    }

    fn apply_vote(&mut self, voter: &Address, candidate_index: u64) -> Result<(), ProviderError> {
        let deployment = self
            .deployment
            .as_mut()
            .ok_or_else(|| ProviderError::new(INTERNAL_ERROR, "no contract deployed"))?;
        let key = voter.as_str().to_ascii_lowercase();
        if deployment.voters.contains(&key) {
            return Err(reverted("You have already voted"));
        }
        let Some(candidate) = usize::try_from(candidate_index)
            .ok()
            .and_then(|index| deployment.candidates.get_mut(index))
        else {
            return Err(reverted("Invalid character index"));
        };
        candidate.vote_count += 1;
        deployment.voters.insert(key);
        Ok(())
    }
}

fn reverted(reason: &str) -> ProviderError {
    ProviderError::new(
        INTERNAL_ERROR,
        format!("execution reverted: {reason}"),
    )
    .with_data(av_abi::encode_revert_message(reason))
}

/// Cloneable handle to the devnet; every clone shares the same state.
#[derive(Clone)]
pub struct InMemoryChain {
    inner: Rc<RefCell<Inner>>,
}

impl InMemoryChain {
    /// A wallet connected to `chain_id` that knows only that chain.
    pub fn new(chain_id: ChainId, accounts: Vec<Address>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                accounts,
                chain_id,
                known_chains: vec![chain_id],
                deployment: None,
                block_number: 0,
                prompts: Vec::new(),
                transactions: Vec::new(),
                behaviour: Behaviour::default(),
                next_subscription: 0,
                wallet_sinks: HashMap::new(),
                contract_sinks: HashMap::new(),
            })),
        }
    }

    /// Deploys the voting contract on `chain_id` with every tally at zero.
    pub fn deploy<S: AsRef<str>>(&self, address: Address, chain_id: ChainId, roster: &[S]) {
        let mut inner = self.inner.borrow_mut();
        if !inner.known_chains.contains(&chain_id) {
            inner.known_chains.push(chain_id);
        }
        inner.deployment = Some(Deployment {
            address,
            chain_id,
            candidates: roster
                .iter()
                .map(|name| Candidate::new(name.as_ref(), 0))
                .collect(),
            voters: HashSet::new(),
        });
        inner.block_number += 1;
    }

    // ── user actions inside the wallet ──

    /// The user picks different accounts; announced as `accountsChanged`.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        let mut inner = self.inner.borrow_mut();
        inner.accounts = accounts.clone();
        inner.emit_wallet(WalletEvent::AccountsChanged { accounts });
    }

    /// The user switches network from the wallet UI; announced as `chainChanged`.
    pub fn set_chain(&self, chain_id: ChainId) {
        let mut inner = self.inner.borrow_mut();
        if !inner.known_chains.contains(&chain_id) {
            inner.known_chains.push(chain_id);
        }
        inner.chain_id = chain_id;
        inner.emit_wallet(WalletEvent::ChainChanged { chain_id });
    }

    /// Removes `chain_id` from the wallet's known networks (switching to it yields 4902).
    pub fn forget_chain(&self, chain_id: ChainId) {
        self.inner
            .borrow_mut()
            .known_chains
            .retain(|known| *known != chain_id);
    }

    /// A vote cast by someone else (another account, another tab).
    pub fn cast_external_vote(&self, voter: &Address, candidate_index: u64) -> ProviderResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.apply_vote(voter, candidate_index)?;
        inner.block_number += 1;
        inner.emit_contract(ContractEvent::Voted {
            voter: voter.clone(),
            candidate_index,
        });
        Ok(())
    }

    // ── scripted failures ──

    pub fn set_rejects_accounts(&self, rejects: bool) {
        self.inner.borrow_mut().behaviour.rejects_accounts = rejects;
    }

    pub fn set_rejects_switch(&self, rejects: bool) {
        self.inner.borrow_mut().behaviour.rejects_switch = rejects;
    }

    pub fn set_rejects_add(&self, rejects: bool) {
        self.inner.borrow_mut().behaviour.rejects_add = rejects;
    }

    /// `wallet_addEthereumChain` fails with a non-rejection error.
    pub fn set_fails_add(&self, fails: bool) {
        self.inner.borrow_mut().behaviour.fails_add = fails;
    }

    pub fn set_reads_fail(&self, fails: bool) {
        self.inner.borrow_mut().behaviour.reads_fail = fails;
    }

    pub fn set_rejects_signing(&self, rejects: bool) {
        self.inner.borrow_mut().behaviour.rejects_signing = rejects;
    }

    /// The next `vote` submission fails with `error` before reaching the contract.
    pub fn fail_next_transaction(&self, error: ProviderError) {
        self.inner.borrow_mut().behaviour.next_tx_failure = Some(error);
    }

    // ── inspection ──

    pub fn prompts(&self) -> Vec<Prompt> {
        self.inner.borrow().prompts.clone()
    }

    pub fn clear_prompts(&self) {
        self.inner.borrow_mut().prompts.clear();
    }

    pub fn transactions(&self) -> Vec<RecordedTx> {
        self.inner.borrow().transactions.clone()
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.inner
            .borrow()
            .deployment
            .as_ref()
            .map(|deployment| deployment.candidates.clone())
            .unwrap_or_default()
    }

    pub fn current_chain(&self) -> ChainId {
        self.inner.borrow().chain_id
    }

    pub fn wallet_subscribers(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.wallet_sinks.retain(|_, sink| !sink.is_closed());
        inner.wallet_sinks.len()
    }

    pub fn contract_subscribers(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.contract_sinks.retain(|_, sink| !sink.is_closed());
        inner.contract_sinks.len()
    }

    fn register(&self, sink: EventSink, contract: bool) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_subscription;
            inner.next_subscription += 1;
            if contract {
                inner.contract_sinks.insert(id, sink);
            } else {
                inner.wallet_sinks.insert(id, sink);
            }
            id
        };

        let weak: Weak<RefCell<Inner>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.borrow_mut();
                if contract {
                    inner.contract_sinks.remove(&id);
                } else {
                    inner.wallet_sinks.remove(&id);
                }
            }
        })
    }
}

#[async_trait(?Send)]
impl WalletProvider for InMemoryChain {
    async fn request_accounts(&self) -> ProviderResult<Vec<Address>> {
        let mut inner = self.inner.borrow_mut();
        inner.prompts.push(Prompt::RequestAccounts);
        if inner.behaviour.rejects_accounts {
            return Err(ProviderError::user_rejected());
        }
        Ok(inner.accounts.clone())
    }

    async fn chain_id(&self) -> ProviderResult<ChainId> {
        Ok(self.inner.borrow().chain_id)
    }

    async fn switch_chain(&self, chain_id: ChainId) -> ProviderResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.prompts.push(Prompt::SwitchChain(chain_id));
        if !inner.known_chains.contains(&chain_id) {
            return Err(ProviderError::unrecognized_chain(chain_id));
        }
        if inner.behaviour.rejects_switch {
            return Err(ProviderError::user_rejected());
        }
        if inner.chain_id != chain_id {
            inner.chain_id = chain_id;
            inner.emit_wallet(WalletEvent::ChainChanged { chain_id });
        }
        Ok(())
    }

    async fn add_chain(&self, descriptor: &ChainDescriptor) -> ProviderResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.prompts.push(Prompt::AddChain(descriptor.chain_id));
        if inner.behaviour.rejects_add {
            return Err(ProviderError::user_rejected());
        }
        if inner.behaviour.fails_add {
            return Err(ProviderError::new(
                INTERNAL_ERROR,
                format!("could not reach {:?}", descriptor.rpc_urls),
            ));
        }
        if !inner.known_chains.contains(&descriptor.chain_id) {
            inner.known_chains.push(descriptor.chain_id);
        }
        Ok(())
    }

    fn bind_contract(&self, address: &Address, signer: &Address) -> ProviderResult<Rc<dyn VotingContract>> {
        Ok(Rc::new(InMemoryContract {
            chain: self.clone(),
            address: address.clone(),
            signer: signer.clone(),
        }))
    }

    fn subscribe(&self, sink: EventSink) -> ProviderResult<Subscription> {
        Ok(self.register(sink, false))
    }
}

/// Contract binding handed out by [`InMemoryChain::bind_contract`].
pub struct InMemoryContract {
    chain: InMemoryChain,
    address: Address,
    signer: Address,
}

impl InMemoryContract {
    fn read<T>(&self, read: impl FnOnce(&Deployment) -> T) -> ProviderResult<T> {
        let mut inner = self.chain.inner.borrow_mut();
        if inner.behaviour.reads_fail {
            return Err(ProviderError::transport("failed to fetch: connection refused"));
        }
        let deployment = inner.reachable(&self.address)?;
        Ok(read(deployment))
    }
}

#[async_trait(?Send)]
impl VotingContract for InMemoryContract {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn has_voted(&self, voter: &Address) -> ProviderResult<bool> {
        let key = voter.as_str().to_ascii_lowercase();
        self.read(|deployment| deployment.voters.contains(&key))
    }

    async fn get_all_characters(&self) -> ProviderResult<Vec<Candidate>> {
        self.read(|deployment| deployment.candidates.clone())
    }

    async fn vote(&self, candidate_index: u64) -> ProviderResult<TxHash> {
        let mut inner = self.chain.inner.borrow_mut();
        inner.prompts.push(Prompt::SignTransaction { candidate_index });
        if inner.behaviour.rejects_signing {
            return Err(ProviderError::new(
                crate::USER_REJECTED,
                "User denied transaction signature.",
            ));
        }
        if let Some(error) = inner.behaviour.next_tx_failure.take() {
            return Err(error);
        }
        inner.reachable(&self.address)?;
        inner.apply_vote(&self.signer, candidate_index)?;

        inner.block_number += 1;
        let block_number = inner.block_number;
        let hash = TxHash(format!("0x{:064x}", inner.transactions.len() + 1));
        inner.transactions.push(RecordedTx {
            hash: hash.clone(),
            from: self.signer.clone(),
            candidate_index,
            block_number,
            success: true,
        });
        inner.emit_contract(ContractEvent::Voted {
            voter: self.signer.clone(),
            candidate_index,
        });
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: &TxHash) -> ProviderResult<VoteReceipt> {
        let inner = self.chain.inner.borrow();
        inner
            .transactions
            .iter()
            .find(|tx| &tx.hash == tx_hash)
            .map(|tx| VoteReceipt {
                tx_hash: tx.hash.clone(),
                block_number: tx.block_number,
                success: tx.success,
            })
            .ok_or_else(|| ProviderError::transport(format!("unknown transaction {tx_hash}")))
    }

    fn subscribe_voted(&self, sink: EventSink) -> ProviderResult<Subscription> {
        Ok(self.chain.register(sink, true))
    }
}
