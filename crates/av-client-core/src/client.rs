use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::error::{ClientError, ConnectError, NetworkError, ReadError, VoteError};
use crate::event_bridge::{EventBridge, Reaction, translate};
use crate::network_guard::NetworkGuard;
use crate::reconciler::{ApplyOutcome, RefreshScope, RefreshTicket, Snapshot, StateReconciler};
use crate::session::{ContractHandle, SessionBinder};
use crate::state::{
    ClientState, NoticeKind, Phase, VOTE_RECORDED_NOTICE, VOTE_SUBMITTED_NOTICE,
};
use crate::vote::VoteCommander;
use av_api_types::{ClientEvent, TxHash};
use av_chain_client::{VoteReceipt, WalletProvider};
use futures_util::future::LocalBoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Actions the rendering layer can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    EnsureNetwork,
    CastVote(u64),
    Refresh,
    /// Wakes the loop so expired notices are pruned.
    Tick,
}

enum Completion {
    Refreshed(RefreshTicket, Result<Snapshot, ReadError>),
    Submitted {
        epoch: u64,
        contract: ContractHandle,
        result: Result<TxHash, VoteError>,
    },
    Confirmed {
        epoch: u64,
        result: Result<VoteReceipt, VoteError>,
    },
}

type Inflight = FuturesUnordered<LocalBoxFuture<'static, Completion>>;

/// Work an event leaves behind.
#[derive(Debug, Default)]
struct Followup {
    tickets: Vec<RefreshTicket>,
    reconnect: bool,
}

/// Sole owner and writer of [`ClientState`].
///
/// The `async fn` entry points run an action to completion and are what
/// tests drive directly. [`VotingClient::run`] is the long-lived loop the
/// browser uses: reads and vote transactions stay in flight while wallet
/// events keep being processed.
pub struct VotingClient {
    config: ClientConfig,
    wallet: Option<Rc<dyn WalletProvider>>,
    clock: Rc<dyn Clock>,
    state: ClientState,
    guard: NetworkGuard,
    binder: SessionBinder,
    reconciler: StateReconciler,
    bridge: EventBridge,
    commander: VoteCommander,
}

impl VotingClient {
    /// `wallet` is `None` when no provider was injected.
    pub fn new(
        config: ClientConfig,
        wallet: Option<Rc<dyn WalletProvider>>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            guard: NetworkGuard::new(config.chain.clone()),
            binder: SessionBinder::new(config.contract_address.clone()),
            bridge: EventBridge::new(config.event_queue_capacity),
            reconciler: StateReconciler::new(),
            commander: VoteCommander,
            state: ClientState::default(),
            config,
            wallet,
            clock,
        }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn into_state(self) -> ClientState {
        self.state
    }

    // ── actions ──

    /// Authorizes, verifies the network, binds the contract, loads state and
    /// subscribes to events. Calling it again while connected re-validates
    /// and re-binds without duplicating subscriptions. An outstanding vote
    /// keeps the phase at `Voting` throughout.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        let voting = self.state.phase() == Phase::Voting;
        if !voting {
            self.state.set_phase(Phase::Connecting);
        }
        self.state.clear_error();

        let session = match self
            .binder
            .connect(self.wallet.as_deref(), &self.guard)
            .await
        {
            Ok(session) => session,
            Err(err) => {
                warn!("connect failed: {err}");
                if matches!(err, ConnectError::WrongNetwork(_)) {
                    self.state.set_chain_verified(false);
                }
                self.state.record_error(err.clone());
                if !voting {
                    self.state.set_phase(Phase::Error);
                }
                return Err(err);
            }
        };

        self.state.set_chain_verified(true);
        self.state
            .bind_session(session.account.clone(), session.contract.clone());

        if let Some(wallet) = &self.wallet {
            if let Err(err) = self.bridge.attach_wallet(wallet.as_ref()) {
                warn!("wallet event subscription failed: {err}");
            }
        }
        if let Err(err) = self.bridge.attach_contract(&session.contract) {
            warn!("contract event subscription failed: {err}");
        }

        self.refresh(RefreshScope::Full).await;
        info!(account = %session.account, phase = ?self.state.phase(), "connected");
        Ok(())
    }

    /// Checks (and if needed repairs) the wallet's network.
    pub async fn ensure_network(&mut self) -> Result<(), NetworkError> {
        let Some(wallet) = self.wallet.clone() else {
            let err = NetworkError::Unavailable("no wallet provider present".into());
            self.state.record_error(err.clone());
            return Err(err);
        };

        match self.guard.ensure_network(wallet.as_ref()).await {
            Ok(()) => {
                self.state.set_chain_verified(true);
                if matches!(
                    self.state.last_error(),
                    Some(ClientError::Network(_) | ClientError::Connect(ConnectError::WrongNetwork(_)))
                ) {
                    self.state.clear_error();
                }
                if self.state.contract_handle().is_some() {
                    self.refresh(RefreshScope::Full).await;
                } else if self.state.phase() == Phase::Error {
                    self.state.set_phase(Phase::Idle);
                }
                Ok(())
            }
            Err(err) => {
                self.state.set_chain_verified(false);
                self.state.record_error(err.clone());
                if self.state.phase() != Phase::Voting {
                    self.state.set_phase(Phase::Error);
                }
                Err(err)
            }
        }
    }

    /// Submits a vote and waits for its confirmation. `has_voted` flips only
    /// when the contract's `Voted` event comes back through the bridge.
    pub async fn cast_vote(&mut self, candidate_index: u64) -> Result<(), VoteError> {
        let (contract, epoch) = self.begin_vote(candidate_index)?;

        let result = match self.commander.submit(&contract, candidate_index).await {
            Ok(tx_hash) => {
                self.vote_submitted();
                self.commander
                    .confirm(&contract, &tx_hash)
                    .await
                    .map(|_| ())
            }
            Err(err) => Err(err),
        };

        if let Some(ticket) = self.finish_vote(epoch, result.clone()) {
            self.settle(ticket).await;
        }
        result
    }

    /// Reads and applies right away. `None` when nothing is bound.
    pub async fn refresh(&mut self, scope: RefreshScope) -> Option<ApplyOutcome> {
        let ticket = self.begin_refresh(scope)?;
        Some(self.settle(ticket).await)
    }

    /// Issues a read against the bound contract without running it.
    pub fn begin_refresh(&mut self, scope: RefreshScope) -> Option<RefreshTicket> {
        let contract = self.state.usable_contract()?;
        Some(self.reconciler.issue(scope, contract, self.state.account()))
    }

    pub fn apply_refresh(
        &mut self,
        ticket: &RefreshTicket,
        result: Result<Snapshot, ReadError>,
    ) -> ApplyOutcome {
        self.reconciler.apply(&mut self.state, ticket, result)
    }

    /// Applies one wallet or contract event, including the reads it triggers.
    pub async fn handle_event(&mut self, event: ClientEvent) {
        let followup = self.react(event);
        for ticket in followup.tickets {
            self.settle(ticket).await;
        }
        if followup.reconnect {
            let _ = self.connect().await;
        }
    }

    /// Handles every event queued so far. Returns how many were handled.
    pub async fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.bridge.try_next() {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    pub fn prune_notice(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.state.prune_notice(now)
    }

    // ── update loop ──

    /// Runs until `commands` closes, calling `on_change` after every step.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut on_change: impl FnMut(&ClientState),
    ) -> ClientState {
        let mut inflight = Inflight::new();

        if self.config.auto_connect {
            let _ = self.connect().await;
            on_change(&self.state);
        }

        loop {
            tokio::select! {
                biased;
                Some(done) = inflight.next(), if !inflight.is_empty() => {
                    self.complete(done, &mut inflight);
                }
                Some(event) = self.bridge.next() => {
                    let followup = self.react(event);
                    inflight.extend(followup.tickets.into_iter().map(fetch));
                    if followup.reconnect {
                        let _ = self.connect().await;
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => self.execute(command, &mut inflight).await,
                    None => break,
                },
            }
            self.prune_notice();
            on_change(&self.state);
        }

        debug!(pending = inflight.len(), "update loop stopped");
        self.bridge.detach();
        self.state
    }

    async fn execute(&mut self, command: Command, inflight: &mut Inflight) {
        debug!(?command, "command");
        match command {
            Command::Connect => {
                let _ = self.connect().await;
            }
            Command::EnsureNetwork => {
                let _ = self.ensure_network().await;
            }
            Command::Refresh => {
                if let Some(ticket) = self.begin_refresh(RefreshScope::Full) {
                    inflight.push(fetch(ticket));
                }
            }
            Command::CastVote(candidate_index) => {
                let Ok((contract, epoch)) = self.begin_vote(candidate_index) else {
                    return;
                };
                let commander = self.commander;
                inflight.push(
                    async move {
                        let result = commander.submit(&contract, candidate_index).await;
                        Completion::Submitted {
                            epoch,
                            contract,
                            result,
                        }
                    }
                    .boxed_local(),
                );
            }
            Command::Tick => {}
        }
    }

    fn complete(&mut self, done: Completion, inflight: &mut Inflight) {
        match done {
            Completion::Refreshed(ticket, result) => {
                self.apply_refresh(&ticket, result);
            }
            Completion::Submitted {
                epoch,
                contract,
                result: Ok(tx_hash),
            } if epoch == self.reconciler.epoch() => {
                self.vote_submitted();
                let commander = self.commander;
                inflight.push(
                    async move {
                        let result = commander.confirm(&contract, &tx_hash).await;
                        Completion::Confirmed { epoch, result }
                    }
                    .boxed_local(),
                );
            }
            Completion::Submitted { epoch, result, .. } => {
                let result = result.map(|_| ());
                inflight.extend(self.finish_vote(epoch, result).map(fetch));
            }
            Completion::Confirmed { epoch, result } => {
                let result = result.map(|_| ());
                inflight.extend(self.finish_vote(epoch, result).map(fetch));
            }
        }
    }

    // ── shared steps ──

    fn react(&mut self, event: ClientEvent) -> Followup {
        let mut followup = Followup::default();
        let reaction = translate(&event, self.state.account());
        debug!(?reaction, "event");

        match reaction {
            Reaction::SwitchAccount(account) => {
                let bound = self.state.contract_handle().is_some();
                if let (Some(wallet), true) = (&self.wallet, bound) {
                    match self.binder.bind(wallet.as_ref(), &account) {
                        Ok(contract) => self.state.rebind_contract(contract),
                        Err(err) => {
                            warn!(%account, "rebinding contract failed: {err}");
                            self.state.record_error(err);
                        }
                    }
                }
                info!(%account, "account switched");
                self.state.switch_account(account);
                if let Some(ticket) = self.begin_refresh(RefreshScope::VoteStatus) {
                    if self.state.phase() == Phase::Idle {
                        self.state.set_phase(Phase::Connecting);
                    }
                    followup.tickets.push(ticket);
                }
            }
            Reaction::ClearAccount => {
                info!("wallet revoked all accounts");
                self.state.clear_account();
                self.state.set_phase(Phase::Idle);
            }
            Reaction::HardReset(chain_id) => {
                info!(%chain_id, "chain changed, resetting client");
                self.hard_reset();
                followup.reconnect = self.config.reconnect_on_chain_change && self.wallet.is_some();
            }
            Reaction::VoteObserved {
                own,
                candidate_index,
            } => {
                if own {
                    info!(candidate_index, "own vote recorded on-chain");
                    self.reconciler.observe_vote();
                    self.state.observe_has_voted(true);
                    let expires = self.clock.now_ms().saturating_add(self.config.notice_ttl_ms);
                    self.state
                        .show_notice(NoticeKind::Recorded, VOTE_RECORDED_NOTICE, expires);
                }
                followup
                    .tickets
                    .extend(self.begin_refresh(RefreshScope::Candidates));
            }
        }
        followup
    }

    fn hard_reset(&mut self) {
        self.state.reset();
        self.reconciler.reset();
        self.bridge.detach();
        self.bridge.drain();
    }

    fn begin_vote(&mut self, candidate_index: u64) -> Result<(ContractHandle, u64), VoteError> {
        let checked = self.commander.check(&self.state, candidate_index).cloned();
        match checked {
            Ok(contract) => {
                self.state.clear_error();
                self.state.set_phase(Phase::Voting);
                Ok((contract, self.reconciler.epoch()))
            }
            Err(err) => {
                warn!(candidate_index, "vote refused: {err}");
                self.state.record_error(err.clone());
                Err(err)
            }
        }
    }

    fn vote_submitted(&mut self) {
        let expires = self.clock.now_ms().saturating_add(self.config.notice_ttl_ms);
        self.state
            .show_notice(NoticeKind::Submitted, VOTE_SUBMITTED_NOTICE, expires);
    }

    /// Leaves `Voting` whatever the outcome. A contract-side "already voted"
    /// re-reads the vote status instead of assuming it.
    fn finish_vote(&mut self, epoch: u64, result: Result<(), VoteError>) -> Option<RefreshTicket> {
        if epoch != self.reconciler.epoch() {
            debug!("vote outcome from a previous session ignored");
            return None;
        }
        if self.state.phase() == Phase::Voting {
            self.state.set_phase(Phase::Ready);
        }
        match result {
            Ok(()) => None,
            Err(err) => {
                let recheck = err == VoteError::AlreadyVoted;
                self.state.record_error(err);
                if recheck {
                    self.begin_refresh(RefreshScope::VoteStatus)
                } else {
                    None
                }
            }
        }
    }

    async fn settle(&mut self, ticket: RefreshTicket) -> ApplyOutcome {
        let (ticket, result) = StateReconciler::fetch(ticket).await;
        self.apply_refresh(&ticket, result)
    }
}

fn fetch(ticket: RefreshTicket) -> LocalBoxFuture<'static, Completion> {
    StateReconciler::fetch(ticket)
        .map(|(ticket, result)| Completion::Refreshed(ticket, result))
        .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use av_api_types::{
        Address, Candidate, ChainDescriptor, ChainId, SEPOLIA_CHAIN_ID, VOTING_CONTRACT_ADDRESS,
        WalletEvent,
    };
    use av_chain_client::memory::{DEFAULT_ROSTER, InMemoryChain, Prompt};
    use av_chain_client::{
        EventSink, INTERNAL_ERROR, ProviderError, ProviderResult, Subscription, VotingContract,
    };
    use std::cell::RefCell;
    use tokio::sync::oneshot;

    fn alice() -> Address {
        Address::new("0xABC0000000000000000000000000000000000001")
    }

    fn bob() -> Address {
        Address::new("0xB0B0000000000000000000000000000000000002")
    }

    fn devnet(chain_id: ChainId) -> InMemoryChain {
        let chain = InMemoryChain::new(chain_id, vec![alice(), bob()]);
        chain.deploy(Address::new(VOTING_CONTRACT_ADDRESS), SEPOLIA_CHAIN_ID, &DEFAULT_ROSTER);
        chain
    }

    fn client_with(chain: &InMemoryChain, config: ClientConfig) -> (VotingClient, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(1_000));
        let client = VotingClient::new(config, Some(Rc::new(chain.clone())), clock.clone());
        (client, clock)
    }

    fn client(chain: &InMemoryChain) -> (VotingClient, Rc<ManualClock>) {
        client_with(chain, ClientConfig::default())
    }

    async fn connected(chain: &InMemoryChain) -> anyhow::Result<(VotingClient, Rc<ManualClock>)> {
        let (mut client, clock) = client(chain);
        client.connect().await?;
        Ok((client, clock))
    }

    #[tokio::test]
    async fn connect_loads_the_roster_with_zero_tallies() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (client, _) = connected(&chain).await?;
        let state = client.state();

        assert_eq!(state.phase(), Phase::Ready);
        assert_eq!(state.account(), Some(&alice()));
        assert!(state.chain_verified());
        assert!(!state.has_voted());
        let names: Vec<&str> = state.candidates().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, DEFAULT_ROSTER);
        assert!(state.candidates().iter().all(|c| c.vote_count == 0));
        Ok(())
    }

    #[tokio::test]
    async fn vote_is_reflected_once_the_event_arrives() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, clock) = connected(&chain).await?;

        client.cast_vote(2).await?;
        assert!(!client.state().has_voted());
        assert_eq!(client.state().phase(), Phase::Ready);
        assert_eq!(
            client.state().notice(clock.now_ms()).map(|n| n.kind),
            Some(NoticeKind::Submitted)
        );

        assert_eq!(client.process_pending_events().await, 1);
        let state = client.state();
        assert!(state.has_voted());
        assert_eq!(state.candidates()[2], Candidate::new("Goku", 1));
        let notice = state.notice(clock.now_ms()).unwrap();
        assert_eq!(notice.kind, NoticeKind::Recorded);
        assert_eq!(notice.text, VOTE_RECORDED_NOTICE);

        clock.advance(5_000);
        assert!(client.prune_notice());
        assert!(client.state().notice(clock.now_ms()).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn wrong_chain_is_added_and_switched_during_connect() -> anyhow::Result<()> {
        let chain = devnet(ChainId(1));
        chain.forget_chain(SEPOLIA_CHAIN_ID);
        let (client, _) = connected(&chain).await?;

        assert_eq!(
            chain.prompts(),
            vec![
                Prompt::RequestAccounts,
                Prompt::SwitchChain(SEPOLIA_CHAIN_ID),
                Prompt::AddChain(SEPOLIA_CHAIN_ID),
                Prompt::SwitchChain(SEPOLIA_CHAIN_ID),
            ]
        );
        assert_eq!(client.state().phase(), Phase::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn declined_authorization_leaves_account_unset() {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        chain.set_rejects_accounts(true);
        let (mut client, _) = client(&chain);

        let err = client.connect().await.unwrap_err();
        assert_eq!(err, ConnectError::UserRejected);
        assert!(client.state().account().is_none());
        assert_eq!(client.state().phase(), Phase::Error);
        assert_eq!(
            client.state().last_error().map(ClientError::category),
            Some("connect_rejected")
        );
    }

    #[tokio::test]
    async fn missing_wallet_points_at_install() {
        let clock = Rc::new(ManualClock::new(0));
        let mut client = VotingClient::new(ClientConfig::default(), None, clock);
        assert_eq!(client.connect().await, Err(ConnectError::NoWallet));
        let error = client.state().last_error().unwrap();
        assert_eq!(error.remediation(), crate::error::Remediation::InstallWallet);
    }

    #[tokio::test]
    async fn ensure_network_twice_prompts_once() -> anyhow::Result<()> {
        let chain = devnet(ChainId(1));
        let (mut client, _) = client(&chain);

        client.ensure_network().await?;
        let after_first = chain.prompts().len();
        client.ensure_network().await?;
        assert_eq!(chain.prompts().len(), after_first);
        assert!(client.state().chain_verified());
        Ok(())
    }

    #[tokio::test]
    async fn reconnecting_does_not_duplicate_subscriptions() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;
        client.connect().await?;
        client.connect().await?;
        assert_eq!(chain.wallet_subscribers(), 1);
        assert_eq!(chain.contract_subscribers(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_votes_never_reach_the_wallet() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;

        assert!(matches!(client.cast_vote(9).await, Err(VoteError::InvalidState(_))));

        client.cast_vote(0).await?;
        client.process_pending_events().await;
        assert!(matches!(client.cast_vote(1).await, Err(VoteError::InvalidState(_))));

        assert_eq!(chain.transactions().len(), 1);
        assert_eq!(
            client.state().last_error().map(ClientError::category),
            Some("invalid_state")
        );
        Ok(())
    }

    #[tokio::test]
    async fn vote_in_flight_blocks_a_second_submission() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;

        client.begin_vote(1)?;
        assert_eq!(client.state().phase(), Phase::Voting);
        assert!(matches!(client.cast_vote(1).await, Err(VoteError::InvalidState(_))));
        assert!(chain.transactions().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn connect_during_a_vote_keeps_the_vote_outstanding() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;

        client.begin_vote(1)?;
        client.connect().await?;
        assert_eq!(client.state().phase(), Phase::Voting);
        assert!(matches!(client.cast_vote(2).await, Err(VoteError::InvalidState(_))));

        chain.set_rejects_accounts(true);
        assert_eq!(client.connect().await, Err(ConnectError::UserRejected));
        assert_eq!(client.state().phase(), Phase::Voting);
        assert!(chain.transactions().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn oversized_notice_ttl_saturates() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let config = ClientConfig {
            notice_ttl_ms: u64::MAX,
            ..ClientConfig::default()
        };
        let (mut client, clock) = client_with(&chain, config);
        client.connect().await?;

        client.cast_vote(0).await?;
        assert_eq!(
            client.state().notice(clock.now_ms()).map(|n| n.kind),
            Some(NoticeKind::Submitted)
        );

        client.process_pending_events().await;
        clock.advance(1_000_000);
        assert_eq!(
            client.state().notice(clock.now_ms()).map(|n| n.kind),
            Some(NoticeKind::Recorded)
        );
        Ok(())
    }

    #[tokio::test]
    async fn vote_from_another_tab_surfaces_as_already_voted() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;
        chain.cast_external_vote(&alice(), 4)?;

        assert_eq!(client.cast_vote(3).await, Err(VoteError::AlreadyVoted));
        let state = client.state();
        assert_eq!(state.phase(), Phase::Ready);
        assert!(state.has_voted());
        Ok(())
    }

    #[tokio::test]
    async fn rejected_or_unfunded_votes_restore_ready() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;

        chain.set_rejects_signing(true);
        assert_eq!(client.cast_vote(0).await, Err(VoteError::UserRejected));
        assert_eq!(client.state().phase(), Phase::Ready);

        chain.set_rejects_signing(false);
        chain.fail_next_transaction(ProviderError::new(INTERNAL_ERROR, "Internal JSON-RPC error."));
        assert_eq!(client.cast_vote(0).await, Err(VoteError::InsufficientFunds));
        assert_eq!(client.state().phase(), Phase::Ready);
        assert!(!client.state().has_voted());
        assert!(client.state().can_vote());
        Ok(())
    }

    #[tokio::test]
    async fn final_account_follows_the_last_accounts_changed() -> anyhow::Result<()> {
        let sequences: Vec<Vec<Vec<Address>>> = vec![
            vec![vec![bob()]],
            vec![vec![bob(), alice()], vec![]],
            vec![vec![], vec![alice()]],
            vec![vec![bob()], vec![], vec![], vec![alice(), bob()], vec![bob()]],
        ];

        for sequence in sequences {
            let chain = devnet(SEPOLIA_CHAIN_ID);
            let (mut client, _) = connected(&chain).await?;
            for accounts in &sequence {
                chain.set_accounts(accounts.clone());
            }
            client.process_pending_events().await;

            let expected = sequence.last().and_then(|accounts| accounts.first());
            assert_eq!(client.state().account(), expected);
            if expected.is_none() {
                assert_eq!(client.state().phase(), Phase::Idle);
                assert!(!client.state().has_voted());
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn account_switch_rechecks_vote_status_and_rebinds_signer() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        chain.cast_external_vote(&bob(), 0)?;
        let (mut client, _) = connected(&chain).await?;
        client.process_pending_events().await;
        assert!(!client.state().has_voted());

        chain.set_accounts(vec![bob()]);
        client.process_pending_events().await;
        let state = client.state();
        assert_eq!(state.account(), Some(&bob()));
        assert!(state.has_voted());
        assert_eq!(state.contract_handle().map(ContractHandle::signer), Some(&bob()));
        Ok(())
    }

    #[tokio::test]
    async fn own_vote_stays_recorded_against_stale_reads() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;

        let stale = client.begin_refresh(RefreshScope::Full).unwrap();
        client.cast_vote(1).await?;
        client.process_pending_events().await;
        assert!(client.state().has_voted());

        let outcome = client.apply_refresh(
            &stale,
            Ok(Snapshot {
                candidates: Some(DEFAULT_ROSTER.iter().map(|n| Candidate::new(*n, 0)).collect()),
                has_voted: Some(false),
            }),
        );
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert!(client.state().has_voted());
        assert_eq!(client.state().candidates()[1].vote_count, 1);

        client.refresh(RefreshScope::Full).await;
        assert!(client.state().has_voted());
        Ok(())
    }

    #[tokio::test]
    async fn later_refresh_wins_over_an_earlier_one() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;

        let first = client.begin_refresh(RefreshScope::Candidates).unwrap();
        let (first, first_result) = StateReconciler::fetch(first).await;
        chain.cast_external_vote(&bob(), 3)?;
        let second = client.begin_refresh(RefreshScope::Candidates).unwrap();
        let (second, second_result) = StateReconciler::fetch(second).await;

        assert_eq!(client.apply_refresh(&second, second_result), ApplyOutcome::Applied);
        assert_eq!(client.apply_refresh(&first, first_result), ApplyOutcome::Stale);
        assert_eq!(client.state().candidates()[3].vote_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn chain_change_rebuilds_and_reconnects() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;
        chain.clear_prompts();

        chain.set_chain(ChainId(1));
        client.process_pending_events().await;

        assert_eq!(chain.current_chain(), SEPOLIA_CHAIN_ID);
        assert_eq!(
            chain.prompts(),
            vec![Prompt::RequestAccounts, Prompt::SwitchChain(SEPOLIA_CHAIN_ID)]
        );
        let state = client.state();
        assert_eq!(state.phase(), Phase::Ready);
        assert!(state.chain_verified());
        assert_eq!(state.candidates().len(), DEFAULT_ROSTER.len());
        assert_eq!(chain.wallet_subscribers(), 1);
        assert_eq!(chain.contract_subscribers(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn chain_change_without_reconnect_is_a_full_reset() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let config = ClientConfig {
            reconnect_on_chain_change: false,
            ..ClientConfig::default()
        };
        let (mut client, _) = client_with(&chain, config);
        client.connect().await?;

        chain.set_chain(ChainId(1));
        chain.cast_external_vote(&bob(), 0)?;
        client.process_pending_events().await;

        let state = client.state();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.account().is_none());
        assert!(state.contract_handle().is_none());
        assert!(!state.chain_verified());
        assert!(state.candidates().is_empty());
        assert_eq!(chain.wallet_subscribers(), 0);
        assert_eq!(chain.contract_subscribers(), 0);

        assert!(matches!(client.cast_vote(0).await, Err(VoteError::InvalidState(_))));
        Ok(())
    }

    #[tokio::test]
    async fn account_change_before_connect_stays_idle() {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = client(&chain);

        client
            .handle_event(ClientEvent::from(WalletEvent::AccountsChanged {
                accounts: vec![bob()],
            }))
            .await;

        assert_eq!(client.state().account(), Some(&bob()));
        assert_eq!(client.state().phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn external_votes_refresh_tallies_only() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, clock) = connected(&chain).await?;

        chain.cast_external_vote(&bob(), 4)?;
        client.process_pending_events().await;

        let state = client.state();
        assert_eq!(state.candidates()[4].vote_count, 1);
        assert!(!state.has_voted());
        assert!(state.notice(clock.now_ms()).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_contract_keeps_tallies_and_recovers() -> anyhow::Result<()> {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (mut client, _) = connected(&chain).await?;

        chain.set_reads_fail(true);
        assert_eq!(client.refresh(RefreshScope::Full).await, Some(ApplyOutcome::Failed));
        let state = client.state();
        assert_eq!(state.phase(), Phase::Error);
        assert_eq!(state.candidates().len(), DEFAULT_ROSTER.len());
        assert!(state.last_error().is_some_and(ClientError::is_recoverable));

        chain.set_reads_fail(false);
        client.refresh(RefreshScope::Full).await;
        assert_eq!(client.state().phase(), Phase::Ready);
        assert!(client.state().last_error().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn update_loop_votes_and_reconciles() {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (client, _) = client(&chain);
        let (commands, queue) = mpsc::channel(8);
        commands.send(Command::CastVote(2)).await.unwrap();
        drop(commands);

        let mut phases = Vec::new();
        let state = client
            .run(queue, |state| phases.push(state.phase()))
            .await;

        assert!(phases.contains(&Phase::Voting));
        assert_eq!(state.phase(), Phase::Ready);
        assert!(state.has_voted());
        assert_eq!(state.candidates()[2].vote_count, 1);
        assert_eq!(chain.wallet_subscribers(), 0);
    }

    #[tokio::test]
    async fn update_loop_without_wallet_records_no_wallet() {
        let clock = Rc::new(ManualClock::new(0));
        let client = VotingClient::new(ClientConfig::default(), None, clock);
        let (commands, queue) = mpsc::channel::<Command>(1);
        drop(commands);

        let state = client.run(queue, |_| {}).await;
        assert_eq!(state.last_error().map(ClientError::category), Some("no_wallet"));
    }

    type Release = Rc<RefCell<Option<oneshot::Receiver<()>>>>;

    /// Devnet wallet whose first `vote` waits for `release` before signing.
    struct HeldWallet {
        chain: InMemoryChain,
        release: Release,
    }

    struct HeldContract {
        inner: Rc<dyn VotingContract>,
        release: Release,
    }

    #[async_trait(?Send)]
    impl WalletProvider for HeldWallet {
        async fn request_accounts(&self) -> ProviderResult<Vec<Address>> {
            self.chain.request_accounts().await
        }

        async fn chain_id(&self) -> ProviderResult<ChainId> {
            self.chain.chain_id().await
        }

        async fn switch_chain(&self, chain_id: ChainId) -> ProviderResult<()> {
            self.chain.switch_chain(chain_id).await
        }

        async fn add_chain(&self, descriptor: &ChainDescriptor) -> ProviderResult<()> {
            self.chain.add_chain(descriptor).await
        }

        fn bind_contract(
            &self,
            address: &Address,
            signer: &Address,
        ) -> ProviderResult<Rc<dyn VotingContract>> {
            let inner = self.chain.bind_contract(address, signer)?;
            Ok(Rc::new(HeldContract {
                inner,
                release: self.release.clone(),
            }))
        }

        fn subscribe(&self, sink: EventSink) -> ProviderResult<Subscription> {
            self.chain.subscribe(sink)
        }
    }

    #[async_trait(?Send)]
    impl VotingContract for HeldContract {
        fn address(&self) -> &Address {
            self.inner.address()
        }

        async fn has_voted(&self, voter: &Address) -> ProviderResult<bool> {
            self.inner.has_voted(voter).await
        }

        async fn get_all_characters(&self) -> ProviderResult<Vec<Candidate>> {
            self.inner.get_all_characters().await
        }

        async fn vote(&self, candidate_index: u64) -> ProviderResult<TxHash> {
            let release = self.release.borrow_mut().take();
            if let Some(release) = release {
                let _ = release.await;
            }
            self.inner.vote(candidate_index).await
        }

        async fn wait_for_confirmation(&self, tx_hash: &TxHash) -> ProviderResult<VoteReceipt> {
            self.inner.wait_for_confirmation(tx_hash).await
        }

        fn subscribe_voted(&self, sink: EventSink) -> ProviderResult<Subscription> {
            self.inner.subscribe_voted(sink)
        }
    }

    #[tokio::test]
    async fn vote_outcome_from_before_a_chain_change_is_ignored() {
        let chain = devnet(SEPOLIA_CHAIN_ID);
        let (release_tx, release_rx) = oneshot::channel();
        let wallet = HeldWallet {
            chain: chain.clone(),
            release: Rc::new(RefCell::new(Some(release_rx))),
        };
        let config = ClientConfig {
            reconnect_on_chain_change: false,
            ..ClientConfig::default()
        };
        let client = VotingClient::new(config, Some(Rc::new(wallet)), Rc::new(ManualClock::new(0)));

        let (commands, queue) = mpsc::channel(4);
        commands.try_send(Command::CastVote(1)).unwrap();
        let mut commands = Some(commands);
        let mut release = Some(release_tx);
        let mut phases = Vec::new();

        let state = client
            .run(queue, |state| {
                phases.push(state.phase());
                match state.phase() {
                    // Submission still held: the wallet changes network under it.
                    Phase::Voting => {
                        chain.set_rejects_signing(true);
                        chain.set_chain(ChainId(1));
                    }
                    Phase::Idle => {
                        if let Some(release) = release.take() {
                            let _ = release.send(());
                            drop(commands.take());
                        }
                    }
                    _ => {}
                }
            })
            .await;

        assert!(phases.contains(&Phase::Voting));
        assert_eq!(
            chain.prompts().last(),
            Some(&Prompt::SignTransaction { candidate_index: 1 })
        );
        assert!(chain.transactions().is_empty());
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.last_error().is_none());
        assert!(state.account().is_none());
        assert!(!state.has_voted());
    }
}
