//! Pulls contract truth into [`ClientState`].
//!
//! Reads are issued as numbered tickets and fetched without holding the
//! reconciler, so several can be in flight at once. A result is applied only
//! if no later-issued read has been applied for the same part of the state
//! (candidate list, vote status) and the session has not been reset since.

use crate::error::ReadError;
use crate::session::ContractHandle;
use crate::state::{ClientState, Phase};
use av_api_types::{Address, Candidate};
use av_chain_client::ProviderError;
use futures_util::future;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    Full,
    Candidates,
    VoteStatus,
}

impl RefreshScope {
    pub fn includes_candidates(self) -> bool {
        matches!(self, Self::Full | Self::Candidates)
    }

    pub fn includes_vote_status(self) -> bool {
        matches!(self, Self::Full | Self::VoteStatus)
    }
}

/// One issued read. Carries everything needed to run it detached.
#[derive(Debug, Clone)]
pub struct RefreshTicket {
    seq: u64,
    epoch: u64,
    scope: RefreshScope,
    contract: ContractHandle,
    account: Option<Address>,
}

impl RefreshTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn scope(&self) -> RefreshScope {
        self.scope
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub candidates: Option<Vec<Candidate>>,
    pub has_voted: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Part of the result was superseded and dropped.
    Partial,
    Stale,
    Failed,
}

#[derive(Debug, Default)]
pub struct StateReconciler {
    epoch: u64,
    next_seq: u64,
    candidates_seq: u64,
    status_seq: u64,
}

impl StateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn issue(
        &mut self,
        scope: RefreshScope,
        contract: &ContractHandle,
        account: Option<&Address>,
    ) -> RefreshTicket {
        self.next_seq += 1;
        RefreshTicket {
            seq: self.next_seq,
            epoch: self.epoch,
            scope,
            contract: contract.clone(),
            account: account.cloned(),
        }
    }

    /// Runs the ticket's reads. Independent of `self`, so callers may keep
    /// several fetches in flight.
    pub async fn fetch(ticket: RefreshTicket) -> (RefreshTicket, Result<Snapshot, ReadError>) {
        let result = read(&ticket.contract, ticket.scope, ticket.account.as_ref()).await;
        (ticket, result)
    }

    /// Both reads, issued concurrently.
    pub async fn refresh(
        contract: &ContractHandle,
        account: &Address,
    ) -> Result<Snapshot, ReadError> {
        read(contract, RefreshScope::Full, Some(account)).await
    }

    pub fn apply(
        &mut self,
        state: &mut ClientState,
        ticket: &RefreshTicket,
        result: Result<Snapshot, ReadError>,
    ) -> ApplyOutcome {
        if ticket.epoch != self.epoch {
            debug!(seq = ticket.seq, "dropping read from a previous session");
            return ApplyOutcome::Stale;
        }

        let candidates_fresh =
            ticket.scope.includes_candidates() && ticket.seq > self.candidates_seq;
        let same_account = match (&ticket.account, state.account()) {
            (Some(asked), Some(current)) => asked.matches(current),
            _ => false,
        };
        let status_fresh =
            ticket.scope.includes_vote_status() && same_account && ticket.seq > self.status_seq;

        if !candidates_fresh && !status_fresh {
            warn!(seq = ticket.seq, scope = ?ticket.scope, "discarding superseded read");
            return ApplyOutcome::Stale;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(seq = ticket.seq, "reconciliation failed: {err}");
                state.record_error(err);
                if state.phase() != Phase::Voting {
                    state.set_phase(Phase::Error);
                }
                return ApplyOutcome::Failed;
            }
        };

        let mut dropped = false;
        match snapshot.candidates {
            Some(candidates) if candidates_fresh => {
                state.set_candidates(candidates);
                self.candidates_seq = ticket.seq;
            }
            Some(_) => dropped = true,
            None => {}
        }
        match snapshot.has_voted {
            Some(has_voted) if status_fresh => {
                state.observe_has_voted(has_voted);
                self.status_seq = ticket.seq;
            }
            Some(_) => dropped = true,
            None => {}
        }

        state.clear_recoverable_error();
        if matches!(state.phase(), Phase::Connecting | Phase::Error) {
            state.set_phase(Phase::Ready);
        }
        debug!(seq = ticket.seq, scope = ?ticket.scope, dropped, "reconciled");

        if dropped {
            ApplyOutcome::Partial
        } else {
            ApplyOutcome::Applied
        }
    }

    /// The bound account's vote was observed on-chain; status reads issued
    /// before this point can no longer be applied.
    pub fn observe_vote(&mut self) {
        self.next_seq += 1;
        self.status_seq = self.next_seq;
    }

    /// Starts a new session: every outstanding ticket becomes stale.
    pub fn reset(&mut self) {
        self.epoch += 1;
    }
}

async fn read(
    handle: &ContractHandle,
    scope: RefreshScope,
    account: Option<&Address>,
) -> Result<Snapshot, ReadError> {
    let contract = handle.contract();
    let candidates = async {
        if scope.includes_candidates() {
            contract.get_all_characters().await.map(Some)
        } else {
            Ok(None)
        }
    };
    let has_voted = async {
        match account {
            Some(account) if scope.includes_vote_status() => {
                contract.has_voted(account).await.map(Some)
            }
            _ => Ok(None),
        }
    };

    let (candidates, has_voted) = future::join(candidates, has_voted).await;
    Ok(Snapshot {
        candidates: candidates.map_err(unreachable)?,
        has_voted: has_voted.map_err(unreachable)?,
    })
}

fn unreachable(err: ProviderError) -> ReadError {
    ReadError::ContractUnreachable(err.message)
}
