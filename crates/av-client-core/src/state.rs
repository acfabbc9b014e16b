use crate::error::ClientError;
use crate::session::ContractHandle;
use av_api_types::{Address, Candidate};
use serde::{Serialize, Serializer};

pub const VOTE_RECORDED_NOTICE: &str = "Your vote has been recorded!";
pub const VOTE_SUBMITTED_NOTICE: &str = "Processing your vote...";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    Ready,
    Voting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// The wallet accepted the vote transaction.
    Submitted,
    /// The contract emitted `Voted` for the bound account.
    Recorded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    pub expires_at_ms: u64,
}

impl Notice {
    pub fn is_live(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// The client's single read model. Only the core mutates it; renderers read
/// it through the getters or its JSON form.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    account: Option<Address>,
    chain_verified: bool,
    #[serde(rename = "contract", serialize_with = "contract_address")]
    contract_handle: Option<ContractHandle>,
    candidates: Vec<Candidate>,
    has_voted: bool,
    phase: Phase,
    last_error: Option<ClientError>,
    transient_notice: Option<Notice>,
}

fn contract_address<S: Serializer>(
    handle: &Option<ContractHandle>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    handle.as_ref().map(ContractHandle::address).serialize(serializer)
}

impl ClientState {
    pub fn account(&self) -> Option<&Address> {
        self.account.as_ref()
    }

    pub fn chain_verified(&self) -> bool {
        self.chain_verified
    }

    pub fn contract_handle(&self) -> Option<&ContractHandle> {
        self.contract_handle.as_ref()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Meaningful only while an account and a contract handle are bound.
    pub fn has_voted(&self) -> bool {
        self.has_voted
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&ClientError> {
        self.last_error.as_ref()
    }

    /// The notice, if it has not expired at `now_ms`.
    pub fn notice(&self, now_ms: u64) -> Option<&Notice> {
        self.transient_notice
            .as_ref()
            .filter(|notice| notice.is_live(now_ms))
    }

    pub fn prune_notice(&mut self, now_ms: u64) -> bool {
        let expired = self
            .transient_notice
            .as_ref()
            .is_some_and(|notice| !notice.is_live(now_ms));
        if expired {
            self.transient_notice = None;
        }
        expired
    }

    pub fn short_account(&self) -> Option<String> {
        self.account.as_ref().map(Address::short)
    }

    /// Whether a vote button should be enabled.
    pub fn can_vote(&self) -> bool {
        self.account.is_some()
            && self.contract_handle.is_some()
            && self.chain_verified
            && !self.has_voted
            && !matches!(self.phase, Phase::Voting | Phase::Connecting | Phase::Idle)
    }

    /// The contract handle, only while the chain is verified.
    pub(crate) fn usable_contract(&self) -> Option<&ContractHandle> {
        self.contract_handle
            .as_ref()
            .filter(|_| self.chain_verified)
    }

    // ── mutation points ──

    /// Hard reset: every field back to its initial value.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn set_chain_verified(&mut self, verified: bool) {
        self.chain_verified = verified;
    }

    pub(crate) fn record_error(&mut self, error: impl Into<ClientError>) {
        self.last_error = Some(error.into());
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Clears `last_error` if it is a recoverable one (stale once fresh data arrived).
    pub(crate) fn clear_recoverable_error(&mut self) {
        if self.last_error.as_ref().is_some_and(ClientError::is_recoverable) {
            self.last_error = None;
        }
    }

    pub(crate) fn bind_session(&mut self, account: Address, contract: ContractHandle) {
        self.switch_account(account);
        self.contract_handle = Some(contract);
    }

    /// Points the state at `account`. A different account invalidates `has_voted`.
    pub(crate) fn switch_account(&mut self, account: Address) {
        let same = self
            .account
            .as_ref()
            .is_some_and(|current| current.matches(&account));
        if !same {
            self.has_voted = false;
        }
        self.account = Some(account);
    }

    pub(crate) fn rebind_contract(&mut self, contract: ContractHandle) {
        self.contract_handle = Some(contract);
    }

    pub(crate) fn clear_account(&mut self) {
        self.account = None;
        self.has_voted = false;
    }

    pub(crate) fn set_candidates(&mut self, candidates: Vec<Candidate>) {
        self.candidates = candidates;
    }

    /// On-chain votes cannot be withdrawn, so `has_voted` only ever moves to true.
    pub(crate) fn observe_has_voted(&mut self, has_voted: bool) {
        self.has_voted |= has_voted;
    }

    pub(crate) fn show_notice(&mut self, kind: NoticeKind, text: &str, expires_at_ms: u64) {
        self.transient_notice = Some(Notice {
            kind,
            text: text.to_owned(),
            expires_at_ms,
        });
    }
}
