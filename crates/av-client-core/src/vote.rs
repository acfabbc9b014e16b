use crate::error::VoteError;
use crate::session::ContractHandle;
use crate::state::{ClientState, Phase};
use av_abi::RevertReason;
use av_api_types::TxHash;
use av_chain_client::{INTERNAL_ERROR, ProviderError, VoteReceipt};
use tracing::{info, warn};

/// Submits votes and turns wallet/contract failures into [`VoteError`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoteCommander;

impl VoteCommander {
    /// Preconditions checked before anything reaches the wallet.
    pub fn check<'s>(
        &self,
        state: &'s ClientState,
        candidate_index: u64,
    ) -> Result<&'s ContractHandle, VoteError> {
        let Some(contract) = state.contract_handle() else {
            return Err(VoteError::InvalidState("no contract bound".into()));
        };
        if !state.chain_verified() {
            return Err(VoteError::InvalidState("network not verified".into()));
        }
        if state.account().is_none() {
            return Err(VoteError::InvalidState("no account bound".into()));
        }
        if state.has_voted() {
            return Err(VoteError::InvalidState("account has already voted".into()));
        }
        if state.phase() == Phase::Voting {
            return Err(VoteError::InvalidState("a vote is already in progress".into()));
        }
        let known = state.candidates().len();
        if known > 0 && usize::try_from(candidate_index).map_or(true, |index| index >= known) {
            return Err(VoteError::InvalidState(format!(
                "candidate {candidate_index} out of range (0..{known})"
            )));
        }
        Ok(contract)
    }

    /// Resolves once the wallet accepted the transaction.
    pub async fn submit(
        &self,
        contract: &ContractHandle,
        candidate_index: u64,
    ) -> Result<TxHash, VoteError> {
        let tx_hash = contract
            .contract()
            .vote(candidate_index)
            .await
            .map_err(|err| self.classify(&err))?;
        info!(%tx_hash, candidate_index, "vote submitted");
        Ok(tx_hash)
    }

    /// One confirmation is enough.
    pub async fn confirm(
        &self,
        contract: &ContractHandle,
        tx_hash: &TxHash,
    ) -> Result<VoteReceipt, VoteError> {
        let receipt = contract
            .contract()
            .wait_for_confirmation(tx_hash)
            .await
            .map_err(|err| self.classify(&err))?;
        if !receipt.success {
            return Err(VoteError::Unknown(format!(
                "transaction {tx_hash} reverted in block {}",
                receipt.block_number
            )));
        }
        info!(%tx_hash, block = receipt.block_number, "vote confirmed");
        Ok(receipt)
    }

    /// Submit and wait for the confirmation.
    pub async fn cast_vote(
        &self,
        contract: &ContractHandle,
        candidate_index: u64,
    ) -> Result<VoteReceipt, VoteError> {
        let tx_hash = self.submit(contract, candidate_index).await?;
        self.confirm(contract, &tx_hash).await
    }

    /// Structured revert data wins; message matching is the fallback.
    pub fn classify(&self, err: &ProviderError) -> VoteError {
        let classified = if err.is_user_rejected() {
            VoteError::UserRejected
        } else if let Some(reason) = err.data.as_deref().and_then(av_abi::decode_revert) {
            match reason {
                RevertReason::AlreadyVoted => VoteError::AlreadyVoted,
                RevertReason::Message(message) if mentions_already_voted(&message) => {
                    VoteError::AlreadyVoted
                }
                RevertReason::Message(message) => VoteError::Unknown(message),
                RevertReason::Panic(code) => VoteError::Unknown(format!("panic {code:#x}")),
                RevertReason::Custom(selector) => VoteError::Unknown(format!(
                    "custom error {}",
                    av_abi::to_hex_prefixed(&selector)
                )),
            }
        } else if err.code == Some(INTERNAL_ERROR)
            || err.message.to_ascii_lowercase().contains("insufficient funds")
        {
            VoteError::InsufficientFunds
        } else if mentions_already_voted(&err.message) {
            VoteError::AlreadyVoted
        } else {
            VoteError::Unknown(err.message.clone())
        };
        warn!(code = ?err.code, "vote failed: {classified}");
        classified
    }
}

fn mentions_already_voted(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already voted")
}
