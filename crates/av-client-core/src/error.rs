//! Failure taxonomy of the client core.
//!
//! Every failure ends up as a [`ClientError`] in `ClientState::last_error`;
//! nothing propagates past the component boundary. Each variant has a stable
//! category tag, one human-readable message, and at most one remediation.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// What the UI can offer the user next to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    None,
    RetryNetworkSwitch,
    InstallWallet,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("network switch rejected by user")]
    UserRejected,
    #[error("required network unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("no wallet provider present")]
    NoWallet,
    #[error("account access rejected by user")]
    UserRejected,
    #[error("wallet returned no accounts")]
    NoAccounts,
    #[error("wrong network: {0}")]
    WrongNetwork(#[from] NetworkError),
    /// The wallet failed in a way that is neither a rejection nor a network problem.
    #[error("wallet error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("voting contract unreachable: {0}")]
    ContractUnreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("vote not allowed: {0}")]
    InvalidState(String),
    #[error("transaction signature rejected by user")]
    UserRejected,
    #[error("insufficient funds for gas")]
    InsufficientFunds,
    #[error("account has already voted")]
    AlreadyVoted,
    #[error("vote failed: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Vote(#[from] VoteError),
}

impl NetworkError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::UserRejected => "network_switch_rejected",
            Self::Unavailable(_) => "network_unavailable",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::UserRejected => "The network switch was cancelled.",
            Self::Unavailable(_) => "Could not switch your wallet to the required network.",
        }
    }
}

impl ClientError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connect(ConnectError::NoWallet) => "no_wallet",
            Self::Connect(ConnectError::UserRejected) => "connect_rejected",
            Self::Connect(ConnectError::NoAccounts) => "no_accounts",
            Self::Connect(ConnectError::WrongNetwork(_)) => "wrong_network",
            Self::Connect(ConnectError::Provider(_)) => "wallet_error",
            Self::Network(err) => err.category(),
            Self::Read(ReadError::ContractUnreachable(_)) => "contract_unreachable",
            Self::Vote(VoteError::InvalidState(_)) => "invalid_state",
            Self::Vote(VoteError::UserRejected) => "vote_rejected",
            Self::Vote(VoteError::InsufficientFunds) => "insufficient_funds",
            Self::Vote(VoteError::AlreadyVoted) => "already_voted",
            Self::Vote(VoteError::Unknown(_)) => "vote_failed",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Connect(ConnectError::NoWallet) => {
                "MetaMask is not installed. Please install it to use this app."
            }
            Self::Connect(ConnectError::UserRejected) => "The wallet connection was cancelled.",
            Self::Connect(ConnectError::NoAccounts) => {
                "No accounts available. Unlock your wallet and try again."
            }
            Self::Connect(ConnectError::WrongNetwork(NetworkError::UserRejected)) => {
                "Please switch your wallet to the required network."
            }
            Self::Connect(ConnectError::WrongNetwork(err)) => err.message(),
            Self::Connect(ConnectError::Provider(_)) => "The wallet reported an error.",
            Self::Network(err) => err.message(),
            Self::Read(_) => "Could not load data from the voting contract.",
            Self::Vote(VoteError::InvalidState(_)) => "You cannot vote right now.",
            Self::Vote(VoteError::UserRejected) => "Transaction cancelled by the user.",
            Self::Vote(VoteError::InsufficientFunds) => {
                "Network error. Do you have enough ETH for the transaction?"
            }
            Self::Vote(VoteError::AlreadyVoted) => "You have already voted.",
            Self::Vote(VoteError::Unknown(_)) => "Error processing the vote.",
        }
    }

    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Connect(ConnectError::NoWallet) => Remediation::InstallWallet,
            Self::Connect(ConnectError::WrongNetwork(_)) | Self::Network(_) => {
                Remediation::RetryNetworkSwitch
            }
            Self::Connect(ConnectError::UserRejected | ConnectError::NoAccounts) => {
                Remediation::Retry
            }
            Self::Connect(ConnectError::Provider(_)) | Self::Read(_) => Remediation::Retry,
            Self::Vote(VoteError::UserRejected | VoteError::Unknown(_)) => Remediation::Retry,
            Self::Vote(_) => Remediation::None,
        }
    }

    /// Recoverable failures keep the last valid state on screen.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Read(ReadError::ContractUnreachable(_))
                | Self::Network(NetworkError::Unavailable(_))
                | Self::Connect(ConnectError::WrongNetwork(NetworkError::Unavailable(_)))
        )
    }
}

impl Serialize for ClientError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_struct("ClientError", 5)?;
        out.serialize_field("category", self.category())?;
        out.serialize_field("message", self.message())?;
        out.serialize_field("detail", &self.to_string())?;
        out.serialize_field("remediation", &self.remediation())?;
        out.serialize_field("recoverable", &self.is_recoverable())?;
        out.end()
    }
}
