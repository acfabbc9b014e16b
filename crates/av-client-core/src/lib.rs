//! Connection and synchronization core of the voting client.
//!
//! [`VotingClient`] owns the [`ClientState`] read model and is its only
//! writer. It runs the session flow (authorize, verify network, bind the
//! contract, reconcile, subscribe) and then reacts to wallet and contract
//! events and to vote commands.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod event_bridge;
pub mod network_guard;
pub mod reconciler;
pub mod session;
pub mod state;
pub mod vote;

pub use client::{Command, VotingClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use error::{ClientError, ConnectError, NetworkError, ReadError, Remediation, VoteError};
pub use event_bridge::{EventBridge, Reaction};
pub use network_guard::NetworkGuard;
pub use reconciler::{ApplyOutcome, RefreshScope, RefreshTicket, Snapshot, StateReconciler};
pub use session::{ContractHandle, Session, SessionBinder};
pub use state::{ClientState, Notice, NoticeKind, Phase};
pub use vote::VoteCommander;
