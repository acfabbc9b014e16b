mod runtime;

use anyhow::{Context, Result};
use av_api_types::Address;
use av_chain_client::WalletProvider;
use av_chain_client::memory::{DEFAULT_ROSTER, InMemoryChain};
use av_chain_eip1193::Eip1193Wallet;
use av_chain_eip1193::http::HttpTransport;
use av_client_core::{ClientConfig, ClientState, Command, Phase, SystemClock, VotingClient};
use runtime::TokioRuntime;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// First unlocked account of anvil/hardhat; also the in-memory chain's only account.
const DEV_ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const DEFAULT_CANDIDATE: u64 = 2;
const SETTLE_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env()?;
    let candidate = candidate_index()?;
    let wallet = wallet(&config, std::env::var("VOTING_RPC_URL").ok());

    let local = tokio::task::LocalSet::new();
    let state = tokio::select! {
        state = local.run_until(vote_once(config, wallet, candidate)) => state?,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("interrupted"),
    };

    if let Some(error) = state.last_error() {
        info!(category = error.category(), "{}", error.message());
    }
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn candidate_index() -> Result<u64> {
    match std::env::var("VOTING_CANDIDATE") {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("VOTING_CANDIDATE is not a candidate index: {raw}")),
        Err(_) => Ok(DEFAULT_CANDIDATE),
    }
}

/// A JSON-RPC node when `rpc_url` is set, otherwise a fresh in-memory
/// deployment of the default roster.
fn wallet(config: &ClientConfig, rpc_url: Option<String>) -> Rc<dyn WalletProvider> {
    match rpc_url {
        Some(url) => {
            let transport = HttpTransport::new(Some(url));
            info!(endpoint = transport.endpoint(), "using JSON-RPC node");
            Rc::new(Eip1193Wallet::new(transport, TokioRuntime))
        }
        None => {
            let chain_id = config.required_chain();
            let chain = InMemoryChain::new(chain_id, vec![Address::new(DEV_ACCOUNT)]);
            chain.deploy(config.contract_address.clone(), chain_id, &DEFAULT_ROSTER);
            info!(contract = %config.contract_address, %chain_id, "deployed roster to in-memory chain");
            Rc::new(chain)
        }
    }
}

/// Connects, votes for `candidate` once the client is ready, and returns the
/// state after the vote settled (or the connection failed).
async fn vote_once(
    config: ClientConfig,
    wallet: Rc<dyn WalletProvider>,
    candidate: u64,
) -> Result<ClientState> {
    let config = ClientConfig {
        auto_connect: true,
        ..config
    };
    let client = VotingClient::new(config, Some(wallet), Rc::new(SystemClock));
    let (commands, queue) = mpsc::channel(4);

    let mut commands = Some(commands);
    let mut vote_sent = false;
    let run = client.run(queue, move |state| {
        let Some(sender) = commands.as_ref() else {
            return;
        };
        if !vote_sent && state.can_vote() {
            vote_sent = sender.try_send(Command::CastVote(candidate)).is_ok();
            info!(candidate, "vote requested");
        } else if settled(state, vote_sent) {
            info!(phase = ?state.phase(), has_voted = state.has_voted(), "session settled");
            commands = None;
        }
    });

    tokio::time::timeout(SETTLE_TIMEOUT, run)
        .await
        .context("timed out waiting for the vote to settle")
}

fn settled(state: &ClientState, vote_sent: bool) -> bool {
    state.has_voted()
        || matches!(state.phase(), Phase::Error | Phase::Idle)
        || (vote_sent && state.phase() == Phase::Ready && state.last_error().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_run_records_the_vote() -> Result<()> {
        let config = ClientConfig::default();
        let wallet = wallet(&config, None);

        let state = tokio::task::LocalSet::new()
            .run_until(vote_once(config, wallet, 2))
            .await?;

        assert!(state.has_voted());
        assert_eq!(state.phase(), Phase::Ready);
        assert_eq!(state.candidates()[2].name, "Goku");
        assert_eq!(state.candidates()[2].vote_count, 1);
        assert!(state.last_error().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn out_of_range_candidate_settles_with_an_error() -> Result<()> {
        let config = ClientConfig::default();
        let wallet = wallet(&config, None);

        let state = tokio::task::LocalSet::new()
            .run_until(vote_once(config, wallet, 42))
            .await?;

        assert!(!state.has_voted());
        assert_eq!(
            state.last_error().map(|error| error.category()),
            Some("invalid_state")
        );
        Ok(())
    }
}
