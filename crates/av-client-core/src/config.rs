use anyhow::{Context, Result, bail};
use av_api_types::{Address, ChainDescriptor, ChainId, SEPOLIA_CHAIN_ID, VOTING_CONTRACT_ADDRESS};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NOTICE_TTL_MS: u64 = 5_000;
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;

/// Static deployment facts plus client behaviour switches.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Required chain and the descriptor offered to `wallet_addEthereumChain`.
    pub chain: ChainDescriptor,
    pub contract_address: Address,
    pub notice_ttl_ms: u64,
    pub event_queue_capacity: usize,
    /// Connect once when the update loop starts.
    pub auto_connect: bool,
    /// Re-run `connect()` after the hard reset caused by `chainChanged`.
    pub reconnect_on_chain_change: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chain: ChainDescriptor::sepolia(),
            contract_address: Address::new(VOTING_CONTRACT_ADDRESS),
            notice_ttl_ms: DEFAULT_NOTICE_TTL_MS,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            auto_connect: true,
            reconnect_on_chain_change: true,
        }
    }
}

impl ClientConfig {
    pub fn required_chain(&self) -> ChainId {
        self.chain.chain_id
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("parse client config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `VOTING_CHAIN_ID`, `VOTING_CONTRACT_ADDRESS`, `VOTING_RPC_URL`
    /// and `VOTING_NOTICE_TTL_MS`, keeping the Sepolia defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("VOTING_CHAIN_ID") {
            let chain_id = ChainId::parse(&raw)
                .with_context(|| format!("VOTING_CHAIN_ID is not a chain id: {raw}"))?;
            if chain_id != SEPOLIA_CHAIN_ID {
                config.chain.chain_id = chain_id;
                config.chain.chain_name = format!("Chain {}", chain_id.0);
                config.chain.block_explorer_urls.clear();
            }
        }
        if let Some(address) = lookup("VOTING_CONTRACT_ADDRESS") {
            config.contract_address = Address::new(address.trim());
        }
        if let Some(url) = lookup("VOTING_RPC_URL") {
            config.chain.rpc_urls = vec![url.trim_end_matches('/').to_string()];
        }
        if let Some(raw) = lookup("VOTING_NOTICE_TTL_MS") {
            config.notice_ttl_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("VOTING_NOTICE_TTL_MS is not a number: {raw}"))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_queue_capacity == 0 {
            bail!("event queue capacity must be at least 1");
        }
        if av_abi::encode_has_voted(&self.contract_address).is_err() {
            bail!("contract address is not a 20-byte hex address: {}", self.contract_address);
        }
        Ok(())
    }
}
