use serde::{Deserialize, Serialize};
use std::fmt;

/// Sepolia testnet, where the voting contract is deployed.
pub const SEPOLIA_CHAIN_ID: ChainId = ChainId(11_155_111);

pub const VOTING_CONTRACT_ADDRESS: &str = "0xD1516F6fA4F1EC48A0EDD31D0c0d4C9d817f6438";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wallets report checksummed or lowercase hex interchangeably.
    pub fn matches(&self, other: &Address) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// `0x1234...abcd` form used by the account banner.
    pub fn short(&self) -> String {
        let raw = self.0.as_str();
        if raw.len() <= 10 || !raw.is_ascii() {
            return raw.to_owned();
        }
        format!("{}...{}", &raw[..6], &raw[raw.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// EIP-155 chain identifier. Serialized as a `0x`-prefixed hex quantity, the
/// form wallets use on the wire; deserializes from hex, decimal text or a number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "ChainIdRepr", into = "String")]
pub struct ChainId(pub u64);

impl ChainId {
    pub fn to_hex(self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok()?,
            None => raw.parse().ok()?,
        };
        Some(Self(parsed))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_hex()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChainIdRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<ChainIdRepr> for ChainId {
    type Error = String;

    fn try_from(value: ChainIdRepr) -> Result<Self, Self::Error> {
        match value {
            ChainIdRepr::Number(id) => Ok(ChainId(id)),
            ChainIdRepr::Text(raw) => {
                ChainId::parse(&raw).ok_or_else(|| format!("invalid chain id: {raw}"))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the on-chain roster. Its position in the roster is its
/// on-chain identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub name: String,
    pub vote_count: u64,
}

impl Candidate {
    pub fn new(name: impl Into<String>, vote_count: u64) -> Self {
        Self {
            name: name.into(),
            vote_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Chain metadata handed to the wallet when it does not know the chain
/// (EIP-3085 `wallet_addEthereumChain` parameter shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    pub chain_id: ChainId,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl ChainDescriptor {
    pub fn sepolia() -> Self {
        Self {
            chain_id: SEPOLIA_CHAIN_ID,
            chain_name: "Sepolia Testnet".to_owned(),
            native_currency: NativeCurrency {
                name: "Sepolia Ether".to_owned(),
                symbol: "SepoliaETH".to_owned(),
                decimals: 18,
            },
            rpc_urls: vec!["https://rpc.sepolia.org".to_owned()],
            block_explorer_urls: vec!["https://sepolia.etherscan.io".to_owned()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    AccountsChanged { accounts: Vec<Address> },
    ChainChanged { chain_id: ChainId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContractEvent {
    Voted {
        voter: Address,
        candidate_index: u64,
    },
}

/// Everything the client's event queue carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ClientEvent {
    Wallet(WalletEvent),
    Contract(ContractEvent),
}

impl From<WalletEvent> for ClientEvent {
    fn from(value: WalletEvent) -> Self {
        ClientEvent::Wallet(value)
    }
}

impl From<ContractEvent> for ClientEvent {
    fn from(value: ContractEvent) -> Self {
        ClientEvent::Contract(value)
    }
}
