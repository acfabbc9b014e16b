//! Solidity ABI codec for the character voting contract.
//!
//! Covers exactly the surface the client talks to: `hasVoted(address)`,
//! `getAllCharacters()`, `vote(uint256)`, the `Voted` event and the revert
//! payloads a failed `vote` can carry.

use av_api_types::{Address, Candidate, ContractEvent};
use sha3::{Digest, Keccak256};
use thiserror::Error;

pub const HAS_VOTED: &str = "hasVoted(address)";
pub const GET_ALL_CHARACTERS: &str = "getAllCharacters()";
pub const VOTE: &str = "vote(uint256)";
pub const VOTED_EVENT: &str = "Voted(address,uint256)";
pub const ALREADY_VOTED_ERROR: &str = "AlreadyVoted()";
pub const ERROR_STRING: &str = "Error(string)";
pub const PANIC_UINT: &str = "Panic(uint256)";

const WORD: usize = 32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("abi data too short: need {needed} bytes, have {available}")]
    OutOfBounds { needed: usize, available: usize },
    #[error("abi value does not fit in 64 bits")]
    Overflow,
    #[error("abi string is not valid utf-8")]
    InvalidUtf8,
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("log is missing field: {0}")]
    MissingField(&'static str),
}

/// Decoded revert payload of a failed call or transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    /// The contract's custom `AlreadyVoted()` error.
    AlreadyVoted,
    /// `require(cond, "message")` style revert.
    Message(String),
    Panic(u64),
    /// A custom error this codec does not know.
    Custom([u8; 4]),
}

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0_u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

pub fn event_topic(signature: &str) -> [u8; 32] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0_u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn voted_topic() -> [u8; 32] {
    event_topic(VOTED_EVENT)
}

// ── hex ──

pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(raw: &str) -> Result<Vec<u8>, AbiError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(body).map_err(|_| AbiError::InvalidHex(raw.to_owned()))
}

pub fn parse_quantity(raw: &str) -> Result<u64, AbiError> {
    let body = raw
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| AbiError::InvalidHex(raw.to_owned()))?;
    u64::from_str_radix(body, 16).map_err(|_| AbiError::InvalidHex(raw.to_owned()))
}

// ── call encoding ──

pub fn encode_has_voted(voter: &Address) -> Result<Vec<u8>, AbiError> {
    let mut out = selector(HAS_VOTED).to_vec();
    out.extend_from_slice(&address_word(voter)?);
    Ok(out)
}

pub fn encode_get_all_characters() -> Vec<u8> {
    selector(GET_ALL_CHARACTERS).to_vec()
}

pub fn encode_vote(candidate_index: u64) -> Vec<u8> {
    let mut out = selector(VOTE).to_vec();
    out.extend_from_slice(&uint_word(candidate_index));
    out
}

// ── return encoding, for nodes and test doubles that answer calls ──

pub fn encode_bool(value: bool) -> Vec<u8> {
    uint_word(u64::from(value)).to_vec()
}

/// Encodes a `(string,uint256)[]` return value.
pub fn encode_characters(candidates: &[Candidate]) -> Vec<u8> {
    let tails: Vec<Vec<u8>> = candidates.iter().map(encode_character).collect();

    let mut out = Vec::new();
    out.extend_from_slice(&uint_word(WORD as u64));
    out.extend_from_slice(&uint_word(candidates.len() as u64));

    let mut offset = WORD * candidates.len();
    for tail in &tails {
        out.extend_from_slice(&uint_word(offset as u64));
        offset += tail.len();
    }
    for tail in tails {
        out.extend_from_slice(&tail);
    }
    out
}

pub fn encode_revert_message(message: &str) -> Vec<u8> {
    let mut out = selector(ERROR_STRING).to_vec();
    out.extend_from_slice(&uint_word(WORD as u64));
    out.extend_from_slice(&encode_string(message));
    out
}

pub fn encode_already_voted_error() -> Vec<u8> {
    selector(ALREADY_VOTED_ERROR).to_vec()
}

fn encode_character(candidate: &Candidate) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&uint_word((2 * WORD) as u64));
    out.extend_from_slice(&uint_word(candidate.vote_count));
    out.extend_from_slice(&encode_string(&candidate.name));
    out
}

fn encode_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = uint_word(bytes.len() as u64).to_vec();
    out.extend_from_slice(bytes);
    out.resize(WORD + padded, 0);
    out
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0_u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> Result<[u8; WORD], AbiError> {
    let raw = from_hex(address.as_str())
        .map_err(|_| AbiError::InvalidAddress(address.0.clone()))?;
    if raw.len() != 20 {
        return Err(AbiError::InvalidAddress(address.0.clone()));
    }
    let mut word = [0_u8; WORD];
    word[WORD - 20..].copy_from_slice(&raw);
    Ok(word)
}

// ── decoding ──

pub fn decode_bool(data: &[u8]) -> Result<bool, AbiError> {
    Ok(read_u64(data, 0)? != 0)
}

/// Decodes the `getAllCharacters()` return value, preserving contract order.
pub fn decode_characters(data: &[u8]) -> Result<Vec<Candidate>, AbiError> {
    let array_offset = read_usize(data, 0)?;
    let len = read_usize(data, array_offset)?;
    if len > data.len() / WORD {
        return Err(AbiError::OutOfBounds {
            needed: len.saturating_mul(WORD),
            available: data.len(),
        });
    }

    let base = offset_add(array_offset, WORD)?;
    let mut candidates = Vec::with_capacity(len);
    for index in 0..len {
        let head = offset_add(base, index * WORD)?;
        let tuple = offset_add(base, read_usize(data, head)?)?;
        let name_at = offset_add(tuple, read_usize(data, tuple)?)?;
        let vote_count = read_u64(data, offset_add(tuple, WORD)?)?;
        let name = read_string(data, name_at)?;
        candidates.push(Candidate { name, vote_count });
    }
    Ok(candidates)
}

/// Decodes a `Voted` log. Accepts both the indexed-voter layout
/// (`topics[1]` = voter, data = index) and the fully unindexed one.
pub fn decode_voted_log(topics: &[Vec<u8>], data: &[u8]) -> Result<ContractEvent, AbiError> {
    let (voter, candidate_index) = match topics.len() {
        0 => return Err(AbiError::MissingField("topics")),
        1 => (read_address(data, 0)?, read_u64(data, WORD)?),
        2 => (read_address(&topics[1], 0)?, read_u64(data, 0)?),
        _ => (read_address(&topics[1], 0)?, read_u64(&topics[2], 0)?),
    };
    Ok(ContractEvent::Voted {
        voter,
        candidate_index,
    })
}

pub fn decode_revert(data: &[u8]) -> Option<RevertReason> {
    let head: [u8; 4] = data.get(..4)?.try_into().ok()?;
    let body = &data[4..];

    if head == selector(ALREADY_VOTED_ERROR) {
        return Some(RevertReason::AlreadyVoted);
    }
    if head == selector(ERROR_STRING) {
        let at = read_usize(body, 0).ok()?;
        return read_string(body, at).ok().map(RevertReason::Message);
    }
    if head == selector(PANIC_UINT) {
        return read_u64(body, 0).ok().map(RevertReason::Panic);
    }
    Some(RevertReason::Custom(head))
}

fn word(data: &[u8], at: usize) -> Result<&[u8], AbiError> {
    let end = offset_add(at, WORD)?;
    data.get(at..end).ok_or(AbiError::OutOfBounds {
        needed: end,
        available: data.len(),
    })
}

fn read_u64(data: &[u8], at: usize) -> Result<u64, AbiError> {
    let word = word(data, at)?;
    if word[..WORD - 8].iter().any(|byte| *byte != 0) {
        return Err(AbiError::Overflow);
    }
    let mut low = [0_u8; 8];
    low.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(low))
}

fn read_usize(data: &[u8], at: usize) -> Result<usize, AbiError> {
    usize::try_from(read_u64(data, at)?).map_err(|_| AbiError::Overflow)
}

fn read_address(data: &[u8], at: usize) -> Result<Address, AbiError> {
    let word = word(data, at)?;
    Ok(Address(to_hex_prefixed(&word[WORD - 20..])))
}

fn read_string(data: &[u8], at: usize) -> Result<String, AbiError> {
    let len = read_usize(data, at)?;
    let start = offset_add(at, WORD)?;
    let end = offset_add(start, len)?;
    let bytes = data.get(start..end).ok_or(AbiError::OutOfBounds {
        needed: end,
        available: data.len(),
    })?;
    String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
}

fn offset_add(base: usize, delta: usize) -> Result<usize, AbiError> {
    base.checked_add(delta).ok_or(AbiError::Overflow)
}
