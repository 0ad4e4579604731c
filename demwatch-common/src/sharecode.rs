//! Match share-code normalization and codec
//!
//! Share codes are 25 symbols from a 57-symbol dictionary, conventionally
//! written as `CSGO-xxxxx-xxxxx-xxxxx-xxxxx-xxxxx`. The 25 base-57 digits
//! carry a 144-bit payload: a 64-bit match id, a 64-bit outcome id and a
//! 16-bit token, each little-endian.
//!
//! `normalize` tolerates missing delimiters and a missing prefix, and is
//! idempotent; `decode`/`encode` convert between the canonical string and
//! the `(match_id, outcome_id, token_id)` triple.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 57-symbol share-code dictionary; I, g, l, 0 and 1 are excluded as
/// ambiguous glyphs
const DICTIONARY: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZabcdefhijkmnopqrstuvwxyz23456789";

/// Number of base-57 symbols in a share code
const CODE_LEN: usize = 25;

/// Payload width in bytes: u64 match id + u64 outcome id + u16 token
const PAYLOAD_LEN: usize = 18;

const PREFIX: &str = "CSGO-";

/// Share-code errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareCodeError {
    /// Wrong number of code symbols after stripping prefix and delimiters
    #[error("Invalid share code length: expected {CODE_LEN} symbols, got {0}")]
    InvalidLength(usize),

    /// Symbol outside the 57-symbol dictionary
    #[error("Invalid share code symbol: {0:?}")]
    InvalidSymbol(char),

    /// Code value exceeds the 144-bit payload range
    #[error("Share code value out of range")]
    OutOfRange,
}

/// Decoded share-code triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedCode {
    /// Numeric match identifier
    pub match_id: u64,
    /// Match outcome (reservation) identifier
    pub outcome_id: u64,
    /// Low-entropy token distinguishing reuses of the same ids
    pub token_id: u16,
}

/// Strip prefix and delimiters, returning the bare 25 symbols
fn strip(code: &str) -> Result<Vec<u8>, ShareCodeError> {
    let mut body = code.trim();
    if let Some(head) = body.get(..PREFIX.len()) {
        if head.eq_ignore_ascii_case(PREFIX) {
            body = &body[PREFIX.len()..];
        }
    }

    let mut symbols = Vec::with_capacity(CODE_LEN);
    for ch in body.chars() {
        if ch == '-' {
            continue;
        }
        if !ch.is_ascii() || !DICTIONARY.contains(&(ch as u8)) {
            return Err(ShareCodeError::InvalidSymbol(ch));
        }
        symbols.push(ch as u8);
    }

    if symbols.len() != CODE_LEN {
        return Err(ShareCodeError::InvalidLength(symbols.len()));
    }

    Ok(symbols)
}

/// Normalize a share code to the canonical delimited form
///
/// Accepts the bare 25 symbols, partially delimited forms, and a
/// case-insensitive prefix. Idempotent: normalizing a canonical code
/// returns it unchanged.
pub fn normalize(code: &str) -> Result<String, ShareCodeError> {
    let symbols = strip(code)?;

    let mut out = String::with_capacity(PREFIX.len() + CODE_LEN + 4);
    out.push_str(PREFIX);
    for (i, chunk) in symbols.chunks(5).enumerate() {
        if i > 0 {
            out.push('-');
        }
        // chunks are dictionary bytes, always valid ASCII
        out.push_str(std::str::from_utf8(chunk).expect("dictionary symbols are ASCII"));
    }

    Ok(out)
}

/// Decode a share code into its (match, outcome, token) triple
pub fn decode(code: &str) -> Result<DecodedCode, ShareCodeError> {
    let symbols = strip(code)?;

    // Digits are little-endian in string order: accumulate from the last
    // symbol down so symbol 0 ends up least significant.
    let mut payload = [0u8; PAYLOAD_LEN];
    for &sym in symbols.iter().rev() {
        let digit = DICTIONARY
            .iter()
            .position(|&d| d == sym)
            .expect("strip() validated symbols") as u32;
        mul_add(&mut payload, 57, digit)?;
    }

    let match_id = u64::from_le_bytes(payload[0..8].try_into().expect("8 bytes"));
    let outcome_id = u64::from_le_bytes(payload[8..16].try_into().expect("8 bytes"));
    let token_id = u16::from_le_bytes(payload[16..18].try_into().expect("2 bytes"));

    Ok(DecodedCode {
        match_id,
        outcome_id,
        token_id,
    })
}

/// Encode a (match, outcome, token) triple into a canonical share code
pub fn encode(match_id: u64, outcome_id: u64, token_id: u16) -> String {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0..8].copy_from_slice(&match_id.to_le_bytes());
    payload[8..16].copy_from_slice(&outcome_id.to_le_bytes());
    payload[16..18].copy_from_slice(&token_id.to_le_bytes());

    let mut symbols = [0u8; CODE_LEN];
    for sym in symbols.iter_mut() {
        let rem = div_rem(&mut payload, 57);
        *sym = DICTIONARY[rem as usize];
    }

    let body = std::str::from_utf8(&symbols).expect("dictionary symbols are ASCII");
    normalize(body).expect("encoded symbols are always valid")
}

/// payload = payload * mul + add over the little-endian byte array
fn mul_add(payload: &mut [u8; PAYLOAD_LEN], mul: u32, add: u32) -> Result<(), ShareCodeError> {
    let mut carry = add;
    for byte in payload.iter_mut() {
        let v = (*byte as u32) * mul + carry;
        *byte = (v & 0xff) as u8;
        carry = v >> 8;
    }
    if carry != 0 {
        return Err(ShareCodeError::OutOfRange);
    }
    Ok(())
}

/// payload = payload / div, returns the remainder
fn div_rem(payload: &mut [u8; PAYLOAD_LEN], div: u32) -> u32 {
    let mut rem = 0u32;
    for byte in payload.iter_mut().rev() {
        let v = rem * 256 + *byte as u32;
        *byte = (v / div) as u8;
        rem = v % div;
    }
    rem
}
