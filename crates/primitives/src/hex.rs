use crate::{Address, Hash256};

#[derive(Debug, PartialEq, Eq)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

impl std::fmt::Display for HexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexError::InvalidLength => write!(f, "invalid hex length"),
            HexError::InvalidHex => write!(f, "invalid hex digit"),
        }
    }
}

impl std::error::Error for HexError {}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}

fn strip_prefix(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}

fn decode_fixed<const N: usize>(input: &str) -> Result<[u8; N], HexError> {
    let hex = strip_prefix(input);
    if hex.len() != N * 2 {
        return Err(HexError::InvalidLength);
    }
    let mut out = [0u8; N];
    for (i, byte_out) in out.iter_mut().enumerate() {
        let pair = hex
            .get(i * 2..i * 2 + 2)
            .ok_or(HexError::InvalidHex)?;
        *byte_out = u8::from_str_radix(pair, 16).map_err(|_| HexError::InvalidHex)?;
    }
    Ok(out)
}

pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    decode_fixed::<32>(input)
}

pub fn address_from_hex(input: &str) -> Result<Address, HexError> {
    decode_fixed::<20>(input)
}
