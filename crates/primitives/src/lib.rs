//! Core chain types and consensus serialization.

pub mod account;
pub mod block;
pub mod encoding;
pub mod hash;
pub mod hex;

pub use account::AccountRecord;
pub use block::{Block, BlockHeader, Transaction};
pub use hash::{sha256, sha256d};
pub use hex::{address_from_hex, bytes_to_hex, hash256_from_hex, HexError};

/// 256-bit hash, big-endian display order.
pub type Hash256 = [u8; 32];

/// 160-bit account address.
pub type Address = [u8; 20];

pub const ZERO_HASH: Hash256 = [0u8; 32];
