//! Hash-addressed state trie: node model, depth-first walker, and a
//! batch-writing builder.
//!
//! Every node is stored in [`Column::State`] under the sha256 of its own
//! encoding. Branch nodes carry a sorted (nibble, child hash) list; leaf
//! nodes carry the full key and an opaque value blob. A trie with zero
//! entries is never materialized: its root is the well-known sentinel
//! returned by [`empty_root_hash`], and readers skip it.

use std::sync::OnceLock;

use pchaind_primitives::encoding::{encode, Decodable, DecodeError, Decoder, Encodable, Encoder};
use pchaind_primitives::{sha256, Hash256};
use pchaind_storage::StoreError;

mod build;
mod walk;

pub use build::build_trie;
pub use walk::{NodeIterator, WalkedNode};

const TAG_BRANCH: u8 = 0x00;
const TAG_LEAF: u8 = 0x01;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrieNode {
    Branch { children: Vec<(u8, Hash256)> },
    Leaf { key: Vec<u8>, value: Vec<u8> },
}

impl Encodable for TrieNode {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        match self {
            TrieNode::Branch { children } => {
                encoder.write_u8(TAG_BRANCH);
                encoder.write_varint(children.len() as u64);
                for (nibble, hash) in children {
                    encoder.write_u8(*nibble);
                    encoder.write_hash(hash);
                }
            }
            TrieNode::Leaf { key, value } => {
                encoder.write_u8(TAG_LEAF);
                encoder.write_var_bytes(key);
                encoder.write_var_bytes(value);
            }
        }
    }
}

impl Decodable for TrieNode {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        match decoder.read_u8()? {
            TAG_BRANCH => {
                let count = decoder.read_varint()?;
                if count > 16 {
                    return Err(DecodeError::InvalidData("branch with more than 16 children"));
                }
                let mut children = Vec::with_capacity(count as usize);
                let mut last: Option<u8> = None;
                for _ in 0..count {
                    let nibble = decoder.read_u8()?;
                    if nibble > 0x0f {
                        return Err(DecodeError::InvalidData("branch nibble out of range"));
                    }
                    if last.is_some_and(|prev| prev >= nibble) {
                        return Err(DecodeError::InvalidData("branch children out of order"));
                    }
                    last = Some(nibble);
                    children.push((nibble, decoder.read_hash()?));
                }
                Ok(TrieNode::Branch { children })
            }
            TAG_LEAF => Ok(TrieNode::Leaf {
                key: decoder.read_var_bytes()?,
                value: decoder.read_var_bytes()?,
            }),
            _ => Err(DecodeError::InvalidData("unknown trie node tag")),
        }
    }
}

impl TrieNode {
    pub fn hash(&self) -> Hash256 {
        sha256(&encode(self))
    }
}

/// Root hash of the trie with zero entries. A sub-trie root equal to this
/// sentinel means "no sub-trie": it is skipped, never resolved.
pub fn empty_root_hash() -> Hash256 {
    static EMPTY: OnceLock<Hash256> = OnceLock::new();
    *EMPTY.get_or_init(|| {
        TrieNode::Branch {
            children: Vec::new(),
        }
        .hash()
    })
}

/// Nibble (half-byte) at `index` of `key`, high nibble first.
pub(crate) fn nibble_at(key: &[u8], index: usize) -> Option<u8> {
    let byte = key.get(index / 2)?;
    Some(if index % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0f
    })
}

#[derive(Debug)]
pub enum TrieError {
    /// A referenced node hash is absent from the store.
    NodeMissing(Hash256),
    Decode(Hash256, DecodeError),
    Store(StoreError),
    DuplicateKey(Vec<u8>),
    /// A key is a strict prefix of another; keys within one trie must be
    /// distinguishable by nibble path.
    KeyIsPrefix(Vec<u8>),
}

impl std::fmt::Display for TrieError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrieError::NodeMissing(hash) => {
                write!(f, "trie node {} missing from store", hex32(hash))
            }
            TrieError::Decode(hash, err) => {
                write!(f, "trie node {} undecodable: {err}", hex32(hash))
            }
            TrieError::Store(err) => write!(f, "{err}"),
            TrieError::DuplicateKey(key) => {
                write!(f, "duplicate trie key ({} bytes)", key.len())
            }
            TrieError::KeyIsPrefix(key) => {
                write!(f, "trie key ({} bytes) is a prefix of another", key.len())
            }
        }
    }
}

impl std::error::Error for TrieError {}

impl From<StoreError> for TrieError {
    fn from(err: StoreError) -> Self {
        TrieError::Store(err)
    }
}

fn hex32(hash: &Hash256) -> String {
    pchaind_primitives::bytes_to_hex(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pchaind_primitives::encoding::decode;

    #[test]
    fn empty_root_is_stable_and_not_a_leaf_hash() {
        assert_eq!(empty_root_hash(), empty_root_hash());
        let leaf = TrieNode::Leaf {
            key: Vec::new(),
            value: Vec::new(),
        };
        assert_ne!(empty_root_hash(), leaf.hash());
    }

    #[test]
    fn node_roundtrip() {
        let branch = TrieNode::Branch {
            children: vec![(0x01, [0xaa; 32]), (0x0f, [0xbb; 32])],
        };
        let bytes = encode(&branch);
        assert_eq!(decode::<TrieNode>(&bytes).expect("decode"), branch);

        let leaf = TrieNode::Leaf {
            key: vec![1, 2, 3],
            value: vec![4, 5],
        };
        let bytes = encode(&leaf);
        assert_eq!(decode::<TrieNode>(&bytes).expect("decode"), leaf);
    }

    #[test]
    fn unsorted_branch_is_rejected() {
        let mut encoder = Encoder::new();
        encoder.write_u8(TAG_BRANCH);
        encoder.write_varint(2);
        encoder.write_u8(0x05);
        encoder.write_hash(&[0; 32]);
        encoder.write_u8(0x02);
        encoder.write_hash(&[0; 32]);
        assert!(decode::<TrieNode>(&encoder.into_inner()).is_err());
    }

    #[test]
    fn nibbles() {
        assert_eq!(nibble_at(&[0xab], 0), Some(0x0a));
        assert_eq!(nibble_at(&[0xab], 1), Some(0x0b));
        assert_eq!(nibble_at(&[0xab], 2), None);
    }
}
