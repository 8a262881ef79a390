//! Structural census of a block's account-state trie forest.
//!
//! The account trie is walked once; every account leaf opens up to five
//! further tries (storage, TX1, TX3, proxied, reward), each walked one
//! level deep with their leaves left opaque. Only internal nodes are
//! counted and dumped, matching raw on-disk accounting: a subtree
//! reachable from two roots is counted once per root unless the
//! deduplicating mode is requested.

use std::collections::HashSet;
use std::io::{self, Write};

use pchaind_primitives::encoding::{decode, DecodeError};
use pchaind_primitives::{bytes_to_hex, AccountRecord, Hash256};
use pchaind_storage::{Column, KeyValueStore, StoreError};
use pchaind_trie::{empty_root_hash, NodeIterator, TrieError, WalkedNode};

use crate::index::ChainIndex;

/// Fixed name of the diagnostic dump file, overwritten on each run.
pub const NODE_DUMP_FILE_NAME: &str = "blockstate_nodedump";

#[derive(Debug)]
pub enum CensusError {
    /// The requested height has no canonical block.
    BlockNotFound(u64),
    /// The block's state root is absent from the store.
    StateNotFound(Hash256),
    Trie(TrieError),
    Account(DecodeError),
    Store(StoreError),
}

impl std::fmt::Display for CensusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CensusError::BlockNotFound(height) => {
                write!(f, "no canonical block at height {height}")
            }
            CensusError::StateNotFound(root) => {
                write!(f, "state root {} not found", bytes_to_hex(root))
            }
            CensusError::Trie(err) => write!(f, "{err}"),
            CensusError::Account(err) => write!(f, "account record undecodable: {err}"),
            CensusError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CensusError {}

impl From<TrieError> for CensusError {
    fn from(err: TrieError) -> Self {
        CensusError::Trie(err)
    }
}

impl From<StoreError> for CensusError {
    fn from(err: StoreError) -> Self {
        CensusError::Store(err)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CensusOptions {
    /// Count every distinct node hash once globally instead of once per
    /// root it is reachable from.
    pub dedup: bool,
}

/// Running totals plus the ordered node dump. Owned by one census run;
/// never shared across traversals.
#[derive(Debug, Default)]
pub struct CensusAccumulator {
    pub total_nodes: u64,
    pub total_bytes: u64,
    dump: Vec<(Hash256, Vec<u8>)>,
}

impl CensusAccumulator {
    fn record_internal(&mut self, hash: Hash256, raw: Vec<u8>) {
        self.total_nodes += 1;
        self.total_bytes += raw.len() as u64;
        self.dump.push((hash, raw));
    }

    /// Dump entries in visitation order.
    pub fn dump(&self) -> &[(Hash256, Vec<u8>)] {
        &self.dump
    }

    /// Write the dump as `"<hash hex> <value hex>\n"` lines.
    pub fn write_node_dump(&self, writer: &mut impl Write) -> io::Result<()> {
        for (hash, raw) in &self.dump {
            writeln!(writer, "{} {}", bytes_to_hex(hash), bytes_to_hex(raw))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct CensusReport {
    pub height: u64,
    pub block_hash: Hash256,
    /// Consensus-encoded size of the censused block.
    pub block_size: usize,
    pub accumulator: CensusAccumulator,
}

pub fn census<S: KeyValueStore>(
    index: &ChainIndex<S>,
    height: u64,
) -> Result<CensusReport, CensusError> {
    census_with_options(index, height, CensusOptions::default())
}

pub fn census_with_options<S: KeyValueStore>(
    index: &ChainIndex<S>,
    height: u64,
    options: CensusOptions,
) -> Result<CensusReport, CensusError> {
    let block = index
        .block_by_height(height)?
        .ok_or(CensusError::BlockNotFound(height))?;
    let state_root = block.header.state_root;
    let store = index.store();

    if state_root != empty_root_hash()
        && store.get(Column::State, &state_root)?.is_none()
    {
        return Err(CensusError::StateNotFound(state_root));
    }

    let mut accumulator = CensusAccumulator::default();
    let mut seen = options.dedup.then(HashSet::new);

    for item in NodeIterator::new(store, state_root) {
        match item? {
            WalkedNode::Internal { hash, raw } => {
                record(&mut accumulator, &mut seen, hash, raw);
            }
            WalkedNode::Leaf { key, value, .. } => {
                // Only 20-byte keys are account records; anything else
                // is not an account and is skipped.
                if key.len() != 20 {
                    continue;
                }
                let account =
                    decode::<AccountRecord>(&value).map_err(CensusError::Account)?;
                for root in account.sub_roots() {
                    if root != empty_root_hash() {
                        count_sub_trie(store, root, &mut accumulator, &mut seen)?;
                    }
                }
            }
        }
    }

    Ok(CensusReport {
        height,
        block_hash: block.hash(),
        block_size: block.encoded_size(),
        accumulator,
    })
}

/// Walk one sub-trie counting internal nodes only. Sub-trie leaves stay
/// opaque; there is never a third level of interpretation.
fn count_sub_trie<S: KeyValueStore>(
    store: &S,
    root: Hash256,
    accumulator: &mut CensusAccumulator,
    seen: &mut Option<HashSet<Hash256>>,
) -> Result<(), CensusError> {
    for item in NodeIterator::new(store, root) {
        if let WalkedNode::Internal { hash, raw } = item? {
            record(accumulator, seen, hash, raw);
        }
    }
    Ok(())
}

fn record(
    accumulator: &mut CensusAccumulator,
    seen: &mut Option<HashSet<Hash256>>,
    hash: Hash256,
    raw: Vec<u8>,
) {
    if let Some(seen) = seen {
        if !seen.insert(hash) {
            return;
        }
    }
    accumulator.record_internal(hash, raw);
}
