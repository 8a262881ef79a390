//! Column-partitioned key-value store behind the chain data layer.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

pub mod memory;

#[cfg(feature = "fjall")]
pub mod fjall;

/// Names accepted by [`KeyValueStore::stat`].
pub const STAT_GENERAL: &str = "stats";
pub const STAT_IO: &str = "iostats";

#[derive(Debug)]
pub enum StoreError {
    Backend(String),
    UnknownStat(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(message) => write!(f, "{message}"),
            StoreError::UnknownStat(name) => write!(f, "unknown stat {name:?}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Column {
    /// Canonical chain: height -> block hash.
    Canon,
    /// Block hash -> consensus-encoded block.
    Block,
    /// Trie node hash -> node bytes (account trie and all sub-tries).
    State,
    /// Hash -> preimage bytes.
    Preimage,
    /// Administrative keys (best block pointer, schema markers).
    Meta,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Canon,
        Column::Block,
        Column::State,
        Column::Preimage,
        Column::Meta,
    ];

    pub const fn bit(self) -> u32 {
        match self {
            Column::Canon => 1 << 0,
            Column::Block => 1 << 1,
            Column::State => 1 << 2,
            Column::Preimage => 1 << 3,
            Column::Meta => 1 << 4,
        }
    }

    pub const fn index(self) -> usize {
        self.bit().trailing_zeros() as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Canon => "canon",
            Column::Block => "block",
            Column::State => "state",
            Column::Preimage => "preimage",
            Column::Meta => "meta",
        }
    }
}

type BatchKey = SmallVec<[u8; 40]>;
type BatchValue = SmallVec<[u8; 128]>;

#[derive(Clone, Debug)]
pub enum WriteOp {
    Put {
        column: Column,
        key: BatchKey,
        value: BatchValue,
    },
    Delete {
        column: Column,
        key: BatchKey,
    },
}

#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.ops.reserve(additional);
    }

    pub fn put(&mut self, column: Column, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.ops.push(WriteOp::Put {
            column,
            key: SmallVec::from_slice(key.as_ref()),
            value: SmallVec::from_slice(value.as_ref()),
        });
    }

    pub fn delete(&mut self, column: Column, key: impl AsRef<[u8]>) {
        self.ops.push(WriteOp::Delete {
            column,
            key: SmallVec::from_slice(key.as_ref()),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;
pub type PrefixVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError> + 'a;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError>;
    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError>;
    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError>;
    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError>;

    /// Named diagnostic string. Backends answer [`STAT_GENERAL`] and
    /// [`STAT_IO`]; anything else is `UnknownStat`.
    fn stat(&self, name: &str) -> Result<String, StoreError>;

    /// Blocking compaction over the full key range of every column.
    fn compact_all(&self) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.as_ref().get(column, key)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.as_ref().put(column, key, value)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.as_ref().delete(column, key)
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        self.as_ref().scan_prefix(column, prefix)
    }

    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError> {
        self.as_ref().for_each_prefix(column, prefix, visitor)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        self.as_ref().write_batch(batch)
    }

    fn stat(&self, name: &str) -> Result<String, StoreError> {
        self.as_ref().stat(name)
    }

    fn compact_all(&self) -> Result<(), StoreError> {
        self.as_ref().compact_all()
    }
}
