use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::{Column, KeyValueStore, PrefixVisitor, StoreError, WriteBatch, WriteOp};
use crate::{STAT_GENERAL, STAT_IO};

type MemoryStoreMap = BTreeMap<(Column, Vec<u8>), Vec<u8>>;

/// In-memory backend. Tracks operation and byte counters so the
/// administrative stat strings have something truthful to report.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreMap>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    compactions: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn count_write(&self, value_len: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add(value_len as u64, Ordering::Relaxed);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        let value = guard.get(&(column, key.to_vec())).cloned();
        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(bytes) = &value {
            self.bytes_read
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        }
        Ok(value)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("memory store lock");
        guard.insert((column, key.to_vec()), value.to_vec());
        self.count_write(value.len());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("memory store lock");
        guard.remove(&(column, key.to_vec()));
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        let mut results = Vec::new();
        for ((entry_column, key), value) in guard.iter() {
            if *entry_column == column && key.starts_with(prefix) {
                results.push((key.clone(), value.clone()));
            }
        }
        Ok(results)
    }

    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        for ((entry_column, key), value) in guard.iter() {
            if *entry_column == column && key.starts_with(prefix) {
                visitor(key.as_slice(), value.as_slice())?;
            }
        }
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("memory store lock");
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    guard.insert((*column, key.to_vec()), value.to_vec());
                    self.count_write(value.len());
                }
                WriteOp::Delete { column, key } => {
                    guard.remove(&(*column, key.to_vec()));
                    self.deletes.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    fn stat(&self, name: &str) -> Result<String, StoreError> {
        match name {
            STAT_GENERAL => {
                let guard = self.inner.read().expect("memory store lock");
                let mut out = String::from("memory store\n");
                for column in Column::ALL {
                    let (keys, bytes) = guard
                        .iter()
                        .filter(|((entry_column, _), _)| *entry_column == column)
                        .fold((0u64, 0u64), |(keys, bytes), ((_, key), value)| {
                            (keys + 1, bytes + key.len() as u64 + value.len() as u64)
                        });
                    out.push_str(&format!(
                        "  {:<10} {keys:>8} keys {bytes:>12} bytes\n",
                        column.as_str()
                    ));
                }
                Ok(out)
            }
            STAT_IO => Ok(format!(
                "reads {} ({} bytes), writes {} ({} bytes), deletes {}, compactions {}",
                self.reads.load(Ordering::Relaxed),
                self.bytes_read.load(Ordering::Relaxed),
                self.writes.load(Ordering::Relaxed),
                self.bytes_written.load(Ordering::Relaxed),
                self.deletes.load(Ordering::Relaxed),
                self.compactions.load(Ordering::Relaxed),
            )),
            other => Err(StoreError::UnknownStat(other.to_string())),
        }
    }

    fn compact_all(&self) -> Result<(), StoreError> {
        // Nothing to reorganize; recorded so iostats reflect the request.
        self.compactions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
