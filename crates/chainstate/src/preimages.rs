//! Hash-preimage migration: one file, whole-or-fail, records in the
//! same encoding family as chain segments (32-byte hash + var bytes).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use pchaind_primitives::encoding::{DecodeError, Decoder, Encoder};
use pchaind_storage::{Column, KeyValueStore, StoreError, WriteBatch};

#[derive(Debug)]
pub enum PreimageError {
    Io(std::io::Error),
    Decode(DecodeError),
    Store(StoreError),
}

impl std::fmt::Display for PreimageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreimageError::Io(err) => write!(f, "{err}"),
            PreimageError::Decode(err) => write!(f, "preimage record undecodable: {err}"),
            PreimageError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PreimageError {}

impl From<std::io::Error> for PreimageError {
    fn from(err: std::io::Error) -> Self {
        PreimageError::Io(err)
    }
}

impl From<DecodeError> for PreimageError {
    fn from(err: DecodeError) -> Self {
        PreimageError::Decode(err)
    }
}

impl From<StoreError> for PreimageError {
    fn from(err: StoreError) -> Self {
        PreimageError::Store(err)
    }
}

/// Stream every preimage record to `path`, overwriting it. Records are
/// written in store scan order (lexicographic by hash). Returns the
/// record count.
pub fn export_preimages<S: KeyValueStore>(
    store: &S,
    path: impl AsRef<Path>,
) -> Result<u64, PreimageError> {
    let entries = store.scan_prefix(Column::Preimage, &[])?;
    let mut writer = BufWriter::new(File::create(path)?);
    for (hash, preimage) in &entries {
        let mut encoder = Encoder::new();
        encoder.write_bytes(hash);
        encoder.write_var_bytes(preimage);
        writer.write_all(&encoder.into_inner())?;
    }
    writer.flush()?;
    Ok(entries.len() as u64)
}

/// Import a preimage file as one unit: the whole file is decoded before
/// anything is written, so a bad record leaves the store untouched.
pub fn import_preimages<S: KeyValueStore>(
    store: &S,
    path: impl AsRef<Path>,
) -> Result<u64, PreimageError> {
    let bytes = std::fs::read(path)?;
    let mut decoder = Decoder::new(&bytes);
    let mut batch = WriteBatch::new();
    let mut imported = 0u64;
    while !decoder.is_empty() {
        let hash = decoder.read_hash()?;
        let preimage = decoder.read_var_bytes()?;
        batch.put(Column::Preimage, hash, preimage);
        imported += 1;
    }
    store.write_batch(&batch)?;
    Ok(imported)
}
