//! Chain segment files: streams of varint-length-prefixed block records
//! in the consensus encoding.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use pchaind_log::log_error;
use pchaind_primitives::encoding::{decode, encode, DecodeError, Decoder, Encoder};
use pchaind_primitives::Block;
use pchaind_storage::{KeyValueStore, StoreError};

use crate::index::ChainIndex;

#[derive(Debug)]
pub enum SegmentError {
    /// Range arguments rejected before any file or store access.
    InvalidRange(String),
    Io(std::io::Error),
    Decode(DecodeError),
    Store(StoreError),
    /// A height inside the requested range has no canonical block.
    MissingBlock(u64),
}

impl std::fmt::Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentError::InvalidRange(message) => write!(f, "invalid export range: {message}"),
            SegmentError::Io(err) => write!(f, "{err}"),
            SegmentError::Decode(err) => write!(f, "block record undecodable: {err}"),
            SegmentError::Store(err) => write!(f, "{err}"),
            SegmentError::MissingBlock(height) => {
                write!(f, "no canonical block at height {height}")
            }
        }
    }
}

impl std::error::Error for SegmentError {}

impl From<std::io::Error> for SegmentError {
    fn from(err: std::io::Error) -> Self {
        SegmentError::Io(err)
    }
}

impl From<DecodeError> for SegmentError {
    fn from(err: DecodeError) -> Self {
        SegmentError::Decode(err)
    }
}

impl From<StoreError> for SegmentError {
    fn from(err: StoreError) -> Self {
        SegmentError::Store(err)
    }
}

/// Validate raw range arguments. Both bounds must parse as non-negative
/// integers; nothing is opened or read before this check passes.
pub fn parse_export_range(first: &str, last: &str) -> Result<(u64, u64), SegmentError> {
    let parse = |raw: &str| {
        raw.trim()
            .parse::<u64>()
            .map_err(|_| SegmentError::InvalidRange(format!("block number not an integer: {raw:?}")))
    };
    Ok((parse(first)?, parse(last)?))
}

/// Export canonical blocks to `path`. Without a range the whole chain is
/// written to a fresh file; with a range only `[first, last]` is written,
/// appending when the file already exists. An inverted range exports
/// nothing and succeeds. Returns the number of blocks written.
pub fn export_segments<S: KeyValueStore>(
    index: &ChainIndex<S>,
    path: impl AsRef<Path>,
    range: Option<(u64, u64)>,
) -> Result<u64, SegmentError> {
    let (first, last, append) = match range {
        Some((first, last)) => (first, Some(last), true),
        None => (0, index.best_block()?.map(|tip| tip.height), false),
    };

    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)?
    } else {
        File::create(path)?
    };
    let mut writer = BufWriter::new(file);

    let mut written = 0u64;
    let Some(last) = last else {
        // Empty chain, full export: nothing to stream.
        return Ok(0);
    };
    let mut height = first;
    while height <= last {
        let block = index
            .block_by_height(height)?
            .ok_or(SegmentError::MissingBlock(height))?;
        let mut encoder = Encoder::new();
        encoder.write_var_bytes(&encode(&block));
        writer.write_all(&encoder.into_inner())?;
        written += 1;
        if height == u64::MAX {
            break;
        }
        height += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub files_ok: usize,
    pub files_failed: usize,
    pub blocks_imported: u64,
}

/// Import chain segment files. A single file is all-or-error: the first
/// bad record aborts the operation (blocks already inserted remain). With
/// several files each is isolated: a failure is logged and the next file
/// still runs, which is what bulk multi-part archives want.
pub fn import_segments<S: KeyValueStore>(
    index: &ChainIndex<S>,
    paths: &[impl AsRef<Path>],
) -> Result<ImportSummary, SegmentError> {
    let mut summary = ImportSummary::default();

    if let [only] = paths {
        summary.blocks_imported = import_segment_file(index, only.as_ref())?;
        summary.files_ok = 1;
        return Ok(summary);
    }

    for path in paths {
        let path = path.as_ref();
        match import_segment_file(index, path) {
            Ok(blocks) => {
                summary.files_ok += 1;
                summary.blocks_imported += blocks;
            }
            Err(err) => {
                summary.files_failed += 1;
                log_error!("import of {} failed: {err}", path.display());
            }
        }
    }
    Ok(summary)
}

fn import_segment_file<S: KeyValueStore>(
    index: &ChainIndex<S>,
    path: &Path,
) -> Result<u64, SegmentError> {
    let bytes = std::fs::read(path)?;
    let mut decoder = Decoder::new(&bytes);
    let mut imported = 0u64;
    while !decoder.is_empty() {
        let record = decoder.read_var_bytes()?;
        let block = decode::<Block>(&record)?;
        index.insert_block(&block)?;
        imported += 1;
    }
    Ok(imported)
}
