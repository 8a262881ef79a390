use std::sync::Arc;

use pchaind_chainstate::index::ChainIndex;
use pchaind_chainstate::segments::{
    export_segments, import_segments, parse_export_range, SegmentError,
};
use pchaind_primitives::{Block, BlockHeader, Hash256, ZERO_HASH};
use pchaind_storage::memory::MemoryStore;
use pchaind_trie::empty_root_hash;

fn build_chain(index: &ChainIndex<MemoryStore>, heights: u64) -> Vec<Hash256> {
    let mut parent = ZERO_HASH;
    let mut hashes = Vec::new();
    for height in 0..=heights {
        let block = Block {
            header: BlockHeader {
                height,
                parent_hash: parent,
                state_root: empty_root_hash(),
                tx_root: Block::compute_tx_root(&[]),
                time: 1_600_000_000 + height,
            },
            transactions: Vec::new(),
        };
        parent = index.insert_block(&block).expect("insert");
        hashes.push(parent);
    }
    hashes
}

#[test]
fn export_import_round_trip() {
    let source = ChainIndex::new(Arc::new(MemoryStore::new()));
    let hashes = build_chain(&source, 100);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("chain.seg");
    let written = export_segments(&source, &path, None).expect("export");
    assert_eq!(written, 101);

    let dest = ChainIndex::new(Arc::new(MemoryStore::new()));
    let summary = import_segments(&dest, &[&path]).expect("import");
    assert_eq!(summary.blocks_imported, 101);

    let tip = dest.best_block().expect("best").expect("tip");
    assert_eq!(tip.height, 100);
    for (height, expected) in hashes.iter().enumerate() {
        let actual = dest
            .canonical_hash(height as u64)
            .expect("canon")
            .expect("hash");
        assert_eq!(actual, *expected, "hash mismatch at height {height}");
    }
}

#[test]
fn range_export_is_exact() {
    let source = ChainIndex::new(Arc::new(MemoryStore::new()));
    build_chain(&source, 30);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("range.seg");
    assert_eq!(
        export_segments(&source, &path, Some((10, 20))).expect("export"),
        11
    );

    let dest = ChainIndex::new(Arc::new(MemoryStore::new()));
    let summary = import_segments(&dest, &[&path]).expect("import");
    assert_eq!(summary.blocks_imported, 11);
    assert!(dest.canonical_hash(9).expect("canon").is_none());
    assert!(dest.canonical_hash(10).expect("canon").is_some());
    assert!(dest.canonical_hash(20).expect("canon").is_some());
    assert!(dest.canonical_hash(21).expect("canon").is_none());
    assert_eq!(dest.best_block().expect("best").expect("tip").height, 20);

    let single = dir.path().join("single.seg");
    assert_eq!(
        export_segments(&source, &single, Some((5, 5))).expect("export"),
        1
    );
}

#[test]
fn range_export_appends() {
    let source = ChainIndex::new(Arc::new(MemoryStore::new()));
    build_chain(&source, 9);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("append.seg");
    assert_eq!(
        export_segments(&source, &path, Some((0, 4))).expect("export"),
        5
    );
    assert_eq!(
        export_segments(&source, &path, Some((5, 9))).expect("export"),
        5
    );

    let dest = ChainIndex::new(Arc::new(MemoryStore::new()));
    let summary = import_segments(&dest, &[&path]).expect("import");
    assert_eq!(summary.blocks_imported, 10);
    assert_eq!(dest.best_block().expect("best").expect("tip").height, 9);
}

#[test]
fn inverted_range_exports_nothing() {
    let source = ChainIndex::new(Arc::new(MemoryStore::new()));
    build_chain(&source, 10);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("empty.seg");
    assert_eq!(
        export_segments(&source, &path, Some((7, 3))).expect("export"),
        0
    );
    assert_eq!(std::fs::metadata(&path).expect("metadata").len(), 0);
}

#[test]
fn missing_height_aborts_range_export() {
    let source = ChainIndex::new(Arc::new(MemoryStore::new()));
    build_chain(&source, 5);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gap.seg");
    match export_segments(&source, &path, Some((4, 9))) {
        Err(SegmentError::MissingBlock(6)) => {}
        other => panic!("expected MissingBlock(6), got {other:?}"),
    }
}

#[test]
fn multi_file_import_isolates_failures() {
    let source = ChainIndex::new(Arc::new(MemoryStore::new()));
    build_chain(&source, 3);

    let dir = tempfile::tempdir().expect("tempdir");
    let good = dir.path().join("good.seg");
    export_segments(&source, &good, None).expect("export");
    let corrupt = dir.path().join("corrupt.seg");
    // Claims five payload bytes but carries two.
    std::fs::write(&corrupt, [0x05, 0x01, 0x02]).expect("write");

    let dest = ChainIndex::new(Arc::new(MemoryStore::new()));
    let summary = import_segments(&dest, &[good, corrupt]).expect("import");
    assert_eq!(summary.files_ok, 1);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(summary.blocks_imported, 4);
    assert_eq!(dest.best_block().expect("best").expect("tip").height, 3);
}

#[test]
fn single_file_import_fails_fast() {
    let dir = tempfile::tempdir().expect("tempdir");
    let corrupt = dir.path().join("corrupt.seg");
    std::fs::write(&corrupt, [0x05, 0x01, 0x02]).expect("write");

    let dest = ChainIndex::new(Arc::new(MemoryStore::new()));
    assert!(import_segments(&dest, &[&corrupt]).is_err());
    assert!(dest.best_block().expect("best").is_none());
}

#[test]
fn range_arguments_are_validated_before_io() {
    match parse_export_range("-1", "10") {
        Err(SegmentError::InvalidRange(_)) => {}
        other => panic!("expected InvalidRange, got {other:?}"),
    }
    match parse_export_range("5", "ten") {
        Err(SegmentError::InvalidRange(_)) => {}
        other => panic!("expected InvalidRange, got {other:?}"),
    }
    assert_eq!(parse_export_range("5", "10").expect("parse"), (5, 10));
}
