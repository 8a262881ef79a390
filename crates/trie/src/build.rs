use pchaind_primitives::encoding::encode;
use pchaind_primitives::Hash256;
use pchaind_storage::{Column, WriteBatch};

use crate::{empty_root_hash, nibble_at, TrieError, TrieNode};

/// Construct a trie from key/value pairs, appending every node to
/// `batch`, and return the root hash. An empty input produces the
/// empty-root sentinel and writes nothing. Keys must be unique and no
/// key may be a strict prefix of another.
pub fn build_trie(
    batch: &mut WriteBatch,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<Hash256, TrieError> {
    if entries.is_empty() {
        return Ok(empty_root_hash());
    }
    let mut entries = entries;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    for pair in entries.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(TrieError::DuplicateKey(pair[0].0.clone()));
        }
    }
    build_node(batch, &entries, 0)
}

fn build_node(
    batch: &mut WriteBatch,
    entries: &[(Vec<u8>, Vec<u8>)],
    depth: usize,
) -> Result<Hash256, TrieError> {
    if entries.len() == 1 {
        let (key, value) = &entries[0];
        return Ok(store_node(
            batch,
            &TrieNode::Leaf {
                key: key.clone(),
                value: value.clone(),
            },
        ));
    }

    // Entries are sorted, so each nibble group is a contiguous run.
    let mut children = Vec::new();
    let mut start = 0;
    while start < entries.len() {
        let nibble = nibble_at(&entries[start].0, depth)
            .ok_or_else(|| TrieError::KeyIsPrefix(entries[start].0.clone()))?;
        let mut end = start + 1;
        while end < entries.len() && nibble_at(&entries[end].0, depth) == Some(nibble) {
            end += 1;
        }
        let child = build_node(batch, &entries[start..end], depth + 1)?;
        children.push((nibble, child));
        start = end;
    }

    Ok(store_node(batch, &TrieNode::Branch { children }))
}

fn store_node(batch: &mut WriteBatch, node: &TrieNode) -> Hash256 {
    let bytes = encode(node);
    let hash = node.hash();
    batch.put(Column::State, hash, bytes);
    hash
}
