use pchaind_primitives::encoding::decode;
use pchaind_primitives::Hash256;
use pchaind_storage::{Column, KeyValueStore};

use crate::{empty_root_hash, TrieError, TrieNode};

/// One visited node. Internal nodes carry their raw stored bytes so the
/// caller can account for on-disk size without a second fetch.
#[derive(Clone, Debug)]
pub enum WalkedNode {
    Internal { hash: Hash256, raw: Vec<u8> },
    Leaf {
        hash: Hash256,
        key: Vec<u8>,
        value: Vec<u8>,
    },
}

/// Lazy pre-order walk of the trie rooted at `root`: a parent is yielded
/// before its children, children in ascending nibble order. The iterator
/// is finite and non-restartable; the first error ends it.
pub struct NodeIterator<'a, S> {
    store: &'a S,
    stack: Vec<Hash256>,
    failed: bool,
}

impl<'a, S: KeyValueStore> NodeIterator<'a, S> {
    pub fn new(store: &'a S, root: Hash256) -> Self {
        let stack = if root == empty_root_hash() {
            Vec::new()
        } else {
            vec![root]
        };
        Self {
            store,
            stack,
            failed: false,
        }
    }

    fn visit(&mut self, hash: Hash256) -> Result<WalkedNode, TrieError> {
        let raw = self
            .store
            .get(Column::State, &hash)?
            .ok_or(TrieError::NodeMissing(hash))?;
        match decode::<TrieNode>(&raw).map_err(|err| TrieError::Decode(hash, err))? {
            TrieNode::Branch { children } => {
                // Reverse push so the lowest nibble is popped first.
                for (_, child) in children.iter().rev() {
                    self.stack.push(*child);
                }
                Ok(WalkedNode::Internal { hash, raw })
            }
            TrieNode::Leaf { key, value } => Ok(WalkedNode::Leaf { hash, key, value }),
        }
    }
}

impl<S: KeyValueStore> Iterator for NodeIterator<'_, S> {
    type Item = Result<WalkedNode, TrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let hash = self.stack.pop()?;
        let item = self.visit(hash);
        if item.is_err() {
            self.failed = true;
            self.stack.clear();
        }
        Some(item)
    }
}
