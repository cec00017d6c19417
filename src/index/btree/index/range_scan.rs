use crate::common::types::{PageReadGuard, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::index::base::BPlusTree;
use crate::index::btree::key::IndexKey;
use crate::index::btree::page::{LeafNode, NodeView};

impl<K: IndexKey> BPlusTree<K> {
    /// Ascending scan over the whole tree.
    pub fn iter(&self) -> Result<BTreeIterator<'_, K>, BTreeError> {
        let leaf = self.find_leaf_read(None)?;
        Ok(BTreeIterator {
            tree: self,
            leaf,
            index: 0,
        })
    }

    /// Ascending scan starting at the first key >= `key`.
    pub fn iter_from(&self, key: &K) -> Result<BTreeIterator<'_, K>, BTreeError> {
        let leaf = self.find_leaf_read(Some(key))?;
        let index = leaf
            .as_ref()
            .map(|guard| LeafNode::<_, K>::new(&guard.data[..]).key_index(key))
            .unwrap_or(0);
        Ok(BTreeIterator {
            tree: self,
            leaf,
            index,
        })
    }
}

/// Leaf-resident cursor: holds the current leaf read-latched and pinned,
/// and walks the next-leaf chain. Stepping off a leaf releases it before
/// the next one is latched, so a scan never holds two latches at once.
pub struct BTreeIterator<'a, K: IndexKey> {
    tree: &'a BPlusTree<K>,
    leaf: Option<PageReadGuard>,
    index: usize,
}

impl<K: IndexKey> BTreeIterator<'_, K> {
    fn release_current(&mut self) {
        if let Some(guard) = self.leaf.take() {
            self.tree.release_read(guard);
        }
    }
}

impl<K: IndexKey> Iterator for BTreeIterator<'_, K> {
    type Item = Result<(K, Rid), BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let guard = self.leaf.as_ref()?;
            let view = LeafNode::<_, K>::new(&guard.data[..]);

            if self.index < view.size() {
                let item = (view.key_at(self.index), view.rid_at(self.index));
                self.index += 1;
                return Some(Ok(item));
            }

            let next_page_id = view.next_page_id();
            self.release_current();
            if next_page_id == INVALID_PAGE_ID {
                return None;
            }

            let next_page = match BPlusTree::<K>::fetch_or_oom(
                &self.tree.buffer_pool,
                next_page_id,
                "advancing a range scan",
            ) {
                Ok(page) => page,
                Err(e) => return Some(Err(e)),
            };
            self.leaf = Some(next_page.read_arc());
            self.index = 0;
        }
    }
}

impl<K: IndexKey> Drop for BTreeIterator<'_, K> {
    fn drop(&mut self) {
        self.release_current();
    }
}
