use log::debug;
use parking_lot::MutexGuard;

use crate::common::types::{PageId, PageWriteGuard, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::index::base::{BPlusTree, WriteOp};
use crate::index::btree::key::IndexKey;
use crate::index::btree::page::{
    self, InternalNode, LeafNode, NodeType, NodeView, HEADER_PAGE_ID,
};

impl<K: IndexKey> BPlusTree<K> {
    /// Delete a key. A key that is not present is a no-op.
    pub fn remove(&self, key: &K) -> Result<(), BTreeError> {
        let mut root_guard = Some(self.root_latch());
        if **root_guard.as_ref().expect("just acquired") == INVALID_PAGE_ID {
            return Ok(());
        }

        let (mut stack, mut leaf_guard) =
            self.descend_write(key, WriteOp::Delete, &mut root_guard)?;
        let mut deleted_pages: Vec<PageId> = Vec::new();

        let removed = LeafNode::<_, K>::new(&mut leaf_guard.data[..]).remove(key);
        if !removed {
            self.release_write(leaf_guard);
            self.release_write_set(stack);
            return Ok(());
        }

        let (is_root, size) = {
            let view = LeafNode::<_, K>::new(&leaf_guard.data[..]);
            (view.is_root(), view.size())
        };

        if is_root {
            if size == 0 {
                // The last key is gone; the tree is empty again.
                let root_latch = root_guard
                    .as_mut()
                    .expect("an unsafe root delete keeps the root latch");
                **root_latch = INVALID_PAGE_ID;
                deleted_pages.push(leaf_guard.page_id);
                let recorded = self.update_root_record(INVALID_PAGE_ID);
                // Mark the retired root so racing readers see it is no
                // longer a root.
                page::set_parent_of(&mut leaf_guard.data, HEADER_PAGE_ID);
                self.release_write(leaf_guard);
                recorded?;
                debug!("b+tree '{}' emptied", self.index_name());
            } else {
                self.release_write(leaf_guard);
            }
        } else if size >= self.leaf_min_size() {
            self.release_write(leaf_guard);
        } else {
            self.resolve_underflow(leaf_guard, &mut stack, &mut root_guard, &mut deleted_pages)?;
        }

        self.release_write_set(stack);
        drop(root_guard);
        for page_id in deleted_pages {
            let _ = self.buffer_pool.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Walk underflow up the retained ancestors: redistribute from a
    /// sibling when the pair cannot merge, otherwise coalesce into the
    /// left node and repeat on the parent.
    fn resolve_underflow(
        &self,
        mut node_guard: PageWriteGuard,
        stack: &mut Vec<PageWriteGuard>,
        root_guard: &mut Option<MutexGuard<'_, PageId>>,
        deleted_pages: &mut Vec<PageId>,
    ) -> Result<(), BTreeError> {
        loop {
            let mut parent_guard = stack
                .pop()
                .expect("an underflowing node keeps its parent latched");
            let node_page_id = node_guard.page_id;

            let (node_index, sibling_page_id) = {
                let parent = InternalNode::<_, K>::new(&parent_guard.data[..]);
                let node_index = parent
                    .child_index(node_page_id)
                    .expect("node must be registered in its parent");
                let sibling_index = if node_index == 0 { 1 } else { node_index - 1 };
                (node_index, parent.child_at(sibling_index))
            };

            // Prefer the predecessor sibling; only the leftmost child
            // pairs with its successor. Both deletes racing over this
            // pair serialize on the shared parent latch held here.
            let sibling_page = match Self::fetch_or_oom(
                &self.buffer_pool,
                sibling_page_id,
                "latching a sibling",
            ) {
                Ok(page) => page,
                Err(e) => {
                    self.release_write(node_guard);
                    self.release_write(parent_guard);
                    return Err(e);
                }
            };
            let mut sibling_guard = sibling_page.write_arc();

            let node_type = page::node_type(&node_guard.data);
            let (node_size, sibling_size) = {
                let node = LeafNode::<_, K>::new(&node_guard.data[..]);
                let sibling = LeafNode::<_, K>::new(&sibling_guard.data[..]);
                (node.size(), sibling.size())
            };
            let merged_cap = match node_type {
                NodeType::Leaf => self.leaf_max_size - 1,
                NodeType::Internal => self.internal_max_size,
            };

            if node_size + sibling_size > merged_cap {
                self.redistribute(&mut node_guard, &mut sibling_guard, &mut parent_guard, node_index)?;
                self.release_write(node_guard);
                self.release_write(sibling_guard);
                self.release_write(parent_guard);
                return Ok(());
            }

            // Coalesce. The right node of the pair empties into the left
            // one and its page is reclaimed; the separator between them
            // leaves the parent.
            if node_index == 0 {
                let middle = InternalNode::<_, K>::new(&parent_guard.data[..]).key_at(1);
                match node_type {
                    NodeType::Leaf => {
                        let mut sibling = LeafNode::<_, K>::new(&mut sibling_guard.data[..]);
                        let mut node = LeafNode::<_, K>::new(&mut node_guard.data[..]);
                        sibling.move_all_to(&mut node);
                    }
                    NodeType::Internal => {
                        let mut sibling = InternalNode::<_, K>::new(&mut sibling_guard.data[..]);
                        let mut node = InternalNode::<_, K>::new(&mut node_guard.data[..]);
                        sibling.move_all_to(&mut node, &middle, &self.buffer_pool)?;
                    }
                }
                InternalNode::<_, K>::new(&mut parent_guard.data[..]).remove(1);
                deleted_pages.push(sibling_page_id);
            } else {
                let middle = InternalNode::<_, K>::new(&parent_guard.data[..]).key_at(node_index);
                match node_type {
                    NodeType::Leaf => {
                        let mut node = LeafNode::<_, K>::new(&mut node_guard.data[..]);
                        let mut sibling = LeafNode::<_, K>::new(&mut sibling_guard.data[..]);
                        node.move_all_to(&mut sibling);
                    }
                    NodeType::Internal => {
                        let mut node = InternalNode::<_, K>::new(&mut node_guard.data[..]);
                        let mut sibling = InternalNode::<_, K>::new(&mut sibling_guard.data[..]);
                        node.move_all_to(&mut sibling, &middle, &self.buffer_pool)?;
                    }
                }
                InternalNode::<_, K>::new(&mut parent_guard.data[..]).remove(node_index);
                deleted_pages.push(node_page_id);
            }
            self.release_write(node_guard);
            self.release_write(sibling_guard);

            let (parent_is_root, parent_size) = {
                let parent = InternalNode::<_, K>::new(&parent_guard.data[..]);
                (parent.is_root(), parent.size())
            };

            if parent_is_root {
                self.adjust_root(parent_guard, root_guard, deleted_pages)?;
                return Ok(());
            }
            if parent_size >= self.internal_min_size() {
                self.release_write(parent_guard);
                return Ok(());
            }
            node_guard = parent_guard;
        }
    }

    /// A merge reached the root. An internal root left with a single
    /// child hands the tree to that child.
    fn adjust_root(
        &self,
        mut root_page_guard: PageWriteGuard,
        root_guard: &mut Option<MutexGuard<'_, PageId>>,
        deleted_pages: &mut Vec<PageId>,
    ) -> Result<(), BTreeError> {
        let root_size = InternalNode::<_, K>::new(&root_page_guard.data[..]).size();
        if root_size > 1 {
            self.release_write(root_page_guard);
            return Ok(());
        }

        let promoted = InternalNode::<_, K>::new(&root_page_guard.data[..]).child_at(0);
        let root_latch = root_guard
            .as_mut()
            .expect("a root modification keeps the root latch");
        **root_latch = promoted;
        deleted_pages.push(root_page_guard.page_id);
        let recorded = self.update_root_record(promoted);
        // Mark the retired root so racing readers see it is no longer a
        // root.
        page::set_parent_of(&mut root_page_guard.data, promoted);
        self.release_write(root_page_guard);
        recorded?;

        // The promoted child becomes the root; drop its parent pointer.
        // Nothing else can be latching upward, so fetching it here is
        // deadlock-free.
        let child_page = Self::fetch_or_oom(&self.buffer_pool, promoted, "promoting the root")?;
        {
            let mut child = child_page.write();
            page::set_parent_of(&mut child.data, INVALID_PAGE_ID);
        }
        self.buffer_pool.unpin_page(promoted, true);

        debug!(
            "b+tree '{}' promoted page {} to root",
            self.index_name(),
            promoted
        );
        Ok(())
    }

    /// Move one boundary entry between the underflowing node and its
    /// sibling, refreshing the separator in the parent.
    fn redistribute(
        &self,
        node_guard: &mut PageWriteGuard,
        sibling_guard: &mut PageWriteGuard,
        parent_guard: &mut PageWriteGuard,
        node_index: usize,
    ) -> Result<(), BTreeError> {
        let node_type = page::node_type(&node_guard.data);

        if node_index == 0 {
            // Sibling is the successor: its first entry crosses left.
            match node_type {
                NodeType::Leaf => {
                    let mut sibling = LeafNode::<_, K>::new(&mut sibling_guard.data[..]);
                    let mut node = LeafNode::<_, K>::new(&mut node_guard.data[..]);
                    sibling.move_first_to_end_of(&mut node);
                    let new_separator = sibling.key_at(0);
                    InternalNode::<_, K>::new(&mut parent_guard.data[..])
                        .set_key_at(1, &new_separator);
                }
                NodeType::Internal => {
                    let middle = InternalNode::<_, K>::new(&parent_guard.data[..]).key_at(1);
                    let mut sibling = InternalNode::<_, K>::new(&mut sibling_guard.data[..]);
                    let mut node = InternalNode::<_, K>::new(&mut node_guard.data[..]);
                    sibling.move_first_to_end_of(&mut node, &middle, &self.buffer_pool)?;
                    let new_separator = sibling.key_at(0);
                    InternalNode::<_, K>::new(&mut parent_guard.data[..])
                        .set_key_at(1, &new_separator);
                }
            }
        } else {
            // Sibling is the predecessor: its last entry crosses right.
            match node_type {
                NodeType::Leaf => {
                    let mut sibling = LeafNode::<_, K>::new(&mut sibling_guard.data[..]);
                    let mut node = LeafNode::<_, K>::new(&mut node_guard.data[..]);
                    sibling.move_last_to_front_of(&mut node);
                    let new_separator = node.key_at(0);
                    InternalNode::<_, K>::new(&mut parent_guard.data[..])
                        .set_key_at(node_index, &new_separator);
                }
                NodeType::Internal => {
                    let middle =
                        InternalNode::<_, K>::new(&parent_guard.data[..]).key_at(node_index);
                    let mut sibling = InternalNode::<_, K>::new(&mut sibling_guard.data[..]);
                    let mut node = InternalNode::<_, K>::new(&mut node_guard.data[..]);
                    sibling.move_last_to_front_of(&mut node, &middle, &self.buffer_pool)?;
                    let new_separator = node.key_at(0);
                    InternalNode::<_, K>::new(&mut parent_guard.data[..])
                        .set_key_at(node_index, &new_separator);
                }
            }
        }
        Ok(())
    }
}
