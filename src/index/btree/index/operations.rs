use log::debug;
use parking_lot::MutexGuard;

use crate::common::types::{PageId, PageWriteGuard, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::index::base::{BPlusTree, WriteOp};
use crate::index::btree::key::IndexKey;
use crate::index::btree::page::{self, InternalNode, LeafNode, NodeView};

impl<K: IndexKey> BPlusTree<K> {
    /// Insert a unique key. Returns false when the key already exists.
    pub fn insert(&self, key: &K, rid: Rid) -> Result<bool, BTreeError> {
        let mut root_guard = Some(self.root_latch());

        if **root_guard.as_ref().expect("just acquired") == INVALID_PAGE_ID {
            self.start_new_tree(root_guard.as_mut().expect("just acquired"), key, rid)?;
            return Ok(true);
        }

        let (stack, mut leaf_guard) = self.descend_write(key, WriteOp::Insert, &mut root_guard)?;

        let (is_root, size, duplicate) = {
            let view = LeafNode::<_, K>::new(&leaf_guard.data[..]);
            (view.is_root(), view.size(), view.lookup(key).is_some())
        };
        if duplicate {
            self.release_write(leaf_guard);
            self.release_write_set(stack);
            return Ok(false);
        }

        if size < self.leaf_split_threshold(is_root) {
            LeafNode::<_, K>::new(&mut leaf_guard.data[..]).insert(key, rid);
            self.release_write(leaf_guard);
            self.release_write_set(stack);
            return Ok(true);
        }

        let (separator, new_leaf_guard) = match self.split_leaf(&mut leaf_guard, key, rid) {
            Ok(split) => split,
            Err(e) => {
                self.release_write(leaf_guard);
                self.release_write_set(stack);
                return Err(e);
            }
        };
        self.insert_into_parent(stack, root_guard, leaf_guard, separator, new_leaf_guard)?;
        Ok(true)
    }

    /// First insert into an empty tree: allocate the root leaf and record
    /// it in the header page. The root latch is held throughout.
    fn start_new_tree(
        &self,
        root_guard: &mut MutexGuard<'_, PageId>,
        key: &K,
        rid: Rid,
    ) -> Result<(), BTreeError> {
        let (page, page_id) = self.new_page_or_oom("starting a new tree")?;
        let mut guard = page.write_arc();

        let mut leaf = LeafNode::<_, K>::new(&mut guard.data[..]);
        leaf.init(page_id, INVALID_PAGE_ID, self.leaf_max_size);
        leaf.insert(key, rid);

        **root_guard = page_id;
        let recorded = self.update_root_record(page_id);
        self.release_write(guard);
        debug!("b+tree '{}' started at root page {}", self.index_name(), page_id);
        recorded
    }

    /// Split a full leaf, choosing the pivot by where the new key falls
    /// so the inserted entry lands in the less-full half. Returns the
    /// separator for the parent and the write-latched new sibling.
    fn split_leaf(
        &self,
        old_guard: &mut PageWriteGuard,
        key: &K,
        rid: Rid,
    ) -> Result<(K, PageWriteGuard), BTreeError> {
        let (new_page, new_page_id) = self.new_page_or_oom("splitting a leaf")?;
        let mut new_guard = new_page.write_arc();

        let mut old = LeafNode::<_, K>::new(&mut old_guard.data[..]);
        let mut new = LeafNode::<_, K>::new(&mut new_guard.data[..]);
        new.init(new_page_id, old.parent_page_id(), self.leaf_max_size);

        let size = old.size();
        let goes_right = *key > old.key_at(size / 2);
        let half = if goes_right { size / 2 } else { (size + 1) / 2 };
        old.move_tail_to(&mut new, half);
        if goes_right {
            new.insert(key, rid);
        } else {
            old.insert(key, rid);
        }

        new.set_next_page_id(old.next_page_id());
        old.set_next_page_id(new_page_id);

        let separator = new.key_at(0);
        Ok((separator, new_guard))
    }

    /// Split a full internal node around the incoming separator. The
    /// moved children are re-adopted through the pool except
    /// `held_child`, whose latch the caller owns.
    fn split_internal(
        &self,
        old_guard: &mut PageWriteGuard,
        separator: &K,
        new_child: PageId,
        held_child: PageId,
    ) -> Result<(K, PageWriteGuard), BTreeError> {
        let (new_page, new_page_id) = self.new_page_or_oom("splitting an internal node")?;
        let mut new_guard = new_page.write_arc();

        let mut old = InternalNode::<_, K>::new(&mut old_guard.data[..]);
        let mut new = InternalNode::<_, K>::new(&mut new_guard.data[..]);
        new.init(new_page_id, old.parent_page_id(), self.internal_max_size);

        let size = old.size();
        let goes_right = *separator > old.key_at(size / 2);
        let half = if goes_right { size / 2 } else { (size + 1) / 2 };
        old.move_tail_to(&mut new, half, &self.buffer_pool, held_child)?;
        if goes_right {
            new.insert(separator, new_child);
        } else {
            old.insert(separator, new_child);
        }

        let middle = new.key_at(0);
        Ok((middle, new_guard))
    }

    /// Thread a freshly split pair into the ancestors, splitting parents
    /// as needed and growing a new root when the split reaches the top.
    /// Consumes (and releases) the retained ancestor stack.
    fn insert_into_parent(
        &self,
        mut stack: Vec<PageWriteGuard>,
        mut root_guard: Option<MutexGuard<'_, PageId>>,
        mut old_guard: PageWriteGuard,
        mut separator: K,
        mut new_guard: PageWriteGuard,
    ) -> Result<(), BTreeError> {
        loop {
            let old_page_id = old_guard.page_id;
            let new_page_id = new_guard.page_id;

            if page::parent_of(&old_guard.data) == INVALID_PAGE_ID {
                // The root split: grow a new root above the pair.
                let (root_page, root_page_id) = match self.new_page_or_oom("growing a new root") {
                    Ok(pair) => pair,
                    Err(e) => {
                        self.release_write(old_guard);
                        self.release_write(new_guard);
                        return Err(e);
                    }
                };
                let mut root_w = root_page.write_arc();
                let mut root = InternalNode::<_, K>::new(&mut root_w.data[..]);
                root.init(root_page_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(old_page_id, &separator, new_page_id);

                page::set_parent_of(&mut old_guard.data, root_page_id);
                page::set_parent_of(&mut new_guard.data, root_page_id);

                let root_latch = root_guard
                    .as_mut()
                    .expect("a root split keeps the root latch");
                **root_latch = root_page_id;
                let recorded = self.update_root_record(root_page_id);

                debug!(
                    "b+tree '{}' grew new root page {}",
                    self.index_name(),
                    root_page_id
                );
                self.release_write(old_guard);
                self.release_write(new_guard);
                self.release_write(root_w);
                return recorded;
            }

            let mut parent_guard = stack.pop().expect("an unsafe child keeps its parent latched");
            let parent_page_id = parent_guard.page_id;
            let parent_size = InternalNode::<_, K>::new(&parent_guard.data[..]).size();

            if parent_size < self.internal_max_size {
                InternalNode::<_, K>::new(&mut parent_guard.data[..]).insert_child_after(
                    old_page_id,
                    &separator,
                    new_page_id,
                );
                page::set_parent_of(&mut new_guard.data, parent_page_id);

                self.release_write(old_guard);
                self.release_write(new_guard);
                self.release_write(parent_guard);
                self.release_write_set(stack);
                return Ok(());
            }

            // The parent is full too: split it and carry the middle key
            // one level up.
            let (middle, new_parent_guard) =
                match self.split_internal(&mut parent_guard, &separator, new_page_id, old_page_id)
                {
                    Ok(split) => split,
                    Err(e) => {
                        self.release_write(old_guard);
                        self.release_write(new_guard);
                        self.release_write(parent_guard);
                        self.release_write_set(stack);
                        return Err(e);
                    }
                };

            // The split scattered the parent's entries over two nodes;
            // point the pair we still latch at whichever side holds them.
            let new_parent_page_id = new_parent_guard.page_id;
            let left = InternalNode::<_, K>::new(&parent_guard.data[..]);
            let old_home = if left.child_index(old_page_id).is_some() {
                parent_page_id
            } else {
                new_parent_page_id
            };
            let new_home = if left.child_index(new_page_id).is_some() {
                parent_page_id
            } else {
                new_parent_page_id
            };
            page::set_parent_of(&mut old_guard.data, old_home);
            page::set_parent_of(&mut new_guard.data, new_home);

            self.release_write(old_guard);
            self.release_write(new_guard);

            old_guard = parent_guard;
            new_guard = new_parent_guard;
            separator = middle;
        }
    }
}
