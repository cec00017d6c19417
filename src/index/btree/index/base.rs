use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::common::types::{
    PageId, PagePtr, PageReadGuard, PageWriteGuard, Rid, INVALID_PAGE_ID,
};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::page::{
    self, HeaderPage, InternalNode, LeafNode, NodeType, NodeView, HEADER_PAGE_ID,
};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};

/// Which structural modification a write descent is preparing for. The
/// crabbing release rule differs between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOp {
    Insert,
    Delete,
}

/// Concurrent B+Tree index over the buffer pool.
///
/// Latch protocol: operations crab from the root toward the leaves,
/// holding a page's latch until the child is latched. Readers release the
/// parent immediately; writers release every retained ancestor the moment
/// the current child is safe, i.e. the pending modification cannot
/// propagate above it. The root page id itself is covered by a dedicated
/// mutex which writers hold until their descent proves safe.
pub struct BPlusTree<K: IndexKey> {
    index_name: String,
    root_page_id: Mutex<PageId>,
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Open (or lazily create) the named index with node sizes derived
    /// from the page capacity.
    pub fn new(
        index_name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
    ) -> Result<Self, BTreeError> {
        let leaf_max = LeafNode::<Vec<u8>, K>::capacity();
        let internal_max = InternalNode::<Vec<u8>, K>::capacity();
        Self::with_max_sizes(index_name, buffer_pool, leaf_max, internal_max)
    }

    /// Open (or lazily create) the named index with explicit node sizes.
    /// The root page id is recovered from the header page; a name never
    /// seen before starts as an empty tree.
    ///
    /// Page 0 belongs to the header records. A fresh database must
    /// reserve it (one `new_page` call on the pool) before any index
    /// allocates pages, or the first index page would land on it.
    pub fn with_max_sizes(
        index_name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        assert!(leaf_max_size >= 3 && leaf_max_size <= LeafNode::<Vec<u8>, K>::capacity());
        assert!(
            internal_max_size >= 3 && internal_max_size <= InternalNode::<Vec<u8>, K>::capacity()
        );

        let index_name = index_name.into();
        let header = Self::fetch_or_oom(&buffer_pool, HEADER_PAGE_ID, "opening the index header")?;
        let root_page_id = {
            let guard = header.read();
            HeaderPage::new(&guard.data[..])
                .get_root(&index_name)
                .unwrap_or(INVALID_PAGE_ID)
        };
        buffer_pool.unpin_page(HEADER_PAGE_ID, false);

        Ok(Self {
            index_name,
            root_page_id: Mutex::new(root_page_id),
            buffer_pool,
            leaf_max_size,
            internal_max_size,
            _key: PhantomData,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.lock() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Point lookup.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>, BTreeError> {
        let leaf = match self.find_leaf_read(Some(key))? {
            Some(guard) => guard,
            None => return Ok(None),
        };
        let result = LeafNode::<_, K>::new(&leaf.data[..]).lookup(key);
        self.release_read(leaf);
        Ok(result)
    }

    // ---- shared plumbing for the operation modules ----

    pub(crate) fn leaf_min_size(&self) -> usize {
        (self.leaf_max_size + 1) / 2
    }

    pub(crate) fn internal_min_size(&self) -> usize {
        (self.internal_max_size + 1) / 2
    }

    /// Entry count at which a leaf must split before taking another
    /// insert. The root leaf has no upper-bound invariant and may run one
    /// entry longer.
    pub(crate) fn leaf_split_threshold(&self, is_root: bool) -> usize {
        if is_root {
            self.leaf_max_size
        } else {
            self.leaf_max_size - 1
        }
    }

    pub(crate) fn root_latch(&self) -> MutexGuard<'_, PageId> {
        self.root_page_id.lock()
    }

    pub(crate) fn fetch_or_oom(
        pool: &BufferPoolManager,
        page_id: PageId,
        ctx: &'static str,
    ) -> Result<PagePtr, BTreeError> {
        match pool.fetch_page(page_id) {
            Ok(page) => Ok(page),
            Err(BufferPoolError::BufferPoolFull) => Err(BTreeError::OutOfMemory(ctx)),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn new_page_or_oom(
        &self,
        ctx: &'static str,
    ) -> Result<(PagePtr, PageId), BTreeError> {
        match self.buffer_pool.new_page() {
            Ok(pair) => Ok(pair),
            Err(BufferPoolError::BufferPoolFull) => Err(BTreeError::OutOfMemory(ctx)),
            Err(e) => Err(e.into()),
        }
    }

    /// Unlatch and unpin a read-latched page.
    pub(crate) fn release_read(&self, guard: PageReadGuard) {
        let page_id = guard.page_id;
        drop(guard);
        self.buffer_pool.unpin_page(page_id, false);
    }

    /// Unlatch and unpin a write-latched page, marking it dirty.
    pub(crate) fn release_write(&self, guard: PageWriteGuard) {
        let page_id = guard.page_id;
        drop(guard);
        self.buffer_pool.unpin_page(page_id, true);
    }

    pub(crate) fn release_write_set(&self, guards: Vec<PageWriteGuard>) {
        for guard in guards {
            self.release_write(guard);
        }
    }

    /// Update the persisted root record. Callers hold the root latch.
    pub(crate) fn update_root_record(&self, root_page_id: PageId) -> Result<(), BTreeError> {
        let header =
            Self::fetch_or_oom(&self.buffer_pool, HEADER_PAGE_ID, "updating the index header")?;
        let recorded = {
            let mut guard = header.write();
            HeaderPage::new(&mut guard.data[..]).set_root(&self.index_name, root_page_id)
        };
        self.buffer_pool.unpin_page(HEADER_PAGE_ID, true);
        if !recorded {
            return Err(BTreeError::HeaderFull);
        }
        Ok(())
    }

    /// A node is safe for `op` when the modification cannot propagate to
    /// its parent: an insert still fits without splitting, a delete
    /// cannot underflow.
    pub(crate) fn is_safe(&self, data: &[u8], op: WriteOp) -> bool {
        let is_root = page::parent_of(data) == INVALID_PAGE_ID;
        let size = {
            // Either view reads the shared header.
            LeafNode::<_, K>::new(data).size()
        };
        match (page::node_type(data), op) {
            (NodeType::Leaf, WriteOp::Insert) => size < self.leaf_split_threshold(is_root),
            // A root leaf is safe unless the delete could empty the tree,
            // which moves the root id.
            (NodeType::Leaf, WriteOp::Delete) => {
                if is_root {
                    size > 1
                } else {
                    size > self.leaf_min_size()
                }
            }
            (NodeType::Internal, WriteOp::Insert) => size < self.internal_max_size,
            (NodeType::Internal, WriteOp::Delete) => {
                if is_root {
                    size > 2
                } else {
                    size > self.internal_min_size()
                }
            }
        }
    }

    /// Write-crabbing descent to the leaf covering `key`.
    ///
    /// Returns the still-latched unsafe ancestors (root-most first) and
    /// the write-latched leaf. Whenever the newly latched node is safe,
    /// all retained ancestors and the root latch are released on the
    /// spot.
    pub(crate) fn descend_write<'a>(
        &'a self,
        key: &K,
        op: WriteOp,
        root_guard: &mut Option<MutexGuard<'a, PageId>>,
    ) -> Result<(Vec<PageWriteGuard>, PageWriteGuard), BTreeError> {
        let root_id = **root_guard.as_ref().expect("root latch must be held");
        let mut stack: Vec<PageWriteGuard> = Vec::new();

        let root_ptr = match Self::fetch_or_oom(&self.buffer_pool, root_id, "latching the root") {
            Ok(ptr) => ptr,
            Err(e) => return Err(e),
        };
        let mut current = root_ptr.write_arc();
        if self.is_safe(&current.data, op) {
            root_guard.take();
        }

        loop {
            if page::node_type(&current.data) == NodeType::Leaf {
                return Ok((stack, current));
            }

            let child_id = InternalNode::<_, K>::new(&current.data[..]).lookup(key);
            let child_ptr =
                match Self::fetch_or_oom(&self.buffer_pool, child_id, "latching a child") {
                    Ok(ptr) => ptr,
                    Err(e) => {
                        self.release_write(current);
                        self.release_write_set(stack);
                        return Err(e);
                    }
                };
            let child = child_ptr.write_arc();
            stack.push(current);
            current = child;

            if self.is_safe(&current.data, op) {
                self.release_write_set(std::mem::take(&mut stack));
                root_guard.take();
            }
        }
    }

    /// Read-crabbing descent to the leaf covering `key`, or the leftmost
    /// leaf when `key` is `None`. Returns `None` for an empty tree.
    pub(crate) fn find_leaf_read(
        &self,
        key: Option<&K>,
    ) -> Result<Option<PageReadGuard>, BTreeError> {
        loop {
            let root_id = *self.root_page_id.lock();
            if root_id == INVALID_PAGE_ID {
                return Ok(None);
            }

            let root_ptr = Self::fetch_or_oom(&self.buffer_pool, root_id, "latching the root")?;
            let root = root_ptr.read_arc();
            // The root may move between reading its id and latching the
            // page. Every path that retires a root stamps a parent into
            // the old page before unlatching it (page ids are never
            // reused), so a true root still shows the invalid parent.
            if page::parent_of(&root.data) != INVALID_PAGE_ID {
                self.release_read(root);
                continue;
            }

            let mut current = root;
            loop {
                if page::node_type(&current.data) == NodeType::Leaf {
                    return Ok(Some(current));
                }

                let view = InternalNode::<_, K>::new(&current.data[..]);
                let child_id = match key {
                    Some(key) => view.lookup(key),
                    None => view.child_at(0),
                };
                let child_ptr =
                    match Self::fetch_or_oom(&self.buffer_pool, child_id, "latching a child") {
                        Ok(ptr) => ptr,
                        Err(e) => {
                            self.release_read(current);
                            return Err(e);
                        }
                    };
                let child = child_ptr.read_arc();
                let parent = std::mem::replace(&mut current, child);
                self.release_read(parent);
            }
        }
    }
}
