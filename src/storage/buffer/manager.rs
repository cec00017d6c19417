use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{Frame, FrameId, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::{Replacer, ReplacerPolicy};
use crate::storage::disk::DiskManager;

/// Everything the pool mutex guards: the frame metadata, the page table,
/// the free list, the replacer and the page-id counter. Page contents are
/// reached through each frame's `PagePtr` under its own latch.
struct PoolState {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: Box<dyn Replacer>,
    next_page_id: PageId,
}

/// BufferPoolManager mediates all access between disk pages and in-memory
/// frames: pinning, dirty tracking, victim selection and on-demand flush.
///
/// Several cooperating instances may share one disk manager; instance `i`
/// of `n` allocates page ids congruent to `i` mod `n`, which is the only
/// coordination between them.
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    state: Mutex<PoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Create a single-instance pool over the given database file, with
    /// the LRU policy.
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        Self::with_policy(pool_size, db_path, ReplacerPolicy::Lru)
    }

    /// Create a single-instance pool with an explicit replacement policy.
    pub fn with_policy(
        pool_size: usize,
        db_path: impl AsRef<Path>,
        policy: ReplacerPolicy,
    ) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::new_instance(pool_size, 1, 0, disk_manager, policy))
    }

    /// Create one instance of a parallel pool. All instances share the
    /// disk manager; `instance_index` must be below `num_instances`.
    pub fn new_instance(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
        policy: ReplacerPolicy,
    ) -> Self {
        assert!(num_instances > 0);
        assert!(instance_index < num_instances);

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            frames.push(Frame::new(Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::new(),
                free_list,
                replacer: policy.build(pool_size),
                next_page_id: instance_index,
            }),
            disk_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Allocate a fresh page backed by an available frame, pinned once.
    ///
    /// Fails with `BufferPoolFull` iff every frame is pinned.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = self.find_available_frame(&mut state)?;

        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances;

        {
            let frame = &state.frames[frame_id];
            let mut page = frame.page.write();
            page.reset();
            page.page_id = page_id;
        }
        let frame = &mut state.frames[frame_id];
        frame.pin_count = 1;
        frame.is_dirty = false;
        let page_ptr = frame.page.clone();

        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);

        Ok((page_ptr, page_id))
    }

    /// Fetch a page, reading it from disk if it is not resident. The page
    /// comes back pinned; every fetch must be paired with an unpin.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        if let Some(frame_id) = state.page_table.get(&page_id).copied() {
            let frame = &mut state.frames[frame_id];
            frame.pin_count += 1;
            let page_ptr = frame.page.clone();
            state.replacer.pin(frame_id);
            return Ok(page_ptr);
        }

        let frame_id = self.find_available_frame(&mut state)?;

        {
            let frame = &state.frames[frame_id];
            let mut page = frame.page.write();
            self.disk_manager.read_page(page_id, &mut page)?;
        }
        let frame = &mut state.frames[frame_id];
        frame.pin_count = 1;
        frame.is_dirty = false;
        let page_ptr = frame.page.clone();

        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);

        Ok(page_ptr)
    }

    /// Drop one pin on a page, ORing `is_dirty` into the frame's dirty
    /// bit. Returns false when the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id).copied() {
            Some(id) => id,
            None => return false,
        };

        let frame = &mut state.frames[frame_id];
        if frame.pin_count == 0 {
            return false;
        }

        frame.is_dirty |= is_dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }

        true
    }

    /// Write a resident page to disk if dirty, clearing the dirty bit.
    /// Pin counts observable by callers are untouched. Returns false when
    /// the page is not resident.
    ///
    /// The page may be latched by its user, so its latch must not be
    /// taken under the pool mutex: crabbing descents hold a page latch
    /// while they fetch the next page, the opposite order. The frame is
    /// pinned instead, the mutex dropped, and the bytes written under a
    /// plain read latch.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let page_ptr = {
            let mut state = self.state.lock();

            let frame_id = match state.page_table.get(&page_id).copied() {
                Some(id) => id,
                None => return Ok(false),
            };

            let frame = &mut state.frames[frame_id];
            if !frame.is_dirty {
                return Ok(true);
            }
            // Clearing the bit up front keeps a concurrent re-dirty
            // visible: a writer that modifies the page after this point
            // sets it again, and the next flush picks the change up.
            frame.is_dirty = false;
            frame.pin_count += 1;
            let page_ptr = frame.page.clone();
            state.replacer.pin(frame_id);
            page_ptr
        };

        let written = {
            let page = page_ptr.read();
            self.disk_manager.write_page(&page)
        };

        // A failed write leaves the page dirty again.
        self.unpin_page(page_id, written.is_err());
        written?;
        Ok(true)
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let page_ids: Vec<PageId> = self.state.lock().page_table.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Remove a page from the pool and hand its id back to the disk
    /// manager. Vacuously true when the page is not resident; false while
    /// the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id).copied() {
            Some(id) => id,
            None => {
                self.disk_manager.deallocate_page(page_id);
                return Ok(true);
            }
        };

        if state.frames[frame_id].pin_count > 0 {
            return Ok(false);
        }

        state.page_table.remove(&page_id);
        let frame = &mut state.frames[frame_id];
        frame.is_dirty = false;
        frame.page.write().reset();

        state.replacer.pin(frame_id);
        state.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);

        Ok(true)
    }

    /// Find a frame to hold a new page image: free list first, then a
    /// replacer victim. A dirty victim is flushed before reuse and its
    /// page-table entry erased.
    fn find_available_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = match state.replacer.victim() {
            Some(id) => id,
            None => return Err(BufferPoolError::BufferPoolFull),
        };

        let frame = &mut state.frames[frame_id];
        debug_assert_eq!(frame.pin_count, 0, "replacer returned a pinned frame");

        Self::flush_frame(&self.disk_manager, frame)?;
        let old_page_id = frame.page.read().page_id;
        if old_page_id != INVALID_PAGE_ID {
            debug!("evicting page {} from frame {}", old_page_id, frame_id);
            state.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }

    /// Eviction-path flush, called with the pool mutex held. Only victim
    /// frames come through here: their pin count is 0, the latch protocol
    /// guarantees they are unlatched, so taking the page latch under the
    /// mutex cannot block.
    fn flush_frame(disk_manager: &DiskManager, frame: &mut Frame) -> Result<(), BufferPoolError> {
        if !frame.is_dirty {
            return Ok(());
        }
        let page = frame.page.read();
        disk_manager.write_page(&page)?;
        drop(page);
        frame.is_dirty = false;
        Ok(())
    }
}
