use std::sync::Arc;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = u32;

/// Sentinel for an uninitialized or absent page.
///
/// Page 0 is a valid page (it holds the index header records), so the
/// sentinel is the all-ones value rather than zero.
pub const INVALID_PAGE_ID: PageId = u32::MAX;

/// Transaction ID type
pub type TxnId = u32;

pub const INVALID_TXN_ID: TxnId = u32::MAX;

/// Buffer pool frame ID type
pub type FrameId = usize;

/// LSN (Log Sequence Number) type
pub type Lsn = u32;

/// Record identifier: a (page, slot) pair naming a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

/// Page structure
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
    pub lsn: Lsn,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
            lsn: 0,
        }
    }

    /// Reset to the uninitialized state, zeroing the contents.
    pub fn reset(&mut self) {
        self.data = [0; PAGE_SIZE];
        self.page_id = INVALID_PAGE_ID;
        self.lsn = 0;
    }
}

/// Smart pointer to a page. The RwLock is the page's reader/writer latch.
pub type PagePtr = Arc<RwLock<Page>>;

/// Owned read guard on a page latch, detachable from the stack frame that
/// acquired it. Crabbing descents and iterators hold these.
pub type PageReadGuard = ArcRwLockReadGuard<RawRwLock, Page>;

/// Owned write guard on a page latch.
pub type PageWriteGuard = ArcRwLockWriteGuard<RawRwLock, Page>;

/// Buffer pool frame metadata. The page contents are reached through
/// `page` under its own latch; `pin_count` and `is_dirty` belong to the
/// pool's mutex.
#[derive(Debug)]
pub struct Frame {
    pub page: PagePtr,
    pub pin_count: u32,
    pub is_dirty: bool,
}

impl Frame {
    pub fn new(page: PagePtr) -> Self {
        Self {
            page,
            pin_count: 0,
            is_dirty: false,
        }
    }
}
