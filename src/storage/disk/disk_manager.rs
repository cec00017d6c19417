use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager is responsible for the actual disk I/O: page images at
/// page-id-addressed offsets in the database file, and an append-only log
/// file next to it.
pub struct DiskManager {
    db_file: Mutex<File>,
    log_file: Mutex<File>,
    /// Next page id handed out by `allocate_page`. Only the header-page
    /// bootstrap uses this path; the buffer pool runs its own striding
    /// allocator.
    next_page_id: AtomicU32,
}

impl DiskManager {
    /// Create a new DiskManager over the given database file. The log file
    /// lives alongside it with a `.log` extension.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let db_path = db_path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        let mut log_path = PathBuf::from(db_path);
        let ext = match log_path.extension() {
            Some(e) => format!("{}.log", e.to_string_lossy()),
            None => "log".to_string(),
        };
        log_path.set_extension(ext);
        let log_file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&log_path)?;

        let page_count = (file.metadata()?.len() / PAGE_SIZE as u64) as PageId;

        Ok(Self {
            db_file: Mutex::new(file),
            log_file: Mutex::new(log_file),
            next_page_id: AtomicU32::new(page_count),
        })
    }

    /// Read a page from disk. A page beyond the end of the file has never
    /// been written; it reads as a zeroed image.
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut buffer = [0u8; PAGE_SIZE];

        {
            let mut file = self.db_file.lock();
            let file_size = file.metadata()?.len();

            if offset as u64 >= file_size {
                page.reset();
                page.page_id = page_id;
                return Ok(());
            }

            file.seek(SeekFrom::Start(offset as u64))?;
            file.read_exact(&mut buffer)?;
        }

        page.data.copy_from_slice(&buffer);
        page.page_id = page_id;

        Ok(())
    }

    /// Write a page to disk.
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = Self::page_offset(page.page_id);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(&page.data)?;
        file.flush()?;

        Ok(())
    }

    /// Hand out a fresh page id. Page-id lifecycle outside the buffer
    /// pool's own striding allocator.
    pub fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Release a page id. The file is not shrunk; the slot becomes garbage
    /// until a vacuum collaborator reclaims it.
    pub fn deallocate_page(&self, page_id: PageId) {
        debug!("deallocated page {}", page_id);
    }

    /// Append raw bytes to the write-ahead log.
    pub fn append_log(&self, bytes: &[u8]) -> Result<(), DiskManagerError> {
        let mut file = self.log_file.lock();
        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    fn page_offset(page_id: PageId) -> usize {
        page_id as usize * PAGE_SIZE
    }
}
