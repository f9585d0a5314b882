use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Page, PageId, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager is responsible for the actual disk I/O. Page `id` lives at
/// byte offset `id * PAGE_SIZE` in the database file.
pub struct DiskManager {
    db_file: Mutex<File>,
}

impl DiskManager {
    /// Open (or create) the database file at the given path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)
            .map_err(DiskManagerError::IoError)?;

        Ok(Self {
            db_file: Mutex::new(file),
        })
    }

    /// Read a page from disk. A page past the end of the file has never been
    /// written; it reads back as zeroes.
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();

        let file_size = file.metadata().map_err(DiskManagerError::IoError)?.len();
        if offset >= file_size {
            page.data = [0; PAGE_SIZE];
            page.page_id = page_id;
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(DiskManagerError::IoError)?;
        file.read_exact(&mut page.data)
            .map_err(DiskManagerError::IoError)?;
        page.page_id = page_id;

        Ok(())
    }

    /// Write a page to disk.
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = page.page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();

        file.seek(SeekFrom::Start(offset))
            .map_err(DiskManagerError::IoError)?;
        file.write_all(&page.data)
            .map_err(DiskManagerError::IoError)?;
        file.flush().map_err(DiskManagerError::IoError)?;

        Ok(())
    }

    /// Release a page id back to the allocator. The file keeps its extent;
    /// reclaiming disk space would need a free-space map, which belongs to
    /// recovery-aware storage and is out of scope here.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Flush the file to stable storage before shutdown.
    pub fn shut_down(&self) -> Result<(), DiskManagerError> {
        let file = self.db_file.lock();
        file.sync_all().map_err(DiskManagerError::IoError)?;
        Ok(())
    }
}
