//! Maps `PageId`s onto bytes on disk: one file per table, pages laid out
//! back to back at `page_index * PAGE_SIZE`. Grounded on the teacher's
//! `SmallFile` (`src/io.rs`), generalized from a single hardcoded path to
//! one file per table and from sync `std::fs` to the async [`FileSystem`]
//! trait so page I/O is a suspension point the buffer pool can await
//! without blocking the runtime.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use tokio::sync::Mutex;

use crate::config::DiskManagerConfig;
use crate::error::{StorageError, StorageResult};
use crate::fs::{FileSystem, RandomAccessFile};
use crate::page::{Page, PageId, PAGE_SIZE};

pub struct DiskManager {
    config: DiskManagerConfig,
    fs: Arc<dyn FileSystem>,
    files: Mutex<HashMap<i32, Arc<dyn RandomAccessFile>>>,
}

impl DiskManager {
    pub fn new(config: DiskManagerConfig, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            config,
            fs,
            files: Mutex::new(HashMap::new()),
        }
    }

    fn table_path(&self, table_id: i32) -> PathBuf {
        self.config.base_dir.join(format!("{table_id}.tbl"))
    }

    async fn file_for(&self, table_id: i32) -> StorageResult<Arc<dyn RandomAccessFile>> {
        let mut files = self.files.lock().await;
        if let Some(file) = files.get(&table_id) {
            return Ok(file.clone());
        }
        self.fs
            .ensure_dir(&self.config.base_dir)
            .await
            .map_err(|e| StorageError::io(self.config.base_dir.clone(), e))?;
        let path = self.table_path(table_id);
        let file = self
            .fs
            .open_read_write(&path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        files.insert(table_id, file.clone());
        Ok(file)
    }

    /// Reads the page at `page_id` from its table's file into `page`.
    pub async fn read_page(&self, page_id: PageId) -> StorageResult<Page> {
        let file = self.file_for(page_id.table_id).await?;
        let offset = page_id.page_index as u64 * PAGE_SIZE as u64;
        let mut buf = [0u8; PAGE_SIZE];
        file.read_at(offset, &mut buf)
            .await
            .map_err(|e| StorageError::io(self.table_path(page_id.table_id), e))?;
        debug!("read page {page_id:?} at offset {offset}");
        Ok(Page::from_bytes(page_id, buf))
    }

    /// Persists `page`'s bytes to its slot in its table's file.
    pub async fn write_page(&self, page: &Page) -> StorageResult<()> {
        let page_id = page.page_id();
        let file = self.file_for(page_id.table_id).await?;
        let offset = page_id.page_index as u64 * PAGE_SIZE as u64;
        file.write_at(offset, page.as_bytes())
            .await
            .map_err(|e| StorageError::io(self.table_path(page_id.table_id), e))?;
        debug!("wrote page {page_id:?} at offset {offset}");
        Ok(())
    }

    /// Allocates a new page at the end of `table_id`'s file and returns its
    /// id. The page is zero-filled on disk; callers are responsible for
    /// initializing its header before use.
    pub async fn allocate_page(&self, table_id: i32) -> StorageResult<PageId> {
        let file = self.file_for(table_id).await?;
        let len = file
            .len()
            .await
            .map_err(|e| StorageError::io(self.table_path(table_id), e))?;
        let page_index = (len / PAGE_SIZE as u64) as i32;
        let new_len = len + PAGE_SIZE as u64;
        file.set_len(new_len)
            .await
            .map_err(|e| StorageError::io(self.table_path(table_id), e))?;
        Ok(PageId::new(table_id, page_index))
    }

    /// Number of pages currently allocated for `table_id`.
    pub async fn page_count(&self, table_id: i32) -> StorageResult<i32> {
        let file = self.file_for(table_id).await?;
        let len = file
            .len()
            .await
            .map_err(|e| StorageError::io(self.table_path(table_id), e))?;
        Ok((len / PAGE_SIZE as u64) as i32)
    }
}
