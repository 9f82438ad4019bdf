//! Error taxonomy for the storage core.
//!
//! Every fallible operation in this crate returns [`StorageResult<T>`]. Each
//! variant corresponds to one of the named error kinds callers must be able
//! to distinguish; none of them are swallowed internally, and every pin
//! acquired en route to a `StorageError` is released before it propagates.

use std::path::PathBuf;

use thiserror::Error;

use crate::page::PageId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid offset {offset} for a value of size {size} (page size {page_size})")]
    InvalidOffset {
        offset: i32,
        size: usize,
        page_size: usize,
    },

    #[error("cannot initialize a slotted page with page type Invalid")]
    InvalidPageType,

    #[error("slot index {index} out of range [0, {item_count})")]
    IndexOutOfRange { index: i32, item_count: i32 },

    #[error("insufficient space: needed {needed} bytes, {available} available")]
    InsufficientSpace { needed: usize, available: usize },

    #[error("duplicate key on insert")]
    DuplicateKey,

    #[error("buffer pool exhausted: no evictable frame available")]
    BufferPoolFull,

    #[error("table {table_name:?} already exists in database {database_id}")]
    TableAlreadyExists {
        database_id: i32,
        table_name: String,
    },

    #[error("io error on {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("page {page_id:?} is not resident in the buffer pool")]
    PageNotResident { page_id: PageId },

    #[error("corrupt on-disk structure: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn io(path: impl Into<Option<PathBuf>>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
