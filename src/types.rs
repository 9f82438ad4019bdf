use std::sync::Arc;

use crate::error::StorageResult;

/// Shared, lockable handle used for catalog and tree-level singletons.
pub type Shared<T> = Arc<tokio::sync::RwLock<T>>;

pub type VoidResult = StorageResult<()>;
