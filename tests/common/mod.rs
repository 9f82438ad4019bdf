use std::sync::Arc;

use btree_store::{
    BufferPoolManager, BufferPoolManagerOptions, Column, ColumnType, DiskManager,
    DiskManagerConfig, Schema,
};

pub fn pool(pool_size: usize) -> Arc<BufferPoolManager> {
    let dm = Arc::new(DiskManager::new(
        DiskManagerConfig::new("/tmp/unused-integration-tests"),
        Arc::new(btree_store::memory::InMemoryFileSystem::default()),
    ));
    BufferPoolManager::new(BufferPoolManagerOptions::new(pool_size), dm)
}

pub fn int_key_schema() -> Schema {
    Schema::new(vec![Column::new("id", ColumnType::Int, false)], vec![0])
}

pub fn wide_schema() -> Schema {
    Schema::new(
        vec![
            Column::new("id", ColumnType::Int, false),
            Column::new("name", ColumnType::Varchar(64), true),
        ],
        vec![0],
    )
}
