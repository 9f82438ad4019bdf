//! Public entry point over the whole core: bootstraps the system catalog,
//! allocates table ids, and exposes table CRUD + full scan (spec.md §4.9).
//!
//! The catalog itself is three ordinary [`BTree`]s at fixed, well-known
//! table ids (0-2), so catalog rows go through the same split/merge/search
//! machinery as any user table — no separate bootstrap format. Table
//! creation is guarded by a fixed-size striped lock keyed by
//! `(database_id, table_name)` (spec.md §9): a real mutex per stripe rather
//! than a per-key allocation, so the lock table's size never grows with the
//! number of tables.
//!
//! Grounded on the crate's own `disk_manager.rs` (an async `Mutex<HashMap<..>>`
//! cache of lazily-opened per-table handles) for the `open_tables` cache
//! pattern, generalized from "one handle per table id" to "one opened
//! B+Tree per (database, table name)"; the teacher's own catalog
//! (`src/database.rs`'s global `OnceCell<Database>` singleton with a
//! sync `RwLock<HashMap<i32, Arc<RwLock<HeapTable>>>>`) doesn't fit an
//! async, non-global, testable engine and isn't reused here.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{Mutex, RwLock};

use crate::btree::{BTree, ScanStream};
use crate::buffer_pool::BufferPoolManager;
use crate::error::{StorageError, StorageResult};
use crate::page::PageId;
use crate::schema::{Column, ColumnType, Key, Record, Schema, Value};

/// Fixed size of the striped lock array guarding `create_table` (spec.md
/// §4.9, §9): never grown, never per-key allocated.
const STRIPE_COUNT: usize = 64;

const SYS_DATABASES_TABLE_ID: i32 = 0;
const SYS_TABLES_TABLE_ID: i32 = 1;
const SYS_COLUMNS_TABLE_ID: i32 = 2;
const FIRST_USER_TABLE_ID: i32 = 3;

fn sys_databases_schema() -> Schema {
    Schema::new(
        vec![
            Column::new("database_id", ColumnType::Int, false),
            Column::new("name", ColumnType::Varchar(128), false),
        ],
        vec![0],
    )
}

fn sys_tables_schema() -> Schema {
    Schema::new(
        vec![
            Column::new("table_id", ColumnType::Int, false),
            Column::new("database_id", ColumnType::Int, false),
            Column::new("table_name", ColumnType::Varchar(128), false),
            Column::new("root_page_index", ColumnType::Int, false),
        ],
        vec![0],
    )
}

fn sys_columns_schema() -> Schema {
    Schema::new(
        vec![
            Column::new("table_id", ColumnType::Int, false),
            Column::new("column_index", ColumnType::Int, false),
            Column::new("name", ColumnType::Varchar(128), false),
            Column::new("column_type", ColumnType::Int, false),
            Column::new("is_nullable", ColumnType::Boolean, false),
            Column::new("max_length", ColumnType::Int, false),
            Column::new("is_primary_key", ColumnType::Boolean, false),
        ],
        vec![0, 1],
    )
}

fn encode_column_type(column_type: &ColumnType) -> (i32, i32) {
    match column_type {
        ColumnType::Int => (0, 0),
        ColumnType::BigInt => (1, 0),
        ColumnType::Boolean => (2, 0),
        ColumnType::DateTime => (3, 0),
        ColumnType::Decimal => (4, 0),
        ColumnType::Varchar(max_length) => (5, *max_length as i32),
    }
}

fn decode_column_type(code: i32, max_length: i32) -> StorageResult<ColumnType> {
    Ok(match code {
        0 => ColumnType::Int,
        1 => ColumnType::BigInt,
        2 => ColumnType::Boolean,
        3 => ColumnType::DateTime,
        4 => ColumnType::Decimal,
        5 => ColumnType::Varchar(max_length as usize),
        other => {
            return Err(StorageError::Corrupt(format!(
                "unrecognized column type code {other}"
            )))
        }
    })
}

pub struct StorageEngine {
    bpm: Arc<BufferPoolManager>,
    sys_databases: BTree,
    sys_tables: BTree,
    sys_columns: BTree,
    next_database_id: AtomicI32,
    next_table_id: AtomicI32,
    stripes: Vec<Mutex<()>>,
    open_tables: RwLock<HashMap<(i32, String), Arc<BTree>>>,
}

impl StorageEngine {
    /// Bootstraps a fresh system catalog over `bpm`: three built-in tables
    /// at fixed table ids, each created as an empty B+Tree (spec.md §4.9).
    pub async fn bootstrap(bpm: Arc<BufferPoolManager>) -> StorageResult<Self> {
        let sys_databases =
            BTree::create(bpm.clone(), SYS_DATABASES_TABLE_ID, sys_databases_schema()).await?;
        let sys_tables = BTree::create(bpm.clone(), SYS_TABLES_TABLE_ID, sys_tables_schema()).await?;
        let sys_columns = BTree::create(bpm.clone(), SYS_COLUMNS_TABLE_ID, sys_columns_schema()).await?;
        info!("storage engine bootstrapped: catalog tables {SYS_DATABASES_TABLE_ID}, {SYS_TABLES_TABLE_ID}, {SYS_COLUMNS_TABLE_ID}");
        Ok(Self {
            bpm,
            sys_databases,
            sys_tables,
            sys_columns,
            next_database_id: AtomicI32::new(0),
            next_table_id: AtomicI32::new(FIRST_USER_TABLE_ID),
            stripes: (0..STRIPE_COUNT).map(|_| Mutex::new(())).collect(),
            open_tables: RwLock::new(HashMap::new()),
        })
    }

    fn stripe_index(database_id: i32, table_name: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        database_id.hash(&mut hasher);
        table_name.hash(&mut hasher);
        (hasher.finish() as usize) % STRIPE_COUNT
    }

    pub async fn create_database(&self, name: &str) -> StorageResult<i32> {
        let database_id = self.next_database_id.fetch_add(1, Ordering::SeqCst);
        self.sys_databases
            .insert(Record::new(vec![
                Value::Int(database_id),
                Value::Varchar(name.to_string()),
            ]))
            .await?;
        info!("create_database: {name:?} -> database_id={database_id}");
        Ok(database_id)
    }

    /// `true` iff `table_name` already exists in `database_id`. Doubles as
    /// `create_table`'s post-stripe-lock recheck, since the recheck and the
    /// public query are the same operation.
    pub async fn table_exists(&self, database_id: i32, table_name: &str) -> StorageResult<bool> {
        Ok(self.find_table_row(database_id, table_name).await?.is_some())
    }

    async fn find_table_row(
        &self,
        database_id: i32,
        table_name: &str,
    ) -> StorageResult<Option<Record>> {
        let rows = self.sys_tables.scan_all().await?;
        Ok(rows.into_iter().find(|r| {
            matches!(&r.values[1], Value::Int(d) if *d == database_id)
                && matches!(&r.values[2], Value::Varchar(n) if n == table_name)
        }))
    }

    /// Creates `table_name` in `database_id` with `schema`, allocating its
    /// storage and catalog rows exactly once under concurrent callers
    /// racing on the same `(database_id, table_name)` (spec.md §4.9, §8
    /// property 9). Losing callers observe `TableAlreadyExists`; callers
    /// racing on distinct names proceed independently.
    pub async fn create_table(
        &self,
        database_id: i32,
        table_name: &str,
        schema: Schema,
    ) -> StorageResult<i32> {
        let stripe = Self::stripe_index(database_id, table_name);
        debug!("create_table: acquiring stripe {stripe} for {table_name:?}");
        let _guard = self.stripes[stripe].lock().await;

        if self.table_exists(database_id, table_name).await? {
            debug!("create_table: {table_name:?} already exists, losing this race");
            return Err(StorageError::TableAlreadyExists {
                database_id,
                table_name: table_name.to_string(),
            });
        }

        let table_id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        let tree = BTree::create(self.bpm.clone(), table_id, schema.clone()).await?;
        let root_page_index = tree.root_page_id().await.page_index;

        self.sys_tables
            .insert(Record::new(vec![
                Value::Int(table_id),
                Value::Int(database_id),
                Value::Varchar(table_name.to_string()),
                Value::Int(root_page_index),
            ]))
            .await?;

        for (index, column) in schema.columns.iter().enumerate() {
            let (type_code, max_length) = encode_column_type(&column.column_type);
            self.sys_columns
                .insert(Record::new(vec![
                    Value::Int(table_id),
                    Value::Int(index as i32),
                    Value::Varchar(column.name.clone()),
                    Value::Int(type_code),
                    Value::Boolean(column.nullable),
                    Value::Int(max_length),
                    Value::Boolean(schema.primary_key.contains(&index)),
                ]))
                .await?;
        }

        self.open_tables
            .write()
            .await
            .insert((database_id, table_name.to_string()), Arc::new(tree));

        info!("create_table: {table_name:?} -> table_id={table_id} in database {database_id}");
        debug!("create_table: releasing stripe {stripe} for {table_name:?}");
        Ok(table_id)
    }

    /// Looks up (opening and caching if necessary) the B+Tree backing
    /// `table_name` in `database_id`, rebuilding its schema from
    /// `sys_columns` on first open.
    async fn resolve_table(&self, database_id: i32, table_name: &str) -> StorageResult<Arc<BTree>> {
        let key = (database_id, table_name.to_string());
        if let Some(tree) = self.open_tables.read().await.get(&key) {
            return Ok(tree.clone());
        }

        let row = self
            .find_table_row(database_id, table_name)
            .await?
            .ok_or_else(|| {
                StorageError::Corrupt(format!(
                    "table {table_name:?} not found in database {database_id}"
                ))
            })?;
        let table_id = match row.values[0] {
            Value::Int(v) => v,
            _ => unreachable!("table_id is always Int"),
        };
        let root_page_index = match row.values[3] {
            Value::Int(v) => v,
            _ => unreachable!("root_page_index is always Int"),
        };

        let mut column_rows: Vec<Record> = self
            .sys_columns
            .scan_all()
            .await?
            .into_iter()
            .filter(|r| matches!(&r.values[0], Value::Int(t) if *t == table_id))
            .collect();
        column_rows.sort_by_key(|r| match r.values[1] {
            Value::Int(i) => i,
            _ => unreachable!("column_index is always Int"),
        });

        let mut columns = Vec::with_capacity(column_rows.len());
        let mut primary_key = Vec::new();
        for (index, row) in column_rows.iter().enumerate() {
            let name = match &row.values[2] {
                Value::Varchar(s) => s.clone(),
                _ => unreachable!("column name is always Varchar"),
            };
            let type_code = match row.values[3] {
                Value::Int(v) => v,
                _ => unreachable!("column_type is always Int"),
            };
            let is_nullable = match row.values[4] {
                Value::Boolean(v) => v,
                _ => unreachable!("is_nullable is always Boolean"),
            };
            let max_length = match row.values[5] {
                Value::Int(v) => v,
                _ => unreachable!("max_length is always Int"),
            };
            let is_primary_key = match row.values[6] {
                Value::Boolean(v) => v,
                _ => unreachable!("is_primary_key is always Boolean"),
            };
            columns.push(Column::new(
                name,
                decode_column_type(type_code, max_length)?,
                is_nullable,
            ));
            if is_primary_key {
                primary_key.push(index);
            }
        }
        let schema = Schema::new(columns, primary_key);

        let tree = Arc::new(BTree::open(
            self.bpm.clone(),
            table_id,
            schema,
            PageId::new(table_id, root_page_index),
        ));
        self.open_tables.write().await.insert(key, tree.clone());
        Ok(tree)
    }

    pub async fn insert(&self, database_id: i32, table_name: &str, record: Record) -> StorageResult<()> {
        let tree = self.resolve_table(database_id, table_name).await?;
        let root_before = tree.root_page_id().await;
        tree.insert(record).await?;
        self.sync_root_page_index(&tree, database_id, table_name, root_before)
            .await
    }

    pub async fn search(
        &self,
        database_id: i32,
        table_name: &str,
        key: &Key,
    ) -> StorageResult<Option<Record>> {
        self.resolve_table(database_id, table_name).await?.search(key).await
    }

    pub async fn delete(&self, database_id: i32, table_name: &str, key: &Key) -> StorageResult<bool> {
        let tree = self.resolve_table(database_id, table_name).await?;
        let root_before = tree.root_page_id().await;
        let removed = tree.delete(key).await?;
        self.sync_root_page_index(&tree, database_id, table_name, root_before)
            .await?;
        Ok(removed)
    }

    /// `insert`/`delete` can move a tree's root (propagate_split creates a
    /// new one, propagate_underflow collapses the old one away). The
    /// `sys_tables` row is the only thing `resolve_table` has to rebuild a
    /// tree from on a cache miss, so a root move that never reaches the row
    /// would leave a later cold lookup descending from a page that is no
    /// longer the root. Only touches the catalog when the root actually
    /// moved; the common case costs one in-memory comparison.
    async fn sync_root_page_index(
        &self,
        tree: &BTree,
        database_id: i32,
        table_name: &str,
        root_before: PageId,
    ) -> StorageResult<()> {
        let root_after = tree.root_page_id().await;
        if root_after == root_before {
            return Ok(());
        }
        self.sys_tables
            .delete(&Key(vec![Value::Int(tree.table_id())]))
            .await?;
        self.sys_tables
            .insert(Record::new(vec![
                Value::Int(tree.table_id()),
                Value::Int(database_id),
                Value::Varchar(table_name.to_string()),
                Value::Int(root_after.page_index),
            ]))
            .await?;
        debug!(
            "sync_root_page_index: {table_name:?} root {root_before:?} -> {root_after:?}"
        );
        Ok(())
    }

    /// Async sequence of every live row in `table_name`, in key order
    /// (spec.md §4.9, §6): pins each leaf in turn via the sibling chain,
    /// decodes its records, and unpins before the stream advances to the
    /// next leaf. Nothing beyond the current leaf's records is held in
    /// memory at once.
    pub async fn scan(&self, database_id: i32, table_name: &str) -> StorageResult<ScanStream> {
        Ok(self.resolve_table(database_id, table_name).await?.scan().await)
    }

    /// Convenience over [`Self::scan`] for callers that just want every row
    /// collected into a `Vec` rather than driving the stream themselves.
    pub async fn scan_all(&self, database_id: i32, table_name: &str) -> StorageResult<Vec<Record>> {
        self.resolve_table(database_id, table_name).await?.scan_all().await
    }

    pub async fn dispose_async(&self) -> StorageResult<()> {
        self.bpm.dispose_async().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BufferPoolManagerOptions, DiskManagerConfig};
    use crate::disk_manager::DiskManager;
    use crate::fs::memory::InMemoryFileSystem;
    use tokio::task::JoinSet;

    fn user_schema() -> Schema {
        Schema::new(
            vec![
                Column::new("id", ColumnType::Int, false),
                Column::new("name", ColumnType::Varchar(64), true),
            ],
            vec![0],
        )
    }

    async fn engine(pool_size: usize) -> StorageEngine {
        let dm = Arc::new(DiskManager::new(
            DiskManagerConfig::new("/tmp/unused-storage-engine-tests"),
            Arc::new(InMemoryFileSystem::default()),
        ));
        let bpm = BufferPoolManager::new(BufferPoolManagerOptions::new(pool_size), dm);
        StorageEngine::bootstrap(bpm).await.unwrap()
    }

    #[tokio::test]
    async fn create_table_then_insert_and_search_round_trips() {
        let engine = engine(64).await;
        let db_id = engine.create_database("app").await.unwrap();
        engine.create_table(db_id, "users", user_schema()).await.unwrap();

        engine
            .insert(
                db_id,
                "users",
                Record::new(vec![Value::Int(1), Value::Varchar("ferris".into())]),
            )
            .await
            .unwrap();

        let found = engine
            .search(db_id, "users", &Key(vec![Value::Int(1)]))
            .await
            .unwrap();
        assert_eq!(
            found,
            Some(Record::new(vec![Value::Int(1), Value::Varchar("ferris".into())]))
        );
    }

    #[tokio::test]
    async fn create_table_twice_is_rejected() {
        let engine = engine(64).await;
        let db_id = engine.create_database("app").await.unwrap();
        engine.create_table(db_id, "users", user_schema()).await.unwrap();
        let err = engine
            .create_table(db_id, "users", user_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TableAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn scan_returns_every_inserted_row() {
        let engine = engine(64).await;
        let db_id = engine.create_database("app").await.unwrap();
        engine.create_table(db_id, "users", user_schema()).await.unwrap();
        for id in 0..20 {
            engine
                .insert(db_id, "users", Record::new(vec![Value::Int(id), Value::Null]))
                .await
                .unwrap();
        }
        assert_eq!(engine.scan_all(db_id, "users").await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn delete_then_scan_omits_the_row() {
        let engine = engine(64).await;
        let db_id = engine.create_database("app").await.unwrap();
        engine.create_table(db_id, "users", user_schema()).await.unwrap();
        engine
            .insert(db_id, "users", Record::new(vec![Value::Int(1), Value::Null]))
            .await
            .unwrap();
        assert!(engine.delete(db_id, "users", &Key(vec![Value::Int(1)])).await.unwrap());
        assert_eq!(engine.scan_all(db_id, "users").await.unwrap().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_create_table_yields_exactly_one_winner() {
        let engine = Arc::new(engine(64).await);
        let db_id = engine.create_database("app").await.unwrap();

        let mut set = JoinSet::new();
        for _ in 0..8 {
            let engine = engine.clone();
            set.spawn(async move { engine.create_table(db_id, "users", user_schema()).await });
        }

        let mut ok_count = 0;
        let mut already_exists_count = 0;
        while let Some(res) = set.join_next().await {
            match res.unwrap() {
                Ok(_) => ok_count += 1,
                Err(StorageError::TableAlreadyExists { .. }) => already_exists_count += 1,
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
        assert_eq!(ok_count, 1);
        assert_eq!(already_exists_count, 7);
        assert_eq!(engine.scan_all(db_id, "users").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn resolve_table_after_root_split_uses_the_new_root() {
        let engine = engine(256).await;
        let db_id = engine.create_database("app").await.unwrap();
        engine.create_table(db_id, "users", user_schema()).await.unwrap();

        for id in 0..2000 {
            engine
                .insert(db_id, "users", Record::new(vec![Value::Int(id), Value::Null]))
                .await
                .unwrap();
        }

        let table_id = match engine
            .find_table_row(db_id, "users")
            .await
            .unwrap()
            .unwrap()
            .values[0]
        {
            Value::Int(v) => v,
            _ => unreachable!(),
        };
        let stored_root = {
            let tree = engine.resolve_table(db_id, "users").await.unwrap();
            let actual_root = tree.root_page_id().await;
            assert_ne!(
                actual_root,
                PageId::new(table_id, 0),
                "2000 inserts must have split the root at least once"
            );
            match engine
                .find_table_row(db_id, "users")
                .await
                .unwrap()
                .unwrap()
                .values[3]
            {
                Value::Int(v) => v,
                _ => unreachable!(),
            }
        };
        let tree = engine.resolve_table(db_id, "users").await.unwrap();
        assert_eq!(stored_root, tree.root_page_id().await.page_index);

        // Force resolve_table's cold path and confirm it rebuilds from the
        // same (now-current) root rather than the table's original page 0.
        engine.open_tables.write().await.clear();
        assert_eq!(engine.scan_all(db_id, "users").await.unwrap().len(), 2000);
        let rebuilt = engine.resolve_table(db_id, "users").await.unwrap();
        assert_eq!(rebuilt.root_page_id().await.page_index, stored_root);
    }
}
