//! The whole-tree algorithm: descent, split propagation, and
//! redistribute/merge on delete, all built on top of
//! [`super::leaf::BTreeLeafNode`] and [`super::internal::BTreeInternalNode`],
//! which know only how to mutate a single page.
//!
//! Descent uses lock-coupling ("crabbing"): a child is always pinned before
//! its parent is unpinned (spec.md §8 testable property 7), so a concurrent
//! split or merge elsewhere in the tree never observes a gap in the path
//! from root to leaf. Once a leaf split or merge needs to propagate above
//! the node it started at, the pins gathered during descent have already
//! been released; propagation re-fetches ancestors one level at a time via
//! the header's `parent_index` field rather than holding a path of pins for
//! the whole operation, trading a little re-fetching for pin lifetimes that
//! never span more than two levels at once.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use log::info;
use tokio::sync::RwLock;

use crate::buffer_pool::{BufferPoolManager, PinnedPage};
use crate::error::StorageResult;
use crate::page::{PageHeader, PageId, PageType, SlottedPage, INVALID_PAGE_INDEX};
use crate::schema::{Key, Record, Schema};

use super::internal::BTreeInternalNode;
use super::leaf::BTreeLeafNode;

/// A disk-backed, clustered B+Tree over one table's rows, keyed by primary
/// key. One instance owns exactly one table's worth of pages in `bpm`.
pub struct BTree {
    table_id: i32,
    schema: Schema,
    bpm: Arc<BufferPoolManager>,
    root_page_id: RwLock<PageId>,
}

impl BTree {
    /// Allocates a fresh, empty tree: a single empty leaf page as the root.
    pub async fn create(
        bpm: Arc<BufferPoolManager>,
        table_id: i32,
        schema: Schema,
    ) -> StorageResult<Self> {
        let root = bpm.create_page(table_id).await?;
        let root_id = root.page_id();
        root.write(|p| SlottedPage::initialize(p, PageType::Leaf))
            .await?;
        root.unpin(true).await;
        Ok(Self {
            table_id,
            schema,
            bpm,
            root_page_id: RwLock::new(root_id),
        })
    }

    /// Reopens a tree whose root page already exists on disk (used when the
    /// catalog hands back a previously created table's root page id).
    pub fn open(bpm: Arc<BufferPoolManager>, table_id: i32, schema: Schema, root_page_id: PageId) -> Self {
        Self {
            table_id,
            schema,
            bpm,
            root_page_id: RwLock::new(root_page_id),
        }
    }

    pub async fn root_page_id(&self) -> PageId {
        *self.root_page_id.read().await
    }

    pub fn table_id(&self) -> i32 {
        self.table_id
    }

    /// `leaf`'s `next_leaf` link just changed (a split or merge moved which
    /// page sits after it). The page at the other end still has its own
    /// `prev_leaf` pointing at the old neighbor; fetches that third page and
    /// fixes it up so the doubly-linked leaf chain stays consistent.
    async fn relink_next_leafs_prev(&self, leaf: &PinnedPage) -> StorageResult<()> {
        let next_index = leaf
            .read(|p| PageHeader::new_readonly(p).next_leaf_readonly())
            .await?;
        if next_index == INVALID_PAGE_INDEX {
            return Ok(());
        }
        let next = self.bpm.fetch_page(PageId::new(self.table_id, next_index)).await?;
        let leaf_index = leaf.page_id().page_index;
        next.write(|p| PageHeader::new(p).set_prev_leaf(leaf_index)).await?;
        next.unpin(true).await;
        Ok(())
    }

    fn key_schema(&self) -> Schema {
        self.schema.key_schema()
    }

    pub async fn search(&self, key: &Key) -> StorageResult<Option<Record>> {
        let key_schema = self.key_schema();
        let mut current = self.bpm.fetch_page(self.root_page_id().await).await?;
        loop {
            let page_type = current
                .read(|p| PageHeader::new_readonly(p).page_type_readonly())
                .await?;
            if page_type == PageType::Leaf {
                let found = current.read(|p| BTreeLeafNode::search(p, &self.schema, key)).await?;
                current.unpin(false).await;
                return Ok(found);
            }
            let child_id = current
                .read(|p| BTreeInternalNode::find_child(p, &key_schema, key))
                .await?;
            let child = self.bpm.fetch_page(child_id).await?;
            current.unpin(false).await;
            current = child;
        }
    }

    /// Full, in-key-order scan of every live record in the table. Descends
    /// to the leftmost leaf, then walks the sibling-leaf chain.
    pub async fn scan_all(&self) -> StorageResult<Vec<Record>> {
        let key_schema = self.key_schema();
        let mut current = self.bpm.fetch_page(self.root_page_id().await).await?;
        loop {
            let page_type = current
                .read(|p| PageHeader::new_readonly(p).page_type_readonly())
                .await?;
            if page_type == PageType::Leaf {
                break;
            }
            let child_id = current
                .read(|p| BTreeInternalNode::leftmost_child(p, &key_schema))
                .await?;
            let child = self.bpm.fetch_page(child_id).await?;
            current.unpin(false).await;
            current = child;
        }

        let mut out = Vec::new();
        loop {
            let (records, next) = current
                .read(|p| -> StorageResult<(Vec<Record>, i32)> {
                    Ok((
                        BTreeLeafNode::scan_all(p, &self.schema)?,
                        PageHeader::new_readonly(p).next_leaf_readonly()?,
                    ))
                })
                .await?;
            out.extend(records);
            current.unpin(false).await;
            if next == INVALID_PAGE_INDEX {
                return Ok(out);
            }
            current = self.bpm.fetch_page(PageId::new(self.table_id, next)).await?;
        }
    }

    /// An async sequence of every live record in the table, in key order
    /// (spec.md §4.9): pins each leaf in turn via the sibling chain, decodes
    /// its records, and unpins before the stream advances to the next leaf.
    /// Unlike [`Self::scan_all`], nothing beyond the current leaf's records
    /// is ever held in memory at once.
    pub async fn scan(&self) -> ScanStream {
        ScanStream {
            bpm: self.bpm.clone(),
            schema: self.schema.clone(),
            table_id: self.table_id,
            root_page_id: self.root_page_id().await,
            buffer: VecDeque::new(),
            cursor: ScanCursor::NotStarted,
        }
    }

    /// Inserts `record`. Fails with `DuplicateKey` if a row with the same
    /// primary key already exists.
    pub async fn insert(&self, record: Record) -> StorageResult<()> {
        let key_schema = self.key_schema();
        let key = record.key(&self.schema);

        let mut current = self.bpm.fetch_page(self.root_page_id().await).await?;
        loop {
            let page_type = current
                .read(|p| PageHeader::new_readonly(p).page_type_readonly())
                .await?;
            if page_type == PageType::Leaf {
                break;
            }
            let child_id = current
                .read(|p| BTreeInternalNode::find_child(p, &key_schema, &key))
                .await?;
            let child = self.bpm.fetch_page(child_id).await?;
            current.unpin(false).await;
            current = child;
        }

        let insert_result = current
            .write(|p| BTreeLeafNode::insert(p, &self.schema, record.clone()))
            .await;
        match insert_result {
            Ok(()) => {
                current.unpin(true).await;
                Ok(())
            }
            Err(crate::error::StorageError::InsufficientSpace { .. }) => {
                self.split_leaf_and_insert(current, record, &key).await
            }
            Err(e) => {
                current.unpin(false).await;
                Err(e)
            }
        }
    }

    async fn split_leaf_and_insert(
        &self,
        left: PinnedPage,
        record: Record,
        key: &Key,
    ) -> StorageResult<()> {
        let right = self.bpm.create_page(self.table_id).await?;
        let separator = self
            .bpm
            .write_pair(&left, &right, |l, r| BTreeLeafNode::split(l, r, &self.schema))
            .await?;
        info!(
            "leaf split: {:?} -> new sibling {:?}, separator {separator}",
            left.page_id(),
            right.page_id()
        );
        self.relink_next_leafs_prev(&right).await?;

        let goes_left = *key <= separator;
        let insert_result = if goes_left {
            left.write(|p| BTreeLeafNode::insert(p, &self.schema, record)).await
        } else {
            right.write(|p| BTreeLeafNode::insert(p, &self.schema, record)).await
        };
        if let Err(e) = insert_result {
            left.unpin(true).await;
            right.unpin(true).await;
            return Err(e);
        }

        self.propagate_split(left, right, separator).await
    }

    /// Pushes a newly split child's separator key into its parent, splitting
    /// ancestors in turn as needed, all the way up to a new root if the
    /// propagation passes the current one (spec.md §4.8 step 5; scenarios
    /// S6/S7).
    async fn propagate_split(
        &self,
        mut left: PinnedPage,
        mut right: PinnedPage,
        mut separator: Key,
    ) -> StorageResult<()> {
        let key_schema = self.key_schema();
        loop {
            let parent_index = left
                .read(|p| PageHeader::new_readonly(p).parent_index_readonly())
                .await?;

            if parent_index == INVALID_PAGE_INDEX {
                let old_root_id = left.page_id();
                let new_sibling_id = right.page_id();
                let root = self.bpm.create_page(self.table_id).await?;
                let root_id = root.page_id();
                root.write(|p| -> StorageResult<()> {
                    BTreeInternalNode::initialize_with_single_child(p, new_sibling_id)?;
                    let inserted =
                        BTreeInternalNode::try_insert(p, &key_schema, separator.clone(), old_root_id)?;
                    debug_assert!(inserted, "a brand-new internal page always has room for one entry");
                    Ok(())
                })
                .await?;
                left.write(|p| PageHeader::new(p).set_parent_index(root_id.page_index))
                    .await?;
                right
                    .write(|p| PageHeader::new(p).set_parent_index(root_id.page_index))
                    .await?;
                *self.root_page_id.write().await = root_id;
                info!(
                    "new root {:?} created over {:?}, {:?}",
                    root_id,
                    left.page_id(),
                    right.page_id()
                );
                left.unpin(true).await;
                right.unpin(true).await;
                root.unpin(true).await;
                return Ok(());
            }

            let parent_id = PageId::new(self.table_id, parent_index);
            let old_child = left.page_id();
            let new_child = right.page_id();
            let parent = self.bpm.fetch_page(parent_id).await?;
            left.unpin(true).await;
            right.unpin(true).await;

            parent
                .write(|p| BTreeInternalNode::reassign_child(p, &key_schema, old_child, new_child))
                .await?;
            let inserted = parent
                .write(|p| BTreeInternalNode::try_insert(p, &key_schema, separator.clone(), old_child))
                .await?;
            if inserted {
                parent.unpin(true).await;
                return Ok(());
            }

            let sibling = self.bpm.create_page(self.table_id).await?;
            let new_separator = self
                .bpm
                .write_pair(&parent, &sibling, |l, r| {
                    BTreeInternalNode::split_and_insert(l, r, &key_schema, separator.clone(), old_child)
                })
                .await?;
            info!(
                "internal split: {:?} -> new sibling {:?}, separator {new_separator}",
                parent.page_id(),
                sibling.page_id()
            );

            let sibling_id = sibling.page_id();
            let moved_children = sibling
                .read(|p| BTreeInternalNode::child_ids(p, &key_schema))
                .await?;
            for gc_id in moved_children {
                let gc = self.bpm.fetch_page(gc_id).await?;
                gc.write(|p| PageHeader::new(p).set_parent_index(sibling_id.page_index))
                    .await?;
                gc.unpin(true).await;
            }

            separator = new_separator;
            left = parent;
            right = sibling;
        }
    }

    /// Removes the row for `key`. Returns `false` (no-op) if no such row
    /// exists.
    pub async fn delete(&self, key: &Key) -> StorageResult<bool> {
        let key_schema = self.key_schema();

        let mut current = self.bpm.fetch_page(self.root_page_id().await).await?;
        loop {
            let page_type = current
                .read(|p| PageHeader::new_readonly(p).page_type_readonly())
                .await?;
            if page_type == PageType::Leaf {
                break;
            }
            let child_id = current
                .read(|p| BTreeInternalNode::find_child(p, &key_schema, key))
                .await?;
            let child = self.bpm.fetch_page(child_id).await?;
            current.unpin(false).await;
            current = child;
        }

        let removed = current
            .write(|p| BTreeLeafNode::delete(p, &self.schema, key))
            .await?;
        if removed.is_none() {
            current.unpin(false).await;
            return Ok(false);
        }

        let (parent_index, underfull) = current
            .read(|p| -> StorageResult<(i32, bool)> {
                Ok((
                    PageHeader::new_readonly(p).parent_index_readonly()?,
                    BTreeLeafNode::is_underfull(p)?,
                ))
            })
            .await?;

        if parent_index == INVALID_PAGE_INDEX || !underfull {
            current.unpin(true).await;
            return Ok(true);
        }

        let leaf_id = current.page_id();
        let parent_id = PageId::new(self.table_id, parent_index);
        let parent = self.bpm.fetch_page(parent_id).await?;
        let siblings = parent.read(|p| BTreeInternalNode::child_ids(p, &key_schema)).await?;
        let pos = siblings
            .iter()
            .position(|&id| id == leaf_id)
            .expect("leaf must be one of its parent's children");
        let left_sib = pos.checked_sub(1).map(|i| siblings[i]);
        let right_sib = siblings.get(pos + 1).copied();

        if let Some(right_id) = right_sib {
            let right = self.bpm.fetch_page(right_id).await?;
            let can_spare = right.read(|p| BTreeLeafNode::can_spare_one(p, &self.schema)).await?;
            if can_spare {
                self.bpm
                    .write_pair(&current, &right, |l, r| {
                        BTreeLeafNode::redistribute_from_right(l, r, &self.schema)
                    })
                    .await?;
                let new_sep = current
                    .read(|p| BTreeLeafNode::max_key(p, &self.schema))
                    .await?
                    .expect("leaf retains at least one record after redistribution");
                parent
                    .write(|p| BTreeInternalNode::update_separator_key(p, &key_schema, leaf_id, new_sep))
                    .await?;
                current.unpin(true).await;
                right.unpin(true).await;
                parent.unpin(true).await;
                return Ok(true);
            }
            right.unpin(false).await;
        }

        if let Some(left_id) = left_sib {
            let left = self.bpm.fetch_page(left_id).await?;
            let can_spare = left.read(|p| BTreeLeafNode::can_spare_one(p, &self.schema)).await?;
            if can_spare {
                self.bpm
                    .write_pair(&left, &current, |l, r| {
                        BTreeLeafNode::redistribute_from_left(l, r, &self.schema)
                    })
                    .await?;
                let new_sep = left
                    .read(|p| BTreeLeafNode::max_key(p, &self.schema))
                    .await?
                    .expect("left sibling retains a record after redistribution");
                parent
                    .write(|p| BTreeInternalNode::update_separator_key(p, &key_schema, left_id, new_sep))
                    .await?;
                left.unpin(true).await;
                current.unpin(true).await;
                parent.unpin(true).await;
                return Ok(true);
            }
            left.unpin(false).await;
        }

        if let Some(left_id) = left_sib {
            let left = self.bpm.fetch_page(left_id).await?;
            self.bpm
                .write_pair(&left, &current, |l, r| BTreeLeafNode::merge_into(l, r, &self.schema))
                .await?;
            info!("leaf merge: {leaf_id:?} into {left_id:?}");
            self.relink_next_leafs_prev(&left).await?;
            parent
                .write(|p| BTreeInternalNode::remove_child_after_merge(p, &key_schema, leaf_id, left_id))
                .await?;
            left.unpin(true).await;
            current.unpin(true).await;
            self.propagate_underflow(parent).await?;
            return Ok(true);
        }

        if let Some(right_id) = right_sib {
            let right = self.bpm.fetch_page(right_id).await?;
            self.bpm
                .write_pair(&current, &right, |l, r| BTreeLeafNode::merge_into(l, r, &self.schema))
                .await?;
            info!("leaf merge: {right_id:?} into {leaf_id:?}");
            self.relink_next_leafs_prev(&current).await?;
            parent
                .write(|p| BTreeInternalNode::remove_child_after_merge(p, &key_schema, right_id, leaf_id))
                .await?;
            current.unpin(true).await;
            right.unpin(true).await;
            self.propagate_underflow(parent).await?;
            return Ok(true);
        }

        // Sole child under its parent (which must then be the root): an
        // underfull root with one child is not itself underflowed, there is
        // simply nothing to rebalance against.
        current.unpin(true).await;
        parent.unpin(false).await;
        Ok(true)
    }

    /// Resolves an internal node's underflow after it lost a child to a
    /// merge one level down: redistribute from a sibling if one can spare an
    /// entry, else merge with a sibling and recurse upward. Collapses the
    /// root if it is left with zero separator keys. Boxed because the
    /// recursion depth equals tree height, which isn't known at compile
    /// time.
    fn propagate_underflow<'a>(
        &'a self,
        node: PinnedPage,
    ) -> Pin<Box<dyn Future<Output = StorageResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let key_schema = self.key_schema();

            let (parent_index, underfull) = node
                .read(|p| -> StorageResult<(i32, bool)> {
                    Ok((
                        PageHeader::new_readonly(p).parent_index_readonly()?,
                        BTreeInternalNode::is_underfull(p)?,
                    ))
                })
                .await?;

            if parent_index == INVALID_PAGE_INDEX {
                let entry_count = node.read(|p| BTreeInternalNode::entry_count(p)).await?;
                if entry_count == 0 {
                    let only_child = node
                        .read(|p| PageHeader::new_readonly(p).rightmost_child_readonly())
                        .await?;
                    let new_root_id = PageId::new(self.table_id, only_child);
                    let child = self.bpm.fetch_page(new_root_id).await?;
                    child
                        .write(|p| PageHeader::new(p).set_parent_index(INVALID_PAGE_INDEX))
                        .await?;
                    child.unpin(true).await;
                    *self.root_page_id.write().await = new_root_id;
                    info!("root collapsed: {:?} -> {new_root_id:?}", node.page_id());
                }
                node.unpin(true).await;
                return Ok(());
            }

            if !underfull {
                node.unpin(true).await;
                return Ok(());
            }

            let node_id = node.page_id();
            let parent_id = PageId::new(self.table_id, parent_index);
            let parent = self.bpm.fetch_page(parent_id).await?;
            let siblings = parent.read(|p| BTreeInternalNode::child_ids(p, &key_schema)).await?;
            let pos = siblings
                .iter()
                .position(|&id| id == node_id)
                .expect("node must be one of its parent's children");
            let left_sib = pos.checked_sub(1).map(|i| siblings[i]);
            let right_sib = siblings.get(pos + 1).copied();

            if let Some(right_id) = right_sib {
                let right = self.bpm.fetch_page(right_id).await?;
                let can_spare = right
                    .read(|p| BTreeInternalNode::can_spare_one(p, &key_schema))
                    .await?;
                if can_spare {
                    let separator = parent
                        .read(|p| BTreeInternalNode::separator_key_for_child(p, &key_schema, node_id))
                        .await?;
                    let (new_separator, moved_grandchild) = self
                        .bpm
                        .write_pair(&node, &right, |l, r| {
                            BTreeInternalNode::redistribute_from_right(l, r, &key_schema, separator)
                        })
                        .await?;
                    parent
                        .write(|p| {
                            BTreeInternalNode::update_separator_key(p, &key_schema, node_id, new_separator)
                        })
                        .await?;
                    let gc = self.bpm.fetch_page(moved_grandchild).await?;
                    gc.write(|p| PageHeader::new(p).set_parent_index(node_id.page_index))
                        .await?;
                    gc.unpin(true).await;
                    node.unpin(true).await;
                    right.unpin(true).await;
                    parent.unpin(true).await;
                    return Ok(());
                }
                right.unpin(false).await;
            }

            if let Some(left_id) = left_sib {
                let left = self.bpm.fetch_page(left_id).await?;
                let can_spare = left
                    .read(|p| BTreeInternalNode::can_spare_one(p, &key_schema))
                    .await?;
                if can_spare {
                    let separator = parent
                        .read(|p| BTreeInternalNode::separator_key_for_child(p, &key_schema, left_id))
                        .await?;
                    let (new_separator, moved_grandchild) = self
                        .bpm
                        .write_pair(&left, &node, |l, r| {
                            BTreeInternalNode::redistribute_from_left(l, r, &key_schema, separator)
                        })
                        .await?;
                    parent
                        .write(|p| {
                            BTreeInternalNode::update_separator_key(p, &key_schema, left_id, new_separator)
                        })
                        .await?;
                    let gc = self.bpm.fetch_page(moved_grandchild).await?;
                    gc.write(|p| PageHeader::new(p).set_parent_index(node_id.page_index))
                        .await?;
                    gc.unpin(true).await;
                    left.unpin(true).await;
                    node.unpin(true).await;
                    parent.unpin(true).await;
                    return Ok(());
                }
                left.unpin(false).await;
            }

            if let Some(left_id) = left_sib {
                let left = self.bpm.fetch_page(left_id).await?;
                let demoted_key = parent
                    .read(|p| BTreeInternalNode::separator_key_for_child(p, &key_schema, left_id))
                    .await?;
                self.bpm
                    .write_pair(&node, &left, |r, l| {
                        BTreeInternalNode::merge_left(r, l, &key_schema, demoted_key)
                    })
                    .await?;
                info!("internal merge: {node_id:?} into {left_id:?}");
                let moved_children = node
                    .read(|p| BTreeInternalNode::child_ids(p, &key_schema))
                    .await?;
                let left_id_for_fixup = left.page_id();
                for gc_id in moved_children {
                    let gc = self.bpm.fetch_page(gc_id).await?;
                    gc.write(|p| PageHeader::new(p).set_parent_index(left_id_for_fixup.page_index))
                        .await?;
                    gc.unpin(true).await;
                }
                parent
                    .write(|p| BTreeInternalNode::remove_child_after_merge(p, &key_schema, node_id, left_id))
                    .await?;
                left.unpin(true).await;
                node.unpin(true).await;
                return self.propagate_underflow(parent).await;
            }

            if let Some(right_id) = right_sib {
                let right = self.bpm.fetch_page(right_id).await?;
                let demoted_key = parent
                    .read(|p| BTreeInternalNode::separator_key_for_child(p, &key_schema, node_id))
                    .await?;
                self.bpm
                    .write_pair(&right, &node, |r, l| {
                        BTreeInternalNode::merge_left(r, l, &key_schema, demoted_key)
                    })
                    .await?;
                info!("internal merge: {right_id:?} into {node_id:?}");
                let moved_children = right
                    .read(|p| BTreeInternalNode::child_ids(p, &key_schema))
                    .await?;
                for gc_id in moved_children {
                    let gc = self.bpm.fetch_page(gc_id).await?;
                    gc.write(|p| PageHeader::new(p).set_parent_index(node_id.page_index))
                        .await?;
                    gc.unpin(true).await;
                }
                parent
                    .write(|p| BTreeInternalNode::remove_child_after_merge(p, &key_schema, right_id, node_id))
                    .await?;
                node.unpin(true).await;
                right.unpin(true).await;
                return self.propagate_underflow(parent).await;
            }

            node.unpin(true).await;
            parent.unpin(false).await;
            Ok(())
        })
    }
}

type LeafFetch = Pin<Box<dyn Future<Output = StorageResult<(VecDeque<Record>, i32)>> + Send>>;

enum ScanCursor {
    NotStarted,
    Fetching(LeafFetch),
    Finished,
}

/// The stream returned by [`BTree::scan`]. Owns only what the next leaf
/// fetch needs (`bpm`, `schema`, `table_id`) rather than a reference to the
/// `BTree`, so it has no lifetime tied back to its parent.
pub struct ScanStream {
    bpm: Arc<BufferPoolManager>,
    schema: Schema,
    table_id: i32,
    root_page_id: PageId,
    buffer: VecDeque<Record>,
    cursor: ScanCursor,
}

impl ScanStream {
    /// Convenience for callers that would rather not import [`Stream`]'s
    /// polling machinery: drives the stream one step via a no-op context.
    pub async fn next(&mut self) -> Option<StorageResult<Record>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }
}

impl Stream for ScanStream {
    type Item = StorageResult<Record>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(record) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(record)));
            }
            match &mut this.cursor {
                ScanCursor::NotStarted => {
                    this.cursor = ScanCursor::Fetching(Box::pin(leftmost_leaf_records(
                        this.bpm.clone(),
                        this.schema.clone(),
                        this.root_page_id,
                    )));
                }
                ScanCursor::Fetching(fut) => match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => {
                        this.cursor = ScanCursor::Finished;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Ready(Ok((records, next))) => {
                        this.buffer = records;
                        this.cursor = if next == INVALID_PAGE_INDEX {
                            ScanCursor::Finished
                        } else {
                            ScanCursor::Fetching(Box::pin(leaf_records_at(
                                this.bpm.clone(),
                                this.schema.clone(),
                                this.table_id,
                                next,
                            )))
                        };
                    }
                },
                ScanCursor::Finished => return Poll::Ready(None),
            }
        }
    }
}

async fn leftmost_leaf_records(
    bpm: Arc<BufferPoolManager>,
    schema: Schema,
    root_page_id: PageId,
) -> StorageResult<(VecDeque<Record>, i32)> {
    let key_schema = schema.key_schema();
    let mut current = bpm.fetch_page(root_page_id).await?;
    loop {
        let page_type = current
            .read(|p| PageHeader::new_readonly(p).page_type_readonly())
            .await?;
        if page_type == PageType::Leaf {
            break;
        }
        let child_id = current
            .read(|p| BTreeInternalNode::leftmost_child(p, &key_schema))
            .await?;
        let child = bpm.fetch_page(child_id).await?;
        current.unpin(false).await;
        current = child;
    }
    leaf_records_from_pinned(current, &schema).await
}

async fn leaf_records_at(
    bpm: Arc<BufferPoolManager>,
    schema: Schema,
    table_id: i32,
    page_index: i32,
) -> StorageResult<(VecDeque<Record>, i32)> {
    let page = bpm.fetch_page(PageId::new(table_id, page_index)).await?;
    leaf_records_from_pinned(page, &schema).await
}

async fn leaf_records_from_pinned(
    page: PinnedPage,
    schema: &Schema,
) -> StorageResult<(VecDeque<Record>, i32)> {
    let (records, next) = page
        .read(|p| -> StorageResult<(Vec<Record>, i32)> {
            Ok((
                BTreeLeafNode::scan_all(p, schema)?,
                PageHeader::new_readonly(p).next_leaf_readonly()?,
            ))
        })
        .await?;
    page.unpin(false).await;
    Ok((records.into(), next))
}
