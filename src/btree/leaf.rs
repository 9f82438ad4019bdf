//! Leaf-page operations: leaf pages hold live table rows, one per slot,
//! kept in ascending primary-key order by slot index. Every mutation
//! decodes the page's live records, applies the change in memory, and
//! rewrites the whole page in sorted order — simpler than shifting slots
//! in place and cheap at one page's worth of records. Capacity is checked
//! against the rewritten contents *before* any page bytes are touched, so
//! a failed insert never leaves the page half-rewritten.

use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PageHeader, PageType, SlottedPage, HEADER_SIZE, PAGE_SIZE, SLOT_SIZE};
use crate::record::RecordSerializer;
use crate::schema::{Key, Record, Schema};

/// A leaf below this occupancy (as a fraction of the usable page body) is
/// considered underfull and triggers redistribute-or-merge (spec.md §4.8).
/// Chosen as a straightforward "less than half full" fill factor; the spec
/// leaves the exact threshold to the implementer.
const MIN_FILL_RATIO: f64 = 0.5;

pub struct BTreeLeafNode;

impl BTreeLeafNode {
    fn live_records(page: &Page, schema: &Schema) -> StorageResult<Vec<Record>> {
        let count = SlottedPage::item_count(page)?;
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count {
            let slot = SlottedPage::slot_at(page, i)?;
            if slot.is_tombstone() {
                continue;
            }
            out.push(RecordSerializer::decode(
                schema,
                SlottedPage::get_record(page, i)?,
            )?);
        }
        Ok(out)
    }

    pub fn search(page: &Page, schema: &Schema, key: &Key) -> StorageResult<Option<Record>> {
        let records = Self::live_records(page, schema)?;
        Ok(
            match records.binary_search_by(|r| r.key(schema).cmp(key)) {
                Ok(i) => Some(records[i].clone()),
                Err(_) => None,
            },
        )
    }

    pub fn scan_all(page: &Page, schema: &Schema) -> StorageResult<Vec<Record>> {
        Self::live_records(page, schema)
    }

    /// Inserts `record`, rewriting the page in sorted order. Returns
    /// `InsufficientSpace` without mutating the page if the new contents
    /// don't fit, so the caller can split and retry.
    pub fn insert(page: &mut Page, schema: &Schema, record: Record) -> StorageResult<()> {
        let mut records = Self::live_records(page, schema)?;
        let key = record.key(schema);
        match records.binary_search_by(|r| r.key(schema).cmp(&key)) {
            Ok(_) => return Err(StorageError::DuplicateKey),
            Err(pos) => records.insert(pos, record),
        }
        Self::rebuild(page, schema, &records)
    }

    /// Removes the record matching `key`, if present, and rewrites the
    /// page. Returns the removed record, or `None` if `key` was absent.
    pub fn delete(page: &mut Page, schema: &Schema, key: &Key) -> StorageResult<Option<Record>> {
        let mut records = Self::live_records(page, schema)?;
        let removed = match records.binary_search_by(|r| r.key(schema).cmp(key)) {
            Ok(i) => Some(records.remove(i)),
            Err(_) => None,
        };
        if removed.is_some() {
            Self::rebuild(page, schema, &records)?;
        }
        Ok(removed)
    }

    /// Splits `page` in half by record count, moving the upper half into
    /// `right_page` (already allocated, same table, not yet initialized).
    /// Both pages keep `page`'s parent; sibling links are relinked so
    /// `right_page` sits between `page` and `page`'s old next leaf. `page`'s
    /// old next leaf (if any) still has its own prev-link pointing at `page`
    /// rather than `right_page`; the caller is responsible for fetching and
    /// fixing that third page up, `split` only has the two pages in hand.
    /// Returns the separator key to insert into the parent alongside
    /// `page`'s id: `page`'s own new maximum key, not `right_page`'s
    /// minimum. Routing (`BTreeInternalNode::find_child`) sends an exact key
    /// match to the *lower* child, so the key stored for the lower side
    /// must be a key that actually lives there.
    pub fn split(page: &mut Page, right_page: &mut Page, schema: &Schema) -> StorageResult<Key> {
        let records = Self::live_records(page, schema)?;
        let mid = records.len() / 2;
        let (left, right) = records.split_at(mid);
        let split_key = left.last().expect("a full leaf has at least one record").key(schema);

        let (parent_index, prev_leaf, old_next_leaf) = {
            let header = PageHeader::new(page);
            (header.parent_index()?, header.prev_leaf()?, header.next_leaf()?)
        };
        let left_page_index = page.page_id().page_index;
        let right_page_index = right_page.page_id().page_index;

        Self::rebuild_with_links(page, schema, left, parent_index, prev_leaf, right_page_index)?;
        Self::rebuild_with_links(
            right_page,
            schema,
            right,
            parent_index,
            left_page_index,
            old_next_leaf,
        )?;
        Ok(split_key)
    }

    /// The largest key currently stored in `page`, or `None` if empty.
    pub fn max_key(page: &Page, schema: &Schema) -> StorageResult<Option<Key>> {
        Ok(Self::live_records(page, schema)?
            .last()
            .map(|r| r.key(schema)))
    }

    /// `true` iff the page's live-record occupancy has fallen below
    /// [`MIN_FILL_RATIO`] of the usable body, signalling that `delete`
    /// should attempt redistribute-or-merge with a sibling.
    pub fn is_underfull(page: &Page) -> StorageResult<bool> {
        let free = SlottedPage::get_free_space(page)?;
        let usable = PAGE_SIZE - HEADER_SIZE;
        Ok(free as f64 > usable as f64 * MIN_FILL_RATIO)
    }

    /// `true` iff moving one record from `self` to a neighbor would still
    /// leave `self` at or above [`MIN_FILL_RATIO`] — i.e. there is a record
    /// to spare for redistribution.
    pub fn can_spare_one(page: &Page, schema: &Schema) -> StorageResult<bool> {
        let records = Self::live_records(page, schema)?;
        Ok(records.len() > 1 && !Self::is_underfull(page)?)
    }

    /// Moves `left`'s last record into the front of `right` (used when
    /// `right` is underfull and `left` is its left sibling with room to
    /// spare). Returns the new separator key for the parent: `left`'s new
    /// maximum key, matching the lower-side-owns-the-boundary convention
    /// `split` uses.
    pub fn redistribute_from_left(
        left: &mut Page,
        right: &mut Page,
        schema: &Schema,
    ) -> StorageResult<Key> {
        let mut left_records = Self::live_records(left, schema)?;
        let mut right_records = Self::live_records(right, schema)?;
        let moved = left_records.pop().expect("left must have a spare record");
        let new_separator = left_records
            .last()
            .expect("left had more than one record before the move")
            .key(schema);
        right_records.insert(0, moved);
        Self::rebuild(left, schema, &left_records)?;
        Self::rebuild(right, schema, &right_records)?;
        Ok(new_separator)
    }

    /// Moves `right`'s first record into the back of `left` (used when
    /// `left` is underfull and `right` is its right sibling with room to
    /// spare). Returns the new separator key for the parent: `left`'s new
    /// maximum key, which is the record that just moved.
    pub fn redistribute_from_right(
        left: &mut Page,
        right: &mut Page,
        schema: &Schema,
    ) -> StorageResult<Key> {
        let mut left_records = Self::live_records(left, schema)?;
        let mut right_records = Self::live_records(right, schema)?;
        let moved = right_records.remove(0);
        let new_separator = moved.key(schema);
        left_records.push(moved);
        Self::rebuild(left, schema, &left_records)?;
        Self::rebuild(right, schema, &right_records)?;
        Ok(new_separator)
    }

    /// Merges `right`'s records into `left` and unlinks `right` from the
    /// sibling chain; `right` is left as an empty, parentless leaf page
    /// (its space is not reclaimed on disk — see spec.md §9). Fails with
    /// `InsufficientSpace` if the combined records don't fit in one page.
    /// `right`'s old next leaf (if any) still has its own prev-link
    /// pointing at `right`; the caller fetches and fixes that third page up.
    pub fn merge_into(left: &mut Page, right: &Page, schema: &Schema) -> StorageResult<()> {
        let mut records = Self::live_records(left, schema)?;
        records.extend(Self::live_records(right, schema)?);
        let next_leaf = PageHeader::new_readonly(right).next_leaf_readonly()?;
        let (parent_index, prev_leaf) = {
            let readonly = PageHeader::new_readonly(left);
            (readonly.parent_index_readonly()?, readonly.prev_leaf_readonly()?)
        };
        Self::rebuild_with_links(left, schema, &records, parent_index, prev_leaf, next_leaf)
    }

    fn rebuild(page: &mut Page, schema: &Schema, records: &[Record]) -> StorageResult<()> {
        let (parent_index, prev_leaf, next_leaf) = {
            let header = PageHeader::new(page);
            (header.parent_index()?, header.prev_leaf()?, header.next_leaf()?)
        };
        Self::rebuild_with_links(page, schema, records, parent_index, prev_leaf, next_leaf)
    }

    fn rebuild_with_links(
        page: &mut Page,
        schema: &Schema,
        records: &[Record],
        parent_index: i32,
        prev_leaf: i32,
        next_leaf: i32,
    ) -> StorageResult<()> {
        let encoded: Vec<Vec<u8>> = records
            .iter()
            .map(|r| RecordSerializer::encode(schema, r))
            .collect::<StorageResult<_>>()?;
        let needed: usize = encoded.iter().map(|b| b.len() + SLOT_SIZE).sum();
        let available = PAGE_SIZE - HEADER_SIZE;
        if needed > available {
            return Err(StorageError::InsufficientSpace { needed, available });
        }

        SlottedPage::initialize(page, PageType::Leaf)?;
        {
            let mut header = PageHeader::new(page);
            header.set_parent_index(parent_index)?;
            header.set_prev_leaf(prev_leaf)?;
            header.set_next_leaf(next_leaf)?;
        }
        for (i, bytes) in encoded.iter().enumerate() {
            let inserted = SlottedPage::try_add_item(page, bytes, i as i32)?;
            debug_assert!(inserted, "space was checked above");
        }
        Ok(())
    }
}
