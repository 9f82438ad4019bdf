//! Internal-page operations. An internal page with `n` separator keys
//! routes to `n + 1` children: for ascending entries `e_0..e_{n-1}`,
//! `e_i.child` is responsible for keys in `(e_{i-1}.key, e_i.key]` (with
//! `e_{-1}.key` read as `-infinity`), and the header's `rightmost_child` is
//! responsible for keys strictly greater than `e_{n-1}.key` (spec.md §4.7,
//! §8 invariant 6). Entries are kept in ascending key order by slot index,
//! rewritten wholesale on every mutation — the same approach
//! [`super::leaf::BTreeLeafNode`] takes, so a page never needs incremental
//! slot-shifting logic.
//!
//! A child that splits keeps its own page id for the *lower* half of its
//! old range and hands the *upper* half to a freshly allocated sibling
//! page (mirroring [`super::leaf::BTreeLeafNode::split`]). Propagating that
//! split into the parent is therefore two separate steps, both driven by
//! the tree algorithm in [`super::tree`]: first [`Self::reassign_child`]
//! repoints whatever entry used to route to the old (now lower-half) id
//! over to the new (upper-half) sibling, then a plain
//! [`Self::try_insert`]/[`Self::split_and_insert`] adds a brand new entry
//! for the old id, keyed by the separator.

use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PageHeader, PageId, PageType, SlottedPage, HEADER_SIZE, PAGE_SIZE, SLOT_SIZE};
use crate::record::RecordSerializer;
use crate::schema::{Key, Record, Schema};

/// A node below this occupancy (as a fraction of the usable page body) is
/// considered underfull. Shared fill-factor choice with
/// [`super::leaf::BTreeLeafNode`]; see its doc comment.
const MIN_FILL_RATIO: f64 = 0.5;

struct Entry {
    key: Key,
    child: PageId,
}

pub struct BTreeInternalNode;

impl BTreeInternalNode {
    fn encode_entry(key_schema: &Schema, entry: &Entry) -> StorageResult<Vec<u8>> {
        let key_bytes = RecordSerializer::encode(key_schema, &Record::new(entry.key.0.clone()))?;
        let mut out = Vec::with_capacity(4 + key_bytes.len() + 4);
        out.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&key_bytes);
        out.extend_from_slice(&entry.child.page_index.to_le_bytes());
        Ok(out)
    }

    fn decode_entry(key_schema: &Schema, table_id: i32, bytes: &[u8]) -> StorageResult<Entry> {
        if bytes.len() < 4 {
            return Err(StorageError::Corrupt("truncated internal entry".into()));
        }
        let key_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let key_bytes = bytes
            .get(4..4 + key_len)
            .ok_or_else(|| StorageError::Corrupt("truncated internal entry key".into()))?;
        let key = Key(RecordSerializer::decode(key_schema, key_bytes)?.values);
        let child_bytes = bytes
            .get(4 + key_len..8 + key_len)
            .ok_or_else(|| StorageError::Corrupt("truncated internal entry child".into()))?;
        let child_index = i32::from_le_bytes(child_bytes.try_into().unwrap());
        Ok(Entry {
            key,
            child: PageId::new(table_id, child_index),
        })
    }

    fn live_entries(page: &Page, key_schema: &Schema) -> StorageResult<Vec<Entry>> {
        let table_id = page.page_id().table_id;
        let count = SlottedPage::item_count(page)?;
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count {
            let slot = SlottedPage::slot_at(page, i)?;
            if slot.is_tombstone() {
                continue;
            }
            out.push(Self::decode_entry(
                key_schema,
                table_id,
                SlottedPage::get_record(page, i)?,
            )?);
        }
        Ok(out)
    }

    /// Returns the child page responsible for `key`: the first entry whose
    /// key is `>= key`, or `rightmost_child` if every entry's key is
    /// smaller (spec.md §4.8).
    pub fn find_child(page: &Page, key_schema: &Schema, key: &Key) -> StorageResult<PageId> {
        let entries = Self::live_entries(page, key_schema)?;
        for entry in &entries {
            if key <= &entry.key {
                return Ok(entry.child);
            }
        }
        let table_id = page.page_id().table_id;
        Ok(PageId::new(
            table_id,
            PageHeader::new_readonly(page).rightmost_child_readonly()?,
        ))
    }

    /// The child routing the smallest keys: `entries[0].child` if any
    /// separators exist, else the sole `rightmost_child`. Used to descend
    /// to the first leaf for a full-table scan.
    pub fn leftmost_child(page: &Page, key_schema: &Schema) -> StorageResult<PageId> {
        let entries = Self::live_entries(page, key_schema)?;
        if let Some(first) = entries.first() {
            return Ok(first.child);
        }
        let table_id = page.page_id().table_id;
        Ok(PageId::new(
            table_id,
            PageHeader::new_readonly(page).rightmost_child_readonly()?,
        ))
    }

    /// Initializes a brand-new internal page with a single child pointer
    /// and no separator keys yet (used when the root splits for the first
    /// time and needs an initial internal root with two children).
    pub fn initialize_with_single_child(page: &mut Page, child: PageId) -> StorageResult<()> {
        SlottedPage::initialize(page, PageType::Internal)?;
        PageHeader::new(page).set_rightmost_child(child.page_index)
    }

    /// Repoints whichever entry (or the rightmost pointer) currently routes
    /// to `old_child` so it routes to `new_child` instead. Used after a
    /// child splits: the pre-existing routing slot for the old id must now
    /// reach the newly allocated sibling that inherited the old id's upper
    /// key range. A same-size field overwrite; never fails for space.
    pub fn reassign_child(
        page: &mut Page,
        key_schema: &Schema,
        old_child: PageId,
        new_child: PageId,
    ) -> StorageResult<()> {
        let mut entries = Self::live_entries(page, key_schema)?;
        let rightmost = PageHeader::new_readonly(page).rightmost_child_readonly()?;
        if rightmost == old_child.page_index {
            PageHeader::new(page).set_rightmost_child(new_child.page_index)?;
            return Ok(());
        }
        let pos = entries
            .iter()
            .position(|e| e.child == old_child)
            .ok_or_else(|| {
                StorageError::Corrupt("old_child is not routed by this internal page".into())
            })?;
        entries[pos].child = new_child;
        let rightmost = PageHeader::new_readonly(page).rightmost_child_readonly()?;
        Self::rebuild(page, key_schema, entries, rightmost)
    }

    /// Inserts `(key, child)` in sorted position (spec.md §4.7). Returns
    /// `Ok(false)` — page left unchanged — iff the new entry does not fit;
    /// never touches `rightmost_child`.
    pub fn try_insert(
        page: &mut Page,
        key_schema: &Schema,
        key: Key,
        child: PageId,
    ) -> StorageResult<bool> {
        let mut entries = Self::live_entries(page, key_schema)?;
        let rightmost = PageHeader::new_readonly(page).rightmost_child_readonly()?;
        let pos = entries.partition_point(|e| e.key < key);
        entries.insert(pos, Entry { key, child });

        let encoded: Vec<Vec<u8>> = entries
            .iter()
            .map(|e| Self::encode_entry(key_schema, e))
            .collect::<StorageResult<_>>()?;
        let needed: usize = encoded.iter().map(|b| b.len() + SLOT_SIZE).sum();
        if needed > PAGE_SIZE - HEADER_SIZE {
            return Ok(false);
        }
        let parent_index = PageHeader::new(page).parent_index()?;
        Self::rebuild_encoded(page, &encoded, rightmost, parent_index)?;
        Ok(true)
    }

    /// Virtually builds the sorted `(N+1)`-entry list (existing entries
    /// plus `(key, child)`), promotes the median at index `(N+1)/2`,
    /// leaves the lower half in `page`, and moves the upper half into
    /// `right_page` (spec.md §4.7; matches the median-promotion scenarios
    /// in spec.md §8 S4/S5 verbatim). The median's own child becomes
    /// `page`'s new `rightmost_child`; `page`'s previous `rightmost_child`
    /// becomes `right_page`'s.
    pub fn split_and_insert(
        page: &mut Page,
        right_page: &mut Page,
        key_schema: &Schema,
        key: Key,
        child: PageId,
    ) -> StorageResult<Key> {
        let mut entries = Self::live_entries(page, key_schema)?;
        let old_rightmost = PageHeader::new_readonly(page).rightmost_child_readonly()?;
        let pos = entries.partition_point(|e| e.key < key);
        entries.insert(pos, Entry { key, child });

        let mid = entries.len() / 2;
        let right_entries = entries.split_off(mid + 1);
        let promoted = entries.pop().expect("split requires at least one entry");
        let new_left_rightmost = promoted.child.page_index;
        let parent_index = PageHeader::new(page).parent_index()?;

        Self::rebuild(page, key_schema, entries, new_left_rightmost)?;
        Self::rebuild_with_links(right_page, key_schema, right_entries, old_rightmost, parent_index)?;
        Ok(promoted.key)
    }

    /// `true` iff this page's live-entry occupancy has fallen below
    /// [`MIN_FILL_RATIO`] of the usable body.
    pub fn is_underfull(page: &Page) -> StorageResult<bool> {
        let free = SlottedPage::get_free_space(page)?;
        let usable = PAGE_SIZE - HEADER_SIZE;
        Ok(free as f64 > usable as f64 * MIN_FILL_RATIO)
    }

    /// `true` iff giving up one entry would still leave this page at or
    /// above [`MIN_FILL_RATIO`].
    pub fn can_spare_one(page: &Page, key_schema: &Schema) -> StorageResult<bool> {
        let entries = Self::live_entries(page, key_schema)?;
        Ok(!entries.is_empty() && !Self::is_underfull(page)?)
    }

    /// Moves the separator between `left` and `right` down into `right`
    /// (as `right`'s new first entry, child = `left`'s old rightmost),
    /// promotes `left`'s now-last entry's key up as the new separator, and
    /// that entry's child becomes `left`'s new rightmost. Used when `right`
    /// underflows and `left` (its left sibling, same parent) has an entry
    /// to spare. Returns the new separator plus the grandchild (`left`'s old
    /// rightmost) that moved, so the caller can fix up its `parent_index`.
    pub fn redistribute_from_left(
        left: &mut Page,
        right: &mut Page,
        key_schema: &Schema,
        separator: Key,
    ) -> StorageResult<(Key, PageId)> {
        let mut left_entries = Self::live_entries(left, key_schema)?;
        let mut right_entries = Self::live_entries(right, key_schema)?;
        let left_rightmost = PageHeader::new_readonly(left).rightmost_child_readonly()?;
        let right_table = right.page_id().table_id;
        let moved_grandchild = PageId::new(right_table, left_rightmost);

        let moved = left_entries.pop().expect("left must have a spare entry");
        let new_separator = moved.key.clone();
        right_entries.insert(
            0,
            Entry {
                key: separator,
                child: moved_grandchild,
            },
        );
        Self::rebuild(left, key_schema, left_entries, moved.child.page_index)?;
        let right_rightmost = PageHeader::new_readonly(right).rightmost_child_readonly()?;
        Self::rebuild(right, key_schema, right_entries, right_rightmost)?;
        Ok((new_separator, moved_grandchild))
    }

    /// Mirror of [`Self::redistribute_from_left`] for when `left`
    /// underflows and `right` has an entry to spare.
    pub fn redistribute_from_right(
        left: &mut Page,
        right: &mut Page,
        key_schema: &Schema,
        separator: Key,
    ) -> StorageResult<(Key, PageId)> {
        let mut left_entries = Self::live_entries(left, key_schema)?;
        let mut right_entries = Self::live_entries(right, key_schema)?;
        let left_rightmost = PageHeader::new_readonly(left).rightmost_child_readonly()?;
        let left_table = left.page_id().table_id;

        let moved = right_entries.remove(0);
        let moved_grandchild = moved.child;
        let new_separator = moved.key.clone();
        left_entries.push(Entry {
            key: separator,
            child: PageId::new(left_table, left_rightmost),
        });
        Self::rebuild(left, key_schema, left_entries, moved_grandchild.page_index)?;
        let right_rightmost = PageHeader::new_readonly(right).rightmost_child_readonly()?;
        Self::rebuild(right, key_schema, right_entries, right_rightmost)?;
        Ok((new_separator, moved_grandchild))
    }

    /// Appends the separator demoted from the parent (`left.rightmost`
    /// becomes its child) followed by `right`'s own entries into `left`;
    /// `left.rightmost_child` becomes `right`'s old rightmost. `right` is
    /// then zeroed to an empty, parentless page (spec.md §4.7: "zeroes
    /// self's item-count and header fields") rather than merely abandoned
    /// with stale contents; fails with `InsufficientSpace` (both pages
    /// unchanged) if the merge doesn't fit.
    pub fn merge_left(
        right: &mut Page,
        left: &mut Page,
        key_schema: &Schema,
        demoted_key: Key,
    ) -> StorageResult<()> {
        let mut entries = Self::live_entries(left, key_schema)?;
        let left_rightmost = PageHeader::new_readonly(left).rightmost_child_readonly()?;
        let left_table = left.page_id().table_id;
        entries.push(Entry {
            key: demoted_key,
            child: PageId::new(left_table, left_rightmost),
        });
        entries.extend(Self::live_entries(right, key_schema)?);
        let right_rightmost = PageHeader::new_readonly(right).rightmost_child_readonly()?;
        Self::rebuild(left, key_schema, entries, right_rightmost)?;
        SlottedPage::initialize(right, PageType::Internal)
    }

    fn rebuild(
        page: &mut Page,
        key_schema: &Schema,
        entries: Vec<Entry>,
        rightmost_child: i32,
    ) -> StorageResult<()> {
        let parent_index = PageHeader::new(page).parent_index()?;
        Self::rebuild_with_links(page, key_schema, entries, rightmost_child, parent_index)
    }

    fn rebuild_with_links(
        page: &mut Page,
        key_schema: &Schema,
        entries: Vec<Entry>,
        rightmost_child: i32,
        parent_index: i32,
    ) -> StorageResult<()> {
        let encoded: Vec<Vec<u8>> = entries
            .iter()
            .map(|e| Self::encode_entry(key_schema, e))
            .collect::<StorageResult<_>>()?;
        Self::rebuild_encoded(page, &encoded, rightmost_child, parent_index)
    }

    fn rebuild_encoded(
        page: &mut Page,
        encoded: &[Vec<u8>],
        rightmost_child: i32,
        parent_index: i32,
    ) -> StorageResult<()> {
        let needed: usize = encoded.iter().map(|b| b.len() + SLOT_SIZE).sum();
        let available = PAGE_SIZE - HEADER_SIZE;
        if needed > available {
            return Err(StorageError::InsufficientSpace { needed, available });
        }

        SlottedPage::initialize(page, PageType::Internal)?;
        {
            let mut header = PageHeader::new(page);
            header.set_parent_index(parent_index)?;
            header.set_rightmost_child(rightmost_child)?;
        }
        for (i, bytes) in encoded.iter().enumerate() {
            let inserted = SlottedPage::try_add_item(page, bytes, i as i32)?;
            debug_assert!(inserted, "space was checked above");
        }
        Ok(())
    }

    /// Every child this page routes to, in ascending key order, rightmost
    /// last. Used by the tree algorithm to locate a node's siblings under a
    /// shared parent and to fix up grandchildren's `parent_index` after a
    /// split hands some of them to a new sibling page.
    pub fn child_ids(page: &Page, key_schema: &Schema) -> StorageResult<Vec<PageId>> {
        let mut ids: Vec<PageId> = Self::live_entries(page, key_schema)?
            .into_iter()
            .map(|e| e.child)
            .collect();
        let table_id = page.page_id().table_id;
        ids.push(PageId::new(
            table_id,
            PageHeader::new_readonly(page).rightmost_child_readonly()?,
        ));
        Ok(ids)
    }

    /// Parent-side bookkeeping after `merged_away_child`'s own content has
    /// been folded into `surviving_child` via [`Self::merge_left`]: the
    /// entry/rightmost pointing at `merged_away_child` is dropped, and
    /// `surviving_child`'s entry takes over its upper boundary (or, if
    /// `merged_away_child` was the rightmost, `surviving_child` becomes the
    /// new rightmost and its own now-redundant entry is dropped instead).
    pub fn remove_child_after_merge(
        page: &mut Page,
        key_schema: &Schema,
        merged_away_child: PageId,
        surviving_child: PageId,
    ) -> StorageResult<()> {
        let mut entries = Self::live_entries(page, key_schema)?;
        let rightmost = PageHeader::new_readonly(page).rightmost_child_readonly()?;
        let l_pos = entries
            .iter()
            .position(|e| e.child == surviving_child)
            .ok_or_else(|| {
                StorageError::Corrupt("surviving child has no entry in this internal page".into())
            })?;

        if rightmost == merged_away_child.page_index {
            entries.remove(l_pos);
            Self::rebuild(page, key_schema, entries, surviving_child.page_index)
        } else {
            let r_pos = entries
                .iter()
                .position(|e| e.child == merged_away_child)
                .ok_or_else(|| {
                    StorageError::Corrupt(
                        "merged-away child has no entry in this internal page".into(),
                    )
                })?;
            let right_boundary = entries[r_pos].key.clone();
            entries[l_pos].key = right_boundary;
            entries.remove(r_pos);
            Self::rebuild(page, key_schema, entries, rightmost)
        }
    }

    /// Number of separator keys currently on the page.
    pub fn entry_count(page: &Page) -> StorageResult<i32> {
        SlottedPage::item_count(page)
    }

    /// The boundary key of whichever entry routes to `child`. Used by the
    /// tree algorithm to recover the separator between two siblings before
    /// redistributing or merging them (`child` must not be the page's
    /// rightmost, which carries no boundary key of its own).
    pub fn separator_key_for_child(
        page: &Page,
        key_schema: &Schema,
        child: PageId,
    ) -> StorageResult<Key> {
        let entries = Self::live_entries(page, key_schema)?;
        entries
            .into_iter()
            .find(|e| e.child == child)
            .map(|e| e.key)
            .ok_or_else(|| StorageError::Corrupt("child has no entry in this internal page".into()))
    }

    /// Overwrites the boundary key of whichever entry routes to `child` with
    /// `new_key`, in place. Used after a leaf- or internal-level
    /// redistribute shifts the boundary between two siblings under a shared
    /// parent; `child` must not be the page's rightmost (the rightmost has
    /// no entry/boundary key of its own to update).
    pub fn update_separator_key(
        page: &mut Page,
        key_schema: &Schema,
        child: PageId,
        new_key: Key,
    ) -> StorageResult<()> {
        let mut entries = Self::live_entries(page, key_schema)?;
        let pos = entries
            .iter()
            .position(|e| e.child == child)
            .ok_or_else(|| {
                StorageError::Corrupt("child has no entry in this internal page".into())
            })?;
        entries[pos].key = new_key;
        let rightmost = PageHeader::new_readonly(page).rightmost_child_readonly()?;
        Self::rebuild(page, key_schema, entries, rightmost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType, Value};

    fn key_schema() -> Schema {
        Schema::new(vec![Column::new("id", ColumnType::Int, false)], vec![0])
    }

    fn k(v: i32) -> Key {
        Key(vec![Value::Int(v)])
    }

    fn page_with_entries(entries: &[(i32, i32)], rightmost: i32) -> Page {
        let mut page = Page::new(PageId::new(1, 0));
        BTreeInternalNode::initialize_with_single_child(&mut page, PageId::new(1, rightmost))
            .unwrap();
        for &(key, child) in entries {
            assert!(
                BTreeInternalNode::try_insert(&mut page, &key_schema(), k(key), PageId::new(1, child))
                    .unwrap()
            );
        }
        page
    }

    #[test]
    fn find_child_routes_by_separator() {
        let schema = key_schema();
        let page = page_with_entries(&[(10, 1)], 2);
        assert_eq!(
            BTreeInternalNode::find_child(&page, &schema, &k(5)).unwrap(),
            PageId::new(1, 1)
        );
        assert_eq!(
            BTreeInternalNode::find_child(&page, &schema, &k(10)).unwrap(),
            PageId::new(1, 1),
            "exact separator match routes to the lower (left) child, per spec.md §8 invariant 6"
        );
        assert_eq!(
            BTreeInternalNode::find_child(&page, &schema, &k(15)).unwrap(),
            PageId::new(1, 2)
        );
    }

    #[test]
    fn try_insert_keeps_sorted_order_and_reports_full() {
        let schema = key_schema();
        let mut page = page_with_entries(&[(10, 1)], 2);
        assert!(BTreeInternalNode::try_insert(&mut page, &schema, k(20), PageId::new(1, 3)).unwrap());
        assert_eq!(BTreeInternalNode::entry_count(&page).unwrap(), 2);
        assert_eq!(
            BTreeInternalNode::find_child(&page, &schema, &k(25)).unwrap(),
            PageId::new(1, 3)
        );

        let big_key = Key(vec![Value::Varchar("x".repeat(3000))]);
        let big_schema = Schema::new(vec![Column::new("id", ColumnType::Varchar(4000), false)], vec![0]);
        let mut tiny = page_with_entries(&[], 9);
        loop {
            if !BTreeInternalNode::try_insert(&mut tiny, &big_schema, big_key.clone(), PageId::new(1, 1))
                .unwrap()
            {
                break;
            }
        }
    }

    #[test]
    fn split_and_insert_promotes_median_new_key_between_existing() {
        // S4: A = (100,10),(200,20),(400,40) rightmost=50; insert (300,30).
        let schema = key_schema();
        let mut a = page_with_entries(&[(100, 10), (200, 20), (400, 40)], 50);
        let mut b = Page::new(PageId::new(1, 99));

        let separator =
            BTreeInternalNode::split_and_insert(&mut a, &mut b, &schema, k(300), PageId::new(1, 30))
                .unwrap();
        assert_eq!(separator, k(300));

        assert_eq!(BTreeInternalNode::entry_count(&a).unwrap(), 2);
        assert_eq!(BTreeInternalNode::find_child(&a, &schema, &k(100)).unwrap(), PageId::new(1, 10));
        assert_eq!(BTreeInternalNode::find_child(&a, &schema, &k(200)).unwrap(), PageId::new(1, 20));
        assert_eq!(
            PageHeader::new_readonly(&a).rightmost_child_readonly().unwrap(),
            30
        );

        assert_eq!(BTreeInternalNode::entry_count(&b).unwrap(), 1);
        assert_eq!(BTreeInternalNode::find_child(&b, &schema, &k(400)).unwrap(), PageId::new(1, 40));
        assert_eq!(
            PageHeader::new_readonly(&b).rightmost_child_readonly().unwrap(),
            50
        );
    }

    #[test]
    fn split_and_insert_promotes_median_new_key_smallest() {
        // S5: same pre-state; insert (50, Ptr5) -> separator 200.
        let schema = key_schema();
        let mut a = page_with_entries(&[(100, 10), (200, 20), (400, 40)], 50);
        let mut b = Page::new(PageId::new(1, 99));

        let separator =
            BTreeInternalNode::split_and_insert(&mut a, &mut b, &schema, k(50), PageId::new(1, 5))
                .unwrap();
        assert_eq!(separator, k(200));

        assert_eq!(BTreeInternalNode::entry_count(&a).unwrap(), 2);
        assert_eq!(BTreeInternalNode::find_child(&a, &schema, &k(50)).unwrap(), PageId::new(1, 5));
        assert_eq!(BTreeInternalNode::find_child(&a, &schema, &k(100)).unwrap(), PageId::new(1, 10));
        assert_eq!(
            PageHeader::new_readonly(&a).rightmost_child_readonly().unwrap(),
            20
        );

        assert_eq!(BTreeInternalNode::entry_count(&b).unwrap(), 1);
        assert_eq!(BTreeInternalNode::find_child(&b, &schema, &k(400)).unwrap(), PageId::new(1, 40));
        assert_eq!(
            PageHeader::new_readonly(&b).rightmost_child_readonly().unwrap(),
            50
        );
    }

    #[test]
    fn merge_left_combines_entries_and_empties_right() {
        // S8: left=(100,10) rightmost=20; right=(300,30) rightmost=40;
        // demoted (200,Ptr20). After right.merge_left(left,200,Ptr20):
        // left has (100,10),(200,20),(300,30) rightmost=40; right empty.
        let schema = key_schema();
        let mut left = page_with_entries(&[(100, 10)], 20);
        let mut right = page_with_entries(&[(300, 30)], 40);

        BTreeInternalNode::merge_left(&mut right, &mut left, &schema, k(200)).unwrap();

        assert_eq!(BTreeInternalNode::entry_count(&left).unwrap(), 3);
        assert_eq!(BTreeInternalNode::find_child(&left, &schema, &k(100)).unwrap(), PageId::new(1, 10));
        assert_eq!(BTreeInternalNode::find_child(&left, &schema, &k(200)).unwrap(), PageId::new(1, 20));
        assert_eq!(BTreeInternalNode::find_child(&left, &schema, &k(300)).unwrap(), PageId::new(1, 30));
        assert_eq!(
            PageHeader::new_readonly(&left).rightmost_child_readonly().unwrap(),
            40
        );

        assert_eq!(BTreeInternalNode::entry_count(&right).unwrap(), 0);
    }

    #[test]
    fn remove_child_after_merge_collapses_normal_entry() {
        let schema = key_schema();
        let mut page = page_with_entries(&[(100, 10), (200, 20), (300, 30)], 40);
        // 20 and 30 merged into 20; parent should route up through 300 to
        // child 20 now, with no separate entry for the old 30 boundary.
        BTreeInternalNode::remove_child_after_merge(
            &mut page,
            &schema,
            PageId::new(1, 30),
            PageId::new(1, 20),
        )
        .unwrap();
        assert_eq!(BTreeInternalNode::entry_count(&page).unwrap(), 2);
        assert_eq!(BTreeInternalNode::find_child(&page, &schema, &k(250)).unwrap(), PageId::new(1, 20));
        assert_eq!(BTreeInternalNode::find_child(&page, &schema, &k(300)).unwrap(), PageId::new(1, 20));
        assert_eq!(BTreeInternalNode::find_child(&page, &schema, &k(350)).unwrap(), PageId::new(1, 40));
    }

    #[test]
    fn remove_child_after_merge_collapses_into_rightmost() {
        let schema = key_schema();
        let mut page = page_with_entries(&[(100, 10), (200, 20)], 30);
        // 20 and 30 (rightmost) merged into 20; 20 becomes the new rightmost.
        BTreeInternalNode::remove_child_after_merge(
            &mut page,
            &schema,
            PageId::new(1, 30),
            PageId::new(1, 20),
        )
        .unwrap();
        assert_eq!(BTreeInternalNode::entry_count(&page).unwrap(), 1);
        assert_eq!(
            PageHeader::new_readonly(&page).rightmost_child_readonly().unwrap(),
            20
        );
        assert_eq!(BTreeInternalNode::find_child(&page, &schema, &k(1000)).unwrap(), PageId::new(1, 20));
    }

    #[test]
    fn reassign_child_repoints_rightmost() {
        let schema = key_schema();
        let mut page = page_with_entries(&[(10, 1)], 2);
        BTreeInternalNode::reassign_child(&mut page, &schema, PageId::new(1, 2), PageId::new(1, 99))
            .unwrap();
        assert_eq!(
            BTreeInternalNode::find_child(&page, &schema, &k(50)).unwrap(),
            PageId::new(1, 99)
        );
    }

    #[test]
    fn redistribute_from_left_moves_one_entry_and_reports_grandchild() {
        // left=(100,10),(200,20) rightmost=30; right=(400,40) rightmost=50;
        // separator between them is 300. Left lends its rightmost (30),
        // which becomes right's new first entry bounded by the old
        // separator, and 200 is promoted as the new separator.
        let schema = key_schema();
        let mut left = page_with_entries(&[(100, 10), (200, 20)], 30);
        let mut right = page_with_entries(&[(400, 40)], 50);

        let (new_separator, moved) =
            BTreeInternalNode::redistribute_from_left(&mut left, &mut right, &schema, k(300))
                .unwrap();
        assert_eq!(new_separator, k(200));
        assert_eq!(moved, PageId::new(1, 30));

        assert_eq!(BTreeInternalNode::entry_count(&left).unwrap(), 1);
        assert_eq!(
            PageHeader::new_readonly(&left).rightmost_child_readonly().unwrap(),
            10
        );
        assert_eq!(BTreeInternalNode::entry_count(&right).unwrap(), 2);
        assert_eq!(BTreeInternalNode::find_child(&right, &schema, &k(300)).unwrap(), PageId::new(1, 30));
        assert_eq!(BTreeInternalNode::find_child(&right, &schema, &k(400)).unwrap(), PageId::new(1, 40));
        assert_eq!(
            PageHeader::new_readonly(&right).rightmost_child_readonly().unwrap(),
            50
        );
    }

    #[test]
    fn redistribute_from_right_moves_one_entry_and_reports_grandchild() {
        // left=(100,10) rightmost=20; right=(300,30),(400,40) rightmost=50;
        // separator between them is 200. Right lends its first entry (30),
        // which becomes left's new rightmost, and 300 is promoted.
        let schema = key_schema();
        let mut left = page_with_entries(&[(100, 10)], 20);
        let mut right = page_with_entries(&[(300, 30), (400, 40)], 50);

        let (new_separator, moved) =
            BTreeInternalNode::redistribute_from_right(&mut left, &mut right, &schema, k(200))
                .unwrap();
        assert_eq!(new_separator, k(300));
        assert_eq!(moved, PageId::new(1, 30));

        assert_eq!(BTreeInternalNode::entry_count(&left).unwrap(), 2);
        assert_eq!(BTreeInternalNode::find_child(&left, &schema, &k(100)).unwrap(), PageId::new(1, 10));
        assert_eq!(BTreeInternalNode::find_child(&left, &schema, &k(200)).unwrap(), PageId::new(1, 20));
        assert_eq!(
            PageHeader::new_readonly(&left).rightmost_child_readonly().unwrap(),
            30
        );
        assert_eq!(BTreeInternalNode::entry_count(&right).unwrap(), 1);
        assert_eq!(BTreeInternalNode::find_child(&right, &schema, &k(400)).unwrap(), PageId::new(1, 40));
        assert_eq!(
            PageHeader::new_readonly(&right).rightmost_child_readonly().unwrap(),
            50
        );
    }

    #[test]
    fn update_separator_key_overwrites_in_place() {
        let schema = key_schema();
        let mut page = page_with_entries(&[(100, 10), (200, 20)], 30);
        BTreeInternalNode::update_separator_key(&mut page, &schema, PageId::new(1, 20), k(250))
            .unwrap();
        assert_eq!(BTreeInternalNode::entry_count(&page).unwrap(), 2);
        assert_eq!(BTreeInternalNode::find_child(&page, &schema, &k(225)).unwrap(), PageId::new(1, 10));
        assert_eq!(BTreeInternalNode::find_child(&page, &schema, &k(250)).unwrap(), PageId::new(1, 20));
    }
}
