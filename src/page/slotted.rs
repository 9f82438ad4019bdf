//! Slotted page layout: a forward-growing slot directory of `(offset,
//! length)` pairs immediately after the header, and a backward-growing
//! record heap occupying the rest of the page. This replaces the teacher's
//! fixed-slot bitmap-header layout; see spec.md §4.3 and §6 for the layout
//! invariants enforced here.

use crate::error::{StorageError, StorageResult};

use super::header::{PageHeader, HEADER_SIZE};
use super::primitives::Page;

/// On-disk size of one slot directory entry: `i32` offset + `i32` length.
pub const SLOT_SIZE: usize = 8;

/// Sentinel slot offset marking a tombstoned (deleted) slot. `delete_record`
/// zeros a slot in place without shifting or decrementing `item_count`.
/// `SlottedPage` itself never reclaims a tombstoned index — callers that
/// rebuild a page wholesale (see `btree::leaf`/`btree::internal`) simply
/// stop referencing it, and its heap bytes are abandoned along with it (see
/// SPEC_FULL.md Open Question C.1).
const TOMBSTONE_OFFSET: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub offset: i32,
    pub length: i32,
}

impl Slot {
    pub fn is_tombstone(&self) -> bool {
        self.offset == TOMBSTONE_OFFSET
    }
}

fn slot_addr(index: i32) -> i32 {
    HEADER_SIZE as i32 + index * SLOT_SIZE as i32
}

/// Namespace for the static slotted-page operations; these take a `&mut
/// Page` rather than owning one, matching [`PageHeader`]'s borrowed style.
pub struct SlottedPage;

impl SlottedPage {
    /// Resets `page` to an empty slotted page of the given type.
    pub fn initialize(
        page: &mut Page,
        page_type: super::header::PageType,
    ) -> StorageResult<()> {
        PageHeader::new(page).initialize(page_type)
    }

    fn read_slot(page: &Page, index: i32) -> StorageResult<Slot> {
        let addr = slot_addr(index);
        let offset = page.read_i32(addr)?;
        let length = page.read_i32(addr + 4)?;
        Ok(Slot { offset, length })
    }

    fn write_slot(page: &mut Page, index: i32, slot: Slot) -> StorageResult<()> {
        let addr = slot_addr(index);
        page.write_i32(addr, slot.offset)?;
        page.write_i32(addr + 4, slot.length)?;
        Ok(())
    }

    fn check_index(index: i32, item_count: i32) -> StorageResult<()> {
        if index < 0 || index >= item_count {
            return Err(StorageError::IndexOutOfRange { index, item_count });
        }
        Ok(())
    }

    /// Bytes available for a new slot (one fresh directory entry) plus its
    /// record body, given the page's current occupancy.
    pub fn get_free_space(page: &Page) -> StorageResult<usize> {
        let header = PageHeader::new_readonly(page);
        let item_count = header.item_count()?;
        let data_start = header.data_start()?;
        let directory_end = HEADER_SIZE as i32 + item_count * SLOT_SIZE as i32;
        Ok((data_start - directory_end).max(0) as usize)
    }

    /// Inserts `data` at directory position `slot_index`, shifting any
    /// slots at `[slot_index, item_count)` one entry to the right to make
    /// room (spec.md §4.3). `slot_index == item_count` appends. Returns
    /// `Ok(false)` — leaving the page byte-identical to before — iff free
    /// space is insufficient for the new slot plus record; never returns an
    /// error for a full page, matching the spec's boolean contract.
    pub fn try_add_item(page: &mut Page, data: &[u8], slot_index: i32) -> StorageResult<bool> {
        let item_count = PageHeader::new(page).item_count()?;
        Self::check_index(slot_index, item_count + 1)?;
        let data_start = PageHeader::new(page).data_start()?;

        let directory_end = HEADER_SIZE as i32 + (item_count + 1) * SLOT_SIZE as i32;
        let new_data_start = data_start - data.len() as i32;
        if new_data_start < directory_end {
            return Ok(false);
        }

        page.write_bytes(new_data_start, data)?;

        // Shift trailing slots right, starting from the highest index so
        // each write lands on bytes not yet read by a later iteration.
        for i in (slot_index..item_count).rev() {
            let slot = Self::read_slot(page, i)?;
            Self::write_slot(page, i + 1, slot)?;
        }
        Self::write_slot(
            page,
            slot_index,
            Slot {
                offset: new_data_start,
                length: data.len() as i32,
            },
        )?;

        let mut header = PageHeader::new(page);
        header.set_item_count(item_count + 1)?;
        header.set_data_start(new_data_start)?;
        Ok(true)
    }

    /// Reads the record bytes stored at `index`. A tombstoned slot yields an
    /// empty span rather than an error, so callers that walk every slot
    /// index don't need a separate tombstone check before reading.
    pub fn get_record<'a>(page: &'a Page, index: i32) -> StorageResult<&'a [u8]> {
        let item_count = PageHeader::new_readonly(page).item_count()?;
        Self::check_index(index, item_count)?;
        let slot = Self::read_slot(page, index)?;
        if slot.is_tombstone() {
            return Ok(&[]);
        }
        page.get_readonly_span(slot.offset, slot.length as usize)
    }

    /// Returns the slot descriptor at `index` without reading the record
    /// body, so a caller can check `is_tombstone` before fetching.
    pub fn slot_at(page: &Page, index: i32) -> StorageResult<Slot> {
        let item_count = PageHeader::new_readonly(page).item_count()?;
        Self::check_index(index, item_count)?;
        Self::read_slot(page, index)
    }

    /// Tombstones the slot at `index`. The slot index stays occupied
    /// (`item_count` is never decremented) so later reuse can find it via
    /// [`Self::try_add_item`]; the heap bytes it pointed at are abandoned.
    pub fn delete_record(page: &mut Page, index: i32) -> StorageResult<()> {
        let item_count = PageHeader::new(page).item_count()?;
        Self::check_index(index, item_count)?;
        Self::write_slot(
            page,
            index,
            Slot {
                offset: TOMBSTONE_OFFSET,
                length: 0,
            },
        )
    }

    pub fn item_count(page: &Page) -> StorageResult<i32> {
        PageHeader::new_readonly(page).item_count()
    }
}

impl<'a> PageHeader<'a> {
    /// Read-only variant usable with a shared reference, for code paths
    /// that only inspect the header without borrowing the page mutably.
    pub fn new_readonly(page: &'a Page) -> ReadOnlyHeader<'a> {
        ReadOnlyHeader { page }
    }
}

/// A read-only counterpart to [`PageHeader`] for call sites holding only a
/// shared `&Page`.
pub struct ReadOnlyHeader<'a> {
    page: &'a Page,
}

impl<'a> ReadOnlyHeader<'a> {
    pub fn item_count(&self) -> StorageResult<i32> {
        self.page.read_i32(super::header::OFF_ITEM_COUNT)
    }

    pub fn data_start(&self) -> StorageResult<i32> {
        self.page.read_i32(super::header::OFF_DATA_START)
    }

    pub fn page_type_readonly(&self) -> StorageResult<super::header::PageType> {
        let byte = self.page.read_i32(super::header::OFF_PAGE_TYPE)? as u8;
        super::header::PageType::from_byte(byte)
    }

    pub fn parent_index_readonly(&self) -> StorageResult<i32> {
        self.page.read_i32(super::header::OFF_PARENT_INDEX)
    }

    /// Leaf pages only: mirrors [`PageHeader::next_leaf`].
    pub fn next_leaf_readonly(&self) -> StorageResult<i32> {
        self.page.read_i32(super::header::OFF_SIBLING_OR_RIGHTMOST)
    }

    /// Leaf pages only: mirrors [`PageHeader::prev_leaf`].
    pub fn prev_leaf_readonly(&self) -> StorageResult<i32> {
        self.page.read_i32(super::header::OFF_PREV_LEAF)
    }

    /// Internal pages only: mirrors [`PageHeader::rightmost_child`] for
    /// callers holding just a shared `&Page`.
    pub fn rightmost_child_readonly(&self) -> StorageResult<i32> {
        self.page.read_i32(super::header::OFF_SIBLING_OR_RIGHTMOST)
    }
}

#[cfg(test)]
mod tests {
    use super::super::header::PageType;
    use super::super::page_id::PageId;
    use super::*;

    fn fresh_leaf() -> Page {
        let mut page = Page::new(PageId::new(1, 0));
        SlottedPage::initialize(&mut page, PageType::Leaf).unwrap();
        page
    }

    #[test]
    fn add_and_read_round_trips() {
        let mut page = fresh_leaf();
        assert!(SlottedPage::try_add_item(&mut page, b"hello", 0).unwrap());
        assert!(SlottedPage::try_add_item(&mut page, b"world!!", 1).unwrap());
        assert_eq!(SlottedPage::get_record(&page, 0).unwrap(), b"hello");
        assert_eq!(SlottedPage::get_record(&page, 1).unwrap(), b"world!!");
        assert_eq!(SlottedPage::item_count(&page).unwrap(), 2);
    }

    #[test]
    fn insert_shifts_trailing_slots_right() {
        let mut page = fresh_leaf();
        assert!(SlottedPage::try_add_item(&mut page, b"a", 0).unwrap());
        assert!(SlottedPage::try_add_item(&mut page, b"c", 1).unwrap());
        // Insert "b" between the two existing slots.
        assert!(SlottedPage::try_add_item(&mut page, b"b", 1).unwrap());
        assert_eq!(SlottedPage::get_record(&page, 0).unwrap(), b"a");
        assert_eq!(SlottedPage::get_record(&page, 1).unwrap(), b"b");
        assert_eq!(SlottedPage::get_record(&page, 2).unwrap(), b"c");
        assert_eq!(SlottedPage::item_count(&page).unwrap(), 3);
    }

    #[test]
    fn delete_tombstones_without_decrementing_item_count() {
        let mut page = fresh_leaf();
        assert!(SlottedPage::try_add_item(&mut page, b"doomed", 0).unwrap());
        SlottedPage::delete_record(&mut page, 0).unwrap();
        assert_eq!(SlottedPage::item_count(&page).unwrap(), 1);
        assert!(SlottedPage::slot_at(&page, 0).unwrap().is_tombstone());
        assert_eq!(SlottedPage::get_record(&page, 0).unwrap(), b"" as &[u8]);
    }

    #[test]
    fn insert_out_of_space_is_rejected_without_error() {
        let mut page = fresh_leaf();
        let before = *page.as_bytes();
        let big = vec![0u8; super::super::primitives::PAGE_SIZE];
        assert_eq!(SlottedPage::try_add_item(&mut page, &big, 0).unwrap(), false);
        assert_eq!(
            *page.as_bytes(),
            before,
            "a rejected insert must leave the page byte-identical"
        );
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let page = fresh_leaf();
        assert!(matches!(
            SlottedPage::get_record(&page, 0),
            Err(StorageError::IndexOutOfRange { .. })
        ));
    }
}
