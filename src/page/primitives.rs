use crate::error::{StorageError, StorageResult};

use super::page_id::PageId;

/// Fixed size of every on-disk page, per spec.md §3.
pub const PAGE_SIZE: usize = 8192;

/// A single fixed-size page: one owner of one byte buffer, plus its
/// identity. All multi-byte integers on disk are little-endian.
pub struct Page {
    page_id: PageId,
    bytes: [u8; PAGE_SIZE],
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            bytes: [0u8; PAGE_SIZE],
        }
    }

    pub fn from_bytes(page_id: PageId, bytes: [u8; PAGE_SIZE]) -> Self {
        Self { page_id, bytes }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.bytes
    }

    fn check_bounds(&self, offset: i32, size: usize) -> StorageResult<usize> {
        if offset < 0 || (offset as usize) + size > PAGE_SIZE {
            return Err(StorageError::InvalidOffset {
                offset,
                size,
                page_size: PAGE_SIZE,
            });
        }
        Ok(offset as usize)
    }

    pub fn read_i32(&self, offset: i32) -> StorageResult<i32> {
        let start = self.check_bounds(offset, 4)?;
        let bytes: [u8; 4] = self.bytes[start..start + 4].try_into().unwrap();
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn write_i32(&mut self, offset: i32, value: i32) -> StorageResult<()> {
        let start = self.check_bounds(offset, 4)?;
        self.bytes[start..start + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_i64(&self, offset: i32) -> StorageResult<i64> {
        let start = self.check_bounds(offset, 8)?;
        let bytes: [u8; 8] = self.bytes[start..start + 8].try_into().unwrap();
        Ok(i64::from_le_bytes(bytes))
    }

    pub fn write_i64(&mut self, offset: i32, value: i64) -> StorageResult<()> {
        let start = self.check_bounds(offset, 8)?;
        self.bytes[start..start + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// `DateTime` round-trips through an i64 "binary" form (spec.md §4.1
    /// leaves the exact encoding to the implementer; see SPEC_FULL.md §C.2
    /// for the chosen representation of the related `Decimal` type).
    pub fn write_datetime(&mut self, offset: i32, value: i64) -> StorageResult<()> {
        self.write_i64(offset, value)
    }

    pub fn read_datetime(&self, offset: i32) -> StorageResult<i64> {
        self.read_i64(offset)
    }

    pub fn get_span(&mut self, offset: i32, length: usize) -> StorageResult<&mut [u8]> {
        let start = self.check_bounds(offset, length)?;
        Ok(&mut self.bytes[start..start + length])
    }

    pub fn get_readonly_span(&self, offset: i32, length: usize) -> StorageResult<&[u8]> {
        let start = self.check_bounds(offset, length)?;
        Ok(&self.bytes[start..start + length])
    }

    pub fn write_bytes(&mut self, offset: i32, data: &[u8]) -> StorageResult<()> {
        let span = self.get_span(offset, data.len())?;
        span.copy_from_slice(data);
        Ok(())
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Page {{ page_id: {:?}, header: {} }}",
            self.page_id,
            hex::encode(&self.bytes[..super::header::HEADER_SIZE])
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Page {
        Page::new(PageId::new(1, 0))
    }

    #[test]
    fn i32_round_trip() {
        let mut p = page();
        for (offset, value) in [(0, 0i32), (4, -1), (100, i32::MAX), (200, i32::MIN)] {
            p.write_i32(offset, value).unwrap();
            assert_eq!(p.read_i32(offset).unwrap(), value);
            let start = offset as usize;
            assert_eq!(
                &p.as_bytes()[start..start + 4],
                &value.to_le_bytes(),
                "bytes at offset {offset} must be little-endian"
            );
        }
    }

    #[test]
    fn i64_round_trip() {
        let mut p = page();
        for (offset, value) in [(0, 0i64), (8, -1), (1000, i64::MAX), (2000, i64::MIN)] {
            p.write_i64(offset, value).unwrap();
            assert_eq!(p.read_i64(offset).unwrap(), value);
            let start = offset as usize;
            assert_eq!(&p.as_bytes()[start..start + 8], &value.to_le_bytes());
        }
    }

    #[test]
    fn negative_offset_rejected() {
        let mut p = page();
        assert!(matches!(
            p.write_i32(-1, 5),
            Err(StorageError::InvalidOffset { .. })
        ));
    }

    #[test]
    fn offset_beyond_page_rejected() {
        let p = page();
        assert!(matches!(
            p.read_i32(PAGE_SIZE as i32 - 3),
            Err(StorageError::InvalidOffset { .. })
        ));
    }

    #[test]
    fn offset_exactly_at_boundary_is_valid() {
        let mut p = page();
        let offset = (PAGE_SIZE - 4) as i32;
        p.write_i32(offset, 42).unwrap();
        assert_eq!(p.read_i32(offset).unwrap(), 42);
    }
}
