//! In-memory cache of fixed-size pages, backed by [`crate::disk_manager::DiskManager`].
//!
//! Grounded on the teacher's `btree/buffer_pool.rs` (a page-table `HashMap`
//! keyed by page id, one bucket per page category) but reworked for the
//! spec's requirements: a single cache across all page types, bounded
//! capacity with Clock/second-chance eviction instead of unbounded growth,
//! explicit pin counts instead of `Rc<RefCell<_>>` sharing, and async I/O
//! instead of a process-wide `static mut` singleton.
//!
//! Concurrency is a single coarse `tokio::sync::Mutex<PoolState>` guarding
//! both the page table and the frame bytes; disk I/O runs with the mutex
//! held across the `.await` (legal — `tokio::sync::MutexGuard` is `Send`).
//! This trades per-frame I/O concurrency for a simple, obviously-correct
//! implementation; see DESIGN.md for the tradeoff.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::config::BufferPoolManagerOptions;
use crate::disk_manager::DiskManager;
use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PageId};

struct Frame {
    page: Page,
    pin_count: u32,
    is_dirty: bool,
    /// Clock/second-chance reference bit, set on every access and cleared
    /// the first time the clock hand passes over it looking for a victim.
    referenced: bool,
}

struct PoolState {
    frames: Vec<Option<Frame>>,
    page_table: HashMap<PageId, usize>,
    clock_hand: usize,
}

impl PoolState {
    fn find_victim(&mut self) -> Option<usize> {
        let n = self.frames.len();
        for _ in 0..2 * n {
            let i = self.clock_hand;
            self.clock_hand = (self.clock_hand + 1) % n;
            match &mut self.frames[i] {
                Some(frame) if frame.pin_count == 0 => {
                    if frame.referenced {
                        frame.referenced = false;
                        continue;
                    }
                    return Some(i);
                }
                None => return Some(i),
                _ => continue,
            }
        }
        None
    }
}

pub struct BufferPoolManager {
    state: Mutex<PoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(options: BufferPoolManagerOptions, disk_manager: Arc<DiskManager>) -> Arc<Self> {
        let mut frames = Vec::with_capacity(options.pool_size_in_pages);
        frames.resize_with(options.pool_size_in_pages, || None);
        Arc::new(Self {
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::new(),
                clock_hand: 0,
            }),
            disk_manager,
        })
    }

    /// Loads `page_id` into the pool (reading from disk if not already
    /// resident) and returns a pin on it.
    pub async fn fetch_page(self: &Arc<Self>, page_id: PageId) -> StorageResult<PinnedPage> {
        let mut state = self.state.lock().await;
        if let Some(&index) = state.page_table.get(&page_id) {
            let frame = state.frames[index].as_mut().unwrap();
            frame.pin_count += 1;
            frame.referenced = true;
            debug!("fetch_page: {page_id:?} already resident at frame {index}");
            return Ok(PinnedPage::new(self.clone(), index, page_id));
        }

        let index = self.evict_locked(&mut state).await?;
        drop(state);

        let page = self.disk_manager.read_page(page_id).await?;

        let mut state = self.state.lock().await;
        state.frames[index] = Some(Frame {
            page,
            pin_count: 1,
            is_dirty: false,
            referenced: true,
        });
        state.page_table.insert(page_id, index);
        debug!("fetch_page: {page_id:?} loaded into frame {index}");
        Ok(PinnedPage::new(self.clone(), index, page_id))
    }

    /// Allocates a new page on disk for `table_id`, installs it in the pool
    /// already initialized to all zero bytes, and returns a pin on it.
    pub async fn create_page(self: &Arc<Self>, table_id: i32) -> StorageResult<PinnedPage> {
        let page_id = self.disk_manager.allocate_page(table_id).await?;

        let mut state = self.state.lock().await;
        let index = self.evict_locked(&mut state).await?;
        state.frames[index] = Some(Frame {
            page: Page::new(page_id),
            pin_count: 1,
            is_dirty: true,
            referenced: true,
        });
        state.page_table.insert(page_id, index);
        info!("create_page: allocated {page_id:?} in frame {index}");
        Ok(PinnedPage::new(self.clone(), index, page_id))
    }

    /// Evicts a frame to make room for a new resident page. Must be called
    /// with `state` locked; flushes the victim first if it is dirty, so
    /// eviction never silently drops unwritten data, per spec.md §4.6. Fails
    /// fast with `BufferPoolFull` rather than blocking for a frame to free
    /// up, per spec.md §5. Holds `state` locked across the flush's `.await`,
    /// trading per-frame I/O concurrency for a pool that is never observed
    /// in a half-evicted state (see DESIGN.md).
    async fn evict_locked(&self, state: &mut PoolState) -> StorageResult<usize> {
        let index = state.find_victim().ok_or_else(|| {
            warn!("buffer pool full: every frame is pinned, cannot evict a victim");
            StorageError::BufferPoolFull
        })?;
        if let Some(old) = &state.frames[index] {
            if old.is_dirty {
                debug!(
                    "evicting dirty frame {index} ({:?}): flushing before reuse",
                    old.page.page_id()
                );
                self.disk_manager.write_page(&old.page).await?;
            }
        }
        if let Some(old) = state.frames[index].take() {
            state.page_table.remove(&old.page.page_id());
        }
        Ok(index)
    }

    async fn unpin(&self, frame_index: usize, is_dirty: bool) {
        let mut state = self.state.lock().await;
        if let Some(frame) = state.frames[frame_index].as_mut() {
            frame.pin_count = frame.pin_count.saturating_sub(1);
            frame.is_dirty |= is_dirty;
        }
    }

    /// Writes a resident page back to disk if it is dirty; no-op if the
    /// page is not currently in the pool.
    pub async fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        let index = match state.page_table.get(&page_id) {
            Some(&i) => i,
            None => return Ok(()),
        };
        let frame = state.frames[index].as_mut().unwrap();
        if !frame.is_dirty {
            return Ok(());
        }
        let page_bytes = Page::from_bytes(page_id, *frame.page.as_bytes());
        frame.is_dirty = false;
        drop(state);
        self.disk_manager.write_page(&page_bytes).await
    }

    /// Flushes every dirty resident page.
    pub async fn flush_all(&self) -> StorageResult<()> {
        let page_ids: Vec<PageId> = {
            let state = self.state.lock().await;
            state.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id).await?;
        }
        Ok(())
    }

    /// Flushes all dirty pages and releases the pool. Named to match the
    /// crate's async shutdown convention (see `StorageEngine::dispose_async`).
    pub async fn dispose_async(&self) -> StorageResult<()> {
        self.flush_all().await
    }

    /// Mutates two distinct resident pages under one lock acquisition.
    /// Needed for operations like a B+Tree node split that must write both
    /// halves as a single atomic step: two sequential [`PinnedPage::write`]
    /// calls would each take and release the pool mutex independently,
    /// which is safe but not atomic across the pair. Panics if `a` and `b`
    /// name the same frame.
    pub async fn write_pair<F, R>(&self, a: &PinnedPage, b: &PinnedPage, f: F) -> R
    where
        F: FnOnce(&mut Page, &mut Page) -> R,
    {
        assert_ne!(
            a.frame_index, b.frame_index,
            "write_pair requires two distinct pages"
        );
        let mut state = self.state.lock().await;
        let (lo, hi) = if a.frame_index < b.frame_index {
            (a.frame_index, b.frame_index)
        } else {
            (b.frame_index, a.frame_index)
        };
        let (left, right) = state.frames.split_at_mut(hi);
        let frame_lo = left[lo].as_mut().expect("pinned frame must stay resident");
        let frame_hi = right[0].as_mut().expect("pinned frame must stay resident");
        let (page_a, page_b) = if a.frame_index < b.frame_index {
            (&mut frame_lo.page, &mut frame_hi.page)
        } else {
            (&mut frame_hi.page, &mut frame_lo.page)
        };
        let result = f(page_a, page_b);
        frame_lo.is_dirty = true;
        frame_hi.is_dirty = true;
        result
    }

    #[cfg(test)]
    pub(crate) fn frame_count(&self) -> usize {
        // Only used by tests; reading the length doesn't need the lock
        // since `frames` is never resized after construction.
        self.state.try_lock().map(|s| s.frames.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) async fn occupied_count(&self) -> usize {
        let state = self.state.lock().await;
        state.frames.iter().filter(|f| f.is_some()).count()
    }
}

/// RAII guard over a pinned, resident page. The pin is released either
/// explicitly via [`PinnedPage::unpin`] or, failing that, on drop as a
/// best-effort safety net (Rust's `Drop` cannot `.await`, so the drop path
/// uses `try_lock` and may fail to run under contention — callers should
/// always prefer explicit `unpin`).
pub struct PinnedPage {
    pool: Arc<BufferPoolManager>,
    frame_index: usize,
    page_id: PageId,
    released: bool,
}

impl PinnedPage {
    fn new(pool: Arc<BufferPoolManager>, frame_index: usize, page_id: PageId) -> Self {
        Self {
            pool,
            frame_index,
            page_id,
            released: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Page) -> R,
    {
        let state = self.pool.state.lock().await;
        let frame = state.frames[self.frame_index]
            .as_ref()
            .expect("pinned frame must stay resident while pinned");
        f(&frame.page)
    }

    pub async fn write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Page) -> R,
    {
        let mut state = self.pool.state.lock().await;
        let frame = state.frames[self.frame_index]
            .as_mut()
            .expect("pinned frame must stay resident while pinned");
        let result = f(&mut frame.page);
        frame.is_dirty = true;
        result
    }

    /// Releases the pin. `is_dirty` marks the page dirty in addition to
    /// whatever `write` calls already recorded; pass `false` if this
    /// operation only read the page.
    pub async fn unpin(mut self, is_dirty: bool) {
        self.pool.unpin(self.frame_index, is_dirty).await;
        self.released = true;
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(mut state) = self.pool.state.try_lock() {
            if let Some(frame) = state.frames[self.frame_index].as_mut() {
                frame.pin_count = frame.pin_count.saturating_sub(1);
            }
        } else {
            warn!(
                "PinnedPage for {:?} dropped without explicit unpin while the pool was locked; \
                 pin count may leak",
                self.page_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiskManagerConfig;
    use crate::fs::memory::InMemoryFileSystem;
    use crate::page::{PageType, SlottedPage};

    fn pool(size: usize) -> Arc<BufferPoolManager> {
        let dm = Arc::new(DiskManager::new(
            DiskManagerConfig::new("/tmp/unused"),
            Arc::new(InMemoryFileSystem::default()),
        ));
        BufferPoolManager::new(BufferPoolManagerOptions::new(size), dm)
    }

    #[tokio::test]
    async fn create_then_fetch_round_trips_through_eviction() {
        let pool = pool(1);
        let pinned = pool.create_page(1).await.unwrap();
        let page_id = pinned.page_id();
        pinned
            .write(|page| SlottedPage::initialize(page, PageType::Leaf).unwrap())
            .await;
        pinned.unpin(true).await;

        // Force eviction of the only frame by fetching a different page.
        let other = pool.create_page(2).await.unwrap();
        other.unpin(false).await;

        let refetched = pool.fetch_page(page_id).await.unwrap();
        let item_count = refetched
            .read(|page| SlottedPage::item_count(page).unwrap())
            .await;
        assert_eq!(item_count, 0);
        refetched.unpin(false).await;
    }

    #[tokio::test]
    async fn pool_full_when_all_frames_pinned() {
        let pool = pool(1);
        let pinned = pool.create_page(1).await.unwrap();
        let err = pool.create_page(2).await.unwrap_err();
        assert!(matches!(err, StorageError::BufferPoolFull));
        pinned.unpin(false).await;
    }

    #[tokio::test]
    async fn unpin_allows_subsequent_eviction() {
        let pool = pool(1);
        let first = pool.create_page(1).await.unwrap();
        first.unpin(false).await;
        // Should succeed now that the only frame is unpinned.
        let second = pool.create_page(2).await.unwrap();
        second.unpin(false).await;
    }

    #[tokio::test]
    async fn flush_page_clears_dirty_bit() {
        let pool = pool(1);
        let pinned = pool.create_page(1).await.unwrap();
        let page_id = pinned.page_id();
        pinned
            .write(|page| SlottedPage::initialize(page, PageType::Leaf).unwrap())
            .await;
        pinned.unpin(true).await;
        pool.flush_page(page_id).await.unwrap();
        // Flushing twice is a no-op, not an error.
        pool.flush_page(page_id).await.unwrap();
    }
}
