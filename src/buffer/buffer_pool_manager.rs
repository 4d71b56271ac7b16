use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::common::{FrameId, KeelError, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruReplacer, ReadPageGuard, WritePageGuard};

/// Page table and free list, guarded together by one mutex. Disk I/O for
/// fetch and eviction happens inside this critical section, which keeps the
/// "at most one frame per page" invariant without an in-progress marker.
struct PoolCore {
    /// Maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page
    free_list: VecDeque<FrameId>,
}

/// State shared between the manager and its page guards.
pub(crate) struct PoolShared {
    frames: Vec<Arc<FrameHeader>>,
    core: Mutex<PoolCore>,
    replacer: LruReplacer,
}

impl PoolShared {
    /// Decrements the pin count of a resident page, ORs in the dirty flag,
    /// and hands the frame to the replacer when the count reaches zero.
    /// Returns false when the page is not resident or was not pinned.
    pub(crate) fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let core = self.core.lock();
        let Some(&frame_id) = core.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            None => {
                debug_assert!(false, "unpin of page {} with zero pin count", page_id);
                false
            }
            Some(0) => {
                self.replacer.unpin(frame_id);
                true
            }
            Some(_) => true,
        }
    }
}

/// BufferPoolManager mediates between disk pages and in-memory frames. It
/// owns a fixed array of frames, fetches pages on demand, evicts
/// least-recently-unpinned pages when the pool is full, and writes dirty
/// pages back before their frames are reused.
///
/// Page-id allocation may be sharded across parallel instances: instance
/// `k` of `N` issues ids `k, k+N, k+2N, ...`.
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    next_page_id: AtomicU32,
    shared: Arc<PoolShared>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a stand-alone buffer pool.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::new_with_instances(pool_size, 1, 0, disk_manager)
    }

    /// Creates one instance of a parallel buffer pool. `instance_index`
    /// must be below `num_instances`; the instance only issues page ids
    /// congruent to its index modulo `num_instances`.
    pub fn new_with_instances(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "parallel pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index must be below the instance count"
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            next_page_id: AtomicU32::new(instance_index),
            shared: Arc::new(PoolShared {
                frames,
                core: Mutex::new(PoolCore {
                    page_table: HashMap::new(),
                    free_list,
                }),
                replacer: LruReplacer::new(pool_size),
            }),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page id for this instance.
    fn allocate_page(&self) -> PageId {
        let id = self.next_page_id.fetch_add(self.num_instances, Ordering::SeqCst);
        debug_assert_eq!(id % self.num_instances, self.instance_index);
        PageId::new(id)
    }

    /// Takes a usable frame: from the free list first, otherwise by
    /// evicting the replacer's victim (writing it back when dirty).
    /// Fails with PoolExhausted when every frame is pinned.
    fn take_free_frame(&self, core: &mut PoolCore) -> Result<FrameId> {
        if let Some(frame_id) = core.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .shared
            .replacer
            .victim()
            .ok_or(KeelError::PoolExhausted)?;
        let frame = &self.shared.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();
        let was_dirty = frame.is_dirty();

        // Victim frames have pin count zero, so the data latch is free.
        let mut data = [0u8; PAGE_SIZE];
        if was_dirty {
            frame.copy_to(&mut data);
        }
        core.page_table.remove(&old_page_id);
        frame.reset();

        if was_dirty {
            trace!("evicting dirty page {} from frame {}", old_page_id, frame_id);
            if let Err(e) = self.disk_scheduler.schedule_write_sync(old_page_id, &data) {
                core.free_list.push_back(frame_id);
                return Err(e);
            }
        }

        Ok(frame_id)
    }

    /// Pins the page into a frame, loading it from disk on a miss.
    fn pin_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if page_id == INVALID_PAGE_ID {
            return Err(KeelError::InvalidPageId(page_id));
        }

        let mut core = self.shared.core.lock();

        if let Some(&frame_id) = core.page_table.get(&page_id) {
            let frame = Arc::clone(&self.shared.frames[frame_id.as_usize()]);
            frame.pin();
            self.shared.replacer.pin(frame_id);
            return Ok(frame);
        }

        let frame_id = self.take_free_frame(&mut core)?;
        let frame = Arc::clone(&self.shared.frames[frame_id.as_usize()]);

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut data) {
            core.free_list.push_back(frame_id);
            return Err(e);
        }
        frame.copy_from(&data);
        frame.set_page_id(page_id);
        frame.pin();
        core.page_table.insert(page_id, frame_id);

        Ok(frame)
    }

    /// Fetches a page for shared access. The returned guard owns one pin.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.pin_page(page_id)?;
        Ok(unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.shared)) })
    }

    /// Fetches a page for exclusive access. The returned guard owns one pin.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.pin_page(page_id)?;
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.shared)) })
    }

    /// Allocates a new page id, installs it into a zeroed frame pinned once,
    /// and returns a write guard over it. Fails with PoolExhausted when the
    /// pool is fully pinned.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let mut core = self.shared.core.lock();
        let frame_id = self.take_free_frame(&mut core)?;
        let page_id = self.allocate_page();

        let frame = Arc::clone(&self.shared.frames[frame_id.as_usize()]);
        frame.set_page_id(page_id);
        frame.pin();
        core.page_table.insert(page_id, frame_id);
        drop(core);

        debug!("allocated page {} in frame {}", page_id, frame_id);
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.shared)) })
    }

    /// Decrements the pin count of a resident page, ORing in the dirty
    /// flag. Returns false when the page is not resident or its pin count
    /// was already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.shared.unpin(page_id, is_dirty)
    }

    /// Writes the page's current bytes to disk, regardless of the dirty
    /// flag, which stays as it is. Returns false when the page is not
    /// resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        // Snapshot the frame under the core mutex, then latch outside of it
        // so a writer holding the frame latch cannot deadlock against us.
        let frame = {
            let core = self.shared.core.lock();
            match core.page_table.get(&page_id) {
                Some(&frame_id) => Arc::clone(&self.shared.frames[frame_id.as_usize()]),
                None => return Ok(false),
            }
        };

        let mut data = [0u8; PAGE_SIZE];
        {
            let guard = frame.read_data();
            if frame.page_id() != page_id {
                // Evicted between the snapshot and the latch
                return Ok(false);
            }
            data.copy_from_slice(&guard[..]);
        }
        self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        Ok(true)
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = {
            let core = self.shared.core.lock();
            core.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Removes a page from the pool and informs the disk allocator.
    /// Returns true when the page is not resident, false when it is still
    /// pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut core = self.shared.core.lock();
        let Some(&frame_id) = core.page_table.get(&page_id) else {
            return Ok(true);
        };

        let frame = &self.shared.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        core.page_table.remove(&page_id);
        self.shared.replacer.pin(frame_id);
        frame.reset();
        core.free_list.push_back(frame_id);
        self.disk_scheduler.disk_manager().deallocate_page(page_id);
        Ok(true)
    }

    /// Returns the pin count of a resident page.
    pub fn pin_count_of(&self, page_id: PageId) -> Option<u32> {
        let core = self.shared.core.lock();
        core.page_table
            .get(&page_id)
            .map(|&frame_id| self.shared.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.shared.core.lock().free_list.len()
    }

    pub fn evictable_count(&self) -> usize {
        self.shared.replacer.size()
    }
}
