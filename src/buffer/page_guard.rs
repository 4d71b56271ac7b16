use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolShared;
use super::FrameHeader;

/// RAII guard for read-only access to a page.
///
/// The guard owns one pin on the page and holds the frame's read latch for
/// its lifetime; dropping it releases the latch and unpins the page.
pub struct ReadPageGuard {
    page_id: PageId,
    /// Keeps the frame alive for the 'static data guard below
    _frame: Arc<FrameHeader>,
    shared: Arc<PoolShared>,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The caller must have pinned the page in `frame` and must pass the
    /// pool state that owns the frame, so the frame outlives this guard.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        shared: Arc<PoolShared>,
    ) -> Self {
        let data_guard = frame.data.read();
        // Extend to 'static - the frame is kept alive via the Arc field
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            _frame: frame,
            shared,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the latch before unpinning so the unpin path never waits
        // behind this guard
        self.data_guard.take();
        self.shared.unpin(self.page_id, false);
    }
}

/// RAII guard for read-write access to a page.
///
/// Owns one pin and the frame's write latch. Any call to `data_mut` marks
/// the page dirty; the drop releases the latch and unpins with the
/// accumulated dirty flag.
pub struct WritePageGuard {
    page_id: PageId,
    _frame: Arc<FrameHeader>,
    shared: Arc<PoolShared>,
    is_dirty: bool,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        shared: Arc<PoolShared>,
    ) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            _frame: frame,
            shared,
            is_dirty: false,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Mutable view of the page bytes; marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.shared.unpin(self.page_id, self.is_dirty);
    }
}
