use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Page ID of the header page recording index roots
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Serialized size of an index key (u32)
pub const KEY_SIZE: usize = 4;

/// Serialized size of a RecordId: PageId (4) + SlotId (2)
pub const RECORD_ID_SIZE: usize = 6;

/// Number of directory slots in an extendible hash directory page.
/// The directory grows in powers of two, so 512 is the largest count that
/// leaves room for the global depth and the per-slot local depths.
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

/// Number of (key, record-id) slots in a hash bucket page. Each slot costs
/// its pair size plus two bitmap bits, hence 4*PAGE / (4*pair + 1).
pub const BUCKET_ARRAY_SIZE: usize = 4 * PAGE_SIZE / (4 * (KEY_SIZE + RECORD_ID_SIZE) + 1);
