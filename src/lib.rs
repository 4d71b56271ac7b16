//! Keel - the storage core of a disk-oriented database engine
//!
//! The crate mediates between fixed-size disk pages and in-memory frames,
//! and indexes rows through persistent tree and hash structures built on
//! top of those pages.
//!
//! # Architecture
//!
//! - **Storage layer** (`storage`): page-granular disk I/O
//!   - `DiskManager`: reads and writes numbered pages in the database file
//!   - `DiskScheduler`: background worker feeding the disk manager
//!   - `HeaderPage`: page 0, mapping index names to root page ids
//!
//! - **Buffer pool** (`buffer`): bounded page cache
//!   - `BufferPoolManager`: frame table, on-demand fetch, pin accounting,
//!     dirty write-back on eviction
//!   - `LruReplacer`: least-recently-unpinned eviction policy
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pin + frame latch
//!
//! - **Indexes** (`index`): record-id indexes over buffered pages
//!   - `BPlusTree`: ordered index with latch-coupled descents, node
//!     splitting, and delete-time rebalancing
//!   - `ExtendibleHashTable`: hash index with a dynamically deepening
//!     bucket directory
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keel::buffer::BufferPoolManager;
//! use keel::index::{BPlusTree, IntegerComparator};
//! use keel::storage::disk::DiskManager;
//! use keel::{RecordId, PageId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! // Page 0 is the header; claim it before building indexes
//! drop(bpm.new_page().unwrap());
//!
//! let tree = BPlusTree::new("orders_pk", Arc::clone(&bpm), IntegerComparator, 64, 64).unwrap();
//! tree.insert(42, RecordId::new(PageId::new(3), SlotId::new(0))).unwrap();
//! assert_eq!(tree.get_value(42).unwrap().len(), 1);
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{IndexKey, KeelError, PageId, RecordId, Result, SlotId};
