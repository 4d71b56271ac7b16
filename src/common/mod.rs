pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::{KeelError, Result};
pub use types::{FrameId, IndexKey, Lsn, PageId, RecordId, SlotId};
