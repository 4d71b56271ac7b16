use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{IndexKey, RecordId, Result};

use super::btree_page::BPlusTreeNodeRef;

/// Forward iterator over the leaf chain of a B+ tree.
///
/// The iterator keeps the current leaf pinned through a read guard and
/// releases it only after the next leaf has been pinned, so a position
/// stays valid until the iterator advances past it. An exhausted iterator
/// holds no leaf and acts as the end sentinel.
pub struct BPlusTreeIterator {
    bpm: Arc<BufferPoolManager>,
    leaf: Option<ReadPageGuard>,
    index: usize,
}

impl BPlusTreeIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf: ReadPageGuard, index: usize) -> Self {
        Self {
            bpm,
            leaf: Some(leaf),
            index,
        }
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            leaf: None,
            index: 0,
        }
    }

    pub fn is_end(&self) -> bool {
        self.leaf.is_none()
    }

    /// Yields the pair at the current position and advances, following the
    /// next-leaf pointer when the current leaf is exhausted.
    pub fn next(&mut self) -> Result<Option<(IndexKey, RecordId)>> {
        loop {
            let Some(guard) = self.leaf.as_ref() else {
                return Ok(None);
            };

            let (size, next_page_id) = {
                let node = BPlusTreeNodeRef::new(guard.data());
                (node.size(), node.next_page_id())
            };

            if self.index < size {
                let node = BPlusTreeNodeRef::new(guard.data());
                let item = (node.leaf_key_at(self.index), node.record_at(self.index));
                self.index += 1;
                return Ok(Some(item));
            }

            match next_page_id {
                None => {
                    self.leaf = None;
                    return Ok(None);
                }
                Some(page_id) => {
                    // Pin the successor before releasing the current leaf
                    let next_guard = self.bpm.fetch_page_read(page_id)?;
                    self.leaf = Some(next_guard);
                    self.index = 0;
                }
            }
        }
    }
}

impl Iterator for BPlusTreeIterator {
    type Item = Result<(IndexKey, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match BPlusTreeIterator::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
