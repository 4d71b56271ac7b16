use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{IndexKey, PageId, RecordId, Result, BUCKET_ARRAY_SIZE};

use super::hash_table_page::{
    HashTableBucketPage, HashTableBucketPageRef, HashTableDirectoryPage,
    HashTableDirectoryPageRef,
};
use super::key_hasher::KeyHasher;

/// Extendible hash index mapping keys to record ids.
///
/// A single directory page addresses bucket pages by the low
/// `global_depth` bits of the key's 32-bit fingerprint. Buckets split and
/// the directory doubles as they fill; emptied buckets merge with their
/// split image and the directory halves when no bucket uses its top bit.
/// One table-level reader/writer latch covers all operations; lookups take
/// it shared, mutations exclusive.
pub struct ExtendibleHashTable<H: KeyHasher> {
    directory_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    hasher: H,
    bucket_capacity: usize,
    table_latch: RwLock<()>,
}

impl<H: KeyHasher> ExtendibleHashTable<H> {
    /// Creates a table with full-page buckets.
    pub fn new(bpm: Arc<BufferPoolManager>, hasher: H) -> Result<Self> {
        Self::with_bucket_capacity(bpm, hasher, BUCKET_ARRAY_SIZE)
    }

    /// Creates a table with the given number of slots per bucket. Small
    /// capacities force early splits, which tests rely on.
    pub fn with_bucket_capacity(
        bpm: Arc<BufferPoolManager>,
        hasher: H,
        bucket_capacity: usize,
    ) -> Result<Self> {
        assert!(bucket_capacity > 0 && bucket_capacity <= BUCKET_ARRAY_SIZE);

        let mut dir_guard = bpm.new_page()?;
        let directory_page_id = dir_guard.page_id();
        let bucket_page_id = {
            let bucket_guard = bpm.new_page()?;
            bucket_guard.page_id()
            // A zeroed page is a valid empty bucket
        };
        {
            let mut dir = HashTableDirectoryPage::new(dir_guard.data_mut());
            dir.init();
            dir.set_bucket_page_id(0, bucket_page_id);
            dir.set_local_depth(0, 0);
        }

        Ok(Self {
            directory_page_id,
            bpm,
            hasher,
            bucket_capacity,
            table_latch: RwLock::new(()),
        })
    }

    /// All live records stored under the key.
    pub fn get_value(&self, key: IndexKey) -> Result<Vec<RecordId>> {
        let _latch = self.table_latch.read();

        let dir_guard = self.bpm.fetch_page_read(self.directory_page_id)?;
        let bucket_page_id = {
            let dir = HashTableDirectoryPageRef::new(dir_guard.data());
            let slot = (self.hasher.hash(key) & dir.global_depth_mask()) as usize;
            dir.bucket_page_id(slot)
        };

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        let bucket = HashTableBucketPageRef::new(bucket_guard.data(), self.bucket_capacity);
        Ok(bucket.get_value(key))
    }

    /// Inserts a key/record pair, splitting the target bucket (and growing
    /// the directory) as long as it is full. Returns false for an exact
    /// duplicate pair.
    pub fn insert(&self, key: IndexKey, value: RecordId) -> Result<bool> {
        let _latch = self.table_latch.write();

        let mut dir_guard = self.bpm.fetch_page_write(self.directory_page_id)?;
        let fingerprint = self.hasher.hash(key);

        loop {
            let (slot, bucket_page_id) = {
                let dir = HashTableDirectoryPageRef::new(dir_guard.data());
                let slot = (fingerprint & dir.global_depth_mask()) as usize;
                (slot, dir.bucket_page_id(slot))
            };

            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            {
                let mut bucket =
                    HashTableBucketPage::new(bucket_guard.data_mut(), self.bucket_capacity);
                if !bucket.is_full() {
                    return Ok(bucket.insert(key, value));
                }
                // A full bucket still rejects an exact duplicate without
                // splitting
                if bucket.contains(key, value) {
                    return Ok(false);
                }
            }

            let mut dir = HashTableDirectoryPage::new(dir_guard.data_mut());
            let local_depth = dir.local_depth(slot);

            // Out of addressing bits for this bucket: double the directory
            if local_depth == dir.global_depth() {
                let old_size = dir.size();
                dir.incr_global_depth();
                for i in 0..old_size {
                    let page_id = dir.bucket_page_id(i);
                    let depth = dir.local_depth(i);
                    dir.set_bucket_page_id(i + old_size, page_id);
                    dir.set_local_depth(i + old_size, depth as u8);
                }
                debug!(
                    "hash directory doubled to global depth {}",
                    dir.global_depth()
                );
            }

            // Split: allocate the pair and repoint every slot of the old
            // bucket by its bit at the new local depth
            let new_local_depth = local_depth + 1;
            let mut low_guard = self.bpm.new_page()?;
            let mut high_guard = self.bpm.new_page()?;
            let low_page_id = low_guard.page_id();
            let high_page_id = high_guard.page_id();

            for i in 0..dir.size() {
                if dir.bucket_page_id(i) == bucket_page_id {
                    if i & (1 << (new_local_depth - 1)) == 0 {
                        dir.set_bucket_page_id(i, low_page_id);
                    } else {
                        dir.set_bucket_page_id(i, high_page_id);
                    }
                    dir.set_local_depth(i, new_local_depth as u8);
                }
            }

            // Rehash the live entries into the pair
            {
                let old_bucket =
                    HashTableBucketPageRef::new(bucket_guard.data(), self.bucket_capacity);
                let mut low_bucket =
                    HashTableBucketPage::new(low_guard.data_mut(), self.bucket_capacity);
                let mut high_bucket =
                    HashTableBucketPage::new(high_guard.data_mut(), self.bucket_capacity);
                for i in 0..self.bucket_capacity {
                    if old_bucket.is_readable(i) {
                        let entry_key = old_bucket.key_at(i);
                        let entry_rid = old_bucket.record_at(i);
                        let target =
                            (self.hasher.hash(entry_key) & dir.global_depth_mask()) as usize;
                        let inserted = if dir.bucket_page_id(target) == low_page_id {
                            low_bucket.insert(entry_key, entry_rid)
                        } else {
                            high_bucket.insert(entry_key, entry_rid)
                        };
                        debug_assert!(inserted, "split bucket cannot overflow");
                    }
                }
            }

            debug!(
                "split bucket {} into {} and {} at local depth {}",
                bucket_page_id, low_page_id, high_page_id, new_local_depth
            );
            drop(bucket_guard);
            self.bpm.delete_page(bucket_page_id)?;
            // Retry against the rebuilt directory
        }
    }

    /// Removes the exact key/record pair. A bucket left without any used
    /// slot merges with its split image when their depths match, possibly
    /// shrinking the directory one level.
    pub fn remove(&self, key: IndexKey, value: RecordId) -> Result<bool> {
        let _latch = self.table_latch.write();

        let mut dir_guard = self.bpm.fetch_page_write(self.directory_page_id)?;
        let fingerprint = self.hasher.hash(key);

        let (slot, bucket_page_id) = {
            let dir = HashTableDirectoryPageRef::new(dir_guard.data());
            let slot = (fingerprint & dir.global_depth_mask()) as usize;
            (slot, dir.bucket_page_id(slot))
        };

        let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
        let removed = {
            let mut bucket =
                HashTableBucketPage::new(bucket_guard.data_mut(), self.bucket_capacity);
            bucket.remove(key, value)
        };

        let now_empty = {
            let bucket = HashTableBucketPageRef::new(bucket_guard.data(), self.bucket_capacity);
            bucket.is_empty()
        };

        if now_empty {
            let mut dir = HashTableDirectoryPage::new(dir_guard.data_mut());
            let local_depth = dir.local_depth(slot);
            if local_depth > 0 {
                let image_slot = dir.split_image_index(slot);
                if dir.local_depth(image_slot) == local_depth {
                    let image_page_id = dir.bucket_page_id(image_slot);
                    if image_page_id != bucket_page_id {
                        // Coalesce: the split image absorbs the pair
                        for i in 0..dir.size() {
                            if dir.bucket_page_id(i) == bucket_page_id {
                                dir.set_bucket_page_id(i, image_page_id);
                            }
                        }
                        for i in 0..dir.size() {
                            if dir.bucket_page_id(i) == image_page_id {
                                dir.set_local_depth(i, (local_depth - 1) as u8);
                            }
                        }
                        drop(bucket_guard);
                        self.bpm.delete_page(bucket_page_id)?;
                        debug!(
                            "merged empty bucket {} into {}",
                            bucket_page_id, image_page_id
                        );

                        if dir.can_shrink() {
                            dir.decr_global_depth();
                            debug!(
                                "hash directory shrank to global depth {}",
                                dir.global_depth()
                            );
                        }
                    }
                }
            }
        }

        Ok(removed)
    }

    /// Current global depth of the directory.
    pub fn global_depth(&self) -> Result<u32> {
        let _latch = self.table_latch.read();
        let dir_guard = self.bpm.fetch_page_read(self.directory_page_id)?;
        let dir = HashTableDirectoryPageRef::new(dir_guard.data());
        Ok(dir.global_depth())
    }

    /// Checks the directory's depth and coupling invariants.
    pub fn verify_integrity(&self) -> Result<bool> {
        let _latch = self.table_latch.read();
        let dir_guard = self.bpm.fetch_page_read(self.directory_page_id)?;
        let dir = HashTableDirectoryPageRef::new(dir_guard.data());
        Ok(dir.verify_integrity())
    }
}
