use std::cmp::Ordering;
use std::sync::Arc;

use log::debug;
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{
    IndexKey, KeelError, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page::HeaderPage;

use super::btree_iterator::BPlusTreeIterator;
use super::btree_page::{BPlusTreeNode, BPlusTreeNodeRef, INTERNAL_PAGE_CAPACITY, LEAF_PAGE_CAPACITY};
use super::key_comparator::KeyComparator;

type RootLatch<'a> = Option<RwLockWriteGuard<'a, PageId>>;

/// Can this node take one more entry without splitting?
fn is_insert_safe(node: &BPlusTreeNodeRef) -> bool {
    node.size() < node.max_size()
}

/// Can this node lose one entry without rebalancing?
fn is_delete_safe(node: &BPlusTreeNodeRef) -> bool {
    if node.parent_page_id().is_none() {
        if node.is_leaf() {
            node.size() > 1
        } else {
            node.size() > 2
        }
    } else {
        node.size() > node.min_size()
    }
}

/// B+ tree index mapping keys to record ids.
///
/// The root page id is guarded by a tree-level latch and persisted in the
/// header page under the index name. Write operations descend with latch
/// coupling: every node on the path is write-latched through its page
/// guard, and all ancestor guards are released as soon as the current node
/// is known to absorb the operation without splitting or rebalancing. The
/// guards still held form the page set that splits and merges climb.
pub struct BPlusTree<C: KeyComparator> {
    index_name: String,
    root_page_id: RwLock<PageId>,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Opens (or registers) the named index. The root recorded in the
    /// header page is picked up when the index already exists.
    pub fn new(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        assert!(
            (2..LEAF_PAGE_CAPACITY).contains(&leaf_max_size),
            "leaf max size out of range"
        );
        assert!(
            (3..INTERNAL_PAGE_CAPACITY).contains(&internal_max_size),
            "internal max size out of range"
        );

        let root = {
            let mut guard = bpm.fetch_page_write(HEADER_PAGE_ID)?;
            let mut header = HeaderPage::new(guard.data_mut());
            match header.get_root_id(name) {
                Some(root) => root,
                None => {
                    if !header.insert_record(name, INVALID_PAGE_ID) {
                        return Err(KeelError::HeaderFull);
                    }
                    INVALID_PAGE_ID
                }
            }
        };

        Ok(Self {
            index_name: name.to_string(),
            root_page_id: RwLock::new(root),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.read() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    /// Records the current root id in the header page.
    fn update_root_page_id(&self, root: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        let updated = header.update_record(&self.index_name, root);
        debug_assert!(updated, "index was registered at construction");
        Ok(())
    }

    /// Point lookup. Descends with shared latches, acquiring each child
    /// before releasing its parent.
    pub fn get_value(&self, key: IndexKey) -> Result<Vec<RecordId>> {
        let root_latch = self.root_page_id.read();
        let root = *root_latch;
        if root == INVALID_PAGE_ID {
            return Ok(Vec::new());
        }

        let mut guard = self.bpm.fetch_page_read(root)?;
        drop(root_latch);

        loop {
            let child_id = {
                let node = BPlusTreeNodeRef::new(guard.data());
                if node.is_leaf() {
                    let mut result = Vec::new();
                    if let Some(rid) = node.leaf_lookup(key, &self.comparator) {
                        result.push(rid);
                    }
                    return Ok(result);
                }
                node.internal_lookup(key, &self.comparator)
            };
            // Child guard is acquired before the parent guard drops
            guard = self.bpm.fetch_page_read(child_id)?;
        }
    }

    /// Inserts a key/record pair. Returns false when the key already
    /// exists.
    pub fn insert(&self, key: IndexKey, value: RecordId) -> Result<bool> {
        let mut root_latch: RootLatch = Some(self.root_page_id.write());
        let root = **root_latch.as_ref().unwrap();
        if root == INVALID_PAGE_ID {
            self.start_new_tree(root_latch.take().unwrap(), key, value)?;
            return Ok(true);
        }

        let mut write_set: Vec<WritePageGuard> = Vec::new();
        let mut guard = self.bpm.fetch_page_write(root)?;
        if is_insert_safe(&BPlusTreeNodeRef::new(guard.data())) {
            root_latch = None;
        }

        loop {
            let child_id = {
                let node = BPlusTreeNodeRef::new(guard.data());
                if node.is_leaf() {
                    break;
                }
                node.internal_lookup(key, &self.comparator)
            };
            let child_guard = self.bpm.fetch_page_write(child_id)?;
            let safe = is_insert_safe(&BPlusTreeNodeRef::new(child_guard.data()));
            write_set.push(std::mem::replace(&mut guard, child_guard));
            if safe {
                write_set.clear();
                root_latch = None;
            }
        }

        {
            let node = BPlusTreeNodeRef::new(guard.data());
            if node.leaf_lookup(key, &self.comparator).is_some() {
                return Ok(false);
            }
        }

        let (new_size, max_size) = {
            let mut node = BPlusTreeNode::new(guard.data_mut());
            let new_size = node.leaf_insert(key, value, &self.comparator);
            (new_size, node.max_size())
        };
        if new_size <= max_size {
            return Ok(true);
        }

        // Overflow: split the leaf and promote the new leaf's first key
        let mut new_guard = self.bpm.new_page()?;
        let new_page_id = new_guard.page_id();
        let separator = {
            let mut node = BPlusTreeNode::new(guard.data_mut());
            let mut new_node = BPlusTreeNode::new(new_guard.data_mut());
            new_node.init_leaf(new_page_id, node.parent_page_id(), node.max_size() as u32);
            node.leaf_move_upper_half_to(&mut new_node);
            new_node.set_next_page_id(node.next_page_id());
            node.set_next_page_id(Some(new_page_id));
            new_node.leaf_key_at(0)
        };
        debug!(
            "split leaf {} into {}, promoting key {}",
            guard.page_id(),
            new_page_id,
            separator
        );

        self.insert_into_parent(&mut write_set, &mut root_latch, guard, separator, new_guard)?;
        Ok(true)
    }

    fn start_new_tree(
        &self,
        mut root_latch: RwLockWriteGuard<'_, PageId>,
        key: IndexKey,
        value: RecordId,
    ) -> Result<()> {
        let mut guard = self.bpm.new_page()?;
        let page_id = guard.page_id();
        {
            let mut node = BPlusTreeNode::new(guard.data_mut());
            node.init_leaf(page_id, None, self.leaf_max_size as u32);
            node.leaf_insert(key, value, &self.comparator);
        }
        *root_latch = page_id;
        drop(root_latch);
        self.update_root_page_id(page_id)?;
        debug!("started tree '{}' at root {}", self.index_name, page_id);
        Ok(())
    }

    /// Installs the separator for a freshly split pair of siblings,
    /// splitting ancestors as long as they overflow. The pending guard
    /// stack holds every ancestor that may still be affected; an empty
    /// stack means the split node was the root.
    fn insert_into_parent(
        &self,
        write_set: &mut Vec<WritePageGuard>,
        root_latch: &mut RootLatch,
        old_guard: WritePageGuard,
        key: IndexKey,
        new_guard: WritePageGuard,
    ) -> Result<()> {
        let mut old_guard = old_guard;
        let mut new_guard = new_guard;
        let mut key = key;

        loop {
            let Some(mut parent_guard) = write_set.pop() else {
                // The split node was the root: grow the tree by one level
                let mut latch = root_latch
                    .take()
                    .expect("root latch must be held while splitting the root");
                let mut new_root_guard = self.bpm.new_page()?;
                let new_root_id = new_root_guard.page_id();
                {
                    let mut root_node = BPlusTreeNode::new(new_root_guard.data_mut());
                    root_node.init_internal(new_root_id, None, self.internal_max_size as u32);
                    root_node.populate_new_root(old_guard.page_id(), key, new_guard.page_id());
                }
                BPlusTreeNode::new(old_guard.data_mut()).set_parent_page_id(Some(new_root_id));
                BPlusTreeNode::new(new_guard.data_mut()).set_parent_page_id(Some(new_root_id));
                *latch = new_root_id;
                drop(latch);
                self.update_root_page_id(new_root_id)?;
                debug!("tree '{}' grew a new root {}", self.index_name, new_root_id);
                return Ok(());
            };

            let (new_size, max_size) = {
                let mut parent = BPlusTreeNode::new(parent_guard.data_mut());
                let new_size = parent.insert_node_after(old_guard.page_id(), key, new_guard.page_id());
                (new_size, parent.max_size())
            };
            if new_size <= max_size {
                return Ok(());
            }

            // The parent overflowed as well: split it and climb
            let mut new_parent_guard = self.bpm.new_page()?;
            let new_parent_id = new_parent_guard.page_id();
            let push_key = {
                let mut parent = BPlusTreeNode::new(parent_guard.data_mut());
                let mut new_parent = BPlusTreeNode::new(new_parent_guard.data_mut());
                new_parent.init_internal(new_parent_id, parent.parent_page_id(), parent.max_size() as u32);
                parent.internal_move_upper_half_to(&mut new_parent);
                new_parent.internal_key_at(0)
            };

            // Children moved under the new node need their back-pointers
            // redirected; the just-split pair may be among them.
            let moved: Vec<PageId> = {
                let new_parent = BPlusTreeNodeRef::new(new_parent_guard.data());
                (0..new_parent.size()).map(|i| new_parent.child_at(i)).collect()
            };
            for child_id in moved {
                if child_id == old_guard.page_id() {
                    BPlusTreeNode::new(old_guard.data_mut())
                        .set_parent_page_id(Some(new_parent_id));
                } else if child_id == new_guard.page_id() {
                    BPlusTreeNode::new(new_guard.data_mut())
                        .set_parent_page_id(Some(new_parent_id));
                } else {
                    let mut child_guard = self.bpm.fetch_page_write(child_id)?;
                    BPlusTreeNode::new(child_guard.data_mut())
                        .set_parent_page_id(Some(new_parent_id));
                }
            }

            debug!(
                "split internal {} into {}, pushing key {}",
                parent_guard.page_id(),
                new_parent_id,
                push_key
            );
            old_guard = parent_guard;
            new_guard = new_parent_guard;
            key = push_key;
        }
    }

    /// Removes the entry with the given key, if present.
    pub fn remove(&self, key: IndexKey) -> Result<()> {
        let mut root_latch: RootLatch = Some(self.root_page_id.write());
        let root = **root_latch.as_ref().unwrap();
        if root == INVALID_PAGE_ID {
            return Ok(());
        }

        let mut write_set: Vec<WritePageGuard> = Vec::new();
        let mut guard = self.bpm.fetch_page_write(root)?;
        if is_delete_safe(&BPlusTreeNodeRef::new(guard.data())) {
            root_latch = None;
        }

        loop {
            let child_id = {
                let node = BPlusTreeNodeRef::new(guard.data());
                if node.is_leaf() {
                    break;
                }
                node.internal_lookup(key, &self.comparator)
            };
            let child_guard = self.bpm.fetch_page_write(child_id)?;
            let safe = is_delete_safe(&BPlusTreeNodeRef::new(child_guard.data()));
            write_set.push(std::mem::replace(&mut guard, child_guard));
            if safe {
                write_set.clear();
                root_latch = None;
            }
        }

        let removed = {
            let mut node = BPlusTreeNode::new(guard.data_mut());
            node.leaf_remove(key, &self.comparator)
        };
        if !removed {
            return Ok(());
        }

        let (is_root, size, min_size) = {
            let node = BPlusTreeNodeRef::new(guard.data());
            (node.parent_page_id().is_none(), node.size(), node.min_size())
        };

        if is_root {
            if size == 0 {
                // Last entry gone: the tree is empty again
                let mut latch = root_latch
                    .take()
                    .expect("root latch must be held while emptying the tree");
                let old_root = guard.page_id();
                *latch = INVALID_PAGE_ID;
                drop(latch);
                self.update_root_page_id(INVALID_PAGE_ID)?;
                drop(guard);
                self.bpm.delete_page(old_root)?;
                debug!("tree '{}' is empty", self.index_name);
            }
            return Ok(());
        }

        if size >= min_size {
            return Ok(());
        }

        self.coalesce_or_redistribute(&mut write_set, &mut root_latch, guard)
    }

    /// Restores the minimum-occupancy invariant for an underfull node:
    /// borrow from a sibling when the pair holds more than max_size entries
    /// combined, otherwise merge the pair and climb.
    fn coalesce_or_redistribute(
        &self,
        write_set: &mut Vec<WritePageGuard>,
        root_latch: &mut RootLatch,
        node_guard: WritePageGuard,
    ) -> Result<()> {
        let mut node_guard = node_guard;

        loop {
            let mut parent_guard = write_set
                .pop()
                .expect("parent stays latched above an unsafe child");
            let node_id = node_guard.page_id();
            let is_leaf = BPlusTreeNodeRef::new(node_guard.data()).is_leaf();

            let (my_index, left_id, right_id) = {
                let parent = BPlusTreeNodeRef::new(parent_guard.data());
                let my_index = parent
                    .value_index(node_id)
                    .expect("underfull node must be a child of its parent");
                let left_id = (my_index > 0).then(|| parent.child_at(my_index - 1));
                let right_id = (my_index + 1 < parent.size()).then(|| parent.child_at(my_index + 1));
                (my_index, left_id, right_id)
            };

            let mut left_guard = match left_id {
                Some(id) => Some(self.bpm.fetch_page_write(id)?),
                None => None,
            };

            // Prefer borrowing from the left sibling
            if let Some(lg) = left_guard.as_mut() {
                let can_borrow = {
                    let left = BPlusTreeNodeRef::new(lg.data());
                    let node = BPlusTreeNodeRef::new(node_guard.data());
                    left.size() + node.size() > node.max_size()
                };
                if can_borrow {
                    if is_leaf {
                        {
                            let mut left = BPlusTreeNode::new(lg.data_mut());
                            let mut node = BPlusTreeNode::new(node_guard.data_mut());
                            left.leaf_move_last_to_front_of(&mut node);
                        }
                        let new_sep = BPlusTreeNodeRef::new(node_guard.data()).leaf_key_at(0);
                        BPlusTreeNode::new(parent_guard.data_mut())
                            .set_internal_key_at(my_index, new_sep);
                    } else {
                        let middle_key =
                            BPlusTreeNodeRef::new(parent_guard.data()).internal_key_at(my_index);
                        let (new_sep, moved_child) = {
                            let mut left = BPlusTreeNode::new(lg.data_mut());
                            let mut node = BPlusTreeNode::new(node_guard.data_mut());
                            left.internal_move_last_to_front_of(&mut node, middle_key)
                        };
                        BPlusTreeNode::new(parent_guard.data_mut())
                            .set_internal_key_at(my_index, new_sep);
                        let mut child_guard = self.bpm.fetch_page_write(moved_child)?;
                        BPlusTreeNode::new(child_guard.data_mut())
                            .set_parent_page_id(Some(node_id));
                    }
                    debug!("node {} borrowed from its left sibling", node_id);
                    return Ok(());
                }
            }

            // Then from the right sibling
            let mut right_guard = match right_id {
                Some(id) => Some(self.bpm.fetch_page_write(id)?),
                None => None,
            };
            if let Some(rg) = right_guard.as_mut() {
                let can_borrow = {
                    let right = BPlusTreeNodeRef::new(rg.data());
                    let node = BPlusTreeNodeRef::new(node_guard.data());
                    right.size() + node.size() > node.max_size()
                };
                if can_borrow {
                    if is_leaf {
                        {
                            let mut right = BPlusTreeNode::new(rg.data_mut());
                            let mut node = BPlusTreeNode::new(node_guard.data_mut());
                            right.leaf_move_first_to_end_of(&mut node);
                        }
                        let new_sep = BPlusTreeNodeRef::new(rg.data()).leaf_key_at(0);
                        BPlusTreeNode::new(parent_guard.data_mut())
                            .set_internal_key_at(my_index + 1, new_sep);
                    } else {
                        let middle_key = BPlusTreeNodeRef::new(parent_guard.data())
                            .internal_key_at(my_index + 1);
                        let (new_sep, moved_child) = {
                            let mut right = BPlusTreeNode::new(rg.data_mut());
                            let mut node = BPlusTreeNode::new(node_guard.data_mut());
                            right.internal_move_first_to_end_of(&mut node, middle_key)
                        };
                        BPlusTreeNode::new(parent_guard.data_mut())
                            .set_internal_key_at(my_index + 1, new_sep);
                        let mut child_guard = self.bpm.fetch_page_write(moved_child)?;
                        BPlusTreeNode::new(child_guard.data_mut())
                            .set_parent_page_id(Some(node_id));
                    }
                    debug!("node {} borrowed from its right sibling", node_id);
                    return Ok(());
                }
            }

            // No redistribution possible: merge the pair into one node
            let mut survivor_guard;
            if let Some(mut lg) = left_guard.take() {
                // Fold this node into its left sibling
                let left_id = lg.page_id();
                if is_leaf {
                    let mut node = BPlusTreeNode::new(node_guard.data_mut());
                    let mut left = BPlusTreeNode::new(lg.data_mut());
                    node.leaf_move_all_to(&mut left);
                } else {
                    let middle_key =
                        BPlusTreeNodeRef::new(parent_guard.data()).internal_key_at(my_index);
                    let moved: Vec<PageId> = {
                        let node = BPlusTreeNodeRef::new(node_guard.data());
                        (0..node.size()).map(|i| node.child_at(i)).collect()
                    };
                    {
                        let mut node = BPlusTreeNode::new(node_guard.data_mut());
                        let mut left = BPlusTreeNode::new(lg.data_mut());
                        node.internal_move_all_to(&mut left, middle_key);
                    }
                    for child_id in moved {
                        let mut child_guard = self.bpm.fetch_page_write(child_id)?;
                        BPlusTreeNode::new(child_guard.data_mut())
                            .set_parent_page_id(Some(left_id));
                    }
                }
                BPlusTreeNode::new(parent_guard.data_mut()).internal_remove(my_index);
                drop(node_guard);
                self.bpm.delete_page(node_id)?;
                debug!("merged node {} into left sibling {}", node_id, left_id);
                survivor_guard = lg;
            } else {
                // Leftmost child: absorb the right sibling instead
                let mut rg = right_guard
                    .take()
                    .expect("a non-root parent keeps at least two children");
                let right_page_id = rg.page_id();
                if is_leaf {
                    let mut right = BPlusTreeNode::new(rg.data_mut());
                    let mut node = BPlusTreeNode::new(node_guard.data_mut());
                    right.leaf_move_all_to(&mut node);
                } else {
                    let middle_key =
                        BPlusTreeNodeRef::new(parent_guard.data()).internal_key_at(my_index + 1);
                    let moved: Vec<PageId> = {
                        let right = BPlusTreeNodeRef::new(rg.data());
                        (0..right.size()).map(|i| right.child_at(i)).collect()
                    };
                    {
                        let mut right = BPlusTreeNode::new(rg.data_mut());
                        let mut node = BPlusTreeNode::new(node_guard.data_mut());
                        right.internal_move_all_to(&mut node, middle_key);
                    }
                    for child_id in moved {
                        let mut child_guard = self.bpm.fetch_page_write(child_id)?;
                        BPlusTreeNode::new(child_guard.data_mut())
                            .set_parent_page_id(Some(node_id));
                    }
                }
                BPlusTreeNode::new(parent_guard.data_mut()).internal_remove(my_index + 1);
                drop(rg);
                self.bpm.delete_page(right_page_id)?;
                debug!("absorbed right sibling {} into node {}", right_page_id, node_id);
                survivor_guard = node_guard;
            }

            let (parent_is_root, parent_size, parent_min) = {
                let parent = BPlusTreeNodeRef::new(parent_guard.data());
                (parent.parent_page_id().is_none(), parent.size(), parent.min_size())
            };

            if parent_is_root {
                if parent_size == 1 {
                    // The root lost its last separator: its only child
                    // becomes the new root
                    let mut latch = root_latch
                        .take()
                        .expect("root latch must be held while collapsing the root");
                    let new_root_id = survivor_guard.page_id();
                    debug_assert_eq!(
                        BPlusTreeNodeRef::new(parent_guard.data()).child_at(0),
                        new_root_id
                    );
                    BPlusTreeNode::new(survivor_guard.data_mut()).set_parent_page_id(None);
                    *latch = new_root_id;
                    drop(latch);
                    self.update_root_page_id(new_root_id)?;
                    let old_root_id = parent_guard.page_id();
                    drop(survivor_guard);
                    drop(parent_guard);
                    self.bpm.delete_page(old_root_id)?;
                    debug!("collapsed root into {}", new_root_id);
                }
                return Ok(());
            }

            if parent_size < parent_min {
                drop(survivor_guard);
                node_guard = parent_guard;
                continue;
            }
            return Ok(());
        }
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<BPlusTreeIterator> {
        let root_latch = self.root_page_id.read();
        let root = *root_latch;
        if root == INVALID_PAGE_ID {
            return Ok(BPlusTreeIterator::end(Arc::clone(&self.bpm)));
        }

        let mut guard = self.bpm.fetch_page_read(root)?;
        drop(root_latch);

        loop {
            let child_id = {
                let node = BPlusTreeNodeRef::new(guard.data());
                if node.is_leaf() {
                    return Ok(BPlusTreeIterator::new(Arc::clone(&self.bpm), guard, 0));
                }
                node.child_at(0)
            };
            guard = self.bpm.fetch_page_read(child_id)?;
        }
    }

    /// Iterator positioned at the first key >= the probe key.
    pub fn begin_at(&self, key: IndexKey) -> Result<BPlusTreeIterator> {
        let root_latch = self.root_page_id.read();
        let root = *root_latch;
        if root == INVALID_PAGE_ID {
            return Ok(BPlusTreeIterator::end(Arc::clone(&self.bpm)));
        }

        let mut guard = self.bpm.fetch_page_read(root)?;
        drop(root_latch);

        loop {
            let child_id = {
                let node = BPlusTreeNodeRef::new(guard.data());
                if node.is_leaf() {
                    let index = node.key_index(key, &self.comparator);
                    return Ok(BPlusTreeIterator::new(Arc::clone(&self.bpm), guard, index));
                }
                node.internal_lookup(key, &self.comparator)
            };
            guard = self.bpm.fetch_page_read(child_id)?;
        }
    }

    /// Walks the whole tree and checks its structural invariants: size
    /// bounds, parent back-pointers, sorted leaves, and separators
    /// partitioning the key space of their child subtrees.
    pub fn verify_integrity(&self) -> Result<()> {
        let root_latch = self.root_page_id.read();
        let root = *root_latch;
        if root == INVALID_PAGE_ID {
            return Ok(());
        }
        self.verify_node(root, None)?;
        Ok(())
    }

    /// Returns the smallest and largest key of the subtree.
    fn verify_node(
        &self,
        page_id: PageId,
        expected_parent: Option<PageId>,
    ) -> Result<(IndexKey, IndexKey)> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        let node = BPlusTreeNodeRef::new(guard.data());
        let size = node.size();
        let is_root = expected_parent.is_none();

        if node.parent_page_id() != expected_parent {
            return Err(KeelError::IndexCorrupted(format!(
                "node {} has a stale parent pointer",
                page_id
            )));
        }
        if !is_root && (size < node.min_size() || size > node.max_size()) {
            return Err(KeelError::IndexCorrupted(format!(
                "node {} violates its size bounds: {} not in [{}, {}]",
                page_id,
                size,
                node.min_size(),
                node.max_size()
            )));
        }

        if node.is_leaf() {
            if size == 0 {
                // Only an emptied root leaf, mid-teardown
                return Ok((0, 0));
            }
            for i in 1..size {
                if self
                    .comparator
                    .compare(node.leaf_key_at(i - 1), node.leaf_key_at(i))
                    != Ordering::Less
                {
                    return Err(KeelError::IndexCorrupted(format!(
                        "leaf {} is not strictly sorted",
                        page_id
                    )));
                }
            }
            Ok((node.leaf_key_at(0), node.leaf_key_at(size - 1)))
        } else {
            if size < 2 {
                return Err(KeelError::IndexCorrupted(format!(
                    "internal node {} has fewer than two children",
                    page_id
                )));
            }
            for i in 2..size {
                if self
                    .comparator
                    .compare(node.internal_key_at(i - 1), node.internal_key_at(i))
                    != Ordering::Less
                {
                    return Err(KeelError::IndexCorrupted(format!(
                        "separators of node {} are not strictly sorted",
                        page_id
                    )));
                }
            }

            let mut subtree_min = 0;
            let mut prev_max = 0;
            for i in 0..size {
                let (child_min, child_max) = self.verify_node(node.child_at(i), Some(page_id))?;
                if i == 0 {
                    subtree_min = child_min;
                } else {
                    // Separator i bounds its subtrees: everything left of it
                    // is smaller, everything under child i is >= it
                    let separator = node.internal_key_at(i);
                    if self.comparator.compare(prev_max, separator) != Ordering::Less
                        || self.comparator.compare(separator, child_min) == Ordering::Greater
                    {
                        return Err(KeelError::IndexCorrupted(format!(
                            "separator {} of node {} does not partition its subtrees",
                            i, page_id
                        )));
                    }
                }
                prev_max = child_max;
            }
            Ok((subtree_min, prev_max))
        }
    }
}
