//! Integration tests for the B+ tree index

use std::sync::Arc;

use keel::buffer::BufferPoolManager;
use keel::index::{BPlusTree, BPlusTreeNodeRef, IntegerComparator};
use keel::storage::disk::DiskManager;
use keel::{PageId, RecordId, SlotId};

use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
    // Claim page 0 as the header page before any index allocates
    let header = bpm.new_page().unwrap();
    assert_eq!(header.page_id(), PageId::new(0));
    drop(header);
    (bpm, temp_file)
}

fn create_tree(
    bpm: &Arc<BufferPoolManager>,
    leaf_max: usize,
    internal_max: usize,
) -> BPlusTree<IntegerComparator> {
    BPlusTree::new("test_index", Arc::clone(bpm), IntegerComparator, leaf_max, internal_max)
        .unwrap()
}

fn rid(key: u32) -> RecordId {
    RecordId::new(PageId::new(key), SlotId::new((key % 7) as u16))
}

fn scan_keys(tree: &BPlusTree<IntegerComparator>) -> Vec<u32> {
    let mut keys = Vec::new();
    let mut iter = tree.begin().unwrap();
    while let Some((key, value)) = iter.next().unwrap() {
        assert_eq!(value, rid(key));
        keys.push(key);
    }
    keys
}

#[test]
fn test_insert_and_lookup() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 3, 3);

    assert!(tree.is_empty());
    for key in [10u32, 20, 30] {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    assert!(!tree.is_empty());

    for key in [10u32, 20, 30] {
        assert_eq!(tree.get_value(key).unwrap(), vec![rid(key)]);
    }
    assert!(tree.get_value(15).unwrap().is_empty());
}

#[test]
fn test_duplicate_insert_is_rejected() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 3, 3);

    assert!(tree.insert(10, rid(10)).unwrap());
    assert!(!tree.insert(10, rid(11)).unwrap());
    assert_eq!(tree.get_value(10).unwrap(), vec![rid(10)]);
}

#[test]
fn test_leaf_split_promotes_separator() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 3, 3);

    for key in [10u32, 20, 30, 40] {
        assert!(tree.insert(key, rid(key)).unwrap());
    }

    // Inserting 40 into the full leaf splits it: root holds separator 30
    // over leaves [10, 20] and [30, 40] linked by the sibling pointer
    let root_guard = bpm.fetch_page_read(tree.root_page_id()).unwrap();
    let root = BPlusTreeNodeRef::new(root_guard.data());
    assert!(!root.is_leaf());
    assert_eq!(root.size(), 2);
    assert_eq!(root.internal_key_at(1), 30);

    let left_guard = bpm.fetch_page_read(root.child_at(0)).unwrap();
    let left = BPlusTreeNodeRef::new(left_guard.data());
    assert_eq!(left.size(), 2);
    assert_eq!(left.leaf_key_at(0), 10);
    assert_eq!(left.leaf_key_at(1), 20);
    assert_eq!(left.next_page_id(), Some(root.child_at(1)));

    let right_guard = bpm.fetch_page_read(root.child_at(1)).unwrap();
    let right = BPlusTreeNodeRef::new(right_guard.data());
    assert_eq!(right.size(), 2);
    assert_eq!(right.leaf_key_at(0), 30);
    assert_eq!(right.leaf_key_at(1), 40);
    assert_eq!(right.next_page_id(), None);

    tree.verify_integrity().unwrap();
}

#[test]
fn test_delete_coalesces_when_borrow_would_starve_donor() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 3, 3);

    // Leaves [10,20] [25,28] [30,40] under separators [25, 30]
    for key in [10u32, 20, 30, 40, 25, 28] {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    tree.verify_integrity().unwrap();

    // The two-entry sibling cannot donate (2 + 1 entries fit in one leaf),
    // so deleting 30 merges the underfull leaf into it
    tree.remove(30).unwrap();
    tree.verify_integrity().unwrap();

    assert_eq!(scan_keys(&tree), vec![10, 20, 25, 28, 40]);

    let root_guard = bpm.fetch_page_read(tree.root_page_id()).unwrap();
    let root = BPlusTreeNodeRef::new(root_guard.data());
    assert_eq!(root.size(), 2);
    assert_eq!(root.internal_key_at(1), 25);
}

#[test]
fn test_delete_borrows_from_left_sibling() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 3, 3);

    // Leaves [10,20] [25,26,28] [30,40] under separators [25, 30]
    for key in [10u32, 20, 30, 40, 25, 28, 26] {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    tree.verify_integrity().unwrap();

    // The three-entry left sibling can donate its last key, and the
    // parent separator follows the right leaf's new first key
    tree.remove(30).unwrap();
    tree.verify_integrity().unwrap();

    assert_eq!(scan_keys(&tree), vec![10, 20, 25, 26, 28, 40]);

    let root_guard = bpm.fetch_page_read(tree.root_page_id()).unwrap();
    let root = BPlusTreeNodeRef::new(root_guard.data());
    assert_eq!(root.internal_key_at(2), 28);

    let middle_guard = bpm.fetch_page_read(root.child_at(1)).unwrap();
    let middle = BPlusTreeNodeRef::new(middle_guard.data());
    assert_eq!(middle.size(), 2);
    assert_eq!(middle.leaf_key_at(1), 26);
}

#[test]
fn test_delete_borrows_from_right_sibling() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 3, 3);

    // Leaves [10,20] [25,26,27] under separator 25: deleting from the
    // leftmost leaf pulls the right sibling's first key left
    for key in [10u32, 20, 25, 26, 27] {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    tree.verify_integrity().unwrap();

    tree.remove(10).unwrap();
    tree.verify_integrity().unwrap();

    assert_eq!(scan_keys(&tree), vec![20, 25, 26, 27]);

    let root_guard = bpm.fetch_page_read(tree.root_page_id()).unwrap();
    let root = BPlusTreeNodeRef::new(root_guard.data());
    assert_eq!(root.internal_key_at(1), 26);
}

#[test]
fn test_delete_to_empty_and_reuse() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 3, 3);

    for key in 1u32..=20 {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    for key in 1u32..=20 {
        tree.remove(key).unwrap();
        tree.verify_integrity().unwrap();
    }

    assert!(tree.is_empty());
    assert!(tree.get_value(5).unwrap().is_empty());
    assert!(scan_keys(&tree).is_empty());

    // The emptied tree accepts new entries
    assert!(tree.insert(42, rid(42)).unwrap());
    assert_eq!(scan_keys(&tree), vec![42]);
}

#[test]
fn test_removing_absent_key_is_a_noop() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 3, 3);

    for key in [10u32, 20, 30, 40] {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    tree.remove(15).unwrap();
    tree.remove(99).unwrap();

    assert_eq!(scan_keys(&tree), vec![10, 20, 30, 40]);
    tree.verify_integrity().unwrap();
}

#[test]
fn test_iterator_from_key() {
    let (bpm, _temp) = create_bpm(64);
    let tree = create_tree(&bpm, 16, 16);

    for key in 1u32..100 {
        assert!(tree.insert(key, rid(key)).unwrap());
    }

    let mut iter = tree.begin_at(50).unwrap();
    let mut seen = Vec::new();
    for _ in 0..10 {
        let (key, _) = iter.next().unwrap().unwrap();
        seen.push(key);
    }
    assert_eq!(seen, (50u32..60).collect::<Vec<_>>());

    // Positioning on a missing key lands on the next larger one
    tree.remove(70).unwrap();
    let mut iter = tree.begin_at(70).unwrap();
    assert_eq!(iter.next().unwrap().unwrap().0, 71);

    // Past the largest key the iterator is exhausted immediately
    let mut iter = tree.begin_at(1000).unwrap();
    assert!(iter.next().unwrap().is_none());
    assert!(iter.is_end());
}

#[test]
fn test_mixed_workload_keeps_sorted_order() {
    let (bpm, _temp) = create_bpm(128);
    let tree = create_tree(&bpm, 4, 4);

    // Deterministic permutation of 1..=211
    let keys: Vec<u32> = (1u32..=211).map(|i| (i * 37) % 211 + 1).collect();
    for &key in &keys {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    tree.verify_integrity().unwrap();

    // Remove every third key
    let mut expected: Vec<u32> = (1u32..=211).collect();
    for &key in keys.iter().step_by(3) {
        tree.remove(key).unwrap();
        expected.retain(|&k| k != key);
    }
    tree.verify_integrity().unwrap();

    assert_eq!(scan_keys(&tree), expected);
}

#[test]
fn test_reverse_and_alternating_inserts() {
    let (bpm, _temp) = create_bpm(128);
    let tree = create_tree(&bpm, 3, 3);

    for key in (1u32..=50).rev() {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    for key in 51u32..=100 {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    tree.verify_integrity().unwrap();

    assert_eq!(scan_keys(&tree), (1u32..=100).collect::<Vec<_>>());
    for key in 1u32..=100 {
        assert_eq!(tree.get_value(key).unwrap(), vec![rid(key)]);
    }
}

#[test]
fn test_root_id_is_recorded_in_header() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 3, 3);

    for key in [10u32, 20, 30, 40] {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    let root = tree.root_page_id();

    // A second handle over the same name picks up the recorded root
    let reopened = create_tree(&bpm, 3, 3);
    assert_eq!(reopened.root_page_id(), root);
    assert_eq!(reopened.get_value(20).unwrap(), vec![rid(20)]);
}

#[test]
fn test_concurrent_inserts_from_disjoint_ranges() {
    let (bpm, _temp) = create_bpm(256);
    let tree = Arc::new(create_tree(&bpm, 8, 8));

    let mut handles = Vec::new();
    for t in 0u32..4 {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            for i in 0..100u32 {
                let key = t * 100 + i + 1;
                assert!(tree.insert(key, rid(key)).unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    tree.verify_integrity().unwrap();
    assert_eq!(scan_keys(&tree), (1u32..=400).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_reads_during_inserts() {
    let (bpm, _temp) = create_bpm(256);
    let tree = Arc::new(create_tree(&bpm, 8, 8));

    for key in 1u32..=200 {
        assert!(tree.insert(key, rid(key)).unwrap());
    }

    let mut handles = Vec::new();
    for t in 0u32..3 {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            for i in 0..200u32 {
                let key = (i + t * 67) % 200 + 1;
                assert_eq!(tree.get_value(key).unwrap(), vec![rid(key)]);
            }
        }));
    }
    {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            for key in 201u32..=300 {
                assert!(tree.insert(key, rid(key)).unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    tree.verify_integrity().unwrap();
    assert_eq!(scan_keys(&tree), (1u32..=300).collect::<Vec<_>>());
}
