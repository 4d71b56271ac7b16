use std::sync::Arc;

use keel::buffer::BufferPoolManager;
use keel::common::DEFAULT_BUFFER_POOL_SIZE;
use keel::index::{BPlusTree, DefaultKeyHasher, ExtendibleHashTable, IntegerComparator};
use keel::storage::disk::DiskManager;
use keel::{PageId, RecordId, SlotId};

fn main() {
    println!("Keel - disk-oriented storage engine core");
    println!("========================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    let bpm = Arc::new(BufferPoolManager::new(DEFAULT_BUFFER_POOL_SIZE, disk_manager));
    println!("Created buffer pool with {} frames", DEFAULT_BUFFER_POOL_SIZE);

    // The first allocated page becomes the header page recording index roots
    let header = bpm.new_page().expect("Failed to allocate header page");
    assert_eq!(header.page_id(), PageId::new(0));
    drop(header);

    // B+ tree: ordered access
    let tree = BPlusTree::new("orders_pk", Arc::clone(&bpm), IntegerComparator, 16, 16)
        .expect("Failed to create tree index");

    for key in [42u32, 7, 19, 3, 88, 54, 21, 65, 30, 11] {
        let rid = RecordId::new(PageId::new(100 + key), SlotId::new(0));
        tree.insert(key, rid).expect("insert failed");
    }
    println!("\nInserted 10 keys into the tree index");

    print!("Keys in order:");
    let mut iter = tree.begin().expect("begin failed");
    while let Some((key, _rid)) = iter.next().expect("scan failed") {
        print!(" {}", key);
    }
    println!();

    tree.remove(19).expect("remove failed");
    println!("Removed key 19; lookup now yields {:?}", tree.get_value(19).unwrap());

    // Extendible hash table: point access
    let hash_table = ExtendibleHashTable::new(Arc::clone(&bpm), DefaultKeyHasher)
        .expect("Failed to create hash index");

    for key in 0u32..32 {
        let rid = RecordId::new(PageId::new(200 + key), SlotId::new(0));
        hash_table.insert(key, rid).expect("insert failed");
    }
    println!("\nInserted 32 keys into the hash index");
    println!(
        "Hash directory global depth: {}",
        hash_table.global_depth().unwrap()
    );
    println!("hash(5) -> {:?}", hash_table.get_value(5).unwrap());

    bpm.flush_all_pages().expect("flush failed");
    println!("\nFlushed all pages to disk");

    std::fs::remove_file(db_path).ok();
    println!("Demo completed");
}
