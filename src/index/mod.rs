pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;
pub mod extendible_hash_table;
pub mod hash_table_page;
pub mod key_comparator;
pub mod key_hasher;

pub use btree_index::BPlusTree;
pub use btree_iterator::BPlusTreeIterator;
pub use btree_page::{
    BPlusTreeNode, BPlusTreeNodeRef, BPlusTreePageType, DEFAULT_INTERNAL_MAX_SIZE,
    DEFAULT_LEAF_MAX_SIZE,
};
pub use extendible_hash_table::ExtendibleHashTable;
pub use hash_table_page::{
    HashTableBucketPage, HashTableBucketPageRef, HashTableDirectoryPage,
    HashTableDirectoryPageRef,
};
pub use key_comparator::{IntegerComparator, KeyComparator};
pub use key_hasher::{DefaultKeyHasher, IdentityHasher, KeyHasher};
