use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::common::IndexKey;

/// Maps index keys to the 32-bit fingerprints the extendible hash table
/// addresses buckets with.
pub trait KeyHasher: Send + Sync {
    fn hash(&self, key: IndexKey) -> u32;
}

/// Downcasts the standard library's 64-bit SipHash to 32 bits.
#[derive(Default, Clone, Copy)]
pub struct DefaultKeyHasher;

impl KeyHasher for DefaultKeyHasher {
    fn hash(&self, key: IndexKey) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }
}

/// Uses the key itself as its fingerprint. Directory growth and bucket
/// placement become a function of the key's low bits, which tests rely on.
#[derive(Default, Clone, Copy)]
pub struct IdentityHasher;

impl KeyHasher for IdentityHasher {
    fn hash(&self, key: IndexKey) -> u32 {
        key
    }
}
