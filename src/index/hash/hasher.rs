use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// The 32-bit hash the directory consults. Pluggable so typed indexes can
/// bring their own function and tests can force collisions.
pub trait KeyHasher<K>: Send + Sync {
    fn hash_key(&self, key: &K) -> u32;
}

/// Default key hash: the std hasher with its fixed default keys, truncated
/// to 32 bits. Deterministic across runs and processes, which a
/// disk-resident directory requires.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyHasher;

impl<K: Hash> KeyHasher<K> for DefaultKeyHasher {
    fn hash_key(&self, key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }
}
