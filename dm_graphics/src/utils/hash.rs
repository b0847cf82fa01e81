/// Stable 64-bit hashing for names and pipeline keys
///
/// All identifiers hashed here (uniform names, vertex stream names,
/// pipeline keys) go through `FxHasher` so the same input always
/// produces the same value within a build.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Hash a resource or stream name
pub fn hash_name(name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Incremental hash builder for composite keys
#[derive(Default)]
pub struct HashState {
    hasher: FxHasher,
}

impl HashState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed any hashable value
    pub fn update<T: Hash + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.hash(&mut self.hasher);
        self
    }

    pub fn finish(&self) -> u64 {
        self.hasher.finish()
    }
}
