//! Hash-keyed cache of compiled pipelines.
//!
//! Keys are 64-bit hashes of everything a pipeline depends on. The cache
//! is never invalidated while its context lives; identical keys always
//! return the object created the first time.

use crate::error::Result;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub pipeline_count: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct PipelineCache<P> {
    pipelines: HashMap<u64, P>,
    stats: PipelineCacheStats,
}

impl<P: Copy> PipelineCache<P> {
    pub fn new() -> Self {
        Self {
            pipelines: HashMap::new(),
            stats: PipelineCacheStats::default(),
        }
    }

    /// Get the pipeline for `key`, creating it with `create` on a miss
    ///
    /// A failed creation is not cached.
    pub fn get_or_create<F>(&mut self, key: u64, create: F) -> Result<P>
    where
        F: FnOnce() -> Result<P>,
    {
        if let Some(pipeline) = self.pipelines.get(&key) {
            self.stats.hits += 1;
            return Ok(*pipeline);
        }

        self.stats.misses += 1;
        let pipeline = create()?;
        self.pipelines.insert(key, pipeline);
        self.stats.pipeline_count = self.pipelines.len();
        Ok(pipeline)
    }

    pub fn get(&self, key: u64) -> Option<P> {
        self.pipelines.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn stats(&self) -> PipelineCacheStats {
        self.stats
    }

    /// Remove every pipeline (context teardown)
    pub fn drain(&mut self) -> impl Iterator<Item = P> + '_ {
        self.stats.pipeline_count = 0;
        self.pipelines.drain().map(|(_, p)| p)
    }
}

impl<P: Copy> Default for PipelineCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "pipeline_cache_tests.rs"]
mod tests;
