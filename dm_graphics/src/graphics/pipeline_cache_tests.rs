use super::*;
use crate::error::Error;
use std::cell::Cell;

#[test]
fn test_same_key_creates_once() {
    let mut cache = PipelineCache::new();
    let created = Cell::new(0u32);
    let create = || {
        created.set(created.get() + 1);
        Ok(created.get())
    };

    assert_eq!(cache.get_or_create(42, create).unwrap(), 1);
    assert_eq!(cache.get_or_create(42, create).unwrap(), 1);
    assert_eq!(created.get(), 1);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.pipeline_count, 1);
}

#[test]
fn test_distinct_keys_create_distinct_pipelines() {
    let mut cache = PipelineCache::new();
    let a = cache.get_or_create(1, || Ok(100u64)).unwrap();
    let b = cache.get_or_create(2, || Ok(200u64)).unwrap();
    assert_ne!(a, b);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(2), Some(200));
}

#[test]
fn test_failed_creation_is_not_cached() {
    let mut cache: PipelineCache<u32> = PipelineCache::default();
    let result = cache.get_or_create(7, || Err(Error::BackendError("compile".to_string())));
    assert!(result.is_err());
    assert!(cache.is_empty());

    assert_eq!(cache.get_or_create(7, || Ok(3)).unwrap(), 3);
}

#[test]
fn test_drain_empties_cache() {
    let mut cache = PipelineCache::new();
    cache.get_or_create(1, || Ok(1u8)).unwrap();
    cache.get_or_create(2, || Ok(2u8)).unwrap();
    let mut drained: Vec<u8> = cache.drain().collect();
    drained.sort();
    assert_eq!(drained, vec![1, 2]);
    assert!(cache.is_empty());
}
