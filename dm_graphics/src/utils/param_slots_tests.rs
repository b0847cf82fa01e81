use super::*;

// ============================================================================
// Basic acquire tests
// ============================================================================

#[test]
fn test_sequential_acquire() {
    let mut slots = ParamSlots::new();
    assert_eq!(slots.acquire('a'), 0);
    assert_eq!(slots.acquire('b'), 1);
    assert_eq!(slots.acquire('c'), 2);
    assert_eq!(slots.get(1), Some(&'b'));
}

#[test]
fn test_new_is_empty() {
    let slots: ParamSlots<u8> = ParamSlots::default();
    assert!(slots.is_empty());
    assert_eq!(slots.capacity(), 0);
    assert!(slots.get(0).is_none());
}

// ============================================================================
// Release and recycle tests
// ============================================================================

#[test]
fn test_release_returns_payload_and_recycles() {
    let mut slots = ParamSlots::new();
    let a = slots.acquire(String::from("mip0"));
    let _b = slots.acquire(String::from("mip1"));

    assert_eq!(slots.release(a).as_deref(), Some("mip0"));
    assert_eq!(slots.len(), 1);

    // Freed index is reused, array does not grow
    assert_eq!(slots.acquire(String::from("mip2")), a);
    assert_eq!(slots.capacity(), 2);
    assert_eq!(slots.get(a).map(String::as_str), Some("mip2"));
}

#[test]
fn test_double_release_is_ignored() {
    let mut slots = ParamSlots::new();
    let a = slots.acquire(5u32);
    assert_eq!(slots.release(a), Some(5));
    assert_eq!(slots.release(a), None);
    assert_eq!(slots.len(), 0);

    // Only one copy of the index went onto the free-list
    let x = slots.acquire(1);
    let y = slots.acquire(2);
    assert_ne!(x, y);
}

#[test]
fn test_get_mut_updates_payload() {
    let mut slots = ParamSlots::new();
    let a = slots.acquire(vec![1u8, 2, 3]);
    slots.get_mut(a).unwrap().push(4);
    assert_eq!(slots.get(a).unwrap().len(), 4);
}

// ============================================================================
// Stress / pattern tests
// ============================================================================

#[test]
fn test_capacity_never_decreases() {
    let mut slots = ParamSlots::new();
    let ids: Vec<u32> = (0..100).map(|i| slots.acquire(i)).collect();
    assert_eq!(slots.capacity(), 100);

    for &id in ids.iter().filter(|id| *id % 2 == 1) {
        slots.release(id);
    }
    assert_eq!(slots.len(), 50);
    assert_eq!(slots.capacity(), 100);

    let recycled: Vec<u32> = (0..50).map(|i| slots.acquire(i)).collect();
    for id in &recycled {
        assert!(id % 2 == 1, "expected recycled odd id, got {}", id);
    }
    assert_eq!(slots.capacity(), 100);
    assert_eq!(slots.acquire(0), 100);
}
