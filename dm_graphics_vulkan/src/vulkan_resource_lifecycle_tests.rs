use super::*;
use crate::recording_device::RecordingDevice;
use ash::vk::Handle;

fn buffer(raw: u64) -> ResourceToDestroy {
    ResourceToDestroy::Buffer(vk::Buffer::from_raw(raw))
}

// ============================================================================
// ResourceState
// ============================================================================

#[test]
fn test_touch_records_frame() {
    let mut state = ResourceState::default();
    assert_eq!(state.last_used_frame(), None);
    state.touch(1);
    assert_eq!(state.last_used_frame(), Some(1));
    assert!(!state.is_destroyed());
}

#[test]
#[should_panic]
#[cfg(debug_assertions)]
fn test_touch_after_destroy_panics_in_debug() {
    let mut list = ResourcesToDestroy::new();
    let mut state = ResourceState::default();
    list.destroy_deferred(&mut state, 0, [buffer(1)]);
    state.touch(0);
}

// ============================================================================
// Frame-indexed deferral
// ============================================================================

#[test]
fn test_deferred_goes_to_last_used_frame() {
    let mut list = ResourcesToDestroy::new();
    let mut state = ResourceState::default();
    state.touch(1);

    list.destroy_deferred(&mut state, 0, [buffer(10), buffer(11)]);

    assert!(state.is_destroyed());
    assert_eq!(list.pending(0), 0);
    assert_eq!(list.pending(1), 2);
}

#[test]
fn test_untouched_goes_to_current_frame() {
    let mut list = ResourcesToDestroy::new();
    let mut state = ResourceState::default();
    list.destroy_deferred(&mut state, 1, [buffer(10)]);
    assert_eq!(list.pending(1), 1);
}

#[test]
fn test_flush_releases_only_that_frame() {
    let device = RecordingDevice::new();
    let mut list = ResourcesToDestroy::new();
    list.push(0, buffer(10));
    list.push(1, buffer(11));

    assert_eq!(list.flush(0, &device), 1);
    assert!(device.is_destroyed(vk::Buffer::from_raw(10)));
    assert!(!device.is_destroyed(vk::Buffer::from_raw(11)));
    assert_eq!(list.pending(1), 1);

    assert_eq!(list.flush_all(&device), 1);
    assert!(device.is_destroyed(vk::Buffer::from_raw(11)));
}

#[test]
fn test_destroy_dispatches_by_kind() {
    let device = RecordingDevice::new();
    ResourceToDestroy::Pipeline(vk::Pipeline::from_raw(5)).destroy(&device);
    ResourceToDestroy::ImageView(vk::ImageView::from_raw(6)).destroy(&device);
    assert_eq!(device.destroyed("pipeline"), 1);
    assert_eq!(device.destroyed("image_view"), 1);
}

// ============================================================================
// Fence-gated deferral
// ============================================================================

#[test]
fn test_fence_entry_waits_for_signal() {
    let device = RecordingDevice::new();
    let fence = device.create_fence(false).unwrap();
    let mut pending = FenceResourcesToDestroy::new();
    pending.register(FenceResources {
        fence,
        command_buffer: None,
        resources: vec![buffer(42)],
        texture: None,
    });

    assert_eq!(pending.flush(&device), 0);
    assert!(!device.is_destroyed(vk::Buffer::from_raw(42)));

    device.signal_fence(fence);
    assert_eq!(pending.flush(&device), 1);
    assert!(device.is_destroyed(vk::Buffer::from_raw(42)));
    assert!(device.is_destroyed(fence));
    assert!(pending.is_empty());
}

#[test]
fn test_fence_entry_frees_command_buffer() {
    let device = RecordingDevice::new();
    let fence = device.create_fence(true).unwrap();
    let command_buffer = device.allocate_command_buffer(CommandPoolKind::Worker).unwrap();
    let mut pending = FenceResourcesToDestroy::new();
    pending.register(FenceResources {
        fence,
        command_buffer: Some((CommandPoolKind::Worker, command_buffer)),
        resources: Vec::new(),
        texture: None,
    });

    pending.flush(&device);
    assert!(device.is_destroyed(command_buffer));
}

#[test]
fn test_wait_blocks_on_specific_fence() {
    let device = RecordingDevice::new();
    let first = device.create_fence(false).unwrap();
    let second = device.create_fence(false).unwrap();
    let mut pending = FenceResourcesToDestroy::new();
    pending.register(FenceResources { fence: first, command_buffer: None, resources: vec![buffer(1)], texture: None });
    pending.register(FenceResources { fence: second, command_buffer: None, resources: vec![buffer(2)], texture: None });

    assert!(pending.wait(&device, first));
    assert_eq!(device.state().waited_fences, vec![first]);
    assert!(device.is_destroyed(vk::Buffer::from_raw(1)));
    assert!(!device.is_destroyed(vk::Buffer::from_raw(2)));
    assert!(pending.contains_fence(second));
    assert!(!pending.contains_fence(first));

    // Already released
    assert!(!pending.wait(&device, first));
}

#[test]
fn test_drain_releases_everything() {
    let device = RecordingDevice::new();
    let mut pending = FenceResourcesToDestroy::new();
    for raw in 0..3 {
        let fence = device.create_fence(false).unwrap();
        pending.register(FenceResources { fence, command_buffer: None, resources: vec![buffer(100 + raw)], texture: None });
    }
    assert_eq!(pending.len(), 3);
    assert_eq!(pending.drain(&device), 3);
    assert_eq!(device.destroyed("buffer"), 3);
    assert_eq!(device.live_fences(), 0);
}
