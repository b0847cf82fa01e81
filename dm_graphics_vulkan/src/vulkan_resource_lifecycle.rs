/// Deferred destruction of native objects
///
/// Two paths release GPU objects that a submitted command buffer may still
/// reference:
///
/// - `ResourcesToDestroy` holds one list per frame-in-flight slot. A resource
///   is queued on the slot it was last used in and released when that slot
///   is begun again, after its fence was waited on.
/// - `FenceResourcesToDestroy` holds objects of one-off submissions (async
///   uploads). Each entry owns the submission's fence and is released by
///   `flush` once that fence has signaled.
///
/// The CPU-side object is marked destroyed immediately, so its handle can be
/// reused while the native objects are still alive.

use crate::vulkan_context::MAX_FRAMES_IN_FLIGHT;
use crate::vulkan_device::{CommandPoolKind, VulkanDevice};
use ash::vk;
use dm_graphics::dmgraphics::utils::TextureHandle;
use dm_graphics::{dm_error, dm_trace};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceToDestroy {
    Buffer(vk::Buffer),
    Image(vk::Image),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Framebuffer(vk::Framebuffer),
    RenderPass(vk::RenderPass),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    ShaderModule(vk::ShaderModule),
    DescriptorPool(vk::DescriptorPool),
    Semaphore(vk::Semaphore),
}

impl ResourceToDestroy {
    pub fn destroy<D: VulkanDevice>(self, device: &D) {
        match self {
            ResourceToDestroy::Buffer(buffer) => device.destroy_buffer(buffer),
            ResourceToDestroy::Image(image) => device.destroy_image(image),
            ResourceToDestroy::ImageView(view) => device.destroy_image_view(view),
            ResourceToDestroy::Sampler(sampler) => device.destroy_sampler(sampler),
            ResourceToDestroy::Framebuffer(framebuffer) => device.destroy_framebuffer(framebuffer),
            ResourceToDestroy::RenderPass(render_pass) => device.destroy_render_pass(render_pass),
            ResourceToDestroy::Pipeline(pipeline) => device.destroy_pipeline(pipeline),
            ResourceToDestroy::PipelineLayout(layout) => device.destroy_pipeline_layout(layout),
            ResourceToDestroy::DescriptorSetLayout(layout) => device.destroy_descriptor_set_layout(layout),
            ResourceToDestroy::ShaderModule(module) => device.destroy_shader_module(module),
            ResourceToDestroy::DescriptorPool(pool) => device.destroy_descriptor_pool(pool),
            ResourceToDestroy::Semaphore(semaphore) => device.destroy_semaphore(semaphore),
        }
    }
}

/// Usage bookkeeping carried by every GPU-backed object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceState {
    last_used_frame: Option<usize>,
    destroyed: bool,
}

impl ResourceState {
    /// Record a use in frame-in-flight slot `frame`
    pub fn touch(&mut self, frame: usize) {
        debug_assert!(!self.destroyed, "touching a resource after its destruction was requested");
        self.last_used_frame = Some(frame);
    }

    pub fn last_used_frame(&self) -> Option<usize> {
        self.last_used_frame
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

// ============================================================================
// Frame-indexed deferral
// ============================================================================

pub struct ResourcesToDestroy {
    lists: [Vec<ResourceToDestroy>; MAX_FRAMES_IN_FLIGHT],
}

impl ResourcesToDestroy {
    pub fn new() -> Self {
        Self {
            lists: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Mark `state` destroyed and queue its native objects
    ///
    /// Objects go to the slot the resource was last used in, or to
    /// `current_frame` when it was never used.
    pub fn destroy_deferred<I>(&mut self, state: &mut ResourceState, current_frame: usize, resources: I)
    where
        I: IntoIterator<Item = ResourceToDestroy>,
    {
        debug_assert!(!state.destroyed, "resource destroyed twice");
        state.destroyed = true;
        let frame = state.last_used_frame.unwrap_or(current_frame);
        self.lists[frame % MAX_FRAMES_IN_FLIGHT].extend(resources);
    }

    /// Queue an object without state on slot `frame`
    pub fn push(&mut self, frame: usize, resource: ResourceToDestroy) {
        self.lists[frame % MAX_FRAMES_IN_FLIGHT].push(resource);
    }

    pub fn pending(&self, frame: usize) -> usize {
        self.lists[frame % MAX_FRAMES_IN_FLIGHT].len()
    }

    /// Release everything queued on slot `frame`
    ///
    /// Only valid once the slot's fence has signaled.
    pub fn flush<D: VulkanDevice>(&mut self, frame: usize, device: &D) -> usize {
        let list = &mut self.lists[frame % MAX_FRAMES_IN_FLIGHT];
        let count = list.len();
        for resource in list.drain(..) {
            resource.destroy(device);
        }
        if count > 0 {
            dm_trace!("dmgraphics::vulkan", "Released {} deferred resource(s) of frame {}", count, frame);
        }
        count
    }

    /// Release every slot; the device must be idle
    pub fn flush_all<D: VulkanDevice>(&mut self, device: &D) -> usize {
        (0..MAX_FRAMES_IN_FLIGHT).map(|frame| self.flush(frame, device)).sum()
    }
}

impl Default for ResourcesToDestroy {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Fence-gated deferral
// ============================================================================

/// Objects of one submission, released when `fence` signals
#[derive(Debug, Clone)]
pub struct FenceResources {
    pub fence: vk::Fence,
    pub command_buffer: Option<(CommandPoolKind, vk::CommandBuffer)>,
    pub resources: Vec<ResourceToDestroy>,
    /// Texture whose `pending_upload` holds `fence`
    pub texture: Option<TextureHandle>,
}

pub struct FenceResourcesToDestroy {
    entries: FxHashMap<u64, FenceResources>,
    next_key: u64,
    released_uploads: Vec<(TextureHandle, vk::Fence)>,
}

impl FenceResourcesToDestroy {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            next_key: 1,
            released_uploads: Vec::new(),
        }
    }

    /// Register a pending submission, returning its key
    pub fn register(&mut self, entry: FenceResources) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.entries.insert(key, entry);
        key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_fence(&self, fence: vk::Fence) -> bool {
        self.entries.values().any(|e| e.fence == fence)
    }

    /// Release every entry whose fence has signaled
    pub fn flush<D: VulkanDevice>(&mut self, device: &D) -> usize {
        let mut signaled = Vec::new();
        for (key, entry) in &self.entries {
            match device.is_fence_signaled(entry.fence) {
                Ok(true) => signaled.push(*key),
                Ok(false) => {}
                Err(e) => dm_error!("dmgraphics::vulkan", "Failed to query upload fence: {:?}", e),
            }
        }

        let count = signaled.len();
        for key in signaled {
            if let Some(entry) = self.entries.remove(&key) {
                if let Some(texture) = entry.texture {
                    self.released_uploads.push((texture, entry.fence));
                }
                Self::release(device, entry);
            }
        }
        count
    }

    /// Textures whose upload fence was destroyed by `flush` since the last call
    pub fn take_released_uploads(&mut self) -> Vec<(TextureHandle, vk::Fence)> {
        std::mem::take(&mut self.released_uploads)
    }

    /// Block until `fence` signals, then release its entry
    ///
    /// Returns false when no entry owns `fence` (already released).
    pub fn wait<D: VulkanDevice>(&mut self, device: &D, fence: vk::Fence) -> bool {
        let Some(key) = self.entries.iter().find(|(_, e)| e.fence == fence).map(|(k, _)| *k) else {
            return false;
        };
        if let Err(e) = device.wait_for_fence(fence, u64::MAX) {
            dm_error!("dmgraphics::vulkan", "Failed to wait for upload fence: {:?}", e);
        }
        if let Some(entry) = self.entries.remove(&key) {
            Self::release(device, entry);
        }
        true
    }

    /// Wait for and release every entry
    pub fn drain<D: VulkanDevice>(&mut self, device: &D) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            if let Err(e) = device.wait_for_fence(entry.fence, u64::MAX) {
                dm_error!("dmgraphics::vulkan", "Failed to wait for upload fence: {:?}", e);
            }
            Self::release(device, entry);
        }
        count
    }

    fn release<D: VulkanDevice>(device: &D, entry: FenceResources) {
        for resource in entry.resources {
            resource.destroy(device);
        }
        if let Some((pool, command_buffer)) = entry.command_buffer {
            let _guard = device.lock_command_pool(pool);
            device.free_command_buffer(pool, command_buffer);
        }
        device.destroy_fence(entry.fence);
    }
}

impl Default for FenceResourcesToDestroy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "vulkan_resource_lifecycle_tests.rs"]
mod tests;
