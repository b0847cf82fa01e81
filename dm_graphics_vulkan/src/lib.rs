/*!
# dmgraphics - Vulkan adapter

Vulkan implementation of the dmgraphics `GraphicsContext`.

The context is written against the `VulkanDevice` trait rather than `ash`
directly. `AshDevice` is the real implementation (instance, logical device,
gpu-allocator memory, swapchain and validation messenger); tests drive the
same context through a recording device.

Register the adapter with a registry to make it selectable:

```no_run
use dm_graphics::dmgraphics::{AdapterFamily, AdapterRegistry};
use dm_graphics::dmgraphics::null::NullAdapter;
use dm_graphics_vulkan::VulkanAdapter;

let mut registry = AdapterRegistry::new();
registry.register(VulkanAdapter::new());
registry.register(NullAdapter);
registry.install_adapter(AdapterFamily::Vulkan)?;
# Ok::<(), dm_graphics::dmgraphics::Error>(())
```
*/

mod ash_device;
mod ash_device_pipeline;
mod debug;
mod vulkan_adapter;
mod vulkan_buffer;
mod vulkan_check;
mod vulkan_context;
mod vulkan_descriptor_allocator;
mod vulkan_device;
mod vulkan_format;
mod vulkan_frame;
mod vulkan_pipeline;
mod vulkan_program;
mod vulkan_reflect;
mod vulkan_resource_lifecycle;
mod vulkan_sampler;
mod vulkan_scratch_buffer;
mod vulkan_swapchain;
mod vulkan_texture;

#[cfg(test)]
mod recording_device;

pub use ash_device::AshDevice;
pub use vulkan_adapter::{VulkanAdapter, VULKAN_ADAPTER_PRIORITY};
pub use vulkan_context::{VulkanContext, MAX_FRAMES_IN_FLIGHT};
pub use vulkan_device::{
    BufferImageCopy, Command, CommandPoolKind, DescriptorBinding, DescriptorWrite, DeviceLimits,
    GraphicsPipelineDesc, ImageBarrier, ImageDesc, ImageViewDesc, RenderPassDesc, SamplerDesc, Submit,
    VulkanDevice,
};
pub use vulkan_reflect::reflect_spirv;

// Validation statistics
pub use debug::{print_validation_stats_report, reset_validation_stats, validation_stats, ValidationStats};
