/// The native API seam of the Vulkan adapter
///
/// `VulkanContext` never calls `ash` directly. Everything it needs from the
/// driver goes through `VulkanDevice`: object creation and destruction,
/// host-visible buffer writes, command recording and queue submission,
/// fences and the swapchain. Descriptions crossing the seam are plain owned
/// structs so an implementation can keep or inspect them freely.
///
/// Methods return `VkResult` with the raw driver code; the context checks
/// them with `check_vk`.

use ash::prelude::VkResult;
use ash::vk;
use dm_graphics::dmgraphics::render::PipelineState;
use std::sync::MutexGuard;

// ============================================================================
// Limits and pools
// ============================================================================

/// Device limits the context validates against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceLimits {
    pub min_uniform_buffer_offset_alignment: u32,
    pub max_per_stage_uniform_buffers: u32,
    pub max_per_stage_storage_buffers: u32,
    pub max_per_stage_samplers: u32,
    pub max_per_stage_storage_images: u32,
    pub max_image_dimension_2d: u32,
    pub max_sampler_anisotropy: f32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
            max_per_stage_uniform_buffers: 15,
            max_per_stage_storage_buffers: 4,
            max_per_stage_samplers: 16,
            max_per_stage_storage_images: 4,
            max_image_dimension_2d: 8192,
            max_sampler_anisotropy: 16.0,
        }
    }
}

/// Command pool a command buffer is allocated from
///
/// `Main` and `Upload` are only touched by the render thread. `Worker` is
/// shared with the async upload thread and must be used under
/// `VulkanDevice::lock_command_pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandPoolKind {
    Main,
    Upload,
    Worker,
}

// ============================================================================
// Object descriptions
// ============================================================================

#[derive(Debug, Clone)]
pub struct ImageDesc {
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
    pub flags: vk::ImageCreateFlags,
}

#[derive(Debug, Clone)]
pub struct ImageViewDesc {
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_u: vk::SamplerAddressMode,
    pub address_v: vk::SamplerAddressMode,
    /// Values at or below 1.0 disable anisotropic filtering
    pub max_anisotropy: f32,
    pub max_lod: f32,
}

/// Single-subpass render pass
///
/// Color attachments load their previous contents and start and end in
/// `color_layout`; the depth/stencil attachment does the same in
/// `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`. Clears are recorded inside the pass.
#[derive(Debug, Clone)]
pub struct RenderPassDesc {
    pub color_formats: Vec<vk::Format>,
    pub color_layout: vk::ImageLayout,
    pub depth_format: Option<vk::Format>,
    pub samples: vk::SampleCountFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
}

#[derive(Debug, Clone, Copy)]
pub enum DescriptorWrite {
    Buffer {
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    Image {
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub state: PipelineState,
    pub samples: vk::SampleCountFlags,
    pub color_attachment_count: u32,
    pub has_depth_stencil: bool,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub aspect: vk::ImageAspectFlags,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
    pub image_offset: vk::Offset3D,
    pub image_extent: vk::Extent3D,
}

/// One recorded command
#[derive(Debug, Clone)]
pub enum Command {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    EndRenderPass,
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: Vec<vk::DescriptorSet>,
        dynamic_offsets: Vec<u32>,
    },
    SetViewport(vk::Viewport),
    SetScissor(vk::Rect2D),
    SetDepthBias {
        constant_factor: f32,
        slope_factor: f32,
    },
    ClearColor {
        attachment: u32,
        color: [f32; 4],
        rect: vk::Rect2D,
    },
    ClearDepthStencil {
        aspect: vk::ImageAspectFlags,
        depth: f32,
        stencil: u32,
        rect: vk::Rect2D,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    PipelineBarrier(ImageBarrier),
    CopyBufferToImage {
        buffer: vk::Buffer,
        image: vk::Image,
        regions: Vec<BufferImageCopy>,
    },
}

/// One queue submission of a single command buffer
#[derive(Debug, Clone, Copy)]
pub struct Submit {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    pub signal_semaphore: Option<vk::Semaphore>,
    pub fence: vk::Fence,
}

// ============================================================================
// The device trait
// ============================================================================

pub trait VulkanDevice: Send + Sync + 'static {
    // ===== Capabilities =====

    fn limits(&self) -> DeviceLimits;

    /// Optimal-tiling features of `format`
    fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags;

    /// Best depth/stencil attachment format
    fn depth_stencil_format(&self) -> vk::Format;

    fn wait_idle(&self) -> VkResult<()>;

    // ===== Swapchain =====

    fn swapchain_extent(&self) -> vk::Extent2D;

    fn swapchain_format(&self) -> vk::Format;

    fn swapchain_images(&self) -> Vec<vk::Image>;

    /// Acquire the next image, returning `(index, suboptimal)`
    fn acquire_next_image(&self, signal: vk::Semaphore) -> VkResult<(u32, bool)>;

    /// Present `image_index`, returning whether the swapchain is suboptimal
    fn present(&self, image_index: u32, wait: vk::Semaphore) -> VkResult<bool>;

    /// Rebuild the swapchain for the current surface size
    ///
    /// The caller has already drained the device and released every view
    /// and framebuffer referencing the old images.
    fn recreate_swapchain(&self, width: u32, height: u32) -> VkResult<()>;

    // ===== Synchronization =====

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;

    fn destroy_fence(&self, fence: vk::Fence);

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    fn is_fence_signaled(&self, fence: vk::Fence) -> VkResult<bool>;

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;

    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // ===== Commands =====

    /// Serializes access to a command pool shared between threads
    fn lock_command_pool(&self, pool: CommandPoolKind) -> MutexGuard<'_, ()>;

    fn allocate_command_buffer(&self, pool: CommandPoolKind) -> VkResult<vk::CommandBuffer>;

    fn free_command_buffer(&self, pool: CommandPoolKind, command_buffer: vk::CommandBuffer);

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, one_time_submit: bool) -> VkResult<()>;

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    fn record(&self, command_buffer: vk::CommandBuffer, command: &Command);

    fn submit(&self, submit: &Submit) -> VkResult<()>;

    // ===== Memory =====

    /// Create a host-visible, persistently mapped buffer
    fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer>;

    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> VkResult<()>;

    fn destroy_buffer(&self, buffer: vk::Buffer);

    /// Create a device-local image
    fn create_image(&self, desc: &ImageDesc) -> VkResult<vk::Image>;

    fn destroy_image(&self, image: vk::Image);

    fn create_image_view(&self, image: vk::Image, desc: &ImageViewDesc) -> VkResult<vk::ImageView>;

    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_sampler(&self, desc: &SamplerDesc) -> VkResult<vk::Sampler>;

    fn destroy_sampler(&self, sampler: vk::Sampler);

    // ===== Render passes =====

    fn create_render_pass(&self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass>;

    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // ===== Programs and pipelines =====

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule>;

    fn destroy_shader_module(&self, module: vk::ShaderModule);

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> VkResult<vk::DescriptorSetLayout>;

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout]) -> VkResult<vk::PipelineLayout>;

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> VkResult<vk::Pipeline>;

    fn create_compute_pipeline(&self, layout: vk::PipelineLayout, module: vk::ShaderModule) -> VkResult<vk::Pipeline>;

    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // ===== Descriptors =====

    fn create_descriptor_pool(&self, max_sets: u32) -> VkResult<vk::DescriptorPool>;

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()>;

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet>;

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]);
}
