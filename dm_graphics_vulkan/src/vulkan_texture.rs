/// Textures and render targets of the Vulkan context
///
/// Both live in the context's `AssetHandleContainer` as a `VulkanAsset`.
/// A texture owns its image and view; the image is created on the first
/// `set_texture` that carries a format, and recreated whenever the format
/// or size changes. `layout` tracks the layout of the whole image between
/// command buffers.

use crate::vulkan_device::{BufferImageCopy, Command, ImageBarrier, ImageDesc, ImageViewDesc, VulkanDevice};
use crate::vulkan_check::check_vk;
use crate::vulkan_format::{format_aspect, is_depth_format, texture_type_to_vk};
use crate::vulkan_resource_lifecycle::{ResourceState, ResourceToDestroy};
use ash::vk;
use dm_graphics::dmgraphics::render::{
    SamplerParams, TextureCreationParams, TextureFormat, TextureInfo, TextureParams, TextureType, TextureUsageFlags,
};
use dm_graphics::dmgraphics::utils::TextureHandle;
use dm_graphics::dmgraphics::{Error, Result};
use std::borrow::Cow;

pub struct VulkanTexture {
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub mip_map_count: u8,
    pub layer_count: u8,
    pub usage_hint: TextureUsageFlags,
    pub format: Option<TextureFormat>,
    pub vk_format: vk::Format,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub samples: u32,
    pub sampler: SamplerParams,
    pub state: ResourceState,
    /// One bit per mip level with an async upload in flight
    pub data_pending: u32,
    /// Fence of the last async upload submission, until it is known complete
    pub pending_upload: Option<vk::Fence>,
}

impl VulkanTexture {
    pub fn new(params: &TextureCreationParams) -> Self {
        let layer_count = match params.texture_type {
            TextureType::TextureCube => 6,
            _ => params.layer_count.max(1),
        };
        Self {
            texture_type: params.texture_type,
            width: params.width,
            height: params.height,
            depth: params.depth.max(1),
            original_width: params.original_width,
            original_height: params.original_height,
            mip_map_count: params.mip_map_count.max(1),
            layer_count,
            usage_hint: params.usage_hint,
            format: None,
            vk_format: vk::Format::UNDEFINED,
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            layout: vk::ImageLayout::UNDEFINED,
            samples: 1,
            sampler: SamplerParams::default(),
            state: ResourceState::default(),
            data_pending: 0,
            pending_upload: None,
        }
    }

    pub fn info(&self) -> TextureInfo {
        TextureInfo {
            texture_type: self.texture_type,
            format: self.format,
            width: self.width,
            height: self.height,
            depth: self.depth,
            mip_map_count: self.mip_map_count,
            layer_count: self.layer_count,
            usage_hint: self.usage_hint,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.image != vk::Image::null()
    }

    /// Whether the native image must be (re)created for this upload
    pub fn needs_allocation(&self, params: &TextureParams) -> bool {
        if params.sub_update {
            return !self.is_allocated();
        }
        !self.is_allocated()
            || self.format != Some(params.format)
            || (params.mip_map == 0 && (self.width != params.width || self.height != params.height))
    }

    /// Reject an upload that falls outside the mips or layers of the image
    ///
    /// Full uploads cover the whole mip; sub-updates are placed at
    /// `x`/`y`/`z`. Runs against the image as currently allocated.
    pub fn check_upload_region(&self, params: &TextureParams) -> Result<()> {
        if params.mip_map >= self.mip_map_count {
            return Err(Error::InvalidResource(format!(
                "Mip level {} is out of range, the texture has {} levels",
                params.mip_map, self.mip_map_count
            )));
        }
        let mip = u32::from(params.mip_map);
        let mip_width = (self.width >> mip).max(1);
        let mip_height = (self.height >> mip).max(1);
        let (x, y) = if params.sub_update { (params.x, params.y) } else { (0, 0) };
        let width = params.width.max(1);
        let height = params.height.max(1);
        if u64::from(x) + u64::from(width) > u64::from(mip_width) || u64::from(y) + u64::from(height) > u64::from(mip_height) {
            return Err(Error::InvalidResource(format!(
                "Upload of {}x{} at ({}, {}) exceeds mip {} of size {}x{}",
                width, height, x, y, mip, mip_width, mip_height
            )));
        }

        if self.texture_type == TextureType::Texture3D {
            let mip_depth = (self.depth >> mip).max(1);
            let z = if params.sub_update { params.z } else { 0 };
            if u64::from(z) + u64::from(params.depth.max(1)) > u64::from(mip_depth) {
                return Err(Error::InvalidResource(format!(
                    "Upload depth {} at {} exceeds mip {} depth {}",
                    params.depth.max(1), z, mip, mip_depth
                )));
            }
        } else if params.sub_update {
            let layers = u64::from(params.layer_count.max(1));
            if u64::from(params.z) + layers > u64::from(self.array_layers()) {
                return Err(Error::InvalidResource(format!(
                    "Upload of {} layers at layer {} exceeds the {} layers of the texture",
                    layers,
                    params.z,
                    self.array_layers()
                )));
            }
        }
        Ok(())
    }

    /// Layout the image rests in while it can be sampled
    pub fn shader_read_layout(&self) -> vk::ImageLayout {
        if self.usage_hint.contains(TextureUsageFlags::STORAGE) {
            vk::ImageLayout::GENERAL
        } else {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        }
    }

    /// Layout the image is left in between uses
    pub fn resting_layout(&self) -> vk::ImageLayout {
        if is_depth_format(self.vk_format) {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else {
            self.shader_read_layout()
        }
    }

    /// Allocated and holding data in its resting layout
    pub fn is_ready(&self) -> bool {
        self.is_allocated() && self.layout == self.resting_layout()
    }

    pub fn image_usage(&self, vk_format: vk::Format) -> vk::ImageUsageFlags {
        let mut usage = vk::ImageUsageFlags::TRANSFER_DST;
        if is_depth_format(vk_format) {
            usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            usage |= vk::ImageUsageFlags::SAMPLED;
            if self.usage_hint.contains(TextureUsageFlags::COLOR) {
                usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
            }
            if self.usage_hint.contains(TextureUsageFlags::STORAGE) {
                usage |= vk::ImageUsageFlags::STORAGE;
            }
            if self.usage_hint.contains(TextureUsageFlags::INPUT) {
                usage |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
            }
        }
        usage
    }

    pub fn image_desc(&self, vk_format: vk::Format) -> ImageDesc {
        let (image_type, _, flags) = texture_type_to_vk(self.texture_type);
        let depth = if self.texture_type == TextureType::Texture3D { self.depth } else { 1 };
        ImageDesc {
            image_type,
            format: vk_format,
            extent: vk::Extent3D { width: self.width.max(1), height: self.height.max(1), depth },
            mip_levels: u32::from(self.mip_map_count),
            array_layers: self.array_layers(),
            samples: crate::vulkan_format::sample_count_to_vk(self.samples),
            usage: self.image_usage(vk_format),
            flags,
        }
    }

    pub fn view_desc(&self, vk_format: vk::Format) -> ImageViewDesc {
        let (_, view_type, _) = texture_type_to_vk(self.texture_type);
        let aspect = if is_depth_format(vk_format) {
            format_aspect(vk_format)
        } else {
            vk::ImageAspectFlags::COLOR
        };
        ImageViewDesc {
            view_type,
            format: vk_format,
            aspect,
            mip_levels: u32::from(self.mip_map_count),
            array_layers: self.array_layers(),
        }
    }

    pub fn array_layers(&self) -> u32 {
        match self.texture_type {
            TextureType::Texture3D => 1,
            _ => u32::from(self.layer_count.max(1)),
        }
    }

    /// Create the image and view for `format` at the current size
    pub fn allocate<D: VulkanDevice>(&mut self, device: &D, format: TextureFormat, vk_format: vk::Format, verify: bool) -> Result<()> {
        let image = check_vk(device.create_image(&self.image_desc(vk_format)), "vkCreateImage", verify)?;
        let view = match check_vk(device.create_image_view(image, &self.view_desc(vk_format)), "vkCreateImageView", verify) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_image(image);
                return Err(e);
            }
        };
        self.image = image;
        self.view = view;
        self.layout = vk::ImageLayout::UNDEFINED;
        self.format = Some(format);
        self.vk_format = vk_format;
        self.state = ResourceState::default();
        Ok(())
    }

    /// Detach the native objects for deferred destruction
    pub fn take_native_objects(&mut self) -> Vec<ResourceToDestroy> {
        let mut objects = Vec::with_capacity(2);
        if self.view != vk::ImageView::null() {
            objects.push(ResourceToDestroy::ImageView(std::mem::take(&mut self.view)));
        }
        if self.image != vk::Image::null() {
            objects.push(ResourceToDestroy::Image(std::mem::take(&mut self.image)));
        }
        self.layout = vk::ImageLayout::UNDEFINED;
        objects
    }

    /// Barrier moving the whole image from its tracked layout to `new_layout`
    pub fn transition(&mut self, new_layout: vk::ImageLayout) -> ImageBarrier {
        let barrier = layout_barrier(
            self.image,
            format_aspect(self.vk_format),
            self.layout,
            new_layout,
            u32::from(self.mip_map_count),
            self.array_layers(),
        );
        self.layout = new_layout;
        barrier
    }
}

/// Barrier between two layouts with stage and access masks derived from them
pub fn layout_barrier(
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    mip_levels: u32,
    array_layers: u32,
) -> ImageBarrier {
    let (src_stage, src_access) = layout_stage_access(old_layout, true);
    let (dst_stage, dst_access) = layout_stage_access(new_layout, false);
    ImageBarrier {
        image,
        aspect,
        old_layout,
        new_layout,
        mip_levels,
        array_layers,
        src_stage,
        dst_stage,
        src_access,
        dst_access,
    }
}

fn layout_stage_access(layout: vk::ImageLayout, source: bool) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match layout {
        vk::ImageLayout::UNDEFINED => (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ,
        ),
        vk::ImageLayout::GENERAL => (
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => {
            if source {
                (vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags::empty())
            } else {
                (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty())
            }
        }
        _ => (vk::PipelineStageFlags::ALL_COMMANDS, vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE),
    }
}

// ============================================================================
// Uploads
// ============================================================================

/// Bytes to stage for an upload, expanded to four channels when the
/// image was created as RGBA for an RGB texture
pub fn staging_bytes<'a>(format: TextureFormat, vk_format: vk::Format, data: &'a [u8]) -> Cow<'a, [u8]> {
    if format == TextureFormat::Rgb && vk_format == vk::Format::R8G8B8A8_UNORM {
        let mut expanded = Vec::with_capacity(data.len() / 3 * 4);
        for pixel in data.chunks_exact(3) {
            expanded.extend_from_slice(pixel);
            expanded.push(255);
        }
        Cow::Owned(expanded)
    } else {
        Cow::Borrowed(data)
    }
}

/// Copy regions of one upload, one per array layer
///
/// Layers are laid out back to back in the staging data.
pub fn copy_regions(texture: &VulkanTexture, params: &TextureParams, staged_len: usize) -> Vec<BufferImageCopy> {
    let aspect = format_aspect(texture.vk_format);
    let depth = if texture.texture_type == TextureType::Texture3D { params.depth.max(1) } else { 1 };
    let extent = vk::Extent3D { width: params.width.max(1), height: params.height.max(1), depth };
    let offset = if params.sub_update {
        vk::Offset3D { x: params.x as i32, y: params.y as i32, z: params.z as i32 }
    } else {
        vk::Offset3D::default()
    };

    let (first_layer, layer_count) = match texture.texture_type {
        TextureType::Texture3D => (0, 1),
        _ if params.sub_update => (params.z, u32::from(params.layer_count.max(1))),
        _ => (0, texture.array_layers()),
    };
    let layer_size = staged_len / layer_count.max(1) as usize;

    (0..layer_count)
        .map(|layer| BufferImageCopy {
            buffer_offset: (layer as usize * layer_size) as u64,
            aspect,
            mip_level: u32::from(params.mip_map),
            base_array_layer: first_layer + layer,
            layer_count: 1,
            image_offset: if texture.texture_type == TextureType::Texture3D {
                offset
            } else {
                vk::Offset3D { z: 0, ..offset }
            },
            image_extent: extent,
        })
        .collect()
}

/// Record transition, copy and transition back into `command_buffer`
pub fn record_upload<D: VulkanDevice>(
    device: &D,
    command_buffer: vk::CommandBuffer,
    texture: &mut VulkanTexture,
    staging: vk::Buffer,
    regions: Vec<BufferImageCopy>,
) {
    let to_transfer = texture.transition(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    device.record(command_buffer, &Command::PipelineBarrier(to_transfer));
    device.record(command_buffer, &Command::CopyBufferToImage { buffer: staging, image: texture.image, regions });
    let to_read = texture.transition(texture.resting_layout());
    device.record(command_buffer, &Command::PipelineBarrier(to_read));
}

// ============================================================================
// Render targets
// ============================================================================

pub struct VulkanRenderTarget {
    /// Unique per render target; part of pipeline keys
    pub id: u64,
    pub color_textures: Vec<TextureHandle>,
    pub depth_stencil_texture: Option<TextureHandle>,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub samples: u32,
    pub state: ResourceState,
}

impl VulkanRenderTarget {
    pub fn take_native_objects(&mut self) -> Vec<ResourceToDestroy> {
        let mut objects = Vec::with_capacity(2);
        if self.framebuffer != vk::Framebuffer::null() {
            objects.push(ResourceToDestroy::Framebuffer(std::mem::take(&mut self.framebuffer)));
        }
        if self.render_pass != vk::RenderPass::null() {
            objects.push(ResourceToDestroy::RenderPass(std::mem::take(&mut self.render_pass)));
        }
        objects
    }
}

pub enum VulkanAsset {
    Texture(VulkanTexture),
    RenderTarget(VulkanRenderTarget),
}

impl VulkanAsset {
    pub fn texture(&self) -> Option<&VulkanTexture> {
        match self {
            VulkanAsset::Texture(texture) => Some(texture),
            VulkanAsset::RenderTarget(_) => None,
        }
    }

    pub fn texture_mut(&mut self) -> Option<&mut VulkanTexture> {
        match self {
            VulkanAsset::Texture(texture) => Some(texture),
            VulkanAsset::RenderTarget(_) => None,
        }
    }

    pub fn render_target(&self) -> Option<&VulkanRenderTarget> {
        match self {
            VulkanAsset::RenderTarget(render_target) => Some(render_target),
            VulkanAsset::Texture(_) => None,
        }
    }

    pub fn render_target_mut(&mut self) -> Option<&mut VulkanRenderTarget> {
        match self {
            VulkanAsset::RenderTarget(render_target) => Some(render_target),
            VulkanAsset::Texture(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "vulkan_texture_tests.rs"]
mod tests;
