/// Frame-in-flight resources and the swapchain pass
///
/// Each frame slot owns the command buffer it records into, the fence that
/// tells when the GPU is done with it, the semaphore signaled by image
/// acquisition, a uniform scratch buffer and a descriptor allocator. The
/// main pass owns everything tied to the swapchain images and is rebuilt
/// whenever the swapchain is.

use crate::vulkan_check::check_vk;
use crate::vulkan_descriptor_allocator::DescriptorAllocator;
use crate::vulkan_device::{CommandPoolKind, ImageViewDesc, RenderPassDesc, Submit, VulkanDevice};
use crate::vulkan_pipeline::PassInfo;
use crate::vulkan_scratch_buffer::{ScratchBuffer, SCRATCH_BUFFER_SIZE};
use crate::vulkan_texture::VulkanTexture;
use ash::vk;
use dm_graphics::dm_debug;
use dm_graphics::dmgraphics::render::{TextureCreationParams, TextureFormat, TextureUsageFlags};
use dm_graphics::dmgraphics::Result;

// ============================================================================
// Frame resources
// ============================================================================

pub struct FrameResources {
    pub command_buffer: vk::CommandBuffer,
    /// Created signaled so the first wait on the slot returns at once
    pub fence: vk::Fence,
    pub image_available: vk::Semaphore,
    pub scratch: ScratchBuffer,
    pub descriptors: DescriptorAllocator,
}

impl FrameResources {
    pub fn new<D: VulkanDevice>(device: &D, uniform_alignment: u32, verify: bool) -> Result<Self> {
        let command_buffer = check_vk(
            device.allocate_command_buffer(CommandPoolKind::Main),
            "vkAllocateCommandBuffers",
            verify,
        )?;
        let fence = check_vk(device.create_fence(true), "vkCreateFence", verify)?;
        let image_available = check_vk(device.create_semaphore(), "vkCreateSemaphore", verify)?;
        let scratch = ScratchBuffer::new(device, SCRATCH_BUFFER_SIZE, uniform_alignment, verify)?;
        let descriptors = DescriptorAllocator::new(device, verify)?;
        Ok(Self {
            command_buffer,
            fence,
            image_available,
            scratch,
            descriptors,
        })
    }

    /// Release everything; the device must be idle
    pub fn destroy<D: VulkanDevice>(&mut self, device: &D) {
        self.scratch.destroy(device);
        self.descriptors.destroy(device);
        device.destroy_semaphore(self.image_available);
        device.destroy_fence(self.fence);
        device.free_command_buffer(CommandPoolKind::Main, self.command_buffer);
    }
}

// ============================================================================
// Main pass
// ============================================================================

pub struct MainPass {
    pub render_pass: vk::RenderPass,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    /// Signaled by the frame submission, waited on by present; one per image
    pub render_finished: Vec<vk::Semaphore>,
    pub depth: VulkanTexture,
}

impl MainPass {
    pub fn new<D: VulkanDevice>(device: &D, verify: bool) -> Result<Self> {
        let color_format = device.swapchain_format();
        let depth_format = device.depth_stencil_format();
        let render_pass = check_vk(
            device.create_render_pass(&RenderPassDesc {
                color_formats: vec![color_format],
                color_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                depth_format: Some(depth_format),
                samples: vk::SampleCountFlags::TYPE_1,
            }),
            "vkCreateRenderPass",
            verify,
        )?;

        let mut pass = Self {
            render_pass,
            color_format,
            depth_format,
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            render_finished: Vec::new(),
            depth: VulkanTexture::new(&TextureCreationParams {
                usage_hint: TextureUsageFlags::empty(),
                ..Default::default()
            }),
        };
        pass.create_swapchain_objects(device, verify)?;
        Ok(pass)
    }

    pub fn pass_info(&self) -> PassInfo {
        PassInfo {
            id: 0,
            render_pass: self.render_pass,
            samples: 1,
            color_attachment_count: 1,
            has_depth_stencil: true,
        }
    }

    fn create_swapchain_objects<D: VulkanDevice>(&mut self, device: &D, verify: bool) -> Result<()> {
        self.extent = device.swapchain_extent();
        self.images = device.swapchain_images();

        self.depth.width = self.extent.width;
        self.depth.height = self.extent.height;
        self.depth.allocate(device, TextureFormat::Depth, self.depth_format, verify)?;

        for image in &self.images {
            let view = check_vk(
                device.create_image_view(
                    *image,
                    &ImageViewDesc {
                        view_type: vk::ImageViewType::TYPE_2D,
                        format: self.color_format,
                        aspect: vk::ImageAspectFlags::COLOR,
                        mip_levels: 1,
                        array_layers: 1,
                    },
                ),
                "vkCreateImageView(swapchain)",
                verify,
            )?;
            self.views.push(view);

            let framebuffer = check_vk(
                device.create_framebuffer(self.render_pass, &[view, self.depth.view], self.extent),
                "vkCreateFramebuffer(swapchain)",
                verify,
            )?;
            self.framebuffers.push(framebuffer);

            self.render_finished
                .push(check_vk(device.create_semaphore(), "vkCreateSemaphore", verify)?);
        }

        dm_debug!(
            "dmgraphics::vulkan",
            "Swapchain objects created: {} images, {}x{}",
            self.images.len(),
            self.extent.width,
            self.extent.height
        );
        Ok(())
    }

    fn release_swapchain_objects<D: VulkanDevice>(&mut self, device: &D) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
        for view in self.views.drain(..) {
            device.destroy_image_view(view);
        }
        for semaphore in self.render_finished.drain(..) {
            device.destroy_semaphore(semaphore);
        }
        for object in self.depth.take_native_objects() {
            object.destroy(device);
        }
        self.images.clear();
    }

    /// Rebuild the swapchain and everything referencing its images
    pub fn recreate<D: VulkanDevice>(&mut self, device: &D, width: u32, height: u32, verify: bool) -> Result<()> {
        check_vk(device.wait_idle(), "vkDeviceWaitIdle", verify)?;
        self.release_swapchain_objects(device);
        check_vk(device.recreate_swapchain(width, height), "recreate swapchain", verify)?;
        self.create_swapchain_objects(device, verify)
    }

    /// Release everything; the device must be idle
    pub fn destroy<D: VulkanDevice>(&mut self, device: &D) {
        self.release_swapchain_objects(device);
        if self.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(std::mem::take(&mut self.render_pass));
        }
    }
}

// ============================================================================
// One-time submissions
// ============================================================================

/// Record and submit a one-time command buffer from `pool`
///
/// Returns the command buffer and the fence its submission signals; the
/// caller releases both once the fence is signaled. The pool lock is held
/// for the whole recording.
pub fn submit_one_time<D, F>(
    device: &D,
    pool: CommandPoolKind,
    verify: bool,
    record: F,
) -> Result<(vk::CommandBuffer, vk::Fence)>
where
    D: VulkanDevice,
    F: FnOnce(vk::CommandBuffer),
{
    let _guard = device.lock_command_pool(pool);
    let command_buffer = check_vk(device.allocate_command_buffer(pool), "vkAllocateCommandBuffers", verify)?;

    let submitted = (|| {
        check_vk(device.begin_command_buffer(command_buffer, true), "vkBeginCommandBuffer", verify)?;
        record(command_buffer);
        check_vk(device.end_command_buffer(command_buffer), "vkEndCommandBuffer", verify)?;

        let fence = check_vk(device.create_fence(false), "vkCreateFence", verify)?;
        let submit = Submit {
            command_buffer,
            wait_semaphore: None,
            signal_semaphore: None,
            fence,
        };
        if let Err(e) = check_vk(device.submit(&submit), "vkQueueSubmit", verify) {
            device.destroy_fence(fence);
            return Err(e);
        }
        Ok(fence)
    })();

    match submitted {
        Ok(fence) => Ok((command_buffer, fence)),
        Err(e) => {
            device.free_command_buffer(pool, command_buffer);
            Err(e)
        }
    }
}
