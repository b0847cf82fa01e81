/// Window surface and swapchain
///
/// Owns the surface, the swapchain and its images. Image views, depth
/// buffer, framebuffers and semaphores are per-image objects the context
/// creates through the device seam, so they are not kept here.

use ash::prelude::VkResult;
use ash::vk;
use dm_graphics::{dm_debug, dm_warn};

pub struct Swapchain {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,

    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create the swapchain for `surface`
    ///
    /// `swap_interval` 0 requests an unsynchronized present mode when the
    /// surface offers one; any other value presents with FIFO.
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        width: u32,
        height: u32,
        swap_interval: u32,
    ) -> VkResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, device);

        let format = unsafe { choose_surface_format(&surface_loader, physical_device, surface)? };
        let present_mode = unsafe { choose_present_mode(&surface_loader, physical_device, surface, swap_interval)? };

        let mut swapchain = Self {
            surface,
            surface_loader,
            physical_device,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            images: Vec::new(),
            format,
            extent: vk::Extent2D { width, height },
            present_mode,
        };
        swapchain.recreate(width, height)?;
        Ok(swapchain)
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Acquire the next image, signaling `semaphore` once it is usable
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        }
    }

    /// Queue `image_index` for presentation once `wait` is signaled
    ///
    /// The caller holds the queue lock.
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> VkResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Build a new swapchain for the current surface size
    ///
    /// The device must be idle and nothing may reference the old images.
    pub fn recreate(&mut self, width: u32, height: u32) -> VkResult<()> {
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)?;

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                    height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
                }
            };

            let image_count = capabilities.min_image_count + 1;
            let image_count = if capabilities.max_image_count > 0 {
                image_count.min(capabilities.max_image_count)
            } else {
                image_count
            };

            let old_swapchain = self.swapchain;
            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(self.format.format)
                .image_color_space(self.format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(self.present_mode)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self.swapchain_loader.create_swapchain(&create_info, None)?;
            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.extent = extent;
            self.images = self.swapchain_loader.get_swapchain_images(swapchain)?;
        }

        dm_debug!(
            "dmgraphics::vulkan",
            "Swapchain created: {} images, {}x{}, {:?}",
            self.images.len(),
            self.extent.width,
            self.extent.height,
            self.present_mode
        );
        Ok(())
    }

    /// Destroy the swapchain and the surface; the device must be idle
    pub fn destroy(&mut self) {
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
                self.surface = vk::SurfaceKHR::null();
            }
        }
        self.images.clear();
    }
}

unsafe fn choose_surface_format(
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<vk::SurfaceFormatKHR> {
    let formats = surface_loader.get_physical_device_surface_formats(physical_device, surface)?;
    let preferred = formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_UNORM || f.format == vk::Format::R8G8B8A8_UNORM)
        .or_else(|| formats.first())
        .copied();
    preferred.ok_or(vk::Result::ERROR_FORMAT_NOT_SUPPORTED)
}

unsafe fn choose_present_mode(
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    swap_interval: u32,
) -> VkResult<vk::PresentModeKHR> {
    if swap_interval != 0 {
        return Ok(vk::PresentModeKHR::FIFO);
    }
    let modes = surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?;
    let mode = select_unsynchronized_mode(&modes);
    if mode == vk::PresentModeKHR::FIFO {
        dm_warn!("dmgraphics::vulkan", "Swap interval 0 requested but only FIFO presentation is available");
    }
    Ok(mode)
}

/// Mailbox, then immediate, then FIFO (always available)
fn select_unsynchronized_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}
