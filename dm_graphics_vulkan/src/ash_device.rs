/// `VulkanDevice` implemented on `ash` and `gpu-allocator`
///
/// Owns the instance, the window surface and swapchain, one logical device
/// with a single graphics/present queue, three command pools and the memory
/// allocator. Buffers are host-visible and persistently mapped; images live
/// in device-local memory.
///
/// Queue submission and presentation are serialized by one queue lock. The
/// allocator and the allocation maps each sit behind their own mutex so the
/// upload worker can create staging buffers while the render thread records.

use crate::ash_device_pipeline::{create_compute_pipeline, create_graphics_pipeline};
use crate::vulkan_device::{
    BufferImageCopy, Command, CommandPoolKind, DescriptorBinding, DescriptorWrite, DeviceLimits, GraphicsPipelineDesc,
    ImageBarrier, ImageDesc, ImageViewDesc, RenderPassDesc, SamplerDesc, Submit, VulkanDevice,
};
use crate::vulkan_swapchain::Swapchain;
use ash::prelude::VkResult;
use ash::vk;
use dm_graphics::dmgraphics::render::{ContextParams, NativeWindow};
use dm_graphics::dmgraphics::{Error, Result};
use dm_graphics::{dm_debug, dm_error, dm_info, dm_warn};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use rustc_hash::FxHashMap;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard};

/// Depth/stencil formats in order of preference
const DEPTH_STENCIL_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn init_failed(what: &str, error: impl std::fmt::Debug) -> Error {
    dm_error!("dmgraphics::vulkan", "{}: {:?}", what, error);
    Error::InitializationFailed(format!("{}: {:?}", what, error))
}

fn pool_index(pool: CommandPoolKind) -> usize {
    match pool {
        CommandPoolKind::Main => 0,
        CommandPoolKind::Upload => 1,
        CommandPoolKind::Worker => 2,
    }
}

#[cfg(feature = "vulkan-validation")]
struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

pub struct AshDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,

    queue: vk::Queue,
    queue_lock: Mutex<()>,

    swapchain: Mutex<Swapchain>,

    command_pools: [vk::CommandPool; 3],
    pool_locks: [Mutex<()>; 3],

    /// Dropped by hand before the device is destroyed
    allocator: ManuallyDrop<Mutex<Allocator>>,
    buffer_allocations: Mutex<FxHashMap<vk::Buffer, Allocation>>,
    image_allocations: Mutex<FxHashMap<vk::Image, Allocation>>,

    limits: DeviceLimits,
    depth_stencil_format: vk::Format,

    #[cfg(feature = "vulkan-validation")]
    debug_messenger: Option<DebugMessenger>,
}

impl AshDevice {
    /// Bring up Vulkan for `window`
    pub fn new(window: &dyn NativeWindow, params: &ContextParams) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_failed("Failed to load Vulkan library", e))?;

            let app_name = CString::new(params.app_name.as_str())
                .map_err(|e| init_failed("Invalid application name", e))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"dmgraphics")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_1);

            let display_handle = window
                .display_handle()
                .map_err(|e| init_failed("Failed to get display handle", e))?;
            let window_handle = window
                .window_handle()
                .map_err(|e| init_failed("Failed to get window handle", e))?;

            #[allow(unused_mut)]
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_failed("Failed to get required instance extensions", e))?
                .to_vec();
            #[allow(unused_mut)]
            let mut layer_names: Vec<*const std::os::raw::c_char> = Vec::new();

            let validation = params.use_validation_layers && cfg!(feature = "vulkan-validation");
            if params.use_validation_layers && !validation {
                dm_warn!(
                    "dmgraphics::vulkan",
                    "Validation layers requested but the vulkan-validation feature is disabled"
                );
            }
            #[cfg(feature = "vulkan-validation")]
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_failed("Failed to create Vulkan instance", e))?;

            #[cfg(feature = "vulkan-validation")]
            let debug_messenger = if validation {
                let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
                let messenger = loader
                    .create_debug_utils_messenger(&crate::debug::messenger_create_info(), None)
                    .map_err(|e| init_failed("Failed to create debug messenger", e))?;
                Some(DebugMessenger { loader, messenger })
            } else {
                None
            };

            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| init_failed("Failed to create surface", e))?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let (physical_device, queue_family) = select_physical_device(&instance, &surface_loader, surface)?;
            let properties = instance.get_physical_device_properties(physical_device);
            let features = instance.get_physical_device_features(physical_device);
            dm_info!(
                "dmgraphics::vulkan",
                "Using GPU '{}' (queue family {})",
                CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy(),
                queue_family
            );

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];
            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
            let enabled_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(features.sampler_anisotropy == vk::TRUE)
                .texture_compression_bc(features.texture_compression_bc == vk::TRUE)
                .texture_compression_etc2(features.texture_compression_etc2 == vk::TRUE)
                .texture_compression_astc_ldr(features.texture_compression_astc_ldr == vk::TRUE);
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&enabled_features);
            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_failed("Failed to create logical device", e))?;
            let queue = device.get_device_queue(queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| init_failed("Failed to create GPU allocator", e))?;

            let mut command_pools = [vk::CommandPool::null(); 3];
            for (index, pool) in command_pools.iter_mut().enumerate() {
                let flags = if index == pool_index(CommandPoolKind::Main) {
                    vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                } else {
                    vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                };
                let info = vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family)
                    .flags(flags);
                *pool = device
                    .create_command_pool(&info, None)
                    .map_err(|e| init_failed("Failed to create command pool", e))?;
            }

            let swapchain = Swapchain::new(
                &instance,
                &device,
                physical_device,
                surface,
                surface_loader,
                params.width,
                params.height,
                params.swap_interval,
            )
            .map_err(|e| init_failed("Failed to create swapchain", e))?;

            let depth_stencil_format = DEPTH_STENCIL_CANDIDATES
                .into_iter()
                .find(|&format| {
                    instance
                        .get_physical_device_format_properties(physical_device, format)
                        .optimal_tiling_features
                        .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
                })
                .ok_or_else(|| init_failed("No depth/stencil attachment format", vk::Result::ERROR_FORMAT_NOT_SUPPORTED))?;

            let device_limits = properties.limits;
            let limits = DeviceLimits {
                min_uniform_buffer_offset_alignment: device_limits.min_uniform_buffer_offset_alignment as u32,
                max_per_stage_uniform_buffers: device_limits.max_per_stage_descriptor_uniform_buffers,
                max_per_stage_storage_buffers: device_limits.max_per_stage_descriptor_storage_buffers,
                max_per_stage_samplers: device_limits.max_per_stage_descriptor_samplers,
                max_per_stage_storage_images: device_limits.max_per_stage_descriptor_storage_images,
                max_image_dimension_2d: device_limits.max_image_dimension2_d,
                max_sampler_anisotropy: if enabled_features.sampler_anisotropy == vk::TRUE {
                    device_limits.max_sampler_anisotropy
                } else {
                    1.0
                },
            };
            dm_debug!("dmgraphics::vulkan", "Device limits: {:?}", limits);

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                queue,
                queue_lock: Mutex::new(()),
                swapchain: Mutex::new(swapchain),
                command_pools,
                pool_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                buffer_allocations: Mutex::new(FxHashMap::default()),
                image_allocations: Mutex::new(FxHashMap::default()),
                limits,
                depth_stencil_format,
                #[cfg(feature = "vulkan-validation")]
                debug_messenger,
            })
        }
    }

    fn allocate(&self, name: &str, requirements: vk::MemoryRequirements, location: MemoryLocation, linear: bool) -> VkResult<Allocation> {
        lock(&self.allocator)
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                dm_error!(
                    "dmgraphics::vulkan",
                    "Out of GPU memory for {} ({} bytes): {:?}",
                    name,
                    requirements.size,
                    e
                );
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            })
    }

    fn free(&self, allocation: Allocation) {
        if let Err(e) = lock(&self.allocator).free(allocation) {
            dm_warn!("dmgraphics::vulkan", "Failed to free GPU allocation: {:?}", e);
        }
    }
}

/// First device with a queue family that can both draw and present to `surface`
unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let physical_devices = instance
        .enumerate_physical_devices()
        .map_err(|e| init_failed("Failed to enumerate physical devices", e))?;

    let mut candidates: Vec<(vk::PhysicalDevice, u32, bool)> = Vec::new();
    for physical_device in physical_devices {
        let families = instance.get_physical_device_queue_family_properties(physical_device);
        let family = (0..families.len() as u32).find(|&index| {
            families[index as usize].queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && surface_loader
                    .get_physical_device_surface_support(physical_device, index, surface)
                    .unwrap_or(false)
        });
        if let Some(family) = family {
            let discrete = instance.get_physical_device_properties(physical_device).device_type
                == vk::PhysicalDeviceType::DISCRETE_GPU;
            candidates.push((physical_device, family, discrete));
        }
    }

    candidates
        .iter()
        .find(|(_, _, discrete)| *discrete)
        .or_else(|| candidates.first())
        .map(|&(physical_device, family, _)| (physical_device, family))
        .ok_or_else(|| init_failed("No Vulkan GPU can present to the window", vk::Result::ERROR_INITIALIZATION_FAILED))
}

fn subresource_range(aspect: vk::ImageAspectFlags, mip_levels: u32, array_layers: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: mip_levels,
        base_array_layer: 0,
        layer_count: array_layers,
    }
}

fn image_barrier_to_vk(barrier: &ImageBarrier) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(barrier.old_layout)
        .new_layout(barrier.new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(barrier.image)
        .subresource_range(subresource_range(barrier.aspect, barrier.mip_levels, barrier.array_layers))
        .src_access_mask(barrier.src_access)
        .dst_access_mask(barrier.dst_access)
}

fn buffer_image_copy_to_vk(region: &BufferImageCopy) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: region.buffer_offset,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: region.aspect,
            mip_level: region.mip_level,
            base_array_layer: region.base_array_layer,
            layer_count: region.layer_count,
        },
        image_offset: region.image_offset,
        image_extent: region.image_extent,
    }
}

impl VulkanDevice for AshDevice {
    // ===== Capabilities =====

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
                .optimal_tiling_features
        }
    }

    fn depth_stencil_format(&self) -> vk::Format {
        self.depth_stencil_format
    }

    fn wait_idle(&self) -> VkResult<()> {
        let _queue = lock(&self.queue_lock);
        unsafe { self.device.device_wait_idle() }
    }

    // ===== Swapchain =====

    fn swapchain_extent(&self) -> vk::Extent2D {
        lock(&self.swapchain).extent()
    }

    fn swapchain_format(&self) -> vk::Format {
        lock(&self.swapchain).format()
    }

    fn swapchain_images(&self) -> Vec<vk::Image> {
        lock(&self.swapchain).images().to_vec()
    }

    fn acquire_next_image(&self, signal: vk::Semaphore) -> VkResult<(u32, bool)> {
        lock(&self.swapchain).acquire_next_image(signal)
    }

    fn present(&self, image_index: u32, wait: vk::Semaphore) -> VkResult<bool> {
        let swapchain = lock(&self.swapchain);
        let _queue = lock(&self.queue_lock);
        swapchain.present(self.queue, image_index, wait)
    }

    fn recreate_swapchain(&self, width: u32, height: u32) -> VkResult<()> {
        lock(&self.swapchain).recreate(width, height)
    }

    // ===== Synchronization =====

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn is_fence_signaled(&self, fence: vk::Fence) -> VkResult<bool> {
        unsafe { self.device.get_fence_status(fence) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    // ===== Commands =====

    fn lock_command_pool(&self, pool: CommandPoolKind) -> MutexGuard<'_, ()> {
        lock(&self.pool_locks[pool_index(pool)])
    }

    fn allocate_command_buffer(&self, pool: CommandPoolKind) -> VkResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pools[pool_index(pool)])
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info)? };
        buffers.into_iter().next().ok_or(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
    }

    fn free_command_buffer(&self, pool: CommandPoolKind, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pools[pool_index(pool)], &[command_buffer])
        }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, one_time_submit: bool) -> VkResult<()> {
        let flags = if one_time_submit {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::default().flags(flags))
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
    }

    fn record(&self, cb: vk::CommandBuffer, command: &Command) {
        let device = &self.device;
        unsafe {
            match command {
                Command::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    extent,
                } => {
                    let info = vk::RenderPassBeginInfo::default()
                        .render_pass(*render_pass)
                        .framebuffer(*framebuffer)
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D { x: 0, y: 0 },
                            extent: *extent,
                        });
                    device.cmd_begin_render_pass(cb, &info, vk::SubpassContents::INLINE);
                }
                Command::EndRenderPass => device.cmd_end_render_pass(cb),
                Command::BindPipeline { bind_point, pipeline } => device.cmd_bind_pipeline(cb, *bind_point, *pipeline),
                Command::BindVertexBuffers {
                    first_binding,
                    buffers,
                    offsets,
                } => device.cmd_bind_vertex_buffers(cb, *first_binding, buffers, offsets),
                Command::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type,
                } => device.cmd_bind_index_buffer(cb, *buffer, *offset, *index_type),
                Command::BindDescriptorSets {
                    bind_point,
                    layout,
                    sets,
                    dynamic_offsets,
                } => device.cmd_bind_descriptor_sets(cb, *bind_point, *layout, 0, sets, dynamic_offsets),
                Command::SetViewport(viewport) => device.cmd_set_viewport(cb, 0, std::slice::from_ref(viewport)),
                Command::SetScissor(rect) => device.cmd_set_scissor(cb, 0, std::slice::from_ref(rect)),
                Command::SetDepthBias {
                    constant_factor,
                    slope_factor,
                } => device.cmd_set_depth_bias(cb, *constant_factor, 0.0, *slope_factor),
                Command::ClearColor { attachment, color, rect } => {
                    let clear = vk::ClearAttachment {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        color_attachment: *attachment,
                        clear_value: vk::ClearValue {
                            color: vk::ClearColorValue { float32: *color },
                        },
                    };
                    device.cmd_clear_attachments(cb, &[clear], &[clear_rect(*rect)]);
                }
                Command::ClearDepthStencil {
                    aspect,
                    depth,
                    stencil,
                    rect,
                } => {
                    let clear = vk::ClearAttachment {
                        aspect_mask: *aspect,
                        color_attachment: 0,
                        clear_value: vk::ClearValue {
                            depth_stencil: vk::ClearDepthStencilValue {
                                depth: *depth,
                                stencil: *stencil,
                            },
                        },
                    };
                    device.cmd_clear_attachments(cb, &[clear], &[clear_rect(*rect)]);
                }
                Command::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                } => device.cmd_draw(cb, *vertex_count, *instance_count, *first_vertex, 0),
                Command::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                } => device.cmd_draw_indexed(cb, *index_count, *instance_count, *first_index, 0, 0),
                Command::Dispatch { x, y, z } => device.cmd_dispatch(cb, *x, *y, *z),
                Command::PipelineBarrier(barrier) => device.cmd_pipeline_barrier(
                    cb,
                    barrier.src_stage,
                    barrier.dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[image_barrier_to_vk(barrier)],
                ),
                Command::CopyBufferToImage { buffer, image, regions } => {
                    let regions: Vec<vk::BufferImageCopy> = regions.iter().map(buffer_image_copy_to_vk).collect();
                    device.cmd_copy_buffer_to_image(
                        cb,
                        *buffer,
                        *image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &regions,
                    );
                }
            }
        }
    }

    fn submit(&self, submit: &Submit) -> VkResult<()> {
        let command_buffers = [submit.command_buffer];
        let (wait_semaphores, wait_stages): (Vec<vk::Semaphore>, Vec<vk::PipelineStageFlags>) =
            submit.wait_semaphore.into_iter().unzip();
        let signal_semaphores: Vec<vk::Semaphore> = submit.signal_semaphore.into_iter().collect();

        let info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let _queue = lock(&self.queue_lock);
        unsafe { self.device.queue_submit(self.queue, &[info], submit.fence) }
    }

    // ===== Memory =====

    fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer> {
        unsafe {
            let info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = self.device.create_buffer(&info, None)?;
            let requirements = self.device.get_buffer_memory_requirements(buffer);

            let allocation = match self.allocate("buffer", requirements, MemoryLocation::CpuToGpu, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };
            if let Err(e) = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                self.device.destroy_buffer(buffer, None);
                return Err(e);
            }
            lock(&self.buffer_allocations).insert(buffer, allocation);
            Ok(buffer)
        }
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> VkResult<()> {
        let mut allocations = lock(&self.buffer_allocations);
        let mapped = allocations
            .get_mut(&buffer)
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > mapped.len() {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        mapped[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        if buffer == vk::Buffer::null() {
            return;
        }
        unsafe { self.device.destroy_buffer(buffer, None) };
        if let Some(allocation) = lock(&self.buffer_allocations).remove(&buffer) {
            self.free(allocation);
        }
    }

    fn create_image(&self, desc: &ImageDesc) -> VkResult<vk::Image> {
        unsafe {
            let info = vk::ImageCreateInfo::default()
                .flags(desc.flags)
                .image_type(desc.image_type)
                .format(desc.format)
                .extent(desc.extent)
                .mip_levels(desc.mip_levels)
                .array_layers(desc.array_layers)
                .samples(desc.samples)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(desc.usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            let image = self.device.create_image(&info, None)?;
            let requirements = self.device.get_image_memory_requirements(image);

            let allocation = match self.allocate("image", requirements, MemoryLocation::GpuOnly, false) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };
            if let Err(e) = self.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                self.device.destroy_image(image, None);
                return Err(e);
            }
            lock(&self.image_allocations).insert(image, allocation);
            Ok(image)
        }
    }

    fn destroy_image(&self, image: vk::Image) {
        if image == vk::Image::null() {
            return;
        }
        unsafe { self.device.destroy_image(image, None) };
        if let Some(allocation) = lock(&self.image_allocations).remove(&image) {
            self.free(allocation);
        }
    }

    fn create_image_view(&self, image: vk::Image, desc: &ImageViewDesc) -> VkResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(desc.view_type)
            .format(desc.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(subresource_range(desc.aspect, desc.mip_levels, desc.array_layers));
        unsafe { self.device.create_image_view(&info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> VkResult<vk::Sampler> {
        let anisotropy = desc.max_anisotropy > 1.0;
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_u)
            .address_mode_v(desc.address_v)
            .address_mode_w(desc.address_v)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy { desc.max_anisotropy } else { 1.0 })
            .min_lod(0.0)
            .max_lod(desc.max_lod)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);
        unsafe { self.device.create_sampler(&info, None) }
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    // ===== Render passes =====

    fn create_render_pass(&self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
        let mut attachments: Vec<vk::AttachmentDescription> = desc
            .color_formats
            .iter()
            .map(|&format| {
                vk::AttachmentDescription::default()
                    .format(format)
                    .samples(desc.samples)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(desc.color_layout)
                    .final_layout(desc.color_layout)
            })
            .collect();
        let color_refs: Vec<vk::AttachmentReference> = (0..desc.color_formats.len() as u32)
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();

        let depth_ref = desc.depth_format.map(|format| {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(format)
                    .samples(desc.samples)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::LOAD)
                    .stencil_store_op(vk::AttachmentStoreOp::STORE)
                    .initial_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
            vk::AttachmentReference {
                attachment: attachments.len() as u32 - 1,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));
        unsafe { self.device.create_render_pass(&info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { self.device.create_framebuffer(&info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    // ===== Programs and pipelines =====

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        unsafe {
            self.device
                .create_shader_module(&vk::ShaderModuleCreateInfo::default().code(code), None)
        }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> VkResult<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(binding.descriptor_type)
                    .descriptor_count(1)
                    .stage_flags(binding.stage_flags)
            })
            .collect();
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        unsafe { self.device.create_descriptor_set_layout(&info, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout]) -> VkResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
        unsafe { self.device.create_pipeline_layout(&info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> VkResult<vk::Pipeline> {
        create_graphics_pipeline(&self.device, desc)
    }

    fn create_compute_pipeline(&self, layout: vk::PipelineLayout, module: vk::ShaderModule) -> VkResult<vk::Pipeline> {
        create_compute_pipeline(&self.device, layout, module)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    // ===== Descriptors =====

    fn create_descriptor_pool(&self, max_sets: u32) -> VkResult<vk::DescriptorPool> {
        let pool_sizes = [
            (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, max_sets * 4),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, max_sets * 4),
            (vk::DescriptorType::SAMPLED_IMAGE, max_sets),
            (vk::DescriptorType::SAMPLER, max_sets),
            (vk::DescriptorType::STORAGE_BUFFER, max_sets),
            (vk::DescriptorType::STORAGE_IMAGE, max_sets),
            (vk::DescriptorType::INPUT_ATTACHMENT, max_sets),
        ]
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count });
        let info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(max_sets);
        unsafe { self.device.create_descriptor_pool(&info, None) }
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
        }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&info)? };
        sets.into_iter().next().ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::Buffer { buffer, offset, range, .. } => [vk::DescriptorBufferInfo { buffer, offset, range }],
                DescriptorWrite::Image { .. } => [vk::DescriptorBufferInfo::default()],
            })
            .collect();
        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::Image { view, sampler, layout, .. } => [vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                }],
                DescriptorWrite::Buffer { .. } => [vk::DescriptorImageInfo::default()],
            })
            .collect();

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .enumerate()
            .map(|(index, write)| match *write {
                DescriptorWrite::Buffer {
                    set,
                    binding,
                    descriptor_type,
                    ..
                } => vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding)
                    .descriptor_type(descriptor_type)
                    .buffer_info(&buffer_infos[index]),
                DescriptorWrite::Image {
                    set,
                    binding,
                    descriptor_type,
                    ..
                } => vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding)
                    .descriptor_type(descriptor_type)
                    .image_info(&image_infos[index]),
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) }
    }
}

fn clear_rect(rect: vk::Rect2D) -> vk::ClearRect {
    vk::ClearRect {
        rect,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            for pool in self.command_pools {
                self.device.destroy_command_pool(pool, None);
            }
            lock(&self.swapchain).destroy();

            // Allocations still alive are returned before the allocator goes
            let leaked_buffers: Vec<_> = lock(&self.buffer_allocations).drain().collect();
            let leaked_images: Vec<_> = lock(&self.image_allocations).drain().collect();
            if !leaked_buffers.is_empty() || !leaked_images.is_empty() {
                dm_warn!(
                    "dmgraphics::vulkan",
                    "{} buffers and {} images still alive at device destruction",
                    leaked_buffers.len(),
                    leaked_images.len()
                );
            }
            for (buffer, allocation) in leaked_buffers {
                self.device.destroy_buffer(buffer, None);
                self.free(allocation);
            }
            for (image, allocation) in leaked_images {
                self.device.destroy_image(image, None);
                self.free(allocation);
            }
            ManuallyDrop::drop(&mut self.allocator);

            #[cfg(feature = "vulkan-validation")]
            if let Some(debug) = self.debug_messenger.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        dm_debug!("dmgraphics::vulkan", "Vulkan device destroyed");
    }
}
