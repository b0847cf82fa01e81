//! Vulkan context
//!
//! Records every verb into the command buffer of the current frame slot.
//! `begin_frame` waits for the slot's previous submission, releases what
//! became unused, acquires a swapchain image and opens the command buffer;
//! `flip` closes it, submits and presents. Render passes are opened lazily
//! by the first clear or draw that needs one and closed when the render
//! target changes or the frame ends.
//!
//! Texture uploads recorded on the render thread are fenced and waited on
//! immediately. Async uploads are recorded and submitted by the job thread
//! with their own fence; a draw sampling such a texture waits for that
//! fence, and the staging memory is released once it signals.

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_check::check_vk;
use crate::vulkan_device::{Command, CommandPoolKind, DescriptorWrite, DeviceLimits, RenderPassDesc, Submit, VulkanDevice};
use crate::vulkan_format::{has_stencil, index_type_to_vk, is_depth_format, sample_count_to_vk, texture_format_to_vk};
use crate::vulkan_frame::{submit_one_time, FrameResources, MainPass};
use crate::vulkan_pipeline::{graphics_pipeline_desc, pipeline_key, vertex_input_layout, PassInfo};
use crate::vulkan_program::{descriptor_type, VulkanProgram};
use crate::vulkan_resource_lifecycle::{FenceResources, FenceResourcesToDestroy, ResourceToDestroy, ResourcesToDestroy};
use crate::vulkan_sampler::SamplerCache;
use crate::vulkan_texture::{copy_regions, layout_barrier, record_upload, staging_bytes, VulkanAsset, VulkanRenderTarget, VulkanTexture};
use ash::vk;
use dm_graphics::dmgraphics::render::{
    mip_bits, AsyncUploadStatus, BufferType, BufferUsage, ClearFlags, ContextFeature, ContextParams, GraphicsContext,
    GraphicsStats, IndexBufferFormat, IndexBufferHandle, PipelineCache, PipelineState, PrimitiveType, ProgramHandle,
    RenderTargetCreationParams, SamplerParams, SetTextureAsyncCallback, StorageBufferHandle, TextureCreationParams,
    TextureFormat, TextureInfo, TextureParams, TextureStatusFlags, TextureType, TextureUsageFlags, VertexBufferHandle,
    VertexDeclaration, VertexDeclarationHandle, MAX_BUFFER_COLOR_ATTACHMENTS, MAX_STORAGE_BUFFER_UNITS,
    MAX_TEXTURE_UNITS, MAX_VERTEX_BUFFERS,
};
use dm_graphics::dmgraphics::shader::{BindingSlot, ProgramLayout, ShaderDesc, ShaderType, UniformLocation};
use dm_graphics::dmgraphics::utils::{
    lock, AssetHandle, AssetHandleContainer, AssetType, JobThread, ParamSlots, RenderTargetHandle, TextureHandle,
};
use dm_graphics::dmgraphics::{AdapterFamily, Error, Result};
use dm_graphics::{dm_debug, dm_error, dm_warn};
use slotmap::SlotMap;
use std::sync::{Arc, Mutex};

/// Frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

type SharedAssets = Arc<Mutex<AssetHandleContainer<VulkanAsset>>>;

/// Payload of one in-flight `set_texture_async`
struct AsyncUpload {
    params: Option<TextureParams>,
    callback: Option<SetTextureAsyncCallback>,
}

/// Textures bound in place of missing or not yet uploaded ones
#[derive(Debug, Clone, Copy)]
struct DefaultTextures {
    texture_2d: TextureHandle,
    texture_2d_array: TextureHandle,
    texture_cube: TextureHandle,
}

impl DefaultTextures {
    fn invalid() -> Self {
        let invalid = AssetHandle::invalid(AssetType::Texture);
        Self {
            texture_2d: invalid,
            texture_2d_array: invalid,
            texture_cube: invalid,
        }
    }

    fn for_type(&self, ty: Option<ShaderType>) -> TextureHandle {
        match ty {
            Some(ShaderType::SamplerCube | ShaderType::TextureCube) => self.texture_cube,
            Some(ShaderType::Sampler2DArray | ShaderType::Texture2DArray) => self.texture_2d_array,
            _ => self.texture_2d,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Rect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Rect {
    fn full(extent: vk::Extent2D) -> Self {
        Self { x: 0, y: 0, width: extent.width, height: extent.height }
    }
}

/// Dynamic state last recorded in the open render pass
#[derive(Debug, Clone, Copy, PartialEq)]
struct DynamicState {
    viewport: Rect,
    scissor: Rect,
    depth_bias: (f32, f32),
}

#[derive(Debug, Clone, Copy)]
struct ActivePass {
    info: PassInfo,
    extent: vk::Extent2D,
    depth_format: Option<vk::Format>,
}

pub struct VulkanContext<D: VulkanDevice> {
    device: Arc<D>,
    verify: bool,
    limits: DeviceLimits,
    width: u32,
    height: u32,
    supported_formats: u64,
    /// RGB textures are expanded to RGBA when the device lacks a 24-bit format
    rgb_as_rgba: bool,
    swapchain_dirty: bool,
    suboptimal_warned: bool,

    frames: Vec<FrameResources>,
    current_frame: usize,
    frame_started: bool,
    image_index: Option<u32>,
    main_pass: MainPass,
    active_pass: Option<ActivePass>,
    bound_pipeline: Option<vk::Pipeline>,
    bound_vertex_buffers: [Option<vk::Buffer>; MAX_VERTEX_BUFFERS],
    bound_index_buffer: Option<(vk::Buffer, vk::IndexType)>,
    recorded_dynamic_state: Option<DynamicState>,

    resources_to_destroy: ResourcesToDestroy,
    /// Shared with async upload jobs
    fence_resources: Arc<Mutex<FenceResourcesToDestroy>>,
    /// Textures whose deletion waited behind pending uploads
    deleted_textures: Arc<Mutex<Vec<VulkanTexture>>>,
    pipeline_cache: PipelineCache<vk::Pipeline>,
    sampler_cache: SamplerCache,

    vertex_buffers: SlotMap<VertexBufferHandle, VulkanBuffer>,
    index_buffers: SlotMap<IndexBufferHandle, VulkanBuffer>,
    storage_buffers: SlotMap<StorageBufferHandle, VulkanBuffer>,
    vertex_declarations: SlotMap<VertexDeclarationHandle, VertexDeclaration>,
    programs: SlotMap<ProgramHandle, VulkanProgram>,
    next_program_hash: u64,

    /// Shared with async upload jobs
    assets: SharedAssets,
    async_uploads: Arc<Mutex<ParamSlots<AsyncUpload>>>,
    job_thread: JobThread,
    default_textures: DefaultTextures,
    next_render_target_id: u64,

    current_program: Option<ProgramHandle>,
    vertex_buffer_bindings: [Option<VertexBufferHandle>; MAX_VERTEX_BUFFERS],
    vertex_declaration_bindings: [Option<VertexDeclarationHandle>; MAX_VERTEX_BUFFERS],
    texture_units: [Option<TextureHandle>; MAX_TEXTURE_UNITS],
    storage_buffer_units: [Option<StorageBufferHandle>; MAX_STORAGE_BUFFER_UNITS],
    current_render_target: Option<RenderTargetHandle>,

    pipeline_state: PipelineState,
    viewport: Option<Rect>,
    scissor: Option<Rect>,
    polygon_offset: (f32, f32),
    stats: GraphicsStats,
    finalized: bool,
}

/// Whether `format` can back a sampled texture (or a depth attachment)
fn format_usable<D: VulkanDevice>(device: &D, format: vk::Format) -> bool {
    if format == vk::Format::UNDEFINED {
        return false;
    }
    let features = device.format_features(format);
    if is_depth_format(format) {
        features.contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    } else {
        features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE)
    }
}

impl<D: VulkanDevice> VulkanContext<D> {
    pub fn new(device: Arc<D>, params: &ContextParams) -> Result<Self> {
        let verify = params.verify_graphics_calls;
        let limits = device.limits();
        let depth_format = device.depth_stencil_format();

        let rgb_as_rgba = !format_usable(&*device, vk::Format::R8G8B8_UNORM);
        let supported_formats = TextureFormat::ALL
            .iter()
            .filter(|format| !params.disabled_texture_formats.contains(format))
            .filter(|format| {
                let usable = format_usable(&*device, texture_format_to_vk(**format, depth_format));
                usable || (**format == TextureFormat::Rgb && format_usable(&*device, vk::Format::R8G8B8A8_UNORM))
            })
            .fold(0u64, |mask, format| mask | format.bit());

        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameResources::new(&*device, limits.min_uniform_buffer_offset_alignment, verify))
            .collect::<Result<Vec<_>>>()?;
        let main_pass = MainPass::new(&*device, verify)?;
        let extent = main_pass.extent;

        let mut context = Self {
            sampler_cache: SamplerCache::new(
                params.default_texture_min_filter,
                params.default_texture_mag_filter,
                limits.max_sampler_anisotropy,
            ),
            device,
            verify,
            limits,
            width: extent.width,
            height: extent.height,
            supported_formats,
            rgb_as_rgba,
            swapchain_dirty: false,
            suboptimal_warned: false,
            frames,
            current_frame: 0,
            frame_started: false,
            image_index: None,
            main_pass,
            active_pass: None,
            bound_pipeline: None,
            bound_vertex_buffers: [None; MAX_VERTEX_BUFFERS],
            bound_index_buffer: None,
            recorded_dynamic_state: None,
            resources_to_destroy: ResourcesToDestroy::new(),
            fence_resources: Arc::new(Mutex::new(FenceResourcesToDestroy::new())),
            deleted_textures: Arc::new(Mutex::new(Vec::new())),
            pipeline_cache: PipelineCache::new(),
            vertex_buffers: SlotMap::with_key(),
            index_buffers: SlotMap::with_key(),
            storage_buffers: SlotMap::with_key(),
            vertex_declarations: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            next_program_hash: 1,
            assets: Arc::new(Mutex::new(AssetHandleContainer::new())),
            async_uploads: Arc::new(Mutex::new(ParamSlots::new())),
            job_thread: JobThread::new(params.threaded_async_uploads)?,
            default_textures: DefaultTextures::invalid(),
            next_render_target_id: 1,
            current_program: None,
            vertex_buffer_bindings: [None; MAX_VERTEX_BUFFERS],
            vertex_declaration_bindings: [None; MAX_VERTEX_BUFFERS],
            texture_units: [None; MAX_TEXTURE_UNITS],
            storage_buffer_units: [None; MAX_STORAGE_BUFFER_UNITS],
            current_render_target: None,
            pipeline_state: PipelineState::default(),
            viewport: None,
            scissor: None,
            polygon_offset: (0.0, 0.0),
            stats: GraphicsStats::default(),
            finalized: false,
        };

        context.default_textures = DefaultTextures {
            texture_2d: context.create_default_texture(TextureType::Texture2D, 1)?,
            texture_2d_array: context.create_default_texture(TextureType::Texture2DArray, 1)?,
            texture_cube: context.create_default_texture(TextureType::TextureCube, 6)?,
        };

        dm_debug!(
            "dmgraphics::vulkan",
            "Created Vulkan context {}x{} ({} frames in flight, threaded uploads: {})",
            context.width,
            context.height,
            MAX_FRAMES_IN_FLIGHT,
            params.threaded_async_uploads
        );
        Ok(context)
    }

    // ===== Inspection =====

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Frame slot currently being recorded (or about to be)
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipeline_cache.len()
    }

    /// Async uploads whose staging memory still waits for their fence
    pub fn pending_upload_count(&self) -> usize {
        lock(&self.fence_resources).len()
    }

    /// Resources waiting for the release of frame slot `frame`
    pub fn pending_destroy_count(&self, frame: usize) -> usize {
        self.resources_to_destroy.pending(frame)
    }

    pub fn scratch_buffer_resize_count(&self, frame: usize) -> u32 {
        self.frames.get(frame).map_or(0, |f| f.scratch.resize_count())
    }

    /// Block until every async upload has been processed and completed
    pub fn wait_async_idle(&mut self) {
        self.job_thread.wait_idle();
    }

    // ===== Frame internals =====

    fn command_buffer(&self) -> vk::CommandBuffer {
        self.frames[self.current_frame].command_buffer
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        self.main_pass.recreate(&*self.device, self.width, self.height, self.verify)?;
        self.width = self.main_pass.extent.width;
        self.height = self.main_pass.extent.height;
        self.swapchain_dirty = false;
        Ok(())
    }

    fn warn_suboptimal(&mut self) {
        if !self.suboptimal_warned {
            dm_warn!("dmgraphics::vulkan", "Swapchain is suboptimal for the surface, continuing");
            self.suboptimal_warned = true;
        }
    }

    fn acquire_image(&mut self) -> Result<u32> {
        let semaphore = self.frames[self.current_frame].image_available;
        let acquired = match self.device.acquire_next_image(semaphore) {
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                dm_debug!("dmgraphics::vulkan", "Swapchain out of date, recreating");
                self.recreate_swapchain()?;
                self.device.acquire_next_image(semaphore)
            }
            other => other,
        };
        let (image_index, suboptimal) = check_vk(acquired, "vkAcquireNextImageKHR", self.verify)?;
        if suboptimal {
            self.warn_suboptimal();
        }
        Ok(image_index)
    }

    fn end_render_pass(&mut self) {
        if self.active_pass.take().is_some() {
            self.device.record(self.command_buffer(), &Command::EndRenderPass);
        }
    }

    /// Open the render pass of the current render target if none is open
    fn ensure_render_pass(&mut self) -> Result<ActivePass> {
        if !self.frame_started {
            return Err(Error::InvalidResource("Rendering outside of begin_frame/flip".to_string()));
        }
        if let Some(active) = self.active_pass {
            return Ok(active);
        }

        let (active, framebuffer) = match self.current_render_target {
            None => {
                let image_index = self
                    .image_index
                    .ok_or_else(|| Error::InvalidResource("No swapchain image acquired".to_string()))?;
                let active = ActivePass {
                    info: self.main_pass.pass_info(),
                    extent: self.main_pass.extent,
                    depth_format: Some(self.main_pass.depth_format),
                };
                (active, self.main_pass.framebuffers[image_index as usize])
            }
            Some(handle) => {
                let frame = self.current_frame;
                let mut assets = lock(&self.assets);
                let (active, framebuffer, attachments) = {
                    let rt = assets
                        .get_mut(handle)
                        .and_then(VulkanAsset::render_target_mut)
                        .ok_or_else(|| Error::InvalidResource("Bound render target was deleted".to_string()))?;
                    rt.state.touch(frame);
                    let active = ActivePass {
                        info: PassInfo {
                            id: rt.id,
                            render_pass: rt.render_pass,
                            samples: rt.samples,
                            color_attachment_count: rt.color_formats.len() as u32,
                            has_depth_stencil: rt.depth_format.is_some(),
                        },
                        extent: rt.extent,
                        depth_format: rt.depth_format,
                    };
                    let attachments: Vec<TextureHandle> =
                        rt.color_textures.iter().chain(rt.depth_stencil_texture.iter()).copied().collect();
                    (active, rt.framebuffer, attachments)
                };
                // Attachments are referenced by the framebuffer for the whole pass
                for attachment in attachments {
                    if let Some(texture) = assets.get_mut(attachment).and_then(VulkanAsset::texture_mut) {
                        texture.state.touch(frame);
                    }
                }
                (active, framebuffer)
            }
        };

        self.device.record(
            self.command_buffer(),
            &Command::BeginRenderPass {
                render_pass: active.info.render_pass,
                framebuffer,
                extent: active.extent,
            },
        );
        self.active_pass = Some(active);
        self.recorded_dynamic_state = None;
        Ok(active)
    }

    fn apply_dynamic_state(&mut self, extent: vk::Extent2D) {
        let full = Rect::full(extent);
        let scissor = if self.pipeline_state.scissor_enabled {
            self.scissor.unwrap_or(full)
        } else {
            full
        };
        let state = DynamicState {
            viewport: self.viewport.unwrap_or(full),
            scissor,
            depth_bias: self.polygon_offset,
        };
        if self.recorded_dynamic_state == Some(state) {
            return;
        }

        let command_buffer = self.command_buffer();
        self.device.record(
            command_buffer,
            &Command::SetViewport(vk::Viewport {
                x: state.viewport.x as f32,
                y: state.viewport.y as f32,
                width: state.viewport.width as f32,
                height: state.viewport.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }),
        );
        self.device.record(
            command_buffer,
            &Command::SetScissor(vk::Rect2D {
                offset: vk::Offset2D { x: state.scissor.x.max(0), y: state.scissor.y.max(0) },
                extent: vk::Extent2D { width: state.scissor.width, height: state.scissor.height },
            }),
        );
        self.device.record(
            command_buffer,
            &Command::SetDepthBias {
                constant_factor: state.depth_bias.1,
                slope_factor: state.depth_bias.0,
            },
        );
        self.recorded_dynamic_state = Some(state);
    }

    fn graphics_pipeline(&mut self, program: ProgramHandle, pass: &PassInfo, primitive: PrimitiveType) -> Result<vk::Pipeline> {
        let program = self
            .programs
            .get(program)
            .ok_or_else(|| Error::InvalidResource("Enabled program was deleted".to_string()))?;
        if program.is_compute() {
            return Err(Error::InvalidResource("Draw with a compute program enabled".to_string()));
        }

        let mut declarations: [Option<&VertexDeclaration>; MAX_VERTEX_BUFFERS] = [None; MAX_VERTEX_BUFFERS];
        for (slot, binding) in declarations.iter_mut().zip(self.vertex_declaration_bindings.iter()) {
            *slot = binding.and_then(|handle| self.vertex_declarations.get(handle));
        }

        let key = pipeline_key(program.hash, &self.pipeline_state, pass, &declarations, primitive);
        let device = &*self.device;
        let verify = self.verify;
        let state = &self.pipeline_state;
        let cached = self.pipeline_cache.len();
        let pipeline = self.pipeline_cache.get_or_create(key, || {
            let layout = vertex_input_layout(program.layout.vertex_inputs(), &declarations)?;
            let desc = graphics_pipeline_desc(program, pass, layout, state, primitive);
            check_vk(device.create_graphics_pipeline(&desc), "vkCreateGraphicsPipelines", verify)
        })?;
        if self.pipeline_cache.len() > cached {
            self.stats.pipelines_created += 1;
        }
        Ok(pipeline)
    }

    fn bind_vertex_buffers(&mut self) -> Result<()> {
        let command_buffer = self.command_buffer();
        for binding in 0..MAX_VERTEX_BUFFERS {
            let Some(handle) = self.vertex_buffer_bindings[binding] else {
                continue;
            };
            let buffer = self
                .vertex_buffers
                .get_mut(handle)
                .ok_or_else(|| Error::InvalidResource(format!("Vertex buffer at binding {} was deleted", binding)))?;
            buffer.state.touch(self.current_frame);
            if self.bound_vertex_buffers[binding] != Some(buffer.buffer) {
                self.device.record(
                    command_buffer,
                    &Command::BindVertexBuffers {
                        first_binding: binding as u32,
                        buffers: vec![buffer.buffer],
                        offsets: vec![0],
                    },
                );
                self.bound_vertex_buffers[binding] = Some(buffer.buffer);
            }
        }
        Ok(())
    }

    /// Allocate, write and bind the descriptor sets of `program`
    fn bind_descriptor_sets(&mut self, program: ProgramHandle, bind_point: vk::PipelineBindPoint) -> Result<()> {
        let frame = self.current_frame;
        let verify = self.verify;
        let Self {
            device,
            programs,
            frames,
            assets,
            sampler_cache,
            resources_to_destroy,
            fence_resources,
            storage_buffers,
            texture_units,
            storage_buffer_units,
            default_textures,
            ..
        } = self;
        let device: &D = device;

        let program = programs
            .get_mut(program)
            .ok_or_else(|| Error::InvalidResource("Enabled program was deleted".to_string()))?;
        program.state.touch(frame);
        let program = &*program;
        if program.set_layouts.is_empty() {
            return Ok(());
        }

        let slot = &mut frames[frame];
        let mut sets = Vec::with_capacity(program.set_layouts.len());
        for layout in &program.set_layouts {
            sets.push(slot.descriptors.allocate(device, *layout, verify)?);
        }

        let mut writes = Vec::new();
        // Dynamic offsets are consumed in (set, binding) order, the order of iteration
        let mut dynamic_offsets = Vec::new();
        let mut assets = lock(assets);

        for binding in program.layout.iter() {
            let Some(descriptor_type) = descriptor_type(binding) else {
                continue;
            };
            let set = sets[binding.resource.set as usize];
            let binding_index = u32::from(binding.resource.binding);

            match binding.slot {
                BindingSlot::UniformBuffer { .. } => {
                    let data = program.layout.uniform_block_data(binding).unwrap_or(&[]);
                    let (buffer, offset) = slot.scratch.allocate(device, data, frame, resources_to_destroy, verify)?;
                    dynamic_offsets.push(offset as u32);
                    writes.push(DescriptorWrite::Buffer {
                        set,
                        binding: binding_index,
                        descriptor_type,
                        buffer,
                        offset: 0,
                        range: u64::from(binding.resource.block_size.max(1)),
                    });
                }
                BindingSlot::StorageBuffer { unit } => {
                    let buffer = storage_buffer_units
                        .get(unit as usize)
                        .copied()
                        .flatten()
                        .and_then(|handle| storage_buffers.get_mut(handle))
                        .ok_or_else(|| {
                            Error::InvalidResource(format!(
                                "No storage buffer enabled on unit {} for '{}'",
                                unit, binding.resource.name
                            ))
                        })?;
                    buffer.state.touch(frame);
                    writes.push(DescriptorWrite::Buffer {
                        set,
                        binding: binding_index,
                        descriptor_type,
                        buffer: buffer.buffer,
                        offset: 0,
                        range: vk::WHOLE_SIZE,
                    });
                }
                BindingSlot::Texture { unit } | BindingSlot::Sampler { texture_unit: Some(unit) } => {
                    let requested = texture_units.get(unit as usize).copied().flatten();
                    let fallback = default_textures.for_type(binding.resource.ty.shader_type());
                    let texture = bound_texture(device, &mut assets, fence_resources, requested, fallback, frame)?;

                    let sampler = match descriptor_type {
                        vk::DescriptorType::SAMPLER | vk::DescriptorType::COMBINED_IMAGE_SAMPLER => {
                            sampler_cache.get(device, &texture.sampler, texture.mip_map_count, verify)?
                        }
                        _ => vk::Sampler::null(),
                    };
                    let view = if descriptor_type == vk::DescriptorType::SAMPLER {
                        vk::ImageView::null()
                    } else {
                        texture.view
                    };
                    writes.push(DescriptorWrite::Image {
                        set,
                        binding: binding_index,
                        descriptor_type,
                        view,
                        sampler,
                        layout: texture.layout,
                    });
                }
                BindingSlot::Sampler { texture_unit: None } => {
                    let texture = bound_texture(device, &mut assets, fence_resources, None, default_textures.texture_2d, frame)?;
                    let sampler = sampler_cache.get(device, &texture.sampler, texture.mip_map_count, verify)?;
                    writes.push(DescriptorWrite::Image {
                        set,
                        binding: binding_index,
                        descriptor_type,
                        view: vk::ImageView::null(),
                        sampler,
                        layout: vk::ImageLayout::UNDEFINED,
                    });
                }
                BindingSlot::Generic => {}
            }
        }
        drop(assets);

        device.update_descriptor_sets(&writes);
        device.record(
            slot.command_buffer,
            &Command::BindDescriptorSets {
                bind_point,
                layout: program.pipeline_layout,
                sets,
                dynamic_offsets,
            },
        );
        Ok(())
    }

    /// Everything a draw needs recorded before the draw command itself
    fn prepare_draw(&mut self, primitive: PrimitiveType) -> Result<()> {
        let program = self
            .current_program
            .ok_or_else(|| Error::InvalidResource("Draw without an enabled program".to_string()))?;
        let active = self.ensure_render_pass()?;

        let pipeline = self.graphics_pipeline(program, &active.info, primitive)?;
        if self.bound_pipeline != Some(pipeline) {
            self.device.record(
                self.command_buffer(),
                &Command::BindPipeline { bind_point: vk::PipelineBindPoint::GRAPHICS, pipeline },
            );
            self.bound_pipeline = Some(pipeline);
        }

        self.apply_dynamic_state(active.extent);
        self.bind_vertex_buffers()?;
        self.bind_descriptor_sets(program, vk::PipelineBindPoint::GRAPHICS)
    }

    // ===== Resource internals =====

    fn check_format(&self, format: TextureFormat) -> Result<()> {
        if self.is_texture_format_supported(format) {
            Ok(())
        } else {
            dm_warn!("dmgraphics::vulkan", "Texture format {:?} is not supported", format);
            Err(Error::UnsupportedFormat(format!("{:?}", format)))
        }
    }

    fn native_format(&self, format: TextureFormat) -> vk::Format {
        if format == TextureFormat::Rgb && self.rgb_as_rgba {
            vk::Format::R8G8B8A8_UNORM
        } else {
            texture_format_to_vk(format, self.main_pass.depth_format)
        }
    }

    fn unbind_texture(&mut self, texture: TextureHandle) {
        for unit in self.texture_units.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
    }

    fn defer_buffer(&mut self, mut buffer: VulkanBuffer) {
        let objects = buffer.take_native_objects();
        self.resources_to_destroy.destroy_deferred(&mut buffer.state, self.current_frame, objects);
    }

    /// Hand the image of `texture` to deferred destruction
    ///
    /// A pending async upload still writes the image, so its fence is
    /// waited on first.
    fn defer_texture_objects(&mut self, texture: &mut VulkanTexture) {
        if let Some(fence) = texture.pending_upload.take() {
            lock(&self.fence_resources).wait(&*self.device, fence);
        }
        if !texture.is_allocated() {
            return;
        }
        let objects = texture.take_native_objects();
        self.resources_to_destroy.destroy_deferred(&mut texture.state, self.current_frame, objects);
    }

    fn release_deleted_textures(&mut self) {
        let textures = std::mem::take(&mut *lock(&self.deleted_textures));
        for mut texture in textures {
            self.defer_texture_objects(&mut texture);
        }
    }

    /// Forget upload fences destroyed by the fence flush
    fn clear_released_uploads(&self, released: Vec<(TextureHandle, vk::Fence)>) {
        if released.is_empty() {
            return;
        }
        let mut assets = lock(&self.assets);
        for (handle, fence) in released {
            if let Some(texture) = assets.get_mut(handle).and_then(VulkanAsset::texture_mut) {
                if texture.pending_upload == Some(fence) {
                    texture.pending_upload = None;
                }
            }
        }
    }

    /// Run the uploads still queued for `handle` if `params` replace its image
    ///
    /// Queued jobs are sized for the current image. Must be called without
    /// the assets lock held, the worker takes it.
    fn finish_uploads_before_reallocation(&mut self, handle: TextureHandle, params: &TextureParams) {
        let replaces_image = lock(&self.assets)
            .get(handle)
            .and_then(VulkanAsset::texture)
            .is_some_and(|texture| texture.data_pending != 0 && texture.needs_allocation(params));
        if replaces_image {
            dm_debug!("dmgraphics::vulkan", "Texture image replaced with uploads in flight, waiting for them");
            self.job_thread.wait_idle();
        }
    }

    /// (Re)create the image of `texture` if `params` no longer fit it
    fn prepare_image(&mut self, texture: &mut VulkanTexture, params: &TextureParams, vk_format: vk::Format) -> Result<()> {
        // A full upload of mip 0 sets the size, anything else must fit the current one
        if params.mip_map != 0 || params.sub_update {
            texture.check_upload_region(params)?;
        }
        if !texture.needs_allocation(params) {
            return Ok(());
        }
        let max = self.max_texture_size();
        if params.width > max || params.height > max {
            return Err(Error::InvalidResource(format!(
                "Texture size {}x{} exceeds the maximum of {}",
                params.width, params.height, max
            )));
        }

        self.defer_texture_objects(texture);
        if params.mip_map == 0 && !params.sub_update {
            texture.width = params.width;
            texture.height = params.height;
            if texture.texture_type == TextureType::Texture3D {
                texture.depth = params.depth.max(1);
            }
        }
        texture.allocate(&*self.device, params.format, vk_format, self.verify)
    }

    /// Register a one-time submission and block until it has executed
    fn wait_for_submission(&mut self, entry: FenceResources) {
        let fence = entry.fence;
        let mut fence_resources = lock(&self.fence_resources);
        fence_resources.register(entry);
        fence_resources.wait(&*self.device, fence);
    }

    fn upload_texture_now(&mut self, texture: &mut VulkanTexture, params: &TextureParams) -> Result<()> {
        let mut entry = match params.data.as_deref() {
            Some(data) if !data.is_empty() => {
                submit_texture_upload(&*self.device, CommandPoolKind::Upload, texture, params, data, self.verify)?
            }
            _ if texture.is_ready() => return Ok(()),
            _ => submit_layout_transitions(&*self.device, CommandPoolKind::Upload, [texture], self.verify)?,
        };
        self.wait_for_submission(entry);
        Ok(())
    }

    fn set_texture_native(&mut self, handle: TextureHandle, params: &TextureParams, vk_format: vk::Format) -> Result<()> {
        self.finish_uploads_before_reallocation(handle, params);
        let assets = Arc::clone(&self.assets);
        let mut assets = lock(&assets);
        let texture = assets
            .get_mut(handle)
            .and_then(VulkanAsset::texture_mut)
            .ok_or_else(|| Error::InvalidResource("Unknown texture".to_string()))?;
        self.prepare_image(texture, params, vk_format)?;
        texture.sampler = texture_sampler(texture.sampler, params);
        self.upload_texture_now(texture, params)
    }

    fn create_default_texture(&mut self, texture_type: TextureType, layer_count: u8) -> Result<TextureHandle> {
        let handle = self.new_texture(&TextureCreationParams {
            texture_type,
            width: 1,
            height: 1,
            original_width: 1,
            original_height: 1,
            layer_count,
            ..Default::default()
        })?;
        let params = TextureParams {
            format: TextureFormat::Rgba,
            width: 1,
            height: 1,
            layer_count,
            data: Some(vec![0; 4 * usize::from(layer_count)]),
            ..Default::default()
        };
        self.set_texture_native(handle, &params, vk::Format::R8G8B8A8_UNORM)?;
        Ok(handle)
    }

    /// Allocate attachment images and move them to their resting layouts
    fn create_attachments(&mut self, params: &RenderTargetCreationParams) -> Result<(Vec<VulkanTexture>, Option<VulkanTexture>)> {
        let device = &*self.device;
        let samples = params.samples.max(1);
        let mut colors = Vec::with_capacity(params.color_attachments.len());
        let mut depth = None;

        let allocated = (|| {
            for attachment in &params.color_attachments {
                let mut texture = VulkanTexture::new(&attachment.creation);
                texture.usage_hint |= TextureUsageFlags::COLOR;
                texture.width = params.width;
                texture.height = params.height;
                texture.samples = samples;
                texture.sampler = texture_sampler(texture.sampler, &attachment.params);
                let format = attachment.params.format;
                let vk_format = self.native_format(format);
                texture.allocate(device, format, vk_format, self.verify)?;
                colors.push(texture);
            }
            if params.depth_stencil {
                let mut texture = VulkanTexture::new(&TextureCreationParams {
                    width: params.width,
                    height: params.height,
                    original_width: params.width,
                    original_height: params.height,
                    usage_hint: TextureUsageFlags::empty(),
                    ..Default::default()
                });
                texture.samples = samples;
                texture.allocate(device, TextureFormat::Depth, self.main_pass.depth_format, self.verify)?;
                depth = Some(texture);
            }
            submit_layout_transitions(device, CommandPoolKind::Upload, colors.iter_mut().chain(depth.iter_mut()), self.verify)
        })();

        match allocated {
            Ok(entry) => {
                self.wait_for_submission(entry);
                Ok((colors, depth))
            }
            Err(e) => {
                for mut texture in colors.into_iter().chain(depth) {
                    for object in texture.take_native_objects() {
                        object.destroy(&*self.device);
                    }
                }
                Err(e)
            }
        }
    }
}

/// Sampler state of `params`, keeping the anisotropy set by `set_texture_params`
fn texture_sampler(current: SamplerParams, params: &TextureParams) -> SamplerParams {
    SamplerParams {
        min_filter: params.min_filter,
        mag_filter: params.mag_filter,
        u_wrap: params.u_wrap,
        v_wrap: params.v_wrap,
        max_anisotropy: current.max_anisotropy,
    }
}

/// The texture to sample on a unit: the bound one once its data is on the
/// GPU, the default texture of the binding's type otherwise
fn bound_texture<'a, D: VulkanDevice>(
    device: &D,
    assets: &'a mut AssetHandleContainer<VulkanAsset>,
    fence_resources: &Mutex<FenceResourcesToDestroy>,
    requested: Option<TextureHandle>,
    fallback: TextureHandle,
    frame: usize,
) -> Result<&'a VulkanTexture> {
    let chosen = match requested.and_then(|handle| Some((handle, assets.get_mut(handle)?.texture_mut()?))) {
        Some((handle, texture)) => {
            if let Some(fence) = texture.pending_upload.take() {
                lock(fence_resources).wait(device, fence);
            }
            if texture.is_ready() {
                handle
            } else {
                fallback
            }
        }
        None => fallback,
    };

    let texture = assets
        .get_mut(chosen)
        .and_then(VulkanAsset::texture_mut)
        .ok_or_else(|| Error::InvalidResource("Default texture is missing".to_string()))?;
    texture.state.touch(frame);
    Ok(texture)
}

/// Stage `data` and submit its copy into `texture` from `pool`
fn submit_texture_upload<D: VulkanDevice>(
    device: &D,
    pool: CommandPoolKind,
    texture: &mut VulkanTexture,
    params: &TextureParams,
    data: &[u8],
    verify: bool,
) -> Result<FenceResources> {
    let format = texture.format.unwrap_or(params.format);
    let staged = staging_bytes(format, texture.vk_format, data);
    let staging = check_vk(
        device.create_buffer(staged.len() as u64, vk::BufferUsageFlags::TRANSFER_SRC),
        "vkCreateBuffer(staging)",
        verify,
    )?;

    let submitted = check_vk(device.write_buffer(staging, 0, &staged), "write staging buffer", verify).and_then(|()| {
        let regions = copy_regions(texture, params, staged.len());
        submit_one_time(device, pool, verify, |command_buffer| {
            record_upload(device, command_buffer, texture, staging, regions)
        })
    });

    match submitted {
        Ok((command_buffer, fence)) => Ok(FenceResources {
            fence,
            command_buffer: Some((pool, command_buffer)),
            resources: vec![ResourceToDestroy::Buffer(staging)],
            texture: None,
        }),
        Err(e) => {
            device.destroy_buffer(staging);
            Err(e)
        }
    }
}

/// Submit the transitions of `textures` to their resting layouts
fn submit_layout_transitions<'a, D, I>(device: &D, pool: CommandPoolKind, textures: I, verify: bool) -> Result<FenceResources>
where
    D: VulkanDevice,
    I: IntoIterator<Item = &'a mut VulkanTexture>,
{
    let (command_buffer, fence) = submit_one_time(device, pool, verify, |command_buffer| {
        for texture in textures {
            let layout = texture.resting_layout();
            let barrier = texture.transition(layout);
            device.record(command_buffer, &Command::PipelineBarrier(barrier));
        }
    })?;
    Ok(FenceResources {
        fence,
        command_buffer: Some((pool, command_buffer)),
        resources: Vec::new(),
        texture: None,
    })
}

/// Process phase of an async upload, run on the job thread
fn upload_async<D: VulkanDevice>(
    device: &D,
    assets: &Mutex<AssetHandleContainer<VulkanAsset>>,
    fence_resources: &Mutex<FenceResourcesToDestroy>,
    texture: TextureHandle,
    params: &TextureParams,
    verify: bool,
) -> Result<()> {
    let mut assets = lock(assets);
    let target = assets
        .get_mut(texture)
        .and_then(VulkanAsset::texture_mut)
        .ok_or_else(|| Error::InvalidResource("Texture deleted during upload".to_string()))?;
    if !target.is_allocated() {
        return Err(Error::InvalidResource("Texture image released during upload".to_string()));
    }
    target.check_upload_region(params)?;

    let mut entry = match params.data.as_deref() {
        Some(data) if !data.is_empty() => {
            submit_texture_upload(device, CommandPoolKind::Worker, target, params, data, verify)?
        }
        _ if target.is_ready() => return Ok(()),
        _ => submit_layout_transitions(device, CommandPoolKind::Worker, [&mut *target], verify)?,
    };
    target.pending_upload = Some(entry.fence);
    entry.texture = Some(texture);
    lock(fence_resources).register(entry);
    Ok(())
}

impl<D: VulkanDevice> GraphicsContext for VulkanContext<D> {
    // ===== Context =====

    fn adapter_family(&self) -> AdapterFamily {
        AdapterFamily::Vulkan
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.job_thread.wait_idle();
        if let Err(e) = self.device.wait_idle() {
            dm_error!("dmgraphics::vulkan", "vkDeviceWaitIdle failed during finalize: {:?}", e);
        }
        self.release_deleted_textures();

        let device = &*self.device;
        lock(&self.fence_resources).drain(device);
        for (_, asset) in lock(&self.assets).drain() {
            let objects = match asset {
                VulkanAsset::Texture(mut texture) => texture.take_native_objects(),
                VulkanAsset::RenderTarget(mut render_target) => render_target.take_native_objects(),
            };
            objects.into_iter().for_each(|object| object.destroy(device));
        }
        let buffers = self
            .vertex_buffers
            .drain()
            .map(|(_, b)| b)
            .chain(self.index_buffers.drain().map(|(_, b)| b));
        for mut buffer in buffers.chain(self.storage_buffers.drain().map(|(_, b)| b)) {
            buffer.take_native_objects().into_iter().for_each(|object| object.destroy(device));
        }
        for (_, mut program) in self.programs.drain() {
            program.take_native_objects().into_iter().for_each(|object| object.destroy(device));
        }
        for pipeline in self.pipeline_cache.drain() {
            device.destroy_pipeline(pipeline);
        }
        self.sampler_cache.destroy(device);
        self.resources_to_destroy.flush_all(device);
        for frame in self.frames.iter_mut() {
            frame.destroy(device);
        }
        self.frames.clear();
        self.main_pass.destroy(device);
        dm_debug!("dmgraphics::vulkan", "Vulkan context finalized");
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize_window(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        // Rebuilt by the next begin_frame, never under a recording frame
        self.swapchain_dirty = true;
        Ok(())
    }

    fn is_context_feature_supported(&self, _feature: ContextFeature) -> bool {
        true
    }

    fn is_texture_format_supported(&self, format: TextureFormat) -> bool {
        self.supported_formats & format.bit() != 0
    }

    fn max_texture_size(&self) -> u32 {
        self.limits.max_image_dimension_2d
    }

    fn stats(&self) -> GraphicsStats {
        self.stats
    }

    // ===== Frame =====

    fn begin_frame(&mut self) -> Result<()> {
        if self.frame_started {
            return Err(Error::InvalidResource("begin_frame called twice without flip".to_string()));
        }
        let frame = self.current_frame;
        let fence = self.frames[frame].fence;
        check_vk(self.device.wait_for_fence(fence, u64::MAX), "vkWaitForFences", self.verify)?;

        // The slot's previous submission has executed
        let mut released = self.resources_to_destroy.flush(frame, &*self.device);
        let released_uploads = {
            let mut fence_resources = lock(&self.fence_resources);
            released += fence_resources.flush(&*self.device);
            fence_resources.take_released_uploads()
        };
        self.clear_released_uploads(released_uploads);
        self.stats.resources_destroyed += released as u64;
        {
            let slot = &mut self.frames[frame];
            slot.scratch.reset();
            slot.descriptors.reset(&*self.device, self.verify)?;
        }

        if self.swapchain_dirty {
            self.recreate_swapchain()?;
        }
        let image_index = self.acquire_image()?;
        // Reset only once an image is acquired, so a failed acquire leaves the slot waitable
        check_vk(self.device.reset_fence(fence), "vkResetFences", self.verify)?;

        let command_buffer = self.frames[frame].command_buffer;
        check_vk(self.device.begin_command_buffer(command_buffer, true), "vkBeginCommandBuffer", self.verify)?;
        let image = self.main_pass.images[image_index as usize];
        self.device.record(
            command_buffer,
            &Command::PipelineBarrier(layout_barrier(
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                1,
                1,
            )),
        );
        if self.main_pass.depth.layout != vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
            let barrier = self.main_pass.depth.transition(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
            self.device.record(command_buffer, &Command::PipelineBarrier(barrier));
        }

        self.image_index = Some(image_index);
        self.frame_started = true;
        self.active_pass = None;
        self.bound_pipeline = None;
        self.bound_vertex_buffers = [None; MAX_VERTEX_BUFFERS];
        self.bound_index_buffer = None;
        self.recorded_dynamic_state = None;

        self.job_thread.update();
        self.release_deleted_textures();
        Ok(())
    }

    fn flip(&mut self) -> Result<()> {
        let image_index = match self.image_index {
            Some(index) if self.frame_started => index,
            _ => return Err(Error::InvalidResource("flip without begin_frame".to_string())),
        };
        self.end_render_pass();

        let frame = self.current_frame;
        let command_buffer = self.frames[frame].command_buffer;
        let image = self.main_pass.images[image_index as usize];
        self.device.record(
            command_buffer,
            &Command::PipelineBarrier(layout_barrier(
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
                1,
                1,
            )),
        );
        check_vk(self.device.end_command_buffer(command_buffer), "vkEndCommandBuffer", self.verify)?;

        let render_finished = self.main_pass.render_finished[image_index as usize];
        let submit = Submit {
            command_buffer,
            wait_semaphore: Some((self.frames[frame].image_available, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)),
            signal_semaphore: Some(render_finished),
            fence: self.frames[frame].fence,
        };
        check_vk(self.device.submit(&submit), "vkQueueSubmit", self.verify)?;

        self.frame_started = false;
        self.image_index = None;
        self.stats.frames += 1;
        self.current_frame = (frame + 1) % MAX_FRAMES_IN_FLIGHT;

        match self.device.present(image_index, render_finished) {
            Ok(false) => {}
            Ok(true) => self.warn_suboptimal(),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.swapchain_dirty = true,
            Err(e) => check_vk(Err(e), "vkQueuePresentKHR", self.verify)?,
        }
        Ok(())
    }

    // ===== Buffers =====

    fn new_vertex_buffer(&mut self, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<VertexBufferHandle> {
        let buffer = VulkanBuffer::new(&*self.device, size, data, usage, vk::BufferUsageFlags::VERTEX_BUFFER, self.verify)?;
        Ok(self.vertex_buffers.insert(buffer))
    }

    fn set_vertex_buffer_data(&mut self, buffer: VertexBufferHandle, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<()> {
        if !self.vertex_buffers.contains_key(buffer) {
            return Err(Error::InvalidResource("Unknown vertex buffer".to_string()));
        }
        let replacement =
            VulkanBuffer::new(&*self.device, size, data, usage, vk::BufferUsageFlags::VERTEX_BUFFER, self.verify)?;
        if let Some(slot) = self.vertex_buffers.get_mut(buffer) {
            let old = std::mem::replace(slot, replacement);
            self.defer_buffer(old);
        }
        Ok(())
    }

    fn set_vertex_buffer_sub_data(&mut self, buffer: VertexBufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.vertex_buffers
            .get(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown vertex buffer".to_string()))?
            .write(&*self.device, offset, data, self.verify)
    }

    fn delete_vertex_buffer(&mut self, buffer: VertexBufferHandle) {
        match self.vertex_buffers.remove(buffer) {
            Some(removed) => self.defer_buffer(removed),
            None => dm_warn!("dmgraphics::vulkan", "delete_vertex_buffer: unknown handle"),
        }
        for binding in self.vertex_buffer_bindings.iter_mut() {
            if *binding == Some(buffer) {
                *binding = None;
            }
        }
    }

    fn new_index_buffer(&mut self, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<IndexBufferHandle> {
        let buffer = VulkanBuffer::new(&*self.device, size, data, usage, vk::BufferUsageFlags::INDEX_BUFFER, self.verify)?;
        Ok(self.index_buffers.insert(buffer))
    }

    fn set_index_buffer_data(&mut self, buffer: IndexBufferHandle, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<()> {
        if !self.index_buffers.contains_key(buffer) {
            return Err(Error::InvalidResource("Unknown index buffer".to_string()));
        }
        let replacement =
            VulkanBuffer::new(&*self.device, size, data, usage, vk::BufferUsageFlags::INDEX_BUFFER, self.verify)?;
        if let Some(slot) = self.index_buffers.get_mut(buffer) {
            let old = std::mem::replace(slot, replacement);
            self.defer_buffer(old);
        }
        Ok(())
    }

    fn set_index_buffer_sub_data(&mut self, buffer: IndexBufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.index_buffers
            .get(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown index buffer".to_string()))?
            .write(&*self.device, offset, data, self.verify)
    }

    fn delete_index_buffer(&mut self, buffer: IndexBufferHandle) {
        match self.index_buffers.remove(buffer) {
            Some(removed) => self.defer_buffer(removed),
            None => dm_warn!("dmgraphics::vulkan", "delete_index_buffer: unknown handle"),
        }
    }

    fn new_storage_buffer(&mut self, size: usize, data: Option<&[u8]>) -> Result<StorageBufferHandle> {
        let buffer = VulkanBuffer::new(
            &*self.device,
            size,
            data,
            BufferUsage::DynamicDraw,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            self.verify,
        )?;
        Ok(self.storage_buffers.insert(buffer))
    }

    fn set_storage_buffer_data(&mut self, buffer: StorageBufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.storage_buffers
            .get(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown storage buffer".to_string()))?
            .write(&*self.device, offset, data, self.verify)
    }

    fn delete_storage_buffer(&mut self, buffer: StorageBufferHandle) {
        if let Some(removed) = self.storage_buffers.remove(buffer) {
            self.defer_buffer(removed);
        }
        for unit in self.storage_buffer_units.iter_mut() {
            if *unit == Some(buffer) {
                *unit = None;
            }
        }
    }

    fn enable_storage_buffer(&mut self, unit: u32, buffer: StorageBufferHandle) {
        match self.storage_buffer_units.get_mut(unit as usize) {
            Some(slot) => *slot = Some(buffer),
            None => dm_warn!("dmgraphics::vulkan", "Storage buffer unit {} out of range", unit),
        }
    }

    fn disable_storage_buffer(&mut self, unit: u32) {
        if let Some(slot) = self.storage_buffer_units.get_mut(unit as usize) {
            *slot = None;
        }
    }

    fn new_vertex_declaration(&mut self, declaration: VertexDeclaration) -> VertexDeclarationHandle {
        self.vertex_declarations.insert(declaration)
    }

    fn delete_vertex_declaration(&mut self, declaration: VertexDeclarationHandle) {
        self.vertex_declarations.remove(declaration);
        for binding in self.vertex_declaration_bindings.iter_mut() {
            if *binding == Some(declaration) {
                *binding = None;
            }
        }
    }

    fn enable_vertex_buffer(&mut self, buffer: VertexBufferHandle, binding_index: u32) {
        match self.vertex_buffer_bindings.get_mut(binding_index as usize) {
            Some(slot) => *slot = Some(buffer),
            None => dm_warn!("dmgraphics::vulkan", "Vertex buffer binding {} out of range", binding_index),
        }
    }

    fn disable_vertex_buffer(&mut self, binding_index: u32) {
        if let Some(slot) = self.vertex_buffer_bindings.get_mut(binding_index as usize) {
            *slot = None;
        }
    }

    fn enable_vertex_declaration(&mut self, declaration: VertexDeclarationHandle, binding_index: u32) {
        match self.vertex_declaration_bindings.get_mut(binding_index as usize) {
            Some(slot) => *slot = Some(declaration),
            None => dm_warn!("dmgraphics::vulkan", "Vertex declaration binding {} out of range", binding_index),
        }
    }

    fn disable_vertex_declaration(&mut self, binding_index: u32) {
        if let Some(slot) = self.vertex_declaration_bindings.get_mut(binding_index as usize) {
            *slot = None;
        }
    }

    // ===== Programs =====

    fn new_program(&mut self, desc: &ShaderDesc) -> Result<ProgramHandle> {
        let hash = self.next_program_hash;
        let program = VulkanProgram::new(&*self.device, desc, hash, self.verify).map_err(|e| {
            dm_error!("dmgraphics::vulkan", "Failed to create program: {}", e);
            e
        })?;
        self.next_program_hash += 1;
        Ok(self.programs.insert(program))
    }

    fn reload_program(&mut self, program: ProgramHandle, desc: &ShaderDesc) -> Result<()> {
        if !self.programs.contains_key(program) {
            return Err(Error::InvalidResource("Unknown program".to_string()));
        }
        let hash = self.next_program_hash;
        let reloaded = VulkanProgram::new(&*self.device, desc, hash, self.verify).map_err(|e| {
            dm_warn!("dmgraphics::vulkan", "Program reload failed, keeping previous program: {}", e);
            e
        })?;
        self.next_program_hash += 1;

        if let Some(slot) = self.programs.get_mut(program) {
            let mut old = std::mem::replace(slot, reloaded);
            let objects = old.take_native_objects();
            self.resources_to_destroy.destroy_deferred(&mut old.state, self.current_frame, objects);
        }
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if let Some(mut removed) = self.programs.remove(program) {
            let objects = removed.take_native_objects();
            self.resources_to_destroy.destroy_deferred(&mut removed.state, self.current_frame, objects);
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn enable_program(&mut self, program: ProgramHandle) {
        if self.programs.contains_key(program) {
            self.current_program = Some(program);
        } else {
            dm_warn!("dmgraphics::vulkan", "enable_program: unknown handle");
        }
    }

    fn disable_program(&mut self) {
        self.current_program = None;
    }

    fn program_layout(&self, program: ProgramHandle) -> Option<&ProgramLayout> {
        self.programs.get(program).map(|p| &p.layout)
    }

    fn set_constant(&mut self, location: UniformLocation, data: &[u8]) -> Result<()> {
        let program = self
            .current_program
            .and_then(|p| self.programs.get_mut(p))
            .ok_or_else(|| Error::InvalidResource("set_constant without an enabled program".to_string()))?;
        program.layout.set_constant(location, data)
    }

    // ===== Textures =====

    fn new_texture(&mut self, params: &TextureCreationParams) -> Result<TextureHandle> {
        let max = self.max_texture_size();
        if params.width > max || params.height > max {
            return Err(Error::InvalidResource(format!(
                "Texture size {}x{} exceeds the maximum of {}",
                params.width, params.height, max
            )));
        }
        // The image is created by the first set_texture, once the format is known
        let texture = VulkanTexture::new(params);
        Ok(lock(&self.assets).insert(AssetType::Texture, VulkanAsset::Texture(texture)))
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.unbind_texture(texture);

        let pending = {
            let assets = lock(&self.assets);
            match assets.get(texture).and_then(VulkanAsset::texture) {
                Some(t) => t.data_pending != 0,
                None => {
                    dm_warn!("dmgraphics::vulkan", "delete_texture: unknown handle");
                    return;
                }
            }
        };

        if !pending {
            let removed = lock(&self.assets).remove(texture);
            if let Some(VulkanAsset::Texture(mut removed)) = removed {
                self.defer_texture_objects(&mut removed);
            }
            return;
        }

        // Queued behind the uploads so their completions still find the texture
        let assets = self.assets.clone();
        let deleted = self.deleted_textures.clone();
        self.job_thread.push_job(
            || Ok(()),
            move |_| {
                let removed = lock(&assets).remove(texture);
                if let Some(VulkanAsset::Texture(removed)) = removed {
                    lock(&deleted).push(removed);
                }
            },
        );
    }

    fn set_texture(&mut self, texture: TextureHandle, params: &TextureParams) -> Result<()> {
        self.check_format(params.format)?;
        let vk_format = self.native_format(params.format);
        self.set_texture_native(texture, params, vk_format)
    }

    fn set_texture_async(&mut self, texture: TextureHandle, params: TextureParams, callback: Option<SetTextureAsyncCallback>) -> Result<()> {
        self.check_format(params.format)?;
        let vk_format = self.native_format(params.format);
        let mip_bit = mip_bits(params.mip_map, 1);
        self.finish_uploads_before_reallocation(texture, &params);

        {
            // Images are created on the render thread; the job only records the copy
            let assets = Arc::clone(&self.assets);
            let mut assets = lock(&assets);
            let target = assets
                .get_mut(texture)
                .and_then(VulkanAsset::texture_mut)
                .ok_or_else(|| Error::InvalidResource("Unknown texture".to_string()))?;
            self.prepare_image(target, &params, vk_format)?;
            target.sampler = texture_sampler(target.sampler, &params);
            target.data_pending |= mip_bit;
        }

        let slot = lock(&self.async_uploads).acquire(AsyncUpload { params: Some(params), callback });

        let device = self.device.clone();
        let verify = self.verify;
        let process_uploads = self.async_uploads.clone();
        let process_assets = self.assets.clone();
        let fence_resources = self.fence_resources.clone();
        let complete_uploads = self.async_uploads.clone();
        let complete_assets = self.assets.clone();

        self.job_thread.push_job(
            move || {
                let params = lock(&process_uploads)
                    .get_mut(slot)
                    .and_then(|upload| upload.params.take())
                    .ok_or_else(|| Error::InvalidResource(format!("Async upload slot {} is empty", slot)))?;
                upload_async(&*device, &process_assets, &fence_resources, texture, &params, verify)
            },
            move |result| {
                if let Some(target) = lock(&complete_assets).get_mut(texture).and_then(VulkanAsset::texture_mut) {
                    target.data_pending &= !mip_bit;
                }
                let upload = lock(&complete_uploads).release(slot);
                let status = match result {
                    Ok(()) => AsyncUploadStatus::Completed,
                    Err(e) => {
                        dm_warn!("dmgraphics::vulkan", "Async texture upload failed: {}", e);
                        AsyncUploadStatus::Failed(e.to_string())
                    }
                };
                if let Some(callback) = upload.and_then(|u| u.callback) {
                    callback(texture, status);
                }
            },
        );
        Ok(())
    }

    fn set_texture_params(&mut self, texture: TextureHandle, sampler: &SamplerParams) -> Result<()> {
        let mut assets = lock(&self.assets);
        let target = assets
            .get_mut(texture)
            .and_then(VulkanAsset::texture_mut)
            .ok_or_else(|| Error::InvalidResource("Unknown texture".to_string()))?;
        target.sampler = *sampler;
        Ok(())
    }

    fn texture_status_flags(&self, texture: TextureHandle) -> TextureStatusFlags {
        match lock(&self.assets).get(texture).and_then(VulkanAsset::texture) {
            Some(t) if t.data_pending != 0 => TextureStatusFlags::DATA_PENDING,
            _ => TextureStatusFlags::empty(),
        }
    }

    fn texture_info(&self, texture: TextureHandle) -> Option<TextureInfo> {
        lock(&self.assets).get(texture).and_then(VulkanAsset::texture).map(VulkanTexture::info)
    }

    fn enable_texture(&mut self, unit: u32, texture: TextureHandle) {
        if !self.is_asset_handle_valid(texture) {
            dm_warn!("dmgraphics::vulkan", "enable_texture: invalid handle on unit {}", unit);
            return;
        }
        match self.texture_units.get_mut(unit as usize) {
            Some(slot) => *slot = Some(texture),
            None => dm_warn!("dmgraphics::vulkan", "Texture unit {} out of range", unit),
        }
    }

    fn disable_texture(&mut self, unit: u32) {
        if let Some(slot) = self.texture_units.get_mut(unit as usize) {
            *slot = None;
        }
    }

    fn is_asset_handle_valid(&self, asset: AssetHandle) -> bool {
        lock(&self.assets).is_valid(asset)
    }

    // ===== Render targets =====

    fn new_render_target(&mut self, params: &RenderTargetCreationParams) -> Result<RenderTargetHandle> {
        if params.color_attachments.len() > MAX_BUFFER_COLOR_ATTACHMENTS {
            return Err(Error::InvalidResource(format!(
                "{} color attachments requested, at most {} supported",
                params.color_attachments.len(),
                MAX_BUFFER_COLOR_ATTACHMENTS
            )));
        }
        for attachment in &params.color_attachments {
            self.check_format(attachment.params.format)?;
        }

        let (colors, depth) = self.create_attachments(params)?;
        let color_formats: Vec<vk::Format> = colors.iter().map(|t| t.vk_format).collect();
        let depth_format = depth.as_ref().map(|t| t.vk_format);
        let views: Vec<vk::ImageView> = colors.iter().chain(depth.iter()).map(|t| t.view).collect();
        let extent = vk::Extent2D { width: params.width, height: params.height };

        let device = &*self.device;
        let render_pass = check_vk(
            device.create_render_pass(&RenderPassDesc {
                color_formats: color_formats.clone(),
                color_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                depth_format,
                samples: sample_count_to_vk(params.samples.max(1)),
            }),
            "vkCreateRenderPass",
            self.verify,
        );
        let framebuffer = render_pass.and_then(|render_pass| {
            check_vk(device.create_framebuffer(render_pass, &views, extent), "vkCreateFramebuffer", self.verify)
                .map(|framebuffer| (render_pass, framebuffer))
                .inspect_err(|_| device.destroy_render_pass(render_pass))
        });
        let (render_pass, framebuffer) = match framebuffer {
            Ok(objects) => objects,
            Err(e) => {
                for mut texture in colors.into_iter().chain(depth) {
                    texture.take_native_objects().into_iter().for_each(|object| object.destroy(device));
                }
                return Err(e);
            }
        };

        let id = self.next_render_target_id;
        self.next_render_target_id += 1;

        let mut assets = lock(&self.assets);
        let color_textures = colors
            .into_iter()
            .map(|texture| assets.insert(AssetType::Texture, VulkanAsset::Texture(texture)))
            .collect();
        let depth_stencil_texture = depth.map(|texture| assets.insert(AssetType::Texture, VulkanAsset::Texture(texture)));
        let render_target = VulkanRenderTarget {
            id,
            color_textures,
            depth_stencil_texture,
            color_formats,
            depth_format,
            render_pass,
            framebuffer,
            extent,
            samples: params.samples.max(1),
            state: Default::default(),
        };
        Ok(assets.insert(AssetType::RenderTarget, VulkanAsset::RenderTarget(render_target)))
    }

    fn delete_render_target(&mut self, render_target: RenderTargetHandle) {
        let removed = lock(&self.assets).remove(render_target);
        let Some(VulkanAsset::RenderTarget(mut rt)) = removed else {
            dm_warn!("dmgraphics::vulkan", "delete_render_target: unknown handle");
            return;
        };
        if self.current_render_target == Some(render_target) {
            self.end_render_pass();
            self.current_render_target = None;
        }
        let objects = rt.take_native_objects();
        self.resources_to_destroy.destroy_deferred(&mut rt.state, self.current_frame, objects);
        for texture in rt.color_textures.iter().chain(rt.depth_stencil_texture.iter()) {
            self.delete_texture(*texture);
        }
    }

    fn set_render_target(&mut self, render_target: Option<RenderTargetHandle>) -> Result<()> {
        if let Some(rt) = render_target {
            let valid = lock(&self.assets).get(rt).and_then(VulkanAsset::render_target).is_some();
            if !valid {
                return Err(Error::InvalidResource("Unknown render target".to_string()));
            }
        }
        if self.current_render_target != render_target {
            self.end_render_pass();
            self.current_render_target = render_target;
        }
        Ok(())
    }

    fn render_target_texture(&self, render_target: RenderTargetHandle, buffer: BufferType) -> Option<TextureHandle> {
        let assets = lock(&self.assets);
        let rt = assets.get(render_target).and_then(VulkanAsset::render_target)?;
        match buffer.color_index() {
            Some(index) => rt.color_textures.get(index).copied(),
            None => rt.depth_stencil_texture,
        }
    }

    fn set_render_target_size(&mut self, render_target: RenderTargetHandle, width: u32, height: u32) -> Result<()> {
        if self.current_render_target == Some(render_target) {
            self.end_render_pass();
        }
        let assets = Arc::clone(&self.assets);
        let mut assets = lock(&assets);
        let (attachments, render_pass) = {
            let rt = assets
                .get(render_target)
                .and_then(VulkanAsset::render_target)
                .ok_or_else(|| Error::InvalidResource("Unknown render target".to_string()))?;
            let attachments: Vec<TextureHandle> =
                rt.color_textures.iter().chain(rt.depth_stencil_texture.iter()).copied().collect();
            (attachments, rt.render_pass)
        };

        let mut views = Vec::with_capacity(attachments.len());
        for handle in attachments {
            let Some(texture) = assets.get_mut(handle).and_then(VulkanAsset::texture_mut) else {
                continue;
            };
            let Some(format) = texture.format else {
                continue;
            };
            let vk_format = texture.vk_format;
            self.defer_texture_objects(texture);
            texture.width = width;
            texture.height = height;
            texture.allocate(&*self.device, format, vk_format, self.verify)?;
            let entry = submit_layout_transitions(&*self.device, CommandPoolKind::Upload, [&mut *texture], self.verify)?;
            self.wait_for_submission(entry);
            views.push(texture.view);
        }

        let extent = vk::Extent2D { width, height };
        let framebuffer = check_vk(
            self.device.create_framebuffer(render_pass, &views, extent),
            "vkCreateFramebuffer",
            self.verify,
        )?;
        let rt = assets
            .get_mut(render_target)
            .and_then(VulkanAsset::render_target_mut)
            .ok_or_else(|| Error::InvalidResource("Unknown render target".to_string()))?;
        let old = std::mem::replace(&mut rt.framebuffer, framebuffer);
        let frame = rt.state.last_used_frame().unwrap_or(self.current_frame);
        self.resources_to_destroy.push(frame, ResourceToDestroy::Framebuffer(old));
        rt.extent = extent;
        Ok(())
    }

    // ===== Render state =====

    fn pipeline_state(&self) -> PipelineState {
        self.pipeline_state
    }

    fn pipeline_state_mut(&mut self) -> &mut PipelineState {
        &mut self.pipeline_state
    }

    fn set_polygon_offset(&mut self, factor: f32, units: f32) {
        self.polygon_offset = (factor, units);
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Some(Rect { x, y, width, height });
    }

    fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.scissor = Some(Rect { x, y, width, height });
    }

    // ===== Drawing =====

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u32) -> Result<()> {
        let active = self.ensure_render_pass()?;
        let command_buffer = self.command_buffer();
        let rect = vk::Rect2D { offset: vk::Offset2D::default(), extent: active.extent };

        for index in 0..active.info.color_attachment_count {
            let flag = ClearFlags::from_bits_truncate(ClearFlags::COLOR0.bits() << index);
            if flags.contains(flag) {
                self.device.record(command_buffer, &Command::ClearColor { attachment: index, color, rect });
            }
        }

        if let Some(depth_format) = active.depth_format {
            let mut aspect = vk::ImageAspectFlags::empty();
            if flags.contains(ClearFlags::DEPTH) {
                aspect |= vk::ImageAspectFlags::DEPTH;
            }
            if flags.contains(ClearFlags::STENCIL) && has_stencil(depth_format) {
                aspect |= vk::ImageAspectFlags::STENCIL;
            }
            if !aspect.is_empty() {
                self.device.record(command_buffer, &Command::ClearDepthStencil { aspect, depth, stencil, rect });
            }
        }
        Ok(())
    }

    fn draw(&mut self, primitive: PrimitiveType, first: u32, count: u32, instances: u32) -> Result<()> {
        self.prepare_draw(primitive)?;
        self.device.record(
            self.command_buffer(),
            &Command::Draw { vertex_count: count, instance_count: instances.max(1), first_vertex: first },
        );
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        first: u32,
        count: u32,
        index_format: IndexBufferFormat,
        index_buffer: IndexBufferHandle,
        instances: u32,
    ) -> Result<()> {
        let index_size = index_format.size();
        if first % index_size != 0 {
            return Err(Error::InvalidResource(format!(
                "Index offset {} is not a multiple of the index size {}",
                first, index_size
            )));
        }
        if !self.index_buffers.contains_key(index_buffer) {
            return Err(Error::InvalidResource("Unknown index buffer".to_string()));
        }
        self.prepare_draw(primitive)?;

        let frame = self.current_frame;
        let command_buffer = self.command_buffer();
        let index_type = index_type_to_vk(index_format);
        if let Some(buffer) = self.index_buffers.get_mut(index_buffer) {
            buffer.state.touch(frame);
            if self.bound_index_buffer != Some((buffer.buffer, index_type)) {
                self.device.record(
                    command_buffer,
                    &Command::BindIndexBuffer { buffer: buffer.buffer, offset: 0, index_type },
                );
                self.bound_index_buffer = Some((buffer.buffer, index_type));
            }
        }
        self.device.record(
            command_buffer,
            &Command::DrawIndexed {
                index_count: count,
                instance_count: instances.max(1),
                first_index: first / index_size,
            },
        );
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn dispatch_compute(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()> {
        if !self.frame_started {
            return Err(Error::InvalidResource("dispatch_compute outside of begin_frame/flip".to_string()));
        }
        let (program, pipeline) = self
            .current_program
            .and_then(|handle| Some((handle, self.programs.get(handle)?.compute_pipeline?)))
            .ok_or_else(|| Error::InvalidResource("dispatch_compute without an enabled compute program".to_string()))?;

        // Dispatches are recorded outside render passes
        self.end_render_pass();
        let command_buffer = self.command_buffer();
        self.device.record(
            command_buffer,
            &Command::BindPipeline { bind_point: vk::PipelineBindPoint::COMPUTE, pipeline },
        );
        self.bind_descriptor_sets(program, vk::PipelineBindPoint::COMPUTE)?;
        self.device.record(
            command_buffer,
            &Command::Dispatch { x: group_count_x, y: group_count_y, z: group_count_z },
        );
        self.stats.dispatches += 1;
        Ok(())
    }
}

impl<D: VulkanDevice> Drop for VulkanContext<D> {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
#[path = "vulkan_context_tests.rs"]
mod tests;
