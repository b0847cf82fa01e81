//! Recording implementation of `VulkanDevice` for unit tests
//!
//! Handles are plain counters, buffers are byte vectors, fences are flags.
//! Every command, submission, creation and destruction is recorded so the
//! context's use of the native API can be asserted without a GPU.

use crate::vulkan_device::*;
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use dm_graphics::dmgraphics::shader::{
    ResourceType, ShaderDesc, ShaderLanguage, ShaderMeta, ShaderResourceBinding, ShaderResourceMember,
    ShaderResourceTypeInfo, ShaderSource, ShaderStage, ShaderStageDesc, ShaderType,
};
use dm_graphics::dmgraphics::utils::lock;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

pub struct RecordingState {
    next_handle: u64,
    pub limits: DeviceLimits,
    pub unsupported_formats: Vec<vk::Format>,
    pub extent: vk::Extent2D,
    pub swapchain_images: Vec<vk::Image>,
    next_image_index: u32,
    /// Scripted results of upcoming acquires (`SUBOPTIMAL_KHR` or an error)
    pub acquire_results: VecDeque<vk::Result>,
    pub present_results: VecDeque<vk::Result>,
    pub recreate_count: u32,
    /// Submitted fences signal immediately when set
    pub auto_signal: bool,
    pub descriptor_pool_capacity: u32,
    pool_usage: FxHashMap<u64, u32>,
    buffers: FxHashMap<u64, Vec<u8>>,
    pub images: FxHashMap<u64, ImageDesc>,
    fences: FxHashMap<u64, bool>,
    command_buffers: FxHashMap<u64, Vec<Command>>,
    pub history: Vec<(vk::CommandBuffer, Command)>,
    /// Copy regions that fall outside the subresources of their image
    pub invalid_copies: Vec<(vk::Image, BufferImageCopy)>,
    pub submits: Vec<Submit>,
    pub presents: u32,
    pub waited_fences: Vec<vk::Fence>,
    pub graphics_pipelines: Vec<GraphicsPipelineDesc>,
    pub compute_pipelines: u32,
    pub samplers: Vec<SamplerDesc>,
    pub render_passes: Vec<RenderPassDesc>,
    pub descriptor_writes: Vec<DescriptorWrite>,
    pub created: FxHashMap<&'static str, u32>,
    pub destroyed: Vec<(&'static str, u64)>,
}

pub struct RecordingDevice {
    state: Mutex<RecordingState>,
    pool_locks: [Mutex<()>; 3],
}

impl RecordingDevice {
    pub fn new() -> Self {
        let mut state = RecordingState {
            next_handle: 1,
            limits: DeviceLimits::default(),
            unsupported_formats: Vec::new(),
            extent: vk::Extent2D { width: 640, height: 480 },
            swapchain_images: Vec::new(),
            next_image_index: 0,
            acquire_results: VecDeque::new(),
            present_results: VecDeque::new(),
            recreate_count: 0,
            auto_signal: true,
            descriptor_pool_capacity: 512,
            pool_usage: FxHashMap::default(),
            buffers: FxHashMap::default(),
            images: FxHashMap::default(),
            fences: FxHashMap::default(),
            command_buffers: FxHashMap::default(),
            history: Vec::new(),
            invalid_copies: Vec::new(),
            submits: Vec::new(),
            presents: 0,
            waited_fences: Vec::new(),
            graphics_pipelines: Vec::new(),
            compute_pipelines: 0,
            samplers: Vec::new(),
            render_passes: Vec::new(),
            descriptor_writes: Vec::new(),
            created: FxHashMap::default(),
            destroyed: Vec::new(),
        };
        let images: Vec<vk::Image> = (0..3).map(|_| vk::Image::from_raw(state.next())).collect();
        state.swapchain_images = images;
        Self {
            state: Mutex::new(state),
            pool_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
        }
    }

    pub fn state(&self) -> MutexGuard<'_, RecordingState> {
        lock(&self.state)
    }

    pub fn created(&self, kind: &str) -> u32 {
        self.state().created.get(kind).copied().unwrap_or(0)
    }

    pub fn destroyed(&self, kind: &str) -> u32 {
        self.state().destroyed.iter().filter(|(k, _)| *k == kind).count() as u32
    }

    pub fn is_destroyed<H: Handle>(&self, handle: H) -> bool {
        let raw = handle.as_raw();
        self.state().destroyed.iter().any(|(_, r)| *r == raw)
    }

    pub fn buffer_data(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        self.state().buffers.get(&buffer.as_raw()).cloned()
    }

    pub fn commands(&self, command_buffer: vk::CommandBuffer) -> Vec<Command> {
        self.state().command_buffers.get(&command_buffer.as_raw()).cloned().unwrap_or_default()
    }

    pub fn signal_fence(&self, fence: vk::Fence) {
        self.state().fences.insert(fence.as_raw(), true);
    }

    pub fn is_signaled(&self, fence: vk::Fence) -> bool {
        self.state().fences.get(&fence.as_raw()).copied().unwrap_or(false)
    }

    pub fn live_fences(&self) -> usize {
        self.state().fences.len()
    }
}

impl RecordingState {
    fn next(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn create<H: Handle>(&mut self, kind: &'static str) -> H {
        *self.created.entry(kind).or_insert(0) += 1;
        H::from_raw(self.next())
    }

    fn destroy<H: Handle + Copy>(&mut self, kind: &'static str, handle: H) {
        if handle.as_raw() != 0 {
            self.destroyed.push((kind, handle.as_raw()));
        }
    }
}

impl VulkanDevice for RecordingDevice {
    fn limits(&self) -> DeviceLimits {
        self.state().limits
    }

    fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        if self.state().unsupported_formats.contains(&format) {
            return vk::FormatFeatureFlags::empty();
        }
        vk::FormatFeatureFlags::SAMPLED_IMAGE
            | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
            | vk::FormatFeatureFlags::COLOR_ATTACHMENT
            | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            | vk::FormatFeatureFlags::STORAGE_IMAGE
            | vk::FormatFeatureFlags::TRANSFER_DST
    }

    fn depth_stencil_format(&self) -> vk::Format {
        vk::Format::D24_UNORM_S8_UINT
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut state = self.state();
        for signaled in state.fences.values_mut() {
            *signaled = true;
        }
        Ok(())
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.state().extent
    }

    fn swapchain_format(&self) -> vk::Format {
        vk::Format::B8G8R8A8_UNORM
    }

    fn swapchain_images(&self) -> Vec<vk::Image> {
        self.state().swapchain_images.clone()
    }

    fn acquire_next_image(&self, _signal: vk::Semaphore) -> VkResult<(u32, bool)> {
        let mut state = self.state();
        let scripted = state.acquire_results.pop_front();
        let index = state.next_image_index;
        match scripted {
            Some(vk::Result::SUBOPTIMAL_KHR) => {}
            Some(error) => return Err(error),
            None => {}
        }
        state.next_image_index = (index + 1) % state.swapchain_images.len() as u32;
        Ok((index, scripted == Some(vk::Result::SUBOPTIMAL_KHR)))
    }

    fn present(&self, _image_index: u32, _wait: vk::Semaphore) -> VkResult<bool> {
        let mut state = self.state();
        state.presents += 1;
        match state.present_results.pop_front() {
            Some(vk::Result::SUBOPTIMAL_KHR) => Ok(true),
            Some(error) => Err(error),
            None => Ok(false),
        }
    }

    fn recreate_swapchain(&self, width: u32, height: u32) -> VkResult<()> {
        let mut state = self.state();
        state.extent = vk::Extent2D { width, height };
        let count = state.swapchain_images.len();
        let images: Vec<vk::Image> = (0..count).map(|_| vk::Image::from_raw(state.next())).collect();
        state.swapchain_images = images;
        state.next_image_index = 0;
        state.recreate_count += 1;
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state();
        let fence: vk::Fence = state.create("fence");
        state.fences.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        state.fences.remove(&fence.as_raw());
        state.destroy("fence", fence);
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        let mut state = self.state();
        state.waited_fences.push(fence);
        match state.fences.get_mut(&fence.as_raw()) {
            Some(signaled) => {
                // The simulated GPU finishes whatever was waited on
                *signaled = true;
                Ok(())
            }
            None => Err(vk::Result::ERROR_UNKNOWN),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.state().fences.insert(fence.as_raw(), false);
        Ok(())
    }

    fn is_fence_signaled(&self, fence: vk::Fence) -> VkResult<bool> {
        self.state().fences.get(&fence.as_raw()).copied().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(self.state().create("semaphore"))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state().destroy("semaphore", semaphore);
    }

    fn lock_command_pool(&self, pool: CommandPoolKind) -> MutexGuard<'_, ()> {
        lock(&self.pool_locks[pool as usize])
    }

    fn allocate_command_buffer(&self, _pool: CommandPoolKind) -> VkResult<vk::CommandBuffer> {
        let mut state = self.state();
        let command_buffer: vk::CommandBuffer = state.create("command_buffer");
        state.command_buffers.insert(command_buffer.as_raw(), Vec::new());
        Ok(command_buffer)
    }

    fn free_command_buffer(&self, _pool: CommandPoolKind, command_buffer: vk::CommandBuffer) {
        self.state().destroy("command_buffer", command_buffer);
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, _one_time_submit: bool) -> VkResult<()> {
        self.state().command_buffers.insert(command_buffer.as_raw(), Vec::new());
        Ok(())
    }

    fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        Ok(())
    }

    fn record(&self, command_buffer: vk::CommandBuffer, command: &Command) {
        let mut state = self.state();
        if let Command::CopyBufferToImage { image, regions, .. } = command {
            let invalid: Vec<BufferImageCopy> = match state.images.get(&image.as_raw()) {
                Some(desc) => regions.iter().filter(|region| !region_fits(desc, region)).copied().collect(),
                None => regions.clone(),
            };
            state.invalid_copies.extend(invalid.into_iter().map(|region| (*image, region)));
        }
        state
            .command_buffers
            .entry(command_buffer.as_raw())
            .or_default()
            .push(command.clone());
        state.history.push((command_buffer, command.clone()));
    }

    fn submit(&self, submit: &Submit) -> VkResult<()> {
        let mut state = self.state();
        if state.auto_signal && submit.fence != vk::Fence::null() {
            state.fences.insert(submit.fence.as_raw(), true);
        }
        state.submits.push(*submit);
        Ok(())
    }

    fn create_buffer(&self, size: u64, _usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer> {
        let mut state = self.state();
        let buffer: vk::Buffer = state.create("buffer");
        state.buffers.insert(buffer.as_raw(), vec![0; size as usize]);
        Ok(buffer)
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> VkResult<()> {
        let mut state = self.state();
        let contents = state.buffers.get_mut(&buffer.as_raw()).ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state();
        state.buffers.remove(&buffer.as_raw());
        state.destroy("buffer", buffer);
    }

    fn create_image(&self, desc: &ImageDesc) -> VkResult<vk::Image> {
        let mut state = self.state();
        let image: vk::Image = state.create("image");
        state.images.insert(image.as_raw(), desc.clone());
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state();
        state.images.remove(&image.as_raw());
        state.destroy("image", image);
    }

    fn create_image_view(&self, _image: vk::Image, _desc: &ImageViewDesc) -> VkResult<vk::ImageView> {
        Ok(self.state().create("image_view"))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().destroy("image_view", view);
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> VkResult<vk::Sampler> {
        let mut state = self.state();
        state.samplers.push(*desc);
        Ok(state.create("sampler"))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state().destroy("sampler", sampler);
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
        let mut state = self.state();
        state.render_passes.push(desc.clone());
        Ok(state.create("render_pass"))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state().destroy("render_pass", render_pass);
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        Ok(self.state().create("framebuffer"))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state().destroy("framebuffer", framebuffer);
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        if code.is_empty() {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        Ok(self.state().create("shader_module"))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state().destroy("shader_module", module);
    }

    fn create_descriptor_set_layout(&self, _bindings: &[DescriptorBinding]) -> VkResult<vk::DescriptorSetLayout> {
        Ok(self.state().create("descriptor_set_layout"))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state().destroy("descriptor_set_layout", layout);
    }

    fn create_pipeline_layout(&self, _set_layouts: &[vk::DescriptorSetLayout]) -> VkResult<vk::PipelineLayout> {
        Ok(self.state().create("pipeline_layout"))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state().destroy("pipeline_layout", layout);
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> VkResult<vk::Pipeline> {
        let mut state = self.state();
        state.graphics_pipelines.push(desc.clone());
        Ok(state.create("pipeline"))
    }

    fn create_compute_pipeline(&self, _layout: vk::PipelineLayout, _module: vk::ShaderModule) -> VkResult<vk::Pipeline> {
        let mut state = self.state();
        state.compute_pipelines += 1;
        Ok(state.create("pipeline"))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state().destroy("pipeline", pipeline);
    }

    fn create_descriptor_pool(&self, _max_sets: u32) -> VkResult<vk::DescriptorPool> {
        let mut state = self.state();
        let pool: vk::DescriptorPool = state.create("descriptor_pool");
        state.pool_usage.insert(pool.as_raw(), 0);
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        self.state().pool_usage.insert(pool.as_raw(), 0);
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state();
        state.pool_usage.remove(&pool.as_raw());
        state.destroy("descriptor_pool", pool);
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let mut state = self.state();
        let capacity = state.descriptor_pool_capacity;
        let usage = state.pool_usage.get_mut(&pool.as_raw()).ok_or(vk::Result::ERROR_UNKNOWN)?;
        if *usage >= capacity {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        *usage += 1;
        Ok(state.create("descriptor_set"))
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        self.state().descriptor_writes.extend_from_slice(writes);
    }
}

// ============================================================================
// Shader fixtures
// ============================================================================

/// Smallest byte stream accepted as SPIR-V: header words only
fn region_fits(desc: &ImageDesc, region: &BufferImageCopy) -> bool {
    if region.mip_level >= desc.mip_levels || region.base_array_layer + region.layer_count > desc.array_layers {
        return false;
    }
    let mip_extent = |size: u32| (size >> region.mip_level).max(1);
    let fits = |offset: i32, size: u32, limit: u32| offset >= 0 && offset as u64 + u64::from(size) <= u64::from(mip_extent(limit));
    fits(region.image_offset.x, region.image_extent.width, desc.extent.width)
        && fits(region.image_offset.y, region.image_extent.height, desc.extent.height)
        && fits(region.image_offset.z, region.image_extent.depth, desc.extent.depth)
}

pub fn spirv_bytes() -> Vec<u8> {
    [0x0723_0203u32, 0x0001_0000, 0, 1, 0].iter().flat_map(|w| w.to_le_bytes()).collect()
}

pub fn spirv_stage(stage: ShaderStage, meta: ShaderMeta) -> ShaderStageDesc {
    ShaderStageDesc {
        stage,
        sources: vec![ShaderSource { language: ShaderLanguage::Spirv, source: spirv_bytes() }],
        meta: Some(meta),
    }
}

pub fn graphics_desc(vertex: ShaderMeta, fragment: ShaderMeta) -> ShaderDesc {
    ShaderDesc {
        stages: vec![spirv_stage(ShaderStage::Vertex, vertex), spirv_stage(ShaderStage::Fragment, fragment)],
    }
}

pub fn compute_desc(meta: ShaderMeta) -> ShaderDesc {
    ShaderDesc { stages: vec![spirv_stage(ShaderStage::Compute, meta)] }
}

fn uniforms_type() -> ShaderResourceTypeInfo {
    ShaderResourceTypeInfo::new(
        "uniforms_t",
        vec![
            ShaderResourceMember::new("view_proj", ResourceType::Shader(ShaderType::Mat4), 1, 0),
            ShaderResourceMember::new("tint", ResourceType::Shader(ShaderType::Vec4), 1, 64),
        ],
    )
}

/// Vertex stage: `uniforms` block at (0, 0), position and texcoord0 inputs
pub fn textured_vertex_meta() -> ShaderMeta {
    ShaderMeta {
        uniform_buffers: vec![ShaderResourceBinding::uniform_buffer("uniforms", 0, 0, 0, 80)],
        inputs: vec![
            ShaderResourceBinding::input("position", ShaderType::Vec3, 0),
            ShaderResourceBinding::input("texcoord0", ShaderType::Vec2, 1),
        ],
        type_infos: vec![uniforms_type()],
        ..Default::default()
    }
}

/// Fragment stage: the shared `uniforms` block and an `albedo` sampler at (1, 0)
pub fn textured_fragment_meta() -> ShaderMeta {
    ShaderMeta {
        uniform_buffers: vec![ShaderResourceBinding::uniform_buffer("uniforms", 0, 0, 0, 80)],
        textures: vec![ShaderResourceBinding::texture("albedo", ShaderType::Sampler2D, 1, 0)],
        type_infos: vec![uniforms_type()],
        ..Default::default()
    }
}

pub fn textured_desc() -> ShaderDesc {
    graphics_desc(textured_vertex_meta(), textured_fragment_meta())
}
