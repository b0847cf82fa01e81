//! Headless context
//!
//! Every verb is emulated on the CPU. Buffers are byte vectors, textures
//! keep one byte vector per mip level, clears fill the bound frame buffer
//! and draws gather the bound vertex streams so callers can inspect what
//! a draw would have consumed.

use super::null_texture::{resolve_filter, upload_texture, FrameBuffer, NullAsset, NullRenderTarget, NullTexture};
use crate::adapter::AdapterFamily;
use crate::error::{Error, Result};
use crate::graphics::{
    mip_bits, AsyncUploadStatus, BufferType, BufferUsage, ClearFlags, ContextFeature, ContextParams, GraphicsContext,
    GraphicsStats, IndexBufferFormat, IndexBufferHandle, PipelineState, PrimitiveType, ProgramHandle,
    RenderTargetCreationParams, SamplerParams, SetTextureAsyncCallback, StorageBufferHandle, TextureCreationParams,
    TextureFilter, TextureFormat, TextureInfo, TextureParams, TextureStatusFlags, TextureUsageFlags,
    VertexBufferHandle, VertexDeclaration, VertexDeclarationHandle, VertexStepFunction, MAX_BUFFER_COLOR_ATTACHMENTS,
    MAX_STORAGE_BUFFER_UNITS, MAX_TEXTURE_UNITS, MAX_VERTEX_BUFFERS,
};
use crate::shader::{ProgramLayout, ShaderDesc, ShaderMeta, ShaderStage, ShaderStageFlags, UniformLocation};
use crate::utils::{lock, AssetHandle, AssetHandleContainer, AssetType, JobThread, ParamSlots, RenderTargetHandle, TextureHandle};
use crate::{dm_debug, dm_error, dm_warn};
use slotmap::SlotMap;
use std::sync::{Arc, Mutex};

/// Uniform blocks are packed at this alignment inside program data
pub const NULL_UNIFORM_BUFFER_ALIGNMENT: u32 = 16;

pub const NULL_MAX_TEXTURE_SIZE: u32 = 8192;

type SharedAssets = Arc<Mutex<AssetHandleContainer<NullAsset>>>;

struct NullBuffer {
    data: Vec<u8>,
    usage: BufferUsage,
}

impl NullBuffer {
    fn new(size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Self {
        let mut buffer = vec![0; size];
        if let Some(data) = data {
            let len = data.len().min(size);
            buffer[..len].copy_from_slice(&data[..len]);
        }
        Self { data: buffer, usage }
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset + data.len();
        if end > self.data.len() {
            return Err(Error::InvalidResource(format!(
                "Write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.data.len()
            )));
        }
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }
}

struct NullProgram {
    layout: ProgramLayout,
}

/// Payload of one in-flight `set_texture_async`
struct AsyncUpload {
    params: Option<TextureParams>,
    callback: Option<SetTextureAsyncCallback>,
}

/// Viewport or scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

pub struct NullContext {
    width: u32,
    height: u32,
    default_min_filter: TextureFilter,
    default_mag_filter: TextureFilter,
    supported_formats: u64,
    main_frame_buffer: FrameBuffer,
    current_render_target: Option<RenderTargetHandle>,

    vertex_buffers: SlotMap<VertexBufferHandle, NullBuffer>,
    index_buffers: SlotMap<IndexBufferHandle, NullBuffer>,
    storage_buffers: SlotMap<StorageBufferHandle, NullBuffer>,
    vertex_declarations: SlotMap<VertexDeclarationHandle, VertexDeclaration>,
    programs: SlotMap<ProgramHandle, NullProgram>,

    /// Shared with async upload jobs
    assets: SharedAssets,
    async_uploads: Arc<Mutex<ParamSlots<AsyncUpload>>>,
    job_thread: JobThread,

    current_program: Option<ProgramHandle>,
    vertex_buffer_bindings: [Option<VertexBufferHandle>; MAX_VERTEX_BUFFERS],
    vertex_declaration_bindings: [Option<VertexDeclarationHandle>; MAX_VERTEX_BUFFERS],
    texture_units: [Option<TextureHandle>; MAX_TEXTURE_UNITS],
    storage_buffer_units: [Option<StorageBufferHandle>; MAX_STORAGE_BUFFER_UNITS],

    pipeline_state: PipelineState,
    viewport: NullRect,
    scissor: NullRect,
    polygon_offset: (f32, f32),
    vertex_stream_data: [Vec<u8>; MAX_VERTEX_BUFFERS],
    stats: GraphicsStats,
    finalized: bool,
}

impl NullContext {
    pub fn new(params: &ContextParams) -> Result<Self> {
        let supported_formats = TextureFormat::ALL
            .iter()
            .filter(|format| !params.disabled_texture_formats.contains(format))
            .fold(0u64, |mask, format| mask | format.bit());

        dm_debug!(
            "dmgraphics::null",
            "Created null context {}x{} (threaded uploads: {})",
            params.width,
            params.height,
            params.threaded_async_uploads
        );

        Ok(Self {
            width: params.width,
            height: params.height,
            default_min_filter: params.default_texture_min_filter,
            default_mag_filter: params.default_texture_mag_filter,
            supported_formats,
            main_frame_buffer: FrameBuffer::new(params.width, params.height, 1, true),
            current_render_target: None,
            vertex_buffers: SlotMap::with_key(),
            index_buffers: SlotMap::with_key(),
            storage_buffers: SlotMap::with_key(),
            vertex_declarations: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            assets: Arc::new(Mutex::new(AssetHandleContainer::new())),
            async_uploads: Arc::new(Mutex::new(ParamSlots::new())),
            job_thread: JobThread::new(params.threaded_async_uploads)?,
            current_program: None,
            vertex_buffer_bindings: [None; MAX_VERTEX_BUFFERS],
            vertex_declaration_bindings: [None; MAX_VERTEX_BUFFERS],
            texture_units: [None; MAX_TEXTURE_UNITS],
            storage_buffer_units: [None; MAX_STORAGE_BUFFER_UNITS],
            pipeline_state: PipelineState::default(),
            viewport: NullRect { x: 0, y: 0, width: params.width, height: params.height },
            scissor: NullRect { x: 0, y: 0, width: params.width, height: params.height },
            polygon_offset: (0.0, 0.0),
            vertex_stream_data: Default::default(),
            stats: GraphicsStats::default(),
            finalized: false,
        })
    }

    // ===== Inspection =====

    /// Snapshot of the currently bound frame buffer
    pub fn current_frame_buffer(&self) -> FrameBuffer {
        if let Some(render_target) = self.current_render_target {
            let assets = lock(&self.assets);
            if let Some(rt) = assets.get(render_target).and_then(NullAsset::render_target) {
                return rt.frame_buffer.clone();
            }
        }
        self.main_frame_buffer.clone()
    }

    pub fn vertex_buffer_data(&self, buffer: VertexBufferHandle) -> Option<&[u8]> {
        self.vertex_buffers.get(buffer).map(|b| b.data.as_slice())
    }

    pub fn index_buffer_data(&self, buffer: IndexBufferHandle) -> Option<&[u8]> {
        self.index_buffers.get(buffer).map(|b| b.data.as_slice())
    }

    pub fn storage_buffer_data(&self, buffer: StorageBufferHandle) -> Option<&[u8]> {
        self.storage_buffers.get(buffer).map(|b| b.data.as_slice())
    }

    pub fn vertex_buffer_usage(&self, buffer: VertexBufferHandle) -> Option<BufferUsage> {
        self.vertex_buffers.get(buffer).map(|b| b.usage)
    }

    /// Copy of one mip level of a texture
    pub fn texture_mip_data(&self, texture: TextureHandle, mip: u8) -> Option<Vec<u8>> {
        let assets = lock(&self.assets);
        assets
            .get(texture)
            .and_then(NullAsset::texture)
            .and_then(|t| t.mips.get(mip as usize).cloned())
    }

    pub fn texture_sampler(&self, texture: TextureHandle) -> Option<SamplerParams> {
        lock(&self.assets).get(texture).and_then(NullAsset::texture).map(|t| t.sampler)
    }

    /// Vertex data the last draw gathered from one binding
    pub fn vertex_stream_data(&self, binding_index: usize) -> Option<&[u8]> {
        self.vertex_stream_data.get(binding_index).map(Vec::as_slice)
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    pub fn bound_texture(&self, unit: u32) -> Option<TextureHandle> {
        self.texture_units.get(unit as usize).copied().flatten()
    }

    pub fn bound_storage_buffer(&self, unit: u32) -> Option<StorageBufferHandle> {
        self.storage_buffer_units.get(unit as usize).copied().flatten()
    }

    pub fn viewport(&self) -> NullRect {
        self.viewport
    }

    pub fn scissor(&self) -> NullRect {
        self.scissor
    }

    pub fn polygon_offset(&self) -> (f32, f32) {
        self.polygon_offset
    }

    /// Block until every async upload has completed and run its callback
    pub fn wait_async_idle(&mut self) {
        self.job_thread.wait_idle();
    }

    // ===== Internals =====

    fn with_current_frame_buffer<R>(&mut self, f: impl FnOnce(&mut FrameBuffer) -> R) -> Result<R> {
        match self.current_render_target {
            Some(render_target) => {
                let mut assets = lock(&self.assets);
                let rt = assets
                    .get_mut(render_target)
                    .and_then(NullAsset::render_target_mut)
                    .ok_or_else(|| Error::InvalidResource("Bound render target was deleted".to_string()))?;
                Ok(f(&mut rt.frame_buffer))
            }
            None => Ok(f(&mut self.main_frame_buffer)),
        }
    }

    fn check_format(&self, format: TextureFormat) -> Result<()> {
        if self.is_texture_format_supported(format) {
            Ok(())
        } else {
            dm_warn!("dmgraphics::null", "Texture format {:?} is not supported", format);
            Err(Error::UnsupportedFormat(format!("{:?}", format)))
        }
    }

    fn resolve_sampler(&self, params: &TextureParams) -> SamplerParams {
        SamplerParams {
            min_filter: resolve_filter(params.min_filter, self.default_min_filter),
            mag_filter: resolve_filter(params.mag_filter, self.default_mag_filter),
            u_wrap: params.u_wrap,
            v_wrap: params.v_wrap,
            ..SamplerParams::default()
        }
    }

    fn build_layout(desc: &ShaderDesc) -> Result<ProgramLayout> {
        let order: &[ShaderStage] = if desc.is_compute() {
            if desc.stages.len() != 1 {
                return Err(Error::ShaderCompilation("A compute program cannot carry graphics stages".to_string()));
            }
            &[ShaderStage::Compute]
        } else {
            &[ShaderStage::Vertex, ShaderStage::Fragment]
        };

        let mut stages: Vec<(ShaderStageFlags, &ShaderMeta)> = Vec::with_capacity(order.len());
        for stage in order {
            let stage_desc = desc
                .stage(*stage)
                .ok_or_else(|| Error::ShaderCompilation(format!("Program has no {:?} stage", stage)))?;
            if stage_desc.sources.is_empty() {
                return Err(Error::ShaderCompilation(format!("{:?} stage has no source", stage)));
            }
            let meta = stage_desc
                .meta
                .as_ref()
                .ok_or_else(|| Error::ShaderCompilation(format!("{:?} stage has no reflection data", stage)))?;
            stages.push((stage.flag(), meta));
        }

        ProgramLayout::new(&stages, NULL_UNIFORM_BUFFER_ALIGNMENT)
    }

    fn unbind_texture(&mut self, texture: TextureHandle) {
        for unit in self.texture_units.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
    }

    /// Copy `count` vertices per bound stream, vertex `index(i)` for draw slot `i`
    fn gather_vertex_streams(&mut self, count: u32, index: impl Fn(u32) -> Result<u32>) -> Result<()> {
        for binding in 0..MAX_VERTEX_BUFFERS {
            self.vertex_stream_data[binding].clear();
            let (Some(buffer), Some(declaration)) =
                (self.vertex_buffer_bindings[binding], self.vertex_declaration_bindings[binding])
            else {
                continue;
            };
            let buffer = self
                .vertex_buffers
                .get(buffer)
                .ok_or_else(|| Error::InvalidResource(format!("Vertex buffer at binding {} was deleted", binding)))?;
            let declaration = self
                .vertex_declarations
                .get(declaration)
                .ok_or_else(|| Error::InvalidResource(format!("Vertex declaration at binding {} was deleted", binding)))?;
            if declaration.step_function == VertexStepFunction::Instance {
                continue;
            }

            let stride = declaration.stride as usize;
            let mut gathered = Vec::with_capacity(stride * count as usize);
            for i in 0..count {
                let start = index(i)? as usize * stride;
                let vertex = buffer.data.get(start..start + stride).ok_or_else(|| {
                    Error::InvalidResource(format!(
                        "Vertex {} out of range of buffer at binding {} ({} bytes)",
                        start / stride.max(1),
                        binding,
                        buffer.data.len()
                    ))
                })?;
                gathered.extend_from_slice(vertex);
            }
            self.vertex_stream_data[binding] = gathered;
        }
        Ok(())
    }
}

impl GraphicsContext for NullContext {
    // ===== Context =====

    fn adapter_family(&self) -> AdapterFamily {
        AdapterFamily::Null
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.job_thread.wait_idle();
        lock(&self.assets).drain().for_each(drop);
        self.programs.clear();
        self.finalized = true;
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
        self.main_frame_buffer.resize(width, height);
        Ok(())
    }

    fn is_context_feature_supported(&self, feature: ContextFeature) -> bool {
        !matches!(feature, ContextFeature::VSync)
    }

    fn is_texture_format_supported(&self, format: TextureFormat) -> bool {
        self.supported_formats & format.bit() != 0
    }

    fn max_texture_size(&self) -> u32 {
        NULL_MAX_TEXTURE_SIZE
    }

    fn stats(&self) -> GraphicsStats {
        self.stats
    }

    // ===== Frame =====

    fn begin_frame(&mut self) -> Result<()> {
        self.job_thread.update();
        Ok(())
    }

    fn flip(&mut self) -> Result<()> {
        self.stats.frames += 1;
        self.job_thread.update();
        Ok(())
    }

    // ===== Buffers =====

    fn new_vertex_buffer(&mut self, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<VertexBufferHandle> {
        Ok(self.vertex_buffers.insert(NullBuffer::new(size, data, usage)))
    }

    fn set_vertex_buffer_data(&mut self, buffer: VertexBufferHandle, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<()> {
        let slot = self
            .vertex_buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown vertex buffer".to_string()))?;
        *slot = NullBuffer::new(size, data, usage);
        Ok(())
    }

    fn set_vertex_buffer_sub_data(&mut self, buffer: VertexBufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.vertex_buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown vertex buffer".to_string()))?
            .write(offset, data)
    }

    fn delete_vertex_buffer(&mut self, buffer: VertexBufferHandle) {
        if self.vertex_buffers.remove(buffer).is_none() {
            dm_warn!("dmgraphics::null", "delete_vertex_buffer: unknown handle");
        }
        for binding in self.vertex_buffer_bindings.iter_mut() {
            if *binding == Some(buffer) {
                *binding = None;
            }
        }
    }

    fn new_index_buffer(&mut self, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<IndexBufferHandle> {
        Ok(self.index_buffers.insert(NullBuffer::new(size, data, usage)))
    }

    fn set_index_buffer_data(&mut self, buffer: IndexBufferHandle, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<()> {
        let slot = self
            .index_buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown index buffer".to_string()))?;
        *slot = NullBuffer::new(size, data, usage);
        Ok(())
    }

    fn set_index_buffer_sub_data(&mut self, buffer: IndexBufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.index_buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown index buffer".to_string()))?
            .write(offset, data)
    }

    fn delete_index_buffer(&mut self, buffer: IndexBufferHandle) {
        if self.index_buffers.remove(buffer).is_none() {
            dm_warn!("dmgraphics::null", "delete_index_buffer: unknown handle");
        }
    }

    fn new_storage_buffer(&mut self, size: usize, data: Option<&[u8]>) -> Result<StorageBufferHandle> {
        Ok(self.storage_buffers.insert(NullBuffer::new(size, data, BufferUsage::DynamicDraw)))
    }

    fn set_storage_buffer_data(&mut self, buffer: StorageBufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.storage_buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown storage buffer".to_string()))?
            .write(offset, data)
    }

    fn delete_storage_buffer(&mut self, buffer: StorageBufferHandle) {
        self.storage_buffers.remove(buffer);
        for unit in self.storage_buffer_units.iter_mut() {
            if *unit == Some(buffer) {
                *unit = None;
            }
        }
    }

    fn enable_storage_buffer(&mut self, unit: u32, buffer: StorageBufferHandle) {
        match self.storage_buffer_units.get_mut(unit as usize) {
            Some(slot) => *slot = Some(buffer),
            None => dm_warn!("dmgraphics::null", "Storage buffer unit {} out of range", unit),
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
            None => dm_warn!("dmgraphics::null", "Vertex buffer binding {} out of range", binding_index),
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
            None => dm_warn!("dmgraphics::null", "Vertex declaration binding {} out of range", binding_index),
        }
    }

    fn disable_vertex_declaration(&mut self, binding_index: u32) {
        if let Some(slot) = self.vertex_declaration_bindings.get_mut(binding_index as usize) {
            *slot = None;
        }
    }

    // ===== Programs =====

    fn new_program(&mut self, desc: &ShaderDesc) -> Result<ProgramHandle> {
        let layout = Self::build_layout(desc).map_err(|e| {
            dm_error!("dmgraphics::null", "Failed to create program: {}", e);
            e
        })?;
        Ok(self.programs.insert(NullProgram { layout }))
    }

    fn reload_program(&mut self, program: ProgramHandle, desc: &ShaderDesc) -> Result<()> {
        if !self.programs.contains_key(program) {
            return Err(Error::InvalidResource("Unknown program".to_string()));
        }
        let layout = Self::build_layout(desc).map_err(|e| {
            dm_warn!("dmgraphics::null", "Program reload failed, keeping previous program: {}", e);
            e
        })?;
        if let Some(slot) = self.programs.get_mut(program) {
            slot.layout = layout;
        }
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn enable_program(&mut self, program: ProgramHandle) {
        if self.programs.contains_key(program) {
            self.current_program = Some(program);
        } else {
            dm_warn!("dmgraphics::null", "enable_program: unknown handle");
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
        let mut texture = NullTexture::new(params);
        texture.sampler.min_filter = self.default_min_filter;
        texture.sampler.mag_filter = self.default_mag_filter;
        Ok(lock(&self.assets).insert(AssetType::Texture, NullAsset::Texture(texture)))
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.unbind_texture(texture);

        let pending = {
            let assets = lock(&self.assets);
            match assets.get(texture).and_then(NullAsset::texture) {
                Some(t) => t.data_pending != 0,
                None => {
                    dm_warn!("dmgraphics::null", "delete_texture: unknown handle");
                    return;
                }
            }
        };

        if !pending {
            lock(&self.assets).remove(texture);
            return;
        }

        // Queued behind the uploads so their completions still find the texture
        let assets = self.assets.clone();
        self.job_thread.push_job(
            || Ok(()),
            move |_| {
                lock(&assets).remove(texture);
            },
        );
    }

    fn set_texture(&mut self, texture: TextureHandle, params: &TextureParams) -> Result<()> {
        self.check_format(params.format)?;
        let sampler = self.resolve_sampler(params);
        let mut assets = lock(&self.assets);
        let target = assets
            .get_mut(texture)
            .and_then(NullAsset::texture_mut)
            .ok_or_else(|| Error::InvalidResource("Unknown texture".to_string()))?;
        upload_texture(target, params)?;
        target.sampler = SamplerParams { max_anisotropy: target.sampler.max_anisotropy, ..sampler };
        Ok(())
    }

    fn set_texture_async(&mut self, texture: TextureHandle, params: TextureParams, callback: Option<SetTextureAsyncCallback>) -> Result<()> {
        self.check_format(params.format)?;
        let mip_bit = mip_bits(params.mip_map, 1);

        {
            let mut assets = lock(&self.assets);
            let target = assets
                .get_mut(texture)
                .and_then(NullAsset::texture_mut)
                .ok_or_else(|| Error::InvalidResource("Unknown texture".to_string()))?;
            target.data_pending |= mip_bit;
        }

        let slot = lock(&self.async_uploads).acquire(AsyncUpload { params: Some(params), callback });

        let process_uploads = self.async_uploads.clone();
        let process_assets = self.assets.clone();
        let complete_uploads = self.async_uploads.clone();
        let complete_assets = self.assets.clone();

        self.job_thread.push_job(
            move || {
                let params = lock(&process_uploads)
                    .get_mut(slot)
                    .and_then(|upload| upload.params.take())
                    .ok_or_else(|| Error::InvalidResource(format!("Async upload slot {} is empty", slot)))?;
                let mut assets = lock(&process_assets);
                let target = assets
                    .get_mut(texture)
                    .and_then(NullAsset::texture_mut)
                    .ok_or_else(|| Error::InvalidResource("Texture deleted during upload".to_string()))?;
                upload_texture(target, &params)
            },
            move |result| {
                if let Some(target) = lock(&complete_assets).get_mut(texture).and_then(NullAsset::texture_mut) {
                    target.data_pending &= !mip_bit;
                }
                let upload = lock(&complete_uploads).release(slot);
                let status = match result {
                    Ok(()) => AsyncUploadStatus::Completed,
                    Err(e) => {
                        dm_warn!("dmgraphics::null", "Async texture upload failed: {}", e);
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
        let resolved = SamplerParams {
            min_filter: resolve_filter(sampler.min_filter, self.default_min_filter),
            mag_filter: resolve_filter(sampler.mag_filter, self.default_mag_filter),
            ..*sampler
        };
        let mut assets = lock(&self.assets);
        let target = assets
            .get_mut(texture)
            .and_then(NullAsset::texture_mut)
            .ok_or_else(|| Error::InvalidResource("Unknown texture".to_string()))?;
        target.sampler = resolved;
        Ok(())
    }

    fn texture_status_flags(&self, texture: TextureHandle) -> TextureStatusFlags {
        match lock(&self.assets).get(texture).and_then(NullAsset::texture) {
            Some(t) if t.data_pending != 0 => TextureStatusFlags::DATA_PENDING,
            _ => TextureStatusFlags::empty(),
        }
    }

    fn texture_info(&self, texture: TextureHandle) -> Option<TextureInfo> {
        lock(&self.assets).get(texture).and_then(NullAsset::texture).map(NullTexture::info)
    }

    fn enable_texture(&mut self, unit: u32, texture: TextureHandle) {
        if !self.is_asset_handle_valid(texture) {
            dm_warn!("dmgraphics::null", "enable_texture: invalid handle on unit {}", unit);
            return;
        }
        match self.texture_units.get_mut(unit as usize) {
            Some(slot) => *slot = Some(texture),
            None => dm_warn!("dmgraphics::null", "Texture unit {} out of range", unit),
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

        let mut assets = lock(&self.assets);
        let mut color_textures = Vec::with_capacity(params.color_attachments.len());
        for attachment in &params.color_attachments {
            let mut texture = NullTexture::new(&attachment.creation);
            texture.usage_hint |= TextureUsageFlags::COLOR;
            upload_texture(&mut texture, &TextureParams { data: None, sub_update: false, ..attachment.params.clone() })?;
            color_textures.push(assets.insert(AssetType::Texture, NullAsset::Texture(texture)));
        }

        let depth_stencil_texture = if params.depth_stencil {
            let creation = TextureCreationParams {
                width: params.width,
                height: params.height,
                original_width: params.width,
                original_height: params.height,
                usage_hint: TextureUsageFlags::empty(),
                ..Default::default()
            };
            let mut texture = NullTexture::new(&creation);
            upload_texture(
                &mut texture,
                &TextureParams { format: TextureFormat::Depth, width: params.width, height: params.height, ..Default::default() },
            )?;
            Some(assets.insert(AssetType::Texture, NullAsset::Texture(texture)))
        } else {
            None
        };

        let render_target = NullRenderTarget {
            frame_buffer: FrameBuffer::new(params.width, params.height, color_textures.len(), params.depth_stencil),
            color_textures,
            depth_stencil_texture,
        };
        Ok(assets.insert(AssetType::RenderTarget, NullAsset::RenderTarget(render_target)))
    }

    fn delete_render_target(&mut self, render_target: RenderTargetHandle) {
        let removed = lock(&self.assets).remove(render_target);
        let Some(NullAsset::RenderTarget(rt)) = removed else {
            dm_warn!("dmgraphics::null", "delete_render_target: unknown handle");
            return;
        };
        for texture in rt.color_textures.iter().chain(rt.depth_stencil_texture.iter()) {
            self.delete_texture(*texture);
        }
        if self.current_render_target == Some(render_target) {
            self.current_render_target = None;
        }
    }

    fn set_render_target(&mut self, render_target: Option<RenderTargetHandle>) -> Result<()> {
        if let Some(rt) = render_target {
            let valid = lock(&self.assets).get(rt).and_then(NullAsset::render_target).is_some();
            if !valid {
                return Err(Error::InvalidResource("Unknown render target".to_string()));
            }
        }
        self.current_render_target = render_target;
        Ok(())
    }

    fn render_target_texture(&self, render_target: RenderTargetHandle, buffer: BufferType) -> Option<TextureHandle> {
        let assets = lock(&self.assets);
        let rt = assets.get(render_target).and_then(NullAsset::render_target)?;
        match buffer.color_index() {
            Some(index) => rt.color_textures.get(index).copied(),
            None => rt.depth_stencil_texture,
        }
    }

    fn set_render_target_size(&mut self, render_target: RenderTargetHandle, width: u32, height: u32) -> Result<()> {
        let mut assets = lock(&self.assets);
        let textures: Vec<TextureHandle> = {
            let rt = assets
                .get_mut(render_target)
                .and_then(NullAsset::render_target_mut)
                .ok_or_else(|| Error::InvalidResource("Unknown render target".to_string()))?;
            rt.frame_buffer.resize(width, height);
            rt.color_textures.iter().chain(rt.depth_stencil_texture.iter()).copied().collect()
        };
        for handle in textures {
            let Some(texture) = assets.get_mut(handle).and_then(NullAsset::texture_mut) else {
                continue;
            };
            let Some(format) = texture.format else {
                continue;
            };
            let layer_count = texture.layer_count;
            upload_texture(texture, &TextureParams { format, width, height, layer_count, ..Default::default() })?;
        }
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
        self.viewport = NullRect { x, y, width, height };
    }

    fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.scissor = NullRect { x, y, width, height };
    }

    // ===== Drawing =====

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u32) -> Result<()> {
        self.with_current_frame_buffer(|frame_buffer| frame_buffer.clear(flags, color, depth, stencil))
    }

    fn draw(&mut self, _primitive: PrimitiveType, first: u32, count: u32, _instances: u32) -> Result<()> {
        self.gather_vertex_streams(count, |i| Ok(first + i))?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn draw_elements(
        &mut self,
        _primitive: PrimitiveType,
        first: u32,
        count: u32,
        index_format: IndexBufferFormat,
        index_buffer: IndexBufferHandle,
        _instances: u32,
    ) -> Result<()> {
        let indices = self
            .index_buffers
            .get(index_buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown index buffer".to_string()))?
            .data
            .clone();
        let index_size = index_format.size() as usize;
        let read_index = |i: u32| -> Result<u32> {
            let start = first as usize + i as usize * index_size;
            let bytes = indices
                .get(start..start + index_size)
                .ok_or_else(|| Error::InvalidResource(format!("Index {} out of range of index buffer", i)))?;
            Ok(match index_format {
                IndexBufferFormat::U16 => u16::from_ne_bytes([bytes[0], bytes[1]]) as u32,
                IndexBufferFormat::U32 => u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            })
        };
        self.gather_vertex_streams(count, read_index)?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn dispatch_compute(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()> {
        let compute = self
            .current_program
            .and_then(|p| self.programs.get(p))
            .is_some_and(|p| p.layout.stage_flags().contains(ShaderStageFlags::COMPUTE));
        if !compute {
            return Err(Error::InvalidResource("dispatch_compute without an enabled compute program".to_string()));
        }
        dm_debug!(
            "dmgraphics::null",
            "Dispatch {}x{}x{}",
            group_count_x,
            group_count_y,
            group_count_z
        );
        self.stats.dispatches += 1;
        Ok(())
    }
}

impl Drop for NullContext {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
#[path = "null_context_tests.rs"]
mod tests;
