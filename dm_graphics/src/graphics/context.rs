//! The graphics context contract every adapter implements
//!
//! `GraphicsContext` is the full verb set of the graphics API. One
//! implementation exists per adapter; the `Graphics` facade forwards to
//! whichever one was created by the installed adapter. All calls are
//! synchronous from the caller's point of view: they complete the
//! recording of work, not its GPU execution.

use super::buffer::{BufferUsage, IndexBufferFormat};
use super::handles::{IndexBufferHandle, ProgramHandle, StorageBufferHandle, VertexBufferHandle, VertexDeclarationHandle};
use super::pipeline_state::{BlendFactor, ColorMask, CompareFunc, FaceType, FaceWinding, PipelineState, PrimitiveType, State, StencilOp};
use super::render_target::{BufferType, ClearFlags, RenderTargetCreationParams};
use super::texture::{
    SamplerParams, SetTextureAsyncCallback, TextureCreationParams, TextureFilter, TextureFormat, TextureInfo,
    TextureParams, TextureStatusFlags,
};
use super::vertex::VertexDeclaration;
use crate::adapter::AdapterFamily;
use crate::error::Result;
use crate::shader::{ProgramLayout, ShaderDesc, UniformLocation};
use crate::utils::{AssetHandle, RenderTargetHandle, TextureHandle};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::fmt;
use std::sync::Arc;

pub const MAX_TEXTURE_UNITS: usize = 32;
pub const MAX_STORAGE_BUFFER_UNITS: usize = 8;
pub const MAX_VERTEX_BUFFERS: usize = 3;

/// A native window an adapter can create a surface for
pub trait NativeWindow: HasWindowHandle + HasDisplayHandle + Send + Sync {}

impl<T: HasWindowHandle + HasDisplayHandle + Send + Sync> NativeWindow for T {}

/// Optional context capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextFeature {
    MultiTargetRendering,
    TextureArray,
    Texture3D,
    ComputeShader,
    StorageBuffer,
    InstancingDivisor,
    VSync,
}

/// Context creation parameters
#[derive(Clone)]
pub struct ContextParams {
    pub width: u32,
    pub height: u32,
    /// Surface target; required by adapters that present
    pub window: Option<Arc<dyn NativeWindow>>,
    pub default_texture_min_filter: TextureFilter,
    pub default_texture_mag_filter: TextureFilter,
    /// Log file/line and assert on native API failures
    pub verify_graphics_calls: bool,
    pub use_validation_layers: bool,
    pub swap_interval: u32,
    /// Run async texture uploads on a worker thread instead of inline
    pub threaded_async_uploads: bool,
    /// Formats reported unsupported regardless of hardware support
    pub disabled_texture_formats: Vec<TextureFormat>,
    pub app_name: String,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            width: 960,
            height: 640,
            window: None,
            default_texture_min_filter: TextureFilter::LinearMipmapNearest,
            default_texture_mag_filter: TextureFilter::Linear,
            verify_graphics_calls: cfg!(debug_assertions),
            use_validation_layers: false,
            swap_interval: 1,
            threaded_async_uploads: true,
            disabled_texture_formats: Vec::new(),
            app_name: "dmgraphics".to_string(),
        }
    }
}

impl fmt::Debug for ContextParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextParams")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("window", &self.window.is_some())
            .field("verify_graphics_calls", &self.verify_graphics_calls)
            .field("use_validation_layers", &self.use_validation_layers)
            .field("swap_interval", &self.swap_interval)
            .field("threaded_async_uploads", &self.threaded_async_uploads)
            .field("disabled_texture_formats", &self.disabled_texture_formats)
            .finish()
    }
}

/// Per-context counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphicsStats {
    pub frames: u64,
    pub draw_calls: u64,
    pub dispatches: u64,
    pub pipelines_created: u64,
    pub resources_destroyed: u64,
}

pub trait GraphicsContext: Send {
    // ===== Context =====

    fn adapter_family(&self) -> AdapterFamily;

    /// Release everything before the process exits
    fn finalize(&mut self) {}

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn resize_window(&mut self, width: u32, height: u32) -> Result<()>;

    fn is_context_feature_supported(&self, feature: ContextFeature) -> bool;

    fn is_texture_format_supported(&self, format: TextureFormat) -> bool;

    fn max_texture_size(&self) -> u32;

    fn stats(&self) -> GraphicsStats;

    // ===== Frame =====

    fn begin_frame(&mut self) -> Result<()>;

    /// Submit, present and advance to the next frame-in-flight slot
    fn flip(&mut self) -> Result<()>;

    // ===== Buffers =====

    fn new_vertex_buffer(&mut self, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<VertexBufferHandle>;

    fn set_vertex_buffer_data(&mut self, buffer: VertexBufferHandle, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<()>;

    fn set_vertex_buffer_sub_data(&mut self, buffer: VertexBufferHandle, offset: usize, data: &[u8]) -> Result<()>;

    fn delete_vertex_buffer(&mut self, buffer: VertexBufferHandle);

    fn new_index_buffer(&mut self, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<IndexBufferHandle>;

    fn set_index_buffer_data(&mut self, buffer: IndexBufferHandle, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<()>;

    fn set_index_buffer_sub_data(&mut self, buffer: IndexBufferHandle, offset: usize, data: &[u8]) -> Result<()>;

    fn delete_index_buffer(&mut self, buffer: IndexBufferHandle);

    fn new_storage_buffer(&mut self, size: usize, data: Option<&[u8]>) -> Result<StorageBufferHandle>;

    fn set_storage_buffer_data(&mut self, buffer: StorageBufferHandle, offset: usize, data: &[u8]) -> Result<()>;

    fn delete_storage_buffer(&mut self, buffer: StorageBufferHandle);

    fn enable_storage_buffer(&mut self, unit: u32, buffer: StorageBufferHandle);

    fn disable_storage_buffer(&mut self, unit: u32);

    fn new_vertex_declaration(&mut self, declaration: VertexDeclaration) -> VertexDeclarationHandle;

    fn delete_vertex_declaration(&mut self, declaration: VertexDeclarationHandle);

    fn enable_vertex_buffer(&mut self, buffer: VertexBufferHandle, binding_index: u32);

    fn disable_vertex_buffer(&mut self, binding_index: u32);

    fn enable_vertex_declaration(&mut self, declaration: VertexDeclarationHandle, binding_index: u32);

    fn disable_vertex_declaration(&mut self, binding_index: u32);

    // ===== Programs =====

    /// Create a program; rejection is reported as `Error::ShaderCompilation`
    fn new_program(&mut self, desc: &ShaderDesc) -> Result<ProgramHandle>;

    /// Rebuild a program in place; on failure the previous program stays usable
    fn reload_program(&mut self, program: ProgramHandle, desc: &ShaderDesc) -> Result<()>;

    fn delete_program(&mut self, program: ProgramHandle);

    fn enable_program(&mut self, program: ProgramHandle);

    fn disable_program(&mut self);

    fn program_layout(&self, program: ProgramHandle) -> Option<&ProgramLayout>;

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.program_layout(program)?.uniform_location(name)
    }

    /// Write raw constant bytes into the currently enabled program
    fn set_constant(&mut self, location: UniformLocation, data: &[u8]) -> Result<()>;

    fn set_constant_v4(&mut self, location: UniformLocation, data: &[[f32; 4]]) -> Result<()> {
        self.set_constant(location, bytemuck::cast_slice(data))
    }

    fn set_constant_m4(&mut self, location: UniformLocation, data: &[[f32; 16]]) -> Result<()> {
        self.set_constant(location, bytemuck::cast_slice(data))
    }

    // ===== Textures =====

    fn new_texture(&mut self, params: &TextureCreationParams) -> Result<TextureHandle>;

    /// Delete a texture; deletion waits behind any upload still in flight
    fn delete_texture(&mut self, texture: TextureHandle);

    fn set_texture(&mut self, texture: TextureHandle, params: &TextureParams) -> Result<()>;

    fn set_texture_async(&mut self, texture: TextureHandle, params: TextureParams, callback: Option<SetTextureAsyncCallback>) -> Result<()>;

    fn set_texture_params(&mut self, texture: TextureHandle, sampler: &SamplerParams) -> Result<()>;

    fn texture_status_flags(&self, texture: TextureHandle) -> TextureStatusFlags;

    fn texture_info(&self, texture: TextureHandle) -> Option<TextureInfo>;

    fn enable_texture(&mut self, unit: u32, texture: TextureHandle);

    fn disable_texture(&mut self, unit: u32);

    fn is_asset_handle_valid(&self, asset: AssetHandle) -> bool;

    // ===== Render targets =====

    fn new_render_target(&mut self, params: &RenderTargetCreationParams) -> Result<RenderTargetHandle>;

    fn delete_render_target(&mut self, render_target: RenderTargetHandle);

    /// Bind a render target; `None` binds the window's main target
    fn set_render_target(&mut self, render_target: Option<RenderTargetHandle>) -> Result<()>;

    fn render_target_texture(&self, render_target: RenderTargetHandle, buffer: BufferType) -> Option<TextureHandle>;

    fn set_render_target_size(&mut self, render_target: RenderTargetHandle, width: u32, height: u32) -> Result<()>;

    // ===== Render state =====

    fn pipeline_state(&self) -> PipelineState;

    fn pipeline_state_mut(&mut self) -> &mut PipelineState;

    fn enable_state(&mut self, state: State) {
        self.pipeline_state_mut().set_state(state, true);
    }

    fn disable_state(&mut self, state: State) {
        self.pipeline_state_mut().set_state(state, false);
    }

    fn set_blend_func(&mut self, source: BlendFactor, destination: BlendFactor) {
        let ps = self.pipeline_state_mut();
        ps.blend_src_factor = source;
        ps.blend_dst_factor = destination;
    }

    fn set_color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool) {
        let mut mask = ColorMask::empty();
        mask.set(ColorMask::R, red);
        mask.set(ColorMask::G, green);
        mask.set(ColorMask::B, blue);
        mask.set(ColorMask::A, alpha);
        self.pipeline_state_mut().write_color_mask = mask;
    }

    fn set_depth_mask(&mut self, enabled: bool) {
        self.pipeline_state_mut().write_depth = enabled;
    }

    fn set_depth_func(&mut self, func: CompareFunc) {
        self.pipeline_state_mut().depth_test_func = func;
    }

    fn set_stencil_mask(&mut self, mask: u8) {
        self.pipeline_state_mut().stencil_write_mask = mask;
    }

    fn set_stencil_func(&mut self, face: FaceType, func: CompareFunc, reference: u8, mask: u8) {
        self.pipeline_state_mut().set_stencil_func(face, func, reference, mask);
    }

    fn set_stencil_op(&mut self, face: FaceType, stencil_fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.pipeline_state_mut().set_stencil_op(face, stencil_fail, depth_fail, pass);
    }

    fn set_cull_face(&mut self, face: FaceType) {
        self.pipeline_state_mut().cull_face_type = face;
    }

    fn set_face_winding(&mut self, winding: FaceWinding) {
        self.pipeline_state_mut().face_winding = winding;
    }

    fn set_polygon_offset(&mut self, factor: f32, units: f32);

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32);

    // ===== Drawing =====

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u32) -> Result<()>;

    /// Non-indexed draw of `count` vertices starting at vertex `first`
    fn draw(&mut self, primitive: PrimitiveType, first: u32, count: u32, instances: u32) -> Result<()>;

    /// Indexed draw; `first` is a byte offset into `index_buffer`
    fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        first: u32,
        count: u32,
        index_format: IndexBufferFormat,
        index_buffer: IndexBufferHandle,
        instances: u32,
    ) -> Result<()>;

    fn dispatch_compute(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()>;
}
