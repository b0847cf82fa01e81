//! Graphics facade
//!
//! `Graphics` owns the context created by the installed adapter and is
//! the one object the rest of the engine talks to. Every verb is a plain
//! forward; the few backend-independent policies live here.

use super::buffer::{BufferUsage, IndexBufferFormat};
use super::context::{ContextFeature, GraphicsContext, GraphicsStats};
use super::handles::{IndexBufferHandle, ProgramHandle, StorageBufferHandle, VertexBufferHandle, VertexDeclarationHandle};
use super::pipeline_state::{BlendFactor, CompareFunc, FaceType, FaceWinding, PipelineState, PrimitiveType, State, StencilOp};
use super::render_target::{BufferType, ClearFlags, RenderTargetCreationParams};
use super::texture::{
    SamplerParams, SetTextureAsyncCallback, TextureCreationParams, TextureFormat, TextureInfo, TextureParams,
    TextureStatusFlags,
};
use super::vertex::VertexDeclaration;
use crate::adapter::AdapterFamily;
use crate::error::Result;
use crate::shader::{ProgramLayout, ShaderDesc, UniformLocation};
use crate::utils::{AssetHandle, RenderTargetHandle, TextureHandle};

pub struct Graphics {
    context: Box<dyn GraphicsContext>,
}

impl Graphics {
    pub fn new(context: Box<dyn GraphicsContext>) -> Self {
        Self { context }
    }

    /// Direct access to the adapter's context
    pub fn context(&self) -> &dyn GraphicsContext {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> &mut dyn GraphicsContext {
        self.context.as_mut()
    }

    // ===== Context =====

    pub fn adapter_family(&self) -> AdapterFamily {
        self.context.adapter_family()
    }

    pub fn finalize(&mut self) {
        self.context.finalize()
    }

    pub fn width(&self) -> u32 {
        self.context.width()
    }

    pub fn height(&self) -> u32 {
        self.context.height()
    }

    pub fn resize_window(&mut self, width: u32, height: u32) -> Result<()> {
        self.context.resize_window(width, height)
    }

    /// Feature query; headless families never report vsync
    pub fn is_context_feature_supported(&self, feature: ContextFeature) -> bool {
        if feature == ContextFeature::VSync
            && matches!(self.context.adapter_family(), AdapterFamily::Null | AdapterFamily::None)
        {
            return false;
        }
        self.context.is_context_feature_supported(feature)
    }

    pub fn is_texture_format_supported(&self, format: TextureFormat) -> bool {
        self.context.is_texture_format_supported(format)
    }

    pub fn max_texture_size(&self) -> u32 {
        self.context.max_texture_size()
    }

    pub fn stats(&self) -> GraphicsStats {
        self.context.stats()
    }

    // ===== Frame =====

    pub fn begin_frame(&mut self) -> Result<()> {
        self.context.begin_frame()
    }

    pub fn flip(&mut self) -> Result<()> {
        self.context.flip()
    }

    // ===== Buffers =====

    pub fn new_vertex_buffer(&mut self, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<VertexBufferHandle> {
        self.context.new_vertex_buffer(size, data, usage)
    }

    pub fn set_vertex_buffer_data(&mut self, buffer: VertexBufferHandle, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<()> {
        self.context.set_vertex_buffer_data(buffer, size, data, usage)
    }

    pub fn set_vertex_buffer_sub_data(&mut self, buffer: VertexBufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.context.set_vertex_buffer_sub_data(buffer, offset, data)
    }

    pub fn delete_vertex_buffer(&mut self, buffer: VertexBufferHandle) {
        self.context.delete_vertex_buffer(buffer)
    }

    pub fn new_index_buffer(&mut self, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<IndexBufferHandle> {
        self.context.new_index_buffer(size, data, usage)
    }

    pub fn set_index_buffer_data(&mut self, buffer: IndexBufferHandle, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> Result<()> {
        self.context.set_index_buffer_data(buffer, size, data, usage)
    }

    pub fn set_index_buffer_sub_data(&mut self, buffer: IndexBufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.context.set_index_buffer_sub_data(buffer, offset, data)
    }

    pub fn delete_index_buffer(&mut self, buffer: IndexBufferHandle) {
        self.context.delete_index_buffer(buffer)
    }

    pub fn new_storage_buffer(&mut self, size: usize, data: Option<&[u8]>) -> Result<StorageBufferHandle> {
        self.context.new_storage_buffer(size, data)
    }

    pub fn set_storage_buffer_data(&mut self, buffer: StorageBufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.context.set_storage_buffer_data(buffer, offset, data)
    }

    pub fn delete_storage_buffer(&mut self, buffer: StorageBufferHandle) {
        self.context.delete_storage_buffer(buffer)
    }

    pub fn enable_storage_buffer(&mut self, unit: u32, buffer: StorageBufferHandle) {
        self.context.enable_storage_buffer(unit, buffer)
    }

    pub fn disable_storage_buffer(&mut self, unit: u32) {
        self.context.disable_storage_buffer(unit)
    }

    pub fn new_vertex_declaration(&mut self, declaration: VertexDeclaration) -> VertexDeclarationHandle {
        self.context.new_vertex_declaration(declaration)
    }

    pub fn delete_vertex_declaration(&mut self, declaration: VertexDeclarationHandle) {
        self.context.delete_vertex_declaration(declaration)
    }

    pub fn enable_vertex_buffer(&mut self, buffer: VertexBufferHandle, binding_index: u32) {
        self.context.enable_vertex_buffer(buffer, binding_index)
    }

    pub fn disable_vertex_buffer(&mut self, binding_index: u32) {
        self.context.disable_vertex_buffer(binding_index)
    }

    pub fn enable_vertex_declaration(&mut self, declaration: VertexDeclarationHandle, binding_index: u32) {
        self.context.enable_vertex_declaration(declaration, binding_index)
    }

    pub fn disable_vertex_declaration(&mut self, binding_index: u32) {
        self.context.disable_vertex_declaration(binding_index)
    }

    // ===== Programs =====

    pub fn new_program(&mut self, desc: &ShaderDesc) -> Result<ProgramHandle> {
        self.context.new_program(desc)
    }

    pub fn reload_program(&mut self, program: ProgramHandle, desc: &ShaderDesc) -> Result<()> {
        self.context.reload_program(program, desc)
    }

    pub fn delete_program(&mut self, program: ProgramHandle) {
        self.context.delete_program(program)
    }

    pub fn enable_program(&mut self, program: ProgramHandle) {
        self.context.enable_program(program)
    }

    pub fn disable_program(&mut self) {
        self.context.disable_program()
    }

    pub fn program_layout(&self, program: ProgramHandle) -> Option<&ProgramLayout> {
        self.context.program_layout(program)
    }

    pub fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.context.uniform_location(program, name)
    }

    pub fn set_constant(&mut self, location: UniformLocation, data: &[u8]) -> Result<()> {
        self.context.set_constant(location, data)
    }

    pub fn set_constant_v4(&mut self, location: UniformLocation, data: &[[f32; 4]]) -> Result<()> {
        self.context.set_constant_v4(location, data)
    }

    pub fn set_constant_m4(&mut self, location: UniformLocation, data: &[[f32; 16]]) -> Result<()> {
        self.context.set_constant_m4(location, data)
    }

    // ===== Textures =====

    pub fn new_texture(&mut self, params: &TextureCreationParams) -> Result<TextureHandle> {
        self.context.new_texture(params)
    }

    pub fn delete_texture(&mut self, texture: TextureHandle) {
        self.context.delete_texture(texture)
    }

    pub fn set_texture(&mut self, texture: TextureHandle, params: &TextureParams) -> Result<()> {
        self.context.set_texture(texture, params)
    }

    pub fn set_texture_async(&mut self, texture: TextureHandle, params: TextureParams, callback: Option<SetTextureAsyncCallback>) -> Result<()> {
        self.context.set_texture_async(texture, params, callback)
    }

    pub fn set_texture_params(&mut self, texture: TextureHandle, sampler: &SamplerParams) -> Result<()> {
        self.context.set_texture_params(texture, sampler)
    }

    pub fn texture_status_flags(&self, texture: TextureHandle) -> TextureStatusFlags {
        self.context.texture_status_flags(texture)
    }

    pub fn texture_info(&self, texture: TextureHandle) -> Option<TextureInfo> {
        self.context.texture_info(texture)
    }

    pub fn enable_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.context.enable_texture(unit, texture)
    }

    pub fn disable_texture(&mut self, unit: u32) {
        self.context.disable_texture(unit)
    }

    pub fn is_asset_handle_valid(&self, asset: AssetHandle) -> bool {
        self.context.is_asset_handle_valid(asset)
    }

    // ===== Render targets =====

    pub fn new_render_target(&mut self, params: &RenderTargetCreationParams) -> Result<RenderTargetHandle> {
        self.context.new_render_target(params)
    }

    pub fn delete_render_target(&mut self, render_target: RenderTargetHandle) {
        self.context.delete_render_target(render_target)
    }

    pub fn set_render_target(&mut self, render_target: Option<RenderTargetHandle>) -> Result<()> {
        self.context.set_render_target(render_target)
    }

    pub fn render_target_texture(&self, render_target: RenderTargetHandle, buffer: BufferType) -> Option<TextureHandle> {
        self.context.render_target_texture(render_target, buffer)
    }

    pub fn set_render_target_size(&mut self, render_target: RenderTargetHandle, width: u32, height: u32) -> Result<()> {
        self.context.set_render_target_size(render_target, width, height)
    }

    // ===== Render state =====

    pub fn pipeline_state(&self) -> PipelineState {
        self.context.pipeline_state()
    }

    pub fn enable_state(&mut self, state: State) {
        self.context.enable_state(state)
    }

    pub fn disable_state(&mut self, state: State) {
        self.context.disable_state(state)
    }

    pub fn set_blend_func(&mut self, source: BlendFactor, destination: BlendFactor) {
        self.context.set_blend_func(source, destination)
    }

    pub fn set_color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool) {
        self.context.set_color_mask(red, green, blue, alpha)
    }

    pub fn set_depth_mask(&mut self, enabled: bool) {
        self.context.set_depth_mask(enabled)
    }

    pub fn set_depth_func(&mut self, func: CompareFunc) {
        self.context.set_depth_func(func)
    }

    pub fn set_stencil_mask(&mut self, mask: u8) {
        self.context.set_stencil_mask(mask)
    }

    pub fn set_stencil_func(&mut self, face: FaceType, func: CompareFunc, reference: u8, mask: u8) {
        self.context.set_stencil_func(face, func, reference, mask)
    }

    pub fn set_stencil_op(&mut self, face: FaceType, stencil_fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.context.set_stencil_op(face, stencil_fail, depth_fail, pass)
    }

    pub fn set_cull_face(&mut self, face: FaceType) {
        self.context.set_cull_face(face)
    }

    pub fn set_face_winding(&mut self, winding: FaceWinding) {
        self.context.set_face_winding(winding)
    }

    pub fn set_polygon_offset(&mut self, factor: f32, units: f32) {
        self.context.set_polygon_offset(factor, units)
    }

    pub fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.context.set_viewport(x, y, width, height)
    }

    pub fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.context.set_scissor(x, y, width, height)
    }

    // ===== Drawing =====

    pub fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u32) -> Result<()> {
        self.context.clear(flags, color, depth, stencil)
    }

    pub fn draw(&mut self, primitive: PrimitiveType, first: u32, count: u32, instances: u32) -> Result<()> {
        self.context.draw(primitive, first, count, instances)
    }

    pub fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        first: u32,
        count: u32,
        index_format: IndexBufferFormat,
        index_buffer: IndexBufferHandle,
        instances: u32,
    ) -> Result<()> {
        self.context.draw_elements(primitive, first, count, index_format, index_buffer, instances)
    }

    pub fn dispatch_compute(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()> {
        self.context.dispatch_compute(group_count_x, group_count_y, group_count_z)
    }
}

impl Drop for Graphics {
    fn drop(&mut self) {
        self.context.finalize();
    }
}

#[cfg(test)]
#[path = "graphics_tests.rs"]
mod tests;
