use super::*;
use crate::graphics::{VertexStreamDeclaration, VertexType};
use crate::shader::{
    ResourceType, ShaderLanguage, ShaderResourceBinding, ShaderResourceMember, ShaderResourceTypeInfo, ShaderSource,
    ShaderStageDesc, ShaderType,
};

fn params() -> ContextParams {
    ContextParams {
        width: 64,
        height: 32,
        threaded_async_uploads: false,
        ..Default::default()
    }
}

fn context() -> NullContext {
    NullContext::new(&params()).unwrap()
}

fn rgba_4x4(data: Vec<u8>) -> TextureParams {
    TextureParams {
        format: TextureFormat::Rgba,
        width: 4,
        height: 4,
        data: Some(data),
        ..Default::default()
    }
}

fn new_texture_4x4(ctx: &mut NullContext) -> TextureHandle {
    ctx.new_texture(&TextureCreationParams {
        width: 4,
        height: 4,
        original_width: 4,
        original_height: 4,
        ..Default::default()
    })
    .unwrap()
}

type StatusLog = Arc<Mutex<Vec<(TextureHandle, AsyncUploadStatus)>>>;

fn recording_callback(log: &StatusLog) -> Option<SetTextureAsyncCallback> {
    let log = log.clone();
    Some(Box::new(move |texture, status| {
        log.lock().unwrap().push((texture, status));
    }))
}

fn stage(stage: ShaderStage, meta: Option<ShaderMeta>) -> ShaderStageDesc {
    ShaderStageDesc {
        stage,
        sources: vec![ShaderSource { language: ShaderLanguage::Spirv, source: vec![0x03, 0x02, 0x23, 0x07] }],
        meta,
    }
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

fn sprite_program_desc() -> ShaderDesc {
    let vertex = ShaderMeta {
        uniform_buffers: vec![ShaderResourceBinding::uniform_buffer("uniforms", 0, 0, 0, 80)],
        inputs: vec![ShaderResourceBinding::input("position", ShaderType::Vec2, 0)],
        type_infos: vec![uniforms_type()],
        ..Default::default()
    };
    let fragment = ShaderMeta {
        uniform_buffers: vec![ShaderResourceBinding::uniform_buffer("uniforms", 0, 0, 0, 80)],
        textures: vec![ShaderResourceBinding::texture("texture_sampler", ShaderType::Sampler2D, 1, 0)],
        type_infos: vec![uniforms_type()],
        ..Default::default()
    };
    ShaderDesc {
        stages: vec![
            stage(ShaderStage::Vertex, Some(vertex)),
            stage(ShaderStage::Fragment, Some(fragment)),
        ],
    }
}

fn compute_program_desc() -> ShaderDesc {
    let meta = ShaderMeta {
        storage_buffers: vec![ShaderResourceBinding::storage_buffer("particles", 0, 0, 0, 64)],
        type_infos: vec![ShaderResourceTypeInfo::new("particles_t", Vec::new())],
        ..Default::default()
    };
    ShaderDesc { stages: vec![stage(ShaderStage::Compute, Some(meta))] }
}

// ============================================================================
// Context queries
// ============================================================================

#[test]
fn test_context_reports_window_size() {
    let mut ctx = context();
    assert_eq!(ctx.adapter_family(), AdapterFamily::Null);
    assert_eq!((ctx.width(), ctx.height()), (64, 32));

    ctx.resize_window(128, 16).unwrap();
    assert_eq!((ctx.width(), ctx.height()), (128, 16));
    assert_eq!(ctx.current_frame_buffer().color[0].len(), 128 * 16);
}

#[test]
fn test_vsync_is_not_supported() {
    let ctx = context();
    assert!(!ctx.is_context_feature_supported(ContextFeature::VSync));
    assert!(ctx.is_context_feature_supported(ContextFeature::ComputeShader));
    assert!(ctx.is_context_feature_supported(ContextFeature::StorageBuffer));
}

#[test]
fn test_disabled_format_is_unsupported() {
    let mut ctx = NullContext::new(&ContextParams {
        disabled_texture_formats: vec![TextureFormat::RgbaAstc4x4],
        ..params()
    })
    .unwrap();

    assert!(!ctx.is_texture_format_supported(TextureFormat::RgbaAstc4x4));
    assert!(ctx.is_texture_format_supported(TextureFormat::Rgba));
    assert!(ctx.is_texture_format_supported(TextureFormat::RgbaEtc2));

    let texture = new_texture_4x4(&mut ctx);
    let result = ctx.set_texture(
        texture,
        &TextureParams { format: TextureFormat::RgbaAstc4x4, width: 4, height: 4, ..Default::default() },
    );
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    assert_eq!(ctx.texture_info(texture).unwrap().format, None);
}

#[test]
fn test_oversized_texture_is_rejected() {
    let mut ctx = context();
    let result = ctx.new_texture(&TextureCreationParams {
        width: NULL_MAX_TEXTURE_SIZE + 1,
        height: 4,
        ..Default::default()
    });
    assert!(result.is_err());
}

#[test]
fn test_flip_counts_frames() {
    let mut ctx = context();
    for _ in 0..3 {
        ctx.begin_frame().unwrap();
        ctx.flip().unwrap();
    }
    assert_eq!(ctx.stats().frames, 3);
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn test_vertex_buffer_data_and_sub_data() {
    let mut ctx = context();
    let buffer = ctx.new_vertex_buffer(8, Some(&[1, 2, 3, 4]), BufferUsage::DynamicDraw).unwrap();
    assert_eq!(ctx.vertex_buffer_data(buffer).unwrap(), &[1, 2, 3, 4, 0, 0, 0, 0]);
    assert_eq!(ctx.vertex_buffer_usage(buffer), Some(BufferUsage::DynamicDraw));

    ctx.set_vertex_buffer_sub_data(buffer, 6, &[9, 9]).unwrap();
    assert_eq!(ctx.vertex_buffer_data(buffer).unwrap(), &[1, 2, 3, 4, 0, 0, 9, 9]);

    assert!(ctx.set_vertex_buffer_sub_data(buffer, 7, &[1, 1]).is_err());

    ctx.set_vertex_buffer_data(buffer, 2, None, BufferUsage::StaticDraw).unwrap();
    assert_eq!(ctx.vertex_buffer_data(buffer).unwrap(), &[0, 0]);

    ctx.delete_vertex_buffer(buffer);
    assert!(ctx.vertex_buffer_data(buffer).is_none());
}

#[test]
fn test_storage_buffer_binding_follows_deletion() {
    let mut ctx = context();
    let buffer = ctx.new_storage_buffer(16, None).unwrap();
    ctx.set_storage_buffer_data(buffer, 4, &[7; 4]).unwrap();
    assert_eq!(&ctx.storage_buffer_data(buffer).unwrap()[4..8], &[7; 4]);

    ctx.enable_storage_buffer(2, buffer);
    assert_eq!(ctx.bound_storage_buffer(2), Some(buffer));

    ctx.delete_storage_buffer(buffer);
    assert_eq!(ctx.bound_storage_buffer(2), None);
}

// ============================================================================
// Textures
// ============================================================================

#[test]
fn test_set_texture_stores_mip_data() {
    let mut ctx = context();
    let texture = new_texture_4x4(&mut ctx);
    let data: Vec<u8> = (0..64).collect();

    ctx.set_texture(texture, &rgba_4x4(data.clone())).unwrap();

    assert_eq!(ctx.texture_mip_data(texture, 0).unwrap(), data);
    let info = ctx.texture_info(texture).unwrap();
    assert_eq!(info.format, Some(TextureFormat::Rgba));
    assert_eq!((info.width, info.height), (4, 4));
}

#[test]
fn test_sub_update_writes_region_only() {
    let mut ctx = context();
    let texture = new_texture_4x4(&mut ctx);
    ctx.set_texture(texture, &rgba_4x4(vec![0; 64])).unwrap();

    ctx.set_texture(
        texture,
        &TextureParams {
            format: TextureFormat::Rgba,
            width: 2,
            height: 2,
            x: 1,
            y: 1,
            sub_update: true,
            data: Some(vec![0xFF; 16]),
            ..Default::default()
        },
    )
    .unwrap();

    let mip = ctx.texture_mip_data(texture, 0).unwrap();
    // Rows are 16 bytes; the region covers columns 1..3 of rows 1..3
    assert_eq!(&mip[20..28], &[0xFF; 8]);
    assert_eq!(&mip[36..44], &[0xFF; 8]);
    assert_eq!(&mip[16..20], &[0; 4]);
    assert_eq!(&mip[28..32], &[0; 4]);
    assert_eq!(mip.iter().filter(|b| **b == 0xFF).count(), 16);
}

#[test]
fn test_sub_update_out_of_bounds_fails() {
    let mut ctx = context();
    let texture = new_texture_4x4(&mut ctx);
    ctx.set_texture(texture, &rgba_4x4(vec![0; 64])).unwrap();

    let result = ctx.set_texture(
        texture,
        &TextureParams {
            format: TextureFormat::Rgba,
            width: 2,
            height: 2,
            x: 3,
            y: 0,
            sub_update: true,
            data: Some(vec![0xFF; 16]),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_default_filters_are_resolved() {
    let mut ctx = context();
    let texture = new_texture_4x4(&mut ctx);
    ctx.set_texture(texture, &rgba_4x4(vec![0; 64])).unwrap();

    let sampler = ctx.texture_sampler(texture).unwrap();
    assert_eq!(sampler.min_filter, TextureFilter::LinearMipmapNearest);
    assert_eq!(sampler.mag_filter, TextureFilter::Linear);

    ctx.set_texture_params(
        texture,
        &SamplerParams { min_filter: TextureFilter::Nearest, max_anisotropy: 4.0, ..Default::default() },
    )
    .unwrap();
    let sampler = ctx.texture_sampler(texture).unwrap();
    assert_eq!(sampler.min_filter, TextureFilter::Nearest);
    assert_eq!(sampler.mag_filter, TextureFilter::Linear);
    assert_eq!(sampler.max_anisotropy, 4.0);
}

#[test]
fn test_deleted_texture_handle_is_invalid() {
    let mut ctx = context();
    let texture = new_texture_4x4(&mut ctx);
    ctx.enable_texture(3, texture);
    assert_eq!(ctx.bound_texture(3), Some(texture));

    ctx.delete_texture(texture);
    assert!(!ctx.is_asset_handle_valid(texture));
    assert_eq!(ctx.bound_texture(3), None);
    assert!(ctx.texture_info(texture).is_none());
}

// ============================================================================
// Async uploads
// ============================================================================

#[test]
fn test_async_upload_pending_until_update() {
    let mut ctx = context();
    let texture = new_texture_4x4(&mut ctx);
    let log: StatusLog = Arc::default();
    let data: Vec<u8> = (0..64).rev().collect();

    ctx.set_texture_async(texture, rgba_4x4(data.clone()), recording_callback(&log)).unwrap();
    assert_eq!(ctx.texture_status_flags(texture), TextureStatusFlags::DATA_PENDING);
    assert!(log.lock().unwrap().is_empty());

    ctx.begin_frame().unwrap();

    assert_eq!(ctx.texture_status_flags(texture), TextureStatusFlags::empty());
    assert_eq!(*log.lock().unwrap(), vec![(texture, AsyncUploadStatus::Completed)]);
    assert_eq!(ctx.texture_mip_data(texture, 0).unwrap(), data);
}

#[test]
fn test_async_upload_failure_reported_to_callback() {
    let mut ctx = context();
    let texture = new_texture_4x4(&mut ctx);
    let log: StatusLog = Arc::default();

    // Texture has a single mip level
    let params = TextureParams { mip_map: 3, ..rgba_4x4(vec![0; 4]) };
    ctx.set_texture_async(texture, params, recording_callback(&log)).unwrap();
    ctx.begin_frame().unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert!(matches!(log[0].1, AsyncUploadStatus::Failed(_)));
    assert_eq!(ctx.texture_status_flags(texture), TextureStatusFlags::empty());
}

#[test]
fn test_async_upload_unsupported_format_fails_immediately() {
    let mut ctx = NullContext::new(&ContextParams {
        disabled_texture_formats: vec![TextureFormat::RgbaBc7],
        ..params()
    })
    .unwrap();
    let texture = new_texture_4x4(&mut ctx);

    let params = TextureParams { format: TextureFormat::RgbaBc7, ..rgba_4x4(vec![0; 16]) };
    assert!(ctx.set_texture_async(texture, params, None).is_err());
    assert_eq!(ctx.texture_status_flags(texture), TextureStatusFlags::empty());
}

#[test]
fn test_delete_while_pending_waits_for_upload() {
    let mut ctx = context();
    let texture = new_texture_4x4(&mut ctx);
    let log: StatusLog = Arc::default();

    ctx.set_texture_async(texture, rgba_4x4(vec![1; 64]), recording_callback(&log)).unwrap();
    ctx.delete_texture(texture);

    // Deletion is queued behind the upload
    assert!(ctx.is_asset_handle_valid(texture));

    ctx.begin_frame().unwrap();

    assert!(!ctx.is_asset_handle_valid(texture));
    assert_eq!(*log.lock().unwrap(), vec![(texture, AsyncUploadStatus::Completed)]);
}

#[test]
fn test_threaded_async_upload_completes_on_caller() {
    let mut ctx = NullContext::new(&ContextParams { threaded_async_uploads: true, ..params() }).unwrap();
    let texture = new_texture_4x4(&mut ctx);
    let log: StatusLog = Arc::default();

    for _ in 0..4 {
        ctx.set_texture_async(texture, rgba_4x4(vec![5; 64]), recording_callback(&log)).unwrap();
    }
    // Completions only ever run inside update on this thread
    assert!(log.lock().unwrap().is_empty());

    ctx.wait_async_idle();

    assert_eq!(log.lock().unwrap().len(), 4);
    assert_eq!(ctx.texture_status_flags(texture), TextureStatusFlags::empty());
    assert_eq!(ctx.texture_mip_data(texture, 0).unwrap(), vec![5; 64]);
}

// ============================================================================
// Render targets
// ============================================================================

#[test]
fn test_render_target_attachments() {
    let mut ctx = context();
    let rt = ctx
        .new_render_target(&RenderTargetCreationParams::simple(TextureFormat::Rgba, 16, 8, true))
        .unwrap();

    assert!(ctx.is_asset_handle_valid(rt));
    assert_eq!(rt.asset_type(), AssetType::RenderTarget);

    let color = ctx.render_target_texture(rt, BufferType::Color0).unwrap();
    let info = ctx.texture_info(color).unwrap();
    assert_eq!(info.format, Some(TextureFormat::Rgba));
    assert_eq!((info.width, info.height), (16, 8));
    assert!(info.usage_hint.contains(TextureUsageFlags::COLOR));

    let depth = ctx.render_target_texture(rt, BufferType::Depth).unwrap();
    assert_eq!(ctx.texture_info(depth).unwrap().format, Some(TextureFormat::Depth));

    assert!(ctx.render_target_texture(rt, BufferType::Color1).is_none());
}

#[test]
fn test_render_target_handle_is_not_a_texture() {
    let mut ctx = context();
    let rt = ctx
        .new_render_target(&RenderTargetCreationParams::simple(TextureFormat::Rgba, 4, 4, false))
        .unwrap();
    assert!(ctx.texture_info(rt).is_none());
    assert!(!ctx.is_asset_handle_valid(AssetHandle::invalid(AssetType::Texture)));
}

#[test]
fn test_too_many_color_attachments_rejected() {
    let mut ctx = context();
    let mut params = RenderTargetCreationParams::simple(TextureFormat::Rgba, 4, 4, false);
    params.color_attachments = vec![params.color_attachments[0].clone(); MAX_BUFFER_COLOR_ATTACHMENTS + 1];
    assert!(ctx.new_render_target(&params).is_err());
}

#[test]
fn test_delete_render_target_invalidates_attachments() {
    let mut ctx = context();
    let rt = ctx
        .new_render_target(&RenderTargetCreationParams::simple(TextureFormat::Rgba, 4, 4, true))
        .unwrap();
    let color = ctx.render_target_texture(rt, BufferType::Color0).unwrap();
    ctx.set_render_target(Some(rt)).unwrap();

    ctx.delete_render_target(rt);

    assert!(!ctx.is_asset_handle_valid(rt));
    assert!(!ctx.is_asset_handle_valid(color));
    assert!(ctx.set_render_target(Some(rt)).is_err());
    // Falls back to the main frame buffer
    assert_eq!(ctx.current_frame_buffer().width, 64);
}

#[test]
fn test_set_render_target_size_resizes_attachments() {
    let mut ctx = context();
    let rt = ctx
        .new_render_target(&RenderTargetCreationParams::simple(TextureFormat::Rgba, 4, 4, true))
        .unwrap();
    ctx.set_render_target_size(rt, 32, 16).unwrap();

    let color = ctx.render_target_texture(rt, BufferType::Color0).unwrap();
    let info = ctx.texture_info(color).unwrap();
    assert_eq!((info.width, info.height), (32, 16));
    assert_eq!(ctx.texture_mip_data(color, 0).unwrap().len(), 32 * 16 * 4);

    ctx.set_render_target(Some(rt)).unwrap();
    assert_eq!(ctx.current_frame_buffer().color[0].len(), 32 * 16);
}

#[test]
fn test_clear_fills_bound_frame_buffer() {
    let mut ctx = context();
    ctx.clear(ClearFlags::COLOR | ClearFlags::DEPTH, [1.0, 0.0, 0.0, 1.0], 0.5, 0).unwrap();

    let main = ctx.current_frame_buffer();
    assert!(main.color[0].iter().all(|c| *c == 0xFF0000FF));
    assert!(main.depth.iter().all(|d| *d == 0.5));
    assert!(main.stencil.iter().all(|s| *s == 0));

    let rt = ctx
        .new_render_target(&RenderTargetCreationParams::simple(TextureFormat::Rgba, 4, 4, true))
        .unwrap();
    ctx.set_render_target(Some(rt)).unwrap();
    ctx.clear(ClearFlags::COLOR0 | ClearFlags::STENCIL, [0.0, 1.0, 0.0, 1.0], 1.0, 7).unwrap();

    let target = ctx.current_frame_buffer();
    assert!(target.color[0].iter().all(|c| *c == 0x00FF00FF));
    assert!(target.stencil.iter().all(|s| *s == 7));

    ctx.set_render_target(None).unwrap();
    assert!(ctx.current_frame_buffer().color[0].iter().all(|c| *c == 0xFF0000FF));
}

// ============================================================================
// Programs
// ============================================================================

#[test]
fn test_program_layout_and_constants() {
    let mut ctx = context();
    let program = ctx.new_program(&sprite_program_desc()).unwrap();

    let layout = ctx.program_layout(program).unwrap();
    assert_eq!(layout.stage_flags(), ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT);
    assert_eq!(layout.info().texture_count, 1);

    let tint = ctx.uniform_location(program, "tint").unwrap();
    assert_eq!(tint, UniformLocation { set: 0, binding: 0, member: Some(1) });

    ctx.enable_program(program);
    ctx.set_constant_v4(tint, &[[1.0, 2.0, 3.0, 4.0]]).unwrap();

    let data = ctx.program_layout(program).unwrap().uniform_data();
    let expected: &[u8] = bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0]);
    assert_eq!(&data[64..80], expected);
}

#[test]
fn test_set_constant_requires_enabled_program() {
    let mut ctx = context();
    let program = ctx.new_program(&sprite_program_desc()).unwrap();
    let tint = ctx.uniform_location(program, "tint").unwrap();
    assert!(ctx.set_constant_v4(tint, &[[0.0; 4]]).is_err());
}

#[test]
fn test_program_without_reflection_rejected() {
    let mut ctx = context();
    let mut desc = sprite_program_desc();
    desc.stages[1].meta = None;

    let result = ctx.new_program(&desc);
    assert!(matches!(result, Err(Error::ShaderCompilation(_))));
}

#[test]
fn test_program_without_fragment_stage_rejected() {
    let mut ctx = context();
    let mut desc = sprite_program_desc();
    desc.stages.truncate(1);
    assert!(matches!(ctx.new_program(&desc), Err(Error::ShaderCompilation(_))));
}

#[test]
fn test_failed_reload_keeps_previous_program() {
    let mut ctx = context();
    let program = ctx.new_program(&sprite_program_desc()).unwrap();

    let mut broken = sprite_program_desc();
    broken.stages[0].sources.clear();
    assert!(ctx.reload_program(program, &broken).is_err());

    assert!(ctx.uniform_location(program, "view_proj").is_some());
}

#[test]
fn test_delete_enabled_program_disables_it() {
    let mut ctx = context();
    let program = ctx.new_program(&sprite_program_desc()).unwrap();
    ctx.enable_program(program);
    ctx.delete_program(program);
    assert_eq!(ctx.current_program(), None);
    assert!(ctx.program_layout(program).is_none());
}

#[test]
fn test_dispatch_requires_compute_program() {
    let mut ctx = context();
    assert!(ctx.dispatch_compute(1, 1, 1).is_err());

    let graphics = ctx.new_program(&sprite_program_desc()).unwrap();
    ctx.enable_program(graphics);
    assert!(ctx.dispatch_compute(1, 1, 1).is_err());

    let compute = ctx.new_program(&compute_program_desc()).unwrap();
    ctx.enable_program(compute);
    ctx.dispatch_compute(8, 4, 1).unwrap();
    assert_eq!(ctx.stats().dispatches, 1);
}

// ============================================================================
// Drawing
// ============================================================================

fn bind_triangle(ctx: &mut NullContext) {
    let positions = [0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0];
    let buffer = ctx
        .new_vertex_buffer(24, Some(bytemuck::cast_slice(&positions)), BufferUsage::StaticDraw)
        .unwrap();
    let declaration = ctx.new_vertex_declaration(VertexDeclaration::new(
        &VertexStreamDeclaration::new().add_stream("position", 2, VertexType::Float, false),
    ));
    ctx.enable_vertex_buffer(buffer, 0);
    ctx.enable_vertex_declaration(declaration, 0);
}

#[test]
fn test_draw_elements_gathers_indexed_vertices() {
    let mut ctx = context();
    bind_triangle(&mut ctx);
    let indices = [2u16, 0];
    let index_buffer = ctx
        .new_index_buffer(4, Some(bytemuck::cast_slice(&indices)), BufferUsage::StaticDraw)
        .unwrap();

    ctx.draw_elements(PrimitiveType::Triangles, 0, 2, IndexBufferFormat::U16, index_buffer, 1).unwrap();

    let expected: &[u8] = bytemuck::cast_slice(&[0.0f32, 1.0, 0.0, 0.0]);
    assert_eq!(ctx.vertex_stream_data(0).unwrap(), expected);
    assert_eq!(ctx.stats().draw_calls, 1);

    // `first` is a byte offset: skip the first u16 index
    ctx.draw_elements(PrimitiveType::Triangles, 2, 1, IndexBufferFormat::U16, index_buffer, 1).unwrap();
    let expected: &[u8] = bytemuck::cast_slice(&[0.0f32, 0.0]);
    assert_eq!(ctx.vertex_stream_data(0).unwrap(), expected);
}

#[test]
fn test_draw_elements_out_of_range_index_fails() {
    let mut ctx = context();
    bind_triangle(&mut ctx);
    let indices = [5u16];
    let index_buffer = ctx
        .new_index_buffer(2, Some(bytemuck::cast_slice(&indices)), BufferUsage::StaticDraw)
        .unwrap();

    let result = ctx.draw_elements(PrimitiveType::Triangles, 0, 1, IndexBufferFormat::U16, index_buffer, 1);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert_eq!(ctx.stats().draw_calls, 0);
}

#[test]
fn test_draw_gathers_vertex_range() {
    let mut ctx = context();
    bind_triangle(&mut ctx);

    ctx.draw(PrimitiveType::Triangles, 1, 2, 1).unwrap();

    let expected: &[u8] = bytemuck::cast_slice(&[1.0f32, 0.0, 0.0, 1.0]);
    assert_eq!(ctx.vertex_stream_data(0).unwrap(), expected);
}

// ============================================================================
// Render state
// ============================================================================

#[test]
fn test_state_setters_update_pipeline_state() {
    let mut ctx = context();
    ctx.enable_state(crate::graphics::State::Blend);
    ctx.set_blend_func(crate::graphics::BlendFactor::SrcAlpha, crate::graphics::BlendFactor::OneMinusSrcAlpha);
    ctx.set_depth_mask(false);

    let state = ctx.pipeline_state();
    assert!(state.blend_enabled);
    assert_eq!(state.blend_src_factor, crate::graphics::BlendFactor::SrcAlpha);
    assert!(!state.write_depth);

    ctx.set_viewport(1, 2, 30, 40);
    ctx.set_polygon_offset(1.5, 2.0);
    assert_eq!(ctx.viewport(), NullRect { x: 1, y: 2, width: 30, height: 40 });
    assert_eq!(ctx.polygon_offset(), (1.5, 2.0));
}
