//! Unit tests for Vulkan format conversion functions
//!
//! Pure mappings, no device required.

use super::*;

// ============================================================================
// TEXTURE FORMAT CONVERSION TESTS
// ============================================================================

#[test]
fn test_texture_format_uncompressed() {
    assert_eq!(texture_format_to_vk(TextureFormat::Luminance, vk::Format::D32_SFLOAT_S8_UINT), vk::Format::R8_UNORM);
    assert_eq!(texture_format_to_vk(TextureFormat::Rgba, vk::Format::D32_SFLOAT_S8_UINT), vk::Format::R8G8B8A8_UNORM);
    assert_eq!(texture_format_to_vk(TextureFormat::Bgra8U, vk::Format::D32_SFLOAT_S8_UINT), vk::Format::B8G8R8A8_UNORM);
    assert_eq!(texture_format_to_vk(TextureFormat::Rgba32f, vk::Format::D32_SFLOAT_S8_UINT), vk::Format::R32G32B32A32_SFLOAT);
}

#[test]
fn test_texture_format_compressed() {
    assert_eq!(texture_format_to_vk(TextureFormat::RgbaAstc4x4, vk::Format::D32_SFLOAT_S8_UINT), vk::Format::ASTC_4X4_UNORM_BLOCK);
    assert_eq!(texture_format_to_vk(TextureFormat::RgbaBc7, vk::Format::D32_SFLOAT_S8_UINT), vk::Format::BC7_UNORM_BLOCK);
    assert_eq!(texture_format_to_vk(TextureFormat::RgbEtc1, vk::Format::D32_SFLOAT_S8_UINT), vk::Format::ETC2_R8G8B8_UNORM_BLOCK);
}

#[test]
fn test_texture_format_depth_uses_device_format() {
    assert_eq!(texture_format_to_vk(TextureFormat::Depth, vk::Format::D24_UNORM_S8_UINT), vk::Format::D24_UNORM_S8_UINT);
    assert_eq!(texture_format_to_vk(TextureFormat::Stencil, vk::Format::D24_UNORM_S8_UINT), vk::Format::S8_UINT);
}

#[test]
fn test_every_texture_format_maps() {
    for format in TextureFormat::ALL {
        assert_ne!(texture_format_to_vk(format, vk::Format::D32_SFLOAT), vk::Format::UNDEFINED, "{:?}", format);
    }
}

#[test]
fn test_format_aspect() {
    assert_eq!(format_aspect(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
    assert_eq!(format_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
    assert_eq!(
        format_aspect(vk::Format::D24_UNORM_S8_UINT),
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
    assert_eq!(format_aspect(vk::Format::S8_UINT), vk::ImageAspectFlags::STENCIL);
}

#[test]
fn test_texture_type_cube_is_cube_compatible() {
    let (image_type, view_type, flags) = texture_type_to_vk(TextureType::TextureCube);
    assert_eq!(image_type, vk::ImageType::TYPE_2D);
    assert_eq!(view_type, vk::ImageViewType::CUBE);
    assert!(flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));

    let (image_type, _, _) = texture_type_to_vk(TextureType::Texture3D);
    assert_eq!(image_type, vk::ImageType::TYPE_3D);
}

// ============================================================================
// SAMPLER CONVERSION TESTS
// ============================================================================

#[test]
fn test_min_filter_mipmap_modes() {
    assert_eq!(
        min_filter_to_vk(TextureFilter::NearestMipmapLinear),
        (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR)
    );
    assert_eq!(
        min_filter_to_vk(TextureFilter::LinearMipmapLinear),
        (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR)
    );
    assert_eq!(min_filter_to_vk(TextureFilter::Nearest).0, vk::Filter::NEAREST);
}

#[test]
fn test_mag_filter() {
    assert_eq!(mag_filter_to_vk(TextureFilter::Nearest), vk::Filter::NEAREST);
    assert_eq!(mag_filter_to_vk(TextureFilter::Linear), vk::Filter::LINEAR);
}

#[test]
fn test_filter_uses_mipmaps() {
    assert!(!filter_uses_mipmaps(TextureFilter::Linear));
    assert!(filter_uses_mipmaps(TextureFilter::LinearMipmapNearest));
}

#[test]
fn test_wrap_modes() {
    assert_eq!(wrap_to_vk(TextureWrap::Repeat), vk::SamplerAddressMode::REPEAT);
    assert_eq!(wrap_to_vk(TextureWrap::ClampToEdge), vk::SamplerAddressMode::CLAMP_TO_EDGE);
    assert_eq!(wrap_to_vk(TextureWrap::MirroredRepeat), vk::SamplerAddressMode::MIRRORED_REPEAT);
}

#[test]
fn test_sample_count_falls_back_to_one() {
    assert_eq!(sample_count_to_vk(4), vk::SampleCountFlags::TYPE_4);
    assert_eq!(sample_count_to_vk(0), vk::SampleCountFlags::TYPE_1);
    assert_eq!(sample_count_to_vk(3), vk::SampleCountFlags::TYPE_1);
}

// ============================================================================
// PIPELINE STATE CONVERSION TESTS
// ============================================================================

#[test]
fn test_compare_funcs() {
    assert_eq!(compare_func_to_vk(CompareFunc::LessEqual), vk::CompareOp::LESS_OR_EQUAL);
    assert_eq!(compare_func_to_vk(CompareFunc::NotEqual), vk::CompareOp::NOT_EQUAL);
}

#[test]
fn test_blend_factors() {
    assert_eq!(blend_factor_to_vk(BlendFactor::OneMinusSrcAlpha), vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    assert_eq!(blend_factor_to_vk(BlendFactor::SrcAlphaSaturate), vk::BlendFactor::SRC_ALPHA_SATURATE);
}

#[test]
fn test_stencil_ops() {
    assert_eq!(stencil_op_to_vk(StencilOp::IncrSat), vk::StencilOp::INCREMENT_AND_CLAMP);
    assert_eq!(stencil_op_to_vk(StencilOp::DecrWrap), vk::StencilOp::DECREMENT_AND_WRAP);
}

#[test]
fn test_cull_mode_disabled_is_none() {
    assert_eq!(cull_mode_to_vk(false, FaceType::Back), vk::CullModeFlags::NONE);
    assert_eq!(cull_mode_to_vk(true, FaceType::Back), vk::CullModeFlags::BACK);
    assert_eq!(cull_mode_to_vk(true, FaceType::FrontAndBack), vk::CullModeFlags::FRONT_AND_BACK);
}

#[test]
fn test_color_mask() {
    assert_eq!(color_mask_to_vk(ColorMask::all()), vk::ColorComponentFlags::RGBA);
    assert_eq!(color_mask_to_vk(ColorMask::R | ColorMask::A), vk::ColorComponentFlags::R | vk::ColorComponentFlags::A);
    assert_eq!(color_mask_to_vk(ColorMask::empty()), vk::ColorComponentFlags::empty());
}

#[test]
fn test_primitive_topology() {
    assert_eq!(primitive_to_vk(PrimitiveType::Triangles), vk::PrimitiveTopology::TRIANGLE_LIST);
    assert_eq!(primitive_to_vk(PrimitiveType::TriangleStrip), vk::PrimitiveTopology::TRIANGLE_STRIP);
}

// ============================================================================
// VERTEX FORMAT CONVERSION TESTS
// ============================================================================

#[test]
fn test_vertex_format_float() {
    assert_eq!(vertex_format_to_vk(VertexType::Float, 3, false), Some(vk::Format::R32G32B32_SFLOAT));
    assert_eq!(vertex_format_to_vk(VertexType::Float, 4, true), Some(vk::Format::R32G32B32A32_SFLOAT));
}

#[test]
fn test_vertex_format_normalized_bytes() {
    assert_eq!(vertex_format_to_vk(VertexType::UnsignedByte, 4, true), Some(vk::Format::R8G8B8A8_UNORM));
    assert_eq!(vertex_format_to_vk(VertexType::UnsignedByte, 4, false), Some(vk::Format::R8G8B8A8_UINT));
    assert_eq!(vertex_format_to_vk(VertexType::Short, 2, true), Some(vk::Format::R16G16_SNORM));
}

#[test]
fn test_vertex_format_invalid_size() {
    assert_eq!(vertex_format_to_vk(VertexType::Float, 0, false), None);
    assert_eq!(vertex_format_to_vk(VertexType::Int, 5, false), None);
}

#[test]
fn test_index_types() {
    assert_eq!(index_type_to_vk(IndexBufferFormat::U16), vk::IndexType::UINT16);
    assert_eq!(index_type_to_vk(IndexBufferFormat::U32), vk::IndexType::UINT32);
}
