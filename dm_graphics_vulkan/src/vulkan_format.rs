/// Conversions from dmgraphics enums to Vulkan enums

use ash::vk;
use dm_graphics::dmgraphics::render::{
    BlendFactor, ColorMask, CompareFunc, FaceType, FaceWinding, IndexBufferFormat, PrimitiveType, StencilOp,
    TextureFilter, TextureFormat, TextureType, TextureWrap, VertexType,
};

// ============================================================================
// Textures
// ============================================================================

/// Native format of a texture format
///
/// `Depth` resolves to the device's depth/stencil attachment format.
pub fn texture_format_to_vk(format: TextureFormat, depth_stencil_format: vk::Format) -> vk::Format {
    match format {
        TextureFormat::Luminance => vk::Format::R8_UNORM,
        TextureFormat::LuminanceAlpha => vk::Format::R8G8_UNORM,
        TextureFormat::Rgb => vk::Format::R8G8B8_UNORM,
        TextureFormat::Rgba => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgb16Bpp => vk::Format::R5G6B5_UNORM_PACK16,
        TextureFormat::Rgba16Bpp => vk::Format::R4G4B4A4_UNORM_PACK16,
        TextureFormat::Depth => depth_stencil_format,
        TextureFormat::Stencil => vk::Format::S8_UINT,
        TextureFormat::RgbEtc1 => vk::Format::ETC2_R8G8B8_UNORM_BLOCK,
        TextureFormat::RgbaEtc2 => vk::Format::ETC2_R8G8B8A8_UNORM_BLOCK,
        TextureFormat::RgbaAstc4x4 => vk::Format::ASTC_4X4_UNORM_BLOCK,
        TextureFormat::RgbBc1 => vk::Format::BC1_RGB_UNORM_BLOCK,
        TextureFormat::RgbaBc3 => vk::Format::BC3_UNORM_BLOCK,
        TextureFormat::RgbaBc7 => vk::Format::BC7_UNORM_BLOCK,
        TextureFormat::Rgb16f => vk::Format::R16G16B16_SFLOAT,
        TextureFormat::Rgb32f => vk::Format::R32G32B32_SFLOAT,
        TextureFormat::Rgba16f => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rgba32f => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::R16f => vk::Format::R16_SFLOAT,
        TextureFormat::Rg16f => vk::Format::R16G16_SFLOAT,
        TextureFormat::R32f => vk::Format::R32_SFLOAT,
        TextureFormat::Rg32f => vk::Format::R32G32_SFLOAT,
        TextureFormat::Rgba32Ui => vk::Format::R32G32B32A32_UINT,
        TextureFormat::Bgra8U => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::R32Ui => vk::Format::R32_UINT,
    }
}

pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::X8_D24_UNORM_PACK32
    )
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::S8_UINT | vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT
    )
}

pub fn format_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    let mut aspect = vk::ImageAspectFlags::empty();
    if is_depth_format(format) {
        aspect |= vk::ImageAspectFlags::DEPTH;
    }
    if has_stencil(format) {
        aspect |= vk::ImageAspectFlags::STENCIL;
    }
    if aspect.is_empty() {
        vk::ImageAspectFlags::COLOR
    } else {
        aspect
    }
}

/// (image type, view type, create flags) of a texture type
pub fn texture_type_to_vk(texture_type: TextureType) -> (vk::ImageType, vk::ImageViewType, vk::ImageCreateFlags) {
    match texture_type {
        TextureType::Texture2D | TextureType::Image2D => {
            (vk::ImageType::TYPE_2D, vk::ImageViewType::TYPE_2D, vk::ImageCreateFlags::empty())
        }
        TextureType::Texture2DArray => {
            (vk::ImageType::TYPE_2D, vk::ImageViewType::TYPE_2D_ARRAY, vk::ImageCreateFlags::empty())
        }
        TextureType::TextureCube => {
            (vk::ImageType::TYPE_2D, vk::ImageViewType::CUBE, vk::ImageCreateFlags::CUBE_COMPATIBLE)
        }
        TextureType::Texture3D => {
            (vk::ImageType::TYPE_3D, vk::ImageViewType::TYPE_3D, vk::ImageCreateFlags::empty())
        }
    }
}

/// Mag filter of a resolved (non-default) filter
pub fn mag_filter_to_vk(filter: TextureFilter) -> vk::Filter {
    match filter {
        TextureFilter::Nearest | TextureFilter::NearestMipmapNearest | TextureFilter::NearestMipmapLinear => {
            vk::Filter::NEAREST
        }
        _ => vk::Filter::LINEAR,
    }
}

/// Min filter and mipmap mode of a resolved (non-default) filter
pub fn min_filter_to_vk(filter: TextureFilter) -> (vk::Filter, vk::SamplerMipmapMode) {
    match filter {
        TextureFilter::Nearest | TextureFilter::NearestMipmapNearest => {
            (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST)
        }
        TextureFilter::NearestMipmapLinear => (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR),
        TextureFilter::LinearMipmapLinear => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
        TextureFilter::Default | TextureFilter::Linear | TextureFilter::LinearMipmapNearest => {
            (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST)
        }
    }
}

/// Whether a min filter samples between mip levels at all
pub fn filter_uses_mipmaps(filter: TextureFilter) -> bool {
    !matches!(filter, TextureFilter::Nearest | TextureFilter::Linear | TextureFilter::Default)
}

pub fn wrap_to_vk(wrap: TextureWrap) -> vk::SamplerAddressMode {
    match wrap {
        TextureWrap::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        TextureWrap::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        TextureWrap::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        TextureWrap::Repeat => vk::SamplerAddressMode::REPEAT,
    }
}

pub fn sample_count_to_vk(samples: u32) -> vk::SampleCountFlags {
    match samples {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

// ============================================================================
// Pipeline state
// ============================================================================

pub fn compare_func_to_vk(func: CompareFunc) -> vk::CompareOp {
    match func {
        CompareFunc::Never => vk::CompareOp::NEVER,
        CompareFunc::Less => vk::CompareOp::LESS,
        CompareFunc::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunc::Greater => vk::CompareOp::GREATER,
        CompareFunc::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunc::Equal => vk::CompareOp::EQUAL,
        CompareFunc::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunc::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn blend_factor_to_vk(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
        BlendFactor::ConstantColor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => vk::BlendFactor::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA,
    }
}

pub fn stencil_op_to_vk(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrSat => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrSat => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn primitive_to_vk(primitive: PrimitiveType) -> vk::PrimitiveTopology {
    match primitive {
        PrimitiveType::Points => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveType::Lines => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveType::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub fn cull_mode_to_vk(enabled: bool, face: FaceType) -> vk::CullModeFlags {
    if !enabled {
        return vk::CullModeFlags::NONE;
    }
    match face {
        FaceType::Front => vk::CullModeFlags::FRONT,
        FaceType::Back => vk::CullModeFlags::BACK,
        FaceType::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

pub fn front_face_to_vk(winding: FaceWinding) -> vk::FrontFace {
    match winding {
        FaceWinding::Ccw => vk::FrontFace::COUNTER_CLOCKWISE,
        FaceWinding::Cw => vk::FrontFace::CLOCKWISE,
    }
}

pub fn color_mask_to_vk(mask: ColorMask) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorMask::R) {
        flags |= vk::ColorComponentFlags::R;
    }
    if mask.contains(ColorMask::G) {
        flags |= vk::ColorComponentFlags::G;
    }
    if mask.contains(ColorMask::B) {
        flags |= vk::ColorComponentFlags::B;
    }
    if mask.contains(ColorMask::A) {
        flags |= vk::ColorComponentFlags::A;
    }
    flags
}

// ============================================================================
// Vertex and index data
// ============================================================================

/// Attribute format of a vertex stream, `None` for unsupported combinations
pub fn vertex_format_to_vk(ty: VertexType, size: u32, normalize: bool) -> Option<vk::Format> {
    use vk::Format as F;
    let format = match (ty, size, normalize) {
        (VertexType::Float, 1, _) => F::R32_SFLOAT,
        (VertexType::Float, 2, _) => F::R32G32_SFLOAT,
        (VertexType::Float, 3, _) => F::R32G32B32_SFLOAT,
        (VertexType::Float, 4, _) => F::R32G32B32A32_SFLOAT,

        (VertexType::Byte, 1, false) => F::R8_SINT,
        (VertexType::Byte, 2, false) => F::R8G8_SINT,
        (VertexType::Byte, 3, false) => F::R8G8B8_SINT,
        (VertexType::Byte, 4, false) => F::R8G8B8A8_SINT,
        (VertexType::Byte, 1, true) => F::R8_SNORM,
        (VertexType::Byte, 2, true) => F::R8G8_SNORM,
        (VertexType::Byte, 3, true) => F::R8G8B8_SNORM,
        (VertexType::Byte, 4, true) => F::R8G8B8A8_SNORM,

        (VertexType::UnsignedByte, 1, false) => F::R8_UINT,
        (VertexType::UnsignedByte, 2, false) => F::R8G8_UINT,
        (VertexType::UnsignedByte, 3, false) => F::R8G8B8_UINT,
        (VertexType::UnsignedByte, 4, false) => F::R8G8B8A8_UINT,
        (VertexType::UnsignedByte, 1, true) => F::R8_UNORM,
        (VertexType::UnsignedByte, 2, true) => F::R8G8_UNORM,
        (VertexType::UnsignedByte, 3, true) => F::R8G8B8_UNORM,
        (VertexType::UnsignedByte, 4, true) => F::R8G8B8A8_UNORM,

        (VertexType::Short, 1, false) => F::R16_SINT,
        (VertexType::Short, 2, false) => F::R16G16_SINT,
        (VertexType::Short, 3, false) => F::R16G16B16_SINT,
        (VertexType::Short, 4, false) => F::R16G16B16A16_SINT,
        (VertexType::Short, 1, true) => F::R16_SNORM,
        (VertexType::Short, 2, true) => F::R16G16_SNORM,
        (VertexType::Short, 3, true) => F::R16G16B16_SNORM,
        (VertexType::Short, 4, true) => F::R16G16B16A16_SNORM,

        (VertexType::UnsignedShort, 1, false) => F::R16_UINT,
        (VertexType::UnsignedShort, 2, false) => F::R16G16_UINT,
        (VertexType::UnsignedShort, 3, false) => F::R16G16B16_UINT,
        (VertexType::UnsignedShort, 4, false) => F::R16G16B16A16_UINT,
        (VertexType::UnsignedShort, 1, true) => F::R16_UNORM,
        (VertexType::UnsignedShort, 2, true) => F::R16G16_UNORM,
        (VertexType::UnsignedShort, 3, true) => F::R16G16B16_UNORM,
        (VertexType::UnsignedShort, 4, true) => F::R16G16B16A16_UNORM,

        (VertexType::Int, 1, _) => F::R32_SINT,
        (VertexType::Int, 2, _) => F::R32G32_SINT,
        (VertexType::Int, 3, _) => F::R32G32B32_SINT,
        (VertexType::Int, 4, _) => F::R32G32B32A32_SINT,

        (VertexType::UnsignedInt, 1, _) => F::R32_UINT,
        (VertexType::UnsignedInt, 2, _) => F::R32G32_UINT,
        (VertexType::UnsignedInt, 3, _) => F::R32G32B32_UINT,
        (VertexType::UnsignedInt, 4, _) => F::R32G32B32A32_UINT,

        _ => return None,
    };
    Some(format)
}

pub fn index_type_to_vk(format: IndexBufferFormat) -> vk::IndexType {
    match format {
        IndexBufferFormat::U16 => vk::IndexType::UINT16,
        IndexBufferFormat::U32 => vk::IndexType::UINT32,
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
