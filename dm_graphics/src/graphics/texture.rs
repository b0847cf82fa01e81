/// Texture description types shared by all adapters

use crate::utils::TextureHandle;
use bitflags::bitflags;

/// Pixel formats understood by `set_texture`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Luminance,
    LuminanceAlpha,
    Rgb,
    Rgba,
    Rgb16Bpp,
    Rgba16Bpp,
    Depth,
    Stencil,
    RgbEtc1,
    RgbaEtc2,
    RgbaAstc4x4,
    RgbBc1,
    RgbaBc3,
    RgbaBc7,
    Rgb16f,
    Rgb32f,
    Rgba16f,
    Rgba32f,
    R16f,
    Rg16f,
    R32f,
    Rg32f,
    Rgba32Ui,
    Bgra8U,
    R32Ui,
}

impl TextureFormat {
    pub const ALL: [TextureFormat; 25] = [
        TextureFormat::Luminance,
        TextureFormat::LuminanceAlpha,
        TextureFormat::Rgb,
        TextureFormat::Rgba,
        TextureFormat::Rgb16Bpp,
        TextureFormat::Rgba16Bpp,
        TextureFormat::Depth,
        TextureFormat::Stencil,
        TextureFormat::RgbEtc1,
        TextureFormat::RgbaEtc2,
        TextureFormat::RgbaAstc4x4,
        TextureFormat::RgbBc1,
        TextureFormat::RgbaBc3,
        TextureFormat::RgbaBc7,
        TextureFormat::Rgb16f,
        TextureFormat::Rgb32f,
        TextureFormat::Rgba16f,
        TextureFormat::Rgba32f,
        TextureFormat::R16f,
        TextureFormat::Rg16f,
        TextureFormat::R32f,
        TextureFormat::Rg32f,
        TextureFormat::Rgba32Ui,
        TextureFormat::Bgra8U,
        TextureFormat::R32Ui,
    ];

    /// Bit used in per-context format support masks
    pub fn bit(self) -> u64 {
        1u64 << (self as u32)
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            TextureFormat::RgbEtc1
                | TextureFormat::RgbaEtc2
                | TextureFormat::RgbaAstc4x4
                | TextureFormat::RgbBc1
                | TextureFormat::RgbaBc3
                | TextureFormat::RgbaBc7
        )
    }

    /// Bytes per pixel for uncompressed formats, bytes per 4x4 block otherwise
    pub fn bytes_per_unit(self) -> u32 {
        match self {
            TextureFormat::Luminance | TextureFormat::Stencil => 1,
            TextureFormat::LuminanceAlpha | TextureFormat::Rgb16Bpp | TextureFormat::Rgba16Bpp | TextureFormat::R16f => 2,
            TextureFormat::Rgb => 3,
            TextureFormat::Rgba | TextureFormat::Bgra8U | TextureFormat::Depth | TextureFormat::R32f
            | TextureFormat::Rg16f | TextureFormat::R32Ui => 4,
            TextureFormat::Rgb16f => 6,
            TextureFormat::Rgba16f | TextureFormat::Rg32f => 8,
            TextureFormat::Rgb32f => 12,
            TextureFormat::Rgba32f | TextureFormat::Rgba32Ui => 16,
            TextureFormat::RgbEtc1 | TextureFormat::RgbBc1 => 8,
            TextureFormat::RgbaEtc2 | TextureFormat::RgbaAstc4x4 | TextureFormat::RgbaBc3 | TextureFormat::RgbaBc7 => 16,
        }
    }

    /// Size in bytes of one mip level
    pub fn level_size(self, width: u32, height: u32, depth: u32) -> usize {
        let (w, h) = if self.is_compressed() {
            (width.div_ceil(4), height.div_ceil(4))
        } else {
            (width, height)
        };
        (w.max(1) as usize) * (h.max(1) as usize) * (depth.max(1) as usize) * self.bytes_per_unit() as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    #[default]
    Texture2D,
    Texture2DArray,
    TextureCube,
    Texture3D,
    Image2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    /// Use the context's configured default
    #[default]
    Default,
    Nearest,
    Linear,
    NearestMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapNearest,
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    ClampToBorder,
    #[default]
    ClampToEdge,
    MirroredRepeat,
    Repeat,
}

bitflags! {
    /// How a texture will be used; drives native image usage bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsageFlags: u32 {
        const SAMPLE     = 1 << 0;
        const MEMORYLESS = 1 << 1;
        const INPUT      = 1 << 2;
        const STORAGE    = 1 << 3;
        const COLOR      = 1 << 4;
    }
}

bitflags! {
    /// Texture status reported by `texture_status_flags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureStatusFlags: u32 {
        /// At least one mip level has an upload in flight
        const DATA_PENDING = 1 << 0;
    }
}

/// Parameters of `new_texture`
#[derive(Debug, Clone, PartialEq)]
pub struct TextureCreationParams {
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub mip_map_count: u8,
    pub layer_count: u8,
    pub usage_hint: TextureUsageFlags,
}

impl Default for TextureCreationParams {
    fn default() -> Self {
        Self {
            texture_type: TextureType::Texture2D,
            width: 0,
            height: 0,
            depth: 1,
            original_width: 0,
            original_height: 0,
            mip_map_count: 1,
            layer_count: 1,
            usage_hint: TextureUsageFlags::SAMPLE,
        }
    }
}

/// Parameters of `set_texture` / `set_texture_async`
///
/// `sub_update` writes `data` into the region at (`x`, `y`, `z`) of an
/// existing image; otherwise the image is (re)created with the given
/// format and size if either differs from the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureParams {
    pub format: TextureFormat,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub u_wrap: TextureWrap,
    pub v_wrap: TextureWrap,
    pub data: Option<Vec<u8>>,
    pub mip_map: u8,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layer_count: u8,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub sub_update: bool,
}

impl Default for TextureParams {
    fn default() -> Self {
        Self {
            format: TextureFormat::Rgba,
            min_filter: TextureFilter::Default,
            mag_filter: TextureFilter::Default,
            u_wrap: TextureWrap::ClampToEdge,
            v_wrap: TextureWrap::ClampToEdge,
            data: None,
            mip_map: 0,
            width: 0,
            height: 0,
            depth: 1,
            layer_count: 1,
            x: 0,
            y: 0,
            z: 0,
            sub_update: false,
        }
    }
}

/// Sampler state of a texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerParams {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub u_wrap: TextureWrap,
    pub v_wrap: TextureWrap,
    pub max_anisotropy: f32,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            min_filter: TextureFilter::Default,
            mag_filter: TextureFilter::Default,
            u_wrap: TextureWrap::ClampToEdge,
            v_wrap: TextureWrap::ClampToEdge,
            max_anisotropy: 1.0,
        }
    }
}

/// Read-only snapshot of a texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureInfo {
    pub texture_type: TextureType,
    pub format: Option<TextureFormat>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_map_count: u8,
    pub layer_count: u8,
    pub usage_hint: TextureUsageFlags,
}

/// Outcome handed to an async upload's completion callback
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncUploadStatus {
    Completed,
    Failed(String),
}

/// Completion callback of `set_texture_async`, invoked on the render thread
pub type SetTextureAsyncCallback = Box<dyn FnOnce(TextureHandle, AsyncUploadStatus) + Send>;

/// Bitmask with the bits of `count` mip levels starting at `first` set
pub fn mip_bits(first: u8, count: u8) -> u32 {
    let mut bits = 0u32;
    for mip in first..first.saturating_add(count).min(32) {
        bits |= 1 << mip;
    }
    bits
}
