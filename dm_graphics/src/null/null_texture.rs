/// CPU-side storage of Null adapter textures and frame buffers

use crate::error::{Error, Result};
use crate::graphics::{
    ClearFlags, SamplerParams, TextureCreationParams, TextureFilter, TextureFormat, TextureInfo, TextureParams,
    TextureType, TextureUsageFlags,
};
use crate::utils::TextureHandle;

/// A texture backed by one byte vector per mip level
#[derive(Debug, Clone)]
pub struct NullTexture {
    pub texture_type: TextureType,
    pub format: Option<TextureFormat>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub mip_map_count: u8,
    pub layer_count: u8,
    pub usage_hint: TextureUsageFlags,
    pub sampler: SamplerParams,
    pub mips: Vec<Vec<u8>>,
    /// One bit per mip level with an upload in flight
    pub data_pending: u32,
}

impl NullTexture {
    pub fn new(params: &TextureCreationParams) -> Self {
        Self {
            texture_type: params.texture_type,
            format: None,
            width: params.width,
            height: params.height,
            depth: params.depth.max(1),
            original_width: params.original_width,
            original_height: params.original_height,
            mip_map_count: params.mip_map_count.max(1),
            layer_count: params.layer_count.max(1),
            usage_hint: params.usage_hint,
            sampler: SamplerParams::default(),
            mips: vec![Vec::new(); params.mip_map_count.max(1) as usize],
            data_pending: 0,
        }
    }

    pub fn info(&self) -> TextureInfo {
        TextureInfo {
            texture_type: self.texture_type,
            format: self.format,
            width: self.width,
            height: self.height,
            depth: self.depth,
            mip_map_count: self.mip_map_count,
            layer_count: self.layer_count,
            usage_hint: self.usage_hint,
        }
    }

    /// Width, height and depth of one mip level
    pub fn mip_extent(&self, mip: u8) -> (u32, u32, u32) {
        (
            (self.width >> mip).max(1),
            (self.height >> mip).max(1),
            (self.depth >> mip).max(1),
        )
    }

    fn layers(&self) -> u32 {
        match self.texture_type {
            TextureType::TextureCube => 6,
            _ => self.layer_count as u32,
        }
    }

    /// Reallocate every mip for a new format and size
    fn reallocate(&mut self, format: TextureFormat, width: u32, height: u32, depth: u32, layer_count: u8) {
        self.format = Some(format);
        self.width = width;
        self.height = height;
        self.depth = depth.max(1);
        self.layer_count = layer_count.max(1);
        let layers = self.layers() as usize;
        self.mips = (0..self.mip_map_count)
            .map(|mip| {
                let (w, h, d) = self.mip_extent(mip);
                vec![0; format.level_size(w, h, d) * layers]
            })
            .collect();
    }
}

/// Resolve `TextureFilter::Default` against the context defaults
pub fn resolve_filter(filter: TextureFilter, default: TextureFilter) -> TextureFilter {
    match filter {
        TextureFilter::Default => default,
        other => other,
    }
}

/// Copy `params.data` into a texture
///
/// Runs under the asset lock, either on the render thread or in the
/// process phase of an async upload job.
pub fn upload_texture(texture: &mut NullTexture, params: &TextureParams) -> Result<()> {
    if params.mip_map >= texture.mip_map_count {
        return Err(Error::InvalidResource(format!(
            "Mip level {} out of range ({} levels)",
            params.mip_map, texture.mip_map_count
        )));
    }

    if !params.sub_update {
        let resized = texture.format != Some(params.format)
            || (params.mip_map == 0
                && (texture.width != params.width || texture.height != params.height || texture.depth != params.depth.max(1)));
        if resized {
            let (width, height) = if params.mip_map == 0 {
                (params.width, params.height)
            } else {
                (texture.width, texture.height)
            };
            texture.reallocate(params.format, width, height, params.depth, params.layer_count);
        }
    } else if texture.format != Some(params.format) {
        return Err(Error::InvalidResource(format!(
            "Sub-update format {:?} does not match texture format {:?}",
            params.format, texture.format
        )));
    }

    let Some(data) = params.data.as_deref() else {
        return Ok(());
    };

    let layers = texture.layers();
    let (mip_width, mip_height, mip_depth) = texture.mip_extent(params.mip_map);
    let mip = &mut texture.mips[params.mip_map as usize];

    if !params.sub_update || params.format.is_compressed() {
        if params.sub_update {
            return Err(Error::UnsupportedFormat(format!("Sub-updates of {:?} are not supported", params.format)));
        }
        let size = data.len().min(mip.len());
        mip[..size].copy_from_slice(&data[..size]);
        return Ok(());
    }

    if params.x + params.width > mip_width || params.y + params.height > mip_height {
        return Err(Error::InvalidResource(format!(
            "Sub-update {}x{} at ({}, {}) exceeds mip {} ({}x{})",
            params.width, params.height, params.x, params.y, params.mip_map, mip_width, mip_height
        )));
    }

    let bpp = params.format.bytes_per_unit() as usize;
    let row = params.width as usize * bpp;
    let slices = params.depth.max(1).min(mip_depth * layers);
    for slice in 0..slices as usize {
        for y in 0..params.height as usize {
            let src = (slice * params.height as usize + y) * row;
            if src + row > data.len() {
                return Ok(());
            }
            let dst_slice = params.z as usize + slice;
            let dst = ((dst_slice * mip_height as usize + params.y as usize + y) * mip_width as usize + params.x as usize) * bpp;
            if dst + row > mip.len() {
                return Err(Error::InvalidResource("Sub-update exceeds texture storage".to_string()));
            }
            mip[dst..dst + row].copy_from_slice(&data[src..src + row]);
        }
    }
    Ok(())
}

/// Color, depth and stencil planes of the main frame buffer or a render target
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub color: Vec<Vec<u32>>,
    pub depth: Vec<f32>,
    pub stencil: Vec<u32>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, color_count: usize, depth_stencil: bool) -> Self {
        let size = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![vec![0; size]; color_count],
            depth: if depth_stencil { vec![0.0; size] } else { Vec::new() },
            stencil: if depth_stencil { vec![0; size] } else { Vec::new() },
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        *self = FrameBuffer::new(width, height, self.color.len(), !self.depth.is_empty());
    }

    pub fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u32) {
        let packed = pack_color(color);
        for (index, plane) in self.color.iter_mut().enumerate() {
            if flags.contains(ClearFlags::from_bits_truncate(1 << index)) {
                plane.fill(packed);
            }
        }
        if flags.contains(ClearFlags::DEPTH) {
            self.depth.fill(depth);
        }
        if flags.contains(ClearFlags::STENCIL) {
            self.stencil.fill(stencil);
        }
    }
}

/// RGBA8 packing with red in the high byte
pub fn pack_color(color: [f32; 4]) -> u32 {
    let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(color[0]) << 24) | (channel(color[1]) << 16) | (channel(color[2]) << 8) | channel(color[3])
}

/// A render target: attachment textures plus the planes draws land in
#[derive(Debug, Clone)]
pub struct NullRenderTarget {
    pub color_textures: Vec<TextureHandle>,
    pub depth_stencil_texture: Option<TextureHandle>,
    pub frame_buffer: FrameBuffer,
}

/// Everything stored in the Null context's asset container
#[derive(Debug)]
pub enum NullAsset {
    Texture(NullTexture),
    RenderTarget(NullRenderTarget),
}

impl NullAsset {
    pub fn texture(&self) -> Option<&NullTexture> {
        match self {
            NullAsset::Texture(texture) => Some(texture),
            NullAsset::RenderTarget(_) => None,
        }
    }

    pub fn texture_mut(&mut self) -> Option<&mut NullTexture> {
        match self {
            NullAsset::Texture(texture) => Some(texture),
            NullAsset::RenderTarget(_) => None,
        }
    }

    pub fn render_target(&self) -> Option<&NullRenderTarget> {
        match self {
            NullAsset::RenderTarget(render_target) => Some(render_target),
            NullAsset::Texture(_) => None,
        }
    }

    pub fn render_target_mut(&mut self) -> Option<&mut NullRenderTarget> {
        match self {
            NullAsset::RenderTarget(render_target) => Some(render_target),
            NullAsset::Texture(_) => None,
        }
    }
}
