/// Render target description types

use super::texture::{TextureCreationParams, TextureFormat, TextureParams};
use bitflags::bitflags;

pub const MAX_BUFFER_COLOR_ATTACHMENTS: usize = 4;

/// One attachment slot of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    Color0,
    Color1,
    Color2,
    Color3,
    Depth,
    Stencil,
}

impl BufferType {
    pub fn color(index: usize) -> Option<BufferType> {
        match index {
            0 => Some(BufferType::Color0),
            1 => Some(BufferType::Color1),
            2 => Some(BufferType::Color2),
            3 => Some(BufferType::Color3),
            _ => None,
        }
    }

    pub fn color_index(self) -> Option<usize> {
        match self {
            BufferType::Color0 => Some(0),
            BufferType::Color1 => Some(1),
            BufferType::Color2 => Some(2),
            BufferType::Color3 => Some(3),
            _ => None,
        }
    }
}

bitflags! {
    /// Buffers affected by `clear`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR0  = 1 << 0;
        const COLOR1  = 1 << 1;
        const COLOR2  = 1 << 2;
        const COLOR3  = 1 << 3;
        const DEPTH   = 1 << 4;
        const STENCIL = 1 << 5;
        const COLOR = Self::COLOR0.bits() | Self::COLOR1.bits() | Self::COLOR2.bits() | Self::COLOR3.bits();
    }
}

/// One color attachment of `new_render_target`
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentParams {
    pub creation: TextureCreationParams,
    pub params: TextureParams,
}

impl AttachmentParams {
    pub fn new(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            creation: TextureCreationParams {
                width,
                height,
                original_width: width,
                original_height: height,
                ..Default::default()
            },
            params: TextureParams {
                format,
                width,
                height,
                ..Default::default()
            },
        }
    }
}

/// Parameters of `new_render_target`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetCreationParams {
    /// Color attachments, at most `MAX_BUFFER_COLOR_ATTACHMENTS`
    pub color_attachments: Vec<AttachmentParams>,
    /// Combined depth/stencil attachment
    pub depth_stencil: bool,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
}

impl RenderTargetCreationParams {
    /// Single color attachment plus optional depth/stencil
    pub fn simple(format: TextureFormat, width: u32, height: u32, depth_stencil: bool) -> Self {
        Self {
            color_attachments: vec![AttachmentParams::new(format, width, height)],
            depth_stencil,
            width,
            height,
            samples: 1,
        }
    }
}
