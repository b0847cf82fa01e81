/// Adapter families and the adapter contract

use crate::error::Result;
use crate::graphics::{ContextParams, GraphicsContext};
use std::fmt;

/// Backend family an adapter implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterFamily {
    None,
    Null,
    OpenGL,
    OpenGLES,
    Vulkan,
    Vendor,
    WebGPU,
    DirectX,
}

impl AdapterFamily {
    /// Map a configuration name to a family
    ///
    /// Unknown names are logged and map to `AdapterFamily::None`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "null" => AdapterFamily::Null,
            "opengl" => AdapterFamily::OpenGL,
            "opengles" => AdapterFamily::OpenGLES,
            "vulkan" => AdapterFamily::Vulkan,
            "vendor" => AdapterFamily::Vendor,
            "webgpu" => AdapterFamily::WebGPU,
            "dx12" => AdapterFamily::DirectX,
            _ => {
                crate::dm_error!("dmgraphics::adapter", "Unknown adapter family name '{}'", name);
                AdapterFamily::None
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AdapterFamily::None => "none",
            AdapterFamily::Null => "null",
            AdapterFamily::OpenGL => "opengl",
            AdapterFamily::OpenGLES => "opengles",
            AdapterFamily::Vulkan => "vulkan",
            AdapterFamily::Vendor => "vendor",
            AdapterFamily::WebGPU => "webgpu",
            AdapterFamily::DirectX => "dx12",
        }
    }
}

impl fmt::Display for AdapterFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A backend implementation of the graphics API
///
/// Adapters are registered with an `AdapterRegistry`; exactly one of them
/// gets installed and creates the process's context.
pub trait GraphicsAdapter: Send + Sync {
    fn family(&self) -> AdapterFamily;

    /// Selection priority; lower values are preferred
    fn priority(&self) -> i32;

    /// Lightweight, reversible capability probe
    ///
    /// May create and immediately destroy a native API instance.
    fn is_supported(&self) -> bool;

    fn new_context(&self, params: &ContextParams) -> Result<Box<dyn GraphicsContext>>;
}
