//! Error types for the dmGraphics layer
//!
//! This module defines the error types shared by every adapter,
//! covering initialization, resource creation and backend failures.

use std::fmt;

/// Result type for dmGraphics operations
pub type Result<T> = std::result::Result<T, Error>;

/// dmGraphics errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan call failure, lost device, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (stale handle, wrong asset type, destroyed object)
    InvalidResource(String),

    /// Initialization failed (adapter, context, swapchain)
    InitializationFailed(String),

    /// Texture format not supported by the active context
    UnsupportedFormat(String),

    /// Program rejected at creation (unsupported language, descriptor limits)
    ShaderCompilation(String),

    /// No registered adapter passed its support probe
    NoSupportedAdapter,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            Error::ShaderCompilation(msg) => write!(f, "Shader compilation failed: {}", msg),
            Error::NoSupportedAdapter => write!(f, "No supported graphics adapter"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
