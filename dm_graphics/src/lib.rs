/*!
# dmgraphics

Backend-neutral graphics abstraction layer.

The crate defines one verb set (`GraphicsContext`) that every graphics
adapter implements, plus the shared machinery adapters build on:

- **AdapterRegistry**: registers adapters, selects one by family or priority
- **Graphics**: facade over the installed adapter's context
- **ProgramLayout**: merges per-stage shader reflection into one binding table
- **PipelineCache**: one native pipeline per unique state key
- **AssetHandleContainer**: typed, generation-checked texture/render-target handles
- **JobThread**: the async texture upload worker

A headless `null` adapter ships with the crate. Native adapters (Vulkan)
live in their own crates and register themselves with the registry.
*/

// Internal modules
mod error;
pub mod adapter;
pub mod graphics;
pub mod log;
pub mod null;
pub mod shader;
pub mod utils;

// Main dmgraphics namespace module
pub mod dmgraphics {
    // Error types
    pub use crate::error::{Error, Result};

    // Adapter selection
    pub use crate::adapter::{AdapterFamily, AdapterRegistry, GraphicsAdapter};

    // Facade
    pub use crate::graphics::Graphics;

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
    }

    // Graphics API types and the context contract
    pub mod render {
        pub use crate::graphics::*;
    }

    // Shader reflection and program layout
    pub mod shader {
        pub use crate::shader::*;
    }

    // Handles, hashing, slot storage and the job worker
    pub mod utils {
        pub use crate::utils::*;
    }

    // Headless adapter
    pub mod null {
        pub use crate::null::{NullAdapter, NullContext};
    }
}
