/// Graphics API types, the context contract and the facade

pub mod buffer;
pub mod context;
pub mod graphics;
pub mod handles;
pub mod pipeline_cache;
pub mod pipeline_state;
pub mod render_target;
pub mod texture;
pub mod vertex;

pub use buffer::*;
pub use context::*;
pub use graphics::Graphics;
pub use handles::*;
pub use pipeline_cache::{PipelineCache, PipelineCacheStats};
pub use pipeline_state::*;
pub use render_target::*;
pub use texture::*;
pub use vertex::*;
