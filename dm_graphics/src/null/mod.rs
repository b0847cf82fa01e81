/// Headless CPU-emulated adapter

pub mod null_adapter;
pub mod null_context;
pub mod null_texture;

pub use null_adapter::{NullAdapter, NULL_ADAPTER_PRIORITY};
pub use null_context::{NullContext, NullRect};
pub use null_texture::{pack_color, FrameBuffer};
