/// Utility types shared by every adapter

pub mod asset_handle;
pub mod hash;
pub mod job_thread;
pub mod param_slots;
pub mod sync;

pub use asset_handle::{AssetHandle, AssetHandleContainer, AssetKey, AssetType, RenderTargetHandle, TextureHandle};
pub use hash::{hash_name, HashState};
pub use job_thread::JobThread;
pub use param_slots::ParamSlots;
pub use sync::lock;
