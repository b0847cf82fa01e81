/// Adapter registry and dispatch

pub mod adapter;
pub mod adapter_registry;

pub use adapter::{AdapterFamily, GraphicsAdapter};
pub use adapter_registry::AdapterRegistry;
