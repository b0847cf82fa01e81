/// Handles for non-asset GPU objects
///
/// Textures and render targets use `AssetHandle`; everything else is
/// keyed directly in a per-context slot map with these typed keys.

use slotmap::{new_key_type, Key};

new_key_type! {
    pub struct VertexBufferHandle;
    pub struct IndexBufferHandle;
    pub struct StorageBufferHandle;
    pub struct ProgramHandle;
    pub struct VertexDeclarationHandle;
}

/// Stable 64-bit identity of a slot-map key (index + generation)
pub fn handle_id<K: Key>(key: K) -> u64 {
    key.data().as_ffi()
}
