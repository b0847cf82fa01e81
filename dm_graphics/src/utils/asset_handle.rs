/// Opaque, generation-checked handles for textures and render targets.
///
/// A handle pairs a slot-map key with the asset type it was issued for,
/// so a texture handle can never be used to look up a render target and a
/// handle whose slot was freed (and possibly reused) is reported invalid.

use slotmap::{new_key_type, Key, SlotMap};

new_key_type! {
    /// Slot key backing every asset handle
    pub struct AssetKey;
}

/// Kind of asset a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetType {
    Texture,
    RenderTarget,
}

/// Opaque handle to a backend-owned asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetHandle {
    key: AssetKey,
    asset_type: AssetType,
}

/// Texture handle
pub type TextureHandle = AssetHandle;

/// Render target handle
pub type RenderTargetHandle = AssetHandle;

impl AssetHandle {
    /// A handle that never resolves to an asset
    pub fn invalid(asset_type: AssetType) -> Self {
        Self { key: AssetKey::null(), asset_type }
    }

    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    pub fn is_null(&self) -> bool {
        self.key.is_null()
    }

    /// Stable 64-bit identity (slot index + generation)
    pub fn id(&self) -> u64 {
        self.key.data().as_ffi()
    }
}

/// Slot map of assets keyed by `AssetHandle`
pub struct AssetHandleContainer<T> {
    assets: SlotMap<AssetKey, (AssetType, T)>,
}

impl<T> AssetHandleContainer<T> {
    pub fn new() -> Self {
        Self { assets: SlotMap::with_key() }
    }

    /// Store an asset and issue a handle for it
    pub fn insert(&mut self, asset_type: AssetType, asset: T) -> AssetHandle {
        let key = self.assets.insert((asset_type, asset));
        AssetHandle { key, asset_type }
    }

    pub fn get(&self, handle: AssetHandle) -> Option<&T> {
        match self.assets.get(handle.key) {
            Some((asset_type, asset)) if *asset_type == handle.asset_type => Some(asset),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: AssetHandle) -> Option<&mut T> {
        match self.assets.get_mut(handle.key) {
            Some((asset_type, asset)) if *asset_type == handle.asset_type => Some(asset),
            _ => None,
        }
    }

    /// Remove the asset; the handle (and any copy of it) becomes invalid
    pub fn remove(&mut self, handle: AssetHandle) -> Option<T> {
        if !self.is_valid(handle) {
            return None;
        }
        self.assets.remove(handle.key).map(|(_, asset)| asset)
    }

    pub fn is_valid(&self, handle: AssetHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Iterate all live assets of one type
    pub fn iter_type(&self, asset_type: AssetType) -> impl Iterator<Item = (AssetHandle, &T)> {
        self.assets
            .iter()
            .filter(move |(_, (t, _))| *t == asset_type)
            .map(|(key, (t, asset))| (AssetHandle { key, asset_type: *t }, asset))
    }

    /// Drain every asset (context teardown)
    pub fn drain(&mut self) -> impl Iterator<Item = (AssetHandle, T)> + '_ {
        self.assets
            .drain()
            .map(|(key, (asset_type, asset))| (AssetHandle { key, asset_type }, asset))
    }
}

impl<T> Default for AssetHandleContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "asset_handle_tests.rs"]
mod tests;
