use super::*;

#[test]
fn test_insert_and_get() {
    let mut container = AssetHandleContainer::new();
    let tex = container.insert(AssetType::Texture, "albedo");
    let rt = container.insert(AssetType::RenderTarget, "gbuffer");

    assert_eq!(container.get(tex), Some(&"albedo"));
    assert_eq!(container.get(rt), Some(&"gbuffer"));
    assert_eq!(tex.asset_type(), AssetType::Texture);
    assert_eq!(container.len(), 2);
}

#[test]
fn test_stale_handle_is_invalid_after_reuse() {
    let mut container = AssetHandleContainer::new();
    let first = container.insert(AssetType::Texture, 1u32);
    assert_eq!(container.remove(first), Some(1));

    // The slot is recycled with a new generation
    let second = container.insert(AssetType::Texture, 2u32);
    assert!(!container.is_valid(first));
    assert!(container.is_valid(second));
    assert_eq!(container.get(first), None);
    assert_ne!(first.id(), second.id());
}

#[test]
fn test_wrong_asset_type_does_not_resolve() {
    let mut container = AssetHandleContainer::new();
    let tex = container.insert(AssetType::Texture, 7u8);

    // Same key, different type tag
    let forged = AssetHandle { key: tex.key, asset_type: AssetType::RenderTarget };
    assert!(!container.is_valid(forged));
    assert_eq!(container.remove(forged), None);
    assert!(container.is_valid(tex));
}

#[test]
fn test_invalid_handle() {
    let container: AssetHandleContainer<u8> = AssetHandleContainer::default();
    let handle = AssetHandle::invalid(AssetType::Texture);
    assert!(handle.is_null());
    assert!(!container.is_valid(handle));
}

#[test]
fn test_iter_type_filters() {
    let mut container = AssetHandleContainer::new();
    container.insert(AssetType::Texture, 'a');
    container.insert(AssetType::RenderTarget, 'b');
    container.insert(AssetType::Texture, 'c');

    let mut textures: Vec<char> = container.iter_type(AssetType::Texture).map(|(_, v)| *v).collect();
    textures.sort();
    assert_eq!(textures, vec!['a', 'c']);
}

#[test]
fn test_get_mut_and_drain() {
    let mut container = AssetHandleContainer::new();
    let tex = container.insert(AssetType::Texture, 10u32);
    *container.get_mut(tex).unwrap() += 5;
    assert_eq!(container.get(tex), Some(&15));

    let drained: Vec<_> = container.drain().collect();
    assert_eq!(drained.len(), 1);
    assert!(container.is_empty());
}
