use super::*;
use crate::graphics::GraphicsContext;
use crate::null::NullContext;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Test adapter
// ============================================================================

struct TestAdapter {
    family: AdapterFamily,
    priority: i32,
    supported: bool,
    probes: Arc<AtomicUsize>,
}

impl TestAdapter {
    fn new(family: AdapterFamily, priority: i32, supported: bool) -> Self {
        Self {
            family,
            priority,
            supported,
            probes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl GraphicsAdapter for TestAdapter {
    fn family(&self) -> AdapterFamily {
        self.family
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_supported(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.supported
    }

    fn new_context(&self, params: &ContextParams) -> Result<Box<dyn GraphicsContext>> {
        if !self.supported {
            return Err(Error::InitializationFailed("unsupported".to_string()));
        }
        Ok(Box::new(NullContext::new(params)?))
    }
}

// ============================================================================
// Selection by priority
// ============================================================================

#[test]
fn test_priority_selects_lowest_value_regardless_of_order() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::Null, 100, true));
    registry.register(TestAdapter::new(AdapterFamily::Vulkan, 0, true));
    registry.register(TestAdapter::new(AdapterFamily::OpenGL, 10, true));

    let selected = registry.select_adapter_by_priority().unwrap();
    assert_eq!(selected.family(), AdapterFamily::Vulkan);
}

#[test]
fn test_priority_ties_go_to_first_registered() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::OpenGL, 5, true));
    registry.register(TestAdapter::new(AdapterFamily::Vulkan, 5, true));

    let selected = registry.select_adapter_by_priority().unwrap();
    assert_eq!(selected.family(), AdapterFamily::OpenGL);
}

#[test]
fn test_priority_skips_unsupported() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::Vulkan, 0, false));
    registry.register(TestAdapter::new(AdapterFamily::Null, 100, true));

    let selected = registry.select_adapter_by_priority().unwrap();
    assert_eq!(selected.family(), AdapterFamily::Null);
}

#[test]
fn test_priority_does_not_probe_worse_candidates() {
    let best = TestAdapter::new(AdapterFamily::Vulkan, 0, true);
    let worse = TestAdapter::new(AdapterFamily::Null, 100, true);
    let worse_probes = worse.probes.clone();

    let mut registry = AdapterRegistry::new();
    registry.register(best);
    registry.register(worse);

    registry.select_adapter_by_priority().unwrap();
    assert_eq!(worse_probes.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Install
// ============================================================================

#[test]
fn test_install_requested_family_wins_over_priority() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::Vulkan, 0, true));
    registry.register(TestAdapter::new(AdapterFamily::Null, 100, true));

    let installed = registry.install_adapter(AdapterFamily::Null).unwrap();
    assert_eq!(installed.family(), AdapterFamily::Null);
}

#[test]
fn test_install_falls_back_when_family_unsupported() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::Vulkan, 0, false));
    registry.register(TestAdapter::new(AdapterFamily::Null, 100, true));

    let installed = registry.install_adapter(AdapterFamily::Vulkan).unwrap();
    assert_eq!(installed.family(), AdapterFamily::Null);
}

#[test]
fn test_install_falls_back_when_family_not_registered() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::Null, 100, true));

    let installed = registry.install_adapter(AdapterFamily::WebGPU).unwrap();
    assert_eq!(installed.family(), AdapterFamily::Null);
}

#[test]
fn test_install_none_supported_fails() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::Vulkan, 0, false));

    let result = registry.install_adapter(AdapterFamily::Vulkan);
    assert_eq!(result.err(), Some(Error::NoSupportedAdapter));
    assert!(registry.installed_adapter().is_none());
}

#[test]
fn test_install_empty_registry_fails() {
    let mut registry = AdapterRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.install_adapter(AdapterFamily::None).is_err());
}

#[test]
fn test_install_twice_keeps_first_adapter() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::Vulkan, 0, true));
    registry.register(TestAdapter::new(AdapterFamily::Null, 100, true));

    registry.install_adapter(AdapterFamily::Null).unwrap();
    let second = registry.install_adapter(AdapterFamily::Vulkan).unwrap();
    assert_eq!(second.family(), AdapterFamily::Null);
    assert_eq!(registry.len(), 2);
}

// ============================================================================
// Context creation
// ============================================================================

#[test]
fn test_new_context_before_install_fails() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::Null, 100, true));

    let result = registry.new_context(&ContextParams::default());
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

#[test]
fn test_new_context_uses_installed_adapter() {
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter::new(AdapterFamily::Null, 100, true));
    registry.install_adapter(AdapterFamily::Null).unwrap();

    let params = ContextParams {
        width: 320,
        height: 200,
        threaded_async_uploads: false,
        ..Default::default()
    };
    let graphics = registry.new_context(&params).unwrap();
    assert_eq!(graphics.width(), 320);
    assert_eq!(graphics.height(), 200);
}

// ============================================================================
// Family names
// ============================================================================

#[test]
fn test_family_from_name() {
    assert_eq!(AdapterFamily::from_name("vulkan"), AdapterFamily::Vulkan);
    assert_eq!(AdapterFamily::from_name("Vulkan"), AdapterFamily::Vulkan);
    assert_eq!(AdapterFamily::from_name("null"), AdapterFamily::Null);
    assert_eq!(AdapterFamily::from_name("opengles"), AdapterFamily::OpenGLES);
    assert_eq!(AdapterFamily::from_name("dx12"), AdapterFamily::DirectX);
    assert_eq!(AdapterFamily::from_name("glide"), AdapterFamily::None);
}

#[test]
fn test_family_name_round_trips() {
    for family in [
        AdapterFamily::Null,
        AdapterFamily::OpenGL,
        AdapterFamily::OpenGLES,
        AdapterFamily::Vulkan,
        AdapterFamily::Vendor,
        AdapterFamily::WebGPU,
        AdapterFamily::DirectX,
    ] {
        assert_eq!(AdapterFamily::from_name(family.name()), family);
    }
}
