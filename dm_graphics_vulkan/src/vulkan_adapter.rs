/// Vulkan adapter registration

use crate::ash_device::AshDevice;
use crate::vulkan_context::VulkanContext;
use ash::vk;
use dm_graphics::dmgraphics::render::{ContextParams, GraphicsContext};
use dm_graphics::dmgraphics::{AdapterFamily, Error, GraphicsAdapter, Result};
use dm_graphics::{dm_debug, dm_error};
use std::sync::Arc;

/// Most preferred adapter
pub const VULKAN_ADAPTER_PRIORITY: i32 = 0;

#[derive(Debug, Default, Clone, Copy)]
pub struct VulkanAdapter;

impl VulkanAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Whether a Vulkan loader is present and reports at least one device
///
/// The probe instance is destroyed before returning.
fn probe_instance() -> std::result::Result<usize, String> {
    unsafe {
        let entry = ash::Entry::load().map_err(|e| format!("Vulkan library not found: {:?}", e))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(c"dmgraphics probe")
            .api_version(vk::API_VERSION_1_1);
        let instance = entry
            .create_instance(&vk::InstanceCreateInfo::default().application_info(&app_info), None)
            .map_err(|e| format!("vkCreateInstance failed: {:?}", e))?;
        let devices = instance.enumerate_physical_devices();
        instance.destroy_instance(None);
        devices
            .map(|devices| devices.len())
            .map_err(|e| format!("vkEnumeratePhysicalDevices failed: {:?}", e))
    }
}

impl GraphicsAdapter for VulkanAdapter {
    fn family(&self) -> AdapterFamily {
        AdapterFamily::Vulkan
    }

    fn priority(&self) -> i32 {
        VULKAN_ADAPTER_PRIORITY
    }

    fn is_supported(&self) -> bool {
        match probe_instance() {
            Ok(0) => {
                dm_debug!("dmgraphics::vulkan", "Vulkan instance created but no physical device found");
                false
            }
            Ok(count) => {
                dm_debug!("dmgraphics::vulkan", "Vulkan supported ({} physical devices)", count);
                true
            }
            Err(reason) => {
                dm_debug!("dmgraphics::vulkan", "Vulkan not supported: {}", reason);
                false
            }
        }
    }

    fn new_context(&self, params: &ContextParams) -> Result<Box<dyn GraphicsContext>> {
        let window = params.window.as_ref().ok_or_else(|| {
            dm_error!("dmgraphics::vulkan", "The Vulkan adapter needs a window to present to");
            Error::InitializationFailed("No window in context params".to_string())
        })?;
        let device = AshDevice::new(&**window, params)?;
        Ok(Box::new(VulkanContext::new(Arc::new(device), params)?))
    }
}
