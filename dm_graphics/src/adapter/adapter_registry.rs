/// Registry of installable adapters
///
/// Adapters are registered once at startup. `install_adapter` selects
/// exactly one of them:
///
/// 1. the first registered adapter of the requested family that passes
///    its support probe, otherwise
/// 2. the supported adapter with the lowest priority value, the earliest
///    registered one winning ties.
///
/// Installation happens once; later calls return the installed adapter.

use super::adapter::{AdapterFamily, GraphicsAdapter};
use crate::error::{Error, Result};
use crate::graphics::{ContextParams, Graphics};
use std::sync::Arc;

pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn GraphicsAdapter>>,
    installed: Option<Arc<dyn GraphicsAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            installed: None,
        }
    }

    /// Register an adapter
    pub fn register<A: GraphicsAdapter + 'static>(&mut self, adapter: A) {
        self.register_shared(Arc::new(adapter));
    }

    pub fn register_shared(&mut self, adapter: Arc<dyn GraphicsAdapter>) {
        crate::dm_debug!(
            "dmgraphics::adapter",
            "Registered adapter '{}' (priority {})",
            adapter.family(),
            adapter.priority()
        );
        self.adapters.push(adapter);
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// First supported adapter of `family`, in registration order
    pub fn select_adapter_by_family(&self, family: AdapterFamily) -> Option<Arc<dyn GraphicsAdapter>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.family() == family && adapter.is_supported())
            .cloned()
    }

    /// Supported adapter with the lowest priority value
    pub fn select_adapter_by_priority(&self) -> Option<Arc<dyn GraphicsAdapter>> {
        let mut selected: Option<&Arc<dyn GraphicsAdapter>> = None;
        for adapter in &self.adapters {
            let better = selected.map_or(true, |best| adapter.priority() < best.priority());
            if better && adapter.is_supported() {
                selected = Some(adapter);
            }
        }
        selected.cloned()
    }

    /// Select and install the process's adapter
    pub fn install_adapter(&mut self, family: AdapterFamily) -> Result<Arc<dyn GraphicsAdapter>> {
        if let Some(installed) = &self.installed {
            return Ok(installed.clone());
        }

        let selected = match self.select_adapter_by_family(family) {
            Some(adapter) => Some(adapter),
            None => {
                if family != AdapterFamily::None {
                    crate::dm_warn!(
                        "dmgraphics::adapter",
                        "Requested adapter family '{}' is not available, selecting by priority",
                        family
                    );
                }
                self.select_adapter_by_priority()
            }
        };

        let Some(adapter) = selected else {
            crate::dm_error!(
                "dmgraphics::adapter",
                "No supported graphics adapter among {} registered",
                self.adapters.len()
            );
            return Err(Error::NoSupportedAdapter);
        };

        crate::dm_info!("dmgraphics::adapter", "Installed adapter '{}'", adapter.family());
        self.installed = Some(adapter.clone());
        Ok(adapter)
    }

    pub fn installed_adapter(&self) -> Option<&Arc<dyn GraphicsAdapter>> {
        self.installed.as_ref()
    }

    /// Create a context with the installed adapter
    pub fn new_context(&self, params: &ContextParams) -> Result<Graphics> {
        let adapter = self.installed.as_ref().ok_or_else(|| {
            crate::dm_error!("dmgraphics::adapter", "new_context called before install_adapter");
            Error::InitializationFailed("No adapter installed".to_string())
        })?;
        let context = adapter.new_context(params)?;
        Ok(Graphics::new(context))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "adapter_registry_tests.rs"]
mod tests;
