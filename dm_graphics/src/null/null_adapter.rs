use super::null_context::NullContext;
use crate::adapter::{AdapterFamily, GraphicsAdapter};
use crate::error::Result;
use crate::graphics::{ContextParams, GraphicsContext};

/// Least preferred of all adapters; selected only when nothing else runs
pub const NULL_ADAPTER_PRIORITY: i32 = 1000;

/// Headless adapter, always supported
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAdapter;

impl GraphicsAdapter for NullAdapter {
    fn family(&self) -> AdapterFamily {
        AdapterFamily::Null
    }

    fn priority(&self) -> i32 {
        NULL_ADAPTER_PRIORITY
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn new_context(&self, params: &ContextParams) -> Result<Box<dyn GraphicsContext>> {
        Ok(Box::new(NullContext::new(params)?))
    }
}
