/// Verification of native call results

use ash::prelude::VkResult;
use ash::vk;
use dm_graphics::dmgraphics::{Error, Result};
use dm_graphics::log::{log_detailed, LogSeverity};
use std::panic::Location;

/// Convert a native result into a dmgraphics result
///
/// With `verify` set, a failure is logged with the caller's file:line and
/// trips a debug assertion. The failure is propagated either way.
#[track_caller]
pub fn check_vk<T>(result: VkResult<T>, call: &str, verify: bool) -> Result<T> {
    result.map_err(|code| {
        let location = Location::caller();
        let message = format!("{} failed: {:?}", call, code);
        if verify {
            log_detailed(LogSeverity::Error, "dmgraphics::vulkan", message.clone(), location.file(), location.line());
            debug_assert!(false, "{} ({}:{})", message, location.file(), location.line());
        }
        to_error(code, message)
    })
}

fn to_error(code: vk::Result, message: String) -> Error {
    match code {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => Error::OutOfMemory,
        _ => Error::BackendError(message),
    }
}
