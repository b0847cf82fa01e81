/// Per-frame dynamic uniform buffer
///
/// Every draw copies its uniform blocks into the scratch buffer of the
/// current frame-in-flight slot and binds them with dynamic offsets. The
/// write cursor only moves forward within a frame; `reset` rewinds it once
/// the slot's fence has signaled.
///
/// When a write does not fit, the buffer is replaced by one that is
/// `SCRATCH_BUFFER_INCREMENT` bytes larger. The old buffer is queued for
/// deferred destruction on the current slot, so blocks written earlier in
/// the frame stay valid for the draws that reference them.

use crate::vulkan_check::check_vk;
use crate::vulkan_descriptor_allocator::DESCRIPTOR_POOL_SIZE;
use crate::vulkan_device::VulkanDevice;
use crate::vulkan_resource_lifecycle::{ResourceToDestroy, ResourcesToDestroy};
use ash::vk;
use dm_graphics::dm_debug;
use dm_graphics::dmgraphics::Result;

pub const SCRATCH_BUFFER_SIZE: u64 = 256 * DESCRIPTOR_POOL_SIZE as u64;
pub const SCRATCH_BUFFER_INCREMENT: u64 = 256 * DESCRIPTOR_POOL_SIZE as u64;

const SCRATCH_BUFFER_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::UNIFORM_BUFFER;

pub struct ScratchBuffer {
    buffer: vk::Buffer,
    size: u64,
    cursor: u64,
    alignment: u64,
    resize_count: u32,
}

impl ScratchBuffer {
    pub fn new<D: VulkanDevice>(device: &D, size: u64, alignment: u32, verify: bool) -> Result<Self> {
        let buffer = check_vk(device.create_buffer(size, SCRATCH_BUFFER_USAGE), "vkCreateBuffer(scratch)", verify)?;
        Ok(Self {
            buffer,
            size,
            cursor: 0,
            alignment: u64::from(alignment.max(1)),
            resize_count: 0,
        })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Number of times the buffer was replaced by a larger one
    pub fn resize_count(&self) -> u32 {
        self.resize_count
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Copy `data` at the write cursor
    ///
    /// Returns the buffer written to and the offset of the data in it. The
    /// cursor advances by the alignment-padded size.
    pub fn allocate<D: VulkanDevice>(
        &mut self,
        device: &D,
        data: &[u8],
        frame: usize,
        resources_to_destroy: &mut ResourcesToDestroy,
        verify: bool,
    ) -> Result<(vk::Buffer, u64)> {
        let aligned = (data.len() as u64).div_ceil(self.alignment) * self.alignment;
        if self.cursor + aligned > self.size {
            self.grow(device, aligned, frame, resources_to_destroy, verify)?;
        }

        let offset = self.cursor;
        check_vk(device.write_buffer(self.buffer, offset, data), "write scratch buffer", verify)?;
        self.cursor += aligned;
        Ok((self.buffer, offset))
    }

    fn grow<D: VulkanDevice>(
        &mut self,
        device: &D,
        required: u64,
        frame: usize,
        resources_to_destroy: &mut ResourcesToDestroy,
        verify: bool,
    ) -> Result<()> {
        let mut new_size = self.size + SCRATCH_BUFFER_INCREMENT;
        while new_size < required {
            new_size += SCRATCH_BUFFER_INCREMENT;
        }

        let buffer = check_vk(device.create_buffer(new_size, SCRATCH_BUFFER_USAGE), "vkCreateBuffer(scratch)", verify)?;
        resources_to_destroy.push(frame, ResourceToDestroy::Buffer(self.buffer));

        dm_debug!("dmgraphics::vulkan", "Scratch buffer of frame {} grown to {} bytes", frame, new_size);
        self.buffer = buffer;
        self.size = new_size;
        self.cursor = 0;
        self.resize_count += 1;
        Ok(())
    }

    pub fn destroy<D: VulkanDevice>(&mut self, device: &D) {
        device.destroy_buffer(self.buffer);
        self.buffer = vk::Buffer::null();
        self.size = 0;
        self.cursor = 0;
    }
}

#[cfg(test)]
#[path = "vulkan_scratch_buffer_tests.rs"]
mod tests;
