/// Vertex, index and storage buffers
///
/// All three are host-visible, persistently mapped device buffers. Writes go
/// straight into the mapping; replacing the contents with a new size creates
/// a new buffer and defers the destruction of the old one.

use crate::vulkan_check::check_vk;
use crate::vulkan_device::VulkanDevice;
use crate::vulkan_resource_lifecycle::{ResourceState, ResourceToDestroy};
use ash::vk;
use dm_graphics::dmgraphics::render::BufferUsage;
use dm_graphics::dmgraphics::{Error, Result};

pub struct VulkanBuffer {
    pub buffer: vk::Buffer,
    /// Size requested by the caller; the native buffer is at least one byte
    pub size: usize,
    pub usage: BufferUsage,
    pub vk_usage: vk::BufferUsageFlags,
    pub state: ResourceState,
}

impl VulkanBuffer {
    pub fn new<D: VulkanDevice>(
        device: &D,
        size: usize,
        data: Option<&[u8]>,
        usage: BufferUsage,
        vk_usage: vk::BufferUsageFlags,
        verify: bool,
    ) -> Result<Self> {
        let buffer = check_vk(device.create_buffer(size.max(1) as u64, vk_usage), "vkCreateBuffer", verify)?;
        let created = Self {
            buffer,
            size,
            usage,
            vk_usage,
            state: ResourceState::default(),
        };

        if let Some(data) = data {
            let len = data.len().min(size);
            if let Err(e) = created.write(device, 0, &data[..len], verify) {
                device.destroy_buffer(buffer);
                return Err(e);
            }
        }
        Ok(created)
    }

    pub fn write<D: VulkanDevice>(&self, device: &D, offset: usize, data: &[u8], verify: bool) -> Result<()> {
        if offset + data.len() > self.size {
            return Err(Error::InvalidResource(format!(
                "Write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.size
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        check_vk(device.write_buffer(self.buffer, offset as u64, data), "write buffer", verify)
    }

    pub fn take_native_objects(&mut self) -> Vec<ResourceToDestroy> {
        if self.buffer == vk::Buffer::null() {
            return Vec::new();
        }
        vec![ResourceToDestroy::Buffer(std::mem::take(&mut self.buffer))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording_device::RecordingDevice;

    #[test]
    fn test_initial_data_is_clamped_to_size() {
        let device = RecordingDevice::new();
        let buffer = VulkanBuffer::new(
            &device,
            4,
            Some(&[1, 2, 3, 4, 5, 6]),
            BufferUsage::StaticDraw,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            false,
        )
        .unwrap();

        assert_eq!(device.buffer_data(buffer.buffer).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_write_out_of_bounds_is_rejected() {
        let device = RecordingDevice::new();
        let buffer =
            VulkanBuffer::new(&device, 8, None, BufferUsage::DynamicDraw, vk::BufferUsageFlags::INDEX_BUFFER, false)
                .unwrap();

        assert!(matches!(buffer.write(&device, 6, &[0; 4], false), Err(Error::InvalidResource(_))));
        buffer.write(&device, 4, &[9; 4], false).unwrap();
        assert_eq!(device.buffer_data(buffer.buffer).unwrap(), vec![0, 0, 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn test_empty_buffer_still_has_a_native_object() {
        let device = RecordingDevice::new();
        let mut buffer =
            VulkanBuffer::new(&device, 0, None, BufferUsage::StaticDraw, vk::BufferUsageFlags::VERTEX_BUFFER, false)
                .unwrap();

        assert_ne!(buffer.buffer, vk::Buffer::null());
        assert_eq!(buffer.take_native_objects().len(), 1);
        assert!(buffer.take_native_objects().is_empty());
    }
}
