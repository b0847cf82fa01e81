/// Per-frame descriptor set allocation
///
/// Sets are allocated from a chain of pools of `DESCRIPTOR_POOL_SIZE` sets.
/// When the current pool is exhausted the allocator moves on to the next
/// one, creating it on demand. `reset` resets every pool and rewinds to the
/// first; it is only called once the owning frame's fence has signaled.

use crate::vulkan_check::check_vk;
use crate::vulkan_device::VulkanDevice;
use ash::vk;
use dm_graphics::dm_debug;
use dm_graphics::dmgraphics::Result;

pub const DESCRIPTOR_POOL_SIZE: u32 = 512;

pub struct DescriptorAllocator {
    pools: Vec<vk::DescriptorPool>,
    current: usize,
    allocated: u32,
}

impl DescriptorAllocator {
    pub fn new<D: VulkanDevice>(device: &D, verify: bool) -> Result<Self> {
        let pool = check_vk(device.create_descriptor_pool(DESCRIPTOR_POOL_SIZE), "vkCreateDescriptorPool", verify)?;
        Ok(Self {
            pools: vec![pool],
            current: 0,
            allocated: 0,
        })
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Sets allocated since the last reset
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    pub fn allocate<D: VulkanDevice>(
        &mut self,
        device: &D,
        layout: vk::DescriptorSetLayout,
        verify: bool,
    ) -> Result<vk::DescriptorSet> {
        match device.allocate_descriptor_set(self.pools[self.current], layout) {
            Ok(set) => {
                self.allocated += 1;
                Ok(set)
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.advance(device, verify)?;
                let set = check_vk(
                    device.allocate_descriptor_set(self.pools[self.current], layout),
                    "vkAllocateDescriptorSets",
                    verify,
                )?;
                self.allocated += 1;
                Ok(set)
            }
            Err(e) => check_vk(Err(e), "vkAllocateDescriptorSets", verify),
        }
    }

    fn advance<D: VulkanDevice>(&mut self, device: &D, verify: bool) -> Result<()> {
        self.current += 1;
        if self.current == self.pools.len() {
            let pool = check_vk(device.create_descriptor_pool(DESCRIPTOR_POOL_SIZE), "vkCreateDescriptorPool", verify)?;
            self.pools.push(pool);
            dm_debug!("dmgraphics::vulkan", "Descriptor allocator grown to {} pools", self.pools.len());
        }
        Ok(())
    }

    pub fn reset<D: VulkanDevice>(&mut self, device: &D, verify: bool) -> Result<()> {
        for pool in &self.pools[..=self.current] {
            check_vk(device.reset_descriptor_pool(*pool), "vkResetDescriptorPool", verify)?;
        }
        self.current = 0;
        self.allocated = 0;
        Ok(())
    }

    pub fn destroy<D: VulkanDevice>(&mut self, device: &D) {
        for pool in self.pools.drain(..) {
            device.destroy_descriptor_pool(pool);
        }
        self.current = 0;
        self.allocated = 0;
    }
}

#[cfg(test)]
#[path = "vulkan_descriptor_allocator_tests.rs"]
mod tests;
