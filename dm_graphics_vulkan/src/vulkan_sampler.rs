/// SamplerCache - shared VkSampler objects
///
/// Samplers are created on first use per distinct filter / wrap /
/// anisotropy / lod combination and shared by every texture using the
/// same combination. They live until the context is torn down.

use crate::vulkan_check::check_vk;
use crate::vulkan_device::{SamplerDesc, VulkanDevice};
use crate::vulkan_format::{filter_uses_mipmaps, mag_filter_to_vk, min_filter_to_vk, wrap_to_vk};
use ash::vk;
use dm_graphics::dm_trace;
use dm_graphics::dmgraphics::render::{SamplerParams, TextureFilter, TextureWrap};
use dm_graphics::dmgraphics::Result;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SamplerKey {
    min_filter: TextureFilter,
    mag_filter: TextureFilter,
    u_wrap: TextureWrap,
    v_wrap: TextureWrap,
    max_anisotropy_bits: u32,
    mip_map_count: u8,
}

pub struct SamplerCache {
    samplers: FxHashMap<SamplerKey, vk::Sampler>,
    default_min_filter: TextureFilter,
    default_mag_filter: TextureFilter,
    max_anisotropy: f32,
}

/// Replace `TextureFilter::Default` by the context default
pub fn resolve_filter(filter: TextureFilter, default: TextureFilter) -> TextureFilter {
    match filter {
        TextureFilter::Default => match default {
            TextureFilter::Default => TextureFilter::Linear,
            other => other,
        },
        other => other,
    }
}

impl SamplerCache {
    pub fn new(default_min_filter: TextureFilter, default_mag_filter: TextureFilter, max_anisotropy: f32) -> Self {
        Self {
            samplers: FxHashMap::default(),
            default_min_filter,
            default_mag_filter,
            max_anisotropy,
        }
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    /// Sampler params with default filters resolved and anisotropy clamped
    pub fn resolve(&self, params: &SamplerParams) -> SamplerParams {
        SamplerParams {
            min_filter: resolve_filter(params.min_filter, self.default_min_filter),
            mag_filter: resolve_filter(params.mag_filter, self.default_mag_filter),
            max_anisotropy: params.max_anisotropy.clamp(1.0, self.max_anisotropy.max(1.0)),
            ..*params
        }
    }

    /// Get or create the sampler for `params` on a texture with `mip_map_count` levels
    pub fn get<D: VulkanDevice>(
        &mut self,
        device: &D,
        params: &SamplerParams,
        mip_map_count: u8,
        verify: bool,
    ) -> Result<vk::Sampler> {
        let params = self.resolve(params);
        let key = SamplerKey {
            min_filter: params.min_filter,
            mag_filter: params.mag_filter,
            u_wrap: params.u_wrap,
            v_wrap: params.v_wrap,
            max_anisotropy_bits: params.max_anisotropy.to_bits(),
            mip_map_count,
        };

        if let Some(&sampler) = self.samplers.get(&key) {
            return Ok(sampler);
        }

        let desc = Self::sampler_desc(&params, mip_map_count);
        let sampler = check_vk(device.create_sampler(&desc), "vkCreateSampler", verify)?;
        dm_trace!(
            "dmgraphics::vulkan",
            "Created sampler {:?}/{:?} wrap {:?}/{:?} ({} cached)",
            key.min_filter,
            key.mag_filter,
            key.u_wrap,
            key.v_wrap,
            self.samplers.len() + 1
        );
        self.samplers.insert(key, sampler);
        Ok(sampler)
    }

    fn sampler_desc(params: &SamplerParams, mip_map_count: u8) -> SamplerDesc {
        let (min_filter, mipmap_mode) = min_filter_to_vk(params.min_filter);
        let max_lod = if filter_uses_mipmaps(params.min_filter) {
            f32::from(mip_map_count.max(1))
        } else {
            0.25
        };
        SamplerDesc {
            mag_filter: mag_filter_to_vk(params.mag_filter),
            min_filter,
            mipmap_mode,
            address_u: wrap_to_vk(params.u_wrap),
            address_v: wrap_to_vk(params.v_wrap),
            max_anisotropy: params.max_anisotropy,
            max_lod,
        }
    }

    /// Destroy every cached sampler; the device must be idle
    pub fn destroy<D: VulkanDevice>(&mut self, device: &D) {
        for (_, sampler) in self.samplers.drain() {
            device.destroy_sampler(sampler);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_sampler_tests.rs"]
mod tests;
