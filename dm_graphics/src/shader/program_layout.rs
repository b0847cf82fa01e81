/// Program resource binding resolution
///
/// Turns the reflected resources of every stage of a program into one
/// dense `[set][binding]` table, assigns texture and storage-buffer units,
/// places uniform buffers in a flat CPU-side data blob and computes the
/// alignment-padded size the GPU-side scratch placement needs.
///
/// Resolution runs per stage, category by category (uniform buffers, then
/// storage buffers, then textures). A (set, binding) seen again from a
/// later stage is not registered twice; its stage flags are merged.
/// Bare samplers get their texture unit in a second pass, once every
/// texture of the stage has a unit.

use super::shader_meta::{
    BindingFamily, ShaderMeta, ShaderResourceBinding, ShaderResourceTypeInfo, ShaderStageFlags,
};
use crate::error::{Error, Result};
use crate::utils::hash_name;

pub const MAX_SET_COUNT: usize = 4;
pub const MAX_BINDINGS_PER_SET_COUNT: usize = 32;

/// Resolved slot of a binding, by binding family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSlot {
    UniformBuffer {
        /// Offset into the program's flat uniform data
        data_offset: u32,
        /// Position in the dynamic offset array at bind time
        dynamic_offset_index: u16,
    },
    StorageBuffer { unit: u16 },
    Texture { unit: u16 },
    /// Bare sampler; the unit of the texture it samples, once resolved
    Sampler { texture_unit: Option<u16> },
    Generic,
}

impl BindingSlot {
    /// Texture unit for textures and resolved samplers
    pub fn texture_unit(&self) -> Option<u16> {
        match *self {
            BindingSlot::Texture { unit } => Some(unit),
            BindingSlot::Sampler { texture_unit } => texture_unit,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramResourceBinding {
    pub resource: ShaderResourceBinding,
    /// Struct layout of uniform / storage blocks
    pub type_info: Option<ShaderResourceTypeInfo>,
    pub stage_flags: ShaderStageFlags,
    pub slot: BindingSlot,
}

/// Running totals of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramResourceBindingsInfo {
    pub uniform_data_size: u32,
    pub uniform_data_size_aligned: u32,
    pub uniform_buffer_count: u32,
    pub storage_buffer_count: u32,
    pub texture_count: u32,
    pub sampler_count: u32,
    pub total_uniform_count: u32,
    pub max_set: u32,
    pub max_binding: u32,
}

pub type BindingTable = [[Option<ProgramResourceBinding>; MAX_BINDINGS_PER_SET_COUNT]; MAX_SET_COUNT];

pub fn empty_binding_table() -> Box<BindingTable> {
    Box::new(std::array::from_fn(|_| std::array::from_fn(|_| None)))
}

pub fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// First resolution pass over one category of one stage's resources
pub fn fill_program_resource_bindings(
    stage: ShaderStageFlags,
    resources: &[ShaderResourceBinding],
    type_infos: &[ShaderResourceTypeInfo],
    bindings: &mut BindingTable,
    uniform_buffer_alignment: u32,
    info: &mut ProgramResourceBindingsInfo,
) -> Result<()> {
    for res in resources {
        let (set, binding) = (res.set as usize, res.binding as usize);
        if set >= MAX_SET_COUNT || binding >= MAX_BINDINGS_PER_SET_COUNT {
            return Err(Error::ShaderCompilation(format!(
                "Resource '{}' uses set {} binding {}, limits are {} sets and {} bindings per set",
                res.name, set, binding, MAX_SET_COUNT, MAX_BINDINGS_PER_SET_COUNT
            )));
        }

        let entry = &mut bindings[set][binding];
        if let Some(existing) = entry.as_mut() {
            existing.stage_flags |= stage;
            continue;
        }

        let type_info = match res.ty {
            super::ResourceType::TypeIndex(index) => type_infos.get(index as usize).cloned(),
            super::ResourceType::Shader(_) => None,
        };

        let slot = match res.binding_family {
            BindingFamily::Texture => {
                if res.is_bare_sampler() {
                    info.sampler_count += 1;
                    BindingSlot::Sampler { texture_unit: None }
                } else {
                    let unit = info.texture_count as u16;
                    info.texture_count += 1;
                    BindingSlot::Texture { unit }
                }
            }
            BindingFamily::StorageBuffer => {
                let unit = info.storage_buffer_count as u16;
                info.storage_buffer_count += 1;
                BindingSlot::StorageBuffer { unit }
            }
            BindingFamily::UniformBuffer => {
                let data_offset = info.uniform_data_size;
                let dynamic_offset_index = info.uniform_buffer_count as u16;
                info.uniform_buffer_count += 1;
                info.uniform_data_size += res.block_size;
                info.uniform_data_size_aligned += align_up(res.block_size, uniform_buffer_alignment);
                info.total_uniform_count += type_info.as_ref().map_or(0, |t| t.members.len() as u32);
                BindingSlot::UniformBuffer { data_offset, dynamic_offset_index }
            }
            BindingFamily::Generic => BindingSlot::Generic,
        };

        *entry = Some(ProgramResourceBinding {
            resource: res.clone(),
            type_info,
            stage_flags: stage,
            slot,
        });

        info.max_set = info.max_set.max(set as u32 + 1);
        info.max_binding = info.max_binding.max(binding as u32 + 1);
    }
    Ok(())
}

/// Second pass: copy each bare sampler's texture unit from its paired texture
pub fn resolve_sampler_texture_units(bindings: &mut BindingTable, textures: &[ShaderResourceBinding]) {
    for sampler in textures.iter().filter(|t| t.is_bare_sampler()) {
        let Some(texture_index) = sampler.sampler_texture_index else {
            continue;
        };
        let unit = textures.get(texture_index as usize).and_then(|texture| {
            bindings
                .get(texture.set as usize)
                .and_then(|set| set.get(texture.binding as usize))
                .and_then(|b| b.as_ref())
                .and_then(|b| b.slot.texture_unit())
        });

        let target = bindings
            .get_mut(sampler.set as usize)
            .and_then(|set| set.get_mut(sampler.binding as usize))
            .and_then(|b| b.as_mut());
        if let Some(binding) = target {
            if let BindingSlot::Sampler { texture_unit } = &mut binding.slot {
                *texture_unit = unit;
            }
        }
    }
}

/// Location of a uniform: a whole block/texture or one member of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub set: u16,
    pub binding: u16,
    pub member: Option<u16>,
}

/// Fully resolved binding layout of a program
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramLayout {
    bindings: Box<BindingTable>,
    info: ProgramResourceBindingsInfo,
    stage_flags: ShaderStageFlags,
    uniform_data: Vec<u8>,
    inputs: Vec<ShaderResourceBinding>,
}

impl ProgramLayout {
    /// Resolve the bindings of all stages
    ///
    /// Stages are processed in the given order; pass vertex then fragment,
    /// or compute alone.
    pub fn new(stages: &[(ShaderStageFlags, &ShaderMeta)], uniform_buffer_alignment: u32) -> Result<Self> {
        let mut bindings = empty_binding_table();
        let mut info = ProgramResourceBindingsInfo::default();
        let mut stage_flags = ShaderStageFlags::empty();

        for (stage, meta) in stages {
            stage_flags |= *stage;
            fill_program_resource_bindings(*stage, &meta.uniform_buffers, &meta.type_infos, &mut bindings, uniform_buffer_alignment, &mut info)?;
            fill_program_resource_bindings(*stage, &meta.storage_buffers, &meta.type_infos, &mut bindings, uniform_buffer_alignment, &mut info)?;
            fill_program_resource_bindings(*stage, &meta.textures, &meta.type_infos, &mut bindings, uniform_buffer_alignment, &mut info)?;
        }

        for (_, meta) in stages {
            resolve_sampler_texture_units(&mut bindings, &meta.textures);
        }

        let inputs = stages
            .iter()
            .find(|(stage, _)| stage.contains(ShaderStageFlags::VERTEX))
            .map(|(_, meta)| meta.inputs.clone())
            .unwrap_or_default();

        Ok(Self {
            bindings,
            uniform_data: vec![0; info.uniform_data_size as usize],
            info,
            stage_flags,
            inputs,
        })
    }

    pub fn info(&self) -> &ProgramResourceBindingsInfo {
        &self.info
    }

    pub fn stage_flags(&self) -> ShaderStageFlags {
        self.stage_flags
    }

    pub fn binding(&self, set: usize, binding: usize) -> Option<&ProgramResourceBinding> {
        self.bindings.get(set)?.get(binding)?.as_ref()
    }

    /// All bindings of one set, in binding order
    pub fn set_bindings(&self, set: usize) -> impl Iterator<Item = &ProgramResourceBinding> {
        self.bindings
            .get(set)
            .into_iter()
            .flat_map(|s| s.iter())
            .take(self.info.max_binding as usize)
            .filter_map(|b| b.as_ref())
    }

    /// All bindings in (set, binding) order
    pub fn iter(&self) -> impl Iterator<Item = &ProgramResourceBinding> {
        (0..self.info.max_set as usize).flat_map(move |set| self.set_bindings(set))
    }

    pub fn vertex_inputs(&self) -> &[ShaderResourceBinding] {
        &self.inputs
    }

    /// Tightly packed uniform data of all uniform buffers
    pub fn uniform_data(&self) -> &[u8] {
        &self.uniform_data
    }

    /// Slice of the uniform data belonging to one uniform buffer binding
    pub fn uniform_block_data(&self, binding: &ProgramResourceBinding) -> Option<&[u8]> {
        match binding.slot {
            BindingSlot::UniformBuffer { data_offset, .. } => {
                let start = data_offset as usize;
                self.uniform_data.get(start..start + binding.resource.block_size as usize)
            }
            _ => None,
        }
    }

    /// Look up a uniform block, one of its members, or a texture by name
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        let name_hash = hash_name(name);
        for binding in self.iter() {
            let res = &binding.resource;
            let location = UniformLocation { set: res.set, binding: res.binding, member: None };
            if res.name_hash == name_hash || res.instance_name_hash == Some(name_hash) {
                return Some(location);
            }
            if res.binding_family != BindingFamily::UniformBuffer {
                continue;
            }
            if let Some(type_info) = &binding.type_info {
                if let Some(index) = type_info.members.iter().position(|m| m.name_hash == name_hash) {
                    return Some(UniformLocation { member: Some(index as u16), ..location });
                }
            }
        }
        None
    }

    /// Write raw bytes at a uniform location
    pub fn set_constant(&mut self, location: UniformLocation, data: &[u8]) -> Result<()> {
        let binding = self
            .binding(location.set as usize, location.binding as usize)
            .ok_or_else(|| Error::InvalidResource(format!("No binding at set {} binding {}", location.set, location.binding)))?;

        let BindingSlot::UniformBuffer { data_offset, .. } = binding.slot else {
            return Err(Error::InvalidResource(format!("'{}' is not a uniform buffer", binding.resource.name)));
        };

        let block_size = binding.resource.block_size;
        let member_offset = match (location.member, &binding.type_info) {
            (Some(index), Some(type_info)) => type_info
                .members
                .get(index as usize)
                .map(|m| m.offset)
                .ok_or_else(|| Error::InvalidResource(format!("Member {} out of range in '{}'", index, binding.resource.name)))?,
            (Some(_), None) => {
                return Err(Error::InvalidResource(format!("'{}' has no member layout", binding.resource.name)));
            }
            (None, _) => 0,
        };

        if member_offset as usize + data.len() > block_size as usize {
            return Err(Error::InvalidResource(format!(
                "Constant write of {} bytes at offset {} overflows '{}' ({} bytes)",
                data.len(),
                member_offset,
                binding.resource.name,
                block_size
            )));
        }

        let start = (data_offset + member_offset) as usize;
        self.uniform_data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
#[path = "program_layout_tests.rs"]
mod tests;
