/// SPIR-V reflection into `ShaderMeta`
///
/// Used for stages that ship without a reflection section. Uniform blocks
/// become type infos, vertex inputs are read from the entry point
/// interface. A separate sampler named `<texture>_separated` is paired with
/// the texture `<texture>` it samples.

use dm_graphics::dmgraphics::shader::{
    ResourceType, ShaderMeta, ShaderResourceBinding, ShaderResourceMember, ShaderResourceTypeInfo, ShaderStage,
    ShaderType,
};
use dm_graphics::dmgraphics::Result;
use crate::vulkan_program::SPIRV_MAGIC;
use dm_graphics::{dm_bail, dm_err, dm_warn};
use spirq::ty::{DescriptorType, ScalarType, Type};
use spirq::var::Variable;

pub const SEPARATED_SAMPLER_SUFFIX: &str = "_separated";

/// Magic, version, generator, id bound, schema
pub const SPIRV_HEADER_WORDS: usize = 5;

/// Reject modules whose header cannot be read
pub fn check_spirv_header(code: &[u32]) -> Result<()> {
    if code.len() < SPIRV_HEADER_WORDS {
        dm_bail!(
            "dmgraphics::vulkan",
            "SPIR-V module has {} words, shorter than its {} word header",
            code.len(),
            SPIRV_HEADER_WORDS
        );
    }
    if code[0] != SPIRV_MAGIC {
        dm_bail!("dmgraphics::vulkan", "Invalid SPIR-V magic number {:#010x}", code[0]);
    }
    if code[1] == 0 || code[3] == 0 {
        dm_bail!(
            "dmgraphics::vulkan",
            "SPIR-V header has version {:#010x} and id bound {}",
            code[1],
            code[3]
        );
    }
    Ok(())
}

/// Reflect the resources of `code` used by `stage`
pub fn reflect_spirv(code: &[u32], stage: ShaderStage) -> Result<ShaderMeta> {
    check_spirv_header(code)?;
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| dm_err!("dmgraphics::vulkan", "SPIR-V reflection failed: {:?}", e))?;

    let mut meta = ShaderMeta::default();
    let mut samplers: Vec<(String, u16, u16)> = Vec::new();

    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            match var {
                Variable::Descriptor { name, desc_bind, desc_ty, ty, .. } => {
                    let name = name.clone().unwrap_or_default();
                    let (set, binding) = (desc_bind.set() as u16, desc_bind.bind() as u16);
                    match desc_ty {
                        DescriptorType::UniformBuffer() => {
                            let type_index = push_type_info(&mut meta, &name, ty);
                            let size = ty.nbyte().unwrap_or(0) as u32;
                            meta.uniform_buffers
                                .push(ShaderResourceBinding::uniform_buffer(&name, type_index, set, binding, size));
                        }
                        DescriptorType::StorageBuffer(..) => {
                            let type_index = push_type_info(&mut meta, &name, ty);
                            let size = ty.nbyte().unwrap_or(0) as u32;
                            meta.storage_buffers
                                .push(ShaderResourceBinding::storage_buffer(&name, type_index, set, binding, size));
                        }
                        DescriptorType::CombinedImageSampler() => {
                            let shader_type = image_shader_type(ty, true);
                            meta.textures.push(ShaderResourceBinding::texture(&name, shader_type, set, binding));
                        }
                        DescriptorType::SampledImage() => {
                            let shader_type = image_shader_type(ty, false);
                            meta.textures.push(ShaderResourceBinding::texture(&name, shader_type, set, binding));
                        }
                        DescriptorType::StorageImage(..) => {
                            meta.textures.push(ShaderResourceBinding::texture(&name, ShaderType::Image2D, set, binding));
                        }
                        DescriptorType::Sampler() => samplers.push((name, set, binding)),
                        DescriptorType::InputAttachment(..) => {
                            meta.textures
                                .push(ShaderResourceBinding::texture(&name, ShaderType::RenderPassInput, set, binding));
                        }
                        other => {
                            dm_bail!("dmgraphics::vulkan", "Unsupported SPIR-V descriptor type {:?} for '{}'", other, name);
                        }
                    }
                }
                Variable::Input { name, location, ty } if stage == ShaderStage::Vertex => {
                    let name = name.clone().unwrap_or_default();
                    let Some(shader_type) = member_shader_type(ty) else {
                        dm_warn!("dmgraphics::vulkan", "Skipping vertex input '{}' of unsupported type", name);
                        continue;
                    };
                    meta.inputs.push(ShaderResourceBinding::input(&name, shader_type, location.loc() as u16));
                }
                _ => {}
            }
        }
    }

    // Samplers go last so their texture indices are final
    for (name, set, binding) in samplers {
        let texture_name = name.strip_suffix(SEPARATED_SAMPLER_SUFFIX).unwrap_or(&name);
        let Some(texture_index) = meta.textures.iter().position(|t| t.name == texture_name) else {
            dm_bail!("dmgraphics::vulkan", "Sampler '{}' has no texture named '{}'", name, texture_name);
        };
        meta.textures.push(ShaderResourceBinding::sampler(&name, set, binding, texture_index as u16));
    }

    meta.inputs.sort_by_key(|input| input.binding);
    Ok(meta)
}

fn push_type_info(meta: &mut ShaderMeta, block_name: &str, ty: &Type) -> u32 {
    let members = match ty {
        Type::Struct(st) => st
            .members
            .iter()
            .filter_map(|m| {
                let name = m.name.clone().unwrap_or_default();
                let offset = m.offset.unwrap_or(0) as u32;
                match &m.ty {
                    Type::Array(a) => {
                        let element_type = member_shader_type(&a.element_ty)?;
                        let count = a.nelement.unwrap_or(1);
                        Some(ShaderResourceMember::new(&name, ResourceType::Shader(element_type), count, offset))
                    }
                    other => {
                        let shader_type = member_shader_type(other)?;
                        Some(ShaderResourceMember::new(&name, ResourceType::Shader(shader_type), 1, offset))
                    }
                }
            })
            .collect(),
        _ => Vec::new(),
    };
    meta.type_infos.push(ShaderResourceTypeInfo::new(block_name, members));
    (meta.type_infos.len() - 1) as u32
}

/// Primitive type of a block member or vertex input
fn member_shader_type(ty: &Type) -> Option<ShaderType> {
    match ty {
        Type::Scalar(ScalarType::Float { .. }) => Some(ShaderType::Float),
        Type::Scalar(ScalarType::Integer { is_signed: true, .. }) => Some(ShaderType::Int),
        Type::Scalar(ScalarType::Integer { is_signed: false, .. }) => Some(ShaderType::UInt),
        Type::Vector(v) => match (&v.scalar_ty, v.nscalar) {
            (ScalarType::Float { .. }, 2) => Some(ShaderType::Vec2),
            (ScalarType::Float { .. }, 3) => Some(ShaderType::Vec3),
            (ScalarType::Float { .. }, 4) => Some(ShaderType::Vec4),
            (ScalarType::Integer { is_signed: true, .. }, 2) => Some(ShaderType::IVec2),
            (ScalarType::Integer { is_signed: true, .. }, 3) => Some(ShaderType::IVec3),
            (ScalarType::Integer { is_signed: true, .. }, 4) => Some(ShaderType::IVec4),
            (ScalarType::Integer { is_signed: false, .. }, 4) => Some(ShaderType::UVec4),
            _ => None,
        },
        Type::Matrix(m) => match m.nvector {
            2 => Some(ShaderType::Mat2),
            3 => Some(ShaderType::Mat3),
            4 => Some(ShaderType::Mat4),
            _ => None,
        },
        _ => None,
    }
}

/// Texture type from the image dimensionality in the reflected type
///
/// The dimension is read from the type's debug form (`Dim2D`, `DimCube`,
/// `Dim3D` and the `is_array` flag), which is stable across the image
/// type variants.
fn image_shader_type(ty: &Type, combined: bool) -> ShaderType {
    let debug = format!("{:?}", ty);
    let is_array = debug.contains("is_array: true");
    match (combined, debug.contains("DimCube"), debug.contains("Dim3D"), is_array) {
        (true, true, _, _) => ShaderType::SamplerCube,
        (true, _, true, _) => ShaderType::Sampler3D,
        (true, _, _, true) => ShaderType::Sampler2DArray,
        (true, _, _, _) => ShaderType::Sampler2D,
        (false, true, _, _) => ShaderType::TextureCube,
        (false, _, true, _) => ShaderType::Texture3D,
        (false, _, _, true) => ShaderType::Texture2DArray,
        (false, _, _, _) => ShaderType::Texture2D,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_code_fails_reflection() {
        assert!(reflect_spirv(&[0x0723_0203, 0x0001_0000], ShaderStage::Vertex).is_err());
    }

    #[test]
    fn test_header_check() {
        assert!(check_spirv_header(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]).is_ok());
        assert!(check_spirv_header(&[SPIRV_MAGIC, 0x0001_0000, 0, 1]).is_err());
        assert!(check_spirv_header(&[0x0203_0723, 0x0001_0000, 0, 1, 0]).is_err());
        assert!(check_spirv_header(&[SPIRV_MAGIC, 0, 0, 1, 0]).is_err());
        assert!(check_spirv_header(&[SPIRV_MAGIC, 0x0001_0000, 0, 0, 0]).is_err());
    }
}
