/// Reflected shader resources
///
/// A `ShaderMeta` lists everything one shader stage consumes: uniform
/// buffers, storage buffers, textures/samplers, vertex inputs and the
/// struct layouts referenced by them. It is the only input of the
/// program binding resolution in `program_layout`.

use crate::utils::hash_name;
use bitflags::bitflags;

bitflags! {
    /// Shader stage visibility mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX   = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE  = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn flag(self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderLanguage {
    Glsl,
    GlslEs,
    Spirv,
    Wgsl,
    Hlsl,
}

/// Primitive shader types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Int,
    UInt,
    Float,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    UVec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
    Sampler2DArray,
    SamplerCube,
    Sampler3D,
    /// Separate sampler object, paired with a texture resource
    Sampler,
    Texture2D,
    Texture2DArray,
    TextureCube,
    Texture3D,
    Image2D,
    UImage2D,
    RenderPassInput,
}

impl ShaderType {
    /// Bare sampler (not a combined image sampler)
    pub fn is_sampler(self) -> bool {
        self == ShaderType::Sampler
    }

    /// Anything bound in the texture binding family
    pub fn is_texture(self) -> bool {
        matches!(
            self,
            ShaderType::Sampler2D
                | ShaderType::Sampler2DArray
                | ShaderType::SamplerCube
                | ShaderType::Sampler3D
                | ShaderType::Sampler
                | ShaderType::Texture2D
                | ShaderType::Texture2DArray
                | ShaderType::TextureCube
                | ShaderType::Texture3D
                | ShaderType::Image2D
                | ShaderType::UImage2D
                | ShaderType::RenderPassInput
        )
    }

    /// Combined image sampler
    pub fn is_combined_sampler(self) -> bool {
        matches!(
            self,
            ShaderType::Sampler2D | ShaderType::Sampler2DArray | ShaderType::SamplerCube | ShaderType::Sampler3D
        )
    }

    pub fn is_storage_image(self) -> bool {
        matches!(self, ShaderType::Image2D | ShaderType::UImage2D)
    }

    /// Size of one element inside a uniform block (std140 base sizes)
    pub fn size(self) -> u32 {
        match self {
            ShaderType::Int | ShaderType::UInt | ShaderType::Float => 4,
            ShaderType::Vec2 | ShaderType::IVec2 => 8,
            ShaderType::Vec3 | ShaderType::IVec3 => 12,
            ShaderType::Vec4 | ShaderType::IVec4 | ShaderType::UVec4 => 16,
            ShaderType::Mat2 => 16,
            ShaderType::Mat3 => 48,
            ShaderType::Mat4 => 64,
            _ => 0,
        }
    }
}

/// Type of a resource or struct member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Primitive shader type
    Shader(ShaderType),
    /// Index into `ShaderMeta::type_infos`
    TypeIndex(u32),
}

impl ResourceType {
    pub fn shader_type(self) -> Option<ShaderType> {
        match self {
            ResourceType::Shader(ty) => Some(ty),
            ResourceType::TypeIndex(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderResourceMember {
    pub name: String,
    pub name_hash: u64,
    pub ty: ResourceType,
    pub element_count: u32,
    /// Byte offset inside the enclosing block
    pub offset: u32,
}

impl ShaderResourceMember {
    pub fn new(name: &str, ty: ResourceType, element_count: u32, offset: u32) -> Self {
        Self {
            name: name.to_string(),
            name_hash: hash_name(name),
            ty,
            element_count,
            offset,
        }
    }
}

/// Struct layout referenced by `ResourceType::TypeIndex`
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderResourceTypeInfo {
    pub name: String,
    pub name_hash: u64,
    pub members: Vec<ShaderResourceMember>,
}

impl ShaderResourceTypeInfo {
    pub fn new(name: &str, members: Vec<ShaderResourceMember>) -> Self {
        Self {
            name: name.to_string(),
            name_hash: hash_name(name),
            members,
        }
    }
}

/// Category a binding is resolved and bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingFamily {
    UniformBuffer,
    StorageBuffer,
    Texture,
    Generic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderResourceBinding {
    pub name: String,
    pub name_hash: u64,
    pub instance_name: Option<String>,
    pub instance_name_hash: Option<u64>,
    pub ty: ResourceType,
    pub set: u16,
    pub binding: u16,
    /// Size of the block in bytes (uniform and storage buffers)
    pub block_size: u32,
    pub element_count: u32,
    pub stage_flags: ShaderStageFlags,
    pub binding_family: BindingFamily,
    /// For bare samplers: index of the sampled texture in `ShaderMeta::textures`
    pub sampler_texture_index: Option<u16>,
}

impl ShaderResourceBinding {
    fn new(name: &str, ty: ResourceType, set: u16, binding: u16, family: BindingFamily) -> Self {
        Self {
            name: name.to_string(),
            name_hash: hash_name(name),
            instance_name: None,
            instance_name_hash: None,
            ty,
            set,
            binding,
            block_size: 0,
            element_count: 1,
            stage_flags: ShaderStageFlags::empty(),
            binding_family: family,
            sampler_texture_index: None,
        }
    }

    pub fn uniform_buffer(name: &str, type_index: u32, set: u16, binding: u16, block_size: u32) -> Self {
        let mut res = Self::new(name, ResourceType::TypeIndex(type_index), set, binding, BindingFamily::UniformBuffer);
        res.block_size = block_size;
        res
    }

    pub fn storage_buffer(name: &str, type_index: u32, set: u16, binding: u16, block_size: u32) -> Self {
        let mut res = Self::new(name, ResourceType::TypeIndex(type_index), set, binding, BindingFamily::StorageBuffer);
        res.block_size = block_size;
        res
    }

    pub fn texture(name: &str, ty: ShaderType, set: u16, binding: u16) -> Self {
        Self::new(name, ResourceType::Shader(ty), set, binding, BindingFamily::Texture)
    }

    /// Bare sampler sampling `ShaderMeta::textures[texture_index]`
    pub fn sampler(name: &str, set: u16, binding: u16, texture_index: u16) -> Self {
        let mut res = Self::new(name, ResourceType::Shader(ShaderType::Sampler), set, binding, BindingFamily::Texture);
        res.sampler_texture_index = Some(texture_index);
        res
    }

    /// Vertex input at `location`
    pub fn input(name: &str, ty: ShaderType, location: u16) -> Self {
        Self::new(name, ResourceType::Shader(ty), 0, location, BindingFamily::Generic)
    }

    pub fn with_instance_name(mut self, instance_name: &str) -> Self {
        self.instance_name_hash = Some(hash_name(instance_name));
        self.instance_name = Some(instance_name.to_string());
        self
    }

    pub fn with_stage_flags(mut self, stage_flags: ShaderStageFlags) -> Self {
        self.stage_flags = stage_flags;
        self
    }

    pub fn is_bare_sampler(&self) -> bool {
        self.ty.shader_type().is_some_and(ShaderType::is_sampler)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderMeta {
    pub uniform_buffers: Vec<ShaderResourceBinding>,
    pub storage_buffers: Vec<ShaderResourceBinding>,
    pub textures: Vec<ShaderResourceBinding>,
    pub inputs: Vec<ShaderResourceBinding>,
    pub type_infos: Vec<ShaderResourceTypeInfo>,
}

impl ShaderMeta {
    /// Per-stage resource counts checked against device limits
    pub fn resource_counts(&self) -> StageResourceCounts {
        StageResourceCounts {
            uniform_buffers: self.uniform_buffers.len() as u32,
            storage_buffers: self.storage_buffers.len() as u32,
            samplers: self
                .textures
                .iter()
                .filter(|t| t.ty.shader_type().is_some_and(|ty| !ty.is_storage_image()))
                .count() as u32,
            storage_images: self
                .textures
                .iter()
                .filter(|t| t.ty.shader_type().is_some_and(ShaderType::is_storage_image))
                .count() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageResourceCounts {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub samplers: u32,
    pub storage_images: u32,
}

/// One source variant of a stage (a stage may ship several languages)
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    pub language: ShaderLanguage,
    pub source: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderStageDesc {
    pub stage: ShaderStage,
    pub sources: Vec<ShaderSource>,
    /// Reflection section; when absent an adapter may reflect the source itself
    pub meta: Option<ShaderMeta>,
}

impl ShaderStageDesc {
    pub fn source(&self, language: ShaderLanguage) -> Option<&ShaderSource> {
        self.sources.iter().find(|s| s.language == language)
    }
}

/// Serialized shader description of one program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderDesc {
    pub stages: Vec<ShaderStageDesc>,
}

impl ShaderDesc {
    pub fn stage(&self, stage: ShaderStage) -> Option<&ShaderStageDesc> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn is_compute(&self) -> bool {
        self.stage(ShaderStage::Compute).is_some()
    }
}
