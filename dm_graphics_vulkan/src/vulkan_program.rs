/// VulkanProgram - shader modules, descriptor set layouts and pipeline layout
///
/// A program is built from a `ShaderDesc` in three steps: the SPIR-V of
/// every stage is validated and reflected (unless the stage carries its own
/// reflection section), the per-stage resource counts are checked against
/// the device limits, and the merged `ProgramLayout` is turned into one
/// descriptor set layout per set. Compute programs also get their pipeline
/// here; graphics pipelines depend on render state and are cached by the
/// context.

use crate::vulkan_check::check_vk;
use crate::vulkan_device::{DescriptorBinding, DeviceLimits, VulkanDevice};
use crate::vulkan_reflect::{check_spirv_header, reflect_spirv};
use crate::vulkan_resource_lifecycle::{ResourceState, ResourceToDestroy};
use ash::vk;
use dm_graphics::dmgraphics::shader::{
    BindingFamily, ProgramLayout, ProgramResourceBinding, ShaderDesc, ShaderLanguage, ShaderMeta, ShaderStage,
    ShaderStageFlags, ShaderType,
};
use dm_graphics::dmgraphics::{Error, Result};
use dm_graphics::{dm_bail, dm_debug};

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

pub struct VulkanProgram {
    pub layout: ProgramLayout,
    pub stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub pipeline_layout: vk::PipelineLayout,
    pub compute_pipeline: Option<vk::Pipeline>,
    /// Unique per build of the program; part of pipeline keys
    pub hash: u64,
    pub state: ResourceState,
}

/// SPIR-V words of a stage source
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() < 4 || bytes.len() % 4 != 0 {
        dm_bail!("dmgraphics::vulkan", "SPIR-V size {} is not a non-zero multiple of 4", bytes.len());
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    check_spirv_header(&words)?;
    Ok(words)
}

pub fn stage_to_vk(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

pub fn stage_flags_to_vk(flags: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut vk_flags = vk::ShaderStageFlags::empty();
    if flags.contains(ShaderStageFlags::VERTEX) {
        vk_flags |= vk::ShaderStageFlags::VERTEX;
    }
    if flags.contains(ShaderStageFlags::FRAGMENT) {
        vk_flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if flags.contains(ShaderStageFlags::COMPUTE) {
        vk_flags |= vk::ShaderStageFlags::COMPUTE;
    }
    vk_flags
}

/// Descriptor type a resolved binding is written as
pub fn descriptor_type(binding: &ProgramResourceBinding) -> Option<vk::DescriptorType> {
    match binding.resource.binding_family {
        BindingFamily::UniformBuffer => Some(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC),
        BindingFamily::StorageBuffer => Some(vk::DescriptorType::STORAGE_BUFFER),
        BindingFamily::Texture => {
            let ty = binding.resource.ty.shader_type()?;
            Some(match ty {
                ShaderType::Sampler => vk::DescriptorType::SAMPLER,
                ShaderType::Image2D | ShaderType::UImage2D => vk::DescriptorType::STORAGE_IMAGE,
                ShaderType::RenderPassInput => vk::DescriptorType::INPUT_ATTACHMENT,
                ShaderType::Texture2D | ShaderType::Texture2DArray | ShaderType::TextureCube | ShaderType::Texture3D => {
                    vk::DescriptorType::SAMPLED_IMAGE
                }
                _ => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            })
        }
        BindingFamily::Generic => None,
    }
}

/// Reject a stage that uses more resources than the device allows per stage
pub fn validate_stage_limits(stage: ShaderStage, meta: &ShaderMeta, limits: &DeviceLimits) -> Result<()> {
    let counts = meta.resource_counts();
    let checks = [
        ("uniform buffers", counts.uniform_buffers, limits.max_per_stage_uniform_buffers),
        ("storage buffers", counts.storage_buffers, limits.max_per_stage_storage_buffers),
        ("samplers", counts.samplers, limits.max_per_stage_samplers),
        ("storage images", counts.storage_images, limits.max_per_stage_storage_images),
    ];
    for (what, count, max) in checks {
        if count > max {
            return Err(Error::ShaderCompilation(format!(
                "{:?} stage uses {} {}, the device allows {} per stage",
                stage, count, what, max
            )));
        }
    }
    Ok(())
}

/// Stage order of a program: vertex then fragment, or compute alone
fn stage_order(desc: &ShaderDesc) -> Result<&'static [ShaderStage]> {
    if desc.is_compute() {
        if desc.stages.len() != 1 {
            return Err(Error::ShaderCompilation("A compute program cannot carry graphics stages".to_string()));
        }
        Ok(&[ShaderStage::Compute])
    } else {
        Ok(&[ShaderStage::Vertex, ShaderStage::Fragment])
    }
}

/// SPIR-V words and reflection of every stage, in stage order
pub fn load_stages(desc: &ShaderDesc, limits: &DeviceLimits) -> Result<Vec<(ShaderStage, Vec<u32>, ShaderMeta)>> {
    let mut stages = Vec::with_capacity(2);
    for &stage in stage_order(desc)? {
        let stage_desc = desc
            .stage(stage)
            .ok_or_else(|| Error::ShaderCompilation(format!("Program has no {:?} stage", stage)))?;
        let source = stage_desc
            .source(ShaderLanguage::Spirv)
            .ok_or_else(|| Error::ShaderCompilation(format!("{:?} stage has no SPIR-V source", stage)))?;
        let words = spirv_words(&source.source).map_err(|e| Error::ShaderCompilation(format!("{:?} stage: {}", stage, e)))?;
        let meta = match &stage_desc.meta {
            Some(meta) => meta.clone(),
            None => reflect_spirv(&words, stage)
                .map_err(|e| Error::ShaderCompilation(format!("{:?} stage: {}", stage, e)))?,
        };
        validate_stage_limits(stage, &meta, limits)?;
        stages.push((stage, words, meta));
    }
    Ok(stages)
}

impl VulkanProgram {
    pub fn new<D: VulkanDevice>(device: &D, desc: &ShaderDesc, hash: u64, verify: bool) -> Result<Self> {
        let limits = device.limits();
        let stages = load_stages(desc, &limits)?;

        let metas: Vec<(ShaderStageFlags, &ShaderMeta)> =
            stages.iter().map(|(stage, _, meta)| (stage.flag(), meta)).collect();
        let layout = ProgramLayout::new(&metas, limits.min_uniform_buffer_offset_alignment)?;

        let mut program = Self {
            layout,
            stages: Vec::with_capacity(stages.len()),
            set_layouts: Vec::new(),
            pipeline_layout: vk::PipelineLayout::null(),
            compute_pipeline: None,
            hash,
            state: ResourceState::default(),
        };

        if let Err(e) = program.create_native_objects(device, &stages, verify) {
            for resource in program.take_native_objects() {
                resource.destroy(device);
            }
            return Err(e);
        }

        dm_debug!(
            "dmgraphics::vulkan",
            "Created program {:#x}: {} set(s), {} uniform buffer(s), {} texture(s)",
            hash,
            program.set_layouts.len(),
            program.layout.info().uniform_buffer_count,
            program.layout.info().texture_count
        );
        Ok(program)
    }

    fn create_native_objects<D: VulkanDevice>(
        &mut self,
        device: &D,
        stages: &[(ShaderStage, Vec<u32>, ShaderMeta)],
        verify: bool,
    ) -> Result<()> {
        for (stage, words, _) in stages {
            let module = check_vk(device.create_shader_module(words), "vkCreateShaderModule", verify)
                .map_err(|e| Error::ShaderCompilation(format!("{:?} stage: {}", stage, e)))?;
            self.stages.push((stage_to_vk(*stage), module));
        }

        for set in 0..self.layout.info().max_set as usize {
            let bindings: Vec<DescriptorBinding> = self
                .layout
                .set_bindings(set)
                .filter_map(|binding| {
                    Some(DescriptorBinding {
                        binding: u32::from(binding.resource.binding),
                        descriptor_type: descriptor_type(binding)?,
                        stage_flags: stage_flags_to_vk(binding.stage_flags),
                    })
                })
                .collect();
            let set_layout = check_vk(
                device.create_descriptor_set_layout(&bindings),
                "vkCreateDescriptorSetLayout",
                verify,
            )?;
            self.set_layouts.push(set_layout);
        }

        self.pipeline_layout = check_vk(device.create_pipeline_layout(&self.set_layouts), "vkCreatePipelineLayout", verify)?;

        // Compute programs have exactly one stage
        if let [(stage, module)] = self.stages.as_slice() {
            if *stage == vk::ShaderStageFlags::COMPUTE {
                let pipeline = check_vk(
                    device.create_compute_pipeline(self.pipeline_layout, *module),
                    "vkCreateComputePipelines",
                    verify,
                )?;
                self.compute_pipeline = Some(pipeline);
            }
        }
        Ok(())
    }

    pub fn is_compute(&self) -> bool {
        self.compute_pipeline.is_some()
    }

    /// Detach every native object for deferred destruction
    pub fn take_native_objects(&mut self) -> Vec<ResourceToDestroy> {
        let mut objects = Vec::new();
        if let Some(pipeline) = self.compute_pipeline.take() {
            objects.push(ResourceToDestroy::Pipeline(pipeline));
        }
        if self.pipeline_layout != vk::PipelineLayout::null() {
            objects.push(ResourceToDestroy::PipelineLayout(std::mem::take(&mut self.pipeline_layout)));
        }
        objects.extend(self.set_layouts.drain(..).map(ResourceToDestroy::DescriptorSetLayout));
        objects.extend(self.stages.drain(..).map(|(_, module)| ResourceToDestroy::ShaderModule(module)));
        objects
    }
}

#[cfg(test)]
#[path = "vulkan_program_tests.rs"]
mod tests;
