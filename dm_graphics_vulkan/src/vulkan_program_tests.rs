use super::*;
use crate::recording_device::*;
use dm_graphics::dmgraphics::shader::{ShaderResourceBinding, ShaderSource, ShaderStageDesc};

#[test]
fn test_spirv_words_checks_magic_and_size() {
    let words = spirv_words(&spirv_bytes()).unwrap();
    assert_eq!(words[0], SPIRV_MAGIC);
    assert_eq!(words.len(), 5);

    assert!(spirv_words(&[0x03, 0x02, 0x23]).is_err());
    assert!(spirv_words(&[0u8; 8]).is_err());
    assert!(spirv_words(&[]).is_err());

    let header_only: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000].iter().flat_map(|w| w.to_le_bytes()).collect();
    assert!(spirv_words(&header_only).is_err());
}

#[test]
fn test_truncated_spirv_without_reflection_is_rejected() {
    let device = RecordingDevice::new();
    let mut desc = textured_desc();
    desc.stages[0] = ShaderStageDesc {
        stage: ShaderStage::Vertex,
        sources: vec![ShaderSource {
            language: ShaderLanguage::Spirv,
            source: [SPIRV_MAGIC, 0x0001_0000].iter().flat_map(|w| w.to_le_bytes()).collect(),
        }],
        meta: None,
    };

    let result = VulkanProgram::new(&device, &desc, 1, false);
    assert!(matches!(result, Err(Error::ShaderCompilation(_))));
    assert_eq!(device.created("shader_module"), 0);
}

#[test]
fn test_graphics_program_creates_layouts_per_set() {
    let device = RecordingDevice::new();
    let program = VulkanProgram::new(&device, &textured_desc(), 1, false).unwrap();

    assert_eq!(program.stages.len(), 2);
    assert_eq!(program.stages[0].0, vk::ShaderStageFlags::VERTEX);
    assert_eq!(program.set_layouts.len(), 2);
    assert_ne!(program.pipeline_layout, vk::PipelineLayout::null());
    assert!(!program.is_compute());
    assert_eq!(device.created("shader_module"), 2);
    assert_eq!(device.created("descriptor_set_layout"), 2);
}

#[test]
fn test_descriptor_types_follow_binding_family() {
    let device = RecordingDevice::new();
    let fragment = ShaderMeta {
        textures: vec![
            ShaderResourceBinding::texture("tex_separate", ShaderType::Texture2D, 0, 1),
            ShaderResourceBinding::sampler("tex_separate_separated", 0, 2, 0),
            ShaderResourceBinding::texture("output", ShaderType::Image2D, 0, 3),
            ShaderResourceBinding::texture("albedo", ShaderType::Sampler2D, 1, 0),
        ],
        ..Default::default()
    };
    let desc = graphics_desc(textured_vertex_meta(), fragment);
    let program = VulkanProgram::new(&device, &desc, 1, false).unwrap();
    let layout = &program.layout;

    let ty = |set, binding| descriptor_type(layout.binding(set, binding).unwrap());
    assert_eq!(ty(0, 0), Some(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC));
    assert_eq!(ty(0, 1), Some(vk::DescriptorType::SAMPLED_IMAGE));
    assert_eq!(ty(0, 2), Some(vk::DescriptorType::SAMPLER));
    assert_eq!(ty(0, 3), Some(vk::DescriptorType::STORAGE_IMAGE));
    assert_eq!(ty(1, 0), Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
}

#[test]
fn test_stage_over_device_limit_is_rejected() {
    let device = RecordingDevice::new();
    device.state().limits.max_per_stage_samplers = 0;

    let result = VulkanProgram::new(&device, &textured_desc(), 1, false);
    assert!(matches!(result, Err(Error::ShaderCompilation(msg)) if msg.contains("samplers")));
    assert_eq!(device.created("shader_module"), 0);
}

#[test]
fn test_stage_without_spirv_is_rejected() {
    let device = RecordingDevice::new();
    let mut desc = textured_desc();
    desc.stages[1] = ShaderStageDesc {
        stage: ShaderStage::Fragment,
        sources: vec![ShaderSource { language: ShaderLanguage::Glsl, source: b"void main() {}".to_vec() }],
        meta: Some(textured_fragment_meta()),
    };

    let result = VulkanProgram::new(&device, &desc, 1, false);
    assert!(matches!(result, Err(Error::ShaderCompilation(msg)) if msg.contains("SPIR-V")));
}

#[test]
fn test_compute_program_gets_its_pipeline() {
    let device = RecordingDevice::new();
    let meta = ShaderMeta {
        textures: vec![ShaderResourceBinding::texture("output", ShaderType::Image2D, 0, 0)],
        ..Default::default()
    };
    let program = VulkanProgram::new(&device, &compute_desc(meta), 7, false).unwrap();

    assert!(program.is_compute());
    assert_eq!(program.stages[0].0, vk::ShaderStageFlags::COMPUTE);
    assert_eq!(device.state().compute_pipelines, 1);
}

#[test]
fn test_compute_program_rejects_graphics_stages() {
    let device = RecordingDevice::new();
    let mut desc = compute_desc(ShaderMeta::default());
    desc.stages.push(spirv_stage(ShaderStage::Vertex, textured_vertex_meta()));

    assert!(matches!(VulkanProgram::new(&device, &desc, 1, false), Err(Error::ShaderCompilation(_))));
}

#[test]
fn test_take_native_objects_releases_everything() {
    let device = RecordingDevice::new();
    let mut program = VulkanProgram::new(&device, &textured_desc(), 1, false).unwrap();

    let objects = program.take_native_objects();
    // 2 modules, 2 set layouts, 1 pipeline layout
    assert_eq!(objects.len(), 5);
    for object in objects {
        object.destroy(&device);
    }
    assert_eq!(device.destroyed("shader_module"), 2);
    assert_eq!(device.destroyed("pipeline_layout"), 1);
    assert!(program.take_native_objects().is_empty());
}
