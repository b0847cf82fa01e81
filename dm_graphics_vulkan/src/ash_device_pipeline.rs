/// Native pipeline creation for `AshDevice`
///
/// Fixed-function state is baked from `PipelineState`; viewport, scissor
/// and depth bias are dynamic and recorded by the context.

use crate::vulkan_device::GraphicsPipelineDesc;
use crate::vulkan_format::{
    blend_factor_to_vk, color_mask_to_vk, compare_func_to_vk, cull_mode_to_vk, front_face_to_vk, stencil_op_to_vk,
};
use ash::prelude::VkResult;
use ash::vk;
use dm_graphics::dmgraphics::render::{PipelineState, StencilFaceState};

const ENTRY_POINT: &std::ffi::CStr = c"main";

fn stencil_face_to_vk(face: &StencilFaceState, state: &PipelineState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op_to_vk(face.op_stencil_fail),
        pass_op: stencil_op_to_vk(face.op_pass),
        depth_fail_op: stencil_op_to_vk(face.op_depth_fail),
        compare_op: compare_func_to_vk(face.func),
        compare_mask: state.stencil_compare_mask as u32,
        write_mask: state.stencil_write_mask as u32,
        reference: state.stencil_reference as u32,
    }
}

pub fn create_graphics_pipeline(device: &ash::Device, desc: &GraphicsPipelineDesc) -> VkResult<vk::Pipeline> {
    let state = &desc.state;

    let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
        .stages
        .iter()
        .map(|&(stage, module)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(stage)
                .module(module)
                .name(ENTRY_POINT)
        })
        .collect();

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&desc.vertex_bindings)
        .vertex_attribute_descriptions(&desc.vertex_attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(desc.topology)
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(cull_mode_to_vk(state.cull_face_enabled, state.cull_face_type))
        .front_face(front_face_to_vk(state.face_winding))
        .depth_bias_enable(state.polygon_offset_fill_enabled);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.has_depth_stencil && state.depth_test_enabled)
        .depth_write_enable(desc.has_depth_stencil && state.write_depth)
        .depth_compare_op(compare_func_to_vk(state.depth_test_func))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(desc.has_depth_stencil && state.stencil_enabled)
        .front(stencil_face_to_vk(&state.stencil_front, state))
        .back(stencil_face_to_vk(&state.stencil_back, state));

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(desc.samples);

    let src_factor = blend_factor_to_vk(state.blend_src_factor);
    let dst_factor = blend_factor_to_vk(state.blend_dst_factor);
    let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(color_mask_to_vk(state.write_color_mask))
        .blend_enable(state.blend_enabled)
        .src_color_blend_factor(src_factor)
        .dst_color_blend_factor(dst_factor)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(src_factor)
        .dst_alpha_blend_factor(dst_factor)
        .alpha_blend_op(vk::BlendOp::ADD);
    let blend_attachments = vec![blend_attachment; desc.color_attachment_count as usize];
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    let dynamic_states = [
        vk::DynamicState::VIEWPORT,
        vk::DynamicState::SCISSOR,
        vk::DynamicState::DEPTH_BIAS,
    ];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .depth_stencil_state(&depth_stencil_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(desc.layout)
        .render_pass(desc.render_pass)
        .subpass(0);

    let pipelines = unsafe {
        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
            .map_err(|(_, e)| e)?
    };
    pipelines.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
}

pub fn create_compute_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    module: vk::ShaderModule,
) -> VkResult<vk::Pipeline> {
    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(module)
        .name(ENTRY_POINT);
    let info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout);

    let pipelines = unsafe {
        device
            .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
            .map_err(|(_, e)| e)?
    };
    pipelines.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
}
