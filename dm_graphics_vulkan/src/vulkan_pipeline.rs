/// Graphics pipeline keys and descriptions
///
/// A graphics pipeline depends on the program, the render state, the
/// render pass it draws into and the vertex layout of the bound streams.
/// `pipeline_key` hashes exactly those inputs; the context keeps one
/// pipeline per key in a `PipelineCache`.

use crate::vulkan_device::GraphicsPipelineDesc;
use crate::vulkan_format::{primitive_to_vk, sample_count_to_vk, vertex_format_to_vk};
use crate::vulkan_program::VulkanProgram;
use ash::vk;
use dm_graphics::dm_warn;
use dm_graphics::dmgraphics::render::{PipelineState, PrimitiveType, VertexDeclaration, VertexStepFunction};
use dm_graphics::dmgraphics::shader::ShaderResourceBinding;
use dm_graphics::dmgraphics::utils::HashState;
use dm_graphics::dmgraphics::{Error, Result};

/// Render pass side of a pipeline key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassInfo {
    /// 0 for the main pass, the render target id otherwise
    pub id: u64,
    pub render_pass: vk::RenderPass,
    pub samples: u32,
    pub color_attachment_count: u32,
    pub has_depth_stencil: bool,
}

pub fn pipeline_key(
    program_hash: u64,
    state: &PipelineState,
    pass: &PassInfo,
    declarations: &[Option<&VertexDeclaration>],
    primitive: PrimitiveType,
) -> u64 {
    let mut hash = HashState::new();
    hash.update(&program_hash).update(state).update(&pass.id).update(&pass.samples).update(&primitive);
    for (index, declaration) in declarations.iter().enumerate() {
        if let Some(declaration) = declaration {
            hash.update(&index).update(&declaration.pipeline_hash).update(&declaration.step_function);
        }
    }
    hash.finish()
}

#[derive(Debug, Clone, Default)]
pub struct VertexInputLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// Match the program's vertex inputs to the streams of the enabled declarations
///
/// An input is fed by the first binding whose declaration has a stream of
/// the same name. Inputs without a stream are left unfed.
pub fn vertex_input_layout(
    inputs: &[ShaderResourceBinding],
    declarations: &[Option<&VertexDeclaration>],
) -> Result<VertexInputLayout> {
    let mut layout = VertexInputLayout::default();

    for (index, declaration) in declarations.iter().enumerate() {
        let Some(declaration) = declaration else { continue };
        layout.bindings.push(
            vk::VertexInputBindingDescription::default()
                .binding(index as u32)
                .stride(declaration.stride)
                .input_rate(match declaration.step_function {
                    VertexStepFunction::Vertex => vk::VertexInputRate::VERTEX,
                    VertexStepFunction::Instance => vk::VertexInputRate::INSTANCE,
                }),
        );
    }

    for input in inputs {
        let found = declarations
            .iter()
            .enumerate()
            .find_map(|(index, declaration)| Some((index, declaration.as_ref()?.stream(input.name_hash)?)));
        let Some((index, stream)) = found else {
            dm_warn!("dmgraphics::vulkan", "Vertex input '{}' has no matching stream", input.name);
            continue;
        };
        let format = vertex_format_to_vk(stream.ty, stream.size, stream.normalize).ok_or_else(|| {
            Error::InvalidResource(format!(
                "Vertex stream '{}' has no native format ({:?} x{})",
                stream.name, stream.ty, stream.size
            ))
        })?;
        layout.attributes.push(
            vk::VertexInputAttributeDescription::default()
                .location(u32::from(input.binding))
                .binding(index as u32)
                .format(format)
                .offset(stream.offset),
        );
    }
    Ok(layout)
}

pub fn graphics_pipeline_desc(
    program: &VulkanProgram,
    pass: &PassInfo,
    vertex_layout: VertexInputLayout,
    state: &PipelineState,
    primitive: PrimitiveType,
) -> GraphicsPipelineDesc {
    GraphicsPipelineDesc {
        layout: program.pipeline_layout,
        render_pass: pass.render_pass,
        stages: program.stages.clone(),
        vertex_bindings: vertex_layout.bindings,
        vertex_attributes: vertex_layout.attributes,
        topology: primitive_to_vk(primitive),
        state: *state,
        samples: sample_count_to_vk(pass.samples),
        color_attachment_count: pass.color_attachment_count,
        has_depth_stencil: pass.has_depth_stencil,
    }
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
