//! 从 pipeline 描述构建 vk pipeline
//!
//! descriptor set layout 不需要手动声明：根据每个 shader 声明的资源数量
//! 自动推导出 binding 表，材质中的资源引用按同样的顺序与之对应。

use std::{path::Path, rc::Rc};

use ash::vk;
use itertools::Itertools;
use ombra_rhi::{
    core::{descriptor::RhiDescriptorSetLayout, device::RhiDevice, render_pass::RhiRenderPass, shader::RhiShaderModule},
    rhi::Rhi,
};

use crate::{
    assets::Vertex,
    material::parse::{BlendMode, CullMode, DepthCompare, PipelineDesc, ShaderStageKind},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
}

/// descriptor set 中的一个 binding
#[derive(Clone, Debug, PartialEq)]
pub struct BindingDesc {
    pub index: u32,
    pub kind: BindingKind,
    pub stage: ShaderStageKind,
}

/// 根据 shader 声明的资源数量推导 binding 表
///
/// binding index 在所有 shader 之间连续递增：按 shader 的声明顺序，
/// 每个 shader 内先 uniform buffer，再 storage buffer，最后 texture
pub fn descriptor_bindings(desc: &PipelineDesc) -> Vec<BindingDesc> {
    let mut bindings = vec![];
    let mut index = 0u32;

    for stage in &desc.stages {
        let groups = [
            (stage.uniform_count, BindingKind::UniformBuffer),
            (stage.storage_count, BindingKind::StorageBuffer),
            (stage.texture_count, BindingKind::CombinedImageSampler),
        ];
        for (count, kind) in groups {
            for _ in 0..count {
                bindings.push(BindingDesc {
                    index,
                    kind,
                    stage: stage.stage,
                });
                index += 1;
            }
        }
    }
    bindings
}

/// 构建完成的 pipeline 以及解析 descriptor 所需的 binding 表
pub struct CompiledPipeline {
    pub name: String,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    pub descriptor_layout: RhiDescriptorSetLayout,

    pub bindings: Vec<BindingDesc>,
    pub render_pass_id: u32,
    pub vertex_input: bool,

    device: Rc<RhiDevice>,
}

impl Drop for CompiledPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}

impl CompiledPipeline {
    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }
}

fn vk_shader_stage(stage: ShaderStageKind) -> vk::ShaderStageFlags {
    match stage {
        ShaderStageKind::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStageKind::Fragment => vk::ShaderStageFlags::FRAGMENT,
    }
}

fn vk_descriptor_type(kind: BindingKind) -> vk::DescriptorType {
    match kind {
        BindingKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        BindingKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        BindingKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

/// 根据文本描述构建完整的 graphics pipeline
///
/// shader 文件从 shader_dir 中加载；pipeline 创建失败是无法恢复的错误，直接终止
pub fn build_pipeline(rhi: &Rhi, desc: &PipelineDesc, shader_dir: &Path, render_pass: &RhiRenderPass) -> CompiledPipeline {
    let bindings = descriptor_bindings(desc);

    let layout_bindings = bindings
        .iter()
        .map(|b| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(b.index)
                .descriptor_type(vk_descriptor_type(b.kind))
                .descriptor_count(1)
                .stage_flags(vk_shader_stage(b.stage))
        })
        .collect_vec();

    let descriptor_layout =
        RhiDescriptorSetLayout::new(rhi, &layout_bindings, &format!("{}-descriptor-layout", desc.name));

    let set_layouts = [descriptor_layout.handle()];
    let pipeline_layout_ci = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    let pipeline_layout = unsafe { rhi.device().create_pipeline_layout(&pipeline_layout_ci, None).unwrap() };
    rhi.device.debug_utils().set_object_debug_name(pipeline_layout, &format!("{}-pipeline-layout", desc.name));

    // shader module 在 pipeline 创建之后就可以销毁
    let shader_modules =
        desc.stages.iter().map(|stage| RhiShaderModule::new(rhi, &shader_dir.join(&stage.file))).collect_vec();

    let entry_point = c"main";
    let shader_stages = desc
        .stages
        .iter()
        .zip(shader_modules.iter())
        .map(|(stage, module)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk_shader_stage(stage.stage))
                .module(module.handle())
                .name(entry_point)
        })
        .collect_vec();

    // fullscreen pass 不需要 vertex input，顶点在 shader 中生成
    let vertex_bindings = Vertex::binding_descriptions();
    let vertex_attributes = Vertex::attribute_descriptions();
    let vertex_input_state = if desc.vertex_input {
        vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes)
    } else {
        vk::PipelineVertexInputStateCreateInfo::default()
    };

    let input_assembly_state =
        vk::PipelineInputAssemblyStateCreateInfo::default().topology(vk::PrimitiveTopology::TRIANGLE_LIST);

    // viewport 和 scissor 是 dynamic state，这里只声明数量
    let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(match desc.cull {
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::None => vk::CullModeFlags::NONE,
        })
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);

    let multisample_state =
        vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_test)
        .depth_write_enable(desc.depth_write)
        .depth_compare_op(match desc.depth_compare {
            DepthCompare::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            DepthCompare::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            DepthCompare::Equal => vk::CompareOp::EQUAL,
        });

    let blend_attachment = match desc.blend {
        BlendMode::Disabled => vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA),
        BlendMode::Additive => vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ONE)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA),
        BlendMode::Alpha => vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA),
    };
    // 每个 color attachment 都需要一份 blend state
    let blend_attachments = vec![blend_attachment; desc.color_attachment_count as usize];
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let pipeline_ci = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(pipeline_layout)
        .render_pass(render_pass.handle())
        .subpass(0);

    let pipeline = unsafe {
        rhi.device()
            .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_ci), None)
    };
    let pipeline = match pipeline {
        Ok(pipelines) => pipelines[0],
        Err((_, err)) => {
            log::error!("failed to create pipeline {}: {:?}", desc.name, err);
            std::process::abort();
        }
    };
    rhi.device.debug_utils().set_object_debug_name(pipeline, &format!("{}-pipeline", desc.name));

    for module in shader_modules {
        module.destroy();
    }

    CompiledPipeline {
        name: desc.name.clone(),
        pipeline,
        pipeline_layout,
        descriptor_layout,
        bindings,
        render_pass_id: desc.render_pass_id,
        vertex_input: desc.vertex_input,
        device: rhi.device.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::parse::ShaderStageDesc;

    fn stage(kind: ShaderStageKind, ub: u32, sb: u32, tex: u32) -> ShaderStageDesc {
        ShaderStageDesc {
            stage: kind,
            file: String::new(),
            uniform_count: ub,
            storage_count: sb,
            texture_count: tex,
        }
    }

    #[test]
    fn test_binding_order_across_stages() {
        // binding index 跨 shader 连续递增，每个 shader 内 UB -> SB -> TEX
        let mut desc = PipelineDesc::new("geometry");
        desc.stages.push(stage(ShaderStageKind::Vertex, 1, 0, 0));
        desc.stages.push(stage(ShaderStageKind::Fragment, 0, 1, 2));

        let bindings = descriptor_bindings(&desc);
        assert_eq!(bindings.len(), 4);

        assert_eq!(bindings[0], BindingDesc {
            index: 0,
            kind: BindingKind::UniformBuffer,
            stage: ShaderStageKind::Vertex
        });
        assert_eq!(bindings[1], BindingDesc {
            index: 1,
            kind: BindingKind::StorageBuffer,
            stage: ShaderStageKind::Fragment
        });
        assert_eq!(bindings[2].kind, BindingKind::CombinedImageSampler);
        assert_eq!(bindings[2].index, 2);
        assert_eq!(bindings[3].kind, BindingKind::CombinedImageSampler);
        assert_eq!(bindings[3].index, 3);
    }

    #[test]
    fn test_binding_order_within_stage() {
        // 同一个 shader 内按 UB -> SB -> TEX 的顺序
        let mut desc = PipelineDesc::new("lighting");
        desc.stages.push(stage(ShaderStageKind::Fragment, 2, 1, 1));

        let bindings = descriptor_bindings(&desc);
        let kinds = bindings.iter().map(|b| b.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                BindingKind::UniformBuffer,
                BindingKind::UniformBuffer,
                BindingKind::StorageBuffer,
                BindingKind::CombinedImageSampler,
            ]
        );
    }

    #[test]
    fn test_no_resources_no_bindings() {
        let mut desc = PipelineDesc::new("depth_only");
        desc.stages.push(stage(ShaderStageKind::Vertex, 0, 0, 0));
        assert!(descriptor_bindings(&desc).is_empty());
    }
}
