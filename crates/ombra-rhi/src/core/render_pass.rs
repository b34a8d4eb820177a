use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{core::device::RhiDevice, rhi::Rhi};

/// render pass 中单个 attachment 的描述
#[derive(Clone, Debug)]
pub struct RhiAttachmentInfo {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl RhiAttachmentInfo {
    /// clear 然后渲染，最终作为 shader 的输入
    pub fn color_clear(format: vk::Format, final_layout: vk::ImageLayout) -> Self {
        Self {
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout,
        }
    }

    /// 保留之前 pass 的内容继续渲染
    pub fn color_load(format: vk::Format, initial_layout: vk::ImageLayout, final_layout: vk::ImageLayout) -> Self {
        Self {
            format,
            load_op: vk::AttachmentLoadOp::LOAD,
            initial_layout,
            final_layout,
        }
    }
}

/// 单 subpass 的 render pass 描述；depth attachment 放在所有 color 之后
#[derive(Clone, Debug)]
pub struct RhiRenderPassDesc {
    pub colors: Vec<RhiAttachmentInfo>,
    pub depth: Option<RhiAttachmentInfo>,
}

pub struct RhiRenderPass {
    handle: vk::RenderPass,
    /// attachment 数量 = color + depth，framebuffer 和 clear value 都要与之对应
    attachment_count: usize,
    device: Rc<RhiDevice>,
}

impl Drop for RhiRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

impl RhiRenderPass {
    pub fn new(rhi: &Rhi, desc: &RhiRenderPassDesc, debug_name: &str) -> Self {
        let mut attachments = desc
            .colors
            .iter()
            .map(|color| {
                vk::AttachmentDescription::default()
                    .format(color.format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(color.load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(color.initial_layout)
                    .final_layout(color.final_layout)
            })
            .collect_vec();

        let color_refs = (0..desc.colors.len() as u32)
            .map(|i| {
                vk::AttachmentReference::default().attachment(i).layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            })
            .collect_vec();

        let depth_ref;
        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);

        if let Some(depth) = &desc.depth {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(depth.format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(depth.load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(depth.initial_layout)
                    .final_layout(depth.final_layout),
            );
            depth_ref = vk::AttachmentReference::default()
                .attachment(desc.colors.len() as u32)
                .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        // 外部依赖：保证上一帧/上一个 pass 对 attachment 的读取先完成
        let dependencies = [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(
                    vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                )
                .src_access_mask(vk::AccessFlags::SHADER_READ)
                .dst_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                )
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                )
                .src_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags::SHADER_READ),
        ];

        let render_pass_ci = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);

        let render_pass = unsafe { rhi.device().create_render_pass(&render_pass_ci, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(render_pass, debug_name);

        Self {
            handle: render_pass,
            attachment_count: attachments.len(),
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.attachment_count
    }
}

pub struct RhiFramebuffer {
    handle: vk::Framebuffer,
    extent: vk::Extent2D,
    device: Rc<RhiDevice>,
}

impl Drop for RhiFramebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.handle, None);
        }
    }
}

impl RhiFramebuffer {
    /// attachments 的顺序需要与 render pass 一致：color 在前，depth 在最后
    pub fn new(
        rhi: &Rhi,
        render_pass: &RhiRenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        debug_name: &str,
    ) -> Self {
        debug_assert_eq!(attachments.len(), render_pass.attachment_count());

        let framebuffer_ci = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { rhi.device().create_framebuffer(&framebuffer_ci, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(framebuffer, debug_name);

        Self {
            handle: framebuffer,
            extent,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
