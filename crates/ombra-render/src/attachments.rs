//! 离屏 attachment 的集合
//!
//! attachment 通过 label 引用，窗口 resize 时整个集合重建。

use std::collections::HashMap;

use ash::vk;
use ombra_rhi::{core::image::RhiTexture2D, rhi::Rhi};

#[derive(Clone, Debug)]
pub struct AttachmentDesc {
    pub label: String,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl AttachmentDesc {
    /// color render target，之后作为 shader 输入被采样
    pub fn color(label: &str, format: vk::Format) -> Self {
        Self {
            label: label.to_string(),
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// depth render target
    pub fn depth(label: &str, format: vk::Format) -> Self {
        Self {
            label: label.to_string(),
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }
}

/// 以 label 索引的 attachment 集合，尺寸与窗口一致
pub struct AttachmentSet {
    attachments: HashMap<String, RhiTexture2D>,
    extent: vk::Extent2D,
}

impl AttachmentSet {
    pub fn build(rhi: &Rhi, descs: &[AttachmentDesc], extent: vk::Extent2D) -> Self {
        let mut attachments = HashMap::new();
        for desc in descs {
            let texture = RhiTexture2D::new_render_target(rhi, desc.format, extent, desc.usage, desc.aspect, &desc.label);
            attachments.insert(desc.label.clone(), texture);
        }
        log::info!("built {} attachments at {}x{}", attachments.len(), extent.width, extent.height);
        Self { attachments, extent }
    }

    #[inline]
    pub fn get(&self, label: &str) -> Option<&RhiTexture2D> {
        self.attachments.get(label)
    }

    #[inline]
    pub fn labels(&self) -> impl Iterator<Item = &String> {
        self.attachments.keys()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
