//! 声明式的 pass graph
//!
//! 一帧由若干个 pass 按声明顺序执行；pass 在 graph 中的下标
//! 就是 pipeline 文本中 `RP:<n>` 引用的编号。同一套机制同时服务
//! 后处理链（多个 fullscreen pass）和 deferred 链（g-buffer + 光照叠加）。

use ash::vk;

/// pass 渲染到哪里
#[derive(Clone, Debug, PartialEq)]
pub enum PassTarget {
    /// 直接渲染到 swapchain image
    Swapchain,
    /// 渲染到 label 引用的离屏 attachment
    Transient(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentLoad {
    Clear,
    /// 保留上一个 pass 的内容
    Load,
}

/// pass 的一个 attachment 槽位
#[derive(Clone, Debug)]
pub struct AttachmentSlot {
    pub target: PassTarget,
    pub load: AttachmentLoad,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl AttachmentSlot {
    pub fn clear(target: PassTarget, final_layout: vk::ImageLayout) -> Self {
        Self {
            target,
            load: AttachmentLoad::Clear,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout,
        }
    }

    pub fn load(target: PassTarget, initial_layout: vk::ImageLayout, final_layout: vk::ImageLayout) -> Self {
        Self {
            target,
            load: AttachmentLoad::Load,
            initial_layout,
            final_layout,
        }
    }
}

/// 实例数量的来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceSpec {
    Fixed { count: u32, first: u32 },
    /// 本帧 front 组的光源数量，从 0 开始
    LightsFront,
    /// 本帧 back 组的光源数量，从 front 组之后开始
    LightsBack,
    /// 所有光源
    AllLights,
}

/// 一次 draw 的几何来源
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// 不绑定 vertex buffer，顶点由 shader 生成
    Fullscreen { vertices: u32 },
    Mesh { label: String, instances: InstanceSpec },
}

/// pass 中的一次 draw：材质 + 几何
#[derive(Clone, Debug)]
pub struct DrawItem {
    pub material: String,
    pub geometry: Geometry,
}

#[derive(Clone, Debug)]
pub struct PassDesc {
    pub name: String,
    pub colors: Vec<AttachmentSlot>,
    pub depth: Option<AttachmentSlot>,
    pub clear_color: [f32; 4],
    pub items: Vec<DrawItem>,
}

impl PassDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            colors: vec![],
            depth: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            items: vec![],
        }
    }
}

/// 整个帧的 pass 序列
#[derive(Clone, Debug, Default)]
pub struct FrameGraph {
    pub passes: Vec<PassDesc>,
}

/// 材质的哪些 draw 属于给定的 pass
///
/// pass_ids 是材质每次 draw 所用 pipeline 的 `RP:<n>`；
/// 返回的下标保持声明顺序
pub fn pass_draw_order(pass_ids: &[u32], pass_id: u32) -> Vec<usize> {
    pass_ids.iter().enumerate().filter(|(_, id)| **id == pass_id).map(|(idx, _)| idx).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draws_filtered_by_pass() {
        // 材质有三次 draw，分属 pass 0、1、1
        let pass_ids = [0, 1, 1];

        assert_eq!(pass_draw_order(&pass_ids, 0), vec![0]);
        assert_eq!(pass_draw_order(&pass_ids, 1), vec![1, 2]);
        assert!(pass_draw_order(&pass_ids, 2).is_empty());
    }

    #[test]
    fn test_order_is_declaration_order() {
        // 同一个 pass 内的 draw 保持材质文件中的声明顺序
        let pass_ids = [1, 0, 1, 0, 1];
        assert_eq!(pass_draw_order(&pass_ids, 1), vec![0, 2, 4]);
        assert_eq!(pass_draw_order(&pass_ids, 0), vec![1, 3]);
    }
}
