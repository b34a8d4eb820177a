//! frames in flight 的管理，以及按帧复制的 buffer 表
//!
//! cpu 最多领先 gpu 一帧：每个 in-flight 帧有自己的同步原语、
//! command buffer 和一份 host visible buffer，避免写入 gpu 正在读的数据。

use std::{collections::HashMap, rc::Rc};

use ash::vk;
use ombra_rhi::{
    core::{
        buffer::RhiBuffer,
        command::{RhiCommandBuffer, RhiCommandPool},
        synchronize::{RhiFence, RhiSemaphore},
    },
    rhi::Rhi,
};

/// 同时在飞行中的帧数
pub const FRAME_OVERLAP: usize = 2;

/// frame_count 到 in-flight 帧编号的映射
#[inline]
pub fn frame_index(frame_count: u64) -> usize {
    (frame_count % FRAME_OVERLAP as u64) as usize
}

/// 单个 in-flight 帧拥有的资源
pub struct FrameSlot {
    /// gpu 完成该帧所有工作后 signal
    pub fence: RhiFence,
    /// swapchain image 可用后 signal，渲染等待它
    pub present_semaphore: RhiSemaphore,
    /// 渲染完成后 signal，present 等待它
    pub render_semaphore: RhiSemaphore,

    pub command_pool: Rc<RhiCommandPool>,
    pub command_buffer: RhiCommandBuffer,
}

pub struct FrameController {
    slots: Vec<FrameSlot>,
    frame_count: u64,
}

impl FrameController {
    pub fn new(rhi: &Rhi) -> Self {
        let slots = (0..FRAME_OVERLAP)
            .map(|idx| {
                let command_pool = Rc::new(RhiCommandPool::new(
                    rhi.device.clone(),
                    rhi.device.graphics_queue_family(),
                    vk::CommandPoolCreateFlags::empty(),
                    &format!("frame-{}-command-pool", idx),
                ));
                let command_buffer =
                    RhiCommandBuffer::new(rhi.device.clone(), command_pool.clone(), &format!("frame-{}-cmd", idx));

                FrameSlot {
                    // 第一帧不需要等待上一帧，fence 创建时就是 signaled
                    fence: RhiFence::new(rhi, true, &format!("frame-{}-fence", idx)),
                    present_semaphore: RhiSemaphore::new(rhi, &format!("frame-{}-present-semaphore", idx)),
                    render_semaphore: RhiSemaphore::new(rhi, &format!("frame-{}-render-semaphore", idx)),
                    command_pool,
                    command_buffer,
                }
            })
            .collect();

        Self {
            slots,
            frame_count: 0,
        }
    }

    #[inline]
    pub fn current(&self) -> &FrameSlot {
        &self.slots[frame_index(self.frame_count)]
    }

    #[inline]
    pub fn frame_index(&self) -> usize {
        frame_index(self.frame_count)
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn advance(&mut self) {
        self.frame_count += 1;
    }

    pub fn destroy(self) {
        for slot in self.slots {
            slot.fence.destroy();
            slot.present_semaphore.destroy();
            slot.render_semaphore.destroy();
            slot.command_buffer.free();
            // command pool 由 Rc Drop 销毁
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Uniform,
    Storage,
}

/// 按 label 索引的逐帧 buffer 表
///
/// 每个 label 对应 FRAME_OVERLAP 份 buffer，材质的 `UB:`/`SB:` 引用
/// 解析到这里
#[derive(Default)]
pub struct BufferTable {
    buffers: HashMap<String, (BufferKind, Vec<RhiBuffer>)>,
}

impl BufferTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_uniform(&mut self, rhi: &Rhi, label: &str, size: vk::DeviceSize) {
        let buffers = (0..FRAME_OVERLAP)
            .map(|idx| RhiBuffer::new_uniform_buffer(rhi, size, &format!("{}-ub-{}", label, idx)))
            .collect();
        self.buffers.insert(label.to_string(), (BufferKind::Uniform, buffers));
    }

    pub fn add_storage(&mut self, rhi: &Rhi, label: &str, size: vk::DeviceSize) {
        let buffers = (0..FRAME_OVERLAP)
            .map(|idx| RhiBuffer::new_storage_buffer(rhi, size, &format!("{}-sb-{}", label, idx)))
            .collect();
        self.buffers.insert(label.to_string(), (BufferKind::Storage, buffers));
    }

    /// 向当前帧的 buffer 写入数据
    pub fn write<T: bytemuck::Pod>(&mut self, label: &str, frame_index: usize, data: &[T]) {
        match self.buffers.get_mut(label) {
            Some((_, buffers)) => buffers[frame_index].write_pod(data),
            None => log::error!("writing to unknown buffer label: {}", label),
        }
    }

    #[inline]
    pub fn kind(&self, label: &str) -> Option<BufferKind> {
        self.buffers.get(label).map(|(kind, _)| *kind)
    }

    #[inline]
    pub fn buffer_info(&self, label: &str, frame_index: usize) -> Option<vk::DescriptorBufferInfo> {
        self.buffers.get(label).map(|(_, buffers)| buffers[frame_index].descriptor_buffer_info())
    }

    #[inline]
    pub fn labels(&self) -> impl Iterator<Item = &String> {
        self.buffers.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index_alternates() {
        // 两帧在飞行中，帧编号在 0 和 1 之间交替
        assert_eq!(frame_index(0), 0);
        assert_eq!(frame_index(1), 1);
        assert_eq!(frame_index(2), 0);
        assert_eq!(frame_index(101), 1);
    }
}
