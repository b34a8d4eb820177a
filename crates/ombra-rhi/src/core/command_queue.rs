use std::rc::Rc;

use ash::vk;

use crate::core::{command::RhiCommandBuffer, device::RhiDevice, synchronize::RhiFence, synchronize::RhiSemaphore};

#[derive(Clone, Debug)]
pub struct RhiQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

/// # destroy
///
/// queue 在 RhiDevice 销毁时会被销毁
pub struct RhiQueue {
    pub(crate) handle: vk::Queue,
    pub(crate) queue_family: RhiQueueFamily,

    pub(crate) device: Rc<RhiDevice>,
}

impl RhiQueue {
    pub fn new(device: Rc<RhiDevice>, queue_family: RhiQueueFamily) -> Self {
        let handle = unsafe { device.get_device_queue(queue_family.queue_family_index, 0) };
        device.debug_utils().set_object_debug_name(handle, &queue_family.name);
        Self {
            handle,
            queue_family,
            device,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn queue_family(&self) -> &RhiQueueFamily {
        &self.queue_family
    }

    pub fn submit(&self, batches: &[RhiSubmitInfo], fence: Option<&RhiFence>) {
        unsafe {
            // batches 的存在是有必要的，submit_infos 引用的是 batches 的内存
            let submit_infos: Vec<_> = batches.iter().map(|b| *b.inner()).collect();
            self.device
                .queue_submit(self.handle, &submit_infos, fence.map_or(vk::Fence::null(), |f| f.handle()))
                .unwrap()
        }
    }

    /// 根据 specification，vkQueueWaitIdle 应该和 Fence 效率相同
    #[inline]
    pub fn wait_idle(&self) {
        unsafe { self.device.queue_wait_idle(self.handle).unwrap() }
    }
}

/// Rhi 关于 SubmitInfo 的封装，更易用
///
/// 内部的 Vec 是有必要的：vk::SubmitInfo 以裸指针引用它们，
/// Vec 的堆内存在 move 之后仍然有效
#[derive(Default)]
pub struct RhiSubmitInfo {
    inner: vk::SubmitInfo<'static>,

    command_buffers: Vec<vk::CommandBuffer>,
    wait_semaphores: Vec<vk::Semaphore>,
    wait_stages: Vec<vk::PipelineStageFlags>,
    signal_semaphores: Vec<vk::Semaphore>,
}

impl RhiSubmitInfo {
    pub fn new(commands: &[RhiCommandBuffer]) -> Self {
        let command_buffers: Vec<_> = commands.iter().map(|cmd| cmd.handle()).collect();

        let mut info = Self {
            inner: vk::SubmitInfo::default(),
            command_buffers,
            wait_semaphores: vec![],
            wait_stages: vec![],
            signal_semaphores: vec![],
        };
        info.refresh_inner();
        info
    }

    #[inline]
    pub fn inner(&self) -> &vk::SubmitInfo {
        &self.inner
    }

    /// builder
    #[inline]
    pub fn wait(mut self, semaphore: &RhiSemaphore, stage: vk::PipelineStageFlags) -> Self {
        self.wait_semaphores.push(semaphore.handle());
        self.wait_stages.push(stage);
        self.refresh_inner();
        self
    }

    /// builder
    #[inline]
    pub fn signal(mut self, semaphore: &RhiSemaphore) -> Self {
        self.signal_semaphores.push(semaphore.handle());
        self.refresh_inner();
        self
    }

    fn refresh_inner(&mut self) {
        self.inner.command_buffer_count = self.command_buffers.len() as u32;
        self.inner.p_command_buffers = self.command_buffers.as_ptr();
        self.inner.wait_semaphore_count = self.wait_semaphores.len() as u32;
        self.inner.p_wait_semaphores = self.wait_semaphores.as_ptr();
        self.inner.p_wait_dst_stage_mask = self.wait_stages.as_ptr();
        self.inner.signal_semaphore_count = self.signal_semaphores.len() as u32;
        self.inner.p_signal_semaphores = self.signal_semaphores.as_ptr();
    }
}
