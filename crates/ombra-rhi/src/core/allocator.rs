use std::ops::Deref;

use ash::vk;

/// vk-mem allocator 的简单封装
///
/// # Destroy
/// vk_mem::Allocator 自带 Drop，需要保证在 device 销毁之前 drop
pub struct RhiAllocator {
    handle: vk_mem::Allocator,
}

impl Deref for RhiAllocator {
    type Target = vk_mem::Allocator;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl RhiAllocator {
    pub fn new(instance: &ash::Instance, physical_device: vk::PhysicalDevice, device: &ash::Device) -> Self {
        let create_info = vk_mem::AllocatorCreateInfo::new(instance, device, physical_device);
        let handle = unsafe { vk_mem::Allocator::new(create_info).unwrap() };
        Self { handle }
    }
}
