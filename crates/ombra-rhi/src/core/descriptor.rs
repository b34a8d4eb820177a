use std::rc::Rc;

use ash::vk;

use crate::{core::device::RhiDevice, rhi::Rhi};

pub struct RhiDescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    device: Rc<RhiDevice>,
}

impl Drop for RhiDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.handle, None);
        }
    }
}

impl RhiDescriptorSetLayout {
    pub fn new(rhi: &Rhi, bindings: &[vk::DescriptorSetLayoutBinding], debug_name: &str) -> Self {
        let layout_ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe { rhi.device().create_descriptor_set_layout(&layout_ci, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(layout, debug_name);
        Self {
            handle: layout,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

/// descriptor pool；pool 销毁时其中的 descriptor set 一并释放
pub struct RhiDescriptorPool {
    handle: vk::DescriptorPool,
    device: Rc<RhiDevice>,
}

impl Drop for RhiDescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.handle, None);
        }
    }
}

impl RhiDescriptorPool {
    pub fn new(rhi: &Rhi, max_sets: u32, debug_name: &str) -> Self {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: max_sets * 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: max_sets * 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: max_sets * 4,
            },
        ];

        let pool_ci = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(&pool_sizes);
        let pool = unsafe { rhi.device().create_descriptor_pool(&pool_ci, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(pool, debug_name);

        Self {
            handle: pool,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    /// 从 pool 中分配 count 个使用相同 layout 的 descriptor set
    pub fn alloc(&self, layout: &RhiDescriptorSetLayout, count: usize, debug_name: &str) -> Vec<vk::DescriptorSet> {
        let layouts = vec![layout.handle(); count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(self.handle).set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info).unwrap() };
        for (idx, set) in sets.iter().enumerate() {
            self.device.debug_utils().set_object_debug_name(*set, &format!("{}-{}", debug_name, idx));
        }
        sets
    }

    /// 回收 pool 中分配出去的所有 descriptor set
    pub fn reset(&self) {
        unsafe {
            self.device.reset_descriptor_pool(self.handle, vk::DescriptorPoolResetFlags::empty()).unwrap();
        }
    }
}
