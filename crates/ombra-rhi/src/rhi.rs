use std::{ffi::CStr, rc::Rc};

use ash::vk;

use crate::core::{
    allocator::RhiAllocator,
    command::{RhiCommandBuffer, RhiCommandPool},
    command_queue::RhiQueue,
    device::RhiDevice,
    instance::RhiInstance,
    physical_device::RhiPhysicalDevice,
};

/// Rhi 负责 Vulkan 环境的创建，持有 instance、device、queue 等全局资源
///
/// 不使用全局单例，整个应用显式地传递这个对象
pub struct Rhi {
    /// vk 函数入口
    pub vk_pf: ash::Entry,
    pub instance: RhiInstance,

    pub physical_device: Rc<RhiPhysicalDevice>,
    pub device: Rc<RhiDevice>,

    pub graphics_queue: RhiQueue,

    pub allocator: Rc<RhiAllocator>,

    /// 用于临时命令的 command pool
    temp_graphics_command_pool: Option<Rc<RhiCommandPool>>,
}

// init 相关
impl Rhi {
    /// # param
    /// * instance_extra_exts - 额外的 instance extension，一般是 window system 需要的 surface 扩展
    pub fn new(app_name: String, instance_extra_exts: Vec<&'static CStr>) -> Self {
        let vk_pf = unsafe { ash::Entry::load() }.expect("failed to load vulkan entry");

        let instance = RhiInstance::new(&vk_pf, app_name, "ombra".to_string(), instance_extra_exts);

        let physical_device = Rc::new(RhiPhysicalDevice::new_discrete_physical_device(&instance.handle));
        log::info!(
            "using gpu: {:?}",
            unsafe { CStr::from_ptr(physical_device.basic_props.device_name.as_ptr()) }
        );

        let device = Rc::new(RhiDevice::new(&vk_pf, &instance, physical_device.clone()));

        let graphics_queue = RhiQueue::new(device.clone(), device.graphics_queue_family());

        let allocator = Rc::new(RhiAllocator::new(&instance.handle, physical_device.handle, &device.handle));

        let temp_graphics_command_pool = Rc::new(RhiCommandPool::new(
            device.clone(),
            device.graphics_queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            "rhi-temp-graphics-command-pool",
        ));

        Self {
            vk_pf,
            instance,
            physical_device,
            device,
            graphics_queue,
            allocator,
            temp_graphics_command_pool: Some(temp_graphics_command_pool),
        }
    }

    pub fn destroy(mut self) {
        self.temp_graphics_command_pool = None;
        // queue 本身不需要销毁，但它持有 device 的引用
        drop(self.graphics_queue);

        if Rc::into_inner(self.allocator).is_none() {
            log::error!("allocator is still referenced, cannot destroy");
        }
        match Rc::into_inner(self.device) {
            Some(device) => device.destroy(),
            None => log::error!("device is still referenced, cannot destroy"),
        }
        self.instance.destroy();
    }
}

// getter & tools
impl Rhi {
    #[inline]
    pub fn device(&self) -> &ash::Device {
        &self.device.handle
    }

    #[inline]
    pub fn graphics_queue(&self) -> &RhiQueue {
        &self.graphics_queue
    }

    /// 立即在 graphics queue 上执行命令，并同步等待完成
    pub fn one_time_exec<F, R>(&self, func: F, name: &str) -> R
    where
        F: FnOnce(&RhiCommandBuffer) -> R,
    {
        RhiCommandBuffer::one_time_exec(
            self,
            self.temp_graphics_command_pool.as_ref().unwrap().clone(),
            &self.graphics_queue,
            func,
            name,
        )
    }

    /// 等待 device 上所有 queue 都空闲
    #[inline]
    pub fn wait_idle(&self) {
        unsafe {
            self.device.device_wait_idle().unwrap();
        }
    }
}
