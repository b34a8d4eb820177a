use std::{ffi::CStr, ops::Deref, rc::Rc};

use ash::vk;
use itertools::Itertools;

use crate::core::{
    command_queue::RhiQueueFamily, debug_utils::RhiDebugUtils, instance::RhiInstance,
    physical_device::RhiPhysicalDevice,
};

pub struct RhiDevice {
    pub handle: ash::Device,

    pub pdevice: Rc<RhiPhysicalDevice>,

    pub debug_utils: RhiDebugUtils,
}

impl Deref for RhiDevice {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl RhiDevice {
    pub fn new(vk_pf: &ash::Entry, instance: &RhiInstance, pdevice: Rc<RhiPhysicalDevice>) -> Self {
        // device 所需的所有 extension
        let device_exts = Self::basic_device_exts().iter().map(|e| e.as_ptr()).collect_vec();
        let mut exts_str = String::new();
        for ext in &device_exts {
            exts_str.push_str(&format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) }));
        }
        log::info!("device exts: {}", exts_str);

        let features = Self::physical_device_basic_features();

        // 只需要一个 graphics queue
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(pdevice.graphics_queue_family.queue_family_index)
            .queue_priorities(&[1.0])];

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_exts)
            .enabled_features(&features);

        let device = unsafe { instance.handle.create_device(pdevice.handle, &device_create_info, None).unwrap() };

        let debug_utils = RhiDebugUtils::new(vk_pf, &instance.handle, &device);

        Self {
            handle: device,
            pdevice: pdevice.clone(),
            debug_utils,
        }
    }

    pub fn destroy(self) {
        log::info!("destroying RhiDevice");
        // messenger 是 instance 级别的对象，先于 device 销毁没有问题
        drop(self.debug_utils);
        unsafe {
            self.handle.destroy_device(None);
        }
    }

    /// 必要的 physical device core features
    fn physical_device_basic_features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .fragment_stores_and_atomics(true)
            .independent_blend(true)
    }

    /// 必要的 device extensions
    fn basic_device_exts() -> Vec<&'static CStr> {
        vec![ash::khr::swapchain::NAME]
    }
}

/// getter & tools
impl RhiDevice {
    #[inline]
    pub fn debug_utils(&self) -> &RhiDebugUtils {
        &self.debug_utils
    }

    #[inline]
    pub fn graphics_queue_family(&self) -> RhiQueueFamily {
        self.pdevice.graphics_queue_family.clone()
    }

    /// 当 uniform buffer 的 descriptor 在更新时，其 offset 必须是这个值的整数倍
    #[inline]
    pub fn min_ubo_offset_align(&self) -> vk::DeviceSize {
        self.pdevice.basic_props.limits.min_uniform_buffer_offset_alignment
    }
}
