use std::{path::Path, rc::Rc};

use ash::vk;

use crate::{core::device::RhiDevice, rhi::Rhi};

/// # Destroy
/// pipeline 创建完成之后就可以销毁，需要手动 destroy
pub struct RhiShaderModule {
    handle: vk::ShaderModule,
    device: Rc<RhiDevice>,
}

impl RhiShaderModule {
    /// 从 spv 文件中创建 shader module
    pub fn new(rhi: &Rhi, path: &Path) -> Self {
        let mut file = std::fs::File::open(path).unwrap_or_else(|_| panic!("failed to open shader: {:?}", path));
        let shader_code = ash::util::read_spv(&mut file).unwrap();

        let shader_module_ci = vk::ShaderModuleCreateInfo::default().code(&shader_code);
        let shader_module = unsafe { rhi.device().create_shader_module(&shader_module_ci, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(shader_module, &path.to_string_lossy());

        Self {
            handle: shader_module,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}
