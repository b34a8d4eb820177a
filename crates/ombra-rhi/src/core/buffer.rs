use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::{
    core::{allocator::RhiAllocator, device::RhiDevice},
    rhi::Rhi,
};

/// buffer 的封装，通过 vk-mem 分配内存
pub struct RhiBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    /// host visible 的 buffer 创建后即保持 mapped 状态
    map_ptr: Option<*mut u8>,
    size: vk::DeviceSize,

    debug_name: String,

    allocator: Rc<RhiAllocator>,
    device: Rc<RhiDevice>,
}

impl Drop for RhiBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.map_ptr.is_some() {
                self.allocator.unmap_memory(&mut self.allocation);
                self.map_ptr = None;
            }
            self.allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}

// ctor
impl RhiBuffer {
    /// # param
    /// * align - 分配内存时的额外对齐要求，一般不需要
    pub fn new(
        rhi: &Rhi,
        buffer_ci: &vk::BufferCreateInfo,
        alloc_ci: &vk_mem::AllocationCreateInfo,
        align: Option<vk::DeviceSize>,
        debug_name: &str,
    ) -> Self {
        unsafe {
            let (buffer, allocation) = if let Some(align) = align {
                rhi.allocator.create_buffer_with_alignment(buffer_ci, alloc_ci, align).unwrap()
            } else {
                rhi.allocator.create_buffer(buffer_ci, alloc_ci).unwrap()
            };

            rhi.device.debug_utils().set_object_debug_name(buffer, debug_name);
            Self {
                handle: buffer,
                allocation,
                map_ptr: None,
                size: buffer_ci.size,
                debug_name: debug_name.to_string(),
                allocator: rhi.allocator.clone(),
                device: rhi.device.clone(),
            }
        }
    }

    /// host visible 的 uniform buffer，创建后立即 map
    #[inline]
    pub fn new_uniform_buffer(rhi: &Rhi, size: vk::DeviceSize, debug_name: &str) -> Self {
        let mut buffer = Self::new(
            rhi,
            &vk::BufferCreateInfo::default().size(size).usage(vk::BufferUsageFlags::UNIFORM_BUFFER),
            &Self::host_visible_alloc_info(),
            None,
            debug_name,
        );
        buffer.map();
        buffer
    }

    /// host visible 的 storage buffer，创建后立即 map
    #[inline]
    pub fn new_storage_buffer(rhi: &Rhi, size: vk::DeviceSize, debug_name: &str) -> Self {
        let mut buffer = Self::new(
            rhi,
            &vk::BufferCreateInfo::default().size(size).usage(vk::BufferUsageFlags::STORAGE_BUFFER),
            &Self::host_visible_alloc_info(),
            None,
            debug_name,
        );
        buffer.map();
        buffer
    }

    #[inline]
    pub fn new_stage_buffer(rhi: &Rhi, size: vk::DeviceSize, debug_name: &str) -> Self {
        Self::new(
            rhi,
            &vk::BufferCreateInfo::default().size(size).usage(vk::BufferUsageFlags::TRANSFER_SRC),
            &Self::host_visible_alloc_info(),
            None,
            debug_name,
        )
    }

    /// device local 的 vertex buffer，需要通过 stage buffer 传输数据
    #[inline]
    pub fn new_vertex_buffer(rhi: &Rhi, size: vk::DeviceSize, debug_name: &str) -> Self {
        Self::new(
            rhi,
            &vk::BufferCreateInfo::default()
                .size(size)
                .usage(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST),
            &vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            None,
            debug_name,
        )
    }

    /// device local 的 index buffer，需要通过 stage buffer 传输数据
    #[inline]
    pub fn new_index_buffer(rhi: &Rhi, size: vk::DeviceSize, debug_name: &str) -> Self {
        Self::new(
            rhi,
            &vk::BufferCreateInfo::default()
                .size(size)
                .usage(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST),
            &vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            None,
            debug_name,
        )
    }

    fn host_visible_alloc_info() -> vk_mem::AllocationCreateInfo {
        vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferHost,
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            ..Default::default()
        }
    }
}

// getter
impl RhiBuffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// 用于填充 descriptor write 的 buffer info
    #[inline]
    pub fn descriptor_buffer_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default().buffer(self.handle).offset(0).range(self.size)
    }
}

// tools
impl RhiBuffer {
    #[inline]
    pub fn map(&mut self) {
        if self.map_ptr.is_some() {
            return;
        }
        unsafe {
            self.map_ptr = Some(self.allocator.map_memory(&mut self.allocation).unwrap());
        }
    }

    /// 将数据写入 host visible 的 buffer；要求 buffer 已经处于 mapped 状态
    pub fn write_pod<T>(&mut self, data: &[T])
    where
        T: bytemuck::Pod,
    {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        debug_assert!(bytes.len() as vk::DeviceSize <= self.size);

        let ptr = self.map_ptr.unwrap_or_else(|| panic!("buffer {} is not mapped", self.debug_name));
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        }
    }

    /// 通过 stage buffer 将数据传输到 device local 的 buffer，同步等待传输完成
    pub fn transfer_data_sync<T>(&mut self, rhi: &Rhi, data: &[T])
    where
        T: bytemuck::Pod,
    {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut stage_buffer =
            Self::new_stage_buffer(rhi, bytes.len() as vk::DeviceSize, &format!("{}-stage", self.debug_name));
        stage_buffer.map();
        stage_buffer.write_pod(data);

        rhi.one_time_exec(
            |cmd| {
                cmd.cmd_copy_buffer(
                    &stage_buffer,
                    self,
                    &[vk::BufferCopy {
                        size: bytes.len() as vk::DeviceSize,
                        ..Default::default()
                    }],
                );
            },
            &format!("transfer-to-{}", self.debug_name),
        );
    }
}
