use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::{
    core::{allocator::RhiAllocator, buffer::RhiBuffer, device::RhiDevice},
    rhi::Rhi,
};

/// 2D image 的封装，内存通过 vk-mem 分配，device local
pub struct RhiImage2D {
    handle: vk::Image,
    allocation: vk_mem::Allocation,

    format: vk::Format,
    extent: vk::Extent2D,

    debug_name: String,

    allocator: Rc<RhiAllocator>,
    _device: Rc<RhiDevice>,
}

impl Drop for RhiImage2D {
    fn drop(&mut self) {
        unsafe {
            self.allocator.destroy_image(self.handle, &mut self.allocation);
        }
    }
}

impl RhiImage2D {
    pub fn new(rhi: &Rhi, format: vk::Format, extent: vk::Extent2D, usage: vk::ImageUsageFlags, debug_name: &str) -> Self {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, allocation) = unsafe { rhi.allocator.create_image(&image_ci, &alloc_ci).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(image, debug_name);

        Self {
            handle: image,
            allocation,
            format,
            extent,
            debug_name: debug_name.to_string(),
            allocator: rhi.allocator.clone(),
            _device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

pub struct RhiImageView2D {
    handle: vk::ImageView,
    device: Rc<RhiDevice>,
}

impl Drop for RhiImageView2D {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}

impl RhiImageView2D {
    pub fn new(rhi: &Rhi, image: &RhiImage2D, aspect: vk::ImageAspectFlags, debug_name: &str) -> Self {
        Self::new_raw(rhi, image.handle(), image.format(), aspect, debug_name)
    }

    /// swapchain image 这类不由 RhiImage2D 管理的 image 也需要创建 view
    pub fn new_raw(
        rhi: &Rhi,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        debug_name: &str,
    ) -> Self {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default().aspect_mask(aspect).level_count(1).layer_count(1),
            );

        let view = unsafe { rhi.device().create_image_view(&view_ci, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(view, debug_name);
        Self {
            handle: view,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }
}

pub struct RhiSampler {
    handle: vk::Sampler,
    device: Rc<RhiDevice>,
}

impl Drop for RhiSampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.handle, None);
        }
    }
}

impl RhiSampler {
    /// render target 采样使用 nearest，避免插值污染数据
    pub fn new_nearest(rhi: &Rhi, debug_name: &str) -> Self {
        let sampler_ci = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE);
        Self::new(rhi, &sampler_ci, debug_name)
    }

    /// 贴图采样使用 linear + repeat
    pub fn new_linear(rhi: &Rhi, debug_name: &str) -> Self {
        let sampler_ci = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(rhi.device.pdevice.basic_props.limits.max_sampler_anisotropy);
        Self::new(rhi, &sampler_ci, debug_name)
    }

    fn new(rhi: &Rhi, sampler_ci: &vk::SamplerCreateInfo, debug_name: &str) -> Self {
        let sampler = unsafe { rhi.device().create_sampler(sampler_ci, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(sampler, debug_name);
        Self {
            handle: sampler,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}

/// image + view + sampler，可以直接绑定到 combined image sampler
pub struct RhiTexture2D {
    image: RhiImage2D,
    view: RhiImageView2D,
    sampler: RhiSampler,
}

impl RhiTexture2D {
    /// 从 RGBA8 的像素数据创建贴图，经过 stage buffer 上传
    pub fn from_rgba8(rhi: &Rhi, width: u32, height: u32, pixels: &[u8], debug_name: &str) -> Self {
        let extent = vk::Extent2D { width, height };
        let image = RhiImage2D::new(
            rhi,
            vk::Format::R8G8B8A8_SRGB,
            extent,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            debug_name,
        );

        let mut stage_buffer =
            RhiBuffer::new_stage_buffer(rhi, pixels.len() as vk::DeviceSize, &format!("{}-stage", debug_name));
        stage_buffer.map();
        stage_buffer.write_pod(pixels);

        let subresource_range =
            vk::ImageSubresourceRange::default().aspect_mask(vk::ImageAspectFlags::COLOR).level_count(1).layer_count(1);

        rhi.one_time_exec(
            |cmd| {
                // UNDEFINED -> TRANSFER_DST
                cmd.cmd_image_memory_barrier(
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    &[vk::ImageMemoryBarrier::default()
                        .image(image.handle())
                        .old_layout(vk::ImageLayout::UNDEFINED)
                        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .src_access_mask(vk::AccessFlags::empty())
                        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                        .subresource_range(subresource_range)],
                );

                cmd.cmd_copy_buffer_to_image(
                    &stage_buffer,
                    image.handle(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[vk::BufferImageCopy::default()
                        .image_subresource(
                            vk::ImageSubresourceLayers::default()
                                .aspect_mask(vk::ImageAspectFlags::COLOR)
                                .layer_count(1),
                        )
                        .image_extent(vk::Extent3D {
                            width,
                            height,
                            depth: 1,
                        })],
                );

                // TRANSFER_DST -> SHADER_READ_ONLY
                cmd.cmd_image_memory_barrier(
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    &[vk::ImageMemoryBarrier::default()
                        .image(image.handle())
                        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                        .dst_access_mask(vk::AccessFlags::SHADER_READ)
                        .subresource_range(subresource_range)],
                );
            },
            &format!("upload-{}", debug_name),
        );

        let view = RhiImageView2D::new(rhi, &image, vk::ImageAspectFlags::COLOR, &format!("{}-view", debug_name));
        let sampler = RhiSampler::new_linear(rhi, &format!("{}-sampler", debug_name));

        Self { image, view, sampler }
    }

    /// 可以被 shader 采样的 render target
    pub fn new_render_target(
        rhi: &Rhi,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        debug_name: &str,
    ) -> Self {
        let image = RhiImage2D::new(rhi, format, extent, usage, debug_name);
        let view = RhiImageView2D::new(rhi, &image, aspect, &format!("{}-view", debug_name));
        let sampler = RhiSampler::new_nearest(rhi, &format!("{}-sampler", debug_name));
        Self { image, view, sampler }
    }

    #[inline]
    pub fn image(&self) -> &RhiImage2D {
        &self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    /// 用于填充 descriptor write 的 image info
    #[inline]
    pub fn descriptor_image_info(&self, layout: vk::ImageLayout) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default().sampler(self.sampler.handle()).image_view(self.view.handle()).image_layout(layout)
    }
}
