use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    core::{image::RhiImageView2D, synchronize::RhiSemaphore},
    rhi::Rhi,
};

pub struct RhiSurface {
    handle: vk::SurfaceKHR,
    pf: ash::khr::surface::Instance,
}

impl Drop for RhiSurface {
    fn drop(&mut self) {
        unsafe {
            self.pf.destroy_surface(self.handle, None);
        }
    }
}

impl RhiSurface {
    pub fn new(rhi: &Rhi, display_handle: RawDisplayHandle, window_handle: RawWindowHandle) -> Self {
        let surface_pf = ash::khr::surface::Instance::new(&rhi.vk_pf, &rhi.instance.handle);

        let surface = unsafe {
            ash_window::create_surface(&rhi.vk_pf, &rhi.instance.handle, display_handle, window_handle, None).unwrap()
        };

        Self {
            handle: surface,
            pf: surface_pf,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn pf(&self) -> &ash::khr::surface::Instance {
        &self.pf
    }
}

pub struct RhiSwapchain {
    handle: vk::SwapchainKHR,
    swapchain_pf: ash::khr::swapchain::Device,

    images: Vec<vk::Image>,
    image_views: Vec<RhiImageView2D>,

    color_format: vk::Format,
    extent: vk::Extent2D,
}

impl Drop for RhiSwapchain {
    fn drop(&mut self) {
        // image 归 swapchain 所有，只需要销毁 view 和 swapchain 本身
        self.image_views.clear();
        unsafe {
            self.swapchain_pf.destroy_swapchain(self.handle, None);
        }
    }
}

impl RhiSwapchain {
    pub fn new(rhi: &Rhi, surface: &RhiSurface, window_extent: vk::Extent2D) -> Self {
        let pdevice = rhi.device.pdevice.handle;
        let capabilities =
            unsafe { surface.pf().get_physical_device_surface_capabilities(pdevice, surface.handle()).unwrap() };
        let formats = unsafe { surface.pf().get_physical_device_surface_formats(pdevice, surface.handle()).unwrap() };

        // 优先 B8G8R8A8_UNORM + SRGB_NONLINEAR，找不到就用第一个
        let surface_format = formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .unwrap_or(&formats[0])
            .to_owned();

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: window_extent.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: window_extent.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let swapchain_ci = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            // FIFO 一定受支持，且没有 tearing
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let swapchain_pf = ash::khr::swapchain::Device::new(&rhi.instance.handle, rhi.device());
        let swapchain = unsafe { swapchain_pf.create_swapchain(&swapchain_ci, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(swapchain, "main-swapchain");

        let images = unsafe { swapchain_pf.get_swapchain_images(swapchain).unwrap() };
        let image_views = images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                rhi.device.debug_utils().set_object_debug_name(*image, &format!("swapchain-image-{}", idx));
                RhiImageView2D::new_raw(
                    rhi,
                    *image,
                    surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                    &format!("swapchain-image-view-{}", idx),
                )
            })
            .collect_vec();

        log::info!("swapchain created: {}x{}, {:?}, {} images", extent.width, extent.height, surface_format.format, images.len());

        Self {
            handle: swapchain,
            swapchain_pf,
            images,
            image_views,
            color_format: surface_format.format,
            extent,
        }
    }

    /// 获取下一个可用的 swapchain image 的索引
    ///
    /// 返回 None 表示 swapchain 已经过期，需要重建
    pub fn acquire_next_image(&self, semaphore: &RhiSemaphore) -> Option<u32> {
        let result = unsafe {
            self.swapchain_pf.acquire_next_image(self.handle, u64::MAX, semaphore.handle(), vk::Fence::null())
        };
        match result {
            // SUBOPTIMAL 时 image 仍然可用，等 present 之后再重建
            Ok((image_index, _suboptimal)) => Some(image_index),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => None,
            Err(err) => panic!("failed to acquire swapchain image: {:?}", err),
        }
    }

    /// 提交 present 请求
    ///
    /// 返回 true 表示 swapchain 已经过期或者不再匹配，需要重建
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphores: &[RhiSemaphore]) -> bool {
        let wait_semaphores = wait_semaphores.iter().map(|s| s.handle()).collect_vec();
        let image_indices = [image_index];
        let swapchains = [self.handle];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_pf.queue_present(queue, &present_info) };
        match result {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(err) => panic!("failed to present swapchain image: {:?}", err),
        }
    }
}

/// getter
impl RhiSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index].handle()
    }

    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }
}
