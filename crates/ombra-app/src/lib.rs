//! demo 的公共外壳：窗口、事件循环和 Renderer 的生命周期

use std::{cell::OnceCell, ffi::CStr};

use ash::vk;
use ombra_render::{
    init_log::init_log,
    renderer::{FrameContext, Renderer, RendererDesc},
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::WindowId,
};

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

/// demo 需要实现的接口
pub trait DemoApp {
    /// 静态描述：attachment、pass graph、逐帧 buffer、manifest 路径
    fn renderer_desc() -> RendererDesc;

    /// Renderer 就绪后调用一次
    fn init(renderer: &mut Renderer) -> Self
    where
        Self: Sized;

    /// 每帧调用，负责写入逐帧 buffer
    fn update(&mut self, ctx: &mut FrameContext);

    fn handle_window_event(&mut self, _event: &WindowEvent) {}
}

pub struct OmbraApp<T: DemoApp> {
    /// 需要等待窗口事件初始化，因此 OnceCell
    window: OnceCell<winit::window::Window>,
    renderer: OnceCell<Renderer>,
    demo: OnceCell<T>,
}

// 总的 main 函数
impl<T: DemoApp> OmbraApp<T> {
    /// 整个程序的入口
    pub fn run() {
        std::panic::set_hook(Box::new(panic_handler));

        init_log();

        let event_loop = winit::event_loop::EventLoop::new().unwrap();

        let mut app = Self {
            window: OnceCell::new(),
            renderer: OnceCell::new(),
            demo: OnceCell::new(),
        };
        event_loop.run_app(&mut app).unwrap();

        log::info!("end run.");

        app.destroy();
    }

    /// 在 window 创建之后调用，初始化 Renderer 和 demo
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) {
        let desc = T::renderer_desc();

        let window = event_loop
            .create_window(
                winit::window::Window::default_attributes()
                    .with_title(desc.app_name.clone())
                    .with_inner_size(winit::dpi::LogicalSize::new(1200, 800)),
            )
            .unwrap();

        // 追加 window system 需要的 instance extension，surface 相关
        let extra_instance_exts =
            ash_window::enumerate_required_extensions(event_loop.display_handle().unwrap().as_raw())
                .unwrap()
                .iter()
                .map(|ext| unsafe { CStr::from_ptr(*ext) })
                .collect();

        let window_extent = vk::Extent2D {
            width: window.inner_size().width,
            height: window.inner_size().height,
        };

        let mut renderer = Renderer::new(
            desc,
            extra_instance_exts,
            event_loop.display_handle().unwrap().as_raw(),
            window.window_handle().unwrap().as_raw(),
            window_extent,
        )
        .unwrap();

        let demo = T::init(&mut renderer);

        self.window.set(window).map_err(|_| ()).unwrap();
        self.renderer.set(renderer).map_err(|_| ()).unwrap();
        self.demo.set(demo).map_err(|_| ()).unwrap();
    }

    fn destroy(mut self) {
        if let Some(renderer) = self.renderer.take() {
            renderer.destroy();
        }
    }
}

impl<T: DemoApp> ApplicationHandler for OmbraApp<T> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");
        if self.renderer.get().is_some() {
            return;
        }
        self.init_after_window(event_loop);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let Some(demo) = self.demo.get_mut() {
            demo.handle_window_event(&event);
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(renderer) = self.renderer.get() {
                    renderer.rhi().wait_idle();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(renderer) = self.renderer.get_mut() {
                    renderer.resize(vk::Extent2D {
                        width: new_size.width,
                        height: new_size.height,
                    });
                }
            }
            WindowEvent::RedrawRequested => {
                let (Some(renderer), Some(demo)) = (self.renderer.get_mut(), self.demo.get_mut()) else {
                    return;
                };
                renderer.render_frame(|ctx| demo.update(ctx));
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.get() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
