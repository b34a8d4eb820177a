//! SSAO demo：深度 prepass -> AO -> 模糊 -> 合成，四个 pass 的后处理链

use std::mem::size_of;

use ash::vk;
use glam::{Mat4, Vec3};
use ombra_app::{DemoApp, OmbraApp};
use ombra_render::{
    attachments::AttachmentDesc,
    frame::{BufferKind, FRAME_OVERLAP},
    graph::{AttachmentSlot, DrawItem, FrameGraph, Geometry, InstanceSpec, PassDesc, PassTarget},
    renderer::{FrameContext, Renderer, RendererDesc},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use winit::{
    event::{ElementState, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

const AO_KERNEL_SIZE: usize = 64;
const AO_ROTATION_COUNT: usize = 16;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CamData {
    view: Mat4,
    proj: Mat4,
    view_proj: Mat4,
}

/// AO 采样核与参数
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct AoData {
    samples: [[f32; 4]; AO_KERNEL_SIZE],
    rotations: [[f32; 4]; AO_ROTATION_COUNT],
    /// (radius, bias, contrast, aspect)
    rad_bias_contrast_aspect: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawMode {
    mode: [i32; 4],
}

struct SsaoDemo {
    samples: [[f32; 4]; AO_KERNEL_SIZE],
    rotations: [[f32; 4]; AO_ROTATION_COUNT],
    /// 0 = 最终画面，1 = 仅颜色，2 = 仅 AO，3 = 深度可视化
    draw_mode: i32,
}

impl SsaoDemo {
    /// 半球采样核：靠近原点的采样更密集
    fn build_kernel(rng: &mut StdRng) -> [[f32; 4]; AO_KERNEL_SIZE] {
        let mut samples = [[0.0f32; 4]; AO_KERNEL_SIZE];
        for (i, sample) in samples.iter_mut().enumerate() {
            let dir = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(0.0..1.0))
                .normalize_or_zero();
            let t = i as f32 / AO_KERNEL_SIZE as f32;
            let scale = 0.1 + t * t * (1.0 - 0.1);
            let v = dir * scale;
            *sample = [v.x, v.y, v.z, 0.0];
        }
        samples
    }

    /// 逐像素平铺的随机旋转向量，打散 banding
    fn build_rotations(rng: &mut StdRng) -> [[f32; 4]; AO_ROTATION_COUNT] {
        let mut rotations = [[0.0f32; 4]; AO_ROTATION_COUNT];
        for rotation in rotations.iter_mut() {
            *rotation = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 0.0, 0.0];
        }
        rotations
    }
}

impl DemoApp for SsaoDemo {
    fn renderer_desc() -> RendererDesc {
        let depth_format = vk::Format::D32_SFLOAT;

        let attachments = vec![
            AttachmentDesc::color("scene_color", vk::Format::R8G8B8A8_SRGB),
            AttachmentDesc::depth("scene_depth", depth_format),
            AttachmentDesc::color("ao", vk::Format::R32_SFLOAT),
            AttachmentDesc::color("blur", vk::Format::R32_SFLOAT),
            AttachmentDesc::depth("draw_depth", depth_format),
        ];

        let transient = |label: &str| PassTarget::Transient(label.to_string());

        // pass 0：场景 prepass，颜色和深度之后都作为 shader 输入
        let mut prepass = PassDesc::new("prepass");
        prepass.colors.push(AttachmentSlot::clear(transient("scene_color"), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        prepass.depth = Some(AttachmentSlot::clear(transient("scene_depth"), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        prepass.items.push(DrawItem {
            material: "empire".to_string(),
            geometry: Geometry::Mesh {
                label: "empire".to_string(),
                instances: InstanceSpec::Fixed { count: 1, first: 0 },
            },
        });

        // pass 1：从深度重建 AO
        let mut ao_pass = PassDesc::new("ao");
        ao_pass.colors.push(AttachmentSlot::clear(transient("ao"), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        ao_pass.items.push(DrawItem {
            material: "ao".to_string(),
            geometry: Geometry::Fullscreen { vertices: 6 },
        });

        // pass 2：模糊 AO
        let mut blur_pass = PassDesc::new("blur");
        blur_pass.colors.push(AttachmentSlot::clear(transient("blur"), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        blur_pass.items.push(DrawItem {
            material: "blur".to_string(),
            geometry: Geometry::Fullscreen { vertices: 6 },
        });

        // pass 3：合成到 swapchain
        let mut composite = PassDesc::new("composite");
        composite.colors.push(AttachmentSlot::clear(PassTarget::Swapchain, vk::ImageLayout::PRESENT_SRC_KHR));
        composite.depth =
            Some(AttachmentSlot::clear(transient("draw_depth"), vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
        composite.items.push(DrawItem {
            material: "composite".to_string(),
            geometry: Geometry::Fullscreen { vertices: 6 },
        });

        RendererDesc {
            app_name: "ombra-ssao".to_string(),
            manifest: "assets/ssao/manifest.txt".into(),
            shader_dir: "assets/ssao/shaders".into(),
            attachments,
            graph: FrameGraph {
                passes: vec![prepass, ao_pass, blur_pass, composite],
            },
            frame_buffers: vec![
                ("cam_data".to_string(), BufferKind::Uniform, size_of::<CamData>() as vk::DeviceSize),
                ("ao_data".to_string(), BufferKind::Uniform, size_of::<AoData>() as vk::DeviceSize),
                ("draw_mode".to_string(), BufferKind::Uniform, size_of::<DrawMode>() as vk::DeviceSize),
                ("obj_data".to_string(), BufferKind::Storage, size_of::<Mat4>() as vk::DeviceSize),
            ],
        }
    }

    fn init(renderer: &mut Renderer) -> Self {
        let mut rng = StdRng::seed_from_u64(0);
        let demo = Self {
            samples: Self::build_kernel(&mut rng),
            rotations: Self::build_rotations(&mut rng),
            draw_mode: 0,
        };

        // 场景是静态的，物体矩阵只需要写一次
        for frame_index in 0..FRAME_OVERLAP {
            renderer.buffers_mut().write("obj_data", frame_index, &[Mat4::IDENTITY]);
        }
        demo
    }

    fn update(&mut self, ctx: &mut FrameContext) {
        let aspect = ctx.extent.width as f32 / ctx.extent.height as f32;

        let view = Mat4::look_at_rh(Vec3::new(0.0, -6.0, -10.0), Vec3::ZERO, Vec3::Y);
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 200.0);
        // gl 风格的投影矩阵，翻转 y 适配 vulkan 的 clip space
        proj.y_axis.y *= -1.0;

        ctx.buffers.write(
            "cam_data",
            ctx.frame_index,
            &[CamData {
                view,
                proj,
                view_proj: proj * view,
            }],
        );
        ctx.buffers.write(
            "ao_data",
            ctx.frame_index,
            &[AoData {
                samples: self.samples,
                rotations: self.rotations,
                rad_bias_contrast_aspect: [0.65, 0.05, 2.9, aspect],
            }],
        );
        ctx.buffers.write(
            "draw_mode",
            ctx.frame_index,
            &[DrawMode {
                mode: [self.draw_mode, 0, 0, 0],
            }],
        );
    }

    fn handle_window_event(&mut self, event: &WindowEvent) {
        // 数字键 1-4 切换显示模式
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return;
        };
        if event.state != ElementState::Pressed {
            return;
        }
        let mode = match event.physical_key {
            PhysicalKey::Code(KeyCode::Digit1) => 0,
            PhysicalKey::Code(KeyCode::Digit2) => 1,
            PhysicalKey::Code(KeyCode::Digit3) => 2,
            PhysicalKey::Code(KeyCode::Digit4) => 3,
            _ => return,
        };
        if mode != self.draw_mode {
            log::info!("draw mode: {}", mode);
            self.draw_mode = mode;
        }
    }
}

fn main() {
    OmbraApp::<SsaoDemo>::run();
}
