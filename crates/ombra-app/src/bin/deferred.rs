//! deferred lighting demo：g-buffer -> 光照叠加 -> forward 光源标记
//!
//! 点光源用半径大小的球做 proxy geometry，按相机和球的位置关系
//! 分成 front/back 两组 instanced 绘制。

use std::mem::size_of;

use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use ombra_app::{DemoApp, OmbraApp};
use ombra_render::{
    attachments::AttachmentDesc,
    frame::{BufferKind, FRAME_OVERLAP},
    graph::{AttachmentSlot, DrawItem, FrameGraph, Geometry, InstanceSpec, PassDesc, PassTarget},
    lights::{pack_view_space, partition, GpuLight, Light},
    renderer::{FrameContext, Renderer, RendererDesc},
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const NUM_LIGHTS: usize = 300;
const NUM_MONKEYS: usize = 600;
/// 每 100 只猴子共用一张贴图
const MONKEY_GROUP_SIZE: usize = 100;
const MONKEY_GROUPS: usize = NUM_MONKEYS / MONKEY_GROUP_SIZE;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CamData {
    view: Mat4,
    proj: Mat4,
    view_proj: Mat4,
}

struct DeferredDemo {
    lights: Vec<Light>,
}

impl DeferredDemo {
    fn scatter_lights(rng: &mut StdRng) -> Vec<Light> {
        (0..NUM_LIGHTS)
            .map(|_| Light {
                position: Vec3::new(rng.gen_range(-60.0..60.0), rng.gen_range(1.0..8.0), rng.gen_range(-40.0..40.0)),
                radius: rng.gen_range(4.0..10.0),
                color: Vec4::new(rng.gen_range(0.2..1.0), rng.gen_range(0.2..1.0), rng.gen_range(0.2..1.0), 1.0),
            })
            .collect()
    }

    /// 物体矩阵：0 号是地板，之后是摆成网格的猴子
    fn object_transforms() -> Vec<Mat4> {
        let mut transforms = vec![Mat4::from_scale(Vec3::new(80.0, 1.0, 60.0))];
        for i in 0..NUM_MONKEYS {
            let col = (i % 30) as f32;
            let row = (i / 30) as f32;
            transforms.push(Mat4::from_translation(Vec3::new(
                (col - 14.5) * 4.0,
                1.5,
                (row - 9.5) * 4.0,
            )));
        }
        transforms
    }
}

impl DemoApp for DeferredDemo {
    fn renderer_desc() -> RendererDesc {
        let gbuffer_format = vk::Format::R32G32B32A32_SFLOAT;
        let depth_format = vk::Format::D32_SFLOAT;

        let attachments = vec![
            AttachmentDesc::color("g_position", gbuffer_format),
            AttachmentDesc::color("g_normal", gbuffer_format),
            AttachmentDesc::color("g_albedo", gbuffer_format),
            AttachmentDesc::color("g_ao", gbuffer_format),
            AttachmentDesc::depth("g_depth", depth_format),
        ];

        let transient = |label: &str| PassTarget::Transient(label.to_string());
        let mesh = |material: &str, label: &str, instances: InstanceSpec| DrawItem {
            material: material.to_string(),
            geometry: Geometry::Mesh {
                label: label.to_string(),
                instances,
            },
        };

        // pass 0：g-buffer，四个 color attachment 都转为 shader 输入
        let mut g_pass = PassDesc::new("g-pass");
        for label in ["g_position", "g_normal", "g_albedo", "g_ao"] {
            g_pass.colors.push(AttachmentSlot::clear(transient(label), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        }
        // 深度在后续 pass 继续做测试
        g_pass.depth =
            Some(AttachmentSlot::clear(transient("g_depth"), vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
        g_pass.items.push(mesh("floor", "floor_mesh", InstanceSpec::Fixed { count: 1, first: 0 }));
        for group in 0..MONKEY_GROUPS {
            g_pass.items.push(mesh(
                &format!("monkey_{}", group),
                "monkey",
                InstanceSpec::Fixed {
                    count: MONKEY_GROUP_SIZE as u32,
                    first: (1 + group * MONKEY_GROUP_SIZE) as u32,
                },
            ));
        }

        // pass 1：光照叠加到 swapchain，depth LOAD 自 g-pass
        let mut lighting = PassDesc::new("lighting");
        lighting.colors.push(AttachmentSlot::clear(PassTarget::Swapchain, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        lighting.depth = Some(AttachmentSlot::load(
            transient("g_depth"),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ));
        lighting.items.push(DrawItem {
            material: "ambient".to_string(),
            geometry: Geometry::Fullscreen { vertices: 6 },
        });
        lighting.items.push(mesh("light_front", "sphere", InstanceSpec::LightsFront));
        lighting.items.push(mesh("light_back", "sphere", InstanceSpec::LightsBack));

        // pass 2：forward 绘制光源标记，color LOAD 后转为 present
        let mut forward = PassDesc::new("forward");
        forward.colors.push(AttachmentSlot::load(
            PassTarget::Swapchain,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ));
        forward.depth = Some(AttachmentSlot::load(
            transient("g_depth"),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ));
        forward.items.push(mesh("light_marker", "sphere", InstanceSpec::AllLights));

        let mat4_size = size_of::<Mat4>() as vk::DeviceSize;
        RendererDesc {
            app_name: "ombra-deferred".to_string(),
            manifest: "assets/deferred/manifest.txt".into(),
            shader_dir: "assets/deferred/shaders".into(),
            attachments,
            graph: FrameGraph {
                passes: vec![g_pass, lighting, forward],
            },
            frame_buffers: vec![
                ("cam_data".to_string(), BufferKind::Uniform, size_of::<CamData>() as vk::DeviceSize),
                ("obj_data".to_string(), BufferKind::Storage, (1 + NUM_MONKEYS) as vk::DeviceSize * mat4_size),
                (
                    "light_data".to_string(),
                    BufferKind::Storage,
                    NUM_LIGHTS as vk::DeviceSize * size_of::<GpuLight>() as vk::DeviceSize,
                ),
                ("light_transforms".to_string(), BufferKind::Storage, NUM_LIGHTS as vk::DeviceSize * mat4_size),
                ("light_marker_transforms".to_string(), BufferKind::Storage, NUM_LIGHTS as vk::DeviceSize * mat4_size),
            ],
        }
    }

    fn init(renderer: &mut Renderer) -> Self {
        let mut rng = StdRng::seed_from_u64(7);
        let demo = Self {
            lights: Self::scatter_lights(&mut rng),
        };

        // 场景物体是静态的，两个 in-flight 帧的 buffer 都写一次
        let transforms = Self::object_transforms();
        for frame_index in 0..FRAME_OVERLAP {
            renderer.buffers_mut().write("obj_data", frame_index, &transforms);
        }
        demo
    }

    fn update(&mut self, ctx: &mut FrameContext) {
        let aspect = ctx.extent.width as f32 / ctx.extent.height as f32;

        // 相机绕场景中心缓慢环绕
        let angle = ctx.frame_count as f32 * 0.002;
        let camera_pos = Vec3::new(angle.cos() * 45.0, 22.0, angle.sin() * 45.0);
        let view = Mat4::look_at_rh(camera_pos, Vec3::ZERO, Vec3::Y);
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 300.0);
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

        // 光源按相机位置分组，front 组在前，之后所有 buffer 都用这个顺序
        let partition = partition(camera_pos, &self.lights);
        ctx.buffers.write("light_data", ctx.frame_index, &pack_view_space(&view, &partition.ordered));

        let proxy_transforms: Vec<Mat4> = partition
            .ordered
            .iter()
            .map(|light| Mat4::from_translation(light.position) * Mat4::from_scale(Vec3::splat(light.radius)))
            .collect();
        ctx.buffers.write("light_transforms", ctx.frame_index, &proxy_transforms);

        let marker_transforms: Vec<Mat4> = partition
            .ordered
            .iter()
            .map(|light| Mat4::from_translation(light.position) * Mat4::from_scale(Vec3::splat(0.1)))
            .collect();
        ctx.buffers.write("light_marker_transforms", ctx.frame_index, &marker_transforms);

        ctx.set_light_partition(&partition);
    }
}

fn main() {
    OmbraApp::<DeferredDemo>::run();
}
