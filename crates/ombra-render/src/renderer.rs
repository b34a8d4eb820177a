//! 渲染器：把 pass graph、材质系统和 swapchain 组装成完整的一帧
//!
//! 一帧的流程：等待本帧 slot 的 fence -> acquire swapchain image ->
//! 让应用更新逐帧 buffer -> 按声明顺序录制所有 pass -> submit -> present。
//! swapchain 过期时重建所有与窗口尺寸相关的资源，并重新 resolve descriptor。

use std::{collections::HashMap, ffi::CStr, path::PathBuf, rc::Rc};

use ash::vk;
use itertools::Itertools;
use ombra_rhi::{
    core::{
        command_queue::RhiSubmitInfo,
        render_pass::{RhiAttachmentInfo, RhiFramebuffer, RhiRenderPass, RhiRenderPassDesc},
        swapchain::{RhiSurface, RhiSwapchain},
    },
    rhi::Rhi,
};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    assets::AssetStore,
    attachments::{AttachmentDesc, AttachmentSet},
    frame::{BufferKind, BufferTable, FrameController},
    graph::{AttachmentLoad, AttachmentSlot, FrameGraph, Geometry, InstanceSpec, PassTarget},
    lights::LightPartition,
    material::{
        parse::{parse_materials, parse_pipelines},
        pipeline::build_pipeline,
        registry::{MaterialId, MaterialRegistry},
    },
    resolver::{validate, LabelSets, Resolver},
};

/// 构建 Renderer 所需的全部静态描述
pub struct RendererDesc {
    pub app_name: String,
    /// manifest 文件：三行，依次是 pipelines 文件、资产清单、materials 文件
    pub manifest: PathBuf,
    pub shader_dir: PathBuf,

    pub attachments: Vec<AttachmentDesc>,
    pub graph: FrameGraph,
    /// 逐帧 buffer：label、类别、字节大小
    pub frame_buffers: Vec<(String, BufferKind, vk::DeviceSize)>,
}

/// 应用在每帧更新时能看到的内容
pub struct FrameContext<'a> {
    pub frame_index: usize,
    pub frame_count: u64,
    pub extent: vk::Extent2D,

    pub buffers: &'a mut BufferTable,

    /// 应用在更新光源 buffer 后填入两组光源的数量
    pub lights_front: u32,
    pub lights_back: u32,
}

impl FrameContext<'_> {
    /// 更新光源相关的实例数量
    pub fn set_light_partition(&mut self, partition: &LightPartition) {
        self.lights_front = partition.front_count;
        self.lights_back = partition.back_count;
    }
}

/// InstanceSpec 到 (instance_count, first_instance) 的映射
fn resolve_instances(spec: InstanceSpec, lights_front: u32, lights_back: u32) -> (u32, u32) {
    match spec {
        InstanceSpec::Fixed { count, first } => (count, first),
        InstanceSpec::LightsFront => (lights_front, 0),
        // back 组紧跟在 front 组之后，first_instance 要跳过 front 组
        InstanceSpec::LightsBack => (lights_back, lights_front),
        InstanceSpec::AllLights => (lights_front + lights_back, 0),
    }
}

pub struct Renderer {
    rhi: Rhi,
    surface: RhiSurface,
    swapchain: Option<RhiSwapchain>,

    frame_ctrl: FrameController,

    attachment_descs: Vec<AttachmentDesc>,
    attachments: AttachmentSet,

    graph: FrameGraph,
    render_passes: Vec<RhiRenderPass>,
    /// 每个 pass 的 framebuffer；渲染到 swapchain 的 pass 每个 image 一个
    framebuffers: Vec<Vec<RhiFramebuffer>>,
    /// graph 中每个 DrawItem 的材质 id，加载期解析完成
    item_materials: Vec<Vec<MaterialId>>,

    registry: MaterialRegistry,
    assets: AssetStore,
    buffers: BufferTable,
    resolver: Resolver,

    lights_front: u32,
    lights_back: u32,

    /// 窗口 resize 事件记录的新尺寸
    pending_extent: Option<vk::Extent2D>,
}

// 构建过程
impl Renderer {
    pub fn new(
        desc: RendererDesc,
        instance_extensions: Vec<&'static CStr>,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> anyhow::Result<Self> {
        let rhi = Rhi::new(desc.app_name.clone(), instance_extensions);

        let surface = RhiSurface::new(&rhi, display_handle, window_handle);
        let swapchain = RhiSwapchain::new(&rhi, &surface, window_extent);
        let extent = swapchain.extent();

        let attachment_formats: HashMap<String, vk::Format> =
            desc.attachments.iter().map(|a| (a.label.clone(), a.format)).collect();
        let attachments = AttachmentSet::build(&rhi, &desc.attachments, extent);

        let render_passes = Self::build_render_passes(&rhi, &desc.graph, &attachment_formats, swapchain.color_format());
        let framebuffers =
            Self::build_framebuffers(&rhi, &desc.graph, &render_passes, &attachments, &swapchain, extent);

        // manifest：三行，依次是 pipelines、资产清单、materials，路径相对于 manifest 所在目录
        let manifest_text = std::fs::read_to_string(&desc.manifest)?;
        let manifest_dir = desc.manifest.parent().map(PathBuf::from).unwrap_or_default();
        let mut manifest_lines = manifest_text.lines().map(str::trim).filter(|l| !l.is_empty());
        let mut next_manifest_line = |what: &str| -> anyhow::Result<PathBuf> {
            match manifest_lines.next() {
                Some(line) => Ok(manifest_dir.join(line)),
                None => {
                    log::error!("manifest {:?} is missing the {} line", desc.manifest, what);
                    anyhow::bail!("incomplete manifest")
                }
            }
        };
        let pipelines_path = next_manifest_line("pipelines")?;
        let assets_path = next_manifest_line("asset list")?;
        let materials_path = next_manifest_line("materials")?;

        let mut registry = MaterialRegistry::new();
        for pipeline_desc in parse_pipelines(&std::fs::read_to_string(&pipelines_path)?) {
            let Some(render_pass) = render_passes.get(pipeline_desc.render_pass_id as usize) else {
                log::error!(
                    "pipeline {} references render pass {} but the graph has {} passes",
                    pipeline_desc.name,
                    pipeline_desc.render_pass_id,
                    render_passes.len()
                );
                anyhow::bail!("pipeline references unknown render pass");
            };
            let pipeline = build_pipeline(&rhi, &pipeline_desc, &desc.shader_dir, render_pass);
            registry.register_pipeline(&pipeline_desc.name, Rc::new(pipeline));
        }

        let assets = AssetStore::load_list(&rhi, &assets_path)?;
        registry.register_materials(&parse_materials(&std::fs::read_to_string(&materials_path)?));

        let mut buffers = BufferTable::new();
        for (label, kind, size) in &desc.frame_buffers {
            match kind {
                BufferKind::Uniform => buffers.add_uniform(&rhi, label, *size),
                BufferKind::Storage => buffers.add_storage(&rhi, label, *size),
            }
        }

        // 加载期校验：所有符号化引用都必须能解析
        let labels = LabelSets::collect(&buffers, &assets, &attachments);
        validate(&registry, &labels)?;

        // graph 中引用的材质名也在加载期解析
        let mut item_materials = vec![];
        for pass in &desc.graph.passes {
            let mut ids = vec![];
            for item in &pass.items {
                match registry.material_id(&item.material) {
                    Some(id) => ids.push(id),
                    None => {
                        log::error!("pass {} references unknown material {}", pass.name, item.material);
                        anyhow::bail!("pass references unknown material");
                    }
                }
            }
            item_materials.push(ids);
        }

        let resolver = Resolver::new(&rhi, &registry);
        resolver.resolve(&rhi, &registry, &buffers, &assets, &attachments);

        let frame_ctrl = FrameController::new(&rhi);

        log::info!("renderer ready: {} passes, {} materials", desc.graph.passes.len(), registry.materials().len());

        Ok(Self {
            rhi,
            surface,
            swapchain: Some(swapchain),
            frame_ctrl,
            attachment_descs: desc.attachments,
            attachments,
            graph: desc.graph,
            render_passes,
            framebuffers,
            item_materials,
            registry,
            assets,
            buffers,
            resolver,
            lights_front: 0,
            lights_back: 0,
            pending_extent: None,
        })
    }

    fn slot_attachment_info(slot: &AttachmentSlot, format: vk::Format) -> RhiAttachmentInfo {
        RhiAttachmentInfo {
            format,
            load_op: match slot.load {
                AttachmentLoad::Clear => vk::AttachmentLoadOp::CLEAR,
                AttachmentLoad::Load => vk::AttachmentLoadOp::LOAD,
            },
            initial_layout: slot.initial_layout,
            final_layout: slot.final_layout,
        }
    }

    fn target_format(
        target: &PassTarget,
        formats: &HashMap<String, vk::Format>,
        swapchain_format: vk::Format,
    ) -> vk::Format {
        match target {
            PassTarget::Swapchain => swapchain_format,
            PassTarget::Transient(label) => match formats.get(label) {
                Some(format) => *format,
                None => {
                    log::error!("pass references unknown attachment {}", label);
                    vk::Format::UNDEFINED
                }
            },
        }
    }

    fn build_render_passes(
        rhi: &Rhi,
        graph: &FrameGraph,
        formats: &HashMap<String, vk::Format>,
        swapchain_format: vk::Format,
    ) -> Vec<RhiRenderPass> {
        graph
            .passes
            .iter()
            .map(|pass| {
                let desc = RhiRenderPassDesc {
                    colors: pass
                        .colors
                        .iter()
                        .map(|slot| {
                            Self::slot_attachment_info(slot, Self::target_format(&slot.target, formats, swapchain_format))
                        })
                        .collect_vec(),
                    depth: pass.depth.as_ref().map(|slot| {
                        Self::slot_attachment_info(slot, Self::target_format(&slot.target, formats, swapchain_format))
                    }),
                };
                RhiRenderPass::new(rhi, &desc, &format!("{}-render-pass", pass.name))
            })
            .collect_vec()
    }

    fn build_framebuffers(
        rhi: &Rhi,
        graph: &FrameGraph,
        render_passes: &[RhiRenderPass],
        attachments: &AttachmentSet,
        swapchain: &RhiSwapchain,
        extent: vk::Extent2D,
    ) -> Vec<Vec<RhiFramebuffer>> {
        let target_view = |target: &PassTarget, image_index: usize| -> vk::ImageView {
            match target {
                PassTarget::Swapchain => swapchain.image_view(image_index),
                PassTarget::Transient(label) => match attachments.get(label) {
                    Some(texture) => texture.view(),
                    None => {
                        log::error!("framebuffer references unknown attachment {}", label);
                        vk::ImageView::null()
                    }
                },
            }
        };

        graph
            .passes
            .iter()
            .zip(render_passes.iter())
            .map(|(pass, render_pass)| {
                // 渲染到 swapchain 的 pass，每个 swapchain image 一个 framebuffer
                let uses_swapchain = pass.colors.iter().any(|slot| slot.target == PassTarget::Swapchain);
                let count = if uses_swapchain { swapchain.image_count() } else { 1 };

                (0..count)
                    .map(|image_index| {
                        let mut views =
                            pass.colors.iter().map(|slot| target_view(&slot.target, image_index)).collect_vec();
                        if let Some(depth) = &pass.depth {
                            views.push(target_view(&depth.target, image_index));
                        }
                        RhiFramebuffer::new(
                            rhi,
                            render_pass,
                            &views,
                            extent,
                            &format!("{}-framebuffer-{}", pass.name, image_index),
                        )
                    })
                    .collect_vec()
            })
            .collect_vec()
    }
}

// 每帧的执行
impl Renderer {
    /// 记录窗口的新尺寸，下一帧开始前重建 swapchain
    pub fn resize(&mut self, extent: vk::Extent2D) {
        self.pending_extent = Some(extent);
    }

    /// 渲染一帧；update 回调负责写入逐帧 buffer
    pub fn render_frame<F>(&mut self, update: F)
    where
        F: FnOnce(&mut FrameContext),
    {
        if self.pending_extent.is_some() || self.swapchain.is_none() {
            self.rebuild_swapchain();
        }
        let Some(swapchain) = self.swapchain.as_ref() else {
            // 窗口最小化等导致 swapchain 不可用，跳过这一帧
            return;
        };
        let extent = swapchain.extent();

        let slot = self.frame_ctrl.current();
        slot.fence.wait();

        let Some(image_index) = swapchain.acquire_next_image(&slot.present_semaphore) else {
            self.swapchain = None;
            return;
        };

        slot.fence.reset();
        slot.command_pool.reset_all_buffers();

        let mut ctx = FrameContext {
            frame_index: self.frame_ctrl.frame_index(),
            frame_count: self.frame_ctrl.frame_count(),
            extent,
            buffers: &mut self.buffers,
            lights_front: self.lights_front,
            lights_back: self.lights_back,
        };
        update(&mut ctx);
        self.lights_front = ctx.lights_front;
        self.lights_back = ctx.lights_back;

        self.record_frame(image_index);

        let slot = self.frame_ctrl.current();
        let submit_info = RhiSubmitInfo::new(std::slice::from_ref(&slot.command_buffer))
            .wait(&slot.present_semaphore, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .signal(&slot.render_semaphore);
        self.rhi.graphics_queue.submit(&[submit_info], Some(&slot.fence));

        let stale = self.swapchain.as_ref().unwrap().present(
            self.rhi.graphics_queue.handle(),
            image_index,
            std::slice::from_ref(&slot.render_semaphore),
        );
        if stale {
            self.swapchain = None;
        }

        self.frame_ctrl.advance();
    }

    /// 按声明顺序录制 graph 中所有 pass
    fn record_frame(&self, image_index: u32) {
        let slot = self.frame_ctrl.current();
        let frame_index = self.frame_ctrl.frame_index();
        let swapchain = self.swapchain.as_ref().unwrap();
        let extent = swapchain.extent();
        let cmd = &slot.command_buffer;

        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "frame");

        cmd.cmd_set_viewport(
            0,
            &[vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }],
        );
        cmd.cmd_set_scissor(
            0,
            &[vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            }],
        );

        for (pass_id, pass) in self.graph.passes.iter().enumerate() {
            let uses_swapchain = pass.colors.iter().any(|slot| slot.target == PassTarget::Swapchain);
            let framebuffer =
                &self.framebuffers[pass_id][if uses_swapchain { image_index as usize } else { 0 }];

            let mut clear_values = pass
                .colors
                .iter()
                .map(|_| vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: pass.clear_color,
                    },
                })
                .collect_vec();
            if pass.depth.is_some() {
                clear_values.push(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                });
            }

            let begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(self.render_passes[pass_id].handle())
                .framebuffer(framebuffer.handle())
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            cmd.cmd_begin_render_pass(&begin_info, &pass.name);

            for (item_idx, item) in pass.items.iter().enumerate() {
                let material_id = self.item_materials[pass_id][item_idx];
                let Some(material) = self.registry.material(material_id) else {
                    continue;
                };

                // 材质的 draw 可能分属不同 pass，只录制属于当前 pass 的
                for (draw_idx, draw) in material.draws.iter().enumerate() {
                    if draw.pipeline.render_pass_id != pass_id as u32 {
                        continue;
                    }

                    cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, draw.pipeline.pipeline());
                    if !draw.pipeline.bindings.is_empty() {
                        cmd.cmd_bind_descriptor_sets(
                            vk::PipelineBindPoint::GRAPHICS,
                            draw.pipeline.pipeline_layout(),
                            0,
                            &[self.resolver.set(material_id, draw_idx, frame_index)],
                            &[],
                        );
                    }

                    match &item.geometry {
                        Geometry::Fullscreen { vertices } => {
                            cmd.cmd_draw(*vertices, 1, 0, 0);
                        }
                        Geometry::Mesh { label, instances } => {
                            let Some(mesh) = self.assets.mesh(label) else {
                                log::error!("pass {} references unknown mesh {}", pass.name, label);
                                continue;
                            };
                            let (instance_count, first_instance) =
                                resolve_instances(*instances, self.lights_front, self.lights_back);
                            if instance_count == 0 {
                                continue;
                            }
                            cmd.cmd_bind_vertex_buffers(0, &[&mesh.vertex_buffer], &[0]);
                            cmd.cmd_bind_index_buffer(&mesh.index_buffer, 0, vk::IndexType::UINT32);
                            cmd.cmd_draw_indexed(mesh.index_count, instance_count, 0, 0, first_instance);
                        }
                    }
                }
            }

            cmd.cmd_end_render_pass();
        }

        cmd.end();
    }

    /// resize 或 swapchain 过期后重建窗口尺寸相关的资源
    fn rebuild_swapchain(&mut self) {
        let extent = self.pending_extent.take();
        if let Some(extent) = extent {
            if extent.width == 0 || extent.height == 0 {
                // 最小化，等待恢复
                self.swapchain = None;
                return;
            }
        }

        self.rhi.wait_idle();

        self.framebuffers.clear();
        self.swapchain = None;

        let swapchain = RhiSwapchain::new(&self.rhi, &self.surface, extent.unwrap_or_else(|| self.attachments.extent()));
        let new_extent = swapchain.extent();

        self.attachments = AttachmentSet::build(&self.rhi, &self.attachment_descs, new_extent);
        self.framebuffers = Self::build_framebuffers(
            &self.rhi,
            &self.graph,
            &self.render_passes,
            &self.attachments,
            &swapchain,
            new_extent,
        );
        self.swapchain = Some(swapchain);

        // attachment 重建后 descriptor 里的 image view 已失效，重新 resolve
        self.resolver.resolve(&self.rhi, &self.registry, &self.buffers, &self.assets, &self.attachments);

        log::info!("swapchain rebuilt at {}x{}", new_extent.width, new_extent.height);
    }
}

// getter 与销毁
impl Renderer {
    #[inline]
    pub fn rhi(&self) -> &Rhi {
        &self.rhi
    }

    #[inline]
    pub fn registry(&self) -> &MaterialRegistry {
        &self.registry
    }

    #[inline]
    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    #[inline]
    pub fn buffers_mut(&mut self) -> &mut BufferTable {
        &mut self.buffers
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.as_ref().map(|s| s.extent()).unwrap_or_else(|| self.attachments.extent())
    }

    /// 按依赖顺序释放所有资源
    pub fn destroy(self) {
        self.rhi.wait_idle();

        self.frame_ctrl.destroy();
        drop(self.resolver);
        drop(self.registry);
        drop(self.assets);
        drop(self.buffers);
        drop(self.framebuffers);
        drop(self.render_passes);
        drop(self.attachments);
        drop(self.swapchain);
        drop(self.surface);

        self.rhi.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_instances() {
        // front 组从 0 开始，back 组紧随其后
        assert_eq!(resolve_instances(InstanceSpec::LightsFront, 280, 20), (280, 0));
        assert_eq!(resolve_instances(InstanceSpec::LightsBack, 280, 20), (20, 280));
        assert_eq!(resolve_instances(InstanceSpec::AllLights, 280, 20), (300, 0));
        assert_eq!(resolve_instances(InstanceSpec::Fixed { count: 100, first: 1 }, 280, 20), (100, 1));
    }

    #[test]
    fn test_empty_partition() {
        assert_eq!(resolve_instances(InstanceSpec::LightsBack, 300, 0), (0, 300));
        assert_eq!(resolve_instances(InstanceSpec::AllLights, 0, 0), (0, 0));
    }
}
