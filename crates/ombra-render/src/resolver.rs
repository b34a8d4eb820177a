//! 将材质中的符号化资源引用解析成 descriptor set
//!
//! 解析分两步：加载期先用 [`validate`] 校验所有引用都能找到对应资源，
//! 引用了不存在的 label 直接报错退出，而不是渲染时才发现；
//! 之后 [`Resolver::resolve`] 把实际的 buffer/image 写入 descriptor。
//! resize 之后 attachment 重建，需要重新 resolve。

use std::collections::{HashMap, HashSet};

use ash::vk;
use ombra_rhi::{core::descriptor::RhiDescriptorPool, rhi::Rhi};

use crate::{
    assets::AssetStore,
    attachments::AttachmentSet,
    frame::{BufferKind, BufferTable, FRAME_OVERLAP},
    material::{
        parse::{BindingRef, ResourceTag},
        pipeline::{BindingDesc, BindingKind},
        registry::{MaterialId, MaterialRegistry},
    },
};

/// 当前可供解析的所有 label
#[derive(Default, Clone, Debug)]
pub struct LabelSets {
    pub uniforms: HashSet<String>,
    pub storages: HashSet<String>,
    pub textures: HashSet<String>,
    pub attachments: HashSet<String>,
}

impl LabelSets {
    pub fn collect(buffers: &BufferTable, assets: &AssetStore, attachments: &AttachmentSet) -> Self {
        let mut sets = Self::default();
        for label in buffers.labels() {
            match buffers.kind(label) {
                Some(BufferKind::Uniform) => {
                    sets.uniforms.insert(label.clone());
                }
                Some(BufferKind::Storage) => {
                    sets.storages.insert(label.clone());
                }
                None => {}
            }
        }
        sets.textures.extend(assets.texture_labels().cloned());
        sets.attachments.extend(attachments.labels().cloned());
        sets
    }

    fn contains(&self, binding: &BindingRef) -> bool {
        match binding.tag {
            ResourceTag::Uniform => self.uniforms.contains(&binding.label),
            ResourceTag::Storage => self.storages.contains(&binding.label),
            ResourceTag::Texture => self.textures.contains(&binding.label),
            ResourceTag::Attachment => self.attachments.contains(&binding.label),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolveIssue {
    /// 引用的 label 在对应的资源集合中不存在
    MissingLabel {
        material: String,
        pipeline: String,
        binding: BindingRef,
    },
    /// 引用的资源类别和 shader 声明的 binding 类型不一致
    KindMismatch {
        material: String,
        pipeline: String,
        binding_index: u32,
        expected: BindingKind,
        got: ResourceTag,
    },
    /// 材质给出的引用数量和 shader 声明的 binding 数量不一致
    CountMismatch {
        material: String,
        pipeline: String,
        expected: usize,
        got: usize,
    },
}

impl std::fmt::Display for ResolveIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingLabel {
                material,
                pipeline,
                binding,
            } => {
                write!(f, "material {} (pipeline {}): no resource named {}", material, pipeline, binding.serialize())
            }
            Self::KindMismatch {
                material,
                pipeline,
                binding_index,
                expected,
                got,
            } => write!(
                f,
                "material {} (pipeline {}): binding {} expects {:?} but reference is {:?}",
                material, pipeline, binding_index, expected, got
            ),
            Self::CountMismatch {
                material,
                pipeline,
                expected,
                got,
            } => write!(
                f,
                "material {} (pipeline {}): pipeline declares {} bindings but material provides {}",
                material, pipeline, expected, got
            ),
        }
    }
}

/// 资源类别和 binding 类型是否匹配；texture 和 attachment 都是 combined image sampler
fn tag_matches(tag: ResourceTag, kind: BindingKind) -> bool {
    match tag {
        ResourceTag::Uniform => kind == BindingKind::UniformBuffer,
        ResourceTag::Storage => kind == BindingKind::StorageBuffer,
        ResourceTag::Texture | ResourceTag::Attachment => kind == BindingKind::CombinedImageSampler,
    }
}

/// 校验一次 draw 的资源引用；expected 是 pipeline 推导出的 binding 表
pub fn plan_draw(
    material: &str,
    pipeline: &str,
    expected: &[BindingDesc],
    refs: &[BindingRef],
    labels: &LabelSets,
) -> Vec<ResolveIssue> {
    let mut issues = vec![];

    if expected.len() != refs.len() {
        issues.push(ResolveIssue::CountMismatch {
            material: material.to_string(),
            pipeline: pipeline.to_string(),
            expected: expected.len(),
            got: refs.len(),
        });
    }

    for (desc, binding) in expected.iter().zip(refs.iter()) {
        if !tag_matches(binding.tag, desc.kind) {
            issues.push(ResolveIssue::KindMismatch {
                material: material.to_string(),
                pipeline: pipeline.to_string(),
                binding_index: desc.index,
                expected: desc.kind,
                got: binding.tag,
            });
            continue;
        }
        if !labels.contains(binding) {
            issues.push(ResolveIssue::MissingLabel {
                material: material.to_string(),
                pipeline: pipeline.to_string(),
                binding: binding.clone(),
            });
        }
    }
    issues
}

/// 校验注册表中所有材质的资源引用
pub fn plan(registry: &MaterialRegistry, labels: &LabelSets) -> Vec<ResolveIssue> {
    let mut issues = vec![];
    for material in registry.materials() {
        for draw in &material.draws {
            issues.extend(plan_draw(&material.name, &draw.pipeline.name, &draw.pipeline.bindings, &draw.bindings, labels));
        }
    }
    issues
}

/// 加载期校验：任何一个引用无法解析都是致命错误
pub fn validate(registry: &MaterialRegistry, labels: &LabelSets) -> anyhow::Result<()> {
    let issues = plan(registry, labels);
    for issue in &issues {
        log::error!("{}", issue);
    }
    if issues.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} unresolved material bindings", issues.len())
    }
}

/// 持有所有材质的 descriptor set，并负责把实际资源写进去
pub struct Resolver {
    pool: RhiDescriptorPool,
    /// (material, draw) -> 每个 in-flight 帧一个 set
    sets: HashMap<(MaterialId, usize), Vec<vk::DescriptorSet>>,
}

impl Resolver {
    /// 为注册表中每个 (material, draw) 分配 FRAME_OVERLAP 个 descriptor set
    pub fn new(rhi: &Rhi, registry: &MaterialRegistry) -> Self {
        let total_sets = registry.materials().iter().map(|m| m.draws.len()).sum::<usize>() * FRAME_OVERLAP;
        let pool = RhiDescriptorPool::new(rhi, (total_sets as u32).max(1), "resolver-descriptor-pool");

        let mut sets = HashMap::new();
        for (material_id, material) in registry.materials().iter().enumerate() {
            for (draw_idx, draw) in material.draws.iter().enumerate() {
                let allocated = pool.alloc(
                    &draw.pipeline.descriptor_layout,
                    FRAME_OVERLAP,
                    &format!("{}-draw{}-set", material.name, draw_idx),
                );
                sets.insert((material_id, draw_idx), allocated);
            }
        }

        Self { pool, sets }
    }

    #[inline]
    pub fn set(&self, material: MaterialId, draw: usize, frame_index: usize) -> vk::DescriptorSet {
        self.sets[&(material, draw)][frame_index]
    }

    /// 将 label 对应的实际资源写入所有 descriptor set
    ///
    /// attachment 在 resize 时重建，所以每次 resize 后都要重新执行
    pub fn resolve(
        &self,
        rhi: &Rhi,
        registry: &MaterialRegistry,
        buffers: &BufferTable,
        assets: &AssetStore,
        attachments: &AttachmentSet,
    ) {
        for (material_id, material) in registry.materials().iter().enumerate() {
            for (draw_idx, draw) in material.draws.iter().enumerate() {
                for frame_index in 0..FRAME_OVERLAP {
                    let set = self.set(material_id, draw_idx, frame_index);
                    for (desc, binding) in draw.pipeline.bindings.iter().zip(draw.bindings.iter()) {
                        self.write_binding(rhi, set, desc, binding, frame_index, buffers, assets, attachments);
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_binding(
        &self,
        rhi: &Rhi,
        set: vk::DescriptorSet,
        desc: &BindingDesc,
        binding: &BindingRef,
        frame_index: usize,
        buffers: &BufferTable,
        assets: &AssetStore,
        attachments: &AttachmentSet,
    ) {
        let write = vk::WriteDescriptorSet::default().dst_set(set).dst_binding(desc.index).descriptor_count(1);

        match binding.tag {
            ResourceTag::Uniform | ResourceTag::Storage => {
                // validate 已经保证 label 存在
                let Some(info) = buffers.buffer_info(&binding.label, frame_index) else {
                    log::error!("buffer label {} disappeared after validation", binding.label);
                    return;
                };
                let infos = [info];
                let descriptor_type = if binding.tag == ResourceTag::Uniform {
                    vk::DescriptorType::UNIFORM_BUFFER
                } else {
                    vk::DescriptorType::STORAGE_BUFFER
                };
                let write = write.descriptor_type(descriptor_type).buffer_info(&infos);
                unsafe {
                    rhi.device().update_descriptor_sets(std::slice::from_ref(&write), &[]);
                }
            }
            ResourceTag::Texture | ResourceTag::Attachment => {
                let texture = if binding.tag == ResourceTag::Texture {
                    assets.texture(&binding.label)
                } else {
                    attachments.get(&binding.label)
                };
                let Some(texture) = texture else {
                    log::error!("image label {} disappeared after validation", binding.label);
                    return;
                };
                let infos = [texture.descriptor_image_info(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
                let write = write.descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER).image_info(&infos);
                unsafe {
                    rhi.device().update_descriptor_sets(std::slice::from_ref(&write), &[]);
                }
            }
        }
    }

    #[inline]
    pub fn pool(&self) -> &RhiDescriptorPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::parse::ShaderStageKind;

    fn binding_desc(index: u32, kind: BindingKind) -> BindingDesc {
        BindingDesc {
            index,
            kind,
            stage: ShaderStageKind::Fragment,
        }
    }

    fn binding_ref(tag: ResourceTag, label: &str) -> BindingRef {
        BindingRef {
            tag,
            label: label.to_string(),
        }
    }

    fn labels() -> LabelSets {
        let mut sets = LabelSets::default();
        sets.uniforms.insert("cam_data".to_string());
        sets.storages.insert("obj_data".to_string());
        sets.textures.insert("empire_diffuse".to_string());
        sets.attachments.insert("g_normal".to_string());
        sets
    }

    #[test]
    fn test_plan_ok() {
        let expected = vec![
            binding_desc(0, BindingKind::UniformBuffer),
            binding_desc(1, BindingKind::StorageBuffer),
            binding_desc(2, BindingKind::CombinedImageSampler),
            binding_desc(3, BindingKind::CombinedImageSampler),
        ];
        let refs = vec![
            binding_ref(ResourceTag::Uniform, "cam_data"),
            binding_ref(ResourceTag::Storage, "obj_data"),
            binding_ref(ResourceTag::Texture, "empire_diffuse"),
            // attachment 和 texture 都可以绑定到 combined image sampler
            binding_ref(ResourceTag::Attachment, "g_normal"),
        ];

        let issues = plan_draw("empire", "geometry", &expected, &refs, &labels());
        assert!(issues.is_empty());
    }

    #[test]
    fn test_plan_missing_label() {
        let expected = vec![binding_desc(0, BindingKind::UniformBuffer)];
        let refs = vec![binding_ref(ResourceTag::Uniform, "not_there")];

        let issues = plan_draw("empire", "geometry", &expected, &refs, &labels());
        assert_eq!(issues.len(), 1);
        assert!(matches!(&issues[0], ResolveIssue::MissingLabel { binding, .. } if binding.label == "not_there"));
    }

    #[test]
    fn test_plan_kind_mismatch() {
        // label 存在但在别的集合里：类别不匹配优先报告
        let expected = vec![binding_desc(0, BindingKind::StorageBuffer)];
        let refs = vec![binding_ref(ResourceTag::Uniform, "cam_data")];

        let issues = plan_draw("empire", "geometry", &expected, &refs, &labels());
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], ResolveIssue::KindMismatch { binding_index: 0, .. }));
    }

    #[test]
    fn test_plan_count_mismatch() {
        let expected = vec![
            binding_desc(0, BindingKind::UniformBuffer),
            binding_desc(1, BindingKind::StorageBuffer),
        ];
        let refs = vec![binding_ref(ResourceTag::Uniform, "cam_data")];

        let issues = plan_draw("empire", "geometry", &expected, &refs, &labels());
        assert!(issues.iter().any(|i| matches!(i, ResolveIssue::CountMismatch { expected: 2, got: 1, .. })));
    }

    #[test]
    fn test_plan_is_idempotent() {
        // 重复校验同一份数据得到同样的结果，resize 后重跑是安全的
        let expected = vec![binding_desc(0, BindingKind::CombinedImageSampler)];
        let refs = vec![binding_ref(ResourceTag::Attachment, "g_normal")];
        let labels = labels();

        let first = plan_draw("light", "lighting", &expected, &refs, &labels);
        let second = plan_draw("light", "lighting", &expected, &refs, &labels);
        assert_eq!(first, second);
        assert!(first.is_empty());
    }
}
