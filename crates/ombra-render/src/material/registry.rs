//! 材质注册表
//!
//! 材质按注册顺序获得稳定的 id，场景中的物体只持有 id；
//! 材质名到 id 的映射用于加载期的查找。

use std::{collections::HashMap, rc::Rc};

use crate::material::{
    parse::{BindingRef, MaterialDesc},
    pipeline::CompiledPipeline,
};

pub type MaterialId = usize;

/// 材质的一次 draw：pipeline + 符号化的资源引用
///
/// bindings 的顺序与 pipeline 推导出的 binding 表一一对应
pub struct MaterialDraw {
    pub pipeline: Rc<CompiledPipeline>,
    pub bindings: Vec<BindingRef>,
}

pub struct Material {
    pub name: String,
    pub draws: Vec<MaterialDraw>,
}

#[derive(Default)]
pub struct MaterialRegistry {
    materials: Vec<Material>,
    ids: HashMap<String, MaterialId>,

    pipelines: HashMap<String, Rc<CompiledPipeline>>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册构建完成的 pipeline，供后续材质按名字引用
    pub fn register_pipeline(&mut self, name: &str, pipeline: Rc<CompiledPipeline>) {
        if self.pipelines.insert(name.to_string(), pipeline).is_some() {
            log::warn!("pipeline {} registered twice, overwriting", name);
        }
    }

    /// 注册一批材质描述
    ///
    /// 引用了不存在的 pipeline 的 draw 会被跳过并告警
    pub fn register_materials(&mut self, descs: &[MaterialDesc]) {
        for desc in descs {
            let mut draws = vec![];
            for draw in &desc.draws {
                let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
                    log::warn!("material {} references unknown pipeline {}, skipping draw", desc.name, draw.pipeline);
                    continue;
                };
                draws.push(MaterialDraw {
                    pipeline: pipeline.clone(),
                    bindings: draw.bindings.clone(),
                });
            }

            let id = self.materials.len();
            self.ids.insert(desc.name.clone(), id);
            self.materials.push(Material {
                name: desc.name.clone(),
                draws,
            });
        }
    }

    /// 按 id 取材质；越界的 id 报错并退回 0 号材质，注册表为空时返回 None，不会 panic
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        if id >= self.materials.len() {
            log::error!("material id {} out of range ({} materials), using material 0", id, self.materials.len());
            return self.materials.first();
        }
        Some(&self.materials[id])
    }

    #[inline]
    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.ids.get(name).copied()
    }

    #[inline]
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    #[inline]
    pub fn pipeline(&self, name: &str) -> Option<&Rc<CompiledPipeline>> {
        self.pipelines.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::parse::MaterialDesc;

    // 不创建 vk 资源：材质可以没有任何 draw
    fn desc(name: &str) -> MaterialDesc {
        MaterialDesc {
            name: name.to_string(),
            draws: vec![],
        }
    }

    #[test]
    fn test_ids_follow_registration_order() {
        let mut registry = MaterialRegistry::new();
        registry.register_materials(&[desc("floor"), desc("monkey"), desc("light")]);

        assert_eq!(registry.material_id("floor"), Some(0));
        assert_eq!(registry.material_id("monkey"), Some(1));
        assert_eq!(registry.material_id("light"), Some(2));
        assert_eq!(registry.material(1).unwrap().name, "monkey");
    }

    #[test]
    fn test_unknown_name() {
        let mut registry = MaterialRegistry::new();
        registry.register_materials(&[desc("floor")]);
        assert_eq!(registry.material_id("missing"), None);
    }

    #[test]
    fn test_out_of_range_id_falls_back() {
        let mut registry = MaterialRegistry::new();
        registry.register_materials(&[desc("floor"), desc("monkey")]);

        // 越界的 id 不 panic，退回 0 号材质
        assert_eq!(registry.material(99).unwrap().name, "floor");
    }

    #[test]
    fn test_empty_registry_has_no_fallback() {
        let registry = MaterialRegistry::new();

        // 空注册表没有 0 号材质可退，返回 None 而不是 panic
        assert!(registry.material(0).is_none());
        assert!(registry.material(99).is_none());
    }

    #[test]
    fn test_unknown_pipeline_draw_skipped() {
        let mut registry = MaterialRegistry::new();
        let desc = MaterialDesc {
            name: "broken".to_string(),
            draws: vec![crate::material::parse::DrawDesc {
                pipeline: "does_not_exist".to_string(),
                bindings: vec![],
            }],
        };
        registry.register_materials(&[desc]);

        // 材质本身保留，引用不存在 pipeline 的 draw 被丢弃
        assert_eq!(registry.material_id("broken"), Some(0));
        assert!(registry.material(0).unwrap().draws.is_empty());
    }
}
