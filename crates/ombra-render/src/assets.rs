//! 资产加载：obj 模型与贴图
//!
//! 资产清单是文本文件，每行 `m:<file>:<label>` 或 `t:<file>:<label>`，
//! 文件路径相对于清单所在目录。

use std::{
    collections::HashMap,
    mem::{offset_of, size_of},
    path::{Path, PathBuf},
};

use ash::vk;
use itertools::Itertools;
use ombra_rhi::{
    core::{buffer::RhiBuffer, image::RhiTexture2D},
    rhi::Rhi,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, normal) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, uv) as u32,
            },
        ]
    }
}

/// 上传到 gpu 的静态网格
pub struct Mesh {
    pub vertex_buffer: RhiBuffer,
    pub index_buffer: RhiBuffer,
    pub index_count: u32,
    pub name: String,
}

impl Mesh {
    /// 加载 obj 文件中的所有 shape，合并成一个网格
    pub fn load_obj(rhi: &Rhi, path: &Path, name: &str) -> anyhow::Result<Self> {
        let (models, _) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )?;

        let mut vertices: Vec<Vertex> = vec![];
        let mut indices: Vec<u32> = vec![];
        for model in &models {
            let mesh = &model.mesh;
            let base_vertex = vertices.len() as u32;

            let vertex_count = mesh.positions.len() / 3;
            for i in 0..vertex_count {
                vertices.push(Vertex {
                    position: [mesh.positions[i * 3], mesh.positions[i * 3 + 1], mesh.positions[i * 3 + 2]],
                    normal: if mesh.normals.is_empty() {
                        [0.0, 0.0, 1.0]
                    } else {
                        [mesh.normals[i * 3], mesh.normals[i * 3 + 1], mesh.normals[i * 3 + 2]]
                    },
                    uv: if mesh.texcoords.is_empty() {
                        [0.0, 0.0]
                    } else {
                        // obj 的 v 轴与 vulkan 相反
                        [mesh.texcoords[i * 2], 1.0 - mesh.texcoords[i * 2 + 1]]
                    },
                });
            }
            indices.extend(mesh.indices.iter().map(|idx| idx + base_vertex));
        }

        let mut vertex_buffer = RhiBuffer::new_vertex_buffer(
            rhi,
            (vertices.len() * size_of::<Vertex>()) as vk::DeviceSize,
            &format!("{}-vertex-buffer", name),
        );
        vertex_buffer.transfer_data_sync(rhi, &vertices);

        let mut index_buffer = RhiBuffer::new_index_buffer(
            rhi,
            (indices.len() * size_of::<u32>()) as vk::DeviceSize,
            &format!("{}-index-buffer", name),
        );
        index_buffer.transfer_data_sync(rhi, &indices);

        log::info!("loaded mesh {}: {} vertices, {} indices", name, vertices.len(), indices.len());

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            name: name.to_string(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Mesh,
    Texture,
}

/// 资产清单中的一行
#[derive(Clone, Debug, PartialEq)]
pub struct AssetEntry {
    pub kind: AssetKind,
    pub file: String,
    pub label: String,
}

/// 解析资产清单文本；无法识别的行跳过并告警
pub fn parse_asset_list(text: &str) -> Vec<AssetEntry> {
    let mut entries = vec![];
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parts = line.split(':').collect_vec();
        let [kind, file, label] = parts[..] else {
            log::warn!("skipping malformed asset line: {}", line);
            continue;
        };
        let kind = match kind {
            "m" => AssetKind::Mesh,
            "t" => AssetKind::Texture,
            _ => {
                log::warn!("unknown asset kind in line: {}", line);
                continue;
            }
        };
        entries.push(AssetEntry {
            kind,
            file: file.to_string(),
            label: label.to_string(),
        });
    }
    entries
}

/// 按 label 存放所有已加载的网格与贴图
#[derive(Default)]
pub struct AssetStore {
    meshes: HashMap<String, Mesh>,
    textures: HashMap<String, RhiTexture2D>,
}

impl AssetStore {
    /// 加载清单中列出的所有资产；单个资产加载失败会告警并跳过
    pub fn load_list(rhi: &Rhi, list_path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(list_path)?;
        let base_dir: PathBuf = list_path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut store = Self::default();
        for entry in parse_asset_list(&text) {
            let path = base_dir.join(&entry.file);
            match entry.kind {
                AssetKind::Mesh => match Mesh::load_obj(rhi, &path, &entry.label) {
                    Ok(mesh) => {
                        store.meshes.insert(entry.label, mesh);
                    }
                    Err(err) => log::warn!("failed to load mesh {:?}: {}", path, err),
                },
                AssetKind::Texture => match image::open(&path) {
                    Ok(img) => {
                        let rgba = img.to_rgba8();
                        let texture =
                            RhiTexture2D::from_rgba8(rhi, rgba.width(), rgba.height(), rgba.as_raw(), &entry.label);
                        log::info!("loaded texture {}: {}x{}", entry.label, rgba.width(), rgba.height());
                        store.textures.insert(entry.label, texture);
                    }
                    Err(err) => log::warn!("failed to load texture {:?}: {}", path, err),
                },
            }
        }
        Ok(store)
    }

    #[inline]
    pub fn mesh(&self, label: &str) -> Option<&Mesh> {
        self.meshes.get(label)
    }

    #[inline]
    pub fn texture(&self, label: &str) -> Option<&RhiTexture2D> {
        self.textures.get(label)
    }

    #[inline]
    pub fn texture_labels(&self) -> impl Iterator<Item = &String> {
        self.textures.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asset_list() {
        let text = "\
m:models/empire.obj:empire
t:textures/empire_diffuse.png:empire_diffuse

m:models/monkey.obj:monkey
";
        let entries = parse_asset_list(text);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], AssetEntry {
            kind: AssetKind::Mesh,
            file: "models/empire.obj".to_string(),
            label: "empire".to_string(),
        });
        assert_eq!(entries[1].kind, AssetKind::Texture);
        assert_eq!(entries[2].label, "monkey");
    }

    #[test]
    fn test_parse_asset_list_lenient() {
        // 缺少字段或者未知类型的行被跳过
        let text = "m:only_two_fields\nx:foo.png:foo\nt:a.png:a\n";
        let entries = parse_asset_list(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "a");
    }
}
