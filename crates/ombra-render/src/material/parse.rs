//! pipeline 与 material 的文本描述格式
//!
//! 渲染管线不写死在代码里，而是由文本文件驱动：
//! pipelines 文件描述每条管线的 shader 和固定功能状态，
//! materials 文件将管线与符号化的资源名组合成材质。

/// shader 阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
}

/// 单个 shader 阶段的描述，包括其消耗的资源数量
///
/// 资源数量决定了 descriptor set layout：按照 shader 声明顺序，
/// 每个 shader 内先是 uniform buffer，再是 storage buffer，最后是 texture
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderStageDesc {
    pub stage: ShaderStageKind,
    pub file: String,
    pub uniform_count: u32,
    pub storage_count: u32,
    pub texture_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthCompare {
    LessOrEqual,
    GreaterOrEqual,
    Equal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullMode {
    Back,
    Front,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    Disabled,
    /// src * 1 + dst * 1，用于光照叠加
    Additive,
    /// src * alpha + dst * (1 - alpha)
    Alpha,
}

/// 一条 pipeline 的完整描述；文本文件中未出现的项使用默认值
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineDesc {
    pub name: String,
    pub stages: Vec<ShaderStageDesc>,

    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: DepthCompare,
    pub cull: CullMode,
    /// false 表示 fullscreen pass，顶点由 shader 自行生成
    pub vertex_input: bool,
    pub blend: BlendMode,

    /// 该 pipeline 所属的 render pass 在 pass graph 中的编号
    pub render_pass_id: u32,
    /// render pass 的 color attachment 数量，blend state 需要逐个声明
    pub color_attachment_count: u32,
}

impl PipelineDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stages: vec![],
            depth_test: true,
            depth_write: true,
            depth_compare: DepthCompare::LessOrEqual,
            cull: CullMode::Back,
            vertex_input: true,
            blend: BlendMode::Disabled,
            render_pass_id: 0,
            color_attachment_count: 1,
        }
    }
}

/// 符号化资源引用的类别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceTag {
    Uniform,
    Storage,
    Texture,
    Attachment,
}

/// 材质中对某个资源的符号化引用，如 `UB:cam_data`、`ATT:g_normal`
#[derive(Clone, Debug, PartialEq)]
pub struct BindingRef {
    pub tag: ResourceTag,
    pub label: String,
}

impl BindingRef {
    /// 解析形如 `UB:name` 的资源引用；未知前缀返回 None
    pub fn parse(text: &str) -> Option<Self> {
        let (prefix, label) = text.split_once(':')?;
        let tag = match prefix {
            "UB" => ResourceTag::Uniform,
            "SB" => ResourceTag::Storage,
            "TEX" => ResourceTag::Texture,
            "ATT" => ResourceTag::Attachment,
            _ => return None,
        };
        Some(Self {
            tag,
            label: label.to_string(),
        })
    }

    pub fn serialize(&self) -> String {
        let prefix = match self.tag {
            ResourceTag::Uniform => "UB",
            ResourceTag::Storage => "SB",
            ResourceTag::Texture => "TEX",
            ResourceTag::Attachment => "ATT",
        };
        format!("{}:{}", prefix, self.label)
    }
}

/// 材质的一次 draw，指定使用的 pipeline 和按 binding 顺序排列的资源
#[derive(Clone, Debug, PartialEq)]
pub struct DrawDesc {
    pub pipeline: String,
    pub bindings: Vec<BindingRef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDesc {
    pub name: String,
    pub draws: Vec<DrawDesc>,
}

/// 解析 pipelines 文件
///
/// 格式是行流 + 状态机：`PIPELINE` 开始一个块，下一行是名字；
/// `SHADER` 开始一个 stage，下一行是 `VERTEX`/`FRAGMENT`；
/// 无法识别的行直接跳过并告警，保证旧文件向前兼容
pub fn parse_pipelines(text: &str) -> Vec<PipelineDesc> {
    let mut pipelines = vec![];
    let mut current: Option<PipelineDesc> = None;

    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    while let Some(line) = lines.next() {
        match line {
            "PIPELINE" => {
                let Some(name) = lines.next() else {
                    log::error!("pipelines file ends right after PIPELINE");
                    break;
                };
                current = Some(PipelineDesc::new(name));
            }
            "!PIPELINE" => {
                match current.take() {
                    Some(pipeline) => pipelines.push(pipeline),
                    None => log::warn!("!PIPELINE without matching PIPELINE"),
                }
            }
            "SHADER" => {
                let Some(pipeline) = current.as_mut() else {
                    log::warn!("SHADER outside of PIPELINE block");
                    continue;
                };
                let stage = match lines.next() {
                    Some("VERTEX") => ShaderStageKind::Vertex,
                    Some("FRAGMENT") => ShaderStageKind::Fragment,
                    other => {
                        log::warn!("unknown shader stage: {:?}", other);
                        continue;
                    }
                };
                pipeline.stages.push(ShaderStageDesc {
                    stage,
                    file: String::new(),
                    uniform_count: 0,
                    storage_count: 0,
                    texture_count: 0,
                });
            }
            // stage 的属性行出现在下一个 SHADER/!PIPELINE 之前，结束标记只是可选的
            "!SHADER" => {}
            _ => {
                let Some(pipeline) = current.as_mut() else {
                    log::warn!("skipping line outside of PIPELINE block: {}", line);
                    continue;
                };
                parse_pipeline_entry(pipeline, line);
            }
        }
    }

    if current.is_some() {
        log::warn!("pipelines file ended inside a PIPELINE block");
    }
    pipelines
}

/// PIPELINE 块内除 SHADER 以外的行
fn parse_pipeline_entry(pipeline: &mut PipelineDesc, line: &str) {
    // shader stage 的属性行
    if let Some(value) = line.strip_prefix("FILE:") {
        if let Some(stage) = pipeline.stages.last_mut() {
            stage.file = value.to_string();
        } else {
            log::warn!("FILE before any SHADER in pipeline {}", pipeline.name);
        }
        return;
    }
    for (prefix, field) in [("UB:", 0usize), ("SB:", 1), ("TEX:", 2)] {
        if let Some(value) = line.strip_prefix(prefix) {
            let Ok(count) = value.parse::<u32>() else {
                log::warn!("invalid resource count in pipeline {}: {}", pipeline.name, line);
                return;
            };
            let Some(stage) = pipeline.stages.last_mut() else {
                log::warn!("resource count before any SHADER in pipeline {}", pipeline.name);
                return;
            };
            match field {
                0 => stage.uniform_count = count,
                1 => stage.storage_count = count,
                _ => stage.texture_count = count,
            }
            return;
        }
    }

    // pipeline 级别的行
    if let Some(value) = line.strip_prefix("RP:") {
        match value.parse() {
            Ok(id) => pipeline.render_pass_id = id,
            Err(_) => log::warn!("invalid render pass id in pipeline {}: {}", pipeline.name, line),
        }
        return;
    }
    if let Some(value) = line.strip_prefix("FB:") {
        match value.parse() {
            Ok(count) => pipeline.color_attachment_count = count,
            Err(_) => log::warn!("invalid attachment count in pipeline {}: {}", pipeline.name, line),
        }
        return;
    }

    match line {
        "NO_DEPTH_TEST" => pipeline.depth_test = false,
        "NO_DEPTH_WRITE" => pipeline.depth_write = false,
        "DEPTH_GREATER" => pipeline.depth_compare = DepthCompare::GreaterOrEqual,
        "DEPTH_EQUAL" => pipeline.depth_compare = DepthCompare::Equal,
        "NO_CULL" => pipeline.cull = CullMode::None,
        "CULL_FRONT" => pipeline.cull = CullMode::Front,
        "NO_VERTS" => pipeline.vertex_input = false,
        "BLEND_ADD" => pipeline.blend = BlendMode::Additive,
        "BLEND_LERP" => pipeline.blend = BlendMode::Alpha,
        _ => log::warn!("skipping unknown line in pipeline {}: {}", pipeline.name, line),
    }
}

/// 解析 materials 文件
///
/// `MAT` 开始一个材质，下一行是名字；`PIPE_MAT` 开始一次 draw，
/// 下一行是 pipeline 名，之后每行一个资源引用，直到 `!PIPE_MAT`
pub fn parse_materials(text: &str) -> Vec<MaterialDesc> {
    let mut materials = vec![];
    let mut current: Option<MaterialDesc> = None;
    let mut current_draw: Option<DrawDesc> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line {
            "MAT" => {
                current = Some(MaterialDesc {
                    // 名字在下一行；用空名占位，见下面的 else 分支
                    name: String::new(),
                    draws: vec![],
                });
            }
            "!MAT" => match current.take() {
                Some(material) => materials.push(material),
                None => log::warn!("!MAT without matching MAT"),
            },
            "PIPE_MAT" => {
                if current.is_none() {
                    log::warn!("PIPE_MAT outside of MAT block");
                    continue;
                }
                current_draw = Some(DrawDesc {
                    pipeline: String::new(),
                    bindings: vec![],
                });
            }
            "!PIPE_MAT" => match (current.as_mut(), current_draw.take()) {
                (Some(material), Some(draw)) => material.draws.push(draw),
                _ => log::warn!("!PIPE_MAT without matching PIPE_MAT"),
            },
            _ => {
                if let Some(draw) = current_draw.as_mut() {
                    if draw.pipeline.is_empty() {
                        draw.pipeline = line.to_string();
                    } else if let Some(binding) = BindingRef::parse(line) {
                        draw.bindings.push(binding);
                    } else {
                        log::warn!("skipping unknown binding in draw {}: {}", draw.pipeline, line);
                    }
                } else if let Some(material) = current.as_mut() {
                    if material.name.is_empty() {
                        material.name = line.to_string();
                    } else {
                        log::warn!("skipping unknown line in material {}: {}", material.name, line);
                    }
                } else {
                    log::warn!("skipping line outside of MAT block: {}", line);
                }
            }
        }
    }

    if current.is_some() || current_draw.is_some() {
        log::warn!("materials file ended inside a block");
    }
    materials
}

/// 将 pipeline 描述序列化回文本格式；与 [`parse_pipelines`] 互逆
pub fn serialize_pipelines(pipelines: &[PipelineDesc]) -> String {
    let mut out = String::new();
    for pipeline in pipelines {
        out.push_str("PIPELINE\n");
        out.push_str(&pipeline.name);
        out.push('\n');

        for stage in &pipeline.stages {
            out.push_str("SHADER\n");
            out.push_str(match stage.stage {
                ShaderStageKind::Vertex => "VERTEX\n",
                ShaderStageKind::Fragment => "FRAGMENT\n",
            });
            out.push_str(&format!("FILE:{}\n", stage.file));
            out.push_str(&format!("UB:{}\n", stage.uniform_count));
            out.push_str(&format!("SB:{}\n", stage.storage_count));
            out.push_str(&format!("TEX:{}\n", stage.texture_count));
        }

        if !pipeline.depth_test {
            out.push_str("NO_DEPTH_TEST\n");
        }
        if !pipeline.depth_write {
            out.push_str("NO_DEPTH_WRITE\n");
        }
        match pipeline.depth_compare {
            DepthCompare::LessOrEqual => {}
            DepthCompare::GreaterOrEqual => out.push_str("DEPTH_GREATER\n"),
            DepthCompare::Equal => out.push_str("DEPTH_EQUAL\n"),
        }
        match pipeline.cull {
            CullMode::Back => {}
            CullMode::None => out.push_str("NO_CULL\n"),
            CullMode::Front => out.push_str("CULL_FRONT\n"),
        }
        if !pipeline.vertex_input {
            out.push_str("NO_VERTS\n");
        }
        match pipeline.blend {
            BlendMode::Disabled => {}
            BlendMode::Additive => out.push_str("BLEND_ADD\n"),
            BlendMode::Alpha => out.push_str("BLEND_LERP\n"),
        }
        out.push_str(&format!("RP:{}\n", pipeline.render_pass_id));
        out.push_str(&format!("FB:{}\n", pipeline.color_attachment_count));

        out.push_str("!PIPELINE\n");
    }
    out
}

/// 将材质描述序列化回文本格式；与 [`parse_materials`] 互逆
pub fn serialize_materials(materials: &[MaterialDesc]) -> String {
    let mut out = String::new();
    for material in materials {
        out.push_str("MAT\n");
        out.push_str(&material.name);
        out.push('\n');
        for draw in &material.draws {
            out.push_str("PIPE_MAT\n");
            out.push_str(&draw.pipeline);
            out.push('\n');
            for binding in &draw.bindings {
                out.push_str(&binding.serialize());
                out.push('\n');
            }
            out.push_str("!PIPE_MAT\n");
        }
        out.push_str("!MAT\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipeline_defaults() {
        // 没有任何 flag 时，pipeline 使用默认状态
        let text = "PIPELINE\ngeometry\nSHADER\nVERTEX\nFILE:geometry.vert.spv\nUB:1\n!PIPELINE\n";
        let pipelines = parse_pipelines(text);

        assert_eq!(pipelines.len(), 1);
        let p = &pipelines[0];
        assert_eq!(p.name, "geometry");
        assert!(p.depth_test);
        assert!(p.depth_write);
        assert_eq!(p.depth_compare, DepthCompare::LessOrEqual);
        assert_eq!(p.cull, CullMode::Back);
        assert!(p.vertex_input);
        assert_eq!(p.blend, BlendMode::Disabled);
        assert_eq!(p.render_pass_id, 0);
        assert_eq!(p.color_attachment_count, 1);

        assert_eq!(p.stages.len(), 1);
        assert_eq!(p.stages[0].stage, ShaderStageKind::Vertex);
        assert_eq!(p.stages[0].file, "geometry.vert.spv");
        assert_eq!(p.stages[0].uniform_count, 1);
        assert_eq!(p.stages[0].storage_count, 0);
    }

    #[test]
    fn test_parse_pipeline_flags() {
        let text = "\
PIPELINE
light_back
SHADER
VERTEX
FILE:light.vert.spv
UB:1
SHADER
FRAGMENT
FILE:light.frag.spv
SB:1
TEX:4
CULL_FRONT
DEPTH_GREATER
NO_DEPTH_WRITE
BLEND_ADD
RP:1
FB:1
!PIPELINE
";
        let pipelines = parse_pipelines(text);
        let p = &pipelines[0];

        assert_eq!(p.cull, CullMode::Front);
        assert_eq!(p.depth_compare, DepthCompare::GreaterOrEqual);
        assert!(!p.depth_write);
        assert!(p.depth_test);
        assert_eq!(p.blend, BlendMode::Additive);
        assert_eq!(p.render_pass_id, 1);

        assert_eq!(p.stages.len(), 2);
        assert_eq!(p.stages[1].stage, ShaderStageKind::Fragment);
        assert_eq!(p.stages[1].storage_count, 1);
        assert_eq!(p.stages[1].texture_count, 4);
    }

    #[test]
    fn test_parse_pipeline_lenient() {
        // 未知的行应该被跳过，不影响后续解析
        let text = "\
PIPELINE
ao
GARBAGE_FLAG
SHADER
FRAGMENT
FILE:ao.frag.spv
WHAT:3
NO_VERTS
!PIPELINE
";
        let pipelines = parse_pipelines(text);
        assert_eq!(pipelines.len(), 1);
        assert!(!pipelines[0].vertex_input);
        assert_eq!(pipelines[0].stages[0].file, "ao.frag.spv");
    }

    #[test]
    fn test_parse_materials() {
        let text = "\
MAT
empire
PIPE_MAT
geometry
UB:cam_data
SB:obj_data
TEX:empire_diffuse

!PIPE_MAT
!MAT
";
        let materials = parse_materials(text);
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].name, "empire");
        assert_eq!(materials[0].draws.len(), 1);

        let draw = &materials[0].draws[0];
        assert_eq!(draw.pipeline, "geometry");
        assert_eq!(draw.bindings.len(), 3);
        assert_eq!(draw.bindings[0], BindingRef {
            tag: ResourceTag::Uniform,
            label: "cam_data".to_string()
        });
        assert_eq!(draw.bindings[2].tag, ResourceTag::Texture);
        assert_eq!(draw.bindings[2].label, "empire_diffuse");
    }

    #[test]
    fn test_parse_material_multi_draw() {
        // 一个材质可以包含多次 draw，各自使用不同的 pipeline
        let text = "\
MAT
point_light
PIPE_MAT
light_front
UB:cam_data
ATT:g_position
!PIPE_MAT
PIPE_MAT
light_back
UB:cam_data
ATT:g_position
!PIPE_MAT
!MAT
";
        let materials = parse_materials(text);
        assert_eq!(materials[0].draws.len(), 2);
        assert_eq!(materials[0].draws[0].pipeline, "light_front");
        assert_eq!(materials[0].draws[1].pipeline, "light_back");
        assert_eq!(materials[0].draws[1].bindings[1].tag, ResourceTag::Attachment);
    }

    #[test]
    fn test_pipeline_round_trip() {
        let mut p = PipelineDesc::new("composite");
        p.stages.push(ShaderStageDesc {
            stage: ShaderStageKind::Vertex,
            file: "fullscreen.vert.spv".to_string(),
            uniform_count: 0,
            storage_count: 0,
            texture_count: 0,
        });
        p.stages.push(ShaderStageDesc {
            stage: ShaderStageKind::Fragment,
            file: "composite.frag.spv".to_string(),
            uniform_count: 1,
            storage_count: 0,
            texture_count: 2,
        });
        p.vertex_input = false;
        p.depth_compare = DepthCompare::Equal;
        p.blend = BlendMode::Alpha;
        p.render_pass_id = 3;

        let pipelines = vec![p];
        let round_trip = parse_pipelines(&serialize_pipelines(&pipelines));
        assert_eq!(round_trip, pipelines);
    }

    #[test]
    fn test_material_round_trip() {
        let materials = vec![MaterialDesc {
            name: "monkey".to_string(),
            draws: vec![DrawDesc {
                pipeline: "geometry".to_string(),
                bindings: vec![
                    BindingRef {
                        tag: ResourceTag::Uniform,
                        label: "cam_data".to_string(),
                    },
                    BindingRef {
                        tag: ResourceTag::Storage,
                        label: "obj_data".to_string(),
                    },
                    BindingRef {
                        tag: ResourceTag::Texture,
                        label: "monkey_diffuse".to_string(),
                    },
                ],
            }],
        }];

        let round_trip = parse_materials(&serialize_materials(&materials));
        assert_eq!(round_trip, materials);
    }

    #[test]
    fn test_binding_ref_unknown_prefix() {
        assert!(BindingRef::parse("XX:foo").is_none());
        assert!(BindingRef::parse("no_colon").is_none());
    }
}
