//! 点光源的分组
//!
//! deferred lighting 用光源半径的球体做 proxy geometry：
//! 相机在球外时渲染正面（深度测试 LESS_OR_EQUAL），
//! 相机在球内时正面会被 near plane 裁掉，改为渲染背面并反转深度测试。
//! 两组光源分别 instanced 绘制，所以要把同组的光源排在一起。

use glam::{Mat4, Vec3, Vec4};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub radius: f32,
    pub color: Vec4,
}

/// 分组后的光源：front 组在前，back 组紧随其后
pub struct LightPartition {
    pub ordered: Vec<Light>,
    pub front_count: u32,
    pub back_count: u32,
}

/// 按相机和光源球的位置关系分组
///
/// 相机到光心的距离不大于半径时属于 back 组
pub fn partition(camera_pos: Vec3, lights: &[Light]) -> LightPartition {
    let mut front = vec![];
    let mut back = vec![];

    for light in lights {
        if camera_pos.distance(light.position) <= light.radius {
            back.push(*light);
        } else {
            front.push(*light);
        }
    }

    let front_count = front.len() as u32;
    let back_count = back.len() as u32;
    let mut ordered = front;
    ordered.append(&mut back);

    LightPartition {
        ordered,
        front_count,
        back_count,
    }
}

/// shader 中的光源数据；位置在 view space，w 分量是半径
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLight {
    pub pos_radius: [f32; 4],
    pub color: [f32; 4],
}

/// 将分组后的光源打包成 gpu 端的格式
pub fn pack_view_space(view: &Mat4, lights: &[Light]) -> Vec<GpuLight> {
    lights
        .iter()
        .map(|light| {
            let view_pos = view.transform_point3(light.position);
            GpuLight {
                pos_radius: [view_pos.x, view_pos.y, view_pos.z, light.radius],
                color: light.color.to_array(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(position: Vec3, radius: f32) -> Light {
        Light {
            position,
            radius,
            color: Vec4::ONE,
        }
    }

    #[test]
    fn test_camera_inside_goes_back() {
        // 相机位于光源球内，光源进入 back 组
        let camera = Vec3::new(0.0, 0.0, 0.0);
        let lights = [light(Vec3::new(1.0, 0.0, 0.0), 5.0)];

        let partition = partition(camera, &lights);
        assert_eq!(partition.front_count, 0);
        assert_eq!(partition.back_count, 1);
    }

    #[test]
    fn test_camera_outside_goes_front() {
        let camera = Vec3::new(0.0, 0.0, 0.0);
        let lights = [light(Vec3::new(10.0, 0.0, 0.0), 2.0)];

        let partition = partition(camera, &lights);
        assert_eq!(partition.front_count, 1);
        assert_eq!(partition.back_count, 0);
    }

    #[test]
    fn test_boundary_belongs_to_back() {
        // 距离恰好等于半径时算作 back 组
        let camera = Vec3::ZERO;
        let lights = [light(Vec3::new(3.0, 0.0, 0.0), 3.0)];

        let partition = partition(camera, &lights);
        assert_eq!(partition.back_count, 1);
    }

    #[test]
    fn test_front_packed_before_back() {
        let camera = Vec3::ZERO;
        let near = light(Vec3::new(1.0, 0.0, 0.0), 5.0); // back
        let far = light(Vec3::new(100.0, 0.0, 0.0), 1.0); // front
        let lights = [near, far, near, far];

        let partition = partition(camera, &lights);
        assert_eq!(partition.front_count, 2);
        assert_eq!(partition.back_count, 2);
        assert_eq!(partition.ordered.len(), 4);

        // front 组的光源全部排在 back 组之前
        assert_eq!(partition.ordered[0], far);
        assert_eq!(partition.ordered[1], far);
        assert_eq!(partition.ordered[2], near);
        assert_eq!(partition.ordered[3], near);
    }

    #[test]
    fn test_pack_view_space() {
        // view 矩阵平移 (0, 0, -10)，光源位置变换到 view space，半径存在 w
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        let lights = [light(Vec3::new(1.0, 2.0, 3.0), 4.5)];

        let packed = pack_view_space(&view, &lights);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].pos_radius, [1.0, 2.0, -7.0, 4.5]);
    }
}
