//! Bakes the light rig into per-vertex colours and flattens the scene into one mesh.

use gallery_layout::{LightRig, PointLight, SpotLight};
use rapier3d::math::{Point, Vector};
use render_wgpu::{BoxPlacement, MeshBuilder, MeshData, MeshError};

use crate::scene::{Scene, Shape};

/// Largest cell edge on big faces, in metres.
const CELL_SIZE: f32 = 1.0;
/// Floor and ceiling are much larger than the hall; coarser cells there.
const PLANE_CELL_SIZE: f32 = 2.0;

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear(color: [f32; 3]) -> [f32; 3] {
    color.map(srgb_to_linear)
}

/// Linear light arriving at `position` on a surface with `normal`.
pub fn irradiance(rig: &LightRig, position: [f32; 3], normal: [f32; 3]) -> [f32; 3] {
    let mut total = [rig.ambient; 3];
    for spot in &rig.spots {
        add(&mut total, spot.color, spot_term(spot, position, normal));
    }
    add(&mut total, rig.center.color, point_term(&rig.center, position, normal));
    total
}

/// Final vertex colour for a surface of sRGB `base`.
pub fn shade(rig: &LightRig, base: [f32; 3], position: [f32; 3], normal: [f32; 3]) -> [f32; 3] {
    let light = irradiance(rig, position, normal);
    let base = linear(base);
    [
        (base[0] * light[0]).clamp(0.0, 1.0),
        (base[1] * light[1]).clamp(0.0, 1.0),
        (base[2] * light[2]).clamp(0.0, 1.0),
    ]
}

pub fn scene_mesh(scene: &Scene, rig: &LightRig) -> Result<MeshData, MeshError> {
    let mut builder = MeshBuilder::new();
    for (id, object) in scene.objects() {
        // Textured surfaces carry light only; the texel supplies the colour.
        let base = if object.texture.is_some() {
            [1.0; 3]
        } else {
            object.color
        };
        let mut shade_vertex = |position: [f32; 3], normal: [f32; 3]| shade(rig, base, position, normal);
        let pose = object.pose;
        match object.shape {
            Shape::Cuboid { half_extents } => {
                let rotation = pose.rotation.to_rotation_matrix();
                let m = rotation.matrix();
                let axis = |i: usize| [m[(0, i)], m[(1, i)], m[(2, i)]];
                let placement = BoxPlacement {
                    center: [pose.translation.x, pose.translation.y, pose.translation.z],
                    half_extents: [half_extents.x, half_extents.y, half_extents.z],
                    axes: [axis(0), axis(1), axis(2)],
                    max_cell: CELL_SIZE,
                    texture: object.texture.as_ref().map(|_| id.texture_key()),
                };
                builder.push_box(placement, shade_vertex)?;
            }
            Shape::Plane { extent } => {
                let h = extent * 0.5;
                let corners = [[-h, -h], [-h, h], [h, h], [h, -h]].map(|[x, z]| {
                    let p = pose * Point::new(x, 0.0, z);
                    [p.x, p.y, p.z]
                });
                let n = pose.rotation * Vector::y();
                let divisions = (extent / PLANE_CELL_SIZE).ceil().max(1.0) as u32;
                builder.push_quad(corners, [n.x, n.y, n.z], divisions, &mut shade_vertex)?;
            }
        }
    }
    builder.finish()
}

fn spot_term(spot: &SpotLight, position: [f32; 3], normal: [f32; 3]) -> f32 {
    let Some((to_light, distance)) = direction(position, spot.position) else {
        return 0.0;
    };
    if distance >= spot.range {
        return 0.0;
    }
    let Some((axis, _)) = direction(spot.position, spot.target) else {
        return 0.0;
    };
    let cos_theta = -dot(to_light, axis);
    let outer = spot.angle.cos();
    let inner = (spot.angle * (1.0 - spot.penumbra)).cos();
    let cone = smoothstep(outer, inner, cos_theta);
    let lambert = dot(normal, to_light).max(0.0);
    spot.intensity * lambert * cone * attenuation(distance, spot.range)
}

fn point_term(light: &PointLight, position: [f32; 3], normal: [f32; 3]) -> f32 {
    let Some((to_light, distance)) = direction(position, light.position) else {
        return light.intensity;
    };
    if distance >= light.range {
        return 0.0;
    }
    let lambert = dot(normal, to_light).max(0.0);
    light.intensity * lambert * attenuation(distance, light.range)
}

fn attenuation(distance: f32, range: f32) -> f32 {
    (1.0 - distance / range).max(0.0).powi(2)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x >= edge0 { 1.0 } else { 0.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Unit vector and distance from `from` to `to`; `None` when they coincide.
fn direction(from: [f32; 3], to: [f32; 3]) -> Option<([f32; 3], f32)> {
    let d = [to[0] - from[0], to[1] - from[1], to[2] - from[2]];
    let length = dot(d, d).sqrt();
    if length <= f32::EPSILON {
        return None;
    }
    Some((d.map(|c| c / length), length))
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn add(total: &mut [f32; 3], color: [f32; 3], amount: f32) {
    for (channel, c) in total.iter_mut().zip(color) {
        *channel += c * amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Renderable;
    use engine_core::image::DecodedImage;
    use rapier3d::math::Isometry;

    fn dark_rig() -> LightRig {
        LightRig {
            ambient: 0.5,
            spots: Vec::new(),
            center: PointLight {
                position: [0.0, 100.0, 0.0],
                color: [1.0; 3],
                intensity: 0.0,
                range: 1.0,
            },
        }
    }

    fn spot_rig() -> LightRig {
        let mut rig = dark_rig();
        rig.ambient = 0.0;
        rig.spots.push(SpotLight {
            position: [0.0, 5.0, 0.0],
            target: [0.0, 0.0, 0.0],
            color: [1.0; 3],
            intensity: 1.0,
            range: 20.0,
            angle: 30f32.to_radians(),
            penumbra: 0.5,
        });
        rig
    }

    #[test]
    fn srgb_endpoints_are_fixed() {
        assert_eq!(srgb_to_linear(0.0), 0.0);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1.0e-6);
        assert!(srgb_to_linear(0.5) < 0.5);
    }

    #[test]
    fn ambient_only_scales_the_base_colour() {
        let color = shade(&dark_rig(), [1.0, 1.0, 1.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert!(color.iter().all(|c| (c - 0.5).abs() < 1.0e-6));
    }

    #[test]
    fn spot_lights_only_inside_its_cone_and_facing_side() {
        let rig = spot_rig();
        let under = irradiance(&rig, [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let facing_away = irradiance(&rig, [0.0, 0.0, 0.0], [0.0, -1.0, 0.0]);
        let outside_cone = irradiance(&rig, [10.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert!(under[0] > 0.5);
        assert_eq!(facing_away[0], 0.0);
        assert_eq!(outside_cone[0], 0.0);
    }

    #[test]
    fn light_fades_with_distance() {
        let rig = spot_rig();
        let near = irradiance(&rig, [0.0, 3.0, 0.0], [0.0, 1.0, 0.0]);
        let far = irradiance(&rig, [0.0, -3.0, 0.0], [0.0, 1.0, 0.0]);
        assert!(near[0] > far[0]);
    }

    #[test]
    fn scene_flattens_to_one_mesh() {
        let mut scene = Scene::new();
        scene.add(Renderable::cuboid(
            "small",
            Vector::new(0.25, 0.25, 0.25),
            Isometry::translation(0.0, 1.0, 0.0),
        ));
        scene.add(Renderable::plane("floor", 4.0, Isometry::identity()));
        let mesh = scene_mesh(&scene, &dark_rig()).unwrap();
        // six single-cell faces, then a 2x2 grid for the plane
        assert_eq!(mesh.vertices.len(), 6 * 4 + 9);
        assert_eq!(mesh.indices.len(), 6 * 6 + 4 * 6);
    }

    #[test]
    fn rotated_plane_keeps_its_normal() {
        let mut scene = Scene::new();
        let ceiling = Isometry::new(
            Vector::new(0.0, 6.0, 0.0),
            Vector::x() * std::f32::consts::PI,
        );
        scene.add(Renderable::plane("ceiling", 2.0, ceiling));
        let mut rig = dark_rig();
        rig.ambient = 0.0;
        rig.center = PointLight {
            position: [0.0, 3.0, 0.0],
            color: [1.0; 3],
            intensity: 1.0,
            range: 50.0,
        };
        let mesh = scene_mesh(&scene, &rig).unwrap();
        assert!(mesh.vertices.iter().all(|v| (v.position[1] - 6.0).abs() < 1.0e-4));
        assert!(mesh.vertices.iter().all(|v| v.color[0] > 0.0));
    }

    #[test]
    fn textured_canvas_is_lit_white_in_its_own_batch() {
        let mut scene = Scene::new();
        scene.add(
            Renderable::cuboid("wall", Vector::new(1.0, 1.0, 0.1), Isometry::identity())
                .with_color([0.2, 0.2, 0.2]),
        );
        let image = DecodedImage::from_rgba(1, 1, vec![0, 0, 255, 255]).unwrap();
        let canvas = scene.add_hit_testable(
            Renderable::cuboid(
                "art",
                Vector::new(0.5, 0.5, 0.025),
                Isometry::translation(0.0, 0.0, 0.2),
            )
            .with_color(image.mean_rgb)
            .with_texture(image),
        );
        let mesh = scene_mesh(&scene, &dark_rig()).unwrap();
        assert_eq!(mesh.batches.len(), 2);
        assert_eq!(mesh.batches[0].texture, None);
        assert_eq!(mesh.batches[1].texture, Some(canvas.texture_key()));
        let start = mesh.batches[1].indices.start as usize;
        let first = mesh.indices[start] as usize;
        // white base under 0.5 ambient; the blue comes from the texture
        assert!(mesh.vertices[first].color.iter().all(|c| (c - 0.5).abs() < 1.0e-6));
    }
}
