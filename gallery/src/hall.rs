//! Builds the physics world and the renderable scene for a resolved layout.

use gallery_layout::{ArtworkPlacement, ResolvedBox, ResolvedLayout};
use physics_rapier::PhysicsWorld;
use player_controller::{spawn_player_body, PlayerBodyConfig};
use rapier3d::math::{Isometry, Rotation, Translation, Vector};
use rapier3d::prelude::{ColliderBuilder, Real, RigidBodyHandle};
use rapier3d::na::Unit;

use crate::artwork::Canvas;
use crate::scene::{ObjectId, Renderable, Scene};

pub const GRAVITY: [Real; 3] = [0.0, -9.82, 0.0];

// Untextured stand-in for the wood floor.
pub const FLOOR_COLOR: [f32; 3] = [0x6b as f32 / 255.0, 0x4a as f32 / 255.0, 0x2f as f32 / 255.0];
pub const WALL_COLOR: [f32; 3] = [0xcc as f32 / 255.0; 3];
pub const BENCH_COLOR: [f32; 3] = [0x5a as f32 / 255.0; 3];
pub const CEILING_COLOR: [f32; 3] = [0x05 as f32 / 255.0; 3];

pub struct Hall {
    pub world: PhysicsWorld,
    pub scene: Scene,
    pub player: RigidBodyHandle,
}

pub fn build_hall(layout: &ResolvedLayout, player: &PlayerBodyConfig) -> Hall {
    let mut world = PhysicsWorld::new(Vector::new(GRAVITY[0], GRAVITY[1], GRAVITY[2]));
    let mut scene = Scene::new();

    world.insert_static_collider(ColliderBuilder::halfspace(Vector::y_axis()).build());
    scene.add(
        Renderable::plane("floor", layout.floor_extent, Isometry::identity())
            .with_color(FLOOR_COLOR),
    );

    let ceiling = layout.ceiling_height;
    world.insert_static_collider(
        ColliderBuilder::halfspace(Unit::new_normalize(Vector::new(0.0, -1.0, 0.0)))
            .translation(Vector::new(0.0, ceiling, 0.0))
            .build(),
    );
    // Rotated half a turn about X so the visible side faces down.
    scene.add(
        Renderable::plane(
            "ceiling",
            layout.hall_size,
            Isometry::new(
                Vector::new(0.0, ceiling, 0.0),
                Vector::x() * std::f32::consts::PI,
            ),
        )
        .with_color(CEILING_COLOR),
    );

    for wall in &layout.walls {
        add_static_box(&mut world, &mut scene, wall, WALL_COLOR);
    }
    if let Some(bench) = &layout.bench {
        add_static_box(&mut world, &mut scene, bench, BENCH_COLOR);
    }

    let player = spawn_player_body(&mut world, player);
    Hall {
        world,
        scene,
        player,
    }
}

fn add_static_box(world: &mut PhysicsWorld, scene: &mut Scene, solid: &ResolvedBox, color: [f32; 3]) {
    let center = Vector::new(solid.center[0], solid.center[1], solid.center[2]);
    let half = Vector::new(solid.half_extents[0], solid.half_extents[1], solid.half_extents[2]);
    world.insert_static_collider(
        ColliderBuilder::cuboid(half.x, half.y, half.z)
            .translation(center)
            .build(),
    );
    scene.add(
        Renderable::cuboid(solid.id.as_str(), half, Isometry::translation(center.x, center.y, center.z))
            .with_color(color),
    );
}

/// Hangs `canvas` at its wall placement as a gaze target tagged with its artwork.
pub fn place_canvas(scene: &mut Scene, canvas: &Canvas, placement: &ArtworkPlacement) -> ObjectId {
    let [x, y, z] = placement.position;
    let pose = Isometry::from_parts(
        Translation::new(x, y, z),
        Rotation::from_axis_angle(&Vector::y_axis(), placement.yaw),
    );
    let half = Vector::new(canvas.width * 0.5, canvas.height * 0.5, canvas.depth * 0.5);
    let mut renderable = Renderable::cuboid(format!("artwork{}", canvas.artwork.0), half, pose)
        .with_color(canvas.color)
        .with_artwork(canvas.artwork);
    if let Some(image) = &canvas.image {
        renderable = renderable.with_texture(image.clone());
    }
    scene.add_hit_testable(renderable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::ArtworkId;
    use gallery_layout::{FrameSpec, GalleryLayout};
    use physics_rapier::{FIXED_DT, MAX_SUBSTEPS};
    use rapier3d::math::Point;
    use rapier3d::parry::query::Ray;

    fn builtin() -> ResolvedLayout {
        GalleryLayout::builtin().unwrap().resolve().unwrap()
    }

    #[test]
    fn hall_has_floor_ceiling_walls_and_bench() {
        let hall = build_hall(&builtin(), &PlayerBodyConfig::default());
        // floor, ceiling, four walls, bench
        assert_eq!(hall.scene.len(), 7);
        assert!(hall.scene.hit_testable().is_empty());
        // two half-spaces, four walls, bench, player ball
        assert_eq!(hall.world.colliders().len(), 8);
        let spawn = hall.world.body_pose(hall.player).unwrap().translation;
        assert!((spawn.y - 0.6).abs() < 1.0e-6);
        assert!((spawn.z - 5.0).abs() < 1.0e-6);
    }

    #[test]
    fn player_settles_on_the_floor() {
        let mut hall = build_hall(&builtin(), &PlayerBodyConfig::default());
        for _ in 0..120 {
            hall.world.step_frame(FIXED_DT, FIXED_DT, MAX_SUBSTEPS);
        }
        let y = hall.world.body_pose(hall.player).unwrap().translation.y;
        assert!((y - 0.5).abs() < 0.05, "player rests at {}", y);
    }

    #[test]
    fn walls_stop_a_running_player() {
        let mut hall = build_hall(&builtin(), &PlayerBodyConfig::default());
        for _ in 0..240 {
            if let Some(body) = hall.world.body_mut(hall.player) {
                let mut v = *body.linvel();
                v.z = 8.0;
                body.set_linvel(v, true);
            }
            hall.world.step_frame(FIXED_DT, FIXED_DT, MAX_SUBSTEPS);
        }
        let z = hall.world.body_pose(hall.player).unwrap().translation.z;
        assert!(z < 10.0 - 0.25, "player escaped to z={}", z);
    }

    #[test]
    fn placed_canvas_faces_into_the_hall() {
        let layout = builtin();
        let mut scene = Scene::new();
        let canvas = Canvas::no_image(ArtworkId(3), &FrameSpec::default());
        // record 3 hangs on the front (+Z) wall
        let placement = layout.placements[3];
        let id = place_canvas(&mut scene, &canvas, &placement);
        assert_eq!(scene.hit_testable(), &[id]);

        let [x, y, _] = placement.position;
        let ray = Ray::new(Point::new(x, y, 0.0), Vector::new(0.0, 0.0, 1.0));
        let hit = scene.nearest_hit(&ray, Real::MAX).unwrap();
        assert_eq!(hit.artwork, Some(ArtworkId(3)));
        let face = placement.position[2] - canvas.depth * 0.5;
        assert!((hit.toi - face).abs() < 1.0e-3);
    }
}
