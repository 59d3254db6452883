//! Renderable registry: drawable objects, the gaze hit-testable set, and the
//! links that keep dynamic props in step with their physics bodies.

use engine_core::image::DecodedImage;
use physics_rapier::PhysicsWorld;
use rapier3d::math::{Isometry, Vector};
use rapier3d::parry::query::{Ray, RayCast};
use rapier3d::parry::shape::Cuboid;
use rapier3d::prelude::{Real, RigidBodyHandle};
use render_wgpu::TextureKey;

use crate::artwork::ArtworkId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0
    }

    /// GPU texture slot for this object's image.
    pub fn texture_key(self) -> TextureKey {
        TextureKey(u32::try_from(self.0).unwrap_or(u32::MAX))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Cuboid { half_extents: Vector<Real> },
    /// Square in the pose's local XZ plane; the normal is local +Y.
    Plane { extent: Real },
}

#[derive(Clone, Debug)]
pub struct Renderable {
    pub name: String,
    pub shape: Shape,
    pub pose: Isometry<Real>,
    /// sRGB, 0..1.
    pub color: [f32; 3],
    pub artwork: Option<ArtworkId>,
    /// Drawn over every face in place of `color`.
    pub texture: Option<DecodedImage>,
}

impl Renderable {
    pub fn cuboid(name: impl Into<String>, half_extents: Vector<Real>, pose: Isometry<Real>) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Cuboid { half_extents },
            pose,
            color: [1.0; 3],
            artwork: None,
            texture: None,
        }
    }

    pub fn plane(name: impl Into<String>, extent: Real, pose: Isometry<Real>) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Plane { extent },
            pose,
            color: [1.0; 3],
            artwork: None,
            texture: None,
        }
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_artwork(mut self, artwork: ArtworkId) -> Self {
        self.artwork = Some(artwork);
        self
    }

    pub fn with_texture(mut self, image: DecodedImage) -> Self {
        self.texture = Some(image);
        self
    }

    fn cast_ray(&self, ray: &Ray, max_toi: Real) -> Option<Real> {
        match self.shape {
            Shape::Cuboid { half_extents } => {
                Cuboid::new(half_extents).cast_ray(&self.pose, ray, max_toi, true)
            }
            Shape::Plane { extent } => {
                let half = extent * 0.5;
                Cuboid::new(Vector::new(half, 0.0, half)).cast_ray(&self.pose, ray, max_toi, true)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub object: ObjectId,
    pub artwork: Option<ArtworkId>,
    pub toi: Real,
}

#[derive(Default)]
pub struct Scene {
    objects: Vec<Renderable>,
    hit_testable: Vec<ObjectId>,
    body_links: Vec<(ObjectId, RigidBodyHandle)>,
    revision: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, renderable: Renderable) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(renderable);
        self.revision += 1;
        id
    }

    /// Adds an object that gaze rays may hit.
    pub fn add_hit_testable(&mut self, renderable: Renderable) -> ObjectId {
        let id = self.add(renderable);
        self.hit_testable.push(id);
        id
    }

    /// Registers `body` as the pose source for `object`.
    pub fn link_body(&mut self, object: ObjectId, body: RigidBodyHandle) {
        self.body_links.push((object, body));
    }

    pub fn object(&self, id: ObjectId) -> Option<&Renderable> {
        self.objects.get(id.0)
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &Renderable)> + '_ {
        self.objects
            .iter()
            .enumerate()
            .map(|(index, object)| (ObjectId(index), object))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn hit_testable(&self) -> &[ObjectId] {
        &self.hit_testable
    }

    /// Objects drawn with an image, for texture upload.
    pub fn textured(&self) -> impl Iterator<Item = (ObjectId, &DecodedImage)> + '_ {
        self.objects()
            .filter_map(|(id, object)| object.texture.as_ref().map(|image| (id, image)))
    }

    /// Bumped on every insert and every pose change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_pose(&mut self, id: ObjectId, pose: Isometry<Real>) -> bool {
        let Some(object) = self.objects.get_mut(id.0) else {
            return false;
        };
        if object.pose == pose {
            return false;
        }
        object.pose = pose;
        self.revision += 1;
        true
    }

    /// Copies body poses onto linked objects, skipping `skip`. Returns how many
    /// objects moved.
    pub fn sync_bodies(&mut self, world: &PhysicsWorld, skip: Option<RigidBodyHandle>) -> usize {
        let mut moved = 0;
        for index in 0..self.body_links.len() {
            let (object, body) = self.body_links[index];
            if Some(body) == skip {
                continue;
            }
            if let Some(pose) = world.body_pose(body) {
                if self.set_pose(object, pose) {
                    moved += 1;
                }
            }
        }
        moved
    }

    /// Hit-testable objects along `ray`, nearest first.
    pub fn cast_ray(&self, ray: &Ray, max_toi: Real) -> Vec<RayHit> {
        let mut hits: Vec<RayHit> = self
            .hit_testable
            .iter()
            .filter_map(|&id| {
                let object = self.objects.get(id.0)?;
                let toi = object.cast_ray(ray, max_toi)?;
                Some(RayHit {
                    object: id,
                    artwork: object.artwork,
                    toi,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.toi.total_cmp(&b.toi));
        hits
    }

    pub fn nearest_hit(&self, ray: &Ray, max_toi: Real) -> Option<RayHit> {
        self.cast_ray(ray, max_toi).into_iter().next()
    }

    pub fn objects_tagged(&self, artwork: ArtworkId) -> impl Iterator<Item = ObjectId> + '_ {
        self.hit_testable
            .iter()
            .copied()
            .filter(move |id| self.objects[id.0].artwork == Some(artwork))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physics_rapier::FIXED_DT;
    use rapier3d::math::{Point, Rotation, Translation};
    use rapier3d::prelude::{ColliderBuilder, RigidBodyBuilder};

    fn canvas_at(x: Real, z: Real, artwork: usize) -> Renderable {
        Renderable::cuboid(
            format!("art{}", artwork),
            Vector::new(1.0, 1.25, 0.025),
            Isometry::translation(x, 1.5, z),
        )
        .with_artwork(ArtworkId(artwork))
    }

    fn ray_forward() -> Ray {
        Ray::new(Point::new(0.0, 1.5, 0.0), Vector::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn hits_come_back_nearest_first() {
        let mut scene = Scene::new();
        scene.add_hit_testable(canvas_at(0.0, -8.0, 0));
        scene.add_hit_testable(canvas_at(0.0, -4.0, 1));
        scene.add_hit_testable(canvas_at(5.0, -4.0, 2));
        let hits = scene.cast_ray(&ray_forward(), Real::MAX);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].artwork, Some(ArtworkId(1)));
        assert_eq!(hits[1].artwork, Some(ArtworkId(0)));
        assert!(hits[0].toi < hits[1].toi);
    }

    #[test]
    fn only_hit_testable_objects_are_queried() {
        let mut scene = Scene::new();
        scene.add(Renderable::cuboid(
            "wall",
            Vector::new(5.0, 5.0, 0.25),
            Isometry::translation(0.0, 1.5, -2.0),
        ));
        scene.add_hit_testable(canvas_at(0.0, -6.0, 4));
        let hit = scene.nearest_hit(&ray_forward(), Real::MAX).unwrap();
        assert_eq!(hit.artwork, Some(ArtworkId(4)));
    }

    #[test]
    fn rotated_canvas_is_hit_on_its_face() {
        let mut scene = Scene::new();
        let pose = Isometry::from_parts(
            Translation::new(-6.0, 1.5, 0.0),
            Rotation::from_axis_angle(&Vector::y_axis(), std::f32::consts::FRAC_PI_2),
        );
        scene.add_hit_testable(
            Renderable::cuboid("side", Vector::new(1.0, 1.25, 0.025), pose)
                .with_artwork(ArtworkId(7)),
        );
        let ray = Ray::new(Point::new(0.0, 1.5, 0.0), Vector::new(-1.0, 0.0, 0.0));
        let hit = scene.nearest_hit(&ray, Real::MAX).unwrap();
        assert!((hit.toi - 5.975).abs() < 1.0e-3);
    }

    #[test]
    fn linked_props_follow_bodies_but_not_the_skipped_one() {
        let mut world = PhysicsWorld::new(Vector::new(0.0, -9.82, 0.0));
        let prop = world.insert_body(
            RigidBodyBuilder::dynamic()
                .translation(Vector::new(0.0, 3.0, 0.0))
                .build(),
            vec![ColliderBuilder::cuboid(0.5, 0.5, 0.5).build()],
        );
        let player = world.insert_body(
            RigidBodyBuilder::dynamic()
                .translation(Vector::new(2.0, 3.0, 0.0))
                .build(),
            vec![ColliderBuilder::ball(0.5).build()],
        );
        let mut scene = Scene::new();
        let crate_box = scene.add(Renderable::cuboid(
            "crate",
            Vector::new(0.5, 0.5, 0.5),
            Isometry::translation(0.0, 3.0, 0.0),
        ));
        let avatar = scene.add(Renderable::cuboid(
            "avatar",
            Vector::new(0.5, 0.5, 0.5),
            Isometry::translation(2.0, 3.0, 0.0),
        ));
        scene.link_body(crate_box, prop);
        scene.link_body(avatar, player);

        for _ in 0..10 {
            world.step(FIXED_DT);
        }
        let before = scene.revision();
        assert_eq!(scene.sync_bodies(&world, Some(player)), 1);
        assert!(scene.revision() > before);

        let prop_y = world.body_pose(prop).unwrap().translation.y;
        assert!(prop_y < 3.0);
        let crate_pose = scene.object(crate_box).unwrap().pose;
        assert!((crate_pose.translation.y - prop_y).abs() < 1.0e-6);
        let avatar_pose = scene.object(avatar).unwrap().pose;
        assert!((avatar_pose.translation.y - 3.0).abs() < 1.0e-6);
    }

    #[test]
    fn unchanged_pose_keeps_revision() {
        let mut scene = Scene::new();
        let id = scene.add(canvas_at(0.0, 0.0, 0));
        let revision = scene.revision();
        let pose = scene.object(id).unwrap().pose;
        assert!(!scene.set_pose(id, pose));
        assert_eq!(scene.revision(), revision);
    }

    #[test]
    fn textured_lists_only_objects_with_images() {
        let mut scene = Scene::new();
        scene.add(canvas_at(0.0, 0.0, 0));
        let image = DecodedImage::from_rgba(1, 1, vec![10, 20, 30, 255]).unwrap();
        let id = scene.add_hit_testable(canvas_at(0.0, -4.0, 1).with_texture(image.clone()));
        let textured: Vec<_> = scene.textured().collect();
        assert_eq!(textured.len(), 1);
        assert_eq!(textured[0].0, id);
        assert_eq!(textured[0].1, &image);
        assert_eq!(id.texture_key(), TextureKey(1));
    }
}
