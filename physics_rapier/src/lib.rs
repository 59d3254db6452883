//! Rapier integration: world setup, fixed-substep stepping, and contact reporting.
#![forbid(unsafe_code)]

use std::collections::VecDeque;

use rapier3d::prelude::*;

/// Simulation rate used by the gallery world.
pub const FIXED_DT: Real = 1.0 / 60.0;
/// Upper bound on catch-up substeps per frame.
pub const MAX_SUBSTEPS: usize = 3;

/// One touching manifold between two colliders, reported after a substep.
///
/// `normal` is in world space and points from participant 1 toward participant 2.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactEvent {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
    pub body1: Option<RigidBodyHandle>,
    pub body2: Option<RigidBodyHandle>,
    pub normal: Vector<Real>,
}

impl ContactEvent {
    pub fn involves(&self, body: RigidBodyHandle) -> bool {
        self.body1 == Some(body) || self.body2 == Some(body)
    }

    /// Contact normal oriented from the other participant into `body`.
    pub fn normal_into(&self, body: RigidBodyHandle) -> Option<Vector<Real>> {
        if self.body1 == Some(body) {
            Some(-self.normal)
        } else if self.body2 == Some(body) {
            Some(self.normal)
        } else {
            None
        }
    }
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    accumulator: Real,
    contact_watch: Vec<RigidBodyHandle>,
    contacts: VecDeque<ContactEvent>,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<Real>) -> Self {
        Self {
            gravity,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            accumulator: 0.0,
            contact_watch: Vec::new(),
            contacts: VecDeque::new(),
        }
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn body_pose(&self, handle: RigidBodyHandle) -> Option<Isometry<Real>> {
        self.bodies.get(handle).map(|body| *body.position())
    }

    /// Runs exactly one simulation step of `dt` seconds and queues contact reports
    /// for watched bodies.
    pub fn step(&mut self, dt: Real) {
        self.integration_parameters.dt = dt;
        let physics_hooks = ();
        let event_handler = ();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &physics_hooks,
            &event_handler,
        );
        self.collect_contacts();
    }

    /// Advances by `elapsed` wall-clock seconds in fixed `fixed_dt` substeps, running at
    /// most `max_substeps`. Time beyond the cap is dropped rather than carried forward.
    /// Returns the number of substeps taken.
    pub fn step_frame(&mut self, fixed_dt: Real, elapsed: Real, max_substeps: usize) -> usize {
        if fixed_dt <= 0.0 || !elapsed.is_finite() {
            return 0;
        }
        self.accumulator += elapsed.max(0.0);
        let mut substeps = 0;
        while self.accumulator >= fixed_dt && substeps < max_substeps {
            self.step(fixed_dt);
            self.accumulator -= fixed_dt;
            substeps += 1;
        }
        if self.accumulator >= fixed_dt {
            self.accumulator %= fixed_dt;
        }
        substeps
    }

    pub fn pending_time(&self) -> Real {
        self.accumulator
    }

    pub fn insert_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.colliders.insert(collider)
    }

    pub fn insert_body(&mut self, body: RigidBody, colliders: Vec<Collider>) -> RigidBodyHandle {
        let handle = self.bodies.insert(body);
        for collider in colliders {
            self.colliders
                .insert_with_parent(collider, handle, &mut self.bodies);
        }
        handle
    }

    /// Starts reporting contacts that involve `body`.
    pub fn watch_contacts(&mut self, body: RigidBodyHandle) {
        if !self.contact_watch.contains(&body) {
            self.contact_watch.push(body);
        }
    }

    /// Hands over every contact queued since the previous drain, in step order.
    pub fn drain_contacts(&mut self) -> impl Iterator<Item = ContactEvent> + '_ {
        self.contacts.drain(..)
    }

    fn collect_contacts(&mut self) {
        for &watched in &self.contact_watch {
            let Some(body) = self.bodies.get(watched) else {
                continue;
            };
            for &collider in body.colliders() {
                for pair in self.narrow_phase.contact_pairs_with(collider) {
                    if !pair.has_any_active_contact {
                        continue;
                    }
                    for manifold in &pair.manifolds {
                        if manifold.points.is_empty() {
                            continue;
                        }
                        self.contacts.push_back(ContactEvent {
                            collider1: pair.collider1,
                            collider2: pair.collider2,
                            body1: manifold.data.rigid_body1,
                            body2: manifold.data.rigid_body2,
                            normal: manifold.data.normal,
                        });
                    }
                }
            }
        }
    }
}
