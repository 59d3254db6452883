//! Walking-avatar control: held-key input, ground contact, and body velocity.
#![forbid(unsafe_code)]

use physics_rapier::{ContactEvent, PhysicsWorld};
use rapier3d::math::{Rotation, Vector};
use rapier3d::prelude::{ColliderBuilder, Real, RigidBodyBuilder, RigidBodyHandle};

/// Contacts whose normal is within ~60° of world up count as standing on something.
pub const GROUND_NORMAL_MIN_DOT: Real = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveAxis {
    Forward,
    Back,
    Left,
    Right,
}

/// Currently held movement keys. Each key owns its flag; opposite keys cancel only
/// once the vector is summed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl InputState {
    pub fn set(&mut self, axis: MoveAxis, pressed: bool) {
        match axis {
            MoveAxis::Forward => self.forward = pressed,
            MoveAxis::Back => self.back = pressed,
            MoveAxis::Left => self.left = pressed,
            MoveAxis::Right => self.right = pressed,
        }
    }

    pub fn release_all(&mut self) {
        *self = Self::default();
    }

    pub fn any(&self) -> bool {
        self.forward || self.back || self.left || self.right
    }

    /// Body-local velocity: forward is -Z, right is +X, each held key adds `speed`.
    ///
    /// Diagonals are intentionally not renormalised, so forward+right moves at
    /// `speed * sqrt(2)`.
    pub fn local_velocity(&self, speed: Real) -> Vector<Real> {
        let x = (self.right as i32 - self.left as i32) as Real;
        let z = (self.back as i32 - self.forward as i32) as Real;
        Vector::new(x * speed, 0.0, z * speed)
    }
}

/// Horizontal world velocity for the held keys, turned by camera yaw only.
pub fn desired_velocity(input: &InputState, yaw: Real, speed: Real) -> Vector<Real> {
    Rotation::from_axis_angle(&Vector::y_axis(), yaw) * input.local_velocity(speed)
}

/// Latching ground flag: contacts can set it, only a jump clears it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroundContact {
    on_ground: bool,
}

impl GroundContact {
    pub fn on_ground(&self) -> bool {
        self.on_ground
    }

    /// `normal` points from the touched surface into the player.
    pub fn observe(&mut self, normal: Vector<Real>) -> bool {
        let qualifies = normal.dot(&Vector::y()) > GROUND_NORMAL_MIN_DOT;
        if qualifies {
            self.on_ground = true;
        }
        qualifies
    }

    fn take_off(&mut self) {
        self.on_ground = false;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerConfig {
    pub move_speed: Real,
    pub jump_speed: Real,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            move_speed: 5.0,
            jump_speed: 5.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerBodyConfig {
    pub radius: Real,
    pub mass: Real,
    pub linear_damping: Real,
    pub friction: Real,
    pub spawn: Vector<Real>,
}

impl Default for PlayerBodyConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            mass: 70.0,
            linear_damping: 0.9,
            friction: 0.3,
            spawn: Vector::new(0.0, 0.6, 5.0),
        }
    }
}

/// Inserts the player's ball body and subscribes it to contact reports.
pub fn spawn_player_body(world: &mut PhysicsWorld, config: &PlayerBodyConfig) -> RigidBodyHandle {
    let body = RigidBodyBuilder::dynamic()
        .translation(config.spawn)
        .linear_damping(config.linear_damping)
        .lock_rotations()
        .build();
    let collider = ColliderBuilder::ball(config.radius)
        .mass(config.mass)
        .friction(config.friction)
        .build();
    let handle = world.insert_body(body, vec![collider]);
    world.watch_contacts(handle);
    handle
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerOutput {
    pub velocity: Vector<Real>,
    pub jumped: bool,
}

pub struct PlayerController {
    config: ControllerConfig,
    body: RigidBodyHandle,
    ground: GroundContact,
    jump_requested: bool,
}

impl PlayerController {
    pub fn new(config: ControllerConfig, body: RigidBodyHandle) -> Self {
        Self {
            config,
            body,
            ground: GroundContact::default(),
            jump_requested: false,
        }
    }

    pub fn body(&self) -> RigidBodyHandle {
        self.body
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn on_ground(&self) -> bool {
        self.ground.on_ground()
    }

    pub fn jump_requested(&self) -> bool {
        self.jump_requested
    }

    /// Fresh jump key press. Accepted only while grounded; returns whether it was.
    pub fn press_jump(&mut self) -> bool {
        if self.ground.on_ground() {
            self.jump_requested = true;
        }
        self.jump_requested
    }

    /// Drops a press that has not been issued yet.
    pub fn cancel_jump(&mut self) {
        self.jump_requested = false;
    }

    /// Feeds queued world contacts into the ground flag; unrelated contacts are ignored.
    pub fn absorb_contacts(&mut self, events: impl IntoIterator<Item = ContactEvent>) {
        for event in events {
            if let Some(normal) = event.normal_into(self.body) {
                self.ground.observe(normal);
            }
        }
    }

    /// Writes the input velocity into the body, overwriting X/Z, and issues a pending
    /// jump if the body is grounded.
    pub fn update(
        &mut self,
        world: &mut PhysicsWorld,
        input: &InputState,
        yaw: Real,
    ) -> ControllerOutput {
        let Some(body) = world.body_mut(self.body) else {
            return ControllerOutput {
                velocity: Vector::zeros(),
                jumped: false,
            };
        };
        let planar = desired_velocity(input, yaw, self.config.move_speed);
        let mut velocity = *body.linvel();
        velocity.x = planar.x;
        velocity.z = planar.z;
        let jumped = self.jump_requested && self.ground.on_ground();
        if jumped {
            velocity.y = self.config.jump_speed;
            self.jump_requested = false;
            self.ground.take_off();
        }
        body.set_linvel(velocity, true);
        ControllerOutput { velocity, jumped }
    }
}
