//! Physics-body component. Until the body is attached to the physics world
//! the typed fields here are authoritative; afterwards the world is, and this
//! component is a thin accessor over the handle.

use galgo_ids::ActorId;
use galgo_physics::{BodyDef, BodyHandle, BodyType, FixtureDef, PhysicsWorld2D, ShapeDef};
use galgo_variant::Vec2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Box,
    Circle,
}

impl ShapeKind {
    pub fn parse(s: &str) -> ShapeKind {
        if s == "circle" {
            ShapeKind::Circle
        } else {
            ShapeKind::Box
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ShapeKind::Box => "box",
            ShapeKind::Circle => "circle",
        }
    }
}

/// Dynamic state captured in a save while the body was attached. Applied by
/// the coordinator when it re-attaches restored bodies; the codec itself
/// never touches the physics world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestoredDynamics {
    pub velocity: Vec2,
    /// Degrees per second.
    pub angular_velocity: f32,
    pub force: Vec2,
    pub torque: f32,
}

#[derive(Clone, Debug)]
pub struct PhysicsBody {
    pub enabled: bool,
    pub position: Vec2,
    /// Degrees.
    pub rotation: f32,
    pub body_type: BodyType,
    pub angular_damping: f32,
    pub density: f32,
    pub gravity_scale: f32,
    pub precise: bool,
    pub has_collider: bool,
    pub has_trigger: bool,
    pub collider_shape: ShapeKind,
    pub width: f32,
    pub height: f32,
    pub radius: f32,
    pub friction: f32,
    pub bounciness: f32,
    pub trigger_shape: ShapeKind,
    pub trigger_width: f32,
    pub trigger_height: f32,
    pub trigger_radius: f32,

    pub handle: Option<BodyHandle>,
    pub restored: Option<RestoredDynamics>,
    /// Force/torque applied since attach, kept so saves can carry them over.
    pub applied_force: Vec2,
    pub applied_torque: f32,
}

impl Default for PhysicsBody {
    fn default() -> Self {
        Self {
            enabled: true,
            position: Vec2::ZERO,
            rotation: 0.0,
            body_type: BodyType::Dynamic,
            angular_damping: 0.3,
            density: 1.0,
            gravity_scale: 1.0,
            precise: true,
            has_collider: true,
            has_trigger: true,
            collider_shape: ShapeKind::Box,
            width: 1.0,
            height: 1.0,
            radius: 0.5,
            friction: 0.3,
            bounciness: 0.3,
            trigger_shape: ShapeKind::Box,
            trigger_width: 1.0,
            trigger_height: 1.0,
            trigger_radius: 0.5,
            handle: None,
            restored: None,
            applied_force: Vec2::ZERO,
            applied_torque: 0.0,
        }
    }
}

impl PhysicsBody {
    fn collider_def(&self) -> FixtureDef {
        FixtureDef {
            shape: match self.collider_shape {
                ShapeKind::Box => ShapeDef::Box {
                    width: self.width,
                    height: self.height,
                },
                ShapeKind::Circle => ShapeDef::Circle {
                    radius: self.radius,
                },
            },
            friction: self.friction,
            restitution: self.bounciness,
        }
    }

    fn trigger_def(&self) -> FixtureDef {
        FixtureDef {
            shape: match self.trigger_shape {
                ShapeKind::Box => ShapeDef::Box {
                    width: self.trigger_width,
                    height: self.trigger_height,
                },
                ShapeKind::Circle => ShapeDef::Circle {
                    radius: self.trigger_radius,
                },
            },
            friction: self.friction,
            restitution: self.bounciness,
        }
    }

    /// Create the body in the world from the local fields and hand authority
    /// over. Staged restore dynamics are applied here.
    pub fn attach(&mut self, actor: ActorId, world: &mut PhysicsWorld2D) {
        if self.handle.is_some() {
            return;
        }
        let def = BodyDef {
            position: self.position,
            angle: self.rotation.to_radians(),
            body_type: self.body_type,
            angular_damping: self.angular_damping,
            gravity_scale: self.gravity_scale,
            density: self.density,
            precise: self.precise,
            collider: self.has_collider.then(|| self.collider_def()),
            trigger: self.has_trigger.then(|| self.trigger_def()),
        };
        let handle = world.attach_body(actor, &def);
        self.handle = Some(handle);

        if let Some(dynamics) = self.restored.take() {
            world.set_velocity(handle, dynamics.velocity);
            world.set_angular_velocity(handle, dynamics.angular_velocity.to_radians());
            world.add_force(handle, dynamics.force);
            world.add_torque(handle, dynamics.torque);
            self.applied_force = dynamics.force;
            self.applied_torque = dynamics.torque;
        }
    }

    pub fn detach(&mut self, world: &mut PhysicsWorld2D) {
        if let Some(handle) = self.handle.take() {
            world.detach_body(handle);
        }
    }

    pub fn position(&self, world: &PhysicsWorld2D) -> Vec2 {
        self.handle
            .and_then(|h| world.position(h))
            .unwrap_or(self.position)
    }

    pub fn set_position(&mut self, world: &mut PhysicsWorld2D, position: Vec2) {
        match self.handle {
            Some(handle) => world.set_position(handle, position),
            None => self.position = position,
        }
    }

    /// Degrees.
    pub fn rotation(&self, world: &PhysicsWorld2D) -> f32 {
        self.handle
            .and_then(|h| world.rotation(h))
            .map(|r| r.to_degrees())
            .unwrap_or(self.rotation)
    }

    pub fn set_rotation(&mut self, world: &mut PhysicsWorld2D, degrees: f32) {
        match self.handle {
            Some(handle) => world.set_rotation(handle, degrees.to_radians()),
            None => self.rotation = degrees,
        }
    }

    pub fn velocity(&self, world: &PhysicsWorld2D) -> Vec2 {
        self.handle
            .and_then(|h| world.velocity(h))
            .unwrap_or(Vec2::ZERO)
    }

    pub fn set_velocity(&mut self, world: &mut PhysicsWorld2D, velocity: Vec2) {
        if let Some(handle) = self.handle {
            world.set_velocity(handle, velocity);
        }
    }

    /// Degrees per second.
    pub fn angular_velocity(&self, world: &PhysicsWorld2D) -> f32 {
        self.handle
            .and_then(|h| world.angular_velocity(h))
            .map(|v| v.to_degrees())
            .unwrap_or(0.0)
    }

    pub fn set_angular_velocity(&mut self, world: &mut PhysicsWorld2D, degrees: f32) {
        if let Some(handle) = self.handle {
            world.set_angular_velocity(handle, degrees.to_radians());
        }
    }

    pub fn gravity_scale(&self, world: &PhysicsWorld2D) -> f32 {
        self.handle
            .and_then(|h| world.gravity_scale(h))
            .unwrap_or(self.gravity_scale)
    }

    pub fn set_gravity_scale(&mut self, world: &mut PhysicsWorld2D, scale: f32) {
        match self.handle {
            Some(handle) => world.set_gravity_scale(handle, scale),
            None => self.gravity_scale = scale,
        }
    }

    pub fn add_force(&mut self, world: &mut PhysicsWorld2D, force: Vec2) {
        if let Some(handle) = self.handle {
            world.add_force(handle, force);
            self.applied_force.x += force.x;
            self.applied_force.y += force.y;
        }
    }

    pub fn add_torque(&mut self, world: &mut PhysicsWorld2D, torque: f32) {
        if let Some(handle) = self.handle {
            world.add_torque(handle, torque);
            self.applied_torque += torque;
        }
    }
}
