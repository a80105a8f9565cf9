//! 2D physics boundary built on Rapier2D. The engine core only sees opaque
//! body handles, definition structs, and contact events.

use rapier2d::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;

use galgo_ids::ActorId;
use galgo_variant::Vec2;

/// Contact geometry substituted when none exists (trigger contacts and
/// contact-end notifications).
pub const SENTINEL: Vec2 = Vec2 { x: -999.0, y: -999.0 };

/// Collision filter groups: solid fixtures only collide with solid fixtures,
/// trigger sensors only overlap trigger sensors.
const GROUP_COLLIDER: u32 = 0b0010;
const GROUP_TRIGGER: u32 = 0b0100;

pub type BodyHandle = RigidBodyHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyType {
    Dynamic,
    Static,
    Kinematic,
}

impl BodyType {
    pub fn parse(s: &str) -> BodyType {
        match s {
            "dynamic" => BodyType::Dynamic,
            "static" => BodyType::Static,
            _ => BodyType::Kinematic,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            BodyType::Dynamic => "dynamic",
            BodyType::Static => "static",
            BodyType::Kinematic => "kinematic",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShapeDef {
    Box { width: f32, height: f32 },
    Circle { radius: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixtureDef {
    pub shape: ShapeDef,
    pub friction: f32,
    pub restitution: f32,
}

/// Everything needed to create a body and its fixtures in one call.
#[derive(Clone, Debug)]
pub struct BodyDef {
    pub position: Vec2,
    pub angle: f32,
    pub body_type: BodyType,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub density: f32,
    /// Bullet flag: continuous collision detection for fast movers.
    pub precise: bool,
    pub collider: Option<FixtureDef>,
    pub trigger: Option<FixtureDef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactPhase {
    Begin,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactKind {
    Collision,
    Trigger,
}

/// One contact notification, already translated to engine terms. Both actors
/// are identified; the scene dispatches to each side.
#[derive(Clone, Copy, Debug)]
pub struct ContactEvent {
    pub phase: ContactPhase,
    pub kind: ContactKind,
    pub actor_a: ActorId,
    pub actor_b: ActorId,
    pub point: Vec2,
    pub normal: Vec2,
    pub relative_velocity: Vec2,
}

/// Manages the Rapier2D physics world.
pub struct PhysicsWorld2D {
    pub pipeline: PhysicsPipeline,
    pub islands: IslandManager,
    pub broad_phase: BroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub query_pipeline: QueryPipeline,
    pub ccd_solver: CCDSolver,
    /// Map from body handle back to the owning actor.
    pub body_to_actor: HashMap<RigidBodyHandle, ActorId>,
    gravity: Vector<Real>,
}

impl PhysicsWorld2D {
    pub fn new() -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            query_pipeline: QueryPipeline::new(),
            ccd_solver: CCDSolver::new(),
            body_to_actor: HashMap::new(),
            gravity: vector![0.0, 9.8],
        }
    }

    /// Create a body plus its fixtures for `actor`. Fixture filter groups keep
    /// solids and triggers in disjoint collision worlds; a body with neither
    /// gets a non-interacting sensor so it still simulates.
    pub fn attach_body(&mut self, actor: ActorId, def: &BodyDef) -> BodyHandle {
        let body_type = match def.body_type {
            BodyType::Dynamic => RigidBodyType::Dynamic,
            BodyType::Static => RigidBodyType::Fixed,
            BodyType::Kinematic => RigidBodyType::KinematicVelocityBased,
        };
        let body = RigidBodyBuilder::new(body_type)
            .translation(vector![def.position.x, def.position.y])
            .rotation(def.angle)
            .angular_damping(def.angular_damping)
            .gravity_scale(def.gravity_scale)
            .ccd_enabled(def.precise)
            .build();
        let handle = self.bodies.insert(body);
        self.body_to_actor.insert(handle, actor);

        if let Some(fixture) = &def.collider {
            self.insert_fixture(handle, actor, fixture, def.density, false, GROUP_COLLIDER);
        }
        if let Some(fixture) = &def.trigger {
            self.insert_fixture(handle, actor, fixture, def.density, true, GROUP_TRIGGER);
        }
        if def.collider.is_none() && def.trigger.is_none() {
            let phantom = FixtureDef {
                shape: ShapeDef::Box {
                    width: 1.0,
                    height: 1.0,
                },
                friction: 0.3,
                restitution: 0.3,
            };
            self.insert_fixture(handle, actor, &phantom, def.density, true, 0);
        }
        handle
    }

    fn insert_fixture(
        &mut self,
        body: RigidBodyHandle,
        actor: ActorId,
        fixture: &FixtureDef,
        density: f32,
        sensor: bool,
        group: u32,
    ) {
        let shape = shape_to_rapier(fixture.shape);
        let collider = ColliderBuilder::new(shape)
            .sensor(sensor)
            .friction(fixture.friction)
            .restitution(fixture.restitution)
            .density(density)
            .collision_groups(InteractionGroups::new(group, group))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(actor.as_u64() as u128)
            .build();
        self.colliders
            .insert_with_parent(collider, body, &mut self.bodies);
    }

    /// Remove a body and its fixtures; the handle is dead afterwards.
    pub fn detach_body(&mut self, handle: BodyHandle) {
        self.body_to_actor.remove(&handle);
        let _ = self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Step the simulation by one fixed timestep and return the contacts that
    /// began or ended during it.
    pub fn step(&mut self, dt: f32) -> Vec<ContactEvent> {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = dt;

        struct EmptyHooks;
        impl PhysicsHooks for EmptyHooks {}

        struct EventCollector {
            events: Mutex<Vec<CollisionEvent>>,
        }
        impl EventHandler for EventCollector {
            fn handle_collision_event(
                &self,
                _bodies: &RigidBodySet,
                _colliders: &ColliderSet,
                event: CollisionEvent,
                _contact_pair: Option<&ContactPair>,
            ) {
                if let Ok(mut events) = self.events.lock() {
                    events.push(event);
                }
            }
        }

        let hooks = EmptyHooks;
        let collector = EventCollector {
            events: Mutex::new(Vec::new()),
        };

        self.pipeline.step(
            &self.gravity,
            &integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &hooks,
            &collector,
        );

        self.query_pipeline
            .update(&self.islands, &self.bodies, &self.colliders);

        let raw = collector.events.into_inner().unwrap_or_default();
        raw.into_iter()
            .filter_map(|event| self.translate_event(event))
            .collect()
    }

    fn translate_event(&self, event: CollisionEvent) -> Option<ContactEvent> {
        let (c1, c2, phase, sensor) = match event {
            CollisionEvent::Started(c1, c2, flags) => (
                c1,
                c2,
                ContactPhase::Begin,
                flags.contains(CollisionEventFlags::SENSOR),
            ),
            CollisionEvent::Stopped(c1, c2, flags) => (
                c1,
                c2,
                ContactPhase::End,
                flags.contains(CollisionEventFlags::SENSOR),
            ),
        };
        let actor_a = ActorId::from_u64(self.colliders.get(c1)?.user_data as u64);
        let actor_b = ActorId::from_u64(self.colliders.get(c2)?.user_data as u64);

        let body1 = self.colliders.get(c1).and_then(|c| c.parent());
        let body2 = self.colliders.get(c2).and_then(|c| c.parent());
        let vel1 = body1
            .and_then(|h| self.bodies.get(h))
            .map(|b| *b.linvel())
            .unwrap_or_else(|| vector![0.0, 0.0]);
        let vel2 = body2
            .and_then(|h| self.bodies.get(h))
            .map(|b| *b.linvel())
            .unwrap_or_else(|| vector![0.0, 0.0]);
        let relative = vel1 - vel2;

        // Triggers and end-of-contact have no usable geometry.
        let (point, normal) = if sensor || phase == ContactPhase::End {
            (SENTINEL, SENTINEL)
        } else {
            self.contact_geometry(c1, c2).unwrap_or((SENTINEL, SENTINEL))
        };

        Some(ContactEvent {
            phase,
            kind: if sensor {
                ContactKind::Trigger
            } else {
                ContactKind::Collision
            },
            actor_a,
            actor_b,
            point,
            normal,
            relative_velocity: Vec2::new(relative.x, relative.y),
        })
    }

    fn contact_geometry(&self, c1: ColliderHandle, c2: ColliderHandle) -> Option<(Vec2, Vec2)> {
        let pair = self.narrow_phase.contact_pair(c1, c2)?;
        let manifold = pair.manifolds.iter().find(|m| !m.data.solver_contacts.is_empty())?;
        let contact = manifold.data.solver_contacts.first()?;
        let normal = manifold.data.normal;
        Some((
            Vec2::new(contact.point.x, contact.point.y),
            Vec2::new(normal.x, normal.y),
        ))
    }

    // --- body accessors ---

    pub fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        let body = self.bodies.get(handle)?;
        let t = body.translation();
        Some(Vec2::new(t.x, t.y))
    }

    pub fn set_position(&mut self, handle: BodyHandle, position: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(vector![position.x, position.y], true);
        }
    }

    /// Body rotation in radians.
    pub fn rotation(&self, handle: BodyHandle) -> Option<f32> {
        Some(self.bodies.get(handle)?.rotation().angle())
    }

    pub fn set_rotation(&mut self, handle: BodyHandle, angle: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_rotation(angle, true);
        }
    }

    pub fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        let v = self.bodies.get(handle)?.linvel();
        Some(Vec2::new(v.x, v.y))
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(vector![velocity.x, velocity.y], true);
        }
    }

    /// Angular velocity in radians per second.
    pub fn angular_velocity(&self, handle: BodyHandle) -> Option<f32> {
        Some(self.bodies.get(handle)?.angvel())
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, angvel: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_angvel(angvel, true);
        }
    }

    pub fn gravity_scale(&self, handle: BodyHandle) -> Option<f32> {
        Some(self.bodies.get(handle)?.gravity_scale())
    }

    pub fn set_gravity_scale(&mut self, handle: BodyHandle, scale: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_gravity_scale(scale, true);
        }
    }

    pub fn add_force(&mut self, handle: BodyHandle, force: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.add_force(vector![force.x, force.y], true);
        }
    }

    pub fn add_torque(&mut self, handle: BodyHandle, torque: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.add_torque(torque, true);
        }
    }

    pub fn actor_of(&self, handle: BodyHandle) -> Option<ActorId> {
        self.body_to_actor.get(&handle).copied()
    }
}

impl Default for PhysicsWorld2D {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert an engine shape into a Rapier shape. Box extents are half-sized.
pub fn shape_to_rapier(shape: ShapeDef) -> SharedShape {
    match shape {
        ShapeDef::Box { width, height } => SharedShape::cuboid(width / 2.0, height / 2.0),
        ShapeDef::Circle { radius } => SharedShape::ball(radius),
    }
}
