//! Scene and value decoding. References are never resolved inline: every
//! tag-4 value becomes a relocation record, and one pass after the whole load
//! patches every container against the completed registry. That is what lets
//! forward and cyclic references round-trip without ever materializing a
//! dangling pointer.

use std::io::Read;
use std::sync::Arc;

use galgo_behavior::BehaviorHost;
use galgo_ids::ActorId;
use galgo_physics::BodyType;
use galgo_scene::{
    Actor, Component, ComponentState, ParticleEmitter, PhysicsBody, RestoredDynamics, Scene,
    ShapeKind, PARTICLE_TYPE, RIGIDBODY_TYPE,
};
use galgo_variant::{TableRef, Value, Vec2};

use crate::common::*;
use crate::SaveError;

/// Deferred patch instruction for a decoded reference whose target may not
/// have existed yet when it was read. Consumed exactly once by
/// [`resolve_relocations`].
pub struct Reference {
    /// The container to patch.
    pub container: TableRef,
    /// The key within the container.
    pub key: Arc<str>,
    /// The referenced actor.
    pub target: ActorId,
    /// `Some` for component references, `None` for plain actor references.
    pub component_key: Option<Arc<str>>,
}

pub struct Deserializer<R: Read> {
    reader: R,
}

impl<R: Read> Deserializer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Raw reader access, for artifact prefixes outside the value encoding.
    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn read_scene(
        &mut self,
        relocations: &mut Vec<Reference>,
        host: &dyn BehaviorHost,
    ) -> Result<Scene, SaveError> {
        let name = read_string(&mut self.reader)?;
        let camera_x = read_f32(&mut self.reader)?;
        let camera_y = read_f32(&mut self.reader)?;
        let mut scene = Scene::new(name);
        scene.camera = Vec2::new(camera_x, camera_y);
        let count = read_u64(&mut self.reader)?;
        for _ in 0..count {
            let actor = self.read_actor(relocations, host)?;
            scene.insert_actor(actor);
        }
        scene.sort_actors();
        Ok(scene)
    }

    /// Actors of an overlay artifact (after its preview has been read).
    pub fn read_actor_list(
        &mut self,
        relocations: &mut Vec<Reference>,
        host: &dyn BehaviorHost,
    ) -> Result<Vec<Actor>, SaveError> {
        let count = read_u64(&mut self.reader)?;
        let mut actors = Vec::with_capacity(count as usize);
        for _ in 0..count {
            actors.push(self.read_actor(relocations, host)?);
        }
        Ok(actors)
    }

    pub fn read_actor(
        &mut self,
        relocations: &mut Vec<Reference>,
        host: &dyn BehaviorHost,
    ) -> Result<Actor, SaveError> {
        let id = ActorId::from_u64(read_u64(&mut self.reader)?);
        let name = read_string(&mut self.reader)?;
        let mut actor = Actor::new(id, name);
        actor.keep_across_loads = read_bool(&mut self.reader)?;
        actor.persist = read_bool(&mut self.reader)?;
        let count = read_u64(&mut self.reader)?;
        for _ in 0..count {
            let key: Arc<str> = Arc::<str>::from(read_string(&mut self.reader)?.as_str());
            let component = self.read_component(relocations, host, key.clone())?;
            if let ComponentState::Generic { table, .. } = &component.state {
                table.set("key", Value::Str(key.clone()));
                table.set("actor", Value::Actor(id));
            }
            actor.components.insert(key, component);
        }
        Ok(actor)
    }

    pub fn read_component(
        &mut self,
        relocations: &mut Vec<Reference>,
        host: &dyn BehaviorHost,
        key: Arc<str>,
    ) -> Result<Component, SaveError> {
        let type_name = read_string(&mut self.reader)?;
        let initialized = read_bool(&mut self.reader)?;
        let mut component = match type_name.as_str() {
            RIGIDBODY_TYPE => Component::body(key, self.read_body()?),
            PARTICLE_TYPE => Component::emitter(key, self.read_emitter()?),
            other => {
                let table = self.read_table(relocations)?;
                let behavior = host
                    .resolve(other)
                    .ok_or_else(|| SaveError::MissingBehavior(other.to_string()))?;
                Component::generic_from_table(
                    key,
                    Arc::<str>::from(other),
                    table,
                    behavior,
                )
            }
        };
        component.initialized = initialized;
        Ok(component)
    }

    fn read_body(&mut self) -> Result<PhysicsBody, SaveError> {
        let mut body = PhysicsBody::default();
        body.enabled = read_bool(&mut self.reader)?;
        body.position.x = read_f32(&mut self.reader)?;
        body.position.y = read_f32(&mut self.reader)?;
        body.body_type = BodyType::parse(&read_string(&mut self.reader)?);
        body.rotation = read_f32(&mut self.reader)?;
        body.gravity_scale = read_f32(&mut self.reader)?;
        body.angular_damping = read_f32(&mut self.reader)?;
        body.density = read_f32(&mut self.reader)?;
        body.precise = read_bool(&mut self.reader)?;
        body.has_collider = read_bool(&mut self.reader)?;
        body.has_trigger = read_bool(&mut self.reader)?;
        body.collider_shape = ShapeKind::parse(&read_string(&mut self.reader)?);
        body.width = read_f32(&mut self.reader)?;
        body.height = read_f32(&mut self.reader)?;
        body.radius = read_f32(&mut self.reader)?;
        body.friction = read_f32(&mut self.reader)?;
        body.bounciness = read_f32(&mut self.reader)?;
        body.trigger_shape = ShapeKind::parse(&read_string(&mut self.reader)?);
        body.trigger_width = read_f32(&mut self.reader)?;
        body.trigger_height = read_f32(&mut self.reader)?;
        body.trigger_radius = read_f32(&mut self.reader)?;
        if read_bool(&mut self.reader)? {
            // The body was attached when saved; the coordinator re-attaches
            // it after the load and applies this state.
            body.restored = Some(RestoredDynamics {
                velocity: read_vec2(&mut self.reader)?,
                angular_velocity: read_f32(&mut self.reader)?,
                force: read_vec2(&mut self.reader)?,
                torque: read_f32(&mut self.reader)?,
            });
        }
        Ok(body)
    }

    fn read_emitter(&mut self) -> Result<ParticleEmitter, SaveError> {
        let mut emitter = ParticleEmitter::default();
        emitter.playing = read_bool(&mut self.reader)?;
        emitter.enabled = read_bool(&mut self.reader)?;
        emitter.start_pos = read_vec2(&mut self.reader)?;
        emitter.start_scale = read_vec2(&mut self.reader)?;
        emitter.start_speed = read_vec2(&mut self.reader)?;
        emitter.rotation_range = read_vec2(&mut self.reader)?;
        emitter.rotation_speed = read_vec2(&mut self.reader)?;
        emitter.accel = read_vec2(&mut self.reader)?;
        emitter.emit_angle_range = read_vec2(&mut self.reader)?;
        emitter.emit_radius_range = read_vec2(&mut self.reader)?;
        for channel in 0..4 {
            emitter.start_color[channel] = read_u8(&mut self.reader)?;
        }
        for channel in 0..4 {
            emitter.end_color[channel] = read_u8(&mut self.reader)?;
        }
        emitter.drag_factor = read_f32(&mut self.reader)?;
        emitter.angular_drag_factor = read_f32(&mut self.reader)?;
        emitter.lifetime_cap = read_f32(&mut self.reader)?;
        emitter.lifetime_per_frame = read_f32(&mut self.reader)?;
        let has_end_scale = read_bool(&mut self.reader)?;
        let end_scale = read_f32(&mut self.reader)?;
        emitter.end_scale = has_end_scale.then_some(end_scale);
        emitter.sorting_order = read_i32(&mut self.reader)?;
        emitter.frame_count = read_i32(&mut self.reader)?;
        emitter.frames_between_bursts = read_i32(&mut self.reader)?;
        emitter.duration_frames = read_i32(&mut self.reader)?;
        emitter.burst_quantity = read_i32(&mut self.reader)?;
        emitter.image = Arc::<str>::from(read_string(&mut self.reader)?.as_str());
        for channel in 0..4 {
            emitter.end_mask[channel] = read_bool(&mut self.reader)?;
        }
        emitter.generated = read_u64(&mut self.reader)?;
        let count = read_u64(&mut self.reader)? as usize;
        emitter.positions.reserve(count);
        emitter.ages.reserve(count);
        emitter.spins.reserve(count);
        emitter.velocities.reserve(count);
        emitter.scales.reserve(count);
        for _ in 0..count {
            emitter.positions.push(read_vec2(&mut self.reader)?);
            emitter.ages.push(read_f32(&mut self.reader)?);
            emitter.spins.push(read_vec2(&mut self.reader)?);
            emitter.velocities.push(read_vec2(&mut self.reader)?);
            emitter.scales.push(read_f32(&mut self.reader)?);
        }
        // Re-seed and fast-forward the attribute streams so the emitter
        // continues exactly where the saved run left off.
        emitter.restore_streams();
        Ok(emitter)
    }

    /// Read one table. Reference tags produce relocation records instead of
    /// values; the referenced keys stay absent until the relocation pass.
    pub fn read_table(
        &mut self,
        relocations: &mut Vec<Reference>,
    ) -> Result<TableRef, SaveError> {
        let table = TableRef::new();
        let count = read_u64(&mut self.reader)?;
        for _ in 0..count {
            let key: Arc<str> = Arc::<str>::from(read_string(&mut self.reader)?.as_str());
            let tag = read_u8(&mut self.reader)?;
            match tag {
                TAG_INT => table.set(key, Value::Int(read_i64(&mut self.reader)?)),
                TAG_FLOAT => table.set(key, Value::Float(read_f32(&mut self.reader)?)),
                TAG_BOOL => table.set(key, Value::Bool(read_bool(&mut self.reader)?)),
                TAG_STRING => {
                    table.set(key, Value::string(read_string(&mut self.reader)?))
                }
                TAG_REFERENCE => {
                    let kind = read_string(&mut self.reader)?;
                    let target = ActorId::from_u64(read_u64(&mut self.reader)?);
                    let component_key = if kind == ACTOR_REF_NAME {
                        None
                    } else {
                        Some(Arc::<str>::from(read_string(&mut self.reader)?.as_str()))
                    };
                    relocations.push(Reference {
                        container: table.clone(),
                        key,
                        target,
                        component_key,
                    });
                }
                TAG_TABLE => {
                    let nested = self.read_table(relocations)?;
                    table.set(key, Value::Table(nested));
                }
                TAG_VEC2 => table.set(key, Value::Vec2(read_vec2(&mut self.reader)?)),
                unknown => return Err(SaveError::UnknownTag(unknown)),
            }
        }
        Ok(table)
    }
}

/// Patch every recorded reference against the now-complete registry, once.
/// A reference whose target does not exist resolves to an explicit `Nil`;
/// a generic component reference re-aliases the live state table, so alias
/// sites share one table instead of gaining copies.
pub fn resolve_relocations(scene: &Scene, relocations: Vec<Reference>) {
    for reference in relocations {
        let value = match &reference.component_key {
            None => match scene.find_by_id(reference.target) {
                Some(actor) => Value::Actor(actor.id),
                None => Value::Nil,
            },
            Some(component_key) => scene
                .find_by_id(reference.target)
                .and_then(|actor| {
                    actor
                        .component_by_key(component_key)
                        .map(|component| component.ref_value(actor.id))
                })
                .unwrap_or(Value::Nil),
        };
        reference.container.set(reference.key, value);
    }
}
