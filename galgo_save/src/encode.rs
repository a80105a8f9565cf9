//! Scene and value encoding. The serializer walks registry data and opaque
//! component payloads; it knows the three component kinds and nothing else
//! about component semantics.

use std::io::Write;
use std::sync::Arc;

use galgo_ids::ActorId;
use galgo_scene::{Actor, Component, ComponentState, Scene};
use galgo_variant::{TableRef, Value};

use crate::artifacts::SaveFilter;
use crate::common::*;
use crate::SaveError;

pub struct Serializer<W: Write> {
    writer: W,
}

impl<W: Write> Serializer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Raw writer access, for artifact prefixes outside the value encoding.
    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Save-state payload: `[name][camera x][camera y][count][actor...]`.
    pub fn write_scene(&mut self, scene: &Scene) -> Result<(), SaveError> {
        write_string(&mut self.writer, &scene.name)?;
        write_f32(&mut self.writer, scene.camera.x)?;
        write_f32(&mut self.writer, scene.camera.y)?;
        write_u64(&mut self.writer, scene.actors.len() as u64)?;
        for actor in &scene.actors {
            self.write_actor(actor, scene)?;
        }
        Ok(())
    }

    /// Actors carrying the persist flag only, for explicit scene saves.
    pub fn write_persistent_actors(&mut self, scene: &Scene) -> Result<(), SaveError> {
        let persistent: Vec<&Actor> = scene.actors.iter().filter(|a| a.persist).collect();
        write_u64(&mut self.writer, persistent.len() as u64)?;
        for actor in persistent {
            self.write_actor(actor, scene)?;
        }
        Ok(())
    }

    pub fn write_actor(&mut self, actor: &Actor, scene: &Scene) -> Result<(), SaveError> {
        write_u64(&mut self.writer, actor.id.as_u64())?;
        write_string(&mut self.writer, &actor.name)?;
        write_bool(&mut self.writer, actor.keep_across_loads)?;
        write_bool(&mut self.writer, actor.persist)?;
        write_u64(&mut self.writer, actor.components.len() as u64)?;
        for (key, component) in &actor.components {
            write_string(&mut self.writer, key)?;
            self.write_component(component, scene)?;
        }
        Ok(())
    }

    pub fn write_component(&mut self, component: &Component, scene: &Scene) -> Result<(), SaveError> {
        write_string(&mut self.writer, &component.type_name)?;
        write_bool(&mut self.writer, component.initialized)?;
        match &component.state {
            ComponentState::Generic { table, .. } => self.write_table(table, scene),
            ComponentState::Body(body) => {
                let world = &scene.physics;
                write_bool(&mut self.writer, body.enabled)?;
                let position = body.position(world);
                write_f32(&mut self.writer, position.x)?;
                write_f32(&mut self.writer, position.y)?;
                write_string(&mut self.writer, body.body_type.as_str())?;
                write_f32(&mut self.writer, body.rotation(world))?;
                write_f32(&mut self.writer, body.gravity_scale(world))?;
                write_f32(&mut self.writer, body.angular_damping)?;
                write_f32(&mut self.writer, body.density)?;
                write_bool(&mut self.writer, body.precise)?;
                write_bool(&mut self.writer, body.has_collider)?;
                write_bool(&mut self.writer, body.has_trigger)?;
                write_string(&mut self.writer, body.collider_shape.as_str())?;
                write_f32(&mut self.writer, body.width)?;
                write_f32(&mut self.writer, body.height)?;
                write_f32(&mut self.writer, body.radius)?;
                write_f32(&mut self.writer, body.friction)?;
                write_f32(&mut self.writer, body.bounciness)?;
                write_string(&mut self.writer, body.trigger_shape.as_str())?;
                write_f32(&mut self.writer, body.trigger_width)?;
                write_f32(&mut self.writer, body.trigger_height)?;
                write_f32(&mut self.writer, body.trigger_radius)?;
                let attached = body.handle.is_some();
                write_bool(&mut self.writer, attached)?;
                if attached {
                    write_vec2(&mut self.writer, body.velocity(world))?;
                    write_f32(&mut self.writer, body.angular_velocity(world))?;
                    write_vec2(&mut self.writer, body.applied_force)?;
                    write_f32(&mut self.writer, body.applied_torque)?;
                }
                Ok(())
            }
            ComponentState::Emitter(emitter) => {
                write_bool(&mut self.writer, emitter.playing)?;
                write_bool(&mut self.writer, emitter.enabled)?;
                write_vec2(&mut self.writer, emitter.start_pos)?;
                write_vec2(&mut self.writer, emitter.start_scale)?;
                write_vec2(&mut self.writer, emitter.start_speed)?;
                write_vec2(&mut self.writer, emitter.rotation_range)?;
                write_vec2(&mut self.writer, emitter.rotation_speed)?;
                write_vec2(&mut self.writer, emitter.accel)?;
                write_vec2(&mut self.writer, emitter.emit_angle_range)?;
                write_vec2(&mut self.writer, emitter.emit_radius_range)?;
                for channel in emitter.start_color {
                    write_u8(&mut self.writer, channel)?;
                }
                for channel in emitter.end_color {
                    write_u8(&mut self.writer, channel)?;
                }
                write_f32(&mut self.writer, emitter.drag_factor)?;
                write_f32(&mut self.writer, emitter.angular_drag_factor)?;
                write_f32(&mut self.writer, emitter.lifetime_cap)?;
                write_f32(&mut self.writer, emitter.lifetime_per_frame)?;
                write_bool(&mut self.writer, emitter.end_scale.is_some())?;
                write_f32(&mut self.writer, emitter.end_scale.unwrap_or(0.0))?;
                write_i32(&mut self.writer, emitter.sorting_order)?;
                write_i32(&mut self.writer, emitter.frame_count)?;
                write_i32(&mut self.writer, emitter.frames_between_bursts)?;
                write_i32(&mut self.writer, emitter.duration_frames)?;
                write_i32(&mut self.writer, emitter.burst_quantity)?;
                write_string(&mut self.writer, &emitter.image)?;
                for set in emitter.end_mask {
                    write_bool(&mut self.writer, set)?;
                }
                write_u64(&mut self.writer, emitter.generated)?;
                write_u64(&mut self.writer, emitter.positions.len() as u64)?;
                for i in 0..emitter.positions.len() {
                    write_vec2(&mut self.writer, emitter.positions[i])?;
                    write_f32(&mut self.writer, emitter.ages[i])?;
                    write_vec2(&mut self.writer, emitter.spins[i])?;
                    write_vec2(&mut self.writer, emitter.velocities[i])?;
                    write_f32(&mut self.writer, emitter.scales[i])?;
                }
                Ok(())
            }
        }
    }

    /// Count-prefixed `(key, tag, payload)` entries. Nil entries are skipped.
    pub fn write_table(&mut self, table: &TableRef, scene: &Scene) -> Result<(), SaveError> {
        let entries: Vec<(Arc<str>, Value)> = table
            .borrow()
            .iter()
            .filter(|(_, value)| !value.is_nil())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        write_u64(&mut self.writer, entries.len() as u64)?;
        for (key, value) in entries {
            write_string(&mut self.writer, &key)?;
            self.write_value(&value, scene)?;
        }
        Ok(())
    }

    /// The shared table, with excluded names (behavior definitions, engine
    /// namespaces) filtered out.
    pub fn write_shared(&mut self, scene: &Scene, filter: &SaveFilter) -> Result<(), SaveError> {
        let entries: Vec<(Arc<str>, Value)> = scene
            .shared
            .borrow()
            .iter()
            .filter(|(key, value)| !value.is_nil() && !filter.is_excluded(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        write_u64(&mut self.writer, entries.len() as u64)?;
        for (key, value) in entries {
            write_string(&mut self.writer, &key)?;
            self.write_value(&value, scene)?;
        }
        Ok(())
    }

    fn write_value(&mut self, value: &Value, scene: &Scene) -> Result<(), SaveError> {
        match value {
            Value::Int(v) => {
                write_u8(&mut self.writer, TAG_INT)?;
                write_i64(&mut self.writer, *v)
            }
            Value::Float(v) => {
                write_u8(&mut self.writer, TAG_FLOAT)?;
                write_f32(&mut self.writer, *v)
            }
            Value::Bool(v) => {
                write_u8(&mut self.writer, TAG_BOOL)?;
                write_bool(&mut self.writer, *v)
            }
            Value::Str(v) => {
                write_u8(&mut self.writer, TAG_STRING)?;
                write_string(&mut self.writer, v)
            }
            Value::Vec2(v) => {
                write_u8(&mut self.writer, TAG_VEC2)?;
                write_vec2(&mut self.writer, *v)
            }
            Value::Actor(id) => {
                write_u8(&mut self.writer, TAG_REFERENCE)?;
                write_string(&mut self.writer, ACTOR_REF_NAME)?;
                write_u64(&mut self.writer, id.as_u64())
            }
            Value::Component(reference) => {
                write_u8(&mut self.writer, TAG_REFERENCE)?;
                write_string(&mut self.writer, &reference.kind)?;
                write_u64(&mut self.writer, reference.actor.as_u64())?;
                write_string(&mut self.writer, &reference.key)
            }
            Value::Table(table) => {
                // A table shaped like a component (key/actor/enabled) is
                // written as a reference, not duplicated at every alias
                // site. Documented limitation: a user table sharing those
                // three field names is misclassified.
                if let Some((kind, actor, key)) = component_shape(table, scene) {
                    write_u8(&mut self.writer, TAG_REFERENCE)?;
                    write_string(&mut self.writer, &kind)?;
                    write_u64(&mut self.writer, actor.as_u64())?;
                    write_string(&mut self.writer, &key)
                } else {
                    write_u8(&mut self.writer, TAG_TABLE)?;
                    self.write_table(table, scene)
                }
            }
            Value::Nil => Err(SaveError::Corrupt(
                "nil values are skipped, not encoded".to_string(),
            )),
        }
    }
}

/// Resolve the component a component-shaped table belongs to. Returns the
/// component's type name, owning actor, and key; `None` when the table is not
/// component-shaped or the component no longer exists.
fn component_shape(table: &TableRef, scene: &Scene) -> Option<(Arc<str>, ActorId, Arc<str>)> {
    let (actor, key) = {
        let entries = table.borrow();
        if !entries.contains_key("enabled") {
            return None;
        }
        let actor = entries.get("actor")?.as_actor()?;
        let key = match entries.get("key")? {
            Value::Str(key) => key.clone(),
            _ => return None,
        };
        (actor, key)
    };
    let component = scene.actor(actor)?.component_by_key(&key)?;
    Some((component.type_name.clone(), actor, key))
}
