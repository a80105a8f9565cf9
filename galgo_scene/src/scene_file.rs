//! Scene-definition and actor-template loading. These are authored JSON
//! files; anything missing or malformed here is an authoring mistake and
//! fails loudly before a frame runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value as JsonValue;

use galgo_behavior::BehaviorHost;
use galgo_ids::ActorId;
use galgo_physics::BodyType;
use galgo_variant::Value;

use crate::actor::{Actor, Component, ComponentState, PARTICLE_TYPE, RIGIDBODY_TYPE};
use crate::particles::ParticleEmitter;
use crate::physics_body::{PhysicsBody, ShapeKind};
use crate::scene::Scene;
use crate::SceneError;

pub const SCENES_DIR: &str = "scenes";
pub const TEMPLATES_DIR: &str = "actor_templates";

pub fn read_json(path: &Path) -> Result<JsonValue, SceneError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| SceneError::Malformed {
        path: path.display().to_string(),
        source,
    })
}

pub struct SceneLoader<'a> {
    pub resources: &'a Path,
    pub host: &'a dyn BehaviorHost,
}

impl<'a> SceneLoader<'a> {
    pub fn new(resources: &'a Path, host: &'a dyn BehaviorHost) -> Self {
        Self { resources, host }
    }

    fn scene_path(&self, name: &str) -> PathBuf {
        self.resources.join(SCENES_DIR).join(format!("{name}.scene"))
    }

    fn template_path(&self, name: &str) -> PathBuf {
        self.resources
            .join(TEMPLATES_DIR)
            .join(format!("{name}.template"))
    }

    /// Fresh scene load.
    pub fn load(&self, name: &str) -> Result<Scene, SceneError> {
        self.load_with_carry(name, Vec::new(), None)
    }

    /// Scene load with actors carried over from the previous scene (the
    /// keep-across-loads set) and optionally its already-loaded templates.
    /// The id counter restarts and is then raised past every carried id, so
    /// fresh scenes number from 1 while carried actors stay unique.
    pub fn load_with_carry(
        &self,
        name: &str,
        carried: Vec<Actor>,
        templates: Option<HashMap<String, Actor>>,
    ) -> Result<Scene, SceneError> {
        let path = self.scene_path(name);
        if !path.exists() {
            return Err(SceneError::MissingScene(name.to_string()));
        }
        let json = read_json(&path)?;

        let mut scene = Scene::new(name);
        scene.templates = match templates {
            Some(templates) => templates,
            None => self.load_templates()?,
        };
        scene.ids.reset();
        for actor in carried {
            scene.insert_actor(actor);
        }

        let entries = json
            .get("actors")
            .and_then(|v| v.as_array())
            .ok_or_else(|| SceneError::MissingActors(name.to_string()))?;
        for entry in entries {
            let id = scene.ids.next();
            let actor = self.actor_from_json(entry, &mut scene.templates, id)?;
            scene.insert_actor(actor);
        }
        scene.sort_actors();
        Ok(scene)
    }

    /// Load every template in the templates directory, once per scene build.
    pub fn load_templates(&self) -> Result<HashMap<String, Actor>, SceneError> {
        let mut templates = HashMap::new();
        let dir = self.resources.join(TEMPLATES_DIR);
        if !dir.exists() {
            return Ok(templates);
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let json = read_json(&path)?;
            let template = self.actor_from_fields(&json, stem, ActorId::nil())?;
            templates.insert(stem.to_string(), template);
        }
        Ok(templates)
    }

    /// Build one scene-entry actor: template copy first (loading the
    /// template file on demand if the directory scan missed it), then the
    /// entry's own name and component overrides.
    fn actor_from_json(
        &self,
        json: &JsonValue,
        templates: &mut HashMap<String, Actor>,
        id: ActorId,
    ) -> Result<Actor, SceneError> {
        let mut actor = match json.get("template").and_then(|v| v.as_str()) {
            Some(template_name) => {
                if !templates.contains_key(template_name) {
                    let path = self.template_path(template_name);
                    if !path.exists() {
                        return Err(SceneError::MissingTemplate(template_name.to_string()));
                    }
                    let template_json = read_json(&path)?;
                    let template =
                        self.actor_from_fields(&template_json, template_name, ActorId::nil())?;
                    templates.insert(template_name.to_string(), template);
                }
                templates[template_name].clone_for_instantiate(id)
            }
            None => Actor::new(id, String::new()),
        };
        self.apply_fields(&mut actor, json, id)?;
        Ok(actor)
    }

    /// Actor built from raw fields (template files). The default name is the
    /// file stem.
    fn actor_from_fields(
        &self,
        json: &JsonValue,
        default_name: &str,
        id: ActorId,
    ) -> Result<Actor, SceneError> {
        let mut actor = Actor::new(id, default_name.to_string());
        self.apply_fields(&mut actor, json, id)?;
        Ok(actor)
    }

    fn apply_fields(
        &self,
        actor: &mut Actor,
        json: &JsonValue,
        owner: ActorId,
    ) -> Result<(), SceneError> {
        if let Some(name) = json.get("name").and_then(|v| v.as_str()) {
            actor.name = name.to_string();
        }
        if let Some(components) = json.get("components").and_then(|v| v.as_object()) {
            for (key, component_json) in components {
                self.apply_component(actor, key, component_json, owner)?;
            }
        }
        Ok(())
    }

    fn apply_component(
        &self,
        actor: &mut Actor,
        key: &str,
        json: &JsonValue,
        owner: ActorId,
    ) -> Result<(), SceneError> {
        if let Some(existing) = actor.components.get_mut(key) {
            // Template already supplied this key; the entry only overrides.
            match &mut existing.state {
                ComponentState::Body(body) => apply_body_fields(body, json),
                ComponentState::Emitter(_) => {}
                ComponentState::Generic { table, .. } => {
                    apply_generic_fields(table, json);
                    table.set("key", Value::Str(existing.key.clone()));
                    table.set("enabled", Value::Bool(true));
                    table.set("actor", Value::Actor(owner));
                }
            }
            return Ok(());
        }

        let type_name = json
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SceneError::MissingComponentType(key.to_string()))?;
        let key: Arc<str> = Arc::<str>::from(key);
        let component = match type_name {
            RIGIDBODY_TYPE => {
                let mut body = PhysicsBody::default();
                apply_body_fields(&mut body, json);
                Component::body(key, body)
            }
            PARTICLE_TYPE => {
                let mut emitter = ParticleEmitter::default();
                apply_emitter_fields(&mut emitter, json);
                Component::emitter(key, emitter)
            }
            other => {
                let behavior = self
                    .host
                    .resolve(other)
                    .ok_or_else(|| SceneError::MissingBehavior(other.to_string()))?;
                let component = Component::generic(key, behavior, owner);
                if let ComponentState::Generic { table, .. } = &component.state {
                    apply_generic_fields(table, json);
                    table.set("key", Value::Str(component.key.clone()));
                    table.set("enabled", Value::Bool(true));
                    table.set("actor", Value::Actor(owner));
                }
                component
            }
        };
        actor.components.insert(component.key.clone(), component);
        Ok(())
    }
}

/// Copy primitive override fields into a generic component's table.
fn apply_generic_fields(table: &galgo_variant::TableRef, json: &JsonValue) {
    if let Some(object) = json.as_object() {
        for (field, value) in object {
            if field == "type" {
                continue;
            }
            match value {
                JsonValue::String(s) => table.set(field.as_str(), Value::string(s)),
                JsonValue::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        table.set(field.as_str(), Value::Int(i));
                    } else if let Some(f) = n.as_f64() {
                        table.set(field.as_str(), Value::Float(f as f32));
                    }
                }
                JsonValue::Bool(b) => table.set(field.as_str(), Value::Bool(*b)),
                _ => {}
            }
        }
    }
}

fn json_f32(json: &JsonValue, field: &str) -> Option<f32> {
    json.get(field).and_then(|v| v.as_f64()).map(|v| v as f32)
}

fn json_i32(json: &JsonValue, field: &str) -> Option<i32> {
    json.get(field).and_then(|v| v.as_i64()).map(|v| v as i32)
}

fn json_u8(json: &JsonValue, field: &str) -> Option<u8> {
    json.get(field).and_then(|v| v.as_i64()).map(|v| v as u8)
}

fn json_bool(json: &JsonValue, field: &str) -> Option<bool> {
    json.get(field).and_then(|v| v.as_bool())
}

fn json_str<'j>(json: &'j JsonValue, field: &str) -> Option<&'j str> {
    json.get(field).and_then(|v| v.as_str())
}

pub(crate) fn apply_body_fields(body: &mut PhysicsBody, json: &JsonValue) {
    if let Some(v) = json_f32(json, "x") {
        body.position.x = v;
    }
    if let Some(v) = json_f32(json, "y") {
        body.position.y = v;
    }
    if let Some(v) = json_f32(json, "density") {
        body.density = v;
    }
    if let Some(v) = json_f32(json, "angular_friction") {
        body.angular_damping = v;
    }
    if let Some(v) = json_f32(json, "gravity_scale") {
        body.gravity_scale = v;
    }
    if let Some(v) = json_f32(json, "rotation") {
        body.rotation = v;
    }
    if let Some(v) = json_str(json, "body_type") {
        body.body_type = BodyType::parse(v);
    }
    if let Some(v) = json_bool(json, "has_collider") {
        body.has_collider = v;
    }
    if let Some(v) = json_bool(json, "has_trigger") {
        body.has_trigger = v;
    }
    if let Some(v) = json_bool(json, "precise") {
        body.precise = v;
    }
    if let Some(v) = json_str(json, "collider_type") {
        body.collider_shape = ShapeKind::parse(v);
    }
    if let Some(v) = json_f32(json, "width") {
        body.width = v;
    }
    if let Some(v) = json_f32(json, "height") {
        body.height = v;
    }
    if let Some(v) = json_f32(json, "radius") {
        body.radius = v;
    }
    if let Some(v) = json_f32(json, "friction") {
        body.friction = v;
    }
    if let Some(v) = json_f32(json, "bounciness") {
        body.bounciness = v;
    }
    if let Some(v) = json_str(json, "trigger_type") {
        body.trigger_shape = ShapeKind::parse(v);
    }
    if let Some(v) = json_f32(json, "trigger_width") {
        body.trigger_width = v;
    }
    if let Some(v) = json_f32(json, "trigger_height") {
        body.trigger_height = v;
    }
    if let Some(v) = json_f32(json, "trigger_radius") {
        body.trigger_radius = v;
    }
}

pub(crate) fn apply_emitter_fields(emitter: &mut ParticleEmitter, json: &JsonValue) {
    if let Some(v) = json_f32(json, "x") {
        emitter.start_pos.x = v;
    }
    if let Some(v) = json_f32(json, "y") {
        emitter.start_pos.y = v;
    }
    if let Some(v) = json_i32(json, "frames_between_bursts") {
        emitter.frames_between_bursts = v;
    }
    if let Some(v) = json_i32(json, "burst_quantity") {
        emitter.burst_quantity = v;
    }
    if let Some(v) = json_f32(json, "rotation_min") {
        emitter.rotation_range.x = v;
    }
    if let Some(v) = json_f32(json, "rotation_max") {
        emitter.rotation_range.y = v;
    }
    if let Some(v) = json_f32(json, "start_scale_min") {
        emitter.start_scale.x = v;
    }
    if let Some(v) = json_f32(json, "start_scale_max") {
        emitter.start_scale.y = v;
    }
    for (index, field) in ["start_color_r", "start_color_g", "start_color_b", "start_color_a"]
        .iter()
        .enumerate()
    {
        if let Some(v) = json_u8(json, field) {
            emitter.start_color[index] = v;
        }
    }
    for (index, field) in ["end_color_r", "end_color_g", "end_color_b", "end_color_a"]
        .iter()
        .enumerate()
    {
        if let Some(v) = json_u8(json, field) {
            emitter.set_end_color(index, v);
        }
    }
    if let Some(v) = json_f32(json, "emit_radius_min") {
        emitter.emit_radius_range.x = v;
    }
    if let Some(v) = json_f32(json, "emit_radius_max") {
        emitter.emit_radius_range.y = v;
    }
    if let Some(v) = json_f32(json, "emit_angle_min") {
        emitter.emit_angle_range.x = v;
    }
    if let Some(v) = json_f32(json, "emit_angle_max") {
        emitter.emit_angle_range.y = v;
    }
    if let Some(v) = json_str(json, "image") {
        emitter.image = Arc::<str>::from(v);
    }
    if let Some(v) = json_i32(json, "sorting_order") {
        emitter.sorting_order = v;
    }
    if let Some(v) = json_i32(json, "duration_frames") {
        emitter.duration_frames = v;
    }
    if let Some(v) = json_f32(json, "start_speed_min") {
        emitter.start_speed.x = v;
    }
    if let Some(v) = json_f32(json, "start_speed_max") {
        emitter.start_speed.y = v;
    }
    if let Some(v) = json_f32(json, "rotation_speed_min") {
        emitter.rotation_speed.x = v;
    }
    if let Some(v) = json_f32(json, "rotation_speed_max") {
        emitter.rotation_speed.y = v;
    }
    if let Some(v) = json_f32(json, "gravity_scale_x") {
        emitter.accel.x = v;
    }
    if let Some(v) = json_f32(json, "gravity_scale_y") {
        emitter.accel.y = v;
    }
    if let Some(v) = json_f32(json, "drag_factor") {
        emitter.drag_factor = v;
    }
    if let Some(v) = json_f32(json, "angular_drag_factor") {
        emitter.angular_drag_factor = v;
    }
    if let Some(v) = json_f32(json, "end_scale") {
        emitter.end_scale = Some(v);
    }
}
