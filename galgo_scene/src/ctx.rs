//! The engine surface handed to behavior callbacks. Wraps the live scene;
//! structural mutations go through the stage/commit protocol, persistence is
//! recorded as pending requests for the coordinator.

use std::sync::Arc;

use galgo_behavior::{BehaviorHost, CallbackFn, EngineApi};
use galgo_ids::ActorId;
use galgo_variant::{ComponentRef, TableRef, Value, Vec2};

use crate::actor::{Component, ComponentState, PARTICLE_TYPE, RIGIDBODY_TYPE};
use crate::events::Subscriber;
use crate::particles::ParticleEmitter;
use crate::physics_body::PhysicsBody;
use crate::scene::{SaveRequest, Scene, Transition};

pub struct SceneCtx<'a> {
    pub scene: &'a mut Scene,
    pub host: &'a dyn BehaviorHost,
    pub frame: u64,
}

impl SceneCtx<'_> {
    fn with_body<R>(
        &self,
        body: &ComponentRef,
        f: impl FnOnce(&PhysicsBody, &galgo_physics::PhysicsWorld2D) -> R,
    ) -> Option<R> {
        let actor = self.scene.actor(body.actor)?;
        let component = actor.component_by_key(body.key.as_ref())?;
        match &component.state {
            ComponentState::Body(b) => Some(f(b, &self.scene.physics)),
            _ => None,
        }
    }

    fn with_body_mut<R>(
        &mut self,
        body: &ComponentRef,
        f: impl FnOnce(&mut PhysicsBody, &mut galgo_physics::PhysicsWorld2D) -> R,
    ) -> Option<R> {
        let (component, physics) = self.scene.component_and_world_mut(body)?;
        match &mut component.state {
            ComponentState::Body(b) => Some(f(b, physics)),
            _ => None,
        }
    }

    fn with_emitter_mut<R>(
        &mut self,
        emitter: &ComponentRef,
        f: impl FnOnce(&mut ParticleEmitter) -> R,
    ) -> Option<R> {
        let actor = self.scene.actor_mut(emitter.actor)?;
        let component = actor.component_by_key_mut(emitter.key.as_ref())?;
        match &mut component.state {
            ComponentState::Emitter(e) => Some(f(e)),
            _ => None,
        }
    }
}

impl Scene {
    /// Disjoint borrows of one actor's component and the physics world, for
    /// the thin body accessors.
    pub(crate) fn component_and_world_mut(
        &mut self,
        reference: &ComponentRef,
    ) -> Option<(&mut Component, &mut galgo_physics::PhysicsWorld2D)> {
        let Scene {
            actors,
            added_this_frame,
            physics,
            ..
        } = self;
        let actor = match actors.binary_search_by_key(&reference.actor, |a| a.id) {
            Ok(index) => actors.get_mut(index),
            Err(_) => added_this_frame
                .iter_mut()
                .find(|a| a.id == reference.actor),
        }?;
        let component = actor.component_by_key_mut(reference.key.as_ref())?;
        Some((component, physics))
    }
}

impl EngineApi for SceneCtx<'_> {
    fn find_actor(&self, name: &str) -> Value {
        match self.scene.find_by_name(name) {
            Some(id) => Value::Actor(id),
            None => Value::Nil,
        }
    }

    fn find_all_actors(&self, name: &str) -> Vec<Value> {
        self.scene
            .find_all_by_name(name)
            .into_iter()
            .map(Value::Actor)
            .collect()
    }

    fn actor_by_id(&self, id: u64) -> Value {
        match self.scene.find_by_id(ActorId::from_u64(id)) {
            Some(actor) => Value::Actor(actor.id),
            None => Value::Nil,
        }
    }

    fn actor_name(&self, actor: ActorId) -> Option<String> {
        self.scene.actor(actor).map(|a| a.name.clone())
    }

    fn instantiate(&mut self, template: &str) -> Value {
        Value::Actor(self.scene.instantiate(template))
    }

    fn destroy(&mut self, actor: ActorId) {
        self.scene.destroy(actor);
    }

    fn keep_across_loads(&mut self, actor: ActorId) {
        if let Some(actor) = self.scene.actor_mut(actor) {
            actor.keep_across_loads = true;
        }
    }

    fn set_actor_persist(&mut self, actor: ActorId, persist: bool) {
        if let Some(actor) = self.scene.actor_mut(actor) {
            actor.persist = persist;
        }
    }

    fn component_by_key(&self, actor: ActorId, key: &str) -> Value {
        self.scene
            .actor(actor)
            .and_then(|a| a.component_by_key(key).map(|c| c.ref_value(actor)))
            .unwrap_or(Value::Nil)
    }

    fn component_by_type(&self, actor: ActorId, type_name: &str) -> Value {
        self.scene
            .actor(actor)
            .and_then(|a| a.component_by_type(type_name).map(|c| c.ref_value(actor)))
            .unwrap_or(Value::Nil)
    }

    fn components_by_type(&self, actor: ActorId, type_name: &str) -> Vec<Value> {
        self.scene
            .actor(actor)
            .map(|a| {
                a.components_by_type(type_name)
                    .into_iter()
                    .map(|c| c.ref_value(actor))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stage a new component onto the actor; it is findable by key at once
    /// and joins the component map at the actor's late-update commit.
    fn add_component(&mut self, actor: ActorId, type_name: &str) -> Value {
        let key = self.scene.next_component_key();
        let component = match type_name {
            RIGIDBODY_TYPE => Component::body(key, PhysicsBody::default()),
            PARTICLE_TYPE => Component::emitter(key, ParticleEmitter::default()),
            other => match self.host.resolve(other) {
                Some(behavior) => Component::generic(key, behavior, actor),
                None => {
                    log::error!("add_component: no behavior definition named `{other}`");
                    return Value::Nil;
                }
            },
        };
        let value = component.ref_value(actor);
        match self.scene.actor_mut(actor) {
            Some(actor) => actor.stage_component(component),
            None => return Value::Nil,
        }
        value
    }

    fn remove_component(&mut self, actor: ActorId, component: &Value) {
        let key: Option<Arc<str>> = match component {
            Value::Component(reference) => Some(reference.key.clone()),
            Value::Table(table) => self.scene.actor(actor).and_then(|a| {
                a.components
                    .values()
                    .chain(a.added_this_frame.iter())
                    .find_map(|c| match &c.state {
                        ComponentState::Generic { table: t, .. } if t.ptr_eq(table) => {
                            Some(c.key.clone())
                        }
                        _ => None,
                    })
            }),
            _ => None,
        };
        if let (Some(key), Some(actor)) = (key, self.scene.actor_mut(actor)) {
            actor.stage_remove(key.as_ref());
        }
    }

    fn body_position(&self, body: &ComponentRef) -> Vec2 {
        self.with_body(body, |b, w| b.position(w)).unwrap_or(Vec2::ZERO)
    }

    fn body_set_position(&mut self, body: &ComponentRef, position: Vec2) {
        self.with_body_mut(body, |b, w| b.set_position(w, position));
    }

    fn body_rotation(&self, body: &ComponentRef) -> f32 {
        self.with_body(body, |b, w| b.rotation(w)).unwrap_or(0.0)
    }

    fn body_set_rotation(&mut self, body: &ComponentRef, degrees: f32) {
        self.with_body_mut(body, |b, w| b.set_rotation(w, degrees));
    }

    fn body_velocity(&self, body: &ComponentRef) -> Vec2 {
        self.with_body(body, |b, w| b.velocity(w)).unwrap_or(Vec2::ZERO)
    }

    fn body_set_velocity(&mut self, body: &ComponentRef, velocity: Vec2) {
        self.with_body_mut(body, |b, w| b.set_velocity(w, velocity));
    }

    fn body_angular_velocity(&self, body: &ComponentRef) -> f32 {
        self.with_body(body, |b, w| b.angular_velocity(w)).unwrap_or(0.0)
    }

    fn body_set_angular_velocity(&mut self, body: &ComponentRef, degrees: f32) {
        self.with_body_mut(body, |b, w| b.set_angular_velocity(w, degrees));
    }

    fn body_gravity_scale(&self, body: &ComponentRef) -> f32 {
        self.with_body(body, |b, w| b.gravity_scale(w)).unwrap_or(1.0)
    }

    fn body_set_gravity_scale(&mut self, body: &ComponentRef, scale: f32) {
        self.with_body_mut(body, |b, w| b.set_gravity_scale(w, scale));
    }

    fn body_add_force(&mut self, body: &ComponentRef, force: Vec2) {
        self.with_body_mut(body, |b, w| b.add_force(w, force));
    }

    fn emitter_play(&mut self, emitter: &ComponentRef) {
        self.with_emitter_mut(emitter, |e| e.play());
    }

    fn emitter_stop(&mut self, emitter: &ComponentRef) {
        self.with_emitter_mut(emitter, |e| e.stop());
    }

    fn emitter_burst(&mut self, emitter: &ComponentRef) {
        self.with_emitter_mut(emitter, |e| e.burst());
    }

    fn subscribe(&mut self, event: &str, state: TableRef, callback: Arc<CallbackFn>) {
        self.scene.bus.subscribe(event, Subscriber { state, callback });
    }

    fn unsubscribe(&mut self, event: &str, state: &TableRef, callback: &Arc<CallbackFn>) {
        self.scene.bus.unsubscribe(
            event,
            Subscriber {
                state: state.clone(),
                callback: callback.clone(),
            },
        );
    }

    /// Synchronous delivery to the committed subscriber list. The list is
    /// snapshotted first, so subscribers may touch the bus reentrantly.
    fn publish(&mut self, event: &str, payload: Value) {
        let subscribers = self.scene.bus.subscribers(event);
        for subscriber in subscribers {
            let cb = subscriber.callback.clone();
            if let Err(error) = cb(
                self,
                &subscriber.state,
                &galgo_behavior::CallbackArgs::Event(payload.clone()),
            ) {
                crate::report_callback_error(event, &error);
            }
        }
    }

    fn camera_position(&self) -> Vec2 {
        self.scene.camera
    }

    fn set_camera_position(&mut self, position: Vec2) {
        self.scene.camera = position;
    }

    fn current_scene(&self) -> String {
        self.scene.name.clone()
    }

    fn load_scene(&mut self, name: &str) {
        self.scene.pending = Some(Transition::Load(name.to_string()));
    }

    fn save_state(&mut self, file: &str) {
        self.scene.save_requests.push(SaveRequest::State(file.to_string()));
    }

    fn load_state(&mut self, file: &str) {
        self.scene.pending = Some(Transition::Restore(file.to_string()));
    }

    fn save_scene(&mut self, file: &str, preview: Option<TableRef>) {
        self.scene.save_requests.push(SaveRequest::Scene {
            file: file.to_string(),
            preview,
        });
    }

    fn load_overlay(&mut self, file: &str, scene: &str) {
        self.scene.pending = Some(Transition::OverlayOnto {
            save: file.to_string(),
            scene: scene.to_string(),
        });
    }

    fn load_overlay_current(&mut self, file: &str) {
        self.scene.pending = Some(Transition::OverlayCurrent(file.to_string()));
    }

    fn shared(&self) -> TableRef {
        self.scene.shared.clone()
    }

    fn frame(&self) -> u64 {
        self.frame
    }

    fn quit(&mut self) {
        self.scene.quit_requested = true;
    }
}
