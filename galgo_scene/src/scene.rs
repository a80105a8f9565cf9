//! The entity registry: one scene's live actor graph, its indices, and the
//! stage/commit protocol that keeps structural mutation out of the frame's
//! iteration. Nothing outside the frame driver commits mutations mid-frame.

use std::collections::HashMap;
use std::sync::Arc;

use galgo_behavior::{
    BehaviorHost, CallbackArgs, CallbackFn, CallbackSlot, Collision,
};
use galgo_ids::{ActorId, ActorIdAllocator};
use galgo_physics::{ContactEvent, ContactKind, ContactPhase, PhysicsWorld2D};
use galgo_variant::{TableRef, Vec2};

use crate::actor::{Actor, Component, ComponentState};
use crate::events::EventBus;
use crate::render::SpriteRequest;
use crate::report_callback_error;

/// A scene change requested during the frame, applied by the coordinator at
/// the next frame boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// Fresh load from a scene definition; keep-across-loads actors carry over.
    Load(String),
    /// Full save-state restore, replacing the running scene.
    Restore(String),
    /// Load a scene definition, then overlay saved actors onto it.
    OverlayOnto { save: String, scene: String },
    /// Overlay saved actors onto the running scene.
    OverlayCurrent(String),
}

/// A save requested during the frame, executed by the coordinator before the
/// registry commit so it captures the same view scripted code saw.
#[derive(Clone)]
pub enum SaveRequest {
    State(String),
    Scene {
        file: String,
        preview: Option<TableRef>,
    },
}

pub struct Scene {
    pub name: String,
    pub camera: Vec2,
    /// Primary collection, id-ordered at every commit.
    pub actors: Vec<Actor>,
    /// Name index; staged actors are visible here immediately.
    pub actors_by_name: HashMap<String, Vec<ActorId>>,
    pub templates: HashMap<String, Actor>,
    /// Cross-behavior shared state, persisted with save states.
    pub shared: TableRef,
    pub physics: PhysicsWorld2D,
    pub render_queue: Vec<SpriteRequest>,
    pub bus: EventBus,
    pub ids: ActorIdAllocator,
    pub pending: Option<Transition>,
    pub save_requests: Vec<SaveRequest>,
    pub quit_requested: bool,
    pub(crate) added_this_frame: Vec<Actor>,
    removed_this_frame: Vec<ActorId>,
    components_added: u64,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Scene {
        Scene {
            name: name.into(),
            camera: Vec2::ZERO,
            actors: Vec::new(),
            actors_by_name: HashMap::new(),
            templates: HashMap::new(),
            shared: TableRef::new(),
            physics: PhysicsWorld2D::new(),
            render_queue: Vec::new(),
            bus: EventBus::new(),
            ids: ActorIdAllocator::new(),
            pending: None,
            save_requests: Vec::new(),
            quit_requested: false,
            added_this_frame: Vec::new(),
            removed_this_frame: Vec::new(),
            components_added: 0,
        }
    }

    // --- lookup ---

    fn index_of(&self, id: ActorId) -> Option<usize> {
        self.actors.binary_search_by_key(&id, |a| a.id).ok()
    }

    /// Binary search over the committed, id-ordered list. Staged actors are
    /// intentionally not visible here until commit.
    pub fn find_by_id(&self, id: ActorId) -> Option<&Actor> {
        self.index_of(id).map(|i| &self.actors[i])
    }

    /// Committed-or-staged resolution, for name-index hits and internal use.
    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.find_by_id(id)
            .or_else(|| self.added_this_frame.iter().find(|a| a.id == id))
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        if let Some(i) = self.index_of(id) {
            return self.actors.get_mut(i);
        }
        self.added_this_frame.iter_mut().find(|a| a.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<ActorId> {
        self.actors_by_name
            .get(name)
            .and_then(|bucket| bucket.first())
            .copied()
    }

    pub fn find_all_by_name(&self, name: &str) -> Vec<ActorId> {
        self.actors_by_name.get(name).cloned().unwrap_or_default()
    }

    // --- staged mutation ---

    /// Deep-copy the named template into a new actor. The actor is findable
    /// by name immediately but joins the id-ordered list only at commit.
    pub fn instantiate(&mut self, template: &str) -> ActorId {
        let id = self.ids.next();
        let actor = match self.templates.get(template) {
            Some(proto) => proto.clone_for_instantiate(id),
            None => {
                log::warn!("instantiate: no template named `{template}`");
                Actor::new(id, String::new())
            }
        };
        self.actors_by_name
            .entry(actor.name.clone())
            .or_default()
            .push(id);
        self.added_this_frame.push(actor);
        id
    }

    /// Disable all of the actor's components (observable this frame), drop it
    /// from the name index, and stage it for removal at commit.
    pub fn destroy(&mut self, id: ActorId) {
        let name = match self.actor_mut(id) {
            Some(actor) => {
                actor.disable_all();
                actor.name.clone()
            }
            None => return,
        };
        if let Some(bucket) = self.actors_by_name.get_mut(&name) {
            bucket.retain(|other| *other != id);
        }
        if !self.removed_this_frame.contains(&id) {
            self.removed_this_frame.push(id);
        }
    }

    /// Insert a fully-built actor (loader / overlay path). The caller is
    /// responsible for re-sorting after a bulk merge.
    pub fn insert_actor(&mut self, actor: Actor) {
        self.ids.observe(actor.id);
        self.actors_by_name
            .entry(actor.name.clone())
            .or_default()
            .push(actor.id);
        self.actors.push(actor);
    }

    /// Remove a committed actor immediately, without staging. Overlay loads
    /// use this to replace same-id actors; bodies are detached on the spot.
    pub fn evict_actor(&mut self, id: ActorId) -> Option<Actor> {
        let index = self.index_of(id)?;
        let mut actor = self.actors.remove(index);
        if let Some(bucket) = self.actors_by_name.get_mut(&actor.name) {
            bucket.retain(|other| *other != id);
        }
        for component in actor.components.values_mut() {
            if let ComponentState::Body(body) = &mut component.state {
                body.detach(&mut self.physics);
            }
        }
        Some(actor)
    }

    pub fn sort_actors(&mut self) {
        self.actors.sort_by_key(|a| a.id);
    }

    /// Generated key for components added at runtime.
    pub(crate) fn next_component_key(&mut self) -> Arc<str> {
        let key = format!("r{}", self.components_added);
        self.components_added += 1;
        Arc::<str>::from(key.as_str())
    }

    // --- frame passes ---

    /// Run `on_start` for every uninitialized enabled component that binds
    /// it. The initialized flag is set on the attempt, success or not, and is
    /// never retried.
    pub fn run_start(&mut self, host: &dyn BehaviorHost, frame: u64) {
        enum StartJob {
            Script(Arc<CallbackFn>, TableRef),
            Body,
            Emitter,
        }

        let ids: Vec<ActorId> = self.actors.iter().map(|a| a.id).collect();
        for id in ids {
            let (name, keys) = match self.find_by_id(id) {
                Some(actor) => (
                    actor.name.clone(),
                    actor.components.keys().cloned().collect::<Vec<_>>(),
                ),
                None => continue,
            };
            for key in keys {
                let job = {
                    let Some(index) = self.index_of(id) else { break };
                    let Some(component) = self.actors[index].components.get_mut(&key) else {
                        continue;
                    };
                    if component.initialized
                        || !component.is_enabled()
                        || !component.slots.has(CallbackSlot::Start)
                    {
                        continue;
                    }
                    component.initialized = true;
                    match &component.state {
                        ComponentState::Generic { .. } => {
                            match component.script_callback(CallbackSlot::Start) {
                                Some((cb, table)) => StartJob::Script(cb, table),
                                None => continue,
                            }
                        }
                        ComponentState::Body(_) => StartJob::Body,
                        ComponentState::Emitter(_) => StartJob::Emitter,
                    }
                };
                match job {
                    StartJob::Script(cb, table) => {
                        self.invoke(host, frame, &name, cb, table, CallbackArgs::None)
                    }
                    StartJob::Body => self.start_body(id, &key),
                    StartJob::Emitter => self.start_emitter(id, &key),
                }
            }
        }
    }

    pub fn run_update(&mut self, host: &dyn BehaviorHost, frame: u64) {
        self.run_pass(host, frame, CallbackSlot::Update, false);
    }

    /// Late update, then each actor commits its staged component changes.
    pub fn run_late_update(&mut self, host: &dyn BehaviorHost, frame: u64) {
        self.run_pass(host, frame, CallbackSlot::LateUpdate, true);
    }

    fn run_pass(
        &mut self,
        host: &dyn BehaviorHost,
        frame: u64,
        slot: CallbackSlot,
        commit_components: bool,
    ) {
        enum Job {
            Script(Arc<CallbackFn>, TableRef),
            Emitter,
        }

        let ids: Vec<ActorId> = self.actors.iter().map(|a| a.id).collect();
        for id in ids {
            let (name, keys) = match self.find_by_id(id) {
                Some(actor) => (
                    actor.name.clone(),
                    actor.components.keys().cloned().collect::<Vec<_>>(),
                ),
                None => continue,
            };
            for key in keys {
                let job = {
                    let Some(actor) = self.find_by_id(id) else { break };
                    let Some(component) = actor.components.get(&key) else {
                        continue;
                    };
                    if !component.is_enabled() || !component.slots.has(slot) {
                        continue;
                    }
                    match &component.state {
                        ComponentState::Generic { .. } => match component.script_callback(slot) {
                            Some((cb, table)) => Job::Script(cb, table),
                            None => continue,
                        },
                        ComponentState::Emitter(_) if slot == CallbackSlot::Update => Job::Emitter,
                        _ => continue,
                    }
                };
                match job {
                    Job::Script(cb, table) => {
                        self.invoke(host, frame, &name, cb, table, CallbackArgs::None)
                    }
                    Job::Emitter => self.update_emitter(id, &key),
                }
            }
            if commit_components {
                self.commit_actor_components(id, host, frame);
            }
        }
    }

    fn start_body(&mut self, id: ActorId, key: &Arc<str>) {
        let Some(index) = self.index_of(id) else { return };
        let Scene {
            actors, physics, ..
        } = self;
        if let Some(component) = actors[index].components.get_mut(key) {
            if let ComponentState::Body(body) = &mut component.state {
                body.attach(id, physics);
            }
        }
    }

    fn start_emitter(&mut self, id: ActorId, key: &Arc<str>) {
        let Some(index) = self.index_of(id) else { return };
        if let Some(component) = self.actors[index].components.get_mut(key) {
            if let ComponentState::Emitter(emitter) = &mut component.state {
                emitter.start();
            }
        }
    }

    fn update_emitter(&mut self, id: ActorId, key: &Arc<str>) {
        let Some(index) = self.index_of(id) else { return };
        let Scene {
            actors,
            render_queue,
            ..
        } = self;
        if let Some(component) = actors[index].components.get_mut(key) {
            if let ComponentState::Emitter(emitter) = &mut component.state {
                emitter.update(render_queue);
            }
        }
    }

    fn commit_actor_components(&mut self, id: ActorId, host: &dyn BehaviorHost, frame: u64) {
        let Some(index) = self.index_of(id) else { return };
        let (added, removed) = self.actors[index].take_staged();
        for component in added {
            self.actors[index]
                .components
                .insert(component.key.clone(), component);
        }
        for key in removed {
            let taken = self.actors[index].components.remove(&key);
            if let Some(component) = taken {
                let name = self.actors[index].name.clone();
                self.teardown_component(&name, component, host, frame);
            }
        }
    }

    /// Commit staged actor additions and removals. Additions merge in id
    /// order (ids are monotonic, so appending preserves the sort); removals
    /// use a sorted set-difference keyed by id; removed actors run their
    /// `on_destroy` callbacks exactly once, here.
    pub fn commit(&mut self, host: &dyn BehaviorHost, frame: u64) {
        let mut added = std::mem::take(&mut self.added_this_frame);
        for actor in &mut added {
            actor.merge_staged();
        }
        self.actors.extend(added);
        debug_assert!(self.actors.windows(2).all(|w| w[0].id < w[1].id));

        let mut removed = std::mem::take(&mut self.removed_this_frame);
        removed.sort_unstable();
        removed.dedup();
        if removed.is_empty() {
            return;
        }

        // Both sides sorted by id: single forward walk.
        let old = std::mem::take(&mut self.actors);
        let mut dead = Vec::new();
        let mut cursor = 0;
        for actor in old {
            while cursor < removed.len() && removed[cursor] < actor.id {
                cursor += 1;
            }
            if cursor < removed.len() && removed[cursor] == actor.id {
                dead.push(actor);
            } else {
                self.actors.push(actor);
            }
        }

        for bucket in self.actors_by_name.values_mut() {
            bucket.retain(|id| removed.binary_search(id).is_err());
        }

        for actor in dead {
            self.teardown_actor(actor, host, frame);
        }
    }

    fn teardown_actor(&mut self, mut actor: Actor, host: &dyn BehaviorHost, frame: u64) {
        actor.merge_staged();
        let name = actor.name.clone();
        for (_, component) in std::mem::take(&mut actor.components) {
            self.teardown_component(&name, component, host, frame);
        }
    }

    fn teardown_component(
        &mut self,
        owner_name: &str,
        component: Component,
        host: &dyn BehaviorHost,
        frame: u64,
    ) {
        match component.state {
            ComponentState::Body(mut body) => body.detach(&mut self.physics),
            ComponentState::Generic { table, bound } => {
                if component.slots.has(CallbackSlot::Destroy) {
                    if let Some(cb) = bound.get(CallbackSlot::Destroy) {
                        let cb = cb.clone();
                        self.invoke(host, frame, owner_name, cb, table, CallbackArgs::None);
                    }
                }
            }
            ComponentState::Emitter(_) => {}
        }
    }

    // --- physics ---

    /// Step the shared physics world exactly once and hand back the contacts;
    /// the caller dispatches them in the same phase.
    pub fn step_physics(&mut self, dt: f32) -> Vec<ContactEvent> {
        self.physics.step(dt)
    }

    /// Re-attach the bodies of already-initialized components after a load.
    /// Their `on_start` will not run again, so the attach happens here, and
    /// any restored dynamics are applied in the process.
    pub fn attach_restored_bodies(&mut self) {
        for index in 0..self.actors.len() {
            let id = self.actors[index].id;
            let keys: Vec<Arc<str>> = self.actors[index].components.keys().cloned().collect();
            for key in keys {
                let Scene {
                    actors, physics, ..
                } = self;
                if let Some(component) = actors[index].components.get_mut(&key) {
                    if component.initialized {
                        if let ComponentState::Body(body) = &mut component.state {
                            body.attach(id, physics);
                        }
                    }
                }
            }
        }
    }

    /// Deliver a contact to both involved actors, each seeing the other as
    /// `other`. Failures are isolated per callback.
    pub fn dispatch_contacts(
        &mut self,
        events: Vec<ContactEvent>,
        host: &dyn BehaviorHost,
        frame: u64,
    ) {
        for event in events {
            let slot = match (event.kind, event.phase) {
                (ContactKind::Collision, ContactPhase::Begin) => CallbackSlot::CollisionEnter,
                (ContactKind::Collision, ContactPhase::End) => CallbackSlot::CollisionExit,
                (ContactKind::Trigger, ContactPhase::Begin) => CallbackSlot::TriggerEnter,
                (ContactKind::Trigger, ContactPhase::End) => CallbackSlot::TriggerExit,
            };
            self.dispatch_contact_side(event.actor_a, event.actor_b, slot, &event, host, frame);
            self.dispatch_contact_side(event.actor_b, event.actor_a, slot, &event, host, frame);
        }
    }

    fn dispatch_contact_side(
        &mut self,
        target: ActorId,
        other: ActorId,
        slot: CallbackSlot,
        event: &ContactEvent,
        host: &dyn BehaviorHost,
        frame: u64,
    ) {
        let (name, keys) = match self.find_by_id(target) {
            Some(actor) => (
                actor.name.clone(),
                actor.components.keys().cloned().collect::<Vec<_>>(),
            ),
            None => return,
        };
        let collision = Collision {
            other,
            point: event.point,
            normal: event.normal,
            relative_velocity: event.relative_velocity,
        };
        for key in keys {
            let job = self
                .find_by_id(target)
                .and_then(|actor| actor.components.get(&key))
                .and_then(|component| component.script_callback(slot));
            if let Some((cb, table)) = job {
                self.invoke(host, frame, &name, cb, table, CallbackArgs::Collision(collision));
            }
        }
    }

    // --- callback invocation (failure isolation) ---

    fn invoke(
        &mut self,
        host: &dyn BehaviorHost,
        frame: u64,
        owner_name: &str,
        cb: Arc<CallbackFn>,
        table: TableRef,
        args: CallbackArgs,
    ) {
        let mut ctx = crate::ctx::SceneCtx {
            scene: self,
            host,
            frame,
        };
        if let Err(error) = cb(&mut ctx, &table, &args) {
            report_callback_error(owner_name, &error);
        }
    }
}
