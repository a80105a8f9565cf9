//! Actors and their components. Component collections follow the same
//! stage-then-commit discipline as the actor registry: additions and removals
//! requested during a frame become visible at that actor's late-update commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use galgo_behavior::{Behavior, BoundSlots, CallbackFn, CallbackSlot, SlotFlags};
use galgo_ids::ActorId;
use galgo_variant::{deep_clone_table, ComponentRef, TableRef, Value};

use crate::particles::ParticleEmitter;
use crate::physics_body::PhysicsBody;

/// Reserved component type names handled natively rather than by a behavior.
pub const RIGIDBODY_TYPE: &str = "Rigidbody";
pub const PARTICLE_TYPE: &str = "ParticleSystem";

pub enum ComponentState {
    /// Scripted behavior state: a shared table carrying `key`, `actor` and
    /// `enabled` entries alongside arbitrary fields.
    Generic { table: TableRef, bound: BoundSlots },
    Body(Box<PhysicsBody>),
    Emitter(Box<ParticleEmitter>),
}

pub struct Component {
    pub key: Arc<str>,
    pub type_name: Arc<str>,
    /// Set exactly once, the first frame `on_start` is attempted.
    pub initialized: bool,
    pub slots: SlotFlags,
    pub state: ComponentState,
}

impl Component {
    /// Instance of a named behavior: deep-copies the prototype's defaults
    /// (inheritance by copy, cycles preserved) and binds its callbacks.
    pub fn generic(key: Arc<str>, behavior: &Behavior, owner: ActorId) -> Component {
        let table = deep_clone_table(&behavior.defaults);
        table.set("key", Value::Str(key.clone()));
        table.set("enabled", Value::Bool(true));
        table.set("actor", Value::Actor(owner));
        let (slots, bound) = behavior.bind();
        Component {
            key,
            type_name: behavior.name.clone(),
            initialized: false,
            slots,
            state: ComponentState::Generic { table, bound },
        }
    }

    /// Generic component re-created from decoded state. The callbacks are
    /// re-bound from the behavior, the table comes from the save file.
    pub fn generic_from_table(
        key: Arc<str>,
        type_name: Arc<str>,
        table: TableRef,
        behavior: &Behavior,
    ) -> Component {
        let (slots, bound) = behavior.bind();
        Component {
            key,
            type_name,
            initialized: false,
            slots,
            state: ComponentState::Generic { table, bound },
        }
    }

    pub fn body(key: Arc<str>, body: PhysicsBody) -> Component {
        Component {
            key,
            type_name: Arc::<str>::from(RIGIDBODY_TYPE),
            initialized: false,
            slots: SlotFlags::NONE.with(CallbackSlot::Start),
            state: ComponentState::Body(Box::new(body)),
        }
    }

    pub fn emitter(key: Arc<str>, emitter: ParticleEmitter) -> Component {
        Component {
            key,
            type_name: Arc::<str>::from(PARTICLE_TYPE),
            initialized: false,
            slots: SlotFlags::NONE
                .with(CallbackSlot::Start)
                .with(CallbackSlot::Update),
            state: ComponentState::Emitter(Box::new(emitter)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        match &self.state {
            ComponentState::Generic { table, .. } => table.get("enabled").truthy(),
            ComponentState::Body(body) => body.enabled,
            ComponentState::Emitter(emitter) => emitter.enabled,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        match &mut self.state {
            ComponentState::Generic { table, .. } => table.set("enabled", Value::Bool(enabled)),
            ComponentState::Body(body) => body.enabled = enabled,
            ComponentState::Emitter(emitter) => emitter.enabled = enabled,
        }
    }

    /// The value scripted code holds when it references this component:
    /// generic components alias their state table, typed ones get a handle.
    pub fn ref_value(&self, owner: ActorId) -> Value {
        match &self.state {
            ComponentState::Generic { table, .. } => Value::Table(table.clone()),
            _ => Value::Component(ComponentRef {
                actor: owner,
                kind: self.type_name.clone(),
                key: self.key.clone(),
            }),
        }
    }

    /// Bound callback for `slot` together with the state table, when this is
    /// a generic component that implements it.
    pub fn script_callback(&self, slot: CallbackSlot) -> Option<(Arc<CallbackFn>, TableRef)> {
        if !self.slots.has(slot) {
            return None;
        }
        match &self.state {
            ComponentState::Generic { table, bound } => bound
                .get(slot)
                .map(|cb| (cb.clone(), table.clone())),
            _ => None,
        }
    }

    /// Copy for instantiation. Generic state is deep-cloned with cycle
    /// preservation and re-bound to the new owner; a body copy starts
    /// detached; every copy starts uninitialized.
    pub fn clone_for(&self, owner: ActorId) -> Component {
        let state = match &self.state {
            ComponentState::Generic { table, bound } => {
                let copy = deep_clone_table(table);
                copy.set("key", Value::Str(self.key.clone()));
                copy.set("actor", Value::Actor(owner));
                ComponentState::Generic {
                    table: copy,
                    bound: bound.clone(),
                }
            }
            ComponentState::Body(body) => {
                let mut copy = (**body).clone();
                copy.handle = None;
                copy.restored = None;
                copy.enabled = true;
                ComponentState::Body(Box::new(copy))
            }
            ComponentState::Emitter(emitter) => ComponentState::Emitter(emitter.clone()),
        };
        Component {
            key: self.key.clone(),
            type_name: self.type_name.clone(),
            initialized: false,
            slots: self.slots,
            state,
        }
    }
}

pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub components: BTreeMap<Arc<str>, Component>,
    /// Included in explicit scene saves.
    pub persist: bool,
    /// Survives a scene-definition reload (not a full state restore).
    pub keep_across_loads: bool,
    pub(crate) added_this_frame: Vec<Component>,
    pub(crate) removed_this_frame: Vec<Arc<str>>,
}

impl Actor {
    pub fn new(id: ActorId, name: String) -> Actor {
        Actor {
            id,
            name,
            components: BTreeMap::new(),
            persist: false,
            keep_across_loads: false,
            added_this_frame: Vec::new(),
            removed_this_frame: Vec::new(),
        }
    }

    /// Committed-or-staged lookup by key; removal-staged keys are already
    /// invisible here, matching the immediate de-indexing on removal.
    pub fn component_by_key(&self, key: &str) -> Option<&Component> {
        if self.removed_this_frame.iter().any(|k| k.as_ref() == key) {
            return None;
        }
        self.components
            .get(key)
            .or_else(|| self.added_this_frame.iter().find(|c| c.key.as_ref() == key))
    }

    pub fn component_by_key_mut(&mut self, key: &str) -> Option<&mut Component> {
        if self.removed_this_frame.iter().any(|k| k.as_ref() == key) {
            return None;
        }
        if self.components.contains_key(key) {
            return self.components.get_mut(key);
        }
        self.added_this_frame
            .iter_mut()
            .find(|c| c.key.as_ref() == key)
    }

    pub fn component_by_type(&self, type_name: &str) -> Option<&Component> {
        self.components_by_type(type_name).into_iter().next()
    }

    pub fn components_by_type(&self, type_name: &str) -> Vec<&Component> {
        self.components
            .values()
            .filter(|c| {
                c.type_name.as_ref() == type_name
                    && !self
                        .removed_this_frame
                        .iter()
                        .any(|k| k.as_ref() == c.key.as_ref())
            })
            .chain(
                self.added_this_frame
                    .iter()
                    .filter(|c| c.type_name.as_ref() == type_name),
            )
            .collect()
    }

    /// Stage a component for addition; findable by key immediately, iterated
    /// from the next late-update commit on.
    pub fn stage_component(&mut self, component: Component) {
        self.added_this_frame.push(component);
    }

    /// Stage a component for removal and disable it immediately.
    pub fn stage_remove(&mut self, key: &str) {
        if let Some(component) = self.component_by_key_mut(key) {
            component.set_enabled(false);
        } else {
            return;
        }
        let key: Arc<str> = Arc::<str>::from(key);
        if !self.removed_this_frame.contains(&key) {
            self.removed_this_frame.push(key);
        }
    }

    pub(crate) fn take_staged(&mut self) -> (Vec<Component>, Vec<Arc<str>>) {
        (
            std::mem::take(&mut self.added_this_frame),
            std::mem::take(&mut self.removed_this_frame),
        )
    }

    /// Merge staged additions straight into the committed map. Used for
    /// actors that are themselves being committed, whose late-update never
    /// ran this frame.
    pub(crate) fn merge_staged(&mut self) {
        let (added, removed) = self.take_staged();
        for component in added {
            self.components.insert(component.key.clone(), component);
        }
        for key in removed {
            self.components.remove(&key);
        }
    }

    pub fn disable_all(&mut self) {
        for component in self.components.values_mut() {
            component.set_enabled(false);
        }
        for component in self.added_this_frame.iter_mut() {
            component.set_enabled(false);
        }
    }

    /// Template copy: fresh id, copied name and components, cleared flags.
    pub fn clone_for_instantiate(&self, id: ActorId) -> Actor {
        let mut actor = Actor::new(id, self.name.clone());
        for component in self.components.values() {
            actor
                .components
                .insert(component.key.clone(), component.clone_for(id));
        }
        actor
    }
}
