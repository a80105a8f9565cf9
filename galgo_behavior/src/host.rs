//! The scripting capability consumed by the engine core: named behavior
//! definitions resolvable to prototypes, prototype copy with inherited
//! defaults, and named-callback invocation that may fail recoverably.
//!
//! The engine never sees a scripting runtime. It sees [`BehaviorHost`], and a
//! callback sees the engine through [`EngineApi`].

use std::collections::HashMap;
use std::sync::Arc;

use galgo_ids::ActorId;
use galgo_variant::{ComponentRef, TableRef, Value, Vec2};

use crate::slots::{CallbackSlot, SlotFlags};

/// Recoverable failure raised from inside a behavior callback. Reported at
/// the call site with the owning actor's name; never propagated.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BehaviorError {
    pub message: String,
}

impl BehaviorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Contact payload delivered to collision/trigger slots. Trigger contacts
/// carry sentinel point/normal values, there is no meaningful geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Collision {
    pub other: ActorId,
    pub point: Vec2,
    pub normal: Vec2,
    pub relative_velocity: Vec2,
}

/// Extra arguments for a callback invocation.
#[derive(Clone, Debug)]
pub enum CallbackArgs {
    None,
    Collision(Collision),
    Event(Value),
}

/// A bound callback. Receives the engine surface, the component's own state
/// table, and the invocation arguments.
pub type CallbackFn =
    dyn Fn(&mut dyn EngineApi, &TableRef, &CallbackArgs) -> Result<(), BehaviorError>;

/// Callback handles bound from a behavior definition, indexed by slot.
#[derive(Clone, Default)]
pub struct BoundSlots {
    slots: [Option<Arc<CallbackFn>>; 8],
}

impl BoundSlots {
    #[inline]
    pub fn get(&self, slot: CallbackSlot) -> Option<&Arc<CallbackFn>> {
        self.slots[slot.index()].as_ref()
    }
}

impl std::fmt::Debug for BoundSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bound: Vec<&str> = CallbackSlot::ALL
            .iter()
            .filter(|s| self.slots[s.index()].is_some())
            .map(|s| s.name())
            .collect();
        write!(f, "BoundSlots({bound:?})")
    }
}

/// A named behavior definition: default fields plus optional callbacks.
/// Instances deep-copy `defaults`, inheriting the prototype's state.
pub struct Behavior {
    pub name: Arc<str>,
    pub defaults: TableRef,
    callbacks: [Option<Arc<CallbackFn>>; 8],
}

impl Behavior {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::<str>::from(name.as_ref()),
            defaults: TableRef::new(),
            callbacks: Default::default(),
        }
    }

    pub fn with_field(self, key: impl Into<Arc<str>>, value: Value) -> Self {
        self.defaults.set(key, value);
        self
    }

    pub fn with_callback<F>(mut self, slot: CallbackSlot, callback: F) -> Self
    where
        F: Fn(&mut dyn EngineApi, &TableRef, &CallbackArgs) -> Result<(), BehaviorError> + 'static,
    {
        self.callbacks[slot.index()] = Some(Arc::new(callback));
        self
    }

    /// The callback handles and flags a new component instance binds.
    pub fn bind(&self) -> (SlotFlags, BoundSlots) {
        let mut flags = SlotFlags::NONE;
        for slot in CallbackSlot::ALL {
            if self.callbacks[slot.index()].is_some() {
                flags = flags.with(slot);
            }
        }
        (
            flags,
            BoundSlots {
                slots: self.callbacks.clone(),
            },
        )
    }
}

/// Resolves behavior definitions by name. A missing definition is an
/// authoring error, fatal to the caller.
pub trait BehaviorHost {
    fn resolve(&self, type_name: &str) -> Option<&Behavior>;

    /// All registered definition names, for save-filter population.
    fn behavior_names(&self) -> Vec<String>;
}

/// In-memory behavior host: definitions registered programmatically by the
/// embedding application.
#[derive(Default)]
pub struct BehaviorRegistry {
    behaviors: HashMap<String, Behavior>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, behavior: Behavior) {
        self.behaviors
            .insert(behavior.name.as_ref().to_string(), behavior);
    }
}

impl BehaviorHost for BehaviorRegistry {
    fn resolve(&self, type_name: &str) -> Option<&Behavior> {
        self.behaviors.get(type_name)
    }

    fn behavior_names(&self) -> Vec<String> {
        self.behaviors.keys().cloned().collect()
    }
}

/// The engine surface a behavior callback can reach: registry queries and
/// structural mutation, thin physics-body and emitter accessors, the event
/// bus, camera, and persistence requests. Mutations follow the registry's
/// stage/commit discipline; persistence requests are deferred to the frame
/// boundary by the coordinator.
pub trait EngineApi {
    // --- actors ---
    fn find_actor(&self, name: &str) -> Value;
    fn find_all_actors(&self, name: &str) -> Vec<Value>;
    fn actor_by_id(&self, id: u64) -> Value;
    fn actor_name(&self, actor: ActorId) -> Option<String>;
    fn instantiate(&mut self, template: &str) -> Value;
    fn destroy(&mut self, actor: ActorId);
    fn keep_across_loads(&mut self, actor: ActorId);
    fn set_actor_persist(&mut self, actor: ActorId, persist: bool);

    // --- components ---
    fn component_by_key(&self, actor: ActorId, key: &str) -> Value;
    fn component_by_type(&self, actor: ActorId, type_name: &str) -> Value;
    fn components_by_type(&self, actor: ActorId, type_name: &str) -> Vec<Value>;
    fn add_component(&mut self, actor: ActorId, type_name: &str) -> Value;
    fn remove_component(&mut self, actor: ActorId, component: &Value);

    // --- physics body accessors (local fields before attach, world after) ---
    fn body_position(&self, body: &ComponentRef) -> Vec2;
    fn body_set_position(&mut self, body: &ComponentRef, position: Vec2);
    fn body_rotation(&self, body: &ComponentRef) -> f32;
    fn body_set_rotation(&mut self, body: &ComponentRef, degrees: f32);
    fn body_velocity(&self, body: &ComponentRef) -> Vec2;
    fn body_set_velocity(&mut self, body: &ComponentRef, velocity: Vec2);
    fn body_angular_velocity(&self, body: &ComponentRef) -> f32;
    fn body_set_angular_velocity(&mut self, body: &ComponentRef, degrees: f32);
    fn body_gravity_scale(&self, body: &ComponentRef) -> f32;
    fn body_set_gravity_scale(&mut self, body: &ComponentRef, scale: f32);
    fn body_add_force(&mut self, body: &ComponentRef, force: Vec2);

    // --- particle emitter controls ---
    fn emitter_play(&mut self, emitter: &ComponentRef);
    fn emitter_stop(&mut self, emitter: &ComponentRef);
    fn emitter_burst(&mut self, emitter: &ComponentRef);

    // --- event bus (subscription changes commit at frame end) ---
    fn subscribe(&mut self, event: &str, state: TableRef, callback: Arc<CallbackFn>);
    fn unsubscribe(&mut self, event: &str, state: &TableRef, callback: &Arc<CallbackFn>);
    fn publish(&mut self, event: &str, payload: Value);

    // --- scene / camera / persistence ---
    fn camera_position(&self) -> Vec2;
    fn set_camera_position(&mut self, position: Vec2);
    fn current_scene(&self) -> String;
    fn load_scene(&mut self, name: &str);
    fn save_state(&mut self, file: &str);
    fn load_state(&mut self, file: &str);
    fn save_scene(&mut self, file: &str, preview: Option<TableRef>);
    fn load_overlay(&mut self, file: &str, scene: &str);
    fn load_overlay_current(&mut self, file: &str);
    fn shared(&self) -> TableRef;
    fn frame(&self) -> u64;
    fn quit(&mut self);
}
