pub mod artifacts;
pub mod common;
pub mod decode;
pub mod encode;

pub use artifacts::{
    list_saves, load_state, read_overlay, save_scene_artifact, save_state, SaveFilter,
};
pub use decode::{resolve_relocations, Deserializer, Reference};
pub use encode::Serializer;

/// Errors of the binary codec. A corrupt artifact aborts the whole load
/// operation; callers never partially apply one.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("corrupted save data: unknown tag {0}")]
    UnknownTag(u8),
    #[error("corrupted save data: {0}")]
    Corrupt(String),
    #[error("failed to locate behavior definition `{0}`")]
    MissingBehavior(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use galgo_behavior::{Behavior, BehaviorHost, BehaviorRegistry, CallbackSlot};
    use galgo_ids::ActorId;
    use galgo_scene::{
        Actor, Component, ComponentState, ParticleEmitter, PhysicsBody, Scene,
    };
    use galgo_variant::{TableRef, Value, Vec2};
    use std::io::Cursor;
    use std::sync::Arc;

    fn test_registry() -> BehaviorRegistry {
        let mut registry = BehaviorRegistry::new();
        registry.register(
            Behavior::new("Brain")
                .with_field("hp", Value::Int(10))
                .with_callback(CallbackSlot::Update, |_, _, _| Ok(())),
        );
        registry
    }

    /// Actor with one generic "brain" component, inserted committed.
    fn add_brain_actor(
        scene: &mut Scene,
        registry: &BehaviorRegistry,
        id: u64,
        name: &str,
    ) -> TableRef {
        let id = ActorId::from_u64(id);
        let behavior = registry.resolve("Brain").expect("registered");
        let mut actor = Actor::new(id, name.to_string());
        let component = Component::generic(Arc::<str>::from("brain"), behavior, id);
        let table = match &component.state {
            ComponentState::Generic { table, .. } => table.clone(),
            _ => unreachable!(),
        };
        actor.components.insert(component.key.clone(), component);
        scene.insert_actor(actor);
        scene.sort_actors();
        table
    }

    fn brain_table(scene: &Scene, id: u64) -> TableRef {
        match &scene
            .find_by_id(ActorId::from_u64(id))
            .expect("actor loaded")
            .component_by_key("brain")
            .expect("brain component")
            .state
        {
            ComponentState::Generic { table, .. } => table.clone(),
            _ => panic!("expected generic component"),
        }
    }

    fn encode_scene(scene: &Scene) -> Vec<u8> {
        let mut serializer = Serializer::new(Vec::new());
        serializer.write_scene(scene).expect("encode");
        serializer.into_inner()
    }

    fn decode_scene(bytes: &[u8], host: &dyn BehaviorHost) -> Scene {
        let mut deserializer = Deserializer::new(Cursor::new(bytes));
        let mut relocations = Vec::new();
        let scene = deserializer
            .read_scene(&mut relocations, host)
            .expect("decode");
        resolve_relocations(&scene, relocations);
        scene
    }

    #[test]
    fn primitives_roundtrip() {
        use crate::common::*;
        let mut buffer = Vec::new();
        write_i64(&mut buffer, -42).unwrap();
        write_u64(&mut buffer, 7).unwrap();
        write_f32(&mut buffer, 1.5).unwrap();
        write_bool(&mut buffer, true).unwrap();
        write_string(&mut buffer, "hello").unwrap();
        write_vec2(&mut buffer, Vec2::new(3.0, -4.0)).unwrap();

        let mut cursor = Cursor::new(buffer.as_slice());
        assert_eq!(read_i64(&mut cursor).unwrap(), -42);
        assert_eq!(read_u64(&mut cursor).unwrap(), 7);
        assert_eq!(read_f32(&mut cursor).unwrap(), 1.5);
        assert!(read_bool(&mut cursor).unwrap());
        assert_eq!(read_string(&mut cursor).unwrap(), "hello");
        assert_eq!(read_vec2(&mut cursor).unwrap(), Vec2::new(3.0, -4.0));
    }

    #[test]
    fn strings_are_nul_terminated() {
        use crate::common::*;
        let mut buffer = Vec::new();
        write_string(&mut buffer, "ab").unwrap();
        assert_eq!(buffer, vec![b'a', b'b', 0]);
    }

    #[test]
    fn plain_table_roundtrip() {
        let scene = Scene::new("empty");
        let table = TableRef::new();
        table.set("count", Value::Int(12));
        table.set("speed", Value::Float(0.5));
        table.set("alive", Value::Bool(true));
        table.set("label", Value::string("boss"));
        table.set("spawn", Value::Vec2(Vec2::new(1.0, 2.0)));
        let nested = TableRef::new();
        nested.set("depth", Value::Int(2));
        table.set("inner", Value::Table(nested));
        // Nil entries are skipped entirely.
        table.set("ghost", Value::Nil);

        let mut serializer = Serializer::new(Vec::new());
        serializer.write_table(&table, &scene).unwrap();
        let bytes = serializer.into_inner();

        let mut deserializer = Deserializer::new(Cursor::new(bytes.as_slice()));
        let mut relocations = Vec::new();
        let decoded = deserializer.read_table(&mut relocations).unwrap();
        assert!(relocations.is_empty());

        assert_eq!(decoded.get("count"), Value::Int(12));
        assert_eq!(decoded.get("speed"), Value::Float(0.5));
        assert_eq!(decoded.get("alive"), Value::Bool(true));
        assert_eq!(decoded.get("label"), Value::string("boss"));
        assert_eq!(decoded.get("spawn"), Value::Vec2(Vec2::new(1.0, 2.0)));
        assert!(!decoded.contains("ghost"));
        let inner = decoded.get("inner");
        assert_eq!(inner.as_table().unwrap().get("depth"), Value::Int(2));
    }

    #[test]
    fn unknown_tag_is_fatal_for_the_load() {
        use crate::common::*;
        let mut buffer = Vec::new();
        write_u64(&mut buffer, 1).unwrap();
        write_string(&mut buffer, "k").unwrap();
        write_u8(&mut buffer, 9).unwrap();

        let mut deserializer = Deserializer::new(Cursor::new(buffer.as_slice()));
        let mut relocations = Vec::new();
        match deserializer.read_table(&mut relocations) {
            Err(SaveError::UnknownTag(9)) => {}
            other => panic!("expected UnknownTag, got {other:?}"),
        }
    }

    #[test]
    fn cyclic_and_forward_references_roundtrip() {
        let registry = test_registry();
        let mut scene = Scene::new("level");
        let alpha = add_brain_actor(&mut scene, &registry, 1, "alpha");
        let beta = add_brain_actor(&mut scene, &registry, 2, "beta");
        for id in 3..=6 {
            add_brain_actor(&mut scene, &registry, id, "filler");
        }
        let omega = add_brain_actor(&mut scene, &registry, 7, "omega");

        // Cycle between actors 1 and 2, forward reference from 2 to 7.
        alpha.set("other", Value::Table(beta.clone()));
        beta.set("other", Value::Table(alpha.clone()));
        beta.set("buddy", Value::Table(omega.clone()));
        alpha.set("owner_handle", Value::Actor(ActorId(2)));

        let bytes = encode_scene(&scene);
        let loaded = decode_scene(&bytes, &registry);

        assert_eq!(loaded.actors.len(), scene.actors.len());
        for (a, b) in scene.actors.iter().zip(loaded.actors.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.name, b.name);
            assert_eq!(a.components.len(), b.components.len());
        }

        let alpha2 = brain_table(&loaded, 1);
        let beta2 = brain_table(&loaded, 2);
        let omega2 = brain_table(&loaded, 7);

        // Plain fields survive.
        assert_eq!(alpha2.get("hp"), Value::Int(10));
        // The cycle resolved to the live tables, no copies.
        assert!(alpha2.get("other").as_table().unwrap().ptr_eq(&beta2));
        assert!(beta2.get("other").as_table().unwrap().ptr_eq(&alpha2));
        // The forward reference (2 -> 7) resolved after the full load.
        assert!(beta2.get("buddy").as_table().unwrap().ptr_eq(&omega2));
        // A plain actor handle resolved to the live actor.
        assert_eq!(alpha2.get("owner_handle"), Value::Actor(ActorId(2)));
        // Ownership entries were rebound during decode.
        assert_eq!(alpha2.get("actor"), Value::Actor(ActorId(1)));
        assert_eq!(alpha2.get("key"), Value::string("brain"));
    }

    #[test]
    fn reference_to_missing_actor_resolves_to_nil() {
        let registry = test_registry();
        let mut scene = Scene::new("level");
        let alpha = add_brain_actor(&mut scene, &registry, 1, "alpha");
        alpha.set("gone", Value::Actor(ActorId(99)));

        let bytes = encode_scene(&scene);
        let loaded = decode_scene(&bytes, &registry);
        let alpha2 = brain_table(&loaded, 1);
        // The key exists and holds an explicit no-target value.
        assert!(alpha2.contains("gone"));
        assert_eq!(alpha2.get("gone"), Value::Nil);
    }

    #[test]
    fn component_shaped_table_is_encoded_as_reference() {
        // A scripted value that aliases a component's state table must come
        // back as an alias of the loaded component, never as a copy.
        let registry = test_registry();
        let mut scene = Scene::new("level");
        let alpha = add_brain_actor(&mut scene, &registry, 1, "alpha");
        let beta = add_brain_actor(&mut scene, &registry, 2, "beta");
        // A nested holder table pointing at beta's component.
        let holder = TableRef::new();
        holder.set("target", Value::Table(beta.clone()));
        alpha.set("holder", Value::Table(holder));

        let bytes = encode_scene(&scene);
        let loaded = decode_scene(&bytes, &registry);
        let alpha2 = brain_table(&loaded, 1);
        let beta2 = brain_table(&loaded, 2);
        let holder2 = alpha2.get("holder");
        let target = holder2.as_table().unwrap().get("target");
        assert!(target.as_table().unwrap().ptr_eq(&beta2));
    }

    #[test]
    fn typed_component_references_roundtrip_as_handles() {
        let registry = test_registry();
        let mut scene = Scene::new("level");
        let alpha = add_brain_actor(&mut scene, &registry, 1, "alpha");

        let mut carrier = Actor::new(ActorId(2), "carrier".to_string());
        let body = Component::body(Arc::<str>::from("rb"), PhysicsBody::default());
        carrier.components.insert(body.key.clone(), body);
        scene.insert_actor(carrier);
        scene.sort_actors();

        alpha.set(
            "their_body",
            Value::Component(galgo_variant::ComponentRef {
                actor: ActorId(2),
                kind: Arc::<str>::from("Rigidbody"),
                key: Arc::<str>::from("rb"),
            }),
        );

        let bytes = encode_scene(&scene);
        let loaded = decode_scene(&bytes, &registry);
        let alpha2 = brain_table(&loaded, 1);
        match alpha2.get("their_body") {
            Value::Component(reference) => {
                assert_eq!(reference.actor, ActorId(2));
                assert_eq!(reference.kind.as_ref(), "Rigidbody");
                assert_eq!(reference.key.as_ref(), "rb");
            }
            other => panic!("expected component handle, got {other:?}"),
        }
    }

    #[test]
    fn body_component_roundtrip_detached() {
        let registry = test_registry();
        let mut scene = Scene::new("level");
        let mut actor = Actor::new(ActorId(1), "crate".to_string());
        let mut body = PhysicsBody::default();
        body.position = Vec2::new(4.0, -2.0);
        body.rotation = 45.0;
        body.body_type = galgo_physics::BodyType::Static;
        body.has_trigger = false;
        body.width = 3.0;
        let component = Component::body(Arc::<str>::from("rb"), body);
        actor.components.insert(component.key.clone(), component);
        scene.insert_actor(actor);

        let bytes = encode_scene(&scene);
        let loaded = decode_scene(&bytes, &registry);
        let actor = loaded.find_by_id(ActorId(1)).unwrap();
        match &actor.component_by_key("rb").unwrap().state {
            ComponentState::Body(body) => {
                assert_eq!(body.position, Vec2::new(4.0, -2.0));
                assert_eq!(body.rotation, 45.0);
                assert_eq!(body.body_type, galgo_physics::BodyType::Static);
                assert!(!body.has_trigger);
                assert_eq!(body.width, 3.0);
                assert!(body.restored.is_none());
                assert!(body.handle.is_none());
            }
            _ => panic!("expected body"),
        }
    }

    #[test]
    fn attached_body_carries_dynamics_for_reattachment() {
        let registry = test_registry();
        let mut scene = Scene::new("level");
        let mut actor = Actor::new(ActorId(1), "mover".to_string());
        let mut body = PhysicsBody::default();
        body.has_trigger = false;
        let component = Component::body(Arc::<str>::from("rb"), body);
        actor.components.insert(component.key.clone(), component);
        scene.insert_actor(actor);

        // Start the frame once so the body attaches, then give it motion.
        scene.run_start(&registry, 0);
        {
            use galgo_behavior::EngineApi;
            let mut ctx = galgo_scene::SceneCtx {
                scene: &mut scene,
                host: &registry,
                frame: 0,
            };
            let reference = galgo_variant::ComponentRef {
                actor: ActorId(1),
                kind: Arc::<str>::from("Rigidbody"),
                key: Arc::<str>::from("rb"),
            };
            ctx.body_set_velocity(&reference, Vec2::new(2.0, 1.0));
        }

        let bytes = encode_scene(&scene);
        let loaded = decode_scene(&bytes, &registry);
        let actor = loaded.find_by_id(ActorId(1)).unwrap();
        let component = actor.component_by_key("rb").unwrap();
        assert!(component.initialized);
        match &component.state {
            ComponentState::Body(body) => {
                assert!(body.handle.is_none(), "decode must not attach bodies");
                let dynamics = body.restored.expect("dynamics staged");
                assert!((dynamics.velocity.x - 2.0).abs() < 1.0e-5);
                assert!((dynamics.velocity.y - 1.0).abs() < 1.0e-5);
            }
            _ => panic!("expected body"),
        }
    }

    #[test]
    fn emitter_roundtrip_continues_the_stream() {
        let registry = test_registry();

        // Uninterrupted run: three bursts.
        let mut uninterrupted = ParticleEmitter::default();
        uninterrupted.start_speed = Vec2::new(1.0, 4.0);
        uninterrupted.rotation_range = Vec2::new(0.0, 90.0);
        uninterrupted.burst_quantity = 5;
        uninterrupted.frames_between_bursts = 1000;
        uninterrupted.start();
        uninterrupted.burst();
        uninterrupted.burst();

        // Saved-and-restored run: two bursts, save, restore.
        let mut scene = Scene::new("level");
        let mut actor = Actor::new(ActorId(1), "sparks".to_string());
        let component = Component::emitter(Arc::<str>::from("ps"), uninterrupted.clone());
        actor.components.insert(component.key.clone(), component);
        scene.insert_actor(actor);

        let bytes = encode_scene(&scene);
        let loaded = decode_scene(&bytes, &registry);

        uninterrupted.burst();

        let actor = loaded.find_by_id(ActorId(1)).unwrap();
        let restored = match &actor.component_by_key("ps").unwrap().state {
            ComponentState::Emitter(emitter) => emitter.clone(),
            _ => panic!("expected emitter"),
        };
        assert_eq!(restored.generated, 10);
        let mut restored = *restored;
        restored.burst();

        // The continuation matches the uninterrupted run, slot for slot.
        assert_eq!(restored.generated, uninterrupted.generated);
        assert_eq!(restored.positions, uninterrupted.positions);
        assert_eq!(restored.velocities, uninterrupted.velocities);
        assert_eq!(restored.spins, uninterrupted.spins);
        assert_eq!(restored.scales, uninterrupted.scales);
    }

    #[test]
    fn save_scene_artifact_filters_to_persist_flag() {
        let registry = test_registry();
        let mut scene = Scene::new("level");
        add_brain_actor(&mut scene, &registry, 1, "keep_me");
        add_brain_actor(&mut scene, &registry, 2, "drop_me");
        scene
            .actor_mut(ActorId(1))
            .unwrap()
            .persist = true;

        let dir = std::env::temp_dir().join(format!("galgo_save_scene_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("slot1.save");

        let preview = TableRef::new();
        preview.set("title", Value::string("checkpoint"));
        save_scene_artifact(&path, &scene, Some(&preview)).unwrap();

        let (actors, relocations) = read_overlay(&path, &registry).unwrap();
        assert_eq!(actors.len(), 1);
        assert_eq!(actors[0].name, "keep_me");
        assert_eq!(actors[0].id, ActorId(1));
        assert!(relocations.is_empty());

        let saves = list_saves(&dir).unwrap();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].0, "slot1.save");
        assert_eq!(
            saves[0].1.as_table().unwrap().get("title"),
            Value::string("checkpoint")
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn state_save_restores_shared_table_with_exclusions() {
        let registry = test_registry();
        let mut scene = Scene::new("level");
        let alpha = add_brain_actor(&mut scene, &registry, 1, "alpha");
        scene.shared.set("score", Value::Int(99));
        scene.shared.set("Brain", Value::string("behavior defaults"));
        scene.shared.set("hero", Value::Table(alpha.clone()));

        let mut filter = SaveFilter::new();
        filter.exclude_all(registry.behavior_names());

        let dir = std::env::temp_dir().join(format!("galgo_save_state_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.save");
        save_state(&path, &scene, &filter).unwrap();

        let loaded = load_state(&path, &registry).unwrap();
        assert_eq!(loaded.name, "level");
        assert_eq!(loaded.shared.get("score"), Value::Int(99));
        assert!(!loaded.shared.contains("Brain"), "excluded names stay out");
        // The shared table's component reference re-aliases the live table.
        let alpha2 = brain_table(&loaded, 1);
        assert!(loaded.shared.get("hero").as_table().unwrap().ptr_eq(&alpha2));
        // The id counter continues past every loaded id.
        let mut ids = loaded.ids;
        assert!(ids.next().as_u64() > 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn decode_rejects_unknown_behavior_definitions() {
        let registry = test_registry();
        let mut scene = Scene::new("level");
        add_brain_actor(&mut scene, &registry, 1, "alpha");
        let bytes = encode_scene(&scene);

        let empty = BehaviorRegistry::new();
        let mut deserializer = Deserializer::new(Cursor::new(bytes.as_slice()));
        let mut relocations = Vec::new();
        match deserializer.read_scene(&mut relocations, &empty).err() {
            Some(SaveError::MissingBehavior(name)) => assert_eq!(name, "Brain"),
            other => panic!("expected MissingBehavior, got {other:?}"),
        }
    }
}
