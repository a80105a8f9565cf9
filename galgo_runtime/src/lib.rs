//! The scene coordinator: owns one scene, drives the fixed per-frame
//! lifecycle, and applies scene transitions (fresh loads, state restores,
//! save overlays) at frame boundaries.

use std::path::{Path, PathBuf};

use galgo_behavior::BehaviorHost;
use galgo_save::{
    read_overlay, resolve_relocations, save_scene_artifact, save_state, SaveFilter,
};
use galgo_scene::{SaveRequest, Scene, SceneError, SceneLoader, SpriteRequest, Transition};

pub const FIXED_TIMESTEP: f32 = 1.0 / 60.0;

/// Render submission boundary. The coordinator drains the scene's request
/// queue into a sink at the end of every frame.
pub trait RenderSink {
    fn submit(&mut self, request: SpriteRequest);
    fn present(&mut self) {}
}

/// Sink for headless runs.
pub struct NullSink;

impl RenderSink for NullSink {
    fn submit(&mut self, _request: SpriteRequest) {}
}

/// Sink that keeps the frame's requests, for tests and tooling.
#[derive(Default)]
pub struct CollectSink {
    pub requests: Vec<SpriteRequest>,
}

impl RenderSink for CollectSink {
    fn submit(&mut self, request: SpriteRequest) {
        self.requests.push(request);
    }
}

pub struct Timing {
    pub fixed_dt: f32,
    pub frame: u64,
}

pub struct Coordinator<H: BehaviorHost> {
    pub scene: Scene,
    pub host: H,
    pub filter: SaveFilter,
    pub resources: PathBuf,
    pub saves: PathBuf,
    pub sink: Box<dyn RenderSink>,
    pub timing: Timing,
}

impl<H: BehaviorHost> Coordinator<H> {
    /// Load the initial scene and set up the save filter from the registered
    /// behavior names. Fails loudly on authoring errors.
    pub fn boot(
        resources: impl Into<PathBuf>,
        host: H,
        initial_scene: &str,
    ) -> Result<Self, SceneError> {
        let resources = resources.into();
        let scene = SceneLoader::new(&resources, &host).load(initial_scene)?;
        let mut filter = SaveFilter::new();
        filter.exclude_all(host.behavior_names());
        let saves = resources.join("saves");
        Ok(Self {
            scene,
            host,
            filter,
            resources,
            saves,
            sink: Box::new(NullSink),
            timing: Timing {
                fixed_dt: FIXED_TIMESTEP,
                frame: 0,
            },
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn RenderSink>) -> Self {
        self.sink = sink;
        self
    }

    /// One frame, in the fixed order: apply pending transition, start,
    /// update, late update (with per-actor component commits), execute
    /// requested saves, commit the registry, commit event subscriptions,
    /// step physics once and dispatch its contacts, then drain the render
    /// queue into the sink.
    pub fn run_frame(&mut self) -> Result<(), SceneError> {
        self.apply_pending()?;
        let frame = self.timing.frame;
        self.scene.run_start(&self.host, frame);
        self.scene.run_update(&self.host, frame);
        self.scene.run_late_update(&self.host, frame);
        self.flush_saves();
        self.scene.commit(&self.host, frame);
        self.scene.bus.commit();
        let contacts = self.scene.step_physics(self.timing.fixed_dt);
        self.scene.dispatch_contacts(contacts, &self.host, frame);
        for request in self.scene.render_queue.drain(..) {
            self.sink.submit(request);
        }
        self.sink.present();
        self.timing.frame += 1;
        Ok(())
    }

    fn save_path(&self, file: &str) -> PathBuf {
        self.saves.join(file)
    }

    /// Saves requested during the frame run before the registry commit, so
    /// they capture exactly the committed view scripted code was iterating.
    fn flush_saves(&mut self) {
        let requests = std::mem::take(&mut self.scene.save_requests);
        for request in requests {
            match request {
                SaveRequest::State(file) => {
                    let path = self.save_path(&file);
                    if let Err(error) = save_state(&path, &self.scene, &self.filter) {
                        log::error!("save state `{file}` failed: {error}");
                    }
                }
                SaveRequest::Scene { file, preview } => {
                    let path = self.save_path(&file);
                    if let Err(error) = save_scene_artifact(&path, &self.scene, preview.as_ref())
                    {
                        log::error!("save scene `{file}` failed: {error}");
                    }
                }
            }
        }
    }

    fn apply_pending(&mut self) -> Result<(), SceneError> {
        let Some(transition) = self.scene.pending.take() else {
            return Ok(());
        };
        match transition {
            Transition::Load(name) => self.load_scene_definition(&name)?,
            Transition::Restore(file) => self.restore_state(&file),
            Transition::OverlayOnto { save, scene } => {
                self.load_scene_definition(&scene)?;
                self.overlay(&save);
            }
            Transition::OverlayCurrent(file) => self.overlay(&file),
        }
        Ok(())
    }

    /// Fresh load from a scene definition. Keep-across-loads actors carry
    /// over with their ids; everything else leaves the physics world with
    /// its actor. The shared table and templates survive the load.
    fn load_scene_definition(&mut self, name: &str) -> Result<(), SceneError> {
        let mut old = std::mem::replace(&mut self.scene, Scene::new(""));
        let templates = std::mem::take(&mut old.templates);
        let mut physics = std::mem::take(&mut old.physics);

        let mut carried = Vec::new();
        for mut actor in std::mem::take(&mut old.actors) {
            if actor.keep_across_loads {
                carried.push(actor);
            } else {
                for component in actor.components.values_mut() {
                    if let galgo_scene::ComponentState::Body(body) = &mut component.state {
                        body.detach(&mut physics);
                    }
                }
            }
        }

        let loader = SceneLoader::new(&self.resources, &self.host);
        let mut scene = loader.load_with_carry(name, carried, Some(templates))?;
        scene.physics = physics;
        scene.shared = old.shared.clone();
        self.scene = scene;
        Ok(())
    }

    /// Full state restore. A corrupt or unreadable artifact aborts the load;
    /// the running scene stays untouched.
    fn restore_state(&mut self, file: &str) {
        let path = self.save_path(file);
        match galgo_save::load_state(&path, &self.host) {
            Ok(mut restored) => {
                restored.templates = std::mem::take(&mut self.scene.templates);
                restored.attach_restored_bodies();
                self.scene = restored;
            }
            Err(error) => {
                log::error!("load state `{file}` aborted: {error}");
            }
        }
    }

    /// Overlay saved actors onto the current scene: same-id live actors are
    /// replaced, the merged list is re-sorted by id, then every decoded
    /// reference is resolved against the merged registry.
    fn overlay(&mut self, file: &str) {
        let path = self.save_path(file);
        match read_overlay(&path, &self.host) {
            Ok((actors, relocations)) => {
                for actor in actors {
                    self.scene.evict_actor(actor.id);
                    self.scene.insert_actor(actor);
                }
                self.scene.sort_actors();
                resolve_relocations(&self.scene, relocations);
                self.scene.attach_restored_bodies();
            }
            Err(error) => {
                log::error!("overlay load `{file}` aborted: {error}");
            }
        }
    }

    /// Saves directory listing with previews, for menu surfaces.
    pub fn list_saves(&self) -> Result<Vec<(String, galgo_variant::Value)>, galgo_save::SaveError> {
        galgo_save::list_saves(&self.saves)
    }
}

/// Read the game configuration: title and required initial scene.
pub fn read_game_config(resources: &Path) -> Result<(String, String), SceneError> {
    let path = resources.join("game.config");
    if !path.exists() {
        return Err(SceneError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "resources/game.config missing",
        )));
    }
    let json = galgo_scene::scene_file::read_json(&path)?;
    let title = json
        .get("game_title")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let initial = json
        .get("initial_scene")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            SceneError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "initial_scene unspecified",
            ))
        })?
        .to_string();
    Ok((title, initial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use galgo_behavior::{Behavior, BehaviorRegistry, CallbackSlot, EngineApi};
    use galgo_scene::ComponentState;
    use galgo_variant::Value;
    use std::fs;
    use std::path::PathBuf;

    fn temp_resources(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("galgo_runtime_{tag}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("scenes")).unwrap();
        fs::create_dir_all(dir.join("actor_templates")).unwrap();
        dir
    }

    fn registry() -> BehaviorRegistry {
        let mut registry = BehaviorRegistry::new();
        registry.register(
            Behavior::new("Recorder")
                .with_callback(CallbackSlot::Start, |api, _, _| {
                    bump(api, "starts");
                    Ok(())
                })
                .with_callback(CallbackSlot::Update, |api, _, _| {
                    bump(api, "updates");
                    Ok(())
                })
                .with_callback(CallbackSlot::LateUpdate, |api, _, _| {
                    bump(api, "lates");
                    Ok(())
                }),
        );
        registry
    }

    fn bump(api: &mut dyn EngineApi, key: &str) {
        let shared = api.shared();
        let count = shared.get(key).as_int().unwrap_or(0);
        shared.set(key, Value::Int(count + 1));
    }

    fn write_basic_scene(dir: &PathBuf, name: &str, actors: &str) {
        fs::write(
            dir.join(format!("scenes/{name}.scene")),
            format!(r#"{{"actors":[{actors}]}}"#),
        )
        .unwrap();
    }

    #[test]
    fn frames_run_lifecycle_in_order() {
        let dir = temp_resources("lifecycle");
        write_basic_scene(&dir, "main", r#"{"name":"a","components":{"r":{"type":"Recorder"}}}"#);

        let mut coordinator = Coordinator::boot(&dir, registry(), "main").unwrap();
        coordinator.run_frame().unwrap();
        coordinator.run_frame().unwrap();

        assert_eq!(coordinator.scene.shared.get("starts"), Value::Int(1));
        assert_eq!(coordinator.scene.shared.get("updates"), Value::Int(2));
        assert_eq!(coordinator.scene.shared.get("lates"), Value::Int(2));
        assert_eq!(coordinator.timing.frame, 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn boot_fails_loudly_on_missing_scene() {
        let dir = temp_resources("missing");
        match Coordinator::boot(&dir, registry(), "nope") {
            Err(SceneError::MissingScene(name)) => assert_eq!(name, "nope"),
            other => panic!("expected MissingScene, got {:?}", other.err()),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn scene_load_carries_marked_actors() {
        let dir = temp_resources("carry");
        write_basic_scene(&dir, "one", r#"{"name":"hero","components":{"r":{"type":"Recorder"}}}"#);
        write_basic_scene(&dir, "two", r#"{"name":"villager"}"#);

        let mut coordinator = Coordinator::boot(&dir, registry(), "one").unwrap();
        coordinator.run_frame().unwrap();

        let hero = coordinator.scene.find_by_name("hero").unwrap();
        coordinator.scene.actor_mut(hero).unwrap().keep_across_loads = true;
        coordinator.scene.pending = Some(Transition::Load("two".to_string()));
        coordinator.run_frame().unwrap();

        assert_eq!(coordinator.scene.name, "two");
        // The carried actor keeps its id; the new actor numbers past it.
        let hero_again = coordinator.scene.find_by_name("hero").unwrap();
        assert_eq!(hero_again, hero);
        let villager = coordinator.scene.find_by_name("villager").unwrap();
        assert!(villager.as_u64() > hero.as_u64());
        assert!(coordinator
            .scene
            .actors
            .windows(2)
            .all(|w| w[0].id < w[1].id));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn state_save_and_restore_roundtrip() {
        let dir = temp_resources("restore");
        write_basic_scene(
            &dir,
            "main",
            r#"{"name":"box","components":{"rb":{"type":"Rigidbody","has_trigger":false},"r":{"type":"Recorder"}}}"#,
        );

        let mut coordinator = Coordinator::boot(&dir, registry(), "main").unwrap();
        // Let the body attach and fall for a few frames.
        for _ in 0..5 {
            coordinator.run_frame().unwrap();
        }
        let id = coordinator.scene.find_by_name("box").unwrap();

        coordinator
            .scene
            .save_requests
            .push(SaveRequest::State("slot.save".to_string()));
        coordinator.run_frame().unwrap();

        // Keep simulating, then restore; the saved moment comes back.
        for _ in 0..20 {
            coordinator.run_frame().unwrap();
        }
        coordinator.scene.pending = Some(Transition::Restore("slot.save".to_string()));
        coordinator.run_frame().unwrap();

        let actor = coordinator.scene.find_by_id(id).expect("actor restored");
        let component = actor.component_by_key("rb").unwrap();
        assert!(component.initialized);
        match &component.state {
            ComponentState::Body(body) => {
                assert!(body.handle.is_some(), "restored body re-attached");
                assert!(body.restored.is_none(), "staged dynamics consumed");
            }
            _ => panic!("expected body"),
        }
        // Start ran before the save, so it does not run again after restore.
        assert_eq!(coordinator.scene.shared.get("starts"), Value::Int(1));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_save_aborts_the_load_and_keeps_the_scene() {
        let dir = temp_resources("corrupt");
        write_basic_scene(&dir, "main", r#"{"name":"a","components":{"r":{"type":"Recorder"}}}"#);

        let mut coordinator = Coordinator::boot(&dir, registry(), "main").unwrap();
        coordinator.run_frame().unwrap();

        fs::create_dir_all(&coordinator.saves).unwrap();
        fs::write(coordinator.saves.join("bad.save"), [0xFFu8; 16]).unwrap();
        coordinator.scene.pending = Some(Transition::Restore("bad.save".to_string()));
        coordinator.run_frame().unwrap();

        // Nothing was partially applied.
        assert_eq!(coordinator.scene.name, "main");
        assert!(coordinator.scene.find_by_name("a").is_some());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn overlay_replaces_same_id_actors_without_duplicates() {
        let dir = temp_resources("overlay");
        write_basic_scene(&dir, "main", r#"{"name":"chest","components":{"r":{"type":"Recorder","gold":5}}}"#);

        let mut coordinator = Coordinator::boot(&dir, registry(), "main").unwrap();
        coordinator.run_frame().unwrap();

        let id = coordinator.scene.find_by_name("chest").unwrap();
        coordinator.scene.actor_mut(id).unwrap().persist = true;

        // Save the chest with 5 gold.
        coordinator.scene.save_requests.push(SaveRequest::Scene {
            file: "chests.save".to_string(),
            preview: None,
        });
        coordinator.run_frame().unwrap();

        // Mutate the live chest, then overlay the save back on.
        let actor = coordinator.scene.actor_mut(id).unwrap();
        if let ComponentState::Generic { table, .. } =
            &actor.component_by_key("r").unwrap().state
        {
            table.set("gold", Value::Int(999));
        }
        coordinator.scene.pending =
            Some(Transition::OverlayCurrent("chests.save".to_string()));
        coordinator.run_frame().unwrap();

        assert_eq!(coordinator.scene.find_all_by_name("chest").len(), 1);
        let actor = coordinator.scene.find_by_id(id).unwrap();
        match &actor.component_by_key("r").unwrap().state {
            ComponentState::Generic { table, .. } => {
                assert_eq!(table.get("gold"), Value::Int(5));
            }
            _ => panic!("expected generic"),
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn emitter_requests_reach_the_sink() {
        let dir = temp_resources("emitter");
        write_basic_scene(
            &dir,
            "main",
            r#"{"name":"sparks","components":{"ps":{"type":"ParticleSystem","burst_quantity":4,"image":"spark"}}}"#,
        );

        let mut coordinator = Coordinator::boot(&dir, registry(), "main").unwrap();

        // The emitter starts and bursts during the first frame's passes and
        // queues one request per particle.
        coordinator.scene.run_start(&coordinator.host, 0);
        coordinator.scene.run_update(&coordinator.host, 0);
        assert_eq!(coordinator.scene.render_queue.len(), 4);
        assert_eq!(coordinator.scene.render_queue[0].image.as_ref(), "spark");

        // run_frame drains the queue into the sink.
        coordinator.sink = Box::new(CollectSink::default());
        coordinator.run_frame().unwrap();
        assert!(coordinator.scene.render_queue.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_game_config_is_fatal() {
        let dir = temp_resources("config");
        assert!(read_game_config(&dir).is_err());
        fs::write(
            dir.join("game.config"),
            r#"{"game_title":"demo","initial_scene":"main"}"#,
        )
        .unwrap();
        let (title, initial) = read_game_config(&dir).unwrap();
        assert_eq!(title, "demo");
        assert_eq!(initial, "main");
        let _ = fs::remove_dir_all(&dir);
    }
}
