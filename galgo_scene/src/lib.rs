pub mod actor;
pub mod ctx;
pub mod events;
pub mod particles;
pub mod physics_body;
pub mod render;
pub mod scene;
pub mod scene_file;

pub use actor::*;
pub use ctx::SceneCtx;
pub use events::{EventBus, Subscriber};
pub use particles::{ParticleEmitter, RangeSampler, UpdateMode};
pub use physics_body::{PhysicsBody, RestoredDynamics, ShapeKind};
pub use render::SpriteRequest;
pub use scene::{SaveRequest, Scene, Transition};
pub use scene_file::SceneLoader;

use galgo_behavior::BehaviorError;

/// Fatal authoring errors: missing or malformed resources. These terminate
/// the process at the binary boundary, before a frame renders.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("scene `{0}` is missing")]
    MissingScene(String),
    #[error("scene `{0}` has no actors array")]
    MissingActors(String),
    #[error("template `{0}` is missing")]
    MissingTemplate(String),
    #[error("failed to locate behavior definition `{0}`")]
    MissingBehavior(String),
    #[error("component `{0}` has no type")]
    MissingComponentType(String),
    #[error("failed to parse `{path}`: {source}")]
    Malformed {
        path: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A failing callback is reported with its owner and never propagates;
/// execution continues with the next component, actor, and frame.
pub fn report_callback_error(owner: &str, error: &BehaviorError) {
    log::error!("\x1b[31m{owner} : {error}\x1b[0m");
}
