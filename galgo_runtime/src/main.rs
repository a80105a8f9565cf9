use std::path::PathBuf;
use std::time::{Duration, Instant};

use galgo_behavior::BehaviorRegistry;
use galgo_runtime::{read_game_config, Coordinator};

const TARGET_FRAME: Duration = Duration::from_millis(16);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let resources = PathBuf::from("resources");
    if !resources.exists() {
        eprintln!("error: resources/ missing");
        std::process::exit(1);
    }
    let (title, initial_scene) = match read_game_config(&resources) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    };
    if !title.is_empty() {
        log::info!("{title}");
    }

    // Behavior definitions are registered by the embedding application;
    // a bare runtime starts with none.
    let host = BehaviorRegistry::new();
    let mut coordinator = match Coordinator::boot(resources, host, &initial_scene) {
        Ok(coordinator) => coordinator,
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    };

    loop {
        let frame_start = Instant::now();
        coordinator.run_frame().map_err(anyhow::Error::from)?;
        if coordinator.scene.quit_requested {
            break;
        }
        let elapsed = frame_start.elapsed();
        if elapsed < TARGET_FRAME {
            std::thread::sleep(TARGET_FRAME - elapsed);
        }
    }
    Ok(())
}
