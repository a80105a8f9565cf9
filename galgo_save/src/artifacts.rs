//! Save-file artifacts: full state saves, persist-flagged scene saves with
//! previews, overlay reads, and save enumeration.

use std::collections::HashSet;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use galgo_behavior::BehaviorHost;
use galgo_scene::{Actor, Scene};
use galgo_variant::{TableRef, Value};

use crate::common::{read_bool, write_bool};
use crate::decode::{resolve_relocations, Deserializer, Reference};
use crate::encode::Serializer;
use crate::SaveError;

/// Names excluded from shared-table saves. Populated once, when the
/// embedding application registers its behavior definitions, and read-only
/// afterwards.
#[derive(Debug, Default, Clone)]
pub struct SaveFilter {
    excluded: HashSet<String>,
}

impl SaveFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude(&mut self, name: impl Into<String>) {
        self.excluded.insert(name.into());
    }

    pub fn exclude_all<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.excluded.insert(name.into());
        }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }
}

fn ensure_parent(path: &Path) -> Result<(), SaveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Full state save: the scene, then the filtered shared table.
pub fn save_state(path: &Path, scene: &Scene, filter: &SaveFilter) -> Result<(), SaveError> {
    ensure_parent(path)?;
    let file = fs::File::create(path)?;
    let mut serializer = Serializer::new(BufWriter::new(file));
    serializer.write_scene(scene)?;
    serializer.write_shared(scene, filter)?;
    Ok(())
}

/// Restore a full state save. The returned scene has no templates and a
/// detached physics world; the coordinator re-binds both and re-attaches
/// restored bodies.
pub fn load_state(path: &Path, host: &dyn BehaviorHost) -> Result<Scene, SaveError> {
    let file = fs::File::open(path)?;
    let mut deserializer = Deserializer::new(BufReader::new(file));
    let mut relocations: Vec<Reference> = Vec::new();
    let mut scene = deserializer.read_scene(&mut relocations, host)?;
    scene.shared = deserializer.read_table(&mut relocations)?;
    resolve_relocations(&scene, relocations);
    Ok(scene)
}

/// Explicit scene save: optional preview table, then the persist-flagged
/// actors only.
pub fn save_scene_artifact(
    path: &Path,
    scene: &Scene,
    preview: Option<&TableRef>,
) -> Result<(), SaveError> {
    ensure_parent(path)?;
    let file = fs::File::create(path)?;
    let mut serializer = Serializer::new(BufWriter::new(file));
    match preview {
        Some(preview) => {
            write_bool(serializer_writer(&mut serializer), true)?;
            serializer.write_table(preview, scene)?;
        }
        None => write_bool(serializer_writer(&mut serializer), false)?,
    }
    serializer.write_persistent_actors(scene)?;
    Ok(())
}

// The artifact prefix (preview flag) sits outside the value encoding, so it
// goes straight to the writer.
fn serializer_writer<W: std::io::Write>(serializer: &mut Serializer<W>) -> &mut W {
    serializer.writer_mut()
}

/// Read the actors of a scene-save artifact, skipping its preview. The
/// relocation records come back unresolved; the caller merges the actors
/// into a live scene first, then resolves.
pub fn read_overlay(
    path: &Path,
    host: &dyn BehaviorHost,
) -> Result<(Vec<Actor>, Vec<Reference>), SaveError> {
    let file = fs::File::open(path)?;
    let mut deserializer = Deserializer::new(BufReader::new(file));
    if read_bool_from(&mut deserializer)? {
        // Preview references are never resolved; the table is discarded.
        let mut throwaway = Vec::new();
        let _ = deserializer.read_table(&mut throwaway)?;
    }
    let mut relocations = Vec::new();
    let actors = deserializer.read_actor_list(&mut relocations, host)?;
    Ok((actors, relocations))
}

fn read_bool_from<R: std::io::Read>(deserializer: &mut Deserializer<R>) -> Result<bool, SaveError> {
    read_bool(deserializer.reader_mut())
}

/// Enumerate the saves directory: file name paired with its preview table
/// (`Nil` when the artifact has none). References inside previews stay
/// unresolved, as absent keys.
pub fn list_saves(dir: &Path) -> Result<Vec<(String, Value)>, SaveError> {
    let mut saves = Vec::new();
    if !dir.exists() {
        return Ok(saves);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let file = fs::File::open(&path)?;
        let mut deserializer = Deserializer::new(BufReader::new(file));
        let preview = if read_bool_from(&mut deserializer)? {
            let mut throwaway = Vec::new();
            Value::Table(deserializer.read_table(&mut throwaway)?)
        } else {
            Value::Nil
        };
        saves.push((name.to_string(), preview));
    }
    saves.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(saves)
}
