//! Save/load of the simulation world
//!
//! Features:
//! - Versioned JSON envelope
//! - Reference validation on load (weak links must resolve to the right type)
//! - Atomic file writes (tmp → save)
//!
//! Effect and script hosts are not part of a save; attach them again after
//! loading.

mod validation;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::sim::World;

pub use validation::validate_references;

/// Current save format version
pub const SAVE_VERSION: u32 = 1;

#[derive(Serialize)]
struct Envelope<'a> {
    version: u32,
    ticks: u64,
    world: &'a World,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Deserialize)]
struct Saved {
    world: World,
}

/// Serialize a world between passes
pub fn save_world(world: &World) -> Result<String, serde_json::Error> {
    debug_assert_eq!(
        world.phase(),
        crate::sim::StepPhase::Idle,
        "saving in the middle of a pass"
    );
    serde_json::to_string(&Envelope {
        version: SAVE_VERSION,
        ticks: world.ticks,
        world,
    })
}

/// Restore a world, rejecting saves whose links point at the wrong kind of
/// entity
pub fn load_world(json: &str) -> Result<World, LoadError> {
    let header: Header = serde_json::from_str(json)?;
    if header.version != SAVE_VERSION {
        return Err(LoadError::Version {
            found: header.version,
            expected: SAVE_VERSION,
        });
    }

    let Saved { mut world } = serde_json::from_str(json)?;
    world.sweep_lists();
    world.prune_back_links();
    world.grid.reindex();
    validate_references(&world)?;

    log::info!(
        "Loaded world at tick {} ({} entities)",
        world.ticks,
        world.live_count()
    );
    Ok(world)
}

pub fn save_to_file(world: &World, path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    let json = save_world(world)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    log::info!("World saved to {} (tick {})", path.display(), world.ticks);
    Ok(())
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<World, LoadError> {
    let json = fs::read_to_string(path.as_ref())?;
    load_world(&json)
}
