//! Error types for the simulation core

use thiserror::Error;

use crate::sim::{EntityId, ObjectType};

/// Failures reported by [`crate::sim::MemoryPool`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("block index table could not grow past {blocks} blocks")]
    OutOfMemory { blocks: usize },
    #[error("slot {slot} of block {block} is already free")]
    DoubleFree { block: u32, slot: u32 },
    #[error("handle {block}:{slot} does not refer to a live allocation")]
    StaleHandle { block: u32, slot: u32 },
}

/// Errors that abort a simulation step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("entity pool: {0}")]
    Pool(#[from] PoolError),
    #[error("unknown object type `{0}`")]
    UnknownType(String),
}

/// Script hook failures. These are logged by the world and never abort a step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Errors raised while restoring a saved world.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed save data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("save version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("{owner} references {target} as {expected}, but it is a {found:?}")]
    TypeMismatch {
        owner: String,
        target: EntityId,
        expected: &'static str,
        found: ObjectType,
    },
    #[error("{owner} references missing entity {target}")]
    DanglingReference { owner: String, target: EntityId },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading simulation settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("world size {width}x{height} is not positive")]
    WorldSize { width: f32, height: f32 },
}
