//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Network RNG only for anything that affects gameplay
//! - Stable iteration order (list order, newest first)
//! - No rendering or platform dependencies

pub mod body;
pub mod collision;
pub mod daemon;
pub mod entity;
pub mod explosion;
pub mod grid;
pub mod hooks;
pub mod notify;
pub mod pickup;
pub mod pool;
pub mod projectile;
pub mod props;
pub mod rng;
pub mod tick;
pub mod trigger;
pub mod world;

pub use body::{BodyClass, Control, Motion, Pilot, RigidBody, WallKind};
pub use collision::{Obb, Rect, obb_overlap, reflect_velocity, segment_obb};
pub use daemon::HealthDaemon;
pub use entity::{Entity, EntityId, EntityKind, ObjectType, RefKind, flags};
pub use explosion::{Explosion, ExplosionKind};
pub use grid::{SpatialGrid, TraceHit};
pub use hooks::{Effects, LogScripts, NullEffects, NullScripts, ParticleKind, ScriptArg, ScriptHost, Sound};
pub use notify::{DamageDesc, Handler, NotifyKind, NotifyParam, Subscription};
pub use pickup::{Pickup, PickupKind};
pub use pool::{MemoryPool, PoolHandle};
pub use projectile::{Projectile, Weapon};
pub use props::{MapExchange, MapProperties, PropValue};
pub use rng::{NetRng, RngState};
pub use tick::FrameClock;
pub use trigger::Trigger;
pub use world::{Camera, StepPhase, World};
