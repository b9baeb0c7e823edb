//! Arena Core - simulation core of a 2D top-down arena tank game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (entities, physics, spatial queries)
//! - `persistence`: Save/load with reference validation
//! - `settings`: Simulation configuration
//! - `error`: Error types

pub mod error;
pub mod persistence;
pub mod settings;
pub mod sim;

pub use error::{LoadError, PoolError, ScriptError, SettingsError, SimError};
pub use settings::SimSettings;
pub use sim::World;

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (120 Hz)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Cell of the explosion field and trigger radius unit
    pub const CELL_SIZE: f32 = 32.0;
    /// Cell of the rigid body spatial grid
    pub const LOCATION_SIZE: f32 = 128.0;
    pub const MAX_TEAMS: i32 = 6;

    /// Hit damage per weapon
    pub const DAMAGE_ROCKET: f32 = 80.0;
    pub const DAMAGE_BULLET: f32 = 5.0;
    pub const DAMAGE_TANK_SHELL: f32 = 60.0;
    pub const DAMAGE_PLASMA: f32 = 60.0;
    pub const DAMAGE_AC_BULLET: f32 = 9.0;
    pub const DAMAGE_GAUSS: f32 = 60.0;
    pub const DAMAGE_GAUSS_FADE: f32 = 15.0;
    pub const DAMAGE_DISK_MIN: f32 = 40.0;
    pub const DAMAGE_DISK_MAX: f32 = 60.0;
    pub const DAMAGE_DISK_FADE: f32 = 11.0;
    pub const DAMAGE_FIRE_HIT: f32 = 2.0;
    /// Burn damage per second at the center of a fire spark
    pub const DAMAGE_FIRE: f32 = 60.0;
    /// Drain per second on a vehicle at the center of a BFG core
    pub const DAMAGE_BFGCORE: f32 = 100.0;

    /// Muzzle speed per weapon (units/s)
    pub const SPEED_ROCKET: f32 = 750.0;
    pub const SPEED_BULLET: f32 = 4000.0;
    pub const SPEED_TANK_SHELL: f32 = 1400.0;
    pub const SPEED_PLASMA: f32 = 800.0;
    pub const SPEED_AC_BULLET: f32 = 3000.0;
    pub const SPEED_GAUSS: f32 = 10000.0;
    pub const SPEED_DISK: f32 = 2000.0;
    pub const SPEED_FIRE: f32 = 500.0;
    pub const SPEED_BFGCORE: f32 = 500.0;

    /// Rockets steer toward their target for this long
    pub const ROCKET_HOMING_TIME: f32 = 1.0;
    pub const ROCKET_HOMING_FACTOR: f32 = 600.0;
    /// Reach of the BFG core drain
    pub const BFG_RADIUS: f32 = 100.0;
    pub const BFG_HOMING_FACTOR: f32 = 500.0;

    pub const VEHICLE_HEALTH: f32 = 100.0;
    pub const VEHICLE_ACCEL: f32 = 400.0;
    pub const VEHICLE_TURN_SPEED: f32 = 3.0;
    pub const BRICK_HEALTH: f32 = 50.0;

    pub const PICKUP_RADIUS: f32 = 25.0;
    /// Shield lifetime once picked up (seconds)
    pub const PROTECT_TIME: f32 = 20.0;
}

/// Convert polar (r, theta) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f32, theta: f32) -> Vec2 {
    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Convert cartesian (x, y) to polar (r, theta)
#[inline]
pub fn cartesian_to_polar(pos: Vec2) -> (f32, f32) {
    (pos.length(), pos.y.atan2(pos.x))
}
