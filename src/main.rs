//! Arena Core - headless demo driver
//!
//! Builds a small walled arena with two tanks, a trigger and a few pickups,
//! then runs it through the frame clock and logs what happened.

use std::process::ExitCode;

use arena_core::consts::{CELL_SIZE, SPEED_TANK_SHELL};
use arena_core::persistence;
use arena_core::sim::{
    Control, EntityId, FrameClock, LogScripts, MapProperties, Pilot, PropValue, WallKind, Weapon,
    World,
};
use arena_core::{SimError, SimSettings};
use glam::Vec2;

/// Settings file looked up next to the working directory
const SETTINGS_FILE: &str = "arena.json";
const FRAME_TIME: f32 = 1.0 / 60.0;
const FRAMES: u32 = 600;
/// Frames between shots of the gunner tank
const FIRE_INTERVAL: u32 = 45;

fn pilot(nick: &str, team: u8, human: bool) -> Option<Pilot> {
    Some(Pilot {
        team,
        human,
        nick: nick.to_string(),
    })
}

fn build_arena(world: &mut World) -> Result<(EntityId, EntityId), SimError> {
    let size = world.size();
    let cell = CELL_SIZE;

    // Concrete border
    let cols = (size.x / cell) as i32;
    let rows = (size.y / cell) as i32;
    for i in 0..cols {
        let x = (i as f32 + 0.5) * cell;
        world.spawn_wall(Vec2::new(x, cell * 0.5), Vec2::splat(cell), WallKind::Concrete)?;
        world.spawn_wall(Vec2::new(x, size.y - cell * 0.5), Vec2::splat(cell), WallKind::Concrete)?;
    }
    for j in 1..rows - 1 {
        let y = (j as f32 + 0.5) * cell;
        world.spawn_wall(Vec2::new(cell * 0.5, y), Vec2::splat(cell), WallKind::Concrete)?;
        world.spawn_wall(Vec2::new(size.x - cell * 0.5, y), Vec2::splat(cell), WallKind::Concrete)?;
    }

    // Brick cover in the middle
    for j in 0..4 {
        let pos = Vec2::new(size.x * 0.5, size.y * 0.5 + (j as f32 - 1.5) * cell);
        world.spawn_from_map("wall_brick", pos, &MapProperties::new())?;
    }

    let gunner = world.spawn_vehicle(Vec2::new(200.0, size.y * 0.5), Vec2::X, pilot("gunner", 1, true))?;
    let runner = world.spawn_vehicle(
        Vec2::new(size.x - 200.0, size.y * 0.5 - 120.0),
        Vec2::NEG_X,
        pilot("runner", 2, false),
    )?;
    world.set_name(gunner, Some("gunner"));
    world.set_name(runner, Some("runner"));

    let gate = MapProperties::new()
        .with("name", PropValue::Str("gate".into()))
        .with("radius", PropValue::Float(3.0))
        .with("on_enter", PropValue::Str("print('gate entered')".into()))
        .with("on_leave", PropValue::Str("print('gate left')".into()));
    world.spawn_from_map("trigger", Vec2::new(size.x - 200.0, size.y * 0.5), &gate)?;

    let respawn = MapProperties::new().with("respawn_time", PropValue::Float(3.0));
    world.spawn_from_map("pu_health", Vec2::new(size.x - 300.0, size.y * 0.5 + 60.0), &respawn)?;
    world.spawn_from_map("pu_shield", Vec2::new(300.0, size.y * 0.5 - 80.0), &respawn)?;
    world.spawn_from_map("pu_mine", Vec2::new(size.x * 0.5 + 80.0, size.y * 0.5 + 150.0), &respawn)?;
    world.spawn_from_map("pu_shock", Vec2::new(size.x * 0.5 - 80.0, size.y * 0.5 - 150.0), &respawn)?;

    world.add_camera(Some(gunner));
    Ok((gunner, runner))
}

fn run(settings: &SimSettings) -> Result<(), SimError> {
    let mut world = World::new(settings);
    world.set_scripts(Box::new(LogScripts));
    let (gunner, runner) = build_arena(&mut world)?;
    let mut clock = FrameClock::new(settings);

    for frame in 0..FRAMES {
        // The runner drives a slow loop through the trigger
        world.set_control(
            runner,
            Control {
                thrust: 0.6,
                turn: if (frame / 90) % 2 == 0 { 0.4 } else { -0.4 },
            },
        );

        if frame % FIRE_INTERVAL == 0
            && let (Some(from), Some(to)) = (world.pos(gunner), world.pos(runner))
            && world.is_alive(gunner)
        {
            let aim = (to - from).normalize_or(Vec2::X);
            world.spawn_projectile(
                Weapon::TankShell,
                from + aim * 30.0,
                aim * SPEED_TANK_SHELL,
                Some(gunner),
                frame % (FIRE_INTERVAL * 4) == 0,
            )?;
        }

        clock.advance(&mut world, FRAME_TIME)?;
    }

    let health = |id: EntityId| world.body(id).map(|b| b.health).unwrap_or(0.0);
    log::info!(
        "Finished {} ticks ({:.1}s): gunner {:.0} hp, runner {:.0} hp, {} entities, rng draws {}",
        world.ticks,
        world.time,
        health(gunner),
        health(runner),
        world.live_count(),
        world.rng_state().draws
    );

    match persistence::save_world(&world) {
        Ok(json) => log::info!("Save size: {} bytes", json.len()),
        Err(err) => log::warn!("Could not serialize world: {err}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Arena Core (headless) starting...");

    let settings = SimSettings::load_or_default(SETTINGS_FILE);
    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Simulation aborted: {err}");
            ExitCode::FAILURE
        }
    }
}
