//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use arena_core::consts::SIM_DT;
use arena_core::sim::{EntityId, Pilot, ScriptArg, ScriptHost, WallKind, Weapon, World};
use arena_core::{ScriptError, SimSettings};
use glam::Vec2;

/// Collects script fragment calls
#[derive(Debug, Default, Clone)]
pub struct ScriptLog {
    pub calls: Rc<RefCell<Vec<(String, Vec<ScriptArg>)>>>,
}

impl ScriptLog {
    pub fn count(&self, source: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|(s, _)| s == source)
            .count()
    }
}

impl ScriptHost for ScriptLog {
    fn exec(&mut self, source: &str, args: &[ScriptArg]) -> Result<(), ScriptError> {
        self.calls
            .borrow_mut()
            .push((source.to_string(), args.to_vec()));
        Ok(())
    }
}

pub fn pilot(team: u8) -> Option<Pilot> {
    Some(Pilot {
        team,
        human: true,
        nick: format!("player{team}"),
    })
}

/// 32x32 brick wall that survives a lot of punishment
pub fn tough_wall(world: &mut World, pos: Vec2) -> EntityId {
    let id = world
        .spawn_wall(pos, Vec2::splat(32.0), WallKind::Brick)
        .unwrap();
    let body = world.body_mut(id).unwrap();
    body.health = 1000.0;
    body.max_health = 1000.0;
    id
}

pub fn damage_taken(world: &World, id: EntityId) -> f32 {
    world
        .body(id)
        .map(|b| b.max_health - b.health)
        .unwrap_or(0.0)
}

pub fn run_fixed(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step_fixed(SIM_DT).unwrap();
    }
}

/// Two tanks trading fire across a field of walls. Disks and fire sparks
/// bounce off the walls with network-random deflections.
pub fn skirmish(seed: u64) -> World {
    let mut world = World::new(&SimSettings::with_seed(seed));
    for i in 0..6 {
        let x = 300.0 + 80.0 * i as f32;
        tough_wall(&mut world, Vec2::new(x, 400.0 + 40.0 * (i % 2) as f32));
    }
    world
        .spawn_wall(Vec2::new(520.0, 700.0), Vec2::new(200.0, 32.0), WallKind::Concrete)
        .unwrap();

    let a = world
        .spawn_vehicle(Vec2::new(200.0, 200.0), Vec2::X, pilot(1))
        .unwrap();
    let b = world
        .spawn_vehicle(Vec2::new(800.0, 600.0), Vec2::NEG_X, pilot(2))
        .unwrap();

    let volley = [
        (Weapon::Disk, Vec2::new(1.0, 1.2)),
        (Weapon::fire_spark(), Vec2::new(1.0, 0.9)),
        (Weapon::rocket(), Vec2::new(1.0, 0.7)),
        (Weapon::PlasmaClod, Vec2::new(1.0, 0.5)),
        (Weapon::AcBullet, Vec2::new(0.8, 1.0)),
    ];
    for (weapon, aim) in volley {
        let dir = aim.normalize();
        world
            .spawn_projectile(weapon, Vec2::new(230.0, 230.0), dir * weapon.speed(), Some(a), true)
            .unwrap();
        world
            .spawn_projectile(weapon, Vec2::new(770.0, 570.0), -dir * weapon.speed(), Some(b), true)
            .unwrap();
    }
    world
}
