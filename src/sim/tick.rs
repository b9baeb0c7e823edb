//! Frame scheduling
//!
//! One rendered frame runs up to `max_substeps` fixed steps, then one
//! floating step and one end-of-frame pass. Each pass walks a snapshot of its
//! list, so anything spawned during a pass is first visited by the next one,
//! and skips entries killed or unsubscribed since the snapshot was taken.

use super::entity::{EntityId, ObjectType, flags};
use super::world::{StepPhase, World};
use crate::consts::SIM_DT;
use crate::error::SimError;
use crate::settings::SimSettings;

/// Camera shake lost per second
const SHAKE_DECAY: f32 = 2.0;

impl World {
    fn snapshot(&self, bit: u32) -> Vec<EntityId> {
        let list = match bit {
            flags::TS_FIXED => &self.fixed_list,
            flags::TS_FLOATING => &self.floating_list,
            _ => &self.end_frame_list,
        };
        list.iter().copied().collect()
    }

    fn receives(&self, id: EntityId, bit: u32) -> bool {
        self.entity(id)
            .is_some_and(|e| !e.is_killed() && e.flags & bit != 0)
    }

    /// Advance gameplay by one fixed step
    pub fn step_fixed(&mut self, dt: f32) -> Result<(), SimError> {
        self.phase = StepPhase::Fixed;
        let result = self.run_fixed(dt);
        self.sweep_lists();
        self.phase = StepPhase::Idle;

        self.time += f64::from(dt);
        self.ticks += 1;
        result
    }

    fn run_fixed(&mut self, dt: f32) -> Result<(), SimError> {
        for id in self.snapshot(flags::TS_FIXED) {
            if !self.receives(id, flags::TS_FIXED) {
                continue;
            }
            let Some(ty) = self.object_type(id) else {
                continue;
            };
            match ty {
                ObjectType::Vehicle | ObjectType::WallBrick | ObjectType::WallConcrete => {
                    self.step_body(id, dt)
                }
                ObjectType::Projectile => self.step_projectile(id, dt)?,
                ObjectType::Explosion => self.step_explosion(id, dt)?,
                ObjectType::HealthDaemon => self.step_daemon(id, dt)?,
                ObjectType::PickupHealth
                | ObjectType::PickupMine
                | ObjectType::PickupShield
                | ObjectType::PickupShock => self.step_pickup(id, dt)?,
                ObjectType::Trigger => self.step_trigger(id),
            }
        }
        Ok(())
    }

    /// Visual-only update with the real frame time
    pub fn step_floating(&mut self, dt: f32) {
        self.phase = StepPhase::Floating;
        for id in self.snapshot(flags::TS_FLOATING) {
            if !self.receives(id, flags::TS_FLOATING) {
                continue;
            }
            match self.object_type(id) {
                Some(ObjectType::Explosion) => self.float_explosion(id),
                Some(
                    ObjectType::PickupHealth
                    | ObjectType::PickupMine
                    | ObjectType::PickupShield
                    | ObjectType::PickupShock,
                ) => self.float_pickup(id, dt),
                _ => {}
            }
        }
        for camera in &mut self.cameras {
            camera.shake = (camera.shake - SHAKE_DECAY * dt).max(0.0);
        }
        self.sweep_lists();
        self.phase = StepPhase::Idle;
    }

    pub fn end_frame(&mut self) {
        self.phase = StepPhase::EndFrame;
        for id in self.snapshot(flags::END_FRAME) {
            if self.receives(id, flags::END_FRAME) {
                self.end_frame_body(id);
            }
        }
        self.sweep_lists();
        self.phase = StepPhase::Idle;
    }
}

/// Fixed-timestep accumulator driving a [`World`] from real frame times
#[derive(Debug, Clone)]
pub struct FrameClock {
    accumulator: f32,
    max_substeps: u32,
    max_frame_time: f32,
}

impl FrameClock {
    pub fn new(settings: &SimSettings) -> Self {
        Self {
            accumulator: 0.0,
            max_substeps: settings.max_substeps.max(1),
            max_frame_time: settings.max_frame_time,
        }
    }

    /// Unsimulated time carried to the next frame
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    /// Run one frame; returns the number of fixed steps taken
    pub fn advance(&mut self, world: &mut World, frame_time: f32) -> Result<u32, SimError> {
        let dt = frame_time.clamp(0.0, self.max_frame_time);
        self.accumulator += dt;

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < self.max_substeps {
            world.step_fixed(SIM_DT)?;
            self.accumulator -= SIM_DT;
            substeps += 1;
        }
        if self.accumulator >= SIM_DT {
            // Falling behind: drop the backlog rather than spiral
            log::debug!("dropping {:.3}s of simulation time", self.accumulator);
            self.accumulator %= SIM_DT;
        }

        world.step_floating(dt);
        world.end_frame();
        Ok(substeps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SPEED_ROCKET;
    use crate::sim::body::{Control, WallKind};
    use crate::sim::explosion::ExplosionKind;
    use crate::sim::projectile::Weapon;
    use glam::Vec2;

    fn world() -> World {
        World::new(&SimSettings::default())
    }

    #[test]
    fn test_spawned_during_pass_waits_for_next() {
        let mut world = world();
        world
            .spawn_wall(Vec2::new(200.0, 100.0), Vec2::splat(32.0), WallKind::Brick)
            .unwrap();
        world
            .spawn_projectile(Weapon::rocket(), Vec2::new(180.0, 100.0), Vec2::new(SPEED_ROCKET, 0.0), None, false)
            .unwrap();

        world.step_fixed(SIM_DT).unwrap();
        let boom = world
            .objects()
            .find(|id| world.object_type(*id) == Some(ObjectType::Explosion))
            .unwrap();
        assert_eq!(world.explosion(boom).unwrap().time, 0.0);
        assert!(world.projectiles().next().is_none());

        world.step_fixed(SIM_DT).unwrap();
        assert!(world.explosion(boom).unwrap().time > 0.0);
        assert_eq!(world.phase(), StepPhase::Idle);
        assert_eq!(world.ticks, 2);
    }

    #[test]
    fn test_killed_mid_pass_is_skipped() {
        let mut world = world();
        let tank = world
            .spawn_vehicle(Vec2::new(300.0, 300.0), Vec2::X, None)
            .unwrap();
        let daemon = world.spawn_health_daemon(tank, None, 600.0, 5.0).unwrap();
        // The daemon is newer, so it runs first and kills the tank this step
        world.body_mut(tank).unwrap().health = 1.0;
        world.set_control(tank, Control { thrust: 1.0, turn: 0.0 });

        world.step_fixed(SIM_DT).unwrap();
        assert!(!world.is_alive(tank));
        assert!(!world.is_alive(daemon));
        assert!(!world.fixed_list.contains(&tank));
    }

    #[test]
    fn test_floating_pass_leaves_network_rng_alone() {
        let mut world = world();
        world
            .spawn_explosion(ExplosionKind::Standard, Vec2::new(200.0, 200.0), None)
            .unwrap();
        let before = world.rng_state();
        world.step_floating(0.016);
        world.end_frame();
        assert_eq!(world.rng_state(), before);
    }

    #[test]
    fn test_camera_shake_decays() {
        let mut world = world();
        let cam = world.add_camera(None);
        world.cameras[cam].shake(0.5);
        world.step_floating(0.1);
        assert!((world.cameras[cam].shake - 0.3).abs() < 0.001);
        world.step_floating(1.0);
        assert_eq!(world.cameras[cam].shake, 0.0);
    }

    #[test]
    fn test_clock_caps_substeps() {
        let mut world = world();
        let settings = SimSettings {
            max_substeps: 4,
            max_frame_time: 1.0,
            ..SimSettings::default()
        };
        let mut clock = FrameClock::new(&settings);
        assert_eq!(clock.advance(&mut world, 0.5).unwrap(), 4);
        assert!(clock.accumulator() < SIM_DT);
        assert_eq!(world.ticks, 4);
    }

    #[test]
    fn test_clock_carries_remainder() {
        let mut world = world();
        let mut clock = FrameClock::new(&SimSettings::default());
        assert_eq!(clock.advance(&mut world, SIM_DT * 0.6).unwrap(), 0);
        assert_eq!(clock.advance(&mut world, SIM_DT * 0.6).unwrap(), 1);
        assert!((clock.accumulator() - SIM_DT * 0.2).abs() < 1e-5);
        assert_eq!(world.ticks, 1);
    }
}
