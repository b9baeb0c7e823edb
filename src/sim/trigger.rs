//! Trigger volumes
//!
//! An enabled trigger with no occupant picks the nearest qualifying vehicle
//! inside its radius and calls `on_enter`. The occupant is then re-tested
//! every step against the slightly larger `radius + radius_delta` until it
//! leaves, dies, drops out of sight or the trigger is disabled, at which
//! point `on_leave` runs. A closer vehicle never takes over an occupied
//! trigger.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityKind};
use super::hooks::ScriptArg;
use super::world::World;
use crate::consts::CELL_SIZE;
use crate::error::SimError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Required pilot team, 0 accepts anyone
    pub team: i32,
    /// Activation radius in cells
    pub radius: f32,
    /// Extra cells an occupant may drift before leaving
    pub radius_delta: f32,
    pub enabled: bool,
    pub only_visible: bool,
    pub only_human: bool,
    pub occupant: Option<EntityId>,
    pub on_enter: String,
    pub on_leave: String,
}

impl Default for Trigger {
    fn default() -> Self {
        Self {
            team: 0,
            radius: 1.0,
            radius_delta: 0.0,
            enabled: true,
            only_visible: true,
            only_human: false,
            occupant: None,
            on_enter: String::new(),
            on_leave: String::new(),
        }
    }
}

impl Trigger {
    pub fn is_active(&self) -> bool {
        self.occupant.is_some()
    }
}

impl World {
    pub fn spawn_trigger(&mut self, pos: Vec2, trigger: Trigger) -> Result<EntityId, SimError> {
        self.spawn(pos, EntityKind::Trigger(trigger))
    }

    /// Nothing blocks the line from the trigger to the vehicle
    fn trigger_sees(&self, from: Vec2, vehicle: EntityId, at: Vec2) -> bool {
        self.trace(Some(vehicle), from, at - from).is_none()
    }

    fn occupant_stays(&self, pos: Vec2, trigger: &Trigger, vehicle: EntityId) -> bool {
        let Some((at, body)) = self
            .entity(vehicle)
            .filter(|e| !e.is_killed())
            .and_then(|e| e.kind.as_body().map(|b| (e.pos, b)))
        else {
            return false;
        };
        let rr = (at - pos).length_squared();
        let reach = (trigger.radius + trigger.radius_delta) * CELL_SIZE;
        if rr > reach * reach {
            return false;
        }
        !trigger.only_visible
            || rr <= body.half.length_squared()
            || self.trigger_sees(pos, vehicle, at)
    }

    fn find_occupant(&self, pos: Vec2, trigger: &Trigger) -> Option<EntityId> {
        let reach = trigger.radius * CELL_SIZE;
        let mut best: Option<(EntityId, f32)> = None;

        for vehicle in self.vehicles() {
            let Some((at, body)) = self
                .entity(vehicle)
                .and_then(|e| e.kind.as_body().map(|b| (e.pos, b)))
            else {
                continue;
            };
            let rr = (at - pos).length_squared();
            if rr >= reach * reach || best.is_some_and(|(_, d)| rr >= d) {
                continue;
            }
            let Some(pilot) = body.pilot() else {
                continue;
            };
            if trigger.only_human && !pilot.human {
                continue;
            }
            if trigger.team != 0 && i32::from(pilot.team) != trigger.team {
                continue;
            }
            if trigger.only_visible
                && rr > body.half.length_squared()
                && !self.trigger_sees(pos, vehicle, at)
            {
                continue;
            }
            best = Some((vehicle, rr));
        }

        best.map(|(id, _)| id)
    }

    pub(crate) fn step_trigger(&mut self, id: EntityId) {
        let Some((pos, trigger)) = self
            .entity(id)
            .and_then(|e| e.kind.as_trigger().map(|t| (e.pos, t)))
        else {
            return;
        };

        if let Some(occupant) = trigger.occupant {
            if trigger.enabled && self.occupant_stays(pos, trigger, occupant) {
                return;
            }
            let script = trigger.on_leave.clone();
            if let Some(t) = self.trigger_mut(id) {
                t.occupant = None;
            }
            log::debug!("trigger {id} left by {occupant}");
            self.run_script(&script, &[ScriptArg::Entity(id), ScriptArg::Entity(occupant)]);
        } else if trigger.enabled {
            let Some(vehicle) = self.find_occupant(pos, trigger) else {
                return;
            };
            let script = trigger.on_enter.clone();
            if let Some(t) = self.trigger_mut(id) {
                t.occupant = Some(vehicle);
            }
            log::debug!("trigger {id} entered by {vehicle}");
            self.run_script(&script, &[ScriptArg::Entity(id), ScriptArg::Entity(vehicle)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SimSettings;
    use crate::sim::body::{Pilot, WallKind};
    use crate::sim::hooks::testing::Recorder;

    fn pilot(team: u8, human: bool) -> Option<Pilot> {
        Some(Pilot {
            team,
            human,
            nick: "p".into(),
        })
    }

    fn setup(trigger: Trigger) -> (World, EntityId, Recorder) {
        let mut world = World::new(&SimSettings::default());
        let recorder = Recorder::default();
        world.set_scripts(Box::new(recorder.clone()));
        let trigger = Trigger {
            on_enter: "enter".into(),
            on_leave: "leave".into(),
            ..trigger
        };
        let id = world.spawn_trigger(Vec2::new(500.0, 500.0), trigger).unwrap();
        (world, id, recorder)
    }

    #[test]
    fn test_enter_leave_reenter() {
        let (mut world, trigger, recorder) = setup(Trigger {
            radius: 3.0,
            only_visible: false,
            ..Trigger::default()
        });
        let tank = world
            .spawn_vehicle(Vec2::new(800.0, 500.0), Vec2::X, pilot(1, false))
            .unwrap();

        world.step_trigger(trigger);
        assert_eq!(recorder.count("enter"), 0);

        world.move_body(tank, Vec2::new(550.0, 500.0), Vec2::X);
        world.step_trigger(trigger);
        world.step_trigger(trigger);
        assert_eq!(recorder.count("enter"), 1);
        assert_eq!(world.trigger(trigger).unwrap().occupant, Some(tank));
        assert_eq!(
            recorder.calls.borrow()[0].1,
            vec![ScriptArg::Entity(trigger), ScriptArg::Entity(tank)]
        );

        world.move_body(tank, Vec2::new(800.0, 500.0), Vec2::X);
        world.step_trigger(trigger);
        world.step_trigger(trigger);
        assert_eq!(recorder.count("leave"), 1);
        assert!(!world.trigger(trigger).unwrap().is_active());

        world.move_body(tank, Vec2::new(520.0, 500.0), Vec2::X);
        world.step_trigger(trigger);
        assert_eq!(recorder.count("enter"), 2);
    }

    #[test]
    fn test_radius_delta_keeps_occupant() {
        let (mut world, trigger, recorder) = setup(Trigger {
            radius: 2.0,
            radius_delta: 1.0,
            only_visible: false,
            ..Trigger::default()
        });
        let tank = world
            .spawn_vehicle(Vec2::new(550.0, 500.0), Vec2::X, pilot(0, true))
            .unwrap();
        world.step_trigger(trigger);
        // Outside 2 cells but inside 3
        world.move_body(tank, Vec2::new(580.0, 500.0), Vec2::X);
        world.step_trigger(trigger);
        assert_eq!(recorder.count("leave"), 0);
        assert!(world.trigger(trigger).unwrap().is_active());
    }

    #[test]
    fn test_nearest_wins_and_no_preemption() {
        let (mut world, trigger, _) = setup(Trigger {
            radius: 4.0,
            only_visible: false,
            ..Trigger::default()
        });
        let far = world
            .spawn_vehicle(Vec2::new(590.0, 500.0), Vec2::X, pilot(0, false))
            .unwrap();
        let near = world
            .spawn_vehicle(Vec2::new(500.0, 560.0), Vec2::X, pilot(0, false))
            .unwrap();
        world.step_trigger(trigger);
        assert_eq!(world.trigger(trigger).unwrap().occupant, Some(near));

        world.move_body(far, Vec2::new(505.0, 500.0), Vec2::X);
        world.step_trigger(trigger);
        assert_eq!(world.trigger(trigger).unwrap().occupant, Some(near));
    }

    #[test]
    fn test_filters() {
        let (mut world, trigger, recorder) = setup(Trigger {
            radius: 3.0,
            team: 2,
            only_human: true,
            only_visible: false,
            ..Trigger::default()
        });
        world
            .spawn_vehicle(Vec2::new(520.0, 500.0), Vec2::X, None)
            .unwrap();
        world
            .spawn_vehicle(Vec2::new(500.0, 520.0), Vec2::X, pilot(1, true))
            .unwrap();
        world
            .spawn_vehicle(Vec2::new(480.0, 500.0), Vec2::X, pilot(2, false))
            .unwrap();
        world.step_trigger(trigger);
        assert_eq!(recorder.count("enter"), 0);

        let ok = world
            .spawn_vehicle(Vec2::new(500.0, 440.0), Vec2::X, pilot(2, true))
            .unwrap();
        world.step_trigger(trigger);
        assert_eq!(world.trigger(trigger).unwrap().occupant, Some(ok));
    }

    #[test]
    fn test_wall_blocks_visibility() {
        let (mut world, trigger, recorder) = setup(Trigger {
            radius: 4.0,
            ..Trigger::default()
        });
        world
            .spawn_wall(Vec2::new(550.0, 500.0), Vec2::new(16.0, 96.0), WallKind::Concrete)
            .unwrap();
        let tank = world
            .spawn_vehicle(Vec2::new(600.0, 500.0), Vec2::X, pilot(0, false))
            .unwrap();
        world.step_trigger(trigger);
        assert_eq!(recorder.count("enter"), 0);

        // Sitting on the trigger needs no line of sight
        world.move_body(tank, Vec2::new(510.0, 500.0), Vec2::X);
        world.step_trigger(trigger);
        assert_eq!(recorder.count("enter"), 1);
    }

    #[test]
    fn test_disable_or_death_releases() {
        let (mut world, trigger, recorder) = setup(Trigger {
            radius: 3.0,
            only_visible: false,
            ..Trigger::default()
        });
        let tank = world
            .spawn_vehicle(Vec2::new(520.0, 500.0), Vec2::X, pilot(0, false))
            .unwrap();
        world.step_trigger(trigger);
        world.trigger_mut(trigger).unwrap().enabled = false;
        world.step_trigger(trigger);
        assert_eq!(recorder.count("leave"), 1);
        world.step_trigger(trigger);
        assert_eq!(recorder.count("enter"), 1);

        world.trigger_mut(trigger).unwrap().enabled = true;
        world.step_trigger(trigger);
        assert_eq!(recorder.count("enter"), 2);
        world.kill(tank);
        world.step_trigger(trigger);
        assert_eq!(recorder.count("leave"), 2);
        assert!(!world.trigger(trigger).unwrap().is_active());
    }
}
