//! Pickups: health, mines, shields and shocks
//!
//! A visible pickup with no owner attaches to the first live vehicle inside
//! its radius. Attached pickups ride on their owner until they are used up,
//! expire or the owner dies. Map-placed pickups go back to where they were
//! placed and reappear after their respawn time; dropped ones are removed.
//!
//! A shock waits a moment after attaching, then strikes the nearest vehicle
//! its carrier can see. With nobody in sight it strikes the carrier instead.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityKind, ObjectType};
use super::explosion::ExplosionKind;
use super::hooks::{ParticleKind, ScriptArg, Sound};
use super::notify::{DamageDesc, Handler, NotifyKind, NotifyParam, Subscription};
use super::world::World;
use crate::consts::{CELL_SIZE, PICKUP_RADIUS, PROTECT_TIME};
use crate::error::SimError;
use crate::polar_to_cartesian;

pub const DEFAULT_RESPAWN_TIME: f32 = 30.0;
/// Shields blink for this long before they run out
const SHIELD_WARNING: f32 = 2.0;
/// Absorbed hits above this always flare the shield
const SHIELD_HIT_DAMAGE: f32 = 5.0;
const SHIELD_HIT_TIME: f32 = 0.2;
/// Delay between attaching a shock and its strike
pub const SHOCK_TIMEOUT: f32 = 1.5;
pub const SHOCK_DAMAGE: f32 = 1000.0;
pub const SHOCK_RANGE: f32 = 20.0 * CELL_SIZE;
/// Seconds the strike stays lit
const SHOCK_FADE: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupKind {
    Health,
    Mine,
    Shield,
    Shock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub kind: PickupKind,
    pub radius: f32,
    pub respawn_time: f32,
    /// Return to `home` and wait instead of being removed
    pub respawn: bool,
    pub home: Vec2,
    pub owner: Option<EntityId>,
    pub visible: bool,
    pub blinking: bool,
    /// Time since attaching, or since hiding while waiting to respawn
    pub time_attached: f32,
    pub time_animation: f32,
    /// Shield flare cooldown
    pub time_hit: f32,
    /// Shock already struck
    pub fired: bool,
    pub on_pickup: String,
}

impl Pickup {
    pub fn new(kind: PickupKind, home: Vec2, respawn: bool) -> Self {
        Self {
            kind,
            radius: PICKUP_RADIUS,
            respawn_time: DEFAULT_RESPAWN_TIME,
            respawn,
            home,
            owner: None,
            visible: true,
            blinking: false,
            time_attached: 0.0,
            time_animation: 0.0,
            time_hit: 0.0,
            fired: false,
            on_pickup: String::new(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.owner.is_some()
    }
}

impl World {
    pub fn spawn_pickup(&mut self, kind: PickupKind, pos: Vec2, respawn: bool) -> Result<EntityId, SimError> {
        self.spawn(pos, EntityKind::Pickup(Pickup::new(kind, pos, respawn)))
    }

    fn find_new_owner(&self, id: EntityId) -> Option<EntityId> {
        let (pos, pickup) = self
            .entity(id)
            .and_then(|e| e.kind.as_pickup().map(|p| (e.pos, p)))?;
        let rr = pickup.radius * pickup.radius;
        self.vehicles().find(|v| {
            let Some(entity) = self.entity(*v) else {
                return false;
            };
            if (entity.pos - pos).length_squared() >= rr {
                return false;
            }
            // Health is wasted on a healthy vehicle
            pickup.kind != PickupKind::Health
                || entity.kind.as_body().is_some_and(|b| b.health < b.max_health)
        })
    }

    fn attach_pickup(&mut self, id: EntityId, vehicle: EntityId) -> Result<(), SimError> {
        let (Some(pos), Some(kind)) = (self.pos(id), self.pickup(id).map(|p| p.kind)) else {
            return Ok(());
        };
        log::debug!("{kind:?} pickup {id} taken by {vehicle}");

        match kind {
            PickupKind::Mine => {
                self.spawn_explosion(ExplosionKind::Standard, pos, Some(vehicle))?;
                self.kill(id);
                return Ok(());
            }
            PickupKind::Shield => {
                if let Some(old) =
                    self.subscriber_of_type(vehicle, NotifyKind::DamageFilter, ObjectType::PickupShield)
                {
                    self.pickup_disappear(old);
                }
            }
            PickupKind::Health | PickupKind::Shock => {}
        }

        let Some(at) = self.pos(vehicle) else {
            return Ok(());
        };
        if let Some(p) = self.pickup_mut(id) {
            p.owner = Some(vehicle);
            p.time_attached = 0.0;
        }
        self.place(id, at);
        self.subscribe(
            vehicle,
            Subscription::new(NotifyKind::Move, id, Handler::FollowSender).persistent(),
        );
        self.subscribe(
            vehicle,
            Subscription::new(NotifyKind::Kill, id, Handler::PickupOwnerKilled),
        );

        match kind {
            PickupKind::Health => {
                if let Some(body) = self.body_mut(vehicle) {
                    body.health = body.max_health;
                }
                self.sound(Sound::Pickup, at);
                self.pickup_disappear(id);
            }
            PickupKind::Shield => {
                self.sound(Sound::Shield, at);
                self.subscribe(
                    vehicle,
                    Subscription::new(NotifyKind::DamageFilter, id, Handler::AbsorbDamage).persistent(),
                );
            }
            PickupKind::Shock => self.sound(Sound::ShockActivate, at),
            PickupKind::Mine => {}
        }
        Ok(())
    }

    fn detach_pickup(&mut self, id: EntityId) {
        let Some(owner) = self.pickup_mut(id).and_then(|p| {
            p.blinking = false;
            p.fired = false;
            p.time_hit = 0.0;
            p.owner.take()
        }) else {
            return;
        };
        self.unsubscribe(owner, id);
    }

    /// Drop from the owner and hide. Respawning pickups return home,
    /// others are removed.
    pub fn pickup_disappear(&mut self, id: EntityId) {
        self.detach_pickup(id);
        let Some(p) = self.pickup_mut(id) else {
            return;
        };
        if !p.visible {
            return;
        }
        p.visible = false;
        let (respawn, home) = (p.respawn, p.home);

        self.pulse_notify(id, NotifyKind::PickupDisappear, &mut NotifyParam::None);
        if !self.is_alive(id) {
            return;
        }
        if respawn {
            self.place(id, home);
            if let Some(p) = self.pickup_mut(id) {
                p.time_attached = 0.0;
            }
        } else {
            self.kill(id);
        }
    }

    fn respawn_pickup(&mut self, id: EntityId) {
        let Some(pos) = self.pos(id) else {
            return;
        };
        if let Some(p) = self.pickup_mut(id) {
            p.visible = true;
        }
        self.sound(Sound::Pickup, pos);
        for n in 0..50 {
            let dir = polar_to_cartesian(1.0, std::f32::consts::TAU * n as f32 / 50.0);
            self.particle(ParticleKind::Spark, pos + dir * 25.0, dir * 25.0);
        }
    }

    pub(crate) fn step_pickup(&mut self, id: EntityId, dt: f32) -> Result<(), SimError> {
        let Some(p) = self.pickup_mut(id) else {
            return Ok(());
        };
        p.time_attached += dt;
        let (attached, visible, time, respawn_time) =
            (p.is_attached(), p.visible, p.time_attached, p.respawn_time);

        if !attached {
            if !visible {
                if time > respawn_time {
                    self.respawn_pickup(id);
                }
            } else if let Some(vehicle) = self.find_new_owner(id) {
                let script = self.pickup(id).map(|p| p.on_pickup.clone()).unwrap_or_default();
                let who = self
                    .entity(vehicle)
                    .and_then(|e| e.name.clone())
                    .unwrap_or_default();
                self.attach_pickup(id, vehicle)?;
                self.run_script(&script, &[ScriptArg::Name(who)]);
            }
        }

        match self.pickup(id).map(|p| p.kind) {
            Some(PickupKind::Shield) => self.step_shield(id),
            Some(PickupKind::Shock) => self.step_shock(id)?,
            _ => {}
        }
        Ok(())
    }

    fn step_shield(&mut self, id: EntityId) {
        let Some(pos) = self.pos(id) else {
            return;
        };
        let Some(p) = self.pickup_mut(id).filter(|p| p.is_attached()) else {
            return;
        };
        if p.time_attached + SHIELD_WARNING > PROTECT_TIME && !p.blinking {
            p.blinking = true;
            log::debug!("shield {id} running out");
            self.sound(Sound::ShieldEnd, pos);
        }
        if self.pickup(id).is_some_and(|p| p.time_attached > PROTECT_TIME) {
            self.pickup_disappear(id);
        }
    }

    /// Flare where an absorbed hit landed on the carrier
    pub(crate) fn shield_hit(&mut self, id: EntityId, carrier: EntityId, desc: DamageDesc) {
        let Some(time_hit) = self.pickup(id).map(|p| p.time_hit) else {
            return;
        };
        let flare = desc.damage > SHIELD_HIT_DAMAGE || time_hit == 0.0 || self.fx_frand(4.0) < 1.0;
        let Some(pos) = self.pos(carrier).filter(|_| flare) else {
            return;
        };
        if let Some(p) = self.pickup_mut(id) {
            p.time_hit = SHIELD_HIT_TIME;
        }
        self.sound(Sound::ShieldHit, pos);

        let dir = (desc.hit - pos).normalize_or_zero();
        let side = Vec2::new(dir.y, -dir.x);
        let vel = self
            .body(carrier)
            .and_then(|b| b.motion)
            .map(|m| m.lv)
            .unwrap_or_default();
        for i in 0..7 {
            let offset = side * (i * 2) as f32;
            self.particle(ParticleKind::ShieldHit, pos + dir * 26.0 + offset, vel);
            self.particle(ParticleKind::ShieldHit, pos + dir * 26.0 - offset, vel);
        }
    }

    fn step_shock(&mut self, id: EntityId) -> Result<(), SimError> {
        let Some((pos, p)) = self
            .entity(id)
            .and_then(|e| e.kind.as_pickup().map(|p| (e.pos, p.clone())))
        else {
            return Ok(());
        };
        let Some(owner) = p.owner else {
            return Ok(());
        };

        if p.fired {
            let a = (p.time_attached - SHOCK_TIMEOUT) / SHOCK_FADE;
            if a > 1.0 {
                self.pickup_disappear(id);
            } else {
                self.light(id, 1.0 - a.powi(6));
            }
            return Ok(());
        }
        if p.time_attached < SHOCK_TIMEOUT {
            return Ok(());
        }

        match self.nearest_visible_vehicle(pos, owner) {
            Some(target) => {
                log::debug!("shock {id} strikes {target}");
                if let Some(p) = self.pickup_mut(id) {
                    p.fired = true;
                }
                self.light(id, 1.0);
                let at = self.pos(target).unwrap_or(pos);
                self.take_damage(target, SHOCK_DAMAGE, at, Some(owner))?;
            }
            None => {
                log::debug!("shock {id} found no target, striking its carrier");
                let at = self.pos(owner).unwrap_or(pos);
                self.take_damage(owner, SHOCK_DAMAGE, at, Some(owner))?;
                self.pickup_disappear(id);
            }
        }
        Ok(())
    }

    /// Closest live vehicle within shock range with nothing in between
    fn nearest_visible_vehicle(&self, pos: Vec2, ignore: EntityId) -> Option<EntityId> {
        let mut best = None;
        let mut best_dist = SHOCK_RANGE;
        for vehicle in self.vehicles() {
            if vehicle == ignore {
                continue;
            }
            let Some(at) = self.pos(vehicle) else {
                continue;
            };
            let dist = (at - pos).length();
            if dist < best_dist
                && self.trace(Some(ignore), pos, at - pos).map(|h| h.entity) == Some(vehicle)
            {
                best = Some(vehicle);
                best_dist = dist;
            }
        }
        best
    }

    pub(crate) fn float_pickup(&mut self, id: EntityId, dt: f32) {
        if let Some(p) = self.pickup_mut(id) {
            p.time_animation += dt;
            if p.is_attached() {
                p.time_hit = (p.time_hit - dt).max(0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{SIM_DT, VEHICLE_HEALTH};
    use crate::settings::SimSettings;
    use crate::sim::body::WallKind;
    use crate::sim::hooks::testing::{EffectLog, Recorder};

    fn world() -> World {
        World::new(&SimSettings::default())
    }

    #[test]
    fn test_health_heals_then_respawns() {
        let mut world = world();
        let tank = world
            .spawn_vehicle(Vec2::new(100.0, 100.0), Vec2::X, None)
            .unwrap();
        world.body_mut(tank).unwrap().health = 20.0;
        let pickup = world
            .spawn_pickup(PickupKind::Health, Vec2::new(110.0, 100.0), true)
            .unwrap();
        world.pickup_mut(pickup).unwrap().respawn_time = 0.5;

        world.step_pickup(pickup, SIM_DT).unwrap();
        assert_eq!(world.body(tank).unwrap().health, VEHICLE_HEALTH);
        let p = world.pickup(pickup).unwrap();
        assert!(!p.visible);
        assert!(!p.is_attached());
        assert_eq!(world.pos(pickup), Some(Vec2::new(110.0, 100.0)));
        assert!(!world.is_subscriber(tank, pickup));

        for _ in 0..70 {
            world.step_pickup(pickup, SIM_DT).unwrap();
        }
        assert!(world.pickup(pickup).unwrap().visible);
    }

    #[test]
    fn test_healthy_vehicle_ignores_health() {
        let mut world = world();
        world
            .spawn_vehicle(Vec2::new(100.0, 100.0), Vec2::X, None)
            .unwrap();
        let pickup = world
            .spawn_pickup(PickupKind::Health, Vec2::new(110.0, 100.0), false)
            .unwrap();
        world.step_pickup(pickup, SIM_DT).unwrap();
        assert!(world.pickup(pickup).unwrap().visible);
        assert!(world.is_alive(pickup));
    }

    #[test]
    fn test_mine_explodes_for_toucher() {
        let mut world = world();
        let tank = world
            .spawn_vehicle(Vec2::new(100.0, 100.0), Vec2::X, None)
            .unwrap();
        let mine = world
            .spawn_pickup(PickupKind::Mine, Vec2::new(100.0, 110.0), true)
            .unwrap();
        world.step_pickup(mine, SIM_DT).unwrap();
        assert!(!world.is_alive(mine));
        let boom = world
            .objects()
            .find(|id| world.object_type(*id) == Some(ObjectType::Explosion))
            .unwrap();
        assert_eq!(world.explosion(boom).unwrap().owner, Some(tank));
    }

    #[test]
    fn test_shield_absorbs_and_expires() {
        let mut world = world();
        let tank = world
            .spawn_vehicle(Vec2::new(100.0, 100.0), Vec2::X, None)
            .unwrap();
        let shield = world
            .spawn_pickup(PickupKind::Shield, Vec2::new(100.0, 100.0), false)
            .unwrap();
        world.step_pickup(shield, SIM_DT).unwrap();
        assert_eq!(world.pickup(shield).unwrap().owner, Some(tank));

        world.take_damage(tank, 80.0, Vec2::ZERO, None).unwrap();
        assert_eq!(world.body(tank).unwrap().health, VEHICLE_HEALTH);

        // Follows its owner around
        world.move_body(tank, Vec2::new(300.0, 100.0), Vec2::X);
        assert_eq!(world.pos(shield), Some(Vec2::new(300.0, 100.0)));

        let steps = (PROTECT_TIME / SIM_DT) as usize + 2;
        for _ in 0..steps {
            world.step_pickup(shield, SIM_DT).unwrap();
        }
        assert!(!world.is_alive(shield));
        world.take_damage(tank, 30.0, Vec2::ZERO, None).unwrap();
        assert!((world.body(tank).unwrap().health - (VEHICLE_HEALTH - 30.0)).abs() < 0.001);
    }

    #[test]
    fn test_second_shield_replaces_first() {
        let mut world = world();
        let tank = world
            .spawn_vehicle(Vec2::new(100.0, 100.0), Vec2::X, None)
            .unwrap();
        let first = world
            .spawn_pickup(PickupKind::Shield, Vec2::new(100.0, 100.0), false)
            .unwrap();
        world.step_pickup(first, SIM_DT).unwrap();
        let second = world
            .spawn_pickup(PickupKind::Shield, Vec2::new(500.0, 500.0), false)
            .unwrap();
        world.place(second, Vec2::new(100.0, 100.0));
        world.step_pickup(second, SIM_DT).unwrap();

        assert!(!world.is_alive(first));
        assert_eq!(world.pickup(second).unwrap().owner, Some(tank));
    }

    #[test]
    fn test_owner_death_drops_pickup_and_runs_script() {
        let mut world = world();
        let recorder = Recorder::default();
        world.set_scripts(Box::new(recorder.clone()));
        let tank = world
            .spawn_vehicle(Vec2::new(100.0, 100.0), Vec2::X, None)
            .unwrap();
        world.set_name(tank, Some("alpha"));
        let shield = world
            .spawn_pickup(PickupKind::Shield, Vec2::new(100.0, 100.0), true)
            .unwrap();
        world.pickup_mut(shield).unwrap().on_pickup = "got_shield".into();
        world.step_pickup(shield, SIM_DT).unwrap();

        let calls = recorder.calls.borrow().clone();
        assert_eq!(calls, vec![("got_shield".to_string(), vec![ScriptArg::Name("alpha".into())])]);

        world.kill(tank);
        let p = world.pickup(shield).unwrap();
        assert!(world.is_alive(shield));
        assert!(!p.visible);
        assert!(!p.is_attached());
    }

    #[test]
    fn test_shield_flares_on_hit_and_warns_before_expiry() {
        let mut world = world();
        let log = EffectLog::default();
        world.set_effects(Box::new(log.clone()));
        let tank = world
            .spawn_vehicle(Vec2::new(100.0, 100.0), Vec2::X, None)
            .unwrap();
        let shield = world
            .spawn_pickup(PickupKind::Shield, Vec2::new(100.0, 100.0), false)
            .unwrap();
        world.step_pickup(shield, SIM_DT).unwrap();
        assert_eq!(log.played(Sound::Shield), 1);

        world
            .take_damage(tank, 40.0, Vec2::new(120.0, 100.0), None)
            .unwrap();
        assert_eq!(log.played(Sound::ShieldHit), 1);
        assert_eq!(log.particles(ParticleKind::ShieldHit), 14);
        assert_eq!(world.pickup(shield).unwrap().time_hit, SHIELD_HIT_TIME);

        // Heavy hits flare even while the last flare is fresh
        world
            .take_damage(tank, 40.0, Vec2::new(80.0, 100.0), None)
            .unwrap();
        assert_eq!(log.played(Sound::ShieldHit), 2);

        world.float_pickup(shield, 0.5);
        assert_eq!(world.pickup(shield).unwrap().time_hit, 0.0);

        let steps = ((PROTECT_TIME - SHIELD_WARNING) / SIM_DT) as usize + 2;
        for _ in 0..steps {
            world.step_pickup(shield, SIM_DT).unwrap();
        }
        let p = world.pickup(shield).unwrap();
        assert!(p.blinking);
        assert!(p.is_attached());
        assert_eq!(log.played(Sound::ShieldEnd), 1);
    }

    #[test]
    fn test_shock_strikes_nearest_visible_vehicle() {
        let mut world = world();
        let log = EffectLog::default();
        world.set_effects(Box::new(log.clone()));
        let carrier = world
            .spawn_vehicle(Vec2::new(100.0, 100.0), Vec2::X, None)
            .unwrap();
        let near = world
            .spawn_vehicle(Vec2::new(250.0, 100.0), Vec2::X, None)
            .unwrap();
        let far = world
            .spawn_vehicle(Vec2::new(100.0, 400.0), Vec2::X, None)
            .unwrap();
        let shock = world
            .spawn_pickup(PickupKind::Shock, Vec2::new(100.0, 100.0), false)
            .unwrap();
        world.step_pickup(shock, SIM_DT).unwrap();
        assert_eq!(world.pickup(shock).unwrap().owner, Some(carrier));
        assert_eq!(log.played(Sound::ShockActivate), 1);

        let steps = (SHOCK_TIMEOUT / SIM_DT) as usize + 2;
        for _ in 0..steps {
            world.step_pickup(shock, SIM_DT).unwrap();
        }
        assert!(!world.is_alive(near));
        assert_eq!(world.body(far).unwrap().health, VEHICLE_HEALTH);
        assert_eq!(world.body(carrier).unwrap().health, VEHICLE_HEALTH);
        assert!(world.pickup(shock).unwrap().fired);

        // The strike fades out, then the shock is used up
        let fade = (SHOCK_FADE / SIM_DT) as usize + 2;
        for _ in 0..fade {
            world.step_pickup(shock, SIM_DT).unwrap();
        }
        assert!(!world.is_alive(shock));
        assert!(world.is_alive(carrier));
    }

    #[test]
    fn test_shock_without_target_strikes_carrier() {
        let mut world = world();
        let carrier = world
            .spawn_vehicle(Vec2::new(100.0, 100.0), Vec2::X, None)
            .unwrap();
        // Out of sight behind concrete
        world
            .spawn_wall(Vec2::new(200.0, 100.0), Vec2::new(32.0, 200.0), WallKind::Concrete)
            .unwrap();
        world
            .spawn_vehicle(Vec2::new(300.0, 100.0), Vec2::X, None)
            .unwrap();
        let shock = world
            .spawn_pickup(PickupKind::Shock, Vec2::new(100.0, 100.0), true)
            .unwrap();

        let steps = (SHOCK_TIMEOUT / SIM_DT) as usize + 3;
        for _ in 0..steps {
            world.step_pickup(shock, SIM_DT).unwrap();
        }
        assert!(!world.is_alive(carrier));
        let p = world.pickup(shock).unwrap();
        assert!(!p.visible);
        assert!(!p.is_attached());
        assert!(!p.fired);
        assert_eq!(world.pos(shock), Some(Vec2::new(100.0, 100.0)));
    }
}
