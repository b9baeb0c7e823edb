//! Projectiles and continuous collision
//!
//! Projectiles are points moving along a straight segment each fixed step.
//! The segment is traced against the rigid body grid; on a hit the projectile
//! resolves damage and impulse, lets its weapon decide whether it survives,
//! and if it does, keeps flying for the rest of the step from the hit point.
//!
//! Rockets and BFG cores home in on a vehicle. A BFG core also drains every
//! vehicle it passes close to.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::body::VEHICLE_MAX_SPEED;
use super::collision::reflect_velocity;
use super::entity::{EntityId, EntityKind};
use super::explosion::ExplosionKind;
use super::grid::TraceHit;
use super::hooks::{ParticleKind, Sound};
use super::notify::{Handler, NotifyKind, Subscription};
use super::world::World;
use crate::consts::*;
use crate::error::SimError;
use crate::{cartesian_to_polar, polar_to_cartesian};

/// Remaining step time below which a surviving projectile stops for this tick
const MIN_STEP: f32 = 1e-3;
/// Hits resolved per projectile per fixed step
const MAX_HITS_PER_STEP: usize = 32;
const FIRE_SPARK_RADIUS: f32 = 12.0;
/// Advanced rockets lock onto vehicles within roughly 20 degrees
const ROCKET_LOCK_COS: f32 = 0.94;
/// BFG cores lock onto vehicles within roughly 30 degrees
const BFG_LOCK_COS: f32 = 0.87;
/// A BFG core looks for a better target this often
const BFG_RETARGET_TIME: f32 = 1.0 / 25.0;

/// Weapon that fired a projectile, with per-weapon state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Weapon {
    Rocket {
        target: Option<EntityId>,
        homing_time: f32,
    },
    Bullet,
    TankShell,
    PlasmaClod,
    AcBullet,
    GaussRay,
    Disk,
    FireSpark {
        time: f32,
        life: f32,
        heal_owner: bool,
        set_fire: bool,
    },
    BfgCore {
        target: Option<EntityId>,
        /// Time since the last retarget
        time: f32,
    },
}

impl Weapon {
    pub fn rocket() -> Self {
        Weapon::Rocket {
            target: None,
            homing_time: 0.0,
        }
    }

    pub fn fire_spark() -> Self {
        Weapon::FireSpark {
            time: 0.0,
            life: 1.0,
            heal_owner: false,
            set_fire: true,
        }
    }

    pub fn bfg_core() -> Self {
        Weapon::BfgCore {
            target: None,
            time: 0.0,
        }
    }

    /// Muzzle speed
    pub fn speed(&self) -> f32 {
        match self {
            Weapon::Rocket { .. } => SPEED_ROCKET,
            Weapon::Bullet => SPEED_BULLET,
            Weapon::TankShell => SPEED_TANK_SHELL,
            Weapon::PlasmaClod => SPEED_PLASMA,
            Weapon::AcBullet => SPEED_AC_BULLET,
            Weapon::GaussRay => SPEED_GAUSS,
            Weapon::Disk => SPEED_DISK,
            Weapon::FireSpark { .. } => SPEED_FIRE,
            Weapon::BfgCore { .. } => SPEED_BFGCORE,
        }
    }

    fn trail_density(&self) -> f32 {
        match self {
            Weapon::Rocket { .. } => 1.5,
            Weapon::PlasmaClod => 4.0,
            Weapon::GaussRay => 16.0,
            Weapon::FireSpark { .. } => 4.5,
            Weapon::BfgCore { .. } => 2.5,
            Weapon::Bullet | Weapon::TankShell | Weapon::AcBullet | Weapon::Disk => 5.0,
        }
    }

    fn trail_particle(&self) -> ParticleKind {
        match self {
            Weapon::Rocket { .. } | Weapon::FireSpark { .. } => ParticleKind::Fire,
            Weapon::PlasmaClod => ParticleKind::Plasma,
            Weapon::GaussRay => ParticleKind::GaussTrail,
            Weapon::Disk => ParticleKind::DiskTrail,
            Weapon::BfgCore { .. } => ParticleKind::Bfg,
            Weapon::Bullet | Weapon::TankShell | Weapon::AcBullet => ParticleKind::Spark,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub weapon: Weapon,
    /// Unit direction of flight
    pub dir: Vec2,
    pub speed: f32,
    pub owner: Option<EntityId>,
    /// Skipped by the next trace
    pub last_hit: Option<EntityId>,
    pub hit_damage: f32,
    pub hit_impulse: f32,
    pub trail_density: f32,
    /// Distance left before the next trail particle
    pub trail_path: f32,
    pub ignore_owner: bool,
    pub advanced: bool,
    pub trail: bool,
}

impl Projectile {
    pub fn velocity(&self) -> Vec2 {
        self.dir * self.speed
    }

    pub fn homing_target(&self) -> Option<EntityId> {
        match self.weapon {
            Weapon::Rocket { target, .. } | Weapon::BfgCore { target, .. } => target,
            _ => None,
        }
    }
}

/// Point where a shot at `speed` from `origin` meets a target moving at `target_vel`
pub fn lead_target(origin: Vec2, speed: f32, target: Vec2, target_vel: Vec2) -> Vec2 {
    let d = target - origin;
    let a = target_vel.length_squared() - speed * speed;
    let b = 2.0 * d.dot(target_vel);
    let c = d.length_squared();

    let t = if a.abs() < 1e-6 {
        if b < 0.0 { -c / b } else { 0.0 }
    } else {
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            0.0
        } else {
            let root = disc.sqrt();
            let (t1, t2) = ((-b - root) / (2.0 * a), (-b + root) / (2.0 * a));
            match (t1 > 0.0, t2 > 0.0) {
                (true, true) => t1.min(t2),
                (true, false) => t1,
                (false, true) => t2,
                (false, false) => 0.0,
            }
        }
    };
    target + target_vel * t
}

/// Bend `dir` toward the lead point on a moving target. `gain` is the
/// sideways acceleration at full speed.
fn home_in(pos: Vec2, dir: Vec2, speed: f32, at: Vec2, vel: Vec2, gain: f32, dt: f32) -> Vec2 {
    let a = lead_target(pos, speed, at, vel) - pos;
    let side = a - dir;
    let dv = side - dir * dir.dot(side);
    let ldv = dv.length();
    if ldv <= 0.0 || speed <= 0.0 {
        return dir;
    }
    let dv = dv / (ldv * speed) * gain;
    (dir + dv * dt).try_normalize().unwrap_or(dir)
}

impl World {
    /// Launch a projectile. `velocity` gives both direction and speed.
    pub fn spawn_projectile(
        &mut self,
        weapon: Weapon,
        pos: Vec2,
        velocity: Vec2,
        owner: Option<EntityId>,
        advanced: bool,
    ) -> Result<EntityId, SimError> {
        let density = weapon.trail_density();
        let mut p = Projectile {
            weapon,
            dir: velocity.try_normalize().unwrap_or(Vec2::X),
            speed: velocity.length(),
            owner,
            last_hit: None,
            hit_damage: 0.0,
            hit_impulse: 0.0,
            trail_density: density,
            trail_path: self.net_frand(density),
            ignore_owner: true,
            advanced,
            trail: true,
        };

        match weapon {
            Weapon::Rocket { .. } => p.hit_impulse = 15.0,
            Weapon::Bullet => {
                p.hit_damage = if advanced { DAMAGE_BULLET * 2.0 } else { DAMAGE_BULLET };
                p.hit_impulse = 5.0;
            }
            Weapon::TankShell => {
                p.hit_damage = DAMAGE_TANK_SHELL;
                p.hit_impulse = 100.0;
            }
            Weapon::PlasmaClod => p.hit_damage = DAMAGE_PLASMA,
            Weapon::AcBullet => {
                p.hit_damage = DAMAGE_AC_BULLET;
                p.hit_impulse = 20.0;
            }
            Weapon::GaussRay => {
                p.hit_damage = DAMAGE_GAUSS;
                p.hit_impulse = 100.0;
            }
            Weapon::Disk => {
                let scale = if advanced { 2.0 } else { 1.0 };
                p.hit_damage =
                    self.net_frand(DAMAGE_DISK_MAX - DAMAGE_DISK_MIN) + DAMAGE_DISK_MIN * scale;
                p.hit_impulse = p.hit_damage / DAMAGE_DISK_MAX * 20.0;
            }
            Weapon::FireSpark { .. } => p.hit_damage = DAMAGE_FIRE_HIT,
            Weapon::BfgCore { .. } => p.hit_damage = DAMAGE_BFGCORE,
        }

        match &mut p.weapon {
            Weapon::Rocket { target, .. } if advanced => {
                *target = self.acquire_target(pos, p.dir, p.speed, owner, ROCKET_LOCK_COS);
            }
            Weapon::BfgCore { target, .. } => {
                *target = self.acquire_target(pos, p.dir, p.speed, owner, BFG_LOCK_COS);
                self.sound(Sound::BfgFire, pos);
            }
            _ => {}
        }

        self.spawn(pos, EntityKind::Projectile(p))
    }

    /// Vehicle in clear view closest to the line of flight, if its lead point
    /// is within the cone given by `lock_cos`
    fn acquire_target(
        &self,
        pos: Vec2,
        dir: Vec2,
        speed: f32,
        owner: Option<EntityId>,
        lock_cos: f32,
    ) -> Option<EntityId> {
        let mut best = None;
        let mut best_cos = 0.0;
        for vehicle in self.vehicles() {
            if Some(vehicle) == owner {
                continue;
            }
            let Some(at) = self.pos(vehicle) else {
                continue;
            };
            if self.trace(owner, pos, at - pos).map(|h| h.entity) != Some(vehicle) {
                continue;
            }
            let vel = self.body(vehicle).and_then(|b| b.motion).map(|m| m.lv).unwrap_or_default();
            let a = lead_target(pos, speed, at, vel) - pos;
            let cos = a.dot(dir) / a.length();
            if cos > best_cos {
                best_cos = cos;
                best = Some(vehicle);
            }
        }
        best.filter(|_| best_cos > lock_cos)
    }

    pub(crate) fn step_projectile(&mut self, id: EntityId, dt: f32) -> Result<(), SimError> {
        let Some(weapon) = self.projectile(id).map(|p| p.weapon) else {
            return Ok(());
        };
        match weapon {
            Weapon::Rocket { .. } => self.steer_rocket(id, dt),
            Weapon::FireSpark { .. } => {
                self.burn_nearby(id, dt)?;
                if !self.is_alive(id) {
                    return Ok(());
                }
            }
            Weapon::BfgCore { .. } => {
                self.bfg_drain(id, dt)?;
                if !self.is_alive(id) {
                    return Ok(());
                }
                self.steer_bfg(id, dt);
            }
            _ => {}
        }

        self.advance_projectile(id, dt)?;

        if matches!(weapon, Weapon::FireSpark { .. }) && self.is_alive(id) {
            self.slow_fire_spark(id, dt);
        }
        Ok(())
    }

    /// Move through one step, resolving every hit on the way. Returns the
    /// part of `dt` left unused when the projectile stops short.
    fn advance_projectile(&mut self, id: EntityId, dt: f32) -> Result<f32, SimError> {
        let mut dt = dt;
        for _ in 0..MAX_HITS_PER_STEP {
            let Some((pos, p)) = self
                .entity(id)
                .and_then(|e| e.kind.as_projectile().map(|p| (e.pos, p.clone())))
            else {
                return Ok(0.0);
            };
            let dx = p.velocity() * dt;
            let ignore = p.last_hit.or(p.owner.filter(|_| p.ignore_owner));
            let hit = self.trace(ignore, pos, dx);

            if let Some(last) = p.last_hit {
                self.unsubscribe(last, id);
                if let Some(p) = self.projectile_mut(id) {
                    p.last_hit = None;
                }
            }

            let Some(hit) = hit else {
                self.move_projectile(id, pos + dx, p.trail);
                let size = self.size();
                let to = pos + dx;
                if to.x < 0.0 || to.x > size.x || to.y < 0.0 || to.y > size.y {
                    self.kill(id);
                }
                return Ok(0.0);
            };

            if self.projectile_hit(id, &hit)? {
                self.kill(id);
                return Ok(0.0);
            }
            if !self.is_alive(id) {
                return Ok(0.0);
            }

            let total = dx.length();
            let travelled = (hit.point - pos).length();
            let remaining = if total > 0.0 {
                dt * (1.0 - travelled / total)
            } else {
                0.0
            };
            self.move_projectile(id, hit.point, p.trail);
            if remaining <= MIN_STEP {
                return Ok(remaining);
            }
            dt = remaining;
        }
        log::debug!("projectile {id} hit limit reached, resuming next step");
        Ok(dt)
    }

    /// Move to `to`, dropping trail particles along the way
    fn move_projectile(&mut self, id: EntityId, to: Vec2, trail: bool) {
        let Some(from) = self.pos(id) else {
            return;
        };
        if trail {
            let path = to - from;
            let len = path.length();
            if len > 0.0 {
                let e = path / len;
                loop {
                    let Some(p) = self.projectile(id) else {
                        return;
                    };
                    if p.trail_path >= len || p.trail_density <= 0.0 {
                        break;
                    }
                    let at = from + e * p.trail_path;
                    self.trail_particle(id, at);
                    if let Some(p) = self.projectile_mut(id) {
                        p.trail_path += p.trail_density;
                    }
                }
                if let Some(p) = self.projectile_mut(id) {
                    p.trail_path -= len;
                }
            }
        } else if let Some(density) = self.projectile(id).map(|p| p.trail_density) {
            let path = self.net_frand(density);
            if let Some(p) = self.projectile_mut(id) {
                p.trail_path = path;
            }
        }
        self.place(id, to);
    }

    fn trail_particle(&mut self, id: EntityId, at: Vec2) {
        let Some((weapon, dir, speed)) = self.projectile(id).map(|p| (p.weapon, p.dir, p.speed)) else {
            return;
        };
        let (at, vel) = match weapon {
            Weapon::Rocket { .. } => (at, dir * (speed * 0.3)),
            Weapon::FireSpark { .. } => (at, dir * (speed / 3.0)),
            Weapon::BfgCore { .. } => {
                let spread = self.fx_frand(BFG_RADIUS);
                (at + self.fx_vrand(spread), self.fx_vrand(7.0))
            }
            _ => (at, Vec2::ZERO),
        };
        self.particle(weapon.trail_particle(), at, vel);

        // Sparks wander a little with every particle they shed
        if let Weapon::FireSpark { .. } = weapon {
            let wobble = self.net_frand(0.06) - 0.03;
            let turned = (dir + Vec2::new(dir.y, -dir.x) * wobble)
                .try_normalize()
                .unwrap_or(dir);
            if let Some(p) = self.projectile_mut(id) {
                p.dir = turned;
            }
        }
    }

    /// Impulse, damage and the weapon's reaction. Returns true if consumed.
    fn projectile_hit(&mut self, id: EntityId, hit: &TraceHit) -> Result<bool, SimError> {
        let target = hit.entity;
        self.add_ref(target);
        let outcome = self.resolve_hit(id, hit);
        self.release(target);
        outcome
    }

    fn resolve_hit(&mut self, id: EntityId, hit: &TraceHit) -> Result<bool, SimError> {
        let target = hit.entity;
        let Some(p) = self.projectile(id).cloned() else {
            return Ok(true);
        };

        if self.body(target).is_some_and(|b| b.is_dynamic()) {
            self.apply_impulse(target, p.dir * p.hit_impulse, hit.point);
        }
        let damage = self.filter_damage(&p, target, p.hit_damage);
        if damage >= 0.0 {
            self.take_damage(target, damage, hit.point, p.owner)?;
        } else {
            self.heal(target, -damage);
        }

        let consumed = self.on_hit(id, target, hit.point, hit.normal)?;

        if self.is_alive(id) && self.is_alive(target) {
            if let Some(p) = self.projectile_mut(id) {
                p.last_hit = Some(target);
            }
            self.subscribe(
                target,
                Subscription::new(NotifyKind::Kill, id, Handler::ClearLastHit),
            );
        }
        Ok(consumed)
    }

    fn filter_damage(&self, p: &Projectile, target: EntityId, damage: f32) -> f32 {
        if !p.advanced || p.owner != Some(target) {
            return damage;
        }
        match p.weapon {
            Weapon::Disk => damage / 2.0,
            Weapon::FireSpark { heal_owner, .. } => {
                if heal_owner {
                    -damage
                } else {
                    0.0
                }
            }
            _ => damage,
        }
    }

    fn spark_burst(&mut self, kind: ParticleKind, at: Vec2, normal: Vec2, spread: f32, count: usize, speed: f32) {
        let (_, a) = cartesian_to_polar(normal);
        for _ in 0..count {
            let angle = a - spread + self.fx_frand(spread * 2.0);
            let v = self.fx_frand(speed) + speed * 0.5;
            self.particle(kind, at, polar_to_cartesian(v, angle));
        }
    }

    fn on_hit(&mut self, id: EntityId, target: EntityId, at: Vec2, normal: Vec2) -> Result<bool, SimError> {
        let Some(p) = self.projectile(id).cloned() else {
            return Ok(true);
        };
        match p.weapon {
            Weapon::Rocket { .. } => {
                let boom = self.spawn_explosion(ExplosionKind::Standard, at + normal, p.owner)?;
                if let Some(e) = self.explosion_mut(boom) {
                    e.damage = DAMAGE_ROCKET;
                }
                self.sound(Sound::RocketHit, at);
                Ok(true)
            }
            Weapon::Bullet => {
                self.spark_burst(ParticleKind::Spark, at, normal, 1.4, 7, 50.0);
                self.flash(at, 50.0, 0.5, 0.3);
                Ok(true)
            }
            Weapon::TankShell => {
                if p.advanced {
                    let size = self.size();
                    let pos = (at + normal).clamp(Vec2::ZERO, size - Vec2::ONE);
                    let boom = self.spawn_explosion(ExplosionKind::Big, pos, p.owner)?;
                    if let Some(e) = self.explosion_mut(boom) {
                        e.time_boom = 0.05;
                    }
                } else {
                    self.spark_burst(ParticleKind::Spark, at, normal, 1.4, 9, 100.0);
                    self.flash(at, 80.0, 1.5, 0.3);
                    self.sound(Sound::BulletHit, at);
                }
                Ok(true)
            }
            Weapon::PlasmaClod => {
                if p.advanced && self.is_alive(target) {
                    self.spawn_health_daemon(target, p.owner, 15.0, 2.0)?;
                }
                self.spark_burst(ParticleKind::Plasma, at, normal, 1.5, 15, 100.0);
                self.flash(at, 90.0, 1.5, 0.4);
                self.sound(Sound::PlasmaHit, at);
                Ok(true)
            }
            Weapon::AcBullet => {
                self.sound(Sound::BulletHit, at);
                self.spark_burst(ParticleKind::Spark, at, normal, 1.0, 12, 300.0);
                self.flash(at + normal * 5.0, 80.0, 1.5, 0.1);
                Ok(true)
            }
            Weapon::GaussRay => {
                self.particle(ParticleKind::GaussTrail, at, Vec2::ZERO);
                let fade = if p.advanced { DAMAGE_GAUSS_FADE / 4.0 } else { DAMAGE_GAUSS_FADE };
                let Some(p) = self.projectile_mut(id) else {
                    return Ok(true);
                };
                p.hit_damage -= fade;
                p.hit_impulse = p.hit_damage / DAMAGE_GAUSS * 100.0;
                Ok(p.hit_damage <= 0.0)
            }
            Weapon::Disk => self.disk_ricochet(id, &p, at, normal),
            Weapon::FireSpark { .. } => {
                self.fire_spark_bounce(id, target, normal);
                Ok(false)
            }
            Weapon::BfgCore { .. } => {
                self.spark_burst(ParticleKind::Bfg, at, normal, 1.4, 64, 100.0);
                self.particle(ParticleKind::Blast, at, Vec2::ZERO);
                self.flash(at, BFG_RADIUS * 3.0, 1.5, 0.5);
                self.sound(Sound::BfgFlash, at);
                Ok(true)
            }
        }
    }

    fn disk_ricochet(&mut self, id: EntityId, p: &Projectile, at: Vec2, normal: Vec2) -> Result<bool, SimError> {
        let damage = p.hit_damage - DAMAGE_DISK_FADE;
        if let Some(disk) = self.projectile_mut(id) {
            disk.ignore_owner = false;
            disk.dir = reflect_velocity(p.dir, normal);
            disk.hit_damage = damage;
            disk.hit_impulse = damage / DAMAGE_DISK_MAX * 20.0;
        }
        self.spark_burst(ParticleKind::Spark, at, normal, 1.0, 11, 100.0);

        let (_, a) = cartesian_to_polar(normal);
        if damage <= 0.0 {
            self.fragments(at, a, std::f32::consts::FRAC_PI_3, 14, p.owner, p.advanced)?;
            self.flash(at, 100.0, 1.5, 0.2);
            self.sound(Sound::BulletHit, at);
            return Ok(true);
        }

        self.sound(Sound::DiskHit, at);
        if p.advanced {
            self.fragments(at, a, std::f32::consts::FRAC_PI_4, 11, p.owner, true)?;
        }
        self.flash(at + normal * 5.0, 70.0, 1.5, 0.1);
        Ok(false)
    }

    /// Fan of bullets around angle `a`
    fn fragments(
        &mut self,
        at: Vec2,
        a: f32,
        spread: f32,
        count: usize,
        owner: Option<EntityId>,
        advanced: bool,
    ) -> Result<(), SimError> {
        for _ in 0..count {
            let angle = a - spread + self.net_frand(spread * 2.0);
            let speed = self.net_frand(2000.0) + 3000.0;
            let bullet = self.spawn_projectile(
                Weapon::Bullet,
                at,
                polar_to_cartesian(speed, angle),
                owner,
                advanced,
            )?;
            if let Some(b) = self.projectile_mut(bullet) {
                b.ignore_owner = false;
            }
        }
        Ok(())
    }

    fn fire_spark_bounce(&mut self, id: EntityId, target: EntityId, normal: Vec2) {
        let Some(p) = self.projectile(id).cloned() else {
            return;
        };
        let mut nn = Vec2::new(normal.y, -normal.x);
        if p.dir.dot(nn) < self.net_frand(0.6) - 0.3 {
            nn = -nn;
        }
        let vdotn = p.dir.dot(normal);
        let up = (0.5 - 0.6 * self.net_frand(vdotn)).powi(16);
        let dir = (nn + normal * up).try_normalize().unwrap_or(nn);

        let set_fire = matches!(p.weapon, Weapon::FireSpark { set_fire: true, .. });
        let ignite = p.advanced
            && self.is_alive(target)
            && p.owner != Some(target)
            && self.net_rand() & 1 != 0
            && set_fire;

        if let Some(spark) = self.projectile_mut(id) {
            spark.ignore_owner = false;
            spark.dir = dir;
            spark.speed *= 0.9 / (1.0 + up * 4.0);
        }
        if ignite && let Err(err) = self.spawn_health_daemon(target, p.owner, 10.0, 3.0) {
            log::warn!("fire spark {id} could not ignite {target}: {err}");
        }
    }

    fn steer_rocket(&mut self, id: EntityId, dt: f32) {
        let Some((pos, p)) = self
            .entity(id)
            .and_then(|e| e.kind.as_projectile().map(|p| (e.pos, p.clone())))
        else {
            return;
        };
        let Weapon::Rocket { target, homing_time } = p.weapon else {
            return;
        };
        let homing_time = homing_time + dt;
        let mut target = target;
        let mut dir = p.dir;

        if let Some(t) = target {
            match self.target_motion(t) {
                Some((at, vel)) if homing_time <= ROCKET_HOMING_TIME => {
                    dir = home_in(pos, dir, p.speed, at, vel, ROCKET_HOMING_FACTOR, dt);
                }
                _ => target = None,
            }
        }

        if let Some(p) = self.projectile_mut(id) {
            p.weapon = Weapon::Rocket { target, homing_time };
            p.dir = dir;
        }
    }

    /// Position and velocity of a live homing target
    fn target_motion(&self, target: EntityId) -> Option<(Vec2, Vec2)> {
        let entity = self.entity(target).filter(|e| !e.is_killed())?;
        let vel = entity
            .kind
            .as_body()
            .and_then(|b| b.motion)
            .map(|m| m.lv)
            .unwrap_or_default();
        Some((entity.pos, vel))
    }

    /// Retarget now and then, and drain every vehicle near a BFG core
    fn bfg_drain(&mut self, id: EntityId, dt: f32) -> Result<(), SimError> {
        let Some((pos, p)) = self
            .entity(id)
            .and_then(|e| e.kind.as_projectile().map(|p| (e.pos, p.clone())))
        else {
            return Ok(());
        };
        let Weapon::BfgCore { mut target, mut time } = p.weapon else {
            return Ok(());
        };
        time += dt;
        if time >= BFG_RETARGET_TIME {
            time -= BFG_RETARGET_TIME;
            target = self
                .acquire_target(pos, p.dir, p.speed, p.owner, BFG_LOCK_COS)
                .or(target);
        }
        if let Some(core) = self.projectile_mut(id) {
            core.weapon = Weapon::BfgCore { target, time };
        }

        let vehicles: Vec<EntityId> = self.vehicles().collect();
        for vehicle in vehicles {
            if p.advanced && p.owner == Some(vehicle) {
                continue;
            }
            let Some((at, vel)) = self.target_motion(vehicle) else {
                continue;
            };
            let falloff = 1.0 - (pos - at).length() / BFG_RADIUS;
            let damage = falloff * (vel.length() / SPEED_BFGCORE * 10.0 + 0.5);
            if damage <= 0.0 {
                continue;
            }
            let d = (pos - at).normalize_or_zero() + self.net_vrand(1.0);
            self.take_damage(vehicle, damage * DAMAGE_BFGCORE * dt, at + d, p.owner)?;
        }
        Ok(())
    }

    /// Turn toward the target, harder the faster it moves
    fn steer_bfg(&mut self, id: EntityId, dt: f32) {
        let Some((pos, p)) = self
            .entity(id)
            .and_then(|e| e.kind.as_projectile().map(|p| (e.pos, p.clone())))
        else {
            return;
        };
        let Weapon::BfgCore { target: Some(t), time } = p.weapon else {
            return;
        };
        let Some((at, vel)) = self.target_motion(t) else {
            if let Some(core) = self.projectile_mut(id) {
                core.weapon = Weapon::BfgCore { target: None, time };
            }
            return;
        };
        let boost = if p.advanced { 1.0 } else { 0.0 };
        let gain = (3.0 * vel.length() / VEHICLE_MAX_SPEED + boost) * BFG_HOMING_FACTOR;
        let dir = home_in(pos, p.dir, p.speed, at, vel, gain, dt);
        if let Some(core) = self.projectile_mut(id) {
            core.dir = dir;
        }
    }

    /// Fire sparks scorch every body near them, before moving
    fn burn_nearby(&mut self, id: EntityId, dt: f32) -> Result<(), SimError> {
        let Some((pos, p)) = self
            .entity(id)
            .and_then(|e| e.kind.as_projectile().map(|p| (e.pos, p.clone())))
        else {
            return Ok(());
        };
        let Weapon::FireSpark { time, life, heal_owner, set_fire } = p.weapon else {
            return Ok(());
        };
        let reach = FIRE_SPARK_RADIUS * 1.5;

        for object in self.grid.collect_point(pos) {
            let Some(entity) = self.entity(object).filter(|e| !e.is_killed()) else {
                continue;
            };
            if entity.kind.as_body().is_none_or(|b| b.phantom) {
                continue;
            }
            let at = entity.pos;
            let dist = pos - at;
            let damage = (1.0 - dist.length() / reach) * DAMAGE_FIRE * dt;
            if damage <= 0.0 {
                continue;
            }
            if p.advanced && p.owner == Some(object) {
                if heal_owner {
                    self.heal(object, damage);
                }
            } else {
                let d = dist.normalize_or_zero() + self.net_vrand(1.0);
                self.take_damage(object, damage, at + d, p.owner)?;
            }
        }

        let time = time + dt;
        if let Some(p) = self.projectile_mut(id) {
            p.weapon = Weapon::FireSpark { time, life, heal_owner, set_fire };
        }
        if time > life {
            self.kill(id);
        }
        Ok(())
    }

    /// Exponential drag on fire sparks after they moved
    fn slow_fire_spark(&mut self, id: EntityId, dt: f32) {
        const DRAG: f32 = 1.5;
        let Some((pos, dir, speed)) = self
            .entity(id)
            .and_then(|e| e.kind.as_projectile().map(|p| (e.pos, p.dir, p.speed)))
        else {
            return;
        };
        let e = (-DRAG * dt).exp();
        let correction = dir * (speed * ((1.0 - e) / DRAG - dt));
        if let Some(p) = self.projectile_mut(id) {
            p.speed *= e;
        }
        self.move_projectile(id, pos + correction, false);
    }
}
