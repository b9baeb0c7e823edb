//! Rigid bodies: walls and vehicles
//!
//! Walls are static boxes registered in the spatial grid. Vehicles add a
//! motion state integrated once per fixed step. Damage always passes through
//! the body's damage-filter notification first, so shields and similar
//! subscribers can rewrite it.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::collision::{Obb, obb_overlap};
use super::entity::{EntityId, EntityKind, ObjectType};
use super::explosion::ExplosionKind;
use super::hooks::{ParticleKind, Sound};
use super::notify::{DamageDesc, NotifyKind, NotifyParam};
use super::world::World;
use crate::consts::*;
use crate::error::SimError;

/// Half extents of a vehicle hull
pub const VEHICLE_HALF: Vec2 = Vec2::new(18.0, 14.0);
const VEHICLE_MASS: f32 = 10.0;
const VEHICLE_LINEAR_DAMPING: f32 = 1.5;
const VEHICLE_ANGULAR_DAMPING: f32 = 4.0;
/// Top speed under full thrust
pub const VEHICLE_MAX_SPEED: f32 = VEHICLE_ACCEL / VEHICLE_LINEAR_DAMPING;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallKind {
    /// Destructible
    Brick,
    /// Indestructible, blocks explosion propagation
    Concrete,
}

/// Who drives a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pilot {
    /// 0 means no team
    pub team: u8,
    pub human: bool,
    pub nick: String,
}

/// Driver input, both axes in `[-1, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub thrust: f32,
    pub turn: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BodyClass {
    Wall(WallKind),
    Vehicle {
        pilot: Option<Pilot>,
        control: Control,
    },
}

/// Dynamic state of a movable body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    /// Linear velocity
    pub lv: Vec2,
    /// Angular velocity (rad/s)
    pub av: f32,
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Position at the end of the last frame
    pub frame_pos: Vec2,
}

impl Motion {
    fn for_box(pos: Vec2, half: Vec2, mass: f32) -> Self {
        let size = half * 2.0;
        let inertia = mass * size.length_squared() / 12.0;
        Self {
            lv: Vec2::ZERO,
            av: 0.0,
            inv_mass: 1.0 / mass,
            inv_inertia: 1.0 / inertia,
            linear_damping: VEHICLE_LINEAR_DAMPING,
            angular_damping: VEHICLE_ANGULAR_DAMPING,
            frame_pos: pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub class: BodyClass,
    /// Unit direction of the long axis
    pub dir: Vec2,
    pub half: Vec2,
    pub health: f32,
    pub max_health: f32,
    /// Ignored by traces and overlap tests
    pub phantom: bool,
    pub owner: Option<EntityId>,
    pub motion: Option<Motion>,
}

impl RigidBody {
    pub fn wall(size: Vec2, kind: WallKind) -> Self {
        let health = match kind {
            WallKind::Brick => BRICK_HEALTH,
            WallKind::Concrete => 0.0,
        };
        Self {
            class: BodyClass::Wall(kind),
            dir: Vec2::X,
            half: size * 0.5,
            health,
            max_health: health,
            phantom: false,
            owner: None,
            motion: None,
        }
    }

    pub fn vehicle(pos: Vec2, dir: Vec2, pilot: Option<Pilot>) -> Self {
        Self {
            class: BodyClass::Vehicle {
                pilot,
                control: Control::default(),
            },
            dir: dir.try_normalize().unwrap_or(Vec2::X),
            half: VEHICLE_HALF,
            health: VEHICLE_HEALTH,
            max_health: VEHICLE_HEALTH,
            phantom: false,
            owner: None,
            motion: Some(Motion::for_box(pos, VEHICLE_HALF, VEHICLE_MASS)),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self.class {
            BodyClass::Wall(WallKind::Brick) => ObjectType::WallBrick,
            BodyClass::Wall(WallKind::Concrete) => ObjectType::WallConcrete,
            BodyClass::Vehicle { .. } => ObjectType::Vehicle,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.motion.is_some()
    }

    pub fn is_concrete(&self) -> bool {
        self.class == BodyClass::Wall(WallKind::Concrete)
    }

    pub fn pilot(&self) -> Option<&Pilot> {
        match &self.class {
            BodyClass::Vehicle { pilot, .. } => pilot.as_ref(),
            BodyClass::Wall(_) => None,
        }
    }

    pub fn obb(&self, pos: Vec2) -> Obb {
        Obb::new(pos, self.dir, self.half)
    }

    /// Apply an impulse at world point `at`; static bodies ignore it
    pub fn apply_impulse(&mut self, center: Vec2, impulse: Vec2, at: Vec2) {
        if let Some(m) = self.motion.as_mut() {
            m.lv += impulse * m.inv_mass;
            m.av += (at - center).perp_dot(impulse) * m.inv_inertia;
        }
    }
}

impl World {
    pub fn spawn_wall(&mut self, pos: Vec2, size: Vec2, kind: WallKind) -> Result<EntityId, SimError> {
        self.spawn(pos, EntityKind::Body(RigidBody::wall(size, kind)))
    }

    pub fn spawn_vehicle(
        &mut self,
        pos: Vec2,
        dir: Vec2,
        pilot: Option<Pilot>,
    ) -> Result<EntityId, SimError> {
        self.spawn(pos, EntityKind::Body(RigidBody::vehicle(pos, dir, pilot)))
    }

    pub fn set_control(&mut self, vehicle: EntityId, input: Control) {
        if let Some(BodyClass::Vehicle { control, .. }) = self.body_mut(vehicle).map(|b| &mut b.class) {
            *control = Control {
                thrust: input.thrust.clamp(-1.0, 1.0),
                turn: input.turn.clamp(-1.0, 1.0),
            };
        }
    }

    pub fn apply_impulse(&mut self, id: EntityId, impulse: Vec2, at: Vec2) {
        let Some(entity) = self.entity_mut(id) else {
            return;
        };
        let center = entity.pos;
        if let Some(body) = entity.kind.as_body_mut() {
            body.apply_impulse(center, impulse, at);
        }
    }

    /// Deal damage through the damage filter. Returns true if the body was destroyed.
    pub fn take_damage(
        &mut self,
        id: EntityId,
        damage: f32,
        hit: Vec2,
        from: Option<EntityId>,
    ) -> Result<bool, SimError> {
        match self.body(id) {
            Some(body) if !body.is_concrete() && self.is_alive(id) => {}
            _ => return Ok(false),
        }

        let mut param = NotifyParam::Damage(DamageDesc { damage, hit, from });
        self.pulse_notify(id, NotifyKind::DamageFilter, &mut param);
        let damage = match param {
            NotifyParam::Damage(desc) => desc.damage,
            NotifyParam::None => damage,
        };
        if damage == 0.0 || !self.is_alive(id) {
            return Ok(false);
        }

        let Some(body) = self.body_mut(id) else {
            return Ok(false);
        };
        body.health = (body.health - damage).clamp(0.0, body.max_health);
        if body.health > 0.0 {
            return Ok(false);
        }

        self.destroy(id, from)?;
        Ok(true)
    }

    pub fn heal(&mut self, id: EntityId, amount: f32) {
        if let Some(body) = self.body_mut(id) {
            body.health = (body.health + amount).clamp(0.0, body.max_health);
        }
    }

    fn destroy(&mut self, id: EntityId, killer: Option<EntityId>) -> Result<(), SimError> {
        let (Some(pos), Some(ty)) = (self.pos(id), self.object_type(id)) else {
            return Ok(());
        };
        log::debug!("{} {id} destroyed", ty.name());
        match ty {
            ObjectType::Vehicle => {
                self.spawn_explosion(ExplosionKind::Big, pos, killer)?;
                self.sound(Sound::Destroyed, pos);
            }
            ObjectType::WallBrick => {
                for _ in 0..6 {
                    let spread = self.fx_frand(12.0);
                    let at = pos + self.fx_vrand(spread);
                    let speed = self.fx_frand(120.0) + 40.0;
                    let vel = self.fx_vrand(speed);
                    self.particle(ParticleKind::Debris, at, vel);
                }
            }
            _ => {}
        }
        self.kill(id);
        Ok(())
    }

    /// Move and turn a body, then tell subscribers
    pub fn move_body(&mut self, id: EntityId, pos: Vec2, dir: Vec2) {
        if let Some(body) = self.body_mut(id) {
            body.dir = dir;
        }
        self.place(id, pos);
        self.pulse_notify(id, NotifyKind::Move, &mut NotifyParam::None);
    }

    fn blocked(&self, id: EntityId, obb: &Obb) -> bool {
        self.grid.collect_rect(obb.aabb()).into_iter().any(|other| {
            if other == id {
                return false;
            }
            let Some(entity) = self.entity(other).filter(|e| !e.is_killed()) else {
                return false;
            };
            entity
                .kind
                .as_body()
                .is_some_and(|body| !body.phantom && obb_overlap(obb, &body.obb(entity.pos)))
        })
    }

    /// Integrate one fixed step of a dynamic body
    pub(crate) fn step_body(&mut self, id: EntityId, dt: f32) {
        let Some(entity) = self.entity_mut(id) else {
            return;
        };
        let pos = entity.pos;
        let Some(body) = entity.kind.as_body_mut() else {
            return;
        };
        let control = match body.class {
            BodyClass::Vehicle { control, .. } => control,
            BodyClass::Wall(_) => Control::default(),
        };
        let dir = body.dir;
        let half = body.half;
        let phantom = body.phantom;
        let Some(m) = body.motion.as_mut() else {
            return;
        };

        // Driver input
        m.lv += dir * (control.thrust * VEHICLE_ACCEL * dt);
        if control.turn != 0.0 {
            m.av = control.turn * VEHICLE_TURN_SPEED;
        }
        m.lv *= (1.0 - m.linear_damping * dt).max(0.0);
        m.av *= (1.0 - m.angular_damping * dt).max(0.0);

        if m.lv == Vec2::ZERO && m.av == 0.0 {
            return;
        }
        let new_dir = Vec2::from_angle(m.av * dt)
            .rotate(dir)
            .try_normalize()
            .unwrap_or(dir);
        let mut new_pos = pos + m.lv * dt;

        // Keep the hull inside the world
        let ext = Obb::new(new_pos, new_dir, half).aabb();
        let reach = (ext.max - ext.min) * 0.5;
        let size = self.size();
        new_pos = new_pos.clamp(reach, (size - reach).max(reach));

        let obb = Obb::new(new_pos, new_dir, half);
        if !phantom && self.blocked(id, &obb) {
            if let Some(m) = self.body_mut(id).and_then(|b| b.motion.as_mut()) {
                m.lv = Vec2::ZERO;
                m.av = 0.0;
            }
            return;
        }
        self.move_body(id, new_pos, new_dir);
    }

    pub(crate) fn end_frame_body(&mut self, id: EntityId) {
        let Some(entity) = self.entity_mut(id) else {
            return;
        };
        let pos = entity.pos;
        if let Some(m) = entity.kind.as_body_mut().and_then(|b| b.motion.as_mut()) {
            m.frame_pos = pos;
        }
    }
}
