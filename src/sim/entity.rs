//! Entity base: handles, type tags, flags and the closed set of kinds
//!
//! Entities live in the world's [`MemoryPool`](super::MemoryPool) and are
//! addressed by [`EntityId`]. Cross-entity links (owner, last hit, occupant,
//! subscriber) are stored as plain ids and resolved through the pool, so a
//! link to a freed entity simply stops resolving.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::body::RigidBody;
use super::daemon::HealthDaemon;
use super::explosion::Explosion;
use super::notify::NotifyList;
use super::pickup::{Pickup, PickupKind};
use super::pool::PoolHandle;
use super::projectile::Projectile;
use super::trigger::Trigger;

/// Entity flag bits
pub mod flags {
    pub const KILLED: u32 = 0x01;
    pub const NAMED: u32 = 0x02;
    /// Receives fixed-step updates
    pub const TS_FIXED: u32 = 0x04;
    /// Receives floating-step updates
    pub const TS_FLOATING: u32 = 0x08;
    /// Receives end-of-frame updates
    pub const END_FRAME: u32 = 0x10;

    pub const EVENT_MASK: u32 = TS_FIXED | TS_FLOATING | END_FRAME;

    /// Present in the matching update list until the next sweep. Each bit is
    /// the event bit shifted by [`LISTED_SHIFT`].
    pub const LISTED_FIXED: u32 = TS_FIXED << LISTED_SHIFT;
    pub const LISTED_FLOATING: u32 = TS_FLOATING << LISTED_SHIFT;
    pub const LISTED_END_FRAME: u32 = END_FRAME << LISTED_SHIFT;
    pub const LISTED_SHIFT: u32 = 3;
}

/// Stable handle to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub PoolHandle);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.0.block, self.0.slot)
    }
}

/// Type tag of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    WallBrick,
    WallConcrete,
    Vehicle,
    Projectile,
    Explosion,
    HealthDaemon,
    PickupHealth,
    PickupMine,
    PickupShield,
    PickupShock,
    Trigger,
}

impl ObjectType {
    pub const ALL: [ObjectType; 11] = [
        ObjectType::WallBrick,
        ObjectType::WallConcrete,
        ObjectType::Vehicle,
        ObjectType::Projectile,
        ObjectType::Explosion,
        ObjectType::HealthDaemon,
        ObjectType::PickupHealth,
        ObjectType::PickupMine,
        ObjectType::PickupShield,
        ObjectType::PickupShock,
        ObjectType::Trigger,
    ];

    /// Name used by map files and scripts
    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::WallBrick => "wall_brick",
            ObjectType::WallConcrete => "wall_concrete",
            ObjectType::Vehicle => "tank",
            ObjectType::Projectile => "projectile",
            ObjectType::Explosion => "explosion",
            ObjectType::HealthDaemon => "health_daemon",
            ObjectType::PickupHealth => "pu_health",
            ObjectType::PickupMine => "pu_mine",
            ObjectType::PickupShield => "pu_shield",
            ObjectType::PickupShock => "pu_shock",
            ObjectType::Trigger => "trigger",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn pickup_kind(&self) -> Option<PickupKind> {
        match self {
            ObjectType::PickupHealth => Some(PickupKind::Health),
            ObjectType::PickupMine => Some(PickupKind::Mine),
            ObjectType::PickupShield => Some(PickupKind::Shield),
            ObjectType::PickupShock => Some(PickupKind::Shock),
            _ => None,
        }
    }

    pub fn is_rigid_body(&self) -> bool {
        matches!(
            self,
            ObjectType::WallBrick | ObjectType::WallConcrete | ObjectType::Vehicle
        )
    }
}

/// Expected target type of a stored reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Any,
    RigidBody,
    Vehicle,
}

impl RefKind {
    pub fn accepts(&self, ty: ObjectType) -> bool {
        match self {
            RefKind::Any => true,
            RefKind::RigidBody => ty.is_rigid_body(),
            RefKind::Vehicle => ty == ObjectType::Vehicle,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefKind::Any => "entity",
            RefKind::RigidBody => "rigid body",
            RefKind::Vehicle => "vehicle",
        }
    }
}

/// Kind-specific state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EntityKind {
    Body(RigidBody),
    Projectile(Projectile),
    Explosion(Explosion),
    Pickup(Pickup),
    Trigger(Trigger),
    Daemon(HealthDaemon),
}

impl EntityKind {
    pub fn object_type(&self) -> ObjectType {
        match self {
            EntityKind::Body(body) => body.object_type(),
            EntityKind::Projectile(_) => ObjectType::Projectile,
            EntityKind::Explosion(_) => ObjectType::Explosion,
            EntityKind::Pickup(pickup) => match pickup.kind {
                PickupKind::Health => ObjectType::PickupHealth,
                PickupKind::Mine => ObjectType::PickupMine,
                PickupKind::Shield => ObjectType::PickupShield,
                PickupKind::Shock => ObjectType::PickupShock,
            },
            EntityKind::Trigger(_) => ObjectType::Trigger,
            EntityKind::Daemon(_) => ObjectType::HealthDaemon,
        }
    }

    /// Update passes this kind subscribes to when spawned
    pub fn default_events(&self) -> u32 {
        match self {
            EntityKind::Body(body) if body.is_dynamic() => flags::TS_FIXED | flags::END_FRAME,
            EntityKind::Body(_) => 0,
            EntityKind::Projectile(_) | EntityKind::Trigger(_) | EntityKind::Daemon(_) => {
                flags::TS_FIXED
            }
            EntityKind::Explosion(_) | EntityKind::Pickup(_) => {
                flags::TS_FIXED | flags::TS_FLOATING
            }
        }
    }

    /// Weak links held by this entity, with the type each must resolve to
    pub fn references(&self) -> Vec<(EntityId, RefKind)> {
        let mut refs = Vec::new();
        let mut push = |id: Option<EntityId>, kind: RefKind| {
            if let Some(id) = id {
                refs.push((id, kind));
            }
        };
        match self {
            EntityKind::Body(body) => push(body.owner, RefKind::Any),
            EntityKind::Projectile(p) => {
                push(p.owner, RefKind::RigidBody);
                push(p.last_hit, RefKind::RigidBody);
                push(p.homing_target(), RefKind::Vehicle);
            }
            EntityKind::Explosion(e) => push(e.owner, RefKind::Any),
            EntityKind::Pickup(p) => push(p.owner, RefKind::Vehicle),
            EntityKind::Trigger(t) => push(t.occupant, RefKind::Vehicle),
            EntityKind::Daemon(d) => {
                push(Some(d.victim), RefKind::RigidBody);
                push(d.owner, RefKind::Any);
            }
        }
        refs
    }

    pub fn as_body(&self) -> Option<&RigidBody> {
        match self {
            EntityKind::Body(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_body_mut(&mut self) -> Option<&mut RigidBody> {
        match self {
            EntityKind::Body(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_projectile(&self) -> Option<&Projectile> {
        match self {
            EntityKind::Projectile(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_projectile_mut(&mut self) -> Option<&mut Projectile> {
        match self {
            EntityKind::Projectile(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_explosion(&self) -> Option<&Explosion> {
        match self {
            EntityKind::Explosion(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_explosion_mut(&mut self) -> Option<&mut Explosion> {
        match self {
            EntityKind::Explosion(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_pickup(&self) -> Option<&Pickup> {
        match self {
            EntityKind::Pickup(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_pickup_mut(&mut self) -> Option<&mut Pickup> {
        match self {
            EntityKind::Pickup(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_daemon(&self) -> Option<&HealthDaemon> {
        match self {
            EntityKind::Daemon(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_daemon_mut(&mut self) -> Option<&mut HealthDaemon> {
        match self {
            EntityKind::Daemon(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_trigger(&self) -> Option<&Trigger> {
        match self {
            EntityKind::Trigger(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_trigger_mut(&mut self) -> Option<&mut Trigger> {
        match self {
            EntityKind::Trigger(t) => Some(t),
            _ => None,
        }
    }
}

/// A simulated object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub flags: u32,
    /// Holders keeping the storage alive; the world list holds one
    pub ref_count: u32,
    pub name: Option<String>,
    pub pos: Vec2,
    pub notify: NotifyList,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(pos: Vec2, kind: EntityKind) -> Self {
        Self {
            flags: 0,
            ref_count: 1,
            name: None,
            pos,
            notify: NotifyList::default(),
            kind,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.kind.object_type()
    }

    pub fn is_killed(&self) -> bool {
        self.flags & flags::KILLED != 0
    }

    pub fn has_flags(&self, mask: u32) -> bool {
        self.flags & mask == mask
    }
}
