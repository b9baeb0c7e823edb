//! Simulation world
//!
//! Owns entity storage, the update lists, the spatial grid, the network RNG
//! and the collaborator hooks. Entities are logically removed by
//! [`World::kill`] and physically freed once nothing holds a reference.

use std::collections::VecDeque;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::body::RigidBody;
use super::entity::{Entity, EntityId, EntityKind, ObjectType, flags};
use super::explosion::Explosion;
use super::grid::SpatialGrid;
use super::hooks::{Effects, NullEffects, NullScripts, ParticleKind, ScriptArg, ScriptHost, Sound};
use super::notify::{NotifyKind, NotifyParam};
use super::pickup::Pickup;
use super::pool::MemoryPool;
use super::projectile::Projectile;
use super::rng::NetRng;
use super::trigger::Trigger;
use crate::consts::LOCATION_SIZE;
use crate::error::{ScriptError, SimError};
use crate::polar_to_cartesian;
use crate::settings::SimSettings;

/// Shake never exceeds this level
const MAX_SHAKE: f32 = 1.0;

/// Player view following a vehicle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Camera {
    pub vehicle: Option<EntityId>,
    pub shake: f32,
}

impl Camera {
    pub fn shake(&mut self, level: f32) {
        self.shake = (self.shake + level).min(MAX_SHAKE);
    }
}

/// Which update pass is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepPhase {
    /// Between passes: setup, spawning from outside, loading
    #[default]
    Idle,
    Fixed,
    Floating,
    EndFrame,
}

fn fx_rng() -> Pcg32 {
    Pcg32::seed_from_u64(0)
}

fn default_effects() -> Box<dyn Effects> {
    Box::new(NullEffects)
}

fn default_scripts() -> Box<dyn ScriptHost> {
    Box::new(NullScripts)
}

/// Complete simulation state
#[derive(Serialize, Deserialize)]
pub struct World {
    pub settings: SimSettings,
    pub(crate) entities: MemoryPool<Entity>,
    /// Every entity, newest first
    pub(crate) objects: VecDeque<EntityId>,
    pub(crate) vehicles: VecDeque<EntityId>,
    pub(crate) projectiles: VecDeque<EntityId>,
    pub(crate) pickups: VecDeque<EntityId>,
    pub(crate) triggers: VecDeque<EntityId>,
    pub(crate) fixed_list: VecDeque<EntityId>,
    pub(crate) floating_list: VecDeque<EntityId>,
    pub(crate) end_frame_list: VecDeque<EntityId>,
    pub(crate) grid: SpatialGrid,
    pub(crate) rng: NetRng,
    pub cameras: Vec<Camera>,
    /// Simulated time in seconds
    pub time: f64,
    /// Fixed steps run so far
    pub ticks: u64,
    /// Visual-only randomness, never synchronized
    #[serde(skip, default = "fx_rng")]
    pub(crate) fx: Pcg32,
    #[serde(skip)]
    pub(crate) phase: StepPhase,
    #[serde(skip, default = "default_effects")]
    effects: Box<dyn Effects>,
    #[serde(skip, default = "default_scripts")]
    scripts: Box<dyn ScriptHost>,
}

impl World {
    pub fn new(settings: &SimSettings) -> Self {
        let size = settings.world_size();
        log::info!(
            "Creating world {}x{} (seed {})",
            size.x,
            size.y,
            settings.seed
        );
        Self {
            settings: settings.clone(),
            entities: MemoryPool::new(),
            objects: VecDeque::new(),
            vehicles: VecDeque::new(),
            projectiles: VecDeque::new(),
            pickups: VecDeque::new(),
            triggers: VecDeque::new(),
            fixed_list: VecDeque::new(),
            floating_list: VecDeque::new(),
            end_frame_list: VecDeque::new(),
            grid: SpatialGrid::new(size, LOCATION_SIZE),
            rng: NetRng::new(settings.seed),
            cameras: Vec::new(),
            time: 0.0,
            ticks: 0,
            fx: fx_rng(),
            phase: StepPhase::Idle,
            effects: default_effects(),
            scripts: default_scripts(),
        }
    }

    pub fn size(&self) -> Vec2 {
        self.settings.world_size()
    }

    pub fn set_effects(&mut self, effects: Box<dyn Effects>) {
        self.effects = effects;
    }

    pub fn set_scripts(&mut self, scripts: Box<dyn ScriptHost>) {
        self.scripts = scripts;
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    // === Lookup ===

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id.0)
    }

    /// Entity exists and has not been killed
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entity(id).is_some_and(|e| !e.is_killed())
    }

    pub fn object_type(&self, id: EntityId) -> Option<ObjectType> {
        self.entity(id).map(Entity::object_type)
    }

    pub fn pos(&self, id: EntityId) -> Option<Vec2> {
        self.entity(id).map(|e| e.pos)
    }

    pub fn body(&self, id: EntityId) -> Option<&RigidBody> {
        self.entity(id).and_then(|e| e.kind.as_body())
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut RigidBody> {
        self.entity_mut(id).and_then(|e| e.kind.as_body_mut())
    }

    pub fn projectile(&self, id: EntityId) -> Option<&Projectile> {
        self.entity(id).and_then(|e| e.kind.as_projectile())
    }

    pub fn projectile_mut(&mut self, id: EntityId) -> Option<&mut Projectile> {
        self.entity_mut(id).and_then(|e| e.kind.as_projectile_mut())
    }

    pub fn explosion(&self, id: EntityId) -> Option<&Explosion> {
        self.entity(id).and_then(|e| e.kind.as_explosion())
    }

    pub fn explosion_mut(&mut self, id: EntityId) -> Option<&mut Explosion> {
        self.entity_mut(id).and_then(|e| e.kind.as_explosion_mut())
    }

    pub fn pickup(&self, id: EntityId) -> Option<&Pickup> {
        self.entity(id).and_then(|e| e.kind.as_pickup())
    }

    pub fn pickup_mut(&mut self, id: EntityId) -> Option<&mut Pickup> {
        self.entity_mut(id).and_then(|e| e.kind.as_pickup_mut())
    }

    pub fn trigger(&self, id: EntityId) -> Option<&Trigger> {
        self.entity(id).and_then(|e| e.kind.as_trigger())
    }

    pub fn trigger_mut(&mut self, id: EntityId) -> Option<&mut Trigger> {
        self.entity_mut(id).and_then(|e| e.kind.as_trigger_mut())
    }

    /// Number of entities still in storage, killed or not
    pub fn live_count(&self) -> usize {
        self.entities.live()
    }

    /// Live entities, newest first
    pub fn objects(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.objects.iter().copied().filter(|id| self.is_alive(*id))
    }

    pub fn vehicles(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.vehicles.iter().copied().filter(|id| self.is_alive(*id))
    }

    pub fn projectiles(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.projectiles.iter().copied().filter(|id| self.is_alive(*id))
    }

    pub fn pickups(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.pickups.iter().copied().filter(|id| self.is_alive(*id))
    }

    pub fn triggers(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.triggers.iter().copied().filter(|id| self.is_alive(*id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.objects()
            .find(|id| self.entity(*id).and_then(|e| e.name.as_deref()) == Some(name))
    }

    /// Name an entity; names are unique, so a taken name is refused
    pub fn set_name(&mut self, id: EntityId, name: Option<&str>) -> bool {
        if let Some(name) = name
            && self.find_by_name(name).is_some_and(|other| other != id)
        {
            log::warn!("object name `{name}` already in use");
            return false;
        }
        let Some(entity) = self.entity_mut(id) else {
            return false;
        };
        match name.filter(|n| !n.is_empty()) {
            Some(name) => {
                entity.name = Some(name.to_string());
                entity.flags |= flags::NAMED;
            }
            None => {
                entity.name = None;
                entity.flags &= !flags::NAMED;
            }
        }
        true
    }

    // === Lifecycle ===

    pub(crate) fn add_ref(&mut self, id: EntityId) {
        if let Some(entity) = self.entity_mut(id) {
            entity.ref_count += 1;
        }
    }

    /// Drop one reference, freeing a killed entity's storage at zero
    pub(crate) fn release(&mut self, id: EntityId) {
        let Some(entity) = self.entity_mut(id) else {
            return;
        };
        debug_assert!(entity.ref_count > 0, "{id} released too often");
        entity.ref_count = entity.ref_count.saturating_sub(1);
        if entity.ref_count > 0 {
            return;
        }
        if !entity.is_killed() {
            log::error!("{id} lost its last reference while alive");
            return;
        }
        if let Err(err) = self.entities.free(id.0) {
            log::error!("failed to free {id}: {err}");
        }
    }

    /// Store a new entity and register it with lists and the grid
    pub(crate) fn spawn(&mut self, pos: Vec2, kind: EntityKind) -> Result<EntityId, SimError> {
        let ty = kind.object_type();
        let events = kind.default_events();
        let bounds = kind.as_body().map(|body| body.obb(pos).aabb());

        let id = EntityId(self.entities.allocate(Entity::new(pos, kind))?);
        self.objects.push_front(id);
        match ty {
            ObjectType::Vehicle => self.vehicles.push_front(id),
            ObjectType::Projectile => self.projectiles.push_front(id),
            ObjectType::PickupHealth
            | ObjectType::PickupMine
            | ObjectType::PickupShield
            | ObjectType::PickupShock => self.pickups.push_front(id),
            ObjectType::Trigger => self.triggers.push_front(id),
            _ => {}
        }
        if let Some(bounds) = bounds {
            self.grid.insert(id, bounds);
        }
        self.set_events(id, events);

        log::trace!("spawned {} {id} at {pos}", ty.name());
        Ok(id)
    }

    /// Choose which update passes an entity receives
    pub fn set_events(&mut self, id: EntityId, events: u32) {
        let Some(entity) = self.entity_mut(id) else {
            return;
        };
        if entity.is_killed() {
            return;
        }
        let events = events & flags::EVENT_MASK;
        let unlisted = events & !(entity.flags >> flags::LISTED_SHIFT);
        entity.flags = (entity.flags & !flags::EVENT_MASK)
            | events
            | (unlisted << flags::LISTED_SHIFT);

        for (bit, list) in [
            (flags::TS_FIXED, &mut self.fixed_list),
            (flags::TS_FLOATING, &mut self.floating_list),
            (flags::END_FRAME, &mut self.end_frame_list),
        ] {
            if unlisted & bit != 0 {
                list.push_front(id);
            }
        }
    }

    /// Logically remove an entity. Killing twice is a no-op.
    pub fn kill(&mut self, id: EntityId) {
        let Some(entity) = self.entity_mut(id) else {
            return;
        };
        if entity.is_killed() {
            return;
        }
        entity.flags |= flags::KILLED;
        self.add_ref(id);

        self.on_kill(id);
        self.pulse_notify(id, NotifyKind::Kill, &mut NotifyParam::None);

        if let Some(entity) = self.entity_mut(id) {
            entity.flags &= !flags::EVENT_MASK;
        }
        self.clear_notifications(id);
        self.grid.remove(id);
        log::trace!("killed {id}");

        // world list, then our own hold
        self.release(id);
        self.release(id);
    }

    /// Kind-specific cleanup before the kill notification goes out
    fn on_kill(&mut self, id: EntityId) {
        let Some(entity) = self.entity(id) else {
            return;
        };
        match &entity.kind {
            EntityKind::Pickup(pickup) => {
                if let Some(owner) = pickup.owner {
                    self.unsubscribe(owner, id);
                }
            }
            EntityKind::Daemon(daemon) => {
                let victim = daemon.victim;
                self.unsubscribe(victim, id);
            }
            EntityKind::Explosion(_) => self.effects.set_light_intensity(id, 0.0),
            _ => {}
        }
    }

    /// Drop killed and freed entries from every list
    pub(crate) fn sweep_lists(&mut self) {
        let entities = &mut self.entities;
        let alive = |id: &EntityId| entities.get(id.0).is_some_and(|e| !e.is_killed());
        self.objects.retain(alive);
        self.vehicles.retain(alive);
        self.projectiles.retain(alive);
        self.pickups.retain(alive);
        self.triggers.retain(alive);

        for (bit, list) in [
            (flags::TS_FIXED, &mut self.fixed_list),
            (flags::TS_FLOATING, &mut self.floating_list),
            (flags::END_FRAME, &mut self.end_frame_list),
        ] {
            list.retain(|id| {
                let Some(entity) = entities.get_mut(id.0) else {
                    return false;
                };
                if !entity.is_killed() && entity.flags & bit != 0 {
                    return true;
                }
                entity.flags &= !(bit << flags::LISTED_SHIFT);
                false
            });
        }
    }

    /// Move an entity without notifying anyone
    pub fn place(&mut self, id: EntityId, pos: Vec2) {
        let Some(entity) = self.entity_mut(id) else {
            return;
        };
        entity.pos = pos;
        let bounds = entity.kind.as_body().map(|body| body.obb(pos).aabb());
        let killed = entity.is_killed();
        if let Some(bounds) = bounds
            && !killed
        {
            self.grid.update(id, bounds);
        }
    }

    pub fn add_camera(&mut self, vehicle: Option<EntityId>) -> usize {
        self.cameras.push(Camera {
            vehicle,
            shake: 0.0,
        });
        self.cameras.len() - 1
    }

    // === Shared services ===

    /// Call a script fragment; failures are logged and swallowed
    pub fn run_script(&mut self, source: &str, args: &[ScriptArg]) {
        if source.trim().is_empty() {
            return;
        }
        match self.scripts.exec(source, args) {
            Ok(()) => {}
            Err(ScriptError::Syntax(msg)) => log::warn!("script syntax error in `{source}`: {msg}"),
            Err(err) => log::warn!("script `{source}` failed: {err}"),
        }
    }

    fn assert_net_phase(&self) {
        debug_assert!(
            matches!(self.phase, StepPhase::Idle | StepPhase::Fixed),
            "network RNG advanced during {:?} pass",
            self.phase
        );
    }

    pub fn net_rand(&mut self) -> u32 {
        self.assert_net_phase();
        self.rng.net_rand()
    }

    pub fn net_frand(&mut self, max: f32) -> f32 {
        self.assert_net_phase();
        self.rng.net_frand(max)
    }

    pub fn net_vrand(&mut self, len: f32) -> Vec2 {
        self.assert_net_phase();
        self.rng.net_vrand(len)
    }

    pub fn rng_state(&self) -> super::rng::RngState {
        self.rng.state()
    }

    /// Visual-only random float in `[0, max)`
    pub(crate) fn fx_frand(&mut self, max: f32) -> f32 {
        self.fx.random::<f32>() * max
    }

    pub(crate) fn fx_vrand(&mut self, len: f32) -> Vec2 {
        let angle = self.fx_frand(std::f32::consts::TAU);
        polar_to_cartesian(len, angle)
    }

    pub(crate) fn particle(&mut self, kind: ParticleKind, pos: Vec2, vel: Vec2) {
        if self.settings.particles {
            self.effects.spawn_particle(kind, pos, vel);
        }
    }

    pub(crate) fn sound(&mut self, sound: Sound, pos: Vec2) {
        self.effects.play_sound(sound, pos);
    }

    pub(crate) fn flash(&mut self, pos: Vec2, radius: f32, intensity: f32, timeout: f32) {
        self.effects.light_flash(pos, radius, intensity, timeout);
    }

    pub(crate) fn light(&mut self, source: EntityId, intensity: f32) {
        self.effects.set_light_intensity(source, intensity);
    }
}
