//! Explosions and blast propagation
//!
//! An explosion detonates once, `time_boom` seconds after it spawns. Every
//! rigid body within the radius is damaged with a linear falloff. Bodies
//! hidden behind something else are reached along a path through a coarse
//! cell field instead, where only cells holding concrete walls are closed,
//! so blasts wrap around corners but lose strength doing it.

use std::collections::{HashMap, HashSet, VecDeque};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityKind};
use super::hooks::{ParticleKind, Sound};
use super::world::World;
use crate::consts::CELL_SIZE;
use crate::error::SimError;

/// Neighbour offsets: N, S, W, E, NW, SE, NE, SW
const STEP_X: [i32; 8] = [0, 0, -1, 1, -1, 1, 1, -1];
const STEP_Y: [i32; 8] = [-1, 1, 0, 0, -1, 1, -1, 1];
/// Path cost per step; 12 per cell edge
const STEP_COST: [u32; 8] = [12, 12, 12, 12, 17, 17, 17, 17];
/// Orthogonal neighbours flanking each diagonal
const DIAGONAL_FLANKS: [usize; 8] = [0, 2, 1, 3, 3, 0, 2, 1];

type Cell = (i32, i32);

fn field_cell(p: Vec2) -> Cell {
    ((p.x / CELL_SIZE) as i32, (p.y / CELL_SIZE) as i32)
}

fn real_distance(cost: u32) -> f32 {
    cost as f32 * CELL_SIZE / 12.0
}

/// Cells a blast cannot pass through
#[derive(Debug, Clone, Default)]
pub struct BlastField {
    closed: HashSet<Cell>,
}

impl BlastField {
    pub fn close(&mut self, p: Vec2) {
        self.closed.insert(field_cell(p));
    }

    fn is_open(&self, cell: Cell) -> bool {
        !self.closed.contains(&cell)
    }

    /// Length of the shortest blast path from `from` to `to`, or `None` when
    /// every path is blocked or longer than `max_distance`
    pub fn path_distance(&self, from: Vec2, to: Vec2, max_distance: f32) -> Option<f32> {
        let start = field_cell(from);
        let goal = field_cell(to);

        let mut cost: HashMap<Cell, u32> = HashMap::new();
        let mut open = VecDeque::new();
        cost.insert(start, 0);
        open.push_front(start);

        while let Some(node) = open.pop_back() {
            let node_cost = cost.get(&node).copied().unwrap_or(0);
            if node == goal {
                return Some(real_distance(node_cost));
            }

            for i in 0..8 {
                if i > 3 {
                    let a = DIAGONAL_FLANKS[(i - 4) * 2];
                    let b = DIAGONAL_FLANKS[(i - 4) * 2 + 1];
                    if !self.is_open((node.0 + STEP_X[a], node.1 + STEP_Y[a]))
                        && !self.is_open((node.0 + STEP_X[b], node.1 + STEP_Y[b]))
                    {
                        continue;
                    }
                }

                let next = (node.0 + STEP_X[i], node.1 + STEP_Y[i]);
                if !self.is_open(next) {
                    continue;
                }
                let next_cost = node_cost + STEP_COST[i];
                if cost.get(&next).is_some_and(|&c| c <= next_cost) {
                    continue;
                }
                cost.insert(next, next_cost);
                if real_distance(next_cost) <= max_distance {
                    open.push_front(next);
                }
            }
        }

        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplosionKind {
    Standard,
    Big,
}

impl ExplosionKind {
    pub fn radius(&self) -> f32 {
        match self {
            ExplosionKind::Standard => 70.0,
            ExplosionKind::Big => 128.0,
        }
    }

    pub fn damage(&self) -> f32 {
        match self {
            ExplosionKind::Standard => 150.0,
            ExplosionKind::Big => 90.0,
        }
    }

    pub fn time_life(&self) -> f32 {
        match self {
            ExplosionKind::Standard => 0.32,
            ExplosionKind::Big => 0.72,
        }
    }

    pub fn time_boom(&self) -> f32 {
        match self {
            ExplosionKind::Standard => 0.03,
            ExplosionKind::Big => 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    pub kind: ExplosionKind,
    /// Credited with the damage; dropped after detonation
    pub owner: Option<EntityId>,
    pub time: f32,
    pub time_life: f32,
    pub time_boom: f32,
    pub damage: f32,
    pub radius: f32,
    pub boomed: bool,
}

impl Explosion {
    pub fn new(kind: ExplosionKind, owner: Option<EntityId>) -> Self {
        Self {
            kind,
            owner,
            time: 0.0,
            time_life: kind.time_life(),
            time_boom: kind.time_boom(),
            damage: kind.damage(),
            radius: kind.radius(),
            boomed: false,
        }
    }

    /// Light fades out over the explosion's visible life
    pub fn light_intensity(&self) -> f32 {
        let span = self.time_life * 1.5 - self.time_boom;
        if span <= 0.0 {
            return 0.0;
        }
        (1.0 - (self.time / span).powi(6)).max(0.0)
    }
}

impl World {
    pub fn spawn_explosion(
        &mut self,
        kind: ExplosionKind,
        pos: Vec2,
        owner: Option<EntityId>,
    ) -> Result<EntityId, SimError> {
        let id = self.spawn(pos, EntityKind::Explosion(Explosion::new(kind, owner)))?;
        log::debug!("{kind:?} explosion {id} at {pos}");

        let (rings, speed, sound) = match kind {
            ExplosionKind::Standard => (28, 100.0, Sound::Explosion),
            ExplosionKind::Big => (80, 200.0, Sound::BigExplosion),
        };
        for _ in 0..rings {
            let vel = self.fx_vrand(speed);
            self.particle(ParticleKind::Blast, pos, vel);
            let spread = self.fx_frand(kind.radius() * 0.5);
            let at = pos + self.fx_vrand(spread);
            self.particle(ParticleKind::Smoke, at, Vec2::ZERO);
        }
        self.light(id, 1.0);
        self.sound(sound, pos);
        Ok(id)
    }

    pub(crate) fn step_explosion(&mut self, id: EntityId, dt: f32) -> Result<(), SimError> {
        let Some(e) = self.explosion_mut(id) else {
            return Ok(());
        };
        e.time += dt;
        let detonate = e.time >= e.time_boom && !e.boomed;
        if detonate {
            self.boom(id)?;
        }

        if let Some(e) = self.explosion(id)
            && e.time >= e.time_life * 1.5
        {
            self.kill(id);
        }
        Ok(())
    }

    pub(crate) fn float_explosion(&mut self, id: EntityId) {
        if let Some(intensity) = self.explosion(id).map(Explosion::light_intensity) {
            self.light(id, intensity);
        }
    }

    fn boom(&mut self, id: EntityId) -> Result<(), SimError> {
        let (Some(pos), Some(e)) = (self.pos(id), self.explosion(id)) else {
            return Ok(());
        };
        let (radius, damage, owner) = (e.radius, e.damage, e.owner);

        for camera in &mut self.cameras {
            let Some(vehicle) = camera.vehicle else {
                continue;
            };
            let Some(at) = self.entities.get(vehicle.0).filter(|v| !v.is_killed()).map(|v| v.pos) else {
                continue;
            };
            let level = 0.5 * (radius - (pos - at).length() * 0.3) / radius;
            if level > 0.0 {
                camera.shake(level);
            }
        }

        let targets = self.bodies_near(pos, radius);
        let mut field = BlastField::default();
        for target in &targets {
            if let Some(entity) = self.entity(*target)
                && entity.kind.as_body().is_some_and(|b| b.is_concrete())
            {
                field.close(entity.pos);
            }
        }

        for target in targets {
            if !self.is_alive(target) {
                continue;
            }
            let Some(at) = self.pos(target) else {
                continue;
            };
            let mut d = (pos - at).length();
            if d > radius {
                continue;
            }

            // Anything else in the way forces the long way round
            if self.trace(None, pos, at - pos).is_some_and(|hit| hit.entity != target) {
                match field.path_distance(pos, at, radius) {
                    Some(path) => d = path,
                    None => continue,
                }
            }

            let dealt = (damage * (1.0 - d / radius)).max(0.0);
            if dealt > 0.0 {
                self.take_damage(target, dealt, pos, owner)?;
            }
        }

        if let Some(e) = self.explosion_mut(id) {
            e.owner = None;
            e.boomed = true;
        }
        Ok(())
    }
}
