//! Damage over time
//!
//! A health daemon rides on its victim and burns `damage` health per second
//! until its time runs out or the victim dies.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityKind};
use super::notify::{Handler, NotifyKind, Subscription};
use super::world::World;
use crate::error::SimError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthDaemon {
    pub victim: EntityId,
    pub owner: Option<EntityId>,
    /// Damage per second
    pub damage: f32,
    /// Seconds left
    pub time: f32,
}

impl World {
    pub fn spawn_health_daemon(
        &mut self,
        victim: EntityId,
        owner: Option<EntityId>,
        damage: f32,
        time: f32,
    ) -> Result<EntityId, SimError> {
        let pos = self.pos(victim).unwrap_or(Vec2::ZERO);
        let id = self.spawn(
            pos,
            EntityKind::Daemon(HealthDaemon {
                victim,
                owner,
                damage,
                time,
            }),
        )?;
        self.subscribe(
            victim,
            Subscription::new(NotifyKind::Move, id, Handler::FollowSender).persistent(),
        );
        self.subscribe(victim, Subscription::new(NotifyKind::Kill, id, Handler::KillSelf));
        Ok(id)
    }

    pub(crate) fn step_daemon(&mut self, id: EntityId, dt: f32) -> Result<(), SimError> {
        let Some(daemon) = self.entity_mut(id).and_then(|e| e.kind.as_daemon_mut()) else {
            return Ok(());
        };
        daemon.time -= dt;
        let mut dt = dt;
        let expired = daemon.time <= 0.0;
        if expired {
            // Last step only burns what was left
            dt += daemon.time;
        }
        let (victim, owner, damage) = (daemon.victim, daemon.owner, daemon.damage);

        let Some(at) = self.pos(victim).filter(|_| self.is_alive(victim)) else {
            self.kill(id);
            return Ok(());
        };
        if !self.take_damage(victim, dt * damage, at, owner)? && expired {
            self.kill(id);
        }
        Ok(())
    }
}
