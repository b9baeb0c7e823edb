//! Publish/subscribe notifications between entities
//!
//! Each entity owns a list of subscriptions to its own events. A pulse walks
//! the entries that existed when it started, in registration order. Entries
//! removed while any pulse on that list is running are only flagged; the
//! outermost pulse sweeps them once it finishes. Handlers are therefore free
//! to subscribe, unsubscribe or kill anything, including the publisher.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, ObjectType};
use super::hooks::ScriptArg;
use super::world::World;

/// Event types an entity can publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyKind {
    Kill,
    Move,
    DamageFilter,
    PickupDisappear,
}

/// Reaction run on the subscriber when a notification fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Handler {
    /// Subscriber is a publisher whose subscriber (the sender) died
    DropSubscriber,
    /// Projectile forgets the body it last hit
    ClearLastHit,
    /// Subscriber moves to the sender's position
    FollowSender,
    KillSelf,
    /// Attached pickup loses its carrier
    PickupOwnerKilled,
    /// Zero out incoming damage
    AbsorbDamage,
    /// Script fragment called with (subscriber, sender)
    Script(String),
}

/// Damage passed through the damage-filter notification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageDesc {
    pub damage: f32,
    pub hit: Vec2,
    pub from: Option<EntityId>,
}

/// Mutable payload handed to every handler of a pulse
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NotifyParam {
    None,
    Damage(DamageDesc),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotifyKind,
    pub subscriber: EntityId,
    pub handler: Handler,
    pub once: bool,
    pub guard: bool,
    pub removed: bool,
}

/// Request to subscribe. Defaults to a one-shot, guarded subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub kind: NotifyKind,
    pub subscriber: EntityId,
    pub handler: Handler,
    pub once: bool,
    pub guard: bool,
}

impl Subscription {
    pub fn new(kind: NotifyKind, subscriber: EntityId, handler: Handler) -> Self {
        Self {
            kind,
            subscriber,
            handler,
            once: true,
            guard: true,
        }
    }

    /// Keep firing after the first pulse
    pub fn persistent(mut self) -> Self {
        self.once = false;
        self
    }

    /// Do not watch the subscriber's death
    pub fn unguarded(mut self) -> Self {
        self.guard = false;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyList {
    entries: Vec<Notification>,
    /// Depth of pulses currently walking this list
    #[serde(skip)]
    protect: u32,
}

impl NotifyList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries not yet removed
    pub fn live(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter().filter(|n| !n.removed)
    }

    fn push(&mut self, notification: Notification) {
        self.entries.push(notification);
    }

    fn entry_mut(&mut self, index: usize) -> Option<&mut Notification> {
        self.entries.get_mut(index)
    }

    /// Remove matching entries, deferring the erase while protected
    pub(crate) fn remove_where(&mut self, pred: impl Fn(&Notification) -> bool) {
        if self.protect > 0 {
            for n in self.entries.iter_mut().filter(|n| pred(n)) {
                n.removed = true;
            }
        } else {
            self.entries.retain(|n| !pred(n));
        }
    }

    pub(crate) fn clear(&mut self) {
        self.remove_where(|_| true);
    }

    fn protect(&mut self) {
        self.protect += 1;
    }

    /// Returns true when the outermost pulse finished
    fn unprotect(&mut self) -> bool {
        debug_assert!(self.protect > 0, "unbalanced notify protection");
        self.protect = self.protect.saturating_sub(1);
        self.protect == 0
    }

    fn sweep(&mut self) {
        self.entries.retain(|n| !n.removed);
    }
}

impl World {
    /// Register `sub` on `publisher`. Identical subscriptions are not merged.
    pub fn subscribe(&mut self, publisher: EntityId, sub: Subscription) {
        let guard = sub.guard && sub.subscriber != publisher;
        let Some(entity) = self.entity_mut(publisher) else {
            return;
        };
        if entity.is_killed() {
            return;
        }
        entity.notify.push(Notification {
            kind: sub.kind,
            subscriber: sub.subscriber,
            handler: sub.handler,
            once: sub.once,
            guard,
            removed: false,
        });

        if guard {
            self.subscribe(
                sub.subscriber,
                Subscription::new(NotifyKind::Kill, publisher, Handler::DropSubscriber).unguarded(),
            );
        }
    }

    /// Remove every subscription `subscriber` holds on `publisher`
    pub fn unsubscribe(&mut self, publisher: EntityId, subscriber: EntityId) {
        let Some(entity) = self.entity_mut(publisher) else {
            return;
        };
        let guarded = entity
            .notify
            .live()
            .any(|n| n.subscriber == subscriber && n.guard);
        entity.notify.remove_where(|n| n.subscriber == subscriber);

        if guarded {
            self.remove_back_links(publisher, subscriber);
        }
    }

    /// Remove the death watch `subscriber` holds for `publisher`
    fn remove_back_links(&mut self, publisher: EntityId, subscriber: EntityId) {
        if let Some(sub) = self.entity_mut(subscriber) {
            sub.notify.remove_where(|n| {
                n.subscriber == publisher && n.handler == Handler::DropSubscriber
            });
        }
    }

    /// Drop the death watch once no guarded entry on `publisher` needs it
    fn release_guard(&mut self, publisher: EntityId, subscriber: EntityId) {
        let still_guarded = self.entity(publisher).is_some_and(|e| {
            e.notify
                .live()
                .any(|n| n.subscriber == subscriber && n.guard)
        });
        if !still_guarded {
            self.remove_back_links(publisher, subscriber);
        }
    }

    /// Remove every subscription on `publisher`, together with the death
    /// watches its guarded subscribers hold for it
    pub(crate) fn clear_notifications(&mut self, publisher: EntityId) {
        let Some(entity) = self.entity_mut(publisher) else {
            return;
        };
        let mut guarded: Vec<EntityId> = entity
            .notify
            .live()
            .filter(|n| n.guard)
            .map(|n| n.subscriber)
            .collect();
        entity.notify.clear();
        guarded.sort();
        guarded.dedup();
        for subscriber in guarded {
            self.remove_back_links(publisher, subscriber);
        }
    }

    /// Drop death watches pointing at entities that no longer exist
    pub(crate) fn prune_back_links(&mut self) {
        let stale: Vec<(EntityId, Vec<EntityId>)> = self
            .entities
            .iter()
            .map(|(handle, entity)| {
                let gone = entity
                    .notify
                    .live()
                    .filter(|n| n.handler == Handler::DropSubscriber)
                    .map(|n| n.subscriber)
                    .filter(|target| !self.is_alive(*target))
                    .collect::<Vec<_>>();
                (EntityId(handle), gone)
            })
            .filter(|(_, gone)| !gone.is_empty())
            .collect();

        for (id, gone) in stale {
            log::debug!("{id}: pruning {} stale death watches", gone.len());
            if let Some(entity) = self.entity_mut(id) {
                entity.notify.remove_where(|n| {
                    n.handler == Handler::DropSubscriber && gone.contains(&n.subscriber)
                });
            }
        }
    }

    pub fn is_subscriber(&self, publisher: EntityId, subscriber: EntityId) -> bool {
        self.entity(publisher)
            .is_some_and(|e| e.notify.live().any(|n| n.subscriber == subscriber))
    }

    /// First live subscriber of the given type listening for `kind`
    pub fn subscriber_of_type(
        &self,
        publisher: EntityId,
        kind: NotifyKind,
        ty: ObjectType,
    ) -> Option<EntityId> {
        let entity = self.entity(publisher)?;
        entity
            .notify
            .live()
            .filter(|n| n.kind == kind)
            .map(|n| n.subscriber)
            .find(|id| {
                self.entity(*id)
                    .is_some_and(|e| !e.is_killed() && e.object_type() == ty)
            })
    }

    /// Fire `kind` on `publisher`, letting handlers rewrite `param`
    pub fn pulse_notify(&mut self, publisher: EntityId, kind: NotifyKind, param: &mut NotifyParam) {
        let len = match self.entity_mut(publisher) {
            Some(entity) => {
                entity.notify.protect();
                entity.notify.len()
            }
            None => return,
        };
        self.add_ref(publisher);

        for index in 0..len {
            let Some(entry) = self
                .entity_mut(publisher)
                .and_then(|e| e.notify.entry_mut(index))
            else {
                break;
            };
            if entry.removed || entry.kind != kind {
                continue;
            }
            let spent_guard = entry.once && entry.guard;
            if entry.once {
                entry.removed = true;
            }
            let subscriber = entry.subscriber;
            let handler = entry.handler.clone();
            if spent_guard {
                self.release_guard(publisher, subscriber);
            }
            if !self.is_alive(subscriber) {
                continue;
            }
            self.react(&handler, subscriber, publisher, param);
        }

        if let Some(entity) = self.entity_mut(publisher)
            && entity.notify.unprotect()
        {
            entity.notify.sweep();
        }
        self.release(publisher);
    }

    fn react(
        &mut self,
        handler: &Handler,
        subscriber: EntityId,
        sender: EntityId,
        param: &mut NotifyParam,
    ) {
        match handler {
            Handler::DropSubscriber => self.unsubscribe(subscriber, sender),
            Handler::ClearLastHit => {
                if let Some(p) = self.projectile_mut(subscriber)
                    && p.last_hit == Some(sender)
                {
                    p.last_hit = None;
                }
            }
            Handler::FollowSender => {
                if let Some(pos) = self.pos(sender) {
                    self.place(subscriber, pos);
                }
            }
            Handler::KillSelf => self.kill(subscriber),
            Handler::PickupOwnerKilled => self.pickup_disappear(subscriber),
            Handler::AbsorbDamage => {
                if let NotifyParam::Damage(desc) = param {
                    self.shield_hit(subscriber, sender, *desc);
                    desc.damage = 0.0;
                }
            }
            Handler::Script(source) => {
                let args = [ScriptArg::Entity(subscriber), ScriptArg::Entity(sender)];
                self.run_script(source, &args);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SimSettings;
    use crate::sim::body::WallKind;
    use crate::sim::hooks::testing::Recorder;

    fn world_with_walls(n: usize) -> (World, Vec<EntityId>, Recorder) {
        let mut world = World::new(&SimSettings::default());
        let recorder = Recorder::default();
        world.set_scripts(Box::new(recorder.clone()));
        let walls = (0..n)
            .map(|i| {
                world
                    .spawn_wall(
                        Vec2::new(100.0 + 64.0 * i as f32, 100.0),
                        Vec2::splat(32.0),
                        WallKind::Brick,
                    )
                    .unwrap()
            })
            .collect();
        (world, walls, recorder)
    }

    fn pulse_move(world: &mut World, id: EntityId) {
        world.pulse_notify(id, NotifyKind::Move, &mut NotifyParam::None);
    }

    #[test]
    fn test_once_fires_once() {
        let (mut world, walls, recorder) = world_with_walls(2);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::Script("moved".into())),
        );
        pulse_move(&mut world, walls[0]);
        pulse_move(&mut world, walls[0]);
        assert_eq!(recorder.count("moved"), 1);
        assert!(!world.is_subscriber(walls[0], walls[1]));
    }

    #[test]
    fn test_persistent_fires_every_pulse() {
        let (mut world, walls, recorder) = world_with_walls(2);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::Script("moved".into()))
                .persistent(),
        );
        for _ in 0..3 {
            pulse_move(&mut world, walls[0]);
        }
        assert_eq!(recorder.count("moved"), 3);
    }

    #[test]
    fn test_other_kinds_do_not_fire() {
        let (mut world, walls, recorder) = world_with_walls(2);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Kill, walls[1], Handler::Script("dead".into())),
        );
        pulse_move(&mut world, walls[0]);
        assert_eq!(recorder.count("dead"), 0);
        world.kill(walls[0]);
        assert_eq!(recorder.count("dead"), 1);
    }

    #[test]
    fn test_guard_drops_subscription_of_dead_subscriber() {
        let (mut world, walls, recorder) = world_with_walls(2);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::Script("moved".into()))
                .persistent(),
        );
        assert!(world.is_subscriber(walls[0], walls[1]));

        world.kill(walls[1]);
        assert!(!world.is_subscriber(walls[0], walls[1]));
        pulse_move(&mut world, walls[0]);
        assert_eq!(recorder.count("moved"), 0);
        assert_eq!(world.entity(walls[0]).map(|e| e.notify.len()), Some(0));
    }

    #[test]
    fn test_unsubscribe_removes_guard_back_link() {
        let (mut world, walls, _) = world_with_walls(2);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::FollowSender).persistent(),
        );
        assert!(world.is_subscriber(walls[1], walls[0]));
        world.unsubscribe(walls[0], walls[1]);
        assert!(!world.is_subscriber(walls[0], walls[1]));
        assert!(!world.is_subscriber(walls[1], walls[0]));
    }

    #[test]
    fn test_spent_once_entry_drops_back_link() {
        let (mut world, walls, recorder) = world_with_walls(2);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::Script("moved".into())),
        );
        assert!(world.is_subscriber(walls[1], walls[0]));
        pulse_move(&mut world, walls[0]);
        assert_eq!(recorder.count("moved"), 1);
        assert!(!world.is_subscriber(walls[1], walls[0]));

        // Killing the former publisher later touches nothing on the subscriber
        world.kill(walls[0]);
        assert_eq!(world.entity(walls[1]).map(|e| e.notify.len()), Some(0));
    }

    #[test]
    fn test_back_link_kept_while_another_guarded_entry_remains() {
        let (mut world, walls, recorder) = world_with_walls(2);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::Script("once".into())),
        );
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::Script("always".into()))
                .persistent(),
        );
        pulse_move(&mut world, walls[0]);
        assert!(world.is_subscriber(walls[1], walls[0]));

        world.kill(walls[1]);
        pulse_move(&mut world, walls[0]);
        assert_eq!(recorder.count("always"), 1);
        assert_eq!(world.entity(walls[0]).map(|e| e.notify.len()), Some(0));
    }

    #[test]
    fn test_killed_publisher_clears_back_links() {
        let (mut world, walls, _) = world_with_walls(3);
        for &sub in &walls[1..] {
            world.subscribe(
                walls[0],
                Subscription::new(NotifyKind::Move, sub, Handler::FollowSender).persistent(),
            );
        }
        world.kill(walls[0]);
        for &sub in &walls[1..] {
            assert!(world.is_alive(sub));
            assert_eq!(world.entity(sub).map(|e| e.notify.len()), Some(0));
        }
    }

    #[test]
    fn test_prune_drops_stale_back_links() {
        let (mut world, walls, _) = world_with_walls(2);
        world.subscribe(
            walls[1],
            Subscription::new(NotifyKind::Kill, walls[0], Handler::DropSubscriber).unguarded(),
        );
        world.subscribe(
            walls[1],
            Subscription::new(NotifyKind::Move, walls[1], Handler::FollowSender).persistent(),
        );
        // Free walls[0] without going through its own cleanup
        let handle = walls[0].0;
        world.entities.free(handle).unwrap();

        world.prune_back_links();
        let entity = world.entity(walls[1]).unwrap();
        assert_eq!(entity.notify.len(), 1);
        assert!(entity.notify.live().all(|n| n.handler == Handler::FollowSender));
    }

    #[test]
    fn test_subscriber_killed_mid_pulse_keeps_dispatching() {
        let (mut world, walls, recorder) = world_with_walls(3);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::KillSelf),
        );
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[2], Handler::Script("after".into())),
        );
        pulse_move(&mut world, walls[0]);
        assert!(!world.is_alive(walls[1]));
        assert_eq!(recorder.count("after"), 1);
    }

    #[test]
    fn test_publisher_killed_mid_pulse() {
        let (mut world, walls, recorder) = world_with_walls(2);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[0], Handler::KillSelf),
        );
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::Script("late".into())),
        );
        pulse_move(&mut world, walls[0]);
        assert!(!world.is_alive(walls[0]));
        // The publisher's list was cleared by the kill, so the later entry is skipped
        assert_eq!(recorder.count("late"), 0);
        // Storage released once the pulse let go of it
        assert!(world.entity(walls[0]).is_none());
    }

    #[test]
    fn test_damage_filter_can_rewrite_param() {
        let (mut world, walls, _) = world_with_walls(2);
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::DamageFilter, walls[1], Handler::AbsorbDamage)
                .persistent(),
        );
        let mut param = NotifyParam::Damage(DamageDesc {
            damage: 25.0,
            hit: Vec2::ZERO,
            from: None,
        });
        world.pulse_notify(walls[0], NotifyKind::DamageFilter, &mut param);
        assert_eq!(
            param,
            NotifyParam::Damage(DamageDesc {
                damage: 0.0,
                hit: Vec2::ZERO,
                from: None
            })
        );
    }

    #[test]
    fn test_subscriber_of_type() {
        let (mut world, walls, _) = world_with_walls(2);
        assert_eq!(
            world.subscriber_of_type(walls[0], NotifyKind::Move, ObjectType::WallBrick),
            None
        );
        world.subscribe(
            walls[0],
            Subscription::new(NotifyKind::Move, walls[1], Handler::FollowSender),
        );
        assert_eq!(
            world.subscriber_of_type(walls[0], NotifyKind::Move, ObjectType::WallBrick),
            Some(walls[1])
        );
        assert_eq!(
            world.subscriber_of_type(walls[0], NotifyKind::Move, ObjectType::Vehicle),
            None
        );
    }
}
