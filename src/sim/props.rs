//! Map property exchange
//!
//! Map files and editors describe objects as flat key/value sets. Each kind
//! that can be placed on a map reads its fields from [`MapProperties`] with a
//! default for every missing key, and writes them back the same way.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::body::WallKind;
use super::entity::{EntityId, EntityKind, ObjectType};
use super::pickup::{DEFAULT_RESPAWN_TIME, Pickup, PickupKind};
use super::trigger::Trigger;
use super::world::World;
use crate::consts::{CELL_SIZE, MAX_TEAMS};
use crate::error::SimError;

/// Largest trigger radius accepted from a map, in cells
const MAX_TRIGGER_RADIUS: i32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Int(i32),
    Float(f32),
    Str(String),
}

/// Key/value fields of one map object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapProperties {
    values: BTreeMap<String, PropValue>,
}

impl MapProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: PropValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: PropValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn int(&self, key: &str, default: i32) -> i32 {
        match self.values.get(key) {
            Some(PropValue::Int(v)) => *v,
            Some(PropValue::Float(v)) => *v as i32,
            _ => default,
        }
    }

    /// Integer clamped to `[min, max]`
    pub fn int_in(&self, key: &str, default: i32, min: i32, max: i32) -> i32 {
        let value = self.int(key, default);
        if !(min..=max).contains(&value) {
            log::warn!("map property `{key}` = {value} out of range {min}..={max}");
        }
        value.clamp(min, max)
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.int(key, i32::from(default)) != 0
    }

    pub fn float(&self, key: &str, default: f32) -> f32 {
        match self.values.get(key) {
            Some(PropValue::Float(v)) => *v,
            Some(PropValue::Int(v)) => *v as f32,
            _ => default,
        }
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(PropValue::Str(v)) => v.clone(),
            _ => default.to_string(),
        }
    }

    pub fn set_int(&mut self, key: &str, value: i32) {
        self.set(key, PropValue::Int(value));
    }

    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.set_int(key, i32::from(value));
    }

    pub fn set_float(&mut self, key: &str, value: f32) {
        self.set(key, PropValue::Float(value));
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.set(key, PropValue::Str(value.to_string()));
    }
}

/// Two-way conversion between a kind's state and map fields
pub trait MapExchange {
    fn read_props(&mut self, props: &MapProperties);
    fn write_props(&self, props: &mut MapProperties);
}

impl MapExchange for Trigger {
    fn read_props(&mut self, props: &MapProperties) {
        self.enabled = props.flag("active", true);
        self.only_visible = props.flag("only_visible", false);
        self.only_human = props.flag("only_human", false);
        self.team = props.int_in("team", 0, 0, MAX_TEAMS);
        self.radius = props.float("radius", 1.0).clamp(0.0, MAX_TRIGGER_RADIUS as f32);
        self.radius_delta = props.float("radius_delta", 0.0);
        self.on_enter = props.string("on_enter", "");
        self.on_leave = props.string("on_leave", "");
    }

    fn write_props(&self, props: &mut MapProperties) {
        props.set_flag("active", self.enabled);
        props.set_flag("only_visible", self.only_visible);
        props.set_flag("only_human", self.only_human);
        props.set_int("team", self.team);
        props.set_float("radius", self.radius);
        props.set_float("radius_delta", self.radius_delta);
        props.set_string("on_enter", &self.on_enter);
        props.set_string("on_leave", &self.on_leave);
    }
}

impl MapExchange for Pickup {
    fn read_props(&mut self, props: &MapProperties) {
        self.respawn_time = props.float("respawn_time", DEFAULT_RESPAWN_TIME);
        self.on_pickup = props.string("on_pickup", "");
    }

    fn write_props(&self, props: &mut MapProperties) {
        props.set_float("respawn_time", self.respawn_time);
        props.set_string("on_pickup", &self.on_pickup);
    }
}

impl World {
    /// Place an object described by map fields. Pickups placed this way
    /// respawn where they were put.
    pub fn spawn_from_map(
        &mut self,
        type_name: &str,
        pos: Vec2,
        props: &MapProperties,
    ) -> Result<EntityId, SimError> {
        let ty = ObjectType::from_name(type_name)
            .ok_or_else(|| SimError::UnknownType(type_name.to_string()))?;
        let cell = Vec2::splat(CELL_SIZE);

        let id = match ty {
            ObjectType::WallBrick => self.spawn_wall(pos, cell, WallKind::Brick)?,
            ObjectType::WallConcrete => self.spawn_wall(pos, cell, WallKind::Concrete)?,
            ObjectType::PickupHealth
            | ObjectType::PickupMine
            | ObjectType::PickupShield
            | ObjectType::PickupShock => {
                let kind = ty.pickup_kind().unwrap_or(PickupKind::Health);
                let mut pickup = Pickup::new(kind, pos, true);
                pickup.read_props(props);
                self.spawn(pos, EntityKind::Pickup(pickup))?
            }
            ObjectType::Trigger => {
                let mut trigger = Trigger::default();
                trigger.read_props(props);
                self.spawn_trigger(pos, trigger)?
            }
            _ => return Err(SimError::UnknownType(type_name.to_string())),
        };

        let name = props.string("name", "");
        if !name.is_empty() {
            self.set_name(id, Some(name.as_str()));
        }
        Ok(id)
    }

    /// Map fields of an entity, or `None` if it is gone
    pub fn export_properties(&self, id: EntityId) -> Option<MapProperties> {
        let entity = self.entity(id)?;
        let mut props = MapProperties::new();
        if let Some(name) = &entity.name {
            props.set_string("name", name);
        }
        match &entity.kind {
            EntityKind::Trigger(trigger) => trigger.write_props(&mut props),
            EntityKind::Pickup(pickup) => pickup.write_props(&mut props),
            _ => {}
        }
        Some(props)
    }
}
