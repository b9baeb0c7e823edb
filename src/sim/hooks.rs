//! Outbound interfaces to collaborators outside the simulation
//!
//! Effects (particles, sounds, lights) are fire-and-forget: nothing the
//! simulation does depends on them. Script hooks may fail; the world logs
//! the failure and carries on.

use glam::Vec2;

use super::entity::EntityId;
use crate::error::ScriptError;

/// Visual particle families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleKind {
    Smoke,
    Spark,
    Fire,
    Plasma,
    GaussTrail,
    DiskTrail,
    Debris,
    Blast,
    ShieldHit,
    Bfg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    Explosion,
    BigExplosion,
    BulletHit,
    RocketHit,
    DiskHit,
    PlasmaHit,
    Pickup,
    Shield,
    ShieldHit,
    ShieldEnd,
    ShockActivate,
    BfgFire,
    BfgFlash,
    Destroyed,
}

/// Presentation callbacks. Every method defaults to doing nothing.
pub trait Effects {
    fn spawn_particle(&mut self, _kind: ParticleKind, _pos: Vec2, _vel: Vec2) {}

    fn play_sound(&mut self, _sound: Sound, _pos: Vec2) {}

    /// Short-lived point light
    fn light_flash(&mut self, _pos: Vec2, _radius: f32, _intensity: f32, _timeout: f32) {}

    /// Light attached to an entity, e.g. a fading explosion
    fn set_light_intensity(&mut self, _source: EntityId, _intensity: f32) {}
}

/// Discards every effect
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEffects;

impl Effects for NullEffects {}

/// Argument passed to a script fragment
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    Entity(EntityId),
    Name(String),
}

/// Compiles and calls script fragments
pub trait ScriptHost {
    fn exec(&mut self, source: &str, args: &[ScriptArg]) -> Result<(), ScriptError>;
}

/// Accepts every fragment without running it
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScripts;

impl ScriptHost for NullScripts {
    fn exec(&mut self, _source: &str, _args: &[ScriptArg]) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// Logs each call instead of running it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogScripts;

impl ScriptHost for LogScripts {
    fn exec(&mut self, source: &str, args: &[ScriptArg]) -> Result<(), ScriptError> {
        log::info!("script: {source} {args:?}");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Records every script call; fragments starting with `!` fail
    #[derive(Debug, Default, Clone)]
    pub(crate) struct Recorder {
        pub calls: Rc<RefCell<Vec<(String, Vec<ScriptArg>)>>>,
    }

    impl Recorder {
        pub fn count(&self, source: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|(s, _)| s == source)
                .count()
        }
    }

    impl ScriptHost for Recorder {
        fn exec(&mut self, source: &str, args: &[ScriptArg]) -> Result<(), ScriptError> {
            self.calls
                .borrow_mut()
                .push((source.to_string(), args.to_vec()));
            match source.strip_prefix('!') {
                Some(msg) => Err(ScriptError::Runtime(msg.to_string())),
                None => Ok(()),
            }
        }
    }

    /// Records particle and sound calls
    #[derive(Debug, Default, Clone)]
    pub(crate) struct EffectLog {
        pub spawned: Rc<RefCell<Vec<ParticleKind>>>,
        pub sounds: Rc<RefCell<Vec<Sound>>>,
    }

    impl EffectLog {
        pub fn particles(&self, kind: ParticleKind) -> usize {
            self.spawned.borrow().iter().filter(|k| **k == kind).count()
        }

        pub fn played(&self, sound: Sound) -> usize {
            self.sounds.borrow().iter().filter(|s| **s == sound).count()
        }
    }

    impl Effects for EffectLog {
        fn spawn_particle(&mut self, kind: ParticleKind, _pos: Vec2, _vel: Vec2) {
            self.spawned.borrow_mut().push(kind);
        }

        fn play_sound(&mut self, sound: Sound, _pos: Vec2) {
            self.sounds.borrow_mut().push(sound);
        }
    }
}
