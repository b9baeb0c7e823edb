//! Deterministic network RNG
//!
//! Every gameplay-affecting random number comes from one seeded PCG stream
//! shared by all peers. Only the seed and the number of draws are saved; a
//! loaded stream is restored by jumping ahead instead of storing raw state.

use glam::Vec2;
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::polar_to_cartesian;

/// Persisted form of [`NetRng`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
    pub draws: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RngState", into = "RngState")]
pub struct NetRng {
    seed: u64,
    draws: u64,
    rng: Pcg32,
}

impl NetRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            draws: 0,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    pub fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            draws: self.draws,
        }
    }

    /// Raw 32-bit draw
    pub fn net_rand(&mut self) -> u32 {
        self.draws += 1;
        self.rng.next_u32()
    }

    /// Uniform float in `[0, max)`
    pub fn net_frand(&mut self, max: f32) -> f32 {
        let unit = (self.net_rand() >> 8) as f32 / (1u32 << 24) as f32;
        unit * max
    }

    /// Vector of length `len` pointing in a random direction
    pub fn net_vrand(&mut self, len: f32) -> Vec2 {
        polar_to_cartesian(len, self.net_frand(std::f32::consts::TAU))
    }
}

impl From<RngState> for NetRng {
    fn from(state: RngState) -> Self {
        let mut rng = Pcg32::seed_from_u64(state.seed);
        rng.advance(state.draws);
        Self {
            seed: state.seed,
            draws: state.draws,
            rng,
        }
    }
}

impl From<NetRng> for RngState {
    fn from(rng: NetRng) -> Self {
        rng.state()
    }
}
