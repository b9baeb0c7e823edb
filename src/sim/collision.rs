//! Collision geometry for oriented boxes
//!
//! Every rigid body is a rectangle rotated by a unit direction vector. Traces
//! run an exact segment-vs-edge test over the four box vertices. Only edges
//! facing the segment count, so a segment that starts inside a box leaves it
//! without reporting a hit.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center(center: Vec2, half: Vec2) -> Self {
        Self::new(center - half, center + half)
    }

    /// Bounding rectangle of the segment `[origin, origin + displacement]`
    pub fn around_segment(origin: Vec2, displacement: Vec2) -> Self {
        Self::new(origin, origin + displacement)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Squared distance from a point to the rectangle (0 inside)
    pub fn distance_sq(&self, p: Vec2) -> f32 {
        let clamped = p.clamp(self.min, self.max);
        (p - clamped).length_squared()
    }
}

/// Oriented box: center, unit direction of the long axis, half extents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    pub center: Vec2,
    pub dir: Vec2,
    pub half: Vec2,
}

impl Obb {
    pub fn new(center: Vec2, dir: Vec2, half: Vec2) -> Self {
        Self { center, dir, half }
    }

    /// Corner `i` in world space, counter-clockwise starting at (+x, +y)
    pub fn vertex(&self, i: usize) -> Vec2 {
        let h = self.half;
        let local = match i & 3 {
            0 => Vec2::new(h.x, h.y),
            1 => Vec2::new(-h.x, h.y),
            2 => Vec2::new(-h.x, -h.y),
            _ => Vec2::new(h.x, -h.y),
        };
        self.center + self.dir.rotate(local)
    }

    pub fn vertices(&self) -> [Vec2; 4] {
        [self.vertex(0), self.vertex(1), self.vertex(2), self.vertex(3)]
    }

    pub fn aabb(&self) -> Rect {
        let ext = Vec2::new(
            self.dir.x.abs() * self.half.x + self.dir.y.abs() * self.half.y,
            self.dir.y.abs() * self.half.x + self.dir.x.abs() * self.half.y,
        );
        Rect::from_center(self.center, ext)
    }
}

/// Intersection of a segment with one box edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeHit {
    /// Fraction of the displacement travelled before the hit, in `[0, 1]`
    pub fraction: f32,
    /// Outward normal of the edge that was hit
    pub normal: Vec2,
}

/// Nearest front-facing edge of `obb` crossed by `[origin, origin + path]`
pub fn segment_obb(origin: Vec2, path: Vec2, obb: &Obb) -> Option<EdgeHit> {
    let m = obb.vertices();
    let mut best: Option<EdgeHit> = None;

    for n in 0..4 {
        let a = m[n];
        let b = m[(n + 1) & 3] - a;
        let delta = path.y * b.x - path.x * b.y;
        if delta <= 0.0 {
            continue;
        }
        let rel = a - origin;
        // Position along the edge
        let tb = (path.x * rel.y - path.y * rel.x) / delta;
        if !(0.0..=1.0).contains(&tb) {
            continue;
        }
        // Position along the path
        let t = (b.x * rel.y - b.y * rel.x) / delta;
        if !(0.0..=1.0).contains(&t) {
            continue;
        }
        if best.is_none_or(|hit| t < hit.fraction) {
            best = Some(EdgeHit {
                fraction: t,
                normal: Vec2::new(b.y, -b.x).normalize_or_zero(),
            });
        }
    }

    best
}

/// Separating-axis overlap test for two oriented boxes
pub fn obb_overlap(a: &Obb, b: &Obb) -> bool {
    let d = b.center - a.center;
    let axes = [a.dir, a.dir.perp(), b.dir, b.dir.perp()];
    axes.iter().all(|axis| {
        let ra = a.half.x * a.dir.dot(*axis).abs() + a.half.y * a.dir.perp().dot(*axis).abs();
        let rb = b.half.x * b.dir.dot(*axis).abs() + b.half.y * b.dir.perp().dot(*axis).abs();
        d.dot(*axis).abs() < ra + rb
    })
}

/// Reflect a velocity off a surface with the given unit normal
pub fn reflect_velocity(velocity: Vec2, normal: Vec2) -> Vec2 {
    velocity - 2.0 * velocity.dot(normal) * normal
}
