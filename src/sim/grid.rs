//! Uniform grid spatial index
//!
//! The world is cut into square cells, each holding an unordered list of the
//! rigid bodies whose bounding box touches it. Every entity remembers its
//! (cell, slot) pairs so removal swaps it out of each list without a scan.
//! Queries return whole cell lists; callers do the precise shape tests.

use std::collections::{HashMap, HashSet};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::collision::{Rect, segment_obb};
use super::entity::EntityId;
use super::world::World;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialGrid {
    cell_size: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<EntityId>>,
    /// Rebuilt from `cells` after loading
    #[serde(skip)]
    membership: HashMap<EntityId, Vec<(usize, usize)>>,
}

impl SpatialGrid {
    pub fn new(size: Vec2, cell_size: f32) -> Self {
        let cols = ((size.x / cell_size).ceil() as usize).max(1);
        let rows = ((size.y / cell_size).ceil() as usize).max(1);
        Self {
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
            membership: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Cell containing `p`, clamped to the grid
    pub fn cell_coord(&self, p: Vec2) -> (usize, usize) {
        let cx = (p.x / self.cell_size).floor().clamp(0.0, (self.cols - 1) as f32) as usize;
        let cy = (p.y / self.cell_size).floor().clamp(0.0, (self.rows - 1) as f32) as usize;
        (cx, cy)
    }

    /// World-space bounds of a cell index
    pub fn cell_rect(&self, index: usize) -> Rect {
        let (cx, cy) = (index % self.cols, index / self.cols);
        let min = Vec2::new(cx as f32, cy as f32) * self.cell_size;
        Rect::new(min, min + Vec2::splat(self.cell_size))
    }

    fn cell_indices(&self, rect: Rect) -> impl Iterator<Item = usize> + '_ {
        let (x0, y0) = self.cell_coord(rect.min);
        let (x1, y1) = self.cell_coord(rect.max);
        (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| y * self.cols + x))
    }

    pub fn insert(&mut self, id: EntityId, bounds: Rect) {
        debug_assert!(!self.membership.contains_key(&id), "{id} inserted twice");
        let indices: Vec<usize> = self.cell_indices(bounds).collect();
        let mut slots = Vec::with_capacity(indices.len());
        for cell in indices {
            slots.push((cell, self.cells[cell].len()));
            self.cells[cell].push(id);
        }
        self.membership.insert(id, slots);
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(slots) = self.membership.remove(&id) else {
            return false;
        };
        for (cell, slot) in slots {
            let list = &mut self.cells[cell];
            list.swap_remove(slot);
            let old_last = list.len();
            let Some(&moved) = list.get(slot) else {
                continue;
            };
            if let Some(entries) = self.membership.get_mut(&moved) {
                for entry in entries.iter_mut().filter(|e| **e == (cell, old_last)) {
                    entry.1 = slot;
                }
            }
        }
        true
    }

    pub fn update(&mut self, id: EntityId, bounds: Rect) {
        self.remove(id);
        self.insert(id, bounds);
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.membership.contains_key(&id)
    }

    /// Cell indices the entity is registered in
    pub fn cells_of(&self, id: EntityId) -> Vec<usize> {
        self.membership
            .get(&id)
            .map(|slots| slots.iter().map(|(cell, _)| *cell).collect())
            .unwrap_or_default()
    }

    pub fn overlap_rect<'a>(&'a self, out: &mut Vec<&'a [EntityId]>, rect: Rect) {
        out.extend(self.cell_indices(rect).map(|i| self.cells[i].as_slice()));
    }

    pub fn overlap_circle<'a>(&'a self, out: &mut Vec<&'a [EntityId]>, center: Vec2, radius: f32) {
        let bounds = Rect::from_center(center, Vec2::splat(radius));
        let rr = radius * radius;
        out.extend(
            self.cell_indices(bounds)
                .filter(|i| self.cell_rect(*i).distance_sq(center) <= rr)
                .map(|i| self.cells[i].as_slice()),
        );
    }

    pub fn overlap_point<'a>(&'a self, out: &mut Vec<&'a [EntityId]>, p: Vec2) {
        let (cx, cy) = self.cell_coord(p);
        out.push(self.cells[cy * self.cols + cx].as_slice());
    }

    /// Distinct ids from the cells touching `rect`, in first-seen order
    pub fn collect_rect(&self, rect: Rect) -> Vec<EntityId> {
        let mut lists = Vec::new();
        self.overlap_rect(&mut lists, rect);
        dedup(lists)
    }

    pub fn collect_circle(&self, center: Vec2, radius: f32) -> Vec<EntityId> {
        let mut lists = Vec::new();
        self.overlap_circle(&mut lists, center, radius);
        dedup(lists)
    }

    pub fn collect_point(&self, p: Vec2) -> Vec<EntityId> {
        let mut lists = Vec::new();
        self.overlap_point(&mut lists, p);
        dedup(lists)
    }

    /// Rebuild membership handles from the cell lists
    pub fn reindex(&mut self) {
        self.membership.clear();
        for (cell, list) in self.cells.iter().enumerate() {
            for (slot, id) in list.iter().enumerate() {
                self.membership.entry(*id).or_default().push((cell, slot));
            }
        }
    }
}

fn dedup(lists: Vec<&[EntityId]>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Nearest body crossed by a trace
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceHit {
    pub entity: EntityId,
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction of the displacement travelled before the hit
    pub fraction: f32,
}

impl World {
    /// Nearest non-phantom body crossed by `[origin, origin + displacement]`
    pub fn trace(
        &self,
        ignore: Option<EntityId>,
        origin: Vec2,
        displacement: Vec2,
    ) -> Option<TraceHit> {
        let mut best: Option<TraceHit> = None;
        let candidates = self
            .grid
            .collect_rect(Rect::around_segment(origin, displacement));

        for id in candidates {
            if Some(id) == ignore {
                continue;
            }
            let Some(entity) = self.entity(id) else {
                continue;
            };
            if entity.is_killed() {
                continue;
            }
            let Some(body) = entity.kind.as_body() else {
                continue;
            };
            if body.phantom {
                continue;
            }
            let Some(hit) = segment_obb(origin, displacement, &body.obb(entity.pos)) else {
                continue;
            };
            if best.is_none_or(|b| hit.fraction < b.fraction) {
                best = Some(TraceHit {
                    entity: id,
                    point: origin + displacement * hit.fraction,
                    normal: hit.normal,
                    fraction: hit.fraction,
                });
            }
        }

        best
    }

    /// Live rigid bodies registered in cells touching the circle
    pub fn bodies_near(&self, center: Vec2, radius: f32) -> Vec<EntityId> {
        self.grid
            .collect_circle(center, radius)
            .into_iter()
            .filter(|id| self.is_alive(*id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SimSettings;
    use crate::sim::body::WallKind;
    use crate::sim::pool::PoolHandle;
    use proptest::prelude::*;

    fn id(n: u32) -> EntityId {
        EntityId(PoolHandle {
            block: 0,
            slot: n,
            serial: n as u64 + 1,
        })
    }

    fn grid() -> SpatialGrid {
        SpatialGrid::new(Vec2::splat(1024.0), 128.0)
    }

    #[test]
    fn test_insert_spans_cells() {
        let mut g = grid();
        g.insert(id(0), Rect::from_center(Vec2::new(128.0, 128.0), Vec2::splat(10.0)));
        let mut cells = g.cells_of(id(0));
        cells.sort();
        assert_eq!(cells, vec![0, 1, 8, 9]);
    }

    #[test]
    fn test_remove_fixes_swapped_slot() {
        let mut g = grid();
        let rect = Rect::from_center(Vec2::new(60.0, 60.0), Vec2::splat(4.0));
        for n in 0..3 {
            g.insert(id(n), rect);
        }
        assert!(g.remove(id(0)));
        assert!(!g.remove(id(0)));
        // id(2) was swapped into slot 0 and must still come out cleanly
        assert!(g.remove(id(2)));
        assert_eq!(g.collect_point(Vec2::new(60.0, 60.0)), vec![id(1)]);
        assert!(g.remove(id(1)));
        assert!(g.collect_point(Vec2::new(60.0, 60.0)).is_empty());
    }

    #[test]
    fn test_reindex_matches_incremental() {
        let mut g = grid();
        for n in 0..5 {
            let c = Vec2::new(100.0 + 90.0 * n as f32, 300.0);
            g.insert(id(n), Rect::from_center(c, Vec2::splat(40.0)));
        }
        g.remove(id(2));
        let mut expected: Vec<_> = (0..5).map(|n| (n, g.cells_of(id(n)))).collect();
        g.reindex();
        let mut actual: Vec<_> = (0..5).map(|n| (n, g.cells_of(id(n)))).collect();
        expected.iter_mut().for_each(|(_, c)| c.sort());
        actual.iter_mut().for_each(|(_, c)| c.sort());
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_circle_skips_far_corner_cells() {
        let g = grid();
        let mut out = Vec::new();
        // Circle centred on a cell corner touches exactly the four cells around it
        g.overlap_circle(&mut out, Vec2::new(256.0, 256.0), 100.0);
        assert_eq!(out.len(), 4);
        out.clear();
        g.overlap_rect(&mut out, Rect::from_center(Vec2::new(256.0, 256.0), Vec2::splat(100.0)));
        assert_eq!(out.len(), 4);
        out.clear();
        g.overlap_circle(&mut out, Vec2::new(320.0, 320.0), 150.0);
        assert_eq!(out.len(), 9);
    }

    proptest! {
        #[test]
        fn prop_round_trip_after_move(
            x in 0.0f32..1024.0, y in 0.0f32..1024.0,
            nx in 0.0f32..1024.0, ny in 0.0f32..1024.0,
            half in 1.0f32..100.0,
        ) {
            let mut g = grid();
            let e = id(7);
            g.insert(e, Rect::from_center(Vec2::new(x, y), Vec2::splat(half)));
            let p = Vec2::new(nx, ny);
            g.update(e, Rect::from_center(p, Vec2::splat(half)));

            let spot = Rect::from_center(p, Vec2::splat(0.5));
            prop_assert!(g.collect_rect(spot).contains(&e));

            let occupied = g.cells_of(e);
            for cell in 0..64 {
                if occupied.contains(&cell) {
                    continue;
                }
                let r = g.cell_rect(cell);
                let inner = Rect::new(r.min + Vec2::splat(1.0), r.max - Vec2::splat(1.0));
                prop_assert!(!g.collect_rect(inner).contains(&e));
            }
        }
    }

    #[test]
    fn test_trace_returns_crossed_body_on_its_edge() {
        let mut world = World::new(&SimSettings::default());
        let near = world
            .spawn_wall(Vec2::new(200.0, 100.0), Vec2::splat(32.0), WallKind::Brick)
            .unwrap();
        let _aside = world
            .spawn_wall(Vec2::new(200.0, 300.0), Vec2::splat(32.0), WallKind::Brick)
            .unwrap();

        let hit = world
            .trace(None, Vec2::new(50.0, 110.0), Vec2::new(300.0, 0.0))
            .unwrap();
        assert_eq!(hit.entity, near);
        assert!((hit.point.x - 184.0).abs() < 0.001);
        assert!((hit.point.y - 110.0).abs() < 0.001);
        assert!((hit.normal - Vec2::new(-1.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_trace_nearest_wins_and_ignore_skips() {
        let mut world = World::new(&SimSettings::default());
        let first = world
            .spawn_wall(Vec2::new(200.0, 100.0), Vec2::splat(32.0), WallKind::Brick)
            .unwrap();
        let second = world
            .spawn_wall(Vec2::new(400.0, 100.0), Vec2::splat(32.0), WallKind::Concrete)
            .unwrap();
        let origin = Vec2::new(50.0, 100.0);
        let path = Vec2::new(500.0, 0.0);

        assert_eq!(world.trace(None, origin, path).map(|h| h.entity), Some(first));
        assert_eq!(
            world.trace(Some(first), origin, path).map(|h| h.entity),
            Some(second)
        );
        world.kill(first);
        assert_eq!(world.trace(None, origin, path).map(|h| h.entity), Some(second));
        assert!(world.trace(None, origin, Vec2::new(-40.0, 0.0)).is_none());
    }
}
