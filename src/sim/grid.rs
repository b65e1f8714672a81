//! Uniform grid bucketing for the repulsion pass
//!
//! With a cell size equal to the repulsion radius, every bubble within range
//! of a point lies in the 3x3 block of cells around it.

use std::collections::HashMap;

use glam::Vec2;

pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: HashMap::new(),
        }
    }

    #[inline]
    fn cell_of(&self, pos: Vec2) -> (i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    /// Re-bucket all positions (index = position in the slice)
    pub fn rebuild(&mut self, positions: &[Vec2]) {
        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
        for (i, &pos) in positions.iter().enumerate() {
            let cell = self.cell_of(pos);
            self.cells.entry(cell).or_default().push(i);
        }
    }

    /// Collect the indices in the 3x3 block around `pos` into `out`
    pub fn query_neighbors(&self, pos: Vec2, out: &mut Vec<usize>) {
        out.clear();
        let (cx, cy) = self.cell_of(pos);
        for dy in -1..=1 {
            for dx in -1..=1 {
                if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy)) {
                    out.extend_from_slice(bucket);
                }
            }
        }
        // Keep pair iteration order identical to the all-pairs scan
        out.sort_unstable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors_cover_radius() {
        let positions = [
            Vec2::new(0.0, 0.0),
            Vec2::new(119.0, 0.0),
            Vec2::new(241.0, 0.0),
            Vec2::new(-60.0, 100.0),
        ];
        let mut grid = SpatialGrid::new(120.0);
        grid.rebuild(&positions);

        let mut out = Vec::new();
        grid.query_neighbors(positions[0], &mut out);
        assert!(out.contains(&0));
        assert!(out.contains(&1));
        assert!(out.contains(&3));
        assert!(!out.contains(&2));
    }

    #[test]
    fn test_rebuild_forgets_old_positions() {
        let mut grid = SpatialGrid::new(120.0);
        grid.rebuild(&[Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)]);
        grid.rebuild(&[Vec2::new(1000.0, 1000.0)]);

        let mut out = Vec::new();
        grid.query_neighbors(Vec2::ZERO, &mut out);
        assert!(out.is_empty());
        grid.query_neighbors(Vec2::new(1000.0, 1000.0), &mut out);
        assert_eq!(out, vec![0]);
    }
}
