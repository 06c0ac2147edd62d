//! 27-cell neighbor lookup over the sorted hash entries and offset table.
//!
//! Uses sorted-entry + cell-offset arrays rather than `HashMap` so the data
//! layout maps directly to GPU buffers (no pointer chasing).

use glam::Vec3;

use crate::hash::{cell_coord, hash_cell, HashEntry};
use crate::offsets::{build_offsets, OffsetTable, EMPTY_CELL};
use crate::sort::bitonic_sort;
use crate::error::SortError;

/// Borrowed view of one step's spatial acceleration structure.
///
/// Cell size equals the smoothing radius, so the 27 (3x3x3) cells around a
/// particle contain every neighbor within that radius.
pub struct CellLookup<'a, O: OffsetTable + ?Sized> {
    sorted: &'a [HashEntry],
    offsets: &'a O,
    cell_size: f32,
    table_size: u32,
}

impl<'a, O: OffsetTable + ?Sized> CellLookup<'a, O> {
    /// Wrap sorted entries and their offset table. `table_size` is N.
    pub fn new(sorted: &'a [HashEntry], offsets: &'a O, cell_size: f32, table_size: u32) -> Self {
        Self {
            sorted,
            offsets,
            cell_size,
            table_size,
        }
    }

    /// Distinct hashes of the 27 cells around `position`, in visiting order.
    ///
    /// Neighboring cells may collide to the same hash; each hash is listed once
    /// so no run is scanned twice.
    pub fn neighbor_hashes(&self, position: Vec3) -> ([u32; 27], usize) {
        let center = cell_coord(position, self.cell_size);
        let mut hashes = [0u32; 27];
        let mut count = 0;
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let h = hash_cell(center + glam::IVec3::new(dx, dy, dz), self.table_size);
                    if !hashes[..count].contains(&h) {
                        hashes[count] = h;
                        count += 1;
                    }
                }
            }
        }
        (hashes, count)
    }

    /// Visit every particle within `radius` of particle `particle_idx`,
    /// including the particle itself.
    ///
    /// The closure receives the neighbor id, the offset `pos_i - pos_j` and
    /// the distance.
    pub fn for_each_neighbor<F>(&self, particle_idx: usize, positions: &[Vec3], radius: f32, mut f: F)
    where
        F: FnMut(usize, Vec3, f32),
    {
        let pi = positions[particle_idx];
        let radius_sq = radius * radius;
        let (hashes, count) = self.neighbor_hashes(pi);

        for &h in &hashes[..count] {
            let start = self.offsets.start_of(h);
            if start == EMPTY_CELL {
                continue;
            }
            let mut s = start as usize;
            while s < self.sorted.len() && self.sorted[s].hash == h {
                let j = self.sorted[s].index as usize;
                s += 1;
                let delta = pi - positions[j];
                let dist_sq = delta.length_squared();
                if dist_sq <= radius_sq {
                    f(j, delta, dist_sq.sqrt());
                }
            }
        }
    }

    /// Ids of every particle within `radius` of `particle_idx`, self included.
    pub fn neighbors(&self, particle_idx: usize, positions: &[Vec3], radius: f32) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_neighbor(particle_idx, positions, radius, |j, _, _| out.push(j));
        out
    }
}

/// Owned hash/sort/offset arrays, built on the host or downloaded from a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborTable {
    /// Entries sorted by `(hash, index)`, padding last.
    pub sorted: Vec<HashEntry>,
    /// First sorted position per hash.
    pub offsets: Vec<u32>,
    /// Hash cell size.
    pub cell_size: f32,
}

impl NeighborTable {
    /// Hash, sort and index `positions` sequentially. `sort_len` must be a
    /// power of two no smaller than the particle count.
    pub fn build(positions: &[Vec3], cell_size: f32, sort_len: usize) -> Result<Self, SortError> {
        let mut sorted: Vec<HashEntry> = (0..sort_len)
            .map(|lane| crate::hash::hash_lane(lane, positions, cell_size))
            .collect();
        bitonic_sort(&mut sorted)?;
        let offsets = build_offsets(&sorted, positions.len());
        Ok(Self {
            sorted,
            offsets,
            cell_size,
        })
    }

    /// Borrow as a lookup.
    pub fn lookup(&self) -> CellLookup<'_, [u32]> {
        CellLookup::new(&self.sorted, self.offsets.as_slice(), self.cell_size, self.offsets.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(positions: &[Vec3], r: f32) -> NeighborTable {
        NeighborTable::build(positions, r, positions.len().next_power_of_two()).unwrap()
    }

    #[test]
    fn single_particle_sees_only_itself() {
        let p = [Vec3::splat(0.5)];
        let t = table(&p, 0.2);
        assert_eq!(t.lookup().neighbors(0, &p, 0.2), vec![0]);
    }

    #[test]
    fn two_close_particles() {
        let p = [Vec3::new(0.5, 0.5, 0.5), Vec3::new(0.51, 0.5, 0.5)];
        let t = table(&p, 0.2);
        let mut n0 = t.lookup().neighbors(0, &p, 0.2);
        n0.sort();
        assert_eq!(n0, vec![0, 1]);
        let mut n1 = t.lookup().neighbors(1, &p, 0.2);
        n1.sort();
        assert_eq!(n1, vec![0, 1]);
    }

    #[test]
    fn two_far_particles() {
        let p = [Vec3::splat(0.1), Vec3::splat(0.9)];
        let t = table(&p, 0.2);
        assert_eq!(t.lookup().neighbors(0, &p, 0.2), vec![0]);
    }

    #[test]
    fn particles_across_cell_boundary() {
        // Particle 0 near right edge of a cell, particle 1 near left edge of next cell
        let p = [Vec3::new(0.19, 0.5, 0.5), Vec3::new(0.21, 0.5, 0.5)];
        let t = table(&p, 0.2);
        assert!(t.lookup().neighbors(0, &p, 0.2).contains(&1));
    }

    #[test]
    fn negative_coordinates_across_origin() {
        let p = [Vec3::new(-0.05, 0.0, 0.0), Vec3::new(0.05, 0.0, 0.0)];
        let t = table(&p, 0.2);
        assert!(t.lookup().neighbors(0, &p, 0.2).contains(&1));
        assert!(t.lookup().neighbors(1, &p, 0.2).contains(&0));
    }

    #[test]
    fn many_particles_in_cluster() {
        let n = 10;
        // Place particles in a small cluster
        let p: Vec<Vec3> = (0..n).map(|i| Vec3::new(0.5 + i as f32 * 0.01, 0.5, 0.5)).collect();
        let t = table(&p, 0.2);
        assert_eq!(t.lookup().neighbors(0, &p, 0.2).len(), n);
    }

    #[test]
    fn colliding_cell_hashes_are_visited_once() {
        // Table of size 1: all 27 cells collide to hash 0
        let p = [Vec3::ZERO];
        let t = table(&p, 1.0);
        let lookup = t.lookup();
        let (_, count) = lookup.neighbor_hashes(Vec3::ZERO);
        assert_eq!(count, 1);
        assert_eq!(lookup.neighbors(0, &p, 1.0), vec![0]);
    }
}
