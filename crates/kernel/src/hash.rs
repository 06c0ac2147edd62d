//! Spatial hashing of particle positions into a table of size N.

use bytemuck::{Pod, Zeroable};
use glam::{IVec3, Vec3};

const PRIME_X: i32 = 73_856_093;
const PRIME_Y: i32 = 19_349_663;
const PRIME_Z: i32 = 83_492_791;

/// Hash value carried by padding entries; sorts after every real hash.
pub const PADDING_HASH: u32 = u32::MAX;

/// One `(hash, particle id)` pair of the sort buffer.
///
/// Ordering is lexicographic on `(hash, index)`, so distinct entries never
/// compare equal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
pub struct HashEntry {
    /// Cell hash in `[0, N)`, or [`PADDING_HASH`].
    pub hash: u32,
    /// Particle id, or a lane index `>= N` for padding.
    pub index: u32,
}

impl HashEntry {
    /// Padding entry for sort lane `lane`.
    pub fn padding(lane: u32) -> Self {
        Self {
            hash: PADDING_HASH,
            index: lane,
        }
    }

    /// `true` for padding entries.
    pub fn is_padding(&self) -> bool {
        self.hash == PADDING_HASH
    }
}

/// Integer cell coordinates of `position` for cells of edge `cell_size`.
///
/// Uses floor division, so `-0.1` lands in cell `-1`, not `0`.
#[inline]
pub fn cell_coord(position: Vec3, cell_size: f32) -> IVec3 {
    (position / cell_size).floor().as_ivec3()
}

/// Mix cell coordinates into a table slot in `[0, table_size)`.
#[inline]
pub fn hash_cell(cell: IVec3, table_size: u32) -> u32 {
    let h = cell.x.wrapping_mul(PRIME_X) ^ cell.y.wrapping_mul(PRIME_Y) ^ cell.z.wrapping_mul(PRIME_Z);
    (h as u32) % table_size
}

/// Table slot of the cell containing `position`.
#[inline]
pub fn hash_position(position: Vec3, cell_size: f32, table_size: u32) -> u32 {
    hash_cell(cell_coord(position, cell_size), table_size)
}

/// Work of one hash lane: a real entry for `lane < N`, padding otherwise.
#[inline]
pub fn hash_lane(lane: usize, positions: &[Vec3], cell_size: f32) -> HashEntry {
    match positions.get(lane) {
        Some(&p) => HashEntry {
            hash: hash_position(p, cell_size, positions.len() as u32),
            index: lane as u32,
        },
        None => HashEntry::padding(lane as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_not_truncation() {
        assert_eq!(cell_coord(Vec3::new(-0.1, 0.1, -1.0), 1.0), IVec3::new(-1, 0, -1));
        assert_eq!(cell_coord(Vec3::new(-2.5, 2.5, 0.0), 1.0), IVec3::new(-3, 2, 0));
        assert_eq!(cell_coord(Vec3::new(0.49, 0.5, 0.51), 0.5), IVec3::new(0, 1, 1));
    }

    #[test]
    fn same_cell_same_hash() {
        let a = hash_position(Vec3::new(0.1, 0.2, 0.3), 1.0, 64);
        let b = hash_position(Vec3::new(0.9, 0.8, 0.7), 1.0, 64);
        assert_eq!(a, b);
    }

    #[test]
    fn negative_cells_are_not_aliased_with_positive() {
        let neg = hash_cell(IVec3::new(-1, 0, 0), 1 << 20);
        let pos = hash_cell(IVec3::new(0, 0, 0), 1 << 20);
        let one = hash_cell(IVec3::new(1, 0, 0), 1 << 20);
        assert_ne!(neg, pos);
        assert_ne!(neg, one);
    }

    #[test]
    fn hash_is_bounded_by_table() {
        for x in -20..20 {
            for y in -5..5 {
                let h = hash_cell(IVec3::new(x, y, x * y), 37);
                assert!(h < 37);
            }
        }
    }

    #[test]
    fn hash_lane_pads_past_particle_count() {
        let positions = [Vec3::ZERO, Vec3::ONE, Vec3::NEG_ONE];
        let e = hash_lane(1, &positions, 0.5);
        assert_eq!(e.index, 1);
        assert!(e.hash < 3);
        let pad = hash_lane(3, &positions, 0.5);
        assert!(pad.is_padding());
        assert_eq!(pad.index, 3);
    }

    #[test]
    fn entries_order_by_hash_then_index() {
        let a = HashEntry { hash: 1, index: 9 };
        let b = HashEntry { hash: 2, index: 0 };
        let c = HashEntry { hash: 2, index: 1 };
        assert!(a < b && b < c);
        assert!(c < HashEntry::padding(0));
    }
}
