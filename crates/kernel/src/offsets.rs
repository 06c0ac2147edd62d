//! Cell offset table: first sorted position of every occupied hash.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::hash::HashEntry;

/// Offset of a hash with no particles.
pub const EMPTY_CELL: u32 = u32::MAX;

/// Read access to an offset table, plain or atomic.
pub trait OffsetTable: Sync {
    /// First sorted position for `hash`, or [`EMPTY_CELL`].
    fn start_of(&self, hash: u32) -> u32;
}

impl OffsetTable for [u32] {
    #[inline]
    fn start_of(&self, hash: u32) -> u32 {
        self[hash as usize]
    }
}

impl OffsetTable for Vec<u32> {
    #[inline]
    fn start_of(&self, hash: u32) -> u32 {
        self[hash as usize]
    }
}

impl OffsetTable for [AtomicU32] {
    #[inline]
    fn start_of(&self, hash: u32) -> u32 {
        self[hash as usize].load(Ordering::Relaxed)
    }
}

/// Work of one offset lane: `Some((hash, lane))` when `lane` starts a run.
///
/// Padding entries never start a run.
#[inline]
pub fn offset_lane(sorted: &[HashEntry], lane: usize) -> Option<(u32, u32)> {
    let entry = sorted[lane];
    if entry.is_padding() {
        return None;
    }
    if lane == 0 || sorted[lane - 1].hash != entry.hash {
        Some((entry.hash, lane as u32))
    } else {
        None
    }
}

/// Build a table of `table_size` slots from a sorted entry array.
pub fn build_offsets(sorted: &[HashEntry], table_size: usize) -> Vec<u32> {
    let mut offsets = vec![EMPTY_CELL; table_size];
    for lane in 0..sorted.len() {
        if let Some((hash, start)) = offset_lane(sorted, lane) {
            offsets[hash as usize] = start;
        }
    }
    offsets
}
