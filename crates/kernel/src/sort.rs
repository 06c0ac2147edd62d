//! Bitonic sorting network over hash entries.
//!
//! The network runs `log2(n)·(log2(n)+1)/2` passes. Within a pass every lane
//! is independent: it reads its own slot and its partner `lane ^ block` from
//! the previous buffer and writes only its own slot of the next one.

use crate::error::SortError;
use crate::hash::HashEntry;

/// The `(dim, block)` schedule of the network for a power-of-two `len`.
///
/// `dim` is the merge width (2, 4, …, len); `block` halves from `dim / 2` down to 1.
pub fn bitonic_passes(len: usize) -> Vec<(u32, u32)> {
    let mut passes = Vec::new();
    let mut dim = 2usize;
    while dim <= len {
        let mut block = dim >> 1;
        while block > 0 {
            passes.push((dim as u32, block as u32));
            block >>= 1;
        }
        dim <<= 1;
    }
    passes
}

/// Value lane `lane` holds after pass `(dim, block)`.
///
/// Lanes in an even `dim`-segment sort ascending, odd segments descending.
#[inline]
pub fn bitonic_lane(src: &[HashEntry], lane: usize, dim: usize, block: usize) -> HashEntry {
    let partner = lane ^ block;
    let mine = src[lane];
    let theirs = src[partner];
    let ascending = lane & dim == 0;
    let lower = lane < partner;
    if lower == ascending {
        mine.min(theirs)
    } else {
        mine.max(theirs)
    }
}

/// Sort `entries` in place with the bitonic network, one pass at a time.
///
/// This is the sequential form of what the compute backends dispatch pass by
/// pass.
pub fn bitonic_sort(entries: &mut [HashEntry]) -> Result<(), SortError> {
    let len = entries.len();
    if len == 0 || !len.is_power_of_two() {
        return Err(SortError::NotPowerOfTwo(len));
    }
    let mut scratch = entries.to_vec();
    for (dim, block) in bitonic_passes(len) {
        for (lane, out) in scratch.iter_mut().enumerate() {
            *out = bitonic_lane(entries, lane, dim as usize, block as usize);
        }
        entries.copy_from_slice(&scratch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(hashes: &[u32]) -> Vec<HashEntry> {
        hashes
            .iter()
            .enumerate()
            .map(|(i, &hash)| HashEntry { hash, index: i as u32 })
            .collect()
    }

    #[test]
    fn pass_schedule() {
        assert!(bitonic_passes(1).is_empty());
        assert_eq!(bitonic_passes(2), vec![(2, 1)]);
        assert_eq!(bitonic_passes(8), vec![(2, 1), (4, 2), (4, 1), (8, 4), (8, 2), (8, 1)]);
        // log2(n)·(log2(n)+1)/2 passes
        assert_eq!(bitonic_passes(1024).len(), 55);
    }

    #[test]
    fn sorts_small_array() {
        let mut e = entries(&[5, 3, 7, 1, 3, 0, 6, 2]);
        bitonic_sort(&mut e).unwrap();
        let hashes: Vec<u32> = e.iter().map(|x| x.hash).collect();
        assert_eq!(hashes, vec![0, 1, 2, 3, 3, 5, 6, 7]);
        // tie broken by index
        assert_eq!((e[3].index, e[4].index), (1, 4));
    }

    #[test]
    fn single_element_is_sorted() {
        let mut e = entries(&[9]);
        bitonic_sort(&mut e).unwrap();
        assert_eq!(e[0].hash, 9);
    }

    #[test]
    fn rejects_non_power_of_two() {
        let mut e = entries(&[1, 2, 3]);
        assert_eq!(bitonic_sort(&mut e), Err(SortError::NotPowerOfTwo(3)));
        assert_eq!(bitonic_sort(&mut []), Err(SortError::NotPowerOfTwo(0)));
    }

    #[test]
    fn padding_sorts_to_end() {
        let mut e = entries(&[4, 1, 2]);
        e.push(HashEntry::padding(3));
        e.reverse();
        bitonic_sort(&mut e).unwrap();
        assert!(e[3].is_padding());
        assert_eq!(e[0].hash, 1);
    }

    #[test]
    fn all_equal_hashes_keep_every_id() {
        let mut e = entries(&[3; 16]);
        e.reverse();
        bitonic_sort(&mut e).unwrap();
        let ids: Vec<u32> = e.iter().map(|x| x.index).collect();
        assert_eq!(ids, (0..16).collect::<Vec<_>>());
    }
}
