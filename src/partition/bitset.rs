//! Connectivity sets: one fixed-capacity atomic bitset of k bits per
//! hyperedge, block-packed into 64-bit words. Membership mutation is an
//! atomic OR/AND on the containing word, connectivity is a popcount, and
//! enumeration scans for one-bits.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::hypergraph::BlockId;

const BITS_PER_WORD: usize = u64::BITS as usize;

/// Connectivity sets for `num_edges` hyperedges over `k` blocks.
#[derive(Debug)]
pub struct ConnectivitySets {
    words_per_edge: usize,
    words: Vec<AtomicU64>,
}

impl ConnectivitySets {
    pub fn new(num_edges: usize, k: usize) -> Self {
        let words_per_edge = k.div_ceil(BITS_PER_WORD).max(1);
        let words = (0..num_edges * words_per_edge)
            .map(|_| AtomicU64::new(0))
            .collect();
        ConnectivitySets {
            words_per_edge,
            words,
        }
    }

    #[inline]
    fn word_index(&self, e: usize, block: BlockId) -> usize {
        e * self.words_per_edge + block as usize / BITS_PER_WORD
    }

    /// Insert `block` into the set of edge `e`.
    #[inline]
    pub fn insert(&self, e: usize, block: BlockId) {
        let mask = 1u64 << (block as usize % BITS_PER_WORD);
        self.words[self.word_index(e, block)].fetch_or(mask, Ordering::AcqRel);
    }

    /// Remove `block` from the set of edge `e`.
    #[inline]
    pub fn remove(&self, e: usize, block: BlockId) {
        let mask = !(1u64 << (block as usize % BITS_PER_WORD));
        self.words[self.word_index(e, block)].fetch_and(mask, Ordering::AcqRel);
    }

    #[inline]
    pub fn contains(&self, e: usize, block: BlockId) -> bool {
        let mask = 1u64 << (block as usize % BITS_PER_WORD);
        self.words[self.word_index(e, block)].load(Ordering::Acquire) & mask != 0
    }

    /// λ(e): the number of blocks edge `e` touches.
    #[inline]
    pub fn connectivity(&self, e: usize) -> u32 {
        let start = e * self.words_per_edge;
        self.words[start..start + self.words_per_edge]
            .iter()
            .map(|w| w.load(Ordering::Acquire).count_ones())
            .sum()
    }

    /// Iterate over the blocks in the set of edge `e`, in increasing order.
    pub fn iter(&self, e: usize) -> OneBits<'_> {
        let start = e * self.words_per_edge;
        OneBits {
            words: &self.words[start..start + self.words_per_edge],
            word_idx: 0,
            current: self.words[start].load(Ordering::Acquire),
        }
    }

    /// Clear the set of every edge.
    pub fn reset(&self) {
        for w in &self.words {
            w.store(0, Ordering::Relaxed);
        }
    }
}

/// Iterator over the one-bit positions of a single edge's bitset.
pub struct OneBits<'a> {
    words: &'a [AtomicU64],
    word_idx: usize,
    current: u64,
}

impl Iterator for OneBits<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        while self.current == 0 {
            self.word_idx += 1;
            if self.word_idx >= self.words.len() {
                return None;
            }
            self.current = self.words[self.word_idx].load(Ordering::Acquire);
        }
        let bit = self.current.trailing_zeros();
        self.current &= self.current - 1;
        Some((self.word_idx * BITS_PER_WORD) as BlockId + bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_contains() {
        let sets = ConnectivitySets::new(3, 8);
        sets.insert(1, 3);
        sets.insert(1, 5);
        assert!(sets.contains(1, 3));
        assert!(sets.contains(1, 5));
        assert!(!sets.contains(1, 4));
        assert!(!sets.contains(0, 3));
        sets.remove(1, 3);
        assert!(!sets.contains(1, 3));
        assert_eq!(sets.connectivity(1), 1);
    }

    #[test]
    fn iterates_one_bits_in_order() {
        let sets = ConnectivitySets::new(1, 200);
        for b in [0u32, 63, 64, 130, 199] {
            sets.insert(0, b);
        }
        let blocks: Vec<BlockId> = sets.iter(0).collect();
        assert_eq!(blocks, vec![0, 63, 64, 130, 199]);
        assert_eq!(sets.connectivity(0), 5);
    }

    #[test]
    fn empty_set_iterates_nothing() {
        let sets = ConnectivitySets::new(2, 4);
        assert_eq!(sets.iter(0).count(), 0);
        assert_eq!(sets.connectivity(0), 0);
    }

    #[test]
    fn concurrent_inserts_from_many_threads() {
        use rayon::prelude::*;
        let sets = ConnectivitySets::new(1, 128);
        (0..128u32).into_par_iter().for_each(|b| sets.insert(0, b));
        assert_eq!(sets.connectivity(0), 128);
        (0..128u32)
            .into_par_iter()
            .filter(|b| b % 2 == 0)
            .for_each(|b| sets.remove(0, b));
        assert_eq!(sets.connectivity(0), 64);
        assert!(sets.iter(0).all(|b| b % 2 == 1));
    }
}
