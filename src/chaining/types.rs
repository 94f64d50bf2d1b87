//! Core data types for seed chaining.

use crate::arena::ArenaIx;
use crate::genome::SeedIndex;

/// Per-query-position candidate genomic positions, ascending. Built from
/// an external seed index and owned by the caller for the duration of one
/// chaining call.
#[derive(Debug, Clone, Default)]
pub struct SeedHitTable {
    hits: Vec<Vec<u64>>,
}

impl SeedHitTable {
    pub fn new(n_positions: usize) -> Self {
        SeedHitTable {
            hits: vec![Vec::new(); n_positions],
        }
    }

    /// Number of query positions covered (one per oligomer start).
    #[inline]
    pub fn positions(&self) -> usize {
        self.hits.len()
    }

    #[inline]
    pub fn hits_at(&self, query_pos: usize) -> &[u64] {
        &self.hits[query_pos]
    }

    pub fn set_hits(&mut self, query_pos: usize, mut hits: Vec<u64>) {
        hits.sort_unstable();
        self.hits[query_pos] = hits;
    }

    pub fn is_empty(&self) -> bool {
        self.hits.iter().all(|h| h.is_empty())
    }

    pub fn total_hits(&self) -> usize {
        self.hits.iter().map(|h| h.len()).sum()
    }

    /// Build from a seed index: one lookup per oligomer start position.
    pub fn build(
        query_uc: &[u8],
        oligomer_size: usize,
        index: &dyn SeedIndex,
        window: std::ops::Range<u64>,
    ) -> Self {
        if query_uc.len() < oligomer_size {
            return SeedHitTable::new(0);
        }
        let n = query_uc.len() - oligomer_size + 1;
        let mut table = SeedHitTable::new(n);
        for q in 0..n {
            let oligomer = &query_uc[q..q + oligomer_size];
            table.set_hits(q, index.hits(oligomer, window.clone()));
        }
        table
    }
}

/// One chain link: a (query position, candidate hit) record. Links are
/// arena-allocated per call; `pred` is an arena index, never a pointer.
#[derive(Debug, Clone, Copy)]
pub struct ChainLink {
    pub pred: Option<ArenaIx>,
    /// Monotone non-decreasing along a chain: equals the predecessor's
    /// score plus the incremental term exactly.
    pub score: i32,
    /// Length of the same-diagonal run ending here, in oligomer steps.
    pub consecutive: u32,
    /// Genomic position of the earliest link in this chain.
    pub root_pos: u64,
    pub query_pos: u32,
    pub genome_pos: u64,
}

/// One ranked chain: anchors ascending by query position.
#[derive(Debug, Clone)]
pub struct ChainPath {
    pub score: i32,
    pub root_pos: u64,
    pub anchors: Vec<(u32, u64)>,
}

/// Chaining direction. Backward scans from the 3' end toward the 5' end
/// and must produce results consistent with the forward variant on
/// reversed inputs; it is the same algorithm under a coordinate strategy,
/// not a second implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDirection {
    Forward,
    Backward,
}

impl ChainDirection {
    /// Query position for the step'th iteration.
    #[inline]
    pub(crate) fn query_at(self, step: usize, n: usize) -> usize {
        match self {
            ChainDirection::Forward => step,
            ChainDirection::Backward => n - 1 - step,
        }
    }

    /// Query distance from a predecessor position to the current one;
    /// `None` when `pred` is not upstream of `cur` in this direction.
    #[inline]
    pub(crate) fn query_delta(self, pred: usize, cur: usize) -> Option<u32> {
        match self {
            ChainDirection::Forward => cur.checked_sub(pred).filter(|&d| d > 0).map(|d| d as u32),
            ChainDirection::Backward => pred.checked_sub(cur).filter(|&d| d > 0).map(|d| d as u32),
        }
    }

    /// Genomic advance from the predecessor hit to the current hit;
    /// positive when the chain moves downstream.
    #[inline]
    pub(crate) fn genomic_gap(self, pred_g: u64, cur_g: u64) -> i64 {
        match self {
            ChainDirection::Forward => cur_g as i64 - pred_g as i64,
            ChainDirection::Backward => pred_g as i64 - cur_g as i64,
        }
    }

    /// Expected predecessor genome position for the pure-diagonal case.
    #[inline]
    pub(crate) fn diagonal_pred(self, cur_g: u64, qdelta: u32) -> Option<u64> {
        match self {
            ChainDirection::Forward => cur_g.checked_sub(qdelta as u64),
            ChainDirection::Backward => cur_g.checked_add(qdelta as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_table_sorts() {
        let mut t = SeedHitTable::new(3);
        t.set_hits(1, vec![300, 100, 200]);
        assert_eq!(t.hits_at(1), &[100, 200, 300]);
        assert!(t.hits_at(0).is_empty());
        assert!(!t.is_empty());
        assert_eq!(t.total_hits(), 3);
    }

    #[test]
    fn test_direction_strategies() {
        let f = ChainDirection::Forward;
        let b = ChainDirection::Backward;
        assert_eq!(f.query_at(0, 5), 0);
        assert_eq!(b.query_at(0, 5), 4);
        assert_eq!(f.query_delta(2, 5), Some(3));
        assert_eq!(f.query_delta(5, 2), None);
        assert_eq!(b.query_delta(5, 2), Some(3));
        assert_eq!(f.genomic_gap(100, 110), 10);
        assert_eq!(b.genomic_gap(110, 100), 10);
        assert_eq!(f.diagonal_pred(100, 1), Some(99));
        assert_eq!(b.diagonal_pred(100, 1), Some(101));
    }
}
