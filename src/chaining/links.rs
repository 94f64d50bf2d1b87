//! Incremental chain-link dynamic program over the seed hit table.
//!
//! Query positions are processed in direction order. Each seed hit either
//! extends a same-diagonal chain from the most recent processed position
//! (the cheap, common case), attaches to a predecessor found in a bounded
//! lookback window under a distance penalty, short-circuits to the grand
//! winner, or starts a fresh chain. Increments are clamped non-negative,
//! so a link's score is always its predecessor's score plus the
//! incremental term and chain scores are monotone non-decreasing.

use std::collections::HashMap;

use crate::arena::{Arena, ArenaIx};
use crate::config::ScoringConfig;
use crate::defaults::{
    CHAIN_CONSEC_BONUS, CHAIN_INDEL_PENALTY_BASE, CHAIN_INDEL_PENALTY_DIV,
    CHAIN_INTRON_PENALTY_CANONICAL, CHAIN_INTRON_PENALTY_NONCANONICAL, CHAIN_JOIN_BONUS,
    CHAIN_MAX_INDEL, CHAIN_SKIP_PENALTY_DIV, SPLICE_PEEK_WINDOW,
};
use crate::genome::{GenomeAccessor, Strand};
use crate::splice::classify_intron;

use super::types::{ChainDirection, ChainLink, ChainPath, SeedHitTable};

/// Reused per-call chaining state. Inner vectors keep their capacity
/// across calls.
#[derive(Debug, Default)]
pub struct ChainScratch {
    links_at: Vec<Vec<ArenaIx>>,
    processed: Vec<u32>,
    skipped: Vec<u32>,
    best_per_root: HashMap<u64, ArenaIx>,
}

impl ChainScratch {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepare(&mut self, n_positions: usize) {
        if self.links_at.len() < n_positions {
            self.links_at.resize_with(n_positions, Vec::new);
        }
        for v in self.links_at.iter_mut().take(n_positions) {
            v.clear();
        }
        self.processed.clear();
        self.skipped.clear();
        self.best_per_root.clear();
    }
}

/// Inputs for one chaining call.
#[derive(Clone, Copy)]
pub struct ChainingInputs<'a> {
    pub table: &'a SeedHitTable,
    /// Genome access for the greedy splice-motif peek; `None` disables the
    /// canonical-penalty reduction.
    pub genome: Option<&'a dyn GenomeAccessor>,
    pub strand: Strand,
    pub splicing: bool,
    pub direction: ChainDirection,
}

/// Chain the seed hit table into ranked candidate paths.
///
/// Returns up to `max_paths` top-scoring distinct chains (one terminal per
/// chain root); ties at the cutoff score are also returned.
pub fn chain_hits(
    inp: &ChainingInputs<'_>,
    cfg: &ScoringConfig,
    arena: &mut Arena<ChainLink>,
    scratch: &mut ChainScratch,
) -> Vec<ChainPath> {
    let n = inp.table.positions();
    if n == 0 || inp.table.is_empty() {
        return Vec::new();
    }
    arena.reset();
    scratch.prepare(n);
    let mut grand: Option<ArenaIx> = None;

    for step in 0..n {
        let q = inp.direction.query_at(step, n);
        let hits = inp.table.hits_at(q);
        if hits.is_empty() {
            // Still "processed" for distance purposes: deltas are computed
            // from absolute positions, so nothing else is needed.
            continue;
        }
        if hits.len() > cfg.chaining.max_hits_per_position {
            scratch.skipped.push(q as u32);
            if scratch.skipped.len() <= cfg.chaining.max_consecutive_skips {
                log::trace!("chain: skipping over-abundant position {q} ({} hits)", hits.len());
                continue;
            }
            // Too many consecutive skips: forcibly process the
            // least-ambiguous skipped position to avoid stalling.
            let forced = *scratch
                .skipped
                .iter()
                .min_by_key(|&&s| inp.table.hits_at(s as usize).len())
                .expect("skipped list is non-empty");
            log::debug!(
                "chain: {} consecutive over-abundant positions, forcing {} ({} hits)",
                scratch.skipped.len(),
                forced,
                inp.table.hits_at(forced as usize).len()
            );
            scratch.skipped.clear();
            process_position(forced as usize, inp, cfg, arena, scratch, &mut grand);
            continue;
        }
        scratch.skipped.clear();
        process_position(q, inp, cfg, arena, scratch, &mut grand);
    }

    collect_paths(cfg, arena, scratch)
}

fn process_position(
    q: usize,
    inp: &ChainingInputs<'_>,
    cfg: &ScoringConfig,
    arena: &mut Arena<ChainLink>,
    scratch: &mut ChainScratch,
    grand: &mut Option<ArenaIx>,
) {
    let hits = inp.table.hits_at(q);
    let mut best_score_here = 0i32;
    let start_len = arena.len();

    for &g in hits {
        // 1. Adjacent case: a link at the most recent processed position on
        // exactly the expected diagonal extends with a pure match bonus.
        let mut chosen: Option<(ArenaIx, i32, u32)> = None;
        if let Some(&lp) = scratch.processed.last() {
            if let Some(qd) = inp.direction.query_delta(lp as usize, q) {
                if let Some(expected) = inp.direction.diagonal_pred(g, qd) {
                    let row = &scratch.links_at[lp as usize];
                    if let Ok(i) =
                        row.binary_search_by(|&ix| arena.get(ix).genome_pos.cmp(&expected))
                    {
                        let ix = row[i];
                        let pred = arena.get(ix);
                        chosen = Some((ix, CHAIN_CONSEC_BONUS, pred.consecutive + qd));
                    }
                }
            }
        }

        // 2. Mismatch/gap case: bounded lookback scan.
        if chosen.is_none() {
            let mut best: Option<(ArenaIx, i32, i32)> = None; // (ix, incr, resulting score)
            for &p in scratch.processed.iter().rev().take(cfg.chaining.lookback) {
                let Some(qd) = inp.direction.query_delta(p as usize, q) else {
                    continue;
                };
                if qd as usize > cfg.chaining.lookback {
                    break;
                }
                for &ix in &scratch.links_at[p as usize] {
                    let pred = arena.get(ix);
                    let Some(incr) = join_increment(pred, g, qd, inp, cfg) else {
                        continue;
                    };
                    let score = pred.score + incr;
                    if best.map_or(true, |(_, _, s)| score > s) {
                        best = Some((ix, incr, score));
                    }
                }
            }
            // 3. Grand-winner short circuit for far-forward positions.
            if best.is_none() {
                if let Some(gix) = *grand {
                    let gl = arena.get(gix);
                    if let Some(qd) = inp.direction.query_delta(gl.query_pos as usize, q) {
                        if qd as usize > cfg.chaining.lookback {
                            if let Some(incr) = join_increment(gl, g, qd, inp, cfg) {
                                best = Some((gix, incr, gl.score + incr));
                            }
                        }
                    }
                }
            }
            chosen = best.map(|(ix, incr, _)| (ix, incr, 1));
        }

        let link = match chosen {
            Some((pred_ix, incr, consecutive)) => {
                let pred = arena.get(pred_ix);
                ChainLink {
                    pred: Some(pred_ix),
                    score: pred.score + incr,
                    consecutive,
                    root_pos: pred.root_pos,
                    query_pos: q as u32,
                    genome_pos: g,
                }
            }
            None => ChainLink {
                pred: None,
                score: CHAIN_JOIN_BONUS,
                consecutive: 1,
                root_pos: g,
                query_pos: q as u32,
                genome_pos: g,
            },
        };
        best_score_here = best_score_here.max(link.score);
        let score = link.score;
        let consecutive = link.consecutive;
        let ix = arena.alloc(link);
        if consecutive >= cfg.chaining.grand_winner_min_run
            && grand.map_or(true, |gix| score > arena.get(gix).score)
        {
            *grand = Some(ix);
        }
    }

    // Bounded-width beam: keep only links within the suboptimality
    // threshold of the position best.
    let floor = best_score_here - cfg.chaining.beam_subopt;
    let row = &mut scratch.links_at[q];
    row.clear();
    for ix in start_len as ArenaIx..arena.len() as ArenaIx {
        if arena.get(ix).score >= floor {
            row.push(ix);
        }
    }
    if !row.is_empty() {
        scratch.processed.push(q as u32);
    }
}

fn join_increment(
    pred: &ChainLink,
    g: u64,
    qdelta: u32,
    inp: &ChainingInputs<'_>,
    cfg: &ScoringConfig,
) -> Option<i32> {
    let gd = inp.direction.genomic_gap(pred.genome_pos, g);
    if gd < 1 {
        return None;
    }
    let dd = gd - qdelta as i64;
    let skip_pen = ((qdelta - 1) / CHAIN_SKIP_PENALTY_DIV) as i32;
    let pen = if dd == 0 {
        skip_pen
    } else if dd.abs() <= CHAIN_MAX_INDEL {
        CHAIN_INDEL_PENALTY_BASE + (dd.abs() / CHAIN_INDEL_PENALTY_DIV) as i32 + skip_pen
    } else if dd > 0 && (dd as u64) <= cfg.intron.max_intron_length && inp.splicing {
        let canonical = splice_motif_nearby(pred.genome_pos, g, inp, cfg);
        let intron_pen = if canonical {
            CHAIN_INTRON_PENALTY_CANONICAL
        } else {
            CHAIN_INTRON_PENALTY_NONCANONICAL
        };
        intron_pen + skip_pen
    } else {
        return None;
    };
    Some((CHAIN_JOIN_BONUS - pen).max(0))
}

/// Greedy canonical-motif peek over a short window at both gap endpoints.
/// This is the same donor/acceptor context test the bridge applies
/// exhaustively, reduced to dinucleotide sniffing.
fn splice_motif_nearby(
    pred_g: u64,
    cur_g: u64,
    inp: &ChainingInputs<'_>,
    cfg: &ScoringConfig,
) -> bool {
    let Some(genome) = inp.genome else {
        return false;
    };
    let k = cfg.chaining.oligomer_size as u64;
    let (left_end, right_start) = match inp.direction {
        ChainDirection::Forward => (pred_g + k, cur_g),
        ChainDirection::Backward => (cur_g + k, pred_g),
    };
    if right_start <= left_end + 2 {
        return false;
    }
    let base = |pos: u64| genome.base_at(pos, Strand::Forward).primary;
    for i in 0..SPLICE_PEEK_WINDOW {
        let donor = [base(left_end + i), base(left_end + i + 1)];
        for j in 0..SPLICE_PEEK_WINDOW {
            if right_start < 2 + j {
                break;
            }
            let a = right_start - 2 - j;
            let acceptor = [base(a), base(a + 1)];
            if classify_intron(donor, acceptor).is_canonical() {
                return true;
            }
        }
    }
    false
}

fn collect_paths(
    cfg: &ScoringConfig,
    arena: &Arena<ChainLink>,
    scratch: &mut ChainScratch,
) -> Vec<ChainPath> {
    // One terminal per distinct chain root: the best-scoring link.
    for (ix, link) in arena.iter() {
        scratch
            .best_per_root
            .entry(link.root_pos)
            .and_modify(|cur| {
                if link.score > arena.get(*cur).score {
                    *cur = ix;
                }
            })
            .or_insert(ix);
    }

    let mut terminals: Vec<ArenaIx> = scratch.best_per_root.values().copied().collect();
    terminals.sort_by_key(|&ix| {
        let l = arena.get(ix);
        (std::cmp::Reverse(l.score), l.root_pos)
    });

    let max_paths = cfg.chaining.max_paths;
    if terminals.len() > max_paths {
        let cutoff = arena.get(terminals[max_paths - 1]).score;
        terminals.retain(|&ix| arena.get(ix).score >= cutoff);
    }

    let paths: Vec<ChainPath> = terminals
        .iter()
        .map(|&ix| {
            let terminal = arena.get(ix);
            let mut anchors = Vec::new();
            let mut cur = Some(ix);
            while let Some(i) = cur {
                let l = arena.get(i);
                anchors.push((l.query_pos, l.genome_pos));
                cur = l.pred;
            }
            anchors.sort_unstable_by_key(|&(q, _)| q);
            ChainPath {
                score: terminal.score,
                root_pos: terminal.root_pos,
                anchors,
            }
        })
        .collect();

    log::debug!(
        "chain: {} links over {} roots -> {} path(s)",
        arena.len(),
        scratch.best_per_root.len(),
        paths.len()
    );
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::FlatGenome;

    fn inputs<'a>(table: &'a SeedHitTable, genome: Option<&'a dyn GenomeAccessor>) -> ChainingInputs<'a> {
        ChainingInputs {
            table,
            genome,
            strand: Strand::Forward,
            splicing: false,
            direction: ChainDirection::Forward,
        }
    }

    fn run(table: &SeedHitTable) -> Vec<ChainPath> {
        let cfg = ScoringConfig::with_defaults();
        let mut arena = Arena::new();
        let mut scratch = ChainScratch::new();
        chain_hits(&inputs(table, None), &cfg, &mut arena, &mut scratch)
    }

    #[test]
    fn test_empty_table() {
        let table = SeedHitTable::new(0);
        assert!(run(&table).is_empty());
        let table = SeedHitTable::new(5);
        assert!(run(&table).is_empty());
    }

    #[test]
    fn test_consecutive_diagonal_chain() {
        let mut table = SeedHitTable::new(4);
        for q in 0..4 {
            table.set_hits(q, vec![1000 + q as u64]);
        }
        let paths = run(&table);
        assert_eq!(paths.len(), 1);
        let p = &paths[0];
        assert_eq!(p.anchors.len(), 4);
        assert_eq!(p.root_pos, 1000);
        assert_eq!(p.score, CHAIN_JOIN_BONUS + 3 * CHAIN_CONSEC_BONUS);
        assert_eq!(p.anchors[0], (0, 1000));
        assert_eq!(p.anchors[3], (3, 1003));
    }

    #[test]
    fn test_monotone_scores_along_chain() {
        let mut table = SeedHitTable::new(6);
        for q in 0..6 {
            // A hitless gap at position 3 and a small diagonal shift at 4.
            if q == 3 {
                continue;
            }
            let g = if q >= 4 { 1005 + q as u64 } else { 1000 + q as u64 };
            table.set_hits(q, vec![g]);
        }
        let cfg = ScoringConfig::with_defaults();
        let mut arena = Arena::new();
        let mut scratch = ChainScratch::new();
        let paths = chain_hits(&inputs(&table, None), &cfg, &mut arena, &mut scratch);
        assert!(!paths.is_empty());
        // Every link's score equals its predecessor's plus a non-negative
        // increment.
        for (_, link) in arena.iter() {
            if let Some(pred) = link.pred {
                assert!(link.score >= arena.get(pred).score);
            }
        }
    }

    #[test]
    fn test_distinct_roots_ranked() {
        let mut table = SeedHitTable::new(5);
        for q in 0..5 {
            // Two competing diagonals; the second has a two-position hole,
            // so its rejoin pays the skip penalty and ranks second.
            let mut hits = vec![1000 + q as u64];
            if q < 2 || q == 4 {
                hits.push(5000 + q as u64);
            }
            table.set_hits(q, hits);
        }
        let paths = run(&table);
        assert!(paths.len() >= 2);
        assert_eq!(paths[0].root_pos, 1000);
        assert!(paths[0].score >= paths[1].score);
    }

    #[test]
    fn test_overabundant_position_skipped() {
        let cfg = ScoringConfig::with_defaults();
        let cap = cfg.chaining.max_hits_per_position;
        let mut table = SeedHitTable::new(5);
        for q in 0..5 {
            if q == 2 {
                // Pathologically many hits.
                table.set_hits(q, (0..cap as u64 + 50).map(|i| 100_000 + i * 10).collect());
            } else {
                table.set_hits(q, vec![1000 + q as u64]);
            }
        }
        let mut arena = Arena::new();
        let mut scratch = ChainScratch::new();
        let paths = chain_hits(&inputs(&table, None), &cfg, &mut arena, &mut scratch);
        // The sparse diagonal chain is still found through the skip.
        let best = &paths[0];
        assert_eq!(best.root_pos, 1000);
        assert_eq!(best.anchors.len(), 4);
        assert!(best.anchors.iter().all(|&(q, _)| q != 2));
    }

    #[test]
    fn test_splice_gap_reduced_penalty_with_motif() {
        // Two seeds separated by a 1000bp genomic gap flanked by GT..AG.
        let mut genome_bases = vec![b'C'; 2000];
        // Donor right after the first seed's oligomer (ends at 108).
        genome_bases[108] = b'G';
        genome_bases[109] = b'T';
        // Acceptor just before the second seed at 1108.
        genome_bases[1106] = b'A';
        genome_bases[1107] = b'G';
        let genome = FlatGenome::new(0, genome_bases);

        let mut table = SeedHitTable::new(2);
        table.set_hits(0, vec![100]);
        table.set_hits(1, vec![1108]);

        let cfg = ScoringConfig::with_defaults();
        let mut arena = Arena::new();
        let mut scratch = ChainScratch::new();
        let mut inp = inputs(&table, Some(&genome));
        inp.splicing = true;
        let paths = chain_hits(&inp, &cfg, &mut arena, &mut scratch);
        let spliced = paths.iter().find(|p| p.anchors.len() == 2).expect("joined chain");
        assert_eq!(
            spliced.score,
            CHAIN_JOIN_BONUS + (CHAIN_JOIN_BONUS - CHAIN_INTRON_PENALTY_CANONICAL)
        );

        // Without splicing the same gap is unchainable: two separate roots.
        let mut arena2 = Arena::new();
        let mut scratch2 = ChainScratch::new();
        let inp2 = inputs(&table, Some(&genome));
        let paths2 = chain_hits(&inp2, &cfg, &mut arena2, &mut scratch2);
        assert!(paths2.iter().all(|p| p.anchors.len() == 1));
    }

    #[test]
    fn test_backward_consistent_with_forward() {
        let cfg = ScoringConfig::with_defaults();
        let n = 5;
        let mut table = SeedHitTable::new(n);
        for q in 0..n {
            table.set_hits(q, vec![1000 + q as u64, 3000 + q as u64 * 2]);
        }
        let mut arena = Arena::new();
        let mut scratch = ChainScratch::new();
        let fwd = chain_hits(&inputs(&table, None), &cfg, &mut arena, &mut scratch);

        let mut binp = inputs(&table, None);
        binp.direction = ChainDirection::Backward;
        let mut arena2 = Arena::new();
        let mut scratch2 = ChainScratch::new();
        let bwd = chain_hits(&binp, &cfg, &mut arena2, &mut scratch2);

        // Same chains surface with the same anchors and scores.
        assert_eq!(fwd.len(), bwd.len());
        let fa: Vec<_> = fwd.iter().map(|p| (p.score, p.anchors.clone())).collect();
        for p in &bwd {
            assert!(fa.contains(&(p.score, p.anchors.clone())));
        }
    }
}
