//! Traceback over the three direction matrices.
//!
//! Walks from a chosen endpoint back to the origin, emitting one alignment
//! pair per diagonal step and a run-length indel per contiguous gap run.
//! The accumulated score must equal the matrix score recorded at the
//! endpoint; the integration tests assert this for every width.

use crate::config::ScoringConfig;
use crate::genome::{bases_consistent, is_concrete, GAP_CHAR, OFF_CHROMOSOME};

use super::matrix::FilledMatrix;
use super::types::{AlignedPair, GapInit, PairOp, DIR_DIAG, DIR_HORIZ, DIR_VERT};
use super::width::BandScore;

/// Window slices and absolute offsets for pair emission. For reversed
/// fills, pass zero offsets and remap the emitted pairs afterwards.
#[derive(Debug, Clone, Copy)]
pub struct TracebackInput<'a> {
    /// Original-case query window (rows).
    pub query: &'a [u8],
    /// Uppercased query window, used for classification and scoring.
    pub query_uc: &'a [u8],
    pub genome: &'a [u8],
    pub genome_alt: &'a [u8],
    pub query_offset: u32,
    pub genome_offset: u64,
}

/// Running counters accumulated during one traceback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracebackSummary {
    pub matches: u32,
    pub ambig_matches: u32,
    pub mismatches: u32,
    pub gap_opens: u32,
    pub gap_bases: u32,
    /// Accumulated path score; equals the matrix score at the endpoint.
    pub score: i32,
}

/// Walk from `start` to the origin, appending pairs in 5'-to-3' order.
///
/// A genome base equal to the off-chromosome sentinel is skipped rather
/// than emitted; its score contribution still accumulates so the endpoint
/// consistency property holds. Gap runs along the free edges of a
/// [`GapInit::Free`] fill represent trimmed, unaligned slack and emit
/// nothing.
pub fn traceback<T: BandScore>(
    m: &FilledMatrix<'_, T>,
    input: &TracebackInput<'_>,
    cfg: &ScoringConfig,
    start: (usize, usize),
    pairs: &mut Vec<AlignedPair>,
) -> TracebackSummary {
    assert!(
        m.contains(start.0, start.1),
        "traceback endpoint ({}, {}) outside the band",
        start.0,
        start.1
    );
    assert_eq!(input.query.len(), m.rows);
    assert_eq!(input.query_uc.len(), m.rows);
    assert_eq!(input.genome.len(), m.cols);
    assert_eq!(input.genome_alt.len(), m.cols);

    let tier = cfg.tier(m.tier);
    let gaps = tier.gaps(m.gap_class);
    let mark = pairs.len();
    let mut sum = TracebackSummary::default();
    let (mut r, mut c) = start;

    while r > 0 || c > 0 {
        match m.dir_nogap_at(r, c) {
            DIR_DIAG => {
                debug_assert!(r > 0 && c > 0, "diagonal step at a matrix edge");
                let qu = input.query_uc[r - 1];
                let gb = input.genome[c - 1];
                let ga = input.genome_alt[c - 1];
                sum.score += tier.pair_score_alleles(qu, gb, ga);
                if gb != OFF_CHROMOSOME {
                    let op = classify_pair(qu, gb, ga);
                    match op {
                        PairOp::Match => sum.matches += 1,
                        PairOp::AmbigMatch => sum.ambig_matches += 1,
                        _ => sum.mismatches += 1,
                    }
                    pairs.push(AlignedPair {
                        query_offset: input.query_offset + (r as u32 - 1),
                        genome_offset: input.genome_offset + (c as u64 - 1),
                        query_base: input.query[r - 1],
                        genome_base: gb,
                        genome_alt: ga,
                        op,
                    });
                }
                r -= 1;
                c -= 1;
            }
            DIR_HORIZ => {
                // Genome-side gap run along row r.
                let run_mark = pairs.len();
                let mut len: i32 = 0;
                loop {
                    let gb = input.genome[c - 1];
                    if gb != OFF_CHROMOSOME {
                        pairs.push(AlignedPair {
                            query_offset: input.query_offset + r as u32,
                            genome_offset: input.genome_offset + (c as u64 - 1),
                            query_base: GAP_CHAR,
                            genome_base: gb,
                            genome_alt: input.genome_alt[c - 1],
                            op: PairOp::QueryGap,
                        });
                    }
                    len += 1;
                    let ed = m.dir_egap_at(r, c);
                    c -= 1;
                    if ed == DIR_DIAG {
                        break;
                    }
                }
                if r == 0 && m.init == GapInit::Free {
                    // Trimmed slack on the free edge: no pairs, no cost.
                    pairs.truncate(run_mark);
                } else {
                    sum.score += gaps.open + gaps.extend * len;
                    sum.gap_opens += 1;
                    sum.gap_bases += len as u32;
                }
            }
            DIR_VERT => {
                // Query-side gap run along column c.
                let run_mark = pairs.len();
                let mut len: i32 = 0;
                loop {
                    pairs.push(AlignedPair {
                        query_offset: input.query_offset + (r as u32 - 1),
                        genome_offset: input.genome_offset + c as u64,
                        query_base: input.query[r - 1],
                        genome_base: GAP_CHAR,
                        genome_alt: GAP_CHAR,
                        op: PairOp::GenomeGap,
                    });
                    len += 1;
                    let fd = m.dir_fgap_at(r, c);
                    r -= 1;
                    if fd == DIR_DIAG {
                        break;
                    }
                }
                if c == 0 && m.init == GapInit::Free {
                    pairs.truncate(run_mark);
                } else {
                    sum.score += gaps.open + gaps.extend * len;
                    sum.gap_opens += 1;
                    sum.gap_bases += len as u32;
                }
            }
            other => unreachable!("corrupt direction code {other}"),
        }
    }

    pairs[mark..].reverse();
    sum
}

/// Classify one diagonal step. A position counts as a match if either
/// allele matches.
#[inline]
pub(crate) fn classify_pair(query_uc: u8, genome: u8, genome_alt: u8) -> PairOp {
    let gb = genome.to_ascii_uppercase();
    let ga = genome_alt.to_ascii_uppercase();
    if is_concrete(query_uc) && (query_uc == gb || query_uc == ga) {
        PairOp::Match
    } else if bases_consistent(query_uc, genome) || bases_consistent(query_uc, genome_alt) {
        PairOp::AmbigMatch
    } else {
        PairOp::Mismatch
    }
}
