//! Intron bridging: joining two independently computed banded matrices
//! across a candidate splice junction.
//!
//! The left matrix is filled forward from the left anchor; the right
//! matrix is filled over the reversed query segment and reversed right
//! genome window, so its origin sits at the right anchor. For a split at
//! query row `r`, the left matrix contributes rows `0..=r` and the right
//! matrix rows `0..=R-r`; together they consume the query span exactly
//! once with no double counting.

use crate::config::ScoringConfig;
use crate::defaults::{ACCEPTOR_BOUNDARY, ACCEPTOR_CONTEXT, DONOR_BOUNDARY, DONOR_CONTEXT};
use crate::genome::{reverse_complement, Strand};
use crate::splice::{classify_intron, IntronClass, KnownSpliceSites, SpliceSiteModel};

use super::matrix::FilledMatrix;
use super::width::BandScore;

/// Window geometry for one bridge call.
///
/// `left_genome` is the forward-orientation left window; the left matrix
/// was filled over its first `left.cols` bases. `right_genome` is the
/// forward-orientation right window; the right matrix was filled over the
/// reversal of its last `right.cols` bases. Both windows must carry at
/// least two bases beyond the matrix region so the junction dinucleotides
/// are always readable.
#[derive(Debug, Clone, Copy)]
pub struct BridgeParams<'a> {
    pub left_genome: &'a [u8],
    pub right_genome: &'a [u8],
    /// Absolute coordinate of `left_genome[0]`.
    pub left_genome_start: u64,
    /// Absolute coordinate of `right_genome[0]`.
    pub right_genome_start: u64,
    pub strand: Strand,
    /// Restrict the search to cataloged introns.
    pub known_only: bool,
}

/// A chosen splice junction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BridgeResult {
    /// Query rows consumed by the left matrix.
    pub query_split: usize,
    /// Split cell in the left matrix.
    pub left_cell: (usize, usize),
    /// Split cell in the (reversed) right matrix.
    pub right_cell: (usize, usize),
    /// Absolute coordinate of the first intron base.
    pub donor_pos: u64,
    /// Absolute coordinate of the last intron base.
    pub acceptor_pos: u64,
    pub intron_class: IntronClass,
    pub intron_length: u64,
    /// 1.0 when the site is cataloged, else from the probability model.
    pub donor_prob: f64,
    pub acceptor_prob: f64,
    /// Combined left + right alignment score, without bonuses.
    pub align_score: i32,
    /// Alignment score plus intron and known-site bonuses.
    pub total_score: i32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    query_split: usize,
    left_col: usize,
    right_col: usize,
    donor_pos: u64,
    acceptor_pos: u64,
    class: IntronClass,
    donor_known: bool,
    acceptor_known: bool,
    align_score: i32,
}

impl Candidate {
    fn total_score(&self, cfg: &ScoringConfig) -> i32 {
        let mut total = self.align_score + cfg.intron.bonus(self.class);
        if self.donor_known {
            total += cfg.intron.known_site_bonus;
        }
        if self.acceptor_known {
            total += cfg.intron.known_site_bonus;
        }
        total
    }
}

/// Find the best split point across the junction, or `None` when no split
/// yields a non-negative combined score ("not spliceable here"); the
/// caller then falls back to a plain indel.
///
/// Site-level scan: candidates are ranked by alignment score alone; the
/// best canonical-dinucleotide candidate is tracked independently, and the
/// selection switches to it when the score-only choice has a combined
/// donor+acceptor probability below the configured ceiling and the
/// canonical candidate's alignment score is within the configured margin.
/// In `known_only` mode only splits landing on cataloged introns are
/// legal, ranked by joint score including bonuses.
pub fn bridge_intron_gap<T: BandScore>(
    left: &FilledMatrix<'_, T>,
    right: &FilledMatrix<'_, T>,
    p: &BridgeParams<'_>,
    cfg: &ScoringConfig,
    model: &dyn SpliceSiteModel,
    known: Option<&dyn KnownSpliceSites>,
) -> Option<BridgeResult> {
    assert_eq!(
        left.rows, right.rows,
        "bridge matrices must cover the same query segment"
    );
    assert!(
        p.left_genome.len() >= left.cols + 2,
        "left window too short for junction dinucleotides"
    );
    assert!(
        p.right_genome.len() >= right.cols + 2,
        "right window too short for junction dinucleotides"
    );

    let chosen = if p.known_only {
        scan_known_introns(left, right, p, cfg, known?)?
    } else {
        let (best, best_canonical) = scan_sites(left, right, p, known);
        let best = best?;
        select_site(best, best_canonical, p, cfg, model)
    };

    let total = chosen.total_score(cfg);
    if total < 0 {
        log::debug!("bridge: best split total {total} negative, no junction");
        return None;
    }

    let (donor_prob, acceptor_prob) = candidate_probs(&chosen, p, model);
    debug_assert!(chosen.donor_pos <= chosen.acceptor_pos);
    Some(BridgeResult {
        query_split: chosen.query_split,
        left_cell: (chosen.query_split, chosen.left_col),
        right_cell: (left.rows - chosen.query_split, chosen.right_col),
        donor_pos: chosen.donor_pos,
        acceptor_pos: chosen.acceptor_pos,
        intron_class: chosen.class,
        intron_length: chosen.acceptor_pos - chosen.donor_pos + 1,
        donor_prob,
        acceptor_prob,
        align_score: chosen.align_score,
        total_score: total,
    })
}

/// The dual selection criterion over the site-level scan results.
fn select_site(
    best: Candidate,
    best_canonical: Option<Candidate>,
    p: &BridgeParams<'_>,
    cfg: &ScoringConfig,
    model: &dyn SpliceSiteModel,
) -> Candidate {
    if best.class.is_canonical() {
        return best;
    }
    if let Some(canon) = best_canonical {
        let (dp, ap) = candidate_probs(&best, p, model);
        if dp + ap < cfg.intron.prob_sum_ceiling
            && canon.align_score >= best.align_score - cfg.intron.canonical_score_margin
        {
            log::debug!(
                "bridge: switching to canonical split (align {} vs {}, prob sum {:.2})",
                canon.align_score,
                best.align_score,
                dp + ap
            );
            return canon;
        }
    }
    best
}

fn scan_sites<T: BandScore>(
    left: &FilledMatrix<'_, T>,
    right: &FilledMatrix<'_, T>,
    p: &BridgeParams<'_>,
    known: Option<&dyn KnownSpliceSites>,
) -> (Option<Candidate>, Option<Candidate>) {
    let rows = left.rows;
    let right_end = p.right_genome_start + p.right_genome.len() as u64 - 1;
    let mut best: Option<Candidate> = None;
    let mut best_canonical: Option<Candidate> = None;

    for r in 0..=rows {
        let rr = rows - r;
        let (l_lo, l_hi) = left.band.col_range(r, left.cols);
        let (r_lo, r_hi) = right.band.col_range(rr, right.cols);
        if l_lo > l_hi || r_lo > r_hi {
            continue;
        }
        for cl in l_lo..=l_hi {
            let lscore = left.score(r, cl);
            if lscore <= i32::MIN / 4 {
                continue;
            }
            let donor_pos = p.left_genome_start + cl as u64;
            let donor = [p.left_genome[cl], p.left_genome[cl + 1]];
            for cr in r_lo..=r_hi {
                let rscore = right.score(rr, cr);
                if rscore <= i32::MIN / 4 {
                    continue;
                }
                let acceptor_pos = right_end - cr as u64;
                if acceptor_pos < donor_pos {
                    continue; // zero/negative-length intron is illegal
                }
                let ai = p.right_genome.len() - 1 - cr;
                let acceptor = [p.right_genome[ai - 1], p.right_genome[ai]];
                let class = classify_intron(donor, acceptor);

                let mut donor_known = false;
                let mut acceptor_known = false;
                if let Some(k) = known {
                    donor_known = k.is_known_donor(donor_pos, p.strand);
                    acceptor_known = k.is_known_acceptor(acceptor_pos, p.strand);
                }

                let cand = Candidate {
                    query_split: r,
                    left_col: cl,
                    right_col: cr,
                    donor_pos,
                    acceptor_pos,
                    class,
                    donor_known,
                    acceptor_known,
                    align_score: lscore + rscore,
                };
                if best.map_or(true, |b| cand.align_score > b.align_score) {
                    best = Some(cand);
                }
                if class.is_canonical()
                    && best_canonical.map_or(true, |b| cand.align_score > b.align_score)
                {
                    best_canonical = Some(cand);
                }
            }
        }
    }

    (best, best_canonical)
}

/// Intron-level scan: enumerate cataloged introns overlapping the junction
/// and pick the one maximizing the joint score.
fn scan_known_introns<T: BandScore>(
    left: &FilledMatrix<'_, T>,
    right: &FilledMatrix<'_, T>,
    p: &BridgeParams<'_>,
    cfg: &ScoringConfig,
    known: &dyn KnownSpliceSites,
) -> Option<Candidate> {
    let rows = left.rows;
    let right_end = p.right_genome_start + p.right_genome.len() as u64 - 1;
    let mut best: Option<(i32, Candidate)> = None;

    for (donor_pos, acceptor_pos) in
        known.known_introns(p.left_genome_start..right_end + 1, p.strand)
    {
        if donor_pos < p.left_genome_start || acceptor_pos > right_end {
            continue;
        }
        let cl = (donor_pos - p.left_genome_start) as usize;
        let cr = (right_end - acceptor_pos) as usize;
        if cl > left.cols || cr > right.cols {
            continue;
        }
        let donor = [p.left_genome[cl], p.left_genome[cl + 1]];
        let ai = p.right_genome.len() - 1 - cr;
        let acceptor = [p.right_genome[ai - 1], p.right_genome[ai]];
        let class = classify_intron(donor, acceptor);

        for r in 0..=rows {
            let lscore = left.score(r, cl);
            if lscore <= i32::MIN / 4 {
                continue;
            }
            let rscore = right.score(rows - r, cr);
            if rscore <= i32::MIN / 4 {
                continue;
            }
            let cand = Candidate {
                query_split: r,
                left_col: cl,
                right_col: cr,
                donor_pos,
                acceptor_pos,
                class,
                donor_known: true,
                acceptor_known: true,
                align_score: lscore + rscore,
            };
            let total = cand.total_score(cfg);
            if best.map_or(true, |(bt, _)| total > bt) {
                best = Some((total, cand));
            }
        }
    }

    let n = best.is_some() as u32;
    log::debug!("bridge: known-only scan produced {n} viable intron(s)");
    best.map(|(_, c)| c)
}

/// Donor/acceptor probabilities for a candidate, honoring known-site
/// overrides and the motif's transcriptional sense.
fn candidate_probs(
    c: &Candidate,
    p: &BridgeParams<'_>,
    model: &dyn SpliceSiteModel,
) -> (f64, f64) {
    let ai = p.right_genome.len() as i64 - 1 - c.right_col as i64;
    let (donor_prob, acceptor_prob) = match c.class.sense() {
        Some(Strand::Reverse) => {
            // Antisense: the transcriptional donor sits at the physical
            // acceptor end; score reverse-complemented contexts.
            let d_ctx = reverse_complement(&slice_padded(
                p.right_genome,
                ai + 1 - (DONOR_CONTEXT - DONOR_BOUNDARY) as i64,
                DONOR_CONTEXT,
            ));
            let a_ctx = reverse_complement(&slice_padded(
                p.left_genome,
                c.left_col as i64 - (ACCEPTOR_CONTEXT - ACCEPTOR_BOUNDARY) as i64,
                ACCEPTOR_CONTEXT,
            ));
            (
                model.donor_prob(&d_ctx, DONOR_BOUNDARY),
                model.acceptor_prob(&a_ctx, ACCEPTOR_BOUNDARY),
            )
        }
        _ => {
            let d_ctx = slice_padded(
                p.left_genome,
                c.left_col as i64 - DONOR_BOUNDARY as i64,
                DONOR_CONTEXT,
            );
            let a_ctx = slice_padded(
                p.right_genome,
                ai + 1 - ACCEPTOR_BOUNDARY as i64,
                ACCEPTOR_CONTEXT,
            );
            (
                model.donor_prob(&d_ctx, DONOR_BOUNDARY),
                model.acceptor_prob(&a_ctx, ACCEPTOR_BOUNDARY),
            )
        }
    };
    (
        if c.donor_known { 1.0 } else { donor_prob },
        if c.acceptor_known { 1.0 } else { acceptor_prob },
    )
}

fn slice_padded(window: &[u8], start: i64, len: usize) -> Vec<u8> {
    (0..len as i64)
        .map(|i| {
            let j = start + i;
            if j < 0 || j >= window.len() as i64 {
                b'N'
            } else {
                window[j as usize]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banded::matrix::{fill_matrix, BandedParams, BandedScratch};
    use crate::banded::types::{Band, GapInit};
    use crate::config::{GapClass, QualityTier, ScoringConfig};
    use crate::splice::{DinucleotideModel, SpliceSiteCatalog};

    struct BridgeFixture {
        cfg: std::sync::Arc<ScoringConfig>,
        left_scratch: BandedScratch,
        right_scratch: BandedScratch,
        query: Vec<u8>,
        rev_query: Vec<u8>,
        left_window: Vec<u8>,
        right_window: Vec<u8>,
        rev_right_region: Vec<u8>,
    }

    /// Left exon ACGT at 1000..1004, donor GT at 1004; acceptor AG at 1999,
    /// right exon ACGT at 2000..2004.
    fn fixture(left_window: &[u8], right_window: &[u8]) -> BridgeFixture {
        let query = b"ACGTACGT".to_vec();
        let rev_query: Vec<u8> = query.iter().rev().copied().collect();
        let rev_right_region: Vec<u8> =
            right_window[2..].iter().rev().copied().collect();
        BridgeFixture {
            cfg: ScoringConfig::with_defaults(),
            left_scratch: BandedScratch::new(32, 32),
            right_scratch: BandedScratch::new(32, 32),
            query,
            rev_query,
            left_window: left_window.to_vec(),
            right_window: right_window.to_vec(),
            rev_right_region,
        }
    }

    fn bridge(fx: &mut BridgeFixture, known: Option<&dyn KnownSpliceSites>, known_only: bool) -> Option<BridgeResult> {
        let band = Band::new(8, 8);
        let left_cols = fx.left_window.len() - 2;
        let lp = BandedParams {
            query: &fx.query,
            genome: &fx.left_window[..left_cols],
            genome_alt: &fx.left_window[..left_cols],
            band,
            init: GapInit::Penalized,
            tier: QualityTier::High,
            gap_class: GapClass::Paired,
            jump_late: false,
        };
        let left = fill_matrix::<i32>(&mut fx.left_scratch, &fx.cfg, &lp).unwrap();
        let rp = BandedParams {
            query: &fx.rev_query,
            genome: &fx.rev_right_region,
            genome_alt: &fx.rev_right_region,
            band,
            init: GapInit::Penalized,
            tier: QualityTier::High,
            gap_class: GapClass::Paired,
            jump_late: true,
        };
        let right = fill_matrix::<i32>(&mut fx.right_scratch, &fx.cfg, &rp).unwrap();
        let p = BridgeParams {
            left_genome: &fx.left_window,
            right_genome: &fx.right_window,
            left_genome_start: 1000,
            right_genome_start: 2004 - fx.right_window.len() as u64,
            strand: Strand::Forward,
            known_only,
        };
        bridge_intron_gap(&left, &right, &p, &fx.cfg, &DinucleotideModel, known)
    }

    #[test]
    fn test_canonical_junction_selected() {
        let mut fx = fixture(b"ACGTGTAAGTCCTT", b"TTTTTTTCAGACGT");
        let res = bridge(&mut fx, None, false).expect("junction");
        assert_eq!(res.query_split, 4);
        assert_eq!(res.donor_pos, 1004);
        assert_eq!(res.acceptor_pos, 1999);
        assert_eq!(res.intron_class, IntronClass::GtAg);
        assert_eq!(res.intron_length, 996);
        assert_eq!(res.align_score, 24);
        assert!(res.donor_prob > 0.9);
        assert!(res.acceptor_prob > 0.9);
        assert!(res.donor_pos <= res.acceptor_pos);
        // The two sides consume the query span exactly once.
        assert_eq!(res.left_cell.0 + res.right_cell.0, 8);
    }

    #[test]
    fn test_no_junction_on_hopeless_windows() {
        // Nothing aligns: every split is dominated by mismatch penalties.
        let mut fx = fixture(b"TTTTTTTTTTTTTT", b"CCCCCCCCCCCCCC");
        assert!(bridge(&mut fx, None, false).is_none());
    }

    #[test]
    fn test_known_site_probabilities_are_one() {
        let catalog = SpliceSiteCatalog::new(vec![(1004, 1999)]);
        let mut fx = fixture(b"ACGTGTAAGTCCTT", b"TTTTTTTCAGACGT");
        let res = bridge(&mut fx, Some(&catalog), false).expect("junction");
        assert_eq!(res.donor_prob, 1.0);
        assert_eq!(res.acceptor_prob, 1.0);
        assert!(res.total_score > res.align_score + fx.cfg.intron.bonus(res.intron_class));
    }

    #[test]
    fn test_known_only_restricts_to_catalog() {
        // The catalog points at a junction one base off the motif optimum;
        // known-only mode must land exactly on it.
        let catalog = SpliceSiteCatalog::new(vec![(1005, 1998)]);
        let mut fx = fixture(b"ACGTGTAAGTCCTT", b"TTTTTTTCAGACGT");
        let res = bridge(&mut fx, Some(&catalog), true).expect("junction");
        assert_eq!(res.donor_pos, 1005);
        assert_eq!(res.acceptor_pos, 1998);
        assert_eq!(res.donor_prob, 1.0);
        assert_eq!(res.acceptor_prob, 1.0);
    }

    #[test]
    fn test_known_only_without_catalog_is_no_junction() {
        let mut fx = fixture(b"ACGTGTAAGTCCTT", b"TTTTTTTCAGACGT");
        assert!(bridge(&mut fx, None, true).is_none());
    }

    fn candidate(class: IntronClass, align_score: i32) -> Candidate {
        Candidate {
            query_split: 4,
            left_col: 4,
            right_col: 4,
            donor_pos: 1004,
            acceptor_pos: 1999,
            class,
            donor_known: false,
            acceptor_known: false,
            align_score,
        }
    }

    fn policy_params<'a>() -> BridgeParams<'a> {
        // Junk windows: the model assigns the non-canonical split a
        // combined probability far below the ceiling.
        BridgeParams {
            left_genome: b"CCCCCCCCCCCCCC",
            right_genome: b"CCCCCCCCCCCCCC",
            left_genome_start: 1000,
            right_genome_start: 1990,
            strand: Strand::Forward,
            known_only: false,
        }
    }

    #[test]
    fn test_policy_switches_to_canonical_within_margin() {
        let cfg = ScoringConfig::with_defaults();
        let best = candidate(IntronClass::NonCanonical, 24);
        let canon = candidate(IntronClass::GtAg, 20);
        let chosen = select_site(best, Some(canon), &policy_params(), &cfg, &DinucleotideModel);
        assert_eq!(chosen.class, IntronClass::GtAg);
    }

    #[test]
    fn test_policy_keeps_score_best_outside_margin() {
        let cfg = ScoringConfig::with_defaults();
        let best = candidate(IntronClass::NonCanonical, 24);
        // 24 - 10 = 14 > 10: drastically worse, keep the score-only best.
        let canon = candidate(IntronClass::GtAg, 10);
        let chosen = select_site(best, Some(canon), &policy_params(), &cfg, &DinucleotideModel);
        assert_eq!(chosen.class, IntronClass::NonCanonical);
    }

    #[test]
    fn test_policy_returns_canonical_best_directly() {
        let cfg = ScoringConfig::with_defaults();
        let best = candidate(IntronClass::GcAg, 24);
        let canon = candidate(IntronClass::GtAg, 24);
        let chosen = select_site(best, Some(canon), &policy_params(), &cfg, &DinucleotideModel);
        assert_eq!(chosen.class, IntronClass::GcAg);
    }
}
