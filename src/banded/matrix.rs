//! Banded affine-gap matrix fill.
//!
//! Computes, for every cell inside a diagonal band, the best score ending
//! in a match/mismatch ("no-gap"), a genome-side gap ("E", horizontal) and
//! a query-side gap ("F", vertical), together with one direction code per
//! state. Cells outside the band are implicitly negative infinity. The
//! fill mutates only the caller's pre-sized scratch; nothing is allocated
//! on the hot path, and a call whose dimensions exceed the scratch is
//! rejected before any buffer is touched.
//!
//! Storage is column-major in one flat buffer: cell (r, c) lives at
//! `c * (max_rows + 1) + r`.

use crate::config::{GapClass, QualityTier, ScoringConfig};

use super::types::{Band, CapacityError, GapInit, ScoreWidth, DIR_DIAG, DIR_HORIZ, DIR_VERT};
use super::width::BandScore;

/// Pre-sized scratch for one worker. Holds the score buffer for each
/// numeric width plus the three shared direction matrices, reused across
/// calls and never resized mid-call.
pub struct BandedScratch {
    max_rows: usize,
    max_cols: usize,
    pub(crate) scores8: Vec<i8>,
    pub(crate) scores16: Vec<i16>,
    pub(crate) scores32: Vec<i32>,
    pub(crate) dir_nogap: Vec<u8>,
    pub(crate) dir_egap: Vec<u8>,
    pub(crate) dir_fgap: Vec<u8>,
    pub(crate) frow8: Vec<i8>,
    pub(crate) frow16: Vec<i16>,
    pub(crate) frow32: Vec<i32>,
}

impl BandedScratch {
    pub fn new(max_rows: usize, max_cols: usize) -> Self {
        let cells = (max_rows + 1) * (max_cols + 1);
        BandedScratch {
            max_rows,
            max_cols,
            scores8: vec![0; cells],
            scores16: vec![0; cells],
            scores32: vec![0; cells],
            dir_nogap: vec![0; cells],
            dir_egap: vec![0; cells],
            dir_fgap: vec![0; cells],
            frow8: vec![0; max_cols + 1],
            frow16: vec![0; max_cols + 1],
            frow32: vec![0; max_cols + 1],
        }
    }

    #[inline]
    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    #[inline]
    pub fn max_cols(&self) -> usize {
        self.max_cols
    }

    #[inline]
    pub(crate) fn stride(&self) -> usize {
        self.max_rows + 1
    }

    /// Capacity gate: rejected calls leave every buffer untouched.
    pub fn check(&self, rows: usize, cols: usize) -> Result<(), CapacityError> {
        if rows > self.max_rows || cols > self.max_cols {
            return Err(CapacityError {
                rows,
                cols,
                max_rows: self.max_rows,
                max_cols: self.max_cols,
            });
        }
        Ok(())
    }
}

/// Inputs for one banded fill. `query` is the uppercased query window;
/// `genome`/`genome_alt` are the primary and alternate-allele streams of
/// the genome window, same length.
#[derive(Debug, Clone, Copy)]
pub struct BandedParams<'a> {
    pub query: &'a [u8],
    pub genome: &'a [u8],
    pub genome_alt: &'a [u8],
    pub band: Band,
    pub init: GapInit,
    pub tier: QualityTier,
    pub gap_class: GapClass,
    /// Tie policy: when set, `>` comparisons become `>=`, preferring the
    /// equally-scoring path that jumps later. Must be reproduced exactly
    /// for determinism.
    pub jump_late: bool,
}

/// Read-only view of one completed fill, borrowed from the scratch.
#[derive(Debug)]
pub struct FilledMatrix<'s, T: BandScore> {
    scores: &'s [T],
    dir_nogap: &'s [u8],
    dir_egap: &'s [u8],
    dir_fgap: &'s [u8],
    stride: usize,
    pub rows: usize,
    pub cols: usize,
    pub band: Band,
    pub init: GapInit,
    pub tier: QualityTier,
    pub gap_class: GapClass,
    pub jump_late: bool,
}

impl<'s, T: BandScore> FilledMatrix<'s, T> {
    #[inline]
    fn ix(&self, row: usize, col: usize) -> usize {
        col * self.stride + row
    }

    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row <= self.rows && col <= self.cols && self.band.contains(row, col)
    }

    /// Cell score, or a large negative value outside the band.
    #[inline]
    pub fn score(&self, row: usize, col: usize) -> i32 {
        if self.contains(row, col) {
            self.scores[self.ix(row, col)].to_i32()
        } else {
            i32::MIN / 2
        }
    }

    #[inline]
    pub fn dir_nogap_at(&self, row: usize, col: usize) -> u8 {
        self.dir_nogap[self.ix(row, col)]
    }

    #[inline]
    pub fn dir_egap_at(&self, row: usize, col: usize) -> u8 {
        self.dir_egap[self.ix(row, col)]
    }

    #[inline]
    pub fn dir_fgap_at(&self, row: usize, col: usize) -> u8 {
        self.dir_fgap[self.ix(row, col)]
    }

    /// The terminal corner cell (both sequences fully consumed).
    #[inline]
    pub fn corner(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Best-scoring cell over the whole band. Scan order is row-major, so
    /// the earliest maximum wins ties deterministically.
    pub fn best_endpoint(&self) -> (usize, usize, i32) {
        let mut best = (0usize, 0usize, i32::MIN / 2);
        for r in 0..=self.rows {
            let (lo, hi) = self.band.col_range(r, self.cols);
            if lo > hi {
                continue;
            }
            for c in lo..=hi {
                let s = self.scores[self.ix(r, c)].to_i32();
                if s > best.2 {
                    best = (r, c, s);
                }
            }
        }
        best
    }

    /// Best-scoring cell in one row of the band.
    pub fn best_in_row(&self, row: usize) -> Option<(usize, i32)> {
        let (lo, hi) = self.band.col_range(row, self.cols);
        if lo > hi || row > self.rows {
            return None;
        }
        let mut best: Option<(usize, i32)> = None;
        for c in lo..=hi {
            let s = self.scores[self.ix(row, c)].to_i32();
            if best.map_or(true, |(_, bs)| s > bs) {
                best = Some((c, s));
            }
        }
        best
    }
}

/// Narrowest width whose safe path length covers the requested extents.
pub fn select_width(cfg: &ScoringConfig, tier: QualityTier, rows: usize, cols: usize) -> ScoreWidth {
    let steps = rows + cols;
    if steps <= cfg.safe_steps(tier, 8) {
        ScoreWidth::Bits8
    } else if steps <= cfg.safe_steps(tier, 16) {
        ScoreWidth::Bits16
    } else {
        ScoreWidth::Bits32
    }
}

#[inline]
fn pick_gap<T: BandScore>(open: T, ext: T, ext_dir: u8, jump_late: bool) -> (T, u8) {
    let take_ext = if jump_late { ext >= open } else { ext > open };
    if take_ext {
        (ext, ext_dir)
    } else {
        (open, DIR_DIAG)
    }
}

/// Fill the banded matrices for one query/genome window pair.
///
/// Row 0 and column 0 are seeded per the init policy; the direction at the
/// origin is always diagonal, which traceback uses as its terminal marker.
pub fn fill_matrix<'s, T: BandScore>(
    scratch: &'s mut BandedScratch,
    cfg: &ScoringConfig,
    p: &BandedParams<'_>,
) -> Result<FilledMatrix<'s, T>, CapacityError> {
    let rows = p.query.len();
    let cols = p.genome.len();
    assert_eq!(
        cols,
        p.genome_alt.len(),
        "alternate-allele stream must match the genome window"
    );
    scratch.check(rows, cols)?;
    // Contract: every row must reach the band, else the fill would leave
    // unreachable rows and traceback could read stale cells.
    assert!(
        rows <= cols + p.band.lower as usize,
        "band (lower={}) leaves rows {}..{} unreachable over {} columns",
        p.band.lower,
        cols + p.band.lower as usize + 1,
        rows,
        cols
    );

    let stride = scratch.stride();
    let tier = cfg.tier(p.tier);
    let gaps = tier.gaps(p.gap_class);
    let open_ext = T::from_i32(gaps.open + gaps.extend);
    let ext = T::from_i32(gaps.extend);
    let jump_late = p.jump_late;

    let parts = T::parts(scratch);
    let scores = parts.scores;
    let dir_nogap = parts.dir_nogap;
    let dir_egap = parts.dir_egap;
    let dir_fgap = parts.dir_fgap;
    let f_row = parts.f_row;

    let ix = |r: usize, c: usize| c * stride + r;

    // Origin
    scores[ix(0, 0)] = T::from_i32(0);
    dir_nogap[ix(0, 0)] = DIR_DIAG;
    dir_egap[ix(0, 0)] = DIR_DIAG;
    dir_fgap[ix(0, 0)] = DIR_DIAG;

    // Row 0 edge: horizontal (genome-side) gap from the origin.
    let (_, hi0) = p.band.col_range(0, cols);
    for c in 1..=hi0 {
        let s = match p.init {
            GapInit::Penalized => gaps.open + gaps.extend * c as i32,
            GapInit::Free => 0,
        };
        scores[ix(0, c)] = T::from_i32(s);
        dir_nogap[ix(0, c)] = DIR_HORIZ;
        dir_egap[ix(0, c)] = if c == 1 { DIR_DIAG } else { DIR_HORIZ };
        dir_fgap[ix(0, c)] = DIR_DIAG;
    }
    if hi0 + 1 <= cols {
        scores[ix(0, hi0 + 1)] = T::NEG_INF;
    }

    // Column 0 edge: vertical (query-side) gap from the origin.
    let col0_max = (p.band.lower as usize).min(rows);
    for r in 1..=col0_max {
        let s = match p.init {
            GapInit::Penalized => gaps.open + gaps.extend * r as i32,
            GapInit::Free => 0,
        };
        scores[ix(r, 0)] = T::from_i32(s);
        dir_nogap[ix(r, 0)] = DIR_VERT;
        dir_fgap[ix(r, 0)] = if r == 1 { DIR_DIAG } else { DIR_VERT };
        dir_egap[ix(r, 0)] = DIR_DIAG;
    }
    if col0_max + 1 <= rows {
        scores[ix(col0_max + 1, 0)] = T::NEG_INF;
    }

    // F carries the vertical-gap state down columns; columns that have not
    // yet entered the band read negative infinity.
    for f in f_row.iter_mut().take(cols + 1) {
        *f = T::NEG_INF;
    }

    for r in 1..=rows {
        let (band_lo, hi) = p.band.col_range(r, cols);
        let lo = band_lo.max(1);
        if lo > hi {
            continue;
        }
        // Mask the cell just left of the band unless it is a live column-0
        // edge cell.
        if lo >= 1 && !(lo == 1 && r <= p.band.lower as usize) {
            scores[ix(r, lo - 1)] = T::NEG_INF;
        }

        let qbase = p.query[r - 1];
        let mut e = T::NEG_INF;
        let mut h_diag = scores[ix(r - 1, lo - 1)];

        for c in lo..=hi {
            let h_up = scores[ix(r - 1, c)];
            let sub = T::from_i32(tier.pair_score_alleles(
                qbase,
                p.genome[c - 1],
                p.genome_alt[c - 1],
            ));
            let m = h_diag.sat_add(sub);

            let h_left = scores[ix(r, c - 1)];
            let e_open = h_left.sat_add(open_ext);
            let e_ext = e.sat_add(ext);
            let (e_new, e_dir) = pick_gap(e_open, e_ext, DIR_HORIZ, jump_late);

            let f_open = h_up.sat_add(open_ext);
            let f_ext = f_row[c].sat_add(ext);
            let (f_new, f_dir) = pick_gap(f_open, f_ext, DIR_VERT, jump_late);

            let mut h = m;
            let mut dir = DIR_DIAG;
            if jump_late {
                if e_new >= h {
                    h = e_new;
                    dir = DIR_HORIZ;
                }
                if f_new >= h {
                    h = f_new;
                    dir = DIR_VERT;
                }
            } else {
                if e_new > h {
                    h = e_new;
                    dir = DIR_HORIZ;
                }
                if f_new > h {
                    h = f_new;
                    dir = DIR_VERT;
                }
            }

            let i = ix(r, c);
            scores[i] = h;
            dir_nogap[i] = dir;
            dir_egap[i] = e_dir;
            dir_fgap[i] = f_dir;

            e = e_new;
            f_row[c] = f_new;
            h_diag = h_up;
        }

        if hi + 1 <= cols {
            scores[ix(r, hi + 1)] = T::NEG_INF;
        }
    }

    let scratch = &*scratch;
    Ok(FilledMatrix {
        scores: T::scores(scratch),
        dir_nogap: &scratch.dir_nogap,
        dir_egap: &scratch.dir_egap,
        dir_fgap: &scratch.dir_fgap,
        stride,
        rows,
        cols,
        band: p.band,
        init: p.init,
        tier: p.tier,
        gap_class: p.gap_class,
        jump_late: p.jump_late,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::defaults::FULLMATCH;

    fn params<'a>(query: &'a [u8], genome: &'a [u8], band: Band) -> BandedParams<'a> {
        BandedParams {
            query,
            genome,
            genome_alt: genome,
            band,
            init: GapInit::Penalized,
            tier: QualityTier::High,
            gap_class: GapClass::Single,
            jump_late: false,
        }
    }

    #[test]
    fn test_zero_band_perfect_match() {
        let cfg = ScoringConfig::with_defaults();
        let mut scratch = BandedScratch::new(16, 16);
        let p = params(b"ACGTACGT", b"ACGTACGT", Band::new(0, 0));
        let m = fill_matrix::<i32>(&mut scratch, &cfg, &p).unwrap();
        assert_eq!(m.score(8, 8), 8 * FULLMATCH);
        assert_eq!(m.dir_nogap_at(0, 0), DIR_DIAG);
    }

    #[test]
    fn test_capacity_rejection_then_success() {
        let cfg = ScoringConfig::with_defaults();
        let mut scratch = BandedScratch::new(4, 4);
        let q = b"ACGTACGT";
        let p = params(q, q, Band::new(2, 2));
        assert!(fill_matrix::<i32>(&mut scratch, &cfg, &p).is_err());
        // A valid call afterwards succeeds with no residual corruption.
        let p2 = params(b"ACGT", b"ACGT", Band::new(2, 2));
        let m = fill_matrix::<i32>(&mut scratch, &cfg, &p2).unwrap();
        assert_eq!(m.score(4, 4), 4 * FULLMATCH);
    }

    #[test]
    fn test_mismatch_scoring() {
        let cfg = ScoringConfig::with_defaults();
        let mut scratch = BandedScratch::new(16, 16);
        let p = params(b"ACGT", b"AGGT", Band::new(2, 2));
        let m = fill_matrix::<i32>(&mut scratch, &cfg, &p).unwrap();
        let t = cfg.tier(QualityTier::High);
        assert_eq!(m.score(4, 4), 3 * FULLMATCH + t.mismatch);
    }

    #[test]
    fn test_alternate_allele_rescues_match() {
        let cfg = ScoringConfig::with_defaults();
        let mut scratch = BandedScratch::new(16, 16);
        let genome = b"AGGT";
        let alt = b"ACGT";
        let p = BandedParams {
            query: b"ACGT",
            genome,
            genome_alt: alt,
            band: Band::new(2, 2),
            init: GapInit::Penalized,
            tier: QualityTier::High,
            gap_class: GapClass::Single,
            jump_late: false,
        };
        let m = fill_matrix::<i32>(&mut scratch, &cfg, &p).unwrap();
        assert_eq!(m.score(4, 4), 4 * FULLMATCH);
    }

    #[test]
    fn test_free_init_zeroes_edges() {
        let cfg = ScoringConfig::with_defaults();
        let mut scratch = BandedScratch::new(16, 16);
        let mut p = params(b"ACGT", b"ACGT", Band::new(4, 4));
        p.init = GapInit::Free;
        let m = fill_matrix::<i32>(&mut scratch, &cfg, &p).unwrap();
        assert_eq!(m.score(0, 3), 0);
        assert_eq!(m.score(3, 0), 0);
    }

    #[test]
    fn test_single_gap_preferred() {
        let cfg = ScoringConfig::with_defaults();
        let mut scratch = BandedScratch::new(16, 16);
        // Genome has one extra base relative to the query.
        let p = params(b"ACGTACGT", b"ACGTTACGT", Band::new(2, 2));
        let m = fill_matrix::<i32>(&mut scratch, &cfg, &p).unwrap();
        let t = cfg.tier(QualityTier::High);
        let expected = 8 * FULLMATCH + t.single.open + t.single.extend;
        assert_eq!(m.score(8, 9), expected);
    }
}
