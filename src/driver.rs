//! Alignment driver: chains seeds, converts anchors to base-level pairs,
//! and refines gaps and read ends with banded fills, intron bridges and
//! traceback.
//!
//! Recoverable conditions never abort a query: a rejected (over-capacity)
//! fill or a failed bridge degrades to a plain indel representation, and
//! degenerate inputs produce empty results.

use std::sync::Arc;

use rayon::prelude::*;

use crate::banded::traceback::classify_pair;
use crate::banded::{
    bridge_intron_gap, fill_matrix, select_width, traceback, AlignedPair, Band, BandScore,
    BandedParams, BandedScratch, BridgeParams, GapInit, PairOp, ScoreWidth, TracebackInput,
    TracebackSummary,
};
use crate::chaining::{chain_hits, ChainDirection, ChainPath, ChainingInputs, SeedHitTable};
use crate::config::{GapClass, QualityTier, ScoringConfig};
use crate::defaults::{
    ACCEPTOR_CONTEXT, BRIDGE_ANCHOR_CONTEXT, BRIDGE_BAND_EXTRA, CHAIN_OVERLAP_DEDUP, DEFAULT_BAND,
    DONOR_CONTEXT, END_REFINE_SLACK,
};
use crate::genome::{GenomeAccessor, Strand, GAP_CHAR};
use crate::splice::{KnownSpliceSites, SpliceSiteModel};
use crate::workspace::{with_workspace, AlignWorkspace};

/// Summary counters for one finished alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignmentStats {
    pub matches: u32,
    pub ambig_matches: u32,
    pub mismatches: u32,
    pub gap_opens: u32,
    pub gap_bases: u32,
    pub introns: u32,
    pub score: i32,
}

impl AlignmentStats {
    fn add_summary(&mut self, s: &TracebackSummary) {
        self.matches += s.matches;
        self.ambig_matches += s.ambig_matches;
        self.mismatches += s.mismatches;
        self.gap_opens += s.gap_opens;
        self.gap_bases += s.gap_bases;
        self.score += s.score;
    }
}

/// One finished alignment: ordered pairs plus summary counters.
#[derive(Debug, Clone)]
pub struct SplicedAlignment {
    pub pairs: Vec<AlignedPair>,
    pub stats: AlignmentStats,
    /// Half-open query interval covered by query-consuming pairs.
    pub query_span: (u32, u32),
    /// Half-open genomic interval covered by genome-consuming pairs.
    pub genome_span: (u64, u64),
    pub strand: Strand,
    pub chain_score: i32,
}

/// One query's inputs. All references are caller-owned; the driver never
/// mutates them.
#[derive(Clone, Copy)]
pub struct AlignmentRequest<'a> {
    pub query: &'a [u8],
    pub strand: Strand,
    pub tier: QualityTier,
    pub genome: &'a dyn GenomeAccessor,
    pub seeds: &'a SeedHitTable,
    pub splice_model: &'a dyn SpliceSiteModel,
    pub known_sites: Option<&'a dyn KnownSpliceSites>,
    pub splicing: bool,
    pub known_only: bool,
}

/// Orchestrates SeedChainer -> BandedMatrix/IntronBridge -> Traceback.
pub struct AlignmentDriver {
    cfg: Arc<ScoringConfig>,
}

/// A maximal same-diagonal anchor run, in base coordinates.
#[derive(Debug, Clone, Copy)]
struct Run {
    q: u32,
    g: u64,
    len: u32,
}

impl AlignmentDriver {
    pub fn new(cfg: Arc<ScoringConfig>) -> Self {
        AlignmentDriver { cfg }
    }

    pub fn config(&self) -> &Arc<ScoringConfig> {
        &self.cfg
    }

    /// Align one query, reusing the caller's workspace.
    pub fn align(
        &self,
        req: &AlignmentRequest<'_>,
        ws: &mut AlignWorkspace,
    ) -> Vec<SplicedAlignment> {
        if req.query.is_empty() || req.seeds.is_empty() {
            return Vec::new();
        }
        ws.reset();
        ws.query_uc
            .extend(req.query.iter().map(|b| b.to_ascii_uppercase()));

        let chains = {
            let inputs = ChainingInputs {
                table: req.seeds,
                genome: Some(req.genome),
                strand: req.strand,
                splicing: req.splicing,
                direction: ChainDirection::Forward,
            };
            chain_hits(&inputs, &self.cfg, &mut ws.links, &mut ws.chain)
        };
        if chains.is_empty() {
            return Vec::new();
        }
        log::debug!(
            "driver: {} candidate chain(s) for {}bp query",
            chains.len(),
            req.query.len()
        );

        let mut results = Vec::with_capacity(chains.len());
        for path in &chains {
            if let Some(aln) = self.build_alignment(req, path, ws) {
                results.push(aln);
            }
        }
        dedup_overlapping(results)
    }

    /// Align a batch of queries on the rayon pool, one thread-local
    /// workspace per worker.
    pub fn align_batch(&self, requests: &[AlignmentRequest<'_>]) -> Vec<Vec<SplicedAlignment>> {
        requests
            .par_iter()
            .map(|req| with_workspace(&self.cfg, |ws| self.align(req, ws)))
            .collect()
    }

    fn build_alignment(
        &self,
        req: &AlignmentRequest<'_>,
        path: &ChainPath,
        ws: &mut AlignWorkspace,
    ) -> Option<SplicedAlignment> {
        let cfg = &*self.cfg;
        let k = cfg.chaining.oligomer_size as u32;
        let runs = merge_anchors(&path.anchors, k);
        if runs.is_empty() {
            return None;
        }

        ws.pairs.clear();
        let mut stats = AlignmentStats::default();

        self.refine_head(req, runs[0], ws, &mut stats);

        let mut trim_start = 0u32;
        for i in 0..runs.len() {
            let mut run = runs[i];
            debug_assert!(trim_start <= run.len);
            run.q += trim_start;
            run.g += trim_start as u64;
            run.len -= trim_start;
            trim_start = 0;

            let Some(&next) = runs.get(i + 1) else {
                self.emit_diagonal(req, run.q, run.g, run.len, ws, &mut stats);
                break;
            };

            let r = next.q - (run.q + run.len);
            let g = next.g as i64 - (run.g + run.len as u64) as i64;
            debug_assert!(g >= 0, "runs regress in genome space");
            let g = g as u64;

            let spliceable = req.splicing
                && g >= r as u64 + cfg.intron.min_intron_length
                && g <= cfg.intron.max_intron_length;
            if spliceable {
                let flank_l = BRIDGE_ANCHOR_CONTEXT.min(run.len as usize) as u32;
                let flank_r = BRIDGE_ANCHOR_CONTEXT.min(next.len as usize) as u32;
                self.emit_diagonal(req, run.q, run.g, run.len - flank_l, ws, &mut stats);
                let seg_q = run.q + run.len - flank_l;
                let seg_g = run.g + (run.len - flank_l) as u64;
                let seg_len = r + flank_l + flank_r;
                let seg_g_end = next.g + flank_r as u64;
                if self.refine_bridge(req, seg_q, seg_g, seg_len, seg_g_end, ws, &mut stats) {
                    trim_start = flank_r;
                    continue;
                }
                // Bridge failed: restore the flank and fall through to the
                // plain-gap representation.
                self.emit_diagonal(req, seg_q, seg_g, flank_l, ws, &mut stats);
            } else {
                self.emit_diagonal(req, run.q, run.g, run.len, ws, &mut stats);
            }

            let qa_end = run.q + run.len;
            let ga_end = run.g + run.len as u64;
            if r == 0 && g == 0 {
                continue;
            }
            if r == 0 || g == 0 || !self.refine_gap(req, qa_end, ga_end, r, g, ws, &mut stats) {
                self.emit_plain_gap(req, qa_end, ga_end, r, g, ws, &mut stats);
            }
        }

        let last = runs[runs.len() - 1];
        self.refine_tail(req, last, ws, &mut stats);

        if ws.pairs.is_empty() {
            return None;
        }
        let (query_span, genome_span) = spans(&ws.pairs);
        stats.introns = count_introns(&ws.pairs);
        Some(SplicedAlignment {
            pairs: ws.pairs.clone(),
            stats,
            query_span,
            genome_span,
            strand: req.strand,
            chain_score: path.score,
        })
    }

    /// Direct diagonal emission for anchored runs: match/mismatch pairs,
    /// no matrix. Off-chromosome sentinels are skipped, matching the
    /// traceback contract.
    fn emit_diagonal(
        &self,
        req: &AlignmentRequest<'_>,
        q0: u32,
        g0: u64,
        len: u32,
        ws: &mut AlignWorkspace,
        stats: &mut AlignmentStats,
    ) {
        let tier = self.cfg.tier(req.tier);
        for i in 0..len {
            let q = (q0 + i) as usize;
            let base = req.genome.base_at(g0 + i as u64, req.strand);
            let qu = ws.query_uc[q];
            stats.score += tier.pair_score_alleles(qu, base.primary, base.alt);
            if base.is_off_chromosome() {
                continue;
            }
            let op = classify_pair(qu, base.primary, base.alt);
            match op {
                PairOp::Match => stats.matches += 1,
                PairOp::AmbigMatch => stats.ambig_matches += 1,
                _ => stats.mismatches += 1,
            }
            ws.pairs.push(AlignedPair {
                query_offset: q0 + i,
                genome_offset: g0 + i as u64,
                query_base: req.query[q],
                genome_base: base.primary,
                genome_alt: base.alt,
                op,
            });
        }
    }

    /// Plain (non-spliced) gap representation: the fallback when a gap is
    /// not refinable. Aligns the shorter side diagonally and emits the
    /// remainder as one indel run.
    fn emit_plain_gap(
        &self,
        req: &AlignmentRequest<'_>,
        qa_end: u32,
        ga_end: u64,
        r: u32,
        g: u64,
        ws: &mut AlignWorkspace,
        stats: &mut AlignmentStats,
    ) {
        let d = (r as u64).min(g) as u32;
        self.emit_diagonal(req, qa_end, ga_end, d, ws, stats);
        let gaps = self.cfg.tier(req.tier).gaps(GapClass::Single);
        if r > d {
            let len = r - d;
            for i in 0..len {
                let q = (qa_end + d + i) as usize;
                ws.pairs.push(AlignedPair {
                    query_offset: qa_end + d + i,
                    genome_offset: ga_end + d as u64,
                    query_base: req.query[q],
                    genome_base: GAP_CHAR,
                    genome_alt: GAP_CHAR,
                    op: PairOp::GenomeGap,
                });
            }
            stats.gap_opens += 1;
            stats.gap_bases += len;
            stats.score += gaps.open + gaps.extend * len as i32;
        }
        if g > d as u64 {
            let len = g - d as u64;
            for i in 0..len {
                let pos = ga_end + d as u64 + i;
                let base = req.genome.base_at(pos, req.strand);
                if base.is_off_chromosome() {
                    continue;
                }
                ws.pairs.push(AlignedPair {
                    query_offset: qa_end + r,
                    genome_offset: pos,
                    query_base: GAP_CHAR,
                    genome_base: base.primary,
                    genome_alt: base.alt,
                    op: PairOp::QueryGap,
                });
            }
            stats.gap_opens += 1;
            stats.gap_bases += len as u32;
            stats.score += gaps.open + gaps.extend * len as i32;
        }
    }

    /// Banded refinement of an internal gap anchored on both sides.
    /// Returns false when the fill is rejected for capacity and the caller
    /// must fall back.
    fn refine_gap(
        &self,
        req: &AlignmentRequest<'_>,
        qa_end: u32,
        ga_end: u64,
        r: u32,
        g: u64,
        ws: &mut AlignWorkspace,
        stats: &mut AlignmentStats,
    ) -> bool {
        let cfg = &*self.cfg;
        let rows = r as usize;
        let cols = g as usize;
        if ws.scratch_left.check(rows, cols).is_err() {
            log::debug!("driver: gap {rows}x{cols} exceeds scratch, plain fallback");
            return false;
        }
        let lower = DEFAULT_BAND + (rows as i64 - cols as i64).max(0) as i32;
        let upper = DEFAULT_BAND + (cols as i64 - rows as i64).max(0) as i32;
        let band = Band::new(lower, upper);

        req.genome
            .fill_window(ga_end, cols, req.strand, &mut ws.gwin_primary, &mut ws.gwin_alt);
        let width = select_width(cfg, req.tier, rows, cols);
        let p = BandedParams {
            query: &ws.query_uc[qa_end as usize..(qa_end + r) as usize],
            genome: &ws.gwin_primary,
            genome_alt: &ws.gwin_alt,
            band,
            init: GapInit::Penalized,
            tier: req.tier,
            gap_class: GapClass::Single,
            jump_late: false,
        };
        let input = TracebackInput {
            query: &req.query[qa_end as usize..(qa_end + r) as usize],
            query_uc: p.query,
            genome: p.genome,
            genome_alt: p.genome_alt,
            query_offset: qa_end,
            genome_offset: ga_end,
        };
        let sum = match width {
            ScoreWidth::Bits8 => {
                fill_and_trace::<i8>(&mut ws.scratch_left, cfg, &p, &input, &mut ws.pairs)
            }
            ScoreWidth::Bits16 => {
                fill_and_trace::<i16>(&mut ws.scratch_left, cfg, &p, &input, &mut ws.pairs)
            }
            ScoreWidth::Bits32 => {
                fill_and_trace::<i32>(&mut ws.scratch_left, cfg, &p, &input, &mut ws.pairs)
            }
        };
        match sum {
            Some(sum) => {
                stats.add_summary(&sum);
                true
            }
            None => false,
        }
    }

    /// Refine the unresolved query head before the first run: a reversed
    /// fill whose origin sits at the run start, extended toward the read
    /// start and trimmed at the best-scoring endpoint. A non-positive best
    /// endpoint trims the whole head.
    fn refine_head(
        &self,
        req: &AlignmentRequest<'_>,
        first: Run,
        ws: &mut AlignWorkspace,
        stats: &mut AlignmentStats,
    ) {
        let cfg = &*self.cfg;
        let head = first.q as usize;
        if head == 0 {
            return;
        }
        let mut rows = head.min(cfg.band_limits.max_rows);
        let mut cols = (rows + END_REFINE_SLACK).min(cfg.band_limits.max_cols);
        let gw0 = first.g.saturating_sub(cols as u64);
        cols = (first.g - gw0) as usize;
        if cols == 0 {
            return;
        }
        // Keep every row reachable when the chromosome start truncates the
        // genome window.
        rows = rows.min(cols + DEFAULT_BAND as usize);
        let q0 = first.q as usize - rows;

        req.genome
            .fill_window(gw0, cols, req.strand, &mut ws.gwin_primary, &mut ws.gwin_alt);
        ws.rev_seq.clear();
        ws.rev_seq.extend(req.query[q0..head].iter().rev());
        ws.rev_seq_uc.clear();
        ws.rev_seq_uc.extend(ws.query_uc[q0..head].iter().rev());
        ws.rev_gwin_primary.clear();
        ws.rev_gwin_primary.extend(ws.gwin_primary.iter().rev());
        ws.rev_gwin_alt.clear();
        ws.rev_gwin_alt.extend(ws.gwin_alt.iter().rev());

        let p = BandedParams {
            query: &ws.rev_seq_uc,
            genome: &ws.rev_gwin_primary,
            genome_alt: &ws.rev_gwin_alt,
            band: end_band(rows, cols),
            init: GapInit::Penalized,
            tier: req.tier,
            gap_class: GapClass::Single,
            jump_late: true,
        };
        let input = TracebackInput {
            query: &ws.rev_seq,
            query_uc: &ws.rev_seq_uc,
            genome: &ws.rev_gwin_primary,
            genome_alt: &ws.rev_gwin_alt,
            query_offset: 0,
            genome_offset: 0,
        };
        let mark = ws.pairs.len();
        let sum = match select_width(cfg, req.tier, rows, cols) {
            ScoreWidth::Bits8 => {
                extend_and_trace::<i8>(&mut ws.scratch_left, cfg, &p, &input, &mut ws.pairs)
            }
            ScoreWidth::Bits16 => {
                extend_and_trace::<i16>(&mut ws.scratch_left, cfg, &p, &input, &mut ws.pairs)
            }
            ScoreWidth::Bits32 => {
                extend_and_trace::<i32>(&mut ws.scratch_left, cfg, &p, &input, &mut ws.pairs)
            }
        };
        if let Some(sum) = sum {
            stats.add_summary(&sum);
            remap_reversed(&mut ws.pairs[mark..], first.q, first.g);
        }
    }

    /// Refine the unresolved query tail after the last run: a forward fill
    /// from the run end, trimmed at the best-scoring endpoint.
    fn refine_tail(
        &self,
        req: &AlignmentRequest<'_>,
        last: Run,
        ws: &mut AlignWorkspace,
        stats: &mut AlignmentStats,
    ) {
        let cfg = &*self.cfg;
        let q_end = (last.q + last.len) as usize;
        let tail = req.query.len() - q_end;
        if tail == 0 {
            return;
        }
        let rows = tail.min(cfg.band_limits.max_rows);
        let cols = (rows + END_REFINE_SLACK).min(cfg.band_limits.max_cols);
        let g_end = last.g + last.len as u64;

        req.genome
            .fill_window(g_end, cols, req.strand, &mut ws.gwin_primary, &mut ws.gwin_alt);
        let p = BandedParams {
            query: &ws.query_uc[q_end..q_end + rows],
            genome: &ws.gwin_primary,
            genome_alt: &ws.gwin_alt,
            band: end_band(rows, cols),
            init: GapInit::Penalized,
            tier: req.tier,
            gap_class: GapClass::Single,
            jump_late: false,
        };
        let input = TracebackInput {
            query: &req.query[q_end..q_end + rows],
            query_uc: p.query,
            genome: p.genome,
            genome_alt: p.genome_alt,
            query_offset: q_end as u32,
            genome_offset: g_end,
        };
        let sum = match select_width(cfg, req.tier, rows, cols) {
            ScoreWidth::Bits8 => {
                extend_and_trace::<i8>(&mut ws.scratch_left, cfg, &p, &input, &mut ws.pairs)
            }
            ScoreWidth::Bits16 => {
                extend_and_trace::<i16>(&mut ws.scratch_left, cfg, &p, &input, &mut ws.pairs)
            }
            ScoreWidth::Bits32 => {
                extend_and_trace::<i32>(&mut ws.scratch_left, cfg, &p, &input, &mut ws.pairs)
            }
        };
        if let Some(sum) = sum {
            stats.add_summary(&sum);
        }
    }

    /// Bridge a large gap across a splice junction. Emits left pairs,
    /// intron pairs and right pairs on success.
    #[allow(clippy::too_many_arguments)]
    fn refine_bridge(
        &self,
        req: &AlignmentRequest<'_>,
        seg_q: u32,
        seg_g: u64,
        seg_len: u32,
        seg_g_end: u64,
        ws: &mut AlignWorkspace,
        stats: &mut AlignmentStats,
    ) -> bool {
        let rows = seg_len as usize;
        let cols = (rows + BRIDGE_BAND_EXTRA).min(self.cfg.band_limits.max_cols);
        match select_width(&self.cfg, req.tier, rows, cols) {
            ScoreWidth::Bits8 => {
                self.refine_bridge_impl::<i8>(req, seg_q, seg_g, seg_len, seg_g_end, ws, stats)
            }
            ScoreWidth::Bits16 => {
                self.refine_bridge_impl::<i16>(req, seg_q, seg_g, seg_len, seg_g_end, ws, stats)
            }
            ScoreWidth::Bits32 => {
                self.refine_bridge_impl::<i32>(req, seg_q, seg_g, seg_len, seg_g_end, ws, stats)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn refine_bridge_impl<T: BandScore>(
        &self,
        req: &AlignmentRequest<'_>,
        seg_q: u32,
        seg_g: u64,
        seg_len: u32,
        seg_g_end: u64,
        ws: &mut AlignWorkspace,
        stats: &mut AlignmentStats,
    ) -> bool {
        let cfg = &*self.cfg;
        let rows = seg_len as usize;
        let span = seg_g_end - seg_g; // total genomic span of the segment
        let cols = (rows + BRIDGE_BAND_EXTRA).min(cfg.band_limits.max_cols);
        if ws.scratch_left.check(rows, cols).is_err() || (cols as u64) > span {
            log::debug!("driver: bridge segment {rows}x{cols} not refinable");
            return false;
        }

        // Left window: forward from the segment start, with margin for the
        // donor dinucleotide and context.
        let left_fetch = cols + DONOR_CONTEXT;
        req.genome.fill_window(
            seg_g,
            left_fetch,
            req.strand,
            &mut ws.gwin_primary,
            &mut ws.gwin_alt,
        );
        // Right window: ends at the segment end; margin bases sit before
        // the matrix region for the acceptor dinucleotide and context.
        let right_fetch = cols + ACCEPTOR_CONTEXT;
        if seg_g_end < right_fetch as u64 {
            return false;
        }
        let rw0 = seg_g_end - right_fetch as u64;
        req.genome.fill_window(
            rw0,
            right_fetch,
            req.strand,
            &mut ws.gwin_primary_right,
            &mut ws.gwin_alt_right,
        );

        ws.rev_seq.clear();
        ws.rev_seq
            .extend(req.query[seg_q as usize..(seg_q + seg_len) as usize].iter().rev());
        ws.rev_seq_uc.clear();
        ws.rev_seq_uc
            .extend(ws.query_uc[seg_q as usize..(seg_q + seg_len) as usize].iter().rev());
        let right_region_start = right_fetch - cols;
        ws.rev_gwin_primary.clear();
        ws.rev_gwin_primary
            .extend(ws.gwin_primary_right[right_region_start..].iter().rev());
        ws.rev_gwin_alt.clear();
        ws.rev_gwin_alt
            .extend(ws.gwin_alt_right[right_region_start..].iter().rev());

        let band = Band::new(rows as i32, BRIDGE_BAND_EXTRA as i32);
        let lp = BandedParams {
            query: &ws.query_uc[seg_q as usize..(seg_q + seg_len) as usize],
            genome: &ws.gwin_primary[..cols],
            genome_alt: &ws.gwin_alt[..cols],
            band,
            init: GapInit::Penalized,
            tier: req.tier,
            gap_class: GapClass::Paired,
            jump_late: false,
        };
        let rp = BandedParams {
            query: &ws.rev_seq_uc,
            genome: &ws.rev_gwin_primary,
            genome_alt: &ws.rev_gwin_alt,
            band,
            init: GapInit::Penalized,
            tier: req.tier,
            gap_class: GapClass::Paired,
            jump_late: true,
        };

        let left = match fill_matrix::<T>(&mut ws.scratch_left, cfg, &lp) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("driver: left bridge fill rejected: {e}");
                return false;
            }
        };
        let right = match fill_matrix::<T>(&mut ws.scratch_right, cfg, &rp) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("driver: right bridge fill rejected: {e}");
                return false;
            }
        };

        let bp = BridgeParams {
            left_genome: &ws.gwin_primary,
            right_genome: &ws.gwin_primary_right,
            left_genome_start: seg_g,
            right_genome_start: rw0,
            strand: req.strand,
            known_only: req.known_only,
        };
        let Some(res) =
            bridge_intron_gap(&left, &right, &bp, cfg, req.splice_model, req.known_sites)
        else {
            log::debug!("driver: no junction found, plain fallback");
            return false;
        };

        // Left side pairs.
        let left_input = TracebackInput {
            query: &req.query[seg_q as usize..(seg_q + seg_len) as usize],
            query_uc: lp.query,
            genome: lp.genome,
            genome_alt: lp.genome_alt,
            query_offset: seg_q,
            genome_offset: seg_g,
        };
        let lsum = traceback(&left, &left_input, cfg, res.left_cell, &mut ws.pairs);
        stats.add_summary(&lsum);

        // Intron pairs, one per spliced-out genome base.
        for pos in res.donor_pos..=res.acceptor_pos {
            let base = req.genome.base_at(pos, req.strand);
            if base.is_off_chromosome() {
                continue;
            }
            ws.pairs.push(AlignedPair {
                query_offset: seg_q + res.query_split as u32,
                genome_offset: pos,
                query_base: GAP_CHAR,
                genome_base: base.primary,
                genome_alt: base.alt,
                op: PairOp::Intron,
            });
        }
        stats.score += res.total_score - res.align_score;

        // Right side pairs: relative traceback on the reversed matrix,
        // then remap to absolute coordinates.
        let right_input = TracebackInput {
            query: &ws.rev_seq,
            query_uc: &ws.rev_seq_uc,
            genome: &ws.rev_gwin_primary,
            genome_alt: &ws.rev_gwin_alt,
            query_offset: 0,
            genome_offset: 0,
        };
        let mark = ws.pairs.len();
        let rsum = traceback(&right, &right_input, cfg, res.right_cell, &mut ws.pairs);
        stats.add_summary(&rsum);
        remap_reversed(&mut ws.pairs[mark..], seg_q + seg_len, seg_g_end);

        log::debug!(
            "driver: junction {:?} intron {}bp at {}..{} (p={:.2}/{:.2})",
            res.intron_class,
            res.intron_length,
            res.donor_pos,
            res.acceptor_pos,
            res.donor_prob,
            res.acceptor_prob
        );
        true
    }
}

/// Fill at one width, then trace from the corner. Shares the monomorphized
/// path between widths. Returns `None` if the fill is rejected.
fn fill_and_trace<T: BandScore>(
    scratch: &mut BandedScratch,
    cfg: &ScoringConfig,
    p: &BandedParams<'_>,
    input: &TracebackInput<'_>,
    pairs: &mut Vec<AlignedPair>,
) -> Option<TracebackSummary> {
    let m = match fill_matrix::<T>(scratch, cfg, p) {
        Ok(m) => m,
        Err(e) => {
            log::debug!("driver: fill rejected: {e}");
            return None;
        }
    };
    let corner = m.corner();
    Some(traceback(&m, input, cfg, corner, pairs))
}

/// Fill, pick the best in-band endpoint, and trace from it when positive.
/// Used for read-end extension, where trailing garbage is trimmed by
/// endpoint choice rather than forced to the corner.
fn extend_and_trace<T: BandScore>(
    scratch: &mut BandedScratch,
    cfg: &ScoringConfig,
    p: &BandedParams<'_>,
    input: &TracebackInput<'_>,
    pairs: &mut Vec<AlignedPair>,
) -> Option<TracebackSummary> {
    let m = match fill_matrix::<T>(scratch, cfg, p) {
        Ok(m) => m,
        Err(e) => {
            log::debug!("driver: end fill rejected: {e}");
            return None;
        }
    };
    let (r, c, s) = m.best_endpoint();
    if s <= 0 || (r == 0 && c == 0) {
        return None; // whole extension trimmed
    }
    Some(traceback(&m, input, cfg, (r, c), pairs))
}

fn end_band(rows: usize, cols: usize) -> Band {
    let slack = (cols as i64 - rows as i64).max(0) as i32;
    Band::new(DEFAULT_BAND, slack + DEFAULT_BAND)
}

/// Remap pairs emitted against reversed windows: relative (q, g) becomes
/// (q_end - 1 - q, g_end - 1 - g), and the segment order flips back to
/// ascending.
fn remap_reversed(pairs: &mut [AlignedPair], q_end: u32, g_end: u64) {
    for p in pairs.iter_mut() {
        p.query_offset = q_end - 1 - p.query_offset;
        p.genome_offset = g_end - 1 - p.genome_offset;
    }
    pairs.reverse();
}

/// Merge chain anchors into maximal same-diagonal runs, trimming query and
/// genome overlap between neighbouring runs.
fn merge_anchors(anchors: &[(u32, u64)], k: u32) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for &(q, g) in anchors {
        if let Some(last) = runs.last_mut() {
            let dq = q as i64 - last.q as i64;
            let dg = g as i64 - last.g as i64;
            if dq >= 1 && dq == dg && dq <= k as i64 {
                last.len = (q - last.q) + k;
                continue;
            }
            if dq < 1 || dg < 1 {
                log::warn!("driver: dropping non-advancing anchor ({q}, {g})");
                continue;
            }
        }
        runs.push(Run { q, g, len: k });
    }
    for i in 0..runs.len().saturating_sub(1) {
        let next = runs[i + 1];
        let run = &mut runs[i];
        let max_q = next.q - run.q;
        let max_g = (next.g - run.g) as u32;
        run.len = run.len.min(max_q).min(max_g);
    }
    runs
}

fn spans(pairs: &[AlignedPair]) -> ((u32, u32), (u64, u64)) {
    let mut qs = (u32::MAX, 0u32);
    let mut gs = (u64::MAX, 0u64);
    for p in pairs {
        if p.op.consumes_query() {
            qs.0 = qs.0.min(p.query_offset);
            qs.1 = qs.1.max(p.query_offset + 1);
        }
        if p.op.consumes_genome() && p.op != PairOp::Intron {
            gs.0 = gs.0.min(p.genome_offset);
            gs.1 = gs.1.max(p.genome_offset + 1);
        }
    }
    if qs.0 == u32::MAX {
        qs = (0, 0);
    }
    if gs.0 == u64::MAX {
        gs = (0, 0);
    }
    (qs, gs)
}

fn count_introns(pairs: &[AlignedPair]) -> u32 {
    let mut n = 0;
    let mut in_intron = false;
    for p in pairs {
        let is_intron = p.op == PairOp::Intron;
        if is_intron && !in_intron {
            n += 1;
        }
        in_intron = is_intron;
    }
    n
}

/// Chains covering >50% mutually-overlapping genomic span are duplicates;
/// keep the best-scoring one.
fn dedup_overlapping(mut alns: Vec<SplicedAlignment>) -> Vec<SplicedAlignment> {
    alns.sort_by(|a, b| b.stats.score.cmp(&a.stats.score));
    let mut kept: Vec<SplicedAlignment> = Vec::new();
    for a in alns {
        let duplicate = kept
            .iter()
            .any(|kk| overlap_fraction(kk.genome_span, a.genome_span) > CHAIN_OVERLAP_DEDUP);
        if duplicate {
            log::debug!(
                "driver: dropping duplicate chain at {}..{}",
                a.genome_span.0,
                a.genome_span.1
            );
        } else {
            kept.push(a);
        }
    }
    kept
}

fn overlap_fraction(a: (u64, u64), b: (u64, u64)) -> f64 {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    if end <= start {
        return 0.0;
    }
    let overlap = (end - start) as f64;
    let min_len = (a.1 - a.0).min(b.1 - b.0).max(1) as f64;
    overlap / min_len
}
