//! Process-wide scoring configuration.
//!
//! Built once at startup and shared immutably (`Arc`) by every worker;
//! nothing here is mutated after construction. The per-tier substitution
//! tables are prebuilt 128x128 byte-indexed score matrices so the banded
//! fill does two table loads per cell and no branching.

use std::sync::Arc;

use crate::defaults::*;
use crate::genome::{base_mask, OFF_CHROMOSOME};
use crate::splice::IntronClass;

/// Sequence-quality tier selecting mismatch and gap penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [QualityTier::High, QualityTier::Medium, QualityTier::Low];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            QualityTier::High => 0,
            QualityTier::Medium => 1,
            QualityTier::Low => 2,
        }
    }
}

/// Gap class: a lone gap fill vs. the paired fills on either side of a
/// dual break, which carry stiffer open penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapClass {
    Single,
    Paired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapPenalties {
    pub open: i32,
    pub extend: i32,
}

/// Per-tier substitution scoring with its prebuilt pair table.
pub struct TierScoring {
    pub mismatch: i32,
    pub single: GapPenalties,
    pub paired: GapPenalties,
    pairscore: Vec<i8>, // 128 x 128, indexed [query & 0x7f][genome & 0x7f]
}

impl TierScoring {
    fn build(mismatch: i32, single: GapPenalties, paired: GapPenalties) -> Self {
        let mut pairscore = vec![0i8; 128 * 128];
        for q in 0u8..128 {
            let qm = base_mask(q);
            for g in 0u8..128 {
                let gm = base_mask(g);
                let s = if qm == 0 || gm == 0 {
                    // sentinel or junk byte: always a mismatch
                    mismatch
                } else if qm == gm && qm.count_ones() == 1 {
                    FULLMATCH
                } else if qm & gm != 0 {
                    HALFMATCH
                } else {
                    mismatch
                };
                pairscore[(q as usize) * 128 + g as usize] = s as i8;
            }
        }
        TierScoring {
            mismatch,
            single,
            paired,
            pairscore,
        }
    }

    /// Substitution score for one query base against one genome base.
    #[inline]
    pub fn pair_score(&self, query: u8, genome: u8) -> i32 {
        self.pairscore[((query & 0x7f) as usize) * 128 + (genome & 0x7f) as usize] as i32
    }

    /// Substitution score against a primary/alternate allele pair: the
    /// better of the two.
    #[inline]
    pub fn pair_score_alleles(&self, query: u8, primary: u8, alt: u8) -> i32 {
        let p = self.pair_score(query, primary);
        if alt == primary || alt == OFF_CHROMOSOME {
            p
        } else {
            p.max(self.pair_score(query, alt))
        }
    }

    pub fn gaps(&self, class: GapClass) -> GapPenalties {
        match class {
            GapClass::Single => self.single,
            GapClass::Paired => self.paired,
        }
    }

    /// Largest per-step score magnitude possible under this tier; used to
    /// precompute safe band extents per numeric width.
    fn max_step(&self) -> i32 {
        let gap = (self.single.open.abs() + self.single.extend.abs())
            .max(self.paired.open.abs() + self.paired.extend.abs());
        FULLMATCH.max(self.mismatch.abs()).max(gap)
    }
}

impl std::fmt::Debug for TierScoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierScoring")
            .field("mismatch", &self.mismatch)
            .field("single", &self.single)
            .field("paired", &self.paired)
            .finish()
    }
}

/// Intron bonus magnitudes and the site-level selection thresholds.
#[derive(Debug, Clone)]
pub struct IntronScoring {
    pub canonical: i32,
    pub semicanonical: i32,
    pub minor: i32,
    pub noncanonical: i32,
    pub known_site_bonus: i32,
    pub prob_sum_ceiling: f64,
    pub canonical_score_margin: i32,
    pub min_intron_length: u64,
    pub max_intron_length: u64,
}

impl Default for IntronScoring {
    fn default() -> Self {
        IntronScoring {
            canonical: INTRON_BONUS_GTAG,
            semicanonical: INTRON_BONUS_GCAG,
            minor: INTRON_BONUS_ATAC,
            noncanonical: 0,
            known_site_bonus: KNOWN_SITE_BONUS,
            prob_sum_ceiling: PROB_SUM_CEILING,
            canonical_score_margin: CANONICAL_SCORE_MARGIN,
            min_intron_length: MIN_INTRON_LENGTH,
            max_intron_length: MAX_INTRON_LENGTH,
        }
    }
}

impl IntronScoring {
    /// Bonus for a given dinucleotide class, same magnitude in both senses.
    pub fn bonus(&self, class: IntronClass) -> i32 {
        match class {
            IntronClass::GtAg | IntronClass::CtAc => self.canonical,
            IntronClass::GcAg | IntronClass::CtGc => self.semicanonical,
            IntronClass::AtAc | IntronClass::GtAt => self.minor,
            IntronClass::NonCanonical => self.noncanonical,
        }
    }
}

/// Chaining beam/lookback bounds.
#[derive(Debug, Clone)]
pub struct ChainingConfig {
    pub oligomer_size: usize,
    pub lookback: usize,
    pub beam_subopt: i32,
    pub max_hits_per_position: usize,
    pub max_consecutive_skips: usize,
    pub grand_winner_min_run: u32,
    pub max_paths: usize,
}

impl Default for ChainingConfig {
    fn default() -> Self {
        ChainingConfig {
            oligomer_size: OLIGOMER_SIZE,
            lookback: LOOKBACK_POSITIONS,
            beam_subopt: BEAM_SUBOPT,
            max_hits_per_position: MAX_HITS_PER_POSITION,
            max_consecutive_skips: MAX_CONSECUTIVE_SKIPS,
            grand_winner_min_run: GRAND_WINNER_MIN_RUN,
            max_paths: MAX_CHAIN_PATHS,
        }
    }
}

/// Maximum banded-matrix extents; scratch buffers are sized from these once
/// per worker and never resized mid-call.
#[derive(Debug, Clone, Copy)]
pub struct BandLimits {
    pub max_rows: usize,
    pub max_cols: usize,
}

impl Default for BandLimits {
    fn default() -> Self {
        BandLimits {
            max_rows: MAX_QUERY_SPAN,
            max_cols: MAX_GENOME_SPAN,
        }
    }
}

/// The one process-wide scoring configuration object.
pub struct ScoringConfig {
    tiers: [TierScoring; 3],
    pub intron: IntronScoring,
    pub chaining: ChainingConfig,
    pub band_limits: BandLimits,
    /// Per-tier maximum path steps (rows + cols) guaranteed overflow-free
    /// at 8-bit and 16-bit precision.
    safe_steps_8: [usize; 3],
    safe_steps_16: [usize; 3],
}

impl ScoringConfig {
    pub fn new(
        intron: IntronScoring,
        chaining: ChainingConfig,
        band_limits: BandLimits,
    ) -> Arc<Self> {
        let tiers = [
            TierScoring::build(
                MISMATCH_HIGHQ,
                GapPenalties {
                    open: SINGLE_OPEN_HIGHQ,
                    extend: SINGLE_EXTEND_HIGHQ,
                },
                GapPenalties {
                    open: PAIRED_OPEN_HIGHQ,
                    extend: PAIRED_EXTEND_HIGHQ,
                },
            ),
            TierScoring::build(
                MISMATCH_MEDQ,
                GapPenalties {
                    open: SINGLE_OPEN_MEDQ,
                    extend: SINGLE_EXTEND_MEDQ,
                },
                GapPenalties {
                    open: PAIRED_OPEN_MEDQ,
                    extend: PAIRED_EXTEND_MEDQ,
                },
            ),
            TierScoring::build(
                MISMATCH_LOWQ,
                GapPenalties {
                    open: SINGLE_OPEN_LOWQ,
                    extend: SINGLE_EXTEND_LOWQ,
                },
                GapPenalties {
                    open: PAIRED_OPEN_LOWQ,
                    extend: PAIRED_EXTEND_LOWQ,
                },
            ),
        ];

        let mut safe_steps_8 = [0usize; 3];
        let mut safe_steps_16 = [0usize; 3];
        for (i, tier) in tiers.iter().enumerate() {
            let step = tier.max_step();
            safe_steps_8[i] = ((i8::MAX as i32 - step) / step) as usize;
            safe_steps_16[i] = ((i16::MAX as i32 - step) / step) as usize;
        }

        Arc::new(ScoringConfig {
            tiers,
            intron,
            chaining,
            band_limits,
            safe_steps_8,
            safe_steps_16,
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(
            IntronScoring::default(),
            ChainingConfig::default(),
            BandLimits::default(),
        )
    }

    #[inline]
    pub fn tier(&self, tier: QualityTier) -> &TierScoring {
        &self.tiers[tier.index()]
    }

    /// Maximum overflow-free path length (rows + cols) for a numeric width.
    pub fn safe_steps(&self, tier: QualityTier, width_bits: u32) -> usize {
        match width_bits {
            8 => self.safe_steps_8[tier.index()],
            16 => self.safe_steps_16[tier.index()],
            _ => usize::MAX,
        }
    }
}

impl std::fmt::Debug for ScoringConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringConfig")
            .field("tiers", &self.tiers)
            .field("intron", &self.intron)
            .field("chaining", &self.chaining)
            .field("band_limits", &self.band_limits)
            .finish()
    }
}
