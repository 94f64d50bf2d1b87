// src/defaults.rs

// Seed / chaining constants
pub const OLIGOMER_SIZE: usize = 8;
pub const MAX_HITS_PER_POSITION: usize = 100;
pub const MAX_CONSECUTIVE_SKIPS: usize = 16;
pub const LOOKBACK_POSITIONS: usize = 40;
pub const BEAM_SUBOPT: i32 = 20;
pub const GRAND_WINNER_MIN_RUN: u32 = 20;
pub const MAX_CHAIN_PATHS: usize = 10;
pub const CHAIN_CONSEC_BONUS: i32 = 3;
pub const CHAIN_JOIN_BONUS: i32 = 8;
pub const CHAIN_MAX_INDEL: i64 = 30;
pub const CHAIN_INDEL_PENALTY_BASE: i32 = 2;
pub const CHAIN_INDEL_PENALTY_DIV: i64 = 8;
pub const CHAIN_SKIP_PENALTY_DIV: u32 = 2;
pub const CHAIN_INTRON_PENALTY_CANONICAL: i32 = 4;
pub const CHAIN_INTRON_PENALTY_NONCANONICAL: i32 = 7;
pub const SPLICE_PEEK_WINDOW: u64 = 4;

// Banded matrix extents (scratch is pre-sized from these)
pub const MAX_QUERY_SPAN: usize = 512;
pub const MAX_GENOME_SPAN: usize = 1024;
pub const DEFAULT_BAND: i32 = 10;
pub const END_REFINE_SLACK: usize = 12;
pub const BRIDGE_BAND_EXTRA: usize = 8;
pub const BRIDGE_ANCHOR_CONTEXT: usize = 8;

// Substitution scoring
pub const FULLMATCH: i32 = 3;
pub const HALFMATCH: i32 = 1;
pub const MISMATCH_HIGHQ: i32 = -10;
pub const MISMATCH_MEDQ: i32 = -9;
pub const MISMATCH_LOWQ: i32 = -8;

// Gap penalties: single (one-sided gap fill) vs paired (dual-break fills)
pub const SINGLE_OPEN_HIGHQ: i32 = -12;
pub const SINGLE_EXTEND_HIGHQ: i32 = -3;
pub const SINGLE_OPEN_MEDQ: i32 = -10;
pub const SINGLE_EXTEND_MEDQ: i32 = -2;
pub const SINGLE_OPEN_LOWQ: i32 = -8;
pub const SINGLE_EXTEND_LOWQ: i32 = -1;
pub const PAIRED_OPEN_HIGHQ: i32 = -18;
pub const PAIRED_EXTEND_HIGHQ: i32 = -3;
pub const PAIRED_OPEN_MEDQ: i32 = -16;
pub const PAIRED_EXTEND_MEDQ: i32 = -2;
pub const PAIRED_OPEN_LOWQ: i32 = -14;
pub const PAIRED_EXTEND_LOWQ: i32 = -1;

// Intron / splice-site scoring
pub const MIN_INTRON_LENGTH: u64 = 30;
pub const MAX_INTRON_LENGTH: u64 = 200_000;
pub const INTRON_BONUS_GTAG: i32 = 15;
pub const INTRON_BONUS_GCAG: i32 = 12;
pub const INTRON_BONUS_ATAC: i32 = 8;
pub const KNOWN_SITE_BONUS: i32 = 30;

// Site-level bridge selection: switch to the best canonical split only when
// the score-only split's donor+acceptor probability sum is below this ceiling
// and the canonical split's alignment score is within the margin. Tuned
// values; preserved as-is.
pub const PROB_SUM_CEILING: f64 = 1.80;
pub const CANONICAL_SCORE_MARGIN: i32 = 10;

// Splice-model context windows: donor = 3 exonic + 6 intronic bases,
// acceptor = 12 intronic + 3 exonic bases.
pub const DONOR_CONTEXT: usize = 9;
pub const DONOR_BOUNDARY: usize = 3;
pub const ACCEPTOR_CONTEXT: usize = 15;
pub const ACCEPTOR_BOUNDARY: usize = 12;

// Driver
pub const CHAIN_OVERLAP_DEDUP: f64 = 0.50;
