//! Banded dynamic-programming refinement: matrix fill, traceback and the
//! intron bridge.
//!
//! The same recurrence runs at 8-, 16- and 32-bit saturating precision via
//! the [`width::BandScore`] trait; width selection is driven by precomputed
//! safe band extents so the narrow paths are only taken when overflow is
//! impossible.

pub mod bridge;
pub mod matrix;
pub mod traceback;
pub mod types;
pub mod width;

pub use bridge::{bridge_intron_gap, BridgeParams, BridgeResult};
pub use matrix::{fill_matrix, select_width, BandedParams, BandedScratch, FilledMatrix};
pub use traceback::{traceback, TracebackInput, TracebackSummary};
pub use types::{
    AlignedPair, Band, CapacityError, GapInit, PairOp, ScoreWidth, DIR_DIAG, DIR_HORIZ, DIR_VERT,
};
pub use width::BandScore;
