//! Spliced-alignment engine: seed chaining plus banded dynamic-programming
//! refinement with intron bridging.
//!
//! The crate is a pure computational kernel invoked many times per query:
//! no I/O, no threads of its own. Callers own the genome, the seed index
//! and the per-worker scratch; the only process-wide state is the
//! read-only [`config::ScoringConfig`].

pub mod arena;
pub mod banded; // Banded matrix fill, traceback, intron bridge
pub mod chaining; // Seed chaining (link DP)
pub mod config;
pub mod defaults;
pub mod driver; // Orchestration: chains -> refined base-level alignments
pub mod genome; // Sequence windows and the genome accessor boundary
pub mod splice; // Splice-site classification and capability boundaries
pub mod workspace; // Per-worker scratch buffers

pub use banded::{AlignedPair, PairOp};
pub use config::{QualityTier, ScoringConfig};
pub use driver::{AlignmentDriver, AlignmentRequest, AlignmentStats, SplicedAlignment};
pub use genome::Strand;
