//! Seed chaining.
//!
//! Given, for each query position, a sorted set of candidate genomic
//! positions, an incremental dynamic program scores chains of seeds by
//! consecutiveness, gap distance and (optionally) local canonical
//! splice-motif signal, producing ranked candidate paths for the driver
//! to refine.
//!
//! # Module Organization
//!
//! - `types` - `SeedHitTable`, `ChainLink`, `ChainPath`, direction strategy
//! - `links` - the incremental link DP and path collection

mod links;
mod types;

pub use links::{chain_hits, ChainScratch, ChainingInputs};
pub use types::{ChainDirection, ChainLink, ChainPath, SeedHitTable};
