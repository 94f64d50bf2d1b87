//! Per-worker scratch buffers.
//!
//! Every worker thread owns one [`AlignWorkspace`], sized once from the
//! configuration and reused across all of its calls. Nothing here is
//! shared between workers; the process-wide scoring tables are the only
//! cross-thread state, and they are read-only.

use std::cell::RefCell;

use crate::arena::Arena;
use crate::banded::{AlignedPair, BandedScratch};
use crate::chaining::{ChainLink, ChainScratch};
use crate::config::ScoringConfig;

/// Reusable buffers for one worker. `reset()` clears contents but keeps
/// every allocation, so running the same input twice through a reused
/// workspace is byte-identical to running it with fresh buffers.
pub struct AlignWorkspace {
    /// Scratch for ordinary and left-of-junction fills.
    pub scratch_left: BandedScratch,
    /// Scratch for right-of-junction (reversed) fills, live at the same
    /// time as `scratch_left` during a bridge.
    pub scratch_right: BandedScratch,
    pub links: Arena<ChainLink>,
    pub chain: ChainScratch,
    pub pairs: Vec<AlignedPair>,
    pub query_uc: Vec<u8>,
    pub gwin_primary: Vec<u8>,
    pub gwin_alt: Vec<u8>,
    pub gwin_primary_right: Vec<u8>,
    pub gwin_alt_right: Vec<u8>,
    pub rev_seq: Vec<u8>,
    pub rev_seq_uc: Vec<u8>,
    pub rev_gwin_primary: Vec<u8>,
    pub rev_gwin_alt: Vec<u8>,
}

impl AlignWorkspace {
    pub fn new(cfg: &ScoringConfig) -> Self {
        let rows = cfg.band_limits.max_rows;
        let cols = cfg.band_limits.max_cols;
        AlignWorkspace {
            scratch_left: BandedScratch::new(rows, cols),
            scratch_right: BandedScratch::new(rows, cols),
            links: Arena::with_capacity(4096),
            chain: ChainScratch::new(),
            pairs: Vec::with_capacity(rows * 2),
            query_uc: Vec::with_capacity(rows),
            gwin_primary: Vec::with_capacity(cols),
            gwin_alt: Vec::with_capacity(cols),
            gwin_primary_right: Vec::with_capacity(cols),
            gwin_alt_right: Vec::with_capacity(cols),
            rev_seq: Vec::with_capacity(rows),
            rev_seq_uc: Vec::with_capacity(rows),
            rev_gwin_primary: Vec::with_capacity(cols),
            rev_gwin_alt: Vec::with_capacity(cols),
        }
    }

    /// Clear per-call state, keeping capacity. Matrix scratch needs no
    /// clearing: every fill masks the cells it reads.
    pub fn reset(&mut self) {
        self.links.reset();
        self.pairs.clear();
        self.query_uc.clear();
        self.gwin_primary.clear();
        self.gwin_alt.clear();
        self.gwin_primary_right.clear();
        self.gwin_alt_right.clear();
        self.rev_seq.clear();
        self.rev_seq_uc.clear();
        self.rev_gwin_primary.clear();
        self.rev_gwin_alt.clear();
    }
}

thread_local! {
    static WORKSPACE: RefCell<Option<AlignWorkspace>> = const { RefCell::new(None) };
}

/// Execute a closure with this thread's workspace, creating it on first
/// use. The workspace is sized from the first configuration seen by the
/// thread; workers are expected to run one configuration for their
/// lifetime.
pub fn with_workspace<F, R>(cfg: &ScoringConfig, f: F) -> R
where
    F: FnOnce(&mut AlignWorkspace) -> R,
{
    WORKSPACE.with(|ws| {
        let mut slot = ws.borrow_mut();
        let ws = slot.get_or_insert_with(|| AlignWorkspace::new(cfg));
        f(ws)
    })
}
