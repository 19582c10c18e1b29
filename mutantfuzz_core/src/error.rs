//! Error kinds named in spec §7. The teacher threads plain
//! `std::io::Error::new(io::ErrorKind::Other, "...")` through its `World`;
//! here every disposition in §7's table gets its own variant instead of a
//! stringly-typed `Other`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MutantFuzzError {
    #[error("failed to invoke external disassembler: {0}")]
    DisasmSpawn(#[source] std::io::Error),

    /// No function headers, or zero mutable jumps, were found at all.
    /// Fatal: spec §7 requires aborting before any fuzzing starts rather
    /// than silently fuzzing the un-mutated binary.
    #[error("target has no mutable jumps: {0}")]
    EmptyJumpIndex(String),

    /// Drawn `10 * |sites|` times without finding an eligible site.
    #[error("all sites appear unreachable after {attempts} draws")]
    NoReachableSite { attempts: usize },

    /// A plan references a function missing from the entry-offset map.
    /// Spec §9: this can only happen from an internal bug, since filtering
    /// never removes an entry-map record, only jump-index records.
    #[error("internal invariant violated: function `{0}` has no recorded entry offset")]
    MissingFunctionEntry(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed mutant metadata: {0}")]
    MetadataParse(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, MutantFuzzError>;
