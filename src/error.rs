//! Crate-wide error type.
//!
//! §7 names five kinds. Only the ones with a fallible public entry point
//! surface as `Err` — CPUFault and BusError are logged and resolved
//! locally (undefined opcode becomes a two-byte NOP, an unmapped
//! soft-switch read becomes a vapor read) and never reach here.

use std::string::String;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, MiiError>;

#[derive(Debug, Error)]
pub enum MiiError {
    /// A disk image could not be converted or mounted at all. Per-track
    /// "incomplete" warnings during conversion are logged, not raised —
    /// this variant is for images so malformed that no BDSK can be
    /// produced, or a mount that must leave the drive empty.
    #[error("image format error in {path}: {reason}")]
    ImageFormat { path: String, reason: String },

    /// SD/removable-storage read or write failure during mount, track
    /// flush, or swap I/O that could not be locally recovered.
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// The configured paged-RAM pool cannot satisfy the pinned working
    /// set (pages 0/1 plus whatever `pin_range` was asked to cover).
    /// Only raised at init; the runtime eviction path in §4.A is
    /// guaranteed never to need more pages than are pinned.
    #[error("paged-RAM pool of {available} pages cannot hold {required} pinned pages")]
    MemoryExhausted { available: usize, required: usize },
}
