//! Epoch segmentation and crash-state permutation core.
//!
//! Given an ordered trace of block-layer writes, [`epoch::build_epochs`]
//! splits it into durability-barrier-delimited epochs ([`epoch::Epoch`]),
//! tracking per-epoch sector overlaps ([`overlap::OverlapTracker`]). A
//! [`permuter::Permuter`] then drives an externally supplied
//! [`permuter::PermuteStrategy`] to emit unique candidate crash states,
//! deduplicated by absolute-index signature.
//!
//! Record encode/decode for the on-disk trace format lives in [`record`].
//!
//! Out of scope here: trace capture, concrete permutation strategies,
//! file-system replay, and any command-line or configuration-loading
//! surface.

pub mod epoch;
pub mod error;
pub mod logger;
pub mod overlap;
pub mod permuter;
pub mod record;

pub use epoch::{build_epochs, Epoch, EpochOp};
pub use error::Error;
pub use logger::Logger;
pub use overlap::{OverlapTracker, SectorRange};
pub use permuter::{CrashStateSignature, PermuteLog, PermuteStrategy, Permuter, PermuterConfig};
pub use record::DiskWrite;
