//! Core layer - version descriptors and store plumbing.
//!
//! This module provides:
//! - [`AssetVersion`] / [`MetadataFormat`] - Client version descriptors
//! - [`Features`] - Optional wire-format capabilities
//! - [`ChangeBatch`] / [`ChangeSink`] - Typed store change notifications
//! - [`CancelToken`] / [`ProgressSink`] - Background compile control
//! - zlib helpers for standalone object blobs

mod version;
mod features;
mod change;
mod compile;
mod compression;

pub use version::{AssetVersion, MetadataFormat};
pub use features::{
    Features, EXTENDED_SINCE, FRAME_DURATIONS_SINCE, FRAME_GROUPS_SINCE, PATTERN_Z_SINCE,
    TOP_EFFECT_SINCE, WRAP_SINCE,
};
pub use change::{Change, ChangeBatch, ChangeKind, ChangeSink};
pub use compile::{
    ArchiveKind, CancelToken, CompileOutcome, NoProgress, ProgressEvent, ProgressSink, SaveStatus,
    CHECKPOINT_INTERVAL,
};
pub(crate) use compile::{persist, same_file, temp_file_for, CompileJob, Progress};
pub use compression::{compress, decompress, is_compressed};
