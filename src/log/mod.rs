//! # Segmented Log Storage
//!
//! This module implements the on-disk log: an append-only sequence of
//! records addressed by a dense, monotonically increasing u64 offset.
//! Storage is partitioned into segments so old offset ranges can be
//! truncated as whole files without rewriting live data.
//!
//! ## Architecture Overview
//!
//! Ownership is a strict tree; each layer reaches disk only through the
//! layer below it:
//!
//! ```text
//! Log                    directory recovery, active-segment rolling,
//!  ├── Segment           offset -> segment routing, truncation, streaming
//!  │    ├── Store        offset assignment, record framing, fullness
//!  │    └── Index        buffered length-prefixed data file
//!  ├── Segment           mmapped relative-offset -> position table
//!  │    └── ...
//!  └── (active Segment)  the tail segment, sole receiver of appends
//! ```
//!
//! ## Directory Layout
//!
//! One directory per log. A segment with base offset `B` contributes two
//! files named after it:
//!
//! ```text
//! log_dir/
//! ├── 0.store          # frames: u64 BE length | payload, repeated
//! ├── 0.index          # entries: u32 BE rel_off | u64 BE position
//! ├── 17.store
//! └── 17.index
//! ```
//!
//! File names that do not parse as `<u64>.store` or `<u64>.index` are
//! ignored during recovery; a base offset missing one of its two files is
//! rejected as corrupt.
//!
//! ## Concurrency
//!
//! All operations are synchronous and blocking. The [`Log`] serializes its
//! public operations behind one exclusive mutex; the [`Store`] carries its
//! own mutex guarding buffered-writer state; the [`Index`] is
//! unsynchronized and relies on the log-level exclusion, since it is only
//! reachable through a segment that is only reachable through the log.
//!
//! ## Durability
//!
//! Store appends are buffered; positional reads flush first, so
//! read-your-writes holds within the process. The index defers durability
//! to close: a clean close syncs the mapping and truncates the file back
//! to the valid-entry boundary, which is what lets a reopen derive the
//! entry count from file length alone.

mod index;
mod segment;
mod store;

#[allow(clippy::module_inception)]
mod log;

pub use index::{Index, INDEX_ENTRY_SIZE};
pub use log::{Log, LogReader};
pub use segment::Segment;
pub use store::{Store, LEN_WIDTH};

/// Extension of a segment's data file.
pub const STORE_FILE_EXTENSION: &str = "store";

/// Extension of a segment's offset-table file.
pub const INDEX_FILE_EXTENSION: &str = "index";
