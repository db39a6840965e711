//! Caller-distinguishable log errors.
//!
//! Most failures in this crate are plain IO and travel as `eyre` reports
//! with file and operation context attached. The conditions a caller may
//! want to branch on are typed here and can be recovered from a report
//! with [`eyre::Report::downcast_ref`].

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LogError {
    /// The offset is not covered by any segment, or lies beyond the owning
    /// segment's next offset.
    #[error("offset out of range: {0}")]
    OffsetOutOfRange(u64),

    /// The index's mapped region cannot accept another entry. The owning
    /// segment reports itself maxed and the log rolls on the next append.
    #[error("index has no space for another entry")]
    IndexFull,

    /// On-disk state is inconsistent: a store frame extends past the
    /// written size, a segment is missing one of its two files, or an
    /// index file does not match its configured mapping.
    #[error("corrupt log data: {0}")]
    Corrupt(String),
}
