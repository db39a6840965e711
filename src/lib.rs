//! # seglog - Segmented Append-Only Record Log
//!
//! seglog is an offset-addressed record log persisted on local disk.
//! Producers append opaque byte records and receive a dense, monotonically
//! increasing u64 offset; consumers read the record stored at any
//! previously assigned offset, or stream the whole log as raw bytes for
//! snapshot and restore.
//!
//! ## Quick Start
//!
//! ```ignore
//! use seglog::{Config, Log, Record};
//!
//! let log = Log::open("./data", Config::default())?;
//!
//! let mut record = Record::new(b"hello world".to_vec());
//! let offset = log.append(&mut record)?;
//!
//! assert_eq!(log.read(offset)?.value, b"hello world");
//! ```
//!
//! ## Architecture
//!
//! Storage is segmented: each contiguous offset range is backed by a data
//! file (the store) and a memory-mapped offset table (the index), so old
//! ranges are truncated as whole files without rewriting live data.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │      HTTP Surface (produce/consume) │
//! ├─────────────────────────────────────┤
//! │   Log (recovery, rolling, routing)  │
//! ├─────────────────────────────────────┤
//! │  Segment (offsets, record framing)  │
//! ├──────────────────┬──────────────────┤
//! │  Store (frames)  │  Index (mmap)    │
//! └──────────────────┴──────────────────┘
//! ```
//!
//! All operations are synchronous and blocking; the log serializes them
//! behind one exclusive lock and is shared across threads as-is. No
//! replication, cross-process coordination, compaction, or record-level
//! deletion: prefix truncation is the only way data leaves a log.

pub mod config;
pub mod error;
pub mod log;
pub mod record;
pub mod server;

pub use config::{Config, SegmentConfig};
pub use error::LogError;
pub use log::{Log, LogReader};
pub use record::Record;
