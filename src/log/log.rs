//! # Log
//!
//! The top of the storage tree: a directory of segments ordered by base
//! offset, the last of which is active and receives every append. The log
//! recovers its segments from the directory on open, rolls the active
//! segment when it fills, routes reads to the owning segment, truncates
//! fully consumed prefix segments, and streams the raw concatenation of
//! all store files for snapshot and restore.
//!
//! One exclusive mutex serializes the public operations; readers and
//! writers are mutually exclusive at this level.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{eyre, Result, WrapErr};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::LogError;
use crate::record::Record;

use super::segment::Segment;
use super::store::Store;
use super::{INDEX_FILE_EXTENSION, STORE_FILE_EXTENSION};

#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    config: Config,
    /// Segments in ascending base-offset order; the last one is active.
    inner: Mutex<Vec<Segment>>,
}

impl Log {
    /// Opens the log in `dir`, recovering any segments already on disk or
    /// bootstrapping a first segment at the configured initial offset.
    /// Zero limits in `config` are replaced by their defaults.
    pub fn open(dir: impl AsRef<Path>, config: Config) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let config = config.normalized();

        fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("failed to create log directory '{}'", dir.display()))?;

        let segments = load_segments(&dir, config)?;
        info!(
            dir = %dir.display(),
            segments = segments.len(),
            "log opened"
        );

        Ok(Self {
            dir,
            config,
            inner: Mutex::new(segments),
        })
    }

    /// Appends a record to the active segment, stamping its offset, and
    /// rolls a new active segment when the append filled the current one.
    pub fn append(&self, record: &mut Record) -> Result<u64> {
        let mut segments = self.inner.lock();
        let active = segments
            .last_mut()
            .ok_or_else(|| eyre!("log is closed"))?;

        let offset = active.append(record)?;

        if active.is_maxed() {
            let base_offset = offset + 1;
            let next = Segment::open(&self.dir, base_offset, self.config.segment)?;
            debug!(base_offset, "rolled active segment");
            segments.push(next);
        }

        Ok(offset)
    }

    /// Reads the record stored at `offset`.
    pub fn read(&self, offset: u64) -> Result<Record> {
        let segments = self.inner.lock();
        segments
            .iter()
            .find(|s| s.base_offset() <= offset && offset < s.next_offset())
            .ok_or_else(|| eyre!(LogError::OffsetOutOfRange(offset)))?
            .read(offset)
    }

    /// First offset the log still holds.
    pub fn lowest_offset(&self) -> Result<u64> {
        let segments = self.inner.lock();
        segments
            .first()
            .map(Segment::base_offset)
            .ok_or_else(|| eyre!("log is closed"))
    }

    /// Last assigned offset, or `None` when the log holds no records.
    pub fn highest_offset(&self) -> Result<Option<u64>> {
        let segments = self.inner.lock();
        let last = segments.last().ok_or_else(|| eyre!("log is closed"))?;

        // Only the tail segment may be empty; an empty tail with no
        // predecessor means nothing was ever appended.
        if segments.len() == 1 && last.next_offset() == last.base_offset() {
            return Ok(None);
        }
        Ok(Some(last.next_offset() - 1))
    }

    /// Removes every segment whose records all have offsets at or below
    /// `lowest`. If that discards every segment, a fresh active segment is
    /// created at the old next offset so assigned offsets stay monotonic.
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let mut segments = self.inner.lock();
        let next_offset = segments.last().map(Segment::next_offset);

        let mut removed = 0usize;
        while segments
            .first()
            .is_some_and(|s| s.next_offset() <= lowest.saturating_add(1))
        {
            let segment = segments.remove(0);
            segment.remove()?;
            removed += 1;
        }

        if segments.is_empty() {
            let base_offset = next_offset.unwrap_or(self.config.segment.initial_offset);
            segments.push(Segment::open(&self.dir, base_offset, self.config.segment)?);
        }

        info!(lowest, removed, "truncated log");
        Ok(())
    }

    /// A reader over the raw concatenation of every store file, oldest
    /// first: the byte stream parses as successive
    /// `(u64 BE length, payload)` frames.
    pub fn reader(&self) -> LogReader {
        let segments = self.inner.lock();
        LogReader {
            sources: segments.iter().map(|s| Arc::clone(s.store())).collect(),
            current: 0,
            offset: 0,
        }
    }

    /// Closes every segment in order. The log accepts no operations
    /// afterwards.
    pub fn close(&self) -> Result<()> {
        let mut segments = self.inner.lock();
        for segment in segments.drain(..) {
            segment.close()?;
        }
        Ok(())
    }

    /// Closes the log and deletes its directory. A close failure is
    /// surfaced before anything is deleted, leaving the files in place;
    /// remove may be attempted again afterwards.
    pub fn remove(&self) -> Result<()> {
        self.close()?;
        fs::remove_dir_all(&self.dir)
            .wrap_err_with(|| format!("failed to remove log directory '{}'", self.dir.display()))
    }

    /// Removes the log and sets it up again, empty, in the same directory.
    pub fn reset(&self) -> Result<()> {
        self.remove()?;
        fs::create_dir_all(&self.dir)
            .wrap_err_with(|| format!("failed to recreate log directory '{}'", self.dir.display()))?;

        let segments = load_segments(&self.dir, self.config)?;
        *self.inner.lock() = segments;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> Config {
        self.config
    }
}

/// Recovers segments from the files in `dir`, or bootstraps the first
/// segment when the directory holds none.
///
/// Names that do not parse as `<u64>.store` or `<u64>.index` are ignored.
/// Store and index files are paired explicitly: a base offset with only
/// one of its two files is corrupt, since opening it would quietly
/// recreate the missing file and orphan the surviving data.
fn load_segments(dir: &Path, config: Config) -> Result<Vec<Segment>> {
    let mut store_bases = BTreeSet::new();
    let mut index_bases = BTreeSet::new();

    let entries = fs::read_dir(dir)
        .wrap_err_with(|| format!("failed to read log directory '{}'", dir.display()))?;
    for entry in entries {
        let entry = entry.wrap_err("failed to read log directory entry")?;
        if !entry.file_type().wrap_err("failed to stat log directory entry")?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some((stem, extension)) = name.rsplit_once('.') else {
            continue;
        };
        let Ok(base_offset) = stem.parse::<u64>() else {
            continue;
        };

        match extension {
            STORE_FILE_EXTENSION => store_bases.insert(base_offset),
            INDEX_FILE_EXTENSION => index_bases.insert(base_offset),
            _ => continue,
        };
    }

    if store_bases != index_bases {
        let orphaned: Vec<u64> = store_bases
            .symmetric_difference(&index_bases)
            .copied()
            .collect();
        return Err(LogError::Corrupt(format!(
            "segments {orphaned:?} in '{}' are missing their store or index file",
            dir.display()
        ))
        .into());
    }

    let mut segments = Vec::with_capacity(store_bases.len().max(1));
    for base_offset in store_bases {
        segments.push(Segment::open(dir, base_offset, config.segment)?);
    }
    if segments.is_empty() {
        segments.push(Segment::open(
            dir,
            config.segment.initial_offset,
            config.segment,
        )?);
    }
    Ok(segments)
}

/// Streams the raw bytes of every store file in segment order, driving a
/// positional cursor per store.
pub struct LogReader {
    sources: Vec<Arc<Store>>,
    current: usize,
    offset: u64,
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while let Some(store) = self.sources.get(self.current) {
            let n = store
                .read_at(buf, self.offset)
                .map_err(|e| io::Error::other(format!("{e:#}")))?;
            if n > 0 {
                self.offset += n as u64;
                return Ok(n);
            }
            self.current += 1;
            self.offset = 0;
        }
        Ok(0)
    }
}
