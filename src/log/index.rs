//! # Index
//!
//! The memory-mapped offset table backing one segment. Each entry maps a
//! segment-relative offset to the byte position of that record's frame in
//! the store file:
//!
//! ```text
//! +----------------+----------------------+
//! | rel_off        | pos                  |
//! | (u32 BE)       | (u64 BE)             |
//! +----------------+----------------------+
//! ```
//!
//! Entry `i` always carries `rel_off == i`, so a lookup is pure pointer
//! arithmetic into the mapping. Relative offsets keep entries at 12 bytes;
//! the owning segment adds its base offset back.
//!
//! ## File Length vs. Size
//!
//! Memory-mapping requires the file to be grown up front, so while the
//! index is open the file is `max_index_bytes` long regardless of how many
//! entries it holds. `size` tracks the logical end of valid entries. A
//! clean close syncs the mapping and truncates the file back to `size`,
//! which is what lets the next open derive the entry count from file
//! length alone. Only `file_length / 12` entries are ever trusted on
//! reopen; a trailing partial entry is discarded with a warning.
//!
//! ## Safety
//!
//! The mapping becomes invalid if the file shrinks underneath it, so
//! `close` consumes the index and drops the mapping before truncating.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use eyre::{ensure, eyre, Result, WrapErr};
use memmap2::MmapMut;
use tracing::warn;
use zerocopy::byteorder::big_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::LogError;

/// Width of one index entry on disk.
pub const INDEX_ENTRY_SIZE: usize = 12;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
struct IndexEntry {
    rel_off: U32,
    pos: U64,
}

const _: () = assert!(std::mem::size_of::<IndexEntry>() == INDEX_ENTRY_SIZE);

#[derive(Debug)]
pub struct Index {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    /// Logical end of valid entries; at most the mapping length.
    size: u64,
}

impl Index {
    /// Opens or creates the index file at `path`, grows it to
    /// `max_index_bytes`, and maps it read/write.
    ///
    /// The pre-growth file length determines how many entries the index
    /// already holds: a prior clean close truncated the file back to the
    /// valid-entry boundary.
    pub fn open(path: impl AsRef<Path>, max_index_bytes: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        ensure!(
            max_index_bytes >= INDEX_ENTRY_SIZE as u64,
            "max_index_bytes {} cannot hold a single {}-byte index entry",
            max_index_bytes,
            INDEX_ENTRY_SIZE
        );

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open index file '{}'", path.display()))?;

        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat index file '{}'", path.display()))?
            .len();

        if len > max_index_bytes {
            return Err(LogError::Corrupt(format!(
                "index file '{}' is {} bytes, larger than the configured {}",
                path.display(),
                len,
                max_index_bytes
            ))
            .into());
        }

        let mut size = len;
        if size % INDEX_ENTRY_SIZE as u64 != 0 {
            size -= size % INDEX_ENTRY_SIZE as u64;
            warn!(
                path = %path.display(),
                file_len = len,
                trusted = size,
                "index file length is not entry-aligned; discarding partial tail entry"
            );
        }

        file.set_len(max_index_bytes)
            .wrap_err_with(|| format!("failed to grow index file '{}'", path.display()))?;

        // SAFETY: MmapMut::map_mut is unsafe because the mapping is
        // undefined if the file is modified externally. This is safe because:
        // 1. The log directory is exclusive to this process; segment files
        //    are only touched through their owning Index and Store.
        // 2. The file was just grown to max_index_bytes, covering every
        //    access the bounds checks in write/read permit.
        // 3. The mapping's lifetime is tied to Index, and close drops it
        //    before the file is truncated.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map index file '{}'", path.display()))?
        };

        Ok(Self {
            path,
            file,
            mmap,
            size,
        })
    }

    /// Appends an entry. Fails with [`LogError::IndexFull`] when the mapped
    /// region cannot hold another entry; durability is deferred to close.
    pub fn write(&mut self, rel_off: u32, pos: u64) -> Result<()> {
        if self.size + INDEX_ENTRY_SIZE as u64 > self.mmap.len() as u64 {
            return Err(LogError::IndexFull.into());
        }

        let entry = IndexEntry {
            rel_off: U32::new(rel_off),
            pos: U64::new(pos),
        };
        let at = self.size as usize;
        self.mmap[at..at + INDEX_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
        self.size += INDEX_ENTRY_SIZE as u64;
        Ok(())
    }

    /// Reads the entry for a segment-relative offset, returning its stored
    /// `(rel_off, pos)`.
    pub fn read(&self, rel_off: u32) -> Result<(u32, u64)> {
        let at = rel_off as u64 * INDEX_ENTRY_SIZE as u64;
        if at + INDEX_ENTRY_SIZE as u64 > self.size {
            return Err(LogError::OffsetOutOfRange(rel_off as u64).into());
        }

        let at = at as usize;
        let entry = IndexEntry::ref_from_bytes(&self.mmap[at..at + INDEX_ENTRY_SIZE])
            .map_err(|e| eyre!("invalid index entry at byte {} of '{}': {e:?}", at, self.path.display()))?;
        Ok((entry.rel_off.get(), entry.pos.get()))
    }

    /// Reads the last entry, or `None` when the index is empty. A fresh
    /// segment uses the `None` to start at its base offset.
    pub fn read_last(&self) -> Result<Option<(u32, u64)>> {
        if self.size == 0 {
            return Ok(None);
        }
        let last = (self.size / INDEX_ENTRY_SIZE as u64) - 1;
        self.read(last as u32).map(Some)
    }

    /// True when the mapped region cannot accept another whole entry.
    pub fn is_full(&self) -> bool {
        self.size + INDEX_ENTRY_SIZE as u64 > self.mmap.len() as u64
    }

    /// Syncs the mapping, fsyncs the file, and truncates it back to the
    /// valid-entry boundary so the next open can derive the entry count
    /// from file length.
    pub fn close(self) -> Result<()> {
        let Index {
            path,
            file,
            mmap,
            size,
        } = self;

        mmap.flush()
            .wrap_err_with(|| format!("failed to flush index mapping for '{}'", path.display()))?;
        // Unmap before shrinking the file underneath the mapping.
        drop(mmap);

        file.sync_all()
            .wrap_err_with(|| format!("failed to sync index file '{}'", path.display()))?;
        file.set_len(size)
            .wrap_err_with(|| format!("failed to truncate index file '{}'", path.display()))?;
        Ok(())
    }

    /// Logical size in bytes: entry count times [`INDEX_ENTRY_SIZE`].
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
