//! # Segment
//!
//! One store/index pair sharing a base offset. The segment is where
//! absolute offsets meet byte positions: appends assign `next_offset`,
//! frame the encoded record into the store, and index the frame's
//! position under the segment-relative offset; reads run the same path
//! backwards.
//!
//! A segment is maxed when either file has reached its configured limit,
//! which tells the log to roll a new segment. The index capacity also
//! bounds relative offsets to `u32`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Result, WrapErr};

use crate::config::SegmentConfig;
use crate::error::LogError;
use crate::record::Record;

use super::index::Index;
use super::store::Store;
use super::{INDEX_FILE_EXTENSION, STORE_FILE_EXTENSION};

#[derive(Debug)]
pub struct Segment {
    store: Arc<Store>,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    /// Opens or creates the segment with base offset `base_offset` in
    /// `dir`, deriving `next_offset` from the index's last entry.
    pub fn open(dir: impl AsRef<Path>, base_offset: u64, config: SegmentConfig) -> Result<Self> {
        let dir = dir.as_ref();

        let store = Store::open(segment_file(dir, base_offset, STORE_FILE_EXTENSION))
            .wrap_err_with(|| format!("failed to open store for segment {base_offset}"))?;
        let index = Index::open(
            segment_file(dir, base_offset, INDEX_FILE_EXTENSION),
            config.max_index_bytes,
        )
        .wrap_err_with(|| format!("failed to open index for segment {base_offset}"))?;

        let next_offset = match index.read_last()? {
            Some((rel_off, _)) => base_offset + rel_off as u64 + 1,
            None => base_offset,
        };

        Ok(Self {
            store: Arc::new(store),
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Appends the record, stamping its offset, and returns that offset.
    pub fn append(&mut self, record: &mut Record) -> Result<u64> {
        record.offset = self.next_offset;
        let bytes = record.encode()?;

        let (_, pos) = self.store.append(&bytes)?;

        // Capacity of the index bounds rel_off well below u32::MAX.
        let rel_off = (self.next_offset - self.base_offset) as u32;
        self.index.write(rel_off, pos)?;

        self.next_offset += 1;
        Ok(record.offset)
    }

    /// Reads the record stored at an absolute offset.
    pub fn read(&self, offset: u64) -> Result<Record> {
        if offset < self.base_offset || offset >= self.next_offset {
            return Err(LogError::OffsetOutOfRange(offset).into());
        }

        let rel_off = (offset - self.base_offset) as u32;
        let (_, pos) = self.index.read(rel_off)?;
        let bytes = self.store.read(pos)?;
        Record::decode(&bytes)
    }

    /// True when either file has reached its configured limit, or the
    /// index's mapped region cannot take another whole entry (a limit
    /// that is not entry-aligned would otherwise never trip).
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || self.index.is_full()
    }

    /// Closes the segment and unlinks both of its files.
    pub fn remove(self) -> Result<()> {
        let store_path = self.store.path().to_path_buf();
        let index_path = self.index.path().to_path_buf();
        self.close()?;

        fs::remove_file(&index_path)
            .wrap_err_with(|| format!("failed to remove index file '{}'", index_path.display()))?;
        fs::remove_file(&store_path)
            .wrap_err_with(|| format!("failed to remove store file '{}'", store_path.display()))?;
        Ok(())
    }

    /// Closes the index (truncating it to its valid entries) and then the
    /// store.
    pub fn close(self) -> Result<()> {
        self.index.close()?;
        self.store.close()
    }

    /// First offset this segment serves.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Offset the segment will assign on its next append; equals
    /// `base_offset` plus the entry count.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub(crate) fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

fn segment_file(dir: &Path, base_offset: u64, extension: &str) -> PathBuf {
    dir.join(format!("{base_offset}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{INDEX_ENTRY_SIZE, LEN_WIDTH};
    use tempfile::tempdir;

    fn config(max_store_bytes: u64, max_index_bytes: u64) -> SegmentConfig {
        SegmentConfig {
            max_store_bytes,
            max_index_bytes,
            initial_offset: 0,
        }
    }

    fn record() -> Record {
        Record::new(b"hello world".to_vec())
    }

    fn frame_width() -> u64 {
        (LEN_WIDTH + record().encode().unwrap().len()) as u64
    }

    #[test]
    fn append_assigns_sequential_offsets_from_base() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 16, config(1024, 1024)).unwrap();

        for want in 16..19u64 {
            let mut rec = record();
            let offset = segment.append(&mut rec).unwrap();
            assert_eq!(offset, want);
            assert_eq!(rec.offset, want);

            let read = segment.read(offset).unwrap();
            assert_eq!(read.value, rec.value);
            assert_eq!(read.offset, want);
        }
        assert_eq!(segment.next_offset(), 19);
    }

    #[test]
    fn read_outside_offset_range_fails() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 16, config(1024, 1024)).unwrap();
        segment.append(&mut record()).unwrap();

        for offset in [15, 17] {
            let err = segment.read(offset).unwrap_err();
            assert_eq!(
                err.downcast_ref::<LogError>(),
                Some(&LogError::OffsetOutOfRange(offset))
            );
        }
    }

    #[test]
    fn reopen_restores_next_offset() {
        let dir = tempdir().unwrap();

        let mut segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        for _ in 0..3 {
            segment.append(&mut record()).unwrap();
        }
        segment.close().unwrap();

        let reopened = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        assert_eq!(reopened.next_offset(), 3);
        assert_eq!(reopened.read(2).unwrap().value, record().value);
    }

    #[test]
    fn maxed_by_store_bytes() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 0, config(frame_width(), 1024)).unwrap();

        assert!(!segment.is_maxed());
        segment.append(&mut record()).unwrap();
        assert!(segment.is_maxed());
    }

    #[test]
    fn maxed_by_index_capacity() {
        let dir = tempdir().unwrap();
        let max_index = 2 * INDEX_ENTRY_SIZE as u64;
        let mut segment = Segment::open(dir.path(), 0, config(1024, max_index)).unwrap();

        segment.append(&mut record()).unwrap();
        assert!(!segment.is_maxed());
        segment.append(&mut record()).unwrap();
        assert!(segment.is_maxed());
    }

    #[test]
    fn remove_unlinks_both_files() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        segment.append(&mut record()).unwrap();

        segment.remove().unwrap();

        assert!(!dir.path().join("0.store").exists());
        assert!(!dir.path().join("0.index").exists());
    }
}
