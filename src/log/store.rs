//! # Store
//!
//! The append-only data file backing one segment. Records are written as
//! frames: a u64 big-endian length prefix followed by the payload bytes.
//! Frames are never rewritten; appends only extend the file.
//!
//! Writes go through an in-memory `BufWriter` to amortize syscalls, so
//! `size` counts buffered bytes that may not have reached the file yet.
//! Every read flushes the buffer first, which keeps positional reads
//! coherent with completed appends.
//!
//! A crash before a flush loses the buffered suffix. The file is left
//! consistent up to the last flushed frame boundary; a torn frame at the
//! tail is tolerated because the index only references positions whose
//! append completed.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use parking_lot::Mutex;

use crate::error::LogError;

/// Number of bytes in a frame's length prefix.
pub const LEN_WIDTH: usize = 8;

#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    /// Handle for positional reads; its cursor is never used.
    file: File,
    /// Buffered appender over a cloned handle in append mode.
    writer: BufWriter<File>,
    /// Total bytes written so far, including bytes still in the buffer.
    size: u64,
}

impl Store {
    /// Opens or creates the store file at `path`, recovering `size` from
    /// the existing file length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open store file '{}'", path.display()))?;

        let size = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat store file '{}'", path.display()))?
            .len();

        let writer = BufWriter::new(
            file.try_clone()
                .wrap_err_with(|| format!("failed to clone store handle '{}'", path.display()))?,
        );

        Ok(Self {
            path,
            inner: Mutex::new(StoreInner { file, writer, size }),
        })
    }

    /// Appends one frame and returns `(bytes_written, pos)`, where `pos` is
    /// the byte position of the frame's length prefix. `size` is only
    /// advanced once both writes succeed.
    pub fn append(&self, bytes: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock();
        let pos = inner.size;

        inner
            .writer
            .write_all(&(bytes.len() as u64).to_be_bytes())
            .wrap_err_with(|| format!("failed to write frame length to '{}'", self.path.display()))?;
        inner
            .writer
            .write_all(bytes)
            .wrap_err_with(|| format!("failed to write frame payload to '{}'", self.path.display()))?;

        let written = (LEN_WIDTH + bytes.len()) as u64;
        inner.size += written;
        Ok((written, pos))
    }

    /// Reads the payload of the frame whose length prefix sits at `pos`.
    pub fn read(&self, pos: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.flush(&self.path)?;

        if pos + LEN_WIDTH as u64 > inner.size {
            return Err(LogError::Corrupt(format!(
                "frame position {} past store size {} in '{}'",
                pos,
                inner.size,
                self.path.display()
            ))
            .into());
        }

        let mut len_buf = [0u8; LEN_WIDTH];
        inner
            .file
            .read_exact_at(&mut len_buf, pos)
            .wrap_err_with(|| {
                format!(
                    "failed to read frame length at position {} in '{}'",
                    pos,
                    self.path.display()
                )
            })?;
        let len = u64::from_be_bytes(len_buf);

        // A torn or corrupted prefix can carry a length near u64::MAX, so
        // the end-of-frame position must be computed without overflow.
        let end = pos
            .checked_add(LEN_WIDTH as u64)
            .and_then(|p| p.checked_add(len));
        if end.is_none_or(|end| end > inner.size) {
            return Err(LogError::Corrupt(format!(
                "frame at position {} extends past store size {} in '{}'",
                pos,
                inner.size,
                self.path.display()
            ))
            .into());
        }

        let mut payload = vec![0u8; len as usize];
        inner
            .file
            .read_exact_at(&mut payload, pos + LEN_WIDTH as u64)
            .wrap_err_with(|| {
                format!(
                    "failed to read frame payload at position {} in '{}'",
                    pos,
                    self.path.display()
                )
            })?;

        Ok(payload)
    }

    /// Positional read of up to `buf.len()` raw bytes starting at `off`.
    /// Returns the byte count, zero at end of file. Used by the whole-log
    /// streaming reader to walk frames sequentially.
    pub fn read_at(&self, buf: &mut [u8], off: u64) -> Result<usize> {
        let mut inner = self.inner.lock();
        inner.flush(&self.path)?;

        inner.file.read_at(buf, off).wrap_err_with(|| {
            format!(
                "failed to read store bytes at offset {} in '{}'",
                off,
                self.path.display()
            )
        })
    }

    /// Flushes buffered frames and syncs the file to stable storage.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.flush(&self.path)?;
        inner
            .file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync store file '{}'", self.path.display()))
    }

    /// Total bytes written so far, including bytes still in the buffer.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreInner {
    fn flush(&mut self, path: &Path) -> Result<()> {
        self.writer
            .flush()
            .wrap_err_with(|| format!("failed to flush store buffer for '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PAYLOAD: &[u8] = b"Hello, world!";

    fn frame_width() -> u64 {
        (LEN_WIDTH + PAYLOAD.len()) as u64
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("0.store")).unwrap();

        for i in 1..4u64 {
            let (written, pos) = store.append(PAYLOAD).unwrap();
            assert_eq!(pos + written, frame_width() * i);
        }

        let mut pos = 0;
        for _ in 0..3 {
            assert_eq!(store.read(pos).unwrap(), PAYLOAD);
            pos += frame_width();
        }
    }

    #[test]
    fn read_at_walks_raw_frames() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("0.store")).unwrap();
        store.append(PAYLOAD).unwrap();

        let mut len_buf = [0u8; LEN_WIDTH];
        let n = store.read_at(&mut len_buf, 0).unwrap();
        assert_eq!(n, LEN_WIDTH);
        let len = u64::from_be_bytes(len_buf);
        assert_eq!(len, PAYLOAD.len() as u64);

        let mut payload = vec![0u8; len as usize];
        let n = store.read_at(&mut payload, LEN_WIDTH as u64).unwrap();
        assert_eq!(n, PAYLOAD.len());
        assert_eq!(payload, PAYLOAD);
    }

    #[test]
    fn reopen_recovers_size_and_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        let store = Store::open(&path).unwrap();
        store.append(PAYLOAD).unwrap();
        store.append(PAYLOAD).unwrap();
        store.close().unwrap();

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.size(), frame_width() * 2);
        assert_eq!(reopened.read(frame_width()).unwrap(), PAYLOAD);
    }

    #[test]
    fn close_flushes_buffered_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        let store = Store::open(&path).unwrap();
        store.append(PAYLOAD).unwrap();

        let before = std::fs::metadata(&path).unwrap().len();
        store.close().unwrap();
        let after = std::fs::metadata(&path).unwrap().len();

        assert!(after > before);
        assert_eq!(after, frame_width());
    }

    #[test]
    fn read_past_size_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("0.store")).unwrap();
        store.append(PAYLOAD).unwrap();

        let err = store.read(frame_width() * 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LogError>(),
            Some(LogError::Corrupt(_))
        ));
    }

    #[test]
    fn corrupted_length_prefix_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        let store = Store::open(&path).unwrap();
        store.append(PAYLOAD).unwrap();
        store.close().unwrap();

        // Stamp a near-u64::MAX length over the frame's prefix.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.write_all_at(&u64::MAX.to_be_bytes(), 0).unwrap();
        drop(file);

        let reopened = Store::open(&path).unwrap();
        let err = reopened.read(0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LogError>(),
            Some(LogError::Corrupt(_))
        ));
    }
}
