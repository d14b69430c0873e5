//! ActiveSegment - the one file currently receiving records

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use contracts::{CompressionMode, SegmentInfo, SegmentState};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::recovery::modified_ms;

/// Counts bytes handed to the wrapped writer
pub(crate) struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum Output {
    Plain(CountingWriter<File>),
    /// One gzip member for the whole segment; the trailer is written on finish
    Gzip(GzEncoder<CountingWriter<File>>),
}

/// Segment in `Writing` state
pub(crate) struct ActiveSegment {
    path: PathBuf,
    mode: CompressionMode,
    output: Output,
    /// Bytes already on disk when the file was reopened for append
    base: u64,
    records: u64,
}

impl ActiveSegment {
    /// Create a new, empty segment. Fails if the file exists.
    pub(crate) fn create(path: PathBuf, mode: CompressionMode) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let counting = CountingWriter::new(file);
        let output = match mode {
            CompressionMode::Plain => Output::Plain(counting),
            CompressionMode::Gzip => Output::Gzip(GzEncoder::new(counting, Compression::default())),
        };
        Ok(Self {
            path,
            mode,
            output,
            base: 0,
            records: 0,
        })
    }

    /// Reopen a plain segment for append, continuing from its on-disk size
    pub(crate) fn reopen_plain(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).open(&path)?;
        let base = file.metadata()?.len();
        Ok(Self {
            path,
            mode: CompressionMode::Plain,
            output: Output::Plain(CountingWriter::new(file)),
            base,
            records: 0,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn mode(&self) -> CompressionMode {
        self.mode
    }

    /// Bytes handed to the file so far (compressed bytes for gzip)
    pub(crate) fn bytes(&self) -> u64 {
        self.base
            + match &self.output {
                Output::Plain(w) => w.count(),
                Output::Gzip(e) => e.get_ref().count(),
            }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records == 0 && self.bytes() == 0
    }

    /// Append one line and flush it through to the file
    pub(crate) fn write_line(&mut self, line: &[u8]) -> io::Result<u64> {
        match &mut self.output {
            Output::Plain(w) => {
                w.write_all(line)?;
                w.flush()?;
            }
            Output::Gzip(e) => {
                e.write_all(line)?;
                // Sync flush: compressed output reaches the file, the stream stays open
                e.flush()?;
            }
        }
        self.records += 1;
        Ok(self.bytes())
    }

    /// Flush buffered data without finalizing
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        match &mut self.output {
            Output::Plain(w) => w.flush(),
            Output::Gzip(e) => e.flush(),
        }
    }

    /// Finalize the stream (gzip trailer) and sync. Returns the final size.
    pub(crate) fn finish(self) -> io::Result<u64> {
        let base = self.base;
        let counting = match self.output {
            Output::Plain(mut w) => {
                w.flush()?;
                w
            }
            Output::Gzip(e) => {
                let mut w = e.finish()?;
                w.flush()?;
                w
            }
        };
        counting.inner.sync_all()?;
        Ok(base + counting.count())
    }

    /// Point the stream at another file, keeping the byte count
    #[cfg(test)]
    pub(crate) fn redirect_output(&mut self, file: File) {
        self.base = self.bytes();
        let counting = CountingWriter::new(file);
        self.output = match self.mode {
            CompressionMode::Plain => Output::Plain(counting),
            CompressionMode::Gzip => Output::Gzip(GzEncoder::new(counting, Compression::default())),
        };
    }

    pub(crate) fn info(&self) -> SegmentInfo {
        SegmentInfo {
            path: self.path.clone(),
            mode: self.mode,
            state: SegmentState::Writing,
            size_bytes: self.bytes(),
            modified_ms: modified_ms(&self.path),
        }
    }
}
