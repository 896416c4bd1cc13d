use crate::config::PROGRESS_INTERVAL;
use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::info;

const READ_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment,
    Data,
}

/// Classifies an already-trimmed line.
pub fn classify(line: &str) -> LineKind {
    if line.is_empty() {
        LineKind::Blank
    } else if line.starts_with('#') {
        LineKind::Comment
    } else {
        LineKind::Data
    }
}

/// A run of consecutive data lines, in file order.
#[derive(Debug, Default)]
pub struct LineChunk {
    /// Zero-based chunk number
    pub index: u64,
    pub lines: Vec<String>,
}

pub fn make_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

/// Opens `path` for buffered reading, decompressing `.bz2` on the fly.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let is_bz2 = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bz2"));
    if is_bz2 {
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            MultiBzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file)))
    }
}

/// Lazily splits a text stream into chunks of at most `chunk_size` data lines.
///
/// Blank lines and `#` comments are dropped before they reach a chunk. Invalid
/// UTF-8 is replaced rather than rejected. Only the current chunk and the line
/// being read are held in memory.
pub struct LineScanner<R> {
    reader: R,
    chunk_size: usize,
    buf: Vec<u8>,
    lines_read: u64,
    skipped: u64,
    chunks: u64,
    /// Caller-imposed cap on the data lines of the next chunk
    limit: Option<u64>,
    done: bool,
    progress: Option<ProgressBar>,
}

impl LineScanner<Box<dyn BufRead>> {
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        Ok(Self::new(open_text(path)?, chunk_size))
    }
}

impl<R: BufRead> LineScanner<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            buf: Vec::with_capacity(4096),
            lines_read: 0,
            skipped: 0,
            chunks: 0,
            limit: None,
            done: false,
            progress: None,
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    /// Caps the next chunks at `limit` data lines. `Some(0)` ends the scan
    /// without reading further; `None` restores the configured chunk size.
    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    /// Raw lines consumed so far, including blanks and comments. Never counts
    /// lines past the data line that reached a [`set_limit`] cap.
    ///
    /// [`set_limit`]: LineScanner::set_limit
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.lines_read += 1;
        if self.lines_read % PROGRESS_INTERVAL == 0 {
            info!(lines = self.lines_read, skipped = self.skipped, "Scanning");
            if let Some(pb) = &self.progress {
                pb.set_message(format!("{} lines", self.lines_read));
                pb.tick();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).trim().to_string()))
    }
}

impl<R: BufRead> Iterator for LineScanner<R> {
    type Item = io::Result<LineChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let size = match self.limit {
            Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX).min(self.chunk_size),
            None => self.chunk_size,
        };
        if size == 0 {
            return None;
        }

        let mut lines = Vec::with_capacity(size.min(4096));
        while lines.len() < size {
            match self.read_line() {
                Ok(Some(line)) => match classify(&line) {
                    LineKind::Data => lines.push(line),
                    LineKind::Blank | LineKind::Comment => self.skipped += 1,
                },
                Ok(None) => {
                    self.done = true;
                    if let Some(pb) = &self.progress {
                        pb.finish_and_clear();
                    }
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if lines.is_empty() {
            return None;
        }
        let chunk = LineChunk {
            index: self.chunks,
            lines,
        };
        self.chunks += 1;
        Some(Ok(chunk))
    }
}
