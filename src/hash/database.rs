// Checksum ledger module
// Loads and appends `(digest, path)` records in tab-separated or JSON-lines form

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::error::HashUtilityError;

/// Records buffered between two durability flushes
pub const DEFAULT_FLUSH_EVERY: usize = 64;

/// One ledger record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub digest: String,
    pub path: String,
}

impl Entry {
    pub fn new(digest: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            path: path.into(),
        }
    }
}

/// On-disk record syntax, fixed for the duration of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordFormat {
    /// `<digest>\t<path>`
    #[default]
    #[serde(rename = "tsv")]
    Tsv,
    /// `{"hash":"<digest>","path":"<path>"}`
    #[serde(rename = "jsonl")]
    JsonLines,
}

#[derive(Serialize)]
struct JsonRecordRef<'a> {
    hash: &'a str,
    path: &'a str,
}

#[derive(Deserialize)]
struct JsonRecord {
    hash: String,
    path: String,
}

impl RecordFormat {
    /// Serialize one record, newline included, onto `buf`
    pub fn encode_into(&self, entry: &Entry, buf: &mut Vec<u8>) -> io::Result<()> {
        match self {
            RecordFormat::Tsv => writeln!(buf, "{}\t{}", entry.digest, entry.path),
            RecordFormat::JsonLines => {
                serde_json::to_writer(
                    &mut *buf,
                    &JsonRecordRef {
                        hash: &entry.digest,
                        path: &entry.path,
                    },
                )?;
                buf.push(b'\n');
                Ok(())
            }
        }
    }

    /// Parse a single line (without its newline).
    ///
    /// Returns None for a wrong field count, an empty path, or a digest that
    /// is not hex of the expected length.
    pub fn parse_line(&self, line: &str, digest_len: Option<usize>) -> Option<Entry> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        let (digest, path) = match self {
            RecordFormat::Tsv => {
                let (digest, path) = line.split_once('\t')?;
                (digest.trim().to_string(), path.to_string())
            }
            RecordFormat::JsonLines => {
                let record: JsonRecord = serde_json::from_str(line).ok()?;
                (record.hash.trim().to_string(), record.path)
            }
        };

        if path.is_empty() || !is_valid_digest(&digest, digest_len) {
            return None;
        }

        Some(Entry { digest, path })
    }
}

fn is_valid_digest(digest: &str, digest_len: Option<usize>) -> bool {
    match hex::decode(digest) {
        Ok(bytes) => !bytes.is_empty() && digest_len.map_or(true, |len| bytes.len() == len),
        Err(_) => false,
    }
}

/// Records loaded from an existing ledger
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<Entry>,
    skipped: usize,
    torn_tail: bool,
}

impl Ledger {
    /// Load a ledger file.
    ///
    /// Malformed lines are skipped with a warning; only failing to open or
    /// read the file is an error.
    pub fn load(
        path: &Path,
        format: RecordFormat,
        digest_len: Option<usize>,
    ) -> Result<Self, HashUtilityError> {
        let file = File::open(path).map_err(|e| {
            HashUtilityError::from_io_error(e, "opening list", Some(path.to_path_buf()))
        })?;

        Self::from_reader(BufReader::new(file), format, digest_len).map_err(|e| {
            HashUtilityError::from_io_error(e, "reading list", Some(path.to_path_buf()))
        })
    }

    pub fn from_reader<R: BufRead>(
        mut reader: R,
        format: RecordFormat,
        digest_len: Option<usize>,
    ) -> io::Result<Self> {
        let mut ledger = Ledger::default();
        let mut raw = Vec::new();
        let mut line_num = 0usize;

        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            line_num += 1;

            let terminated = raw.last() == Some(&b'\n');
            if terminated {
                raw.pop();
            }

            let Ok(line) = std::str::from_utf8(&raw) else {
                tracing::warn!(line = line_num, "skipping record that is not valid UTF-8");
                ledger.skipped += 1;
                continue;
            };

            if line.trim().is_empty() {
                continue;
            }

            if !terminated {
                // Only the last line can lack a newline: an interrupted append
                tracing::warn!(line = line_num, "skipping unterminated final record");
                ledger.skipped += 1;
                ledger.torn_tail = true;
                continue;
            }

            match format.parse_line(line, digest_len) {
                Some(entry) => ledger.entries.push(entry),
                None => {
                    tracing::warn!(line = line_num, record = line, "skipping malformed record");
                    ledger.skipped += 1;
                }
            }
        }

        Ok(ledger)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lines dropped as malformed or torn
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn has_torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Recorded paths, used as the "already done" set on resume
    pub fn paths(&self) -> HashSet<String> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }
}

struct WriterState {
    out: Box<dyn Write + Send>,
    // Handle used for fsync when the output is a real file
    sync: Option<File>,
    batch: Vec<u8>,
    pending: usize,
    appended: u64,
}

impl WriterState {
    fn flush(&mut self) -> io::Result<()> {
        if !self.batch.is_empty() {
            self.out.write_all(&self.batch)?;
            self.batch.clear();
        }
        self.out.flush()?;
        if let Some(file) = &self.sync {
            file.sync_data()?;
        }
        self.pending = 0;
        Ok(())
    }
}

/// Append side of the ledger, shared by all workers of one run.
///
/// Records accumulate in memory and reach the output only as whole batches,
/// every `flush_every` records and on close. A crash therefore loses at most
/// the current batch and never leaves half a record behind it.
pub struct LedgerWriter {
    state: Mutex<WriterState>,
    format: RecordFormat,
    flush_every: usize,
    target: PathBuf,
}

impl LedgerWriter {
    /// Open (or create) a ledger file for appending.
    ///
    /// A torn final line left by an earlier crash is cut off first so the
    /// next record starts on a fresh line.
    pub fn open_append(
        path: &Path,
        format: RecordFormat,
        flush_every: usize,
    ) -> Result<Self, HashUtilityError> {
        let to_err = |e| HashUtilityError::from_io_error(e, "opening list", Some(path.to_path_buf()));

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(to_err)?;

        if let Some(removed) = truncate_torn_tail(&mut file).map_err(to_err)? {
            tracing::warn!(
                path = %path.display(),
                bytes = removed,
                "removed unterminated record from end of list"
            );
        }
        file.seek(SeekFrom::End(0)).map_err(to_err)?;

        let sync = file.try_clone().map_err(to_err)?;
        Ok(Self::build(Box::new(file), Some(sync), format, flush_every, path.to_path_buf()))
    }

    /// Write records to stdout; no resume and no fsync
    pub fn stdout(format: RecordFormat) -> Self {
        Self::build(Box::new(io::stdout()), None, format, 1, PathBuf::from("<stdout>"))
    }

    /// Write records to an arbitrary sink
    pub fn from_writer<W>(writer: W, format: RecordFormat, flush_every: usize) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::build(Box::new(writer), None, format, flush_every, PathBuf::from("<writer>"))
    }

    fn build(
        out: Box<dyn Write + Send>,
        sync: Option<File>,
        format: RecordFormat,
        flush_every: usize,
        target: PathBuf,
    ) -> Self {
        Self {
            state: Mutex::new(WriterState {
                out,
                sync,
                batch: Vec::new(),
                pending: 0,
                appended: 0,
            }),
            format,
            flush_every: flush_every.max(1),
            target,
        }
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Append one record. Safe to call from many threads at once.
    pub fn append(&self, entry: &Entry) -> Result<(), HashUtilityError> {
        let mut record = Vec::with_capacity(entry.digest.len() + entry.path.len() + 32);
        self.format
            .encode_into(entry, &mut record)
            .map_err(|e| self.write_error(e))?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.batch.extend_from_slice(&record);
        state.pending += 1;
        state.appended += 1;

        if state.pending >= self.flush_every {
            state.flush().map_err(|e| self.write_error(e))?;
        }
        Ok(())
    }

    /// Push the current batch to stable storage
    pub fn flush(&self) -> Result<(), HashUtilityError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.flush().map_err(|e| self.write_error(e))
    }

    /// Flush and release the output; returns the number of records appended
    pub fn close(self) -> Result<u64, HashUtilityError> {
        self.flush()?;
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.appended)
    }

    fn write_error(&self, err: io::Error) -> HashUtilityError {
        HashUtilityError::LedgerWriteError {
            path: self.target.clone(),
            reason: err.to_string(),
        }
    }
}

impl Drop for LedgerWriter {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if state.batch.is_empty() {
            return;
        }
        if let Err(e) = state.flush() {
            tracing::error!(path = %self.target.display(), error = %e, "failed to flush checksum list");
        }
    }
}

/// Cut a file back to just after its last newline.
///
/// Returns the number of bytes removed, or None when the file already ends
/// cleanly (or is empty).
pub fn truncate_torn_tail(file: &mut File) -> io::Result<Option<u64>> {
    const BLOCK: u64 = 64 * 1024;

    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(None);
    }

    let mut end = len;
    let mut keep = 0u64;
    let mut buf = vec![0u8; BLOCK as usize];
    while end > 0 {
        let start = end.saturating_sub(BLOCK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    file.set_len(keep)?;
    Ok(Some(len - keep))
}
