// Directory scanning module
// Generate mode: hash every file under a root and append it to the checksum list

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use humansize::{format_size, DECIMAL};

use super::database::{Entry, Ledger, LedgerWriter, RecordFormat, DEFAULT_FLUSH_EVERY};
use super::error::HashUtilityError;
use super::hash::HashComputer;
use super::path_utils;
use super::pipeline::{CancelToken, Dispatcher, DrainReport, PipelineContext};
use super::progress::{ProgressMode, ProgressReporter};
use super::walk::Walker;

/// Statistics collected during a directory scan
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanStats {
    /// Regular files found by the walk, the list itself excluded
    pub files_found: usize,
    /// Walked files already recorded by an earlier run
    pub files_skipped: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub total_bytes: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub drain: DrainReport,
}

impl ScanStats {
    pub fn is_success(&self) -> bool {
        self.files_failed == 0 && !self.drain.cancelled
    }
}

// Helper function to serialize Duration as seconds
fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// How a walked file's path is written into the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathStyle {
    /// `<root>/<relative>` exactly as walked
    #[default]
    AsWalked,
    /// Relative to the scan root
    Relative,
}

// Per-file result inside a generate run
enum FileResult {
    Recorded { bytes: u64 },
    Failed,
    // The list itself can no longer be written; the run must stop
    LedgerFailed(HashUtilityError),
}

/// Engine for scanning directories and generating checksum lists
pub struct ScanEngine {
    computer: HashComputer,
    workers: usize,
    format: RecordFormat,
    flush_every: usize,
    path_style: PathStyle,
    progress: Option<ProgressMode>,
    best_effort: bool,
    cancel: CancelToken,
}

impl ScanEngine {
    pub fn new(computer: HashComputer) -> Self {
        Self {
            computer,
            workers: num_cpus::get(),
            format: RecordFormat::default(),
            flush_every: DEFAULT_FLUSH_EVERY,
            path_style: PathStyle::default(),
            progress: None,
            best_effort: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the output format
    pub fn with_format(mut self, format: RecordFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every.max(1);
        self
    }

    pub fn with_path_style(mut self, path_style: PathStyle) -> Self {
        self.path_style = path_style;
        self
    }

    /// Report progress once per second while hashing
    pub fn with_progress(mut self, progress: Option<ProgressMode>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Scan `root` and append new records to `output`, or to stdout when
    /// there is no output file.
    ///
    /// Files already recorded in an existing list are skipped, so an
    /// interrupted run can simply be restarted.
    pub fn scan_directory(
        &self,
        root: &Path,
        output: Option<&Path>,
    ) -> Result<ScanStats, HashUtilityError> {
        if !root.is_dir() {
            return Err(HashUtilityError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }

        let Some(output) = output else {
            return self.scan_to_writer(root, LedgerWriter::stdout(self.format), HashSet::new(), None);
        };

        let done = if output.exists() {
            let ledger = Ledger::load(output, self.format, Some(self.computer.provider().digest_len()))?;
            tracing::info!(
                path = %output.display(),
                records = ledger.len(),
                skipped = ledger.skipped(),
                "resuming from existing checksum list"
            );
            ledger.paths()
        } else {
            HashSet::new()
        };

        let writer = LedgerWriter::open_append(output, self.format, self.flush_every)?;
        self.scan_to_writer(root, writer, done, Some(output))
    }

    /// Scan `root` into an already opened writer.
    ///
    /// `done` holds recorded paths, in the same style this engine writes them.
    pub fn scan_to_writer(
        &self,
        root: &Path,
        writer: LedgerWriter,
        done: HashSet<String>,
        exclude: Option<&Path>,
    ) -> Result<ScanStats, HashUtilityError> {
        let start_time = Instant::now();
        let _span = tracing::debug_span!("generate", root = %root.display()).entered();

        let mut walker = Walker::new(root).best_effort(self.best_effort);
        if let Some(exclude) = exclude {
            walker = walker.with_excluded(exclude);
        }

        // The total has to be known before progress can be reported
        let walked = walker.collect()?;
        let files_found = walked.len();

        // Matched on the exact string the writer produces
        let mut files_skipped = 0usize;
        let mut files_failed = 0usize;
        let mut jobs = Vec::with_capacity(walked.len());
        for path in walked {
            match self.record_path(root, &path) {
                Some(recorded) if done.contains(&recorded) => files_skipped += 1,
                Some(recorded) => jobs.push((path, recorded)),
                None => {
                    tracing::warn!(path = %path.display(), "file name is not valid UTF-8; not recorded");
                    files_failed += 1;
                }
            }
        }
        tracing::debug!(
            files = files_found,
            already_done = files_skipped,
            pending = jobs.len(),
            "walk complete"
        );

        let ctx = PipelineContext::with_cancel(self.cancel.clone());
        let progress = self
            .progress
            .and_then(|mode| ProgressReporter::start(ctx.counter(), jobs.len() as u64, mode));

        let mut files_processed = 0usize;
        let mut total_bytes = 0u64;
        let mut fatal: Option<HashUtilityError> = None;

        let drain = Dispatcher::new(self.workers).run(
            &ctx,
            jobs,
            |(path, recorded)| self.process_file(&path, recorded, &writer),
            |result| match result {
                FileResult::Recorded { bytes } => {
                    files_processed += 1;
                    total_bytes += bytes;
                }
                FileResult::Failed => files_failed += 1,
                FileResult::LedgerFailed(e) => {
                    files_failed += 1;
                    if fatal.is_none() {
                        ctx.cancel_token().cancel();
                        fatal = Some(e);
                    }
                }
            },
        );

        if let Some(progress) = progress {
            progress.finish();
        }

        let close_result = writer.close();
        if let Some(e) = fatal {
            return Err(e);
        }
        close_result?;

        let duration = start_time.elapsed();
        tracing::info!(
            processed = files_processed,
            failed = files_failed,
            skipped = files_skipped,
            bytes = %format_size(total_bytes, DECIMAL),
            seconds = duration.as_secs_f64(),
            "scan complete"
        );
        if drain.cancelled {
            tracing::warn!(
                dispatched = drain.dispatched,
                completed = drain.completed,
                "scan cancelled before all files were hashed"
            );
        }

        Ok(ScanStats {
            files_found,
            files_skipped,
            files_processed,
            files_failed,
            total_bytes,
            duration,
            drain,
        })
    }

    fn process_file(&self, path: &Path, recorded: String, writer: &LedgerWriter) -> FileResult {
        match self.computer.compute_hash(path) {
            Ok(result) => {
                let entry = Entry::new(result.hash, recorded);
                match writer.append(&entry) {
                    Ok(()) => FileResult::Recorded {
                        bytes: result.bytes,
                    },
                    Err(e) => FileResult::LedgerFailed(e),
                }
            }
            Err(e) => {
                // Log error but continue processing
                tracing::warn!(path = %path.display(), error = %e, "failed to hash file");
                FileResult::Failed
            }
        }
    }

    /// Path as it is written to the list; `None` when it cannot be
    /// represented as UTF-8
    pub fn record_path(&self, root: &Path, path: &Path) -> Option<String> {
        match self.path_style {
            PathStyle::AsWalked => path_utils::to_record_path(path),
            PathStyle::Relative => path_utils::to_record_path(path.strip_prefix(root).unwrap_or(path)),
        }
    }
}
