// Verification module
// Compares current digests against a stored checksum list

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::database::{Entry, Ledger, RecordFormat};
use super::error::HashUtilityError;
use super::hash::HashComputer;
use super::path_utils::{self, Collision, PathReconciler, ReconcileStrategy};
use super::pipeline::{CancelToken, Dispatcher, DrainReport, PipelineContext};
use super::progress::{ProgressMode, ProgressReporter};
use super::report::{Outcome, ResultAggregator, Status, Summary};
use super::walk::Walker;

/// Represents a digest mismatch between expected and actual values
#[derive(Debug, Clone, serde::Serialize)]
pub struct Mismatch {
    pub path: PathBuf,
    pub expected: String,
    pub actual: String,
}

/// Report of verification results
#[derive(Debug, serde::Serialize)]
pub struct VerifyReport {
    pub summary: Summary,
    pub mismatches: Vec<Mismatch>,
    pub collisions: Vec<Collision>,
    /// Records dropped while loading the list
    pub skipped_records: usize,
    pub drain: DrainReport,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
}

impl VerifyReport {
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

// What a worker hands back for one file
struct Checked {
    outcome: Outcome,
    mismatch: Option<Mismatch>,
}

/// Engine for verifying a directory against a checksum list
pub struct VerifyEngine {
    computer: HashComputer,
    workers: usize,
    format: RecordFormat,
    strategy: ReconcileStrategy,
    verbose: bool,
    progress: Option<ProgressMode>,
    report_new: bool,
    cancel: CancelToken,
}

impl VerifyEngine {
    pub fn new(computer: HashComputer) -> Self {
        Self {
            computer,
            workers: num_cpus::get(),
            format: RecordFormat::default(),
            strategy: ReconcileStrategy::default(),
            verbose: false,
            progress: None,
            report_new: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_format(mut self, format: RecordFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_strategy(mut self, strategy: ReconcileStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Print a line for every file, not only the failures
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressMode>) -> Self {
        self.progress = progress;
        self
    }

    /// Also list files under the root that the list does not mention
    pub fn with_report_new(mut self, report_new: bool) -> Self {
        self.report_new = report_new;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Verify every record of `list` against the files under `root`,
    /// streaming report lines to `out`.
    pub fn verify<W: Write>(
        &self,
        root: &Path,
        list: &Path,
        out: W,
    ) -> Result<VerifyReport, HashUtilityError> {
        let ledger = Ledger::load(list, self.format, Some(self.computer.provider().digest_len()))?;
        if ledger.is_empty() && ledger.skipped() > 0 {
            tracing::warn!(
                path = %list.display(),
                skipped = ledger.skipped(),
                algorithm = self.computer.provider().name(),
                "no usable records in checksum list; was it made with another algorithm or format?"
            );
        }
        let skipped = ledger.skipped();

        let mut report = self.verify_entries(root, ledger.entries(), Some(list), out)?;
        report.skipped_records = skipped;
        Ok(report)
    }

    /// Verify already loaded records
    pub fn verify_entries<W: Write>(
        &self,
        root: &Path,
        entries: &[Entry],
        list: Option<&Path>,
        out: W,
    ) -> Result<VerifyReport, HashUtilityError> {
        let start_time = Instant::now();
        let _span = tracing::debug_span!("verify", root = %root.display()).entered();
        let write_err = |e| HashUtilityError::from_io_error(e, "writing report", None);

        let abs_root = path_utils::absolute_clean(root)
            .map_err(|e| HashUtilityError::from_io_error(e, "resolving directory", Some(root.to_path_buf())))?;

        // Reconciled once, read-only from here on
        let mut reconciliation = PathReconciler::new(&abs_root, self.strategy).reconcile(entries);
        let jobs = std::mem::take(&mut reconciliation.order);
        let expected = &reconciliation.expected;

        let mut aggregator = ResultAggregator::new(out, self.verbose);
        for collision in &reconciliation.collisions {
            tracing::warn!(
                actual = %collision.actual.display(),
                kept = %collision.kept,
                dropped = %collision.dropped,
                digests_differ = collision.digests_differ,
                "two records resolve to the same file"
            );
            aggregator.warn_collision(collision).map_err(write_err)?;
        }

        let ctx = PipelineContext::with_cancel(self.cancel.clone());
        let progress = self
            .progress
            .and_then(|mode| ProgressReporter::start(ctx.counter(), jobs.len() as u64, mode));

        let mut mismatches = Vec::new();
        let mut sink_error = None;

        let drain = Dispatcher::new(self.workers).run(
            &ctx,
            jobs,
            |path| self.check_file(path, expected),
            |checked| {
                if let Some(mismatch) = checked.mismatch {
                    mismatches.push(mismatch);
                }
                if let Err(e) = aggregator.record(&checked.outcome) {
                    sink_error.get_or_insert(e);
                }
            },
        );

        if let Some(progress) = progress {
            progress.finish();
        }
        if let Some(e) = sink_error {
            return Err(write_err(e));
        }

        if self.report_new && !drain.cancelled {
            self.report_untracked(&abs_root, expected, list, &mut aggregator)?;
        }

        let (summary, _) = aggregator.finish().map_err(write_err)?;
        if drain.cancelled {
            tracing::warn!(
                dispatched = drain.dispatched,
                completed = drain.completed,
                "verification cancelled; summary covers completed files only"
            );
        }

        Ok(VerifyReport {
            summary,
            mismatches,
            collisions: reconciliation.collisions,
            skipped_records: 0,
            drain,
            duration: start_time.elapsed(),
        })
    }

    fn check_file(&self, path: PathBuf, expected: &HashMap<PathBuf, String>) -> Checked {
        let Some(want) = expected.get(&path) else {
            // Every job comes from the expected map
            let outcome = Outcome::new(path, Status::Error("no expected digest".to_string()));
            return Checked { outcome, mismatch: None };
        };

        match self.computer.compute_hash(&path) {
            Ok(result) if result.hash.eq_ignore_ascii_case(want) => Checked {
                outcome: Outcome::new(path, Status::Ok),
                mismatch: None,
            },
            Ok(result) => Checked {
                mismatch: Some(Mismatch {
                    path: path.clone(),
                    expected: want.clone(),
                    actual: result.hash,
                }),
                outcome: Outcome::new(path, Status::Mismatch),
            },
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "failed to hash file");
                Checked {
                    outcome: Outcome::new(path, Status::Error(e.brief())),
                    mismatch: None,
                }
            }
        }
    }

    fn report_untracked<W: Write>(
        &self,
        abs_root: &Path,
        expected: &HashMap<PathBuf, String>,
        list: Option<&Path>,
        aggregator: &mut ResultAggregator<W>,
    ) -> Result<(), HashUtilityError> {
        let mut walker = Walker::new(abs_root).best_effort(true);
        if let Some(list) = list {
            walker = walker.with_excluded(list);
        }

        let mut untracked: Vec<PathBuf> = walker
            .walk()
            .filter_map(Result::ok)
            .filter(|path| !expected.contains_key(path))
            .collect();
        untracked.sort();

        for path in &untracked {
            aggregator
                .record_untracked(path)
                .map_err(|e| HashUtilityError::from_io_error(e, "writing report", None))?;
        }
        Ok(())
    }
}
