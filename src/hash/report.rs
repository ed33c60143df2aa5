// Result aggregation module
// Folds per-file outcomes into counters and streams the report lines

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::Serialize;

use super::path_utils::Collision;

/// Verdict for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Mismatch,
    /// The file could not be opened or read
    Error(String),
}

/// Per-file result produced by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub path: PathBuf,
    pub status: Status,
}

impl Outcome {
    pub fn new(path: impl Into<PathBuf>, status: Status) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Status::Ok => write!(f, "{} OK", self.path.display()),
            Status::Mismatch => write!(f, "{} MISMATCH", self.path.display()),
            Status::Error(cause) => write!(f, "{} ERROR: {}", self.path.display(), cause),
        }
    }
}

/// Running counters.
///
/// Errors count as mismatches; `errors` tracks the subset separately.
/// Merging is associative and commutative, with `Tally::default()` as
/// identity, so workers may finish in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total: u64,
    pub matched: u64,
    pub mismatched: u64,
    pub errors: u64,
}

impl Tally {
    pub fn record(&mut self, status: &Status) {
        self.total += 1;
        match status {
            Status::Ok => self.matched += 1,
            Status::Mismatch => self.mismatched += 1,
            Status::Error(_) => {
                self.mismatched += 1;
                self.errors += 1;
            }
        }
    }

    pub fn combine(self, other: Tally) -> Tally {
        Tally {
            total: self.total + other.total,
            matched: self.matched + other.matched,
            mismatched: self.mismatched + other.mismatched,
            errors: self.errors + other.errors,
        }
    }

    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a Status>) -> Tally {
        let mut tally = Tally::default();
        for status in statuses {
            tally.record(status);
        }
        tally
    }
}

/// Final report of a verify run
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub tally: Tally,
    /// Files under the root that no record maps to
    pub untracked: u64,
    pub collisions: usize,
    #[serde(skip)]
    verbose: bool,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.tally.mismatched == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.verbose && self.tally.mismatched == 0 {
            writeln!(f, "All files match")?;
        }
        write!(
            f,
            "Total:{} Match:{} Mismatch:{}",
            self.tally.total, self.tally.matched, self.tally.mismatched
        )
    }
}

/// Streams report lines to a sink as outcomes arrive
pub struct ResultAggregator<W: Write> {
    out: W,
    verbose: bool,
    tally: Tally,
    untracked: u64,
    collisions: usize,
}

impl<W: Write> ResultAggregator<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            tally: Tally::default(),
            untracked: 0,
            collisions: 0,
        }
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    /// Fold one outcome; prints it in verbose mode or when it is not OK
    pub fn record(&mut self, outcome: &Outcome) -> io::Result<()> {
        self.tally.record(&outcome.status);
        if self.verbose || !outcome.is_ok() {
            writeln!(self.out, "{}", outcome)?;
        }
        Ok(())
    }

    pub fn warn_collision(&mut self, collision: &Collision) -> io::Result<()> {
        self.collisions += 1;
        writeln!(self.out, "WARNING: {}", collision)
    }

    /// Report a file no record accounts for
    pub fn record_untracked(&mut self, path: &std::path::Path) -> io::Result<()> {
        self.untracked += 1;
        writeln!(self.out, "{} NEW", path.display())
    }

    /// Write the summary and hand back the sink
    pub fn finish(mut self) -> io::Result<(Summary, W)> {
        let summary = Summary {
            tally: self.tally,
            untracked: self.untracked,
            collisions: self.collisions,
            verbose: self.verbose,
        };
        writeln!(self.out, "{}", summary)?;
        self.out.flush()?;
        Ok((summary, self.out))
    }
}
