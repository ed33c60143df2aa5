// Checksum pipeline
// Hashing, list storage, path reconciliation, generate and verify engines

pub mod hash;
pub mod scan;
pub mod verify;
pub mod database;
pub mod path_utils;
pub mod error;
pub mod walk;
pub mod pipeline;
pub mod report;
pub mod progress;

// Re-export commonly used types for convenience
pub use error::HashUtilityError;
pub use hash::{HashComputer, HashProvider, HashRegistry, HashResult, Hasher};
pub use scan::{PathStyle, ScanEngine, ScanStats};
pub use verify::{Mismatch, VerifyEngine, VerifyReport};
pub use database::{Entry, Ledger, LedgerWriter, RecordFormat};
pub use path_utils::{Collision, PathReconciler, ReconcileStrategy, Reconciliation};
pub use walk::Walker;
pub use pipeline::{CancelToken, Dispatcher, DrainReport, PipelineContext};
pub use report::{Outcome, ResultAggregator, Status, Summary, Tally};
pub use progress::{ProgressMode, ProgressReporter};
