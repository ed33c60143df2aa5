// Centralized error handling module
// Setup, traversal and ledger errors with context and an operator hint

use std::io;
use std::path::{Path, PathBuf};

/// Main error type for the checksum pipeline.
///
/// Per-file read failures never surface here during a run; workers turn them
/// into `ERROR` outcomes instead. Everything in this enum either aborts before
/// dispatch starts (setup) or aborts the run (traversal).
#[derive(Debug, thiserror::Error)]
pub enum HashUtilityError {
    /// File system errors with context
    #[error("File not found: {}\nSuggestion: Check that the file path is correct and the file exists", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Directory not found: {}\nSuggestion: Check that the directory path is correct and the directory exists", .path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("Permission denied while {operation} {}\nSuggestion: Check file permissions or run with appropriate privileges", .path.display())]
    PermissionDenied { path: PathBuf, operation: String },

    #[error("{}\nSuggestion: Check file permissions and disk space", io_message(.path.as_deref(), .operation, .source))]
    IoError {
        path: Option<PathBuf>,
        operation: String,
        source: io::Error,
    },

    /// Directory enumeration failed part way through a walk
    #[error("Traversal failed at {}: {reason}\nSuggestion: Fix the directory permissions or rerun with --best-effort", .path.display())]
    Traversal { path: PathBuf, reason: String },

    /// Hash provider selection errors
    #[error("Unsupported hash algorithm: {algorithm}\nSuggestion: Use one of: {}", crate::hash::HashRegistry::names().join(", "))]
    UnsupportedAlgorithm { algorithm: String },

    #[error("Invalid key: {reason}\nSuggestion: Pass the key as {expected_hex} hex characters", expected_hex = crate::hash::hash::KEY_LEN * 2)]
    InvalidKey { reason: String },

    #[error("Algorithm {algorithm} does not take a key\nSuggestion: Drop --key or use blake3")]
    KeyNotSupported { algorithm: String },

    /// Ledger errors
    #[error("Checksum list not found: {}\nSuggestion: Generate a list first by running without --verify", .path.display())]
    LedgerNotFound { path: PathBuf },

    #[error("Failed to write to checksum list {}: {reason}\nSuggestion: Check disk space and write permissions", .path.display())]
    LedgerWriteError { path: PathBuf, reason: String },

    /// Configuration errors
    #[error("Invalid config file {}: {reason}\nSuggestion: Check the TOML syntax and key names", .path.display())]
    Config { path: PathBuf, reason: String },

    #[error("Invalid arguments: {message}\nSuggestion: Run with --help to see usage information")]
    InvalidArguments { message: String },

    #[error("Missing required argument: {argument}\nSuggestion: Run with --help to see required arguments")]
    MissingRequiredArgument { argument: String },
}

fn io_message(path: Option<&Path>, operation: &str, source: &io::Error) -> String {
    match path {
        Some(p) => format!("I/O error while {} {}: {}", operation, p.display(), source),
        None => format!("I/O error while {}: {}", operation, source),
    }
}

impl HashUtilityError {
    /// Create an error from an io::Error with context about the operation and optional path
    pub fn from_io_error(err: io::Error, operation: &str, path: Option<PathBuf>) -> Self {
        match (err.kind(), path) {
            (io::ErrorKind::NotFound, Some(p)) => {
                if operation.contains("directory") || operation.contains("scan") {
                    HashUtilityError::DirectoryNotFound { path: p }
                } else if operation.contains("list") {
                    HashUtilityError::LedgerNotFound { path: p }
                } else {
                    HashUtilityError::FileNotFound { path: p }
                }
            }
            (io::ErrorKind::PermissionDenied, Some(p)) => HashUtilityError::PermissionDenied {
                path: p,
                operation: operation.to_string(),
            },
            (_, path) => HashUtilityError::IoError {
                path,
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    /// Short cause without the suggestion, for per-file report lines
    pub fn brief(&self) -> String {
        match self {
            HashUtilityError::IoError { source, .. } => source.to_string(),
            other => other
                .to_string()
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

impl From<io::Error> for HashUtilityError {
    fn from(err: io::Error) -> Self {
        HashUtilityError::from_io_error(err, "unknown operation", None)
    }
}
