// Configuration module
// Command-line flags layered over an optional TOML config file

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::hash::database::DEFAULT_FLUSH_EVERY;
use crate::hash::{HashUtilityError, PathStyle, ProgressMode, RecordFormat, ReconcileStrategy};

pub const DEFAULT_ALGORITHM: &str = "sha1";

/// dirsum - record and verify checksums for a directory tree
#[derive(Parser, Debug)]
#[command(name = "dirsum")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Record and verify checksums for a directory tree")]
#[command(long_about = None)]
pub struct Cli {
    /// Directory to scan
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub dir: PathBuf,

    /// Checksum list file (generate writes to stdout when omitted)
    #[arg(long, value_name = "FILE")]
    pub list: Option<PathBuf>,

    /// Verify the directory against the list instead of generating
    #[arg(long)]
    pub verify: bool,

    /// Print a line for every verified file
    #[arg(long)]
    pub verbose: bool,

    /// Show progress updates once per second
    #[arg(long)]
    pub progress: bool,

    /// Progress rendering
    #[arg(long, value_enum, value_name = "STYLE")]
    pub progress_style: Option<ProgressMode>,

    /// Read and write the list as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Hash algorithm (sha1, sha256, sha512, blake2b, blake3, xxh64, xxh3, xxh128, xxh32)
    #[arg(long, value_name = "NAME")]
    pub algorithm: Option<String>,

    /// 32-byte key as hex, for keyed blake3
    #[arg(long, value_name = "HEX")]
    pub key: Option<String>,

    /// Number of hashing workers [default: number of CPUs]
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Records buffered between list flushes
    #[arg(long, value_name = "N")]
    pub flush_every: Option<usize>,

    /// Match list paths by stripping their common directory prefix
    #[arg(long)]
    pub common_prefix: bool,

    /// Log unreadable directories and keep going
    #[arg(long)]
    pub best_effort: bool,

    /// When verifying, also list files missing from the list
    #[arg(long)]
    pub report_new: bool,

    /// Record paths relative to the scanned directory
    #[arg(long)]
    pub relative: bool,

    /// Use alternate config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "dirsum=debug" (overrides RUST_LOG)
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

/// Defaults read from `config.toml`; every field is optional
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub algorithm: Option<String>,
    pub workers: Option<usize>,
    pub flush_every: Option<usize>,
    pub format: Option<RecordFormat>,
    pub progress: Option<bool>,
    pub progress_style: Option<ProgressMode>,
    pub verbose: Option<bool>,
    pub common_prefix: Option<bool>,
    pub best_effort: Option<bool>,
    pub relative: Option<bool>,
    pub log_level: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, HashUtilityError> {
        toml::from_str(text).map_err(|e| HashUtilityError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, HashUtilityError> {
        let text = fs::read_to_string(path).map_err(|e| HashUtilityError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text, path)
    }

    /// `<config dir>/dirsum/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dirsum").join("config.toml"))
    }

    /// Load an explicit file, or the default one when it exists
    pub fn discover(explicit: Option<&Path>) -> Result<Self, HashUtilityError> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => {
                    tracing::debug!(path = %path.display(), "loading config file");
                    Self::load(&path)
                }
                _ => Ok(Self::default()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Generate,
    Verify,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    pub dir: PathBuf,
    pub list: Option<PathBuf>,
    pub verbose: bool,
    pub progress: Option<ProgressMode>,
    pub format: RecordFormat,
    pub algorithm: String,
    pub key: Option<String>,
    pub workers: usize,
    pub flush_every: usize,
    pub strategy: ReconcileStrategy,
    pub best_effort: bool,
    pub report_new: bool,
    pub path_style: PathStyle,
    pub log_level: Option<String>,
}

impl RunConfig {
    /// Read the config file named by the flags (or the default one) and merge
    pub fn from_cli(cli: Cli) -> Result<Self, HashUtilityError> {
        let file = FileConfig::discover(cli.config.as_deref())?;
        Self::merge(cli, file)
    }

    /// Flags win over file values; file values win over built-in defaults
    pub fn merge(cli: Cli, file: FileConfig) -> Result<Self, HashUtilityError> {
        let mode = if cli.verify { Mode::Verify } else { Mode::Generate };
        if mode == Mode::Verify && cli.list.is_none() {
            return Err(HashUtilityError::MissingRequiredArgument {
                argument: "--list (required with --verify)".to_string(),
            });
        }

        let workers = cli.workers.or(file.workers).unwrap_or_else(num_cpus::get);
        if workers == 0 {
            return Err(HashUtilityError::InvalidArguments {
                message: "--workers must be at least 1".to_string(),
            });
        }
        let flush_every = cli.flush_every.or(file.flush_every).unwrap_or(DEFAULT_FLUSH_EVERY);
        if flush_every == 0 {
            return Err(HashUtilityError::InvalidArguments {
                message: "--flush-every must be at least 1".to_string(),
            });
        }

        let format = if cli.json {
            RecordFormat::JsonLines
        } else {
            file.format.unwrap_or_default()
        };

        let progress = (cli.progress || file.progress.unwrap_or(false))
            .then(|| cli.progress_style.or(file.progress_style).unwrap_or_default());

        let strategy = if cli.common_prefix || file.common_prefix.unwrap_or(false) {
            ReconcileStrategy::CommonPrefix
        } else {
            ReconcileStrategy::Structural
        };

        let path_style = if cli.relative || file.relative.unwrap_or(false) {
            PathStyle::Relative
        } else {
            PathStyle::AsWalked
        };

        Ok(Self {
            mode,
            dir: cli.dir,
            list: cli.list,
            verbose: cli.verbose || file.verbose.unwrap_or(false),
            progress,
            format,
            algorithm: cli
                .algorithm
                .or(file.algorithm)
                .unwrap_or_else(|| DEFAULT_ALGORITHM.to_string()),
            key: cli.key,
            workers,
            flush_every,
            strategy,
            best_effort: cli.best_effort || file.best_effort.unwrap_or(false),
            report_new: cli.report_new,
            path_style,
            log_level: cli.log_level.or(file.log_level),
        })
    }
}
