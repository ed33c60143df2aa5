// Directory walking module
// Single-pass enumeration of regular files under a root using jwalk

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use super::error::HashUtilityError;

/// Enumerates regular files under a root.
///
/// Symlinks are not followed and hidden files are not skipped. The optional
/// excluded file is never yielded.
pub struct Walker {
    root: PathBuf,
    exclude: Option<(OsString, PathBuf)>,
    best_effort: bool,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: None,
            best_effort: false,
        }
    }

    /// Never yield this file (the checksum list itself, typically).
    /// A path that does not exist yet is ignored.
    pub fn with_excluded(mut self, path: &Path) -> Self {
        // Canonicalize once; per-entry checks compare file names first
        self.exclude = match (path.file_name(), path.canonicalize()) {
            (Some(name), Ok(canonical)) => Some((name.to_os_string(), canonical)),
            _ => None,
        };
        self
    }

    /// Log traversal errors and keep going instead of failing
    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walk the tree.
    ///
    /// In strict mode a traversal error is yielded as `Err` and the caller
    /// decides whether to stop; in best-effort mode it is logged and dropped.
    pub fn walk(&self) -> impl Iterator<Item = Result<PathBuf, HashUtilityError>> + '_ {
        WalkDir::new(&self.root)
            .parallelism(jwalk::Parallelism::RayonNewPool(0)) // 0 = use default thread count
            .skip_hidden(false) // Don't skip hidden files
            .follow_links(false) // Don't follow symlinks to avoid loops
            .into_iter()
            .filter_map(move |entry_result| match entry_result {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        return None;
                    }
                    let path = entry.path();
                    if self.is_excluded(&path) {
                        return None;
                    }
                    Some(Ok(path))
                }
                Err(e) => {
                    let path = e.path().unwrap_or(&self.root).to_path_buf();
                    if self.best_effort {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable directory entry");
                        None
                    } else {
                        Some(Err(HashUtilityError::Traversal {
                            path,
                            reason: e.to_string(),
                        }))
                    }
                }
            })
    }

    /// Walk the whole tree, stopping at the first traversal error
    pub fn collect(&self) -> Result<Vec<PathBuf>, HashUtilityError> {
        if !self.root.is_dir() {
            return Err(HashUtilityError::DirectoryNotFound {
                path: self.root.clone(),
            });
        }
        self.walk().collect()
    }

    fn is_excluded(&self, path: &Path) -> bool {
        match &self.exclude {
            Some((name, canonical)) => {
                path.file_name() == Some(name.as_os_str())
                    && path.canonicalize().is_ok_and(|p| &p == canonical)
            }
            None => false,
        }
    }
}
