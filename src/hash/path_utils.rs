// Path normalization and reconciliation
// Maps paths recorded on any OS or drive layout onto files under the scan root

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::database::Entry;

/// Convert every backslash to a forward slash
pub fn normalize_separators(path_str: &str) -> String {
    path_str.replace('\\', "/")
}

/// Render a filesystem path the way it is recorded in a ledger.
///
/// Returns `None` for names that are not valid UTF-8. Backslashes are only
/// rewritten where they are path separators.
pub fn to_record_path(path: &Path) -> Option<String> {
    let text = path.to_str()?;
    if cfg!(windows) {
        Some(normalize_separators(text))
    } else {
        Some(text.to_string())
    }
}

/// Make a path absolute against the current directory and clean it,
/// without resolving symlinks or requiring the path to exist.
pub fn absolute_clean(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(clean_path(path))
    } else {
        Ok(clean_path(&std::env::current_dir()?.join(path)))
    }
}

/// Clean a path by removing redundant components like "." and ".."
/// This provides a normalized form without requiring the path to exist
pub fn clean_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // ".." directly under the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            _ => components.push(component),
        }
    }

    let result: PathBuf = components.iter().collect();
    if result.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        result
    }
}

/// Shape of a recorded path, in tie-break order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredPathKind {
    /// `X:/...` recorded on Windows
    DriveLetter,
    /// `/...` recorded on a Unix-like system
    Absolute,
    /// Relative path that starts with the scan root's trailing segments,
    /// e.g. `photos/2020/a.jpg` under `/home/me/photos/2020`
    DuplicatedRoot,
    Relative,
}

/// How recorded paths are mapped onto the scan root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileStrategy {
    /// Classify each path by shape (drive letter, absolute, relative)
    #[default]
    Structural,
    /// Strip the longest directory prefix shared by every record
    CommonPrefix,
}

/// A recorded path and where it lives under the current root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledPath {
    pub stored: String,
    pub actual: PathBuf,
}

/// Two records that resolved to the same file
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Collision {
    pub actual: PathBuf,
    /// Record that owns the slot
    pub kept: String,
    pub dropped: String,
    pub digests_differ: bool,
}

impl std::fmt::Display for Collision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} and {} both resolve to {}",
            self.kept,
            self.dropped,
            self.actual.display()
        )?;
        if self.digests_differ {
            write!(f, " with different digests; keeping the first")
        } else {
            write!(f, " with the same digest")
        }
    }
}

/// Output of one reconciliation pass; read-only once dispatch starts
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub pairs: Vec<ReconciledPath>,
    /// actual path -> expected digest
    pub expected: HashMap<PathBuf, String>,
    /// Actual paths in ledger order, each listed once
    pub order: Vec<PathBuf>,
    pub collisions: Vec<Collision>,
}

/// Resolves recorded paths against a scan root
#[derive(Debug, Clone)]
pub struct PathReconciler {
    root: PathBuf,
    root_segments: Vec<String>,
    strategy: ReconcileStrategy,
}

impl PathReconciler {
    /// `root` should already be absolute; see [`absolute_clean`].
    pub fn new(root: &Path, strategy: ReconcileStrategy) -> Self {
        let root = clean_path(root);
        let root_segments = root
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Self {
            root,
            root_segments,
            strategy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Classify an already normalized path; first matching rule wins
    pub fn classify(&self, normalized: &str) -> StoredPathKind {
        if has_drive_letter(normalized) {
            StoredPathKind::DriveLetter
        } else if normalized.starts_with('/') {
            StoredPathKind::Absolute
        } else if self.strip_root_suffix(normalized).is_some() {
            StoredPathKind::DuplicatedRoot
        } else {
            StoredPathKind::Relative
        }
    }

    /// Resolve one recorded path with the structural rules
    pub fn resolve(&self, stored: &str) -> PathBuf {
        let normalized = normalize_separators(stored);
        if cfg!(unix) && normalized != stored {
            // A backslash is an ordinary file name character here; prefer
            // that reading when such a file exists
            let literal = self.resolve_normalized(stored);
            if literal.symlink_metadata().is_ok() {
                return literal;
            }
        }
        self.resolve_normalized(&normalized)
    }

    fn resolve_normalized(&self, normalized: &str) -> PathBuf {
        match self.classify(normalized) {
            StoredPathKind::DriveLetter => {
                let rest = normalized[2..].trim_start_matches('/');
                // A drive path is absolute on another machine, so anchor on
                // the root's name wherever it occurs
                match self.after_root_segment(rest) {
                    Some(tail) => self.join(tail),
                    None => self.join(rest),
                }
            }
            StoredPathKind::Absolute => clean_path(Path::new(normalized)),
            StoredPathKind::DuplicatedRoot => match self.strip_root_suffix(normalized) {
                Some(tail) => self.join(&tail),
                None => self.join(normalized),
            },
            StoredPathKind::Relative => self.join(normalized),
        }
    }

    /// Resolve every entry and build the expected-digest map
    pub fn reconcile(&self, entries: &[Entry]) -> Reconciliation {
        let actuals: Vec<PathBuf> = match self.strategy {
            ReconcileStrategy::Structural => entries.iter().map(|e| self.resolve(&e.path)).collect(),
            ReconcileStrategy::CommonPrefix => {
                let normalized: Vec<String> =
                    entries.iter().map(|e| normalize_separators(&e.path)).collect();
                let prefix = common_dir_prefix(&normalized);
                normalized
                    .iter()
                    .map(|p| {
                        let parts: Vec<&str> = segments(p).collect();
                        self.join(&parts[prefix.min(parts.len())..].join("/"))
                    })
                    .collect()
            }
        };

        let mut out = Reconciliation::default();
        let mut owner: HashMap<PathBuf, usize> = HashMap::new();

        for (index, (entry, actual)) in entries.iter().zip(actuals).enumerate() {
            out.pairs.push(ReconciledPath {
                stored: entry.path.clone(),
                actual: actual.clone(),
            });

            match out.expected.entry(actual.clone()) {
                MapEntry::Vacant(slot) => {
                    slot.insert(entry.digest.clone());
                    owner.insert(actual.clone(), index);
                    out.order.push(actual);
                }
                MapEntry::Occupied(slot) => {
                    let kept = &entries[owner[&actual]];
                    out.collisions.push(Collision {
                        actual,
                        kept: kept.path.clone(),
                        dropped: entry.path.clone(),
                        digests_differ: !slot.get().eq_ignore_ascii_case(&entry.digest),
                    });
                }
            }
        }

        out
    }

    fn join(&self, relative: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in segments(relative) {
            path.push(segment);
        }
        clean_path(&path)
    }

    // "photos/2020/a.jpg" -> Some("a.jpg") when the root ends in photos/2020.
    // Leading ".." segments are ignored and the longest repeat wins.
    fn strip_root_suffix(&self, normalized: &str) -> Option<String> {
        let parts: Vec<&str> = segments(normalized).skip_while(|s| *s == "..").collect();
        let max = self.root_segments.len().min(parts.len().saturating_sub(1));
        (1..=max).rev().find_map(|k| {
            let tail = &self.root_segments[self.root_segments.len() - k..];
            parts[..k]
                .iter()
                .zip(tail)
                .all(|(part, segment)| *part == segment.as_str())
                .then(|| parts[k..].join("/"))
        })
    }

    // "backup/root/sub/f" -> Some("sub/f"), first occurrence wins
    fn after_root_segment<'a>(&self, normalized: &'a str) -> Option<&'a str> {
        let base = self.root_segments.last()?;
        let mut offset = 0;
        for segment in normalized.split('/') {
            let next = offset + segment.len() + 1;
            if segment == base.as_str() && next <= normalized.len() {
                return Some(&normalized[next..]);
            }
            offset = next;
        }
        None
    }
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

/// Number of leading directory segments shared by every path.
/// The file name itself never counts as part of the prefix.
pub fn common_dir_prefix(paths: &[String]) -> usize {
    let mut iter = paths.iter();
    let Some(first) = iter.next() else {
        return 0;
    };

    let first_dirs: Vec<&str> = {
        let all: Vec<&str> = segments(first).collect();
        all[..all.len().saturating_sub(1)].to_vec()
    };
    let mut shared = first_dirs.len();

    for path in iter {
        let all: Vec<&str> = segments(path).collect();
        let dirs = &all[..all.len().saturating_sub(1)];
        shared = shared.min(
            first_dirs
                .iter()
                .zip(dirs)
                .take_while(|(a, b)| a == b)
                .count(),
        );
        if shared == 0 {
            break;
        }
    }

    shared
}
