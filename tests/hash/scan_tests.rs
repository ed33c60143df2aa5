// Tests for generate mode

use std::collections::HashSet;
use std::fs;

use dirsum::hash::database::{Ledger, RecordFormat};
use dirsum::hash::{HashUtilityError, PathStyle, ScanEngine};

use super::support::{computer, lines, write_tree};

#[test]
fn test_scan_records_every_file() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_tree(root.path(), &[("a.txt", "hello world"), ("sub/b.txt", "b")]);
    let list = out.path().join("list.txt");

    let stats = ScanEngine::new(computer("sha1"))
        .with_workers(4)
        .scan_directory(root.path(), Some(&list))
        .unwrap();

    assert_eq!(stats.files_found, 2);
    assert_eq!(stats.files_processed, 2);
    assert_eq!(stats.files_failed, 0);
    assert_eq!(stats.total_bytes, 12);
    assert!(stats.is_success());

    let expected = format!(
        "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed\t{}",
        root.path().join("a.txt").to_string_lossy().replace('\\', "/")
    );
    assert!(lines(&list).contains(&expected));
}

#[test]
fn test_scan_twice_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    write_tree(root.path(), &[("a", "1"), ("b", "2"), ("c/d", "3")]);
    let list = root.path().join("list.txt");
    let engine = ScanEngine::new(computer("sha256")).with_workers(2);

    let first = engine.scan_directory(root.path(), Some(&list)).unwrap();
    assert_eq!(first.files_processed, 3);

    let second = engine.scan_directory(root.path(), Some(&list)).unwrap();
    assert_eq!(second.files_found, 3);
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.files_skipped, 3);

    let ledger = Ledger::load(&list, RecordFormat::Tsv, Some(32)).unwrap();
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.paths().len(), 3);
}

#[test]
fn test_list_inside_root_is_not_hashed() {
    let root = tempfile::tempdir().unwrap();
    write_tree(root.path(), &[("a", "1")]);
    let list = root.path().join("list.txt");

    ScanEngine::new(computer("sha1"))
        .scan_directory(root.path(), Some(&list))
        .unwrap();

    let recorded = lines(&list);
    assert_eq!(recorded.len(), 1);
    assert!(!recorded[0].ends_with("list.txt"));
}

#[test]
fn test_resume_hashes_only_new_files() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = out.path().join("list.txt");
    write_tree(root.path(), &[("a", "1"), ("b", "2")]);

    let engine = ScanEngine::new(computer("xxh64"));
    engine.scan_directory(root.path(), Some(&list)).unwrap();

    write_tree(root.path(), &[("c", "3"), ("sub/d", "4")]);
    let stats = engine.scan_directory(root.path(), Some(&list)).unwrap();
    assert_eq!(stats.files_processed, 2);

    let ledger = Ledger::load(&list, RecordFormat::Tsv, Some(8)).unwrap();
    assert_eq!(ledger.len(), 4);
    assert_eq!(ledger.paths().len(), 4);
}

#[test]
fn test_resume_after_torn_write() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = out.path().join("list.txt");
    write_tree(root.path(), &[("a", "1"), ("b", "2")]);

    let engine = ScanEngine::new(computer("sha1"));
    engine.scan_directory(root.path(), Some(&list)).unwrap();

    // Cut the last record in half, as a crash mid-write would
    let text = fs::read_to_string(&list).unwrap();
    fs::write(&list, &text[..text.len() - 10]).unwrap();

    let stats = engine.scan_directory(root.path(), Some(&list)).unwrap();
    assert_eq!(stats.files_processed, 1);

    let ledger = Ledger::load(&list, RecordFormat::Tsv, Some(20)).unwrap();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.skipped(), 0);
}

#[test]
fn test_relative_paths_and_json_format() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = out.path().join("list.jsonl");
    write_tree(root.path(), &[("sub/a.txt", "x")]);

    let engine = ScanEngine::new(computer("sha1"))
        .with_format(RecordFormat::JsonLines)
        .with_path_style(PathStyle::Relative);
    engine.scan_directory(root.path(), Some(&list)).unwrap();

    assert_eq!(
        lines(&list),
        vec![r#"{"hash":"11f6ad8ec52a2984abaafd7c3b516503785c2072","path":"sub/a.txt"}"#]
    );

    // Relative records still count as done on the next run
    let again = engine.scan_directory(root.path(), Some(&list)).unwrap();
    assert_eq!(again.files_processed, 0);
}

#[test]
fn test_many_workers_small_batches() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = out.path().join("list.txt");
    let files: Vec<(String, String)> = (0..120)
        .map(|i| (format!("d{}/f{}.bin", i % 7, i), format!("content {}", i)))
        .collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    write_tree(root.path(), &refs);

    let stats = ScanEngine::new(computer("blake3"))
        .with_workers(16)
        .with_flush_every(3)
        .scan_directory(root.path(), Some(&list))
        .unwrap();
    assert_eq!(stats.files_processed, 120);

    let recorded: HashSet<String> = lines(&list).into_iter().collect();
    assert_eq!(recorded.len(), 120);
}

#[test]
fn test_scan_missing_directory() {
    let out = tempfile::tempdir().unwrap();
    let err = ScanEngine::new(computer("sha1"))
        .scan_directory(&out.path().join("missing"), Some(&out.path().join("l.txt")))
        .unwrap_err();
    assert!(matches!(err, HashUtilityError::DirectoryNotFound { .. }));
    assert!(!out.path().join("l.txt").exists());
}

#[test]
fn test_skipped_counts_walked_files_only() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = out.path().join("list.txt");
    write_tree(root.path(), &[("a", "1"), ("b", "2")]);

    let engine = ScanEngine::new(computer("sha1"));
    engine.scan_directory(root.path(), Some(&list)).unwrap();
    fs::remove_file(root.path().join("b")).unwrap();

    // The record for the deleted file is not a skipped file
    let stats = engine.scan_directory(root.path(), Some(&list)).unwrap();
    assert_eq!(stats.files_found, 1);
    assert_eq!(stats.files_skipped, 1);
    assert_eq!(stats.files_processed, 0);
}

#[cfg(unix)]
#[test]
fn test_backslash_in_file_name_is_recorded_verbatim() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = out.path().join("list.txt");
    let files = write_tree(root.path(), &[("a\\b.txt", "x")]);

    let engine = ScanEngine::new(computer("sha1"));
    let first = engine.scan_directory(root.path(), Some(&list)).unwrap();
    let second = engine.scan_directory(root.path(), Some(&list)).unwrap();
    assert_eq!(first.files_processed, 1);
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.files_skipped, 1);

    let recorded = lines(&list);
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].ends_with(&files[0].to_string_lossy().into_owned()));
    assert!(recorded[0].ends_with("a\\b.txt"));
}

#[cfg(unix)]
#[test]
fn test_non_utf8_name_is_reported_not_recorded() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = out.path().join("list.txt");
    write_tree(root.path(), &[("ok.txt", "x")]);
    let odd = root.path().join(OsStr::from_bytes(b"caf\xe9.txt"));
    if fs::write(&odd, b"y").is_err() {
        // Some filesystems refuse non-UTF-8 names outright
        return;
    }

    let stats = ScanEngine::new(computer("sha1"))
        .scan_directory(root.path(), Some(&list))
        .unwrap();
    assert_eq!(stats.files_found, 2);
    assert_eq!(stats.files_processed, 1);
    assert_eq!(stats.files_failed, 1);
    assert!(!stats.is_success());
    assert_eq!(lines(&list).len(), 1);
}

#[cfg(unix)]
#[test]
fn test_strict_traversal_failure_writes_no_records() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = out.path().join("list.txt");
    write_tree(root.path(), &[("a.txt", "a"), ("locked/b.txt", "b")]);
    let locked = root.path().join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let strict = ScanEngine::new(computer("sha1")).scan_directory(root.path(), Some(&list));
    let strict_lines = if list.exists() { lines(&list) } else { Vec::new() };

    let best_effort = ScanEngine::new(computer("sha1"))
        .with_best_effort(true)
        .scan_directory(root.path(), Some(&list));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(strict, Err(HashUtilityError::Traversal { .. })));
    assert!(strict_lines.is_empty());

    let stats = best_effort.unwrap();
    assert_eq!(stats.files_processed, 1);
    assert_eq!(lines(&list).len(), 1);
}
