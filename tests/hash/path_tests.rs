// Tests for path reconciliation

use std::path::{Path, PathBuf};

use dirsum::hash::database::Entry;
use dirsum::hash::path_utils::{
    clean_path, normalize_separators, PathReconciler, ReconcileStrategy, StoredPathKind,
};

fn reconciler() -> PathReconciler {
    PathReconciler::new(Path::new("/data/root"), ReconcileStrategy::Structural)
}

#[test]
fn test_drive_letter_path_anchors_on_root_name() {
    assert_eq!(
        reconciler().resolve("C:/backup/root/sub/f.txt"),
        PathBuf::from("/data/root/sub/f.txt")
    );
}

#[test]
fn test_duplicated_root_segment_is_stripped() {
    assert_eq!(
        reconciler().resolve("root/sub/f.txt"),
        PathBuf::from("/data/root/sub/f.txt")
    );
}

#[test]
fn test_multi_segment_root_prefix_is_stripped() {
    // Recorded by a run over the relative directory "photos/2020"
    let r = PathReconciler::new(Path::new("/home/me/photos/2020"), ReconcileStrategy::Structural);
    assert_eq!(r.classify("photos/2020/a.jpg"), StoredPathKind::DuplicatedRoot);
    assert_eq!(
        r.resolve("photos/2020/a.jpg"),
        PathBuf::from("/home/me/photos/2020/a.jpg")
    );
    assert_eq!(
        r.resolve("./photos/2020/trip/b.jpg"),
        PathBuf::from("/home/me/photos/2020/trip/b.jpg")
    );
}

#[test]
fn test_backslashes_are_normalized() {
    assert_eq!(normalize_separators(r"a\b\c.txt"), "a/b/c.txt");
    assert_eq!(
        reconciler().resolve(r"D:\backup\root\sub\f.txt"),
        PathBuf::from("/data/root/sub/f.txt")
    );
    assert_eq!(
        reconciler().resolve(r"sub\f.txt"),
        PathBuf::from("/data/root/sub/f.txt")
    );
}

#[test]
fn test_drive_letter_without_root_name_joins_remainder() {
    assert_eq!(
        reconciler().resolve("E:/photos/2020/a.jpg"),
        PathBuf::from("/data/root/photos/2020/a.jpg")
    );
}

#[test]
fn test_absolute_path_is_used_as_is() {
    assert_eq!(
        reconciler().resolve("/mnt/elsewhere/f.txt"),
        PathBuf::from("/mnt/elsewhere/f.txt")
    );
    // Absolute paths are never re-rooted, even through the root's name
    assert_eq!(
        reconciler().resolve("/backup/root/f.txt"),
        PathBuf::from("/backup/root/f.txt")
    );
}

#[test]
fn test_plain_relative_path_joins_root() {
    assert_eq!(
        reconciler().resolve("sub/f.txt"),
        PathBuf::from("/data/root/sub/f.txt")
    );
    // Only a leading segment counts as a duplicated root
    assert_eq!(
        reconciler().resolve("sub/root/f.txt"),
        PathBuf::from("/data/root/sub/root/f.txt")
    );
    assert_eq!(
        reconciler().resolve("rooted/f.txt"),
        PathBuf::from("/data/root/rooted/f.txt")
    );
}

#[test]
fn test_classification_tie_break_order() {
    let r = reconciler();
    assert_eq!(r.classify("C:/root/f"), StoredPathKind::DriveLetter);
    assert_eq!(r.classify("/root/f"), StoredPathKind::Absolute);
    assert_eq!(r.classify("root/f"), StoredPathKind::DuplicatedRoot);
    assert_eq!(r.classify("f"), StoredPathKind::Relative);
    assert_eq!(r.classify("root"), StoredPathKind::Relative);
}

#[test]
fn test_dot_segments_are_cleaned() {
    assert_eq!(
        reconciler().resolve("./sub/../other/./f.txt"),
        PathBuf::from("/data/root/other/f.txt")
    );
    assert_eq!(clean_path(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
    assert_eq!(clean_path(Path::new("/../a")), PathBuf::from("/a"));
    assert_eq!(clean_path(Path::new("a/..")), PathBuf::from("."));
}

#[test]
fn test_mapping_is_deterministic() {
    let entries = vec![
        Entry::new("aa", "C:/backup/root/x.txt"),
        Entry::new("bb", "sub/y.txt"),
    ];
    let first = reconciler().reconcile(&entries);
    let second = reconciler().reconcile(&entries);
    assert_eq!(first.pairs, second.pairs);
    assert_eq!(first.order, second.order);
}

#[test]
fn test_reconcile_builds_expected_map_in_order() {
    let entries = vec![
        Entry::new("aa", "root/a.txt"),
        Entry::new("bb", "b.txt"),
    ];
    let result = reconciler().reconcile(&entries);

    assert_eq!(
        result.order,
        vec![PathBuf::from("/data/root/a.txt"), PathBuf::from("/data/root/b.txt")]
    );
    assert_eq!(result.expected[Path::new("/data/root/b.txt")], "bb");
    assert!(result.collisions.is_empty());
    assert_eq!(result.pairs[0].stored, "root/a.txt");
}

#[test]
fn test_collisions_are_reported_and_first_record_wins() {
    let entries = vec![
        Entry::new("aa", "root/a.txt"),
        Entry::new("bb", "a.txt"),
        Entry::new("aa", r"C:\x\root\a.txt"),
    ];
    let result = reconciler().reconcile(&entries);

    assert_eq!(result.order.len(), 1);
    assert_eq!(result.expected[Path::new("/data/root/a.txt")], "aa");
    assert_eq!(result.collisions.len(), 2);

    let first = &result.collisions[0];
    assert_eq!(first.kept, "root/a.txt");
    assert_eq!(first.dropped, "a.txt");
    assert!(first.digests_differ);

    let second = &result.collisions[1];
    assert_eq!(second.kept, "root/a.txt");
    assert!(!second.digests_differ);

    let message = first.to_string();
    assert!(message.contains("root/a.txt"));
    assert!(message.contains("/data/root/a.txt"));
}

#[test]
fn test_common_prefix_strategy() {
    let entries = vec![
        Entry::new("aa", "/old/base/a/x.txt"),
        Entry::new("bb", "/old/base/b/y.txt"),
        Entry::new("cc", "/old/base/z.txt"),
    ];
    let reconciler = PathReconciler::new(Path::new("/data/root"), ReconcileStrategy::CommonPrefix);
    let result = reconciler.reconcile(&entries);

    assert_eq!(
        result.order,
        vec![
            PathBuf::from("/data/root/a/x.txt"),
            PathBuf::from("/data/root/b/y.txt"),
            PathBuf::from("/data/root/z.txt"),
        ]
    );
}

#[test]
fn test_common_prefix_with_mixed_separators() {
    let entries = vec![
        Entry::new("aa", r"C:\old\a.txt"),
        Entry::new("bb", "C:/old/sub/b.txt"),
    ];
    let reconciler = PathReconciler::new(Path::new("/data/root"), ReconcileStrategy::CommonPrefix);
    let result = reconciler.reconcile(&entries);

    assert_eq!(
        result.order,
        vec![PathBuf::from("/data/root/a.txt"), PathBuf::from("/data/root/sub/b.txt")]
    );
}
