// Tests for result aggregation

use std::path::PathBuf;

use proptest::prelude::*;

use dirsum::hash::path_utils::Collision;
use dirsum::hash::{Outcome, ResultAggregator, Status, Tally};

fn status() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Ok),
        Just(Status::Mismatch),
        "[a-z ]{0,12}".prop_map(Status::Error),
    ]
}

proptest! {
    #[test]
    fn tally_ignores_outcome_order(
        (original, shuffled) in prop::collection::vec(status(), 0..64)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        prop_assert_eq!(Tally::from_statuses(&original), Tally::from_statuses(&shuffled));
    }

    #[test]
    fn tally_merge_is_associative(
        a in prop::collection::vec(status(), 0..32),
        b in prop::collection::vec(status(), 0..32),
        c in prop::collection::vec(status(), 0..32),
    ) {
        let (ta, tb, tc) = (Tally::from_statuses(&a), Tally::from_statuses(&b), Tally::from_statuses(&c));
        prop_assert_eq!(ta.combine(tb).combine(tc), ta.combine(tb.combine(tc)));
        prop_assert_eq!(ta.combine(tb), tb.combine(ta));
        prop_assert_eq!(ta.combine(Tally::default()), ta);

        let all: Vec<Status> = a.iter().chain(&b).chain(&c).cloned().collect();
        prop_assert_eq!(Tally::from_statuses(&all), ta.combine(tb).combine(tc));
    }

    #[test]
    fn tally_counts_add_up(statuses in prop::collection::vec(status(), 0..64)) {
        let tally = Tally::from_statuses(&statuses);
        prop_assert_eq!(tally.total, statuses.len() as u64);
        prop_assert_eq!(tally.matched + tally.mismatched, tally.total);
        prop_assert!(tally.errors <= tally.mismatched);
    }
}

#[test]
fn test_errors_count_as_mismatches() {
    let tally = Tally::from_statuses(&[
        Status::Ok,
        Status::Error("permission denied".into()),
        Status::Mismatch,
    ]);
    assert_eq!(
        tally,
        Tally {
            total: 3,
            matched: 1,
            mismatched: 2,
            errors: 1
        }
    );
}

#[test]
fn test_outcome_lines() {
    assert_eq!(Outcome::new("/r/a", Status::Ok).to_string(), "/r/a OK");
    assert_eq!(Outcome::new("/r/a", Status::Mismatch).to_string(), "/r/a MISMATCH");
    assert_eq!(
        Outcome::new("/r/a", Status::Error("boom".into())).to_string(),
        "/r/a ERROR: boom"
    );
}

#[test]
fn test_warnings_and_new_files_in_report() {
    let mut aggregator = ResultAggregator::new(Vec::new(), false);
    aggregator
        .warn_collision(&Collision {
            actual: PathBuf::from("/r/a"),
            kept: "r/a".into(),
            dropped: "a".into(),
            digests_differ: false,
        })
        .unwrap();
    aggregator.record(&Outcome::new("/r/a", Status::Ok)).unwrap();
    aggregator.record_untracked(std::path::Path::new("/r/new.txt")).unwrap();

    let (summary, out) = aggregator.finish().unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.starts_with("WARNING: r/a and a both resolve to /r/a"));
    assert!(text.contains("/r/new.txt NEW\n"));
    assert!(text.ends_with("All files match\nTotal:1 Match:1 Mismatch:0\n"));
    assert!(summary.is_success());
    assert_eq!(summary.untracked, 1);
    assert_eq!(summary.collisions, 1);
}

#[test]
fn test_failure_summary_has_no_all_match_line() {
    let mut aggregator = ResultAggregator::new(Vec::new(), false);
    aggregator.record(&Outcome::new("/r/b", Status::Mismatch)).unwrap();
    let (summary, out) = aggregator.finish().unwrap();

    assert!(!summary.is_success());
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "/r/b MISMATCH\nTotal:1 Match:0 Mismatch:1\n"
    );
}
