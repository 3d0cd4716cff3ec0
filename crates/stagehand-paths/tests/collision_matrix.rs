//! Conflict tables of the collision detector, exercised through the public API.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use stagehand_paths::{CollisionDetector, Operation, OperationType, SegmentPath};
use std::path::Path;

use OperationType::{
    ContentRead, ContentWrite, DirCreate, DirList, FileCreate, PathCheck, PathDelete,
};

const ALL: [OperationType; 7] = OperationType::ALL;

fn op(kind: OperationType, path: &str, owner: &str) -> Operation {
    Operation::described(kind, SegmentPath::from_path(Path::new(path)).unwrap(), owner)
}

fn collides(first: (OperationType, &str), second: (OperationType, &str)) -> bool {
    let mut detector = CollisionDetector::new();
    detector
        .check_and_record(op(first.0, first.1, "alice"))
        .expect("first operation never conflicts");
    detector.check_and_record(op(second.0, second.1, "bob")).is_err()
}

/// Same-path expectations, keyed by the newly arriving operation.
fn same_path_conflicts(new: OperationType) -> &'static [OperationType] {
    match new {
        DirCreate | PathDelete | FileCreate => &ALL,
        DirList => &[DirCreate, PathDelete, FileCreate, ContentRead, ContentWrite],
        PathCheck => &[DirCreate, PathDelete, FileCreate],
        ContentRead => &[DirCreate, DirList, PathDelete, FileCreate, ContentWrite],
        ContentWrite => &[DirCreate, DirList, PathDelete, FileCreate, ContentRead, ContentWrite],
    }
}

/// Tenet: operations on the same path conflict exactly as the self table says.
#[test]
fn same_path_matrix() {
    for new in ALL {
        for existing in ALL {
            let expected = same_path_conflicts(new).contains(&existing);
            assert_eq!(
                collides((existing, "/foo/bar"), (new, "/foo/bar")),
                expected,
                "{new} after {existing} on the same path"
            );
        }
    }
}

/// Tenet: the same-path relation is symmetric, so arrival order does not matter.
#[test]
fn same_path_matrix_is_order_independent() {
    for a in ALL {
        for b in ALL {
            assert_eq!(
                collides((a, "/foo/bar"), (b, "/foo/bar")),
                collides((b, "/foo/bar"), (a, "/foo/bar")),
                "{a} / {b}"
            );
        }
    }
}

/// Operation on `/foo` vs operation on `/foo/bar`.
fn parent_child_conflict(parent: OperationType, child: OperationType) -> bool {
    match parent {
        PathDelete => true,
        DirList => matches!(child, DirCreate | PathDelete | FileCreate),
        _ => false,
    }
}

/// Tenet: a parent listing or removal conflicts with mutations below it, in either order.
#[test]
fn parent_child_matrix_both_orders() {
    for parent in ALL {
        for child in ALL {
            let expected = parent_child_conflict(parent, child);
            assert_eq!(
                collides((parent, "/foo"), (child, "/foo/bar")),
                expected,
                "{child} on /foo/bar after {parent} on /foo"
            );
            assert_eq!(
                collides((child, "/foo/bar"), (parent, "/foo")),
                expected,
                "{parent} on /foo after {child} on /foo/bar"
            );
        }
    }
}

#[test]
fn mkdir_below_listed_directory_conflicts() {
    assert!(collides((DirList, "/foo"), (DirCreate, "/foo/bar")));
}

#[test]
fn stat_parent_after_listing_child_does_not_conflict() {
    assert!(!collides((DirList, "/foo/bar"), (PathCheck, "/foo")));
}

#[test]
fn stat_after_stat_does_not_conflict() {
    assert!(!collides((PathCheck, "/foo"), (PathCheck, "/foo")));
}

#[test]
fn write_and_read_conflict_in_either_order() {
    assert!(collides((ContentWrite, "/x"), (ContentRead, "/x")));
    assert!(collides((ContentRead, "/x"), (ContentWrite, "/x")));
}

#[test]
fn removal_reaches_deep_descendants() {
    assert!(collides((ContentRead, "/a/b/c/d"), (PathDelete, "/a")));
    assert!(collides((PathDelete, "/a"), (ContentRead, "/a/b/c/d")));
}

#[test]
fn listing_reaches_deep_descendants() {
    assert!(collides((FileCreate, "/a/b/c"), (DirList, "/a")));
    assert!(!collides((ContentWrite, "/a/b/c"), (DirList, "/a")));
}

#[test]
fn unrelated_siblings_never_conflict() {
    for a in ALL {
        for b in ALL {
            assert!(!collides((a, "/foo/a"), (b, "/foo/b")), "{a} / {b}");
        }
    }
}

#[test]
fn reading_parent_after_child_removal_does_not_conflict() {
    assert!(!collides((PathDelete, "/a/b"), (ContentRead, "/a")));
}

#[test]
fn offending_operation_is_reported() {
    let mut detector = CollisionDetector::new();
    detector.on_file_write(Path::new("/out/x"), "producer").unwrap();
    detector.on_directory_listing(Path::new("/in"), "scanner").unwrap();

    let err = detector
        .on_file_read(Path::new("/out/x"), "consumer")
        .unwrap_err();
    let offending = err.offending().unwrap();
    assert_eq!(offending.owner(), "producer");
    assert_eq!(offending.kind(), ContentWrite);
    assert_eq!(offending.reason(), "file write at /out/x");
}

proptest! {
    /// Tenet: a single owner can never collide with itself.
    #[test]
    fn prop_same_owner_never_conflicts(
        ops in proptest::collection::vec((0..7usize, proptest::collection::vec(0..3usize, 0..4)), 1..30)
    ) {
        let names = ["a", "b", "c"];
        let mut detector = CollisionDetector::new();
        for (kind, segments) in &ops {
            let path = SegmentPath::new(segments.iter().map(|i| names[*i].to_string()).collect());
            let result = detector.check_and_record(Operation::described(ALL[*kind], path, "solo"));
            prop_assert!(result.is_ok());
        }
        prop_assert_eq!(detector.len(), ops.len());
    }

    /// Tenet: a rejected operation is never recorded.
    #[test]
    fn prop_rejections_are_not_recorded(
        ops in proptest::collection::vec((0..7usize, 0..2usize, proptest::collection::vec(0..2usize, 0..3)), 1..30)
    ) {
        let names = ["x", "y"];
        let owners = ["alice", "bob"];
        let mut detector = CollisionDetector::new();
        let mut accepted = 0;
        for (kind, owner, segments) in &ops {
            let path = SegmentPath::new(segments.iter().map(|i| names[*i].to_string()).collect());
            if detector
                .check_and_record(Operation::described(ALL[*kind], path, owners[*owner]))
                .is_ok()
            {
                accepted += 1;
            }
        }
        prop_assert_eq!(detector.len(), accepted);
    }
}
