mod common;

use common::{build_tree, reference_tree, write_file};
use dirsize::{compute_size, AggregatorOptions, SizeAggregator, TraversalError};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_reference_tree_totals_400() {
    let dir = reference_tree();
    let report = compute_size(dir.path()).unwrap();
    assert_eq!(report.total_bytes, 400);
}

#[test]
fn test_flat_files_sum() {
    let dir = build_tree(&[("a", 3), ("b", 1_000), ("c", 65_536)]);
    assert_eq!(compute_size(dir.path()).unwrap().total_bytes, 3 + 1_000 + 65_536);
}

#[test]
fn test_empty_directory_is_zero() {
    let dir = TempDir::new().unwrap();
    let report = compute_size(dir.path()).unwrap();
    assert_eq!(report.total_bytes, 0);
    assert_eq!(report.dirs, 0);
}

#[test]
fn test_recursive_composition() {
    let dir = build_tree(&[
        ("top", 11),
        ("other", 22),
        ("sub/x", 300),
        ("sub/nested/y", 4_000),
        ("sub/nested/deeper/z", 5),
    ]);

    let parent = compute_size(dir.path()).unwrap();
    let sub = compute_size(dir.path().join("sub")).unwrap();
    assert_eq!(parent.total_bytes, sub.total_bytes + 11 + 22);
    assert_eq!(parent.dirs, sub.dirs + 1);
}

#[test]
fn test_creation_order_does_not_matter() {
    let files = [("m/1", 10), ("a", 20), ("z/y/x", 30), ("m/2", 40), (".dot", 50)];
    let mut reversed = files;
    reversed.reverse();

    let forward = build_tree(&files);
    let backward = build_tree(&reversed);
    let a = compute_size(forward.path()).unwrap();
    let b = compute_size(backward.path()).unwrap();
    assert_eq!(a.total_bytes, 150);
    assert_eq!(a.total_bytes, b.total_bytes);
    assert_eq!(a.files, b.files);
}

#[test]
fn test_hidden_entries_are_counted() {
    let dir = build_tree(&[("visible", 1), (".hidden_file", 10), (".hidden_dir/inner", 100)]);
    assert_eq!(compute_size(dir.path()).unwrap().total_bytes, 111);
}

#[test]
fn test_missing_path_fails_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist");

    let err = compute_size(&missing).unwrap_err();
    assert!(matches!(err, TraversalError::NotFound { .. }));
    assert_eq!(err.path(), missing);
    assert!(!missing.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_reports_are_fresh_snapshots() {
    let dir = reference_tree();
    let aggregator = SizeAggregator::default();
    let before = aggregator.compute_size(dir.path()).unwrap();

    write_file(dir.path(), "sub/later", 600);
    let after = aggregator.compute_size(dir.path()).unwrap();

    assert_eq!(before.total_bytes, 400);
    assert_eq!(after.total_bytes, 1_000);
}

#[test]
fn test_report_serializes() {
    let dir = reference_tree();
    let report = compute_size(dir.path()).unwrap();
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total_bytes"], 400);
    assert_eq!(json["files"], 3);
}

#[cfg(unix)]
mod unreadable {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Lock `dir`; returns false when the process can read it anyway (root).
    fn lock(dir: &Path) -> bool {
        fs::set_permissions(dir, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(dir).is_ok() {
            eprintln!("skipping: {} stays readable for this user", dir.display());
            return false;
        }
        true
    }

    fn unlock(dir: &Path) {
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_abort_policy_propagates() {
        let dir = build_tree(&[("ok", 5), ("locked/secret", 500)]);
        let locked = dir.path().join("locked");
        if !lock(&locked) {
            unlock(&locked);
            return;
        }

        let result = compute_size(dir.path());
        unlock(&locked);
        let err = result.unwrap_err();
        assert!(matches!(err, TraversalError::PermissionDenied { .. }));
        assert_eq!(err.path(), locked);
    }

    #[test]
    fn test_count_as_zero_policy_continues() {
        let dir = build_tree(&[("ok", 5), ("locked/secret", 500), ("open/more", 7)]);
        let locked = dir.path().join("locked");
        if !lock(&locked) {
            unlock(&locked);
            return;
        }

        let aggregator = SizeAggregator::new(AggregatorOptions::default().skip_unreadable(true));
        let result = aggregator.compute_size(dir.path());
        unlock(&locked);
        let report = result.unwrap();
        assert_eq!(report.total_bytes, 12);
        assert_eq!(report.unreadable, vec![locked]);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_unreadable_root_always_fails() {
        let dir = build_tree(&[("locked/secret", 500)]);
        let locked = dir.path().join("locked");
        if !lock(&locked) {
            unlock(&locked);
            return;
        }

        let aggregator = SizeAggregator::new(AggregatorOptions::default().skip_unreadable(true));
        let result = aggregator.compute_size(&locked);
        unlock(&locked);
        assert!(matches!(result, Err(TraversalError::PermissionDenied { .. })));
    }
}
