// Shared fixtures for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Create `rel` under `root` holding exactly `len` bytes, creating parents.
pub fn write_file(root: &Path, rel: &str, len: usize) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, vec![b'.'; len]).unwrap();
}

/// Build a tree from `(relative path, size)` pairs, in the given order.
pub fn build_tree(files: &[(&str, usize)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, len) in files {
        write_file(dir.path(), rel, *len);
    }
    dir
}

/// The reference layout: f1 = 100, f2 = 250, sub/f3 = 50.
pub fn reference_tree() -> TempDir {
    build_tree(&[("f1", 100), ("f2", 250), ("sub/f3", 50)])
}
