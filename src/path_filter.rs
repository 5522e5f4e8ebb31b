//! Path filter (§4.1): decides whether a path is in scope or should be pruned.
//!
//! Grounded on the teacher's `should_include_in_walk`/`is_os_hidden_file`
//! (`examples/thicclatka-nefaxer/src/engine/tools.rs`): an ancestor-prefix
//! test plus hidden-file exclusion, generalized from one root + exclude
//! patterns to many [`WatchPath`](crate::config::WatchPath) rows.

use std::path::{Path, PathBuf};

use crate::config::WatchPath;

/// The derived `(included roots, excluded subtrees)` pair consumed by
/// discovery, the monitor, and verification (spec §3 "Watch configuration").
#[derive(Clone, Debug, Default)]
pub struct PathFilter {
    included_roots: Vec<PathBuf>,
    excluded_subtrees: Vec<PathBuf>,
}

/// `A` is an ancestor of `B` iff `B == A` or `B` starts with `A + separator`.
fn is_ancestor(ancestor: &Path, path: &Path) -> bool {
    path == ancestor || path.starts_with(ancestor)
}

impl PathFilter {
    pub fn from_watch_paths(rows: &[WatchPath]) -> Self {
        let mut included_roots = Vec::new();
        let mut excluded_subtrees = Vec::new();
        for row in rows {
            if !row.enabled {
                continue;
            }
            if row.is_excluded {
                excluded_subtrees.push(row.path.clone());
            } else {
                included_roots.push(row.path.clone());
            }
        }
        Self {
            included_roots,
            excluded_subtrees,
        }
    }

    pub fn included_roots(&self) -> &[PathBuf] {
        &self.included_roots
    }

    /// True if a directory (or any of its descendants) must never be
    /// descended into.
    pub fn is_pruned_dir(&self, dir: &Path) -> bool {
        self.excluded_subtrees
            .iter()
            .any(|excluded| is_ancestor(excluded, dir))
    }

    /// True iff some included root is an ancestor of `path` and no excluded
    /// subtree is.
    pub fn is_in_scope(&self, path: &Path) -> bool {
        let under_included = self
            .included_roots
            .iter()
            .any(|root| is_ancestor(root, path));
        under_included && !self.is_pruned_dir(path)
    }

    /// Which included root owns `path`, if any — used to preserve the
    /// root-by-root emission order of discovery (spec §4.3).
    pub fn owning_root(&self, path: &Path) -> Option<&Path> {
        self.included_roots
            .iter()
            .find(|root| is_ancestor(root, path))
            .map(|p| p.as_path())
    }
}

/// OS-specific junk files excluded unconditionally, regardless of watch
/// configuration. Mirrors the teacher's `is_os_hidden_file`.
pub fn is_os_hidden_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    matches!(
        name,
        ".DS_Store" | ".AppleDouble" | ".LSOverride" | "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" | ".directory"
    ) || name.starts_with("._")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn wp(id: i64, path: &str, excluded: bool) -> WatchPath {
        let now = Utc::now();
        WatchPath {
            id,
            path: PathBuf::from(path),
            enabled: true,
            include_subdirectories: true,
            is_excluded: excluded,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn in_scope_requires_included_ancestor() {
        let filter = PathFilter::from_watch_paths(&[wp(1, "/r", false)]);
        assert!(filter.is_in_scope(Path::new("/r/a.txt")));
        assert!(filter.is_in_scope(Path::new("/r")));
        assert!(!filter.is_in_scope(Path::new("/other/a.txt")));
    }

    #[test]
    fn excluded_subtree_removes_scope() {
        let filter = PathFilter::from_watch_paths(&[wp(1, "/r", false), wp(2, "/r/skip", true)]);
        assert!(filter.is_in_scope(Path::new("/r/keep/a.txt")));
        assert!(!filter.is_in_scope(Path::new("/r/skip/a.txt")));
        assert!(!filter.is_in_scope(Path::new("/r/skip")));
    }

    #[test]
    fn ancestor_test_rejects_prefix_collisions() {
        // "/root2" must not be considered inside "/root" (no separator boundary).
        let filter = PathFilter::from_watch_paths(&[wp(1, "/root", false)]);
        assert!(!filter.is_in_scope(Path::new("/root2/a.txt")));
    }

    #[test]
    fn disabled_rows_are_ignored() {
        let mut row = wp(1, "/r", false);
        row.enabled = false;
        let filter = PathFilter::from_watch_paths(std::slice::from_ref(&row));
        assert!(!filter.is_in_scope(Path::new("/r/a.txt")));
    }

    #[test]
    fn prune_dir_matches_exact_and_descendants() {
        let filter = PathFilter::from_watch_paths(&[wp(1, "/r", false), wp(2, "/r/x", true)]);
        assert!(filter.is_pruned_dir(Path::new("/r/x")));
        assert!(filter.is_pruned_dir(Path::new("/r/x/y")));
        assert!(!filter.is_pruned_dir(Path::new("/r/xy")));
    }

    #[test]
    fn hidden_file_detection() {
        assert!(is_os_hidden_file(Path::new("/a/.DS_Store")));
        assert!(is_os_hidden_file(Path::new("/a/._resource")));
        assert!(!is_os_hidden_file(Path::new("/a/normal.txt")));
    }
}
