//! Operation collision detector
//!
//! Records filesystem operations performed by concurrently running units and
//! reports the first recorded operation of another owner that conflicts with a
//! new one. Operations are kept in a radix trie keyed by absolute path:
//!
//! - every node holds the operations performed exactly at its path
//! - `DIR_LIST` and `PATH_DELETE` are also kept as *prefix operations*, since
//!   they affect everything below their path
//!
//! A new operation is checked in three passes: against the prefix operations
//! of every recorded ancestor, against the operations at its own path, and
//! shallowest first against the operations of every descendant. Each pass
//! has its own conflict table.
//!
//! The detector is not synchronised; callers serialise access.

use crate::segment::{PathError, SegmentPath};
use radix_trie::{Trie, TrieCommon};
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// Kind of filesystem operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationType {
    /// Directory creation
    DirCreate,
    /// Directory listing
    DirList,
    /// File or directory removal
    PathDelete,
    /// Existence check
    PathCheck,
    /// File creation
    FileCreate,
    /// File content read
    ContentRead,
    /// File content write
    ContentWrite,
}

use OperationType::{
    ContentRead, ContentWrite, DirCreate, DirList, FileCreate, PathCheck, PathDelete,
};

impl OperationType {
    /// Every operation type
    pub const ALL: [Self; 7] = [
        DirCreate,
        DirList,
        PathDelete,
        PathCheck,
        FileCreate,
        ContentRead,
        ContentWrite,
    ];

    /// Existing types at the same path that conflict with `self`
    #[must_use]
    pub fn self_conflicts(self) -> &'static [Self] {
        match self {
            DirCreate | PathDelete | FileCreate => &Self::ALL,
            DirList => &[DirCreate, PathDelete, FileCreate, ContentRead, ContentWrite],
            PathCheck => &[DirCreate, PathDelete, FileCreate],
            ContentRead => &[DirCreate, DirList, PathDelete, FileCreate, ContentWrite],
            ContentWrite => &[
                DirCreate,
                DirList,
                PathDelete,
                FileCreate,
                ContentRead,
                ContentWrite,
            ],
        }
    }

    /// Existing prefix operations at an ancestor path that conflict with `self`
    #[must_use]
    pub fn prefix_conflicts(self) -> &'static [Self] {
        match self {
            DirCreate | PathDelete | FileCreate => &[DirList, PathDelete],
            DirList | PathCheck | ContentRead | ContentWrite => &[PathDelete],
        }
    }

    /// Existing types at a descendant path that conflict with `self`
    #[must_use]
    pub fn child_conflicts(self) -> &'static [Self] {
        match self {
            DirList => &[DirCreate, PathDelete, FileCreate],
            PathDelete => &Self::ALL,
            DirCreate | PathCheck | FileCreate | ContentRead | ContentWrite => &[],
        }
    }

    /// Whether operations of this type also affect everything below their path
    #[inline]
    #[must_use]
    pub fn is_prefix_operation(self) -> bool {
        matches!(self, DirList | PathDelete)
    }

    /// Human readable description used in reasons
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            DirCreate => "directory creation",
            DirList => "directory listing",
            PathDelete => "path removal",
            PathCheck => "existence checking",
            FileCreate => "file creation",
            ContentRead => "file read",
            ContentWrite => "file write",
        }
    }
}

impl Display for OperationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            DirCreate => "DIR_CREATE",
            DirList => "DIR_LIST",
            PathDelete => "PATH_DELETE",
            PathCheck => "PATH_CHECK",
            FileCreate => "FILE_CREATE",
            ContentRead => "CONTENT_READ",
            ContentWrite => "CONTENT_WRITE",
        };
        f.write_str(name)
    }
}

/// A recorded filesystem operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    kind: OperationType,
    path: SegmentPath,
    owner: String,
    reason: String,
}

impl Operation {
    /// Create operation with an explicit reason
    #[must_use]
    pub fn new(
        kind: OperationType,
        path: SegmentPath,
        owner: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            path,
            owner: owner.into(),
            reason: reason.into(),
        }
    }

    /// Create operation with the default reason, e.g. `file read at /a/b`
    #[must_use]
    pub fn described(kind: OperationType, path: SegmentPath, owner: impl Into<String>) -> Self {
        let reason = format!("{} at {}", kind.label(), path);
        Self::new(kind, path, owner, reason)
    }

    /// Operation kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> OperationType {
        self.kind
    }

    /// Absolute path the operation touched
    #[inline]
    #[must_use]
    pub fn path(&self) -> &SegmentPath {
        &self.path
    }

    /// Owner that performed the operation
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Diagnostic description
    #[inline]
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn conflicts_with(&self, existing: &Self, table: &[OperationType]) -> bool {
        existing.owner != self.owner && table.contains(&existing.kind)
    }
}

/// Errors reported by the detector
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// The operation conflicts with one recorded earlier by another owner
    #[error("operation offends '{}': {}", .offending.owner, .offending.reason)]
    Collision {
        /// The previously recorded operation
        offending: Box<Operation>,
    },

    /// The operation path could not be mapped into the tree
    #[error(transparent)]
    Path(#[from] PathError),
}

impl DetectorError {
    /// The offending operation, if this is a collision
    #[must_use]
    pub fn offending(&self) -> Option<&Operation> {
        match self {
            Self::Collision { offending } => Some(&**offending),
            Self::Path(_) => None,
        }
    }
}

/// Operations recorded at one path
#[derive(Debug, Default)]
struct Node {
    operations: Vec<Operation>,
    prefix_operations: Vec<Operation>,
}

/// Radix trie of recorded operations
///
/// Keys are absolute paths with a trailing `/` (`/` for the root, `/a/b/`
/// for `/a/b`), so byte prefixes of a key are exactly its ancestors.
#[derive(Debug, Default)]
pub struct CollisionDetector {
    trie: Trie<String, Node>,
    recorded: usize,
}

fn trie_key(path: &SegmentPath) -> String {
    let mut key = String::from("/");
    for segment in path.iter() {
        key.push_str(segment);
        key.push('/');
    }
    key
}

/// Keys of the strict ancestors of `key`, root first
fn ancestor_keys(key: &str) -> impl Iterator<Item = &str> {
    key.match_indices('/')
        .map(move |(index, _)| &key[..=index])
        .filter(move |ancestor| ancestor.len() < key.len())
}

impl CollisionDetector {
    /// Create empty detector
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations recorded so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded
    }

    /// Whether nothing has been recorded yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded == 0
    }

    /// Check `op` against everything recorded and record it if it does not conflict
    ///
    /// # Errors
    /// Returns [`DetectorError::Collision`] carrying the first conflicting
    /// operation of another owner; `op` is not recorded in that case.
    pub fn check_and_record(&mut self, op: Operation) -> Result<(), DetectorError> {
        let key = trie_key(&op.path);
        if let Some(offending) = self.find_conflict(&op, &key) {
            tracing::debug!(
                owner = op.owner(),
                reason = op.reason(),
                offending_owner = offending.owner(),
                offending_reason = offending.reason(),
                "operation collision"
            );
            return Err(DetectorError::Collision {
                offending: Box::new(offending),
            });
        }

        let prefix = op.kind.is_prefix_operation().then(|| op.clone());
        if let Some(node) = self.trie.get_mut(&key) {
            node.prefix_operations.extend(prefix);
            node.operations.push(op);
        } else {
            self.trie.insert(
                key,
                Node {
                    operations: vec![op],
                    prefix_operations: prefix.into_iter().collect(),
                },
            );
        }
        self.recorded += 1;
        Ok(())
    }

    fn find_conflict(&self, op: &Operation, key: &str) -> Option<Operation> {
        let prefix_table = op.kind.prefix_conflicts();
        for ancestor in ancestor_keys(key) {
            let found = self.trie.get(ancestor).and_then(|node| {
                node.prefix_operations
                    .iter()
                    .find(|existing| op.conflicts_with(existing, prefix_table))
            });
            if let Some(found) = found {
                return Some(found.clone());
            }
        }

        let self_table = op.kind.self_conflicts();
        let found = self.trie.get(key).and_then(|node| {
            node.operations
                .iter()
                .find(|existing| op.conflicts_with(existing, self_table))
        });
        if let Some(found) = found {
            return Some(found.clone());
        }

        let child_table = op.kind.child_conflicts();
        if child_table.is_empty() {
            return None;
        }
        let subtrie = self.trie.get_raw_descendant(key)?;
        let mut descendants: Vec<(&String, &Node)> = subtrie
            .iter()
            .filter(|(path, _)| path.len() > key.len() && path.starts_with(key))
            .collect();
        // Shallowest first, segment order within a depth.
        descendants.sort_by(|(a, _), (b, _)| {
            a.matches('/')
                .count()
                .cmp(&b.matches('/').count())
                .then_with(|| a.split('/').cmp(b.split('/')))
        });
        descendants.into_iter().find_map(|(_, node)| {
            node.operations
                .iter()
                .find(|existing| op.conflicts_with(existing, child_table))
                .cloned()
        })
    }

    fn on(&mut self, kind: OperationType, path: &Path, owner: &str) -> Result<(), DetectorError> {
        let path = SegmentPath::from_path(path)?;
        self.check_and_record(Operation::described(kind, path, owner))
    }

    /// Record a directory creation
    ///
    /// # Errors
    /// See [`CollisionDetector::check_and_record`]; also fails for relative paths.
    pub fn on_directory_creation(&mut self, path: &Path, owner: &str) -> Result<(), DetectorError> {
        self.on(DirCreate, path, owner)
    }

    /// Record a directory listing
    ///
    /// # Errors
    /// See [`CollisionDetector::check_and_record`]; also fails for relative paths.
    pub fn on_directory_listing(&mut self, path: &Path, owner: &str) -> Result<(), DetectorError> {
        self.on(DirList, path, owner)
    }

    /// Record a file or directory removal
    ///
    /// # Errors
    /// See [`CollisionDetector::check_and_record`]; also fails for relative paths.
    pub fn on_path_removal(&mut self, path: &Path, owner: &str) -> Result<(), DetectorError> {
        self.on(PathDelete, path, owner)
    }

    /// Record an existence check
    ///
    /// # Errors
    /// See [`CollisionDetector::check_and_record`]; also fails for relative paths.
    pub fn on_check_existence(&mut self, path: &Path, owner: &str) -> Result<(), DetectorError> {
        self.on(PathCheck, path, owner)
    }

    /// Record a file creation
    ///
    /// # Errors
    /// See [`CollisionDetector::check_and_record`]; also fails for relative paths.
    pub fn on_file_creation(&mut self, path: &Path, owner: &str) -> Result<(), DetectorError> {
        self.on(FileCreate, path, owner)
    }

    /// Record a file read
    ///
    /// # Errors
    /// See [`CollisionDetector::check_and_record`]; also fails for relative paths.
    pub fn on_file_read(&mut self, path: &Path, owner: &str) -> Result<(), DetectorError> {
        self.on(ContentRead, path, owner)
    }

    /// Record a file write
    ///
    /// # Errors
    /// See [`CollisionDetector::check_and_record`]; also fails for relative paths.
    pub fn on_file_write(&mut self, path: &Path, owner: &str) -> Result<(), DetectorError> {
        self.on(ContentWrite, path, owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_names_kind_and_path() {
        let op = Operation::described(
            ContentRead,
            SegmentPath::from_path(Path::new("/a/b")).unwrap(),
            "alice",
        );
        assert_eq!(op.reason(), "file read at /a/b");
    }

    #[test]
    fn collision_leaves_tree_unchanged() {
        let mut detector = CollisionDetector::new();
        detector.on_file_write(Path::new("/x"), "alice").unwrap();
        let err = detector.on_file_read(Path::new("/x"), "bob").unwrap_err();

        assert_eq!(err.offending().map(Operation::owner), Some("alice"));
        assert_eq!(detector.len(), 1);
    }

    #[test]
    fn keys_end_at_segment_boundaries() {
        let path = SegmentPath::from_path(Path::new("/a/b")).unwrap();
        assert_eq!(trie_key(&path), "/a/b/");
        assert_eq!(trie_key(&SegmentPath::root()), "/");
        assert_eq!(ancestor_keys("/a/b/").collect::<Vec<_>>(), vec!["/", "/a/"]);
    }

    #[test]
    fn shared_name_prefix_is_not_ancestry() {
        let mut detector = CollisionDetector::new();
        detector.on_directory_listing(Path::new("/out/a"), "alice").unwrap();
        detector.on_path_removal(Path::new("/tmp/a"), "alice").unwrap();

        detector.on_file_creation(Path::new("/out/ab"), "bob").unwrap();
        detector.on_file_read(Path::new("/tmp/a-b/x"), "bob").unwrap();
        assert_eq!(detector.len(), 4);
    }

    #[test]
    fn shallowest_descendant_is_reported() {
        let mut detector = CollisionDetector::new();
        detector.on_file_read(Path::new("/d/x/y/z"), "deep").unwrap();
        detector.on_file_read(Path::new("/d/y"), "shallow").unwrap();

        let err = detector.on_path_removal(Path::new("/d"), "bob").unwrap_err();
        assert_eq!(err.offending().map(Operation::owner), Some("shallow"));
    }

    #[test]
    fn prefix_operations_only_for_list_and_delete() {
        let prefix: Vec<_> = OperationType::ALL
            .into_iter()
            .filter(|kind| kind.is_prefix_operation())
            .collect();
        assert_eq!(prefix, vec![DirList, PathDelete]);
    }

    #[test]
    fn relative_path_is_rejected() {
        let mut detector = CollisionDetector::new();
        let err = detector.on_file_read(Path::new("rel"), "alice").unwrap_err();
        assert!(matches!(err, DetectorError::Path(_)));
        assert!(detector.is_empty());
    }

    #[test]
    fn display_uses_wire_names() {
        assert_eq!(ContentWrite.to_string(), "CONTENT_WRITE");
        assert_eq!(PathCheck.to_string(), "PATH_CHECK");
    }
}
