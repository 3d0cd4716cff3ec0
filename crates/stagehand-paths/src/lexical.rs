//! Lexical path arithmetic
//!
//! Normalisation and relativisation that never touch the filesystem, so
//! results are stable whether or not the paths exist.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Lexically normalise a path
///
/// Drops `.` components and resolves `..` against the preceding name.
/// Leading `..` components of a relative path are kept; `..` directly
/// below the root is dropped. An empty relative result is `.`.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut prefix: Vec<Component<'_>> = Vec::new();
    let mut names: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => prefix.push(component),
            Component::CurDir => {}
            Component::ParentDir => match names.last() {
                Some(Component::Normal(_)) => {
                    names.pop();
                }
                _ if !prefix.is_empty() => {}
                _ => names.push(component),
            },
            Component::Normal(_) => names.push(component),
        }
    }

    if prefix.is_empty() && names.is_empty() {
        return PathBuf::from(".");
    }

    prefix.iter().chain(names.iter()).collect()
}

/// Compute the relative path leading from `base` to `target`
///
/// Both paths are normalised first. Joining the result onto `base` and
/// normalising yields `target` again.
///
/// # Errors
/// Returns error if one path is absolute and the other relative, or if
/// `base` climbs out through `..` further than `target`.
pub fn relativize(base: &Path, target: &Path) -> Result<PathBuf, RelativizeError> {
    let base = normalize(base);
    let target = normalize(target);

    if base.has_root() != target.has_root() {
        return Err(RelativizeError::MixedKinds {
            base,
            target,
        });
    }

    let base_parts = significant(&base);
    let target_parts = significant(&target);

    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for part in &base_parts[common..] {
        if part == ".." {
            return Err(RelativizeError::Unreachable { base, target });
        }
        result.push("..");
    }
    for part in &target_parts[common..] {
        result.push(part);
    }

    if result.as_os_str().is_empty() {
        result.push(".");
    }
    Ok(result)
}

fn significant(path: &Path) -> Vec<OsString> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::Prefix(prefix) => Some(prefix.as_os_str().to_os_string()),
            Component::RootDir | Component::CurDir => None,
        })
        .collect()
}

/// Errors computing a relative path
#[derive(Debug, thiserror::Error)]
pub enum RelativizeError {
    /// One path is absolute and the other relative
    #[error("cannot relativize '{}' against '{}': mixed absolute and relative paths", target.display(), base.display())]
    MixedKinds {
        /// Path relativized against
        base: PathBuf,
        /// Path being relativized
        target: PathBuf,
    },

    /// The base escapes through `..` components the target does not share
    #[error("cannot relativize '{}' against '{}'", target.display(), base.display())]
    Unreachable {
        /// Path relativized against
        base: PathBuf,
        /// Path being relativized
        target: PathBuf,
    },
}
