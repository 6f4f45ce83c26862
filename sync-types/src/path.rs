//! Path keys shared by both sides of a reconciliation.
//!
//! Every file is compared by its *key*: the path relative to the dataset
//! root, with `/` as the separator, no empty or `.` components and no `..`.
//! Local paths are converted into keys during the directory walk, and remote
//! keys are converted back into local paths only through [`resolve_under`],
//! which refuses anything that would land outside the root.
//!
//! Both conversions must agree or the plan silently compares the wrong
//! files, since there is no content hash to catch a mismatch.

use std::path::{Component, Path, PathBuf};

use crate::PathError;

/// Separator used by remote keys.
pub const SEPARATOR: char = '/';

/// Convert a path relative to the local root into a remote key.
pub fn key_from_relative(relative: &Path) -> Result<String, PathError> {
    let mut parts: Vec<&str> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| PathError::NotUtf8(relative.display().to_string()))?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(PathError::Traversal(relative.display().to_string()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Absolute(relative.display().to_string()));
            }
        }
    }
    if parts.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(parts.join("/"))
}

/// Convert an absolute local path under `root` into a remote key.
pub fn key_under_root(root: &Path, path: &Path) -> Result<String, PathError> {
    let relative = path.strip_prefix(root).map_err(|_| PathError::NotUnderRoot {
        path: path.display().to_string(),
        root: root.display().to_string(),
    })?;
    key_from_relative(relative)
}

/// Split a remote key into validated components.
fn components(key: &str) -> Result<Vec<&str>, PathError> {
    if key.starts_with(SEPARATOR) || key.starts_with('\\') || looks_like_drive(key) {
        return Err(PathError::Absolute(key.to_string()));
    }

    let mut parts = Vec::new();
    for part in key.split(SEPARATOR) {
        match part {
            "" | "." => {}
            ".." => return Err(PathError::Traversal(key.to_string())),
            _ if part.contains(|c| c == '\\' || c == '\0' || (cfg!(windows) && c == ':')) => {
                return Err(PathError::InvalidComponent(key.to_string()));
            }
            _ => parts.push(part),
        }
    }
    if parts.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(parts)
}

/// `C:` or `C:/...`. On Windows any `X:` prefix names a drive; elsewhere
/// `a:b` is an ordinary file name.
fn looks_like_drive(key: &str) -> bool {
    let bytes = key.as_bytes();
    let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    drive && (cfg!(windows) || matches!(bytes.get(2), None | Some(b'/')))
}

/// Normalize a remote key: drop empty and `.` components.
///
/// Fails for keys that could never be written safely under a local root.
pub fn normalize_key(key: &str) -> Result<String, PathError> {
    Ok(components(key)?.join("/"))
}

/// Resolve a remote key to a local path strictly inside `root`.
///
/// This is the only way a remote-supplied key becomes a local path.
pub fn resolve_under(root: &Path, key: &str) -> Result<PathBuf, PathError> {
    let mut path = root.to_path_buf();
    for part in components(key)? {
        path.push(part);
    }
    Ok(path)
}
