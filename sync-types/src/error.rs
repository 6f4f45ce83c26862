//! Error types for openneuro-sync types.

use thiserror::Error;

/// A dataset id or snapshot version failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The id was empty.
    #[error("dataset id is empty")]
    Empty,

    /// The id contains a character that cannot appear in a URL path segment.
    #[error("invalid character {ch:?} in {value:?}")]
    InvalidCharacter {
        /// The rejected input.
        value: String,
        /// The first offending character.
        ch: char,
    },
}

/// A relative path could not be used as a reconciliation key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path is empty or has only `.` components.
    #[error("empty path")]
    Empty,

    /// The path is absolute (leading `/`, drive letter or UNC prefix).
    #[error("absolute path not allowed: {0}")]
    Absolute(String),

    /// The path contains a `..` component and could escape the root.
    #[error("path escapes the target root: {0}")]
    Traversal(String),

    /// A component contains a character that is unsafe on the local filesystem.
    #[error("invalid path component in {0}")]
    InvalidComponent(String),

    /// The local path is not valid UTF-8 and has no remote representation.
    #[error("path is not valid UTF-8: {0}")]
    NotUtf8(String),

    /// The path is not located under the given root.
    #[error("{path} is not under {root}")]
    NotUnderRoot {
        /// The offending path.
        path: String,
        /// The root it was expected under.
        root: String,
    },
}
