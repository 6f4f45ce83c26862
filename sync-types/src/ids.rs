//! Identity types for datasets and their snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::IdError;

/// Validate a string that will be interpolated into a URL path segment.
fn validate_segment(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if let Some(ch) = value
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
    {
        return Err(IdError::InvalidCharacter {
            value: value.to_string(),
            ch,
        });
    }
    if value == "." || value == ".." {
        return Err(IdError::InvalidCharacter {
            value: value.to_string(),
            ch: '.',
        });
    }
    Ok(())
}

/// Identifier of a dataset on the remote service (e.g. `ds000001`).
///
/// Validated on construction so it can be placed in a URL path without
/// escaping.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId(String);

impl DatasetId {
    /// Parse and validate a dataset id.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        validate_segment(&id)?;
        Ok(Self(id))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DatasetId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl TryFrom<String> for DatasetId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DatasetId> for String {
    fn from(id: DatasetId) -> Self {
        id.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatasetId({})", self.0)
    }
}

/// A published snapshot tag of a dataset (e.g. `1.0.2`).
///
/// Absence of a version everywhere means "the latest draft".
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Parse and validate a snapshot tag.
    pub fn new(tag: impl Into<String>) -> Result<Self, IdError> {
        let tag = tag.into();
        validate_segment(&tag)?;
        Ok(Self(tag))
    }

    /// Get the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Version {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl TryFrom<String> for Version {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_id_accepts_plain_ids() {
        let id: DatasetId = "ds000001".parse().unwrap();
        assert_eq!(id.as_str(), "ds000001");
        assert_eq!(id.to_string(), "ds000001");
    }

    #[test]
    fn dataset_id_trims_whitespace_when_parsed() {
        let id: DatasetId = "  ds000002\n".parse().unwrap();
        assert_eq!(id.as_str(), "ds000002");
    }

    #[test]
    fn dataset_id_rejects_slashes() {
        let err = DatasetId::new("ds1/../admin").unwrap_err();
        assert!(matches!(err, IdError::InvalidCharacter { ch: '/', .. }));
    }

    #[test]
    fn dataset_id_rejects_empty_and_dot_segments() {
        assert_eq!(DatasetId::new("").unwrap_err(), IdError::Empty);
        assert!(DatasetId::new("..").is_err());
        assert!(DatasetId::new("ds 1").is_err());
    }

    #[test]
    fn version_validation_matches_dataset_id() {
        assert!(Version::new("1.0.0").is_ok());
        assert!(Version::new("1.0.0?x=1").is_err());
    }

    #[test]
    fn dataset_id_serde_validates() {
        let id: DatasetId = serde_json::from_str("\"ds000003\"").unwrap();
        assert_eq!(id.as_str(), "ds000003");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ds000003\"");

        let bad: Result<DatasetId, _> = serde_json::from_str("\"a/b\"");
        assert!(bad.is_err());
    }
}
