//! Remote listing index.
//!
//! The service only offers a full listing per dataset snapshot, so the index
//! is built once per run from that listing and treated as an immutable
//! snapshot while the plan is computed.

use std::collections::BTreeMap;
use sync_types::path::normalize_key;
use sync_types::{DatasetId, ListedFile, RemoteEntry, Version};

/// Remote files of one dataset snapshot, keyed by path.
#[derive(Debug, Clone)]
pub struct RemoteIndex {
    dataset: DatasetId,
    version: Option<Version>,
    entries: BTreeMap<String, RemoteEntry>,
}

impl RemoteIndex {
    /// Build an index from a listing.
    ///
    /// Filenames are normalized to the canonical key form. A filename that
    /// cannot be a safe key (e.g. `../x`) is kept verbatim so it still shows
    /// up in the plan; writing it locally is refused later, per item. When a
    /// listing names the same key twice the later entry wins.
    pub fn from_listing(
        dataset: DatasetId,
        version: Option<Version>,
        files: impl IntoIterator<Item = ListedFile>,
    ) -> Self {
        let mut entries = BTreeMap::new();
        for file in files {
            let key = normalize_key(&file.filename).unwrap_or_else(|_| file.filename.clone());
            let entry = RemoteEntry {
                key: key.clone(),
                listed_name: file.filename,
                size: file.size,
                urls: file.urls,
                dataset: dataset.clone(),
                version: version.clone(),
            };
            entries.insert(key, entry);
        }
        Self {
            dataset,
            version,
            entries,
        }
    }

    /// Dataset this index was listed from.
    pub fn dataset(&self) -> &DatasetId {
        &self.dataset
    }

    /// Snapshot this index was listed from (`None` = draft).
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Look up a file by key.
    pub fn get(&self, key: &str) -> Option<&RemoteEntry> {
        self.entries.get(key)
    }

    /// Check whether a key is listed.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of listed files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the listing is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of all listed files.
    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &RemoteEntry> {
        self.entries.values()
    }

    pub(crate) fn entries(&self) -> &BTreeMap<String, RemoteEntry> {
        &self.entries
    }
}
