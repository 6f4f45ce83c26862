//! Mock dataset service for testing.
//!
//! Holds datasets in memory, records every mutation and can be told to fail
//! individual files.

use super::{ByteReader, Remote, RemoteError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use sync_types::{DatasetId, ListedFile, Version};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

const URL_SCHEME: &str = "mock://";

type Files = BTreeMap<String, Vec<u8>>;

/// In-memory dataset service.
///
/// Download URLs have the form `mock://{dataset}[:{version}]/{key}`.
#[derive(Debug, Default)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    next_id: u32,
    drafts: BTreeMap<String, Files>,
    snapshots: BTreeMap<(String, String), Files>,
    raw_listings: BTreeMap<String, Vec<ListedFile>>,
    raw_blobs: HashMap<String, Vec<u8>>,
    unauthorized: bool,
    fail_next_list: Option<String>,
    stall_lists: bool,
    upload_failures: HashMap<String, String>,
    delete_failures: HashMap<String, String>,
    download_failures: HashSet<String>,
    stalled_downloads: HashSet<String>,
    uploads: Vec<String>,
    deletes: Vec<String>,
    downloads: Vec<String>,
    published: Vec<String>,
    list_calls: usize,
}

impl MockRemoteInner {
    fn files(&self, dataset: &str, version: Option<&str>) -> Result<&Files, RemoteError> {
        let files = match version {
            Some(v) => self.snapshots.get(&(dataset.to_string(), v.to_string())),
            None => self.drafts.get(dataset),
        };
        files.ok_or_else(|| match version {
            Some(v) => RemoteError::NotFound(format!("{dataset} snapshot {v}")),
            None => RemoteError::NotFound(dataset.to_string()),
        })
    }

    fn check_authorized(&self) -> Result<(), RemoteError> {
        if self.unauthorized {
            return Err(RemoteError::Unauthorized("token rejected".into()));
        }
        Ok(())
    }
}

fn file_url(dataset: &str, version: Option<&str>, key: &str) -> String {
    match version {
        Some(v) => format!("{URL_SCHEME}{dataset}:{v}/{key}"),
        None => format!("{URL_SCHEME}{dataset}/{key}"),
    }
}

impl MockRemote {
    /// Create an empty mock service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a file in a dataset's draft, creating the dataset if needed.
    pub fn insert_file(&self, dataset: &DatasetId, key: &str, content: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .drafts
            .entry(dataset.to_string())
            .or_default()
            .insert(key.to_string(), content.to_vec());
    }

    /// List an entry exactly as given, bypassing key handling.
    ///
    /// The entry's first URL serves `content`.
    pub fn insert_raw(&self, dataset: &DatasetId, file: ListedFile, content: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.drafts.entry(dataset.to_string()).or_default();
        if let Some(url) = file.urls.first() {
            inner.raw_blobs.insert(url.clone(), content.to_vec());
        }
        inner
            .raw_listings
            .entry(dataset.to_string())
            .or_default()
            .push(file);
    }

    /// Freeze the current draft as a snapshot.
    pub fn snapshot(&self, dataset: &DatasetId, version: &Version) {
        let mut inner = self.inner.lock().unwrap();
        let files = inner.drafts.get(dataset.as_str()).cloned().unwrap_or_default();
        inner
            .snapshots
            .insert((dataset.to_string(), version.to_string()), files);
    }

    /// Get the content of a draft file.
    pub fn file(&self, dataset: &DatasetId, key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.drafts.get(dataset.as_str())?.get(key).cloned()
    }

    /// Get the keys of a dataset's draft, sorted.
    pub fn keys(&self, dataset: &DatasetId) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .drafts
            .get(dataset.as_str())
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Reject every mutation with [`RemoteError::Unauthorized`].
    pub fn deny_writes(&self) {
        self.inner.lock().unwrap().unauthorized = true;
    }

    /// Cause the next `list_files()` to fail with a connection error.
    pub fn fail_next_list(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_list = Some(error.to_string());
    }

    /// Make every listing hang forever.
    pub fn stall_lists(&self) {
        self.inner.lock().unwrap().stall_lists = true;
    }

    /// Cause every upload of `key` to fail with the given error.
    pub fn fail_upload(&self, key: &str, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.upload_failures.insert(key.to_string(), error.to_string());
    }

    /// Cause every remote delete of `key` to fail with the given error.
    pub fn fail_delete(&self, key: &str, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.delete_failures.insert(key.to_string(), error.to_string());
    }

    /// Cause downloads of `key` to break off after half the content.
    pub fn fail_download(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.download_failures.insert(key.to_string());
    }

    /// Cause downloads of `key` to hang after half the content.
    pub fn stall_download(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.stalled_downloads.insert(key.to_string());
    }

    /// Keys uploaded successfully, in order.
    pub fn uploads(&self) -> Vec<String> {
        self.inner.lock().unwrap().uploads.clone()
    }

    /// Keys deleted successfully, in order.
    pub fn deletes(&self) -> Vec<String> {
        self.inner.lock().unwrap().deletes.clone()
    }

    /// URLs downloaded, in order, including failed attempts.
    pub fn downloads(&self) -> Vec<String> {
        self.inner.lock().unwrap().downloads.clone()
    }

    /// Datasets published, in order.
    pub fn published(&self) -> Vec<String> {
        self.inner.lock().unwrap().published.clone()
    }

    /// Number of `list_files()` calls.
    pub fn list_calls(&self) -> usize {
        self.inner.lock().unwrap().list_calls
    }
}

impl Clone for MockRemote {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Remote for MockRemote {
    async fn create_dataset(&self) -> Result<DatasetId, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_authorized()?;

        let id = loop {
            inner.next_id += 1;
            let id = format!("ds{:06}", inner.next_id);
            if !inner.drafts.contains_key(&id) {
                break id;
            }
        };
        inner.drafts.insert(id.clone(), Files::new());
        Ok(DatasetId::new(&id)?)
    }

    async fn list_files(
        &self,
        dataset: &DatasetId,
        version: Option<&Version>,
    ) -> Result<Vec<ListedFile>, RemoteError> {
        let stall = {
            let mut inner = self.inner.lock().unwrap();
            inner.list_calls += 1;
            inner.stall_lists
        };
        if stall {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_list.take() {
            return Err(RemoteError::Connection(error));
        }

        let version = version.map(Version::as_str);
        let mut listed: Vec<ListedFile> = inner
            .files(dataset.as_str(), version)?
            .iter()
            .map(|(key, content)| ListedFile {
                filename: key.clone(),
                size: content.len() as u64,
                urls: vec![file_url(dataset.as_str(), version, key)],
            })
            .collect();

        if version.is_none() {
            if let Some(raw) = inner.raw_listings.get(dataset.as_str()) {
                listed.extend(raw.iter().cloned());
            }
        }
        Ok(listed)
    }

    async fn upload_file(
        &self,
        dataset: &DatasetId,
        mut body: ByteReader,
        size: u64,
        path: &str,
    ) -> Result<(), RemoteError> {
        {
            let inner = self.inner.lock().unwrap();
            inner.check_authorized()?;
            if !inner.drafts.contains_key(dataset.as_str()) {
                return Err(RemoteError::NotFound(dataset.to_string()));
            }
            if let Some(error) = inner.upload_failures.get(path) {
                return Err(RemoteError::Connection(error.clone()));
            }
        }

        let mut content = Vec::new();
        body.read_to_end(&mut content).await?;
        if content.len() as u64 != size {
            return Err(RemoteError::Protocol(format!(
                "declared {size} bytes for {path}, received {}",
                content.len()
            )));
        }

        let mut inner = self.inner.lock().unwrap();
        inner
            .drafts
            .entry(dataset.to_string())
            .or_default()
            .insert(path.to_string(), content);
        inner.uploads.push(path.to_string());
        Ok(())
    }

    async fn delete_file(&self, dataset: &DatasetId, path: &str) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_authorized()?;

        if let Some(error) = inner.delete_failures.get(path) {
            return Err(RemoteError::Connection(error.clone()));
        }

        let files = inner
            .drafts
            .get_mut(dataset.as_str())
            .ok_or_else(|| RemoteError::NotFound(dataset.to_string()))?;
        if files.remove(path).is_none() {
            return Err(RemoteError::NotFound(format!("{dataset}/{path}")));
        }
        inner.deletes.push(path.to_string());
        Ok(())
    }

    async fn publish_dataset(&self, dataset: &DatasetId) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_authorized()?;

        if !inner.drafts.contains_key(dataset.as_str()) {
            return Err(RemoteError::NotFound(dataset.to_string()));
        }
        inner.published.push(dataset.to_string());
        Ok(())
    }

    async fn download(
        &self,
        url: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, RemoteError> {
        let (content, key, fail, stall) = {
            let mut inner = self.inner.lock().unwrap();
            inner.downloads.push(url.to_string());

            let (content, key) = match inner.raw_blobs.get(url) {
                Some(content) => (content.clone(), url.to_string()),
                None => {
                    let (location, key) = url
                        .strip_prefix(URL_SCHEME)
                        .and_then(|rest| rest.split_once('/'))
                        .ok_or_else(|| RemoteError::NotFound(url.to_string()))?;
                    let (dataset, version) = match location.split_once(':') {
                        Some((dataset, version)) => (dataset, Some(version)),
                        None => (location, None),
                    };
                    let content = inner
                        .files(dataset, version)?
                        .get(key)
                        .cloned()
                        .ok_or_else(|| RemoteError::NotFound(url.to_string()))?;
                    (content, key.to_string())
                }
            };
            let fail = inner.download_failures.contains(&key);
            let stall = inner.stalled_downloads.contains(&key);
            (content, key, fail, stall)
        };

        if fail || stall {
            let half = &content[..content.len() / 2];
            destination.write_all(half).await?;
            destination.flush().await?;
            if stall {
                std::future::pending::<()>().await;
            }
            return Err(RemoteError::Connection(format!(
                "connection reset while downloading {key}"
            )));
        }

        destination.write_all(&content).await?;
        destination.flush().await?;
        Ok(content.len() as u64)
    }
}
