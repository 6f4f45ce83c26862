//! HTTP client for the dataset service.
//!
//! - Listing: `GET {server}/crn/datasets/{id}[/snapshots/{version}]/download`
//!   returns `{datasetId, files: [{filename, size, urls}]}`
//! - Upload: `PUT {server}/crn/datasets/{id}/files/{path}` with `/` in the
//!   path written as `:`, body streamed
//! - Create, delete and publish are GraphQL mutations on `{server}/crn/graphql`
//!
//! The token travels as the `accessToken` cookie and is only attached to
//! requests for the configured server, never to download mirrors on other
//! hosts.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use reqwest::header::{HeaderValue, CONTENT_LENGTH, COOKIE};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use sync_types::{DatasetId, ListedFile, Version};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{ByteReader, Remote, RemoteError};
use crate::ClientConfig;

/// Read size for streamed upload bodies (64KB).
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

const USER_AGENT_VALUE: &str = concat!("openneuro-sync/", env!("CARGO_PKG_VERSION"));

const CREATE_DATASET: &str =
    "mutation { createDataset(affirmedDefaced: true, affirmedConsent: true) { id } }";
const DELETE_FILES: &str = "mutation ($datasetId: ID!, $files: [DeleteFile]) { \
     deleteFiles(datasetId: $datasetId, files: $files) }";
const PUBLISH_DATASET: &str =
    "mutation ($datasetId: ID!) { publishDataset(datasetId: $datasetId) }";

#[derive(Deserialize)]
struct Listing {
    #[serde(rename = "datasetId")]
    dataset_id: String,
    files: Vec<ListedFile>,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

/// [`Remote`] implementation talking to the dataset service over HTTPS.
pub struct HttpRemote {
    client: Client,
    base: Url,
    auth: Option<HeaderValue>,
}

impl HttpRemote {
    /// Create a client from explicit settings.
    pub fn new(config: ClientConfig) -> Result<Self, RemoteError> {
        let base = Url::parse(&config.server).map_err(|e| {
            RemoteError::Protocol(format!("invalid server URL {}: {}", config.server, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Protocol(format!(
                "invalid server URL {}",
                config.server
            )));
        }

        let auth = match &config.token {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("accessToken={token}"))
                    .map_err(|_| RemoteError::Protocol("token contains invalid characters".into()))?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        let client = Client::builder().user_agent(USER_AGENT_VALUE).build()?;

        Ok(Self { client, base, auth })
    }

    /// Check if requests will carry credentials.
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// URL of the listing for a dataset snapshot.
    pub fn listing_url(&self, dataset: &DatasetId, version: Option<&Version>) -> Url {
        let mut segments = vec!["crn", "datasets", dataset.as_str()];
        if let Some(version) = version {
            segments.extend(["snapshots", version.as_str()]);
        }
        segments.push("download");
        self.endpoint(segments)
    }

    /// URL a file is uploaded to.
    pub fn upload_url(&self, dataset: &DatasetId, path: &str) -> Url {
        let encoded = path.replace('/', ":");
        self.endpoint(["crn", "datasets", dataset.as_str(), "files", encoded.as_str()])
    }

    fn graphql_url(&self) -> Url {
        self.endpoint(["crn", "graphql"])
    }

    /// Check if the token would be sent to `url`.
    pub fn authorizes(&self, url: &Url) -> bool {
        self.auth.is_some() && url.origin() == self.base.origin()
    }

    fn authorized(&self, request: RequestBuilder, url: &Url) -> RequestBuilder {
        match &self.auth {
            Some(value) if self.authorizes(url) => request.header(COOKIE, value.clone()),
            _ => request,
        }
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, RemoteError> {
        let url = self.graphql_url();
        let response = self
            .authorized(self.client.post(url.clone()), &url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let body: GraphQlResponse = check(response)?.json().await?;

        if !body.errors.is_empty() {
            let message = body
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            if message.to_lowercase().contains("not authorized") {
                return Err(RemoteError::Unauthorized(message));
            }
            return Err(RemoteError::Protocol(message));
        }

        body.data
            .ok_or_else(|| RemoteError::Protocol("GraphQL response without data".into()))
    }
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

/// Map non-success statuses to errors.
fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(RemoteError::Unauthorized(format!("{status} from {url}")))
        }
        StatusCode::NOT_FOUND => Err(RemoteError::NotFound(url)),
        _ => Err(RemoteError::Status {
            status: status.as_u16(),
            url,
        }),
    }
}

/// Turn an owned reader into a chunked body stream.
fn reader_stream(reader: ByteReader) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Split a key into the GraphQL `{path, filename}` pair.
fn split_key(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

#[async_trait]
impl Remote for HttpRemote {
    async fn create_dataset(&self) -> Result<DatasetId, RemoteError> {
        let data = self.graphql(CREATE_DATASET, json!({})).await?;
        let id = data["createDataset"]["id"]
            .as_str()
            .ok_or_else(|| RemoteError::Protocol("createDataset returned no id".into()))?;
        Ok(DatasetId::new(id)?)
    }

    async fn list_files(
        &self,
        dataset: &DatasetId,
        version: Option<&Version>,
    ) -> Result<Vec<ListedFile>, RemoteError> {
        let url = self.listing_url(dataset, version);
        debug!(%url, "listing dataset");
        let response = self
            .authorized(self.client.get(url.clone()), &url)
            .send()
            .await?;
        let listing: Listing = check(response)?.json().await?;

        if listing.dataset_id != dataset.as_str() {
            return Err(RemoteError::Protocol(format!(
                "asked for {} but the server listed {}",
                dataset, listing.dataset_id
            )));
        }
        Ok(listing.files)
    }

    async fn upload_file(
        &self,
        dataset: &DatasetId,
        body: ByteReader,
        size: u64,
        path: &str,
    ) -> Result<(), RemoteError> {
        let url = self.upload_url(dataset, path);
        debug!(%url, size, "uploading");
        let response = self
            .authorized(self.client.put(url.clone()), &url)
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(reader_stream(body)))
            .send()
            .await?;
        check(response)?;
        Ok(())
    }

    async fn delete_file(&self, dataset: &DatasetId, path: &str) -> Result<(), RemoteError> {
        let (dir, filename) = split_key(path);
        self.graphql(
            DELETE_FILES,
            json!({
                "datasetId": dataset.as_str(),
                "files": [{ "path": dir, "filename": filename }],
            }),
        )
        .await?;
        Ok(())
    }

    async fn publish_dataset(&self, dataset: &DatasetId) -> Result<(), RemoteError> {
        self.graphql(PUBLISH_DATASET, json!({ "datasetId": dataset.as_str() }))
            .await?;
        Ok(())
    }

    async fn download(
        &self,
        url: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, RemoteError> {
        let url = Url::parse(url)
            .map_err(|e| RemoteError::Protocol(format!("invalid download URL {url}: {e}")))?;
        let response = self
            .authorized(self.client.get(url.clone()), &url)
            .send()
            .await?;
        let mut body = check(response)?.bytes_stream();

        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            destination.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        destination.flush().await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(server: &str, token: Option<&str>) -> HttpRemote {
        HttpRemote::new(ClientConfig::new(server).with_token(token.map(String::from))).unwrap()
    }

    #[test]
    fn listing_url_for_draft_and_snapshot() {
        let r = remote("https://openneuro.org/", None);
        let ds = DatasetId::new("ds000001").unwrap();
        assert_eq!(
            r.listing_url(&ds, None).as_str(),
            "https://openneuro.org/crn/datasets/ds000001/download"
        );

        let v = Version::new("1.0.0").unwrap();
        assert_eq!(
            r.listing_url(&ds, Some(&v)).as_str(),
            "https://openneuro.org/crn/datasets/ds000001/snapshots/1.0.0/download"
        );
    }

    #[test]
    fn upload_url_encodes_separators_and_spaces() {
        let r = remote("https://openneuro.org", None);
        let ds = DatasetId::new("ds000001").unwrap();
        let url = r.upload_url(&ds, "sub-01/anat/my scan.nii.gz");
        assert_eq!(
            url.as_str(),
            "https://openneuro.org/crn/datasets/ds000001/files/sub-01:anat:my%20scan.nii.gz"
        );
    }

    #[test]
    fn server_path_prefix_is_kept() {
        let r = remote("https://example.org/api/", None);
        assert_eq!(r.graphql_url().as_str(), "https://example.org/api/crn/graphql");
    }

    #[test]
    fn token_only_sent_to_configured_server() {
        let r = remote("https://openneuro.org", Some("tok"));
        assert!(r.is_authenticated());
        assert!(r.authorizes(&Url::parse("https://openneuro.org/crn/graphql").unwrap()));
        assert!(!r.authorizes(&Url::parse("https://s3.amazonaws.com/bucket/file").unwrap()));
    }

    #[test]
    fn unauthenticated_client_never_authorizes() {
        let r = remote("https://openneuro.org", None);
        assert!(!r.authorizes(&Url::parse("https://openneuro.org/crn/graphql").unwrap()));
    }

    #[test]
    fn invalid_server_is_rejected() {
        assert!(HttpRemote::new(ClientConfig::new("not a url")).is_err());
        assert!(HttpRemote::new(ClientConfig::new("mailto:someone@example.org")).is_err());
    }

    #[test]
    fn split_key_separates_directory() {
        assert_eq!(split_key("sub-01/anat/T1w.nii.gz"), ("sub-01/anat", "T1w.nii.gz"));
        assert_eq!(split_key("README"), ("", "README"));
    }

    #[tokio::test]
    async fn reader_stream_chunks_and_ends() {
        let data = vec![5u8; UPLOAD_CHUNK_SIZE + 10];
        let reader: ByteReader = Box::new(std::io::Cursor::new(data.clone()));
        let chunks: Vec<Bytes> = reader_stream(reader)
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), data.len());
    }
}
