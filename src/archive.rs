//! Stateless gateway to the archive's search, metadata, and download API.
//!
//! All functions here issue a single HTTP request and decode the response;
//! no session state lives in this module. The [`SearchBackend`] trait is the
//! seam the [`crate::session`] state machine depends on, so pagination logic
//! can be tested against a stub without a network.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://archive.org";

/// Collections searched by every query.
const COLLECTIONS: &str = "etree OR audio_music OR opensource_audio";

/// Timeout for search and metadata calls. Downloads stream for much longer
/// and carry no whole-request timeout.
const API_TIMEOUT_SECS: u64 = 10;

/// Connect timeout for all requests.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors from archive API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure (DNS, connection refused, TLS, timeout).
    #[error("network error calling {endpoint}: {source}")]
    Transport {
        /// The endpoint that failed.
        endpoint: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {endpoint}")]
    HttpStatus {
        /// The endpoint that failed.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body did not match the expected shape.
    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        /// The endpoint that failed.
        endpoint: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// A request URL could not be built from the configured base.
    #[error("cannot build request URL for {endpoint}")]
    InvalidUrl {
        /// The endpoint that failed.
        endpoint: String,
    },
}

impl ApiError {
    fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            source,
        }
    }

    fn http_status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            endpoint: endpoint.into(),
            status,
        }
    }

    fn decode(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            source,
        }
    }
}

/// One catalog entry from a search response.
///
/// Immutable once fetched; owned by the session's result list.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    /// Opaque primary key in the remote system.
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    /// The API returns either a single string or a list of names here.
    #[serde(default, deserialize_with = "creator_field")]
    pub creator: Option<String>,
    /// Popularity score used for the default sort order.
    #[serde(default)]
    pub downloads: Option<u64>,
}

impl SearchResult {
    /// Title, or a placeholder for untitled items.
    #[must_use]
    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }

    /// Creator, or a placeholder for unattributed items.
    #[must_use]
    pub fn creator_or_default(&self) -> &str {
        self.creator.as_deref().unwrap_or("unknown")
    }
}

/// One page of search results plus the reported total match count.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub total: u64,
}

/// One entry of an item's raw file listing, as reported by the metadata call.
///
/// Sourced fresh per item visit, never cached across sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub format: Option<String>,
    /// The API reports sizes as either a JSON number or a decimal string.
    #[serde(default, deserialize_with = "size_field")]
    pub size: u64,
    #[serde(default)]
    pub source: Option<String>,
}

impl RawFile {
    /// Whether this file is an original (non-derivative) asset.
    #[must_use]
    pub fn is_original(&self) -> bool {
        self.source.as_deref() == Some("original")
    }
}

fn creator_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(|value| match value {
        OneOrMany::One(name) => name,
        OneOrMany::Many(names) => names.join(", "),
    }))
}

fn size_field<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(u64),
        Text(String),
    }

    Ok(
        match Option::<NumberOrText>::deserialize(deserializer)? {
            Some(NumberOrText::Number(size)) => size,
            Some(NumberOrText::Text(text)) => text.trim().parse().unwrap_or(0),
            None => 0,
        },
    )
}

#[derive(Deserialize)]
struct SearchEnvelope {
    response: SearchBody,
}

#[derive(Deserialize)]
struct SearchBody {
    #[serde(default)]
    docs: Vec<SearchResult>,
    #[serde(rename = "numFound", default)]
    num_found: u64,
}

#[derive(Deserialize)]
struct MetadataEnvelope {
    #[serde(default)]
    files: Vec<RawFile>,
}

/// Paginated-search seam consumed by [`crate::session::SearchSession`].
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fetches one page of results for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport, HTTP-status, or decode failure.
    async fn fetch_page(&self, query: &str, page: u32, rows: u32) -> Result<SearchPage, ApiError>;
}

/// HTTP client for the archive API.
///
/// Designed to be created once and reused; all state is the connection pool
/// inside [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    http: reqwest::Client,
    base: Url,
}

impl Default for ArchiveClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveClient {
    /// Creates a client against the production API host.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let base = Url::parse(DEFAULT_BASE_URL).expect("static base URL is valid");
        Self::with_base_url(base)
    }

    /// Creates a client against an arbitrary base URL (used by tests).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_base_url(base: Url) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("cratedigger/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { http, base }
    }

    /// Returns the shared HTTP client, for collaborators that stream bytes
    /// directly (download coordinator, torrent resolver).
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Searches the fixed audio collections by title/creator.
    ///
    /// Results are sorted by popularity (downloads) descending; `page` is
    /// 1-based.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport, HTTP-status, or decode failure.
    #[instrument(skip(self), fields(query = %query, page, rows))]
    pub async fn search(&self, query: &str, page: u32, rows: u32) -> Result<SearchPage, ApiError> {
        let endpoint = "advancedsearch.php";
        let url = self
            .base
            .join(endpoint)
            .map_err(|_| ApiError::InvalidUrl {
                endpoint: endpoint.to_string(),
            })?;
        let q = format!("(collection:({COLLECTIONS})) AND (title:({query}) OR creator:({query}))");

        let response = self
            .http
            .get(url)
            .query(&[
                ("q", q.as_str()),
                ("fl[]", "identifier"),
                ("fl[]", "title"),
                ("fl[]", "creator"),
                ("fl[]", "downloads"),
                ("sort[]", "downloads desc"),
                ("rows", &rows.to_string()),
                ("page", &page.to_string()),
                ("output", "json"),
            ])
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::http_status(endpoint, status.as_u16()));
        }

        let envelope: SearchEnvelope = response
            .json()
            .await
            .map_err(|e| ApiError::decode(endpoint, e))?;

        debug!(
            returned = envelope.response.docs.len(),
            total = envelope.response.num_found,
            "search page fetched"
        );

        Ok(SearchPage {
            results: envelope.response.docs,
            total: envelope.response.num_found,
        })
    }

    /// Fetches the full raw file listing for one archive item.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport, HTTP-status, or decode failure.
    #[instrument(skip(self))]
    pub async fn file_listing(&self, identifier: &str) -> Result<Vec<RawFile>, ApiError> {
        let endpoint = format!("metadata/{identifier}");
        let url = self.base.join(&endpoint).map_err(|_| ApiError::InvalidUrl {
            endpoint: endpoint.clone(),
        })?;

        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| ApiError::transport(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::http_status(&endpoint, status.as_u16()));
        }

        let envelope: MetadataEnvelope = response
            .json()
            .await
            .map_err(|e| ApiError::decode(&endpoint, e))?;

        Ok(envelope.files)
    }

    /// Builds the direct-download URL for one file of one item.
    ///
    /// The filename lands in its own path segment, so characters that need
    /// escaping are percent-encoded by the URL type.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the base URL cannot carry path
    /// segments.
    pub fn download_url(&self, identifier: &str, filename: &str) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl {
                endpoint: format!("download/{identifier}/{filename}"),
            })?
            .extend(["download", identifier, filename]);
        Ok(url)
    }
}

#[async_trait]
impl SearchBackend for ArchiveClient {
    async fn fetch_page(&self, query: &str, page: u32, rows: u32) -> Result<SearchPage, ApiError> {
        self.search(query, page, rows).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_search_result_placeholders() {
        let result: SearchResult = serde_json::from_str(r#"{"identifier": "x"}"#).unwrap();
        assert_eq!(result.title_or_default(), "(untitled)");
        assert_eq!(result.creator_or_default(), "unknown");
        assert_eq!(result.downloads, None);
    }

    #[test]
    fn test_creator_accepts_string_or_list() {
        let single: SearchResult =
            serde_json::from_str(r#"{"identifier": "x", "creator": "Bach"}"#).unwrap();
        assert_eq!(single.creator.as_deref(), Some("Bach"));

        let many: SearchResult =
            serde_json::from_str(r#"{"identifier": "x", "creator": ["Bach", "Gould"]}"#).unwrap();
        assert_eq!(many.creator.as_deref(), Some("Bach, Gould"));
    }

    #[test]
    fn test_raw_file_size_accepts_string_or_number() {
        let text: RawFile =
            serde_json::from_str(r#"{"name": "a.mp3", "size": "3145728"}"#).unwrap();
        assert_eq!(text.size, 3_145_728);

        let number: RawFile = serde_json::from_str(r#"{"name": "a.mp3", "size": 42}"#).unwrap();
        assert_eq!(number.size, 42);

        let missing: RawFile = serde_json::from_str(r#"{"name": "a.mp3"}"#).unwrap();
        assert_eq!(missing.size, 0);

        let junk: RawFile =
            serde_json::from_str(r#"{"name": "a.mp3", "size": "lots"}"#).unwrap();
        assert_eq!(junk.size, 0);
    }

    #[test]
    fn test_raw_file_originality_flag() {
        let original: RawFile =
            serde_json::from_str(r#"{"name": "a.mp3", "source": "original"}"#).unwrap();
        assert!(original.is_original());

        let derivative: RawFile =
            serde_json::from_str(r#"{"name": "a.mp3", "source": "derivative"}"#).unwrap();
        assert!(!derivative.is_original());

        let unmarked: RawFile = serde_json::from_str(r#"{"name": "a.mp3"}"#).unwrap();
        assert!(!unmarked.is_original());
    }

    #[test]
    fn test_download_url_escapes_filename() {
        let client = ArchiveClient::new();
        let url = client.download_url("gd1977-05-08", "track 01.flac").unwrap();
        assert_eq!(
            url.as_str(),
            "https://archive.org/download/gd1977-05-08/track%2001.flac"
        );
    }
}
