//! librqbit-backed torrent capability.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use indicatif::{ProgressBar, ProgressStyle};
use librqbit::{AddTorrent, AddTorrentOptions, Session, torrent_from_bytes};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use super::{ResolveError, TorrentContentEntry, TorrentResolver};

/// Timeout for fetching a descriptor (they are small metadata files).
const DESCRIPTOR_TIMEOUT_SECS: u64 = 30;

/// How often aggregate transfer progress is polled.
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Resolver backed by librqbit for both metadata parsing and transport.
#[derive(Debug)]
pub struct RqbitResolver {
    http: reqwest::Client,
}

impl RqbitResolver {
    /// Creates a resolver sharing the given HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Fetches descriptor bytes through a transient on-disk file.
    ///
    /// The temp file is removed when the guard drops, on success and on
    /// every failure path alike.
    async fn fetch_descriptor(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let fetch_error = |reason: String| ResolveError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(DESCRIPTOR_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let holding = NamedTempFile::new().map_err(|e| fetch_error(e.to_string()))?;
        tokio::fs::write(holding.path(), &body)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let data = tokio::fs::read(holding.path())
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        debug!(url, bytes = data.len(), "descriptor fetched");
        Ok(data)
    }
}

#[async_trait]
impl TorrentResolver for RqbitResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, url: &str) -> Result<Vec<TorrentContentEntry>, ResolveError> {
        let data = self.fetch_descriptor(url).await?;

        let meta = torrent_from_bytes(&data).map_err(|e| ResolveError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let info = &meta.info.data;

        let mut entries = Vec::new();
        if let Some(files) = &info.files {
            // Multi-file torrent: one entry per listed file.
            for (index, file) in files.iter().enumerate() {
                let path = file
                    .path
                    .iter()
                    .map(|segment| String::from_utf8_lossy(segment.0).to_string())
                    .collect::<Vec<_>>()
                    .join("/");
                entries.push(TorrentContentEntry {
                    index,
                    path,
                    size: file.length,
                });
            }
        } else {
            // Single-file torrent: the name is the whole content list.
            let path = info
                .name
                .as_ref()
                .map(|name| String::from_utf8_lossy(name.0).to_string())
                .unwrap_or_default();
            entries.push(TorrentContentEntry {
                index: 0,
                path,
                size: info.length.unwrap_or(0),
            });
        }

        Ok(entries)
    }

    #[instrument(skip(self, selected), fields(selected = selected.len()))]
    async fn transfer(
        &self,
        url: &str,
        selected: &[usize],
        dest: &Path,
    ) -> Result<(), ResolveError> {
        let transfer_error = |reason: String| ResolveError::Transfer { reason };

        let data = self.fetch_descriptor(url).await?;

        let session = Session::new(dest.to_path_buf())
            .await
            .map_err(|e| transfer_error(e.to_string()))?;

        let response = session
            .add_torrent(
                AddTorrent::TorrentFileBytes(Bytes::from(data)),
                Some(AddTorrentOptions {
                    // Everything outside the selection is excluded from data
                    // transfer entirely.
                    only_files: Some(selected.to_vec()),
                    overwrite: true,
                    ..AddTorrentOptions::default()
                }),
            )
            .await
            .map_err(|e| transfer_error(e.to_string()))?;

        let handle = response
            .into_handle()
            .ok_or_else(|| transfer_error("torrent was not added as a live transfer".into()))?;

        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{msg} {bytes}/{total_bytes} [{bar:30}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message("torrent");

        loop {
            tokio::time::sleep(PROGRESS_POLL_INTERVAL).await;
            let stats = handle.stats();

            if stats.total_bytes > 0 {
                bar.set_length(stats.total_bytes);
                bar.set_position(stats.progress_bytes);
            }
            if stats.finished {
                break;
            }
            if matches!(stats.state, librqbit::TorrentStatsState::Error) {
                bar.abandon();
                session.stop().await;
                return Err(transfer_error("torrent entered error state".into()));
            }
        }

        bar.finish();
        session.stop().await;
        Ok(())
    }
}
