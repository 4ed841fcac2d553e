//! Background download coordinator.
//!
//! The coordinator owns download scheduling: it consults the dedup store
//! before any network access, spawns one detached task per transfer, and
//! records whole-file completions back into the store. Tasks are
//! unsupervised; they report completion and failure through console output
//! and tracing, never through shared UI state, and a process exit does not
//! wait for them.

mod error;
mod filename;

pub use error::DownloadError;
pub use filename::sanitize_filename;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::archive::ArchiveClient;
use crate::classify::TorrentDescriptor;
use crate::store::DedupStore;
use crate::torrent::TorrentResolver;

/// Lifecycle of one transfer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Bookkeeping for one transfer, owned by its background task.
#[derive(Debug)]
struct DownloadTask {
    label: String,
    state: TaskState,
}

impl DownloadTask {
    fn new(label: String) -> Self {
        Self {
            label,
            state: TaskState::Pending,
        }
    }

    fn advance(&mut self, next: TaskState) {
        debug!(task = %self.label, from = ?self.state, to = ?next, "task state change");
        self.state = next;
    }
}

/// Session-wide transfer counters, updated from concurrent tasks.
#[derive(Debug, Default)]
pub struct TransferStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl TransferStats {
    /// Number of transfers that finished successfully.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of transfers that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total transfers that reached a terminal state.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// How a download request was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The dedup store already records this file and it still exists
    /// locally; no network access happened.
    AlreadyPresent(PathBuf),
    /// A background task was spawned; the payload is the destination.
    Started(PathBuf),
}

/// Checks a user index selection against the resolved content list.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidSelection`] when the selection is empty
/// or any index falls outside `0..len`.
pub fn validate_selection(selected: &[usize], len: usize) -> Result<(), DownloadError> {
    if selected.is_empty() {
        return Err(DownloadError::invalid_selection("no indices given"));
    }
    if let Some(out_of_range) = selected.iter().find(|&&index| index >= len) {
        return Err(DownloadError::invalid_selection(format!(
            "index {out_of_range} is outside the content list (0-{})",
            len.saturating_sub(1)
        )));
    }
    Ok(())
}

/// Schedules and executes background transfers.
#[derive(Debug, Clone)]
pub struct Coordinator {
    client: ArchiveClient,
    store: DedupStore,
    resolver: Arc<dyn TorrentResolver>,
    download_dir: PathBuf,
    stats: Arc<TransferStats>,
}

impl Coordinator {
    /// Creates a coordinator writing into `download_dir`.
    #[must_use]
    pub fn new(
        client: ArchiveClient,
        store: DedupStore,
        resolver: Arc<dyn TorrentResolver>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            store,
            resolver,
            download_dir,
            stats: Arc::new(TransferStats::default()),
        }
    }

    /// Session-wide transfer counters.
    #[must_use]
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Downloads one whole file of one item, unless the dedup store records
    /// it and the recorded file still exists.
    ///
    /// The actual transfer runs detached; the returned [`Dispatch`] only
    /// says whether one was started.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Store`] if the dedup lookup fails, or
    /// [`DownloadError::Api`] if no download URL can be built.
    #[instrument(skip(self))]
    pub async fn download_whole(
        &self,
        identifier: &str,
        filename: &str,
    ) -> Result<Dispatch, DownloadError> {
        if let Some(path) = self.store.lookup(identifier, filename).await? {
            if path.exists() {
                info!(path = %path.display(), "already present, skipping");
                return Ok(Dispatch::AlreadyPresent(path));
            }
            debug!(path = %path.display(), "recorded file is gone, downloading again");
        }

        // Fail on an unbuildable URL before spawning anything.
        self.client.download_url(identifier, filename)?;

        let dest = self.download_dir.join(sanitize_filename(filename));
        let coordinator = self.clone();
        let identifier = identifier.to_owned();
        let filename = filename.to_owned();

        tokio::spawn(async move {
            let mut task = DownloadTask::new(format!("{identifier}/{filename}"));
            task.advance(TaskState::Running);
            match coordinator.transfer_whole(&identifier, &filename).await {
                Ok(path) => {
                    task.advance(TaskState::Completed);
                    coordinator.stats.increment_completed();
                    println!("saved {}", path.display());
                }
                Err(error) => {
                    task.advance(TaskState::Failed);
                    coordinator.stats.increment_failed();
                    println!("download of {identifier}/{filename} failed: {error}");
                }
            }
        });

        Ok(Dispatch::Started(dest))
    }

    /// Body of a whole-file background task: stream the bytes to disk, then
    /// record the completion. Public so callers that want to await the
    /// transfer inline can do so.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on transport, HTTP-status, or storage
    /// failure; nothing is recorded in that case.
    #[instrument(skip(self))]
    pub async fn transfer_whole(
        &self,
        identifier: &str,
        filename: &str,
    ) -> Result<PathBuf, DownloadError> {
        let url = self.client.download_url(identifier, filename)?;
        let dest = self.download_dir.join(sanitize_filename(filename));

        stream_to_file(self.client.http(), &url, &dest).await?;
        self.store.insert(identifier, filename, &dest).await?;

        info!(path = %dest.display(), "download recorded");
        Ok(dest)
    }

    /// Transfers only the selected entries of a torrent descriptor.
    ///
    /// The selection is validated against `content_len` up front; the
    /// transfer itself runs detached through the torrent capability, which
    /// excludes every unselected entry from data transfer. Torrent-selected
    /// downloads are not recorded in the dedup store.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidSelection`] for an empty or
    /// out-of-range selection, or [`DownloadError::Api`] if no descriptor
    /// URL can be built.
    #[instrument(skip(self, descriptor), fields(descriptor = %descriptor.name))]
    pub async fn download_selected(
        &self,
        identifier: &str,
        descriptor: &TorrentDescriptor,
        content_len: usize,
        selected: &[usize],
    ) -> Result<Dispatch, DownloadError> {
        validate_selection(selected, content_len)?;

        let url = self.client.download_url(identifier, &descriptor.name)?;
        let coordinator = self.clone();
        let selected = selected.to_vec();
        let label = format!("{identifier}/{}", descriptor.name);

        tokio::spawn(async move {
            let mut task = DownloadTask::new(label.clone());
            task.advance(TaskState::Running);
            match coordinator
                .resolver
                .transfer(url.as_str(), &selected, &coordinator.download_dir)
                .await
            {
                Ok(()) => {
                    task.advance(TaskState::Completed);
                    coordinator.stats.increment_completed();
                    println!("torrent transfer of {label} finished");
                }
                Err(error) => {
                    task.advance(TaskState::Failed);
                    coordinator.stats.increment_failed();
                    println!("torrent transfer of {label} failed: {error}");
                }
            }
        });

        Ok(Dispatch::Started(self.download_dir.clone()))
    }
}

/// Streams a GET response into `dest`, reporting byte progress.
async fn stream_to_file(
    http: &reqwest::Client,
    url: &Url,
    dest: &Path,
) -> Result<u64, DownloadError> {
    let response = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| DownloadError::transport(url.as_str(), e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
    }

    let bar = byte_progress(dest, response.content_length());

    let file = File::create(dest)
        .await
        .map_err(|e| DownloadError::storage(dest, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::transport(url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::storage(dest, e))?;
        written += chunk.len() as u64;
        bar.set_position(written);
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::storage(dest, e))?;
    bar.finish();

    if written == 0 {
        warn!(url = %url, "transfer completed with zero bytes");
    }

    Ok(written)
}

/// Byte-styled progress bar, or a spinner when the length is unknown.
fn byte_progress(dest: &Path, content_length: Option<u64>) -> ProgressBar {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bar = match content_length {
        Some(length) => ProgressBar::new(length),
        None => ProgressBar::new_spinner(),
    };
    bar.set_style(
        ProgressStyle::with_template("{msg} {bytes}/{total_bytes} [{bar:30}] {bytes_per_sec}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(name);
    bar
}
