//! Optional torrent capability: descriptor resolution and selective transfer.
//!
//! The capability is decided at build time by the `torrent` cargo feature
//! and selected exactly once at process start via [`torrent_resolver`]. Call
//! sites always talk to the [`TorrentResolver`] trait; a build without the
//! feature gets [`UnavailableResolver`], whose every request fails fast with
//! [`ResolveError::Unavailable`] and performs no network access.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "torrent")]
mod rqbit;
#[cfg(feature = "torrent")]
pub use rqbit::RqbitResolver;

/// One file inside a torrent descriptor's content list.
///
/// Exists only for the duration of a selection sub-loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentContentEntry {
    /// Position within the torrent's file list.
    pub index: usize,
    /// Path relative to the torrent root.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
}

/// Errors from torrent operations. None of these are retried; callers
/// surface the message and return to the prior menu.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Torrent support is not compiled into this build.
    #[error("torrent support is not available in this build")]
    Unavailable,

    /// The descriptor bytes could not be fetched.
    #[error("failed to fetch torrent descriptor {url}: {reason}")]
    Fetch {
        /// The descriptor URL.
        url: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The descriptor bytes could not be parsed.
    #[error("failed to parse torrent descriptor {url}: {reason}")]
    Parse {
        /// The descriptor URL.
        url: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The selective transfer failed after the descriptor was accepted.
    #[error("torrent transfer failed: {reason}")]
    Transfer {
        /// Human-readable cause.
        reason: String,
    },
}

/// Capability interface for torrent descriptors.
#[async_trait]
pub trait TorrentResolver: Send + Sync + fmt::Debug {
    /// Lists the files described by the descriptor at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unavailable`], [`ResolveError::Fetch`], or
    /// [`ResolveError::Parse`].
    async fn resolve(&self, url: &str) -> Result<Vec<TorrentContentEntry>, ResolveError>;

    /// Transfers only the `selected` entries into `dest`, polling aggregate
    /// progress until the transfer completes or fails. Entries outside the
    /// selection are excluded from data transfer entirely.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unavailable`], [`ResolveError::Fetch`], or
    /// [`ResolveError::Transfer`].
    async fn transfer(
        &self,
        url: &str,
        selected: &[usize],
        dest: &Path,
    ) -> Result<(), ResolveError>;
}

/// Absent-capability implementation.
#[derive(Debug, Default)]
pub struct UnavailableResolver;

#[async_trait]
impl TorrentResolver for UnavailableResolver {
    async fn resolve(&self, _url: &str) -> Result<Vec<TorrentContentEntry>, ResolveError> {
        Err(ResolveError::Unavailable)
    }

    async fn transfer(
        &self,
        _url: &str,
        _selected: &[usize],
        _dest: &Path,
    ) -> Result<(), ResolveError> {
        Err(ResolveError::Unavailable)
    }
}

/// Selects the capability implementation for this build.
///
/// `http` is the shared HTTP client used to fetch descriptor bytes; the
/// absent implementation ignores it.
#[must_use]
pub fn torrent_resolver(http: reqwest::Client) -> Arc<dyn TorrentResolver> {
    #[cfg(feature = "torrent")]
    {
        Arc::new(RqbitResolver::new(http))
    }
    #[cfg(not(feature = "torrent"))]
    {
        let _ = http;
        Arc::new(UnavailableResolver)
    }
}
