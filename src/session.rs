//! Cumulative, lazily-grown search result state for one query.
//!
//! The session owns the append-only result list, the total match count
//! reported by the first page, and the last page index issued. Growth is
//! driven by scroll proximity: when the selection nears the end of the
//! loaded results, the next page is fetched and appended.
//!
//! Transport and decode failures are caught at this boundary and degrade to
//! "no new items this attempt"; the growth trigger doubles as the retry
//! mechanism. Note that the page counter advances even when a fetch fails,
//! so a transient failure permanently skips that page. This mirrors the
//! behavior the tool has always had and is kept deliberately; see DESIGN.md.

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::archive::{SearchBackend, SearchResult};

/// How close the selection must get to the end of the loaded results before
/// the next page is fetched.
pub const GROWTH_MARGIN: usize = 3;

/// Errors starting a search session.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The first page came back with zero items and a zero total. Callers
    /// should treat this as "nothing found", not as a failure dialog.
    #[error("no results for \"{query}\"")]
    Empty {
        /// The query that matched nothing.
        query: String,
    },
}

/// Outcome of one growth attempt, so callers and tests can tell a legitimate
/// end-of-results apart from a transient fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowStatus {
    /// The selection is not close enough to the end, or everything is loaded.
    NotTriggered,
    /// A page was fetched and this many items were appended.
    Grew(usize),
    /// The fetch succeeded but returned no items.
    Exhausted,
    /// The fetch failed; nothing was appended. The next growth trigger will
    /// issue the following page index.
    FetchFailed,
}

/// Search state for a single query.
#[derive(Debug)]
pub struct SearchSession {
    query: String,
    results: Vec<SearchResult>,
    total: u64,
    last_page: u32,
    page_size: u32,
}

impl SearchSession {
    /// Starts a session by fetching page 1.
    ///
    /// A transport or decode failure on the first page degrades to an empty
    /// page (logged), so it surfaces as [`SearchError::Empty`] like a query
    /// that genuinely matched nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Empty`] when nothing was found.
    #[instrument(skip(backend), fields(query = %query))]
    pub async fn start(
        backend: &dyn SearchBackend,
        query: &str,
        page_size: u32,
    ) -> Result<Self, SearchError> {
        let mut session = Self {
            query: query.to_owned(),
            results: Vec::new(),
            total: 0,
            last_page: 0,
            page_size,
        };

        match session.fetch_next(backend).await {
            Ok(page) => {
                // The total is set exactly once, from the first response.
                session.total = page.total;
                session.append(page.results);
            }
            Err(error) => {
                warn!(error = %error, "first search page failed");
            }
        }

        if session.results.is_empty() && session.total == 0 {
            return Err(SearchError::Empty {
                query: query.to_owned(),
            });
        }

        Ok(session)
    }

    /// Fetches the next page if `selected` is within [`GROWTH_MARGIN`] of the
    /// end of the loaded results and more results are reported to exist.
    #[instrument(skip(self, backend), fields(query = %self.query, selected))]
    pub async fn maybe_grow(
        &mut self,
        backend: &dyn SearchBackend,
        selected: usize,
    ) -> GrowStatus {
        let near_end = selected >= self.results.len().saturating_sub(GROWTH_MARGIN);
        if !near_end || !self.has_more() {
            return GrowStatus::NotTriggered;
        }

        match self.fetch_next(backend).await {
            Ok(page) if page.results.is_empty() => {
                debug!(page = self.last_page, "server reported end of results");
                GrowStatus::Exhausted
            }
            Ok(page) => {
                let appended = self.append(page.results);
                debug!(
                    page = self.last_page,
                    appended,
                    loaded = self.results.len(),
                    "result list grew"
                );
                GrowStatus::Grew(appended)
            }
            Err(error) => {
                // Distinct from end-of-results: this page is lost, the next
                // trigger moves on to the following index.
                warn!(
                    error = %error,
                    page = self.last_page,
                    "page fetch failed; next trigger issues the following page"
                );
                GrowStatus::FetchFailed
            }
        }
    }

    /// Issues the next page index. The counter advances before the call, so
    /// a failed page is never re-requested.
    async fn fetch_next(
        &mut self,
        backend: &dyn SearchBackend,
    ) -> Result<crate::archive::SearchPage, crate::archive::ApiError> {
        self.last_page += 1;
        backend
            .fetch_page(&self.query, self.last_page, self.page_size)
            .await
    }

    /// Appends results, truncating whatever would push the loaded count past
    /// the reported total.
    fn append(&mut self, items: Vec<SearchResult>) -> usize {
        let capacity = usize::try_from(self.total)
            .unwrap_or(usize::MAX)
            .saturating_sub(self.results.len());
        let take = items.len().min(capacity);
        self.results.extend(items.into_iter().take(take));
        take
    }

    fn has_more(&self) -> bool {
        (self.results.len() as u64) < self.total
    }

    /// The query this session was started with.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Results loaded so far, in relevance order.
    #[must_use]
    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    /// Number of results loaded so far.
    #[must_use]
    pub fn loaded(&self) -> usize {
        self.results.len()
    }

    /// Total match count reported by the first page.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Last page index issued (including failed issues).
    #[must_use]
    pub fn last_page(&self) -> u32 {
        self.last_page
    }
}

#[cfg(test)]
impl SearchSession {
    /// Test-only constructor bypassing the network.
    pub(crate) fn with_results(query: &str, results: Vec<SearchResult>, total: u64) -> Self {
        Self {
            query: query.to_owned(),
            results,
            total,
            last_page: 1,
            page_size: crate::config::DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::archive::{ApiError, SearchPage};

    /// Scripted backend: pops one canned response per fetch and records the
    /// page indices it was asked for.
    struct StubBackend {
        responses: Mutex<VecDeque<Result<SearchPage, ApiError>>>,
        pages_seen: Mutex<Vec<u32>>,
    }

    impl StubBackend {
        fn new(responses: Vec<Result<SearchPage, ApiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                pages_seen: Mutex::new(Vec::new()),
            }
        }

        fn pages_seen(&self) -> Vec<u32> {
            self.pages_seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for StubBackend {
        async fn fetch_page(
            &self,
            _query: &str,
            page: u32,
            _rows: u32,
        ) -> Result<SearchPage, ApiError> {
            self.pages_seen.lock().unwrap().push(page);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(SearchPage {
                        results: Vec::new(),
                        total: 0,
                    })
                })
        }
    }

    fn docs(count: usize, start: usize) -> Vec<SearchResult> {
        (start..start + count)
            .map(|index| SearchResult {
                identifier: format!("item-{index}"),
                title: Some(format!("Title {index}")),
                creator: Some("Somebody".to_string()),
                downloads: Some(1),
            })
            .collect()
    }

    fn page(count: usize, start: usize, total: u64) -> Result<SearchPage, ApiError> {
        Ok(SearchPage {
            results: docs(count, start),
            total,
        })
    }

    fn failed_page() -> Result<SearchPage, ApiError> {
        Err(ApiError::HttpStatus {
            endpoint: "advancedsearch.php".to_string(),
            status: 503,
        })
    }

    #[tokio::test]
    async fn test_start_loads_first_page() {
        let backend = StubBackend::new(vec![page(20, 0, 45)]);
        let session = SearchSession::start(&backend, "bach", 20).await.unwrap();
        assert_eq!(session.loaded(), 20);
        assert_eq!(session.total(), 45);
        assert_eq!(session.last_page(), 1);
    }

    #[tokio::test]
    async fn test_start_empty_result() {
        let backend = StubBackend::new(vec![page(0, 0, 0)]);
        let error = SearchSession::start(&backend, "zxqj", 20).await.unwrap_err();
        assert!(matches!(error, SearchError::Empty { .. }));
    }

    #[tokio::test]
    async fn test_start_degrades_fetch_failure_to_empty() {
        let backend = StubBackend::new(vec![failed_page()]);
        let error = SearchSession::start(&backend, "bach", 20).await.unwrap_err();
        assert!(matches!(error, SearchError::Empty { .. }));
    }

    #[tokio::test]
    async fn test_growth_scenario_45_results_in_three_pages() {
        let backend = StubBackend::new(vec![
            page(20, 0, 45),
            page(20, 20, 45),
            page(5, 40, 45),
        ]);
        let mut session = SearchSession::start(&backend, "bach", 20).await.unwrap();
        assert_eq!(session.loaded(), 20);

        // Not yet near the boundary.
        assert_eq!(
            session.maybe_grow(&backend, 16).await,
            GrowStatus::NotTriggered
        );
        assert_eq!(session.loaded(), 20);

        // Index 17 is within the margin of 20 loaded results.
        assert_eq!(session.maybe_grow(&backend, 17).await, GrowStatus::Grew(20));
        assert_eq!(session.loaded(), 40);

        assert_eq!(
            session.maybe_grow(&backend, 36).await,
            GrowStatus::NotTriggered
        );
        assert_eq!(session.maybe_grow(&backend, 37).await, GrowStatus::Grew(5));
        assert_eq!(session.loaded(), 45);

        // Everything is loaded: even the last index triggers nothing.
        assert_eq!(
            session.maybe_grow(&backend, 44).await,
            GrowStatus::NotTriggered
        );
        assert_eq!(backend.pages_seen(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_page_is_skipped_not_retried() {
        let backend = StubBackend::new(vec![page(20, 0, 45), failed_page(), page(20, 40, 45)]);
        let mut session = SearchSession::start(&backend, "bach", 20).await.unwrap();

        assert_eq!(
            session.maybe_grow(&backend, 19).await,
            GrowStatus::FetchFailed
        );
        assert_eq!(session.loaded(), 20);
        assert_eq!(session.total(), 45);

        // The retry (same growth trigger) issues page 3, never page 2 again.
        assert_eq!(session.maybe_grow(&backend, 19).await, GrowStatus::Grew(20));
        assert_eq!(backend.pages_seen(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_total_is_set_once() {
        let mut second = page(20, 20, 45).unwrap();
        second.total = 999;
        let backend = StubBackend::new(vec![page(20, 0, 45), Ok(second)]);
        let mut session = SearchSession::start(&backend, "bach", 20).await.unwrap();

        session.maybe_grow(&backend, 19).await;
        assert_eq!(session.total(), 45);
    }

    #[tokio::test]
    async fn test_loaded_never_exceeds_total() {
        // A misbehaving server hands back more items than its own total.
        let backend = StubBackend::new(vec![page(5, 0, 2)]);
        let session = SearchSession::start(&backend, "bach", 20).await.unwrap();
        assert_eq!(session.loaded(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_when_server_returns_empty_page() {
        let backend = StubBackend::new(vec![page(20, 0, 45), page(0, 20, 45)]);
        let mut session = SearchSession::start(&backend, "bach", 20).await.unwrap();
        assert_eq!(
            session.maybe_grow(&backend, 19).await,
            GrowStatus::Exhausted
        );
        assert_eq!(session.loaded(), 20);
    }
}
