//! Feed loader: one page at a time, one fetch in flight

use crate::{FeedError, Result};
use futures::Stream;
use haven_core::{Error, FeedCursor, FeedItem, FeedQuery, SharedStore};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where a loader is in its page sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoaderState {
    /// Ready to fetch the next page
    Idle,
    /// A fetch is in flight
    Loading,
    /// An empty page came back; nothing more until reset
    Exhausted,
    /// The last fetch failed; the cursor is where it was
    Errored,
}

impl LoaderState {
    pub fn can_load(self) -> bool {
        matches!(self, LoaderState::Idle | LoaderState::Errored)
    }
}

#[derive(Debug)]
struct Position {
    query: FeedQuery,
    cursor: Option<FeedCursor>,
    state: LoaderState,
    generation: u64,
}

/// Loads a feed page by page from a document store.
///
/// All methods take `&self`; state and cursor live behind a mutex that is
/// never held across an await. A separate fetch permit is held across the
/// store call, so one loader never has two queries outstanding, even when a
/// `reset` lands while an older fetch is still in flight.
pub struct FeedLoader {
    store: SharedStore,
    position: Mutex<Position>,
    fetch: tokio::sync::Mutex<()>,
}

/// Puts an abandoned fetch back to `Idle` if the caller drops the future
struct InFlight<'a> {
    loader: &'a FeedLoader,
    generation: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut pos = self.loader.lock();
        if pos.generation == self.generation && pos.state == LoaderState::Loading {
            tracing::debug!("Fetch dropped before completion, generation {}", self.generation);
            pos.state = LoaderState::Idle;
        }
    }
}

impl FeedLoader {
    pub fn new(store: SharedStore, query: FeedQuery) -> Self {
        Self {
            store,
            position: Mutex::new(Position {
                query,
                cursor: None,
                state: LoaderState::Idle,
                generation: 0,
            }),
            fetch: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Position> {
        self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LoaderState {
        self.lock().state
    }

    pub fn query(&self) -> FeedQuery {
        self.lock().query.clone()
    }

    pub fn cursor(&self) -> Option<FeedCursor> {
        self.lock().cursor.clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Switch to `query` and start from the top.
    ///
    /// Any fetch still in flight belongs to the previous generation and its
    /// result will be discarded.
    pub fn reset(&self, query: FeedQuery) {
        let mut pos = self.lock();
        pos.generation += 1;
        pos.query = query;
        pos.cursor = None;
        pos.state = LoaderState::Idle;
        tracing::debug!("Feed reset to {} (generation {})", pos.query, pos.generation);
    }

    /// Fetch the next page.
    ///
    /// An empty page marks the feed exhausted; later calls return empty
    /// without contacting the store until [`reset`](Self::reset).
    pub async fn load_next_page(&self) -> Result<Vec<FeedItem>> {
        let generation = {
            let mut pos = self.lock();
            match pos.state {
                LoaderState::Loading => {
                    return Err(FeedError::StateViolation {
                        generation: pos.generation,
                    })
                }
                LoaderState::Exhausted => return Ok(Vec::new()),
                LoaderState::Idle | LoaderState::Errored => {}
            }
            pos.state = LoaderState::Loading;
            pos.generation
        };

        let mut guard = InFlight {
            loader: self,
            generation,
            settled: false,
        };

        // Queued behind a fetch from an earlier generation, if one is still out
        let _permit = self.fetch.lock().await;

        let (query, cursor) = {
            let pos = self.lock();
            if pos.generation != generation {
                guard.settled = true;
                return Err(FeedError::Superseded {
                    issued: generation,
                    current: pos.generation,
                });
            }
            (pos.query.clone(), pos.cursor.clone())
        };

        let outcome = self.store.query(&query, cursor.as_ref()).await;
        guard.settled = true;

        let mut pos = self.lock();
        if pos.generation != generation {
            tracing::debug!(
                "Discarding page for generation {} (now {})",
                generation,
                pos.generation
            );
            return Err(FeedError::Superseded {
                issued: generation,
                current: pos.generation,
            });
        }

        let items = match outcome {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("Fetching {} failed: {}", query, e);
                pos.state = LoaderState::Errored;
                return Err(FeedError::Query(e));
            }
        };

        let Some(last) = items.last() else {
            tracing::debug!("Feed {} exhausted", query);
            pos.state = LoaderState::Exhausted;
            return Ok(items);
        };

        match FeedCursor::after(&query, last) {
            Some(next) => {
                pos.cursor = Some(next);
                pos.state = LoaderState::Idle;
                tracing::debug!("Loaded {} items from {}", items.len(), query);
                Ok(items)
            }
            None => {
                pos.state = LoaderState::Errored;
                Err(FeedError::Query(Error::InvalidRecord(format!(
                    "item {} has no '{}' to page on",
                    last.id,
                    query.order_field()
                ))))
            }
        }
    }

    /// Restart the current query and fetch its first page
    pub async fn reload(&self) -> Result<Vec<FeedItem>> {
        self.reset(self.query());
        self.load_next_page().await
    }

    /// Lazy sequence of the remaining pages.
    ///
    /// Ends after the first empty page; an error is yielded once and ends
    /// the sequence (the loader stays `Errored` and can be resumed).
    pub fn pages(&self) -> impl Stream<Item = Result<Vec<FeedItem>>> + '_ {
        futures::stream::unfold(false, move |done| async move {
            if done {
                return None;
            }
            match self.load_next_page().await {
                Ok(page) if page.is_empty() => None,
                Ok(page) => Some((Ok(page), false)),
                Err(e) => Some((Err(e), true)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use futures::StreamExt;
    use haven_core::{
        DocumentStore, EqualityFilter, Fields, OrderDirection, Record, CREATED_AT,
    };
    use haven_docstore::MemoryStore;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    /// Holds every query until a permit is released
    struct GatedStore {
        inner: MemoryStore,
        gate: Semaphore,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GatedStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                gate: Semaphore::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        /// Most queries that were ever waiting in the store at once
        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        fn release(&self) {
            self.gate.add_permits(1);
        }
    }

    #[async_trait]
    impl DocumentStore for GatedStore {
        fn name(&self) -> &str {
            "gated"
        }

        async fn query(
            &self,
            query: &FeedQuery,
            after: Option<&FeedCursor>,
        ) -> haven_core::Result<Vec<FeedItem>> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);

            let permit = self.gate.acquire().await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            permit
                .map_err(|e| Error::Unavailable(e.to_string()))?
                .forget();
            self.inner.query(query, after).await
        }

        async fn increment(&self, c: &str, id: &str, n: &str, d: i64) -> haven_core::Result<()> {
            self.inner.increment(c, id, n, d).await
        }

        async fn insert(&self, c: &str, r: Record) -> haven_core::Result<String> {
            self.inner.insert(c, r).await
        }

        async fn get(&self, c: &str, id: &str) -> haven_core::Result<Option<FeedItem>> {
            self.inner.get(c, id).await
        }

        async fn update(&self, c: &str, id: &str, f: Fields) -> haven_core::Result<()> {
            self.inner.update(c, id, f).await
        }

        async fn delete(&self, c: &str, id: &str) -> haven_core::Result<()> {
            self.inner.delete(c, id).await
        }

        async fn count(&self, c: &str, f: Option<&EqualityFilter>) -> haven_core::Result<u64> {
            self.inner.count(c, f).await
        }
    }

    fn by_date(page_size: usize) -> FeedQuery {
        FeedQuery::new("forum_posts", CREATED_AT, OrderDirection::Descending, page_size).unwrap()
    }

    async fn store_with_posts(n: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for i in 0..n {
            store
                .insert("forum_posts", Record::new().with("title", format!("post {}", i)))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_twenty_five_items_in_pages_of_ten() {
        let store = store_with_posts(25).await;
        let loader = FeedLoader::new(store.clone(), by_date(10));

        let mut sizes = Vec::new();
        for _ in 0..4 {
            sizes.push(loader.load_next_page().await.unwrap().len());
        }

        assert_eq!(sizes, vec![10, 10, 5, 0]);
        assert_eq!(loader.state(), LoaderState::Exhausted);
        assert_eq!(store.query_count(), 4);

        // Terminal: no more store traffic
        assert!(loader.load_next_page().await.unwrap().is_empty());
        assert!(loader.load_next_page().await.unwrap().is_empty());
        assert_eq!(store.query_count(), 4);
    }

    #[tokio::test]
    async fn test_pages_cover_ties_without_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let base = Utc::now();
        for i in 0..17 {
            // Many items share a like count and some share a timestamp
            let item = FeedItem::new(format!("p{:02}", i))
                .with_created_at(base + Duration::seconds((i / 3) as i64))
                .with("likes", (i % 4) as i64);
            store.put("forum_posts", item);
        }

        let query = FeedQuery::new("forum_posts", "likes", OrderDirection::Descending, 3).unwrap();
        let loader = FeedLoader::new(store.clone(), query.clone());

        let mut seen = Vec::new();
        loop {
            let page = loader.load_next_page().await.unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 3);
            seen.extend(page);
        }

        let mut expected: Vec<FeedItem> = store.snapshot().collections["forum_posts"].clone();
        expected.sort_by(|a, b| query.compare(a, b));

        let ids: Vec<_> = seen.iter().map(|i| i.id.clone()).collect();
        let expected_ids: Vec<_> = expected.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, expected_ids);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 17);
    }

    #[tokio::test]
    async fn test_failure_keeps_cursor_and_retry_resumes() {
        let store = store_with_posts(6).await;
        let loader = FeedLoader::new(store.clone(), by_date(4));

        let first = loader.load_next_page().await.unwrap();
        let cursor = loader.cursor();

        store.fail_next_queries(1);
        let err = loader.load_next_page().await.unwrap_err();
        assert!(matches!(err, FeedError::Query(_)));
        assert!(err.is_recoverable());
        assert_eq!(loader.state(), LoaderState::Errored);
        assert_eq!(loader.cursor(), cursor);

        let second = loader.load_next_page().await.unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|i| !first.contains(i)));
        assert_eq!(loader.state(), LoaderState::Idle);
    }

    #[tokio::test]
    async fn test_reset_from_any_state() {
        let store = store_with_posts(2).await;
        let loader = FeedLoader::new(store.clone(), by_date(5));

        loader.load_next_page().await.unwrap();
        loader.load_next_page().await.unwrap();
        assert_eq!(loader.state(), LoaderState::Exhausted);

        loader.reset(by_date(1));
        assert_eq!(loader.state(), LoaderState::Idle);
        assert!(loader.cursor().is_none());
        assert_eq!(loader.generation(), 1);

        store.fail_next_queries(1);
        assert!(loader.load_next_page().await.is_err());
        loader.reset(by_date(1));
        assert_eq!(loader.state(), LoaderState::Idle);
        assert_eq!(loader.load_next_page().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_call_while_loading_is_rejected() {
        let inner = MemoryStore::new();
        inner.put("forum_posts", FeedItem::new("a").with_created_at(Utc::now()));
        let store = Arc::new(GatedStore::new(inner));
        let loader = FeedLoader::new(store.clone(), by_date(10));

        let (first, second) = tokio::join!(loader.load_next_page(), async {
            let second = loader.load_next_page().await;
            store.release();
            second
        });

        assert_eq!(first.unwrap().len(), 1);
        assert!(matches!(second, Err(FeedError::StateViolation { .. })));
        assert_eq!(store.inner.query_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_response_discarded_after_reset() {
        let inner = MemoryStore::new();
        let now = Utc::now();
        inner.put(
            "resources",
            FeedItem::new("v1").with_created_at(now).with("type", "video"),
        );
        inner.put(
            "resources",
            FeedItem::new("a1")
                .with_created_at(now + Duration::seconds(1))
                .with("type", "audio"),
        );
        let store = Arc::new(GatedStore::new(inner));

        let all = FeedQuery::new("resources", CREATED_AT, OrderDirection::Descending, 10).unwrap();
        let videos = all.clone().filtered("type", "video");
        let loader = FeedLoader::new(store.clone(), all);

        let (stale, _) = tokio::join!(loader.load_next_page(), async {
            loader.reset(videos.clone());
            store.release();
        });

        let err = stale.unwrap_err();
        assert!(err.is_benign());
        assert!(matches!(err, FeedError::Superseded { issued: 0, current: 1 }));
        assert_eq!(loader.state(), LoaderState::Idle);
        assert!(loader.cursor().is_none());
        assert_eq!(loader.query(), videos);

        store.release();
        let page = loader.load_next_page().await.unwrap();
        let ids: Vec<_> = page.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["v1"]);
    }

    #[tokio::test]
    async fn test_fetch_after_reset_waits_for_stale_fetch() {
        let inner = MemoryStore::new();
        let now = Utc::now();
        inner.put(
            "resources",
            FeedItem::new("v1").with_created_at(now).with("type", "video"),
        );
        inner.put(
            "resources",
            FeedItem::new("a1")
                .with_created_at(now + Duration::seconds(1))
                .with("type", "audio"),
        );
        let store = Arc::new(GatedStore::new(inner));

        let all = FeedQuery::new("resources", CREATED_AT, OrderDirection::Descending, 10).unwrap();
        let videos = all.clone().filtered("type", "video");
        let loader = FeedLoader::new(store.clone(), all);

        let (stale, fresh) = tokio::join!(loader.load_next_page(), async {
            loader.reset(videos.clone());

            let fresh = loader.load_next_page();
            tokio::pin!(fresh);
            assert!(futures::poll!(fresh.as_mut()).is_pending());
            assert_eq!(loader.state(), LoaderState::Loading);

            // Same generation, still loading
            assert!(matches!(
                loader.load_next_page().await,
                Err(FeedError::StateViolation { generation: 1 })
            ));

            store.release();
            store.release();
            fresh.await
        });

        assert!(matches!(stale, Err(FeedError::Superseded { issued: 0, current: 1 })));
        let ids: Vec<_> = fresh.unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["v1"]);

        assert_eq!(store.peak(), 1);
        assert_eq!(store.inner.query_count(), 2);
        assert_eq!(loader.state(), LoaderState::Idle);
    }

    #[tokio::test]
    async fn test_reset_while_queued_skips_the_query() {
        let inner = MemoryStore::new();
        inner.put("forum_posts", FeedItem::new("a").with_created_at(Utc::now()));
        let store = Arc::new(GatedStore::new(inner));
        let loader = FeedLoader::new(store.clone(), by_date(10));

        let (stale, queued) = tokio::join!(loader.load_next_page(), async {
            loader.reset(by_date(10));
            let queued = loader.load_next_page();
            tokio::pin!(queued);
            assert!(futures::poll!(queued.as_mut()).is_pending());

            loader.reset(by_date(5));
            store.release();
            queued.await
        });

        assert!(matches!(stale, Err(FeedError::Superseded { issued: 0, current: 2 })));
        assert!(matches!(queued, Err(FeedError::Superseded { issued: 1, current: 2 })));
        assert_eq!(store.inner.query_count(), 1);
        assert_eq!(loader.state(), LoaderState::Idle);

        store.release();
        assert_eq!(loader.load_next_page().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_fetch_returns_to_idle() {
        let inner = MemoryStore::new();
        inner.put("forum_posts", FeedItem::new("a").with_created_at(Utc::now()));
        let store = Arc::new(GatedStore::new(inner));
        let loader = FeedLoader::new(store.clone(), by_date(10));

        {
            let fetch = loader.load_next_page();
            tokio::pin!(fetch);
            assert!(futures::poll!(fetch.as_mut()).is_pending());
            assert_eq!(loader.state(), LoaderState::Loading);
        }

        assert_eq!(loader.state(), LoaderState::Idle);
        store.release();
        assert_eq!(loader.load_next_page().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_starts_over() {
        let store = store_with_posts(3).await;
        let loader = FeedLoader::new(store.clone(), by_date(2));

        loader.load_next_page().await.unwrap();
        store
            .insert("forum_posts", Record::new().with("title", "newest"))
            .await
            .unwrap();

        let page = loader.reload().await.unwrap();
        assert_eq!(page[0].text("title"), Some("newest"));
        assert_eq!(loader.generation(), 1);
    }

    #[tokio::test]
    async fn test_page_stream_collects_everything() {
        let store = store_with_posts(7).await;
        let loader = FeedLoader::new(store.clone(), by_date(3));

        let pages: Vec<_> = loader.pages().collect().await;
        let sizes: Vec<_> = pages.into_iter().map(|p| p.unwrap().len()).collect();

        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(loader.state(), LoaderState::Exhausted);
    }
}
