//! In-memory document store

use crate::snapshot::StoreSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use haven_core::{
    new_document_id, DocumentStore, EqualityFilter, Error, FeedCursor, FeedItem, FeedQuery,
    FieldValue, Fields, Record, Result, CREATED_AT,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Collection = BTreeMap<String, FeedItem>;

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    /// Last timestamp handed out; keeps server time strictly increasing
    last_timestamp: Option<DateTime<Utc>>,
}

impl State {
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }

    fn document_mut(&mut self, collection: &str, id: &str) -> Result<&mut FeedItem> {
        self.collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| Error::not_found(collection, id))
    }
}

/// Document store held entirely in memory.
///
/// Behaves like the hosted database for everything the feeds rely on:
/// server timestamps, equality filters, ordered cursor pagination and
/// atomic increments. Faults can be injected for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing_queries: AtomicUsize,
    failing_mutations: AtomicUsize,
    queries: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut state = State::default();
        for (name, items) in snapshot.collections {
            let collection = state.collections.entry(name).or_default();
            for item in items {
                if let Some(at) = item.created_at {
                    if state.last_timestamp.map_or(true, |last| at > last) {
                        state.last_timestamp = Some(at);
                    }
                }
                collection.insert(item.id.clone(), item);
            }
        }

        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Capture all collections
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.lock();
        StoreSnapshot::new(
            state
                .collections
                .iter()
                .map(|(name, c)| (name.clone(), c.values().cloned().collect()))
                .collect(),
        )
    }

    /// Put a fully formed document in place (seeding and tests)
    pub fn put(&self, collection: &str, item: FeedItem) {
        let mut state = self.lock();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(item.id.clone(), item);
    }

    /// Make the next `n` queries fail with `Unavailable`
    pub fn fail_next_queries(&self, n: usize) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes (insert, increment, update, delete) fail with `Unavailable`
    pub fn fail_next_mutations(&self, n: usize) {
        self.failing_mutations.store(n, Ordering::SeqCst);
    }

    /// Number of `query` calls received so far
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.lock().collections.get(collection).map_or(0, |c| c.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_fault(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_mutation(&self, op: &str) -> Result<()> {
        if Self::take_fault(&self.failing_mutations) {
            tracing::debug!("Injected fault on {}", op);
            return Err(Error::Unavailable(format!("injected fault on {}", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn query(&self, query: &FeedQuery, after: Option<&FeedCursor>) -> Result<Vec<FeedItem>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if Self::take_fault(&self.failing_queries) {
            tracing::debug!("Injected fault on query {}", query);
            return Err(Error::Unavailable("injected fault on query".into()));
        }

        if let Some(cursor) = after {
            cursor.ensure_valid_for(query)?;
        }

        let state = self.lock();
        let Some(collection) = state.collections.get(query.collection()) else {
            return Ok(Vec::new());
        };

        let mut items: Vec<FeedItem> = collection
            .values()
            .filter(|item| query.admits(item))
            .filter(|item| after.map_or(true, |c| query.is_after(item, c)))
            .cloned()
            .collect();

        items.sort_by(|a, b| query.compare(a, b));
        items.truncate(query.page_size());

        Ok(items)
    }

    async fn increment(&self, collection: &str, id: &str, counter: &str, delta: i64) -> Result<()> {
        self.check_mutation("increment")?;

        let mut state = self.lock();
        let item = state.document_mut(collection, id)?;

        let next = match item.fields.get(counter) {
            None | Some(FieldValue::Null) => FieldValue::Integer(delta),
            Some(FieldValue::Integer(n)) => FieldValue::Integer(n.saturating_add(delta)),
            Some(FieldValue::Double(d)) => FieldValue::Double(d + delta as f64),
            Some(other) => {
                return Err(Error::InvalidRecord(format!(
                    "cannot increment non-numeric field '{}' ({})",
                    counter, other
                )))
            }
        };
        item.fields.insert(counter.to_string(), next);

        Ok(())
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<String> {
        self.check_mutation("insert")?;

        let mut state = self.lock();
        let id = new_document_id();
        let created_at = state.next_timestamp();
        let item = record.into_item(id.clone(), Some(created_at));

        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), item);

        tracing::debug!("Inserted {}/{}", collection, id);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<FeedItem>> {
        let state = self.lock();
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.check_mutation("update")?;

        let mut state = self.lock();
        let item = state.document_mut(collection, id)?;
        for (field, value) in fields {
            if field != CREATED_AT {
                item.fields.insert(field, value);
            }
        }

        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.check_mutation("delete")?;

        let mut state = self.lock();
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|c| c.remove(id));

        if removed.is_none() {
            tracing::debug!("Delete of missing document {}/{}", collection, id);
        }

        Ok(())
    }

    async fn count(&self, collection: &str, filter: Option<&EqualityFilter>) -> Result<u64> {
        let state = self.lock();
        let count = state.collections.get(collection).map_or(0, |c| {
            c.values()
                .filter(|item| filter.map_or(true, |f| f.accepts(item)))
                .count()
        });

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::OrderDirection;

    fn posts_by_date(page_size: usize) -> FeedQuery {
        FeedQuery::new("forum_posts", CREATED_AT, OrderDirection::Descending, page_size).unwrap()
    }

    async fn insert_posts(store: &MemoryStore, n: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 0..n {
            let record = Record::new().with("title", format!("post {}", i)).with("likes", 0);
            ids.push(store.insert("forum_posts", record).await.unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn test_server_timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let ids = insert_posts(&store, 20).await;

        let mut stamps = Vec::new();
        for id in &ids {
            let item = store.get("forum_posts", id).await.unwrap().unwrap();
            stamps.push(item.created_at.unwrap());
        }

        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_query_pages_follow_cursor() {
        let store = MemoryStore::new();
        let ids = insert_posts(&store, 5).await;
        let q = posts_by_date(2);

        let first = store.query(&q, None).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, ids[4]);

        let cursor = FeedCursor::after(&q, first.last().unwrap()).unwrap();
        let second = store.query(&q, Some(&cursor)).await.unwrap();
        assert_eq!(second[0].id, ids[2]);
        assert_eq!(second[1].id, ids[1]);
    }

    #[tokio::test]
    async fn test_null_order_keys_left_out_of_ordered_feed() {
        let store = MemoryStore::new();
        store.put("forum_posts", FeedItem::new("n1").with("likes", FieldValue::Null));
        store.put("forum_posts", FeedItem::new("n2").with("likes", FieldValue::Null));
        store.put("forum_posts", FeedItem::new("a").with("likes", 1));
        store.put("forum_posts", FeedItem::new("b").with("likes", 2));
        store.put("forum_posts", FeedItem::new("c").with("likes", 3));

        let q = FeedQuery::new("forum_posts", "likes", OrderDirection::Ascending, 2).unwrap();
        let mut ids = Vec::new();
        let mut cursor = None;
        loop {
            let page = store.query(&q, cursor.as_ref()).await.unwrap();
            let Some(last) = page.last() else { break };
            cursor = FeedCursor::after(&q, last);
            ids.extend(page.iter().map(|i| i.id.clone()));
        }

        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_foreign_cursor_rejected() {
        let store = MemoryStore::new();
        insert_posts(&store, 3).await;
        let q = posts_by_date(2);
        let page = store.query(&q, None).await.unwrap();
        let cursor = FeedCursor::after(&q, &page[1]).unwrap();

        let other = posts_by_date(5);
        let err = store.query(&other, Some(&cursor)).await;
        assert!(matches!(err, Err(Error::InvalidCursor { .. })));
    }

    #[tokio::test]
    async fn test_increment_missing_and_existing_counter() {
        let store = MemoryStore::new();
        let ids = insert_posts(&store, 1).await;

        store.increment("forum_posts", &ids[0], "likes", 1).await.unwrap();
        store.increment("forum_posts", &ids[0], "reports", 2).await.unwrap();

        let item = store.get("forum_posts", &ids[0]).await.unwrap().unwrap();
        assert_eq!(item.counter("likes"), 1);
        assert_eq!(item.counter("reports"), 2);

        let missing = store.increment("forum_posts", "nope", "likes", 1).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed() {
        let store = MemoryStore::new();
        let ids = insert_posts(&store, 1).await;

        store.fail_next_queries(1);
        assert!(store.query(&posts_by_date(10), None).await.is_err());
        assert!(store.query(&posts_by_date(10), None).await.is_ok());
        assert_eq!(store.query_count(), 2);

        store.fail_next_mutations(1);
        assert!(store.increment("forum_posts", &ids[0], "likes", 1).await.is_err());
        assert!(store.increment("forum_posts", &ids[0], "likes", 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_delete_count() {
        let store = MemoryStore::new();
        let booking = Record::new().with("status", "pending");
        let id = store.insert("bookings", booking.clone()).await.unwrap();
        store.insert("bookings", booking).await.unwrap();

        let pending = EqualityFilter::new("status", "pending");
        assert_eq!(store.count("bookings", Some(&pending)).await.unwrap(), 2);

        let mut fields = Fields::new();
        fields.insert("status".into(), "approved".into());
        store.update("bookings", &id, fields).await.unwrap();
        assert_eq!(store.count("bookings", Some(&pending)).await.unwrap(), 1);

        store.delete("bookings", &id).await.unwrap();
        store.delete("bookings", &id).await.unwrap();
        assert_eq!(store.count("bookings", None).await.unwrap(), 1);
    }
}
