//! The document store contract
//!
//! Every store backend implements this trait. Feeds, counters and the
//! community services only ever see `Arc<dyn DocumentStore>`.

use crate::{EqualityFilter, FeedCursor, FeedItem, FeedQuery, Fields, Record, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to a store backend
pub type SharedStore = Arc<dyn DocumentStore>;

/// Collection-oriented document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend identifier (for logs)
    fn name(&self) -> &str;

    /// Fetch up to `query.page_size()` items in feed order, strictly after `after`.
    ///
    /// A cursor taken from a different query fails with `InvalidCursor`.
    async fn query(&self, query: &FeedQuery, after: Option<&FeedCursor>) -> Result<Vec<FeedItem>>;

    /// Atomically add `delta` to a numeric field (a missing field counts as zero)
    async fn increment(&self, collection: &str, id: &str, counter: &str, delta: i64) -> Result<()>;

    /// Insert a record, returning its new id. The creation timestamp is server-assigned.
    async fn insert(&self, collection: &str, record: Record) -> Result<String>;

    /// Fetch a single document
    async fn get(&self, collection: &str, id: &str) -> Result<Option<FeedItem>>;

    /// Overwrite the given fields of an existing document
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Remove a document
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Count documents, optionally restricted by an equality filter
    async fn count(&self, collection: &str, filter: Option<&EqualityFilter>) -> Result<u64>;
}
