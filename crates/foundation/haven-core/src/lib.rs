//! # Haven Core
//!
//! Shared data model for the Haven peer-support platform.
//!
//! ```text
//! FeedQuery ──► DocumentStore::query(query, cursor) ──► Vec<FeedItem>
//!                      ▲                                      │
//!                      └────────── FeedCursor::after(last) ◄──┘
//! ```
//!
//! - [`FeedItem`]: a document (id, server timestamp, typed fields)
//! - [`FeedQuery`]: collection + optional equality filter + order + page size
//! - [`FeedCursor`]: position after the last fetched item, bound to its query
//! - [`DocumentStore`]: the backend contract every store implements

pub mod cursor;
pub mod item;
pub mod query;
pub mod store;
pub mod value;

pub use cursor::FeedCursor;
pub use item::{new_document_id, FeedItem, Fields, Record, CREATED_AT};
pub use query::{EqualityFilter, FeedQuery, OrderDirection};
pub use store::{DocumentStore, SharedStore};
pub use value::FieldValue;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by document stores
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Cursor belongs to '{found}', not '{expected}'")]
    InvalidCursor { expected: String, found: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Error::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Unavailable(_) | Error::Io(_))
    }
}
