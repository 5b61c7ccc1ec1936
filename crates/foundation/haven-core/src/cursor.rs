//! Pagination cursors

use crate::{Error, FeedItem, FeedQuery, FieldValue, Result};
use serde::{Deserialize, Serialize};

/// Position after the last item of a fetched page.
///
/// Carries the order key and id of that item, and the query it was taken
/// from. It is only meaningful for that exact query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedCursor {
    query: FeedQuery,
    order_key: FieldValue,
    last_id: String,
}

impl FeedCursor {
    /// Cursor positioned after `item`; `None` if its order key is missing or null
    pub fn after(query: &FeedQuery, item: &FeedItem) -> Option<Self> {
        let order_key = query.order_key(item)?;
        Some(Self {
            query: query.clone(),
            order_key,
            last_id: item.id.clone(),
        })
    }

    pub fn order_key(&self) -> &FieldValue {
        &self.order_key
    }

    pub fn last_id(&self) -> &str {
        &self.last_id
    }

    pub fn query(&self) -> &FeedQuery {
        &self.query
    }

    pub fn is_valid_for(&self, query: &FeedQuery) -> bool {
        &self.query == query
    }

    /// Fail with [`Error::InvalidCursor`] unless the cursor came from `query`
    pub fn ensure_valid_for(&self, query: &FeedQuery) -> Result<()> {
        if self.is_valid_for(query) {
            Ok(())
        } else {
            Err(Error::InvalidCursor {
                expected: query.to_string(),
                found: self.query.to_string(),
            })
        }
    }
}
