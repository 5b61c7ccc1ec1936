//! Feed queries: one optional equality filter, one ordered field, a page size

use crate::{Error, FeedCursor, FeedItem, FieldValue, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::num::NonZeroUsize;

/// Sort direction of the order field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

impl OrderDirection {
    /// Orient an ascending comparison
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            OrderDirection::Ascending => ordering,
            OrderDirection::Descending => ordering.reverse(),
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// `field == value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualityFilter {
    pub field: String,
    pub value: FieldValue,
}

impl EqualityFilter {
    pub fn new(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn accepts(&self, item: &FeedItem) -> bool {
        item.get(&self.field)
            .map(|v| v.matches(&self.value))
            .unwrap_or(false)
    }
}

/// Immutable description of one feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedQuery {
    collection: String,
    filter: Option<EqualityFilter>,
    order_field: String,
    direction: OrderDirection,
    page_size: NonZeroUsize,
}

impl FeedQuery {
    /// Create a query; a zero page size is rejected
    pub fn new(
        collection: impl Into<String>,
        order_field: impl Into<String>,
        direction: OrderDirection,
        page_size: usize,
    ) -> Result<Self> {
        let page_size = NonZeroUsize::new(page_size)
            .ok_or_else(|| Error::InvalidQuery("page size must be greater than zero".into()))?;

        Ok(Self {
            collection: collection.into(),
            filter: None,
            order_field: order_field.into(),
            direction,
            page_size,
        })
    }

    /// Restrict the feed to items where `field == value`
    pub fn filtered(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filter = Some(EqualityFilter::new(field, value));
        self
    }

    pub fn with_filter(mut self, filter: Option<EqualityFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filter(&self) -> Option<&EqualityFilter> {
        self.filter.as_ref()
    }

    pub fn order_field(&self) -> &str {
        &self.order_field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    pub fn page_size(&self) -> usize {
        self.page_size.get()
    }

    /// Whether an item belongs to this feed.
    ///
    /// Items whose order field is missing or null are not part of an ordered feed.
    pub fn admits(&self, item: &FeedItem) -> bool {
        let filtered_in = self.filter.as_ref().map_or(true, |f| f.accepts(item));
        filtered_in && self.order_key(item).is_some()
    }

    /// The item's non-null value for the order field
    pub fn order_key(&self, item: &FeedItem) -> Option<FieldValue> {
        item.get(&self.order_field).filter(|v| !v.is_null())
    }

    /// Feed order: order key in the query direction, then id in the same direction
    pub fn compare(&self, a: &FeedItem, b: &FeedItem) -> Ordering {
        let key_a = a.get(&self.order_field).unwrap_or(FieldValue::Null);
        let key_b = b.get(&self.order_field).unwrap_or(FieldValue::Null);
        self.compare_keys((&key_a, &a.id), (&key_b, &b.id))
    }

    pub fn compare_keys(&self, a: (&FieldValue, &str), b: (&FieldValue, &str)) -> Ordering {
        let ascending = a.0.total_cmp(b.0).then_with(|| a.1.cmp(b.1));
        self.direction.apply(ascending)
    }

    /// Whether an item sorts strictly after the cursor position
    pub fn is_after(&self, item: &FeedItem, cursor: &FeedCursor) -> bool {
        let key = item.get(&self.order_field).unwrap_or(FieldValue::Null);
        self.compare_keys((&key, &item.id), (cursor.order_key(), cursor.last_id()))
            == Ordering::Greater
    }
}

impl fmt::Display for FeedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection)?;
        if let Some(filter) = &self.filter {
            write!(f, " where {} == {}", filter.field, filter.value)?;
        }
        write!(
            f,
            " order by {} {} limit {}",
            self.order_field, self.direction, self.page_size
        )
    }
}
