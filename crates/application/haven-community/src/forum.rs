//! Anonymous peer forum

use crate::{CommunityError, Member, Result};
use chrono::{DateTime, Utc};
use haven_core::{FeedItem, FeedQuery, OrderDirection, Record, SharedStore, CREATED_AT};
use haven_feed::{CounterMutator, CounterPolicy, FeedLoader, PendingIncrement};

pub const LIKES: &str = "likes";
pub const REPORTS: &str = "reports";

const ANONYMOUS: &str = "Anonymous";

/// What a member submits
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub anonymous: bool,
}

/// Read view of a forum post
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub likes: i64,
    pub reports: i64,
    pub posted_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn from_item(item: &FeedItem) -> Self {
        let text = |field: &str| item.text(field).unwrap_or_default().to_string();
        Self {
            id: item.id.clone(),
            title: text("title"),
            content: text("content"),
            author_id: text("authorId"),
            author_name: item.text("authorName").unwrap_or(ANONYMOUS).to_string(),
            likes: item.counter(LIKES),
            reports: item.counter(REPORTS),
            posted_at: item.created_at,
        }
    }

    /// Posting date, or "Just now" while the server timestamp is pending
    pub fn date_label(&self) -> String {
        match self.posted_at {
            Some(at) => at.format("%Y-%m-%d").to_string(),
            None => "Just now".to_string(),
        }
    }
}

/// Name shown on a post
pub fn author_name(member: &Member, anonymous: bool) -> String {
    if anonymous {
        ANONYMOUS.to_string()
    } else {
        member.handle().to_string()
    }
}

pub struct Forum {
    store: SharedStore,
    collection: String,
    page_size: usize,
    counters: CounterMutator,
}

impl Forum {
    pub fn new(store: SharedStore, collection: &str, page_size: usize) -> Self {
        Self {
            counters: CounterMutator::new(store.clone(), collection),
            store,
            collection: collection.to_string(),
            page_size,
        }
    }

    pub fn with_policy(mut self, policy: CounterPolicy) -> Self {
        self.counters = self.counters.with_policy(policy);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Newest posts first
    pub fn feed_query(&self) -> Result<FeedQuery> {
        Ok(FeedQuery::new(
            &self.collection,
            CREATED_AT,
            OrderDirection::Descending,
            self.page_size,
        )?)
    }

    pub fn feed(&self) -> Result<FeedLoader> {
        Ok(FeedLoader::new(self.store.clone(), self.feed_query()?))
    }

    /// Publish a post and return its local echo (no server timestamp yet).
    ///
    /// Callers usually `reload` their feed afterwards to show it in place.
    pub async fn compose(&self, member: &Member, draft: PostDraft) -> Result<FeedItem> {
        let title = draft.title.trim();
        let content = draft.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(CommunityError::Invalid("a post needs a title and content".into()));
        }

        let record = Record::new()
            .with("title", title)
            .with("content", content)
            .with("anonymous", draft.anonymous)
            .with("authorId", member.uid.as_str())
            .with("authorName", author_name(member, draft.anonymous))
            .with(LIKES, 0)
            .with(REPORTS, 0);

        let id = self
            .store
            .insert(&self.collection, record.clone())
            .await
            .map_err(|e| CommunityError::Feed(haven_feed::FeedError::Mutation(e)))?;

        tracing::info!("New forum post {}", id);
        Ok(record.into_item(id, None))
    }

    /// Like a post; returns the count to display immediately
    pub fn like(&self, post_id: &str, current_likes: u64) -> PendingIncrement {
        self.counters.increment(post_id, LIKES, current_likes)
    }

    /// Members may report posts other than their own
    pub fn can_report(member: &Member, post: &Post) -> bool {
        member.uid != post.author_id
    }

    /// Flag a post for moderators
    pub fn report(&self, member: &Member, post: &Post) -> Result<PendingIncrement> {
        if !Self::can_report(member, post) {
            return Err(CommunityError::Forbidden("you cannot report your own post".into()));
        }
        Ok(self
            .counters
            .increment(&post.id, REPORTS, post.reports.max(0) as u64))
    }
}
