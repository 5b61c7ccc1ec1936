//! Curated resource library

use crate::{CommunityError, Result};
use haven_core::{FeedItem, FeedQuery, OrderDirection, Record, SharedStore, CREATED_AT};
use haven_feed::FeedLoader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const TYPE_FIELD: &str = "type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Video,
    Audio,
    Article,
    Game,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Video,
        ResourceKind::Audio,
        ResourceKind::Article,
        ResourceKind::Game,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Video => "video",
            ResourceKind::Audio => "audio",
            ResourceKind::Article => "article",
            ResourceKind::Game => "game",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            ResourceKind::Video => "🎥",
            ResourceKind::Audio => "🎧",
            ResourceKind::Article => "📖",
            ResourceKind::Game => "🎮",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CommunityError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CommunityError::Invalid(format!("unknown resource type '{}'", s)))
    }
}

/// Which resources to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    All,
    Only(ResourceKind),
}

impl FromStr for KindFilter {
    type Err = CommunityError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(KindFilter::All)
        } else {
            s.parse().map(KindFilter::Only)
        }
    }
}

/// New resource, as entered by an administrator
#[derive(Debug, Clone)]
pub struct ResourceDraft {
    pub title: String,
    pub description: String,
    pub kind: ResourceKind,
    pub url: String,
    pub duration: Option<String>,
}

/// Read view of a resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: Option<ResourceKind>,
    pub url: String,
    pub duration: Option<String>,
}

impl Resource {
    pub fn from_item(item: &FeedItem) -> Self {
        let text = |field: &str| item.text(field).unwrap_or_default().to_string();
        Self {
            id: item.id.clone(),
            title: text("title"),
            description: text("description"),
            kind: item.text(TYPE_FIELD).and_then(|t| t.parse().ok()),
            url: text("url"),
            duration: item.text("duration").map(str::to_string),
        }
    }

    pub fn duration_label(&self) -> &str {
        self.duration.as_deref().unwrap_or("Self-paced")
    }

    pub fn icon(&self) -> &'static str {
        self.kind.map_or("📄", ResourceKind::icon)
    }

    /// Link suitable for embedding (videos) or opening directly
    pub fn link(&self) -> String {
        match self.kind {
            Some(ResourceKind::Video) => embed_url(&self.url),
            _ => self.url.clone(),
        }
    }
}

fn youtube_id() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:\?v=|/embed/|\.be/)([a-zA-Z0-9_-]{11})").expect("valid YouTube id pattern")
    })
}

/// Convert a YouTube watch/short link to its embed form; other URLs pass through
pub fn embed_url(url: &str) -> String {
    match youtube_id().captures(url).and_then(|c| c.get(1)) {
        Some(id) => format!("https://www.youtube.com/embed/{}", id.as_str()),
        None => url.to_string(),
    }
}

pub struct Library {
    store: SharedStore,
    collection: String,
    page_size: usize,
}

impl Library {
    pub fn new(store: SharedStore, collection: &str, page_size: usize) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            page_size,
        }
    }

    /// Newest resources first, optionally of one kind
    pub fn query(&self, filter: KindFilter) -> Result<FeedQuery> {
        let query = FeedQuery::new(
            &self.collection,
            CREATED_AT,
            OrderDirection::Descending,
            self.page_size,
        )?;

        Ok(match filter {
            KindFilter::All => query,
            KindFilter::Only(kind) => query.filtered(TYPE_FIELD, kind.as_str()),
        })
    }

    pub fn feed(&self, filter: KindFilter) -> Result<FeedLoader> {
        Ok(FeedLoader::new(self.store.clone(), self.query(filter)?))
    }

    /// Switch an existing feed to another filter (starts from the top)
    pub fn select(&self, feed: &FeedLoader, filter: KindFilter) -> Result<()> {
        feed.reset(self.query(filter)?);
        Ok(())
    }

    pub async fn add(&self, draft: ResourceDraft) -> Result<String> {
        if draft.title.trim().is_empty() {
            return Err(CommunityError::Invalid("a resource needs a title".into()));
        }
        let url = draft.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CommunityError::Invalid(format!("'{}' is not a web link", url)));
        }

        let mut record = Record::new()
            .with("title", draft.title.trim())
            .with("description", draft.description.trim())
            .with(TYPE_FIELD, draft.kind.as_str())
            .with("url", url);
        if let Some(duration) = draft.duration {
            record = record.with("duration", duration);
        }

        let id = self.store.insert(&self.collection, record).await?;
        tracing::info!("Added {} resource {}", draft.kind, id);
        Ok(id)
    }
}
