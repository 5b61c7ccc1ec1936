//! Administrator role, kept as ordinary documents
//!
//! A member is an administrator when the admins collection holds a document
//! with their `uid`. The first administrator claims the role while the
//! collection is empty; after that only administrators can grant or revoke it.

use crate::{CommunityError, Member, Result};
use futures::TryStreamExt;
use haven_core::{
    EqualityFilter, FeedItem, FeedQuery, OrderDirection, Record, SharedStore, CREATED_AT,
};
use haven_feed::FeedLoader;

const UID: &str = "uid";
const ROLE: &str = "admin";

/// Read view of an administrator entry
#[derive(Debug, Clone, PartialEq)]
pub struct Admin {
    pub id: String,
    pub uid: String,
    pub email: String,
}

impl Admin {
    pub fn from_item(item: &FeedItem) -> Self {
        Self {
            id: item.id.clone(),
            uid: item.text(UID).unwrap_or_default().to_string(),
            email: item.text("email").unwrap_or_default().to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Admins {
    store: SharedStore,
    collection: String,
}

impl Admins {
    pub fn new(store: SharedStore, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }

    fn by_uid(&self, uid: &str) -> Result<FeedQuery> {
        Ok(self.all(100)?.filtered(UID, uid))
    }

    fn all(&self, page_size: usize) -> Result<FeedQuery> {
        Ok(FeedQuery::new(
            &self.collection,
            CREATED_AT,
            OrderDirection::Ascending,
            page_size,
        )?)
    }

    pub async fn is_admin(&self, member: &Member) -> Result<bool> {
        let filter = EqualityFilter::new(UID, member.uid.as_str());
        Ok(self.store.count(&self.collection, Some(&filter)).await? > 0)
    }

    /// Fail with `Forbidden` unless `member` is an administrator
    pub async fn ensure_admin(&self, member: &Member) -> Result<()> {
        if self.is_admin(member).await? {
            Ok(())
        } else {
            tracing::warn!("Admin action refused for {}", member.uid);
            Err(CommunityError::Forbidden("administrator access required".into()))
        }
    }

    /// Administrators, longest-standing first
    pub async fn list(&self, member: &Member) -> Result<Vec<Admin>> {
        self.ensure_admin(member).await?;

        let feed = FeedLoader::new(self.store.clone(), self.all(50)?);
        let pages: Vec<Vec<FeedItem>> = feed.pages().try_collect().await?;
        Ok(pages.iter().flatten().map(Admin::from_item).collect())
    }

    /// Make `member` the first administrator; refused once any exist
    pub async fn claim_first(&self, member: &Member) -> Result<String> {
        if self.store.count(&self.collection, None).await? > 0 {
            return Err(CommunityError::Forbidden(
                "an administrator already exists; ask one to add you".into(),
            ));
        }
        let id = self.insert(&member.uid, &member.email).await?;
        tracing::info!("{} set up as the first administrator", member.email);
        Ok(id)
    }

    /// Grant the role; granting it twice is a no-op
    pub async fn add(&self, caller: &Member, uid: &str, email: &str) -> Result<()> {
        self.ensure_admin(caller).await?;
        if uid.trim().is_empty() || !email.contains('@') {
            return Err(CommunityError::Invalid("an admin needs a uid and an email".into()));
        }

        if self.is_admin(&Member::new(uid, email)).await? {
            tracing::debug!("{} is already an administrator", uid);
            return Ok(());
        }
        self.insert(uid, email).await?;
        tracing::info!("{} granted administrator by {}", email, caller.uid);
        Ok(())
    }

    /// Revoke the role; administrators cannot remove themselves
    pub async fn remove(&self, caller: &Member, uid: &str) -> Result<()> {
        self.ensure_admin(caller).await?;
        if caller.uid == uid {
            return Err(CommunityError::Forbidden("you cannot remove yourself".into()));
        }

        let query = self.by_uid(uid)?;
        for entry in self.store.query(&query, None).await? {
            self.store.delete(&self.collection, &entry.id).await?;
        }
        tracing::info!("{} revoked administrator from {}", caller.uid, uid);
        Ok(())
    }

    async fn insert(&self, uid: &str, email: &str) -> Result<String> {
        let record = Record::new()
            .with(UID, uid)
            .with("email", email)
            .with("role", ROLE);
        Ok(self.store.insert(&self.collection, record).await?)
    }
}
