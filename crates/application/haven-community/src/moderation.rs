//! Administrator views over posts, resources and bookings
//!
//! Every operation takes the acting [`Member`] and fails with
//! `CommunityError::Forbidden` unless they hold the administrator role.

use crate::booking::STATUS;
use crate::forum::REPORTS;
use crate::{Admins, BookingStatus, Member, Result};
use haven_config::Collections;
use haven_core::{EqualityFilter, FeedQuery, Fields, OrderDirection, SharedStore, CREATED_AT};
use haven_feed::FeedLoader;
use serde::{Deserialize, Serialize};

/// Dashboard counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub posts: u64,
    pub resources: u64,
    pub pending_bookings: u64,
}

pub struct Moderation {
    store: SharedStore,
    admins: Admins,
    collections: Collections,
    page_size: usize,
}

impl Moderation {
    pub fn new(store: SharedStore, collections: Collections, page_size: usize) -> Self {
        Self {
            admins: Admins::new(store.clone(), &collections.admins),
            store,
            collections,
            page_size,
        }
    }

    pub fn admins(&self) -> &Admins {
        &self.admins
    }

    pub async fn stats(&self, member: &Member) -> Result<DashboardStats> {
        self.admins.ensure_admin(member).await?;
        let pending = EqualityFilter::new(STATUS, BookingStatus::Pending.as_str());

        Ok(DashboardStats {
            posts: self.store.count(&self.collections.posts, None).await?,
            resources: self.store.count(&self.collections.resources, None).await?,
            pending_bookings: self
                .store
                .count(&self.collections.bookings, Some(&pending))
                .await?,
        })
    }

    /// Posts, most reported first
    pub async fn reported_posts(&self, member: &Member) -> Result<FeedLoader> {
        self.admins.ensure_admin(member).await?;
        let query = FeedQuery::new(
            &self.collections.posts,
            REPORTS,
            OrderDirection::Descending,
            self.page_size,
        )?;
        Ok(FeedLoader::new(self.store.clone(), query))
    }

    /// Newest bookings first, optionally of one status
    pub async fn bookings(
        &self,
        member: &Member,
        status: Option<BookingStatus>,
    ) -> Result<FeedLoader> {
        self.admins.ensure_admin(member).await?;
        let query = FeedQuery::new(
            &self.collections.bookings,
            CREATED_AT,
            OrderDirection::Descending,
            self.page_size,
        )?
        .with_filter(status.map(|s| EqualityFilter::new(STATUS, s.as_str())));
        Ok(FeedLoader::new(self.store.clone(), query))
    }

    pub async fn set_booking_status(
        &self,
        member: &Member,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<()> {
        self.admins.ensure_admin(member).await?;
        let mut fields = Fields::new();
        fields.insert(STATUS.to_string(), status.as_str().into());
        self.store
            .update(&self.collections.bookings, booking_id, fields)
            .await?;
        tracing::info!("Booking {} marked {}", booking_id, status);
        Ok(())
    }

    pub async fn delete_post(&self, member: &Member, post_id: &str) -> Result<()> {
        self.admins.ensure_admin(member).await?;
        self.store.delete(&self.collections.posts, post_id).await?;
        tracing::info!("Deleted forum post {}", post_id);
        Ok(())
    }

    pub async fn delete_resource(&self, member: &Member, resource_id: &str) -> Result<()> {
        self.admins.ensure_admin(member).await?;
        self.store
            .delete(&self.collections.resources, resource_id)
            .await?;
        tracing::info!("Deleted resource {}", resource_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BookingDesk, BookingRequest, CommunityError, Forum, PostDraft, TimeSlot};
    use chrono::NaiveDate;
    use haven_core::{DocumentStore, Error as StoreError, Record};
    use haven_docstore::MemoryStore;
    use std::sync::Arc;

    fn admin() -> Member {
        Member::new("a1", "staff@example.org")
    }

    async fn moderation(store: &Arc<MemoryStore>) -> Moderation {
        let moderation = Moderation::new(store.clone(), Collections::default(), 20);
        moderation.admins().claim_first(&admin()).await.unwrap();
        moderation
    }

    async fn book(desk: &BookingDesk, member: &Member) -> String {
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let request = BookingRequest {
            counselor_id: "c3".to_string(),
            date,
            time: TimeSlot::new(10).unwrap(),
            notes: String::new(),
        };
        desk.request(member, request, date).await.unwrap()
    }

    #[tokio::test]
    async fn test_stats_count_pending_only() {
        let store = Arc::new(MemoryStore::new());
        let desk = BookingDesk::new(store.clone(), "bookings");
        let member = Member::new("u1", "river@example.org");
        let first = book(&desk, &member).await;
        book(&desk, &member).await;
        store
            .insert("resources", Record::new().with("title", "Calm"))
            .await
            .unwrap();

        let moderation = moderation(&store).await;
        moderation
            .set_booking_status(&admin(), &first, BookingStatus::Approved)
            .await
            .unwrap();

        assert_eq!(
            moderation.stats(&admin()).await.unwrap(),
            DashboardStats {
                posts: 0,
                resources: 1,
                pending_bookings: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_reported_posts_most_reported_first() {
        let store = Arc::new(MemoryStore::new());
        let forum = Forum::new(store.clone(), "forum_posts", 10);
        let member = Member::new("u1", "river@example.org");

        let mut ids = Vec::new();
        for title in ["a", "b", "c"] {
            let draft = PostDraft {
                title: title.to_string(),
                content: "text".to_string(),
                anonymous: true,
            };
            ids.push(forum.compose(&member, draft).await.unwrap().id);
        }
        store.increment("forum_posts", &ids[1], REPORTS, 3).await.unwrap();
        store.increment("forum_posts", &ids[2], REPORTS, 1).await.unwrap();

        let feed = moderation(&store)
            .await
            .reported_posts(&admin())
            .await
            .unwrap();
        let page = feed.load_next_page().await.unwrap();
        let order: Vec<_> = page.iter().map(|i| i.text("title").unwrap()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_bookings_filtered_by_status() {
        let store = Arc::new(MemoryStore::new());
        let desk = BookingDesk::new(store.clone(), "bookings");
        let member = Member::new("u1", "river@example.org");
        let first = book(&desk, &member).await;
        let second = book(&desk, &member).await;

        let moderation = moderation(&store).await;
        moderation
            .set_booking_status(&admin(), &first, BookingStatus::Rejected)
            .await
            .unwrap();

        let all = moderation.bookings(&admin(), None).await.unwrap();
        let ids: Vec<_> = all
            .load_next_page()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![second.clone(), first.clone()]);

        let pending = moderation
            .bookings(&admin(), Some(BookingStatus::Pending))
            .await
            .unwrap();
        let page = pending.load_next_page().await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second);
    }

    #[tokio::test]
    async fn test_set_status_on_missing_booking() {
        let store = Arc::new(MemoryStore::new());
        let result = moderation(&store)
            .await
            .set_booking_status(&admin(), "ghost", BookingStatus::Approved)
            .await;
        assert!(matches!(
            result,
            Err(CommunityError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_delete_post_and_resource() {
        let store = Arc::new(MemoryStore::new());
        let post = store
            .insert("forum_posts", Record::new().with("title", "x"))
            .await
            .unwrap();
        let resource = store
            .insert("resources", Record::new().with("title", "y"))
            .await
            .unwrap();

        let moderation = moderation(&store).await;
        moderation.delete_post(&admin(), &post).await.unwrap();
        moderation
            .delete_resource(&admin(), &resource)
            .await
            .unwrap();
        moderation.delete_post(&admin(), &post).await.unwrap();

        assert!(store.is_empty("forum_posts"));
        assert!(store.is_empty("resources"));
    }

    #[tokio::test]
    async fn test_member_without_role_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let post = store
            .insert("forum_posts", Record::new().with("title", "x"))
            .await
            .unwrap();
        let moderation = moderation(&store).await;
        let member = Member::new("u1", "river@example.org");

        assert!(matches!(
            moderation.stats(&member).await,
            Err(CommunityError::Forbidden(_))
        ));
        assert!(matches!(
            moderation.reported_posts(&member).await,
            Err(CommunityError::Forbidden(_))
        ));
        assert!(matches!(
            moderation.bookings(&member, None).await,
            Err(CommunityError::Forbidden(_))
        ));
        assert!(matches!(
            moderation.delete_post(&member, &post).await,
            Err(CommunityError::Forbidden(_))
        ));
        assert_eq!(store.len("forum_posts"), 1);

        moderation
            .admins()
            .add(&admin(), "u1", "river@example.org")
            .await
            .unwrap();
        moderation.delete_post(&member, &post).await.unwrap();
        assert!(store.is_empty("forum_posts"));
    }
}
