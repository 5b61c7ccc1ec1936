//! # Haven Community
//!
//! The platform's services, built on feeds and counters:
//!
//! - [`Forum`]: anonymous posts, likes, reports
//! - [`Library`]: curated resources filtered by kind
//! - [`BookingDesk`]: counselor appointment requests
//! - [`Moderation`]: dashboard counts, reported posts, booking review
//! - [`Admins`]: who may moderate
//!
//! Identity is supplied by the caller as a [`Member`]; signing in happens
//! elsewhere.

pub mod admin;
pub mod booking;
pub mod forum;
pub mod library;
pub mod moderation;

pub use admin::{Admin, Admins};
pub use booking::{BookingDesk, BookingRequest, BookingStatus, Counselor, TimeSlot, COUNSELORS};
pub use forum::{Forum, Post, PostDraft};
pub use library::{embed_url, KindFilter, Library, Resource, ResourceDraft, ResourceKind};
pub use moderation::{DashboardStats, Moderation};

use haven_config::HavenConfig;
use haven_core::SharedStore;
use haven_feed::CounterPolicy;
use serde::{Deserialize, Serialize};

/// Result type for community services
pub type Result<T> = std::result::Result<T, CommunityError>;

#[derive(Debug, thiserror::Error)]
pub enum CommunityError {
    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Store error: {0}")]
    Store(#[from] haven_core::Error),

    #[error("Feed error: {0}")]
    Feed(#[from] haven_feed::FeedError),
}

/// A signed-in member, as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub uid: String,
    pub email: String,
}

impl Member {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
        }
    }

    /// Part of the email before `@`
    pub fn handle(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

/// All services wired to one store
pub struct Community {
    pub forum: Forum,
    pub library: Library,
    pub bookings: BookingDesk,
    pub moderation: Moderation,
}

impl Community {
    pub fn from_config(store: SharedStore, config: &HavenConfig) -> Self {
        let policy = if config.counters.suppress_in_flight {
            CounterPolicy::SuppressInFlight
        } else {
            CounterPolicy::EveryCall
        };
        let names = &config.collections;

        Self {
            forum: Forum::new(store.clone(), &names.posts, config.feeds.posts_per_page)
                .with_policy(policy),
            library: Library::new(
                store.clone(),
                &names.resources,
                config.feeds.resources_per_page,
            ),
            bookings: BookingDesk::new(store.clone(), &names.bookings),
            moderation: Moderation::new(store, names.clone(), config.feeds.moderation_per_page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_handle() {
        assert_eq!(Member::new("u1", "sam@example.org").handle(), "sam");
        assert_eq!(Member::new("u2", "no-at-sign").handle(), "no-at-sign");
    }
}
