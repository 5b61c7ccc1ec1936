//! Plain-text feed output

use haven_community::{BookingStatus, Post, Resource};
use haven_core::FeedItem;
use haven_feed::{LoaderState, ViewRenderer};

/// What kind of documents a feed holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Posts,
    Resources,
    Bookings,
}

pub struct TextRenderer {
    listing: Listing,
}

impl TextRenderer {
    pub fn new(listing: Listing) -> Self {
        Self { listing }
    }

    fn line(&self, item: &FeedItem) -> String {
        match self.listing {
            Listing::Posts => {
                let post = Post::from_item(item);
                format!(
                    "  {} [{}]\n    {} · {} · ♥ {} · ⚑ {}\n    {}",
                    post.title,
                    post.id,
                    post.author_name,
                    post.date_label(),
                    post.likes,
                    post.reports,
                    post.content
                )
            }
            Listing::Resources => {
                let resource = Resource::from_item(item);
                format!(
                    "  {} {} [{}]\n    {} · {}\n    {}",
                    resource.icon(),
                    resource.title,
                    resource.id,
                    resource.duration_label(),
                    resource.link(),
                    resource.description
                )
            }
            Listing::Bookings => {
                let status = BookingStatus::of(item).map_or("unknown", BookingStatus::as_str);
                format!(
                    "  {} {} with {} [{}]\n    {} · {}",
                    item.text("date").unwrap_or("?"),
                    item.text("time").unwrap_or("?"),
                    item.text("counselorName").unwrap_or("?"),
                    item.id,
                    item.text("userEmail").unwrap_or("?"),
                    status
                )
            }
        }
    }
}

impl ViewRenderer for TextRenderer {
    type Output = String;

    fn render(&self, items: &[FeedItem], state: LoaderState) -> String {
        let mut out: Vec<String> = items.iter().map(|item| self.line(item)).collect();
        match state {
            LoaderState::Exhausted if items.is_empty() => out.push("  (nothing more)".into()),
            LoaderState::Exhausted => out.push("  -- end --".into()),
            LoaderState::Errored => out.push("  (could not load, try again)".into()),
            LoaderState::Idle | LoaderState::Loading => {}
        }
        out.join("\n")
    }
}
