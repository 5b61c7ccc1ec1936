//! Boundary to whatever displays a feed

use crate::LoaderState;
use haven_core::FeedItem;

/// Turns a page of items and the loader state into a display
pub trait ViewRenderer {
    type Output;

    fn render(&self, items: &[FeedItem], state: LoaderState) -> Self::Output;
}
