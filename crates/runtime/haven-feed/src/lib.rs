//! # Haven Feed
//!
//! Page-at-a-time feed loading over a document store.
//!
//! ## Loader lifecycle
//!
//! ```text
//!            reset()                     reset()
//!   ┌───────────────────► Idle ◄─────────────────────────┐
//!   │                      │ load_next_page()            │
//!   │                      ▼                             │
//!   │   Errored ◄─────── Loading ───────► Exhausted ─────┘
//!   │   (retry)   error    │   empty page   (terminal until reset)
//!   │                      │ non-empty page
//!   │                      ▼
//!   └──────────────── Idle, cursor advanced
//! ```
//!
//! - At most one fetch is in flight per loader. A second call while
//!   `Loading` fails with [`FeedError::StateViolation`]; a call made after a
//!   `reset` waits for the superseded fetch to settle before querying.
//! - `reset` bumps the generation. Responses issued under an older
//!   generation are dropped and never touch the new query's state.
//! - [`CounterMutator`] applies likes/reports optimistically. Failed
//!   increments are not rolled back; the next reload shows the real count.

pub mod counter;
pub mod loader;
pub mod render;

pub use counter::{CounterMutator, CounterPolicy, PendingIncrement};
pub use loader::{FeedLoader, LoaderState};
pub use render::ViewRenderer;

/// Result type for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors surfaced by loaders and counters
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Fetch failed; the cursor is unchanged, call `load_next_page` again to retry
    #[error("Query failed: {0}")]
    Query(#[source] haven_core::Error),

    /// Increment or insert failed; optimistic local state is kept
    #[error("Mutation failed: {0}")]
    Mutation(#[source] haven_core::Error),

    /// `load_next_page` called while a fetch is already in flight
    #[error("Feed is already loading (generation {generation})")]
    StateViolation { generation: u64 },

    /// The loader was reset while this fetch was in flight; its result was dropped
    #[error("Fetch from generation {issued} discarded, feed is now at generation {current}")]
    Superseded { issued: u64, current: u64 },

    /// The background increment task could not be run to completion
    #[error("Increment dispatch failed: {0}")]
    Dispatch(String),
}

impl FeedError {
    /// Whether the caller can simply try again
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FeedError::StateViolation { .. })
    }

    /// Superseded fetches are expected after a reset and need no reporting
    pub fn is_benign(&self) -> bool {
        matches!(self, FeedError::Superseded { .. })
    }
}
