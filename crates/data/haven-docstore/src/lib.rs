//! # Haven Docstore
//!
//! [`MemoryStore`] implements the document store contract in process, with
//! server-assigned timestamps, cursor pagination and atomic increments.
//! [`SnapshotFile`] persists it as JSON between runs.

pub mod memory;
pub mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::{parse_seed, SeedFile, SnapshotFile, StoreSnapshot};
