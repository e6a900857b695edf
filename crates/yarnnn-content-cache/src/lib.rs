//! Unified content layer (C1, §4.1): stores raw platform content with a
//! two-lane lifetime (ephemeral TTL vs retained), tracks per-resource sync
//! freshness, and holds each connection's discovered resource landscape.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{ContentCacheError, Result};
pub use store::ContentCache;
pub use types::{
    ContentFilters, ContentId, ContentType, Landscape, PlatformContentItem, QueriedContent,
    Resource, SyncRegistryEntry,
};
