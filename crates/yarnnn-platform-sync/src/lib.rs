//! Platform sync engine (C2, §4.2): tier-driven per-user sync cadence,
//! per-provider content fetch through a [`PlatformClient`] registry, token
//! refresh, and post-sync landscape pruning.

pub mod client;
pub mod engine;
pub mod error;
pub mod providers;
pub mod tokens;
pub mod types;

pub use client::{PlatformClient, PlatformRegistry};
pub use engine::sync_platform;
pub use error::{PlatformSyncError, Result};
pub use providers::{CalendarClient, GmailClient, NotionClient, SlackClient};
pub use tokens::{OAuthRefresher, TokenManager};
pub use types::{
    Cadence, Credentials, FetchedItem, PlatformConnection, SyncOutcome, SyncResourceError,
    should_sync_now,
};
