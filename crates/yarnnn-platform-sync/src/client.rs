use async_trait::async_trait;
use yarnnn_content_cache::Resource;
use yarnnn_core::types::Platform;

use crate::error::Result;
use crate::types::FetchedItem;

/// Per-provider adapter (§4.2, §6 "Platform clients (in-edges)"). One
/// implementation per `{slack, gmail, notion, calendar}`, directly the
/// teacher's `Channel` trait shape (`name`/`connect`/`disconnect`/`send`/
/// `status`) generalized with a fetch method and a landscape discovery read.
///
/// Methods take a bare decrypted `access_token` rather than a
/// `PlatformConnection` so token refresh (via [`crate::tokens::TokenManager`])
/// stays the caller's concern — a client never sees ciphertext or a refresh
/// token.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// Discover the provider's current resource catalog (channels, labels,
    /// pages, calendars) — the read side of §4.1's landscape split.
    async fn fetch_landscape(&self, access_token: &str) -> Result<Vec<Resource>>;

    /// Fetch content for the selected resources only, respecting each
    /// provider's bound from §4.2's contract table. Each resource is
    /// fetched independently and paired with its own outcome — one
    /// resource's failure is reported alongside it and never aborts the
    /// rest of the batch.
    async fn fetch_selected(
        &self,
        access_token: &str,
        selected_sources: &[String],
    ) -> Result<Vec<(String, Result<Vec<FetchedItem>>)>>;

    /// Direct outbound send, used by on-demand actions and the `slack`/
    /// `gmail` exporters (§6 "direct `send` operations").
    async fn send(&self, access_token: &str, target: &str, content: &str) -> Result<()>;
}

/// Registers one [`PlatformClient`] per provider, generalizing the
/// teacher's `ChannelManager` (message channels) to platform content sync.
#[derive(Default)]
pub struct PlatformRegistry {
    clients: std::collections::HashMap<Platform, Box<dyn PlatformClient>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client: Box<dyn PlatformClient>) {
        self.clients.insert(client.platform(), client);
    }

    pub fn get(&self, platform: Platform) -> Option<&dyn PlatformClient> {
        self.clients.get(&platform).map(|c| c.as_ref())
    }
}
