use chrono::Utc;
use tracing::{info, warn};

use yarnnn_content_cache::{ContentCache, Landscape, PlatformContentItem, SyncRegistryEntry};
use yarnnn_core::retry::retry_with_backoff;

use crate::client::PlatformRegistry;
use crate::error::{PlatformSyncError, Result};
use crate::types::{PlatformConnection, SyncOutcome, SyncResourceError};

/// TTL applied to freshly synced content before it is either retained by a
/// deliverable or purged (§4.1 "two-lane lifetime").
const DEFAULT_CONTENT_TTL_HOURS: i64 = 24 * 14;

/// `sync_platform(user_id, provider)` (§4.2): resolve the connection's
/// selected sources, fetch, write through to the content cache, then
/// refresh the landscape (post-sync pruning). One resource's failure never
/// aborts its peers — failures are collected into `SyncOutcome.errors`.
///
/// `access_token` is already decrypted and refreshed by the caller via
/// [`crate::tokens::TokenManager`] — this function never touches ciphertext.
pub async fn sync_platform(
    registry: &PlatformRegistry,
    cache: &ContentCache,
    connection: &PlatformConnection,
    access_token: &str,
    selected_sources: &[String],
) -> Result<SyncOutcome> {
    let client = registry
        .get(connection.platform)
        .ok_or_else(|| PlatformSyncError::NoClient(connection.platform.as_str().to_string()))?;

    let mut outcome = SyncOutcome::default();

    let fetch_result = retry_with_backoff(
        "platform_sync.fetch_selected",
        || client.fetch_selected(access_token, selected_sources),
        |e: &PlatformSyncError| matches!(e, PlatformSyncError::Transient(_)),
    )
    .await;

    match fetch_result {
        Ok(per_resource) => {
            for (resource_id, fetched) in per_resource {
                let fetched = match fetched {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        outcome.errors.push(SyncResourceError { resource_id, message: e.to_string() });
                        continue;
                    }
                };

                let count = fetched.len() as i64;
                let items: Vec<PlatformContentItem> = fetched
                    .into_iter()
                    .map(|item| PlatformContentItem {
                        user_id: connection.user_id.to_string(),
                        platform: connection.platform,
                        resource_id: resource_id.clone(),
                        external_id: item.external_id,
                        content: item.content,
                        content_type: item.content_type,
                        metadata: item.metadata,
                        source_timestamp: item.source_timestamp,
                        fetched_at: Utc::now(),
                        retained: false,
                        expires_at: Utc::now(),
                    })
                    .collect();

                match cache.upsert_items(&items, DEFAULT_CONTENT_TTL_HOURS) {
                    Ok(written) => {
                        outcome.items_synced += written as i64;
                        outcome.per_resource_counts.insert(resource_id.clone(), count);
                        let entry = SyncRegistryEntry {
                            user_id: connection.user_id.to_string(),
                            platform: connection.platform,
                            resource_id,
                            last_synced_at: Utc::now(),
                            item_count: count,
                            source_latest_at: items.iter().filter_map(|i| i.source_timestamp).max(),
                            cursor: None,
                        };
                        if let Err(e) = cache.upsert_sync_registry(&entry) {
                            warn!(error = %e, "failed to upsert sync registry entry");
                        }
                    }
                    Err(e) => {
                        outcome.errors.push(SyncResourceError { resource_id, message: e.to_string() });
                    }
                }
            }
        }
        Err(e) => {
            outcome.errors.push(SyncResourceError { resource_id: "*".to_string(), message: e.to_string() });
        }
    }

    if let Err(e) = refresh_landscape(registry, cache, connection, access_token).await {
        warn!(user_id = %connection.user_id, platform = %connection.platform, error = %e, "landscape refresh failed");
    }

    info!(
        user_id = %connection.user_id,
        platform = %connection.platform,
        items = outcome.items_synced,
        errors = outcome.errors.len(),
        "platform sync complete"
    );
    Ok(outcome)
}

/// Post-sync landscape refresh (§4.2 "Key algorithm — landscape pruning"):
/// fetch the current catalog, then let the content cache's compare-then-
/// swap upsert prune stale selections against whatever the user most
/// recently chose.
async fn refresh_landscape(
    registry: &PlatformRegistry,
    cache: &ContentCache,
    connection: &PlatformConnection,
    access_token: &str,
) -> Result<Landscape> {
    let client = registry
        .get(connection.platform)
        .ok_or_else(|| PlatformSyncError::NoClient(connection.platform.as_str().to_string()))?;
    let resources = client.fetch_landscape(access_token).await?;
    Ok(cache.upsert_landscape(&connection.id.to_string(), resources)?)
}
