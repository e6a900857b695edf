//! `PlatformClient` implementations, one per provider (§4.2 contract table),
//! grounded on the teacher's adapter crates (`skynet-discord`, `skynet-
//! telegram`): a thin HTTP client owning the provider SDK calls, with
//! `PlatformClient`'s three methods as the only public surface.

mod calendar;
mod gmail;
mod notion;
mod slack;

pub use calendar::CalendarClient;
pub use gmail::GmailClient;
pub use notion::NotionClient;
pub use slack::SlackClient;

/// Tag every fetched item with the resource it came from so the engine can
/// regroup a flattened multi-resource fetch for per-resource bookkeeping.
fn tag_resource_id(
    mut metadata: serde_json::Map<String, serde_json::Value>,
    resource_id: &str,
) -> serde_json::Map<String, serde_json::Value> {
    metadata.insert("resource_id".to_string(), serde_json::Value::String(resource_id.to_string()));
    metadata
}

/// Classify a provider HTTP response status into the engine's retry
/// taxonomy (§4.2 "Notes": 429/5xx retried, 401/403 auth, 404/410 gone).
fn classify_status(status: reqwest::StatusCode, body: &str) -> crate::error::PlatformSyncError {
    use crate::error::PlatformSyncError;
    match status.as_u16() {
        401 | 403 => PlatformSyncError::AuthFailed(body.to_string()),
        404 | 410 => PlatformSyncError::Gone(body.to_string()),
        429 => PlatformSyncError::Transient(format!("rate limited: {body}")),
        500..=599 => PlatformSyncError::Transient(format!("server error {status}: {body}")),
        _ => PlatformSyncError::Transient(format!("unexpected status {status}: {body}")),
    }
}
