use serde::{Deserialize, Serialize};

/// Auth/metadata context a delivery call needs, threaded in from the caller
/// so exporters stay stateless (§6 "Exporters (out-edges)").
#[derive(Debug, Clone)]
pub struct ExporterContext {
    pub user_id: String,
    /// Decrypted access token. Empty for exporters with `requires_auth() == false`.
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Success,
    Partial,
    Failed,
}

/// Outcome of a single `deliver` call (§4.4 Step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub status: ExportStatus,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub error: Option<String>,
    /// Exporter-specific extras — e.g. the download exporter's prepared
    /// content and suggested filename, which have no external id/url.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ExportResult {
    pub fn success(external_id: Option<String>, external_url: Option<String>) -> Self {
        Self { status: ExportStatus::Success, external_id, external_url, error: None, metadata: Default::default() }
    }

    pub fn success_with_metadata(metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { status: ExportStatus::Success, external_id: None, external_url: None, error: None, metadata }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { status: ExportStatus::Failed, external_id: None, external_url: None, error: Some(error.into()), metadata: Default::default() }
    }
}
