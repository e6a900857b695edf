use async_trait::async_trait;
use tracing::info;
use yarnnn_core::types::Destination;

use crate::exporter::DestinationExporter;
use crate::providers::markdown_to_html;
use crate::types::{ExportResult, ExporterContext};

/// No-auth local-download preparation (§4.4 Step 6 "download — prepares
/// content in requested format; no auth"). The caller's frontend performs
/// the actual download from the returned metadata.
#[derive(Default)]
pub struct DownloadExporter;

#[async_trait]
impl DestinationExporter for DownloadExporter {
    fn platform(&self) -> &'static str {
        "download"
    }

    fn requires_auth(&self) -> bool {
        false
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["markdown", "html", "pdf"]
    }

    fn validate_destination(&self, destination: &Destination) -> bool {
        self.supported_formats().contains(&destination.format.as_str())
    }

    fn infer_style_context(&self) -> &'static str {
        "general"
    }

    async fn deliver(
        &self,
        destination: &Destination,
        content: &str,
        title: &str,
        _metadata: &serde_json::Map<String, serde_json::Value>,
        _context: &ExporterContext,
    ) -> ExportResult {
        let (processed, extension) = match destination.format.as_str() {
            "html" => (markdown_to_html(title, content), "html"),
            "pdf" => return ExportResult::failed("pdf export not yet implemented; use markdown or html"),
            _ => (content.to_string(), "md"),
        };

        let mut metadata = serde_json::Map::new();
        metadata.insert("format".to_string(), serde_json::Value::String(destination.format.clone()));
        metadata.insert("content".to_string(), serde_json::Value::String(processed));
        metadata.insert("filename".to_string(), serde_json::Value::String(format!("{}.{extension}", sanitize_filename(title))));

        info!(format = %destination.format, "prepared download export");
        ExportResult::success_with_metadata(metadata)
    }
}

fn sanitize_filename(title: &str) -> String {
    let sanitized: String = title.chars().filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')).collect();
    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        "deliverable".to_string()
    } else {
        sanitized.chars().take(100).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_reserved_filename_characters() {
        assert_eq!(sanitize_filename("Q3 Report: Draft/v2"), "Q3 Report Draftv2");
    }

    #[test]
    fn blank_title_falls_back_to_default_name() {
        assert_eq!(sanitize_filename("///"), "deliverable");
    }
}
