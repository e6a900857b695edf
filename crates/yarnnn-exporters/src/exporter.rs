use async_trait::async_trait;
use yarnnn_core::types::Destination;

use crate::types::{ExportResult, ExporterContext};

/// Uniform contract every destination exporter implements (§6), a direct
/// Rust port of the original's `DestinationExporter` ABC: validation and
/// access verification are synchronous/cheap, delivery is the only async
/// hop, and `infer_style_context` feeds the generation prompt's style pick.
#[async_trait]
pub trait DestinationExporter: Send + Sync {
    fn platform(&self) -> &'static str;

    fn requires_auth(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["default"]
    }

    fn validate_destination(&self, destination: &Destination) -> bool;

    async fn verify_destination_access(
        &self,
        _destination: &Destination,
        _context: &ExporterContext,
    ) -> (bool, Option<String>) {
        (true, None)
    }

    async fn deliver(
        &self,
        destination: &Destination,
        content: &str,
        title: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
        context: &ExporterContext,
    ) -> ExportResult;

    fn infer_style_context(&self) -> &'static str {
        self.platform()
    }
}
