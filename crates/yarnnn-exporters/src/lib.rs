//! Destination exporters (§6, §4.4 Step 6): a uniform `DestinationExporter`
//! port plus a registry, grounded directly on
//! `original_source/api/integrations/exporters/{base,registry}.py`.

pub mod error;
pub mod exporter;
pub mod providers;
pub mod registry;
pub mod types;

pub use error::{ExporterError, Result};
pub use exporter::DestinationExporter;
pub use providers::{DownloadExporter, GmailExporter, NotionExporter, ResendExporter, SlackExporter};
pub use registry::ExporterRegistry;
pub use types::{ExportResult, ExportStatus, ExporterContext};

use std::sync::Arc;

/// Builds the registry with every built-in exporter registered, plus the
/// `email` → `resend` alias (§4.4 Step 6 names `resend` as the email
/// default; the alias lets a deliverable's normalized `platform: "email"`
/// destination resolve to it, mirroring the registry-alias mechanism the
/// original uses for its own `email` → `gmail` default).
pub fn default_registry(resend_api_key: String, resend_from_address: String) -> ExporterRegistry {
    let mut registry = ExporterRegistry::new();
    registry.register(Arc::new(ResendExporter::new(resend_api_key, resend_from_address)));
    registry.register(Arc::new(GmailExporter::default()));
    registry.register(Arc::new(SlackExporter::default()));
    registry.register(Arc::new(NotionExporter::default()));
    registry.register(Arc::new(DownloadExporter));
    registry.register_alias("email", "resend");
    registry
}
