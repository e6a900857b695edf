use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ExporterError, Result};
use crate::exporter::DestinationExporter;

/// Central lookup from destination platform name to exporter, a direct
/// Rust port of the original's registry class — constructed once at
/// startup and handed to the execution engine as a constructor parameter
/// (§9 redesign note "no global singletons").
#[derive(Default)]
pub struct ExporterRegistry {
    exporters: HashMap<&'static str, Arc<dyn DestinationExporter>>,
}

impl ExporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, exporter: Arc<dyn DestinationExporter>) {
        let platform = exporter.platform();
        if self.exporters.contains_key(platform) {
            warn!(platform, "overwriting existing exporter registration");
        }
        debug!(platform, "registered exporter");
        self.exporters.insert(platform, exporter);
    }

    /// Point a second platform name at an already-registered exporter
    /// (§9 supplemented feature: the original's `email` → `gmail` alias
    /// mechanism, generalized into the registry itself rather than the
    /// one-off patch the original applies after construction).
    pub fn register_alias(&mut self, alias: &'static str, target: &'static str) {
        match self.exporters.get(target).cloned() {
            Some(exporter) => {
                debug!(alias, target, "registered exporter alias");
                self.exporters.insert(alias, exporter);
            }
            None => warn!(alias, target, "cannot alias to an unregistered exporter"),
        }
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn DestinationExporter>> {
        self.exporters.get(platform).cloned()
    }

    pub fn get_or_err(&self, platform: &str) -> Result<Arc<dyn DestinationExporter>> {
        self.get(platform).ok_or_else(|| ExporterError::NotRegistered(platform.to_string()))
    }

    pub fn list_platforms(&self) -> Vec<&'static str> {
        self.exporters.keys().copied().collect()
    }
}
