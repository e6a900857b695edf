//! Wires every collaborator the tick needs into one struct, built once at
//! startup from [`YarnnnConfig`] — the orchestrator's counterpart to the
//! teacher's `skynet-gateway::app::AppState`, generalized from a
//! request-scoped HTTP server to a single `tick(now)` entry point run by an
//! external cron (§6).
//!
//! The three-phase tick (platform sync, signal pass, deliverable
//! generation) runs its admitted work sequentially rather than fanning
//! concurrent tasks out across a shared SQLite connection pool — every
//! store here is a single `Mutex<Connection>`, and admission is already
//! serialized by `(user_id, platform)` / `(user_id,)` / `(deliverable_id,)`
//! advisory locks, so there is no throughput left on the table a tick of
//! this size would notice.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use yarnnn_activity::{ActivityStore, EventType, NewActivityEvent};
use yarnnn_content_cache::ContentCache;
use yarnnn_core::completions::Completions;
use yarnnn_core::config::YarnnnConfig;
use yarnnn_core::crypto::TokenCipher;
use yarnnn_core::types::{ConnectionStatus, DeliverableId, DestinationSpec, Schedule, TypeClassification};
use yarnnn_deliverables::{
    Deliverable, DeliverableEngine, DeliverableStatus, DeliverableStore, DeliveryStatus, Origin, TriggerContext,
    TriggerType,
};
use yarnnn_memory::MemoryStore;
use yarnnn_platform_sync::{sync_platform, CalendarClient, GmailClient, NotionClient, PlatformRegistry, SlackClient, TokenManager};
use yarnnn_scheduler::{DeliverableWorkItem, LockKey, QueueCeilings, SchedulerEngine, SignalWorkItem, SyncWorkItem};
use yarnnn_signals::{process_signal, ActivityLine, ContextLine, ExistingDeliverableRef, SignalAction, SignalHistory};

use crate::connections::ConnectionStore;
use crate::credentials::ConnectionCredentialsResolver;
use crate::due_work::OrchestratorDueWorkSource;
use crate::error::Result;
use crate::llm::AnthropicCompletions;
use crate::research::NullWebSearch;
use crate::signal_state::SignalPassTracker;

/// Existing deliverables handed to the reasoning prompt (§4.3 Step 2).
const EXISTING_DELIVERABLES_CAP: usize = 10;
/// UserContext rows handed to the reasoning prompt (§4.3 Step 2).
const SIGNAL_CONTEXT_CAP: usize = 15;
/// Recent activity rows handed to the reasoning prompt (§4.3 Step 2).
const SIGNAL_ACTIVITY_CAP: usize = 8;
/// Freshness window given to a signal-emergent deliverable's classification
/// — it has no configured cadence of its own, so a generic one-day window
/// stands in for the tiered values a user-created deliverable would set.
const SIGNAL_EMERGENT_FRESHNESS_HOURS: i64 = 24;

/// Outcome counters for one `tick()` call, surfaced to the caller for
/// logging — not persisted anywhere, `ActivityStore` is the durable record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    pub syncs_completed: usize,
    pub syncs_failed: usize,
    pub signal_passes_completed: usize,
    pub deliverables_run: usize,
    pub deliverables_failed: usize,
    pub dropped: usize,
}

pub struct App {
    config: YarnnnConfig,
    content_cache: Arc<ContentCache>,
    connections: Arc<ConnectionStore>,
    deliverables: Arc<DeliverableStore>,
    memory: Arc<MemoryStore>,
    activity: Arc<ActivityStore>,
    signal_history: Arc<SignalHistory>,
    platform_registry: Arc<PlatformRegistry>,
    token_manager: TokenManager,
    completions: Arc<dyn Completions>,
    scheduler: SchedulerEngine,
    signal_passes: Arc<SignalPassTracker>,
    due_work: OrchestratorDueWorkSource,
    deliverable_engine: DeliverableEngine,
}

impl App {
    pub fn new(config: YarnnnConfig) -> Result<Self> {
        let api_key = config.llm.api_key.clone().unwrap_or_else(|| {
            warn!("no llm.api_key configured; completions calls will fail until one is set");
            String::new()
        });
        let completions: Arc<dyn Completions> = Arc::new(AnthropicCompletions::new(api_key, config.llm.base_url.clone()));
        Self::new_with_completions(config, completions)
    }

    /// Same wiring as [`App::new`] but with the `Completions` port supplied
    /// by the caller instead of built from config — lets scenario tests
    /// substitute a `ScriptedCompletions` double for the real Anthropic
    /// client, following the teacher's fake-the-`LlmProvider`-seam pattern.
    pub fn new_with_completions(config: YarnnnConfig, completions: Arc<dyn Completions>) -> Result<Self> {
        Self::build(config, completions, None, None)
    }

    /// Same wiring as [`App::new_with_completions`] but also lets the
    /// caller substitute the `PlatformClient`/`DestinationExporter`
    /// collaborators — the same fake-the-seam pattern extended to sync and
    /// delivery so scenario tests never make a live network call.
    pub fn new_with_collaborators(
        config: YarnnnConfig,
        completions: Arc<dyn Completions>,
        platform_registry: Arc<PlatformRegistry>,
        exporters: Arc<yarnnn_exporters::ExporterRegistry>,
    ) -> Result<Self> {
        Self::build(config, completions, Some(platform_registry), Some(exporters))
    }

    fn build(
        config: YarnnnConfig,
        completions: Arc<dyn Completions>,
        platform_registry: Option<Arc<PlatformRegistry>>,
        exporters: Option<Arc<yarnnn_exporters::ExporterRegistry>>,
    ) -> Result<Self> {
        if let Some(parent) = Path::new(&config.database.path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let open = || rusqlite::Connection::open(&config.database.path);

        let content_cache = Arc::new(ContentCache::new(open()?)?);
        let connections = Arc::new(ConnectionStore::new(open()?)?);
        let deliverables = Arc::new(DeliverableStore::new(open()?)?);
        let memory = Arc::new(MemoryStore::new(open()?)?);
        let activity = Arc::new(ActivityStore::new(open()?)?);
        let signal_history = Arc::new(SignalHistory::new(open()?)?);

        let platform_registry = platform_registry.unwrap_or_else(|| {
            let mut registry = PlatformRegistry::new();
            registry.register(Box::new(SlackClient::new()));
            registry.register(Box::new(GmailClient::new()));
            registry.register(Box::new(NotionClient::new()));
            registry.register(Box::new(CalendarClient::new()));
            Arc::new(registry)
        });

        let resolver_cipher = TokenCipher::new(&config.platform_encryption_key)?;
        let manager_cipher = TokenCipher::new(&config.platform_encryption_key)?;
        let token_manager = TokenManager::new(manager_cipher);

        let exporters = exporters.unwrap_or_else(|| {
            let (resend_api_key, resend_from_address) = match &config.exporters.resend {
                Some(resend) => (resend.api_key.clone(), resend.from_address.clone()),
                None => {
                    warn!("no [exporters.resend] config section; email delivery will fail until configured");
                    (String::new(), String::new())
                }
            };
            Arc::new(yarnnn_exporters::default_registry(resend_api_key, resend_from_address))
        });

        let credentials = Arc::new(ConnectionCredentialsResolver::new(connections.clone(), resolver_cipher));
        let web_search = Arc::new(NullWebSearch);

        let deliverable_engine = DeliverableEngine::new(
            deliverables.clone(),
            content_cache.clone(),
            memory.clone(),
            activity.clone(),
            exporters,
            credentials,
            completions.clone(),
            web_search,
            config.llm.generation_model.clone(),
            config.agent.max_tool_rounds,
        );

        let signal_passes = Arc::new(SignalPassTracker::new());
        let due_work = OrchestratorDueWorkSource::new(connections.clone(), deliverables.clone(), signal_passes.clone());
        let scheduler = SchedulerEngine::new(QueueCeilings::default());

        Ok(Self {
            config,
            content_cache,
            connections,
            deliverables,
            memory,
            activity,
            signal_history,
            platform_registry,
            token_manager,
            completions,
            scheduler,
            signal_passes,
            due_work,
            deliverable_engine,
        })
    }

    /// The single entry point an external cron calls every five minutes
    /// (§6). Builds the dispatch plan, then runs every admitted unit of
    /// work for this tick in turn.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let plan = self.scheduler.tick(now, &self.due_work);
        let mut summary = TickSummary { dropped: plan.dropped.len(), ..TickSummary::default() };

        for dropped in &plan.dropped {
            warn!(
                queue = ?dropped.queue,
                reason = ?dropped.reason,
                detail = %dropped.detail,
                "dispatcher dropped work this tick"
            );
        }

        for item in &plan.sync {
            self.run_sync(item, now, &mut summary).await;
        }
        for item in &plan.signal {
            self.run_signal_pass(item, now, &mut summary).await;
        }
        for item in &plan.deliverable {
            self.run_deliverable(item, &mut summary).await;
        }

        info!(
            synced = summary.syncs_completed,
            sync_failures = summary.syncs_failed,
            signal_passes = summary.signal_passes_completed,
            generated = summary.deliverables_run,
            generation_failures = summary.deliverables_failed,
            dropped = summary.dropped,
            "tick complete"
        );
        self.activity.record(NewActivityEvent::system(
            EventType::SchedulerHeartbeat,
            format!(
                "synced {}, signal passes {}, generated {}, dropped {}",
                summary.syncs_completed, summary.signal_passes_completed, summary.deliverables_run, summary.dropped
            ),
        ))?;

        Ok(summary)
    }

    async fn run_sync(&self, item: &SyncWorkItem, now: DateTime<Utc>, summary: &mut TickSummary) {
        let key = LockKey::Sync(item.user_id.clone(), item.platform);
        let Some(_guard) = self.scheduler.locks().try_acquire(key) else { return };

        let mut connection = match self.connections.get_by_user_platform(item.user_id.as_str(), item.platform) {
            Ok(Some(c)) => c,
            Ok(None) => {
                warn!(user_id = %item.user_id, platform = %item.platform, "due sync for an untracked connection");
                return;
            }
            Err(e) => {
                warn!(user_id = %item.user_id, platform = %item.platform, error = %e, "failed to load connection");
                return;
            }
        };

        let access_token = match self.token_manager.get_valid_access_token(&mut connection, None).await {
            Ok(token) => token,
            Err(e) => {
                warn!(user_id = %item.user_id, platform = %item.platform, error = %e, "failed to decrypt access token");
                self.connections.update_status(&connection.id, ConnectionStatus::Error).ok();
                summary.syncs_failed += 1;
                return;
            }
        };
        if let Err(e) = self.connections.update_credentials(&connection.id, &connection.credentials) {
            warn!(user_id = %item.user_id, error = %e, "failed to persist refreshed credentials");
        }

        let selected_sources = self
            .content_cache
            .get_landscape(&connection.id.to_string())
            .ok()
            .flatten()
            .map(|landscape| landscape.selected_sources)
            .unwrap_or_default();

        match sync_platform(&self.platform_registry, &self.content_cache, &connection, &access_token, &selected_sources).await {
            Ok(outcome) => {
                self.connections.update_after_sync(&connection.id, now).ok();
                self.activity
                    .record(NewActivityEvent::new(
                        item.user_id.as_str(),
                        EventType::PlatformSynced,
                        format!("synced {} ({} items, {} errors)", item.platform, outcome.items_synced, outcome.errors.len()),
                    ))
                    .ok();
                summary.syncs_completed += 1;
            }
            Err(e) => {
                warn!(user_id = %item.user_id, platform = %item.platform, error = %e, "platform sync failed");
                summary.syncs_failed += 1;
            }
        }
    }

    async fn run_signal_pass(&self, item: &SignalWorkItem, now: DateTime<Utc>, summary: &mut TickSummary) {
        let key = LockKey::Signal(item.user_id.clone());
        let Some(_guard) = self.scheduler.locks().try_acquire(key) else { return };

        self.signal_passes.record_run(&item.user_id, now);

        let digest = match yarnnn_signals::extract_signal_summary(&self.content_cache, item.user_id.as_str()) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(user_id = %item.user_id, error = %e, "failed to extract signal summary");
                return;
            }
        };

        let existing: Vec<ExistingDeliverableRef> = self
            .deliverables
            .list_active_for_user(item.user_id.as_str())
            .unwrap_or_default()
            .into_iter()
            .take(EXISTING_DELIVERABLES_CAP)
            .map(|d| ExistingDeliverableRef {
                id: d.id,
                deliverable_type: d.deliverable_type,
                title: d.title,
                next_run_at: d.next_run_at,
                recent_content_preview: Some(truncate(&d.description, 160)),
            })
            .collect();

        let user_context: Vec<ContextLine> = self
            .memory
            .capped_entries(item.user_id.as_str(), SIGNAL_CONTEXT_CAP)
            .unwrap_or_default()
            .into_iter()
            .map(|e| ContextLine { key: e.key.to_string(), value: e.value })
            .collect();

        let recent_activity: Vec<ActivityLine> = self
            .activity
            .recent(item.user_id.as_str(), SIGNAL_ACTIVITY_CAP)
            .unwrap_or_default()
            .into_iter()
            .map(|e| ActivityLine { summary: e.summary })
            .collect();

        let result = match process_signal(
            self.completions.as_ref(),
            &self.config.llm.reasoning_model,
            item.user_id.clone(),
            &digest,
            &user_context,
            &recent_activity,
            &existing,
        )
        .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(user_id = %item.user_id, error = %e, "signal reasoning pass failed");
                return;
            }
        };

        self.activity
            .record(NewActivityEvent::new(
                item.user_id.as_str(),
                EventType::SignalProcessed,
                if result.reasoning_summary.is_empty() { "no action".to_string() } else { result.reasoning_summary.clone() },
            ))
            .ok();
        summary.signal_passes_completed += 1;

        let dedup_window = Duration::hours(self.config.signals.dedup_window_hours);

        for action in result.actions {
            let signal_ref = action.signal_ref();
            match action {
                SignalAction::CreateSignalEmergent { deliverable_type, title, description, sources, signal_context, .. } => {
                    if let Some(sref) = &signal_ref {
                        match self.signal_history.is_eligible(item.user_id.as_str(), &deliverable_type, sref, dedup_window, now) {
                            Ok(true) => {}
                            Ok(false) => continue,
                            Err(e) => {
                                warn!(user_id = %item.user_id, error = %e, "signal history lookup failed");
                                continue;
                            }
                        }
                    }

                    let deliverable = Deliverable {
                        id: DeliverableId::new(),
                        user_id: item.user_id.clone(),
                        title,
                        description,
                        deliverable_type: deliverable_type.clone(),
                        type_classification: TypeClassification::cross_platform(SIGNAL_EMERGENT_FRESHNESS_HOURS),
                        schedule: Schedule::None,
                        sources,
                        destination: DestinationSpec::Multi(Vec::new()),
                        trigger_type: TriggerType::Manual,
                        origin: Origin::SignalEmergent,
                        status: DeliverableStatus::Active,
                        next_run_at: Some(now),
                    };

                    if let Err(e) = self.deliverables.insert_deliverable(&deliverable) {
                        warn!(user_id = %item.user_id, error = %e, "failed to persist signal-emergent deliverable");
                        continue;
                    }
                    if let Some(sref) = &signal_ref {
                        self.signal_history
                            .record_trigger(item.user_id.as_str(), &deliverable_type, sref, &deliverable.id.as_str())
                            .ok();
                    }

                    let trigger_context = TriggerContext { reasoning: result.reasoning_summary.clone(), signal_context };
                    self.run_generation(&deliverable.id, Some(trigger_context), summary).await;
                }
                SignalAction::TriggerExisting { trigger_deliverable_id, .. } => {
                    if let Err(e) = self.deliverables.update_next_run_at(&trigger_deliverable_id, Some(now)) {
                        warn!(deliverable_id = %trigger_deliverable_id, error = %e, "failed to bump next_run_at for triggered deliverable");
                    }
                }
                SignalAction::NoAction => {}
            }
        }
    }

    async fn run_deliverable(&self, item: &DeliverableWorkItem, summary: &mut TickSummary) {
        let key = LockKey::Deliverable(item.deliverable_id.clone());
        let Some(_guard) = self.scheduler.locks().try_acquire(key) else { return };
        self.run_generation(&item.deliverable_id, None, summary).await;
    }

    async fn run_generation(&self, deliverable_id: &DeliverableId, trigger_context: Option<TriggerContext>, summary: &mut TickSummary) {
        let user_id = match self.deliverables.get_deliverable(deliverable_id) {
            Ok(d) => d.user_id,
            Err(e) => {
                warn!(%deliverable_id, error = %e, "deliverable vanished before generation could run");
                return;
            }
        };

        match self.deliverable_engine.execute(deliverable_id, trigger_context).await {
            Ok(version) => {
                let mut metadata = serde_json::Map::new();
                metadata.insert("status".to_string(), serde_json::Value::String(delivery_status_str(version.delivery_status).to_string()));
                self.activity
                    .record(
                        NewActivityEvent::new(user_id.as_str(), EventType::DeliverableRun, format!("generated version {}", version.version_number))
                            .with_metadata(metadata),
                    )
                    .ok();
                summary.deliverables_run += 1;
            }
            Err(e) => {
                warn!(%deliverable_id, error = %e, "deliverable generation failed");
                let mut metadata = serde_json::Map::new();
                metadata.insert("status".to_string(), serde_json::Value::String("failed".to_string()));
                self.activity
                    .record(NewActivityEvent::new(user_id.as_str(), EventType::DeliverableRun, "generation failed").with_metadata(metadata))
                    .ok();
                summary.deliverables_failed += 1;
            }
        }
    }
}

fn delivery_status_str(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::Delivering => "delivering",
        DeliveryStatus::Delivered => "delivered",
        DeliveryStatus::Partial => "partial",
        DeliveryStatus::Failed => "failed",
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect::<String>() + "…"
    }
}
