//! Strategy-based context gathering (§4.4 Step 2). `ExecutionStrategy` is
//! the generation-time analog of `skynet-channels::Channel`: one
//! implementation per `Binding`, held in a `StrategyRegistry` keyed the same
//! way `ChannelManager` keys channel adapters — except the key space here is
//! the closed four-variant `Binding` enum rather than an open string.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use yarnnn_content_cache::{ContentCache, ContentFilters};
use yarnnn_core::types::{Binding, DeliverableSource, Platform};

use crate::error::Result;
use crate::types::{Deliverable, DeliverableVersion, GatheredContext};

/// A directive appended to a `research`/`hybrid` deliverable's context,
/// telling the generation agent it is expected to reach for `web_search`.
const RESEARCH_DIRECTIVE: &str =
    "This deliverable requires research beyond cached platform content. Use the web_search tool \
     to gather current information before drafting.";

/// Caps how many past versions' draft content feed "feedback continuity"
/// (§4.4 Step 2 "past versions" slice).
const PAST_VERSIONS_CONTEXT_WINDOW: usize = 2;

#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn binding(&self) -> Binding;
    async fn gather(&self, cache: &ContentCache, deliverable: &Deliverable) -> Result<GatheredContext>;
}

pub struct PlatformBoundStrategy;

#[async_trait]
impl ExecutionStrategy for PlatformBoundStrategy {
    fn binding(&self) -> Binding {
        Binding::PlatformBound
    }

    async fn gather(&self, cache: &ContentCache, deliverable: &Deliverable) -> Result<GatheredContext> {
        let Some(platform) = deliverable.type_classification.primary_platform else {
            warn!(deliverable_id = %deliverable.id, "platform_bound deliverable missing primary_platform");
            return Ok(GatheredContext::default());
        };
        query_platform(cache, deliverable, platform)
    }
}

pub struct CrossPlatformStrategy;

#[async_trait]
impl ExecutionStrategy for CrossPlatformStrategy {
    fn binding(&self) -> Binding {
        Binding::CrossPlatform
    }

    async fn gather(&self, cache: &ContentCache, deliverable: &Deliverable) -> Result<GatheredContext> {
        // `ContentCache` serializes all reads behind one `Mutex<Connection>`,
        // so per-provider queries gain nothing from real concurrency here —
        // sequential calls achieve the same "independent per source" gather
        // the spec describes without a parallel executor fighting the lock.
        let mut merged = GatheredContext::default();
        for provider in providers_in_sources(&deliverable.sources) {
            let partial = query_platform(cache, deliverable, provider)?;
            merged.content.push_str(&partial.content);
            merged.items_fetched += partial.items_fetched;
            merged.platform_content_ids.extend(partial.platform_content_ids);
            if !merged.sources_used.contains(&provider) {
                merged.sources_used.push(provider);
            }
        }
        Ok(merged)
    }
}

pub struct ResearchStrategy;

#[async_trait]
impl ExecutionStrategy for ResearchStrategy {
    fn binding(&self) -> Binding {
        Binding::Research
    }

    async fn gather(&self, cache: &ContentCache, deliverable: &Deliverable) -> Result<GatheredContext> {
        let mut gathered = match deliverable.type_classification.primary_platform {
            Some(platform) => query_platform(cache, deliverable, platform)?,
            None => GatheredContext::default(),
        };
        gathered.content.push_str("\n## Research directive\n");
        gathered.content.push_str(RESEARCH_DIRECTIVE);
        gathered.content.push('\n');
        Ok(gathered)
    }
}

pub struct HybridStrategy;

#[async_trait]
impl ExecutionStrategy for HybridStrategy {
    fn binding(&self) -> Binding {
        Binding::Hybrid
    }

    async fn gather(&self, cache: &ContentCache, deliverable: &Deliverable) -> Result<GatheredContext> {
        let mut gathered = CrossPlatformStrategy.gather(cache, deliverable).await?;
        gathered.content.push_str("\n## Research directive\n");
        gathered.content.push_str(RESEARCH_DIRECTIVE);
        gathered.content.push('\n');
        Ok(gathered)
    }
}

/// Dispatches on `type_classification.binding`, keyed exactly the way
/// `ChannelManager` keys channel adapters by name.
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn ExecutionStrategy>>,
}

impl StrategyRegistry {
    pub fn default_strategies() -> Self {
        Self {
            strategies: vec![
                Arc::new(PlatformBoundStrategy),
                Arc::new(CrossPlatformStrategy),
                Arc::new(ResearchStrategy),
                Arc::new(HybridStrategy),
            ],
        }
    }

    pub fn get(&self, binding: Binding) -> Option<Arc<dyn ExecutionStrategy>> {
        self.strategies.iter().find(|s| s.binding() == binding).cloned()
    }
}

/// Runs the matching strategy, then appends the two cross-strategy sections
/// every binding carries (§4.4 Step 2 "All strategies also append"): the
/// rendered working-memory block and a feedback-continuity slice of past
/// versions' draft content.
pub async fn gather_context(
    registry: &StrategyRegistry,
    cache: &ContentCache,
    deliverable: &Deliverable,
    working_memory: &str,
    past_versions: &[DeliverableVersion],
) -> Result<GatheredContext> {
    let binding = deliverable.type_classification.binding;
    let strategy = registry.get(binding).expect("StrategyRegistry must cover every Binding variant");
    let mut gathered = strategy.gather(cache, deliverable).await?;

    gathered.content.push_str("\n## User context\n");
    gathered.content.push_str(working_memory);

    let recent: Vec<_> = past_versions.iter().rev().take(PAST_VERSIONS_CONTEXT_WINDOW).collect();
    if !recent.is_empty() {
        gathered.content.push_str("\n## Past versions\n");
        for version in recent {
            if let Some(draft) = &version.draft_content {
                gathered.content.push_str(&format!("### Version {}\n{draft}\n", version.version_number));
            }
        }
    }

    Ok(gathered)
}

fn providers_in_sources(sources: &[DeliverableSource]) -> Vec<Platform> {
    let mut seen = Vec::new();
    for source in sources {
        if let DeliverableSource::IntegrationImport { provider, .. } = source {
            if !seen.contains(provider) {
                seen.push(*provider);
            }
        }
    }
    seen
}

fn query_platform(cache: &ContentCache, deliverable: &Deliverable, platform: Platform) -> Result<GatheredContext> {
    let resource_ids: Vec<String> = deliverable
        .sources
        .iter()
        .filter_map(|s| match s {
            DeliverableSource::IntegrationImport { provider, resource_id } if *provider == platform => {
                Some(resource_id.clone())
            }
            _ => None,
        })
        .collect();

    let filters = ContentFilters {
        platform: Some(platform),
        resource_ids: if resource_ids.is_empty() { None } else { Some(resource_ids) },
        ..Default::default()
    };
    let rows = cache.query(deliverable.user_id.as_str(), &filters, 100)?;

    let mut content = String::new();
    content.push_str(&format!("## {} content\n", platform.as_str()));
    for row in &rows {
        content.push_str(&format!("- [{}] {}\n", row.item.resource_id, row.item.content));
    }

    Ok(GatheredContext {
        content,
        sources_used: vec![platform],
        items_fetched: rows.len(),
        platform_content_ids: rows.iter().map(|r| r.id.clone()).collect(),
        source_snapshots: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarnnn_content_cache::PlatformContentItem;
    use yarnnn_core::types::{DestinationSpec, Destination, Schedule, TypeClassification, UserId};
    use crate::types::{DeliverableStatus, Origin, TriggerType};

    fn cache_with_one_message() -> ContentCache {
        let cache = ContentCache::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        cache
            .upsert_items(
                &[PlatformContentItem {
                    user_id: "u1".into(),
                    platform: Platform::Slack,
                    resource_id: "C1".into(),
                    external_id: "m1".into(),
                    content: "hello world".into(),
                    content_type: yarnnn_content_cache::ContentType::Message,
                    metadata: Default::default(),
                    source_timestamp: Some(yarnnn_core::types::now()),
                    fetched_at: yarnnn_core::types::now(),
                    retained: false,
                    expires_at: yarnnn_core::types::now() + chrono::Duration::hours(24),
                }],
                24,
            )
            .unwrap();
        cache
    }

    fn platform_bound_deliverable() -> Deliverable {
        Deliverable {
            id: yarnnn_core::types::DeliverableId::new(),
            user_id: UserId::from("u1"),
            title: "Slack digest".into(),
            description: "desc".into(),
            deliverable_type: "slack_digest".into(),
            type_classification: TypeClassification::platform_bound(Platform::Slack, 24),
            schedule: Schedule::None,
            sources: vec![DeliverableSource::IntegrationImport { provider: Platform::Slack, resource_id: "C1".into() }],
            destination: DestinationSpec::Single(Destination {
                platform: "resend".into(),
                target: "me@example.com".into(),
                format: "html".into(),
                options: Default::default(),
            }),
            trigger_type: TriggerType::Schedule,
            origin: Origin::UserCreated,
            status: DeliverableStatus::Active,
            next_run_at: None,
        }
    }

    #[tokio::test]
    async fn platform_bound_strategy_pulls_only_its_platform() {
        let cache = cache_with_one_message();
        let deliverable = platform_bound_deliverable();
        let gathered = PlatformBoundStrategy.gather(&cache, &deliverable).await.unwrap();
        assert_eq!(gathered.items_fetched, 1);
        assert!(gathered.content.contains("hello world"));
    }

    #[tokio::test]
    async fn research_strategy_always_appends_directive() {
        let cache = cache_with_one_message();
        let mut deliverable = platform_bound_deliverable();
        deliverable.type_classification = TypeClassification::cross_platform(24);
        let gathered = ResearchStrategy.gather(&cache, &deliverable).await.unwrap();
        assert!(gathered.content.contains("web_search"));
    }

    #[tokio::test]
    async fn gather_context_appends_working_memory_and_past_versions() {
        let cache = cache_with_one_message();
        let deliverable = platform_bound_deliverable();
        let registry = StrategyRegistry::default_strategies();
        let past = vec![DeliverableVersion {
            id: yarnnn_core::types::DeliverableVersionId::new(),
            deliverable_id: deliverable.id.clone(),
            version_number: 1,
            status: crate::types::VersionStatus::Delivered,
            draft_content: Some("previous draft".into()),
            final_content: Some("previous draft".into()),
            delivery_status: crate::types::DeliveryStatus::Delivered,
            delivery_outcomes: vec![],
            source_snapshots: vec![],
            delivered_at: Some(yarnnn_core::types::now()),
            created_at: yarnnn_core::types::now(),
        }];

        let gathered = gather_context(&registry, &cache, &deliverable, "## Profile\n- name: Ada", &past).await.unwrap();
        assert!(gathered.content.contains("Ada"));
        assert!(gathered.content.contains("previous draft"));
    }
}
