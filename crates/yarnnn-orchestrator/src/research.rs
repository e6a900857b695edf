//! `WebSearch` seam (§4.4 "research"/"hybrid" strategies): a concrete web
//! search provider is an external collaborator this workspace does not pin
//! down, matching the port's own doc comment. `NullWebSearch` keeps the
//! generation loop's `web_search` tool callable — it just always comes back
//! empty, so a research deliverable still drafts from whatever the model
//! already knows plus cached platform content, instead of the tool call
//! itself erroring out.

use async_trait::async_trait;
use tracing::debug;

use yarnnn_deliverables::tools::web_search::WebSearchResult;
use yarnnn_deliverables::tools::{WebSearch, WebSearchError};

pub struct NullWebSearch;

#[async_trait]
impl WebSearch for NullWebSearch {
    async fn search(&self, query: &str) -> Result<Vec<WebSearchResult>, WebSearchError> {
        debug!(query, "web search requested with no provider configured");
        Ok(Vec::new())
    }
}
