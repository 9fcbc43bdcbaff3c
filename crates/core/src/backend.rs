// External search collaborator seam

mod exa;

pub use exa::{ExaClient, DEFAULT_EXA_BASE_URL};

use crate::error::UpstreamError;
use crate::tools::ToolRequest;

/// The external search/crawl/research service.
///
/// Implementations receive an already validated payload and the API key
/// resolved for the current request, and return a JSON-serializable result.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    async fn call(
        &self,
        request: ToolRequest,
        api_key: Option<&str>,
    ) -> Result<serde_json::Value, UpstreamError>;
}
