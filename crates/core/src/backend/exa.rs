// HTTP client for the Exa API

use super::SearchBackend;
use crate::error::UpstreamError;
use crate::tools::{LinkedInSearchType, ToolRequest};
use serde_json::json;
use std::time::Duration;
use url::Url;

pub const DEFAULT_EXA_BASE_URL: &str = "https://api.exa.ai";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CRAWL_CHARACTERS: u32 = 3_000;

/// Thin forwarding client: one Exa endpoint per tool.
pub struct ExaClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ExaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("exa-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or(UpstreamError::InvalidBaseUrl(base_url))?;

        Ok(Self { client, base_url })
    }

    /// Append path segments to the base URL. Each segment is percent-encoded,
    /// so client-supplied values cannot leave the intended path.
    fn endpoint(&self, segments: &[String]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post(
        &self,
        segments: &[String],
        api_key: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = self.endpoint(segments);
        tracing::debug!(path = url.path(), "Forwarding request to Exa");
        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        Self::decode(response).await
    }

    async fn get(
        &self,
        segments: &[String],
        api_key: &str,
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = self.endpoint(segments);
        tracing::debug!(path = url.path(), "Forwarding request to Exa");
        let response = self
            .client
            .get(url)
            .header("x-api-key", api_key)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<serde_json::Value, UpstreamError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

fn segments(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Map a typed tool payload onto the Exa path segments and body it forwards to.
/// `None` for the body means a GET.
fn route(request: &ToolRequest) -> (Vec<String>, Option<serde_json::Value>) {
    match request {
        ToolRequest::WebSearch(r) => (
            segments(&["search"]),
            Some(json!({
                "query": r.query,
                "type": "auto",
                "numResults": r.num_results.unwrap_or(8),
                "contents": {
                    "text": { "maxCharacters": 10_000 },
                    "livecrawl": "preferred"
                }
            })),
        ),
        ToolRequest::CodeContext(r) => (
            segments(&["context"]),
            Some(json!({
                "query": r.query,
                "tokensNum": r.tokens_num.map(|n| json!(n)).unwrap_or_else(|| json!("dynamic"))
            })),
        ),
        ToolRequest::DeepSearch(r) => (
            segments(&["search"]),
            Some(json!({
                "query": r.objective,
                "type": "deep",
                "additionalQueries": r.search_queries,
                "contents": { "summary": true }
            })),
        ),
        ToolRequest::CompanyResearch(r) => (
            segments(&["search"]),
            Some(json!({
                "query": format!("{} company", r.company_name),
                "type": "auto",
                "category": "company",
                "numResults": r.num_results.unwrap_or(5),
                "contents": { "text": { "maxCharacters": 7_000 } }
            })),
        ),
        ToolRequest::Crawl(r) => (
            segments(&["contents"]),
            Some(json!({
                "ids": [r.url],
                "text": { "maxCharacters": r.max_characters.unwrap_or(DEFAULT_CRAWL_CHARACTERS) },
                "livecrawl": "preferred"
            })),
        ),
        ToolRequest::LinkedInSearch(r) => {
            let query = match r.search_type {
                LinkedInSearchType::Profiles => format!("{} LinkedIn profile", r.query),
                LinkedInSearchType::Companies => format!("{} LinkedIn company page", r.query),
                LinkedInSearchType::All => format!("{} LinkedIn", r.query),
            };
            (
                segments(&["search"]),
                Some(json!({
                    "query": query,
                    "type": "auto",
                    "numResults": r.num_results.unwrap_or(5),
                    "includeDomains": ["linkedin.com"],
                    "contents": { "text": { "maxCharacters": 1_000 } }
                })),
            )
        }
        ToolRequest::DeepResearchStart(r) => (
            segments(&["research", "v1"]),
            Some(json!({
                "instructions": r.instructions,
                "model": r.model
            })),
        ),
        ToolRequest::DeepResearchCheck(r) => {
            (segments(&["research", "v1", r.task_id.as_str()]), None)
        }
    }
}

#[async_trait::async_trait]
impl SearchBackend for ExaClient {
    async fn call(
        &self,
        request: ToolRequest,
        api_key: Option<&str>,
    ) -> Result<serde_json::Value, UpstreamError> {
        let api_key = api_key
            .filter(|key| !key.is_empty())
            .ok_or(UpstreamError::MissingApiKey)?;

        match route(&request) {
            (path, Some(body)) => self.post(&path, api_key, body).await,
            (path, None) => self.get(&path, api_key).await,
        }
    }
}
