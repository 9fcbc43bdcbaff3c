// Typed payloads for each tool

use super::ToolId;
use crate::error::ArgumentError;
use serde::{Deserialize, Serialize};
use url::Url;

const MAX_NUM_RESULTS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchRequest {
    pub query: String,
    #[serde(default)]
    pub num_results: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeContextRequest {
    pub query: String,
    #[serde(default)]
    pub tokens_num: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepSearchRequest {
    pub objective: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyResearchRequest {
    pub company_name: String,
    #[serde(default)]
    pub num_results: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    pub url: String,
    #[serde(default)]
    pub max_characters: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkedInSearchType {
    Profiles,
    Companies,
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedInSearchRequest {
    pub query: String,
    #[serde(default)]
    pub search_type: LinkedInSearchType,
    #[serde(default)]
    pub num_results: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResearchModel {
    #[default]
    #[serde(rename = "exa-research")]
    Standard,
    #[serde(rename = "exa-research-pro")]
    Pro,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepResearchStartRequest {
    pub instructions: String,
    #[serde(default)]
    pub model: ResearchModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepResearchCheckRequest {
    pub task_id: String,
}

/// A validated `tools/call` payload, one variant per tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    WebSearch(WebSearchRequest),
    CodeContext(CodeContextRequest),
    DeepSearch(DeepSearchRequest),
    CompanyResearch(CompanyResearchRequest),
    Crawl(CrawlRequest),
    LinkedInSearch(LinkedInSearchRequest),
    DeepResearchStart(DeepResearchStartRequest),
    DeepResearchCheck(DeepResearchCheckRequest),
}

impl ToolRequest {
    /// Decode and validate the arguments for `tool`.
    pub fn parse(tool: ToolId, arguments: serde_json::Value) -> Result<Self, ArgumentError> {
        // Clients may omit `arguments` entirely
        let arguments = if arguments.is_null() {
            serde_json::json!({})
        } else {
            arguments
        };

        let request = match tool {
            ToolId::WebSearch => Self::WebSearch(serde_json::from_value(arguments)?),
            ToolId::CodeContext => Self::CodeContext(serde_json::from_value(arguments)?),
            ToolId::DeepSearch => Self::DeepSearch(serde_json::from_value(arguments)?),
            ToolId::CompanyResearch => Self::CompanyResearch(serde_json::from_value(arguments)?),
            ToolId::Crawling => Self::Crawl(serde_json::from_value(arguments)?),
            ToolId::LinkedInSearch => Self::LinkedInSearch(serde_json::from_value(arguments)?),
            ToolId::DeepResearcherStart => {
                Self::DeepResearchStart(serde_json::from_value(arguments)?)
            }
            ToolId::DeepResearcherCheck => {
                Self::DeepResearchCheck(serde_json::from_value(arguments)?)
            }
        };

        request.validate()?;
        Ok(request)
    }

    pub fn tool_id(&self) -> ToolId {
        match self {
            Self::WebSearch(_) => ToolId::WebSearch,
            Self::CodeContext(_) => ToolId::CodeContext,
            Self::DeepSearch(_) => ToolId::DeepSearch,
            Self::CompanyResearch(_) => ToolId::CompanyResearch,
            Self::Crawl(_) => ToolId::Crawling,
            Self::LinkedInSearch(_) => ToolId::LinkedInSearch,
            Self::DeepResearchStart(_) => ToolId::DeepResearcherStart,
            Self::DeepResearchCheck(_) => ToolId::DeepResearcherCheck,
        }
    }

    fn validate(&self) -> Result<(), ArgumentError> {
        match self {
            Self::WebSearch(r) => {
                require_non_empty("query", &r.query)?;
                check_num_results(r.num_results)
            }
            Self::CodeContext(r) => {
                require_non_empty("query", &r.query)?;
                match r.tokens_num {
                    Some(n) if !(1_000..=50_000).contains(&n) => Err(ArgumentError::Invalid(
                        format!("tokensNum must be between 1000 and 50000, got {}", n),
                    )),
                    _ => Ok(()),
                }
            }
            Self::DeepSearch(r) => require_non_empty("objective", &r.objective),
            Self::CompanyResearch(r) => {
                require_non_empty("companyName", &r.company_name)?;
                check_num_results(r.num_results)
            }
            Self::Crawl(r) => {
                let url = Url::parse(&r.url)
                    .map_err(|e| ArgumentError::Invalid(format!("Invalid URL: {}", e)))?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ArgumentError::Invalid(format!(
                        "Only HTTP/HTTPS URLs are supported, got: {}",
                        url.scheme()
                    )));
                }
                Ok(())
            }
            Self::LinkedInSearch(r) => {
                require_non_empty("query", &r.query)?;
                check_num_results(r.num_results)
            }
            Self::DeepResearchStart(r) => require_non_empty("instructions", &r.instructions),
            Self::DeepResearchCheck(r) => {
                require_non_empty("taskId", &r.task_id)?;
                check_task_id(&r.task_id)
            }
        }
    }
}

/// Task ids are opaque tokens issued by Exa; anything that could alter the
/// upstream path or query is refused.
fn check_task_id(task_id: &str) -> Result<(), ArgumentError> {
    let reserved = task_id.contains(['/', '\\', '?', '#', '%']) || task_id.contains("..");
    if reserved || task_id.chars().any(char::is_whitespace) {
        return Err(ArgumentError::Invalid(format!(
            "taskId contains reserved characters: {:?}",
            task_id
        )));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ArgumentError> {
    if value.trim().is_empty() {
        return Err(ArgumentError::Invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn check_num_results(num_results: Option<u32>) -> Result<(), ArgumentError> {
    match num_results {
        Some(n) if n == 0 || n > MAX_NUM_RESULTS => Err(ArgumentError::Invalid(format!(
            "numResults must be between 1 and {}, got {}",
            MAX_NUM_RESULTS, n
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_web_search() {
        let request =
            ToolRequest::parse(ToolId::WebSearch, json!({"query": "rust", "numResults": 3}))
                .unwrap();
        assert_eq!(
            request,
            ToolRequest::WebSearch(WebSearchRequest {
                query: "rust".to_string(),
                num_results: Some(3),
            })
        );
        assert_eq!(request.tool_id(), ToolId::WebSearch);
    }

    #[test]
    fn test_missing_required_field() {
        let err = ToolRequest::parse(ToolId::WebSearch, json!({})).unwrap_err();
        assert!(matches!(err, ArgumentError::Decode(_)));

        let err = ToolRequest::parse(ToolId::DeepResearcherCheck, serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(err, ArgumentError::Decode(_)));
    }

    #[test]
    fn test_rejects_blank_query_and_bad_counts() {
        assert!(ToolRequest::parse(ToolId::WebSearch, json!({"query": "  "})).is_err());
        assert!(
            ToolRequest::parse(ToolId::WebSearch, json!({"query": "x", "numResults": 0})).is_err()
        );
        assert!(ToolRequest::parse(
            ToolId::CodeContext,
            json!({"query": "x", "tokensNum": 10})
        )
        .is_err());
    }

    #[test]
    fn test_crawl_url_validation() {
        assert!(ToolRequest::parse(ToolId::Crawling, json!({"url": "https://exa.ai"})).is_ok());
        assert!(ToolRequest::parse(ToolId::Crawling, json!({"url": "not a url"})).is_err());
        assert!(ToolRequest::parse(ToolId::Crawling, json!({"url": "ftp://exa.ai"})).is_err());
    }

    #[test]
    fn test_task_id_must_be_opaque_token() {
        let ok = ToolRequest::parse(
            ToolId::DeepResearcherCheck,
            json!({"taskId": "01jz8qk9x3c4v5b6n7m8"}),
        );
        assert!(ok.is_ok());

        for task_id in ["../../search?q=x", "a/b", "abc#x", "abc?x", "..", "a%2Fb", "a b"] {
            let err =
                ToolRequest::parse(ToolId::DeepResearcherCheck, json!({ "taskId": task_id }))
                    .unwrap_err();
            assert!(matches!(err, ArgumentError::Invalid(_)), "{}", task_id);
        }
    }

    #[test]
    fn test_defaults_for_optional_enums() {
        let request =
            ToolRequest::parse(ToolId::LinkedInSearch, json!({"query": "rustaceans"})).unwrap();
        match request {
            ToolRequest::LinkedInSearch(r) => assert_eq!(r.search_type, LinkedInSearchType::All),
            other => panic!("unexpected request: {:?}", other),
        }

        let request = ToolRequest::parse(
            ToolId::DeepResearcherStart,
            json!({"instructions": "survey", "model": "exa-research-pro"}),
        )
        .unwrap();
        match request {
            ToolRequest::DeepResearchStart(r) => assert_eq!(r.model, ResearchModel::Pro),
            other => panic!("unexpected request: {:?}", other),
        }
    }
}
