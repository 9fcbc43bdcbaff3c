// Static catalogue of the tools the gateway can expose

use super::{
    json_schema_array, json_schema_number, json_schema_object, json_schema_string,
    json_schema_string_enum,
};
use serde::{Deserialize, Serialize};

/// Every tool the gateway knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ToolId {
    #[serde(rename = "web_search_exa")]
    WebSearch,
    #[serde(rename = "get_code_context_exa")]
    CodeContext,
    #[serde(rename = "deep_search_exa")]
    DeepSearch,
    #[serde(rename = "company_research_exa")]
    CompanyResearch,
    #[serde(rename = "crawling_exa")]
    Crawling,
    #[serde(rename = "linkedin_search_exa")]
    LinkedInSearch,
    #[serde(rename = "deep_researcher_start")]
    DeepResearcherStart,
    #[serde(rename = "deep_researcher_check")]
    DeepResearcherCheck,
}

/// Static description of one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolRegistration {
    pub id: ToolId,
    pub display_name: &'static str,
    pub description: &'static str,
    pub default_enabled: bool,
}

impl ToolId {
    pub const ALL: [ToolId; 8] = [
        ToolId::WebSearch,
        ToolId::CodeContext,
        ToolId::DeepSearch,
        ToolId::CompanyResearch,
        ToolId::Crawling,
        ToolId::LinkedInSearch,
        ToolId::DeepResearcherStart,
        ToolId::DeepResearcherCheck,
    ];

    /// Protocol-level name used in `tools/list` and `tools/call`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::WebSearch => "web_search_exa",
            ToolId::CodeContext => "get_code_context_exa",
            ToolId::DeepSearch => "deep_search_exa",
            ToolId::CompanyResearch => "company_research_exa",
            ToolId::Crawling => "crawling_exa",
            ToolId::LinkedInSearch => "linkedin_search_exa",
            ToolId::DeepResearcherStart => "deep_researcher_start",
            ToolId::DeepResearcherCheck => "deep_researcher_check",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.as_str() == name)
    }

    pub fn registration(&self) -> ToolRegistration {
        let (display_name, description, default_enabled) = match self {
            ToolId::WebSearch => (
                "Web Search",
                "Search the web in real time and return the content of the best matching pages.",
                true,
            ),
            ToolId::CodeContext => (
                "Code Context Search",
                "Find code snippets, documentation and examples for libraries, SDKs and APIs.",
                true,
            ),
            ToolId::DeepSearch => (
                "Deep Search",
                "Run an expanded multi-query search for a research objective and return summarized results.",
                false,
            ),
            ToolId::CompanyResearch => (
                "Company Research",
                "Gather information about a company from its website and other business sources.",
                false,
            ),
            ToolId::Crawling => (
                "Web Crawling",
                "Extract the content of a specific URL.",
                false,
            ),
            ToolId::LinkedInSearch => (
                "LinkedIn Search",
                "Search LinkedIn profiles and company pages.",
                false,
            ),
            ToolId::DeepResearcherStart => (
                "Deep Researcher Start",
                "Start an asynchronous research task and return its task id.",
                false,
            ),
            ToolId::DeepResearcherCheck => (
                "Deep Researcher Check",
                "Check the status of a research task and return its report once completed.",
                false,
            ),
        };

        ToolRegistration {
            id: *self,
            display_name,
            description,
            default_enabled,
        }
    }

    /// JSON schema of the tool's `tools/call` arguments.
    pub fn input_schema(&self) -> serde_json::Value {
        match self {
            ToolId::WebSearch => json_schema_object(
                serde_json::json!({
                    "query": json_schema_string("Search query"),
                    "numResults": json_schema_number("Number of results to return (default: 8)")
                }),
                vec!["query"],
            ),
            ToolId::CodeContext => json_schema_object(
                serde_json::json!({
                    "query": json_schema_string("What code context to look for, e.g. 'tokio select macro examples'"),
                    "tokensNum": json_schema_number("Token budget for the returned context (1000-50000, default: dynamic)")
                }),
                vec!["query"],
            ),
            ToolId::DeepSearch => json_schema_object(
                serde_json::json!({
                    "objective": json_schema_string("Natural language description of what to find"),
                    "searchQueries": json_schema_array(
                        json_schema_string("Search query"),
                        "Optional extra queries to run alongside the objective"
                    )
                }),
                vec!["objective"],
            ),
            ToolId::CompanyResearch => json_schema_object(
                serde_json::json!({
                    "companyName": json_schema_string("Name of the company to research"),
                    "numResults": json_schema_number("Number of results to return (default: 5)")
                }),
                vec!["companyName"],
            ),
            ToolId::Crawling => json_schema_object(
                serde_json::json!({
                    "url": json_schema_string("URL to crawl"),
                    "maxCharacters": json_schema_number("Maximum characters to extract (default: 3000)")
                }),
                vec!["url"],
            ),
            ToolId::LinkedInSearch => json_schema_object(
                serde_json::json!({
                    "query": json_schema_string("Search query, e.g. a person's name or a company"),
                    "searchType": json_schema_string_enum(
                        &["profiles", "companies", "all"],
                        "What to search for (default: all)"
                    ),
                    "numResults": json_schema_number("Number of results to return (default: 5)")
                }),
                vec!["query"],
            ),
            ToolId::DeepResearcherStart => json_schema_object(
                serde_json::json!({
                    "instructions": json_schema_string("Research question or task description"),
                    "model": json_schema_string_enum(
                        &["exa-research", "exa-research-pro"],
                        "Research model (default: exa-research)"
                    )
                }),
                vec!["instructions"],
            ),
            ToolId::DeepResearcherCheck => json_schema_object(
                serde_json::json!({
                    "taskId": json_schema_string("Task id returned by deep_researcher_start")
                }),
                vec!["taskId"],
            ),
        }
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
