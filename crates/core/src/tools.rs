// Tool catalogue, enablement policy and typed request payloads

mod catalogue;
mod policy;
mod request;

pub use catalogue::{ToolId, ToolRegistration};
pub use policy::ToolPolicy;
pub use request::{
    CodeContextRequest, CompanyResearchRequest, CrawlRequest, DeepResearchCheckRequest,
    DeepResearchStartRequest, DeepSearchRequest, LinkedInSearchRequest, LinkedInSearchType,
    ResearchModel, ToolRequest, WebSearchRequest,
};

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: serde_json::Value, required: Vec<&str>) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_string_enum(values: &[&str], description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "enum": values,
        "description": description
    })
}

pub fn json_schema_number(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "number",
        "description": description
    })
}

pub fn json_schema_array(items: serde_json::Value, description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "array",
        "items": items,
        "description": description
    })
}
