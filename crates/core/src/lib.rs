// Core types and functionality for the Exa MCP gateway

pub mod analytics;
pub mod backend;
pub mod error;
pub mod tools;
pub mod types;

pub use types::*;
