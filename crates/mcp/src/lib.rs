// MCP (Model Context Protocol) over streamable HTTP
// Sessions, their transports, and tool dispatch to the search collaborator

pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

pub use dispatcher::ToolDispatcher;
pub use error::{DispatchError, TransportError};
pub use registry::SessionRegistry;
pub use server::{McpServer, RequestContext};
pub use transport::{CloseReason, McpTransport, PushStream, TransportState};

/// Header carrying the session id in both directions.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";
