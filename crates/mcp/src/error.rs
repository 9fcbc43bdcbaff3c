use crate::protocol::JsonRpcError;

/// Failure resolving a `tools/call` to a collaborator call.
///
/// These never terminate the owning session.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Tool {0} not found")]
    ToolNotFound(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl From<DispatchError> for JsonRpcError {
    fn from(err: DispatchError) -> Self {
        JsonRpcError::invalid_params(err.to_string())
    }
}

/// Failure at the session transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Session is closed")]
    Closed,

    #[error("Session is not initialized")]
    NotInitialized,

    #[error("Session is already initialized")]
    AlreadyInitialized,

    /// The message stream violated the protocol; the session has been closed.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
