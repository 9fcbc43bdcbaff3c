//! Per-session protocol transport.
//!
//! An [`McpTransport`] turns HTTP request bodies into protocol exchanges for
//! exactly one session and owns that session's push channel. It moves through
//! `Uninitialized -> Active -> Closed`; entering `Closed` runs the close
//! callback exactly once, whichever path triggered it.

use crate::error::TransportError;
use crate::protocol::{ClientMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpPayload};
use crate::server::{McpServer, RequestContext};
use exa_gateway_core::SessionId;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const PUSH_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Uninitialized,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit DELETE or registry removal.
    Deleted,
    /// A push stream's client went away.
    Disconnected,
    ProtocolViolation,
    Shutdown,
}

type CloseCallback = Box<dyn Fn(&SessionId) + Send + Sync>;

pub struct McpTransport {
    session_id: SessionId,
    server: McpServer,
    state: Mutex<TransportState>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    outbound: broadcast::Sender<JsonRpcRequest>,
    on_close: CloseCallback,
}

impl McpTransport {
    pub fn new(
        session_id: SessionId,
        server: McpServer,
        on_close: impl Fn(&SessionId) + Send + Sync + 'static,
    ) -> Self {
        let (outbound, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);

        Self {
            session_id,
            server,
            state: Mutex::new(TransportState::Uninitialized),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            outbound,
            on_close: Box::new(on_close),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> TransportState {
        *self.lock_state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == TransportState::Active
    }

    fn lock_state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver one POST body and return the correlated response(s).
    ///
    /// `Ok(None)` means the body held only notifications or responses.
    pub async fn handle(
        &self,
        payload: McpPayload,
        ctx: &RequestContext,
    ) -> Result<Option<Value>, TransportError> {
        if self.state() == TransportState::Closed {
            return Err(TransportError::Closed);
        }

        match payload {
            McpPayload::Single(message) => match self.handle_message(message, ctx).await? {
                Some(response) => Ok(Some(
                    serde_json::to_value(response).map_err(anyhow::Error::from)?,
                )),
                None => Ok(None),
            },
            McpPayload::Batch(messages) if messages.is_empty() => {
                let response = JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::invalid_request("Empty batch"),
                );
                Ok(Some(serde_json::to_value(response).map_err(anyhow::Error::from)?))
            }
            McpPayload::Batch(messages) => {
                let mut responses = Vec::new();
                for message in messages {
                    if let Some(response) = self.handle_message(message, ctx).await? {
                        responses.push(response);
                    }
                }

                if responses.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(
                        serde_json::to_value(responses).map_err(anyhow::Error::from)?,
                    ))
                }
            }
        }
    }

    async fn handle_message(
        &self,
        message: Value,
        ctx: &RequestContext,
    ) -> Result<Option<JsonRpcResponse>, TransportError> {
        let message = match ClientMessage::from_value(message) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e.message, "Malformed JSON-RPC message");
                self.close(CloseReason::ProtocolViolation);
                return Err(TransportError::ProtocolViolation(e.message));
            }
        };

        match message {
            ClientMessage::Request(request) if request.method == "initialize" => {
                let mut state = self.lock_state();
                match *state {
                    TransportState::Uninitialized => {
                        let response = self.server.initialize(&request);
                        if response.error.is_none() {
                            *state = TransportState::Active;
                            tracing::info!(session_id = %self.session_id, "Session initialized");
                        }
                        Ok(Some(response))
                    }
                    TransportState::Active => Err(TransportError::AlreadyInitialized),
                    TransportState::Closed => Err(TransportError::Closed),
                }
            }
            ClientMessage::Request(request) => {
                self.ensure_active()?;
                let response = self.server.handle_request(&request, ctx).await;
                if request.method == "tools/call" {
                    self.notify_tool_outcome(&request, &response);
                }
                Ok(Some(response))
            }
            ClientMessage::Notification(notification) => {
                if self.state() == TransportState::Closed {
                    return Err(TransportError::Closed);
                }
                tracing::debug!(session_id = %self.session_id, method = %notification.method, "Notification received");
                Ok(None)
            }
            ClientMessage::Response(_) => Ok(None),
        }
    }

    fn ensure_active(&self) -> Result<(), TransportError> {
        match self.state() {
            TransportState::Active => Ok(()),
            TransportState::Uninitialized => Err(TransportError::NotInitialized),
            TransportState::Closed => Err(TransportError::Closed),
        }
    }

    fn notify_tool_outcome(&self, request: &JsonRpcRequest, response: &JsonRpcResponse) {
        let tool = request
            .params
            .as_ref()
            .and_then(|params| params.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let failed = response.error.is_some()
            || response
                .result
                .as_ref()
                .and_then(|result| result.get("isError"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
        let outcome = if failed { "failed" } else { "completed" };

        self.notify(
            "notifications/message",
            serde_json::json!({
                "level": "info",
                "logger": "exa",
                "data": format!("{} {}", tool, outcome),
            }),
        );
    }

    /// Push a server-initiated notification to every open stream.
    /// Returns how many streams received it.
    pub fn notify(&self, method: &str, params: Value) -> usize {
        self.outbound
            .send(JsonRpcRequest::notification(method, params))
            .unwrap_or(0)
    }

    /// Open a push stream. Requires an Active session.
    ///
    /// Dropping the stream (client disconnect) closes the session.
    pub fn open_stream(self: &Arc<Self>) -> Result<PushStream, TransportError> {
        self.ensure_active()?;
        tracing::debug!(session_id = %self.session_id, "Push stream opened");

        Ok(PushStream {
            transport: Arc::clone(self),
            receiver: self.outbound.subscribe(),
            shutdown: self.shutdown.clone(),
        })
    }

    /// Move to `Closed`. Only the first call has any effect.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        *self.lock_state() = TransportState::Closed;
        self.shutdown.cancel();
        tracing::info!(session_id = %self.session_id, reason = ?reason, "Session closed");
        (self.on_close)(&self.session_id);
        true
    }
}

/// Server-to-client message stream for one GET request.
pub struct PushStream {
    transport: Arc<McpTransport>,
    receiver: broadcast::Receiver<JsonRpcRequest>,
    shutdown: CancellationToken,
}

impl PushStream {
    pub fn session_id(&self) -> &SessionId {
        self.transport.session_id()
    }

    /// Next pushed message, or `None` once the session has closed.
    pub async fn next(&mut self) -> Option<JsonRpcRequest> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                received = self.receiver.recv() => match received {
                    Ok(message) => return Some(message),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(session_id = %self.transport.session_id(), missed, "Push stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }
}

impl Drop for PushStream {
    fn drop(&mut self) {
        self.transport.close(CloseReason::Disconnected);
    }
}
