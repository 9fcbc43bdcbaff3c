// Session registry: the single source of truth for live sessions

use crate::dispatcher::ToolDispatcher;
use crate::protocol::ServerInfo;
use crate::server::McpServer;
use crate::transport::{CloseReason, McpTransport};
use exa_gateway_core::backend::SearchBackend;
use exa_gateway_core::tools::ToolPolicy;
use exa_gateway_core::SessionId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Process-wide map from session id to its transport.
///
/// The map owns every transport; handlers borrow an `Arc` for the duration of
/// one request. Entries are removed exactly once, by whichever close path
/// fires first.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: RwLock<HashMap<SessionId, Arc<McpTransport>>>,
    policy: ToolPolicy,
    backend: Arc<dyn SearchBackend>,
    server_info: ServerInfo,
}

impl RegistryInner {
    fn detach(&self, id: &SessionId) -> Option<Arc<McpTransport>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

impl SessionRegistry {
    pub fn new(policy: ToolPolicy, backend: Arc<dyn SearchBackend>) -> Self {
        Self::with_server_info(policy, backend, ServerInfo::default())
    }

    pub fn with_server_info(
        policy: ToolPolicy,
        backend: Arc<dyn SearchBackend>,
        server_info: ServerInfo,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                policy,
                backend,
                server_info,
            }),
        }
    }

    /// Tool policy every new session's dispatcher is built from.
    pub fn policy(&self) -> &ToolPolicy {
        &self.inner.policy
    }

    /// Create and register a new session with a fresh dispatcher.
    pub fn create(&self) -> (SessionId, Arc<McpTransport>) {
        let server = McpServer::new(
            ToolDispatcher::new(self.inner.policy.clone(), self.inner.backend.clone()),
            self.inner.server_info.clone(),
        );

        let mut sessions = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let id = loop {
            let candidate = SessionId::generate();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let transport = Arc::new(McpTransport::new(
            id.clone(),
            server,
            move |id: &SessionId| {
                if let Some(registry) = registry.upgrade() {
                    registry.detach(id);
                }
            },
        ));

        sessions.insert(id.clone(), transport.clone());
        tracing::debug!(session_id = %id, active = sessions.len(), "Session created");

        (id, transport)
    }

    pub fn lookup(&self, id: &SessionId) -> Option<Arc<McpTransport>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Remove a session and close its transport. Absent ids are a no-op.
    pub fn remove(&self, id: &SessionId) -> bool {
        // The map lock is released before closing; the close callback re-enters it
        match self.inner.detach(id) {
            Some(transport) => {
                transport.close(CloseReason::Deleted);
                true
            }
            None => false,
        }
    }

    /// Close every live session, ending their push streams.
    pub fn close_all(&self) {
        let sessions: Vec<Arc<McpTransport>> = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, transport)| transport)
            .collect();

        if !sessions.is_empty() {
            tracing::info!(count = sessions.len(), "Closing live sessions");
        }
        for transport in sessions {
            transport.close(CloseReason::Shutdown);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
