//! Roots feature module (spec.md §4.5 "Roots").
//!
//! Roots are client-declared: the server asks `roots/list`, and a client
//! that declared `roots.listChanged` sends `notifications/roots/list_changed`
//! after any `set_roots` call.

use std::sync::Arc;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value;

use super::require_initialized;
use crate::error::McpError;
use crate::handshake::CapsHandle;
use crate::handshake::InitializedHandle;
use crate::peer::Peer;
use crate::transport::Cancellation;
use crate::types::capabilities::ClientCapabilities;
use crate::types::jsonrpc::JsonRpcErrorObject;
use crate::types::roots::validate_roots;
use crate::types::roots::Root;

#[derive(Debug, Serialize)]
struct ListRootsResult {
    roots: Vec<Root>,
}

/// The client-side roots module: a validated root list answering the
/// server's `roots/list` requests.
pub struct RootsClient {
    peer: Arc<Peer>,
    roots: RwLock<Vec<Root>>,
}

impl RootsClient {
    pub fn new(peer: &Arc<Peer>, roots: Vec<Root>) -> Result<Arc<Self>, McpError> {
        validate_roots(&roots).map_err(|e| McpError::InvalidParams(e.to_string()))?;
        let this = Arc::new(RootsClient {
            peer: Arc::clone(peer),
            roots: RwLock::new(roots),
        });
        this.register();
        Ok(this)
    }

    fn register(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.peer.on_request("roots/list", move |_ctx, _params| {
            let this = Arc::clone(&this);
            async move { this.handle_list() }
        });
    }

    fn handle_list(&self) -> Result<Value, JsonRpcErrorObject> {
        let roots = self.roots.read().expect("lock poisoned").clone();
        serde_json::to_value(ListRootsResult { roots })
            .map_err(|e| JsonRpcErrorObject::from(McpError::Internal(e.to_string())))
    }

    /// Replaces the whole root set atomically: either every entry validates
    /// and the swap happens, or none of it does (spec.md §4.5, P7 in §8).
    pub async fn set_roots(&self, roots: Vec<Root>) -> Result<(), McpError> {
        validate_roots(&roots).map_err(|e| McpError::InvalidParams(e.to_string()))?;
        *self.roots.write().expect("lock poisoned") = roots;
        if self.peer.is_started() {
            let _ = self
                .peer
                .send_notification(
                    "notifications/roots/list_changed",
                    Value::Object(Default::default()),
                )
                .await;
        }
        Ok(())
    }
}

/// The reverse-direction, server-side façade: calls `roots/list` on the
/// client, gated on the client's declared capabilities and on the
/// handshake having completed (spec.md §4.4, §4.5).
pub struct RootsServerFacade {
    peer: Arc<Peer>,
    client_capabilities: CapsHandle<ClientCapabilities>,
    initialized: InitializedHandle,
}

impl RootsServerFacade {
    pub fn new(
        peer: &Arc<Peer>,
        client_capabilities: CapsHandle<ClientCapabilities>,
        initialized: InitializedHandle,
    ) -> Arc<Self> {
        Arc::new(RootsServerFacade {
            peer: Arc::clone(peer),
            client_capabilities,
            initialized,
        })
    }

    fn check_declared(&self) -> Result<(), McpError> {
        let caps = self.client_capabilities.read().expect("lock poisoned");
        require_initialized(
            caps.as_ref().is_some_and(|c| c.roots.is_some()),
            self.initialized.load(std::sync::atomic::Ordering::SeqCst),
            "roots",
        )
    }

    pub async fn list(&self, cancellation: Cancellation) -> Result<Vec<Root>, McpError> {
        self.check_declared()?;
        let value = self
            .peer
            .send_request("roots/list", Value::Object(Default::default()), cancellation)
            .await?;
        let result: ListRootsResult = serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("deserialize roots/list result: {e}")))?;
        Ok(result.roots)
    }
}
