//! Capability negotiation (spec.md §4.4).
//!
//! Both roles run the same [`crate::peer::Peer`]; this module only differs
//! in which side sends `initialize` and which side answers it, per the
//! "symmetric core" design note in spec.md §9.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::RwLock;

use serde_json::Value;

use crate::error::McpError;
use crate::peer::Peer;
use crate::transport::Cancellation;
use crate::types::capabilities::ClientCapabilities;
use crate::types::capabilities::ServerCapabilities;
use crate::types::initialize::Implementation;
use crate::types::initialize::InitializeParams;
use crate::types::initialize::InitializeResult;
use crate::types::initialize::PROTOCOL_VERSION;
use crate::types::jsonrpc::JsonRpcErrorObject;

/// Shared storage for a remote's capability descriptor, set exactly once
/// when the handshake completes. Feature façades consult this before
/// issuing any wire request (spec.md §4.5, P5 in §8).
pub type CapsHandle<C> = Arc<RwLock<Option<C>>>;

fn new_caps_handle<C>() -> CapsHandle<C> {
    Arc::new(RwLock::new(None))
}

/// Handles returned to the client-mode initiator after a successful
/// handshake: the server's declared capabilities, for the composition root
/// to decide which feature façades to materialize (spec.md §4.4 step 2).
pub struct ClientHandshake {
    pub result: InitializeResult,
    pub server_capabilities: CapsHandle<ServerCapabilities>,
}

/// Drives the client side of the handshake: send `initialize`, verify the
/// protocol version, send `initialized`.
pub async fn initialize_client(
    peer: &Arc<Peer>,
    client_info: Implementation,
    client_capabilities: ClientCapabilities,
    cancellation: Cancellation,
) -> Result<ClientHandshake, McpError> {
    let params = InitializeParams {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: client_capabilities,
        client_info,
    };
    let params_value = serde_json::to_value(&params)
        .map_err(|e| McpError::Internal(format!("serialize initialize params: {e}")))?;

    let result_value = peer
        .send_request("initialize", params_value, cancellation)
        .await?;
    let result: InitializeResult = serde_json::from_value(result_value)
        .map_err(|e| McpError::Internal(format!("deserialize initialize result: {e}")))?;

    if result.protocol_version != PROTOCOL_VERSION {
        return Err(McpError::Internal(format!(
            "protocol version mismatch: we support {PROTOCOL_VERSION}, server returned {}",
            result.protocol_version
        )));
    }

    peer.send_notification("notifications/initialized", Value::Object(Default::default()))
        .await?;

    let server_capabilities = new_caps_handle();
    *server_capabilities.write().expect("lock poisoned") = Some(result.capabilities.clone());

    Ok(ClientHandshake {
        result,
        server_capabilities,
    })
}

/// Shared handle onto whether `notifications/initialized` has been
/// observed yet. Server-originated façades (roots, sampling) consult this
/// alongside capability presence before issuing a reverse-direction
/// request (spec.md §4.4: "neither side MAY send feature-module requests"
/// between `initialize` sent and `initialized` received).
pub type InitializedHandle = Arc<AtomicBool>;

/// Handles retained by server mode after registering the `initialize`
/// handler: the client's declared capabilities (materialized lazily, once
/// the handshake completes) and whether `notifications/initialized` has
/// been observed (gates server-initiated feature calls per spec.md §4.4).
pub struct ServerHandshake {
    pub client_capabilities: CapsHandle<ClientCapabilities>,
    client_initialized: InitializedHandle,
}

impl ServerHandshake {
    pub fn is_initialized(&self) -> bool {
        self.client_initialized.load(Ordering::SeqCst)
    }

    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.client_capabilities.read().expect("lock poisoned").clone()
    }

    /// A cheaply-cloneable handle a façade can hold onto without borrowing
    /// the whole `ServerHandshake`.
    pub fn initialized_handle(&self) -> InitializedHandle {
        Arc::clone(&self.client_initialized)
    }
}

/// Registers the `initialize` request handler (and the `initialized`
/// notification handler that flips the readiness flag) on a peer running
/// in server mode.
pub fn register_server_initialize(
    peer: &Arc<Peer>,
    server_info: Implementation,
    server_capabilities: ServerCapabilities,
) -> ServerHandshake {
    let client_capabilities: CapsHandle<ClientCapabilities> = new_caps_handle();
    let client_initialized = Arc::new(AtomicBool::new(false));

    let caps_for_handler = Arc::clone(&client_capabilities);
    peer.on_request("initialize", move |_ctx, params| {
        let caps_for_handler = Arc::clone(&caps_for_handler);
        let server_info = server_info.clone();
        let server_capabilities = server_capabilities.clone();
        async move {
            let params: InitializeParams = serde_json::from_value(params.unwrap_or(Value::Null))
                .map_err(|e| JsonRpcErrorObject::from(McpError::InvalidParams(e.to_string())))?;

            if params.protocol_version != PROTOCOL_VERSION {
                return Err(JsonRpcErrorObject::from(McpError::InvalidRequest(format!(
                    "unsupported protocol version {}, expected {PROTOCOL_VERSION}",
                    params.protocol_version
                ))));
            }

            *caps_for_handler.write().expect("lock poisoned") = Some(params.capabilities);

            let result = InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: server_capabilities,
                server_info,
            };
            serde_json::to_value(&result)
                .map_err(|e| JsonRpcErrorObject::from(McpError::Internal(e.to_string())))
        }
    });

    let initialized_flag = Arc::clone(&client_initialized);
    peer.on_notification("notifications/initialized", move |_ctx, _params| {
        let initialized_flag = Arc::clone(&initialized_flag);
        async move {
            initialized_flag.store(true, Ordering::SeqCst);
        }
    });

    ServerHandshake {
        client_capabilities,
        client_initialized,
    }
}
