//! Sampling feature module (spec.md §4.5 "Sampling").
//!
//! Sampling runs in the reverse direction from the other three features:
//! the server calls `sampling/createMessage` on the client, which is why
//! the "server-side" piece here is a façade that sends a request and the
//! "client-side" piece registers the handler that answers it.

use std::sync::Arc;

use serde_json::Value;

use super::require_initialized;
use crate::error::McpError;
use crate::handshake::CapsHandle;
use crate::handshake::InitializedHandle;
use crate::peer::Peer;
use crate::transport::Cancellation;
use crate::types::capabilities::ClientCapabilities;
use crate::types::jsonrpc::JsonRpcErrorObject;
use crate::types::sampling::CreateMessageParams;
use crate::types::sampling::CreateMessageResult;

type CreateMessageHandler = Arc<
    dyn Fn(CreateMessageParams) -> futures::future::BoxFuture<'static, Result<CreateMessageResult, McpError>>
        + Send
        + Sync,
>;

/// The client-side sampling module: validates an inbound
/// `sampling/createMessage` request before handing it to the caller's
/// handler (spec.md §4.5 — `messages` non-empty, `maxTokens` strictly
/// positive, both checked locally as `InvalidParams` before the handler
/// ever runs).
pub struct SamplingClient;

impl SamplingClient {
    pub fn new<F>(peer: &Arc<Peer>, handler: F) -> Arc<Self>
    where
        F: Fn(CreateMessageParams) -> futures::future::BoxFuture<'static, Result<CreateMessageResult, McpError>>
            + Send
            + Sync
            + 'static,
    {
        let handler: CreateMessageHandler = Arc::new(handler);
        peer.on_request("sampling/createMessage", move |_ctx, params| {
            let handler = Arc::clone(&handler);
            async move {
                let params: CreateMessageParams = serde_json::from_value(params.unwrap_or(Value::Null))
                    .map_err(|e| JsonRpcErrorObject::from(McpError::InvalidParams(e.to_string())))?;

                if params.messages.is_empty() {
                    return Err(JsonRpcErrorObject::from(McpError::InvalidParams(
                        "messages must not be empty".to_string(),
                    )));
                }
                if params.max_tokens <= 0 {
                    return Err(JsonRpcErrorObject::from(McpError::InvalidParams(
                        "maxTokens must be strictly positive".to_string(),
                    )));
                }

                let result = handler(params).await.map_err(JsonRpcErrorObject::from)?;
                serde_json::to_value(result)
                    .map_err(|e| JsonRpcErrorObject::from(McpError::Internal(e.to_string())))
            }
        });
        Arc::new(SamplingClient)
    }
}

/// The reverse-direction, server-side façade: calls
/// `sampling/createMessage` on the client, gated on the client's declared
/// capabilities and on the handshake having completed (spec.md §4.4, §4.5).
pub struct SamplingServerFacade {
    peer: Arc<Peer>,
    client_capabilities: CapsHandle<ClientCapabilities>,
    initialized: InitializedHandle,
}

impl SamplingServerFacade {
    pub fn new(
        peer: &Arc<Peer>,
        client_capabilities: CapsHandle<ClientCapabilities>,
        initialized: InitializedHandle,
    ) -> Arc<Self> {
        Arc::new(SamplingServerFacade {
            peer: Arc::clone(peer),
            client_capabilities,
            initialized,
        })
    }

    fn check_declared(&self) -> Result<(), McpError> {
        let caps = self.client_capabilities.read().expect("lock poisoned");
        require_initialized(
            caps.as_ref().is_some_and(|c| c.sampling.is_some()),
            self.initialized.load(std::sync::atomic::Ordering::SeqCst),
            "sampling",
        )
    }

    pub async fn create_message(
        &self,
        params: CreateMessageParams,
        cancellation: Cancellation,
    ) -> Result<CreateMessageResult, McpError> {
        self.check_declared()?;
        let params_value = serde_json::to_value(&params)
            .map_err(|e| McpError::Internal(format!("serialize createMessage params: {e}")))?;
        let value = self
            .peer
            .send_request("sampling/createMessage", params_value, cancellation)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("deserialize createMessage result: {e}")))
    }
}
