//! Tools feature module (spec.md §4.5 "Tools").

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use super::paginate;
use super::require;
use super::DEFAULT_PAGE_SIZE;
use crate::error::McpError;
use crate::handshake::CapsHandle;
use crate::peer::Peer;
use crate::transport::Cancellation;
use crate::types::jsonrpc::JsonRpcErrorObject;
use crate::types::tools::CallToolParams;
use crate::types::tools::CallToolResult;
use crate::types::tools::Tool;
use crate::types::ServerCapabilities;

type ToolHandler =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<CallToolResult, McpError>> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct ListParams {
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListToolsResult {
    tools: Vec<Tool>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    next_cursor: Option<String>,
}

/// The server-side tools module: a tool list plus a `(name → handler)` map.
pub struct ToolsServer {
    peer: Arc<Peer>,
    tools: RwLock<Vec<Tool>>,
    handlers: RwLock<HashMap<String, ToolHandler>>,
}

impl ToolsServer {
    pub fn new(peer: &Arc<Peer>, tools: Vec<Tool>) -> Arc<Self> {
        let this = Arc::new(ToolsServer {
            peer: Arc::clone(peer),
            tools: RwLock::new(tools),
            handlers: RwLock::new(HashMap::new()),
        });
        this.register();
        this
    }

    fn register(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.peer.on_request("tools/list", move |_ctx, params| {
            let this = Arc::clone(&this);
            async move { this.handle_list(params) }
        });

        let this = Arc::clone(self);
        self.peer.on_request("tools/call", move |_ctx, params| {
            let this = Arc::clone(&this);
            async move { this.handle_call(params).await }
        });
    }

    fn handle_list(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorObject> {
        let params: ListParams = parse_params(params)?;
        let tools = self.tools.read().expect("lock poisoned").clone();
        let (page, next_cursor) = paginate(&tools, params.cursor.as_deref(), DEFAULT_PAGE_SIZE);
        to_value(ListToolsResult {
            tools: page,
            next_cursor,
        })
    }

    /// A tool handler returning `Err` becomes a JSON-RPC error response; a
    /// tool that ran but failed *as a tool* should instead return
    /// `Ok(CallToolResult::error(..))` — spec.md §4.5 keeps the two
    /// failure modes distinct.
    async fn handle_call(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorObject> {
        let params: CallToolParams = parse_params(params)?;
        let handler = self
            .handlers
            .read()
            .expect("lock poisoned")
            .get(&params.name)
            .cloned()
            .ok_or_else(|| {
                JsonRpcErrorObject::from(McpError::MethodNotFound(format!(
                    "no tool registered with name {}",
                    params.name
                )))
            })?;
        let result = handler(params.arguments)
            .await
            .map_err(JsonRpcErrorObject::from)?;
        to_value(result)
    }

    pub fn bind<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> BoxFuture<'static, Result<CallToolResult, McpError>> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .expect("lock poisoned")
            .insert(name.into(), Arc::new(handler));
    }

    pub async fn set_tools(&self, list: Vec<Tool>) {
        *self.tools.write().expect("lock poisoned") = list;
        if self.peer.is_started() {
            let _ = self
                .peer
                .send_notification(
                    "notifications/tools/list_changed",
                    Value::Object(Default::default()),
                )
                .await;
        }
    }
}

/// Client-side façade: calls `tools/*` on the server, gated on the
/// handshake's declared capabilities.
pub struct ToolsClient {
    peer: Arc<Peer>,
    server_capabilities: CapsHandle<ServerCapabilities>,
    list_changed_rx: AsyncMutex<mpsc::UnboundedReceiver<()>>,
}

impl ToolsClient {
    pub fn new(peer: &Arc<Peer>, server_capabilities: CapsHandle<ServerCapabilities>) -> Arc<Self> {
        let (list_changed_tx, list_changed_rx) = mpsc::unbounded_channel();
        peer.on_notification("notifications/tools/list_changed", move |_ctx, _params| {
            let list_changed_tx = list_changed_tx.clone();
            async move {
                let _ = list_changed_tx.send(());
            }
        });

        Arc::new(ToolsClient {
            peer: Arc::clone(peer),
            server_capabilities,
            list_changed_rx: AsyncMutex::new(list_changed_rx),
        })
    }

    fn check_declared(&self) -> Result<(), McpError> {
        let caps = self.server_capabilities.read().expect("lock poisoned");
        require(caps.as_ref().is_some_and(|c| c.tools.is_some()), "tools")
    }

    pub async fn list(
        &self,
        cursor: Option<String>,
        cancellation: Cancellation,
    ) -> Result<(Vec<Tool>, Option<String>), McpError> {
        self.check_declared()?;
        let params = serde_json::json!({ "cursor": cursor });
        let value = self
            .peer
            .send_request("tools/list", params, cancellation)
            .await?;
        let result: ListToolsResult = serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("deserialize tools/list result: {e}")))?;
        Ok((result.tools, result.next_cursor))
    }

    pub async fn call(
        &self,
        name: impl Into<String>,
        arguments: Option<Value>,
        cancellation: Cancellation,
    ) -> Result<CallToolResult, McpError> {
        self.check_declared()?;
        let params = serde_json::json!({ "name": name.into(), "arguments": arguments });
        let value = self
            .peer
            .send_request("tools/call", params, cancellation)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("deserialize tools/call result: {e}")))
    }

    pub async fn next_list_changed(&self) -> Option<()> {
        self.list_changed_rx.lock().await.recv().await
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcErrorObject> {
    serde_json::from_value(params.unwrap_or_default())
        .map_err(|e| JsonRpcErrorObject::from(McpError::InvalidParams(e.to_string())))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, JsonRpcErrorObject> {
    serde_json::to_value(value).map_err(|e| JsonRpcErrorObject::from(McpError::Internal(e.to_string())))
}
