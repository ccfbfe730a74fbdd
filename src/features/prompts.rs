//! Prompts feature module (spec.md §4.5 "Prompts").

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
use crate::types::prompts::Prompt;
use crate::types::prompts::PromptMessage;
use crate::types::ServerCapabilities;

type PromptGetter = Arc<
    dyn Fn(Option<Value>) -> BoxFuture<'static, Result<PromptGetOutput, McpError>> + Send + Sync,
>;

/// What a getter produces for `prompts/get`: the rendered messages plus an
/// optional description of the rendered prompt (spec.md §4.5's
/// `{description?, messages}` result shape).
pub struct PromptGetOutput {
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

impl From<Vec<PromptMessage>> for PromptGetOutput {
    fn from(messages: Vec<PromptMessage>) -> Self {
        PromptGetOutput {
            description: None,
            messages,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListPromptsResult {
    prompts: Vec<Prompt>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetPromptParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetPromptResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    messages: Vec<PromptMessage>,
}

/// The server-side prompts module: a prompt list plus a `(name → getter)`
/// map, each getter rendering that prompt's messages for the supplied
/// arguments.
pub struct PromptsServer {
    peer: Arc<Peer>,
    prompts: RwLock<Vec<Prompt>>,
    getters: RwLock<HashMap<String, PromptGetter>>,
}

impl PromptsServer {
    pub fn new(peer: &Arc<Peer>, prompts: Vec<Prompt>) -> Arc<Self> {
        let this = Arc::new(PromptsServer {
            peer: Arc::clone(peer),
            prompts: RwLock::new(prompts),
            getters: RwLock::new(HashMap::new()),
        });
        this.register();
        this
    }

    fn register(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.peer.on_request("prompts/list", move |_ctx, params| {
            let this = Arc::clone(&this);
            async move { this.handle_list(params) }
        });

        let this = Arc::clone(self);
        self.peer.on_request("prompts/get", move |_ctx, params| {
            let this = Arc::clone(&this);
            async move { this.handle_get(params).await }
        });
    }

    fn handle_list(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorObject> {
        let params: ListParams = parse_params(params)?;
        let prompts = self.prompts.read().expect("lock poisoned").clone();
        let (page, next_cursor) = paginate(&prompts, params.cursor.as_deref(), DEFAULT_PAGE_SIZE);
        to_value(ListPromptsResult {
            prompts: page,
            next_cursor,
        })
    }

    async fn handle_get(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorObject> {
        let params: GetPromptParams = parse_params(params)?;
        let getter = self
            .getters
            .read()
            .expect("lock poisoned")
            .get(&params.name)
            .cloned()
            .ok_or_else(|| {
                JsonRpcErrorObject::from(McpError::MethodNotFound(format!(
                    "no prompt registered with name {}",
                    params.name
                )))
            })?;
        let output = getter(params.arguments)
            .await
            .map_err(JsonRpcErrorObject::from)?;
        to_value(GetPromptResult {
            description: output.description,
            messages: output.messages,
        })
    }

    pub fn bind<F>(&self, name: impl Into<String>, getter: F)
    where
        F: Fn(Option<Value>) -> BoxFuture<'static, Result<PromptGetOutput, McpError>> + Send + Sync + 'static,
    {
        self.getters
            .write()
            .expect("lock poisoned")
            .insert(name.into(), Arc::new(getter));
    }

    pub async fn set_prompts(&self, list: Vec<Prompt>) {
        *self.prompts.write().expect("lock poisoned") = list;
        if self.peer.is_started() {
            let _ = self
                .peer
                .send_notification(
                    "notifications/prompts/list_changed",
                    Value::Object(Default::default()),
                )
                .await;
        }
    }
}

/// Client-side façade: calls `prompts/*` on the server, gated on the
/// handshake's declared capabilities.
pub struct PromptsClient {
    peer: Arc<Peer>,
    server_capabilities: CapsHandle<ServerCapabilities>,
    list_changed_rx: AsyncMutex<mpsc::UnboundedReceiver<()>>,
}

impl PromptsClient {
    pub fn new(peer: &Arc<Peer>, server_capabilities: CapsHandle<ServerCapabilities>) -> Arc<Self> {
        let (list_changed_tx, list_changed_rx) = mpsc::unbounded_channel();
        peer.on_notification("notifications/prompts/list_changed", move |_ctx, _params| {
            let list_changed_tx = list_changed_tx.clone();
            async move {
                let _ = list_changed_tx.send(());
            }
        });

        Arc::new(PromptsClient {
            peer: Arc::clone(peer),
            server_capabilities,
            list_changed_rx: AsyncMutex::new(list_changed_rx),
        })
    }

    fn check_declared(&self) -> Result<(), McpError> {
        let caps = self.server_capabilities.read().expect("lock poisoned");
        require(caps.as_ref().is_some_and(|c| c.prompts.is_some()), "prompts")
    }

    pub async fn list(
        &self,
        cursor: Option<String>,
        cancellation: Cancellation,
    ) -> Result<(Vec<Prompt>, Option<String>), McpError> {
        self.check_declared()?;
        let params = serde_json::json!({ "cursor": cursor });
        let value = self
            .peer
            .send_request("prompts/list", params, cancellation)
            .await?;
        let result: ListPromptsResult = serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("deserialize prompts/list result: {e}")))?;
        Ok((result.prompts, result.next_cursor))
    }

    pub async fn get(
        &self,
        name: impl Into<String>,
        arguments: Option<Value>,
        cancellation: Cancellation,
    ) -> Result<(Option<String>, Vec<PromptMessage>), McpError> {
        self.check_declared()?;
        let params = serde_json::json!({ "name": name.into(), "arguments": arguments });
        let value = self
            .peer
            .send_request("prompts/get", params, cancellation)
            .await?;
        let result: GetPromptResult = serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("deserialize prompts/get result: {e}")))?;
        Ok((result.description, result.messages))
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
