//! Resources feature module (spec.md §4.5 "Resources").

use std::collections::HashSet;
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
use crate::types::resources::Resource;
use crate::types::resources::ResourceContents;
use crate::types::resources::ResourceTemplate;
use crate::types::ServerCapabilities;

type ContentHandler =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Vec<ResourceContents>, McpError>> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct ListParams {
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListResourcesResult {
    resources: Vec<Resource>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListTemplatesResult {
    #[serde(rename = "resourceTemplates")]
    resource_templates: Vec<ResourceTemplate>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UriParams {
    uri: String,
}

#[derive(Debug, Serialize)]
struct ReadResourceResult {
    contents: Vec<ResourceContents>,
}

/// The server-side resources module: a resource list, a template list,
/// `(uriPrefix → content handler)` bindings, and the subscription set.
pub struct ResourcesServer {
    peer: Arc<Peer>,
    resources: RwLock<Vec<Resource>>,
    templates: RwLock<Vec<ResourceTemplate>>,
    handlers: RwLock<Vec<(String, ContentHandler)>>,
    subscriptions: RwLock<HashSet<String>>,
}

impl ResourcesServer {
    pub fn new(
        peer: &Arc<Peer>,
        resources: Vec<Resource>,
        templates: Vec<ResourceTemplate>,
    ) -> Arc<Self> {
        let this = Arc::new(ResourcesServer {
            peer: Arc::clone(peer),
            resources: RwLock::new(resources),
            templates: RwLock::new(templates),
            handlers: RwLock::new(Vec::new()),
            subscriptions: RwLock::new(HashSet::new()),
        });
        this.register();
        this
    }

    fn register(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.peer.on_request("resources/list", move |_ctx, params| {
            let this = Arc::clone(&this);
            async move { this.handle_list(params) }
        });

        let this = Arc::clone(self);
        self.peer
            .on_request("resources/templates/list", move |_ctx, params| {
                let this = Arc::clone(&this);
                async move { this.handle_list_templates(params) }
            });

        let this = Arc::clone(self);
        self.peer.on_request("resources/read", move |_ctx, params| {
            let this = Arc::clone(&this);
            async move { this.handle_read(params).await }
        });

        let this = Arc::clone(self);
        self.peer
            .on_request("resources/subscribe", move |_ctx, params| {
                let this = Arc::clone(&this);
                async move { this.handle_subscribe(params) }
            });

        let this = Arc::clone(self);
        self.peer
            .on_request("resources/unsubscribe", move |_ctx, params| {
                let this = Arc::clone(&this);
                async move { this.handle_unsubscribe(params) }
            });
    }

    fn handle_list(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorObject> {
        let params: ListParams = parse_params(params)?;
        let resources = self.resources.read().expect("lock poisoned").clone();
        let (page, next_cursor) = paginate(&resources, params.cursor.as_deref(), DEFAULT_PAGE_SIZE);
        to_value(ListResourcesResult {
            resources: page,
            next_cursor,
        })
    }

    fn handle_list_templates(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorObject> {
        let params: ListParams = parse_params(params)?;
        let templates = self.templates.read().expect("lock poisoned").clone();
        let (page, next_cursor) = paginate(&templates, params.cursor.as_deref(), DEFAULT_PAGE_SIZE);
        to_value(ListTemplatesResult {
            resource_templates: page,
            next_cursor,
        })
    }

    /// Finds the content handler via longest-prefix match among registered
    /// bindings, ties broken by registration order (spec.md §9 Open
    /// Question, resolved in SPEC_FULL.md §4.5).
    fn find_handler(&self, uri: &str) -> Option<ContentHandler> {
        let handlers = self.handlers.read().expect("lock poisoned");
        handlers
            .iter()
            .filter(|(prefix, _)| uri.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, handler)| Arc::clone(handler))
    }

    async fn handle_read(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorObject> {
        let params: UriParams = parse_params(params)?;
        let handler = self.find_handler(&params.uri).ok_or_else(|| {
            JsonRpcErrorObject::from(McpError::InvalidParams(format!(
                "no content handler registered for uri {}",
                params.uri
            )))
        })?;
        let contents = handler(params.uri)
            .await
            .map_err(JsonRpcErrorObject::from)?;
        to_value(ReadResourceResult { contents })
    }

    fn handle_subscribe(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorObject> {
        let params: UriParams = parse_params(params)?;
        self.subscriptions
            .write()
            .expect("lock poisoned")
            .insert(params.uri);
        to_value(Value::Object(Default::default()))
    }

    fn handle_unsubscribe(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorObject> {
        let params: UriParams = parse_params(params)?;
        self.subscriptions
            .write()
            .expect("lock poisoned")
            .remove(&params.uri);
        to_value(Value::Object(Default::default()))
    }

    pub fn bind<F>(&self, uri_prefix: impl Into<String>, handler: F)
    where
        F: Fn(String) -> BoxFuture<'static, Result<Vec<ResourceContents>, McpError>> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .expect("lock poisoned")
            .push((uri_prefix.into(), Arc::new(handler)));
    }

    /// Replaces the resource list and, if started, sends `list_changed`.
    pub async fn set_resources(&self, list: Vec<Resource>) {
        *self.resources.write().expect("lock poisoned") = list;
        if self.peer.is_started() {
            let _ = self
                .peer
                .send_notification(
                    "notifications/resources/list_changed",
                    Value::Object(Default::default()),
                )
                .await;
        }
    }

    /// Fans out a notification iff `uri` has at least one subscriber;
    /// otherwise a no-op (spec.md §4.5, P6 in §8).
    pub async fn notify_updated(&self, uri: &str) {
        let subscribed = self
            .subscriptions
            .read()
            .expect("lock poisoned")
            .contains(uri);
        if !subscribed {
            return;
        }
        let params = serde_json::json!({ "uri": uri });
        let _ = self
            .peer
            .send_notification("notifications/resources/updated", params)
            .await;
    }
}

/// The client-side façade: calls `resources/*` on the server and surfaces
/// `notifications/resources/updated` via a channel the application drains.
pub struct ResourcesClient {
    peer: Arc<Peer>,
    server_capabilities: CapsHandle<ServerCapabilities>,
    updates_rx: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    list_changed_rx: AsyncMutex<mpsc::UnboundedReceiver<()>>,
}

impl ResourcesClient {
    pub fn new(peer: &Arc<Peer>, server_capabilities: CapsHandle<ServerCapabilities>) -> Arc<Self> {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (list_changed_tx, list_changed_rx) = mpsc::unbounded_channel();

        peer.on_notification("notifications/resources/updated", move |_ctx, params| {
            let updates_tx = updates_tx.clone();
            async move {
                if let Some(uri) = params.and_then(|v| v.get("uri").and_then(|u| u.as_str().map(String::from))) {
                    let _ = updates_tx.send(uri);
                }
            }
        });
        peer.on_notification(
            "notifications/resources/list_changed",
            move |_ctx, _params| {
                let list_changed_tx = list_changed_tx.clone();
                async move {
                    let _ = list_changed_tx.send(());
                }
            },
        );

        Arc::new(ResourcesClient {
            peer: Arc::clone(peer),
            server_capabilities,
            updates_rx: AsyncMutex::new(updates_rx),
            list_changed_rx: AsyncMutex::new(list_changed_rx),
        })
    }

    fn check_declared(&self) -> Result<(), McpError> {
        let caps = self.server_capabilities.read().expect("lock poisoned");
        require(
            caps.as_ref().is_some_and(|c| c.resources.is_some()),
            "resources",
        )
    }

    pub async fn list(
        &self,
        cursor: Option<String>,
        cancellation: Cancellation,
    ) -> Result<(Vec<Resource>, Option<String>), McpError> {
        self.check_declared()?;
        let params = serde_json::json!({ "cursor": cursor });
        let value = self
            .peer
            .send_request("resources/list", params, cancellation)
            .await?;
        let result: ListResourcesResult = serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("deserialize resources/list result: {e}")))?;
        Ok((result.resources, result.next_cursor))
    }

    pub async fn read(
        &self,
        uri: impl Into<String>,
        cancellation: Cancellation,
    ) -> Result<Vec<ResourceContents>, McpError> {
        self.check_declared()?;
        let params = serde_json::json!({ "uri": uri.into() });
        let value = self
            .peer
            .send_request("resources/read", params, cancellation)
            .await?;
        let result: ReadResourceResult = serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("deserialize resources/read result: {e}")))?;
        Ok(result.contents)
    }

    pub async fn subscribe(
        &self,
        uri: impl Into<String>,
        cancellation: Cancellation,
    ) -> Result<(), McpError> {
        self.check_declared()?;
        let params = serde_json::json!({ "uri": uri.into() });
        self.peer
            .send_request("resources/subscribe", params, cancellation)
            .await?;
        Ok(())
    }

    pub async fn unsubscribe(
        &self,
        uri: impl Into<String>,
        cancellation: Cancellation,
    ) -> Result<(), McpError> {
        self.check_declared()?;
        let params = serde_json::json!({ "uri": uri.into() });
        self.peer
            .send_request("resources/unsubscribe", params, cancellation)
            .await?;
        Ok(())
    }

    /// Awaits the next `notifications/resources/updated` uri. Used by
    /// tests/applications that want to observe subscription fan-out.
    pub async fn next_update(&self) -> Option<String> {
        self.updates_rx.lock().await.recv().await
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
