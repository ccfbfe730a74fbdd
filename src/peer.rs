//! The peer dispatch engine (spec.md §4.3).
//!
//! Both "client" and "server" roles are the same [`Peer`] type — spec.md §9
//! insists the core stay symmetric. A peer correlates outbound requests
//! with inbound responses via an identifier→oneshot map (the stronger of
//! the two strategies spec.md §4.3 names, the one `mcp_client.rs`'s
//! `McpClient` uses), and dispatches inbound requests/notifications to
//! handlers registered by method name.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::RwLock;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::error::McpError;
use crate::router::Router;
use crate::router::RouterReceivers;
use crate::transport::Cancellation;
use crate::transport::DoneSignal;
use crate::transport::Transport;
use crate::types::jsonrpc::JsonRpcError;
use crate::types::jsonrpc::JsonRpcErrorObject;
use crate::types::jsonrpc::JsonRpcNotification;
use crate::types::jsonrpc::JsonRpcRequest;
use crate::types::jsonrpc::JsonRpcResponse;
use crate::types::jsonrpc::Message;
use crate::types::RequestId;

pub type RequestHandler =
    Arc<dyn Fn(Cancellation, Option<Value>) -> BoxFuture<'static, Result<Value, JsonRpcErrorObject>> + Send + Sync>;
pub type NotificationHandler =
    Arc<dyn Fn(Cancellation, Option<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

type PendingMap = StdMutex<HashMap<i64, oneshot::Sender<Result<Value, JsonRpcErrorObject>>>>;

/// A JSON-RPC peer: message framing, request/response correlation,
/// method-name dispatch, and start/close lifecycle (spec.md §4.3).
pub struct Peer {
    transport: Arc<dyn Transport>,
    id_counter: AtomicI64,
    request_handlers: RwLock<HashMap<String, RequestHandler>>,
    notification_handlers: RwLock<HashMap<String, NotificationHandler>>,
    pending: PendingMap,
    started: AtomicBool,
    closed: DoneSignal,
    root_cancellation: CancellationToken,
}

impl Peer {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let peer = Arc::new(Peer {
            transport,
            id_counter: AtomicI64::new(1),
            request_handlers: RwLock::new(HashMap::new()),
            notification_handlers: RwLock::new(HashMap::new()),
            pending: StdMutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            closed: DoneSignal::new(),
            root_cancellation: CancellationToken::new(),
        });
        peer.on_request("ping", |_ctx, _params| async move {
            Ok(serde_json::json!({ "status": "ok" }))
        });
        peer
    }

    /// Register a request handler. May be called before or after `start`
    /// (spec.md §4.3: a shared lock guards the maps).
    pub fn on_request<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Cancellation, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, JsonRpcErrorObject>> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |ctx, params| Box::pin(handler(ctx, params)));
        self.request_handlers
            .write()
            .expect("lock poisoned")
            .insert(method.into(), handler);
    }

    pub fn on_notification<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Cancellation, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let handler: NotificationHandler = Arc::new(move |ctx, params| Box::pin(handler(ctx, params)));
        self.notification_handlers
            .write()
            .expect("lock poisoned")
            .insert(method.into(), handler);
    }

    /// Idempotent via a once-guard: repeated calls are safe but only the
    /// first has effect (spec.md §4.1, §5).
    pub async fn start(self: &Arc<Self>) -> Result<(), McpError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (router, receivers) = Router::new(self.closed.clone());
        self.transport
            .start(router, self.root_cancellation.clone())
            .await
            .map_err(|e| McpError::Internal(format!("transport start failed: {e}")))?;

        let peer = Arc::clone(self);
        tokio::spawn(async move { peer.dispatch_loop(receivers).await });

        Ok(())
    }

    /// Idempotent: the done signal is closed once; subsequent calls are
    /// no-ops (spec.md §4.1, §5, P4 in §8).
    pub async fn close(&self) {
        if self.closed.is_done() {
            return;
        }
        self.closed.fire();
        self.root_cancellation.cancel();
        self.transport.close().await;
        self.fail_all_pending(McpError::PeerClosed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_done()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn fail_all_pending(&self, err: McpError) {
        let mut pending = self.pending.lock().expect("lock poisoned");
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(JsonRpcErrorObject::from(&err)));
        }
    }

    async fn dispatch_loop(self: Arc<Self>, mut receivers: RouterReceivers) {
        loop {
            tokio::select! {
                _ = self.closed.wait() => break,
                _ = self.transport.done() => break,
                req = receivers.requests.recv() => {
                    match req {
                        Some(req) => {
                            let peer = Arc::clone(&self);
                            let ctx = self.root_cancellation.child_token();
                            tokio::spawn(async move { peer.handle_request(req, ctx).await });
                        }
                        None => break,
                    }
                }
                notif = receivers.notifications.recv() => {
                    match notif {
                        Some(notif) => {
                            let peer = Arc::clone(&self);
                            let ctx = self.root_cancellation.child_token();
                            tokio::spawn(async move { peer.handle_notification(notif, ctx).await });
                        }
                        None => break,
                    }
                }
                resp = receivers.responses.recv() => {
                    match resp {
                        Some(resp) => self.handle_response(resp),
                        None => break,
                    }
                }
                err = receivers.errors.recv() => {
                    if err.is_none() {
                        break;
                    }
                }
            }
        }
        self.closed.fire();
        self.fail_all_pending(McpError::PeerClosed);
    }

    /// Implements the dispatch-loop steps from spec.md §4.3 in their
    /// documented order: a missing params payload is answered with
    /// `InvalidParams` before the method-name lookup even happens.
    async fn handle_request(self: Arc<Self>, req: JsonRpcRequest, ctx: Cancellation) {
        if req.params.is_none() {
            self.reply_error(req.id, McpError::InvalidParams(req.method).into())
                .await;
            return;
        }

        let handler = self
            .request_handlers
            .read()
            .expect("lock poisoned")
            .get(&req.method)
            .cloned();

        let Some(handler) = handler else {
            self.reply_error(req.id, McpError::MethodNotFound(req.method).into())
                .await;
            return;
        };

        match handler(ctx, req.params).await {
            Ok(result) => self.reply_result(req.id, result).await,
            Err(err) => self.reply_error(req.id, err).await,
        }
    }

    async fn handle_notification(self: Arc<Self>, notif: JsonRpcNotification, ctx: Cancellation) {
        let handler = self
            .notification_handlers
            .read()
            .expect("lock poisoned")
            .get(&notif.method)
            .cloned();

        match handler {
            Some(handler) => {
                if notif.params.is_none() {
                    debug!(method = %notif.method, "dropping notification with absent params");
                    return;
                }
                handler(ctx, notif.params).await;
            }
            None => warn!(method = %notif.method, "no handler registered for notification"),
        }
    }

    fn handle_response(&self, resp: Result<JsonRpcResponse, JsonRpcError>) {
        let id = match &resp {
            Ok(r) => &r.id,
            Err(e) => &e.id,
        };
        let RequestId::Integer(key) = id else {
            warn!(%id, "response with non-integer id — this peer only generates integer ids");
            return;
        };

        let tx = self.pending.lock().expect("lock poisoned").remove(key);
        match tx {
            Some(tx) => {
                let _ = tx.send(match resp {
                    Ok(r) => Ok(r.result),
                    Err(e) => Err(e.error),
                });
            }
            None => warn!(id = %key, "no pending request found for response"),
        }
    }

    async fn reply_result(&self, id: RequestId, result: Value) {
        let message = Message::Response(Ok(JsonRpcResponse { id, result }));
        if let Err(e) = self.transport.send(message).await {
            warn!(error = %e, "failed to send response");
        }
    }

    async fn reply_error(&self, id: RequestId, error: JsonRpcErrorObject) {
        let message = Message::Response(Err(JsonRpcError { id, error }));
        if let Err(e) = self.transport.send(message).await {
            warn!(error = %e, "failed to send error response");
        }
    }

    /// Send a request and await its matching response (spec.md §4.3).
    /// Terminates on whichever comes first: a matching response, the
    /// transport's done signal (`PeerClosed`), or `cancellation` firing
    /// (`Cancelled`).
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Value,
        cancellation: Cancellation,
    ) -> Result<Value, McpError> {
        if self.closed.is_done() {
            return Err(McpError::PeerClosed);
        }

        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("lock poisoned").insert(id, tx);

        let message = Message::Request(JsonRpcRequest {
            id: RequestId::Integer(id),
            method: method.into(),
            params: Some(params),
        });

        if let Err(e) = self.transport.send(message).await {
            self.pending.lock().expect("lock poisoned").remove(&id);
            return Err(McpError::Internal(format!("send failed: {e}")));
        }

        tokio::select! {
            result = rx => {
                match result {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(McpError::from_wire(err.code, err.message)),
                    Err(_) => Err(McpError::PeerClosed),
                }
            }
            _ = self.closed.wait() => {
                self.pending.lock().expect("lock poisoned").remove(&id);
                Err(McpError::PeerClosed)
            }
            _ = cancellation.cancelled() => {
                self.pending.lock().expect("lock poisoned").remove(&id);
                Err(McpError::Cancelled)
            }
        }
    }

    /// Send a notification. Fire-and-forget; never produces a response.
    pub async fn send_notification(
        &self,
        method: impl Into<String>,
        params: Value,
    ) -> Result<(), McpError> {
        if self.closed.is_done() {
            return Err(McpError::PeerClosed);
        }
        let message = Message::Notification(JsonRpcNotification {
            method: method.into(),
            params: Some(params),
        });
        self.transport
            .send(message)
            .await
            .map_err(|e| McpError::Internal(format!("send failed: {e}")))
    }

    pub fn child_cancellation(&self) -> Cancellation {
        self.root_cancellation.child_token()
    }

    /// `ping` is the sole request either side may send before `initialize`
    /// completes (spec.md §4.6). Not gated on any capability.
    pub async fn ping(&self, cancellation: Cancellation) -> Result<(), McpError> {
        self.send_request("ping", serde_json::json!({}), cancellation)
            .await?;
        Ok(())
    }
}
