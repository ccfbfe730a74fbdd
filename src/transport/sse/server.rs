//! The server half of the SSE transport: `GET /events` + `POST /send`
//! (spec.md §4.1), built on `axum` the way `http_transport.rs` builds its
//! `/mcp` endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::sse::Event as SseEvent;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Router as AxumRouter;
use futures::stream::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tracing::debug;
use tracing::warn;

use crate::router::Router as McpRouter;
use crate::transport::Cancellation;
use crate::transport::DoneSignal;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::types::Message;

/// Bound of the outbound SSE broadcast channel. `send` reports overflow to
/// its caller rather than silently counting it (spec.md §9, Open Question).
const OUTBOUND_CAPACITY: usize = 64;

#[derive(Clone)]
struct ServerState {
    router: McpRouter,
    connected: Arc<AtomicBool>,
}

/// An HTTP server exposing the single-connection SSE transport. Bind with
/// [`SseServerTransport::new`], then [`Transport::start`] to begin serving.
pub struct SseServerTransport {
    addr: SocketAddr,
    outbound_tx: broadcast::Sender<String>,
    connected: Arc<AtomicBool>,
    done: DoneSignal,
}

impl SseServerTransport {
    pub fn new(addr: SocketAddr) -> Self {
        let (outbound_tx, _rx) = broadcast::channel(OUTBOUND_CAPACITY);
        SseServerTransport {
            addr,
            outbound_tx,
            connected: Arc::new(AtomicBool::new(false)),
            done: DoneSignal::new(),
        }
    }
}

#[async_trait]
impl Transport for SseServerTransport {
    async fn start(
        &self,
        router: McpRouter,
        cancellation: Cancellation,
    ) -> Result<(), TransportError> {
        let state = ServerState {
            router,
            connected: Arc::clone(&self.connected),
        };
        let outbound_tx = self.outbound_tx.clone();

        let app = AxumRouter::new()
            .route("/events", get(handle_events))
            .route("/send", post(handle_send))
            .with_state((state, outbound_tx));

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(TransportError::Io)?;
        let done = self.done.clone();

        tokio::spawn(async move {
            let serve = axum::serve(listener, app.into_make_service());
            tokio::select! {
                result = serve => {
                    if let Err(e) = result {
                        warn!(error = %e, "SSE server exited with error");
                    }
                }
                _ = cancellation.cancelled() => {}
                _ = done.wait() => {}
            }
            done.fire();
        });

        Ok(())
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.done.is_done() {
            return Err(TransportError::Closed);
        }
        let json = message
            .to_line()
            .map_err(|e| TransportError::Other(anyhow::anyhow!("serialize frame: {e}")))?;
        self.outbound_tx
            .send(json)
            .map_err(|_| TransportError::BufferFull)?;
        Ok(())
    }

    async fn close(&self) {
        self.done.fire();
    }

    async fn done(&self) {
        self.done.wait().await;
    }
}

async fn handle_events(
    State((state, outbound_tx)): State<(ServerState, broadcast::Sender<String>)>,
) -> Response {
    if state
        .connected
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return StatusCode::CONFLICT.into_response();
    }

    let connected = Arc::clone(&state.connected);
    let rx = outbound_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(
        move |item| -> Option<Result<SseEvent, Infallible>> {
            match item {
                Ok(json) => Some(Ok(SseEvent::default().data(json))),
                Err(_lagged) => None,
            }
        },
    );
    let stream = OnDropStream {
        inner: stream,
        connected,
    };

    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        axum::http::header::CONNECTION,
        HeaderValue::from_static("keep-alive"),
    );
    headers.insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// Wraps the broadcast stream to clear the single-connection gate when the
/// SSE response body is dropped (client disconnected).
struct OnDropStream<S> {
    inner: S,
    connected: Arc<AtomicBool>,
}

impl<S: Stream + Unpin> Stream for OnDropStream<S> {
    type Item = S::Item;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.inner).poll_next(cx)
    }
}

impl<S> Drop for OnDropStream<S> {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

async fn handle_send(
    State((state, _outbound_tx)): State<(ServerState, broadcast::Sender<String>)>,
    body: axum::body::Bytes,
) -> StatusCode {
    match serde_json::from_slice(&body) {
        Ok(raw) => {
            debug!("sse /send <-");
            state.router.dispatch(raw);
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, "malformed JSON on /send");
            StatusCode::BAD_REQUEST
        }
    }
}
