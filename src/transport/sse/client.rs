//! The client half of the SSE transport: one `GET /events` to consume
//! server-originated frames, one `POST /send` per outbound frame. Modeled
//! on `mcp_client.rs`'s `spawn_sse_reader`/`post_json_message`.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Url;
use tracing::debug;
use tracing::warn;

use crate::router::Router as McpRouter;
use crate::transport::Cancellation;
use crate::transport::DoneSignal;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::types::Message;

pub struct SseClientTransport {
    events_url: Url,
    send_url: Url,
    client: reqwest::Client,
    done: DoneSignal,
    /// A failed initial connection is recorded here; subsequent `send`
    /// calls fail fast with it rather than retrying (spec.md §4.1).
    sticky_error: Arc<StdMutex<Option<String>>>,
}

impl SseClientTransport {
    pub fn new(events_url: Url, send_url: Url) -> Self {
        SseClientTransport {
            events_url,
            send_url,
            client: reqwest::Client::new(),
            done: DoneSignal::new(),
            sticky_error: Arc::new(StdMutex::new(None)),
        }
    }
}

#[async_trait]
impl Transport for SseClientTransport {
    async fn start(
        &self,
        router: McpRouter,
        cancellation: Cancellation,
    ) -> Result<(), TransportError> {
        let events_url = self.events_url.clone();
        let client = self.client.clone();
        let done = self.done.clone();
        let sticky_error = Arc::clone(&self.sticky_error);

        // Establish the first connection synchronously so a failure is
        // recorded before `start` returns control — subsequent `send`
        // calls then fail fast instead of silently retrying forever.
        match client.get(events_url.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                tokio::spawn(run_event_stream(
                    response, router, done.clone(), cancellation,
                ));
            }
            Ok(response) => {
                let msg = format!("GET /events returned {}", response.status());
                *sticky_error.lock().expect("lock poisoned") = Some(msg);
                done.fire();
            }
            Err(e) => {
                *sticky_error.lock().expect("lock poisoned") = Some(e.to_string());
                done.fire();
            }
        }

        Ok(())
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if let Some(err) = self.sticky_error.lock().expect("lock poisoned").clone() {
            return Err(TransportError::Other(anyhow::anyhow!(
                "sticky connection error: {err}"
            )));
        }
        if self.done.is_done() {
            return Err(TransportError::Closed);
        }

        let json = message
            .to_line()
            .map_err(|e| TransportError::Other(anyhow::anyhow!("serialize frame: {e}")))?;
        debug!(%json, "sse /send ->");
        let response = self
            .client
            .post(self.send_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(json)
            .send()
            .await
            .map_err(|e| TransportError::Other(e.into()))?;

        if !response.status().is_success() {
            return Err(TransportError::Other(anyhow::anyhow!(
                "POST /send returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        self.done.fire();
    }

    async fn done(&self) {
        self.done.wait().await;
    }
}

async fn run_event_stream(
    response: reqwest::Response,
    router: McpRouter,
    done: DoneSignal,
    cancellation: Cancellation,
) {
    let mut stream = response.bytes_stream().eventsource();
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = done.wait() => break,
            event = stream.next() => {
                match event {
                    Some(Ok(event)) => {
                        let data = event.data.trim();
                        if data.is_empty() {
                            continue;
                        }
                        match serde_json::from_str(data) {
                            Ok(raw) => router.dispatch(raw),
                            Err(e) => warn!(error = %e, %data, "malformed JSON on SSE event"),
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "SSE stream error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    router.close();
    done.fire();
}
