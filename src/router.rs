//! The message router (spec.md §4.2).
//!
//! Classifies each inbound frame as request / response / notification and
//! publishes it onto one of four bounded, non-blocking queues. A full queue
//! indicates a stalled consumer; the frame is logged and dropped rather
//! than applying backpressure to the transport reader, which would stall
//! the wire.

use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use crate::transport::DoneSignal;
use crate::types::jsonrpc::JsonRpcError;
use crate::types::jsonrpc::JsonRpcNotification;
use crate::types::jsonrpc::JsonRpcRequest;
use crate::types::jsonrpc::JsonRpcResponse;
use crate::types::jsonrpc::MalformedFrame;
use crate::types::jsonrpc::Message;
use crate::types::jsonrpc::RawMessage;

/// Default bound for each of the router's four queues (spec.md §4.2).
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// The producer-side handle a transport's reader task uses to publish
/// parsed frames. Cheaply cloneable.
#[derive(Clone)]
pub struct Router {
    requests_tx: mpsc::Sender<JsonRpcRequest>,
    notifications_tx: mpsc::Sender<JsonRpcNotification>,
    responses_tx: mpsc::Sender<Result<JsonRpcResponse, JsonRpcError>>,
    errors_tx: mpsc::Sender<MalformedFrame>,
    done: DoneSignal,
}

/// The consumer-side handles a peer's dispatch loop drains. Not cloneable —
/// there is exactly one consumer per queue.
pub struct RouterReceivers {
    pub requests: mpsc::Receiver<JsonRpcRequest>,
    pub notifications: mpsc::Receiver<JsonRpcNotification>,
    pub responses: mpsc::Receiver<Result<JsonRpcResponse, JsonRpcError>>,
    pub errors: mpsc::Receiver<MalformedFrame>,
}

impl Router {
    pub fn new(done: DoneSignal) -> (Router, RouterReceivers) {
        Self::with_capacity(done, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(done: DoneSignal, capacity: usize) -> (Router, RouterReceivers) {
        let (requests_tx, requests) = mpsc::channel(capacity);
        let (notifications_tx, notifications) = mpsc::channel(capacity);
        let (responses_tx, responses) = mpsc::channel(capacity);
        let (errors_tx, errors) = mpsc::channel(capacity);

        (
            Router {
                requests_tx,
                notifications_tx,
                responses_tx,
                errors_tx,
                done,
            },
            RouterReceivers {
                requests,
                notifications,
                responses,
                errors,
            },
        )
    }

    /// Classify one raw frame and publish it to the appropriate queue via a
    /// non-blocking attempt. Invalid frames are logged and discarded
    /// (spec.md §3 invariant).
    pub fn dispatch(&self, raw: RawMessage) {
        if self.done.is_done() {
            return;
        }

        match Message::classify(raw) {
            Ok(Message::Request(req)) => {
                if let Err(mpsc::error::TrySendError::Full(req)) =
                    self.requests_tx.try_send(req)
                {
                    warn!(method = %req.method, "requests queue full, dropping frame");
                }
            }
            Ok(Message::Notification(n)) => {
                if let Err(mpsc::error::TrySendError::Full(n)) =
                    self.notifications_tx.try_send(n)
                {
                    warn!(method = %n.method, "notifications queue full, dropping frame");
                }
            }
            Ok(Message::Response(resp)) => {
                if let Err(mpsc::error::TrySendError::Full(resp)) =
                    self.responses_tx.try_send(resp)
                {
                    warn!("responses queue full, dropping frame: {resp:?}");
                }
            }
            Err(malformed) => {
                debug!(%malformed, "dropping malformed frame");
                let _ = self.errors_tx.try_send(malformed);
            }
        }
    }

    /// Idempotent: fires the done signal once. Subsequent calls are no-ops.
    pub fn close(&self) {
        self.done.fire();
    }

    pub fn done(&self) -> DoneSignal {
        self.done.clone()
    }
}
