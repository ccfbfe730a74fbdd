//! The transport abstraction (spec.md §4.1).
//!
//! A transport delivers inbound frames to a [`crate::router::Router`] and
//! accepts outbound frames from the peer. Two concrete transports are
//! provided — [`stdio`] and [`sse`] — presenting the identical interface
//! below to the dispatch engine, the way `mcp_client.rs`'s stdio and SSE
//! constructors both reduce to the same `McpClient` shape.

pub mod sse;
pub mod stdio;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::router::Router;
use crate::types::Message;

/// Cancellation context handed to handler invocations and honored by
/// `send_request` (spec.md §5).
pub type Cancellation = CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport already started")]
    AlreadyStarted,

    #[error("transport is closed")]
    Closed,

    #[error("client message buffer full")]
    BufferFull,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A transport's four operations (spec.md §4.1).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin reading inbound bytes and delivering parsed frames to `router`.
    /// Returns immediately; frames arrive on a background task. Calling this
    /// twice returns [`TransportError::AlreadyStarted`].
    async fn start(
        &self,
        router: Router,
        cancellation: Cancellation,
    ) -> Result<(), TransportError>;

    /// Serialize and write one frame. Safe to call from many concurrent
    /// tasks; writes for distinct messages never interleave on the wire.
    async fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Idempotent. Releases underlying I/O, closes the router, signals done.
    async fn close(&self);

    /// Resolves once the transport has closed, by remote disconnect or by
    /// a local `close()`.
    async fn done(&self);
}

/// A one-shot "closed" observable shared between a transport's background
/// tasks and its public handle. Mirrors the `done`/"closed" signal every
/// transport in the spec must expose.
#[derive(Clone)]
pub struct DoneSignal {
    token: CancellationToken,
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl DoneSignal {
    pub fn new() -> Self {
        DoneSignal {
            token: CancellationToken::new(),
        }
    }

    /// Idempotent: firing an already-fired signal is a no-op.
    pub fn fire(&self) {
        self.token.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
