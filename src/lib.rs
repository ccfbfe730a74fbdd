//! `mcp_peer`: a symmetric, bidirectional Model Context Protocol runtime.
//!
//! A [`peer::Peer`] is the same dispatch engine whether an application uses
//! it in "client mode" or "server mode" — the two differ only in which
//! request handlers they register and which side of [`handshake`] they
//! drive. Two transports are provided: line-delimited [`transport::stdio`]
//! and single-connection [`transport::sse`]. The [`features`] modules sit
//! on top of the peer as thin policy layers, one per MCP feature area.

pub mod error;
pub mod features;
pub mod handshake;
pub mod peer;
pub mod router;
pub mod transport;
pub mod types;

pub use error::McpError;
pub use peer::Peer;

use std::sync::Arc;

use handshake::initialize_client;
use handshake::register_server_initialize;
use handshake::ClientHandshake;
use handshake::ServerHandshake;
use transport::Cancellation;
use transport::Transport;
use types::capabilities::ClientCapabilities;
use types::capabilities::ServerCapabilities;
use types::initialize::Implementation;

/// Builds a peer over `transport`, starts it, and drives the client half
/// of the handshake (spec.md §4.4 step 1). The returned [`ClientHandshake`]
/// carries the server's declared capabilities for constructing the
/// `*Client` feature façades.
pub async fn connect_client(
    transport: Arc<dyn Transport>,
    client_info: Implementation,
    client_capabilities: ClientCapabilities,
    cancellation: Cancellation,
) -> Result<(Arc<Peer>, ClientHandshake), McpError> {
    let peer = Peer::new(transport);
    peer.start().await?;
    let handshake = initialize_client(&peer, client_info, client_capabilities, cancellation).await?;
    Ok((peer, handshake))
}

/// Builds a peer over `transport`, registers the `initialize` handler, and
/// starts it. Unlike the client side, server mode doesn't block on the
/// handshake completing — it registers the handler and returns, letting
/// the first inbound `initialize` drive it (spec.md §4.4 step 2).
pub async fn serve(
    transport: Arc<dyn Transport>,
    server_info: Implementation,
    server_capabilities: ServerCapabilities,
) -> Result<(Arc<Peer>, ServerHandshake), McpError> {
    let peer = Peer::new(transport);
    let handshake = register_server_initialize(&peer, server_info, server_capabilities);
    peer.start().await?;
    Ok((peer, handshake))
}
