//! Single-connection HTTP+SSE transport (spec.md §4.1, §6).
//!
//! A server exposes `GET /events` (server-originated frames, at most one
//! concurrent connection) and `POST /send` (client-originated frames, one
//! per request body). The client side performs one `GET /events` and one
//! `POST /send` per outbound frame. Modeled on the `axum` SSE endpoint
//! pattern in the pack's `http_transport.rs` (broadcast fan-out to
//! subscribers, `StatusCode` mapping for parse failures) and on
//! `mcp_client.rs`'s `spawn_sse_reader`/`post_json_message` for the client
//! side.

pub mod client;
pub mod server;

pub use client::SseClientTransport;
pub use server::SseServerTransport;
