//! The MCP data model: the JSON-RPC wire frame plus the typed payloads for
//! every feature module (spec.md §3).

pub mod capabilities;
pub mod content;
pub mod initialize;
pub mod jsonrpc;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

pub use capabilities::ClientCapabilities;
pub use capabilities::ServerCapabilities;
pub use content::Content;
pub use initialize::Implementation;
pub use initialize::InitializeParams;
pub use initialize::InitializeResult;
pub use initialize::PROTOCOL_VERSION;
pub use jsonrpc::JsonRpcErrorObject;
pub use jsonrpc::Message;
pub use jsonrpc::RequestId;
pub use prompts::Prompt;
pub use prompts::PromptMessage;
pub use resources::Resource;
pub use resources::ResourceContents;
pub use resources::ResourceTemplate;
pub use roots::Root;
pub use tools::CallToolParams;
pub use tools::CallToolResult;
pub use tools::Tool;
