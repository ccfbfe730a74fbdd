//! End-to-end scenarios over an in-process pipe pair: two [`Peer`]s talking
//! through two independent `tokio::io::duplex` streams, the in-memory
//! analogue of the stdio transport's independent byte streams.

use std::sync::Arc;
use std::time::Duration;

use mcp_peer::error::McpError;
use mcp_peer::features::prompts::PromptGetOutput;
use mcp_peer::features::prompts::PromptsClient;
use mcp_peer::features::prompts::PromptsServer;
use mcp_peer::features::resources::ResourcesClient;
use mcp_peer::features::resources::ResourcesServer;
use mcp_peer::features::roots::RootsClient;
use mcp_peer::features::roots::RootsServerFacade;
use mcp_peer::features::sampling::SamplingClient;
use mcp_peer::features::sampling::SamplingServerFacade;
use mcp_peer::features::tools::ToolsClient;
use mcp_peer::features::tools::ToolsServer;
use mcp_peer::peer::Peer;
use mcp_peer::transport::stdio::StdioTransport;
use mcp_peer::transport::Transport;
use mcp_peer::types::capabilities::ClientCapabilities;
use mcp_peer::types::capabilities::ListChangedCapability;
use mcp_peer::types::capabilities::ResourcesCapability;
use mcp_peer::types::capabilities::ServerCapabilities;
use mcp_peer::types::content::Content;
use mcp_peer::types::initialize::Implementation;
use mcp_peer::types::prompts::Prompt;
use mcp_peer::types::prompts::PromptMessage;
use mcp_peer::types::prompts::Role;
use mcp_peer::types::resources::Resource;
use mcp_peer::types::roots::Root;
use mcp_peer::types::sampling::CreateMessageParams;
use mcp_peer::types::sampling::CreateMessageResult;
use mcp_peer::types::tools::CallToolResult;
use mcp_peer::types::tools::Tool;
use mcp_peer::types::tools::ToolInputSchema;
use pretty_assertions::assert_eq;
use serde_json::json;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

/// Builds two [`StdioTransport`]s wired to each other through a pair of
/// independent duplex streams, so frames written by one side's writer show
/// up on the other side's reader — mirroring a subprocess's stdout/stdin
/// pair without actually spawning one.
fn wired_transport_pair() -> (Arc<dyn Transport>, Arc<dyn Transport>) {
    let (a_write, b_read) = tokio::io::duplex(64 * 1024);
    let (b_write, a_read) = tokio::io::duplex(64 * 1024);
    let a: Arc<dyn Transport> = Arc::new(StdioTransport::new(a_read, a_write));
    let b: Arc<dyn Transport> = Arc::new(StdioTransport::new(b_read, b_write));
    (a, b)
}

fn implementation(name: &str) -> Implementation {
    Implementation {
        name: name.to_string(),
        version: "0.0.0-test".to_string(),
    }
}

fn cancellation() -> CancellationToken {
    CancellationToken::new()
}

/// Polls `ServerHandshake::is_initialized` until the server side has
/// observed `notifications/initialized` — that notification travels over
/// the wire asynchronously, so a server-originated façade constructed
/// right after `connect_client` returns may otherwise race it.
async fn wait_until_initialized(handshake: &mcp_peer::handshake::ServerHandshake) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !handshake.is_initialized() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("server never observed notifications/initialized");
}

fn text_of(result: &CallToolResult) -> &str {
    match result.content.first().expect("tool result has content") {
        Content::Text { text } => text,
        other => panic!("expected text content, got {other:?}"),
    }
}

#[tokio::test]
async fn ping_pong_round_trips() {
    let (transport_a, transport_b) = wired_transport_pair();
    let peer_a = Peer::new(transport_a);
    let peer_b = Peer::new(transport_b);
    peer_a.start().await.unwrap();
    peer_b.start().await.unwrap();

    peer_a.ping(cancellation()).await.unwrap();
}

#[tokio::test]
async fn initialize_then_list_and_call_tool() {
    let (transport_client, transport_server) = wired_transport_pair();

    let server_caps = ServerCapabilities {
        tools: Some(ListChangedCapability {
            list_changed: Some(false),
        }),
        ..Default::default()
    };
    let (peer_server, _server_handshake) =
        mcp_peer::serve(transport_server, implementation("test-server"), server_caps)
            .await
            .unwrap();

    let tools_server = ToolsServer::new(
        &peer_server,
        vec![Tool {
            name: "echo_tool".to_string(),
            description: None,
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({"value": {"type": "string"}})),
                required: Some(vec!["value".to_string()]),
            },
        }],
    );
    tools_server.bind("echo_tool", |args| {
        Box::pin(async move {
            let value = args
                .as_ref()
                .and_then(|v| v.get("value"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| McpError::InvalidParams("missing value".to_string()))?;
            Ok(CallToolResult::success(vec![Content::text(format!(
                "[SRV] Echo: {value}"
            ))]))
        })
    });

    let (peer_client, client_handshake) = mcp_peer::connect_client(
        transport_client,
        implementation("test-client"),
        ClientCapabilities::default(),
        cancellation(),
    )
    .await
    .unwrap();

    assert!(client_handshake.result.capabilities.tools.is_some());

    let tools_client = ToolsClient::new(&peer_client, client_handshake.server_capabilities);
    let (tools, _cursor) = tools_client.list(None, cancellation()).await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo_tool");

    let result = tools_client
        .call("echo_tool", Some(json!({"value": "hi"})), cancellation())
        .await
        .unwrap();
    assert_eq!(text_of(&result), "[SRV] Echo: hi");
    assert_eq!(result.is_error, None);
}

#[tokio::test]
async fn prompts_get_returns_description_and_rendered_messages() {
    let (transport_client, transport_server) = wired_transport_pair();

    let server_caps = ServerCapabilities {
        prompts: Some(ListChangedCapability {
            list_changed: Some(true),
        }),
        ..Default::default()
    };
    let (peer_server, _server_handshake) =
        mcp_peer::serve(transport_server, implementation("test-server"), server_caps)
            .await
            .unwrap();

    let prompts_server = PromptsServer::new(
        &peer_server,
        vec![Prompt {
            name: "greeting".to_string(),
            description: Some("Greets someone by name".to_string()),
            arguments: None,
        }],
    );
    prompts_server.bind("greeting", |args| {
        Box::pin(async move {
            let name = args
                .as_ref()
                .and_then(|v| v.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or("world")
                .to_string();
            Ok(PromptGetOutput {
                description: Some("Greets someone by name".to_string()),
                messages: vec![PromptMessage {
                    role: Role::User,
                    content: Content::text(format!("Hello, {name}!")),
                }],
            })
        })
    });

    let (peer_client, client_handshake) = mcp_peer::connect_client(
        transport_client,
        implementation("test-client"),
        ClientCapabilities::default(),
        cancellation(),
    )
    .await
    .unwrap();

    assert!(client_handshake.result.capabilities.prompts.is_some());
    let prompts_client = PromptsClient::new(&peer_client, client_handshake.server_capabilities);

    let (prompts, _cursor) = prompts_client.list(None, cancellation()).await.unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].name, "greeting");

    let (description, messages) = prompts_client
        .get("greeting", Some(json!({"name": "Ada"})), cancellation())
        .await
        .unwrap();
    assert_eq!(description.as_deref(), Some("Greets someone by name"));
    assert_eq!(messages.len(), 1);
    match &messages[0].content {
        Content::Text { text } => assert_eq!(text, "Hello, Ada!"),
        other => panic!("expected text content, got {other:?}"),
    }

    prompts_server.set_prompts(vec![]).await;
    let changed = tokio::time::timeout(Duration::from_millis(200), prompts_client.next_list_changed())
        .await
        .expect("expected a list_changed notification");
    assert!(changed.is_some());
}

#[tokio::test]
async fn resource_subscription_fans_out_only_while_subscribed() {
    let (transport_client, transport_server) = wired_transport_pair();

    let server_caps = ServerCapabilities {
        resources: Some(ResourcesCapability {
            subscribe: Some(true),
            list_changed: Some(false),
        }),
        ..Default::default()
    };
    let (peer_server, _server_handshake) =
        mcp_peer::serve(transport_server, implementation("test-server"), server_caps)
            .await
            .unwrap();

    let resources_server = ResourcesServer::new(
        &peer_server,
        vec![Resource {
            uri: "file:///example.txt".to_string(),
            name: "example".to_string(),
            description: None,
            mime_type: None,
        }],
        vec![],
    );

    let (peer_client, client_handshake) = mcp_peer::connect_client(
        transport_client,
        implementation("test-client"),
        ClientCapabilities::default(),
        cancellation(),
    )
    .await
    .unwrap();

    assert!(client_handshake.result.capabilities.resources.is_some());
    let resources_client = ResourcesClient::new(&peer_client, client_handshake.server_capabilities);

    resources_client
        .subscribe("file:///example.txt", cancellation())
        .await
        .unwrap();

    resources_server.notify_updated("file:///example.txt").await;
    let uri = tokio::time::timeout(Duration::from_millis(200), resources_client.next_update())
        .await
        .expect("expected an update notification")
        .expect("channel stayed open");
    assert_eq!(uri, "file:///example.txt");

    resources_client
        .unsubscribe("file:///example.txt", cancellation())
        .await
        .unwrap();

    resources_server.notify_updated("file:///example.txt").await;
    let timed_out =
        tokio::time::timeout(Duration::from_millis(100), resources_client.next_update()).await;
    assert!(
        timed_out.is_err(),
        "expected no further notifications after unsubscribe"
    );
}

#[tokio::test]
async fn roots_set_roots_rejects_invalid_uri_and_leaves_list_unchanged() {
    let (transport_client, transport_server) = wired_transport_pair();

    let (peer_server, server_handshake) = mcp_peer::serve(
        transport_server,
        implementation("test-server"),
        ServerCapabilities::default(),
    )
    .await
    .unwrap();

    let client_caps = ClientCapabilities {
        roots: Some(ListChangedCapability {
            list_changed: Some(true),
        }),
        ..Default::default()
    };
    let (peer_client, _client_handshake) = mcp_peer::connect_client(
        transport_client,
        implementation("test-client"),
        client_caps,
        cancellation(),
    )
    .await
    .unwrap();

    let roots_client = RootsClient::new(
        &peer_client,
        vec![Root {
            uri: "file:///initialRoot".to_string(),
            name: Some("Initial Root".to_string()),
        }],
    )
    .unwrap();

    wait_until_initialized(&server_handshake).await;

    let initialized_handle = server_handshake.initialized_handle();
    let roots_facade =
        RootsServerFacade::new(&peer_server, server_handshake.client_capabilities, initialized_handle);

    let roots = roots_facade.list(cancellation()).await.unwrap();
    assert_eq!(
        roots,
        vec![Root {
            uri: "file:///initialRoot".to_string(),
            name: Some("Initial Root".to_string()),
        }]
    );

    let result = roots_client
        .set_roots(vec![Root {
            uri: "invalid:///x".to_string(),
            name: None,
        }])
        .await;
    assert!(result.is_err());

    let roots = roots_facade.list(cancellation()).await.unwrap();
    assert_eq!(roots[0].uri, "file:///initialRoot");
}

#[tokio::test]
async fn concurrent_tool_calls_do_not_cross_wires() {
    let (transport_client, transport_server) = wired_transport_pair();

    let server_caps = ServerCapabilities {
        tools: Some(ListChangedCapability {
            list_changed: Some(false),
        }),
        ..Default::default()
    };
    let (peer_server, _server_handshake) =
        mcp_peer::serve(transport_server, implementation("test-server"), server_caps)
            .await
            .unwrap();

    let tools_server = ToolsServer::new(&peer_server, vec![]);
    tools_server.bind("echo_tool", |args| {
        Box::pin(async move {
            let value = args
                .as_ref()
                .and_then(|v| v.get("value"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| McpError::InvalidParams("missing value".to_string()))?
                .to_string();
            Ok(CallToolResult::success(vec![Content::text(format!(
                "[SRV] Echo: {value}"
            ))]))
        })
    });

    let (peer_client, client_handshake) = mcp_peer::connect_client(
        transport_client,
        implementation("test-client"),
        ClientCapabilities::default(),
        cancellation(),
    )
    .await
    .unwrap();

    let tools_client = Arc::new(ToolsClient::new(
        &peer_client,
        client_handshake.server_capabilities,
    ));

    let mut tasks = Vec::new();
    for i in 0..5 {
        let tools_client = Arc::clone(&tools_client);
        tasks.push(tokio::spawn(async move {
            let value = format!("msg-{i}");
            let result = tools_client
                .call("echo_tool", Some(json!({"value": value})), cancellation())
                .await
                .unwrap();
            (i, text_of(&result).to_string())
        }));
    }

    for task in tasks {
        let (i, text) = task.await.unwrap();
        assert_eq!(text, format!("[SRV] Echo: msg-{i}"));
    }
}

#[tokio::test]
async fn sampling_reverse_direction_validates_before_invoking_handler() {
    let (transport_client, transport_server) = wired_transport_pair();

    let (peer_server, server_handshake) = mcp_peer::serve(
        transport_server,
        implementation("test-server"),
        ServerCapabilities::default(),
    )
    .await
    .unwrap();

    let client_caps = ClientCapabilities {
        sampling: Some(json!({})),
        ..Default::default()
    };
    let (peer_client, _client_handshake) = mcp_peer::connect_client(
        transport_client,
        implementation("test-client"),
        client_caps,
        cancellation(),
    )
    .await
    .unwrap();

    let _sampling_client = SamplingClient::new(&peer_client, |_params| {
        Box::pin(async move {
            Ok(CreateMessageResult {
                role: Role::Assistant,
                content: Content::text("ok"),
                model: "m".to_string(),
                stop_reason: Some("endTurn".to_string()),
            })
        })
    });

    wait_until_initialized(&server_handshake).await;

    let initialized_handle = server_handshake.initialized_handle();
    let sampling_facade = SamplingServerFacade::new(
        &peer_server,
        server_handshake.client_capabilities,
        initialized_handle,
    );

    let params = CreateMessageParams {
        messages: vec![PromptMessage {
            role: Role::User,
            content: Content::text("hi"),
        }],
        max_tokens: 10,
        system_prompt: None,
        temperature: None,
        stop_sequences: None,
    };
    let result = sampling_facade
        .create_message(params, cancellation())
        .await
        .unwrap();
    assert_eq!(result.model, "m");
    assert_eq!(result.content, Content::text("ok"));

    let invalid_params = CreateMessageParams {
        messages: vec![PromptMessage {
            role: Role::User,
            content: Content::text("hi"),
        }],
        max_tokens: 0,
        system_prompt: None,
        temperature: None,
        stop_sequences: None,
    };
    let err = sampling_facade
        .create_message(invalid_params, cancellation())
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::InvalidParams(_)));
    assert!(err.to_string().contains("maxTokens"));
}

#[tokio::test]
async fn close_is_idempotent_and_fails_pending_requests() {
    let (transport_a, transport_b) = wired_transport_pair();
    let peer_a = Peer::new(transport_a);
    let peer_b = Peer::new(transport_b);
    peer_a.start().await.unwrap();
    peer_b.start().await.unwrap();

    assert!(!peer_a.is_closed());
    peer_a.close().await;
    assert!(peer_a.is_closed());
    peer_a.close().await;
    assert!(peer_a.is_closed());

    let err = peer_a
        .send_request("ping", json!({}), cancellation())
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::PeerClosed));
}

#[tokio::test]
async fn feature_facade_rejects_calls_before_capability_is_declared() {
    let (transport_client, transport_server) = wired_transport_pair();

    let (peer_server, _server_handshake) = mcp_peer::serve(
        transport_server,
        implementation("test-server"),
        ServerCapabilities::default(),
    )
    .await
    .unwrap();
    let _ = ToolsServer::new(&peer_server, vec![]);

    let (peer_client, client_handshake) = mcp_peer::connect_client(
        transport_client,
        implementation("test-client"),
        ClientCapabilities::default(),
        cancellation(),
    )
    .await
    .unwrap();

    assert!(client_handshake.result.capabilities.tools.is_none());
    let tools_client = ToolsClient::new(&peer_client, client_handshake.server_capabilities);

    let err = tools_client.list(None, cancellation()).await.unwrap_err();
    assert!(matches!(err, McpError::CapabilityNotDeclared(_)));
}

/// A response's identifier must echo the request's, preserving string vs.
/// numeric typing — verified here against a hand-written frame rather than
/// one of the peer's own (always-integer) outbound identifiers.
#[tokio::test]
async fn response_identifier_preserves_string_typing() {
    let (test_write, peer_read) = tokio::io::duplex(8192);
    let (peer_write, test_read) = tokio::io::duplex(8192);
    let transport: Arc<dyn Transport> = Arc::new(StdioTransport::new(peer_read, peer_write));
    let peer = Peer::new(transport);
    peer.on_request("echo", |_ctx, params: Option<Value>| async move {
        Ok(params.unwrap_or(Value::Null))
    });
    peer.start().await.unwrap();

    let mut test_write = test_write;
    let frame = br#"{"jsonrpc":"2.0","id":"abc-123","method":"echo","params":{}}"#;
    test_write.write_all(frame).await.unwrap();
    test_write.write_all(b"\n").await.unwrap();
    test_write.flush().await.unwrap();

    let mut lines = BufReader::new(test_read).lines();
    let line = lines
        .next_line()
        .await
        .unwrap()
        .expect("peer replied with a frame");
    let reply: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["id"], json!("abc-123"));
    assert_eq!(reply["result"], json!({}));
}
