use crate::config::Settings;
use crate::http::AlepeClient;
use crate::mcp::mcp_wrap;
use crate::tools::{self, ToolCallError, PROTOCOL_VERSION, SERVER_NAME};
use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

// Minimal JSON-RPC 2.0 types
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Id {
    Str(String),
    Num(i64),
    Null,
}

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Response {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

fn rpc_error(id: Option<Id>, code: i64, message: &str, data: Option<Value>) -> Response {
    Response { jsonrpc: "2.0".into(), result: None, error: Some(RpcError { code, message: message.into(), data }), id }
}

fn rpc_ok(id: Option<Id>, result: Value) -> Response {
    Response { jsonrpc: "2.0".into(), result: Some(result), error: None, id }
}

/// Serve MCP over stdin/stdout until stdin closes. The ALEPE client lives
/// for the whole session and is released on every exit path.
pub async fn run_stdio_server(settings: Settings) -> anyhow::Result<()> {
    info!("Starting {} stdio server; protocol={}", SERVER_NAME, PROTOCOL_VERSION);
    let client = AlepeClient::new(settings).context("failed to build HTTP client")?;
    let reader = BufReader::new(tokio::io::stdin());
    let result = serve(&client, reader, tokio::io::stdout()).await;
    info!("stdio closed; shutting down");
    result
}

/// Newline-delimited JSON-RPC loop. One response line per request;
/// notifications get none.
pub async fn serve<R, W>(client: &AlepeClient, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(resp) = handle_line(client, &line).await {
            write_response(&mut writer, &resp).await?;
        }
    }
    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(out: &mut W, resp: &Response) -> anyhow::Result<()> {
    let mut payload = serde_json::to_vec(resp)?;
    payload.push(b'\n');
    out.write_all(&payload).await?;
    out.flush().await?;
    Ok(())
}

async fn handle_line(client: &AlepeClient, line: &str) -> Option<Response> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!("unparseable request: {}", e);
            return Some(rpc_error(None, -32700, &format!("Parse error: {}", e), None));
        }
    };
    let req: Request = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => return Some(rpc_error(None, -32600, &format!("Invalid Request: {}", e), None)),
    };
    debug!("Received method={}", req.method);
    if req.id.is_none() {
        handle_notification(&req.method);
        return None;
    }
    Some(dispatch(client, req).await)
}

fn handle_notification(method: &str) {
    match method {
        "notifications/initialized" => info!("client initialized"),
        other => debug!("ignoring notification {}", other),
    }
}

async fn dispatch(client: &AlepeClient, req: Request) -> Response {
    match req.method.as_str() {
        "initialize" => handle_initialize(req.id),
        "ping" => rpc_ok(req.id, serde_json::json!({})),
        "tools/list" => handle_tools_list(req.id),
        "tools/call" => handle_tools_call(client, req.id, req.params).await,
        other => rpc_error(req.id, -32601, &format!("Method not found: {}", other), None),
    }
}

fn handle_initialize(id: Option<Id>) -> Response {
    rpc_ok(
        id,
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        }),
    )
}

fn handle_tools_list(id: Option<Id>) -> Response {
    let tools = tools::tool_descriptors();
    rpc_ok(id, serde_json::json!({ "tools": tools }))
}

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

async fn handle_tools_call(client: &AlepeClient, id: Option<Id>, params: Value) -> Response {
    let call: ToolCallParams = match serde_json::from_value(params) {
        Ok(c) => c,
        Err(e) => return rpc_error(id, -32602, &format!("Invalid params: {}", e), None),
    };
    match tools::call_tool(client, &call.name, call.arguments).await {
        Ok(out) => rpc_ok(id, mcp_wrap(out.structured, out.is_error)),
        Err(e @ ToolCallError::UnknownTool(_)) => rpc_error(id, -32601, &e.to_string(), None),
        Err(e @ ToolCallError::InvalidParams(_)) => rpc_error(id, -32602, &e.to_string(), None),
        Err(e @ ToolCallError::Internal(_)) => rpc_error(id, -32603, &e.to_string(), None),
    }
}
