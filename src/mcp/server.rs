//! stdio 上の MCP サーバー
//!
//! 1行1メッセージの JSON-RPC 2.0 を読み、`initialize` / `ping` / `tools/list` / `tools/call`
//! に応答する。リクエストは届いた順に1件ずつ処理する (並行実行しない)。
//! stdout はプロトコル専用なので、ログは tracing 経由で別の出力先へ流すこと。

use color_eyre::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::openai::{ProgressSink, ProgressUpdate};
use crate::services::AssistantService;
use crate::tools::{build_assistant_tools, resolve_and_execute_tool_call, ToolDefinition};

use super::protocol::{
    call_tool_result, CallToolParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    DEFAULT_PROTOCOL_VERSION, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND,
    PARSE_ERROR,
};

pub const SERVER_NAME: &str = "openai-assistant";

/// メッセージを1行の JSON として書き出す
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: serde::Serialize,
{
    let mut payload = serde_json::to_vec(message)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// 進捗を `notifications/progress` として送るシンク。
/// クライアントが progressToken を付けなかった呼び出しではログに残すだけ。
pub struct ProgressNotifier<'a, W: ?Sized> {
    writer: &'a mut W,
    token: Option<Value>,
}

impl<'a, W: AsyncWrite + Unpin + ?Sized> ProgressNotifier<'a, W> {
    pub fn new(writer: &'a mut W, token: Option<Value>) -> Self {
        Self { writer, token }
    }
}

impl<W: AsyncWrite + Unpin + ?Sized> ProgressSink for ProgressNotifier<'_, W> {
    async fn report(&mut self, update: ProgressUpdate) -> Result<()> {
        match &self.token {
            Some(token) => {
                let notification = JsonRpcNotification::progress(token.clone(), &update);
                write_message(&mut *self.writer, &notification).await
            }
            None => {
                debug!(target: "mcp", %update, "progress_without_token");
                Ok(())
            }
        }
    }
}

/// MCP サーバー本体
pub struct McpServer {
    service: AssistantService,
    tools: Vec<ToolDefinition>,
}

impl McpServer {
    pub fn new(service: AssistantService) -> Self {
        Self { service, tools: build_assistant_tools() }
    }

    /// 入力が EOF になるまで読み続ける
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(target: "mcp", tools = self.tools.len(), "mcp_server_started");
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(line, &mut writer).await? {
                write_message(&mut writer, &response).await?;
            }
        }
        info!(target: "mcp", "mcp_server_input_closed");
        Ok(())
    }

    /// 1メッセージを処理する。返り値が None なら応答を書かない (通知)。
    /// `tools/call` 中の進捗通知は応答より先に `writer` へ書かれる。
    pub async fn handle_line<W>(&self, line: &str, writer: &mut W) -> Result<Option<JsonRpcResponse>>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "mcp", error = %e, "unparseable_message");
                return Ok(Some(JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("parse error: {e}"))));
            }
        };
        // JSON としては読めたがリクエストの形をしていない
        let id_hint = raw.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "mcp", error = %e, "invalid_request");
                return Ok(Some(JsonRpcResponse::error(id_hint, INVALID_REQUEST, format!("invalid request: {e}"))));
            }
        };
        if request.is_notification() {
            debug!(target: "mcp", method = %request.method, "notification_received");
            return Ok(None);
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        if request.jsonrpc.as_deref().is_some_and(|v| v != JSONRPC_VERSION) {
            return Ok(Some(JsonRpcResponse::error(id, INVALID_REQUEST, "jsonrpc must be \"2.0\"")));
        }

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.initialize_result(&request.params)),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.tools_list_result()),
            "tools/call" => match serde_json::from_value::<CallToolParams>(request.params) {
                Ok(params) => JsonRpcResponse::success(id, self.call_tool(params, writer).await),
                Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid tools/call params: {e}")),
            },
            other => {
                debug!(target: "mcp", method = other, "method_not_found");
                JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("method not found: {other}"))
            }
        };
        Ok(Some(response))
    }

    fn initialize_result(&self, params: &Value) -> Value {
        let protocol = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        json!({
            "protocolVersion": protocol,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }
        })
    }

    fn tools_list_result(&self) -> Value {
        let tools: Vec<Value> = self.tools.iter().map(ToolDefinition::as_listing).collect();
        json!({ "tools": tools })
    }

    #[instrument(name = "tools_call", skip_all, fields(tool = %params.name))]
    async fn call_tool<W>(&self, params: CallToolParams, writer: &mut W) -> Value
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let token = params.progress_token();
        let mut notifier = ProgressNotifier::new(writer, token);
        let resolution =
            resolve_and_execute_tool_call(&self.service, &self.tools, &params.name, params.arguments, &mut notifier)
                .await;
        if !resolution.is_executed() {
            warn!(target: "mcp", resolution = %resolution, "tool_call_failed");
        }
        call_tool_result(resolution.text(), !resolution.is_executed())
    }
}
