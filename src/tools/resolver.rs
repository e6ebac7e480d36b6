use std::fmt::{self, Display};

use color_eyre::Result;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::openai::ProgressSink;
use crate::services::AssistantService;

use super::catalog::ToolCall;
use super::core::ToolDefinition;

/// ツール呼び出しを解決・実行した結果。失敗しても panic せず詳細を enum で表現する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResolution {
    /// 正常に実行できた: name と返却テキスト
    Executed { name: String, text: String },
    /// ツール名が一致しなかった
    ToolNotFound { requested: String },
    /// 引数の形がスキーマと合わない
    ArgumentsParseError { name: String, error: String },
    /// 実行中にエラーになった
    ExecutionError { name: String, error: String },
}

impl ToolResolution {
    pub fn is_executed(&self) -> bool {
        matches!(self, ToolResolution::Executed { .. })
    }

    /// クライアントへ返すテキスト (失敗時はエラーメッセージ)
    pub fn text(&self) -> String {
        match self {
            ToolResolution::Executed { text, .. } => text.clone(),
            ToolResolution::ToolNotFound { requested } => format!("Unknown tool: {requested}"),
            ToolResolution::ArgumentsParseError { name, error } => format!("Invalid arguments for {name}: {error}"),
            ToolResolution::ExecutionError { name, error } => format!("Error in {name}: {error}"),
        }
    }
}

impl Display for ToolResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolResolution::Executed { name, text } => write!(f, "Executed name={} (len={})", name, text.len()),
            ToolResolution::ToolNotFound { requested } => write!(f, "ToolNotFound requested={}", requested),
            ToolResolution::ArgumentsParseError { name, error } => {
                write!(f, "ArgumentsParseError name={} error={}", name, error)
            }
            ToolResolution::ExecutionError { name, error } => {
                write!(f, "ExecutionError name={} error={}", name, error)
            }
        }
    }
}

/// ツール名から定義を探し、引数を解釈して実行する。
/// - 名前が無い → `ToolNotFound`
/// - 引数の解釈に失敗 → `ArgumentsParseError`
/// - 実行エラー → `ExecutionError`
///
/// 進捗を出すのは `ask_assistant_in_thread` だけで、他のツールは `sink` に触れない。
#[instrument(name = "resolve_and_execute_tool_call", skip(service, tools, arguments, sink))]
pub async fn resolve_and_execute_tool_call<S>(
    service: &AssistantService,
    tools: &[ToolDefinition],
    name: &str,
    arguments: Value,
    sink: &mut S,
) -> ToolResolution
where
    S: ProgressSink + ?Sized,
{
    let tool = match tools.iter().find(|t| t.name() == name) {
        Some(t) => t,
        None => return ToolResolution::ToolNotFound { requested: name.to_string() },
    };
    let call = match ToolCall::parse(tool.kind, arguments) {
        Ok(c) => c,
        Err(e) => {
            return ToolResolution::ArgumentsParseError { name: name.to_string(), error: e.to_string() };
        }
    };
    debug!(target: "tools", ?call, "tool_call_parsed");
    let resolution = match execute(service, call, sink).await {
        Ok(text) => ToolResolution::Executed { name: name.to_string(), text },
        // {:#} で原因の連鎖も1行にまとめる
        Err(e) => ToolResolution::ExecutionError { name: name.to_string(), error: format!("{e:#}") },
    };
    debug!(target: "tools", resolution = %resolution, "tool_resolution");
    resolution
}

async fn execute<S>(service: &AssistantService, call: ToolCall, sink: &mut S) -> Result<String>
where
    S: ProgressSink + ?Sized,
{
    match call {
        ToolCall::ListAssistants(a) => service.list_assistants(a.limit).await,
        ToolCall::CreateAssistant(a) => {
            service.create_assistant(&a.name, &a.instructions, a.model.as_deref()).await
        }
        ToolCall::RetrieveAssistant(a) => service.retrieve_assistant(&a.assistant_id).await,
        ToolCall::UpdateAssistant(a) => {
            service
                .update_assistant(&a.assistant_id, a.name.as_deref(), a.instructions.as_deref(), a.model.as_deref())
                .await
        }
        ToolCall::CreateThread(a) => {
            service.create_new_assistant_thread(&a.name, a.description.as_deref()).await
        }
        ToolCall::ListThreads => service.list_threads(),
        ToolCall::DeleteThread(a) => service.delete_thread(&a.thread_id).await,
        ToolCall::AskAssistant(a) => {
            service.ask_assistant_in_thread(&a.thread_id, &a.assistant_id, &a.message, sink).await
        }
        ToolCall::SendMessage(a) => service.send_message(&a.thread_id, &a.assistant_id, &a.message).await,
        ToolCall::CheckResponse(a) => service.check_response(&a.thread_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::openai::{AssistantManager, ProgressUpdate};
    use crate::sqlite::Db;
    use crate::tools::build_assistant_tools;
    use serde_json::json;

    fn offline_service() -> Result<AssistantService> {
        Ok(AssistantService::new(AssistantManager::new("sk-test"), Db::in_memory()?, Config::default()))
    }

    #[tokio::test]
    async fn resolve_tool_not_found() -> Result<()> {
        let service = offline_service()?;
        let mut sink: Vec<ProgressUpdate> = Vec::new();
        let res = resolve_and_execute_tool_call(&service, &build_assistant_tools(), "nope", json!({}), &mut sink).await;
        assert!(matches!(res, ToolResolution::ToolNotFound { ref requested } if requested == "nope"));
        Ok(())
    }

    #[tokio::test]
    async fn resolve_args_parse_error() -> Result<()> {
        let service = offline_service()?;
        let mut sink: Vec<ProgressUpdate> = Vec::new();
        let res = resolve_and_execute_tool_call(
            &service,
            &build_assistant_tools(),
            "delete_thread",
            json!({ "thread": "x" }),
            &mut sink,
        )
        .await;
        assert!(matches!(res, ToolResolution::ArgumentsParseError { .. }));
        assert!(res.text().starts_with("Invalid arguments for delete_thread"));
        Ok(())
    }

    #[tokio::test]
    async fn resolve_list_threads_executes() -> Result<()> {
        let service = offline_service()?;
        let mut sink: Vec<ProgressUpdate> = Vec::new();
        let res = resolve_and_execute_tool_call(&service, &build_assistant_tools(), "list_threads", Value::Null, &mut sink).await;
        assert_eq!(
            res,
            ToolResolution::Executed { name: "list_threads".into(), text: "No managed threads found.".into() }
        );
        assert!(sink.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn resolve_execution_error() -> Result<()> {
        let service = offline_service()?;
        let mut sink: Vec<ProgressUpdate> = Vec::new();
        let res = resolve_and_execute_tool_call(
            &service,
            &build_assistant_tools(),
            "ask_assistant_in_thread",
            json!({ "thread_id": "thread_x", "assistant_id": "asst_1", "message": "hi" }),
            &mut sink,
        )
        .await;
        assert!(!res.is_executed());
        assert!(res.text().contains("not a managed thread"));
        Ok(())
    }
}
