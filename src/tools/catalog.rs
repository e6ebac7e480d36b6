//! 公開ツールの定義と、ツールごとの引数型。

use serde::Deserialize;
use serde_json::Value;

use super::core::{ToolDefinition, ToolKind, ToolParametersBuilder};

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ListAssistantsArgs {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CreateAssistantArgs {
    pub name: String,
    pub instructions: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AssistantIdArgs {
    pub assistant_id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UpdateAssistantArgs {
    pub assistant_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CreateThreadArgs {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ThreadIdArgs {
    pub thread_id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ThreadMessageArgs {
    pub thread_id: String,
    pub assistant_id: String,
    pub message: String,
}

/// 引数を型付きで解釈済みのツール呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ListAssistants(ListAssistantsArgs),
    CreateAssistant(CreateAssistantArgs),
    RetrieveAssistant(AssistantIdArgs),
    UpdateAssistant(UpdateAssistantArgs),
    CreateThread(CreateThreadArgs),
    ListThreads,
    DeleteThread(ThreadIdArgs),
    AskAssistant(ThreadMessageArgs),
    SendMessage(ThreadMessageArgs),
    CheckResponse(ThreadIdArgs),
}

impl ToolCall {
    /// JSON 引数を種類に応じた型へ変換する。`null` は空オブジェクト扱い。
    pub fn parse(kind: ToolKind, arguments: Value) -> Result<Self, serde_json::Error> {
        let args = if arguments.is_null() { Value::Object(Default::default()) } else { arguments };
        Ok(match kind {
            ToolKind::ListAssistants => ToolCall::ListAssistants(serde_json::from_value(args)?),
            ToolKind::CreateAssistant => ToolCall::CreateAssistant(serde_json::from_value(args)?),
            ToolKind::RetrieveAssistant => ToolCall::RetrieveAssistant(serde_json::from_value(args)?),
            ToolKind::UpdateAssistant => ToolCall::UpdateAssistant(serde_json::from_value(args)?),
            ToolKind::CreateThread => ToolCall::CreateThread(serde_json::from_value(args)?),
            ToolKind::ListThreads => ToolCall::ListThreads,
            ToolKind::DeleteThread => ToolCall::DeleteThread(serde_json::from_value(args)?),
            ToolKind::AskAssistant => ToolCall::AskAssistant(serde_json::from_value(args)?),
            ToolKind::SendMessage => ToolCall::SendMessage(serde_json::from_value(args)?),
            ToolKind::CheckResponse => ToolCall::CheckResponse(serde_json::from_value(args)?),
        })
    }
}

/// 公開する全ツールの定義
pub fn build_assistant_tools() -> Vec<ToolDefinition> {
    ToolKind::ALL.iter().map(|k| build_tool(*k)).collect()
}

pub fn build_tool(kind: ToolKind) -> ToolDefinition {
    match kind {
        ToolKind::ListAssistants => ToolDefinition::new(
            kind,
            "List OpenAI Assistants",
            "List the assistants available in the OpenAI account.",
            ToolParametersBuilder::new_object()
                .add_integer("limit", Some("Maximum number of assistants to return"), 1, 100)
                .additional_properties(false)
                .build(),
        )
        .with_read_only(true),
        ToolKind::CreateAssistant => ToolDefinition::new(
            kind,
            "Create OpenAI Assistant",
            "Create a new assistant with the given name, instructions and model.",
            ToolParametersBuilder::new_object()
                .add_string("name", Some("Display name of the assistant"))
                .add_string("instructions", Some("System instructions for the assistant"))
                .add_string("model", Some("Model to use (server default when omitted)"))
                .required("name")
                .required("instructions")
                .additional_properties(false)
                .build(),
        ),
        ToolKind::RetrieveAssistant => ToolDefinition::new(
            kind,
            "Retrieve OpenAI Assistant",
            "Show the name, instructions and model of one assistant.",
            ToolParametersBuilder::new_object()
                .add_string("assistant_id", Some("ID of the assistant"))
                .required("assistant_id")
                .additional_properties(false)
                .build(),
        )
        .with_read_only(true),
        ToolKind::UpdateAssistant => ToolDefinition::new(
            kind,
            "Update OpenAI Assistant",
            "Change the name, instructions or model of an existing assistant.",
            ToolParametersBuilder::new_object()
                .add_string("assistant_id", Some("ID of the assistant"))
                .add_string("name", None)
                .add_string("instructions", None)
                .add_string("model", None)
                .required("assistant_id")
                .additional_properties(false)
                .build(),
        ),
        ToolKind::CreateThread => ToolDefinition::new(
            kind,
            "Create New Assistant Thread",
            "Create a conversation thread and record it locally so it can be listed and deleted later.",
            ToolParametersBuilder::new_object()
                .add_string("name", Some("Name to remember the thread by"))
                .add_string("description", Some("Optional longer description"))
                .required("name")
                .additional_properties(false)
                .build(),
        ),
        ToolKind::ListThreads => ToolDefinition::new(
            kind,
            "List Managed Threads",
            "List the locally recorded threads, most recently used first.",
            ToolParametersBuilder::new_object().additional_properties(false).build(),
        )
        .with_read_only(true),
        ToolKind::DeleteThread => ToolDefinition::new(
            kind,
            "Delete Managed Thread",
            "Delete a thread from OpenAI and remove it from the local record.",
            ToolParametersBuilder::new_object()
                .add_string("thread_id", Some("ID of the thread"))
                .required("thread_id")
                .additional_properties(false)
                .build(),
        ),
        ToolKind::AskAssistant => ToolDefinition::new(
            kind,
            "Ask Assistant in Thread",
            "Send a message to an assistant in a managed thread and stream the run until the reply is complete.",
            thread_message_schema(),
        ),
        ToolKind::SendMessage => ToolDefinition::new(
            kind,
            "Send Message and Start Run",
            "Send a message and start a run without waiting; poll with check_response.",
            thread_message_schema(),
        ),
        ToolKind::CheckResponse => ToolDefinition::new(
            kind,
            "Check Assistant Response",
            "Return the latest reply in a thread if its last run has completed, otherwise the run status.",
            ToolParametersBuilder::new_object()
                .add_string("thread_id", Some("ID of the thread"))
                .required("thread_id")
                .additional_properties(false)
                .build(),
        )
        .with_read_only(true),
    }
}

fn thread_message_schema() -> Value {
    ToolParametersBuilder::new_object()
        .add_string("thread_id", Some("ID of a managed thread"))
        .add_string("assistant_id", Some("ID of the assistant to run"))
        .add_string("message", Some("User message to add before the run"))
        .required("thread_id")
        .required("assistant_id")
        .required("message")
        .additional_properties(false)
        .build()
}
