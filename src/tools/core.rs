use serde_json::{json, Map, Value};

/// サーバーが公開するツールの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ListAssistants,
    CreateAssistant,
    RetrieveAssistant,
    UpdateAssistant,
    CreateThread,
    ListThreads,
    DeleteThread,
    AskAssistant,
    SendMessage,
    CheckResponse,
}

impl ToolKind {
    pub const ALL: [ToolKind; 10] = [
        ToolKind::ListAssistants,
        ToolKind::CreateAssistant,
        ToolKind::RetrieveAssistant,
        ToolKind::UpdateAssistant,
        ToolKind::CreateThread,
        ToolKind::ListThreads,
        ToolKind::DeleteThread,
        ToolKind::AskAssistant,
        ToolKind::SendMessage,
        ToolKind::CheckResponse,
    ];

    /// プロトコル上のツール名
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ListAssistants => "list_assistants",
            ToolKind::CreateAssistant => "create_assistant",
            ToolKind::RetrieveAssistant => "retrieve_assistant",
            ToolKind::UpdateAssistant => "update_assistant",
            ToolKind::CreateThread => "create_new_assistant_thread",
            ToolKind::ListThreads => "list_threads",
            ToolKind::DeleteThread => "delete_thread",
            ToolKind::AskAssistant => "ask_assistant_in_thread",
            ToolKind::SendMessage => "send_message",
            ToolKind::CheckResponse => "check_response",
        }
    }
}

/// クライアントへ公開するメタデータ (名前・説明・JSON Schema・読み取り専用ヒント)
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub kind: ToolKind,
    pub title: &'static str,
    pub description: &'static str,
    pub parameters: Value, // JSON Schema
    pub read_only: bool,
}

impl ToolDefinition {
    pub fn new(kind: ToolKind, title: &'static str, description: &'static str, parameters: Value) -> Self {
        Self { kind, title, description, parameters, read_only: false }
    }

    /// 読み取り専用フラグを設定
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// `tools/list` で返す形式
    pub fn as_listing(&self) -> Value {
        json!({
            "name": self.name(),
            "title": self.title,
            "description": self.description,
            "inputSchema": self.parameters,
            "annotations": {
                "title": self.title,
                "readOnlyHint": self.read_only,
            }
        })
    }
}

/// オブジェクト型の JSON Schema を組み立てるビルダー
#[derive(Debug, Default)]
pub struct ToolParametersBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
    additional_properties: Option<bool>,
}

impl ToolParametersBuilder {
    pub fn new_object() -> Self {
        Self::default()
    }

    pub fn add_string(mut self, name: &str, description: Option<&str>) -> Self {
        self.properties.insert(name.to_string(), typed("string", description));
        self
    }

    /// 整数 (範囲指定つき)
    pub fn add_integer(mut self, name: &str, description: Option<&str>, minimum: i64, maximum: i64) -> Self {
        let mut schema = typed("integer", description);
        schema["minimum"] = json!(minimum);
        schema["maximum"] = json!(maximum);
        self.properties.insert(name.to_string(), schema);
        self
    }

    pub fn required(mut self, name: &str) -> Self {
        self.required.push(name.to_string());
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(allowed);
        self
    }

    pub fn build(self) -> Value {
        let mut schema = json!({
            "type": "object",
            "properties": Value::Object(self.properties),
            "required": self.required,
        });
        if let Some(allowed) = self.additional_properties {
            schema["additionalProperties"] = json!(allowed);
        }
        schema
    }
}

fn typed(ty: &str, description: Option<&str>) -> Value {
    match description {
        Some(d) => json!({ "type": ty, "description": d }),
        None => json!({ "type": ty }),
    }
}
