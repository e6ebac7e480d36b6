//! Assistants API のラッパー
//!
//! `async-openai` のクライアントを1つ保持し、アシスタント・スレッド・メッセージ・run の
//! 呼び出しをこのサーバーで使う形にまとめる。ローカルのスレッド台帳には触れない。

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    AssistantObject, CreateAssistantRequestArgs, CreateMessageRequestArgs,
    CreateMessageRequestContent, CreateRunRequestArgs, CreateThreadRequestArgs, MessageContent,
    MessageRole, ModifyAssistantRequestArgs, RunObject,
};
use async_openai::Client;
use color_eyre::eyre::{eyre, Result};
use futures::StreamExt;
use tracing::{debug, info, instrument};

use super::events::{decode_stream, RunEventStream};

/// 整形に必要なアシスタント情報だけを抜き出したもの
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantSummary {
    pub id: String,
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub model: String,
}

impl From<AssistantObject> for AssistantSummary {
    fn from(a: AssistantObject) -> Self {
        Self { id: a.id, name: a.name, instructions: a.instructions, model: a.model }
    }
}

/// run の ID と状態 (`in_progress`, `completed` など API 上の表記)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub id: String,
    pub status: String,
}

impl RunSummary {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

impl TryFrom<RunObject> for RunSummary {
    type Error = color_eyre::Report;

    fn try_from(run: RunObject) -> Result<Self> {
        let status = serde_json::to_value(&run.status)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| eyre!("unexpected run status encoding for run {}", run.id))?;
        Ok(Self { id: run.id, status })
    }
}

/// OpenAI Assistants API クライアント
#[derive(Clone)]
pub struct AssistantManager {
    client: Client<OpenAIConfig>,
}

impl std::fmt::Debug for AssistantManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantManager").finish_non_exhaustive()
    }
}

impl AssistantManager {
    /// APIキーを指定して作成 (ネットワーク接続はまだ行わない)
    pub fn new(api_key: &str) -> Self {
        let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
        Self { client }
    }

    /// ベースURLを差し替えて作成 (プロキシ・互換サーバー向け)
    pub fn with_api_base(api_key: &str, api_base: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key).with_api_base(api_base);
        Self { client: Client::with_config(config) }
    }

    #[instrument(name = "list_assistants", skip(self))]
    pub async fn list_assistants(&self, limit: u32) -> Result<Vec<AssistantSummary>> {
        let limit = limit.to_string();
        let resp = self.client.assistants().list(&[("limit", limit.as_str())]).await?;
        debug!(target: "openai", count = resp.data.len(), "assistants_listed");
        Ok(resp.data.into_iter().map(AssistantSummary::from).collect())
    }

    #[instrument(name = "create_assistant", skip(self, instructions))]
    pub async fn create_assistant(&self, name: &str, instructions: &str, model: &str) -> Result<AssistantSummary> {
        let req = CreateAssistantRequestArgs::default()
            .name(name)
            .instructions(instructions)
            .model(model)
            .build()?;
        let created = self.client.assistants().create(req).await?;
        info!(target: "openai", id = %created.id, "assistant_created");
        Ok(created.into())
    }

    #[instrument(name = "retrieve_assistant", skip(self))]
    pub async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantSummary> {
        Ok(self.client.assistants().retrieve(assistant_id).await?.into())
    }

    /// 指定された項目だけを書き換える
    #[instrument(name = "update_assistant", skip(self, instructions))]
    pub async fn update_assistant(
        &self,
        assistant_id: &str,
        name: Option<&str>,
        instructions: Option<&str>,
        model: Option<&str>,
    ) -> Result<AssistantSummary> {
        let mut builder = ModifyAssistantRequestArgs::default();
        if let Some(name) = name { builder.name(name); }
        if let Some(instructions) = instructions { builder.instructions(instructions); }
        if let Some(model) = model { builder.model(model); }
        let updated = self.client.assistants().update(assistant_id, builder.build()?).await?;
        info!(target: "openai", id = %updated.id, "assistant_updated");
        Ok(updated.into())
    }

    /// 空のスレッドを作成し、その ID を返す
    #[instrument(name = "create_thread", skip(self))]
    pub async fn create_thread(&self) -> Result<String> {
        let thread = self.client.threads().create(CreateThreadRequestArgs::default().build()?).await?;
        info!(target: "openai", id = %thread.id, "thread_created");
        Ok(thread.id)
    }

    /// 戻り値: API が削除済みと応答したか
    #[instrument(name = "delete_thread", skip(self))]
    pub async fn delete_thread(&self, thread_id: &str) -> Result<bool> {
        let resp = self.client.threads().delete(thread_id).await?;
        Ok(resp.deleted)
    }

    #[instrument(name = "add_user_message", skip(self, text), fields(text_len = text.len()))]
    pub async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<String> {
        let req = CreateMessageRequestArgs::default()
            .role(MessageRole::User)
            .content(CreateMessageRequestContent::Content(text.to_string()))
            .build()?;
        let msg = self.client.threads().messages(thread_id).create(req).await?;
        Ok(msg.id)
    }

    /// ストリーミング run を開始し、`RunEvent` 列として返す。
    /// 呼び出し前にユーザーメッセージをスレッドへ追加しておくこと。
    pub async fn stream_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunEventStream> {
        let req = CreateRunRequestArgs::default().assistant_id(assistant_id).build()?;
        let raw = self.client.threads().runs(thread_id).create_stream(req).await?;
        info!(target: "openai", thread_id, assistant_id, "run_stream_opened");
        Ok(decode_stream(raw).boxed())
    }

    /// ストリーミングなしで run を開始する (結果は `latest_run` で確認)
    #[instrument(name = "start_run", skip(self))]
    pub async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunSummary> {
        let req = CreateRunRequestArgs::default().assistant_id(assistant_id).build()?;
        let run = self.client.threads().runs(thread_id).create(req).await?;
        info!(target: "openai", run_id = %run.id, "run_started");
        run.try_into()
    }

    /// スレッドの最新 run (無ければ None)
    #[instrument(name = "latest_run", skip(self))]
    pub async fn latest_run(&self, thread_id: &str) -> Result<Option<RunSummary>> {
        let resp = self
            .client
            .threads()
            .runs(thread_id)
            .list(&[("limit", "1"), ("order", "desc")])
            .await?;
        resp.data.into_iter().next().map(RunSummary::try_from).transpose()
    }

    /// スレッド内で最も新しいアシスタント発言のテキスト部分を連結して返す
    #[instrument(name = "latest_assistant_text", skip(self))]
    pub async fn latest_assistant_text(&self, thread_id: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .threads()
            .messages(thread_id)
            .list(&[("limit", "20"), ("order", "desc")])
            .await?;
        let latest = resp.data.into_iter().find(|m| matches!(m.role, MessageRole::Assistant));
        Ok(latest.map(|m| {
            m.content
                .into_iter()
                .filter_map(|c| match c {
                    MessageContent::Text(t) => Some(t.text.value),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n")
        }))
    }
}
