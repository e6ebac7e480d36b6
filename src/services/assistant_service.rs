//! AssistantService
//!
//! ツール呼び出し1回ぶんの業務ロジック層。
//! 引数の検証、スレッド台帳の確認・更新、OpenAI 呼び出し、応答文字列の整形を受け持つ。
//! MCP などの輸送層からは独立している。

use std::sync::Mutex;

use chrono::DateTime;
use color_eyre::eyre::{bail, eyre, Result};
use tracing::{info, instrument, warn};

use crate::config::{Config, MAX_LIST_LIMIT};
use crate::openai::{follow_run, report_started, AssistantManager, AssistantSummary, ProgressSink};
use crate::sqlite::{Db, ThreadRecord};

/// アシスタント操作サービス
pub struct AssistantService {
    manager: AssistantManager,
    registry: Mutex<Db>,
    config: Config,
}

impl AssistantService {
    /// 構築済みの部品からサービスを作成
    pub fn new(manager: AssistantManager, registry: Db, config: Config) -> Self {
        Self { manager, registry: Mutex::new(registry), config }
    }

    /// 設定からクライアントと台帳を用意して作成 (APIキー必須)
    pub fn from_config(config: Config) -> Result<Self> {
        let api_key = config.require_api_key()?;
        let manager = match &config.api_base {
            Some(base) => AssistantManager::with_api_base(api_key, base),
            None => AssistantManager::new(api_key),
        };
        let registry = Db::open_or_create(&config.db_path)?;
        Ok(Self::new(manager, registry, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 台帳へのアクセス。クロージャ内では await できないので、ロックを保持したまま中断することはない。
    fn with_registry<T>(&self, f: impl FnOnce(&Db) -> Result<T>) -> Result<T> {
        let db = self.registry.lock().map_err(|_| eyre!("thread registry lock poisoned"))?;
        f(&db)
    }

    pub async fn list_assistants(&self, limit: Option<u32>) -> Result<String> {
        let limit = limit.unwrap_or(self.config.list_limit);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            bail!("limit must be between 1 and {MAX_LIST_LIMIT} (got {limit})");
        }
        let assistants = self.manager.list_assistants(limit).await?;
        Ok(format_assistant_list(&assistants))
    }

    pub async fn create_assistant(&self, name: &str, instructions: &str, model: Option<&str>) -> Result<String> {
        require_non_empty("name", name)?;
        require_non_empty("instructions", instructions)?;
        let model = model.unwrap_or(&self.config.default_model);
        let created = self.manager.create_assistant(name, instructions, model).await?;
        Ok(format!(
            "Created assistant '{}' with ID: {}",
            created.name.as_deref().unwrap_or(name),
            created.id
        ))
    }

    pub async fn retrieve_assistant(&self, assistant_id: &str) -> Result<String> {
        require_non_empty("assistant_id", assistant_id)?;
        let assistant = self.manager.retrieve_assistant(assistant_id).await?;
        Ok(format_assistant_details(&assistant))
    }

    pub async fn update_assistant(
        &self,
        assistant_id: &str,
        name: Option<&str>,
        instructions: Option<&str>,
        model: Option<&str>,
    ) -> Result<String> {
        require_non_empty("assistant_id", assistant_id)?;
        if name.is_none() && instructions.is_none() && model.is_none() {
            bail!("nothing to update: provide at least one of name, instructions, model");
        }
        let updated = self.manager.update_assistant(assistant_id, name, instructions, model).await?;
        Ok(format!(
            "Updated assistant '{}' (ID: {})",
            updated.name.as_deref().unwrap_or("(unnamed)"),
            updated.id
        ))
    }

    /// リモートにスレッドを作り、台帳へ記録する
    pub async fn create_new_assistant_thread(&self, name: &str, description: Option<&str>) -> Result<String> {
        require_non_empty("name", name)?;
        let thread_id = self.manager.create_thread().await?;
        let description = description.filter(|d| !d.trim().is_empty());
        self.with_registry(|db| db.add_thread(&thread_id, name, description))?;
        info!(target: "tools", %thread_id, name, "thread_registered");
        Ok(format!("Created new thread '{name}' with ID: {thread_id}"))
    }

    pub fn list_threads(&self) -> Result<String> {
        let threads = self.with_registry(|db| db.list_threads())?;
        Ok(format_thread_list(&threads))
    }

    /// リモートで削除できた場合のみ台帳からも外す
    pub async fn delete_thread(&self, thread_id: &str) -> Result<String> {
        require_non_empty("thread_id", thread_id)?;
        let record = self.with_registry(|db| db.get_thread(thread_id))?;
        if !self.manager.delete_thread(thread_id).await? {
            bail!("OpenAI did not confirm deletion of thread {thread_id}");
        }
        match record {
            Some(record) => {
                self.with_registry(|db| db.delete_thread(thread_id))?;
                info!(target: "tools", thread_id, name = %record.name, "thread_unregistered");
            }
            None => warn!(target: "tools", thread_id, "deleted thread was not in the local registry"),
        }
        Ok(format!("Successfully deleted thread {thread_id}."))
    }

    /// 管理下のスレッドにメッセージを追加し、run をストリーミングで最後まで駆動して応答テキストを返す。
    /// 進捗は `sink` に送られる。
    #[instrument(name = "ask_assistant_in_thread", skip(self, message, sink), fields(message_len = message.len()))]
    pub async fn ask_assistant_in_thread<S>(
        &self,
        thread_id: &str,
        assistant_id: &str,
        message: &str,
        sink: &mut S,
    ) -> Result<String>
    where
        S: ProgressSink + ?Sized,
    {
        require_non_empty("thread_id", thread_id)?;
        require_non_empty("assistant_id", assistant_id)?;
        require_non_empty("message", message)?;
        self.require_managed_thread(thread_id)?;

        // 開始通知はメッセージ投稿より先に出す
        report_started(sink).await?;
        self.manager.add_user_message(thread_id, message).await?;
        let events = self.manager.stream_run(thread_id, assistant_id).await?;
        follow_run(events, sink).await
    }

    /// ストリーミングせずに run を開始する。結果は `check_response` で取りに行く。
    pub async fn send_message(&self, thread_id: &str, assistant_id: &str, message: &str) -> Result<String> {
        require_non_empty("thread_id", thread_id)?;
        require_non_empty("assistant_id", assistant_id)?;
        require_non_empty("message", message)?;
        self.require_managed_thread(thread_id)?;

        self.manager.add_user_message(thread_id, message).await?;
        let run = self.manager.start_run(thread_id, assistant_id).await?;
        Ok(format!("Message sent. Run {} started.", run.id))
    }

    pub async fn check_response(&self, thread_id: &str) -> Result<String> {
        require_non_empty("thread_id", thread_id)?;
        let run = self
            .manager
            .latest_run(thread_id)
            .await?
            .ok_or_else(|| eyre!("no run found in thread {thread_id}"))?;
        if !run.is_completed() {
            return Ok(format!("Run status is: {}", run.status));
        }
        let text = self.manager.latest_assistant_text(thread_id).await?;
        Ok(text.unwrap_or_else(|| "(no assistant reply found)".to_string()))
    }

    /// 台帳に登録済みか確認し、最終利用時刻を更新する
    fn require_managed_thread(&self, thread_id: &str) -> Result<()> {
        self.with_registry(|db| {
            if !db.exists(thread_id)? {
                bail!(
                    "thread {thread_id} is not a managed thread; create it with create_new_assistant_thread first"
                );
            }
            db.touch_thread(thread_id)?;
            Ok(())
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} must not be empty");
    }
    Ok(())
}

pub fn format_assistant_list(assistants: &[AssistantSummary]) -> String {
    if assistants.is_empty() {
        return "No assistants found.".to_string();
    }
    let lines: Vec<String> = assistants
        .iter()
        .map(|a| format!("ID: {}, Name: {}", a.id, a.name.as_deref().unwrap_or("(unnamed)")))
        .collect();
    format!("Available Assistants:\n{}", lines.join("\n"))
}

pub fn format_assistant_details(a: &AssistantSummary) -> String {
    format!(
        "ID: {}\nName: {}\nInstructions: {}\nModel: {}",
        a.id,
        a.name.as_deref().unwrap_or("(unnamed)"),
        a.instructions.as_deref().unwrap_or(""),
        a.model
    )
}

pub fn format_thread_list(threads: &[ThreadRecord]) -> String {
    if threads.is_empty() {
        return "No managed threads found.".to_string();
    }
    let blocks: Vec<String> = threads
        .iter()
        .map(|t| {
            let mut block = format!("Thread ID: {}\n  Name: {}", t.thread_id, t.name);
            if let Some(desc) = &t.description {
                block.push_str(&format!("\n  Description: {desc}"));
            }
            block.push_str(&format!("\n  Last Used: {}", format_epoch_ms(t.last_used_at_epoch_ms)));
            block
        })
        .collect();
    format!("Managed Threads:\n{}", blocks.join("\n"))
}

fn format_epoch_ms(ms: i64) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{ms} ms"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::ProgressUpdate;

    fn offline_service() -> Result<AssistantService> {
        let config = Config { api_key: Some("sk-test".into()), ..Config::default() };
        Ok(AssistantService::new(AssistantManager::new("sk-test"), Db::in_memory()?, config))
    }

    #[test]
    fn assistant_list_formatting() {
        assert_eq!(format_assistant_list(&[]), "No assistants found.");
        let list = vec![
            AssistantSummary { id: "asst_1".into(), name: Some("Helper".into()), instructions: None, model: "gpt-4o".into() },
            AssistantSummary { id: "asst_2".into(), name: None, instructions: None, model: "gpt-4o".into() },
        ];
        assert_eq!(
            format_assistant_list(&list),
            "Available Assistants:\nID: asst_1, Name: Helper\nID: asst_2, Name: (unnamed)"
        );
    }

    #[test]
    fn assistant_details_formatting() {
        let a = AssistantSummary {
            id: "asst_1".into(),
            name: Some("Helper".into()),
            instructions: Some("Be brief.".into()),
            model: "gpt-4o".into(),
        };
        assert_eq!(format_assistant_details(&a), "ID: asst_1\nName: Helper\nInstructions: Be brief.\nModel: gpt-4o");
    }

    #[test]
    fn thread_list_formatting() {
        assert_eq!(format_thread_list(&[]), "No managed threads found.");
        let threads = vec![ThreadRecord {
            thread_id: "thread_1".into(),
            name: "notes".into(),
            description: Some("weekly".into()),
            last_used_at_epoch_ms: 0,
        }];
        assert_eq!(
            format_thread_list(&threads),
            "Managed Threads:\nThread ID: thread_1\n  Name: notes\n  Description: weekly\n  Last Used: 1970-01-01 00:00:00 UTC"
        );
    }

    #[test]
    fn list_threads_reads_registry() -> Result<()> {
        let service = offline_service()?;
        assert_eq!(service.list_threads()?, "No managed threads found.");
        service.with_registry(|db| db.add_thread("thread_9", "kept", None))?;
        assert!(service.list_threads()?.contains("Thread ID: thread_9"));
        Ok(())
    }

    #[tokio::test]
    async fn unmanaged_thread_is_rejected_before_any_request() -> Result<()> {
        let service = offline_service()?;
        let mut sink: Vec<ProgressUpdate> = Vec::new();
        let err = service
            .ask_assistant_in_thread("thread_unknown", "asst_1", "hi", &mut sink)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a managed thread"));
        assert!(sink.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn started_is_reported_even_if_posting_fails() -> Result<()> {
        // 接続を拒否されるアドレスに向け、メッセージ投稿を確実に失敗させる
        let manager = AssistantManager::with_api_base("sk-test", "http://127.0.0.1:9/v1");
        let service = AssistantService::new(manager, Db::in_memory()?, Config::default());
        service.with_registry(|db| db.add_thread("thread_1", "t", None))?;
        let mut sink: Vec<ProgressUpdate> = Vec::new();
        let res = service.ask_assistant_in_thread("thread_1", "asst_1", "hi", &mut sink).await;
        assert!(res.is_err());
        assert_eq!(sink, vec![ProgressUpdate::new(0, "run starting")]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_remote_delete_keeps_registry_entry() -> Result<()> {
        let manager = AssistantManager::with_api_base("sk-test", "http://127.0.0.1:9/v1");
        let service = AssistantService::new(manager, Db::in_memory()?, Config::default());
        service.with_registry(|db| db.add_thread("thread_1", "t", None))?;
        assert!(service.delete_thread("thread_1").await.is_err());
        assert!(service.with_registry(|db| db.exists("thread_1"))?);
        Ok(())
    }

    #[tokio::test]
    async fn empty_arguments_are_rejected() -> Result<()> {
        let service = offline_service()?;
        assert!(service.create_assistant(" ", "x", None).await.is_err());
        assert!(service.send_message("t", "a", "").await.is_err());
        assert!(service.update_assistant("asst_1", None, None, None).await.is_err());
        assert!(service.list_assistants(Some(0)).await.is_err());
        Ok(())
    }
}
