//! OpenAI Assistants API 連携のモジュール

pub mod events;
pub mod manager;
pub mod run_driver;

// 代表的な公開APIを再エクスポート
pub use events::{decode_stream, delta_text, RunEvent, RunEventStream};
pub use manager::{AssistantManager, AssistantSummary, RunSummary};
pub use run_driver::{drive_run, follow_run, report_started, DiscardProgress, ProgressSink, ProgressUpdate};
