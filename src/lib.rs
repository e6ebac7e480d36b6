//! assistant_mcp
//!
//! OpenAI Assistants API (アシスタント・スレッド・メッセージ・run) を MCP のツールとして公開するサーバー。
//! 作成したスレッドはローカルの SQLite 台帳に記録し、後から一覧・削除できる。

pub mod config;
pub mod mcp;
pub mod openai;
pub mod services;
pub mod sqlite; // thread registry

pub mod tools;

pub use config::Config;
pub use mcp::McpServer;
pub use services::AssistantService;
pub use sqlite::Db;

// Ensure .env is loaded for tests before anything else runs in the test process.
#[cfg(test)]
#[ctor::ctor]
fn load_dotenv_for_tests() {
    let _ = dotenvy::dotenv();
}
