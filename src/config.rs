//! アプリケーション設定と定数

use color_eyre::eyre::{bail, eyre, Result};
use std::env;
use std::path::PathBuf;

/// APIキーを読む環境変数名
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// スレッド台帳(SQLite)のパス
pub const DB_PATH_ENV: &str = "OPENAI_ASSISTANT_DB";
/// `create_assistant` の既定モデル
pub const MODEL_ENV: &str = "OPENAI_ASSISTANT_MODEL";
/// `list_assistants` の既定件数
pub const LIST_LIMIT_ENV: &str = "OPENAI_ASSISTANT_LIST_LIMIT";
/// ログ出力ディレクトリ
pub const LOG_DIR_ENV: &str = "OPENAI_ASSISTANT_LOG_DIR";
/// API のベースURL (プロキシや互換サーバー向け。未設定なら公式エンドポイント)
pub const API_BASE_ENV: &str = "OPENAI_API_BASE";

/// 一覧取得件数の上限 (API 側の制限と同じ)
pub const MAX_LIST_LIMIT: u32 = 100;

/// アプリケーション設定
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI APIキー (未設定なら None)
    pub api_key: Option<String>,
    /// APIのベースURL (None なら async-openai の既定値)
    pub api_base: Option<String>,
    /// スレッド台帳のSQLiteファイル
    pub db_path: PathBuf,
    /// アシスタント作成時の既定モデル名
    pub default_model: String,
    /// アシスタント一覧の既定取得件数
    pub list_limit: u32,
    /// ログファイルの出力先
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            db_path: PathBuf::from("threads.sqlite"),
            // NOTE: Keep in sync with tests (tests/config_tests.rs).
            default_model: "gpt-4o".to_string(),
            list_limit: 20,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// 新しい設定インスタンスを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 環境変数から設定を読み込む。未設定の項目は既定値のまま。
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意の lookup 関数から設定を構築 (テストで環境変数を汚さないため)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        cfg.api_key = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty());
        cfg.api_base = lookup(API_BASE_ENV).filter(|b| !b.trim().is_empty());
        if let Some(path) = lookup(DB_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            cfg.db_path = PathBuf::from(path);
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|m| !m.trim().is_empty()) {
            cfg.default_model = model;
        }
        if let Some(raw) = lookup(LIST_LIMIT_ENV) {
            cfg.list_limit = raw
                .trim()
                .parse()
                .map_err(|e| eyre!("{LIST_LIMIT_ENV} must be a positive integer ({raw}): {e}"))?;
            if !(1..=MAX_LIST_LIMIT).contains(&cfg.list_limit) {
                bail!("{LIST_LIMIT_ENV} must be between 1 and {MAX_LIST_LIMIT} (got {})", cfg.list_limit);
            }
        }
        if let Some(dir) = lookup(LOG_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            cfg.log_dir = PathBuf::from(dir);
        }
        Ok(cfg)
    }

    /// APIキーを取り出す。サーバー起動時は必須。
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| eyre!("{API_KEY_ENV} is not set (environment or .env)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn overrides_from_lookup() -> Result<()> {
        let cfg = Config::from_lookup(lookup_from(&[
            (API_KEY_ENV, "sk-test"),
            (DB_PATH_ENV, "/tmp/reg.sqlite"),
            (LIST_LIMIT_ENV, "5"),
        ]))?;
        assert_eq!(cfg.require_api_key()?, "sk-test");
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/reg.sqlite"));
        assert_eq!(cfg.list_limit, 5);
        assert_eq!(cfg.default_model, "gpt-4o");
        Ok(())
    }

    #[test]
    fn blank_api_key_is_missing() -> Result<()> {
        let cfg = Config::from_lookup(lookup_from(&[(API_KEY_ENV, "  ")]))?;
        assert!(cfg.require_api_key().is_err());
        Ok(())
    }

    #[test]
    fn bad_list_limit_is_rejected() {
        let res = Config::from_lookup(lookup_from(&[(LIST_LIMIT_ENV, "many")]));
        assert!(res.is_err());
    }

    #[test]
    fn out_of_range_list_limit_is_rejected() {
        assert!(Config::from_lookup(lookup_from(&[(LIST_LIMIT_ENV, "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[(LIST_LIMIT_ENV, "101")])).is_err());
        let edge = Config::from_lookup(lookup_from(&[(LIST_LIMIT_ENV, "100")]));
        assert_eq!(edge.map(|c| c.list_limit).ok(), Some(100));
    }

    #[test]
    fn api_base_override() -> Result<()> {
        assert_eq!(Config::from_lookup(lookup_from(&[]))?.api_base, None);
        let cfg = Config::from_lookup(lookup_from(&[(API_BASE_ENV, "http://localhost:8080/v1")]))?;
        assert_eq!(cfg.api_base.as_deref(), Some("http://localhost:8080/v1"));
        Ok(())
    }
}
