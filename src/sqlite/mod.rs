//! スレッド台帳 (SQLite)
//!
//! `rusqlite` を使って、このサーバーが作成した OpenAI スレッドを記録します。
//! OpenAI 側にはスレッド一覧 API が無いため、作成したスレッドの ID と表示名をローカルに保持し、
//! 後から一覧表示・削除できるようにするのが目的です。
//!
//! # 特色
//! - `bundled` フィーチャで SQLite 本体を同梱
//! - UPSERT (`INSERT .. ON CONFLICT`) で同じ ID の再登録は上書き
//! - `last_used_at_epoch_ms` で最終利用時刻を保持し、一覧は新しい順
//!
//! # 代表的な使い方
//! ```no_run
//! use assistant_mcp::sqlite::Db;
//!
//! # fn demo() -> color_eyre::Result<()> {
//! let db = Db::open_or_create("threads.sqlite")?; // ファイルが無ければ作成
//! db.add_thread("thread_abc", "調査メモ", Some("週次レポート用"))?;
//! for t in db.list_threads()? {
//!     println!("{} ({})", t.thread_id, t.name);
//! }
//! # Ok(()) }
//! ```

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use color_eyre::eyre::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

/// DB ハンドル。内部で `rusqlite::Connection` を保持します。
pub struct Db {
	conn: Connection,
}

/// `threads` テーブルの1行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
	pub thread_id: String,
	pub name: String,
	pub description: Option<String>,
	pub last_used_at_epoch_ms: i64,
}

impl ThreadRecord {
	fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
		Ok(Self {
			thread_id: row.get(0)?,
			name: row.get(1)?,
			description: row.get(2)?,
			last_used_at_epoch_ms: row.get(3)?,
		})
	}
}

impl Db {
	/// DB を開き、存在しなければ新規作成。
	pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
		let p = path.as_ref();
		if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent)?;
		}
		let conn = Connection::open(p)?;
		let db = Self { conn };
		db.ensure_schema()?;
		info!(target: "sqlite", "thread registry opened: {:?}", p);
		Ok(db)
	}

	/// メモリ上 (永続化なし) の DB を作成 (主にテスト用途)
	pub fn in_memory() -> Result<Self> {
		let conn = Connection::open_in_memory()?;
		let db = Self { conn };
		db.ensure_schema()?;
		Ok(db)
	}

	/// スキーマを作成 (存在しない場合のみ)
	fn ensure_schema(&self) -> Result<()> {
		self.conn.execute_batch(
			r#"
			CREATE TABLE IF NOT EXISTS threads (
				thread_id TEXT PRIMARY KEY,
				name TEXT NOT NULL,
				description TEXT,
				last_used_at_epoch_ms INTEGER NOT NULL
			);
			CREATE INDEX IF NOT EXISTS idx_threads_last_used ON threads(last_used_at_epoch_ms DESC);
			"#,
		)?;
		Ok(())
	}

	/// 現在時刻 (ms since epoch)
	fn now_ms() -> Result<i64> {
		Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as i64)
	}

	/// スレッドを登録 (thread_id が既に存在すれば名前・説明・時刻を更新)
	pub fn add_thread(&self, thread_id: &str, name: &str, description: Option<&str>) -> Result<()> {
		let now = Self::now_ms()?;
		self.conn.execute(
			r#"INSERT INTO threads(thread_id, name, description, last_used_at_epoch_ms)
			   VALUES (?1, ?2, ?3, ?4)
			   ON CONFLICT(thread_id) DO UPDATE SET
				   name = excluded.name,
				   description = excluded.description,
				   last_used_at_epoch_ms = excluded.last_used_at_epoch_ms"#,
			params![thread_id, name, description, now],
		)?;
		debug!(target: "sqlite", "add_thread id={} name={}", thread_id, name);
		Ok(())
	}

	/// 登録済みスレッドを最終利用の新しい順に列挙
	pub fn list_threads(&self) -> Result<Vec<ThreadRecord>> {
		let mut stmt = self.conn.prepare(
			"SELECT thread_id, name, description, last_used_at_epoch_ms FROM threads
			 ORDER BY last_used_at_epoch_ms DESC, thread_id ASC",
		)?;
		let iter = stmt.query_map([], ThreadRecord::from_row)?;
		let mut out = Vec::new();
		for r in iter { out.push(r?); }
		Ok(out)
	}

	/// 1件取得 (無ければ None)
	pub fn get_thread(&self, thread_id: &str) -> Result<Option<ThreadRecord>> {
		let mut stmt = self.conn.prepare(
			"SELECT thread_id, name, description, last_used_at_epoch_ms FROM threads WHERE thread_id = ?1",
		)?;
		Ok(stmt.query_row(params![thread_id], ThreadRecord::from_row).optional()?)
	}

	/// 最終利用時刻を現在に更新。戻り値: 該当行があったか
	pub fn touch_thread(&self, thread_id: &str) -> Result<bool> {
		let now = Self::now_ms()?;
		let affected = self.conn.execute(
			"UPDATE threads SET last_used_at_epoch_ms = ?2 WHERE thread_id = ?1",
			params![thread_id, now],
		)?;
		debug!(target: "sqlite", "touch_thread id={} affected={}", thread_id, affected);
		Ok(affected > 0)
	}

	/// 削除 (存在しなくても OK) 戻り値: 削除したか
	pub fn delete_thread(&self, thread_id: &str) -> Result<bool> {
		let affected = self.conn.execute("DELETE FROM threads WHERE thread_id = ?1", params![thread_id])?;
		Ok(affected > 0)
	}

	/// 存在確認
	pub fn exists(&self, thread_id: &str) -> Result<bool> {
		let mut stmt = self.conn.prepare("SELECT 1 FROM threads WHERE thread_id=?1 LIMIT 1")?;
		let val: Option<i64> = stmt.query_row(params![thread_id], |row| row.get(0)).optional()?;
		Ok(val.is_some())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn add_get_delete_cycle() -> Result<()> {
		let db = Db::in_memory()?;
		db.add_thread("thread_1", "first", None)?;
		let rec = db.get_thread("thread_1")?.expect("registered");
		assert_eq!(rec.name, "first");
		assert_eq!(rec.description, None);
		assert!(db.delete_thread("thread_1")?);
		assert!(db.get_thread("thread_1")?.is_none());
		Ok(())
	}

	#[test]
	fn touch_unknown_thread_is_noop() -> Result<()> {
		let db = Db::in_memory()?;
		assert!(!db.touch_thread("missing")?);
		Ok(())
	}
}
