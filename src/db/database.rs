use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use super::blob_store::BlobStore;
use crate::models::ai::AIAnalysisResult;
use crate::models::settings::AppSettings;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join("dragon_faith.db");
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database lock poisoned"))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS settings (
                id TEXT PRIMARY KEY DEFAULT 'default',
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS ai_analysis (
                id TEXT PRIMARY KEY,
                record_date TEXT NOT NULL,
                model_name TEXT NOT NULL,
                question TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_ai_analysis_date ON ai_analysis(record_date);

            CREATE TABLE IF NOT EXISTS token_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                model_name TEXT NOT NULL,
                prompt_tokens INTEGER NOT NULL,
                completion_tokens INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_token_date ON token_usage(date);
            ",
        )?;
        Ok(())
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        let conn = self.conn()?;
        let data = serde_json::to_string(settings)?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (id, data, updated_at) VALUES ('default', ?1, datetime('now'))",
            rusqlite::params![data],
        )?;
        Ok(())
    }

    pub fn load_settings(&self) -> Result<AppSettings> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT data FROM settings WHERE id = 'default'",
            [],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let default = AppSettings::default();
                drop(conn);
                self.save_settings(&default)?;
                Ok(default)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_ai_analysis(&self, result: &AIAnalysisResult) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO ai_analysis (id, record_date, model_name, question, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![result.id, result.record_date, result.model_name, result.question, result.content, result.created_at],
        )?;
        Ok(())
    }

    pub fn get_ai_analysis_history(&self, record_date: &str, limit: usize) -> Result<Vec<AIAnalysisResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, record_date, model_name, question, content, created_at FROM ai_analysis WHERE record_date = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![record_date, limit], |row| {
            Ok(AIAnalysisResult {
                id: row.get(0)?,
                record_date: row.get(1)?,
                model_name: row.get(2)?,
                question: row.get(3)?,
                content: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn record_token_usage(&self, model_name: &str, prompt_tokens: u32, completion_tokens: u32) -> Result<()> {
        let conn = self.conn()?;
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        conn.execute(
            "INSERT INTO token_usage (date, model_name, prompt_tokens, completion_tokens, total_tokens, created_at) VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
            rusqlite::params![today, model_name, prompt_tokens, completion_tokens, prompt_tokens + completion_tokens],
        )?;
        Ok(())
    }

    pub fn get_today_token_usage(&self) -> Result<u32> {
        let conn = self.conn()?;
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let result = conn.query_row(
            "SELECT COALESCE(SUM(total_tokens), 0) FROM token_usage WHERE date = ?1",
            rusqlite::params![today],
            |row| row.get::<_, u32>(0),
        );
        match result {
            Ok(total) => Ok(total),
            Err(_) => Ok(0),
        }
    }
}

impl BlobStore for Database {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT data FROM kv_store WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(data) => Ok(Some(data)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, blob: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, data, updated_at) VALUES (?1, ?2, datetime('now'))",
            rusqlite::params![key, blob],
        )?;
        Ok(())
    }
}
