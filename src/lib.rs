pub mod models;
pub mod services;
pub mod commands;
pub mod db;
pub mod utils;

use anyhow::{anyhow, Result};
use db::database::Database;
use models::settings::AppSettings;
use services::ai_task::AiTaskSlot;
use services::record_store::RecordStore;
use services::session::Session;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AppState {
    pub db: Arc<Database>,
    pub session: Mutex<Session>,
    pub ai_slot: AiTaskSlot,
}

impl AppState {
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        log::debug!("数据目录: {}", data_dir.display());
        Self::with_database(Database::new(data_dir)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_database(Database::open_in_memory()?)
    }

    fn with_database(database: Database) -> Result<Self> {
        let settings = database.load_settings().unwrap_or_default();
        Ok(Self {
            db: Arc::new(database),
            session: Mutex::new(Session::new(settings.max_attachments)),
            ai_slot: AiTaskSlot::new(),
        })
    }

    pub fn settings(&self) -> Result<AppSettings> {
        self.db.load_settings()
    }

    /// 按当前设置的键打开记录库
    pub fn records(&self) -> Result<RecordStore> {
        let settings = self.settings()?;
        Ok(RecordStore::new(self.db.clone(), &settings.store_key))
    }

    pub fn session(&self) -> Result<MutexGuard<'_, Session>> {
        self.session.lock().map_err(|_| anyhow!("session lock poisoned"))
    }

    /// 恢复上次的工作副本（如有）
    pub fn restore_draft(&self) -> Result<bool> {
        let settings = self.settings()?;
        let restored = Session::load_draft(
            self.db.as_ref(),
            &settings.draft_key(),
            settings.max_attachments,
        )?;
        match restored {
            Some(session) => {
                *self.session()? = session;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn persist_draft(&self) -> Result<()> {
        let settings = self.settings()?;
        self.session()?.save_draft(self.db.as_ref(), &settings.draft_key())
    }
}
