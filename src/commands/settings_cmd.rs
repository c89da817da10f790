use crate::AppState;
use crate::models::settings::{AppSettings, ScoreMode};
use crate::models::ai::AIConfig;
use crate::services::ai_service::AIService;
use crate::services::record_store::RecordStore;

pub async fn get_settings(
    state: &AppState,
) -> Result<AppSettings, String> {
    state.db.load_settings().map_err(|e| e.to_string())
}

pub async fn save_settings(
    state: &AppState,
    settings: AppSettings,
) -> Result<(), String> {
    state.db.save_settings(&settings).map_err(|e| e.to_string())
}

pub async fn add_ai_config(
    state: &AppState,
    config: AIConfig,
) -> Result<AppSettings, String> {
    let mut settings = state.db.load_settings().map_err(|e| e.to_string())?;
    if settings.ai_configs.iter().any(|c| c.id == config.id) {
        return Err(format!("模型配置 {} 已存在", config.id));
    }
    settings.ai_configs.push(config);
    if settings.active_ai_config_id.is_none() {
        settings.active_ai_config_id = settings.ai_configs.first().map(|c| c.id.clone());
    }
    state.db.save_settings(&settings).map_err(|e| e.to_string())?;
    Ok(settings)
}

pub async fn remove_ai_config(
    state: &AppState,
    config_id: String,
) -> Result<AppSettings, String> {
    let mut settings = state.db.load_settings().map_err(|e| e.to_string())?;
    settings.ai_configs.retain(|c| c.id != config_id);
    if settings.active_ai_config_id.as_deref() == Some(&config_id) {
        settings.active_ai_config_id = settings.ai_configs.first().map(|c| c.id.clone());
    }
    state.db.save_settings(&settings).map_err(|e| e.to_string())?;
    Ok(settings)
}

pub async fn set_active_ai_config(
    state: &AppState,
    config_id: String,
) -> Result<AppSettings, String> {
    let mut settings = state.db.load_settings().map_err(|e| e.to_string())?;
    if !settings.ai_configs.iter().any(|c| c.id == config_id) {
        return Err(format!("没有模型配置 {}", config_id));
    }
    settings.active_ai_config_id = Some(config_id);
    state.db.save_settings(&settings).map_err(|e| e.to_string())?;
    Ok(settings)
}

pub async fn set_score_mode(
    state: &AppState,
    mode: ScoreMode,
) -> Result<AppSettings, String> {
    let mut settings = state.db.load_settings().map_err(|e| e.to_string())?;
    settings.score_mode = mode;
    state.db.save_settings(&settings).map_err(|e| e.to_string())?;
    Ok(settings)
}

/// 修改附件队列上限，当前队列超出的部分按最早加入的先淘汰
pub async fn set_max_attachments(
    state: &AppState,
    max_attachments: usize,
) -> Result<AppSettings, String> {
    if max_attachments == 0 {
        return Err("附件上限至少为 1".to_string());
    }
    let mut settings = state.db.load_settings().map_err(|e| e.to_string())?;
    settings.max_attachments = max_attachments;
    state.db.save_settings(&settings).map_err(|e| e.to_string())?;

    let mut session = state.session().map_err(|e| e.to_string())?;
    session.attachments.set_capacity(max_attachments);
    Ok(settings)
}

/// 切换记录库的键；返回新键下已有的记录数
pub async fn set_store_key(
    state: &AppState,
    store_key: String,
) -> Result<usize, String> {
    let key = store_key.trim();
    if key.is_empty() || key.ends_with(":draft") {
        return Err(format!("无效的存储键: {:?}", store_key));
    }
    let mut settings = state.db.load_settings().map_err(|e| e.to_string())?;
    settings.store_key = key.to_string();
    state.db.save_settings(&settings).map_err(|e| e.to_string())?;

    let store = RecordStore::new(state.db.clone(), key);
    store.load_all().map(|r| r.len()).map_err(|e| e.to_string())
}

/// 测试 AI 模型配置是否可用
pub async fn test_ai_config(
    config: AIConfig,
) -> Result<String, String> {
    AIService::test_ai_connection(&config).await.map_err(|e| e.to_string())
}
