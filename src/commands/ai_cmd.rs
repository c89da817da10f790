use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc::Sender;

use crate::models::ai::{AIAnalysisResult, AIConfig, AIStreamEvent, TokenUsage};
use crate::models::record::Stage;
use crate::services::ai_service::AIService;
use crate::services::ai_task::AiOutcome;
use crate::services::attachments::read_attachment;
use crate::services::prompts;
use crate::services::response_parser;
use crate::services::trading_day::TradingCalendar;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub record_date: String,
    pub changed_fields: usize,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub record_date: String,
    pub stage: Option<Stage>,
    pub changed_fields: usize,
    pub content: String,
    pub total_tokens: u32,
}

fn active_config(state: &AppState) -> Result<AIConfig, String> {
    let settings = state.settings().map_err(|e| e.to_string())?;
    settings
        .active_ai_config()
        .cloned()
        .ok_or("未配置AI模型".to_string())
}

fn record_usage(state: &AppState, config: &AIConfig, usage: &Option<TokenUsage>) -> u32 {
    match usage {
        Some(u) => {
            if let Err(e) = state
                .db
                .record_token_usage(&config.model_name, u.prompt_tokens, u.completion_tokens)
            {
                log::warn!("记录 token 用量失败: {}", e);
            }
            u.total_tokens
        }
        None => 0,
    }
}

/// 请求期间工作记录被切换到别的日期时，结果不能写进去
fn switched_away(record_date: &str, working_date: &str) -> Option<String> {
    (record_date != working_date).then(|| {
        log::warn!(
            "AI 返回时工作记录已从 {} 切换到 {}，结果未合并",
            record_date,
            working_date
        );
        format!("工作记录已切换到 {}，{} 的 AI 结果未合并", working_date, record_date)
    })
}

/// 添加附件；返回当前队列中的文件名
pub async fn attach_file(
    state: &AppState,
    path: PathBuf,
) -> Result<Vec<String>, String> {
    let attachment = read_attachment(&path).await.map_err(|e| e.to_string())?;
    let mut session = state.session().map_err(|e| e.to_string())?;
    if let Some(evicted) = session.attachments.push(attachment) {
        log::info!("附件已满，移除最早的 {}", evicted.file_name);
    }
    Ok(session.attachments.names())
}

pub async fn list_attachments(
    state: &AppState,
) -> Result<Vec<String>, String> {
    let session = state.session().map_err(|e| e.to_string())?;
    Ok(session.attachments.names())
}

pub async fn clear_attachments(
    state: &AppState,
) -> Result<(), String> {
    let mut session = state.session().map_err(|e| e.to_string())?;
    session.attachments.clear();
    Ok(())
}

/// 识图提取盘面数据并合并进工作记录
pub async fn ai_extract_market_data(
    state: &AppState,
) -> Result<AiOutcome<ExtractSummary>, String> {
    let ai_config = active_config(state)?;
    let (date, attachments) = {
        let session = state.session().map_err(|e| e.to_string())?;
        (session.working.date.clone(), session.attachments.items())
    };

    let outcome = state
        .ai_slot
        .run(AIService::extract_market_data(&ai_config, &date, &attachments))
        .await
        .map_err(|e| e.to_string())?;

    let (extraction, usage) = match outcome {
        AiOutcome::Succeeded(v) => v,
        AiOutcome::Failed(reason) => return Ok(AiOutcome::Failed(reason)),
    };

    let total_tokens = record_usage(state, &ai_config, &usage);
    let mut session = state.session().map_err(|e| e.to_string())?;
    if let Some(reason) = switched_away(&date, &session.working.date) {
        return Ok(AiOutcome::Failed(reason));
    }
    let changed_fields = session.merge_extraction(&extraction);
    log::info!("AI 提取完成，更新 {} 个字段", changed_fields);

    Ok(AiOutcome::Succeeded(ExtractSummary {
        record_date: date,
        changed_fields,
        total_tokens,
    }))
}

/// 流式复盘点评；正文写回工作记录并存入历史
pub async fn ai_analyze_working_record(
    state: &AppState,
    sender: Sender<AIStreamEvent>,
) -> Result<AiOutcome<AnalysisSummary>, String> {
    let ai_config = active_config(state)?;
    let settings = state.settings().map_err(|e| e.to_string())?;
    let store = state.records().map_err(|e| e.to_string())?;

    let (record, attachments, persistent) = {
        let session = state.session().map_err(|e| e.to_string())?;
        let persistent = session
            .persistent_sectors(&store, settings.persistence_window)
            .map_err(|e| e.to_string())?;
        (session.working.clone(), session.attachments.items(), persistent)
    };

    let history: Vec<_> = store
        .load_all()
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|r| r.date != record.date)
        .take(settings.history_context_days)
        .collect();

    let prompt = prompts::analysis_prompt(
        &record,
        &history,
        &persistent,
        &TradingCalendar::market_status(),
    );

    let outcome = state
        .ai_slot
        .run(AIService::analyze_stream(&ai_config, &prompt, &attachments, sender))
        .await
        .map_err(|e| e.to_string())?;

    let (content, usage) = match outcome {
        AiOutcome::Succeeded(v) => v,
        AiOutcome::Failed(reason) => return Ok(AiOutcome::Failed(reason)),
    };

    let parsed = response_parser::parse_analysis(&content);
    let total_tokens = record_usage(state, &ai_config, &usage);
    let changed_fields = {
        let mut session = state.session().map_err(|e| e.to_string())?;
        if let Some(reason) = switched_away(&record.date, &session.working.date) {
            return Ok(AiOutcome::Failed(reason));
        }
        session.apply_parsed_analysis(&parsed)
    };

    let analysis = AIAnalysisResult {
        id: uuid::Uuid::new_v4().to_string(),
        record_date: record.date.clone(),
        model_name: ai_config.model_name.clone(),
        question: "情绪复盘".to_string(),
        content: parsed.text.clone(),
        created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    if let Err(e) = state.db.save_ai_analysis(&analysis) {
        log::warn!("保存复盘历史失败: {}", e);
    }

    Ok(AiOutcome::Succeeded(AnalysisSummary {
        record_date: record.date,
        stage: parsed.stage,
        changed_fields,
        content: parsed.text,
        total_tokens,
    }))
}

pub async fn get_analysis_history(
    state: &AppState,
    record_date: String,
    limit: usize,
) -> Result<Vec<AIAnalysisResult>, String> {
    state.db.get_ai_analysis_history(&record_date, limit).map_err(|e| e.to_string())
}

pub async fn get_today_token_usage(
    state: &AppState,
) -> Result<u32, String> {
    state.db.get_today_token_usage().map_err(|e| e.to_string())
}
