use std::path::PathBuf;

use serde::Serialize;

use crate::models::extraction::MarketExtraction;
use crate::models::record::{SentimentRecord, Stage};
use crate::services::classifier::SentimentClassifier;
use crate::services::record_store::validate_date;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct SaveSummary {
    pub date: String,
    pub score: u8,
    pub stage: Stage,
    pub total: usize,
}

pub async fn new_record(
    state: &AppState,
    date: Option<String>,
) -> Result<SentimentRecord, String> {
    if let Some(d) = &date {
        validate_date(d).map_err(|e| e.to_string())?;
    }
    let mut session = state.session().map_err(|e| e.to_string())?;
    Ok(session.new_record(date.as_deref()).clone())
}

pub async fn load_record(
    state: &AppState,
    date: String,
) -> Result<SentimentRecord, String> {
    let store = state.records().map_err(|e| e.to_string())?;
    let mut session = state.session().map_err(|e| e.to_string())?;
    let record = session
        .load_archived(&store, &date)
        .map_err(|e| e.to_string())?
        .clone();
    Ok(record)
}

pub async fn get_working_record(
    state: &AppState,
) -> Result<SentimentRecord, String> {
    let session = state.session().map_err(|e| e.to_string())?;
    Ok(session.working.clone())
}

pub async fn replace_working_record(
    state: &AppState,
    record: SentimentRecord,
) -> Result<SentimentRecord, String> {
    validate_date(&record.date).map_err(|e| e.to_string())?;
    let mut session = state.session().map_err(|e| e.to_string())?;
    session.replace_working(record);
    Ok(session.working.clone())
}

/// 按部分记录修改工作副本（字段格式同 AI 提取结果），返回变更字段数
pub async fn patch_working_record(
    state: &AppState,
    patch: serde_json::Value,
) -> Result<usize, String> {
    if !patch.is_object() {
        return Err("修改内容必须是 JSON 对象".to_string());
    }
    let extraction = MarketExtraction::from_value(&patch);
    let mut session = state.session().map_err(|e| e.to_string())?;
    Ok(session.merge_extraction(&extraction))
}

pub async fn save_record(
    state: &AppState,
) -> Result<SaveSummary, String> {
    let settings = state.settings().map_err(|e| e.to_string())?;
    let store = state.records().map_err(|e| e.to_string())?;
    let mut session = state.session().map_err(|e| e.to_string())?;
    let total = session
        .save(&store, settings.score_mode)
        .map_err(|e| e.to_string())?;
    Ok(SaveSummary {
        date: session.working.date.clone(),
        score: session.working.score,
        stage: session.working.stage,
        total,
    })
}

pub async fn list_records(
    state: &AppState,
    limit: Option<usize>,
) -> Result<Vec<SentimentRecord>, String> {
    let store = state.records().map_err(|e| e.to_string())?;
    match limit {
        Some(n) => store.recent(n),
        None => store.load_all(),
    }
    .map_err(|e| e.to_string())
}

pub async fn get_record(
    state: &AppState,
    date: String,
) -> Result<Option<SentimentRecord>, String> {
    let store = state.records().map_err(|e| e.to_string())?;
    store.get(&date).map_err(|e| e.to_string())
}

pub async fn export_records(
    state: &AppState,
    path: PathBuf,
) -> Result<usize, String> {
    let store = state.records().map_err(|e| e.to_string())?;
    store.export_to(&path).map_err(|e| e.to_string())
}

pub async fn import_records(
    state: &AppState,
    path: PathBuf,
) -> Result<usize, String> {
    let store = state.records().map_err(|e| e.to_string())?;
    store.import_from(&path).map_err(|e| e.to_string())
}

/// 手动打分：分数截到 0~100，阶段按分数段刷新
pub async fn set_manual_score(
    state: &AppState,
    score: i64,
) -> Result<SentimentRecord, String> {
    let mut session = state.session().map_err(|e| e.to_string())?;
    session.working.set_score(score);
    session.working.stage =
        SentimentClassifier::stage_for(session.working.score, session.working.yesterday_gain);
    Ok(session.working.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::ScoreMode;

    #[tokio::test]
    async fn test_new_edit_save_roundtrip() {
        let state = AppState::in_memory().unwrap();
        new_record(&state, Some("2024-03-08".to_string())).await.unwrap();
        let changed = patch_working_record(
            &state,
            serde_json::json!({"sentiment": {"limit_up_count": 95, "promotion_rate": "60%"}}),
        )
        .await
        .unwrap();
        assert_eq!(changed, 2);

        let summary = save_record(&state).await.unwrap();
        assert_eq!(summary.date, "2024-03-08");
        // 50 + 10(涨停>80) + 10(晋级率>50%)
        assert_eq!(summary.score, 70);
        assert_eq!(summary.stage, Stage::MainRise);
        assert_eq!(summary.total, 1);

        let stored = get_record(&state, "2024-03-08".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.limit_up_count, 95);
    }

    #[tokio::test]
    async fn test_invalid_date_rejected() {
        let state = AppState::in_memory().unwrap();
        assert!(new_record(&state, Some("2024/03/08".to_string())).await.is_err());
        let mut record = SentimentRecord::new("yesterday");
        record.limit_up_count = 1;
        assert!(replace_working_record(&state, record).await.is_err());
    }

    #[tokio::test]
    async fn test_manual_score_survives_save() {
        let state = AppState::in_memory().unwrap();
        let mut settings = state.settings().unwrap();
        settings.score_mode = ScoreMode::Manual;
        state.db.save_settings(&settings).unwrap();

        new_record(&state, Some("2024-03-08".to_string())).await.unwrap();
        let r = set_manual_score(&state, 130).await.unwrap();
        assert_eq!(r.score, 100);
        assert_eq!(r.stage, Stage::Climax);

        let summary = save_record(&state).await.unwrap();
        assert_eq!(summary.score, 100);
    }

    #[tokio::test]
    async fn test_load_missing_record() {
        let state = AppState::in_memory().unwrap();
        let err = load_record(&state, "2024-01-01".to_string()).await.unwrap_err();
        assert!(err.contains("2024-01-01"));
    }
}
