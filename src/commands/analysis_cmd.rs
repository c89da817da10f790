use serde::Serialize;

use crate::models::record::Stage;
use crate::services::classifier::{ClassifierInput, SentimentClassifier};
use crate::services::persistence::SectorPersistence;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct RuleHit {
    pub label: String,
    pub delta: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub score: u8,
    pub stage: Stage,
    pub stage_label: String,
    pub rules: Vec<RuleHit>,
}

/// 工作记录 + 最近已存记录中的持续性板块
pub async fn get_persistent_sectors(
    state: &AppState,
) -> Result<Vec<SectorPersistence>, String> {
    let settings = state.settings().map_err(|e| e.to_string())?;
    let store = state.records().map_err(|e| e.to_string())?;
    let session = state.session().map_err(|e| e.to_string())?;
    session
        .persistent_sectors(&store, settings.persistence_window)
        .map_err(|e| e.to_string())
}

/// 试算工作记录的分数和阶段（不写回）
pub async fn classify_working_record(
    state: &AppState,
) -> Result<ClassificationReport, String> {
    let session = state.session().map_err(|e| e.to_string())?;
    let input = ClassifierInput::from(&session.working);
    let result = SentimentClassifier::classify(&input);
    let rules = SentimentClassifier::matched_rules(&input)
        .into_iter()
        .map(|r| RuleHit {
            label: r.label.to_string(),
            delta: r.delta,
        })
        .collect();
    Ok(ClassificationReport {
        score: result.score,
        stage: result.stage,
        stage_label: result.stage.label().to_string(),
        rules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::{SentimentRecord, TopSector};

    fn with_sectors(date: &str, names: &[&str]) -> SentimentRecord {
        let mut r = SentimentRecord::new(date);
        for (slot, name) in r.top_sectors.iter_mut().zip(names) {
            *slot = TopSector {
                name: name.to_string(),
                ..Default::default()
            };
        }
        r
    }

    #[tokio::test]
    async fn test_persistent_sectors_from_store() {
        let state = AppState::in_memory().unwrap();
        let store = state.records().unwrap();
        store.upsert(with_sectors("2024-03-06", &["AI", "机器人"])).unwrap();
        store.upsert(with_sectors("2024-03-07", &["AI", "低空经济"])).unwrap();

        state
            .session()
            .unwrap()
            .replace_working(with_sectors("2024-03-08", &["AI", "低空经济", "算力"]));

        let result = get_persistent_sectors(&state).await.unwrap();
        assert_eq!(
            result,
            vec![
                SectorPersistence { name: "AI".to_string(), count: 3 },
                SectorPersistence { name: "低空经济".to_string(), count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_classification_report_lists_rules() {
        let state = AppState::in_memory().unwrap();
        {
            let mut session = state.session().unwrap();
            session.working.limit_up_count = 10;
            session.working.limit_down_count = 20;
        }
        let report = classify_working_record(&state).await.unwrap();
        assert_eq!(report.score, 20);
        assert_eq!(report.stage, Stage::IcePoint);
        assert_eq!(report.stage_label, "冰点");
        assert_eq!(report.rules.len(), 2);
        // 记录本身不变
        assert_eq!(state.session().unwrap().working.score, 0);
    }
}
