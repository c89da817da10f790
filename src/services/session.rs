use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::db::blob_store::BlobStore;
use crate::models::ai::Attachment;
use crate::models::extraction::MarketExtraction;
use crate::models::record::SentimentRecord;
use crate::models::settings::ScoreMode;
use crate::services::attachments::AttachmentQueue;
use crate::services::classifier::{Classification, SentimentClassifier};
use crate::services::persistence::{PersistenceAnalyzer, SectorPersistence};
use crate::services::record_store::RecordStore;
use crate::services::response_parser::ParsedAnalysis;
use crate::services::trading_day::TradingCalendar;

/// 跨进程保存的工作副本（不属于记录库）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDraft {
    pub record: SentimentRecord,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// 当前会话：工作记录 + 附件队列。修改工作记录不会影响已存副本，只有 `save` 才落库。
#[derive(Debug, Clone)]
pub struct Session {
    pub working: SentimentRecord,
    pub attachments: AttachmentQueue,
}

impl Session {
    pub fn new(max_attachments: usize) -> Self {
        Self {
            working: SentimentRecord::new(&TradingCalendar::default_record_date()),
            attachments: AttachmentQueue::new(max_attachments),
        }
    }

    pub fn with_record(record: SentimentRecord, max_attachments: usize) -> Self {
        Self {
            working: record,
            attachments: AttachmentQueue::new(max_attachments),
        }
    }

    /// 新建零值记录，日期缺省为当前交易日
    pub fn new_record(&mut self, date: Option<&str>) -> &SentimentRecord {
        let date = date
            .map(str::to_string)
            .unwrap_or_else(TradingCalendar::default_record_date);
        self.working = SentimentRecord::new(&date);
        &self.working
    }

    /// 从历史档案载入工作副本
    pub fn load_archived(&mut self, store: &RecordStore, date: &str) -> Result<&SentimentRecord> {
        self.working = store.require(date)?;
        Ok(&self.working)
    }

    pub fn replace_working(&mut self, record: SentimentRecord) {
        self.working = record;
    }

    /// 按当前记录重新打分
    pub fn classify(&self) -> Classification {
        SentimentClassifier::classify_record(&self.working)
    }

    /// 推导模式写回分数和阶段；手动模式只按已填分数刷新阶段
    pub fn apply_classification(&mut self, mode: ScoreMode) -> Classification {
        let classification = match mode {
            ScoreMode::Derived => self.classify(),
            ScoreMode::Manual => Classification {
                score: self.working.score,
                stage: SentimentClassifier::stage_for(self.working.score, self.working.yesterday_gain),
            },
        };
        self.working.score = classification.score;
        self.working.stage = classification.stage;
        classification
    }

    pub fn persistent_sectors(&self, store: &RecordStore, window: usize) -> Result<Vec<SectorPersistence>> {
        let history = store.load_all()?;
        Ok(PersistenceAnalyzer::analyze_with_window(&self.working, &history, window))
    }

    /// 合并 AI 提取的部分记录，返回变更字段数
    pub fn merge_extraction(&mut self, extraction: &MarketExtraction) -> usize {
        extraction.merge_into(&mut self.working)
    }

    /// 写入复盘正文；带 [DATA] 时合并数据，带 [STAGE] 时更新阶段
    pub fn apply_parsed_analysis(&mut self, parsed: &ParsedAnalysis) -> usize {
        let changed = parsed
            .data
            .as_ref()
            .map(|d| d.merge_into(&mut self.working))
            .unwrap_or(0);
        if let Some(stage) = parsed.stage {
            self.working.stage = stage;
        }
        self.working.ai_analysis = parsed.text.clone();
        changed
    }

    pub fn to_draft(&self) -> SessionDraft {
        SessionDraft {
            record: self.working.clone(),
            attachments: self.attachments.items(),
        }
    }

    pub fn from_draft(draft: SessionDraft, max_attachments: usize) -> Self {
        let mut session = Self::with_record(draft.record, max_attachments);
        for a in draft.attachments {
            session.attachments.push(a);
        }
        session
    }

    /// 读取草稿；没有或无法解析时返回 None
    pub fn load_draft(blobs: &dyn BlobStore, key: &str, max_attachments: usize) -> Result<Option<Self>> {
        let Some(blob) = blobs.load(key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<SessionDraft>(&blob) {
            Ok(draft) => Ok(Some(Self::from_draft(draft, max_attachments))),
            Err(e) => {
                log::warn!("草稿 {} 无法解析，已丢弃: {}", key, e);
                Ok(None)
            }
        }
    }

    pub fn save_draft(&self, blobs: &dyn BlobStore, key: &str) -> Result<()> {
        blobs.save(key, &serde_json::to_string(&self.to_draft())?)
    }

    /// 落库；返回保存后的记录总数
    pub fn save(&mut self, store: &RecordStore, mode: ScoreMode) -> Result<usize> {
        self.apply_classification(mode);
        let total = store.upsert(self.working.clone())?;
        log::info!(
            "已保存 {} 的记录（{}分 {}），共 {} 条",
            self.working.date,
            self.working.score,
            self.working.stage.label(),
            total
        );
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::blob_store::MemoryBlobStore;
    use crate::models::record::{Stage, Trend};
    use std::sync::Arc;

    fn store() -> RecordStore {
        RecordStore::new(Arc::new(MemoryBlobStore::new()), "records")
    }

    #[test]
    fn test_working_copy_isolated_until_save() {
        let store = store();
        let mut session = Session::new(10);
        session.new_record(Some("2024-03-08"));
        session.working.limit_up_count = 30;
        session.save(&store, ScoreMode::Derived).unwrap();

        session.load_archived(&store, "2024-03-08").unwrap();
        session.working.limit_up_count = 99;
        assert_eq!(store.require("2024-03-08").unwrap().limit_up_count, 30);

        session.save(&store, ScoreMode::Derived).unwrap();
        assert_eq!(store.require("2024-03-08").unwrap().limit_up_count, 99);
        assert_eq!(store.dates().unwrap().len(), 1);
    }

    #[test]
    fn test_derived_mode_overwrites_score() {
        let store = store();
        let mut session = Session::with_record(SentimentRecord::new("2024-03-08"), 10);
        session.working.trend = Some(Trend::CliffDrop);
        session.working.set_score(90);
        session.save(&store, ScoreMode::Derived).unwrap();

        let saved = store.require("2024-03-08").unwrap();
        assert_eq!(saved.score, 15);
        assert_eq!(saved.stage, Stage::IcePoint);
    }

    #[test]
    fn test_manual_mode_keeps_score() {
        let store = store();
        let mut session = Session::with_record(SentimentRecord::new("2024-03-08"), 10);
        session.working.set_score(72);
        session.save(&store, ScoreMode::Manual).unwrap();

        let saved = store.require("2024-03-08").unwrap();
        assert_eq!(saved.score, 72);
        assert_eq!(saved.stage, Stage::MainRise);
    }

    #[test]
    fn test_parsed_analysis_applied() {
        let mut session = Session::with_record(SentimentRecord::new("2024-03-08"), 10);
        let parsed = crate::services::response_parser::parse_analysis(
            "分歧加大 [DATA]{\"dragon\": \"中马传动\"}[/DATA] [STAGE:分歧]",
        );
        let changed = session.apply_parsed_analysis(&parsed);
        assert_eq!(changed, 1);
        assert_eq!(session.working.dragon, "中马传动");
        assert_eq!(session.working.stage, Stage::Divergence);
        assert_eq!(session.working.ai_analysis, "分歧加大");
    }

    #[test]
    fn test_draft_keeps_record_and_attachments() {
        let blobs = MemoryBlobStore::new();
        let mut session = Session::with_record(SentimentRecord::new("2024-03-08"), 2);
        session.working.dragon = "中马传动".to_string();
        for n in 0..3 {
            session.attachments.push(Attachment {
                file_name: format!("{}.png", n),
                mime_type: "image/png".to_string(),
                base64_data: String::new(),
            });
        }
        session.save_draft(&blobs, "records:draft").unwrap();

        let restored = Session::load_draft(&blobs, "records:draft", 2).unwrap().unwrap();
        assert_eq!(restored.working.dragon, "中马传动");
        assert_eq!(restored.attachments.names(), vec!["1.png", "2.png"]);
        assert!(Session::load_draft(&blobs, "missing", 2).unwrap().is_none());

        blobs.save("broken", "{").unwrap();
        assert!(Session::load_draft(&blobs, "broken", 2).unwrap().is_none());
    }

    #[test]
    fn test_load_missing_date_fails() {
        let store = store();
        let mut session = Session::new(10);
        assert!(session.load_archived(&store, "2024-01-01").is_err());
    }
}
