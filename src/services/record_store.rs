use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::db::blob_store::BlobStore;
use crate::models::record::SentimentRecord;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("没有 {0} 的记录")]
    NotFound(String),
    #[error("日期格式应为 YYYY-MM-DD: {0}")]
    InvalidDate(String),
}

/// 情绪记录库：整个数组序列化后存在一个键下，按日期降序、同日唯一
pub struct RecordStore {
    blobs: Arc<dyn BlobStore>,
    key: String,
}

impl RecordStore {
    pub fn new(blobs: Arc<dyn BlobStore>, key: &str) -> Self {
        Self {
            blobs,
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 读取全部记录（日期降序）。
    /// 存储内容损坏时：原样备份到 `<key>.corrupt.<时间戳>`，记录库按空处理。
    pub fn load_all(&self) -> Result<Vec<SentimentRecord>> {
        let Some(blob) = self.blobs.load(&self.key)? else {
            return Ok(vec![]);
        };

        match serde_json::from_str::<Vec<SentimentRecord>>(&blob) {
            Ok(mut records) => {
                normalize(&mut records);
                Ok(records)
            }
            Err(e) => {
                let backup_key = format!(
                    "{}.corrupt.{}",
                    self.key,
                    chrono::Local::now().format("%Y%m%d%H%M%S")
                );
                log::warn!("记录库 {} 无法解析（{}），已备份到 {} 并重置", self.key, e, backup_key);
                self.blobs.save(&backup_key, &blob)?;
                self.blobs.save(&self.key, "[]")?;
                Ok(vec![])
            }
        }
    }

    pub fn get(&self, date: &str) -> Result<Option<SentimentRecord>> {
        Ok(self.load_all()?.into_iter().find(|r| r.date == date))
    }

    pub fn require(&self, date: &str) -> Result<SentimentRecord> {
        self.get(date)?
            .ok_or_else(|| RecordError::NotFound(date.to_string()).into())
    }

    pub fn recent(&self, n: usize) -> Result<Vec<SentimentRecord>> {
        let mut records = self.load_all()?;
        records.truncate(n);
        Ok(records)
    }

    pub fn dates(&self) -> Result<Vec<String>> {
        Ok(self.load_all()?.into_iter().map(|r| r.date).collect())
    }

    /// 同日替换，否则插入；返回保存后的记录总数
    pub fn upsert(&self, record: SentimentRecord) -> Result<usize> {
        validate_date(&record.date)?;
        let mut records = self.load_all()?;
        upsert_into(&mut records, record);
        self.persist(&records)?;
        Ok(records.len())
    }

    pub fn export_to(&self, path: &Path) -> Result<usize> {
        let records = self.load_all()?;
        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
        Ok(records.len())
    }

    /// 导入 JSON 数组文件，逐条按日期合并（文件内同日后者覆盖前者）；返回导入条数
    pub fn import_from(&self, path: &Path) -> Result<usize> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("读取 {} 失败", path.display()))?;
        let incoming: Vec<SentimentRecord> = serde_json::from_str(&data)
            .with_context(|| format!("{} 不是有效的记录数组", path.display()))?;
        for r in &incoming {
            validate_date(&r.date)?;
        }

        let mut records = self.load_all()?;
        let count = incoming.len();
        for r in incoming {
            upsert_into(&mut records, r);
        }
        self.persist(&records)?;
        log::info!("导入 {} 条记录，当前共 {} 条", count, records.len());
        Ok(count)
    }

    fn persist(&self, records: &[SentimentRecord]) -> Result<()> {
        let blob = serde_json::to_string(records)?;
        self.blobs.save(&self.key, &blob)
    }
}

fn upsert_into(records: &mut Vec<SentimentRecord>, record: SentimentRecord) {
    match records.iter_mut().find(|r| r.date == record.date) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
    sort_desc(records);
}

/// 外部写入的 blob 可能有重复日期，保留先出现的一条
fn normalize(records: &mut Vec<SentimentRecord>) {
    let mut seen = std::collections::HashSet::new();
    records.retain(|r| seen.insert(r.date.clone()));
    sort_desc(records);
}

fn sort_desc(records: &mut [SentimentRecord]) {
    records.sort_by(|a, b| b.date.cmp(&a.date));
}

pub fn validate_date(date: &str) -> Result<()> {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| RecordError::InvalidDate(date.to_string()).into())
}
