use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::record::SentimentRecord;

/// 默认回看的已存记录数
pub const DEFAULT_WINDOW: usize = 5;

/// 持续性板块：近几日反复出现在前三板块里的名字
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorPersistence {
    pub name: String,
    pub count: u32,
}

pub struct PersistenceAnalyzer;

impl PersistenceAnalyzer {
    /// 当前工作记录 + 最近 `DEFAULT_WINDOW` 条已存记录。
    /// `history` 须按日期降序（记录库的顺序）。
    pub fn analyze(current: &SentimentRecord, history: &[SentimentRecord]) -> Vec<SectorPersistence> {
        Self::analyze_with_window(current, history, DEFAULT_WINDOW)
    }

    pub fn analyze_with_window(
        current: &SentimentRecord,
        history: &[SentimentRecord],
        window: usize,
    ) -> Vec<SectorPersistence> {
        // 只看最近 window 条；其中的同日记录由工作副本代替，不往后补
        let recent: Vec<Vec<String>> = history
            .iter()
            .take(window)
            .filter(|r| r.date != current.date)
            .map(|r| r.sector_names())
            .collect();

        Self::count_names(&current.sector_names(), &recent)
    }

    /// 纯计数：每一天的名字各计一次，保留出现 ≥2 次的，按次数降序，同次数保持首次出现顺序
    pub fn count_names(current: &[String], recent_days: &[Vec<String>]) -> Vec<SectorPersistence> {
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, u32> = HashMap::new();

        let days = std::iter::once(current).chain(recent_days.iter().map(|d| d.as_slice()));
        for day in days {
            let mut seen_today: Vec<&str> = Vec::new();
            for name in day {
                let name = name.trim();
                if name.is_empty() || seen_today.contains(&name) {
                    continue;
                }
                seen_today.push(name);
                let entry = counts.entry(name.to_string()).or_insert_with(|| {
                    order.push(name.to_string());
                    0
                });
                *entry += 1;
            }
        }

        let mut result: Vec<SectorPersistence> = order
            .into_iter()
            .filter_map(|name| {
                let count = counts.get(&name).copied().unwrap_or(0);
                (count >= 2).then_some(SectorPersistence { name, count })
            })
            .collect();

        // sort_by 是稳定排序
        result.sort_by(|a, b| b.count.cmp(&a.count));
        result
    }
}
