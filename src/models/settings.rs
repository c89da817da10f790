use serde::{Deserialize, Serialize};
use super::ai::AIConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub ai_configs: Vec<AIConfig>,
    #[serde(default)]
    pub active_ai_config_id: Option<String>,
    /// 记录库在 kv 存储中的键，不同版本各用各的命名空间
    #[serde(default = "default_store_key")]
    pub store_key: String,
    #[serde(default)]
    pub score_mode: ScoreMode,
    /// 持续性板块统计回看的已存记录数
    #[serde(default = "default_persistence_window")]
    pub persistence_window: usize,
    /// 附件队列上限，超出淘汰最早的
    #[serde(default = "default_max_attachments")]
    pub max_attachments: usize,
    /// AI 复盘时附带的历史记录条数
    #[serde(default = "default_history_context_days")]
    pub history_context_days: usize,
}

pub const DEFAULT_STORE_KEY: &str = "dragon_faith_records_v3";

fn default_store_key() -> String { DEFAULT_STORE_KEY.to_string() }
fn default_persistence_window() -> usize { 5 }
fn default_max_attachments() -> usize { 10 }
fn default_history_context_days() -> usize { 3 }

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            ai_configs: vec![],
            active_ai_config_id: None,
            store_key: default_store_key(),
            score_mode: ScoreMode::Derived,
            persistence_window: default_persistence_window(),
            max_attachments: default_max_attachments(),
            history_context_days: default_history_context_days(),
        }
    }
}

impl AppSettings {
    /// 当前启用的模型配置
    pub fn active_ai_config(&self) -> Option<&AIConfig> {
        self.ai_configs
            .iter()
            .find(|c| Some(&c.id) == self.active_ai_config_id.as_ref() && c.enabled)
    }

    pub fn draft_key(&self) -> String {
        format!("{}:draft", self.store_key)
    }
}

/// 分数来源：规则推导 或 手动填写
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScoreMode {
    #[default]
    #[serde(rename = "derived")]
    Derived,
    #[serde(rename = "manual")]
    Manual,
}
