use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// 默认跟踪的8个指数
pub const DEFAULT_INDEX_NAMES: [&str; 8] = [
    "上证指数", "深证成指", "创业板指", "科创50", "北证50", "沪深300", "中证1000", "中证2000",
];

/// 每日情绪记录（持久化单位，按日期唯一）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub date: String,
    #[serde(default = "default_indices")]
    pub indices: Vec<IndexEntry>,
    /// 两市成交额（亿）
    #[serde(default)]
    pub total_volume: f64,
    /// 较昨日增减（亿）
    #[serde(default)]
    pub volume_delta: f64,
    #[serde(default)]
    pub limit_up_count: u32,
    #[serde(default)]
    pub limit_down_count: u32,
    /// 炸板率（%）
    #[serde(default)]
    pub broken_rate: f64,
    #[serde(default)]
    pub top_sectors: [TopSector; 3],
    #[serde(default)]
    pub ladder: Ladder,
    #[serde(default)]
    pub dragon: String,
    #[serde(default)]
    pub dragon_status: DragonStatus,
    #[serde(default)]
    pub mid_army: String,
    #[serde(default)]
    pub watchlist: Vec<WatchItem>,
    #[serde(default)]
    pub trend: Option<Trend>,
    /// 昨日涨停今日表现（%）
    #[serde(default)]
    pub yesterday_gain: f64,
    /// 核按钮（跌停/大面）家数
    #[serde(default)]
    pub nuclear_count: u32,
    /// 整体晋级率（%）
    #[serde(default)]
    pub promotion_rate: f64,
    #[serde(default, deserialize_with = "deserialize_score")]
    pub score: u8,
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub ai_analysis: String,
}

impl SentimentRecord {
    /// 零值记录
    pub fn new(date: &str) -> Self {
        Self {
            date: date.to_string(),
            indices: default_indices(),
            total_volume: 0.0,
            volume_delta: 0.0,
            limit_up_count: 0,
            limit_down_count: 0,
            broken_rate: 0.0,
            top_sectors: Default::default(),
            ladder: Ladder::default(),
            dragon: String::new(),
            dragon_status: DragonStatus::default(),
            mid_army: String::new(),
            watchlist: vec![],
            trend: None,
            yesterday_gain: 0.0,
            nuclear_count: 0,
            promotion_rate: 0.0,
            score: 0,
            stage: Stage::default(),
            ai_analysis: String::new(),
        }
    }

    /// 手动设定分数，超过100截断
    pub fn set_score(&mut self, score: i64) {
        self.score = score.clamp(0, 100) as u8;
    }

    /// 去空白后的非空板块名
    pub fn sector_names(&self) -> Vec<String> {
        self.top_sectors
            .iter()
            .map(|s| s.name.trim())
            .filter(|n| !n.is_empty())
            .map(|n| n.to_string())
            .collect()
    }
}

fn default_indices() -> Vec<IndexEntry> {
    DEFAULT_INDEX_NAMES
        .iter()
        .map(|name| IndexEntry {
            name: name.to_string(),
            change_pct: 0.0,
            ma5: MaPosition::Above,
        })
        .collect()
}

fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    #[serde(default)]
    pub change_pct: f64,
    #[serde(default)]
    pub ma5: MaPosition,
}

/// 相对5日均线的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MaPosition {
    #[default]
    #[serde(rename = "above")]
    Above,
    #[serde(rename = "below")]
    Below,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TopSector {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gain_pct: f64,
    #[serde(default)]
    pub limit_up_count: u32,
    /// 板块成交额（亿）
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WatchItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub concept: String,
    #[serde(default)]
    pub plan: String,
}

/// 龙头状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DragonStatus {
    #[default]
    #[serde(rename = "accelerate")]
    Accelerate,
    #[serde(rename = "divergence")]
    Divergence,
    #[serde(rename = "broken")]
    Broken,
    #[serde(rename = "revive")]
    Revive,
}

impl DragonStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DragonStatus::Accelerate => "加速",
            DragonStatus::Divergence => "分歧",
            DragonStatus::Broken => "断板",
            DragonStatus::Revive => "反包",
        }
    }
}

/// 大盘走势形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    #[serde(rename = "v_reversal")]
    VReversal,
    #[serde(rename = "rising")]
    Rising,
    #[serde(rename = "sideways")]
    Sideways,
    #[serde(rename = "falling")]
    Falling,
    #[serde(rename = "cliff_drop")]
    CliffDrop,
}

impl Trend {
    pub fn label(&self) -> &'static str {
        match self {
            Trend::VReversal => "V型反转",
            Trend::Rising => "震荡上行",
            Trend::Sideways => "横盘震荡",
            Trend::Falling => "震荡下行",
            Trend::CliffDrop => "断崖下跌",
        }
    }
}

/// 情绪周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Stage {
    #[serde(rename = "climax")]
    Climax,
    #[serde(rename = "main_rise")]
    MainRise,
    #[serde(rename = "divergence")]
    Divergence,
    #[serde(rename = "repair")]
    Repair,
    #[serde(rename = "ebb")]
    Ebb,
    #[default]
    #[serde(rename = "ice_point")]
    IcePoint,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Climax,
        Stage::MainRise,
        Stage::Divergence,
        Stage::Repair,
        Stage::Ebb,
        Stage::IcePoint,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Climax => "高潮",
            Stage::MainRise => "主升",
            Stage::Divergence => "分歧",
            Stage::Repair => "修复",
            Stage::Ebb => "退潮",
            Stage::IcePoint => "冰点",
        }
    }

    /// 中文标签或英文标识都可识别（AI 输出的 [STAGE:xxx] 标签用）
    pub fn parse_label(text: &str) -> Option<Stage> {
        let text = text.trim();
        Stage::ALL.into_iter().find(|s| {
            s.label() == text
                || serde_json::to_value(s)
                    .ok()
                    .and_then(|v| v.as_str().map(|k| k.eq_ignore_ascii_case(text)))
                    .unwrap_or(false)
        })
    }
}

/// 连板高度，Five 表示5板及以上
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LadderLevel {
    One,
    Two,
    Three,
    Four,
    FivePlus,
}

impl LadderLevel {
    pub const ALL: [LadderLevel; 5] = [
        LadderLevel::One,
        LadderLevel::Two,
        LadderLevel::Three,
        LadderLevel::Four,
        LadderLevel::FivePlus,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            LadderLevel::One => "1",
            LadderLevel::Two => "2",
            LadderLevel::Three => "3",
            LadderLevel::Four => "4",
            LadderLevel::FivePlus => "5",
        }
    }

    pub fn from_key(key: &str) -> Option<LadderLevel> {
        LadderLevel::ALL.into_iter().find(|l| l.key() == key.trim())
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LadderEntry {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub stock: String,
    #[serde(default)]
    pub concept: String,
    /// 晋级率（%）
    #[serde(default)]
    pub promotion_rate: f64,
}

/// 连板梯队，五个档位恒定存在
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, LadderEntry>", into = "BTreeMap<String, LadderEntry>")]
pub struct Ladder {
    levels: [LadderEntry; 5],
}

impl Ladder {
    pub fn get(&self, level: LadderLevel) -> &LadderEntry {
        &self.levels[level.index()]
    }

    pub fn get_mut(&mut self, level: LadderLevel) -> &mut LadderEntry {
        &mut self.levels[level.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (LadderLevel, &LadderEntry)> {
        LadderLevel::ALL.into_iter().zip(self.levels.iter())
    }
}

impl From<BTreeMap<String, LadderEntry>> for Ladder {
    fn from(map: BTreeMap<String, LadderEntry>) -> Self {
        let mut ladder = Ladder::default();
        for (key, entry) in map {
            match LadderLevel::from_key(&key) {
                Some(level) => *ladder.get_mut(level) = entry,
                None => log::warn!("忽略未知连板档位: {}", key),
            }
        }
        ladder
    }
}

impl From<Ladder> for BTreeMap<String, LadderEntry> {
    fn from(ladder: Ladder) -> Self {
        LadderLevel::ALL
            .into_iter()
            .zip(ladder.levels)
            .map(|(level, entry)| (level.key().to_string(), entry))
            .collect()
    }
}
