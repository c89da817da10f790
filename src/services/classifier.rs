use serde::{Deserialize, Serialize};

use crate::models::record::{SentimentRecord, Stage, Trend};

const BASELINE: i32 = 50;

/// 打分所需的全部输入。记录里没填的数值按 0、走势按无处理。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassifierInput {
    pub trend: Option<Trend>,
    pub yesterday_gain: f64,
    pub nuclear_count: u32,
    pub limit_up_count: u32,
    pub limit_down_count: u32,
    pub promotion_rate: f64,
}

impl From<&SentimentRecord> for ClassifierInput {
    fn from(r: &SentimentRecord) -> Self {
        Self {
            trend: r.trend,
            yesterday_gain: r.yesterday_gain,
            nuclear_count: r.nuclear_count,
            limit_up_count: r.limit_up_count,
            limit_down_count: r.limit_down_count,
            promotion_rate: r.promotion_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub score: u8,
    pub stage: Stage,
}

/// 单条加减分规则（仅看一个字段）
pub struct ScoreRule {
    pub label: &'static str,
    pub delta: i32,
    pub applies: fn(&ClassifierInput) -> bool,
}

/// 规则全部独立判定，命中即叠加
pub static SCORE_RULES: [ScoreRule; 9] = [
    ScoreRule { label: "V型反转", delta: 20, applies: |i| i.trend == Some(Trend::VReversal) },
    ScoreRule { label: "断崖下跌", delta: -25, applies: |i| i.trend == Some(Trend::CliffDrop) },
    ScoreRule { label: "昨日涨停溢价>5%", delta: 15, applies: |i| i.yesterday_gain > 5.0 },
    ScoreRule { label: "昨日涨停亏钱<-2%", delta: -20, applies: |i| i.yesterday_gain < -2.0 },
    ScoreRule { label: "核按钮>10", delta: -15, applies: |i| i.nuclear_count > 10 },
    ScoreRule { label: "涨停>80", delta: 10, applies: |i| i.limit_up_count > 80 },
    ScoreRule { label: "涨停<20", delta: -10, applies: |i| i.limit_up_count < 20 },
    ScoreRule { label: "跌停>15", delta: -20, applies: |i| i.limit_down_count > 15 },
    ScoreRule { label: "晋级率>50%", delta: 10, applies: |i| i.promotion_rate > 50.0 },
];

pub struct SentimentClassifier;

impl SentimentClassifier {
    pub fn classify(input: &ClassifierInput) -> Classification {
        let score = Self::score(input);
        Classification {
            score,
            stage: Self::stage_for(score, input.yesterday_gain),
        }
    }

    pub fn classify_record(record: &SentimentRecord) -> Classification {
        Self::classify(&ClassifierInput::from(record))
    }

    /// 命中的规则（用于展示打分明细）
    pub fn matched_rules(input: &ClassifierInput) -> Vec<&'static ScoreRule> {
        SCORE_RULES.iter().filter(|r| (r.applies)(input)).collect()
    }

    pub fn score(input: &ClassifierInput) -> u8 {
        let raw: i32 = BASELINE
            + SCORE_RULES
                .iter()
                .filter(|r| (r.applies)(input))
                .map(|r| r.delta)
                .sum::<i32>();
        raw.clamp(0, 100) as u8
    }

    /// 分数段 → 阶段；36~49 分且昨日涨停有溢价视为修复
    pub fn stage_for(score: u8, yesterday_gain: f64) -> Stage {
        match score {
            80..=100 => Stage::Climax,
            65..=79 => Stage::MainRise,
            50..=64 => Stage::Divergence,
            36..=49 if yesterday_gain > 0.0 => Stage::Repair,
            36..=49 => Stage::Ebb,
            _ => Stage::IcePoint,
        }
    }
}
