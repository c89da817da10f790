use serde_json::Value;

use super::record::{DragonStatus, LadderLevel, MaPosition, SentimentRecord, Trend};

/// AI 返回的部分记录。字段存在且类型正确才会覆盖，缺失或非法则保留原值。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketExtraction {
    pub indices: Vec<IndexPatch>,
    pub total_volume: Option<f64>,
    pub volume_delta: Option<f64>,
    pub limit_up_count: Option<u32>,
    pub limit_down_count: Option<u32>,
    pub broken_rate: Option<f64>,
    pub trend: Option<Trend>,
    pub yesterday_gain: Option<f64>,
    pub nuclear_count: Option<u32>,
    pub promotion_rate: Option<f64>,
    pub sectors: Vec<SectorPatch>,
    pub ladder: Vec<(LadderLevel, LadderPatch)>,
    pub dragon: Option<String>,
    pub dragon_status: Option<DragonStatus>,
    pub mid_army: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPatch {
    pub name: String,
    pub change_pct: Option<f64>,
    pub ma5: Option<MaPosition>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectorPatch {
    pub name: Option<String>,
    pub gain_pct: Option<f64>,
    pub limit_up_count: Option<u32>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LadderPatch {
    pub count: Option<u32>,
    pub stock: Option<String>,
    pub concept: Option<String>,
    pub promotion_rate: Option<f64>,
}

impl MarketExtraction {
    /// 从 AI 返回的 JSON 对象逐字段校验构建
    pub fn from_value(value: &Value) -> Self {
        let mut out = MarketExtraction::default();

        if let Some(items) = value.get("indices").and_then(Value::as_array) {
            out.indices = items
                .iter()
                .filter_map(|item| {
                    let name = text(item.get("name"))?;
                    Some(IndexPatch {
                        name,
                        change_pct: number(item.get("change_pct")),
                        ma5: ma_position(item.get("ma5")),
                    })
                })
                .collect();
        }

        if let Some(s) = value.get("sentiment").filter(|v| v.is_object()) {
            out.total_volume = number(s.get("total_volume"));
            out.volume_delta = number(s.get("volume_delta"));
            out.limit_up_count = count(s.get("limit_up_count"));
            out.limit_down_count = count(s.get("limit_down_count"));
            out.broken_rate = number(s.get("broken_rate"));
            out.trend = s
                .get("trend")
                .and_then(|v| serde_json::from_value::<Trend>(v.clone()).ok());
            out.yesterday_gain = number(s.get("yesterday_gain"));
            out.nuclear_count = count(s.get("nuclear_count"));
            out.promotion_rate = number(s.get("promotion_rate"));
        }

        if let Some(items) = value.get("sectors").and_then(Value::as_array) {
            out.sectors = items
                .iter()
                .take(3)
                .map(|item| SectorPatch {
                    name: text(item.get("name")),
                    gain_pct: number(item.get("gain_pct")),
                    limit_up_count: count(item.get("limit_up_count")),
                    volume: number(item.get("volume")),
                })
                .collect();
        }

        if let Some(map) = value.get("ladder").and_then(Value::as_object) {
            for level in LadderLevel::ALL {
                if let Some(item) = map.get(level.key()).filter(|v| v.is_object()) {
                    out.ladder.push((
                        level,
                        LadderPatch {
                            count: count(item.get("count")),
                            stock: text(item.get("stock")),
                            concept: text(item.get("concept")),
                            promotion_rate: number(item.get("promotion_rate")),
                        },
                    ));
                }
            }
        }

        if let Some(d) = value.get("dragon") {
            match d {
                Value::String(_) => out.dragon = text(Some(d)),
                Value::Object(_) => {
                    out.dragon = text(d.get("name"));
                    out.dragon_status = d
                        .get("status")
                        .and_then(|v| serde_json::from_value::<DragonStatus>(v.clone()).ok());
                    out.mid_army = text(d.get("mid_army"));
                }
                _ => {}
            }
        }

        out
    }

    /// 没有任何可用字段
    pub fn is_empty(&self) -> bool {
        let mut scratch = SentimentRecord::new("");
        self.merge_into(&mut scratch) == 0
    }

    /// 合并进工作记录，返回被覆盖的字段数
    pub fn merge_into(&self, record: &mut SentimentRecord) -> usize {
        let mut changed = 0;

        for patch in &self.indices {
            if let Some(entry) = record.indices.iter_mut().find(|e| e.name == patch.name) {
                changed += set(&mut entry.change_pct, patch.change_pct);
                changed += set(&mut entry.ma5, patch.ma5);
            } else {
                log::debug!("AI 返回了未跟踪的指数: {}", patch.name);
            }
        }

        changed += set(&mut record.total_volume, self.total_volume);
        changed += set(&mut record.volume_delta, self.volume_delta);
        changed += set(&mut record.limit_up_count, self.limit_up_count);
        changed += set(&mut record.limit_down_count, self.limit_down_count);
        changed += set(&mut record.broken_rate, self.broken_rate);
        if let Some(trend) = self.trend {
            record.trend = Some(trend);
            changed += 1;
        }
        changed += set(&mut record.yesterday_gain, self.yesterday_gain);
        changed += set(&mut record.nuclear_count, self.nuclear_count);
        changed += set(&mut record.promotion_rate, self.promotion_rate);

        for (slot, patch) in record.top_sectors.iter_mut().zip(&self.sectors) {
            changed += set(&mut slot.name, patch.name.clone());
            changed += set(&mut slot.gain_pct, patch.gain_pct);
            changed += set(&mut slot.limit_up_count, patch.limit_up_count);
            changed += set(&mut slot.volume, patch.volume);
        }

        for (level, patch) in &self.ladder {
            let entry = record.ladder.get_mut(*level);
            changed += set(&mut entry.count, patch.count);
            changed += set(&mut entry.stock, patch.stock.clone());
            changed += set(&mut entry.concept, patch.concept.clone());
            changed += set(&mut entry.promotion_rate, patch.promotion_rate);
        }

        changed += set(&mut record.dragon, self.dragon.clone());
        changed += set(&mut record.dragon_status, self.dragon_status);
        changed += set(&mut record.mid_army, self.mid_army.clone());

        changed
    }
}

fn set<T>(slot: &mut T, value: Option<T>) -> usize {
    match value {
        Some(v) => {
            *slot = v;
            1
        }
        None => 0,
    }
}

/// 数字或可解析的数字字符串（容忍 %、亿、+ 号）
fn number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim_end_matches('亿')
            .trim_start_matches('+')
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite()),
        _ => None,
    }
}

fn count(v: Option<&Value>) -> Option<u32> {
    let n = number(v)?;
    if n < 0.0 || n > u32::MAX as f64 || n.fract() != 0.0 {
        return None;
    }
    Some(n as u32)
}

fn text(v: Option<&Value>) -> Option<String> {
    v?.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn ma_position(v: Option<&Value>) -> Option<MaPosition> {
    match v? {
        Value::Bool(true) => Some(MaPosition::Above),
        Value::Bool(false) => Some(MaPosition::Below),
        Value::String(s) => match s.trim() {
            "above" | "上方" | "站上" => Some(MaPosition::Above),
            "below" | "下方" | "跌破" => Some(MaPosition::Below),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_present_fields_overwrite() {
        let mut r = SentimentRecord::new("2024-03-01");
        let ext = MarketExtraction::from_value(&json!({
            "indices": [{"name": "上证指数", "change_pct": -1.2, "ma5": "below"}],
            "sentiment": {"total_volume": "8650亿", "limit_up_count": 45, "trend": "cliff_drop"},
            "sectors": [{"name": "AI", "gain_pct": "3.5%"}],
            "ladder": {"3": {"count": 2, "stock": "克来机电"}},
            "dragon": {"name": "中马传动", "status": "broken"}
        }));
        let changed = ext.merge_into(&mut r);

        assert_eq!(r.indices[0].change_pct, -1.2);
        assert_eq!(r.indices[0].ma5, MaPosition::Below);
        assert_eq!(r.total_volume, 8650.0);
        assert_eq!(r.limit_up_count, 45);
        assert_eq!(r.trend, Some(Trend::CliffDrop));
        assert_eq!(r.top_sectors[0].name, "AI");
        assert_eq!(r.top_sectors[0].gain_pct, 3.5);
        assert_eq!(r.ladder.get(LadderLevel::Three).count, 2);
        assert_eq!(r.dragon, "中马传动");
        assert_eq!(r.dragon_status, DragonStatus::Broken);
        assert_eq!(changed, 11);
    }

    #[test]
    fn test_invalid_fields_keep_previous_values() {
        let mut r = SentimentRecord::new("2024-03-01");
        r.limit_up_count = 60;
        r.broken_rate = 22.0;
        r.dragon = "老龙头".to_string();
        r.top_sectors[0].name = "机器人".to_string();

        let ext = MarketExtraction::from_value(&json!({
            "sentiment": {"limit_up_count": "很多", "broken_rate": null, "nuclear_count": -3, "trend": "moon"},
            "sectors": [{"name": "  ", "gain_pct": true}],
            "dragon": 42
        }));
        assert!(ext.is_empty());
        assert_eq!(ext.merge_into(&mut r), 0);
        assert_eq!(r.limit_up_count, 60);
        assert_eq!(r.broken_rate, 22.0);
        assert_eq!(r.dragon, "老龙头");
        assert_eq!(r.top_sectors[0].name, "机器人");
    }

    #[test]
    fn test_unknown_index_ignored() {
        let mut r = SentimentRecord::new("2024-03-01");
        let before = r.indices.clone();
        let ext = MarketExtraction::from_value(&json!({
            "indices": [{"name": "纳斯达克", "change_pct": 2.0}]
        }));
        assert_eq!(ext.merge_into(&mut r), 0);
        assert_eq!(r.indices, before);
    }
}
