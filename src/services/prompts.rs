use crate::models::record::{LadderLevel, MaPosition, SentimentRecord, Stage};
use crate::services::persistence::SectorPersistence;

/// 识图/读文件提取盘面数据；要求只输出 JSON
pub fn extraction_prompt(date: &str) -> String {
    format!(
        "你是A股短线复盘助手。请从附件（盘面截图、复盘文档等）中提取 {} 的市场数据。\n\
        \n\
        只输出一个 JSON 对象，不要输出其他内容。识别不到的字段直接省略，不要编造：\n\
        {{\n\
          \"indices\": [{{\"name\": \"上证指数\", \"change_pct\": -0.52, \"ma5\": \"above|below\"}}],\n\
          \"sentiment\": {{\n\
            \"total_volume\": 8650, \"volume_delta\": -320,\n\
            \"limit_up_count\": 56, \"limit_down_count\": 8, \"broken_rate\": 28.5,\n\
            \"trend\": \"v_reversal|rising|sideways|falling|cliff_drop\",\n\
            \"yesterday_gain\": 2.3, \"nuclear_count\": 4, \"promotion_rate\": 35\n\
          }},\n\
          \"sectors\": [{{\"name\": \"AI\", \"gain_pct\": 3.2, \"limit_up_count\": 9, \"volume\": 1200}}],\n\
          \"ladder\": {{\"1\": {{\"count\": 40, \"stock\": \"\", \"concept\": \"\", \"promotion_rate\": 20}}, \"5\": {{\"count\": 1, \"stock\": \"某某股份\", \"concept\": \"机器人\", \"promotion_rate\": 100}}}},\n\
          \"dragon\": {{\"name\": \"\", \"status\": \"accelerate|divergence|broken|revive\", \"mid_army\": \"\"}}\n\
        }}\n\
        \n\
        说明：成交额单位为亿；百分比字段只填数字；sectors 最多3个，按涨幅排序；ladder 的 \"5\" 表示5板及以上。",
        date
    )
}

pub fn analysis_system_prompt() -> &'static str {
    "你是一位信仰龙头战法的A股短线游资，擅长情绪周期判断。\n\
    复盘时先给出结论，再给依据，语言简练，不要空话。"
}

/// 复盘点评提示：当前记录 + 最近几天 + 持续性板块
pub fn analysis_prompt(
    record: &SentimentRecord,
    history: &[SentimentRecord],
    persistent: &[SectorPersistence],
    market_status: &str,
) -> String {
    let mut history_text = String::new();
    for r in history {
        history_text.push_str(&format!(
            "- {} 涨停{} 跌停{} 炸板率{:.1}% 成交{:.0}亿 龙头:{} 阶段:{} 分数:{}\n",
            r.date,
            r.limit_up_count,
            r.limit_down_count,
            r.broken_rate,
            r.total_volume,
            if r.dragon.is_empty() { "无" } else { r.dragon.as_str() },
            r.stage.label(),
            r.score
        ));
    }
    if history_text.is_empty() {
        history_text.push_str("（无历史记录）\n");
    }

    let persistent_text = if persistent.is_empty() {
        "无".to_string()
    } else {
        persistent
            .iter()
            .map(|p| format!("{}({}次)", p.name, p.count))
            .collect::<Vec<_>>()
            .join("、")
    };

    let stage_options = Stage::ALL
        .iter()
        .map(|s| s.label())
        .collect::<Vec<_>>()
        .join("/");

    format!(
        "当前盘面状态：{}\n\
        \n\
        今日数据：\n{}\n\
        近期记录：\n{}\
        近期持续性板块：{}\n\
        \n\
        请从以下维度复盘：\n\
        1. **情绪周期**：当前处于哪个阶段，依据是什么\n\
        2. **主线与龙头**：主线是否持续，龙头地位是否稳固，中军表现\n\
        3. **梯队健康度**：连板梯队是否断层，晋级率如何\n\
        4. **明日计划**：对自选股给出具体的操作计划和应对预案\n\
        5. **风险提示**\n\
        \n\
        最后另起一行输出阶段标签 [STAGE:{}] 中的一个；\
        如果你修正了今日数据，把修正后的字段按 JSON 放在 [DATA]...[/DATA] 之间（可省略）。",
        market_status,
        describe_record(record),
        history_text,
        persistent_text,
        stage_options
    )
}

/// 记录的文字描述
pub fn describe_record(r: &SentimentRecord) -> String {
    let mut lines = Vec::new();
    lines.push(format!("日期：{}", r.date));

    let indices = r
        .indices
        .iter()
        .map(|i| {
            format!(
                "{} {:+.2}%({}5日线)",
                i.name,
                i.change_pct,
                match i.ma5 {
                    MaPosition::Above => "站上",
                    MaPosition::Below => "跌破",
                }
            )
        })
        .collect::<Vec<_>>()
        .join("，");
    lines.push(format!("指数：{}", indices));

    lines.push(format!(
        "成交额：{:.0}亿（较昨日{:+.0}亿）",
        r.total_volume, r.volume_delta
    ));
    lines.push(format!(
        "涨停{}家，跌停{}家，炸板率{:.1}%，核按钮{}家",
        r.limit_up_count, r.limit_down_count, r.broken_rate, r.nuclear_count
    ));
    lines.push(format!(
        "大盘走势：{}，昨日涨停溢价{:+.2}%，整体晋级率{:.1}%",
        r.trend.map(|t| t.label()).unwrap_or("未填"),
        r.yesterday_gain,
        r.promotion_rate
    ));

    let sectors = r
        .top_sectors
        .iter()
        .filter(|s| !s.name.trim().is_empty())
        .map(|s| {
            format!(
                "{}（{:+.2}%，涨停{}家，成交{:.0}亿）",
                s.name.trim(),
                s.gain_pct,
                s.limit_up_count,
                s.volume
            )
        })
        .collect::<Vec<_>>();
    lines.push(format!(
        "前三板块：{}",
        if sectors.is_empty() { "未填".to_string() } else { sectors.join("；") }
    ));

    let mut ladder = Vec::new();
    for (level, e) in r.ladder.iter() {
        if e.count == 0 && e.stock.is_empty() {
            continue;
        }
        let level_name = match level {
            LadderLevel::FivePlus => "5板+".to_string(),
            other => format!("{}板", other.key()),
        };
        ladder.push(format!(
            "{} {}家 {}{} 晋级率{:.0}%",
            level_name,
            e.count,
            e.stock,
            if e.concept.is_empty() { String::new() } else { format!("({})", e.concept) },
            e.promotion_rate
        ));
    }
    lines.push(format!(
        "连板梯队：{}",
        if ladder.is_empty() { "未填".to_string() } else { ladder.join("；") }
    ));

    lines.push(format!(
        "龙头：{}（{}），中军：{}",
        if r.dragon.is_empty() { "未填" } else { r.dragon.as_str() },
        r.dragon_status.label(),
        if r.mid_army.is_empty() { "未填" } else { r.mid_army.as_str() }
    ));

    if !r.watchlist.is_empty() {
        let items = r
            .watchlist
            .iter()
            .map(|w| format!("{}[{}] 计划:{}", w.name, w.concept, w.plan))
            .collect::<Vec<_>>()
            .join("；");
        lines.push(format!("自选：{}", items));
    }

    lines.push(format!("情绪分：{}（{}）", r.score, r.stage.label()));
    lines.join("\n")
}
