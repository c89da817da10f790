use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;

use crate::models::extraction::MarketExtraction;
use crate::models::record::Stage;

/// 复盘点评解析结果
#[derive(Debug, Clone, Default)]
pub struct ParsedAnalysis {
    /// 去掉标签后的正文
    pub text: String,
    pub stage: Option<Stage>,
    pub data: Option<MarketExtraction>,
}

fn data_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[DATA\](.*?)\[/DATA\]").expect("DATA 块正则"))
}

fn stage_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[STAGE[:：]\s*([^\]\n]+?)\s*\]").expect("STAGE 标签正则"))
}

/// 从模型输出中取出 JSON 对象（容忍 ```json 代码块和前后多余文字）
pub fn extract_json_object(text: &str) -> Result<String> {
    let stripped = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if let Some(start) = stripped.find('{') {
        if let Some(end) = stripped.rfind('}') {
            if end > start {
                return Ok(stripped[start..=end].to_string());
            }
        }
    }
    Err(anyhow!("Cannot find JSON object in AI response"))
}

/// 提取 JSON 对象并转成部分记录
pub fn parse_extraction(text: &str) -> Result<MarketExtraction> {
    let json_str = extract_json_object(text)?;
    let value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| anyhow!("Extraction parse error: {} content: {}", e, preview(&json_str)))?;
    if !value.is_object() {
        return Err(anyhow!("Extraction is not a JSON object"));
    }
    Ok(MarketExtraction::from_value(&value))
}

/// 解析复盘点评：[DATA]...[/DATA] 数据块、[STAGE:xxx] 标签，剩余为正文
pub fn parse_analysis(content: &str) -> ParsedAnalysis {
    let mut text = content.to_string();
    let mut data = None;

    let data_re = data_block_re();
    if let Some(caps) = data_re.captures(content) {
        let block = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        match parse_extraction(block) {
            Ok(ext) if !ext.is_empty() => data = Some(ext),
            Ok(_) => {}
            Err(e) => log::warn!("[DATA] 块无法解析，忽略: {}", e),
        }
    }
    text = data_re.replace_all(&text, "").to_string();

    // 以最后一个可识别的标签为准
    let stage_re = stage_tag_re();
    let stage = stage_re
        .captures_iter(&text)
        .filter_map(|c| c.get(1).and_then(|m| Stage::parse_label(m.as_str())))
        .last();
    text = stage_re.replace_all(&text, "").to_string();

    ParsedAnalysis {
        text: text.trim().to_string(),
        stage,
        data,
    }
}

fn preview(s: &str) -> String {
    s.chars().take(200).collect()
}
