use anyhow::{anyhow, Result};
use futures::StreamExt;

use crate::models::ai::*;
use crate::models::extraction::MarketExtraction;
use crate::services::prompts;
use crate::services::response_parser;
use crate::utils::http::build_ai_client;
use crate::utils::retry::retry_with_backoff;

pub struct AIService;

impl AIService {
    /// 识图/读文件提取盘面数据（非流式，返回部分记录）
    pub async fn extract_market_data(
        config: &AIConfig,
        date: &str,
        attachments: &[Attachment],
    ) -> Result<(MarketExtraction, Option<TokenUsage>)> {
        if attachments.is_empty() {
            return Err(anyhow!("请先添加截图或复盘文件"));
        }

        let messages = vec![ChatMessage::user_with_attachments(
            &prompts::extraction_prompt(date),
            attachments,
        )];
        let (content, usage) = Self::chat_once(config, messages).await?;
        let extraction = response_parser::parse_extraction(&content)?;
        Ok((extraction, usage))
    }

    /// 非流式对话，返回正文和用量
    pub async fn chat_once(
        config: &AIConfig,
        messages: Vec<ChatMessage>,
    ) -> Result<(String, Option<TokenUsage>)> {
        let client = build_ai_client(config.timeout_secs)?;
        let url = chat_url(config);

        let req = ChatCompletionRequest {
            model: config.model_name.clone(),
            messages,
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
            stream: Some(false),
        };

        let (client, url, req) = (&client, &url, &req);
        let body = retry_with_backoff(config.max_retries, move || async move {
            let resp = client
                .post(url)
                .header("Authorization", format!("Bearer {}", config.api_key))
                .header("Content-Type", "application/json")
                .json(req)
                .send()
                .await?;

            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(anyhow!("AI API error ({}): {}", status, body));
            }
            Ok(body)
        })
        .await?;

        let response: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("AI response parse error: {} body: {}", e, preview(&body, 200)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .ok_or_else(|| anyhow!("AI 返回空内容"))?;

        Ok((content, response.usage))
    }

    /// 流式复盘点评，增量通过 `sender` 推送；返回完整正文和用量
    pub async fn analyze_stream(
        config: &AIConfig,
        prompt: &str,
        attachments: &[Attachment],
        sender: tokio::sync::mpsc::Sender<AIStreamEvent>,
    ) -> Result<(String, Option<TokenUsage>)> {
        let client = build_ai_client(config.timeout_secs)?;
        let url = chat_url(config);

        let req = ChatCompletionRequest {
            model: config.model_name.clone(),
            messages: vec![
                ChatMessage::system(prompts::analysis_system_prompt()),
                ChatMessage::user_with_attachments(prompt, attachments),
            ],
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
            stream: Some(true),
        };

        // 只对建立连接重试，流开始后出错直接失败
        let (client, url, req) = (&client, &url, &req);
        let resp = retry_with_backoff(config.max_retries, move || async move {
            let resp = client
                .post(url)
                .header("Authorization", format!("Bearer {}", config.api_key))
                .header("Content-Type", "application/json")
                .json(req)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await?;
                return Err(anyhow!("AI API error ({}): {}", status, body));
            }
            Ok(resp)
        })
        .await?;

        let mut full_content = String::new();
        let mut total_usage: Option<TokenUsage> = None;
        let mut stream = resp.bytes_stream();
        let mut lines = SseLineBuffer::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for line in lines.push(&chunk) {
                Self::handle_sse_line(&line, &mut full_content, &mut total_usage, &sender).await;
            }
        }

        // 末行可能没有换行
        if let Some(rest) = lines.finish() {
            Self::handle_sse_line(&rest, &mut full_content, &mut total_usage, &sender).await;
        }

        if full_content.is_empty() {
            return Err(anyhow!("AI 返回空内容"));
        }

        Ok((full_content, total_usage))
    }

    async fn handle_sse_line(
        line: &str,
        full_content: &mut String,
        total_usage: &mut Option<TokenUsage>,
        sender: &tokio::sync::mpsc::Sender<AIStreamEvent>,
    ) {
        if line.is_empty() {
            return;
        }
        if line == "data: [DONE]" {
            let _ = sender.send(AIStreamEvent::done(total_usage.clone())).await;
            return;
        }

        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let Ok(chunk_resp) = serde_json::from_str::<ChatCompletionResponse>(data.trim()) else {
            log::debug!("跳过无法解析的 SSE 行: {}", preview(line, 80));
            return;
        };

        if let Some(content) = chunk_resp
            .choices
            .first()
            .and_then(|c| c.delta.as_ref())
            .and_then(|d| d.content.as_ref())
        {
            full_content.push_str(content);
            let _ = sender.send(AIStreamEvent::content(content)).await;
        }

        if let Some(usage) = &chunk_resp.usage {
            *total_usage = Some(match total_usage.take() {
                Some(mut u) => {
                    u.prompt_tokens += usage.prompt_tokens;
                    u.completion_tokens += usage.completion_tokens;
                    u.total_tokens += usage.total_tokens;
                    u
                }
                None => usage.clone(),
            });
        }
    }

    /// 测试模型配置是否可用
    pub async fn test_ai_connection(config: &AIConfig) -> Result<String> {
        let (content, _) = Self::chat_once(config, vec![ChatMessage::user("请回复：连接成功")]).await?;
        Ok(content)
    }
}

/// SSE 字节流按行切分；只解码完整的行，汉字被拆到两个分块里也不会损坏
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..pos]));
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = decode_line(&rest);
        (!line.is_empty()).then_some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.trim().to_string(),
        Err(e) => {
            log::warn!("SSE 行不是合法 UTF-8: {}", e);
            String::from_utf8_lossy(bytes).trim().to_string()
        }
    }
}

fn chat_url(config: &AIConfig) -> String {
    format!("{}/chat/completions", config.base_url.trim_end_matches('/'))
}

fn preview(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}
