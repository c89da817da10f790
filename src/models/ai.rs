use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    /// 识图提取用低温，复盘点评可适当调高
    pub temperature: f64,
    pub timeout_secs: u64,
    /// 失败重试次数，0 表示失败即终止
    #[serde(default)]
    pub max_retries: u32,
    pub enabled: bool,
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: "默认模型".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model_name: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout_secs: 300,
            max_retries: 0,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIAnalysisResult {
    pub id: String,
    /// 对应情绪记录的日期
    pub record_date: String,
    pub model_name: String,
    pub question: String,
    pub content: String,
    pub created_at: String,
}

/// 上传给 AI 的附件（已完成 base64 编码）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub base64_data: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/") || self.mime_type == "application/json"
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data)
    }
}

// ========== Chat Completion 数据结构（支持多模态）==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// 纯文本或多模态分段
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
    #[serde(rename = "file")]
    File { file: FileData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileData {
    pub filename: String,
    pub file_data: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.to_string()),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.to_string()),
        }
    }

    /// 带附件的用户消息；文本附件解码后内联，图片/PDF 以 data URL 传递
    pub fn user_with_attachments(content: &str, attachments: &[Attachment]) -> Self {
        if attachments.is_empty() {
            return Self::user(content);
        }

        let mut parts = vec![ContentPart::Text { text: content.to_string() }];
        for a in attachments {
            if a.is_image() {
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl { url: a.data_url() },
                });
            } else if a.is_text() {
                let text = crate::utils::encoding::decode_base64_text(&a.base64_data)
                    .unwrap_or_default();
                parts.push(ContentPart::Text {
                    text: format!("【附件 {}】\n{}", a.file_name, text),
                });
            } else {
                parts.push(ContentPart::File {
                    file: FileData {
                        filename: a.file_name.clone(),
                        file_data: a.data_url(),
                    },
                });
            }
        }

        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: Option<ChatChoiceMessage>,
    pub delta: Option<ChatDelta>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoiceMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDelta {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// 流式输出事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIStreamEvent {
    pub event_type: String, // "content" | "done"
    pub content: Option<String>,
    pub done: bool,
    pub usage: Option<TokenUsage>,
}

impl AIStreamEvent {
    pub fn content(text: &str) -> Self {
        Self {
            event_type: "content".to_string(),
            content: Some(text.to_string()),
            done: false,
            usage: None,
        }
    }

    pub fn done(usage: Option<TokenUsage>) -> Self {
        Self {
            event_type: "done".to_string(),
            content: None,
            done: true,
            usage,
        }
    }
}
