use std::collections::VecDeque;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use base64::Engine;

use crate::models::ai::Attachment;

/// 按扩展名判断 MIME；不认识的文件直接拒绝
pub fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => return None,
    };
    Some(mime)
}

/// 整个文件读入内存后 base64 编码
pub async fn read_attachment(path: &Path) -> Result<Attachment> {
    let mime_type = mime_for(path)
        .ok_or_else(|| anyhow!("不支持的附件类型: {}", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("读取附件 {} 失败", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    log::debug!("附件 {} ({}, {} 字节)", file_name, mime_type, bytes.len());

    Ok(Attachment {
        file_name,
        mime_type: mime_type.to_string(),
        base64_data: base64::engine::general_purpose::STANDARD.encode(&bytes),
    })
}

/// 附件队列，超过上限时淘汰最早加入的
#[derive(Debug, Clone)]
pub struct AttachmentQueue {
    items: VecDeque<Attachment>,
    capacity: usize,
}

impl AttachmentQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// 返回被淘汰的附件
    pub fn push(&mut self, attachment: Attachment) -> Option<Attachment> {
        self.items.push_back(attachment);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    pub fn items(&self) -> Vec<Attachment> {
        self.items.iter().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|a| a.file_name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
