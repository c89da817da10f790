use base64::Engine;

/// base64 → UTF-8 文本（非法字节按替换字符处理）
pub fn decode_base64_text(data: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
