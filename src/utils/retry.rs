use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;

/// 指数退避重试（1s, 2s, 4s ...）。
/// 只重试超时、连接错误和 5xx；4xx、解析错误等直接返回。
/// `max_retries` 为 0 时只执行一次。
pub async fn retry_with_backoff<F, Fut, T>(
    max_retries: u32,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if attempt >= max_retries || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = Duration::from_secs(1 << attempt.min(5));
                log::warn!(
                    "AI API 请求失败（第 {} 次），{}s 后重试: {}",
                    attempt + 1,
                    delay.as_secs(),
                    e
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

pub fn is_retryable(e: &anyhow::Error) -> bool {
    if let Some(re) = e.downcast_ref::<reqwest::Error>() {
        if re.is_timeout() || re.is_connect() {
            return true;
        }
        if let Some(status) = re.status() {
            return status.is_server_error();
        }
    }
    let err_msg = e.to_string().to_lowercase();
    err_msg.contains("timeout")
        || err_msg.contains("timed out")
        || err_msg.contains("connection")
        || err_msg.contains("(500")
        || err_msg.contains("(502")
        || err_msg.contains("(503")
        || err_msg.contains("(504")
        || err_msg.contains("broken pipe")
        || err_msg.contains("reset by peer")
}
