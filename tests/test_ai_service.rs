//! AI 接口集成测试：用 wiremock 模拟 OpenAI 兼容服务
//!
//!   cargo test --test test_ai_service

use base64::Engine;
use dragon_faith::commands::{ai_cmd, record_cmd};
use dragon_faith::models::ai::{AIConfig, AIStreamEvent, Attachment};
use dragon_faith::models::record::Stage;
use dragon_faith::services::ai_service::AIService;
use dragon_faith::AppState;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> AIConfig {
    AIConfig {
        id: "mock".to_string(),
        base_url: format!("{}/v1/", server.uri()),
        api_key: "sk-test".to_string(),
        model_name: "mock-vision".to_string(),
        timeout_secs: 5,
        ..Default::default()
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
    })
}

fn sse_body(chunks: &[&str]) -> String {
    let mut body = String::new();
    for c in chunks {
        let chunk = json!({"id": "x", "choices": [{"index": 0, "delta": {"content": c}, "finish_reason": null}]});
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: {\"id\":\"x\",\"choices\":[],\"usage\":{\"prompt_tokens\":200,\"completion_tokens\":40,\"total_tokens\":240}}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

fn screenshot() -> Attachment {
    Attachment {
        file_name: "盘面.png".to_string(),
        mime_type: "image/png".to_string(),
        base64_data: base64::engine::general_purpose::STANDARD.encode(b"\x89PNG"),
    }
}

async fn state_for(server: &MockServer) -> AppState {
    let state = AppState::in_memory().unwrap();
    let mut settings = state.settings().unwrap();
    let config = config_for(server);
    settings.active_ai_config_id = Some(config.id.clone());
    settings.ai_configs.push(config);
    state.db.save_settings(&settings).unwrap();
    state
}

#[tokio::test]
async fn test_extract_market_data_parses_partial_record() {
    let server = MockServer::start().await;
    let payload = r#"```json
{"sentiment": {"limit_up_count": 88, "broken_rate": "23.5%", "trend": "v_reversal"},
 "sectors": [{"name": "AI", "gain_pct": 4.2}],
 "dragon": {"name": "中马传动", "status": "accelerate"}}
```"#;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(payload)))
        .expect(1)
        .mount(&server)
        .await;

    let (extraction, usage) = AIService::extract_market_data(&config_for(&server), "2024-03-08", &[screenshot()])
        .await
        .unwrap();

    assert_eq!(extraction.limit_up_count, Some(88));
    assert_eq!(extraction.broken_rate, Some(23.5));
    assert_eq!(extraction.dragon.as_deref(), Some("中马传动"));
    assert_eq!(usage.unwrap().total_tokens, 150);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "mock-vision");
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0]["content"][1]["type"], "image_url");
}

#[tokio::test]
async fn test_http_error_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = AIService::test_ai_connection(&config_for(&server)).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("401"), "{}", msg);
    assert!(msg.contains("invalid api key"), "{}", msg);
}

#[tokio::test]
async fn test_analyze_stream_collects_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&["情绪", "修复中。", "[STAGE:修复]"])),
        )
        .mount(&server)
        .await;

    let (tx, mut rx) = tokio::sync::mpsc::channel::<AIStreamEvent>(16);
    let (content, usage) = AIService::analyze_stream(&config_for(&server), "复盘", &[], tx)
        .await
        .unwrap();

    assert_eq!(content, "情绪修复中。[STAGE:修复]");
    assert_eq!(usage.unwrap().total_tokens, 240);

    let mut streamed = String::new();
    let mut saw_done = false;
    while let Some(event) = rx.recv().await {
        if let Some(c) = event.content {
            streamed.push_str(&c);
        }
        saw_done |= event.done;
    }
    assert_eq!(streamed, content);
    assert!(saw_done);
}

#[tokio::test]
async fn test_extract_command_merges_into_working_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"sentiment": {"limit_up_count": 66, "nuclear_count": "abc"}, "dragon": "中马传动"}"#,
        )))
        .mount(&server)
        .await;

    let state = state_for(&server).await;
    record_cmd::new_record(&state, Some("2024-03-08".to_string())).await.unwrap();
    state.session().unwrap().working.nuclear_count = 7;
    state.session().unwrap().attachments.push(screenshot());

    let summary = ai_cmd::ai_extract_market_data(&state).await.unwrap().into_result().unwrap();
    assert_eq!(summary.changed_fields, 2);
    assert_eq!(summary.total_tokens, 150);

    let working = record_cmd::get_working_record(&state).await.unwrap();
    assert_eq!(working.limit_up_count, 66);
    assert_eq!(working.dragon, "中马传动");
    assert_eq!(working.nuclear_count, 7, "无效字段保留原值");
    assert_eq!(ai_cmd::get_today_token_usage(&state).await.unwrap(), 150);
    assert!(!state.ai_slot.is_busy());
}

#[tokio::test]
async fn test_analyze_command_writes_analysis_and_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[
            "龙头断板，退潮确认。",
            "[DATA]{\"dragon\": {\"name\": \"中马传动\", \"status\": \"broken\"}}[/DATA]",
            "[STAGE:退潮]",
        ])))
        .mount(&server)
        .await;

    let state = state_for(&server).await;
    record_cmd::new_record(&state, Some("2024-03-08".to_string())).await.unwrap();

    let (tx, _rx) = tokio::sync::mpsc::channel::<AIStreamEvent>(64);
    let summary = ai_cmd::ai_analyze_working_record(&state, tx)
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(summary.stage, Some(Stage::Ebb));
    assert_eq!(summary.content, "龙头断板，退潮确认。");
    assert_eq!(summary.changed_fields, 2);

    let working = record_cmd::get_working_record(&state).await.unwrap();
    assert_eq!(working.ai_analysis, "龙头断板，退潮确认。");
    assert_eq!(working.stage, Stage::Ebb);

    let history = ai_cmd::get_analysis_history(&state, "2024-03-08".to_string(), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].model_name, "mock-vision");
}

#[tokio::test]
async fn test_failed_call_returns_failure_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;

    let state = state_for(&server).await;
    state.session().unwrap().attachments.push(screenshot());

    let outcome = ai_cmd::ai_extract_market_data(&state).await.unwrap();
    let reason = outcome.into_result().unwrap_err();
    assert!(reason.contains("500"), "{}", reason);
    assert!(!state.ai_slot.is_busy(), "失败后槽位应恢复空闲");
}

/// 读完一个请求（头 + Content-Length 长度的正文）
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.trim().eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                return;
            }
        }
    }
}

#[tokio::test]
async fn test_stream_keeps_chinese_split_across_http_chunks() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let event = "data: {\"choices\":[{\"delta\":{\"content\":\"涨停潮\"}}]}\n\ndata: [DONE]\n\n";
    let bytes = event.as_bytes().to_vec();
    let cut = event.find('涨').unwrap() + 1;

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        for part in [&bytes[..cut], &bytes[cut..]] {
            socket.write_all(format!("{:x}\r\n", part.len()).as_bytes()).await.unwrap();
            socket.write_all(part).await.unwrap();
            socket.write_all(b"\r\n").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
        socket.flush().await.unwrap();
    });

    let config = AIConfig {
        base_url: format!("http://{}", addr),
        timeout_secs: 5,
        ..Default::default()
    };
    let (tx, _rx) = tokio::sync::mpsc::channel::<AIStreamEvent>(16);
    let (content, _) = AIService::analyze_stream(&config, "复盘", &[], tx).await.unwrap();
    assert_eq!(content, "涨停潮", "跨分块的汉字不应被替换成乱码");
    server.await.unwrap();
}

#[tokio::test]
async fn test_extract_result_not_merged_after_record_switch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(r#"{"sentiment": {"limit_up_count": 99}}"#))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let state = state_for(&server).await;
    record_cmd::new_record(&state, Some("2024-03-08".to_string())).await.unwrap();
    state.session().unwrap().attachments.push(screenshot());

    let switch = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        record_cmd::new_record(&state, Some("2024-03-11".to_string())).await.unwrap();
    };
    let (outcome, _) = tokio::join!(ai_cmd::ai_extract_market_data(&state), switch);

    let reason = outcome.unwrap().into_result().unwrap_err();
    assert!(reason.contains("2024-03-08"), "{}", reason);

    let working = record_cmd::get_working_record(&state).await.unwrap();
    assert_eq!(working.date, "2024-03-11");
    assert_eq!(working.limit_up_count, 0, "别的日期的提取结果不能写进来");
    assert!(!state.ai_slot.is_busy());
}
