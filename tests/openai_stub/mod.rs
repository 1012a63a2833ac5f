use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiStubConfig {
    /// Answer `"stream": true` requests with HTTP 500 so clients must fall back.
    pub fail_streaming: bool,
}

/// Minimal OpenAI chat-completions server. Replies are chosen from the prompt
/// text; streamed requests get SSE `chat.completion.chunk` events.
pub struct OpenAiStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

pub const STUB_QUERIES: &str = "q one\nq two\n\nq three\nq four\nq five\nq six\nq seven\n";

pub const STUB_OUTLINE: &str = "# Stub Book\n\
\n\
## Chapter 1 – Alpha\n\
Goal: first.\n\
### Chapter 2 - Beta\n\
- Chapter 3 – Alpha\n\
## Chapter 3 - 3.1 Sub point\n\
* Chapter 4 — Gamma\n";

impl OpenAiStub {
    pub fn spawn(config: OpenAiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/chat/completions" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };
                seen.lock().expect("lock requests").push(parsed.clone());

                let Some(prompt) = parsed
                    .pointer("/messages/0/content")
                    .and_then(|v| v.as_str())
                else {
                    let _ = request.respond(
                        tiny_http::Response::from_string(
                            r#"{"error":{"message":"missing messages"}}"#,
                        )
                        .with_status_code(400),
                    );
                    continue;
                };

                let text = reply_for(prompt);
                let stream = parsed.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);

                let response = if stream && config.fail_streaming {
                    tiny_http::Response::from_string(
                        r#"{"error":{"message":"streaming unavailable"}}"#,
                    )
                    .with_status_code(500)
                } else if stream {
                    tiny_http::Response::from_string(sse_body(&text))
                        .with_status_code(200)
                        .with_header(header("Content-Type", "text/event-stream"))
                } else {
                    let body = serde_json::json!({
                        "id": "chatcmpl_stub",
                        "object": "chat.completion",
                        "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                        "choices": [
                            {
                                "index": 0,
                                "message": { "role": "assistant", "content": text },
                                "finish_reason": "stop"
                            }
                        ]
                    });
                    tiny_http::Response::from_string(body.to_string())
                        .with_status_code(200)
                        .with_header(header("Content-Type", "application/json"))
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Bodies of every chat-completions request received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("lock requests").clone()
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn header(name: &str, value: &str) -> tiny_http::Header {
    tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("build header")
}

fn reply_for(prompt: &str) -> String {
    if let Some(rest) = prompt.split("Given Topic:").nth(1) {
        let topic = rest.lines().next().unwrap_or_default().trim();
        return format!(
            "Here you go:\n\n```yaml\n\
topic: \"{topic}\"\n\
main_keyword: \"stub\"\n\
theme: \"stubbed theme\"\n\
target_audience: \"test readers\"\n\
tone: \"calm\"\n\
mood: \"calming\"\n\
distribution_platform: \"Gumroad\"\n\
primary_format: \"PDF\"\n\
chapter_length: 1700\n\
interactive_elements_included: \"Guided Journal Page\"\n\
min_search_results: 10\n\
num_chapters: 9\n\
```\n"
        );
    }
    if prompt.contains("search queries") {
        return STUB_QUERIES.to_owned();
    }
    if prompt.contains("eBook outline") {
        return STUB_OUTLINE.to_owned();
    }
    let head: String = prompt.chars().take(40).collect();
    format!("Stub body for: {head}")
}

fn sse_body(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut body = String::from(": stub stream\n\n");
    for piece in chars.chunks(8) {
        let piece: String = piece.iter().collect();
        let event = serde_json::json!({
            "object": "chat.completion.chunk",
            "choices": [{ "index": 0, "delta": { "content": piece } }]
        });
        body.push_str(&format!("data: {event}\r\n\r\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
