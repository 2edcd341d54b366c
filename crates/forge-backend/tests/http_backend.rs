//! HttpBackend Tests
//!
//! Each test serves exactly one canned HTTP response from a local listener.

use forge_backend::{BackendConfig, HttpBackend};
use forge_core::{BackendError, GenerationRequest, GenerativeBackend, Orchestrator, PromptContext};
use forge_validator::CancelToken;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn serve_once(status: &'static str, body: String) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let body_start = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let headers = String::from_utf8_lossy(&buf[..body_start]).to_ascii_lowercase();
        let len = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < body_start + len {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf[body_start..]).into_owned());

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
    });

    (format!("http://{addr}"), rx)
}

fn backend(endpoint: String) -> HttpBackend {
    HttpBackend::new(BackendConfig {
        endpoint,
        model: "test-model".into(),
        timeout_secs: 5,
        temperature: None,
    })
    .unwrap()
}

fn prompt() -> PromptContext {
    PromptContext::new(
        Arc::new(GenerationRequest::new("github", "Repositories and issues")),
        1,
        Vec::new(),
    )
}

#[tokio::test]
async fn test_generate_extracts_fenced_code() {
    let reply = json!({
        "response": "Here is the server:\n\n```python\nimport os\nx = 1\n```\n",
        "done": true
    });
    let (endpoint, request) = serve_once("200 OK", reply.to_string()).await;

    let text = backend(endpoint).generate(&prompt()).await.unwrap();
    assert_eq!(text, "import os\nx = 1\n");

    let sent: serde_json::Value = serde_json::from_str(&request.await.unwrap()).unwrap();
    assert_eq!(sent["model"], "test-model");
    assert_eq!(sent["stream"], false);
    assert!(sent["prompt"].as_str().unwrap().contains("Repositories and issues"));
    assert!(sent.get("options").is_none());
}

#[tokio::test]
async fn test_error_status_is_unavailable() {
    let (endpoint, _request) =
        serve_once("503 Service Unavailable", "model is loading".to_string()).await;

    let err = backend(endpoint).generate(&prompt()).await.unwrap_err();
    let BackendError::Unavailable(message) = &err else {
        panic!("expected Unavailable, got {err:?}");
    };
    assert!(message.contains("503"));
    assert!(message.contains("model is loading"));
}

#[tokio::test]
async fn test_connection_refused_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = backend(format!("http://{addr}"))
        .generate(&prompt())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Unavailable(_)));
}

#[tokio::test]
async fn test_body_without_response_is_malformed() {
    let (endpoint, _request) = serve_once("200 OK", json!({"error": "no model"}).to_string()).await;

    let err = backend(endpoint).generate(&prompt()).await.unwrap_err();
    assert!(matches!(err, BackendError::Malformed(_)));
}

#[tokio::test]
async fn test_orchestrator_accepts_served_compliant_module() {
    let reply = json!({
        "response": format!("```python\n{}```\n", forge_test_utils::compliant_server()),
    });
    let (endpoint, _request) = serve_once("200 OK", reply.to_string()).await;

    let orchestrator = Orchestrator::with_defaults(Arc::new(backend(endpoint))).unwrap();
    let result = orchestrator
        .run(
            GenerationRequest::new("github", "Repositories and issues"),
            &CancelToken::never(),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.attempts_used, 1);
    assert_eq!(
        result.artifact.map(|a| a.provenance().backend.clone()),
        Some("http:test-model".to_string())
    );
}
