//! HTTP API tests against a live server on an ephemeral port.

mod common;

use common::{capitals, harness, rivers, Harness};
use docqa::server::serve;
use serde_json::{json, Value};

async fn start(h: &Harness) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = h.service.clone();
    tokio::spawn(async move {
        serve(listener, service).await.ok();
    });
    format!("http://{}", addr)
}

async fn post_chat(client: &reqwest::Client, base: &str, body: Value) -> (u16, Value) {
    let resp = client
        .post(format!("{}/api/chat", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn health_reports_index_state() {
    let h = harness(capitals(), 50, 0);
    let base = start(&h).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["state"], "uninitialized");
    assert_eq!(body["chunks"], 0);

    h.service.rebuild().await.unwrap();
    let body: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["state"], "ready");
    assert_eq!(body["chunks"], 2);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn chat_returns_answer_and_ranked_sources() {
    let h = harness(capitals(), 50, 0);
    h.service.rebuild().await.unwrap();
    let base = start(&h).await;
    let client = reqwest::Client::new();

    let (status, body) = post_chat(
        &client,
        &base,
        json!({ "message": "What is the capital of X?" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["response"], "A is the capital of X.");
    assert!(body["processing_time"].as_f64().unwrap() >= 0.0);

    let sources = body["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["rank"], 1);
    assert_eq!(sources[0]["source"], "a.pdf");
    assert_eq!(sources[0]["chunk_index"], 0);
    assert_eq!(sources[1]["rank"], 2);
    assert!(sources[0]["score"].as_f64().unwrap() >= sources[1]["score"].as_f64().unwrap());

    let history: Value = client
        .get(format!("{}/api/messages", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["sender"], "user");
    assert_eq!(history[1]["sender"], "ai");
    assert_eq!(history[1]["text"], "A is the capital of X.");
}

#[tokio::test]
async fn chat_rejects_blank_and_malformed_messages() {
    let h = harness(capitals(), 50, 0);
    h.service.rebuild().await.unwrap();
    let base = start(&h).await;
    let client = reqwest::Client::new();

    let (status, body) = post_chat(&client, &base, json!({ "message": "  " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "bad_request");
    assert!(body["detail"].as_str().unwrap().contains("empty"));

    let (status, body) = post_chat(&client, &base, json!({ "text": "hi" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "bad_request");

    assert_eq!(h.model.call_count(), 0);
}

#[tokio::test]
async fn chat_before_build_is_server_error() {
    let h = harness(capitals(), 50, 0);
    let base = start(&h).await;
    let client = reqwest::Client::new();

    let (status, body) = post_chat(&client, &base, json!({ "message": "Anyone there?" })).await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], "not_ready");
}

#[tokio::test]
async fn reprocess_rebuilds_and_reports() {
    let h = harness(capitals(), 50, 0);
    h.service.rebuild().await.unwrap();
    let base = start(&h).await;
    let client = reqwest::Client::new();

    h.source.set(rivers());
    let resp = client
        .post(format!("{}/api/reprocess", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert!(body["message"].as_str().unwrap().contains("2 documents"));
    let details = body["details"].as_str().unwrap();
    assert!(details.starts_with("build "));
    assert!(details.contains("2 documents, 2 chunks, digest "));
    assert_eq!(body["report"]["documents"], 2);
    assert_eq!(body["report"]["chunks"], 2);
    assert_eq!(
        details,
        format!(
            "build {}: 2 documents, 2 chunks, digest {}, {:.2}s",
            body["report"]["build_id"].as_str().unwrap(),
            body["report"]["digest"].as_str().unwrap(),
            body["report"]["elapsed_secs"].as_f64().unwrap()
        )
    );

    let (status, body) = post_chat(
        &client,
        &base,
        json!({ "message": "Which river flows through Egypt?" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["sources"][0]["source"], "rivers.pdf");
}

#[tokio::test]
async fn failed_reprocess_returns_error_and_keeps_serving() {
    let h = harness(capitals(), 50, 0);
    h.service.rebuild().await.unwrap();
    let base = start(&h).await;
    let client = reqwest::Client::new();

    h.source.set(Vec::new());
    let resp = client
        .post(format!("{}/api/reprocess", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "empty_corpus");

    let (status, body) = post_chat(
        &client,
        &base,
        json!({ "message": "What is the capital of Y?" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["response"], "B is the capital of Y.");
}

#[tokio::test]
async fn concurrent_reprocess_is_conflict() {
    let h = harness(capitals(), 50, 0);
    h.service.rebuild().await.unwrap();
    let base = start(&h).await;
    let client = reqwest::Client::new();

    h.source.close();
    let first = {
        let client = client.clone();
        let url = format!("{}/api/reprocess", base);
        tokio::spawn(async move { client.post(url).send().await.unwrap().status().as_u16() })
    };
    h.source.entered.notified().await;

    let resp = client
        .post(format!("{}/api/reprocess", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "build_in_progress");

    h.source.open();
    assert_eq!(first.await.unwrap(), 200);
}
