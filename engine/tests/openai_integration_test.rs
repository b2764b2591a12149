//! Integration tests for the OpenAI-compatible client
//!
//! Uses wiremock to stand in for the chat completions endpoint.

use docia_engine::llm::OpenAICompatibleClient;
use sdk::{CompletionRequest, ImageHandle, ModelClient, ProviderErrorKind};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn completion_body(content: &str, usage: serde_json::Value) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": usage
    })
}

fn client(server: &MockServer) -> OpenAICompatibleClient {
    OpenAICompatibleClient::new("test", server.uri(), "sk-test", "planner-model")
        .with_vision_model("vision-model")
        .with_pricing(1.0, 2.0)
}

#[tokio::test]
async fn test_text_completion_with_token_pricing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "planner-model",
            "max_tokens": 256,
            "temperature": 0.3
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "  {\"tasks\": []}  ",
            json!({ "prompt_tokens": 500, "completion_tokens": 250 }),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client(&server)
        .complete(
            &CompletionRequest::text("plan this")
                .with_max_tokens(256)
                .with_temperature(0.3),
        )
        .await
        .unwrap();

    assert_eq!(completion.text, "{\"tasks\": []}");
    // 0.5k * 1.0 + 0.25k * 2.0
    assert!((completion.cost - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_images_use_vision_model_and_reported_cost() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "vision-model",
            "usage": { "include": true }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "Revenue was 10M",
            json!({ "prompt_tokens": 1000, "completion_tokens": 10, "cost": 0.0042 }),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let request = CompletionRequest::text("read the table").with_images(vec![
        ImageHandle::bytes("image/png", vec![1, 2, 3]),
        ImageHandle::Url("https://cdn.example.com/p2.png".to_string()),
    ]);
    let completion = client(&server)
        .with_usage_cost(true)
        .complete(&request)
        .await
        .unwrap();

    assert_eq!(completion.text, "Revenue was 10M");
    assert!((completion.cost - 0.0042).abs() < 1e-12);

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let content = &body["messages"][0]["content"];
    assert_eq!(content[0]["text"], "read the table");
    assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AQID");
    assert_eq!(content[2]["image_url"]["url"], "https://cdn.example.com/p2.png");
}

#[tokio::test]
async fn test_path_images_are_inlined() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body("ok", json!({}))),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let page = dir.path().join("page-1.jpg");
    std::fs::write(&page, [0xff, 0xd8, 0xff]).unwrap();

    client(&server)
        .complete(&CompletionRequest::text("look").with_images(vec![ImageHandle::Path(page)]))
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(
        body["messages"][0]["content"][1]["image_url"]["url"],
        "data:image/jpeg;base64,/9j/"
    );
}

#[tokio::test]
async fn test_status_mapping() {
    let cases = [
        (429, ProviderErrorKind::Transient),
        (500, ProviderErrorKind::Transient),
        (503, ProviderErrorKind::Transient),
        (408, ProviderErrorKind::Transient),
        (400, ProviderErrorKind::Permanent),
        (401, ProviderErrorKind::Permanent),
        (403, ProviderErrorKind::Permanent),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = client(&server)
            .complete(&CompletionRequest::text("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, expected, "status {}", status);
        assert!(err.message.contains(&status.to_string()));
    }
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = OpenAICompatibleClient::new("test", uri, "sk-test", "m");
    let err = client
        .complete(&CompletionRequest::text("hi"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_missing_content_is_empty_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let completion = client(&server)
        .complete(&CompletionRequest::text("hi"))
        .await
        .unwrap();
    assert_eq!(completion.text, "");
    assert_eq!(completion.cost, 0.0);
}
