use std::sync::Arc;
use std::time::Duration;

use newsroute_harness::gateway::{
    Attribution, ChatGateway, ChatProvider, ChatRequest, EmbedRequest, EmbeddingProvider,
    FinishReason, Message, NoopUsageSink, OpenAiAdapter, PriceTable, ProviderError,
    ProviderGateway, RetryPolicy,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer, timeout: Duration) -> OpenAiAdapter {
    OpenAiAdapter::with_config("sk-test", server.uri(), timeout, PriceTable::openai_sync()).unwrap()
}

fn request(model: &str) -> ChatRequest {
    ChatRequest::new(
        model,
        vec![Message::user("Classify this")],
        Attribution::new("test"),
    )
    .max_tokens(10)
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 100, "completion_tokens": 2 }
    })
}

#[tokio::test]
async fn chat_parses_content_usage_and_cost() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4-turbo",
            "temperature": 0.0,
            "max_tokens": 10
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(" Sport\n")))
        .expect(1)
        .mount(&server)
        .await;

    let resp = adapter(&server, Duration::from_secs(5))
        .chat(&request("gpt-4-turbo"))
        .await
        .unwrap();

    assert_eq!(resp.content, " Sport\n");
    assert_eq!(resp.finish_reason, FinishReason::Stop);
    assert_eq!(resp.input_tokens, 100);
    assert_eq!(resp.output_tokens, 2);
    // $10 / 1M input, $30 / 1M output
    assert_eq!(resp.cost_nanodollars, 100 * 10_000 + 2 * 30_000);
}

#[tokio::test]
async fn unpriced_model_costs_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("tech")))
        .mount(&server)
        .await;

    let resp = adapter(&server, Duration::from_secs(5))
        .chat(&request("some-local-model"))
        .await
        .unwrap();
    assert_eq!(resp.content, "tech");
    assert_eq!(resp.cost_nanodollars, 0);
}

#[tokio::test]
async fn status_429_is_rate_limited_with_request_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-request-id", "req_123")
                .set_body_json(json!({
                    "error": {
                        "message": "Rate limit reached for gpt-4",
                        "type": "requests",
                        "code": "rate_limit_exceeded"
                    }
                })),
        )
        .mount(&server)
        .await;

    let err = adapter(&server, Duration::from_secs(5))
        .chat(&request("gpt-4"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited { .. }));
    assert!(err.is_transient());
    assert_eq!(err.request_id(), Some("req_123"));
    assert_eq!(
        err.context().and_then(|c| c.provider_code.as_deref()),
        Some("rate_limit_exceeded")
    );
}

#[tokio::test]
async fn rate_limit_code_on_other_status_is_still_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "slow down", "code": "rate_limit_exceeded" }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server, Duration::from_secs(5))
        .chat(&request("gpt-4"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited { .. }));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("tech"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let req = request("gpt-4").timeout(Duration::from_millis(50));
    let err = adapter(&server, Duration::from_secs(5))
        .chat(&req)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Timeout(_, _)), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn server_error_is_fatal_and_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = ProviderGateway::with_policy(
        adapter(&server, Duration::from_secs(5)),
        Arc::new(NoopUsageSink),
        RetryPolicy {
            max_attempts: 5,
            backoff_step: Duration::ZERO,
        },
    );

    let err = gateway.chat(request("gpt-4")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Provider { .. }), "got {err:?}");
    assert!(!err.is_transient());
    assert_eq!(err.context().and_then(|c| c.http_status), Some(500));
}

#[tokio::test]
async fn gateway_gives_up_after_five_rate_limited_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "busy", "code": "rate_limit_exceeded" }
        })))
        .expect(5)
        .mount(&server)
        .await;

    let gateway = ProviderGateway::with_policy(
        adapter(&server, Duration::from_secs(5)),
        Arc::new(NoopUsageSink),
        RetryPolicy {
            max_attempts: 5,
            backoff_step: Duration::ZERO,
        },
    );

    let err = gateway.chat(request("gpt-4")).await.unwrap_err();
    match err {
        ProviderError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 5);
            assert!(matches!(*last, ProviderError::RateLimited { .. }));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn gateway_recovers_after_a_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("politics")))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = ProviderGateway::with_policy(
        adapter(&server, Duration::from_secs(5)),
        Arc::new(NoopUsageSink),
        RetryPolicy {
            max_attempts: 5,
            backoff_step: Duration::ZERO,
        },
    );

    let outcome = gateway.chat_with_retry(&request("gpt-4")).await;
    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.into_result().unwrap().content, "politics");
}

#[tokio::test]
async fn embeddings_come_back_in_input_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": ["first", "second"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "embedding": [0.0, 1.0], "index": 1 },
                { "embedding": [1.0, 0.0], "index": 0 }
            ],
            "usage": { "prompt_tokens": 4 }
        })))
        .mount(&server)
        .await;

    let req = EmbedRequest::new(
        "text-embedding-3-small",
        vec!["first".to_string(), "second".to_string()],
        Attribution::new("test"),
    );
    let resp = adapter(&server, Duration::from_secs(5))
        .embed(&req)
        .await
        .unwrap();

    assert_eq!(resp.embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    assert_eq!(resp.tokens, 4);
    assert_eq!(resp.cost_nanodollars, 4 * 20);
}

#[tokio::test]
async fn embedding_count_mismatch_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [1.0], "index": 0 }],
            "usage": { "prompt_tokens": 1 }
        })))
        .mount(&server)
        .await;

    let req = EmbedRequest::new(
        "text-embedding-3-small",
        vec!["a".to_string(), "b".to_string()],
        Attribution::new("test"),
    );
    let err = adapter(&server, Duration::from_secs(5))
        .embed(&req)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Provider { .. }));
}
