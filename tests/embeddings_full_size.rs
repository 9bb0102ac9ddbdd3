use std::sync::Arc;
use std::time::Duration;

use newsroute_harness::gateway::{
    Attribution, EmbedRequest, EmbeddingProvider, NoopUsageSink, OpenAiAdapter, PriceTable,
};
use newsroute_harness::router::{
    AggregationMethod, Embedder, GatewayEmbedder, Route, RoutingConfig, SemanticRouter,
    VectorRouter, DEFAULT_CHUNK_SIZE,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DIMENSIONS: usize = 1536;

/// Answers with `text-embedding-3-small` sized vectors. Texts mentioning
/// "shares" or "goal" get a distinct hot dimension; the rest is low noise.
struct FullSizeEmbeddings;

fn full_size_vector(text: &str) -> Vec<f64> {
    let hot = if text.contains("shares") {
        Some(0)
    } else if text.contains("goal") {
        Some(1)
    } else {
        None
    };
    (0..DIMENSIONS)
        .map(|j| {
            let noise = ((j % 97) as f64 - 48.0) * 0.000_123_456_7;
            if Some(j) == hot {
                noise + 1.0
            } else {
                noise
            }
        })
        .collect()
}

impl Respond for FullSizeEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let inputs = body["input"].as_array().unwrap();
        let data: Vec<serde_json::Value> = inputs
            .iter()
            .enumerate()
            .map(|(index, text)| {
                json!({
                    "object": "embedding",
                    "embedding": full_size_vector(text.as_str().unwrap()),
                    "index": index
                })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": data,
            "model": "text-embedding-3-small",
            "usage": { "prompt_tokens": inputs.len() * 8, "total_tokens": inputs.len() * 8 }
        }))
    }
}

async fn embeddings_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(FullSizeEmbeddings)
        .mount(&server)
        .await;
    server
}

fn adapter(server: &MockServer) -> OpenAiAdapter {
    OpenAiAdapter::with_config(
        "sk-test",
        server.uri(),
        Duration::from_secs(30),
        PriceTable::openai_sync(),
    )
    .unwrap()
}

fn texts(topic: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{topic} report number {i}")).collect()
}

#[tokio::test]
async fn multi_megabyte_embeddings_response_is_accepted() {
    let server = embeddings_server().await;

    let req = EmbedRequest::new(
        "text-embedding-3-small",
        texts("shares", 150),
        Attribution::new("test"),
    );
    let resp = adapter(&server).embed(&req).await.unwrap();

    assert_eq!(resp.embeddings.len(), 150);
    assert!(resp.embeddings.iter().all(|v| v.len() == DIMENSIONS));
    assert_eq!(resp.tokens, 1_200);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn gateway_embedder_chunks_a_full_reference_set() {
    let server = embeddings_server().await;
    let embedder = GatewayEmbedder::new(
        adapter(&server),
        "text-embedding-3-small",
        Arc::new(NoopUsageSink),
        Attribution::new("test"),
    );

    let vectors = embedder.embed(&texts("goal", 300)).await.unwrap();

    assert_eq!(vectors.len(), 300);
    assert!(vectors.iter().all(|v| v.len() == DIMENSIONS));
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 300_usize.div_ceil(DEFAULT_CHUNK_SIZE));
}

#[tokio::test]
async fn router_builds_from_150_references_per_category() {
    let server = embeddings_server().await;
    let embedder = GatewayEmbedder::new(
        adapter(&server),
        "text-embedding-3-small",
        Arc::new(NoopUsageSink),
        Attribution::new("test"),
    );

    let routes = vec![
        Route::new("business", texts("shares", 150), 0.5),
        Route::new("sport", texts("goal", 150), 0.5),
    ];
    let router = VectorRouter::new(embedder, routes, RoutingConfig::new(AggregationMethod::Avg))
        .await
        .unwrap();

    assert_eq!(router.reference_count("business"), Some(150));
    assert_eq!(router.reference_count("sport"), Some(150));

    let hit = router.route("bank shares tumble").await.unwrap().unwrap();
    assert_eq!(hit.name, "business");
    let hit = router.route("a late goal").await.unwrap().unwrap();
    assert_eq!(hit.name, "sport");
}
