use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use newsroute_harness::articles::{Article, CategorySet};
use newsroute_harness::classify::{HybridOrchestrator, HybridStage, LlmClassifier, RouterClassifier};
use newsroute_harness::gateway::{
    Attribution, ChatGateway, ChatRequest, ChatResponse, FinishReason, ProviderError,
};
use newsroute_harness::metrics::{ResultSource, OFF_LIST_LABEL};
use newsroute_harness::router::{
    AggregationMethod, Embedder, Route, RouteMatch, RouterError, RoutingConfig, SemanticRouter,
    VectorRouter,
};

// =============================================================================
// FAKES
// =============================================================================

/// Answers every request with the same label and counts calls.
struct FixedAnswer {
    label: &'static str,
    calls: AtomicUsize,
}

impl FixedAnswer {
    fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatGateway for FixedAnswer {
    async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatResponse {
            content: format!(" {}\n", self.label),
            input_tokens: 120,
            output_tokens: 1,
            cost_nanodollars: 1_230_000,
            latency: Duration::from_millis(400),
            finish_reason: FinishReason::Stop,
        })
    }
}

type Appends = Arc<Mutex<Vec<(String, String)>>>;

/// Routes by exact text and records every append.
struct ScriptedRouter {
    answers: HashMap<String, RouteMatch>,
    appends: Appends,
    reject_appends: bool,
}

impl ScriptedRouter {
    fn new(hits: &[(&str, &str, f64)]) -> (Self, Appends) {
        let appends = Appends::default();
        let router = Self {
            answers: hits
                .iter()
                .map(|(text, name, distance)| {
                    (
                        text.to_string(),
                        RouteMatch {
                            name: name.to_string(),
                            distance: *distance,
                        },
                    )
                })
                .collect(),
            appends: Arc::clone(&appends),
            reject_appends: false,
        };
        (router, appends)
    }

    fn rejecting_appends(mut self) -> Self {
        self.reject_appends = true;
        self
    }
}

#[async_trait]
impl SemanticRouter for ScriptedRouter {
    async fn route(&self, text: &str) -> Result<Option<RouteMatch>, RouterError> {
        Ok(self.answers.get(text).cloned())
    }

    async fn add_route_references(
        &mut self,
        route_name: &str,
        references: &[String],
    ) -> Result<usize, RouterError> {
        if self.reject_appends {
            return Err(RouterError::UnknownRoute(route_name.to_string()));
        }
        let mut appends = self.appends.lock().unwrap();
        for text in references {
            appends.push((route_name.to_string(), text.clone()));
        }
        Ok(references.len())
    }
}

fn article(id: &str, text: &str, category: &str) -> Article {
    Article {
        id: id.to_string(),
        text: text.to_string(),
        true_category: category.to_string(),
    }
}

fn orchestrator<R: SemanticRouter>(
    router: R,
    gateway: Arc<FixedAnswer>,
) -> HybridOrchestrator<R, Arc<FixedAnswer>> {
    HybridOrchestrator::new(
        RouterClassifier::new(router),
        LlmClassifier::new(gateway, CategorySet::bbc_news(), Attribution::new("test")),
        "gpt-4-turbo",
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn confident_router_never_calls_the_llm() {
    let (router, appends) = ScriptedRouter::new(&[
        ("markets rally", "business", 0.21),
        ("new console", "tech", 0.30),
        ("cup final", "sport", 0.12),
    ]);
    let gateway = FixedAnswer::new("politics");
    let mut hybrid = orchestrator(router, Arc::clone(&gateway));

    let articles = [
        article("1", "markets rally", "business"),
        article("2", "new console", "tech"),
        article("3", "cup final", "sport"),
    ];
    let outcomes = hybrid.run(&articles).await.unwrap();
    let summary = hybrid.summarize(&outcomes);

    assert_eq!(gateway.calls(), 0);
    assert!(appends.lock().unwrap().is_empty());
    assert!(outcomes.iter().all(|o| o.stage == HybridStage::RouterHit));
    assert!(outcomes.iter().all(|o| o.llm_elapsed.is_none()));
    assert_eq!(outcomes[2].result.distance, Some(0.12));

    assert_eq!(summary.router_hits, 3);
    assert_eq!(summary.fallbacks, 0);
    assert_eq!(summary.references_added, 0);
    assert_eq!(summary.run.accuracy(), 100.0);
    assert_eq!(summary.run.cost_nanodollars, 0);
    assert_eq!(summary.router_rate(), 100.0);
    assert!(summary.llm_latency.is_none());
}

#[tokio::test]
async fn router_miss_falls_back_and_teaches_the_router() {
    let (router, appends) = ScriptedRouter::new(&[("markets rally", "business", 0.2)]);
    let gateway = FixedAnswer::new("Tech");
    let mut hybrid = orchestrator(router, Arc::clone(&gateway));

    let articles = [
        article("1", "markets rally", "business"),
        article("2", "chip shortage hits laptops", "tech"),
    ];
    let outcomes = hybrid.run(&articles).await.unwrap();

    assert_eq!(gateway.calls(), 1);
    assert_eq!(outcomes[1].stage, HybridStage::Fallback);
    assert_eq!(outcomes[1].result.predicted(), "tech");
    assert_eq!(outcomes[1].result.source, ResultSource::Fallback);
    assert!(outcomes[1].result.is_correct());
    assert_eq!(outcomes[1].result.cost_nanodollars, 1_230_000);
    assert!(outcomes[1].llm_elapsed.is_some());

    assert_eq!(
        *appends.lock().unwrap(),
        [("tech".to_string(), "chip shortage hits laptops".to_string())]
    );

    let counters = hybrid.counters();
    assert_eq!(counters.router_hits, 1);
    assert_eq!(counters.fallbacks, 1);
    assert_eq!(counters.references_added, 1);
    assert_eq!(counters.input_tokens, 120);

    let summary = hybrid.summarize(&outcomes);
    assert_eq!(summary.run.accuracy(), 100.0);
    assert_eq!(summary.fallback_rate(), 50.0);
    assert_eq!(summary.run.cost_nanodollars, 1_230_000);
    assert!(summary.llm_latency.is_some());
}

#[tokio::test]
async fn failed_append_does_not_fail_the_article() {
    let (router, _appends) = ScriptedRouter::new(&[]);
    let gateway = FixedAnswer::new("sport");
    let mut hybrid = orchestrator(router.rejecting_appends(), Arc::clone(&gateway));

    let outcome = hybrid
        .classify(&article("1", "late winner", "sport"))
        .await
        .unwrap();

    assert_eq!(outcome.stage, HybridStage::Fallback);
    assert!(outcome.result.is_correct());
    assert_eq!(hybrid.counters().fallbacks, 1);
    assert_eq!(hybrid.counters().references_added, 0);
}

#[tokio::test]
async fn label_outside_the_category_set_is_not_added() {
    let (router, appends) = ScriptedRouter::new(&[]);
    let gateway = FixedAnswer::new("weather");
    let mut hybrid = orchestrator(router, Arc::clone(&gateway));

    let outcome = hybrid
        .classify(&article("1", "storms expected", "politics"))
        .await
        .unwrap();

    assert_eq!(outcome.result.predicted(), OFF_LIST_LABEL);
    assert!(!outcome.result.is_correct());
    assert!(appends.lock().unwrap().is_empty());
    assert_eq!(hybrid.counters().references_added, 0);
}

#[tokio::test]
async fn llm_answering_unknown_never_reaches_the_hybrid_result() {
    let (router, appends) = ScriptedRouter::new(&[("markets rally", "business", 0.2)]);
    let gateway = FixedAnswer::new("Unknown");
    let mut hybrid = orchestrator(router, Arc::clone(&gateway));

    let articles = [
        article("1", "markets rally", "business"),
        article("2", "a puzzling story", "entertainment"),
    ];
    let outcomes = hybrid.run(&articles).await.unwrap();
    let summary = hybrid.summarize(&outcomes);

    assert_eq!(outcomes[1].stage, HybridStage::Fallback);
    assert_eq!(outcomes[1].result.predicted(), OFF_LIST_LABEL);
    assert!(outcomes.iter().all(|o| !o.result.is_unknown()));
    assert!(appends.lock().unwrap().is_empty());
    assert_eq!(summary.run.unknown, 0);
    assert_eq!(summary.run.correct, 1);
}

// =============================================================================
// WITH THE VECTOR ROUTER
// =============================================================================

struct TableEmbedder(HashMap<&'static str, Vec<f32>>);

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RouterError> {
        Ok(texts
            .iter()
            .map(|t| self.0.get(t.as_str()).cloned().unwrap_or_else(|| vec![0.0, 0.0]))
            .collect())
    }
}

#[tokio::test]
async fn fallback_reference_lets_the_router_answer_next_time() {
    let embedder = TableEmbedder(HashMap::from([
        ("markets", vec![1.0, 0.0]),
        ("gadgets", vec![0.0, 1.0]),
        ("smart fridge startup", vec![0.7071, 0.7071]),
    ]));
    let routes = vec![
        Route::new("business", vec!["markets".to_string()], 0.2),
        Route::new("tech", vec!["gadgets".to_string()], 0.2),
    ];
    let router = VectorRouter::new(embedder, routes, RoutingConfig::new(AggregationMethod::Min))
        .await
        .unwrap();

    let gateway = FixedAnswer::new("tech");
    let mut hybrid = orchestrator(router, Arc::clone(&gateway));

    let articles = [
        article("1", "smart fridge startup", "tech"),
        article("2", "smart fridge startup", "tech"),
    ];
    let outcomes = hybrid.run(&articles).await.unwrap();

    assert_eq!(outcomes[0].stage, HybridStage::Fallback);
    assert_eq!(outcomes[1].stage, HybridStage::RouterHit);
    assert_eq!(outcomes[1].result.predicted(), "tech");
    assert!(outcomes[1].result.distance.unwrap() < 1e-6);
    assert_eq!(gateway.calls(), 1);
    assert_eq!(hybrid.router().router().reference_count("tech"), Some(2));
}
