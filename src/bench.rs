//! Benchmark flows: configuration in, summaries out.
//!
//! Each flow reads its articles, builds the components it needs from the
//! handles it is given, runs them sequentially, and returns summaries for the
//! caller to print. Per-article results go to the optional result sink.

use std::sync::Arc;

use crate::articles::{
    read_articles, read_references, Article, ArticleError, CategorySet, LabelCase,
};
use crate::classify::{
    BatchClassifier, BatchError, BatchPoller, HybridError, HybridOrchestrator, LlmClassifier,
    RouterClassifier,
};
use crate::config::{BenchConfig, ConfigError, RouterSettings};
use crate::gateway::{Attribution, BatchProvider, ChatGateway, ProviderError};
use crate::metrics::{
    record_all, BatchRunSummary, ClassificationResult, HybridSummary, ResultSink, RunSummary,
    SweepRow, TraceError,
};
use crate::router::{
    build_routes, Embedder, Route, RouterError, RoutingConfig, SemanticRouter, VectorRouter,
};

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Articles(#[from] ArticleError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Hybrid(#[from] HybridError),
    #[error("result trace failed: {0}")]
    Trace(#[from] TraceError),
}

/// Shared inputs of every flow.
pub struct BenchContext<'a> {
    pub config: &'a BenchConfig,
    pub categories: CategorySet,
    pub attribution: Attribution,
    pub sink: Option<&'a dyn ResultSink>,
}

impl<'a> BenchContext<'a> {
    pub fn new(config: &'a BenchConfig, attribution: Attribution) -> Self {
        Self {
            config,
            categories: CategorySet::bbc_news(),
            attribution,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn ResultSink) -> Self {
        self.sink = Some(sink);
        self
    }

    fn attributed(&self, caller: &'static str) -> Attribution {
        Attribution {
            caller,
            ..self.attribution.clone()
        }
    }

    fn trace<'r>(
        &self,
        run: &'static str,
        results: impl IntoIterator<Item = &'r ClassificationResult>,
    ) -> Result<(), BenchError> {
        if let Some(sink) = self.sink {
            record_all(sink, run, self.attribution.run_id, results)?;
        }
        Ok(())
    }

    fn test_articles(&self, limit: usize, case: LabelCase) -> Result<Vec<Article>, BenchError> {
        tracing::info!(
            path = %self.config.test_csv.display(),
            "reading {limit} test articles"
        );
        let articles = read_articles(&self.config.test_csv, limit, case)?;
        tracing::info!("loaded {} test articles", articles.len());
        Ok(articles)
    }

    fn routes(&self, settings: &RouterSettings) -> Result<Vec<Route>, BenchError> {
        tracing::info!(
            path = %self.config.reference_csv.display(),
            "reading up to {} reference articles per category",
            settings.references_per_category
        );
        let references = read_references(
            &self.config.reference_csv,
            &self.categories,
            settings.references_per_category,
        )?;
        tracing::info!(
            "loaded {} reference articles across {} categories",
            references.total(),
            self.categories.len()
        );
        for (category, texts) in references.iter() {
            tracing::info!("  - {category}: {} references", texts.len());
        }
        Ok(build_routes(&references, settings.distance_threshold))
    }
}

// =============================================================================
// LLM BASELINES
// =============================================================================

/// Synchronous baseline: every configured model over the same articles.
pub async fn run_baseline<G: ChatGateway>(
    ctx: &BenchContext<'_>,
    gateway: G,
) -> Result<Vec<RunSummary>, BenchError> {
    let articles = ctx.test_articles(ctx.config.baseline_articles, LabelCase::Verbatim)?;
    let classifier = LlmClassifier::new(
        gateway,
        ctx.categories.clone(),
        ctx.attributed("bench::baseline"),
    );

    let mut summaries = Vec::with_capacity(ctx.config.models.len());
    for model in &ctx.config.models {
        let results = classifier.classify_all(&articles, model).await?;
        ctx.trace("baseline", &results)?;
        summaries.push(RunSummary::from_results(model.as_str(), &results));
    }
    Ok(summaries)
}

/// Bulk comparison outcome; failed models are listed apart from the table.
#[derive(Debug, Clone, Default)]
pub struct BatchComparison {
    pub completed: Vec<BatchRunSummary>,
    /// Model and reason.
    pub failed: Vec<(String, String)>,
}

/// Batch baseline: one bulk job per configured model.
///
/// A job that ends in a non-completed status or outlives the poll timeout
/// marks only that model as failed. Transport and file errors abort the run.
pub async fn run_baseline_batch<B: BatchProvider>(
    ctx: &BenchContext<'_>,
    provider: B,
) -> Result<BatchComparison, BenchError> {
    let articles = ctx.test_articles(ctx.config.baseline_articles, LabelCase::Verbatim)?;
    let classifier = BatchClassifier::new(
        provider,
        ctx.categories.clone(),
        ctx.config.batch_dir.clone(),
        ctx.attributed("bench::batch"),
    )
    .with_poller(BatchPoller::new(
        ctx.config.batch_poll_interval,
        ctx.config.batch_timeout,
    ));

    let mut comparison = BatchComparison::default();
    for model in &ctx.config.models {
        match classifier.classify_all(&articles, model).await {
            Ok(run) => {
                ctx.trace("batch", &run.results)?;
                comparison.completed.push(BatchRunSummary::from_results(
                    run.model,
                    run.batch_id,
                    run.wall_time,
                    &run.results,
                ));
            }
            Err(err @ (BatchError::NotCompleted { .. } | BatchError::TimedOut { .. })) => {
                tracing::warn!(model = %model, "batch job failed: {err}");
                comparison.failed.push((model.clone(), err.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(comparison)
}

// =============================================================================
// ROUTER / HYBRID
// =============================================================================

/// Router only: every test article through the routing service.
pub async fn run_router<E: Embedder>(
    ctx: &BenchContext<'_>,
    embedder: E,
) -> Result<RunSummary, BenchError> {
    let settings = &ctx.config.router;
    let routes = ctx.routes(settings)?;
    let router =
        VectorRouter::new(embedder, routes, RoutingConfig::new(settings.aggregation)).await?;
    let classifier = RouterClassifier::new(router);

    let articles = ctx.test_articles(settings.articles, LabelCase::Lowercase)?;
    let results = classifier.classify_all(&articles).await?;
    ctx.trace("router", &results)?;
    Ok(RunSummary::from_results("router", &results))
}

/// Hybrid: router first, LLM fallback that feeds new references back.
pub async fn run_hybrid<E: Embedder, G: ChatGateway>(
    ctx: &BenchContext<'_>,
    embedder: E,
    gateway: G,
) -> Result<HybridSummary, BenchError> {
    let settings = &ctx.config.hybrid;
    let routes = ctx.routes(settings)?;
    let mut router = VectorRouter::new(embedder, routes, RoutingConfig::default()).await?;
    router.update_routing_config(RoutingConfig::new(settings.aggregation));

    run_hybrid_with(ctx, router, gateway).await
}

/// Hybrid flow over an already-built router.
pub async fn run_hybrid_with<R: SemanticRouter, G: ChatGateway>(
    ctx: &BenchContext<'_>,
    router: R,
    gateway: G,
) -> Result<HybridSummary, BenchError> {
    let llm = LlmClassifier::new(
        gateway,
        ctx.categories.clone(),
        ctx.attributed("bench::hybrid"),
    );
    let mut orchestrator = HybridOrchestrator::new(
        RouterClassifier::new(router),
        llm,
        ctx.config.hybrid_model.as_str(),
    );

    let articles = ctx.test_articles(ctx.config.hybrid.articles, LabelCase::Lowercase)?;
    let outcomes = orchestrator.run(&articles).await?;
    ctx.trace("hybrid", outcomes.iter().map(|o| &o.result))?;
    Ok(orchestrator.summarize(&outcomes))
}

// =============================================================================
// THRESHOLD SWEEP
// =============================================================================

pub const SWEEP_ROUTE: &str = "technology";

pub const SWEEP_REFERENCES: [&str; 3] = [
    "artificial intelligence and machine learning",
    "latest smartphone releases",
    "cloud computing trends",
];

pub const SWEEP_QUERIES: [(&str, &str); 4] = [
    ("AI is transforming industries", "Very close to tech"),
    ("New iPhone announced today", "Close to tech"),
    ("Football match results", "Far from tech"),
    ("Cooking recipes for dinner", "Very far from tech"),
];

pub const SWEEP_THRESHOLDS: [f64; 6] = [0.5, 0.6, 0.7, 0.8, 0.9, 0.99];

/// Probe one route at each threshold with a fresh router per threshold.
pub async fn run_sweep<E: Embedder>(embedder: Arc<E>) -> Result<Vec<SweepRow>, BenchError> {
    let references: Vec<String> = SWEEP_REFERENCES.iter().map(|r| r.to_string()).collect();
    let mut rows = Vec::with_capacity(SWEEP_THRESHOLDS.len() * SWEEP_QUERIES.len());

    for threshold in SWEEP_THRESHOLDS {
        let route = Route::new(SWEEP_ROUTE, references.clone(), threshold);
        let router =
            VectorRouter::new(Arc::clone(&embedder), vec![route], RoutingConfig::default())
                .await?;
        for (query, description) in SWEEP_QUERIES {
            let matched = router.route(query).await?;
            rows.push(SweepRow {
                threshold,
                query: query.to_string(),
                description: description.to_string(),
                matched: matched.map(|m| m.distance),
            });
        }
    }
    Ok(rows)
}
