//! Router first, LLM on a miss, and the LLM's answer fed back as a reference.
//!
//! Per article the orchestrator ends in one of two stages:
//!
//! - [`HybridStage::RouterHit`]: the router matched a route; that route is the
//!   prediction and no LLM call is made.
//! - [`HybridStage::Fallback`]: the router returned no match; exactly one LLM
//!   classification follows and its label is the prediction. When the label is
//!   a known category the article text is appended to that route. A failed
//!   append is logged and otherwise ignored. Any other answer, including a
//!   literal "unknown", is reported as [`OFF_LIST_LABEL`].

use std::time::Duration;

use crate::articles::Article;
use crate::gateway::{ChatGateway, ProviderError};
use crate::metrics::{
    ClassificationResult, HybridSummary, ResultSource, RunSummary, OFF_LIST_LABEL,
};
use crate::router::{RouterError, SemanticRouter};

use super::llm::LlmClassifier;
use super::router::RouterClassifier;

/// Strategy name carried on hybrid results.
pub const HYBRID_STRATEGY: &str = "hybrid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridStage {
    RouterHit,
    Fallback,
}

/// Running totals over every article seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HybridCounters {
    pub router_hits: usize,
    pub fallbacks: usize,
    pub references_added: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_nanodollars: i64,
}

/// One article's hybrid outcome with its stage timings.
#[derive(Debug, Clone)]
pub struct HybridOutcome {
    pub result: ClassificationResult,
    pub stage: HybridStage,
    pub router_elapsed: Duration,
    /// Set only on fallback.
    pub llm_elapsed: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum HybridError {
    #[error("router failed: {0}")]
    Router(#[from] RouterError),
    #[error("llm fallback failed: {0}")]
    Llm(#[from] ProviderError),
}

pub struct HybridOrchestrator<R: SemanticRouter, G: ChatGateway> {
    router: RouterClassifier<R>,
    llm: LlmClassifier<G>,
    model: String,
    counters: HybridCounters,
}

impl<R: SemanticRouter, G: ChatGateway> HybridOrchestrator<R, G> {
    /// `model` is the LLM used for every fallback.
    pub fn new(router: RouterClassifier<R>, llm: LlmClassifier<G>, model: impl Into<String>) -> Self {
        Self {
            router,
            llm,
            model: model.into(),
            counters: HybridCounters::default(),
        }
    }

    pub fn counters(&self) -> HybridCounters {
        self.counters
    }

    pub fn router(&self) -> &RouterClassifier<R> {
        &self.router
    }

    pub async fn classify(&mut self, article: &Article) -> Result<HybridOutcome, HybridError> {
        let routed = self.router.classify(&article.text).await?;
        tracing::debug!(
            article_id = %article.id,
            label = %routed.label,
            distance = ?routed.distance,
            "router decision"
        );

        if !routed.is_unknown() {
            self.counters.router_hits += 1;
            let result = ClassificationResult::new(
                article,
                HYBRID_STRATEGY,
                routed.label,
                ResultSource::Router,
            )
            .elapsed(routed.elapsed)
            .distance(routed.distance);
            return Ok(HybridOutcome {
                result,
                stage: HybridStage::RouterHit,
                router_elapsed: routed.elapsed,
                llm_elapsed: None,
            });
        }

        self.counters.fallbacks += 1;
        let answer = self.llm.classify(&article.text, &self.model).await?;
        self.counters.input_tokens += answer.input_tokens as u64;
        self.counters.output_tokens += answer.output_tokens as u64;
        self.counters.cost_nanodollars += answer.cost_nanodollars;

        let label = if self.llm.categories().contains(&answer.label) {
            match self.router.add_reference(&answer.label, &article.text).await {
                Ok(added) => self.counters.references_added += added,
                Err(err) => tracing::warn!(
                    article_id = %article.id,
                    category = %answer.label,
                    "failed to add reference to router: {err}"
                ),
            }
            answer.label
        } else {
            tracing::warn!(
                article_id = %article.id,
                label = %answer.label,
                "fallback label is not a known category, reported as {OFF_LIST_LABEL}"
            );
            OFF_LIST_LABEL.to_string()
        };

        let result = ClassificationResult::new(
            article,
            HYBRID_STRATEGY,
            label,
            ResultSource::Fallback,
        )
        .elapsed(routed.elapsed + answer.elapsed)
        .usage(answer.input_tokens, answer.output_tokens, answer.cost_nanodollars);

        Ok(HybridOutcome {
            result,
            stage: HybridStage::Fallback,
            router_elapsed: routed.elapsed,
            llm_elapsed: Some(answer.elapsed),
        })
    }

    /// Classify every article in order. Any router or LLM error aborts the run.
    pub async fn run(&mut self, articles: &[Article]) -> Result<Vec<HybridOutcome>, HybridError> {
        let mut outcomes = Vec::with_capacity(articles.len());
        for (idx, article) in articles.iter().enumerate() {
            if (idx + 1) % 10 == 0 {
                tracing::info!("processing article {}/{}", idx + 1, articles.len());
            }
            outcomes.push(self.classify(article).await?);
        }
        Ok(outcomes)
    }

    /// Summary of `outcomes` with this orchestrator's counters.
    pub fn summarize(&self, outcomes: &[HybridOutcome]) -> HybridSummary {
        let results: Vec<ClassificationResult> =
            outcomes.iter().map(|o| o.result.clone()).collect();
        let router_times: Vec<Duration> = outcomes.iter().map(|o| o.router_elapsed).collect();
        let llm_times: Vec<Duration> = outcomes.iter().filter_map(|o| o.llm_elapsed).collect();

        HybridSummary::new(
            RunSummary::from_results(HYBRID_STRATEGY, &results),
            self.counters.router_hits,
            self.counters.fallbacks,
            self.counters.references_added,
            &router_times,
            &llm_times,
        )
    }
}
