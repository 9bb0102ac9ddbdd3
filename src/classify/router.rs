//! Routing-service classification.

use std::time::Duration;

use tokio::time::Instant;

use crate::articles::Article;
use crate::metrics::{ClassificationResult, ResultSource, UNKNOWN_LABEL};
use crate::router::{RouterError, SemanticRouter};

#[derive(Debug, Clone, PartialEq)]
pub struct RouterClassification {
    /// Route name, or [`UNKNOWN_LABEL`] when nothing was within threshold.
    pub label: String,
    /// Aggregated distance of the matched route.
    pub distance: Option<f64>,
    pub elapsed: Duration,
}

impl RouterClassification {
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

/// Owns the router; appending references is the only way to change it.
pub struct RouterClassifier<R: SemanticRouter> {
    router: R,
}

impl<R: SemanticRouter> RouterClassifier<R> {
    pub fn new(router: R) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn into_inner(self) -> R {
        self.router
    }

    /// One routing call, timed. Errors are not retried.
    pub async fn classify(&self, text: &str) -> Result<RouterClassification, RouterError> {
        let start = Instant::now();
        let matched = self.router.route(text).await?;
        let elapsed = start.elapsed();

        Ok(match matched {
            Some(m) => RouterClassification {
                label: m.name,
                distance: Some(m.distance),
                elapsed,
            },
            None => RouterClassification {
                label: UNKNOWN_LABEL.to_string(),
                distance: None,
                elapsed,
            },
        })
    }

    pub async fn classify_article(
        &self,
        article: &Article,
    ) -> Result<ClassificationResult, RouterError> {
        let out = self.classify(&article.text).await?;
        let result = ClassificationResult::new(article, "router", out.label, ResultSource::Router)
            .elapsed(out.elapsed)
            .distance(out.distance);
        if !result.is_correct() {
            match out.distance {
                Some(d) => tracing::info!(article_id = %article.id, "incorrect distance: {d:.4}"),
                None => tracing::info!(article_id = %article.id, "incorrect distance: N/A"),
            }
        }
        Ok(result)
    }

    pub async fn classify_all(
        &self,
        articles: &[Article],
    ) -> Result<Vec<ClassificationResult>, RouterError> {
        let mut results = Vec::with_capacity(articles.len());
        for (idx, article) in articles.iter().enumerate() {
            if (idx + 1) % 10 == 0 {
                tracing::info!("processing article {}/{}", idx + 1, articles.len());
            }
            results.push(self.classify_article(article).await?);
        }
        Ok(results)
    }

    /// Store `text` as a new reference of route `category`.
    pub async fn add_reference(&mut self, category: &str, text: &str) -> Result<usize, RouterError> {
        self.router
            .add_route_references(category, &[text.to_string()])
            .await
    }
}
