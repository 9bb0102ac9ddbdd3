//! Direct LLM classification through the chat gateway.

use std::time::Duration;

use tokio::time::Instant;

use crate::articles::{normalize_label, Article, CategorySet};
use crate::gateway::{Attribution, ChatGateway, ChatRequest, ProviderError};
use crate::metrics::{ClassificationResult, ResultSource};
use crate::prompts::{PromptTemplate, DEFAULT_PROMPT};

/// Cap on a single synchronous call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Category names are one or two tokens.
pub const MAX_OUTPUT_TOKENS: u32 = 10;

/// Chat request for classifying `text`: zero temperature, short output.
///
/// Shared by the synchronous and bulk paths; callers add a timeout when they
/// need one.
pub fn classification_request(
    prompt: &PromptTemplate,
    categories: &CategorySet,
    text: &str,
    model: &str,
    attribution: Attribution,
) -> ChatRequest {
    ChatRequest::new(
        model,
        prompt.render(categories, text).to_messages(),
        attribution,
    )
    .temperature(0.0)
    .max_tokens(MAX_OUTPUT_TOKENS)
}

/// Prediction plus the usage it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmClassification {
    /// Trimmed, lower-cased model output.
    pub label: String,
    /// Wall time across every attempt, backoff included.
    pub elapsed: Duration,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_nanodollars: i64,
}

pub struct LlmClassifier<G: ChatGateway> {
    gateway: G,
    categories: CategorySet,
    prompt: PromptTemplate,
    timeout: Duration,
    attribution: Attribution,
}

impl<G: ChatGateway> LlmClassifier<G> {
    pub fn new(gateway: G, categories: CategorySet, attribution: Attribution) -> Self {
        Self {
            gateway,
            categories,
            prompt: DEFAULT_PROMPT,
            timeout: REQUEST_TIMEOUT,
            attribution,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    /// Classify one text. Transient failures are retried by the gateway; the
    /// error returned here is final for this article.
    pub async fn classify(&self, text: &str, model: &str) -> Result<LlmClassification, ProviderError> {
        let req = classification_request(
            &self.prompt,
            &self.categories,
            text,
            model,
            self.attribution.clone(),
        )
        .timeout(self.timeout);

        let start = Instant::now();
        let resp = self.gateway.chat(req).await?;
        let elapsed = start.elapsed();

        Ok(LlmClassification {
            label: normalize_label(&resp.content),
            elapsed,
            input_tokens: resp.input_tokens,
            output_tokens: resp.output_tokens,
            cost_nanodollars: resp.cost_nanodollars,
        })
    }

    /// Classify `article` and score it against its label.
    pub async fn classify_article(
        &self,
        article: &Article,
        model: &str,
    ) -> Result<ClassificationResult, ProviderError> {
        let out = self.classify(&article.text, model).await?;
        tracing::debug!(
            article_id = %article.id,
            model,
            predicted = %out.label,
            elapsed_ms = out.elapsed.as_millis() as u64,
            "llm classification"
        );
        Ok(ClassificationResult::new(article, model, out.label, ResultSource::Llm)
            .elapsed(out.elapsed)
            .usage(out.input_tokens, out.output_tokens, out.cost_nanodollars))
    }

    /// Classify every article in order with one model.
    pub async fn classify_all(
        &self,
        articles: &[Article],
        model: &str,
    ) -> Result<Vec<ClassificationResult>, ProviderError> {
        tracing::info!(model, articles = articles.len(), "testing model");
        let mut results = Vec::with_capacity(articles.len());
        for (idx, article) in articles.iter().enumerate() {
            if (idx + 1) % 10 == 0 {
                tracing::info!("progress: {}/{} articles processed", idx + 1, articles.len());
            }
            results.push(self.classify_article(article, model).await?);
        }
        tracing::info!(model, "completed {} articles", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChatResponse, FinishReason, Role};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: &'static str,
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatGateway for Canned {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.seen.lock().unwrap().push(req);
            Ok(ChatResponse {
                content: self.reply.to_string(),
                input_tokens: 150,
                output_tokens: 1,
                cost_nanodollars: 1_530_000,
                latency: Duration::from_millis(5),
                finish_reason: FinishReason::Stop,
            })
        }
    }

    fn classifier(reply: &'static str) -> LlmClassifier<Canned> {
        LlmClassifier::new(
            Canned {
                reply,
                seen: Mutex::new(Vec::new()),
            },
            CategorySet::bbc_news(),
            Attribution::new("test"),
        )
    }

    #[tokio::test]
    async fn label_is_trimmed_and_lowercased() {
        let c = classifier("  Sport\n");
        let out = c.classify("Match report", "gpt-4").await.unwrap();
        assert_eq!(out.label, "sport");
        assert_eq!(out.input_tokens, 150);
        assert_eq!(out.cost_nanodollars, 1_530_000);
    }

    #[tokio::test]
    async fn request_uses_fixed_parameters() {
        let c = classifier("tech");
        c.classify("Chip news", "gpt-4-turbo").await.unwrap();
        let seen = c.gateway.seen.lock().unwrap();
        let req = &seen[0];
        assert_eq!(req.model, "gpt-4-turbo");
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.max_tokens, Some(10));
        assert_eq!(req.timeout, Some(Duration::from_secs(3)));
        assert_eq!(req.messages[0].role, Role::System);
        assert!(req.messages[1].content.contains("Article: Chip news"));
    }

    #[tokio::test]
    async fn article_result_is_scored() {
        let c = classifier("business");
        let article = Article {
            id: "42".into(),
            text: "Shares".into(),
            true_category: "business".into(),
        };
        let result = c.classify_article(&article, "gpt-4").await.unwrap();
        assert!(result.is_correct());
        assert_eq!(result.strategy, "gpt-4");
        assert_eq!(result.source, ResultSource::Llm);
    }
}
