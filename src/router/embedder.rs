//! Text-to-vector seam used by the vector router.

use std::sync::Arc;

use async_trait::async_trait;

use crate::gateway::usage::{ProviderCallRecord, UsageSink};
use crate::gateway::{Attribution, EmbedRequest, EmbeddingProvider};

use super::RouterError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RouterError>;
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RouterError> {
        (**self).embed(texts).await
    }
}

/// Texts per embeddings request; keeps 1536-dim responses around 4MB.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Embeds through the completion service's embeddings endpoint.
pub struct GatewayEmbedder<P: EmbeddingProvider, U: UsageSink> {
    provider: P,
    model: String,
    usage_sink: Arc<U>,
    attribution: Attribution,
    /// Texts per request.
    chunk_size: usize,
}

impl<P: EmbeddingProvider, U: UsageSink> GatewayEmbedder<P, U> {
    pub fn new(
        provider: P,
        model: impl Into<String>,
        usage_sink: Arc<U>,
        attribution: Attribution,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            usage_sink,
            attribution,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait]
impl<P: EmbeddingProvider, U: UsageSink> Embedder for GatewayEmbedder<P, U> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RouterError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.chunk_size) {
            let req = EmbedRequest::new(&self.model, chunk.to_vec(), self.attribution.clone());
            let record =
                ProviderCallRecord::new("embeddings", &self.model, self.attribution.caller)
                    .run(self.attribution.run_id);

            match self.provider.embed(&req).await {
                Ok(resp) => {
                    self.usage_sink
                        .record(
                            record
                                .tokens(resp.tokens, 0)
                                .cost(resp.cost_nanodollars)
                                .latency(resp.latency.as_millis() as u64),
                        )
                        .await;
                    if resp.embeddings.len() != chunk.len() {
                        return Err(RouterError::EmbeddingCount {
                            expected: chunk.len(),
                            got: resp.embeddings.len(),
                        });
                    }
                    vectors.extend(resp.embeddings);
                }
                Err(err) => {
                    self.usage_sink.record(record.error(err.code())).await;
                    return Err(err.into());
                }
            }
        }

        Ok(vectors)
    }
}
