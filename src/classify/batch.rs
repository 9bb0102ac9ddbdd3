//! Bulk classification through the batch API.
//!
//! One job per model: every article becomes a line of the input file, the job
//! runs asynchronously, and the result file is matched back to articles by
//! the index embedded in each `custom_id`. A job either yields a result for
//! every article or fails as a whole.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::articles::{normalize_label, Article, CategorySet};
use crate::gateway::batch::{decode_batch_line, encode_batch_line};
use crate::gateway::{Attribution, BatchJob, BatchProvider, BatchStatus, PriceTable, ProviderError};
use crate::metrics::{ClassificationResult, ResultSource};
use crate::prompts::{PromptTemplate, DEFAULT_PROMPT};

use super::llm::classification_request;

const CUSTOM_ID_PREFIX: &str = "request-";

/// Default wait between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("batch {batch_id} ended with status {status}")]
    NotCompleted { batch_id: String, status: String },
    #[error("batch {batch_id} still running after {waited:?}")]
    TimedOut { batch_id: String, waited: Duration },
    #[error("batch {0} completed without an output file")]
    MissingOutputFile(String),
    #[error("unrecognized custom_id '{0}'")]
    BadCustomId(String),
    #[error("batch {batch_id} returned {got} of {expected} results")]
    Incomplete {
        batch_id: String,
        expected: usize,
        got: usize,
    },
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("failed to encode batch line: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// POLLING
// =============================================================================

/// What to do after observing a job.
#[derive(Debug, Clone, PartialEq)]
pub enum PollDecision {
    /// The job reached a terminal status.
    Finished(BatchJob),
    /// Check again after the given delay.
    Wait(Duration),
    /// The overall timeout has passed.
    GiveUp,
}

/// Fixed-interval status polling with an optional overall timeout.
#[derive(Debug, Clone, Copy)]
pub struct BatchPoller {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl Default for BatchPoller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl BatchPoller {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    /// Transition for a job observed `elapsed` after polling started.
    pub fn next(&self, job: BatchJob, elapsed: Duration) -> PollDecision {
        if job.status.is_terminal() {
            return PollDecision::Finished(job);
        }
        match self.timeout {
            Some(limit) if elapsed >= limit => PollDecision::GiveUp,
            _ => PollDecision::Wait(self.interval),
        }
    }

    /// Poll until the job is terminal or the timeout passes.
    pub async fn wait<B: BatchProvider + ?Sized>(
        &self,
        provider: &B,
        batch_id: &str,
    ) -> Result<BatchJob, BatchError> {
        let start = Instant::now();
        loop {
            let job = provider.retrieve_batch(batch_id).await?;
            tracing::info!(
                batch_id,
                status = job.status.as_str(),
                counts = ?job.request_counts,
                "batch status"
            );
            match self.next(job, start.elapsed()) {
                PollDecision::Finished(job) => return Ok(job),
                PollDecision::Wait(delay) => sleep(delay).await,
                PollDecision::GiveUp => {
                    return Err(BatchError::TimedOut {
                        batch_id: batch_id.to_string(),
                        waited: start.elapsed(),
                    })
                }
            }
        }
    }
}

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Input file name for a model, e.g. `batch_input_gpt_4_turbo.jsonl`.
pub fn batch_input_file_name(model: &str) -> String {
    format!("batch_input_{}.jsonl", model.replace('-', "_"))
}

pub fn custom_id(index: usize) -> String {
    format!("{CUSTOM_ID_PREFIX}{index}")
}

/// Article index encoded in a `custom_id`.
pub fn parse_custom_id(custom_id: &str) -> Option<usize> {
    custom_id.strip_prefix(CUSTOM_ID_PREFIX)?.parse().ok()
}

/// A finished job and its per-article results in article order.
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub model: String,
    pub batch_id: String,
    /// Upload to terminal status.
    pub wall_time: Duration,
    pub results: Vec<ClassificationResult>,
}

pub struct BatchClassifier<B: BatchProvider> {
    provider: B,
    categories: CategorySet,
    prompt: PromptTemplate,
    prices: PriceTable,
    batch_dir: PathBuf,
    poller: BatchPoller,
    attribution: Attribution,
}

impl<B: BatchProvider> BatchClassifier<B> {
    pub fn new(
        provider: B,
        categories: CategorySet,
        batch_dir: impl Into<PathBuf>,
        attribution: Attribution,
    ) -> Self {
        Self {
            provider,
            categories,
            prompt: DEFAULT_PROMPT,
            prices: PriceTable::openai_batch(),
            batch_dir: batch_dir.into(),
            poller: BatchPoller::default(),
            attribution,
        }
    }

    pub fn with_poller(mut self, poller: BatchPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }

    /// JSONL job body: one request per article, ids `request-<index>`.
    pub fn build_job_file(&self, articles: &[Article], model: &str) -> Result<String, BatchError> {
        let mut body = String::new();
        for (idx, article) in articles.iter().enumerate() {
            let req = classification_request(
                &self.prompt,
                &self.categories,
                &article.text,
                model,
                self.attribution.clone(),
            );
            body.push_str(&encode_batch_line(&custom_id(idx), &req)?);
            body.push('\n');
        }
        Ok(body)
    }

    async fn write_job_file(&self, model: &str, body: &str) -> Result<PathBuf, BatchError> {
        let path = self.batch_dir.join(batch_input_file_name(model));
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| BatchError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(path)
    }

    /// Run one job for `model` over `articles`.
    pub async fn classify_all(&self, articles: &[Article], model: &str) -> Result<BatchRun, BatchError> {
        tracing::info!(model, articles = articles.len(), "creating batch requests");
        let body = self.build_job_file(articles, model)?;
        let path = self.write_job_file(model, &body).await?;
        tracing::info!(path = %path.display(), "batch input file created");

        let start = Instant::now();
        let file_name = file_name_of(&path);
        let file_id = self
            .provider
            .upload_batch_file(&file_name, body.into_bytes())
            .await?;
        tracing::info!(file_id = %file_id, "file uploaded");

        let job = self.provider.create_batch(&file_id).await?;
        tracing::info!(batch_id = %job.id, status = job.status.as_str(), "batch job created");

        let job = self.poller.wait(&self.provider, &job.id).await?;
        let wall_time = start.elapsed();
        if job.status != BatchStatus::Completed {
            return Err(BatchError::NotCompleted {
                batch_id: job.id,
                status: job.status.as_str().to_string(),
            });
        }
        tracing::info!(batch_id = %job.id, "batch completed in {:.2}s", wall_time.as_secs_f64());

        let output_file_id = job
            .output_file_id
            .clone()
            .ok_or_else(|| BatchError::MissingOutputFile(job.id.clone()))?;
        let content = self.provider.file_content(&output_file_id).await?;
        let results = self.match_results(articles, model, &job.id, &content)?;

        Ok(BatchRun {
            model: model.to_string(),
            batch_id: job.id,
            wall_time,
            results,
        })
    }

    /// Pair result lines with articles. Every article must get a result.
    pub fn match_results(
        &self,
        articles: &[Article],
        model: &str,
        batch_id: &str,
        content: &str,
    ) -> Result<Vec<ClassificationResult>, BatchError> {
        let mut slots: Vec<Option<ClassificationResult>> = vec![None; articles.len()];

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let completion = match decode_batch_line(line) {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!(batch_id, "skipping batch result line: {err}");
                    continue;
                }
            };
            let idx = parse_custom_id(&completion.custom_id)
                .filter(|i| *i < articles.len())
                .ok_or_else(|| BatchError::BadCustomId(completion.custom_id.clone()))?;

            let cost = self
                .prices
                .cost(model, completion.input_tokens, completion.output_tokens);
            slots[idx] = Some(
                ClassificationResult::new(
                    &articles[idx],
                    model,
                    normalize_label(&completion.content),
                    ResultSource::Batch,
                )
                .usage(completion.input_tokens, completion.output_tokens, cost),
            );
        }

        let got = slots.iter().filter(|s| s.is_some()).count();
        if got != articles.len() {
            return Err(BatchError::Incomplete {
                batch_id: batch_id.to_string(),
                expected: articles.len(),
                got,
            });
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "batch_input.jsonl".to_string())
}
