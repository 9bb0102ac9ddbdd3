//! Per-article results and the summaries derived from them.
//!
//! Everything here is a pure function of its input batch: summaries are
//! recomputed from scratch for each run and never updated in place.

pub mod report;
pub mod trace;

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::articles::Article;
use crate::gateway::nanos_to_usd;

pub use report::*;
pub use trace::{record_all, JsonlResultSink, ResultSink, ResultTrace, TraceError, TraceWorker};

/// Articles per day used for cost projections.
pub const DAILY_VOLUME: u64 = 100_000;

/// Label reported when the router finds no route within threshold.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Label a hybrid run reports when the fallback LLM answers outside the
/// category set. Keeps [`UNKNOWN_LABEL`] exclusive to router misses.
pub const OFF_LIST_LABEL: &str = "other";

// =============================================================================
// PER-ARTICLE RESULT
// =============================================================================

/// Which classifier produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Llm,
    Batch,
    Router,
    /// Router missed; the LLM answered.
    Fallback,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Outcome of classifying one article with one strategy.
///
/// The label fields are private so `correct` always agrees with them.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub article_id: String,
    /// Model id or strategy name the result belongs to.
    pub strategy: String,
    actual: String,
    predicted: String,
    correct: bool,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_nanodollars: i64,
    pub distance: Option<f64>,
    pub source: ResultSource,
}

impl ClassificationResult {
    pub fn new(
        article: &Article,
        strategy: impl Into<String>,
        predicted: impl Into<String>,
        source: ResultSource,
    ) -> Self {
        let predicted = predicted.into();
        Self {
            article_id: article.id.clone(),
            strategy: strategy.into(),
            correct: predicted == article.true_category,
            actual: article.true_category.clone(),
            predicted,
            elapsed: Duration::ZERO,
            input_tokens: 0,
            output_tokens: 0,
            cost_nanodollars: 0,
            distance: None,
            source,
        }
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn usage(mut self, input_tokens: u32, output_tokens: u32, cost_nanodollars: i64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.cost_nanodollars = cost_nanodollars;
        self
    }

    pub fn distance(mut self, distance: Option<f64>) -> Self {
        self.distance = distance;
        self
    }

    pub fn actual(&self) -> &str {
        &self.actual
    }

    pub fn predicted(&self) -> &str {
        &self.predicted
    }

    pub fn is_correct(&self) -> bool {
        self.correct
    }

    pub fn is_unknown(&self) -> bool {
        self.predicted == UNKNOWN_LABEL
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Percentile with linear interpolation between closest ranks.
///
/// `p` is in `[0, 100]`; the rank of the result is `p / 100 * (n - 1)`.
/// Empty samples yield 0.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Latency distribution in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub avg: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl LatencyStats {
    pub fn from_secs(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        Self {
            avg: samples.iter().sum::<f64>() / samples.len() as f64,
            p95: percentile(samples, 95.0),
            p99: percentile(samples, 99.0),
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    pub fn from_durations(samples: &[Duration]) -> Self {
        let secs: Vec<f64> = samples.iter().map(Duration::as_secs_f64).collect();
        Self::from_secs(&secs)
    }
}

fn accuracy_pct(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

fn per_article_usd(total_nanos: i64, articles: usize) -> f64 {
    if articles == 0 {
        0.0
    } else {
        nanos_to_usd(total_nanos) / articles as f64
    }
}

// =============================================================================
// SUMMARIES
// =============================================================================

/// Aggregate of one strategy (or one model) over a list of articles.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub label: String,
    pub total: usize,
    pub correct: usize,
    /// Predictions equal to [`UNKNOWN_LABEL`].
    pub unknown: usize,
    pub latency: LatencyStats,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_nanodollars: i64,
}

impl RunSummary {
    pub fn from_results(label: impl Into<String>, results: &[ClassificationResult]) -> Self {
        let elapsed: Vec<Duration> = results.iter().map(|r| r.elapsed).collect();
        Self {
            label: label.into(),
            total: results.len(),
            correct: results.iter().filter(|r| r.is_correct()).count(),
            unknown: results.iter().filter(|r| r.is_unknown()).count(),
            latency: LatencyStats::from_durations(&elapsed),
            input_tokens: results.iter().map(|r| r.input_tokens as u64).sum(),
            output_tokens: results.iter().map(|r| r.output_tokens as u64).sum(),
            cost_nanodollars: results.iter().map(|r| r.cost_nanodollars).sum(),
        }
    }

    pub fn accuracy(&self) -> f64 {
        accuracy_pct(self.correct, self.total)
    }

    pub fn unknown_rate(&self) -> f64 {
        accuracy_pct(self.unknown, self.total)
    }

    pub fn total_cost_usd(&self) -> f64 {
        nanos_to_usd(self.cost_nanodollars)
    }

    pub fn cost_per_article_usd(&self) -> f64 {
        per_article_usd(self.cost_nanodollars, self.total)
    }

    pub fn daily_cost_usd(&self) -> f64 {
        self.cost_per_article_usd() * DAILY_VOLUME as f64
    }
}

/// Aggregate of one bulk job.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRunSummary {
    pub model: String,
    pub batch_id: String,
    pub total: usize,
    pub correct: usize,
    /// Upload to terminal status.
    #[serde(rename = "wall_time_secs", serialize_with = "serialize_secs")]
    pub wall_time: Duration,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_nanodollars: i64,
}

impl BatchRunSummary {
    pub fn from_results(
        model: impl Into<String>,
        batch_id: impl Into<String>,
        wall_time: Duration,
        results: &[ClassificationResult],
    ) -> Self {
        Self {
            model: model.into(),
            batch_id: batch_id.into(),
            total: results.len(),
            correct: results.iter().filter(|r| r.is_correct()).count(),
            wall_time,
            input_tokens: results.iter().map(|r| r.input_tokens as u64).sum(),
            output_tokens: results.iter().map(|r| r.output_tokens as u64).sum(),
            cost_nanodollars: results.iter().map(|r| r.cost_nanodollars).sum(),
        }
    }

    pub fn accuracy(&self) -> f64 {
        accuracy_pct(self.correct, self.total)
    }

    pub fn avg_time_per_article(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.wall_time.as_secs_f64() / self.total as f64
        }
    }

    pub fn total_cost_usd(&self) -> f64 {
        nanos_to_usd(self.cost_nanodollars)
    }

    pub fn cost_per_article_usd(&self) -> f64 {
        per_article_usd(self.cost_nanodollars, self.total)
    }

    pub fn daily_cost_usd(&self) -> f64 {
        self.cost_per_article_usd() * DAILY_VOLUME as f64
    }
}

/// Hybrid run: the overall summary plus routing counters and stage latencies.
#[derive(Debug, Clone, Serialize)]
pub struct HybridSummary {
    pub run: RunSummary,
    pub router_hits: usize,
    pub fallbacks: usize,
    pub references_added: usize,
    pub router_latency: LatencyStats,
    /// `None` when the router answered every article.
    pub llm_latency: Option<LatencyStats>,
}

impl HybridSummary {
    pub fn new(
        run: RunSummary,
        router_hits: usize,
        fallbacks: usize,
        references_added: usize,
        router_times: &[Duration],
        llm_times: &[Duration],
    ) -> Self {
        Self {
            run,
            router_hits,
            fallbacks,
            references_added,
            router_latency: LatencyStats::from_durations(router_times),
            llm_latency: (!llm_times.is_empty()).then(|| LatencyStats::from_durations(llm_times)),
        }
    }

    pub fn router_rate(&self) -> f64 {
        accuracy_pct(self.router_hits, self.run.total)
    }

    pub fn fallback_rate(&self) -> f64 {
        accuracy_pct(self.fallbacks, self.run.total)
    }
}
