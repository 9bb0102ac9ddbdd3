#![forbid(unsafe_code)]

//! # newsroute-harness
//!
//! Benchmarks three ways of putting a news article into one of five
//! categories:
//!
//! - asking an LLM directly, one synchronous call per article or one bulk job
//!   per model;
//! - a semantic router that matches the article against embedded reference
//!   articles by cosine distance;
//! - a hybrid that trusts the router when it is confident, asks the LLM when
//!   it is not, and files the LLM's answer back into the router as a new
//!   reference.
//!
//! Every run reports accuracy, latency percentiles, token usage, and cost per
//! article projected to 100,000 articles a day.

pub mod articles;
pub mod bench;
pub mod classify;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod prompts;
pub mod router;

pub use articles::{Article, CategorySet, LabelCase};
pub use bench::{BenchContext, BenchError};
pub use classify::{
    BatchClassifier, HybridOrchestrator, LlmClassifier, RouterClassifier,
};
pub use config::{BenchConfig, ConfigError};
pub use gateway::{Attribution, ChatGateway, ProviderGateway, UsageSink};
pub use metrics::{
    percentile, ClassificationResult, HybridSummary, JsonlResultSink, ResultSink, RunSummary,
    TraceError, TraceWorker, OFF_LIST_LABEL, UNKNOWN_LABEL,
};
pub use router::{AggregationMethod, Route, RoutingConfig, SemanticRouter, VectorRouter};
