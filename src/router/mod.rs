//! Semantic routing: named routes of reference texts matched by distance.
//!
//! A route is a category name, its reference texts, and a distance threshold.
//! A query matches the route with the smallest aggregated distance, provided
//! that distance does not exceed the route's threshold.

pub mod embedder;
pub mod vector;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::articles::ReferenceSet;
use crate::gateway::ProviderError;

pub use embedder::{Embedder, GatewayEmbedder, DEFAULT_CHUNK_SIZE};
pub use vector::VectorRouter;

/// Route descriptor: category name, references and threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub name: String,
    pub references: Vec<String>,
    pub distance_threshold: f64,
}

impl Route {
    pub fn new(name: impl Into<String>, references: Vec<String>, distance_threshold: f64) -> Self {
        Self {
            name: name.into(),
            references,
            distance_threshold,
        }
    }
}

/// Build one route per category that has at least one reference.
pub fn build_routes(references: &ReferenceSet, distance_threshold: f64) -> Vec<Route> {
    references
        .iter()
        .filter(|(_, texts)| !texts.is_empty())
        .map(|(name, texts)| {
            tracing::info!("created route '{name}' with {} references", texts.len());
            Route::new(name, texts.to_vec(), distance_threshold)
        })
        .collect()
}

/// How per-reference distances collapse into one distance per route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// Mean distance over all references (the routing library's default).
    #[default]
    Avg,
    /// Distance to the closest reference.
    Min,
    /// Sum of distances.
    Sum,
}

impl AggregationMethod {
    /// Aggregate a non-empty slice of distances.
    pub fn aggregate(&self, distances: &[f64]) -> Option<f64> {
        if distances.is_empty() {
            return None;
        }
        Some(match self {
            AggregationMethod::Avg => distances.iter().sum::<f64>() / distances.len() as f64,
            AggregationMethod::Min => distances.iter().copied().fold(f64::INFINITY, f64::min),
            AggregationMethod::Sum => distances.iter().sum(),
        })
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregationMethod::Avg => "avg",
            AggregationMethod::Min => "min",
            AggregationMethod::Sum => "sum",
        })
    }
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "avg" | "mean" => Ok(AggregationMethod::Avg),
            "min" => Ok(AggregationMethod::Min),
            "sum" => Ok(AggregationMethod::Sum),
            other => Err(format!("unknown aggregation method '{other}' (avg|min|sum)")),
        }
    }
}

/// Router-wide settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingConfig {
    pub aggregation: AggregationMethod,
}

impl RoutingConfig {
    pub fn new(aggregation: AggregationMethod) -> Self {
        Self { aggregation }
    }
}

/// The nearest route within its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub name: String,
    pub distance: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] ProviderError),
    #[error("unknown route '{0}'")]
    UnknownRoute(String),
    #[error("embedder returned {got} vectors for {expected} texts")]
    EmbeddingCount { expected: usize, got: usize },
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },
}

/// The routing service as seen by the classifiers.
///
/// Adding references is the only mutation; routes never shrink.
#[async_trait]
pub trait SemanticRouter: Send + Sync {
    /// Nearest route for `text`, or `None` when no route is within threshold.
    async fn route(&self, text: &str) -> Result<Option<RouteMatch>, RouterError>;

    /// Append references to a named route; returns how many were stored.
    async fn add_route_references(
        &mut self,
        route_name: &str,
        references: &[String],
    ) -> Result<usize, RouterError>;
}
