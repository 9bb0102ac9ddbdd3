//! In-process routing service: embedded references scanned by cosine distance.

use async_trait::async_trait;

use super::{Embedder, Route, RouteMatch, RouterError, RoutingConfig, SemanticRouter};

/// Stable id of a reference text.
pub fn reference_id(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`. Zero vectors are maximally
/// dissimilar to everything (distance 1).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    1.0 - similarity
}

#[derive(Debug, Clone)]
struct StoredReference {
    id: String,
    vector: Vec<f32>,
}

#[derive(Debug, Clone)]
struct RouteIndex {
    name: String,
    distance_threshold: f64,
    references: Vec<StoredReference>,
}

impl RouteIndex {
    fn contains(&self, id: &str) -> bool {
        self.references.iter().any(|r| r.id == id)
    }
}

/// Flat-scan router over embedded reference texts.
///
/// Routes keep their configured order; on equal aggregated distance the
/// earlier route wins.
pub struct VectorRouter<E: Embedder> {
    embedder: E,
    routes: Vec<RouteIndex>,
    config: RoutingConfig,
    dimension: Option<usize>,
}

impl<E: Embedder> VectorRouter<E> {
    /// Embed every route's references and build the router.
    pub async fn new(
        embedder: E,
        routes: Vec<Route>,
        config: RoutingConfig,
    ) -> Result<Self, RouterError> {
        let mut router = Self {
            embedder,
            routes: Vec::with_capacity(routes.len()),
            config,
            dimension: None,
        };

        for route in routes {
            router.routes.push(RouteIndex {
                name: route.name.clone(),
                distance_threshold: route.distance_threshold,
                references: Vec::new(),
            });
            router
                .add_route_references(&route.name, &route.references)
                .await?;
        }

        tracing::info!(
            routes = router.routes.len(),
            aggregation = %router.config.aggregation,
            "router initialized"
        );
        Ok(router)
    }

    pub fn config(&self) -> RoutingConfig {
        self.config
    }

    pub fn update_routing_config(&mut self, config: RoutingConfig) {
        self.config = config;
    }

    pub fn route_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn reference_count(&self, route_name: &str) -> Option<usize> {
        self.routes
            .iter()
            .find(|r| r.name == route_name)
            .map(|r| r.references.len())
    }

    fn check_dimension(&mut self, vector: &[f32]) -> Result<(), RouterError> {
        match self.dimension {
            Some(expected) if expected != vector.len() => Err(RouterError::Dimension {
                expected,
                got: vector.len(),
            }),
            Some(_) => Ok(()),
            None => {
                self.dimension = Some(vector.len());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<E: Embedder> SemanticRouter for VectorRouter<E> {
    async fn route(&self, text: &str) -> Result<Option<RouteMatch>, RouterError> {
        let mut vectors = self.embedder.embed(&[text.to_string()]).await?;
        let query = match vectors.pop() {
            Some(v) if vectors.is_empty() => v,
            _ => {
                return Err(RouterError::EmbeddingCount {
                    expected: 1,
                    got: vectors.len() + 1,
                })
            }
        };
        if let Some(expected) = self.dimension {
            if expected != query.len() {
                return Err(RouterError::Dimension {
                    expected,
                    got: query.len(),
                });
            }
        }

        let mut best: Option<RouteMatch> = None;
        for route in &self.routes {
            let distances: Vec<f64> = route
                .references
                .iter()
                .map(|r| cosine_distance(&query, &r.vector))
                .collect();
            let Some(distance) = self.config.aggregation.aggregate(&distances) else {
                continue;
            };
            if distance > route.distance_threshold {
                continue;
            }
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(RouteMatch {
                    name: route.name.clone(),
                    distance,
                });
            }
        }

        Ok(best)
    }

    async fn add_route_references(
        &mut self,
        route_name: &str,
        references: &[String],
    ) -> Result<usize, RouterError> {
        let route_idx = self
            .routes
            .iter()
            .position(|r| r.name == route_name)
            .ok_or_else(|| RouterError::UnknownRoute(route_name.to_string()))?;

        let mut fresh: Vec<(String, String)> = Vec::new();
        for text in references {
            let id = reference_id(text);
            let seen = self.routes[route_idx].contains(&id) || fresh.iter().any(|(f, _)| *f == id);
            if !seen {
                fresh.push((id, text.clone()));
            }
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = fresh.iter().map(|(_, t)| t.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(RouterError::EmbeddingCount {
                expected: texts.len(),
                got: vectors.len(),
            });
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }

        let added = fresh.len();
        let route = &mut self.routes[route_idx];
        for ((id, _), vector) in fresh.into_iter().zip(vectors) {
            route.references.push(StoredReference { id, vector });
        }
        Ok(added)
    }
}
