//! Runtime configuration read from environment variables.
//!
//! Prices and the category set are compiled in and passed explicitly; only
//! file locations, sample sizes, routing knobs and model lists come from the
//! environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::gateway::openai::DEFAULT_BASE_URL;
use crate::router::AggregationMethod;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Routing settings for one benchmark flow.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterSettings {
    /// Test articles to classify.
    pub articles: usize,
    /// Reference texts per category.
    pub references_per_category: usize,
    pub distance_threshold: f64,
    pub aggregation: AggregationMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub request_timeout: Duration,
    pub test_csv: PathBuf,
    pub reference_csv: PathBuf,
    pub baseline_articles: usize,
    pub router: RouterSettings,
    pub hybrid: RouterSettings,
    /// Models compared by the baseline, in report order.
    pub models: Vec<String>,
    pub hybrid_model: String,
    pub embed_model: String,
    pub batch_dir: PathBuf,
    pub batch_poll_interval: Duration,
    pub batch_timeout: Option<Duration>,
    pub results_jsonl: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            test_csv: PathBuf::from("BBC News Train.csv"),
            reference_csv: PathBuf::from("BBC News Train2.csv"),
            baseline_articles: 100,
            router: RouterSettings {
                articles: 100,
                references_per_category: 150,
                distance_threshold: 0.5,
                aggregation: AggregationMethod::Avg,
            },
            hybrid: RouterSettings {
                articles: 200,
                references_per_category: 300,
                distance_threshold: 0.5,
                aggregation: AggregationMethod::Min,
            },
            models: vec![
                "gpt-3.5-turbo".to_string(),
                "gpt-4-turbo".to_string(),
                "gpt-4".to_string(),
            ],
            hybrid_model: "gpt-4-turbo".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            batch_dir: PathBuf::from("."),
            batch_poll_interval: Duration::from_secs(10),
            batch_timeout: None,
            results_jsonl: None,
        }
    }
}

fn parse_var<T>(var: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value: raw,
    })
}

fn parse_threshold(var: &'static str, raw: String) -> Result<f64, ConfigError> {
    let value: f64 = parse_var(var, raw.clone())?;
    if !(0.0..=2.0).contains(&value) {
        return Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "cosine distance threshold must be within [0, 2]".to_string(),
        });
    }
    Ok(value)
}

impl BenchConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        cfg.api_key = get("OPENAI_API_KEY");
        if let Some(v) = get("OPENAI_BASE_URL") {
            cfg.base_url = v;
        }
        if let Some(v) = get("OPENAI_TIMEOUT_SECONDS") {
            cfg.request_timeout = Duration::from_secs(parse_var("OPENAI_TIMEOUT_SECONDS", v)?);
        }
        if let Some(v) = get("NEWSROUTE_TEST_CSV") {
            cfg.test_csv = PathBuf::from(v);
        }
        if let Some(v) = get("NEWSROUTE_REFERENCE_CSV") {
            cfg.reference_csv = PathBuf::from(v);
        }
        if let Some(v) = get("NEWSROUTE_BASELINE_ARTICLES") {
            cfg.baseline_articles = parse_var("NEWSROUTE_BASELINE_ARTICLES", v)?;
        }
        if let Some(v) = get("NEWSROUTE_ROUTER_ARTICLES") {
            cfg.router.articles = parse_var("NEWSROUTE_ROUTER_ARTICLES", v)?;
        }
        if let Some(v) = get("NEWSROUTE_HYBRID_ARTICLES") {
            cfg.hybrid.articles = parse_var("NEWSROUTE_HYBRID_ARTICLES", v)?;
        }
        if let Some(v) = get("NEWSROUTE_ROUTER_REFERENCES") {
            cfg.router.references_per_category = parse_var("NEWSROUTE_ROUTER_REFERENCES", v)?;
        }
        if let Some(v) = get("NEWSROUTE_HYBRID_REFERENCES") {
            cfg.hybrid.references_per_category = parse_var("NEWSROUTE_HYBRID_REFERENCES", v)?;
        }
        if let Some(v) = get("NEWSROUTE_ROUTER_THRESHOLD") {
            cfg.router.distance_threshold = parse_threshold("NEWSROUTE_ROUTER_THRESHOLD", v)?;
        }
        if let Some(v) = get("NEWSROUTE_HYBRID_THRESHOLD") {
            cfg.hybrid.distance_threshold = parse_threshold("NEWSROUTE_HYBRID_THRESHOLD", v)?;
        }
        if let Some(v) = get("NEWSROUTE_ROUTER_AGGREGATION") {
            cfg.router.aggregation = parse_var("NEWSROUTE_ROUTER_AGGREGATION", v)?;
        }
        if let Some(v) = get("NEWSROUTE_HYBRID_AGGREGATION") {
            cfg.hybrid.aggregation = parse_var("NEWSROUTE_HYBRID_AGGREGATION", v)?;
        }
        if let Some(v) = get("NEWSROUTE_MODELS") {
            let models: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            if models.is_empty() {
                return Err(ConfigError::Invalid {
                    var: "NEWSROUTE_MODELS",
                    value: v,
                    reason: "no model ids".to_string(),
                });
            }
            cfg.models = models;
        }
        if let Some(v) = get("NEWSROUTE_HYBRID_MODEL") {
            cfg.hybrid_model = v.trim().to_string();
        }
        if let Some(v) = get("NEWSROUTE_EMBED_MODEL") {
            cfg.embed_model = v.trim().to_string();
        }
        if let Some(v) = get("NEWSROUTE_BATCH_DIR") {
            cfg.batch_dir = PathBuf::from(v);
        }
        if let Some(v) = get("NEWSROUTE_BATCH_POLL_SECONDS") {
            cfg.batch_poll_interval =
                Duration::from_secs(parse_var("NEWSROUTE_BATCH_POLL_SECONDS", v)?);
        }
        if let Some(v) = get("NEWSROUTE_BATCH_TIMEOUT_SECONDS") {
            cfg.batch_timeout = Some(Duration::from_secs(parse_var(
                "NEWSROUTE_BATCH_TIMEOUT_SECONDS",
                v,
            )?));
        }
        cfg.results_jsonl = get("NEWSROUTE_RESULTS_JSONL").map(PathBuf::from);

        Ok(cfg)
    }

    /// The API key, for commands that call the service.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<BenchConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BenchConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg, BenchConfig::default());
        assert_eq!(cfg.models, ["gpt-3.5-turbo", "gpt-4-turbo", "gpt-4"]);
        assert_eq!(cfg.router.aggregation, AggregationMethod::Avg);
        assert_eq!(cfg.hybrid.aggregation, AggregationMethod::Min);
        assert_eq!(cfg.hybrid.references_per_category, 300);
        assert!(matches!(
            cfg.require_api_key(),
            Err(ConfigError::Missing("OPENAI_API_KEY"))
        ));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = load(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("NEWSROUTE_MODELS", "gpt-4, gpt-3.5-turbo ,"),
            ("NEWSROUTE_HYBRID_ARTICLES", "5"),
            ("NEWSROUTE_ROUTER_AGGREGATION", "sum"),
            ("NEWSROUTE_ROUTER_THRESHOLD", "0.75"),
            ("NEWSROUTE_BATCH_TIMEOUT_SECONDS", "600"),
            ("NEWSROUTE_RESULTS_JSONL", "out.jsonl"),
        ])
        .unwrap();
        assert_eq!(cfg.require_api_key().unwrap(), "sk-test");
        assert_eq!(cfg.models, ["gpt-4", "gpt-3.5-turbo"]);
        assert_eq!(cfg.hybrid.articles, 5);
        assert_eq!(cfg.router.aggregation, AggregationMethod::Sum);
        assert_eq!(cfg.router.distance_threshold, 0.75);
        assert_eq!(cfg.batch_timeout, Some(Duration::from_secs(600)));
        assert_eq!(cfg.results_jsonl, Some(PathBuf::from("out.jsonl")));
    }

    #[test]
    fn invalid_numbers_are_errors() {
        let err = load(&[("NEWSROUTE_BASELINE_ARTICLES", "lots")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "NEWSROUTE_BASELINE_ARTICLES",
                ..
            }
        ));
        assert!(load(&[("NEWSROUTE_HYBRID_THRESHOLD", "3.5")]).is_err());
        assert!(load(&[("NEWSROUTE_HYBRID_AGGREGATION", "median")]).is_err());
        assert!(load(&[("NEWSROUTE_MODELS", " , ")]).is_err());
    }

    #[test]
    fn blank_values_keep_defaults() {
        let cfg = load(&[("OPENAI_API_KEY", "  "), ("NEWSROUTE_BATCH_POLL_SECONDS", "")]).unwrap();
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.batch_poll_interval, Duration::from_secs(10));
    }
}
