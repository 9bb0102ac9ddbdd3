//! Labeled articles and reference sets read from CSV.
//!
//! Input files have a header row with at least `ArticleId`, `Text` and
//! `Category` columns; extra columns are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

/// Fixed label set the classifiers choose from, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    labels: Vec<String>,
}

impl CategorySet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// The five BBC News categories.
    pub fn bbc_news() -> Self {
        Self::new(["business", "tech", "sport", "politics", "entertainment"])
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Trim and lower-case a label for comparison.
pub fn normalize_label(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A labeled article held out for testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: String,
    pub text: String,
    pub true_category: String,
}

/// How the CSV `Category` column is carried into [`Article::true_category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelCase {
    /// Keep the value exactly as written.
    Verbatim,
    /// Lower-case it.
    Lowercase,
}

#[derive(Debug, thiserror::Error)]
pub enum ArticleError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct ArticleRow {
    #[serde(rename = "ArticleId")]
    article_id: String,
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "Category")]
    category: String,
}

fn open(path: &Path) -> Result<File, ArticleError> {
    File::open(path).map_err(|source| ArticleError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Read the first `limit` articles from a CSV file.
pub fn read_articles(
    path: impl AsRef<Path>,
    limit: usize,
    case: LabelCase,
) -> Result<Vec<Article>, ArticleError> {
    read_articles_from(open(path.as_ref())?, limit, case)
}

/// Read the first `limit` articles from any CSV source.
pub fn read_articles_from<R: Read>(
    reader: R,
    limit: usize,
    case: LabelCase,
) -> Result<Vec<Article>, ArticleError> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut articles = Vec::new();
    for row in csv.deserialize::<ArticleRow>().take(limit) {
        let row = row?;
        let true_category = match case {
            LabelCase::Verbatim => row.category,
            LabelCase::Lowercase => row.category.to_lowercase(),
        };
        articles.push(Article {
            id: row.article_id,
            text: row.text,
            true_category,
        });
    }
    Ok(articles)
}

/// Reference texts grouped by category, in [`CategorySet`] order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    groups: Vec<(String, Vec<String>)>,
}

impl ReferenceSet {
    pub fn empty(categories: &CategorySet) -> Self {
        Self {
            groups: categories.iter().map(|c| (c.to_string(), Vec::new())).collect(),
        }
    }

    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, texts)| texts.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(name, texts)| (name.as_str(), texts.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.groups.iter().map(|(_, texts)| texts.len()).sum()
    }

    fn push_within_quota(&mut self, category: &str, text: String, quota: usize) {
        if let Some((_, texts)) = self.groups.iter_mut().find(|(name, _)| name == category) {
            if texts.len() < quota {
                texts.push(text);
            }
        }
    }

    fn is_full(&self, quota: usize) -> bool {
        self.groups.iter().all(|(_, texts)| texts.len() >= quota)
    }
}

/// Collect up to `per_category` reference texts for every known category.
///
/// Categories are matched case-insensitively; rows for other labels are
/// skipped.
pub fn read_references(
    path: impl AsRef<Path>,
    categories: &CategorySet,
    per_category: usize,
) -> Result<ReferenceSet, ArticleError> {
    read_references_from(open(path.as_ref())?, categories, per_category)
}

pub fn read_references_from<R: Read>(
    reader: R,
    categories: &CategorySet,
    per_category: usize,
) -> Result<ReferenceSet, ArticleError> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut set = ReferenceSet::empty(categories);
    for row in csv.deserialize::<ArticleRow>() {
        if set.is_full(per_category) {
            break;
        }
        let row = row?;
        let category = row.category.to_lowercase();
        set.push_within_quota(&category, row.text, per_category);
    }
    Ok(set)
}
