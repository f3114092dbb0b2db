//! Vector index seam, its record types, and an in-process implementation.

use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    str::FromStr,
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Similarity metric an index is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
    #[serde(rename = "dotproduct")]
    DotProduct,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dotproduct",
        }
    }

    /// Higher is more similar for every metric.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            Self::DotProduct => dot,
            Self::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
            Self::Euclidean => {
                let distance = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + distance)
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            "dotproduct" | "dot" => Ok(Self::DotProduct),
            other => Err(format!(
                "unknown metric '{other}'; use cosine, euclidean or dotproduct"
            )),
        }
    }
}

/// Shape an index is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

/// What the index service reports about an existing index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

impl IndexDescription {
    pub fn matches(&self, spec: &IndexSpec) -> bool {
        self.dimension == spec.dimension && self.metric == spec.metric
    }
}

/// Metadata stored next to every vector.
///
/// The passage text lives here because the index doubles as the document
/// store at query time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(default)]
    pub source: String,
    /// JSON-encoded [`crate::chunking::ChunkLocation`].
    #[serde(default)]
    pub loc: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub include_values: bool,
    pub include_metadata: bool,
}

/// One nearest-neighbor hit, most similar first in a result list.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub values: Vec<f32>,
    pub metadata: Option<RecordMetadata>,
}

/// A remote (or local) store of vectors with metadata.
pub trait VectorIndex {
    fn list_indexes(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn describe_index(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<IndexDescription>>> + Send;

    fn create_index(
        &self,
        spec: &IndexSpec,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_index(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Insert or overwrite records by id.
    fn upsert(
        &self,
        index: &str,
        records: &[IndexRecord],
    ) -> impl Future<Output = Result<()>> + Send;

    fn query(
        &self,
        index: &str,
        request: &QueryRequest,
    ) -> impl Future<Output = Result<Vec<QueryMatch>>> + Send;
}

#[derive(Debug)]
struct MemoryCollection {
    description: IndexDescription,
    records: BTreeMap<String, IndexRecord>,
}

/// An index kept in process memory, scored by brute force.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    indexes: Mutex<BTreeMap<String, MemoryCollection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored in `index`, or `None` if it doesn't exist.
    pub fn record_count(&self, index: &str) -> Option<usize> {
        self.lock().ok()?.get(index).map(|c| c.records.len())
    }

    /// Ids stored in `index`, sorted.
    pub fn record_ids(&self, index: &str) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|indexes| {
                indexes
                    .get(index)
                    .map(|c| c.records.keys().cloned().collect())
            })
            .unwrap_or_default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, MemoryCollection>>>
    {
        self.indexes
            .lock()
            .map_err(|_| Error::Index("memory index lock poisoned".into()))
    }
}

fn not_found(index: &str) -> Error {
    Error::Index(format!("index '{index}' not found"))
}

impl VectorIndex for MemoryIndex {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn describe_index(
        &self,
        name: &str,
    ) -> Result<Option<IndexDescription>> {
        Ok(self.lock()?.get(name).map(|c| c.description.clone()))
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut indexes = self.lock()?;
        if indexes.contains_key(&spec.name) {
            return Err(Error::Index(format!(
                "index '{}' already exists",
                spec.name
            )));
        }
        indexes.insert(
            spec.name.clone(),
            MemoryCollection {
                description: IndexDescription {
                    name: spec.name.clone(),
                    dimension: spec.dimension,
                    metric: spec.metric,
                },
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        self.lock()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn upsert(&self, index: &str, records: &[IndexRecord]) -> Result<()> {
        let mut indexes = self.lock()?;
        let collection =
            indexes.get_mut(index).ok_or_else(|| not_found(index))?;

        let dimension = collection.description.dimension;
        if let Some(bad) =
            records.iter().find(|r| r.values.len() != dimension)
        {
            return Err(Error::Index(format!(
                "record '{}' has dimension {}, index expects {dimension}",
                bad.id,
                bad.values.len()
            )));
        }

        for record in records {
            collection.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        index: &str,
        request: &QueryRequest,
    ) -> Result<Vec<QueryMatch>> {
        let indexes = self.lock()?;
        let collection = indexes.get(index).ok_or_else(|| not_found(index))?;
        let metric = collection.description.metric;

        let mut matches: Vec<QueryMatch> = collection
            .records
            .values()
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: metric.score(&request.vector, &record.values),
                values: if request.include_values {
                    record.values.clone()
                } else {
                    Vec::new()
                },
                metadata: request
                    .include_metadata
                    .then(|| record.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(request.top_k);
        Ok(matches)
    }
}
