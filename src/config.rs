use std::{path::PathBuf, time::Duration};

use crate::{
    answer::{ContextBudget, DEFAULT_TOP_K},
    cache::CacheValidation,
    chunking::ChunkingConfig,
    index::{IndexSpec, Metric},
    provision::{DEFAULT_SETTLE, MismatchPolicy},
    sync::{DEFAULT_BATCH_SIZE, IdScheme},
};

pub const DEFAULT_INDEX_NAME: &str = "gold-guide-9";
pub const DEFAULT_DIMENSION: usize = 1536;

/// Everything one pipeline run needs to know, passed to each stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub index_name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub chunking: ChunkingConfig,
    pub batch_size: usize,
    pub top_k: usize,
    /// Wait after creating an index before writing to it.
    pub settle: Duration,
    pub cache_path: PathBuf,
    pub cache_validation: CacheValidation,
    pub id_scheme: IdScheme,
    pub context_budget: ContextBudget,
    pub mismatch_policy: MismatchPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            dimension: DEFAULT_DIMENSION,
            metric: Metric::Cosine,
            chunking: ChunkingConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            top_k: DEFAULT_TOP_K,
            settle: DEFAULT_SETTLE,
            cache_path: PathBuf::from("embeddings")
                .join(format!("{DEFAULT_INDEX_NAME}.redb")),
            cache_validation: CacheValidation::default(),
            id_scheme: IdScheme::default(),
            context_budget: ContextBudget::default(),
            mismatch_policy: MismatchPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec {
            name: self.index_name.clone(),
            dimension: self.dimension,
            metric: self.metric,
        }
    }
}
