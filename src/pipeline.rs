//! The ingestion and question-answering stages wired together.
//!
//! [`Pipeline`] owns the configuration and the three network collaborators;
//! documents come in per call so the same pipeline can ingest from
//! different sources.

use std::path::PathBuf;

use crate::{
    answer::{self, AnswerOutcome},
    cache::EmbeddingCache,
    chunking::chunk_documents,
    config::PipelineConfig,
    document::DocumentSource,
    embedder::EmbeddingProvider,
    error::Result,
    index::VectorIndex,
    llm::LanguageModel,
    provision::{self, IndexState, ProvisionOutcome},
    sync::{self, SyncReport},
};

/// What one ingestion run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub provision: ProvisionOutcome,
    pub documents: usize,
    pub chunks: usize,
    /// `false` when the embeddings came from the cache.
    pub embeddings_computed: bool,
    pub sync: SyncReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub index_name: String,
    pub index: IndexState,
    pub cache_path: PathBuf,
    pub cache_present: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub cache_removed: bool,
}

pub struct Pipeline<E, V, L> {
    config: PipelineConfig,
    embedder: E,
    index: V,
    llm: L,
}

impl<E, V, L> Pipeline<E, V, L>
where
    E: EmbeddingProvider,
    V: VectorIndex,
    L: LanguageModel,
{
    pub fn new(config: PipelineConfig, embedder: E, index: V, llm: L) -> Self {
        Self {
            config,
            embedder,
            index,
            llm,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    pub fn cache(&self) -> EmbeddingCache {
        cache_for(&self.config)
    }

    /// Provision the index, then load, chunk, embed and upsert `source`.
    pub async fn ingest<S: DocumentSource>(
        &self,
        source: &S,
    ) -> Result<IngestReport> {
        let spec = self.config.index_spec();
        let provision = provision::ensure_index(
            &self.index,
            &spec,
            self.config.settle,
            self.config.mismatch_policy,
        )
        .await?;

        let documents = source.load()?;
        tracing::info!(documents = documents.len(), "loaded documents");

        let chunks = chunk_documents(&documents, &self.config.chunking)?;
        tracing::info!(chunks = chunks.len(), "split documents into chunks");

        let embeddings = self.cache().ensure(&chunks, &self.embedder).await?;
        if let Some(first) = embeddings.vectors.first()
            && first.len() != self.config.dimension
        {
            tracing::warn!(
                found = first.len(),
                expected = self.config.dimension,
                "embedding dimension differs from index dimension"
            );
        }

        let sync = sync::sync(
            &self.index,
            &self.config.index_name,
            &chunks,
            &embeddings.vectors,
            self.config.batch_size,
            self.config.id_scheme,
        )
        .await?;

        Ok(IngestReport {
            provision,
            documents: documents.len(),
            chunks: chunks.len(),
            embeddings_computed: embeddings.computed,
            sync,
        })
    }

    pub async fn ask(&self, question: &str) -> Result<AnswerOutcome> {
        answer::answer(
            question,
            self.config.top_k,
            &self.embedder,
            &self.index,
            &self.config.index_name,
            &self.llm,
            &self.config.context_budget,
        )
        .await
    }

    /// Ingest `source`, then answer `question` against the fresh index.
    pub async fn run<S: DocumentSource>(
        &self,
        source: &S,
        question: &str,
    ) -> Result<(IngestReport, AnswerOutcome)> {
        let report = self.ingest(source).await?;
        let outcome = self.ask(question).await?;
        Ok((report, outcome))
    }

    pub async fn status(&self) -> Result<Status> {
        status(&self.index, &self.config).await
    }

    pub async fn teardown(&self) -> Result<TeardownReport> {
        teardown(&self.index, &self.config).await
    }
}

fn cache_for(config: &PipelineConfig) -> EmbeddingCache {
    EmbeddingCache::new(config.cache_path.clone(), config.cache_validation)
}

/// Report the index shape and whether a local cache exists.
///
/// Only the vector index is consulted, so this runs without embedding or
/// chat credentials.
pub async fn status<V: VectorIndex>(
    index: &V,
    config: &PipelineConfig,
) -> Result<Status> {
    let state = provision::check_index(index, &config.index_spec()).await?;
    let cache = cache_for(config);
    Ok(Status {
        index_name: config.index_name.clone(),
        index: state,
        cache_path: cache.path().to_path_buf(),
        cache_present: cache.exists(),
    })
}

/// Delete the remote index, then the local embeddings file.
pub async fn teardown<V: VectorIndex>(
    index: &V,
    config: &PipelineConfig,
) -> Result<TeardownReport> {
    index.delete_index(&config.index_name).await?;
    tracing::info!(index = %config.index_name, "deleted index");

    let cache = cache_for(config);
    let cache_removed = cache.remove()?;
    let path = cache.path().display();
    if cache_removed {
        tracing::info!(path = %path, "deleted embeddings file");
    } else {
        tracing::debug!(path = %path, "no embeddings file to delete");
    }
    Ok(TeardownReport { cache_removed })
}
