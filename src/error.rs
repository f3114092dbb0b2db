use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cache database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("cache storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("cache transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("cache table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("cache commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("cannot split documents: {0}")]
    Split(String),

    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("embedding cache at {path} is unusable: {reason}")]
    Cache { path: PathBuf, reason: String },

    #[error(
        "index '{name}' exists with dimension {found_dimension} and metric \
         {found_metric}, expected dimension {expected_dimension} and metric \
         {expected_metric}"
    )]
    IncompatibleIndex {
        name: String,
        found_dimension: usize,
        found_metric: String,
        expected_dimension: usize,
        expected_metric: String,
    },

    #[error("{chunks} chunks but {embeddings} embeddings")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error(
        "upsert of batch {batch} of {total} failed after {committed} \
         committed batch(es): {source}"
    )]
    Sync {
        batch: usize,
        total: usize,
        committed: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("vector index request failed: {0}")]
    Index(String),

    #[error("retrieval failed: {0}")]
    Query(String),

    #[error("language model failed: {0}")]
    Completion(String),
}
