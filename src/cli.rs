use std::{path::PathBuf, time::Duration};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use docrag::{
    answer::ContextBudget,
    cache::CacheValidation,
    chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    config::{DEFAULT_DIMENSION, DEFAULT_INDEX_NAME, PipelineConfig},
    embedder::{DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL},
    index::Metric,
    llm::DEFAULT_CHAT_MODEL,
    pinecone::DEFAULT_CONTROL_URL,
    provision::MismatchPolicy,
    sync::{DEFAULT_BATCH_SIZE, IdScheme},
};

#[derive(Debug, Parser)]
#[command(
    name = "docrag",
    about = "Ingest documents into a vector index and answer questions \
             from them"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true, env = "DOCRAG_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(flatten)]
    pub services: ServiceArgs,

    #[command(flatten)]
    pub index: IndexArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load, chunk, embed and upsert a directory of documents
    Ingest(IngestArgs),
    /// Answer a question from the indexed documents
    Ask(AskArgs),
    /// Ingest, then answer a question
    Run(RunArgs),
    /// Show the index and embeddings cache state
    Status(StatusArgs),
    /// Delete the index and the local embeddings cache
    Teardown,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Remote services --

#[derive(Debug, Args)]
pub struct ServiceArgs {
    /// OpenAI API key
    #[arg(
        long,
        global = true,
        env = "OPENAI_API_KEY",
        hide_env_values = true
    )]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(
        long,
        global = true,
        env = "OPENAI_BASE_URL",
        default_value = DEFAULT_OPENAI_BASE_URL
    )]
    pub openai_base_url: String,

    /// Embedding model name
    #[arg(
        long,
        global = true,
        env = "DOCRAG_EMBEDDING_MODEL",
        default_value = DEFAULT_EMBEDDING_MODEL
    )]
    pub embedding_model: String,

    /// Chat model used to answer questions
    #[arg(
        long,
        global = true,
        env = "DOCRAG_CHAT_MODEL",
        default_value = DEFAULT_CHAT_MODEL
    )]
    pub chat_model: String,

    /// Pinecone API key
    #[arg(
        long,
        global = true,
        env = "PINECONE_API_KEY",
        hide_env_values = true
    )]
    pub pinecone_api_key: Option<String>,

    /// Pinecone control plane URL
    #[arg(
        long,
        global = true,
        env = "PINECONE_CONTROL_URL",
        default_value = DEFAULT_CONTROL_URL
    )]
    pub pinecone_url: String,

    /// Cloud for newly created serverless indexes
    #[arg(
        long,
        global = true,
        env = "PINECONE_CLOUD",
        default_value = "aws"
    )]
    pub cloud: String,

    /// Region for newly created serverless indexes
    #[arg(
        long,
        global = true,
        env = "PINECONE_REGION",
        default_value = "us-east-1"
    )]
    pub region: String,

    /// Pinecone namespace to read and write
    #[arg(long, global = true, env = "PINECONE_NAMESPACE")]
    pub namespace: Option<String>,

    /// Timeout for each HTTP request, in seconds
    #[arg(long, global = true, default_value = "60")]
    pub timeout: u64,
}

// -- Index and pipeline tuning --

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Name of the vector index
    #[arg(
        long = "index",
        global = true,
        env = "DOCRAG_INDEX",
        default_value = DEFAULT_INDEX_NAME
    )]
    pub index_name: String,

    /// Vector dimension of the index
    #[arg(long, global = true, default_value_t = DEFAULT_DIMENSION)]
    pub dimension: usize,

    /// Similarity metric: cosine, euclidean or dotproduct
    #[arg(long, global = true, default_value = "cosine")]
    pub metric: Metric,

    /// Maximum chunk size in characters
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Overlap between adjacent chunks in characters
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    /// Records per upsert request
    #[arg(long, global = true, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Seconds to wait after creating an index
    #[arg(long, global = true, default_value = "60")]
    pub settle: u64,

    /// Embeddings cache file (default: <data-dir>/embeddings/<index>.redb)
    #[arg(long, global = true)]
    pub cache_path: Option<PathBuf>,

    /// Reuse any existing cache file without checking it against the chunks
    #[arg(long, global = true)]
    pub trust_cache: bool,

    /// Derive record ids from chunk content instead of batch position
    #[arg(long, global = true)]
    pub content_ids: bool,

    /// Keep using an existing index whose dimension or metric differs
    #[arg(long, global = true)]
    pub reuse_mismatched: bool,
}

impl IndexArgs {
    /// Build the pipeline configuration; `default_cache` is used when no
    /// cache path was given.
    pub fn pipeline_config(&self, default_cache: PathBuf) -> PipelineConfig {
        PipelineConfig {
            index_name: self.index_name.clone(),
            dimension: self.dimension,
            metric: self.metric,
            chunking: ChunkingConfig {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            },
            batch_size: self.batch_size,
            settle: Duration::from_secs(self.settle),
            cache_path: self.cache_path.clone().unwrap_or(default_cache),
            cache_validation: if self.trust_cache {
                CacheValidation::Existence
            } else {
                CacheValidation::Fingerprint
            },
            id_scheme: if self.content_ids {
                IdScheme::ContentHash
            } else {
                IdScheme::Positional
            },
            mismatch_policy: if self.reuse_mismatched {
                MismatchPolicy::Reuse
            } else {
                MismatchPolicy::Fail
            },
            ..PipelineConfig::default()
        }
    }
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Directory of documents (default: <data-dir>/documents)
    #[arg(long)]
    pub documents: Option<PathBuf>,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    #[command(flatten)]
    pub retrieval: RetrievalArgs,
}

#[derive(Debug, Args)]
pub struct RetrievalArgs {
    /// Number of passages to retrieve
    #[arg(short = 'k', long, default_value_t = docrag::answer::DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Keep at most this many passages in the context
    #[arg(long)]
    pub max_passages: Option<usize>,

    /// Keep the context under this many characters
    #[arg(long)]
    pub max_context_chars: Option<usize>,

    /// Output the answer and its sources as JSON
    #[arg(long)]
    pub json: bool,
}

impl RetrievalArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        config.top_k = self.top_k;
        config.context_budget = ContextBudget {
            max_passages: self.max_passages,
            max_chars: self.max_context_chars,
        };
    }
}

// -- Run --

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// The question to answer after ingesting
    pub question: String,

    /// Directory of documents (default: <data-dir>/documents)
    #[arg(long)]
    pub documents: Option<PathBuf>,

    #[command(flatten)]
    pub retrieval: RetrievalArgs,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docrag",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_ask_defaults() {
        let cli = Cli::parse_from(["docrag", "ask", "When is the ARCP?"]);
        match cli.command {
            Command::Ask(args) => {
                assert_eq!(args.question, "When is the ARCP?");
                assert_eq!(args.retrieval.top_k, 5);
                assert!(args.retrieval.max_passages.is_none());
                assert!(args.retrieval.max_context_chars.is_none());
            }
            _ => panic!("expected ask command"),
        }
        assert_eq!(cli.index.index_name, "gold-guide-9");
        assert_eq!(cli.index.metric, Metric::Cosine);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "docrag",
            "ingest",
            "--documents",
            "guides",
            "--chunk-size",
            "500",
            "--content-ids",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.index.chunk_size, 500);
        match cli.command {
            Command::Ingest(args) => {
                assert_eq!(args.documents, Some(PathBuf::from("guides")));
            }
            _ => panic!("expected ingest command"),
        }

        let config = cli.index.pipeline_config(PathBuf::from("cache.redb"));
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.id_scheme, IdScheme::ContentHash);
        assert_eq!(config.cache_validation, CacheValidation::Fingerprint);
        assert_eq!(config.cache_path, PathBuf::from("cache.redb"));
    }

    #[test]
    fn retrieval_args_set_budget() {
        let cli = Cli::parse_from([
            "docrag",
            "ask",
            "q",
            "-k",
            "8",
            "--max-passages",
            "3",
            "--max-context-chars",
            "2000",
        ]);
        let Command::Ask(args) = cli.command else {
            panic!("expected ask command");
        };
        let mut config = cli.index.pipeline_config(PathBuf::from("c.redb"));
        args.retrieval.apply(&mut config);
        assert_eq!(config.top_k, 8);
        assert_eq!(config.context_budget.max_passages, Some(3));
        assert_eq!(config.context_budget.max_chars, Some(2000));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
