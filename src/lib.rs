//! docrag - question answering over a document collection.
//!
//! docrag loads documents (PDF pages and plain text), splits them into
//! bounded chunks, embeds them once into a local cache, and upserts them
//! into a vector index. Questions are answered by retrieving the closest
//! passages and handing them to a language model as context.
//!
//! Every network collaborator sits behind a trait
//! ([`EmbeddingProvider`], [`VectorIndex`], [`LanguageModel`],
//! [`DocumentSource`]) so the stages can run against in-process fakes such
//! as [`MemoryIndex`].
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use docrag::{
//!     DataDir, DirectoryLoader, OpenAiChat, OpenAiEmbedder, Pipeline,
//!     PineconeIndex,
//!     answer::AnswerOutcome,
//!     config::PipelineConfig,
//!     pinecone::{DEFAULT_CONTROL_URL, ServerlessSpec},
//! };
//!
//! # async fn demo() -> docrag::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let config = PipelineConfig {
//!     cache_path: data_dir.cache_path("gold-guide-9"),
//!     ..PipelineConfig::default()
//! };
//! let timeout = Duration::from_secs(60);
//! let base = "https://api.openai.com/v1";
//!
//! let pipeline = Pipeline::new(
//!     config,
//!     OpenAiEmbedder::new(
//!         "sk-...",
//!         base,
//!         "text-embedding-ada-002".into(),
//!         timeout,
//!     )?,
//!     PineconeIndex::new(
//!         "pc-...",
//!         DEFAULT_CONTROL_URL,
//!         ServerlessSpec::default(),
//!         None,
//!         timeout,
//!     )?,
//!     OpenAiChat::new("sk-...", base, "gpt-3.5-turbo".into(), timeout)?,
//! );
//!
//! let documents = DirectoryLoader::new(data_dir.documents_dir());
//! pipeline.ingest(&documents).await?;
//! if let AnswerOutcome::Answered { answer, .. } =
//!     pipeline.ask("When should I start my portfolio?").await?
//! {
//!     println!("{answer}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod answer;
pub mod cache;
pub mod chunking;
pub mod config;
pub mod data_dir;
pub mod document;
pub mod embedder;
pub mod error;
pub mod index;
pub mod llm;
pub mod pinecone;
pub mod pipeline;
pub mod provision;
pub mod sync;
pub mod walker;

pub use cache::EmbeddingCache;
pub use config::PipelineConfig;
pub use data_dir::DataDir;
pub use document::{DirectoryLoader, Document, DocumentSource};
pub use embedder::{EmbeddingProvider, OpenAiEmbedder};
pub use error::{Error, Result};
pub use index::{MemoryIndex, VectorIndex};
pub use llm::{LanguageModel, OpenAiChat};
pub use pinecone::PineconeIndex;
pub use pipeline::Pipeline;
