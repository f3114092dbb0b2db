use std::time::Duration;

use clap::Parser;
use docrag::{
    DataDir,
    DirectoryLoader,
    OpenAiChat,
    OpenAiEmbedder,
    Pipeline,
    PineconeIndex,
    answer::AnswerOutcome,
    config::PipelineConfig,
    error::{self, Error},
    pinecone::ServerlessSpec,
    pipeline::{self, IngestReport, Status},
    provision::IndexState,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ServiceArgs};

type Services = Pipeline<OpenAiEmbedder, PineconeIndex, OpenAiChat>;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCRAG_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let mut config = cli
        .index
        .pipeline_config(data_dir.cache_path(&cli.index.index_name));

    match cli.command {
        Command::Ingest(args) => {
            let pipeline = build_pipeline(&cli.services, config)?;
            let root =
                args.documents.unwrap_or_else(|| data_dir.documents_dir());
            let report = pipeline.ingest(&DirectoryLoader::new(root)).await?;
            print_ingest(&report);
        }
        Command::Ask(args) => {
            args.retrieval.apply(&mut config);
            let pipeline = build_pipeline(&cli.services, config)?;
            let outcome = pipeline.ask(&args.question).await?;
            print_answer(&outcome, args.retrieval.json)?;
        }
        Command::Run(args) => {
            args.retrieval.apply(&mut config);
            let pipeline = build_pipeline(&cli.services, config)?;
            let root =
                args.documents.unwrap_or_else(|| data_dir.documents_dir());
            let (report, outcome) = pipeline
                .run(&DirectoryLoader::new(root), &args.question)
                .await?;
            if !args.retrieval.json {
                print_ingest(&report);
            }
            print_answer(&outcome, args.retrieval.json)?;
        }
        Command::Status(args) => {
            let index = build_index(&cli.services)?;
            let status = pipeline::status(&index, &config).await?;
            print_status(&status, args.json)?;
        }
        Command::Teardown => {
            let index = build_index(&cli.services)?;
            let report = pipeline::teardown(&index, &config).await?;
            println!("Deleted index '{}'", config.index_name);
            if report.cache_removed {
                println!(
                    "Deleted embeddings cache {}",
                    config.cache_path.display()
                );
            }
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn require(key: Option<&str>, name: &str, env: &str) -> error::Result<String> {
    key.filter(|k| !k.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("missing {name} (set {env})")))
}

/// The vector index alone, for commands that never embed or generate.
fn build_index(services: &ServiceArgs) -> error::Result<PineconeIndex> {
    let pinecone_key = require(
        services.pinecone_api_key.as_deref(),
        "Pinecone API key",
        "PINECONE_API_KEY",
    )?;
    PineconeIndex::new(
        &pinecone_key,
        &services.pinecone_url,
        ServerlessSpec {
            cloud: services.cloud.clone(),
            region: services.region.clone(),
        },
        services.namespace.clone(),
        Duration::from_secs(services.timeout),
    )
}

fn build_pipeline(
    services: &ServiceArgs,
    config: PipelineConfig,
) -> error::Result<Services> {
    let index = build_index(services)?;
    let timeout = Duration::from_secs(services.timeout);
    let openai_key = require(
        services.openai_api_key.as_deref(),
        "OpenAI API key",
        "OPENAI_API_KEY",
    )?;

    let embedder = OpenAiEmbedder::new(
        &openai_key,
        &services.openai_base_url,
        services.embedding_model.clone(),
        timeout,
    )?;
    let llm = OpenAiChat::new(
        &openai_key,
        &services.openai_base_url,
        services.chat_model.clone(),
        timeout,
    )?;

    tracing::debug!(
        index = %config.index_name,
        embedding_model = %services.embedding_model,
        chat_model = %services.chat_model,
        "pipeline configured"
    );
    Ok(Pipeline::new(config, embedder, index, llm))
}

fn print_ingest(report: &IngestReport) {
    eprintln!(
        "Ingested {} documents as {} chunks \
         ({} upsert batch(es), embeddings {})",
        report.documents,
        report.chunks,
        report.sync.batches,
        if report.embeddings_computed {
            "computed"
        } else {
            "cached"
        }
    );
}

fn print_answer(outcome: &AnswerOutcome, json: bool) -> error::Result<()> {
    match outcome {
        AnswerOutcome::NoMatches if json => {
            let value = serde_json::json!({ "answer": null, "sources": [] });
            println!("{value}");
        }
        AnswerOutcome::NoMatches => {
            println!("No matching passages found; nothing to answer from.");
        }
        AnswerOutcome::Answered { answer, matches } if json => {
            let sources: Vec<_> = matches
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "id": m.id,
                        "score": m.score,
                        "source": m
                            .metadata
                            .as_ref()
                            .map(|meta| meta.source.as_str()),
                    })
                })
                .collect();
            let value =
                serde_json::json!({ "answer": answer, "sources": sources });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        AnswerOutcome::Answered { answer, matches } => {
            println!("{answer}");
            eprintln!();
            for m in matches {
                let source = m
                    .metadata
                    .as_ref()
                    .map_or("", |meta| meta.source.as_str());
                eprintln!("  {:.3}  {}  {source}", m.score, m.id);
            }
        }
    }
    Ok(())
}

fn print_status(status: &Status, json: bool) -> error::Result<()> {
    let (state, shape) = match &status.index {
        IndexState::Compatible(d) => ("compatible", Some(d)),
        IndexState::Incompatible(d) => ("incompatible", Some(d)),
        IndexState::Absent => ("absent", None),
    };

    if json {
        let value = serde_json::json!({
            "index": status.index_name,
            "state": state,
            "dimension": shape.map(|d| d.dimension),
            "metric": shape.map(|d| d.metric.as_str()),
            "cache_path": status.cache_path.display().to_string(),
            "cache_present": status.cache_present,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Index: {} ({state})", status.index_name);
        if let Some(d) = shape {
            println!("  dimension: {}", d.dimension);
            println!("  metric: {}", d.metric);
        }
        println!(
            "Embeddings cache: {} ({})",
            status.cache_path.display(),
            if status.cache_present {
                "present"
            } else {
                "missing"
            }
        );
    }
    Ok(())
}
