//! Command-line front end for the query engine.
//!
//! Loads the configuration, seeds the in-memory adapters from an optional
//! corpus file, answers one query, and prints the response as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mimir_adapters::embedding::HashEmbedder;
use mimir_adapters::graph::InMemoryGraphStore;
use mimir_adapters::vector::InMemoryVectorStore;
use mimir_agents::RagEngine;
use mimir_core::cache::EmbeddingCache;
use mimir_core::config::EngineConfig;
use mimir_core::types::QueryRequest;

const EMBEDDING_DIMENSION: usize = 256;

#[derive(Parser)]
#[command(name = "mimir", about = "Agentic retrieval-augmented query engine", version)]
struct Cli {
    /// Question to answer
    query: String,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Corpus file (JSON) with documents, entities, and relations
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Session identifier carried into the response metadata
    #[arg(long)]
    session: Option<String>,

    /// Extra key=value context pairs (e.g. language=rust)
    #[arg(long = "context", value_parser = parse_key_value)]
    context: Vec<(String, String)>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[derive(Debug, Deserialize)]
struct CorpusDocument {
    id: String,
    content: String,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CorpusEntity {
    id: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct CorpusRelation {
    from: String,
    relationship: String,
    to: String,
    #[serde(default = "default_weight")]
    weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Default, Deserialize)]
struct Corpus {
    #[serde(default)]
    documents: Vec<CorpusDocument>,
    #[serde(default)]
    entities: Vec<CorpusEntity>,
    #[serde(default)]
    relations: Vec<CorpusRelation>,
}

impl Corpus {
    fn load(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read corpus file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse corpus file {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::load(cli.config.as_deref())?;

    let embedding_cache = EmbeddingCache::new(config.embedding_cache_size);
    let embedder = Arc::new(HashEmbedder::new(
        EMBEDDING_DIMENSION,
        embedding_cache.clone(),
    ));
    let vector = Arc::new(InMemoryVectorStore::new(embedder.clone()));
    let graph = Arc::new(InMemoryGraphStore::new(embedder));

    if let Some(path) = &cli.corpus {
        let corpus = Corpus::load(path)?;
        info!(
            documents = corpus.documents.len(),
            entities = corpus.entities.len(),
            relations = corpus.relations.len(),
            "seeding adapters from corpus"
        );
        for doc in corpus.documents {
            vector
                .index_document(doc.id, doc.content, doc.metadata)
                .await?;
        }
        for entity in corpus.entities {
            graph.add_entity(entity.id, entity.description).await?;
        }
        for relation in corpus.relations {
            graph.add_relation(
                &relation.from,
                relation.relationship,
                &relation.to,
                relation.weight,
            );
        }
    }

    let engine =
        RagEngine::new(config, vector, graph)?.with_embedding_cache(embedding_cache);

    let mut request = QueryRequest::new(cli.query);
    request.session_id = cli.session;
    request.user_context = cli.context.into_iter().collect();

    let response = engine.query(request).await;
    if cli.verbose {
        let stats = engine.stats().await;
        let caches = engine.cache_stats();
        info!(
            total_queries = stats.total_queries,
            successful_queries = stats.successful_queries,
            refinement_attempts = stats.refinement_attempts,
            retrieval_entries = caches.retrieval_entries,
            synthesis_entries = caches.synthesis_entries,
            embedding_entries = caches.embedding_entries,
            "engine counters"
        );
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
