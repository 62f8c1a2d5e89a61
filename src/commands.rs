use anyhow::Context;
use std::path::Path;
use tracing::info;

use crate::Result;
use crate::builder::IndexBuilder;
use crate::config::Config;
use crate::corpus::truncate_chars;
use crate::embeddings::ollama::OllamaClient;
use crate::index::FlatIndex;
use crate::metadata::MetadataStore;
use crate::retriever::{Retriever, assemble_context};

/// Build the index pair from the configured corpus directories
#[inline]
pub fn run_build(config: Config) -> Result<()> {
    info!("Starting index build");

    let builder = IndexBuilder::new(config)?;
    let summary = builder.build()?;

    println!("Build completed successfully!");
    println!("  Documents indexed: {}", summary.documents);
    println!("  Collections scanned: {}", summary.collections);
    println!("  Records skipped: {}", summary.skipped_records);
    if summary.skipped_files > 0 {
        println!("  Files skipped: {}", summary.skipped_files);
    }
    println!("  Duration: {:?}", summary.duration);

    Ok(())
}

/// Search the persisted index for passages relevant to a query
#[inline]
pub fn run_search(
    config: Config,
    query: &str,
    top_k: Option<usize>,
    preview_len: Option<usize>,
    show_context: bool,
) -> Result<()> {
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let preview_chars = preview_len.unwrap_or(config.retrieval.display_preview_chars);
    // Fetch enough text for the context block in the same pass; the
    // per-passage display is trimmed further below.
    let fetch_chars = if show_context {
        config.retrieval.context_chars.max(preview_chars)
    } else {
        preview_chars
    };

    let retriever = Retriever::open(config)?;
    let passages = retriever.retrieve_with(query, top_k, fetch_chars)?;

    if passages.is_empty() {
        println!("No relevant passages found.");
        return Ok(());
    }

    println!("Top {} passages:", passages.len());
    println!();
    for passage in &passages {
        println!(
            "{}. [{}] (distance: {:.4})",
            passage.rank, passage.source, passage.score
        );
        println!("{}", truncate_chars(&passage.text, preview_chars));
        println!();
    }

    if show_context {
        println!("--- Assembled context ---");
        println!("{}", assemble_context(&passages));
    }

    Ok(())
}

/// Show Ollama connectivity and the state of the persisted index pair
#[inline]
pub fn run_status(config: &Config) -> Result<()> {
    println!("📊 Lexrag Status Report");
    println!("{}", "=".repeat(50));
    println!();

    // Ollama connectivity
    println!("🤖 Ollama Status:");
    match OllamaClient::new(config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Connected but unhealthy - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {}", e);
        }
    }

    // Persisted artifacts
    println!();
    println!("🗂️  Index Artifacts:");
    let index = match FlatIndex::load(&config.vectors_path()) {
        Ok(index) => {
            println!(
                "   ✅ Vector index: {} vectors, dimension {}",
                index.len(),
                index.dimension()
            );
            println!("   📋 Built with model: {}", index.model());
            if index.model() != config.ollama.model {
                println!(
                    "   ⚠️  Model mismatch: queries are configured for {}",
                    config.ollama.model
                );
            }
            Some(index)
        }
        Err(e) => {
            println!("   ❌ Vector index: {}", e);
            None
        }
    };

    match MetadataStore::load(&config.metadata_path()) {
        Ok(store) => {
            println!("   ✅ Metadata store: {} entries", store.len());
            if let Some(index) = &index {
                if index.len() != store.len() {
                    println!(
                        "   ⚠️  Entry count does not match vector count ({} vs {})",
                        store.len(),
                        index.len()
                    );
                }
            }
        }
        Err(e) => {
            println!("   ❌ Metadata store: {}", e);
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'lexrag build' to (re)build the index from the corpus");
    println!("   • Use 'lexrag search <query>' to retrieve matching passages");

    Ok(())
}

/// Show the active configuration, or write a default configuration file
#[inline]
pub fn run_config(config_dir: &Path, show: bool) -> Result<()> {
    let config = Config::load(config_dir)?;

    if show {
        let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!("# {}", config.config_file_path().display());
        print!("{}", rendered);
        return Ok(());
    }

    let config_path = config.config_file_path();
    if config_path.exists() {
        println!(
            "Configuration file already exists: {}",
            config_path.display()
        );
        println!("Edit it directly, or use 'lexrag config --show' to inspect it.");
    } else {
        config.save()?;
        println!("Wrote default configuration to {}", config_path.display());
    }

    Ok(())
}
