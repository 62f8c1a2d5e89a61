// Index builder module
// Offline pipeline: scan corpus files, normalize, embed, persist the pair


use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{Config, INDEX_FILE_NAME, METADATA_FILE_NAME};
use crate::corpus::{RecordSchema, SchemaRegistry, normalize_record, truncate_chars};
use crate::embeddings::ollama::OllamaClient;
use crate::index::FlatIndex;
use crate::metadata::MetadataStore;
use crate::{LexragError, Result};

/// Outcome of one build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Documents embedded and indexed.
    pub documents: usize,
    /// Collections (list-typed corpus files) scanned.
    pub collections: usize,
    /// Records dropped during normalization.
    pub skipped_records: usize,
    /// Files skipped because they could not be read as lists of records.
    pub skipped_files: usize,
    /// Wall-clock build time.
    pub duration: Duration,
}

/// How records in a scanned directory map onto schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanKind {
    /// Schema is looked up in the collection registry by file stem.
    Statutes,
    /// Every file holds question/answer records.
    QuestionAnswer,
}

/// A normalized document staged for embedding, in id order.
#[derive(Debug, Clone)]
struct StagedDocument {
    file: String,
    text: String,
}

#[derive(Debug, Default)]
struct ScanStats {
    collections: usize,
    skipped_records: usize,
    skipped_files: usize,
}

/// Offline pipeline that turns the corpus directories into a persisted
/// vector index + metadata pair.
pub struct IndexBuilder {
    config: Config,
    registry: SchemaRegistry,
    client: OllamaClient,
}

impl IndexBuilder {
    #[inline]
    pub fn new(config: Config) -> Result<Self> {
        let client = OllamaClient::new(&config).context("Failed to create Ollama client")?;

        Ok(Self {
            config,
            registry: SchemaRegistry::builtin(),
            client,
        })
    }

    /// Replace the builtin collection registry.
    #[inline]
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Run the full build: scan, normalize, embed, persist.
    ///
    /// Fails before anything is written when no documents survive
    /// normalization, so a meaningless index never replaces a working one.
    #[inline]
    pub fn build(&self) -> Result<BuildSummary> {
        let started = Instant::now();

        let mut documents = Vec::new();
        let mut stats = ScanStats::default();

        let laws_dir = self.config.corpus.laws_dir.clone();
        let qa_dir = self.config.corpus.qa_dir.clone();

        self.scan_directory(&laws_dir, ScanKind::Statutes, &mut documents, &mut stats)?;
        self.scan_directory(&qa_dir, ScanKind::QuestionAnswer, &mut documents, &mut stats)?;

        if documents.is_empty() {
            return Err(LexragError::EmptyCorpus(format!(
                "no usable documents under {} or {}",
                laws_dir.display(),
                qa_dir.display()
            )));
        }

        if u32::try_from(documents.len()).is_err() {
            return Err(LexragError::Index(
                "corpus exceeds the maximum document count".to_string(),
            ));
        }

        info!(
            "normalized {} documents from {} collections ({} records skipped)",
            documents.len(),
            stats.collections,
            stats.skipped_records
        );

        self.client
            .health_check()
            .context("Ollama is not ready for embedding")?;

        let embeddings = self.embed_documents(&documents)?;

        let mut index = FlatIndex::new(
            self.config.ollama.model.clone(),
            self.config.ollama.embedding_dimension as usize,
        )?;
        index.add(&embeddings)?;

        let mut metadata = MetadataStore::new();
        for (id, document) in documents.iter().enumerate() {
            let preview =
                truncate_chars(&document.text, self.config.retrieval.stored_preview_chars);
            metadata.put(id as u32, document.file.clone(), preview.to_string());
        }

        self.persist_pair(&index, &metadata)?;

        let summary = BuildSummary {
            documents: documents.len(),
            collections: stats.collections,
            skipped_records: stats.skipped_records,
            skipped_files: stats.skipped_files,
            duration: started.elapsed(),
        };

        info!(
            "indexed {} documents in {:.2}s",
            summary.documents,
            summary.duration.as_secs_f64()
        );

        Ok(summary)
    }

    /// Scan one corpus directory in lexicographic filename order. A missing
    /// directory contributes nothing; only the combined empty corpus aborts
    /// the build.
    fn scan_directory(
        &self,
        dir: &Path,
        kind: ScanKind,
        documents: &mut Vec<StagedDocument>,
        stats: &mut ScanStats,
    ) -> Result<()> {
        if !dir.is_dir() {
            warn!("corpus directory {} does not exist, skipping", dir.display());
            return Ok(());
        }

        let files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read corpus directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            })
            .sorted()
            .collect();

        for path in files {
            self.scan_collection(&path, kind, documents, stats);
        }

        Ok(())
    }

    /// Scan one corpus file. File-level problems are tolerated and counted;
    /// they never abort the build.
    fn scan_collection(
        &self,
        path: &Path,
        kind: ScanKind,
        documents: &mut Vec<StagedDocument>,
        stats: &mut ScanStats,
    ) {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            warn!("skipping corpus file with unreadable name: {}", path.display());
            stats.skipped_files += 1;
            return;
        };
        let Some(collection) = path.file_stem().and_then(|stem| stem.to_str()) else {
            warn!("skipping corpus file with unreadable name: {}", path.display());
            stats.skipped_files += 1;
            return;
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("cannot read {}: {}, skipping", file_name, e);
                stats.skipped_files += 1;
                return;
            }
        };

        let parsed: Value = match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("{} is not valid JSON: {}, skipping", file_name, e);
                stats.skipped_files += 1;
                return;
            }
        };

        let Value::Array(records) = parsed else {
            warn!("{} is not a list of records, skipping", file_name);
            stats.skipped_files += 1;
            return;
        };

        let schema = match kind {
            ScanKind::Statutes => self.registry.schema_for(collection),
            ScanKind::QuestionAnswer => Some(RecordSchema::QuestionAnswer),
        };
        if schema.is_none() {
            debug!(
                "no schema registered for collection '{}', its records will be skipped",
                collection
            );
        }

        stats.collections += 1;
        let before = documents.len();

        for record in &records {
            match schema.and_then(|schema| normalize_record(schema, collection, record)) {
                Some(text) => documents.push(StagedDocument {
                    file: file_name.to_string(),
                    text,
                }),
                None => stats.skipped_records += 1,
            }
        }

        debug!(
            "collection '{}': {} documents, {} records skipped",
            collection,
            documents.len() - before,
            records.len() - (documents.len() - before)
        );
    }

    fn embed_documents(&self, documents: &[StagedDocument]) -> Result<Vec<Vec<f32>>> {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(documents.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding documents")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut embeddings = Vec::with_capacity(documents.len());
        for chunk in documents.chunks(self.config.ollama.batch_size.max(1) as usize) {
            let texts: Vec<String> = chunk.iter().map(|doc| doc.text.clone()).collect();
            let batch = self
                .client
                .generate_embeddings_batch(&texts)
                .map_err(|e| LexragError::Embedding(format!("{e:#}")))?;
            embeddings.extend(batch);
            bar.inc(chunk.len() as u64);
        }
        bar.finish_and_clear();

        Ok(embeddings)
    }

    /// Publish the pair by staging both artifacts in a sibling directory and
    /// swapping whole directories, so a reader never observes a mixed pair.
    fn persist_pair(&self, index: &FlatIndex, metadata: &MetadataStore) -> Result<()> {
        let index_dir = self.config.index_dir();
        let staging_dir = sibling_dir(&index_dir, ".staging");
        let retired_dir = sibling_dir(&index_dir, ".old");

        if staging_dir.exists() {
            fs::remove_dir_all(&staging_dir).with_context(|| {
                format!(
                    "Failed to clear stale staging directory {}",
                    staging_dir.display()
                )
            })?;
        }
        fs::create_dir_all(&staging_dir).with_context(|| {
            format!("Failed to create staging directory {}", staging_dir.display())
        })?;

        index.save(&staging_dir.join(INDEX_FILE_NAME))?;
        metadata.save(&staging_dir.join(METADATA_FILE_NAME))?;

        if retired_dir.exists() {
            fs::remove_dir_all(&retired_dir)
                .with_context(|| format!("Failed to clear {}", retired_dir.display()))?;
        }
        if index_dir.exists() {
            fs::rename(&index_dir, &retired_dir).with_context(|| {
                format!("Failed to retire previous index at {}", index_dir.display())
            })?;
        }
        fs::rename(&staging_dir, &index_dir)
            .with_context(|| format!("Failed to publish index to {}", index_dir.display()))?;

        if retired_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&retired_dir) {
                warn!(
                    "could not remove retired index at {}: {}",
                    retired_dir.display(),
                    e
                );
            }
        }

        info!("published index pair to {}", index_dir.display());
        Ok(())
    }
}

fn sibling_dir(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir
        .file_name()
        .map_or_else(|| OsString::from("index"), |name| name.to_os_string());
    name.push(suffix);
    dir.with_file_name(name)
}
