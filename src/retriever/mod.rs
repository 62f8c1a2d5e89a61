// Retriever module
// Query-time context: loads the persisted pair once and serves ranked search


use anyhow::Context;
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::corpus::truncate_chars;
use crate::embeddings::ollama::OllamaClient;
use crate::index::{FlatIndex, SearchHit};
use crate::metadata::MetadataStore;
use crate::{LexragError, Result};

/// One ranked passage returned from a retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    /// 1-based rank, ascending by distance.
    pub rank: usize,
    /// Squared Euclidean distance to the query; lower is more similar.
    pub score: f32,
    /// Corpus file the passage came from.
    pub source: String,
    /// Passage preview, truncated to the requested length.
    pub text: String,
}

/// Query-time retrieval state: the loaded index pair plus the embedding
/// client, constructed once and shared by every query.
#[derive(Debug)]
pub struct Retriever {
    config: Config,
    client: OllamaClient,
    index: FlatIndex,
    metadata: MetadataStore,
}

impl Retriever {
    /// Load the persisted index pair, failing fast when either artifact is
    /// missing, malformed, or built with a different embedding model than
    /// the one configured for queries.
    #[inline]
    pub fn open(config: Config) -> Result<Self> {
        let client = OllamaClient::new(&config).context("Failed to create Ollama client")?;

        let vectors_path = config.vectors_path();
        let index = FlatIndex::load(&vectors_path)?;
        let metadata = MetadataStore::load(&config.metadata_path())?;

        if index.model() != config.ollama.model {
            return Err(LexragError::Load(format!(
                "index at {} was built with model '{}' but '{}' is configured; rebuild the index",
                vectors_path.display(),
                index.model(),
                config.ollama.model
            )));
        }
        if index.dimension() != config.ollama.embedding_dimension as usize {
            return Err(LexragError::Load(format!(
                "index at {} has dimension {} but {} is configured; rebuild the index",
                vectors_path.display(),
                index.dimension(),
                config.ollama.embedding_dimension
            )));
        }

        if index.len() != metadata.len() {
            warn!(
                "metadata entries ({}) do not match indexed vectors ({}); some lookups may fail",
                metadata.len(),
                index.len()
            );
        }

        info!(
            "loaded index pair: {} vectors, dimension {}, model {}",
            index.len(),
            index.dimension(),
            index.model()
        );

        Ok(Self {
            config,
            client,
            index,
            metadata,
        })
    }

    /// Retrieve with the configured defaults for k and preview length.
    #[inline]
    pub fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        self.retrieve_with(
            query,
            self.config.retrieval.top_k,
            self.config.retrieval.display_preview_chars,
        )
    }

    /// Retrieve the `top_k` passages most similar to `query`, previews
    /// truncated to `preview_chars` characters.
    ///
    /// An empty result is a normal outcome on a small corpus. A hit with no
    /// metadata entry is not: it means the persisted pair is out of step,
    /// and the query fails rather than silently dropping the passage.
    #[inline]
    pub fn retrieve_with(
        &self,
        query: &str,
        top_k: usize,
        preview_chars: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        debug!("retrieving top {} passages", top_k);

        let embedding = self
            .client
            .generate_embedding(query)
            .map_err(|e| LexragError::Embedding(format!("{e:#}")))?;

        let hits = self.index.search(&embedding, top_k)?;
        resolve_hits(&self.metadata, &hits, preview_chars)
    }

    /// Number of indexed documents.
    #[inline]
    pub fn document_count(&self) -> usize {
        self.index.len()
    }
}

/// Map raw search hits to ranked passages: padding slots are dropped, and
/// any real id without a metadata entry fails the whole query.
fn resolve_hits(
    metadata: &MetadataStore,
    hits: &[SearchHit],
    preview_chars: usize,
) -> Result<Vec<RetrievedPassage>> {
    let mut passages = Vec::with_capacity(hits.len());

    for hit in hits {
        if hit.is_padding() {
            continue;
        }

        let id = u32::try_from(hit.id).map_err(|_| LexragError::CorruptIndex(hit.id))?;
        let meta = match metadata.get(id) {
            Ok(meta) => meta,
            Err(LexragError::NotFound(missing)) => {
                return Err(LexragError::CorruptIndex(i64::from(missing)));
            }
            Err(e) => return Err(e),
        };

        passages.push(RetrievedPassage {
            rank: passages.len() + 1,
            score: hit.distance,
            source: meta.file.clone(),
            text: truncate_chars(&meta.text, preview_chars).to_string(),
        });
    }

    Ok(passages)
}

/// Join passage texts into one block for a downstream answer generator.
/// Empty input assembles to an empty string.
#[inline]
pub fn assemble_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|passage| passage.text.as_str())
        .join("\n\n")
}
