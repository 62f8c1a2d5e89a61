// Metadata store module
// Maps document ids to source provenance and preview text


use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::{LexragError, Result};

/// Provenance and preview for one indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Name of the corpus file the document came from.
    pub file: String,
    /// Preview of the normalized text, truncated at build time.
    pub text: String,
}

/// In-memory map from document id to metadata.
///
/// Ids are integers throughout the API; only the persisted JSON keys them
/// as decimal strings, which keeps the artifact portable and greppable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    entries: BTreeMap<u32, DocumentMeta>,
}

impl MetadataStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the metadata for a document id.
    #[inline]
    pub fn put(&mut self, id: u32, file: String, text: String) {
        self.entries.insert(id, DocumentMeta { file, text });
    }

    /// Look up a document id, failing when it has no entry.
    #[inline]
    pub fn get(&self, id: u32) -> Result<&DocumentMeta> {
        self.entries.get(&id).ok_or(LexragError::NotFound(id))
    }

    /// Iterate entries in ascending id order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (u32, &DocumentMeta)> {
        self.entries.iter().map(|(id, meta)| (*id, meta))
    }

    /// Write the store as pretty-printed JSON keyed by stringified ids.
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut map = serde_json::Map::with_capacity(self.entries.len());
        for (id, meta) in &self.entries {
            let value = serde_json::to_value(meta)
                .with_context(|| format!("Failed to serialize metadata for document {id}"))?;
            map.insert(id.to_string(), value);
        }

        let rendered = serde_json::to_string_pretty(&serde_json::Value::Object(map))
            .context("Failed to serialize metadata store")?;
        fs::write(path, rendered)?;

        debug!("saved {} metadata entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a persisted store, converting string keys back to integer ids.
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            LexragError::Load(format!(
                "cannot read metadata file {}: {}",
                path.display(),
                e
            ))
        })?;

        let raw: BTreeMap<String, DocumentMeta> = serde_json::from_str(&content).map_err(|e| {
            LexragError::Load(format!(
                "cannot parse metadata file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut entries = BTreeMap::new();
        for (key, meta) in raw {
            let id: u32 = key.parse().map_err(|_| {
                LexragError::Load(format!(
                    "metadata key '{}' in {} is not a document id",
                    key,
                    path.display()
                ))
            })?;
            entries.insert(id, meta);
        }

        debug!(
            "loaded {} metadata entries from {}",
            entries.len(),
            path.display()
        );
        Ok(Self { entries })
    }
}
