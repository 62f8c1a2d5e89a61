// Vector index module
// Append-only flat index with brute-force nearest-neighbor search


use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::{LexragError, Result};

const MAGIC: [u8; 4] = *b"LXRI";
const FORMAT_VERSION: u16 = 1;

/// Sentinel id filling search result slots that have no matching vector.
pub const NO_HIT_ID: i64 = -1;

/// One slot of a nearest-neighbor search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Document id, or [`NO_HIT_ID`] for an unfilled slot.
    pub id: i64,
    /// Squared Euclidean distance to the query; lower is more similar.
    pub distance: f32,
}

impl SearchHit {
    /// True when this slot is padding rather than a real match.
    #[inline]
    pub fn is_padding(self) -> bool {
        self.id == NO_HIT_ID
    }
}

/// Append-only flat vector index searched by exhaustive scan.
///
/// Row `i` holds the embedding of document id `i`; ids are assigned by
/// insertion order and never reused. Distances are squared Euclidean,
/// which ranks identically to cosine distance over the unit vectors
/// stored here.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    model: String,
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for embeddings of the given model and dimension.
    #[inline]
    pub fn new(model: impl Into<String>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(LexragError::Index(
                "index dimension must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            model: model.into(),
            dimension,
            vectors: Vec::new(),
        })
    }

    /// Identifier of the embedding model this index was built with.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append vectors in order; ids continue from the current count.
    /// Rejects the whole batch when any vector has the wrong dimension.
    #[inline]
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for (offset, vector) in vectors.iter().enumerate() {
            if vector.len() != self.dimension {
                return Err(LexragError::Index(format!(
                    "vector for document {} has dimension {}, index expects {}",
                    self.len() + offset,
                    vector.len(),
                    self.dimension
                )));
            }
        }

        self.vectors.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }

        Ok(())
    }

    /// Return the `k` nearest vectors, closest first. The result always has
    /// exactly `k` slots; when fewer vectors exist, the tail is padded with
    /// [`NO_HIT_ID`] entries. Ties break toward the lower id.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(LexragError::Index(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
        for (row, vector) in self.vectors.chunks_exact(self.dimension).enumerate() {
            let entry = HeapEntry {
                distance: squared_l2(query, vector),
                id: row as i64,
            };
            heap.push(entry);
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut hits: Vec<SearchHit> = heap
            .into_sorted_vec()
            .into_iter()
            .map(|entry| SearchHit {
                id: entry.id,
                distance: entry.distance,
            })
            .collect();
        hits.resize(
            k,
            SearchHit {
                id: NO_HIT_ID,
                distance: f32::INFINITY,
            },
        );

        Ok(hits)
    }

    /// Persist the index to `path`, replacing any existing file atomically.
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let header = self.encode_header()?;

        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&header)?;
            for value in &self.vectors {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!("saved {} vectors to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a persisted index, validating the header before trusting any of
    /// the contents.
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            LexragError::Load(format!("cannot read index file {}: {}", path.display(), e))
        })?;

        let mut offset = 0_usize;

        let magic = take(&bytes, &mut offset, MAGIC.len(), path)?;
        if magic != MAGIC.as_slice() {
            return Err(LexragError::Load(format!(
                "{} is not an index file (bad magic)",
                path.display()
            )));
        }

        let version = u16::from_le_bytes(take_array::<2>(&bytes, &mut offset, path)?);
        if version != FORMAT_VERSION {
            return Err(LexragError::Load(format!(
                "unsupported index format version {} in {}",
                version,
                path.display()
            )));
        }

        let model_len = usize::from(u16::from_le_bytes(take_array::<2>(
            &bytes,
            &mut offset,
            path,
        )?));
        let model_bytes = take(&bytes, &mut offset, model_len, path)?;
        let model = std::str::from_utf8(model_bytes)
            .map_err(|_| {
                LexragError::Load(format!(
                    "invalid model identifier in {}",
                    path.display()
                ))
            })?
            .to_string();

        let dimension = u32::from_le_bytes(take_array::<4>(&bytes, &mut offset, path)?) as usize;
        let count = u64::from_le_bytes(take_array::<8>(&bytes, &mut offset, path)?);

        let expected_checksum = crc32fast::hash(bytes.get(..offset).unwrap_or_default());
        let stored_checksum = u32::from_le_bytes(take_array::<4>(&bytes, &mut offset, path)?);
        if stored_checksum != expected_checksum {
            return Err(LexragError::Load(format!(
                "index header checksum mismatch in {}",
                path.display()
            )));
        }

        if dimension == 0 {
            return Err(LexragError::Load(format!(
                "index {} declares dimension 0",
                path.display()
            )));
        }

        let slab_len = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(dimension))
            .and_then(|floats| floats.checked_mul(4))
            .ok_or_else(|| {
                LexragError::Load(format!(
                    "index {} declares an implausible vector count",
                    path.display()
                ))
            })?;

        let expected_len = offset.checked_add(slab_len).ok_or_else(|| {
            LexragError::Load(format!(
                "index {} declares an implausible vector count",
                path.display()
            ))
        })?;
        if bytes.len() != expected_len {
            return Err(LexragError::Load(format!(
                "index file size mismatch in {}: expected {} bytes, found {}",
                path.display(),
                expected_len,
                bytes.len()
            )));
        }

        let mut vectors = Vec::with_capacity(slab_len / 4);
        for chunk in bytes.get(offset..).unwrap_or_default().chunks_exact(4) {
            let mut raw = [0_u8; 4];
            raw.copy_from_slice(chunk);
            vectors.push(f32::from_le_bytes(raw));
        }

        debug!(
            "loaded {} vectors (dimension {}, model {}) from {}",
            count,
            dimension,
            model,
            path.display()
        );

        Ok(Self {
            model,
            dimension,
            vectors,
        })
    }

    fn encode_header(&self) -> Result<Vec<u8>> {
        let model_bytes = self.model.as_bytes();
        let model_len = u16::try_from(model_bytes.len()).map_err(|_| {
            LexragError::Index(format!(
                "model identifier is too long to persist: {} bytes",
                model_bytes.len()
            ))
        })?;
        let dimension = u32::try_from(self.dimension).map_err(|_| {
            LexragError::Index(format!("dimension {} is too large to persist", self.dimension))
        })?;
        let count = self.len() as u64;

        let mut header = Vec::with_capacity(24 + model_bytes.len());
        header.extend_from_slice(&MAGIC);
        header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        header.extend_from_slice(&model_len.to_le_bytes());
        header.extend_from_slice(model_bytes);
        header.extend_from_slice(&dimension.to_le_bytes());
        header.extend_from_slice(&count.to_le_bytes());

        let checksum = crc32fast::hash(&header);
        header.extend_from_slice(&checksum.to_le_bytes());

        Ok(header)
    }
}

/// Max-heap entry ordered by distance, then id, so popping evicts the
/// farthest candidate and ties resolve toward the lower id.
#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    distance: f32,
    id: i64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).fold(0.0_f32, |acc, (x, y)| {
        let diff = x - y;
        diff.mul_add(diff, acc)
    })
}

fn take<'a>(bytes: &'a [u8], offset: &mut usize, len: usize, path: &Path) -> Result<&'a [u8]> {
    let end = offset.checked_add(len).ok_or_else(|| truncated(path))?;
    let slice = bytes.get(*offset..end).ok_or_else(|| truncated(path))?;
    *offset = end;
    Ok(slice)
}

fn take_array<const N: usize>(bytes: &[u8], offset: &mut usize, path: &Path) -> Result<[u8; N]> {
    let slice = take(bytes, offset, N, path)?;
    let mut array = [0_u8; N];
    array.copy_from_slice(slice);
    Ok(array)
}

fn truncated(path: &Path) -> LexragError {
    LexragError::Load(format!("index file {} is truncated", path.display()))
}
