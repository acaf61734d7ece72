//! Process-local index store for tests and offline runs.

use super::{
    ChunkRecord, IndexStore, RRF_K, ScoredChunk, SearchMode, SearchQuery, StoreError,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

struct MemoryIndex {
    dimension: usize,
    records: Vec<ChunkRecord>,
}

/// Index store backed by a map of in-memory collections.
///
/// Semantic search ranks by cosine similarity. Hybrid search fuses that ranking with a keyword
/// overlap ranking using reciprocal rank fusion.
pub struct InMemoryIndexStore {
    indexes: RwLock<HashMap<String, MemoryIndex>>,
    hybrid: bool,
}

impl InMemoryIndexStore {
    /// Empty store with hybrid search enabled.
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
            hybrid: true,
        }
    }

    /// Toggle hybrid search support.
    pub fn with_hybrid(mut self, hybrid: bool) -> Self {
        self.hybrid = hybrid;
        self
    }

    /// Number of records stored under `name`, if the index exists.
    pub async fn len(&self, name: &str) -> Option<usize> {
        self.indexes
            .read()
            .await
            .get(name)
            .map(|index| index.records.len())
    }

    /// Names of every index currently held.
    pub async fn index_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.indexes.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for InMemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryIndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndexStore")
            .field("hybrid", &self.hybrid)
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Record positions ordered by descending cosine similarity.
fn semantic_ranking(records: &[ChunkRecord], vector: &[f32]) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = records
        .iter()
        .enumerate()
        .map(|(position, record)| (position, cosine_similarity(&record.vector, vector)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored
}

/// Positions of records sharing at least one keyword with the query, most overlap first.
fn keyword_ranking(records: &[ChunkRecord], text: &str) -> Vec<usize> {
    let terms = keywords(text);
    let mut matches: Vec<(usize, usize)> = records
        .iter()
        .enumerate()
        .filter_map(|(position, record)| {
            let overlap = keywords(&record.chunk.content).intersection(&terms).count();
            (overlap > 0).then_some((position, overlap))
        })
        .collect();
    matches.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    matches.into_iter().map(|(position, _)| position).collect()
}

fn fuse(semantic: &[(usize, f32)], keyword: &[usize]) -> Vec<(usize, f32)> {
    let mut scores: HashMap<usize, f32> = HashMap::new();
    for (rank, (position, _)) in semantic.iter().enumerate() {
        *scores.entry(*position).or_default() += 1.0 / (RRF_K + rank as f32 + 1.0);
    }
    for (rank, position) in keyword.iter().enumerate() {
        *scores.entry(*position).or_default() += 1.0 / (RRF_K + rank as f32 + 1.0);
    }
    let mut fused: Vec<(usize, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    fused
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn create_index(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(name) {
            tracing::warn!(index = name, "Replacing existing in-memory index");
        }
        indexes.insert(
            name.to_string(),
            MemoryIndex {
                dimension,
                records: Vec::new(),
            },
        );
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.indexes.read().await.contains_key(name))
    }

    async fn upsert(&self, name: &str, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write().await;
        let index = indexes
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        if let Some(record) = records
            .iter()
            .find(|record| record.vector.len() != index.dimension)
        {
            return Err(StoreError::Rejected(format!(
                "vector dimension {} does not match index dimension {}",
                record.vector.len(),
                index.dimension
            )));
        }

        index.records.extend(records);
        Ok(())
    }

    async fn search(&self, name: &str, query: &SearchQuery) -> Result<Vec<ScoredChunk>, StoreError> {
        let indexes = self.indexes.read().await;
        let index = indexes
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        let semantic = semantic_ranking(&index.records, &query.vector);
        let ranked = if query.mode == SearchMode::Hybrid && self.hybrid {
            fuse(&semantic, &keyword_ranking(&index.records, &query.text))
        } else {
            semantic
        };

        Ok(ranked
            .into_iter()
            .take(query.limit)
            .map(|(position, score)| ScoredChunk {
                chunk: index.records[position].chunk.clone(),
                score,
            })
            .collect())
    }

    async fn delete_index(&self, name: &str) -> Result<(), StoreError> {
        self.indexes.write().await.remove(name);
        Ok(())
    }

    fn supports_hybrid(&self) -> bool {
        self.hybrid
    }
}
