use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;
use crate::rag::chunker::Chunker;

/// Per-chunk provenance, positionally aligned with the chunk and embedding
/// stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
}

/// Result of a full index rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Built { sources: usize, chunks: usize },
    /// No source yielded any chunk; the index was cleared, not partially
    /// built. A warning condition, not an error.
    EmptyCorpus,
}

#[derive(Default)]
struct IndexInner {
    chunks: Vec<String>,
    metadatas: Vec<ChunkMetadata>,
    embeddings: Option<Array2<f32>>,
}

impl IndexInner {
    fn clear(&mut self) {
        self.chunks.clear();
        self.metadatas.clear();
        self.embeddings = None;
    }
}

/// Exact-search vector index over all ingested chunks, mirrored to disk as
/// three positionally-aligned artifacts (embeddings, metadata, chunk text).
///
/// All access goes through an internal read/write lock; a rebuild holds the
/// write lock across the in-memory swap and the persistence step, so
/// concurrent queries never observe a half-built index.
pub struct IndexStore {
    index_path: PathBuf,
    meta_path: PathBuf,
    chunks_path: PathBuf,
    inner: RwLock<IndexInner>,
}

impl IndexStore {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            index_path: paths.index_file(),
            meta_path: paths.metadata_file(),
            chunks_path: paths.chunks_file(),
            inner: RwLock::new(IndexInner::default()),
        }
    }

    /// Reload persisted state. Missing or inconsistent artifacts leave the
    /// index empty; query-time lookups treat that as "zero chunks".
    pub async fn load(&self) {
        let loaded = read_artifacts(&self.index_path, &self.meta_path, &self.chunks_path);
        let mut inner = self.inner.write().await;
        match loaded {
            Some((embeddings, metadatas, chunks)) => {
                tracing::info!("Loaded vector index with {} chunks", chunks.len());
                inner.chunks = chunks;
                inner.metadatas = metadatas;
                inner.embeddings = embeddings;
            }
            None => {
                tracing::warn!("Vector index artifacts not found; starting empty");
                inner.clear();
            }
        }
    }

    /// Rebuild the whole index from all known source texts.
    ///
    /// Sources yielding zero chunks are skipped. All chunks across all
    /// sources are embedded in one batched call; the new index replaces the
    /// old one atomically and is persisted before the write lock is
    /// released.
    pub async fn rebuild(
        &self,
        sources: &BTreeMap<String, String>,
        chunker: &Chunker,
        chunk_tokens: usize,
        llm: &dyn LlmProvider,
        embed_model: &str,
    ) -> Result<RebuildOutcome, ApiError> {
        let mut chunks: Vec<String> = Vec::new();
        let mut metadatas: Vec<ChunkMetadata> = Vec::new();
        let mut source_count = 0usize;

        for (name, text) in sources {
            if text.trim().is_empty() {
                continue;
            }
            let source_chunks: Vec<String> = chunker.split(text, chunk_tokens).collect();
            if source_chunks.is_empty() {
                continue;
            }
            source_count += 1;
            metadatas.extend(source_chunks.iter().map(|_| ChunkMetadata {
                source: name.clone(),
            }));
            chunks.extend(source_chunks);
        }

        if chunks.is_empty() {
            tracing::warn!("No chunks found; vector index will not be created");
            let mut inner = self.inner.write().await;
            inner.clear();
            remove_artifacts(&self.index_path, &self.meta_path, &self.chunks_path);
            return Ok(RebuildOutcome::EmptyCorpus);
        }

        let vectors = llm.embed(&chunks, embed_model).await?;
        let embeddings = to_matrix(vectors)?;

        let mut inner = self.inner.write().await;
        inner.chunks = chunks;
        inner.metadatas = metadatas;
        inner.embeddings = Some(embeddings);
        self.persist(&inner)?;

        tracing::info!(
            "Rebuilt vector index: {} chunks from {} sources",
            inner.chunks.len(),
            source_count
        );
        Ok(RebuildOutcome::Built {
            sources: source_count,
            chunks: inner.chunks.len(),
        })
    }

    /// All chunks of one source, in original order. A metadata filter, not a
    /// nearest-neighbor search: at answer time the user has already chosen
    /// which sources to consult.
    pub async fn query_by_source(&self, source: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .metadatas
            .iter()
            .zip(inner.chunks.iter())
            .filter(|(meta, _)| meta.source == source)
            .map(|(_, chunk)| chunk.clone())
            .collect()
    }

    /// Exact L2 scan over the full embedded set. Returns `(chunk index,
    /// squared distance)` pairs, nearest first.
    pub async fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let inner = self.inner.read().await;
        let Some(embeddings) = &inner.embeddings else {
            return Vec::new();
        };
        if embeddings.ncols() != query.len() {
            return Vec::new();
        }

        let q = Array1::from_vec(query.to_vec());
        let qq = q.dot(&q);
        let mut scored: Vec<(usize, f32)> = embeddings
            .outer_iter()
            .enumerate()
            .map(|(i, row)| (i, row.dot(&row) - 2.0 * row.dot(&q) + qq))
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    pub async fn chunk_count(&self) -> usize {
        self.inner.read().await.chunks.len()
    }

    /// Parallel store sizes, for consistency checks: `(chunks, metadatas,
    /// embedding rows)`.
    pub async fn store_sizes(&self) -> (usize, usize, usize) {
        let inner = self.inner.read().await;
        let rows = inner.embeddings.as_ref().map_or(0, |m| m.nrows());
        (inner.chunks.len(), inner.metadatas.len(), rows)
    }

    pub async fn sources(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut seen = Vec::new();
        for meta in &inner.metadatas {
            if !seen.contains(&meta.source) {
                seen.push(meta.source.clone());
            }
        }
        seen
    }

    fn persist(&self, inner: &IndexInner) -> Result<(), ApiError> {
        let rows: Vec<Vec<f32>> = inner
            .embeddings
            .as_ref()
            .map(|m| m.outer_iter().map(|row| row.to_vec()).collect())
            .unwrap_or_default();

        write_atomically(&self.index_path, &rows)?;
        write_atomically(&self.meta_path, &inner.metadatas)?;
        write_atomically(&self.chunks_path, &inner.chunks)?;
        Ok(())
    }
}

fn to_matrix(vectors: Vec<Vec<f32>>) -> Result<Array2<f32>, ApiError> {
    let rows = vectors.len();
    let dim = vectors.first().map_or(0, Vec::len);
    if dim == 0 {
        return Err(ApiError::Internal(
            "Embedding capability returned empty vectors".to_string(),
        ));
    }
    if vectors.iter().any(|v| v.len() != dim) {
        return Err(ApiError::Internal(
            "Embedding dimensions are inconsistent across the batch".to_string(),
        ));
    }

    let flat: Vec<f32> = vectors.into_iter().flatten().collect();
    Array2::from_shape_vec((rows, dim), flat)
        .map_err(|e| ApiError::internal(format!("Failed to shape embedding matrix: {}", e)))
}

fn write_atomically<T: Serialize>(path: &Path, value: &T) -> Result<(), ApiError> {
    let json = serde_json::to_string(value).map_err(ApiError::internal)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .and_then(|_| fs::rename(&tmp, path))
        .map_err(|e| ApiError::internal(format!("Failed to persist {}: {}", path.display(), e)))
}

type Artifacts = (Option<Array2<f32>>, Vec<ChunkMetadata>, Vec<String>);

fn read_artifacts(index_path: &Path, meta_path: &Path, chunks_path: &Path) -> Option<Artifacts> {
    let rows: Vec<Vec<f32>> = read_json(index_path)?;
    let metadatas: Vec<ChunkMetadata> = read_json(meta_path)?;
    let chunks: Vec<String> = read_json(chunks_path)?;

    if rows.len() != chunks.len() || metadatas.len() != chunks.len() {
        tracing::warn!(
            "Index artifacts are misaligned ({} vectors, {} metadatas, {} chunks)",
            rows.len(),
            metadatas.len(),
            chunks.len()
        );
        return None;
    }

    let embeddings = if rows.is_empty() {
        None
    } else {
        Some(to_matrix(rows).ok()?)
    };
    Some((embeddings, metadatas, chunks))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn remove_artifacts(index_path: &Path, meta_path: &Path, chunks_path: &Path) {
    for path in [index_path, meta_path, chunks_path] {
        let _ = fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::llm::types::ProviderModel;
    use crate::tokenizer::TokenCoder;

    struct HashEmbedder;

    #[async_trait]
    impl LlmProvider for HashEmbedder {
        fn name(&self) -> &str {
            "stub"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn list_models(&self) -> Result<Vec<ProviderModel>, ApiError> {
            Ok(Vec::new())
        }

        async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, ApiError> {
            Ok(String::new())
        }

        async fn embed(&self, inputs: &[String], _model: &str) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let sum: u32 = text.bytes().map(u32::from).sum();
                    vec![text.len() as f32, (sum % 101) as f32, 1.0]
                })
                .collect())
        }
    }

    fn test_store(dir: &std::path::Path) -> (IndexStore, Chunker) {
        let paths = AppPaths::at(dir.to_path_buf(), dir.to_path_buf());
        let chunker = Chunker::new(TokenCoder::new().expect("tokenizer loads"));
        (IndexStore::new(&paths), chunker)
    }

    fn sample_sources() -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "extraction_a.txt".to_string(),
                "Paris is the capital of France. ".repeat(30),
            ),
            ("extraction_b.txt".to_string(), "   ".to_string()),
            (
                "extraction_c.txt".to_string(),
                "Berlin is the capital of Germany.".to_string(),
            ),
        ])
    }

    #[tokio::test]
    async fn rebuild_keeps_stores_aligned_and_skips_empty_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, chunker) = test_store(dir.path());

        let outcome = store
            .rebuild(&sample_sources(), &chunker, 16, &HashEmbedder, "stub-embed")
            .await
            .expect("rebuild succeeds");

        assert!(matches!(outcome, RebuildOutcome::Built { sources: 2, .. }));
        let (chunks, metadatas, rows) = store.store_sizes().await;
        assert!(chunks > 0);
        assert_eq!(chunks, metadatas);
        assert_eq!(chunks, rows);

        let sources = store.sources().await;
        assert_eq!(sources, vec!["extraction_a.txt", "extraction_c.txt"]);
    }

    #[tokio::test]
    async fn query_by_source_preserves_chunk_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, chunker) = test_store(dir.path());
        let sources = sample_sources();
        store
            .rebuild(&sources, &chunker, 16, &HashEmbedder, "stub-embed")
            .await
            .expect("rebuild succeeds");

        let chunks = store.query_by_source("extraction_a.txt").await;
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), sources["extraction_a.txt"]);
        assert!(store.query_by_source("unknown.txt").await.is_empty());
    }

    #[tokio::test]
    async fn persisted_index_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, chunker) = test_store(dir.path());
        store
            .rebuild(&sample_sources(), &chunker, 16, &HashEmbedder, "stub-embed")
            .await
            .expect("rebuild succeeds");
        let before = store.store_sizes().await;

        let (reloaded, _) = test_store(dir.path());
        reloaded.load().await;
        assert_eq!(reloaded.store_sizes().await, before);
        assert_eq!(
            reloaded.query_by_source("extraction_c.txt").await,
            store.query_by_source("extraction_c.txt").await
        );
    }

    #[tokio::test]
    async fn empty_corpus_clears_index_and_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, chunker) = test_store(dir.path());
        store
            .rebuild(&sample_sources(), &chunker, 16, &HashEmbedder, "stub-embed")
            .await
            .expect("rebuild succeeds");

        let empty = BTreeMap::from([("extraction_a.txt".to_string(), "  ".to_string())]);
        let outcome = store
            .rebuild(&empty, &chunker, 16, &HashEmbedder, "stub-embed")
            .await
            .expect("rebuild succeeds");

        assert_eq!(outcome, RebuildOutcome::EmptyCorpus);
        assert_eq!(store.store_sizes().await, (0, 0, 0));

        let (reloaded, _) = test_store(dir.path());
        reloaded.load().await;
        assert_eq!(reloaded.store_sizes().await, (0, 0, 0));
    }

    #[tokio::test]
    async fn search_ranks_by_euclidean_distance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, chunker) = test_store(dir.path());
        let sources = BTreeMap::from([
            ("a.txt".to_string(), "aa".to_string()),
            ("b.txt".to_string(), "bbbbbbbb".to_string()),
        ]);
        store
            .rebuild(&sources, &chunker, 16, &HashEmbedder, "stub-embed")
            .await
            .expect("rebuild succeeds");

        let query = HashEmbedder
            .embed(&["aa".to_string()], "stub-embed")
            .await
            .expect("embed succeeds")
            .remove(0);
        let hits = store.search(&query, 2).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 <= hits[1].1);
    }
}
